use serde::Deserialize;
use serde_yaml::{Mapping, Value};
use tracing::warn;

use super::types::{
    IgnoreReason, IgnoredEntry, ManifestSnapshot, PackageDescriptor, PackageOrigin, SOURCE_GIT,
    SOURCE_HOSTED,
};

#[derive(Debug, thiserror::Error)]
pub enum LockfileError {
    #[error("lock description is not valid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("lock description is empty")]
    Empty,
    #[error("lock description must be a mapping at the top level")]
    NotAMapping,
    #[error("`packages` must be a mapping of package names to entries")]
    PackagesNotAMapping,
}

#[derive(Debug, Default, Deserialize)]
struct RawEntry {
    #[serde(default)]
    source: Option<Value>,
    #[serde(default)]
    version: Option<Value>,
    #[serde(default)]
    description: Option<Value>,
}

/// Parse a `pubspec.lock` document into a snapshot.
///
/// A missing or null `packages` section is an empty snapshot. Entries that are
/// not hosted or git packages, or that lack a field their source needs, are
/// listed in [`ManifestSnapshot::ignored`] instead of failing the parse.
pub fn parse_lockfile(contents: &str) -> Result<ManifestSnapshot, LockfileError> {
    let document: Value = serde_yaml::from_str(contents)?;
    let root = match document {
        Value::Mapping(map) => map,
        Value::Null => return Err(LockfileError::Empty),
        _ => return Err(LockfileError::NotAMapping),
    };

    let packages = match root.get("packages") {
        None | Some(Value::Null) => return Ok(ManifestSnapshot::default()),
        Some(Value::Mapping(map)) => map,
        Some(_) => return Err(LockfileError::PackagesNotAMapping),
    };

    let mut snapshot = ManifestSnapshot::default();
    for (key, value) in packages {
        let Some(name) = scalar(key) else {
            warn!(key = ?key, "skipping lock entry with a non-scalar name");
            continue;
        };
        let raw: RawEntry = serde_yaml::from_value(value.clone()).unwrap_or_default();
        match descriptor_from_entry(&name, &raw) {
            Ok(descriptor) => {
                snapshot.packages.insert(name, descriptor);
            }
            Err(reason) => {
                warn!(package = %name, %reason, "ignoring lock entry");
                snapshot.ignored.push(IgnoredEntry { name, reason });
            }
        }
    }
    Ok(snapshot)
}

fn descriptor_from_entry(name: &str, raw: &RawEntry) -> Result<PackageDescriptor, IgnoreReason> {
    if !is_valid_name(name) {
        return Err(IgnoreReason::InvalidName);
    }
    let source = raw
        .source
        .as_ref()
        .and_then(scalar)
        .ok_or(IgnoreReason::MissingField { field: "source" })?;
    let description = match &raw.description {
        Some(Value::Mapping(map)) => Some(map),
        _ => None,
    };

    let origin = match source.as_str() {
        SOURCE_HOSTED => PackageOrigin::Hosted {
            version: raw
                .version
                .as_ref()
                .and_then(scalar)
                .ok_or(IgnoreReason::MissingField { field: "version" })
                .and_then(|version| checked(version, "version"))?,
            sha256: description.and_then(|map| field(map, "sha256")),
        },
        SOURCE_GIT => {
            let map = description.ok_or(IgnoreReason::MissingField {
                field: "description",
            })?;
            PackageOrigin::SourceControl {
                repository_url: field(map, "url")
                    .ok_or(IgnoreReason::MissingField { field: "url" })?,
                resolved_ref: field(map, "resolved-ref")
                    .ok_or(IgnoreReason::MissingField {
                        field: "resolved-ref",
                    })
                    .and_then(|rev| checked(rev, "resolved-ref"))?,
                path: field(map, "path").filter(|path| !matches!(path.as_str(), "" | "." | "./")),
            }
        }
        other => {
            return Err(IgnoreReason::UnsupportedSource {
                source: other.to_string(),
            })
        }
    };

    Ok(PackageDescriptor {
        name: name.to_string(),
        origin,
    })
}

/// Names become directories under the tree roots.
fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0'])
}

/// Versions end up in archive URLs and refs on the git command line.
fn checked(value: String, field: &'static str) -> Result<String, IgnoreReason> {
    let unsafe_value = value.is_empty()
        || value.starts_with('-')
        || value.contains(['/', '\\', '\0'])
        || value.contains("..");
    if unsafe_value {
        return Err(IgnoreReason::UnsafeValue { field });
    }
    Ok(value)
}

fn field(map: &Mapping, key: &str) -> Option<String> {
    map.get(key).and_then(scalar)
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}
