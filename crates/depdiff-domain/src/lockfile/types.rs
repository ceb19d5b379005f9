use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

pub const SOURCE_HOSTED: &str = "hosted";
pub const SOURCE_GIT: &str = "git";

/// One resolved dependency as pinned by a lock description.
///
/// Two descriptors describe the same package contents iff every field is
/// equal, which is what the reconciler relies on.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PackageDescriptor {
    pub name: String,
    pub origin: PackageOrigin,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PackageOrigin {
    Hosted {
        version: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        sha256: Option<String>,
    },
    SourceControl {
        repository_url: String,
        resolved_ref: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        path: Option<String>,
    },
}

impl PackageDescriptor {
    pub fn hosted(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            origin: PackageOrigin::Hosted {
                version: version.into(),
                sha256: None,
            },
        }
    }

    pub fn git(
        name: impl Into<String>,
        repository_url: impl Into<String>,
        resolved_ref: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            origin: PackageOrigin::SourceControl {
                repository_url: repository_url.into(),
                resolved_ref: resolved_ref.into(),
                path: None,
            },
        }
    }

    pub fn source_name(&self) -> &'static str {
        match self.origin {
            PackageOrigin::Hosted { .. } => SOURCE_HOSTED,
            PackageOrigin::SourceControl { .. } => SOURCE_GIT,
        }
    }
}

impl fmt::Display for PackageDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.origin {
            PackageOrigin::Hosted { version, .. } => write!(f, "{} {version}", self.name),
            PackageOrigin::SourceControl { resolved_ref, .. } => {
                write!(f, "{}@{resolved_ref}", self.name)
            }
        }
    }
}

/// Lock entries that are deliberately not turned into descriptors.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct IgnoredEntry {
    pub name: String,
    pub reason: IgnoreReason,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum IgnoreReason {
    UnsupportedSource { source: String },
    MissingField { field: &'static str },
    /// The name cannot be used as a directory name.
    InvalidName,
    /// A value that would be read as a path or a command-line option.
    UnsafeValue { field: &'static str },
}

impl fmt::Display for IgnoreReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedSource { source } => write!(f, "unsupported source `{source}`"),
            Self::MissingField { field } => write!(f, "missing `{field}`"),
            Self::InvalidName => f.write_str("name is not a valid directory name"),
            Self::UnsafeValue { field } => {
                write!(f, "`{field}` may not contain path separators or start with `-`")
            }
        }
    }
}

/// Every package pinned by one lock description, keyed by name.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ManifestSnapshot {
    pub packages: BTreeMap<String, PackageDescriptor>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ignored: Vec<IgnoredEntry>,
}

impl ManifestSnapshot {
    pub fn from_descriptors(descriptors: impl IntoIterator<Item = PackageDescriptor>) -> Self {
        Self {
            packages: descriptors
                .into_iter()
                .map(|descriptor| (descriptor.name.clone(), descriptor))
                .collect(),
            ignored: Vec::new(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&PackageDescriptor> {
        self.packages.get(name)
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }
}
