use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use depdiff_domain::{PackageDescriptor, PackageOrigin, Side};
use serde::Serialize;
use tracing::{error, info, warn};
use url::Url;
use walkdir::WalkDir;

use crate::archive::unpack_tar_gz;
use crate::config::Config;
use crate::effects::{Effects, GitClient};
use crate::git::{redact_repo_url, GitError};

/// Written into a package directory whose fetch failed, holding the reason.
pub const FETCH_FAILED_MARKER: &str = ".depdiff-fetch-failed";
/// Hosted archives land here, inside the package directory, before unpacking.
const ARCHIVE_FILE: &str = ".depdiff-archive.tar.gz";

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("reading response from {url} failed: {source}")]
    Stream {
        url: String,
        #[source]
        source: io::Error,
    },
    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("cannot build a download URL from {registry} for {package}")]
    InvalidUrl { registry: String, package: String },
    #[error("sha256 mismatch for {package} (expected {expected}, got {actual})")]
    ChecksumMismatch {
        package: String,
        expected: String,
        actual: String,
    },
    #[error("failed to extract {}: {source}", .archive.display())]
    Extract {
        archive: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to clone {url}: {source}")]
    Clone {
        url: String,
        #[source]
        source: GitError,
    },
    #[error("failed to check out {revision}: {source}")]
    Checkout {
        revision: String,
        #[source]
        source: GitError,
    },
    #[error("path `{path}` does not exist in {url} at {revision}")]
    MissingSubdir {
        url: String,
        revision: String,
        path: String,
    },
    #[error("{action} {}: {source}", .path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl FetchError {
    pub(crate) fn io(action: &'static str, path: &Path, source: io::Error) -> Self {
        Self::Io {
            action,
            path: path.to_path_buf(),
            source,
        }
    }
}

/// What happened to one (package, side) job.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FetchOutcome {
    pub package: String,
    pub side: Side,
    pub destination: PathBuf,
    pub status: FetchStatus,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FetchStatus {
    Fetched { files: usize },
    Failed { reason: String },
    Cancelled,
}

impl FetchOutcome {
    #[must_use]
    pub fn is_fetched(&self) -> bool {
        matches!(self.status, FetchStatus::Fetched { .. })
    }

    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self.status, FetchStatus::Failed { .. })
    }
}

/// Materialize `descriptor` into `destination`.
///
/// Never fails the caller: on error the directory is left holding only a
/// [`FETCH_FAILED_MARKER`] file and the outcome carries the reason.
pub fn fetch(
    effects: &dyn Effects,
    config: &Config,
    side: Side,
    descriptor: &PackageDescriptor,
    destination: &Path,
) -> FetchOutcome {
    let status = match try_fetch(effects, config, descriptor, destination) {
        Ok(files) => {
            info!(package = %descriptor.name, %side, files, "fetched {descriptor}");
            FetchStatus::Fetched { files }
        }
        Err(err) => {
            let reason = err.to_string();
            error!(package = %descriptor.name, %side, "failed to fetch {descriptor}: {reason}");
            if let Err(marker_err) = write_failure_marker(destination, &reason) {
                error!(
                    package = %descriptor.name,
                    %side,
                    "failed to record fetch failure: {marker_err}"
                );
            }
            FetchStatus::Failed { reason }
        }
    };
    FetchOutcome {
        package: descriptor.name.clone(),
        side,
        destination: destination.to_path_buf(),
        status,
    }
}

/// Strict variant of [`fetch`]; returns the number of files materialized.
///
/// # Errors
/// Returns the first download, extraction or git failure encountered.
pub fn try_fetch(
    effects: &dyn Effects,
    config: &Config,
    descriptor: &PackageDescriptor,
    destination: &Path,
) -> Result<usize, FetchError> {
    fs::create_dir_all(destination)
        .map_err(|source| FetchError::io("creating", destination, source))?;
    match &descriptor.origin {
        PackageOrigin::Hosted { version, sha256 } => fetch_hosted(
            effects,
            &config.network().registry_url,
            &descriptor.name,
            version,
            sha256.as_deref(),
            destination,
        )?,
        PackageOrigin::SourceControl {
            repository_url,
            resolved_ref,
            path,
        } => fetch_git(
            effects,
            repository_url,
            resolved_ref,
            path.as_deref(),
            destination,
        )?,
    }
    Ok(count_files(destination))
}

/// `{registry}/packages/{name}/versions/{version}.tar.gz`
///
/// # Errors
/// Returns [`FetchError::InvalidUrl`] when `registry` cannot carry a path.
pub fn hosted_url(registry: &Url, name: &str, version: &str) -> Result<Url, FetchError> {
    let mut url = registry.clone();
    url.path_segments_mut()
        .map_err(|()| FetchError::InvalidUrl {
            registry: registry.to_string(),
            package: name.to_string(),
        })?
        .pop_if_empty()
        .extend(["packages", name, "versions", &format!("{version}.tar.gz")]);
    Ok(url)
}

fn fetch_hosted(
    effects: &dyn Effects,
    registry: &Url,
    name: &str,
    version: &str,
    expected_sha256: Option<&str>,
    destination: &Path,
) -> Result<(), FetchError> {
    let url = hosted_url(registry, name, version)?;
    let archive = destination.join(ARCHIVE_FILE);
    let download = effects.registry().download(&url, &archive)?;
    let result = verify_and_unpack(name, expected_sha256, &download.sha256, &archive, destination);
    if let Err(err) = fs::remove_file(&archive) {
        if err.kind() != io::ErrorKind::NotFound {
            warn!(
                package = name,
                archive = %archive.display(),
                "failed to remove archive: {err}"
            );
        }
    }
    result
}

fn verify_and_unpack(
    name: &str,
    expected_sha256: Option<&str>,
    actual_sha256: &str,
    archive: &Path,
    destination: &Path,
) -> Result<(), FetchError> {
    if let Some(expected) = expected_sha256 {
        if !expected.eq_ignore_ascii_case(actual_sha256) {
            return Err(FetchError::ChecksumMismatch {
                package: name.to_string(),
                expected: expected.to_string(),
                actual: actual_sha256.to_string(),
            });
        }
    }
    unpack_tar_gz(archive, destination).map_err(|source| FetchError::Extract {
        archive: archive.to_path_buf(),
        source,
    })
}

fn fetch_git(
    effects: &dyn Effects,
    url: &str,
    revision: &str,
    subdir: Option<&str>,
    destination: &Path,
) -> Result<(), FetchError> {
    let git = effects.git();
    let Some(subdir) = subdir else {
        clone_at(git, url, revision, destination)?;
        return strip_git_metadata(destination);
    };

    // Check out the whole repository beside the package content, then keep
    // only the requested subdirectory.
    let staging = tempfile::Builder::new()
        .prefix(".depdiff-checkout-")
        .tempdir_in(destination)
        .map_err(|source| FetchError::io("staging checkout in", destination, source))?;
    clone_at(git, url, revision, staging.path())?;
    let member = staging.path().join(subdir);
    let escapes = Path::new(subdir)
        .components()
        .any(|part| !matches!(part, Component::Normal(_) | Component::CurDir));
    if escapes || !member.is_dir() {
        return Err(FetchError::MissingSubdir {
            url: redact_repo_url(url),
            revision: revision.to_string(),
            path: subdir.to_string(),
        });
    }
    let entries = fs::read_dir(&member).map_err(|err| FetchError::io("reading", &member, err))?;
    for entry in entries {
        let entry = entry.map_err(|err| FetchError::io("reading", &member, err))?;
        let target = destination.join(entry.file_name());
        fs::rename(entry.path(), &target)
            .map_err(|err| FetchError::io("moving", &entry.path(), err))?;
    }
    strip_git_metadata(destination)
}

fn clone_at(
    git: &dyn GitClient,
    url: &str,
    revision: &str,
    dest: &Path,
) -> Result<(), FetchError> {
    git.clone_repo(url, dest).map_err(|source| FetchError::Clone {
        url: redact_repo_url(url),
        source,
    })?;
    git.checkout(dest, revision)
        .map_err(|source| FetchError::Checkout {
            revision: revision.to_string(),
            source,
        })
}

/// A materialized package is source only; clone metadata would swamp the diff.
fn strip_git_metadata(destination: &Path) -> Result<(), FetchError> {
    let metadata = destination.join(".git");
    let removed = if metadata.is_dir() {
        fs::remove_dir_all(&metadata)
    } else if metadata.exists() {
        fs::remove_file(&metadata)
    } else {
        Ok(())
    };
    removed.map_err(|source| FetchError::io("removing", &metadata, source))
}

fn write_failure_marker(destination: &Path, reason: &str) -> io::Result<()> {
    if destination.exists() {
        fs::remove_dir_all(destination)?;
    }
    fs::create_dir_all(destination)?;
    fs::write(destination.join(FETCH_FAILED_MARKER), format!("{reason}\n"))
}

fn count_files(root: &Path) -> usize {
    WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .count()
}
