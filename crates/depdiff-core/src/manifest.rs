use std::path::Path;

use depdiff_domain::{parse_lockfile, LockfileError, ManifestSnapshot};
use tracing::{error, info};

use crate::effects::GitClient;
use crate::git::GitError;

#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("cannot read {path} at {revision}: {source}")]
    Retrieve {
        revision: String,
        path: String,
        #[source]
        source: GitError,
    },
    #[error("cannot parse {path} at {revision}: {source}")]
    Parse {
        revision: String,
        path: String,
        #[source]
        source: LockfileError,
    },
}

/// The lenient result of reading one revision's lock description.
#[derive(Debug, Clone, Default)]
pub struct ManifestRead {
    pub snapshot: ManifestSnapshot,
    /// Why the snapshot is empty, when reading it failed.
    pub error: Option<String>,
}

/// Read and parse `lockfile` as of `revision`.
///
/// # Errors
/// Distinguishes a missing revision or file from a malformed document.
pub fn load_manifest(
    git: &dyn GitClient,
    repo: &Path,
    revision: &str,
    lockfile: &str,
) -> Result<ManifestSnapshot, ManifestError> {
    let contents = git
        .show(repo, revision, lockfile)
        .map_err(|source| ManifestError::Retrieve {
            revision: revision.to_string(),
            path: lockfile.to_string(),
            source,
        })?;
    parse_lockfile(&contents).map_err(|source| ManifestError::Parse {
        revision: revision.to_string(),
        path: lockfile.to_string(),
        source,
    })
}

/// Like [`load_manifest`] but a failure yields an empty snapshot so the run
/// can carry on; the failure is logged and kept on the result.
pub fn read_manifest(
    git: &dyn GitClient,
    repo: &Path,
    revision: &str,
    lockfile: &str,
) -> ManifestRead {
    match load_manifest(git, repo, revision, lockfile) {
        Ok(snapshot) => {
            info!(
                %revision,
                packages = snapshot.len(),
                ignored = snapshot.ignored.len(),
                "read {lockfile}"
            );
            ManifestRead {
                snapshot,
                error: None,
            }
        }
        Err(err) => {
            error!(%revision, "{err}");
            ManifestRead {
                snapshot: ManifestSnapshot::default(),
                error: Some(err.to_string()),
            }
        }
    }
}
