use std::io;
use std::path::{Path, PathBuf};

use depdiff_domain::IgnoredEntry;
use serde::Serialize;
use tracing::{info, warn};

use crate::assemble::assemble;
use crate::cancel::CancellationToken;
use crate::config::Config;
use crate::diff::{emit_diff, DiffStatus};
use crate::effects::{GitClient, SharedEffects};
use crate::fetch::FetchOutcome;
use crate::git::GitError;
use crate::manifest::{read_manifest, ManifestRead};

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("cannot open repository at {}: {source}", .path.display())]
    RepositoryOpen {
        path: PathBuf,
        #[source]
        source: GitError,
    },
    #[error("cannot create a temporary working directory: {0}")]
    TempRoot(#[source] io::Error),
    #[error("cannot prepare {}: {source}", .path.display())]
    Workspace {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// An opened repository; the only thing the run needs is its top level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoHandle {
    root: PathBuf,
}

impl RepoHandle {
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Confirm `path` is inside a git working tree.
///
/// # Errors
/// This is the one failure that aborts a run.
pub fn open_repository(git: &dyn GitClient, path: &Path) -> Result<RepoHandle, RunError> {
    let root = git
        .open(path)
        .map_err(|source| RunError::RepositoryOpen {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(RepoHandle { root })
}

#[derive(Debug, Clone)]
pub struct RunRequest {
    pub repo_path: PathBuf,
    pub old_ref: String,
    pub new_ref: String,
    /// Path of the lock description inside the repository.
    pub lockfile: String,
    pub skip_unchanged: bool,
    pub output: PathBuf,
}

#[derive(Debug, Clone, Serialize)]
pub struct ManifestSummary {
    pub revision: String,
    pub packages: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ignored: Vec<IgnoredEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ManifestSummary {
    fn new(revision: &str, read: &ManifestRead) -> Self {
        Self {
            revision: revision.to_string(),
            packages: read.snapshot.len(),
            ignored: read.snapshot.ignored.clone(),
            error: read.error.clone(),
        }
    }
}

/// Everything a caller needs to describe a finished run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub repository: PathBuf,
    pub old: ManifestSummary,
    pub new: ManifestSummary,
    pub skip_unchanged: bool,
    pub skipped: Vec<String>,
    pub outcomes: Vec<FetchOutcome>,
    pub diff: DiffStatus,
    pub output: PathBuf,
    pub cancelled: bool,
}

impl RunReport {
    #[must_use]
    pub fn fetched(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_fetched()).count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &FetchOutcome> + '_ {
        self.outcomes.iter().filter(|o| o.is_failed())
    }
}

/// Diff the dependency sources pinned at two revisions.
///
/// Everything past opening the repository is best-effort: manifest, fetch
/// and diff failures are recorded on the report rather than returned. The
/// temporary root is removed on every path out of this function.
///
/// # Errors
/// Returns an error when the repository cannot be opened or no temporary
/// working directory can be set up.
pub fn run_diff(
    effects: &SharedEffects,
    config: &Config,
    request: &RunRequest,
    cancel: &CancellationToken,
) -> Result<RunReport, RunError> {
    let repo = open_repository(effects.git(), &request.repo_path)?;
    info!(repository = %repo.root().display(), "opened repository");

    let old = read_manifest(effects.git(), repo.root(), &request.old_ref, &request.lockfile);
    let new = read_manifest(effects.git(), repo.root(), &request.new_ref, &request.lockfile);

    let temp = tempfile::Builder::new()
        .prefix("depdiff-")
        .tempdir()
        .map_err(RunError::TempRoot)?;
    info!(temp_root = %temp.path().display(), "created working directory");
    cancel.track_scratch(temp.path());

    let assembled = assemble(
        effects,
        config,
        &old.snapshot,
        &new.snapshot,
        temp.path(),
        request.skip_unchanged,
        cancel,
    );
    let trees = match assembled {
        Ok(trees) => trees,
        Err(err) => {
            cancel.release_scratch();
            return Err(err);
        }
    };

    let cancelled = trees.cancelled || cancel.is_cancelled();
    let diff = if cancelled {
        warn!("run cancelled; not writing a diff");
        DiffStatus::Skipped
    } else {
        emit_diff(
            effects.differ(),
            &trees.old_root,
            &trees.new_root,
            &request.output,
        )
    };

    cancel.release_scratch();
    let temp_path = temp.path().to_path_buf();
    if let Err(err) = temp.close() {
        warn!(path = %temp_path.display(), "failed to remove working directory: {err}");
    }

    Ok(RunReport {
        repository: repo.root,
        old: ManifestSummary::new(&request.old_ref, &old),
        new: ManifestSummary::new(&request.new_ref, &new),
        skip_unchanged: request.skip_unchanged,
        skipped: trees.skipped,
        outcomes: trees.outcomes,
        diff,
        output: request.output.clone(),
        cancelled,
    })
}
