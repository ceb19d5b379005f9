use std::path::{Path, PathBuf};
use std::sync::Arc;

use url::Url;

use crate::config::Config;
use crate::diff::{DiffError, GitTreeDiff};
use crate::fetch::FetchError;
use crate::git::{GitError, SystemGit};
use crate::process::RunOutput;
use crate::registry::{Download, HttpRegistry};

pub trait GitClient: Send + Sync {
    /// Resolve the top level of the working tree containing `path`.
    fn open(&self, path: &Path) -> Result<PathBuf, GitError>;
    /// Read `path` as of `revision` without touching the working tree.
    fn show(&self, repo: &Path, revision: &str, path: &str) -> Result<String, GitError>;
    fn clone_repo(&self, url: &str, dest: &Path) -> Result<(), GitError>;
    fn checkout(&self, repo: &Path, revision: &str) -> Result<(), GitError>;
}

pub trait RegistryClient: Send + Sync {
    /// Stream `url` into the file at `dest`, hashing it on the way.
    fn download(&self, url: &Url, dest: &Path) -> Result<Download, FetchError>;
}

pub trait TreeDiff: Send + Sync {
    /// Diff `old` against `new` (both relative to `workdir`) into `output`.
    ///
    /// The raw exit status is returned; interpreting it is the caller's job.
    fn diff_trees(
        &self,
        workdir: &Path,
        old: &Path,
        new: &Path,
        output: &Path,
    ) -> Result<RunOutput, DiffError>;
}

pub trait Effects: Send + Sync {
    fn git(&self) -> &dyn GitClient;
    fn registry(&self) -> &dyn RegistryClient;
    fn differ(&self) -> &dyn TreeDiff;
}

pub type SharedEffects = Arc<dyn Effects>;

pub struct SystemEffects {
    git: Arc<SystemGit>,
    registry: Arc<HttpRegistry>,
    differ: Arc<GitTreeDiff>,
}

impl SystemEffects {
    /// Wire the real git executable and HTTP client using `config` timeouts.
    ///
    /// # Errors
    /// Returns an error when the HTTP client cannot be constructed.
    pub fn from_config(config: &Config) -> Result<Self, FetchError> {
        let network = config.network();
        Ok(Self {
            git: Arc::new(SystemGit::new(network.git_timeout)),
            registry: Arc::new(HttpRegistry::new(network.http_timeout)?),
            differ: Arc::new(GitTreeDiff),
        })
    }
}

impl Effects for SystemEffects {
    fn git(&self) -> &dyn GitClient {
        self.git.as_ref()
    }

    fn registry(&self) -> &dyn RegistryClient {
        self.registry.as_ref()
    }

    fn differ(&self) -> &dyn TreeDiff {
        self.differ.as_ref()
    }
}
