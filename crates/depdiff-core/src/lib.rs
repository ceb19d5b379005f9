#![deny(clippy::all)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::too_many_arguments
)]

mod archive;
pub mod assemble;
mod cancel;
mod config;
pub mod diff;
mod effects;
pub mod fetch;
pub mod git;
pub mod manifest;
mod process;
mod progress;
mod registry;
pub mod run;
#[cfg(test)]
mod test_support;

pub use depdiff_domain as domain;

pub use crate::assemble::{assemble, AssembledTrees};
pub use crate::cancel::CancellationToken;
pub use crate::config::{
    Config, ConfigError, FetchConfig, NetworkConfig, DEFAULT_GIT_TIMEOUT, DEFAULT_HTTP_TIMEOUT,
    DEFAULT_REGISTRY_URL,
};
pub use crate::diff::{emit_diff, DiffError, DiffStatus, GitTreeDiff};
pub use crate::effects::{
    Effects, GitClient, RegistryClient, SharedEffects, SystemEffects, TreeDiff,
};
pub use crate::fetch::{fetch, FetchError, FetchOutcome, FetchStatus, FETCH_FAILED_MARKER};
pub use crate::git::{GitError, SystemGit};
pub use crate::manifest::{load_manifest, read_manifest, ManifestError, ManifestRead};
pub use crate::process::RunOutput;
pub use crate::registry::{Download, HttpRegistry};
pub use crate::run::{
    open_repository, run_diff, ManifestSummary, RepoHandle, RunError, RunReport, RunRequest,
};
