use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::debug;
use url::Url;

use crate::effects::GitClient;
use crate::process::{run_command, RunOutput};

const GIT: &str = "git";
// Never block on a credential prompt inside a worker.
const GIT_ENV: [(&str, &str); 1] = [("GIT_TERMINAL_PROMPT", "0")];

#[derive(Debug, thiserror::Error)]
pub enum GitError {
    #[error("git is required but failed to invoke it: {error}")]
    Invocation { error: String },
    #[error("`git {command}` failed (exit {code}): {stderr}")]
    CommandFailed {
        command: String,
        code: i32,
        stderr: String,
    },
    #[error("`git {command}` timed out after {}s", .timeout.as_secs())]
    TimedOut { command: String, timeout: Duration },
    #[error("refusing to check out `{revision}`: it would be read as an option")]
    OptionLikeRevision { revision: String },
}

/// Git driven through the `git` executable on `PATH`.
#[derive(Debug, Clone)]
pub struct SystemGit {
    timeout: Duration,
}

impl SystemGit {
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn run(&self, label: String, args: Vec<OsString>) -> Result<RunOutput, GitError> {
        debug!(command = %label, "running git");
        let output = run_command(GIT, &args, &GIT_ENV, None, Some(self.timeout)).map_err(|err| {
            GitError::Invocation {
                error: err.to_string(),
            }
        })?;
        if output.timed_out {
            return Err(GitError::TimedOut {
                command: label,
                timeout: self.timeout,
            });
        }
        if output.code != 0 {
            return Err(GitError::CommandFailed {
                command: label,
                code: output.code,
                stderr: output.stderr.trim().to_string(),
            });
        }
        Ok(output)
    }
}

impl GitClient for SystemGit {
    fn open(&self, path: &Path) -> Result<PathBuf, GitError> {
        let output = self.run(
            format!("-C {} rev-parse --show-toplevel", path.display()),
            vec![
                "-C".into(),
                path.into(),
                "rev-parse".into(),
                "--show-toplevel".into(),
            ],
        )?;
        Ok(PathBuf::from(output.stdout.trim()))
    }

    fn show(&self, repo: &Path, revision: &str, path: &str) -> Result<String, GitError> {
        let object = format!("{revision}:{path}");
        let output = self.run(
            format!("show {object}"),
            vec!["-C".into(), repo.into(), "show".into(), object.into()],
        )?;
        Ok(output.stdout)
    }

    fn clone_repo(&self, url: &str, dest: &Path) -> Result<(), GitError> {
        self.run(
            format!("clone {}", redact_repo_url(url)),
            vec![
                "clone".into(),
                "--quiet".into(),
                "--".into(),
                url.into(),
                dest.into(),
            ],
        )?;
        Ok(())
    }

    fn checkout(&self, repo: &Path, revision: &str) -> Result<(), GitError> {
        if revision.starts_with('-') {
            return Err(GitError::OptionLikeRevision {
                revision: revision.to_string(),
            });
        }
        self.run(
            format!("checkout {revision}"),
            vec![
                "-C".into(),
                repo.into(),
                "-c".into(),
                "advice.detachedHead=false".into(),
                "checkout".into(),
                "--quiet".into(),
                revision.into(),
                "--".into(),
            ],
        )?;
        Ok(())
    }
}

/// Strip credentials, query and fragment from a repository URL for logging.
pub fn redact_repo_url(url: &str) -> String {
    let url = url.trim();
    if let Ok(mut parsed) = Url::parse(url) {
        if parsed.has_host() {
            let _ = parsed.set_username("");
            let _ = parsed.set_password(None);
            parsed.set_query(None);
            parsed.set_fragment(None);
            return parsed.to_string();
        }
    }

    let mut redacted = url.to_string();
    if let Some(pos) = redacted.find('#') {
        redacted.truncate(pos);
    }
    if let Some(pos) = redacted.find('?') {
        redacted.truncate(pos);
    }
    if let Some(scheme_pos) = redacted.find("://") {
        let after_scheme = scheme_pos + 3;
        if let Some(at_rel) = redacted[after_scheme..].find('@') {
            let at_pos = after_scheme + at_rel;
            let next_slash = redacted[after_scheme..]
                .find('/')
                .map(|idx| after_scheme + idx);
            if next_slash.map_or(true, |slash| at_pos < slash) {
                redacted.replace_range(after_scheme..at_pos, "***");
            }
        }
    }

    redacted
}
