//! In-memory stand-ins for git, the registry and the tree differ.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt::Write as _;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use sha2::{Digest, Sha256};
use url::Url;
use walkdir::WalkDir;

use crate::cancel::CancellationToken;
use crate::diff::DiffError;
use crate::effects::{Effects, GitClient, RegistryClient, TreeDiff};
use crate::fetch::FetchError;
use crate::git::GitError;
use crate::process::RunOutput;
use crate::registry::Download;

const ORIGIN_FILE: &str = ".git/depdiff-origin";

#[derive(Default)]
pub(crate) struct FakeEffects {
    git: FakeGit,
    registry: FakeRegistry,
    differ: FakeDiff,
}

impl FakeEffects {
    pub(crate) fn with_archive(mut self, name: &str, version: &str, bytes: Vec<u8>) -> Self {
        self.registry
            .archives
            .insert(archive_path(name, version), bytes);
        self
    }

    pub(crate) fn with_network_failure(mut self, name: &str, version: &str) -> Self {
        self.registry.broken.insert(archive_path(name, version));
        self
    }

    pub(crate) fn with_repo(mut self, url: &str, repo: FakeRepo) -> Self {
        self.git.remotes.insert(url.to_string(), repo);
        self
    }

    pub(crate) fn with_lockfile(mut self, revision: &str, path: &str, contents: &str) -> Self {
        self.git
            .blobs
            .insert((revision.to_string(), path.to_string()), contents.to_string());
        self
    }

    pub(crate) fn without_repository(mut self) -> Self {
        self.git.repository_missing = true;
        self
    }

    pub(crate) fn with_broken_differ(mut self) -> Self {
        self.differ.broken = true;
        self
    }

    /// The differ plays the second Ctrl-C: it removes whatever `token` tracks
    /// and records what was removed in `removed`.
    pub(crate) fn with_abort_during_diff(
        mut self,
        token: CancellationToken,
        removed: Arc<Mutex<Option<PathBuf>>>,
    ) -> Self {
        self.differ.abort = Some((token, removed));
        self
    }
}

impl Effects for FakeEffects {
    fn git(&self) -> &dyn GitClient {
        &self.git
    }

    fn registry(&self) -> &dyn RegistryClient {
        &self.registry
    }

    fn differ(&self) -> &dyn TreeDiff {
        &self.differ
    }
}

/// File contents per ref of a fake remote.
#[derive(Clone, Default)]
pub(crate) struct FakeRepo {
    refs: HashMap<String, Vec<(String, String)>>,
}

impl FakeRepo {
    pub(crate) fn with_ref(mut self, name: &str, files: &[(&str, &str)]) -> Self {
        self.refs.insert(
            name.to_string(),
            files
                .iter()
                .map(|(path, contents)| ((*path).to_string(), (*contents).to_string()))
                .collect(),
        );
        self
    }
}

#[derive(Default)]
struct FakeGit {
    repository_missing: bool,
    blobs: HashMap<(String, String), String>,
    remotes: HashMap<String, FakeRepo>,
}

fn failed(command: String, stderr: &str) -> GitError {
    GitError::CommandFailed {
        command,
        code: 128,
        stderr: stderr.to_string(),
    }
}

impl GitClient for FakeGit {
    fn open(&self, path: &Path) -> Result<PathBuf, GitError> {
        if self.repository_missing || !path.is_dir() {
            return Err(failed(
                format!("-C {} rev-parse --show-toplevel", path.display()),
                "fatal: not a git repository",
            ));
        }
        Ok(path.to_path_buf())
    }

    fn show(&self, _repo: &Path, revision: &str, path: &str) -> Result<String, GitError> {
        self.blobs
            .get(&(revision.to_string(), path.to_string()))
            .cloned()
            .ok_or_else(|| {
                failed(
                    format!("show {revision}:{path}"),
                    "fatal: invalid object name",
                )
            })
    }

    fn clone_repo(&self, url: &str, dest: &Path) -> Result<(), GitError> {
        if !self.remotes.contains_key(url) {
            return Err(failed(
                format!("clone {}", crate::git::redact_repo_url(url)),
                "fatal: repository not found",
            ));
        }
        let origin = dest.join(ORIGIN_FILE);
        fs::create_dir_all(dest.join(".git")).map_err(invocation)?;
        fs::write(origin, url).map_err(invocation)
    }

    fn checkout(&self, repo: &Path, revision: &str) -> Result<(), GitError> {
        let url = fs::read_to_string(repo.join(ORIGIN_FILE)).map_err(invocation)?;
        let files = self
            .remotes
            .get(&url)
            .and_then(|remote| remote.refs.get(revision))
            .ok_or_else(|| {
                failed(
                    format!("checkout {revision}"),
                    "error: pathspec did not match",
                )
            })?;
        for (path, contents) in files {
            let target = repo.join(path);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).map_err(invocation)?;
            }
            fs::write(target, contents).map_err(invocation)?;
        }
        Ok(())
    }
}

fn invocation(err: io::Error) -> GitError {
    GitError::Invocation {
        error: err.to_string(),
    }
}

/// Registry path the fetcher will request, encoded the same way.
fn archive_path(name: &str, version: &str) -> String {
    let registry = Url::parse("https://registry.invalid").expect("static url");
    crate::fetch::hosted_url(&registry, name, version)
        .expect("hosted url")
        .path()
        .to_string()
}

#[derive(Default)]
struct FakeRegistry {
    archives: HashMap<String, Vec<u8>>,
    broken: HashSet<String>,
}

impl RegistryClient for FakeRegistry {
    fn download(&self, url: &Url, dest: &Path) -> Result<Download, FetchError> {
        if self.broken.contains(url.path()) {
            return Err(FetchError::Stream {
                url: url.to_string(),
                source: io::Error::new(io::ErrorKind::ConnectionReset, "connection reset"),
            });
        }
        let Some(bytes) = self.archives.get(url.path()) else {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: 404,
            });
        };
        fs::write(dest, bytes).map_err(|source| FetchError::io("writing", dest, source))?;
        Ok(Download {
            path: dest.to_path_buf(),
            sha256: hex::encode(Sha256::digest(bytes)),
            size: bytes.len() as u64,
        })
    }
}

/// A line-oriented differ over the two trees, good enough to assert on.
#[derive(Default)]
struct FakeDiff {
    broken: bool,
    abort: Option<(CancellationToken, Arc<Mutex<Option<PathBuf>>>)>,
}

fn read_tree(root: &Path) -> BTreeMap<String, String> {
    WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| {
            let rel = entry.path().strip_prefix(root).ok()?.to_string_lossy().into_owned();
            let contents = fs::read_to_string(entry.path()).ok()?;
            Some((rel, contents))
        })
        .collect()
}

impl TreeDiff for FakeDiff {
    fn diff_trees(
        &self,
        workdir: &Path,
        old: &Path,
        new: &Path,
        output: &Path,
    ) -> Result<RunOutput, DiffError> {
        if let Some((token, removed)) = &self.abort {
            let path = token.remove_scratch().expect("remove scratch");
            *removed.lock().expect("removed slot") = path;
            return Ok(RunOutput {
                code: 0,
                stdout: String::new(),
                stderr: String::new(),
                timed_out: false,
            });
        }
        if self.broken {
            return Ok(RunOutput {
                code: 2,
                stdout: String::new(),
                stderr: "fatal: differ exploded".into(),
                timed_out: false,
            });
        }
        let before = read_tree(&workdir.join(old));
        let after = read_tree(&workdir.join(new));
        let paths: std::collections::BTreeSet<&String> =
            before.keys().chain(after.keys()).collect();
        let mut text = String::new();
        for path in paths {
            let (left, right) = (before.get(path), after.get(path));
            if left == right {
                continue;
            }
            let _ = writeln!(text, "diff a/{0}/{path} b/{1}/{path}", old.display(), new.display());
            for line in left.map(String::as_str).unwrap_or_default().lines() {
                let _ = writeln!(text, "-{line}");
            }
            for line in right.map(String::as_str).unwrap_or_default().lines() {
                let _ = writeln!(text, "+{line}");
            }
        }
        fs::write(output, &text).map_err(|source| DiffError::io("writing", output, source))?;
        Ok(RunOutput {
            code: i32::from(!text.is_empty()),
            stdout: String::new(),
            stderr: String::new(),
            timed_out: false,
        })
    }
}
