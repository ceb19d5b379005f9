use std::ffi::OsString;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{error, info};

use crate::effects::TreeDiff;
use crate::process::{run_command_to_file, RunOutput};

#[derive(Debug, thiserror::Error)]
pub enum DiffError {
    #[error("failed to run the tree diff: {source}")]
    Invocation {
        #[source]
        source: io::Error,
    },
    #[error("tree diff exited with status {code}: {stderr}")]
    ToolFailed { code: i32, stderr: String },
    #[error("{action} {}: {source}", .path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl DiffError {
    pub(crate) fn io(action: &'static str, path: &Path, source: io::Error) -> Self {
        Self::Io {
            action,
            path: path.to_path_buf(),
            source,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DiffStatus {
    NoDifferences,
    DifferencesFound,
    Failed { reason: String },
    /// The run was cancelled before the trees were complete.
    Skipped,
}

/// `git diff --no-index` over two directories with every user-configurable
/// presentation knob pinned.
#[derive(Debug, Clone, Copy, Default)]
pub struct GitTreeDiff;

impl TreeDiff for GitTreeDiff {
    fn diff_trees(
        &self,
        workdir: &Path,
        old: &Path,
        new: &Path,
        output: &Path,
    ) -> Result<RunOutput, DiffError> {
        let file =
            File::create(output).map_err(|source| DiffError::io("creating", output, source))?;
        let args: Vec<OsString> = vec![
            "diff".into(),
            "--no-index".into(),
            "--no-color".into(),
            "--no-ext-diff".into(),
            "--no-textconv".into(),
            "--no-renames".into(),
            "--src-prefix=a/".into(),
            "--dst-prefix=b/".into(),
            "--".into(),
            old.into(),
            new.into(),
        ];
        run_command_to_file("git", &args, &[], Some(workdir), file)
            .map_err(|source| DiffError::Invocation { source })
    }
}

/// Diff the two assembled roots into `output`.
///
/// Exit status 1 ("differences found") counts as success.
///
/// # Errors
/// Returns an error when the differ cannot run or exits abnormally.
pub fn try_emit_diff(
    differ: &dyn TreeDiff,
    old_root: &Path,
    new_root: &Path,
    output: &Path,
) -> Result<DiffStatus, DiffError> {
    if let Some(parent) = output.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| DiffError::io("creating", parent, source))?;
    }
    let (workdir, old, new) = diff_operands(old_root, new_root);
    let result = differ.diff_trees(&workdir, &old, &new, output)?;
    match result.code {
        0 if !result.timed_out => Ok(DiffStatus::NoDifferences),
        1 if !result.timed_out => Ok(DiffStatus::DifferencesFound),
        code => Err(DiffError::ToolFailed {
            code,
            stderr: result.stderr.trim().to_string(),
        }),
    }
}

/// Lenient [`try_emit_diff`]: failures are logged and reported, never raised.
pub fn emit_diff(
    differ: &dyn TreeDiff,
    old_root: &Path,
    new_root: &Path,
    output: &Path,
) -> DiffStatus {
    match try_emit_diff(differ, old_root, new_root, output) {
        Ok(status) => {
            info!(output = %output.display(), ?status, "wrote dependency diff");
            status
        }
        Err(err) => {
            error!(output = %output.display(), "diff generation failed: {err}");
            DiffStatus::Failed {
                reason: err.to_string(),
            }
        }
    }
}

/// Sibling roots are diffed by name from their parent so the headers carry
/// `a/old/...` and `b/new/...` rather than temp paths.
fn diff_operands(old_root: &Path, new_root: &Path) -> (PathBuf, PathBuf, PathBuf) {
    match (
        old_root.parent(),
        new_root.parent(),
        old_root.file_name(),
        new_root.file_name(),
    ) {
        (Some(left), Some(right), Some(old), Some(new)) if left == right => {
            (left.to_path_buf(), PathBuf::from(old), PathBuf::from(new))
        }
        _ => (
            PathBuf::from("."),
            old_root.to_path_buf(),
            new_root.to_path_buf(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::Effects;
    use crate::git::test_support::git_available;
    use crate::test_support::FakeEffects;

    fn write(root: &Path, rel: &str, contents: &str) -> io::Result<()> {
        let path = root.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, contents)
    }

    #[test]
    fn sibling_roots_are_diffed_by_name() {
        let (workdir, old, new) = diff_operands(Path::new("/tmp/x/old"), Path::new("/tmp/x/new"));
        assert_eq!(workdir, Path::new("/tmp/x"));
        assert_eq!(old, Path::new("old"));
        assert_eq!(new, Path::new("new"));
    }

    #[test]
    fn differences_found_is_success() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        write(temp.path(), "old/a/lib.dart", "one\n")?;
        write(temp.path(), "new/a/lib.dart", "two\n")?;
        let output = temp.path().join("out").join("deps.diff");

        let status = emit_diff(
            FakeEffects::default().differ(),
            &temp.path().join("old"),
            &temp.path().join("new"),
            &output,
        );

        assert_eq!(status, DiffStatus::DifferencesFound);
        let text = fs::read_to_string(&output)?;
        assert!(text.contains("-one"), "{text}");
        assert!(text.contains("+two"), "{text}");
        Ok(())
    }

    #[test]
    fn abnormal_exit_is_reported_not_raised() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        fs::create_dir_all(temp.path().join("old"))?;
        fs::create_dir_all(temp.path().join("new"))?;

        let status = emit_diff(
            FakeEffects::default().with_broken_differ().differ(),
            &temp.path().join("old"),
            &temp.path().join("new"),
            &temp.path().join("deps.diff"),
        );

        let DiffStatus::Failed { reason } = status else {
            panic!("expected failure, got {status:?}");
        };
        assert!(reason.contains("status 2"), "{reason}");
        Ok(())
    }

    #[test]
    fn git_tree_diff_is_deterministic() -> anyhow::Result<()> {
        if !git_available() {
            eprintln!("skipping git tree diff test (git not found)");
            return Ok(());
        }
        let temp = tempfile::tempdir()?;
        write(temp.path(), "old/pkg/lib/a.dart", "const v = 1;\n")?;
        write(temp.path(), "old/gone/README.md", "bye\n")?;
        write(temp.path(), "new/pkg/lib/a.dart", "const v = 2;\n")?;
        fs::create_dir_all(temp.path().join("new"))?;
        let first = temp.path().join("first.diff");
        let second = temp.path().join("second.diff");
        let (old, new) = (temp.path().join("old"), temp.path().join("new"));

        assert_eq!(
            try_emit_diff(&GitTreeDiff, &old, &new, &first)?,
            DiffStatus::DifferencesFound
        );
        assert_eq!(
            try_emit_diff(&GitTreeDiff, &old, &new, &second)?,
            DiffStatus::DifferencesFound
        );

        let text = fs::read_to_string(&first)?;
        assert_eq!(text, fs::read_to_string(&second)?);
        assert!(text.contains("a/old/pkg/lib/a.dart"), "{text}");
        assert!(text.contains("+const v = 2;"), "{text}");
        assert!(text.contains("-bye"), "{text}");
        assert!(!text.contains(&temp.path().display().to_string()), "{text}");
        Ok(())
    }

    #[test]
    fn identical_trees_report_no_differences() -> anyhow::Result<()> {
        if !git_available() {
            eprintln!("skipping git tree diff test (git not found)");
            return Ok(());
        }
        let temp = tempfile::tempdir()?;
        write(temp.path(), "old/pkg/a.txt", "same\n")?;
        write(temp.path(), "new/pkg/a.txt", "same\n")?;
        let output = temp.path().join("deps.diff");

        let status = try_emit_diff(
            &GitTreeDiff,
            &temp.path().join("old"),
            &temp.path().join("new"),
            &output,
        )?;

        assert_eq!(status, DiffStatus::NoDifferences);
        assert!(fs::read_to_string(&output)?.is_empty());
        Ok(())
    }
}
