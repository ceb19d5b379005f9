use std::path::PathBuf;

use clap::{ArgAction, Parser};
use depdiff_core::domain::DEFAULT_LOCKFILE;

pub const DEFAULT_OUTPUT: &str = "dependency_code_diff.diff";

#[derive(Parser, Debug)]
#[command(
    name = "depdiff",
    author,
    version,
    about = "Diff the source code of the dependencies pinned at two git revisions"
)]
#[allow(clippy::struct_excessive_bools)]
pub struct DepdiffCli {
    #[arg(value_name = "REPO_PATH", help = "Path to the git repository")]
    pub repo_path: PathBuf,
    #[arg(value_name = "REF1", help = "Old revision (commit, tag or branch)")]
    pub ref1: String,
    #[arg(value_name = "REF2", help = "New revision (commit, tag or branch)")]
    pub ref2: String,
    #[arg(
        short,
        long,
        action = ArgAction::Count,
        help = "Increase logging (-v info, -vv debug)"
    )]
    pub verbose: u8,
    #[arg(long, help = "Force trace logging regardless of -v")]
    pub trace: bool,
    #[arg(
        long,
        overrides_with = "no_skip_unchanged",
        help = "Skip packages pinned identically at both revisions (default)"
    )]
    pub skip_unchanged: bool,
    #[arg(
        long,
        overrides_with = "skip_unchanged",
        help = "Fetch and diff every package, even unchanged ones"
    )]
    pub no_skip_unchanged: bool,
    #[arg(
        long,
        value_name = "PATH",
        default_value = DEFAULT_LOCKFILE,
        help = "Lock file path inside the repository"
    )]
    pub lockfile: String,
    #[arg(
        short,
        long,
        value_name = "FILE",
        default_value = DEFAULT_OUTPUT,
        help = "Where to write the diff"
    )]
    pub output: PathBuf,
    #[arg(
        short = 'j',
        long,
        value_name = "N",
        help = "Parallel fetch workers (default: available cores, at most 16)"
    )]
    pub jobs: Option<usize>,
    #[arg(long, help = "Print the run report as JSON")]
    pub json: bool,
    #[arg(short, long, help = "Suppress human output (errors still print to stderr)")]
    pub quiet: bool,
    #[arg(long, help = "Disable colored output")]
    pub no_color: bool,
}

impl DepdiffCli {
    pub fn skip_unchanged(&self) -> bool {
        !self.no_skip_unchanged
    }
}
