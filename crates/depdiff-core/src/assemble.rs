use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;

use depdiff_domain::{reconcile, ManifestSnapshot, PackageDescriptor, Side};
use tracing::{debug, info, warn};

use crate::cancel::CancellationToken;
use crate::config::Config;
use crate::effects::SharedEffects;
use crate::fetch::{fetch, FetchOutcome, FetchStatus};
use crate::progress::ProgressReporter;
use crate::run::RunError;

const MAX_WORKERS: usize = 16;

/// The two package roots plus what happened while filling them.
#[derive(Debug, Clone)]
pub struct AssembledTrees {
    pub old_root: PathBuf,
    pub new_root: PathBuf,
    /// Packages left out because they were identical on both sides.
    pub skipped: Vec<String>,
    /// One entry per scheduled (package, side), sorted.
    pub outcomes: Vec<FetchOutcome>,
    pub cancelled: bool,
}

impl AssembledTrees {
    pub fn failures(&self) -> impl Iterator<Item = &FetchOutcome> + '_ {
        self.outcomes.iter().filter(|outcome| outcome.is_failed())
    }
}

struct FetchJob {
    side: Side,
    descriptor: PackageDescriptor,
    destination: PathBuf,
}

/// Build `{temp_root}/old` and `{temp_root}/new`, one subdirectory per
/// scheduled package, fetching on a bounded worker pool.
///
/// Returns once every job has reported. After cancellation, jobs not yet
/// started are reported as cancelled and never touch the filesystem.
///
/// # Errors
/// Fails only when the two roots cannot be created.
pub fn assemble(
    effects: &SharedEffects,
    config: &Config,
    old: &ManifestSnapshot,
    new: &ManifestSnapshot,
    temp_root: &Path,
    skip_unchanged: bool,
    cancel: &CancellationToken,
) -> Result<AssembledTrees, RunError> {
    let old_root = temp_root.join(Side::Old.dir_name());
    let new_root = temp_root.join(Side::New.dir_name());
    for root in [&old_root, &new_root] {
        fs::create_dir_all(root).map_err(|source| RunError::Workspace {
            path: root.clone(),
            source,
        })?;
    }

    let plan = reconcile(old, new, skip_unchanged);
    let jobs: Vec<FetchJob> = plan
        .jobs()
        .map(|(side, descriptor)| FetchJob {
            side,
            descriptor: descriptor.clone(),
            destination: temp_root.join(side.dir_name()).join(&descriptor.name),
        })
        .collect();
    info!(
        scheduled = plan.scheduled.len(),
        skipped = plan.skipped.len(),
        jobs = jobs.len(),
        "assembling dependency trees"
    );

    let mut outcomes = run_jobs(effects, config, jobs, cancel);
    outcomes.sort_by(|a, b| a.package.cmp(&b.package).then(a.side.cmp(&b.side)));
    let cancelled = outcomes
        .iter()
        .any(|outcome| outcome.status == FetchStatus::Cancelled);

    Ok(AssembledTrees {
        old_root,
        new_root,
        skipped: plan.skipped,
        outcomes,
        cancelled,
    })
}

fn run_jobs(
    effects: &SharedEffects,
    config: &Config,
    jobs: Vec<FetchJob>,
    cancel: &CancellationToken,
) -> Vec<FetchOutcome> {
    if jobs.is_empty() {
        return Vec::new();
    }

    let total = jobs.len();
    let progress = ProgressReporter::bar("Processing packages", total);
    let worker_count = worker_count(config.fetch().workers, total);
    debug!(workers = worker_count, jobs = total, "starting fetch workers");

    let (job_tx, job_rx) = mpsc::channel();
    for job in jobs {
        if job_tx.send(job).is_err() {
            break;
        }
    }
    drop(job_tx);

    let job_rx = Arc::new(Mutex::new(job_rx));
    let (result_tx, result_rx) = mpsc::channel();
    let mut handles = Vec::with_capacity(worker_count);
    for _ in 0..worker_count {
        let work_rx = Arc::clone(&job_rx);
        let result_tx = result_tx.clone();
        let effects = Arc::clone(effects);
        let config = config.clone();
        let cancel = cancel.clone();
        handles.push(thread::spawn(move || loop {
            let job: FetchJob = {
                let guard = match work_rx.lock() {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                };
                match guard.recv() {
                    Ok(job) => job,
                    Err(_) => break,
                }
            };

            let outcome = if cancel.is_cancelled() {
                FetchOutcome {
                    package: job.descriptor.name.clone(),
                    side: job.side,
                    destination: job.destination,
                    status: FetchStatus::Cancelled,
                }
            } else {
                fetch(
                    effects.as_ref(),
                    &config,
                    job.side,
                    &job.descriptor,
                    &job.destination,
                )
            };
            if result_tx.send(outcome).is_err() {
                break;
            }
        }));
    }
    drop(result_tx);

    let mut outcomes = Vec::with_capacity(total);
    for outcome in result_rx {
        progress.increment();
        outcomes.push(outcome);
    }
    for handle in handles {
        if handle.join().is_err() {
            warn!("a fetch worker panicked");
        }
    }

    let failed = outcomes.iter().filter(|outcome| outcome.is_failed()).count();
    progress.finish(format!(
        "Processed {} packages ({failed} failed)",
        outcomes.len()
    ));
    outcomes
}

/// Requested count (or available parallelism), clamped to 1..=16 and never
/// more than there are jobs.
fn worker_count(requested: Option<usize>, jobs: usize) -> usize {
    let available = thread::available_parallelism()
        .map(std::num::NonZeroUsize::get)
        .unwrap_or(4);
    requested
        .unwrap_or(available)
        .clamp(1, MAX_WORKERS)
        .min(jobs.max(1))
}
