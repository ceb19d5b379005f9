#![deny(clippy::all)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::must_use_candidate
)]

pub mod lockfile;
pub mod reconcile;

pub use lockfile::{
    parse_lockfile, IgnoreReason, IgnoredEntry, LockfileError, ManifestSnapshot,
    PackageDescriptor, PackageOrigin,
};
pub use reconcile::{reconcile, PackageChange, ReconciliationPlan, ScheduledPackage, Side};

/// Lock description read from each revision unless overridden.
pub const DEFAULT_LOCKFILE: &str = "pubspec.lock";
