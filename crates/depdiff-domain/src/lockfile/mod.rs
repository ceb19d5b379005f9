pub(crate) mod io;
pub(crate) mod types;

pub use io::{parse_lockfile, LockfileError};
pub use types::{
    IgnoreReason, IgnoredEntry, ManifestSnapshot, PackageDescriptor, PackageOrigin, SOURCE_GIT,
    SOURCE_HOSTED,
};
