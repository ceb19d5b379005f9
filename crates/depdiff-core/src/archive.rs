use std::fs::File;
use std::io;
use std::path::Path;

use flate2::read::GzDecoder;
use tar::Archive;

/// Unpack a gzip-compressed tarball into `dest`.
///
/// Entries that would escape `dest` are skipped by `tar` itself.
pub(crate) fn unpack_tar_gz(archive: &Path, dest: &Path) -> io::Result<()> {
    let file = File::open(archive)?;
    let mut tar = Archive::new(GzDecoder::new(file));
    tar.unpack(dest)
}
