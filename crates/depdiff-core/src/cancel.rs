use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Shared flag flipped once by an interrupt handler and polled by workers.
///
/// It also remembers the working directory of the run in progress, so a hard
/// abort that never unwinds can still remove it.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
    scratch: Arc<Mutex<Option<PathBuf>>>,
}

impl CancellationToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    pub(crate) fn track_scratch(&self, path: &Path) {
        *self.scratch_slot() = Some(path.to_path_buf());
    }

    pub(crate) fn release_scratch(&self) {
        self.scratch_slot().take();
    }

    /// Delete the tracked working directory, if any, ahead of `process::exit`.
    ///
    /// # Errors
    /// Returns the removal error; the directory may be partially gone.
    pub fn remove_scratch(&self) -> io::Result<Option<PathBuf>> {
        let Some(path) = self.scratch_slot().take() else {
            return Ok(None);
        };
        match fs::remove_dir_all(&path) {
            Ok(()) => Ok(Some(path)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(Some(path)),
            Err(err) => Err(err),
        }
    }

    fn scratch_slot(&self) -> MutexGuard<'_, Option<PathBuf>> {
        match self.scratch.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
