//! Cross-process advisory lock on a community document.
//!
//! Each apply holds the lock from checkpoint to commit or revert, so two
//! `voyager` processes never interleave on the same document. The lock is
//! an `flock` on `<community>.json.lock` next to the document and is
//! released when the guard drops.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use tracing::debug;

use super::StoreError;

/// Held lock on one document. Dropping it releases the lock.
#[derive(Debug)]
pub struct DocumentLock {
    path: PathBuf,
    // Closing the descriptor releases the flock
    _file: File,
}

impl DocumentLock {
    /// Open (creating) the lock file and block until the exclusive lock is held.
    pub fn acquire(path: &Path) -> Result<Self, StoreError> {
        let file = fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)
            .map_err(|e| StoreError::Io(format!("cannot open lock {}: {e}", path.display())))?;

        fs2::FileExt::lock_exclusive(&file)
            .map_err(|e| StoreError::Io(format!("cannot lock {}: {e}", path.display())))?;
        debug!(lock = %path.display(), "Acquired document lock");

        Ok(Self {
            path: path.to_path_buf(),
            _file: file,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// `<dir>/<community>.json` -> `<dir>/<community>.json.lock`
pub(crate) fn lock_path(document: &Path) -> PathBuf {
    let mut name = document.as_os_str().to_owned();
    name.push(".lock");
    PathBuf::from(name)
}
