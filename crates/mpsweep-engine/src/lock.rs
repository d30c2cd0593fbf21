//! Cross-process lock shared with the volume attach/detach component.
//!
//! The lock is an exclusive `flock(2)` on `<dir>/<prefix><name>`; with the
//! defaults that is `/var/lib/nova/tmp/nova-connect_volume`, the same file the
//! compute service's external `connect_volume` lock uses. Dropping the guard
//! closes the file and releases the lock.

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{SweepError, SweepResult};

pub struct ExternalLock {
    /// Held open for the lifetime of the guard.
    _file: File,
    path: PathBuf,
}

impl fmt::Debug for ExternalLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExternalLock")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl ExternalLock {
    /// Block until the named lock is held.
    pub fn acquire(dir: &Path, prefix: &str, name: &str) -> SweepResult<Self> {
        let path = dir.join(format!("{prefix}{name}"));
        let lock_err = |source| SweepError::Lock {
            path: path.clone(),
            source,
        };

        fs::create_dir_all(dir).map_err(lock_err)?;
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(lock_err)?;

        debug!(path = %path.display(), "waiting for external lock");
        flock_exclusive(&file).map_err(lock_err)?;
        info!(path = %path.display(), "acquired external lock");

        Ok(Self { _file: file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ExternalLock {
    fn drop(&mut self) {
        debug!(path = %self.path.display(), "released external lock");
    }
}

fn flock_exclusive(file: &File) -> io::Result<()> {
    use std::os::unix::io::AsRawFd;
    let fd = file.as_raw_fd();
    loop {
        // SAFETY: fd is a valid descriptor owned by `file` for this call.
        let result = unsafe { libc::flock(fd, libc::LOCK_EX) };
        if result == 0 {
            return Ok(());
        }
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            return Err(err);
        }
    }
}
