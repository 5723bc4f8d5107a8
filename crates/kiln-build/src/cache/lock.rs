//! Run-scoped exclusive cache lock

use crate::error::{BuildError, BuildResult};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Lock file created inside the cache directory
pub const LOCK_FILE_NAME: &str = ".kiln-lock";

/// Exclusive hold on a cache directory
///
/// The lock file is created atomically and removed when the guard drops, so
/// early returns and panics release it too.
#[derive(Debug)]
pub struct CacheLock {
    path: PathBuf,
}

impl CacheLock {
    /// Acquire the lock on `cache_dir`, creating the directory if needed
    pub fn acquire(cache_dir: &Path) -> BuildResult<Self> {
        fs::create_dir_all(cache_dir).map_err(|e| BuildError::io(cache_dir, e))?;
        let path = cache_dir.join(LOCK_FILE_NAME);

        let file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                let owner = fs::read_to_string(&path)
                    .map(|s| format!("pid {}", s.trim()))
                    .unwrap_or_else(|_| "unknown owner".to_string());
                return Err(BuildError::CacheBusy {
                    path: cache_dir.to_path_buf(),
                    lock: path,
                    owner,
                });
            }
            Err(e) => return Err(BuildError::io(&path, e)),
        };

        Self::hold(path, file)
    }

    /// Own a freshly created lock file and record our pid in it
    ///
    /// The guard exists before the write, so a failed write removes the file.
    fn hold(path: PathBuf, mut owner: impl Write) -> BuildResult<Self> {
        let lock = Self { path };
        write!(owner, "{}", std::process::id()).map_err(|e| BuildError::io(&lock.path, e))?;
        debug!(lock = %lock.path.display(), "acquired cache lock");
        Ok(lock)
    }

    /// Path of the lock file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for CacheLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!(lock = %self.path.display(), error = %e, "failed to release cache lock");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_lock_is_exclusive() {
        let temp = TempDir::new().unwrap();
        let cache = temp.path().join("cache_kiln");

        let held = CacheLock::acquire(&cache).unwrap();
        assert!(held.path().exists());

        let err = CacheLock::acquire(&cache).unwrap_err();
        assert!(matches!(err, BuildError::CacheBusy { .. }));
    }

    #[test]
    fn test_lock_released_on_drop() {
        let temp = TempDir::new().unwrap();
        let cache = temp.path().join("cache_kiln");

        {
            let _held = CacheLock::acquire(&cache).unwrap();
        }
        assert!(!cache.join(LOCK_FILE_NAME).exists());
        assert!(CacheLock::acquire(&cache).is_ok());
    }

    struct BrokenWriter;

    impl Write for BrokenWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(ErrorKind::Other, "disk full"))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_failed_pid_write_releases_lock() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(LOCK_FILE_NAME);
        fs::write(&path, "").unwrap();

        let err = CacheLock::hold(path.clone(), BrokenWriter).unwrap_err();
        assert!(matches!(err, BuildError::IoError { .. }));
        assert!(!path.exists());
        assert!(CacheLock::acquire(temp.path()).is_ok());
    }

    #[test]
    fn test_lock_records_pid() {
        let temp = TempDir::new().unwrap();
        let held = CacheLock::acquire(temp.path()).unwrap();
        let contents = fs::read_to_string(held.path()).unwrap();
        assert_eq!(contents, std::process::id().to_string());
    }
}
