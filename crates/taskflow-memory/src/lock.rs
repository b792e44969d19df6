//! Scoped advisory lock on a sibling `.lock` file.
//!
//! Unix uses `flock(LOCK_EX)` on an open descriptor; other platforms fall back
//! to an exclusively created lock file, evicting it if it looks abandoned.
//! Either way the lock is released when the guard drops.

#[cfg(unix)]
use std::fs::File;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use taskflow_core::error::TaskflowError;

/// Entry point for taking the store's file lock.
pub struct FileLock;

/// Holds the lock until dropped.
#[derive(Debug)]
pub struct FileLockGuard {
    #[cfg(unix)]
    file: File,
    #[cfg(not(unix))]
    path: PathBuf,
}

impl FileLock {
    /// Block until the exclusive lock on `path` is held.
    pub fn acquire(path: &Path) -> Result<FileLockGuard, TaskflowError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                TaskflowError::StorageIo(format!(
                    "failed to create lock directory {}: {e}",
                    parent.display()
                ))
            })?;
        }
        imp::acquire(path)
    }
}

/// `<file>.lock` next to `file`.
pub fn lock_path_for(file: &Path) -> PathBuf {
    let mut name = file
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".lock");
    file.with_file_name(name)
}

#[cfg(unix)]
mod imp {
    use super::*;
    use std::os::unix::io::AsRawFd;

    pub(super) fn acquire(path: &Path) -> Result<FileLockGuard, TaskflowError> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)
            .map_err(|e| {
                TaskflowError::StorageIo(format!("failed to open lock {}: {e}", path.display()))
            })?;

        loop {
            // SAFETY: the descriptor is owned by `file`, which outlives the call.
            let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX) };
            if rc == 0 {
                return Ok(FileLockGuard { file });
            }
            let err = std::io::Error::last_os_error();
            if err.kind() != std::io::ErrorKind::Interrupted {
                return Err(TaskflowError::StorageIo(format!(
                    "failed to lock {}: {err}",
                    path.display()
                )));
            }
        }
    }

    impl Drop for FileLockGuard {
        fn drop(&mut self) {
            // SAFETY: see `acquire`. Closing the descriptor would release it anyway.
            unsafe {
                libc::flock(self.file.as_raw_fd(), libc::LOCK_UN);
            }
        }
    }
}

#[cfg(not(unix))]
mod imp {
    use super::*;
    use std::io::Write;
    use std::time::{Duration, SystemTime};

    const STALE_AFTER: Duration = Duration::from_secs(30);
    const TIMEOUT: Duration = Duration::from_secs(10);

    pub(super) fn acquire(path: &Path) -> Result<FileLockGuard, TaskflowError> {
        let started = std::time::Instant::now();
        loop {
            match OpenOptions::new().write(true).create_new(true).open(path) {
                Ok(mut file) => {
                    let _ = write!(file, "{}", std::process::id());
                    return Ok(FileLockGuard {
                        path: path.to_path_buf(),
                    });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    evict_stale(path);
                    if started.elapsed() > TIMEOUT {
                        return Err(TaskflowError::StorageIo(format!(
                            "timed out waiting for lock {}",
                            path.display()
                        )));
                    }
                    std::thread::sleep(Duration::from_millis(5));
                }
                Err(e) => {
                    return Err(TaskflowError::StorageIo(format!(
                        "failed to create lock {}: {e}",
                        path.display()
                    )));
                }
            }
        }
    }

    fn evict_stale(path: &Path) {
        let age = std::fs::metadata(path)
            .and_then(|m| m.modified())
            .ok()
            .and_then(|modified| SystemTime::now().duration_since(modified).ok());
        if matches!(age, Some(age) if age > STALE_AFTER) {
            tracing::warn!("evicting stale lock {}", path.display());
            let _ = std::fs::remove_file(path);
        }
    }

    impl Drop for FileLockGuard {
        fn drop(&mut self) {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_lock_path_is_sibling() {
        let p = lock_path_for(Path::new("/data/user_memory.json"));
        assert_eq!(p, PathBuf::from("/data/user_memory.json.lock"));
    }

    #[test]
    fn test_reacquire_after_drop() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested/store.json.lock");
        let guard = FileLock::acquire(&path).unwrap();
        drop(guard);
        let _again = FileLock::acquire(&path).unwrap();
    }

    #[test]
    fn test_second_holder_waits_for_release() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("store.json.lock");
        let guard = FileLock::acquire(&path).unwrap();

        let acquired = Arc::new(AtomicBool::new(false));
        let flag = acquired.clone();
        let waiter_path = path.clone();
        let waiter = std::thread::spawn(move || {
            let _g = FileLock::acquire(&waiter_path).unwrap();
            flag.store(true, Ordering::SeqCst);
        });

        std::thread::sleep(Duration::from_millis(100));
        assert!(!acquired.load(Ordering::SeqCst), "lock must still be held");
        drop(guard);
        waiter.join().unwrap();
        assert!(acquired.load(Ordering::SeqCst));
    }
}
