//! Startup lock
//!
//! One flock-guarded file at a well-known path serializes whole invocations
//! against each other. The lock is held for the lifetime of the guard and
//! released by the kernel even on abnormal exit.

use std::fs::OpenOptions;
use std::path::Path;

use nix::fcntl::{Flock, FlockArg};

use crate::error::LockError;

/// Holds the startup lock until dropped
#[derive(Debug)]
pub struct LockGuard {
    _flock: Flock<std::fs::File>,
}

/// Acquire the exclusive startup lock, failing fast on contention.
pub fn acquire(path: &Path) -> Result<LockGuard, LockError> {
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .open(path)
        .map_err(|e| LockError::IoError {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

    match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
        Ok(flock) => Ok(LockGuard { _flock: flock }),
        Err((_, nix::errno::Errno::EWOULDBLOCK)) => Err(LockError::Contended {
            path: path.to_path_buf(),
        }),
        Err((_, errno)) => Err(LockError::IoError {
            path: path.to_path_buf(),
            error: errno.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_lock_acquire_and_release() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".lock");

        let guard = acquire(&path).unwrap();
        drop(guard);

        // Released locks can be re-acquired.
        acquire(&path).unwrap();
    }

    #[test]
    fn test_lock_contention_detected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".lock");

        let _guard = acquire(&path).unwrap();
        assert!(matches!(
            acquire(&path),
            Err(LockError::Contended { .. })
        ));
    }
}
