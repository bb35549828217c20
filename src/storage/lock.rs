//! Run lock
//!
//! Only one ingest may work on a state directory at a time. The lock is a
//! file created exclusively and holding the owner's PID; it is removed when
//! the guard drops.

use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
}

impl RunLock {
    pub fn acquire(path: &Path) -> Result<Self> {
        let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                let owner = std::fs::read_to_string(path).unwrap_or_default();
                anyhow::bail!(
                    "Another ingest run holds {:?} (pid {}); remove the file if that run is gone",
                    path,
                    owner.trim()
                );
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to create lock file {:?}", path))
            }
        };

        let lock = Self {
            path: path.to_path_buf(),
        };
        write!(file, "{}", std::process::id()).context("Failed to write lock file")?;
        debug!("Acquired run lock {:?}", path);
        Ok(lock)
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!("Failed to remove run lock {:?}: {}", self.path, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_lock_is_exclusive_and_released() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("ingest.lock");

        let lock = RunLock::acquire(&path).unwrap();
        assert!(path.exists());
        let err = RunLock::acquire(&path).unwrap_err();
        assert!(err.to_string().contains("Another ingest run"));

        drop(lock);
        assert!(!path.exists());
        assert!(RunLock::acquire(&path).is_ok());
    }
}
