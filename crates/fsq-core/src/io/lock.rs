//! Non-blocking advisory item locks

use std::fs::File;
use std::os::unix::fs::MetadataExt;
use std::os::unix::io::AsRawFd;
use std::path::Path;

/// Open file handle, optionally holding an exclusive `flock`
///
/// The lock (if any) is released and the descriptor closed when the guard
/// drops.
#[derive(Debug)]
pub struct LockedFile {
    file: File,
    locked: bool,
}

/// Result of a non-blocking lock attempt
#[derive(Debug)]
pub enum LockOutcome {
    Acquired(LockedFile),
    /// Someone else holds the lock
    WouldBlock,
}

impl LockedFile {
    /// Open `path` read-only, taking `LOCK_EX|LOCK_NB` when `lock` is set
    pub fn open(path: &Path, lock: bool) -> std::io::Result<LockOutcome> {
        let file = File::open(path)?;
        if !lock {
            return Ok(LockOutcome::Acquired(Self {
                file,
                locked: false,
            }));
        }

        let result = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
        if result == 0 {
            let locked = Self { file, locked: true };
            // the previous holder may have moved the entry away before we
            // got the lock; then we hold a stale inode
            if !locked.still_at(path)? {
                return Err(std::io::Error::from(std::io::ErrorKind::NotFound));
            }
            return Ok(LockOutcome::Acquired(locked));
        }

        let err = std::io::Error::last_os_error();
        let would_block = err.raw_os_error() == Some(libc::EWOULDBLOCK)
            || err.raw_os_error() == Some(libc::EAGAIN);
        if would_block {
            Ok(LockOutcome::WouldBlock)
        } else {
            Err(err)
        }
    }

    fn still_at(&self, path: &Path) -> std::io::Result<bool> {
        let held = self.file.metadata()?;
        match std::fs::metadata(path) {
            Ok(current) => Ok(current.dev() == held.dev() && current.ino() == held.ino()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub fn file(&self) -> &File {
        &self.file
    }

    pub fn file_mut(&mut self) -> &mut File {
        &mut self.file
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }
}

impl Drop for LockedFile {
    fn drop(&mut self) {
        if self.locked {
            unsafe {
                libc::flock(self.file.as_raw_fd(), libc::LOCK_UN);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn acquired(outcome: LockOutcome) -> LockedFile {
        match outcome {
            LockOutcome::Acquired(f) => f,
            LockOutcome::WouldBlock => panic!("expected lock to be acquired"),
        }
    }

    #[test]
    fn test_second_lock_would_block() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("item");
        fs::write(&path, b"x").unwrap();

        let first = acquired(LockedFile::open(&path, true).unwrap());
        assert!(first.is_locked());
        assert!(matches!(
            LockedFile::open(&path, true).unwrap(),
            LockOutcome::WouldBlock
        ));

        drop(first);
        let again = acquired(LockedFile::open(&path, true).unwrap());
        assert!(again.is_locked());
    }

    #[test]
    fn test_unlocked_open_ignores_holder() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("item");
        fs::write(&path, b"x").unwrap();

        let _held = acquired(LockedFile::open(&path, true).unwrap());
        let plain = acquired(LockedFile::open(&path, false).unwrap());
        assert!(!plain.is_locked());
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let err = LockedFile::open(&temp_dir.path().join("gone"), true).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::NotFound);
    }
}
