//! Exclusive create, hard-link publish and FIFO helpers

use std::ffi::CString;
use std::fs::{File, OpenOptions, Permissions};
use std::io::{Read, Write};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::Path;

pub fn is_not_found(err: &std::io::Error) -> bool {
    err.kind() == std::io::ErrorKind::NotFound
}

/// Create `path` with `O_CREAT|O_EXCL|O_WRONLY` and exactly `mode`
///
/// The mode is re-applied with `fchmod` so the process umask does not
/// narrow it.
pub fn create_exclusive(path: &Path, mode: u32) -> std::io::Result<File> {
    let file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(mode)
        .open(path)?;
    file.set_permissions(Permissions::from_mode(mode))?;
    Ok(file)
}

/// Unlink `path`, treating a missing file as already removed
pub fn remove_if_exists(path: &Path) -> std::io::Result<bool> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if is_not_found(&e) => Ok(false),
        Err(e) => Err(e),
    }
}

/// Stream `src` into a new exclusive file at `dst`, then fsync it
///
/// Used where a hard link is impossible (`EXDEV`). A partial copy is removed
/// on failure.
pub fn copy_into(src: &mut impl Read, dst: &Path, mode: u32) -> std::io::Result<File> {
    let mut file = create_exclusive(dst, mode)?;
    let copied = std::io::copy(src, &mut file)
        .and_then(|_| file.flush())
        .and_then(|_| file.sync_all());
    if let Err(e) = copied {
        let _ = std::fs::remove_file(dst);
        return Err(e);
    }
    Ok(file)
}

fn c_path(path: &Path) -> std::io::Result<CString> {
    CString::new(path.as_os_str().as_bytes())
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))
}

/// `mkfifo(2)`, then chmod to exactly `mode`
pub fn make_fifo(path: &Path, mode: u32) -> std::io::Result<()> {
    let c = c_path(path)?;
    let result = unsafe { libc::mkfifo(c.as_ptr(), mode as libc::mode_t) };
    if result != 0 {
        return Err(std::io::Error::last_os_error());
    }
    std::fs::set_permissions(path, Permissions::from_mode(mode))
}

/// Outcome of writing a wake-up byte into a FIFO
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FifoPull {
    /// Byte written, or a reader exists and the pipe is full
    Delivered,
    /// Nobody has the FIFO open for reading (`ENXIO`)
    NoListener,
}

/// Open `path` non-blocking write-only and write one NUL byte
pub fn pull_fifo(path: &Path) -> std::io::Result<FifoPull> {
    let opened = OpenOptions::new()
        .write(true)
        .append(true)
        .custom_flags(libc::O_NONBLOCK)
        .open(path);
    let mut fifo = match opened {
        Ok(f) => f,
        Err(e) if e.raw_os_error() == Some(libc::ENXIO) => return Ok(FifoPull::NoListener),
        Err(e) => return Err(e),
    };
    match fifo.write(b"\0") {
        Ok(_) => Ok(FifoPull::Delivered),
        Err(e)
            if e.raw_os_error() == Some(libc::EAGAIN)
                || e.raw_os_error() == Some(libc::EWOULDBLOCK) =>
        {
            Ok(FifoPull::Delivered)
        }
        Err(e) => Err(e),
    }
}
