//! Filesystem primitives for queue items
//!
//! Everything the queue guarantees is derived from these calls:
//!
//! - **Exclusive create**: `O_CREAT|O_EXCL` names a new item or fails with `EEXIST`
//! - **Publish**: hard-link then unlink, so an item is always visible under some name
//! - **Advisory locks**: non-blocking `flock`, released when the guard drops
//! - **FIFOs**: `mkfifo` and non-blocking one-byte writes for triggers
//!
//! Functions here return plain [`std::io::Result`]; callers wrap failures in
//! the [`FsqError`](crate::FsqError) variant naming the operation.

pub mod atomic;
pub mod lock;

pub use atomic::{
    FifoPull, copy_into, create_exclusive, is_not_found, make_fifo, pull_fifo, remove_if_exists,
};
pub use lock::{LockOutcome, LockedFile};
