//! Error types for queue operations

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while manipulating a queue
///
/// I/O-bearing variants keep the underlying [`std::io::Error`] so the OS
/// error code survives to the caller (see [`FsqError::raw_os_error`]).
#[derive(Error, Debug)]
pub enum FsqError {
    /// Illegal queue, host, or item name
    #[error("illegal path name: {name:?}")]
    Path { name: String },

    /// Bad codec configuration or malformed encoded text
    #[error("encode error: {message}")]
    Encode { message: String },

    /// Input that cannot be represented as a filesystem name
    #[error("cannot coerce {what}: {value}")]
    Coerce { what: &'static str, value: String },

    /// Timestamp pattern is invalid, or a timestamp does not match it
    #[error("invalid date string {value:?} for time format {timefmt:?}")]
    TimeFmt { timefmt: String, value: String },

    /// Queue control (down/up/trigger) failed
    #[error("cannot configure {path}: {source}")]
    Configure {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Enqueue pipeline failed
    #[error("cannot enqueue at {path}: {source}")]
    Enqueue {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Naming collisions exhausted the enqueue attempt budget
    #[error("max tries exhausted for {path} after {attempts} attempts")]
    EnqueueMaxTries { path: PathBuf, attempts: u32 },

    /// Item could not be opened
    #[error("cannot open item {path}: {source}")]
    WorkItem {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Item no longer exists in the queue
    #[error("no such item in queue {queue}: {id}")]
    NoSuchItem { queue: String, id: String },

    /// Another process holds the advisory lock on the item
    #[error("cannot lock item {path}: already locked")]
    CannotLock { path: PathBuf },

    /// Identifier does not decode into the expected fields
    #[error("malformed entry {id:?}: {message}")]
    MalformedEntry { id: String, message: String },

    /// TTL elapsed; the item was failed permanently
    #[error("TTL expired ({ttl}s) for item {id}; failed permanently")]
    TtlExpired { id: String, ttl: u64 },

    /// Try budget exhausted; the item was failed permanently
    #[error("max tries exceeded ({max_tries}) for item {id}; failed permanently")]
    MaxTries { id: String, max_tries: u32 },

    /// Queue directory could not be listed
    #[error("cannot scan {path}: {source}")]
    Scan {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Queue (or host sub-queue) is down
    #[error("queue {queue} is down")]
    Down { queue: String },

    /// Success transition failed
    #[error("cannot mark item done at {path}: {source}")]
    Done {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failure transition failed
    #[error("cannot fail item at {path}: {source}")]
    Fail {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Writing to a trigger FIFO failed
    #[error("cannot pull trigger {path}: {source}")]
    TriggerPull {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Trigger FIFO has no reader
    #[error("no listener for trigger {path}")]
    NoListener { path: PathBuf },

    /// Installing or uninstalling a queue failed
    #[error("cannot install {path}: {source}")]
    Install {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Install target already exists
    #[error("queue exists: {path}")]
    QueueExists { path: PathBuf },

    /// Host sub-queues could not be listed or resolved
    #[error("cannot read hosts at {path}: {source}")]
    Hosts {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Distributing an item to host sub-queues failed
    #[error("cannot reenqueue {id} to host {host}: {source}")]
    Reenqueue {
        id: String,
        host: String,
        #[source]
        source: Box<FsqError>,
    },
}

impl FsqError {
    /// OS error code carried by this error, if any
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            FsqError::Configure { source, .. }
            | FsqError::Enqueue { source, .. }
            | FsqError::WorkItem { source, .. }
            | FsqError::Scan { source, .. }
            | FsqError::Done { source, .. }
            | FsqError::Fail { source, .. }
            | FsqError::TriggerPull { source, .. }
            | FsqError::Install { source, .. }
            | FsqError::Hosts { source, .. } => source.raw_os_error(),
            FsqError::NoSuchItem { .. } => Some(libc::ENOENT),
            FsqError::CannotLock { .. } | FsqError::EnqueueMaxTries { .. } | FsqError::Down { .. } => {
                Some(libc::EAGAIN)
            }
            FsqError::NoListener { .. } => Some(libc::ENXIO),
            FsqError::QueueExists { .. } => Some(libc::EEXIST),
            FsqError::Path { .. } | FsqError::Encode { .. } | FsqError::Coerce { .. } => {
                Some(libc::EINVAL)
            }
            FsqError::TtlExpired { .. } => Some(libc::ETIMEDOUT),
            FsqError::MaxTries { .. } => Some(libc::ELOOP),
            FsqError::Reenqueue { source, .. } => source.raw_os_error(),
            FsqError::TimeFmt { .. } | FsqError::MalformedEntry { .. } => None,
        }
    }

    /// True for the races a scanner resolves by moving on: the item was
    /// already completed by someone else, or someone else holds its lock.
    pub fn is_transient_claim_failure(&self) -> bool {
        matches!(self, FsqError::NoSuchItem { .. } | FsqError::CannotLock { .. })
    }

    /// True when the retry budget was exhausted and the item was escalated
    /// to permanent failure.
    pub fn is_escalation(&self) -> bool {
        matches!(self, FsqError::TtlExpired { .. } | FsqError::MaxTries { .. })
    }

    /// True when the item identifier itself could not be parsed.
    pub fn is_malformed(&self) -> bool {
        matches!(self, FsqError::MalformedEntry { .. } | FsqError::TimeFmt { .. })
    }
}
