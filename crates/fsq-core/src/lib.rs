//! Core library for fsq, a broker-less work queue built on POSIX filesystem
//! primitives
//!
//! A queue is a directory tree under a root:
//!
//! ```text
//! <root>/<queue>/{tmp,queue,done,fail}/<id>
//! <root>/<queue>/down
//! <root>/<queue>/trigger
//! <root>/<queue>/hosts/<host>/...
//! ```
//!
//! Producers publish items with [`ItemWriter`]; consumers walk a queue with
//! [`scan`] and resolve each [`WorkItem`] through the [`done`] module.
//! Correctness across processes comes from `O_EXCL`, `link`, `rename` and
//! `flock`; no component takes a directory-level lock.
//!
//! ```rust,no_run
//! use fsq_core::{Config, ItemWriter, QueueRef, ScanOptions, done, scan};
//!
//! # fn main() -> Result<(), fsq_core::FsqError> {
//! let config = Config::with_root("/var/spool/fsq");
//! let mut writer = ItemWriter::new(&config)?;
//! writer.senqueue(&QueueRef::new("mail"), b"hello", &["alpha", "beta"])?;
//!
//! for item in scan(&config, "mail", &ScanOptions::from_config(&config))? {
//!     let item = item?;
//!     done::success(item)?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod config;
pub mod control;
pub mod done;
pub mod error;
pub mod hosts;
pub mod install;
pub mod io;
pub mod item;
pub mod logging;
pub mod owner;
pub mod path;
pub mod scan;
pub mod writer;

pub use codec::Codec;
pub use config::{Config, ConfigError, ConfigOverrides};
pub use done::Completion;
pub use error::FsqError;
pub use install::InstallOptions;
pub use item::{Claim, ItemMeta, ItemPolicy, SkipReason, WorkItem};
pub use owner::Owner;
pub use path::{Layout, QueueRef};
pub use scan::{HostSelection, ScanIter, ScanOptions, scan};
pub use writer::{EnqueueOptions, ItemWriter};
