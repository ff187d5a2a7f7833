//! Work items: parsed identifiers plus a locked handle on the payload

use crate::codec::Codec;
use crate::config::{Config, ExitCodes};
use crate::error::FsqError;
use crate::io::{LockOutcome, LockedFile, is_not_found};
use crate::path::{Layout, QueueRef};
use crate::writer::ItemFields;
use chrono::{NaiveDate, NaiveDateTime};
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Number of standard fields preceding caller arguments
const STANDARD_FIELDS: usize = 5;

/// Metadata decoded from an item identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemMeta {
    pub delimiter: char,
    /// Creation timestamp exactly as it appears in the identifier
    pub enqueued_raw: String,
    pub enqueued_at: NaiveDateTime,
    pub entropy: u64,
    pub pid: u32,
    pub hostname: String,
    pub tries: u32,
    pub arguments: Vec<String>,
}

impl ItemMeta {
    /// Decode `id`, failing on a short field list, a bad integer, or a
    /// timestamp that does not match `timefmt`
    pub fn parse(codec: &Codec, timefmt: &str, id: &str) -> Result<Self, FsqError> {
        let (delimiter, mut fields) = codec.deconstruct(id)?;
        if fields.len() < STANDARD_FIELDS {
            return Err(FsqError::MalformedEntry {
                id: id.to_string(),
                message: format!(
                    "expected at least {STANDARD_FIELDS} fields, found {}",
                    fields.len()
                ),
            });
        }
        let arguments = fields.split_off(STANDARD_FIELDS);
        let mut standard = fields.into_iter();
        let mut next = || standard.next().unwrap_or_default();

        let enqueued_raw = next();
        let enqueued_at = parse_time(timefmt, &enqueued_raw)?;
        let entropy = parse_number(id, "entropy", &next())?;
        let pid = parse_number(id, "pid", &next())?;
        let hostname = next();
        let tries = parse_number(id, "tries", &next())?;

        Ok(Self {
            delimiter,
            enqueued_raw,
            enqueued_at,
            entropy,
            pid,
            hostname,
            tries,
            arguments,
        })
    }

    pub(crate) fn fields(&self) -> ItemFields {
        ItemFields {
            now: self.enqueued_raw.clone(),
            entropy: self.entropy,
            pid: self.pid,
            host: self.hostname.clone(),
            tries: self.tries,
            arguments: self.arguments.clone(),
        }
    }
}

fn parse_number<T: std::str::FromStr>(id: &str, what: &str, value: &str) -> Result<T, FsqError> {
    value.parse().map_err(|_| FsqError::MalformedEntry {
        id: id.to_string(),
        message: format!("{what} is not a number: {value:?}"),
    })
}

/// Parse a timestamp field; date-only patterns resolve to midnight
pub(crate) fn parse_time(timefmt: &str, value: &str) -> Result<NaiveDateTime, FsqError> {
    if let Ok(at) = NaiveDateTime::parse_from_str(value, timefmt) {
        return Ok(at);
    }
    NaiveDate::parse_from_str(value, timefmt)
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .ok_or_else(|| FsqError::TimeFmt {
            timefmt: timefmt.to_string(),
            value: value.to_string(),
        })
}

/// Per-item locking and retry policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemPolicy {
    pub lock: bool,
    /// Seconds (0 = unbounded)
    pub ttl: u64,
    /// 0 = unbounded
    pub max_tries: u32,
}

impl ItemPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            lock: config.policy.lock,
            ttl: config.policy.ttl,
            max_tries: config.policy.max_tries,
        }
    }
}

/// Everything an item needs from the configuration to complete itself
#[derive(Debug, Clone)]
pub(crate) struct ItemContext {
    pub(crate) layout: Layout,
    pub(crate) codec: Codec,
    pub(crate) timefmt: String,
    pub(crate) enqueue_max_tries: u32,
    pub(crate) codes: ExitCodes,
}

impl ItemContext {
    pub(crate) fn new(config: &Config) -> Result<Self, FsqError> {
        Ok(Self {
            layout: config.layout(),
            codec: config.codec()?,
            timefmt: config.codec.timefmt.clone(),
            enqueue_max_tries: config.policy.enqueue_max_tries,
            codes: config.codes,
        })
    }
}

/// Why a claim attempt did not produce an item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Completed or moved by someone else before we opened it
    Vanished,
    /// Another process holds the lock
    Locked,
}

/// Outcome of trying to take one queue entry
#[derive(Debug)]
pub enum Claim {
    Claimed(WorkItem),
    Skipped(SkipReason),
}

/// One claimed queue entry
///
/// Holds the open descriptor (and the `flock`, when locking is enabled) for
/// as long as it lives. Completion functions in [`crate::done`] consume it,
/// so the lock is released on every exit path.
#[derive(Debug)]
pub struct WorkItem {
    queue: QueueRef,
    id: String,
    meta: ItemMeta,
    policy: ItemPolicy,
    handle: LockedFile,
    pub(crate) ctx: ItemContext,
}

impl WorkItem {
    /// Open and lock `id` in `queue` using the configured policy
    pub fn open(config: &Config, queue: &QueueRef, id: &str) -> Result<Self, FsqError> {
        Self::open_with(config, queue, id, ItemPolicy::from_config(config))
    }

    pub fn open_with(
        config: &Config,
        queue: &QueueRef,
        id: &str,
        policy: ItemPolicy,
    ) -> Result<Self, FsqError> {
        Self::open_in(ItemContext::new(config)?, queue, id, policy)
    }

    /// Like [`open_with`](Self::open_with), but reports "vanished" and
    /// "locked" as a [`Claim::Skipped`] instead of an error
    pub fn claim(
        config: &Config,
        queue: &QueueRef,
        id: &str,
        policy: ItemPolicy,
    ) -> Result<Claim, FsqError> {
        Self::claim_in(ItemContext::new(config)?, queue, id, policy)
    }

    pub(crate) fn claim_in(
        ctx: ItemContext,
        queue: &QueueRef,
        id: &str,
        policy: ItemPolicy,
    ) -> Result<Claim, FsqError> {
        match Self::open_in(ctx, queue, id, policy) {
            Ok(item) => Ok(Claim::Claimed(item)),
            Err(FsqError::NoSuchItem { .. }) => {
                debug!("skipping {id} in {queue}: vanished");
                Ok(Claim::Skipped(SkipReason::Vanished))
            }
            Err(FsqError::CannotLock { .. }) => {
                debug!("skipping {id} in {queue}: locked");
                Ok(Claim::Skipped(SkipReason::Locked))
            }
            Err(e) => Err(e),
        }
    }

    fn open_in(
        ctx: ItemContext,
        queue: &QueueRef,
        id: &str,
        policy: ItemPolicy,
    ) -> Result<Self, FsqError> {
        let path = ctx.layout.item(queue, id)?;
        let handle = match LockedFile::open(&path, policy.lock) {
            Ok(LockOutcome::Acquired(handle)) => handle,
            Ok(LockOutcome::WouldBlock) => return Err(FsqError::CannotLock { path }),
            Err(e) if is_not_found(&e) => {
                return Err(FsqError::NoSuchItem {
                    queue: queue.to_string(),
                    id: id.to_string(),
                });
            }
            Err(source) => return Err(FsqError::WorkItem { path, source }),
        };

        let meta = match ItemMeta::parse(&ctx.codec, &ctx.timefmt, id) {
            Ok(meta) => meta,
            Err(parse_err) => {
                // still holding the lock; move it out of the way so it cannot
                // jam the queue
                crate::done::fail_malformed(&ctx, queue, id, &path)?;
                drop(handle);
                return Err(parse_err);
            }
        };

        Ok(Self {
            queue: queue.clone(),
            id: id.to_string(),
            meta,
            policy,
            handle,
            ctx,
        })
    }

    pub fn queue(&self) -> &QueueRef {
        &self.queue
    }

    pub fn host(&self) -> Option<&str> {
        self.queue.host_name()
    }

    pub fn root(&self) -> &Path {
        self.ctx.layout.root()
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Current path of the item under `queue/`
    pub fn path(&self) -> Result<PathBuf, FsqError> {
        self.ctx.layout.item(&self.queue, &self.id)
    }

    pub fn meta(&self) -> &ItemMeta {
        &self.meta
    }

    pub fn enqueued_at(&self) -> NaiveDateTime {
        self.meta.enqueued_at
    }

    pub fn entropy(&self) -> u64 {
        self.meta.entropy
    }

    pub fn pid(&self) -> u32 {
        self.meta.pid
    }

    pub fn hostname(&self) -> &str {
        &self.meta.hostname
    }

    pub fn tries(&self) -> u32 {
        self.meta.tries
    }

    pub fn arguments(&self) -> &[String] {
        &self.meta.arguments
    }

    pub fn policy(&self) -> ItemPolicy {
        self.policy
    }

    pub fn is_locked(&self) -> bool {
        self.handle.is_locked()
    }

    /// Exit-code sentinels in effect when the item was claimed
    pub fn codes(&self) -> ExitCodes {
        self.ctx.codes
    }

    /// The payload, positioned wherever the last read left it
    pub fn payload(&mut self) -> &mut File {
        self.handle.file_mut()
    }
}
