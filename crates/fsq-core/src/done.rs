//! Completion state machine
//!
//! ```text
//! queue/<id> --success---> done/<id>
//!            --fail_tmp--> tmp/<id'> --> queue/<id'>   (tries + 1)
//!            --fail_perm-> fail/<id>
//! ```
//!
//! Every move is hard-link then unlink, so an item is visible under some
//! name throughout. Each function consumes the [`WorkItem`]; its lock is
//! released when the function returns.

use crate::error::FsqError;
use crate::io::remove_if_exists;
use crate::item::{ItemContext, WorkItem};
use crate::path::QueueRef;
use crate::writer::{EntropyMode, ItemFields, format_time, local_hostname, place_unique};
use chrono::{NaiveDateTime, TimeDelta};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Where an item ended up after [`done`] or [`fail`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// Moved to `done/` under this name
    Done(String),
    /// Back in `queue/` under this name
    Retried(String),
    /// Moved to `fail/` under this name
    Failed(String),
}

impl Completion {
    pub fn id(&self) -> &str {
        match self {
            Completion::Done(id) | Completion::Retried(id) | Completion::Failed(id) => id,
        }
    }
}

fn done_err(path: PathBuf, source: std::io::Error) -> FsqError {
    FsqError::Done { path, source }
}

fn fail_err(path: PathBuf, source: std::io::Error) -> FsqError {
    FsqError::Fail { path, source }
}

/// Drop the old name of a moved item; an unlocked peer may have done it already
fn unlink_moved(src: &Path, wrap: fn(PathBuf, std::io::Error) -> FsqError) -> Result<(), FsqError> {
    remove_if_exists(src).map_err(|e| wrap(src.to_path_buf(), e))?;
    Ok(())
}

/// Link `src` into `dir` under `id`, or under `fields` with bumped entropy if
/// `id` is already taken there
fn link_preserving(
    ctx: &ItemContext,
    src: &Path,
    dir: &Path,
    id: &str,
    mut fields: ItemFields,
    wrap: fn(PathBuf, std::io::Error) -> FsqError,
) -> Result<String, FsqError> {
    let dst = dir.join(id);
    match std::fs::hard_link(src, &dst) {
        Ok(()) => return Ok(id.to_string()),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {}
        Err(e) => return Err(wrap(dst, e)),
    }
    fields.entropy = fields.entropy.checked_add(1).ok_or_else(|| FsqError::EnqueueMaxTries {
        path: dir.to_path_buf(),
        attempts: 1,
    })?;
    let (name, ()) = place_unique(
        dir,
        &ctx.codec,
        &mut fields,
        EntropyMode::Flexible,
        ctx.enqueue_max_tries,
        |path| std::fs::hard_link(src, path),
        wrap,
    )?;
    Ok(name)
}

/// Mark an item successfully processed
pub fn success(item: WorkItem) -> Result<String, FsqError> {
    let ctx = &item.ctx;
    let src = item.path()?;
    let done_dir = ctx.layout.done(item.queue())?;

    let linked = link_preserving(ctx, &src, &done_dir, item.id(), item.meta().fields(), done_err);
    let name = match linked {
        Ok(name) => name,
        Err(e @ FsqError::EnqueueMaxTries { .. }) => {
            fail_perm(item)?;
            return Err(e);
        }
        Err(e) => return Err(e),
    };
    unlink_moved(&src, done_err)?;
    debug!("{} done as {name} in {}", item.id(), item.queue());
    Ok(name)
}

/// Retry an item later, escalating to [`fail_perm`] when its budget is spent
pub fn fail_tmp(item: WorkItem) -> Result<String, FsqError> {
    fail_tmp_at(item, chrono::Local::now().naive_local())
}

/// [`fail_tmp`] evaluated as if the current local time were `now`
pub fn fail_tmp_at(item: WorkItem, now: NaiveDateTime) -> Result<String, FsqError> {
    let tries = item.tries() + 1;
    if let Err(exhausted) = check_budget(&item, tries, now) {
        debug!("{} in {} exhausted its budget: {exhausted}", item.id(), item.queue());
        fail_perm(item)?;
        return Err(exhausted);
    }

    match requeue(&item, tries) {
        Ok(name) => {
            debug!("{} retried as {name} in {}", item.id(), item.queue());
            Ok(name)
        }
        Err(e @ FsqError::EnqueueMaxTries { .. }) => {
            fail_perm(item)?;
            Err(e)
        }
        Err(e) => Err(e),
    }
}

/// Ok while `tries` and the age of the item are within the item's policy
fn check_budget(item: &WorkItem, tries: u32, now: NaiveDateTime) -> Result<(), FsqError> {
    let policy = item.policy();
    if policy.max_tries > 0 && tries >= policy.max_tries {
        return Err(FsqError::MaxTries {
            id: item.id().to_string(),
            max_tries: policy.max_tries,
        });
    }
    if policy.ttl > 0 && ttl_expired(item.enqueued_at(), policy.ttl, now) {
        return Err(FsqError::TtlExpired {
            id: item.id().to_string(),
            ttl: policy.ttl,
        });
    }
    Ok(())
}

/// True when `now > enqueued_at + ttl`
pub(crate) fn ttl_expired(enqueued_at: NaiveDateTime, ttl: u64, now: NaiveDateTime) -> bool {
    let deadline = i64::try_from(ttl)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .and_then(|ttl| enqueued_at.checked_add_signed(ttl));
    match deadline {
        Some(deadline) => now > deadline,
        None => false,
    }
}

/// queue/<id> -> tmp/<id'> -> queue/<id'> with the try count bumped
fn requeue(item: &WorkItem, tries: u32) -> Result<String, FsqError> {
    let ctx = &item.ctx;
    let src = item.path()?;
    let tmp_dir = ctx.layout.tmp(item.queue())?;
    let queue_dir = ctx.layout.queue(item.queue())?;

    let mut fields = item.meta().fields();
    fields.tries = tries;
    let (staged, ()) = place_unique(
        &tmp_dir,
        &ctx.codec,
        &mut fields,
        EntropyMode::Flexible,
        ctx.enqueue_max_tries,
        |path| {
            let live = path
                .file_name()
                .is_some_and(|name| queue_dir.join(name).symlink_metadata().is_ok());
            if live {
                return Err(std::io::Error::from(ErrorKind::AlreadyExists));
            }
            std::fs::hard_link(&src, path)
        },
        fail_err,
    )?;
    let staged = tmp_dir.join(staged);
    unlink_moved(&src, fail_err)?;

    let (name, ()) = place_unique(
        &queue_dir,
        &ctx.codec,
        &mut fields,
        EntropyMode::Flexible,
        ctx.enqueue_max_tries,
        |path| std::fs::hard_link(&staged, path),
        fail_err,
    )?;
    unlink_moved(&staged, fail_err)?;
    Ok(name)
}

/// Move an item to `fail/` for good
pub fn fail_perm(item: WorkItem) -> Result<String, FsqError> {
    let ctx = &item.ctx;
    let src = item.path()?;
    let fail_dir = ctx.layout.fail(item.queue())?;
    let name = link_preserving(ctx, &src, &fail_dir, item.id(), item.meta().fields(), fail_err)?;
    unlink_moved(&src, fail_err)?;
    debug!("{} failed as {name} in {}", item.id(), item.queue());
    Ok(name)
}

/// Permanently fail an entry whose identifier could not be parsed
///
/// Keeps the original name when it is free in `fail/`, otherwise builds a
/// fresh standard name.
pub(crate) fn fail_malformed(
    ctx: &ItemContext,
    queue: &QueueRef,
    id: &str,
    src: &Path,
) -> Result<String, FsqError> {
    let fail_dir = ctx.layout.fail(queue)?;
    let name = match std::fs::hard_link(src, fail_dir.join(id)) {
        Ok(()) => id.to_string(),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            let mut fields = ItemFields {
                now: format_time(&ctx.timefmt, &chrono::Local::now().naive_local())?,
                entropy: 0,
                pid: std::process::id(),
                host: local_hostname()?,
                tries: 0,
                arguments: Vec::new(),
            };
            let (name, ()) = place_unique(
                &fail_dir,
                &ctx.codec,
                &mut fields,
                EntropyMode::Flexible,
                ctx.enqueue_max_tries,
                |path| std::fs::hard_link(src, path),
                fail_err,
            )?;
            name
        }
        Err(e) => return Err(fail_err(fail_dir.join(id), e)),
    };
    unlink_moved(src, fail_err)?;
    debug!("malformed {id} failed as {name} in {queue}");
    Ok(name)
}

/// Fail an item: temporarily when `code` is the fail-tmp sentinel,
/// permanently otherwise
pub fn fail(item: WorkItem, code: i32) -> Result<Completion, FsqError> {
    if code == item.codes().fail_tmp {
        fail_tmp(item).map(Completion::Retried)
    } else {
        fail_perm(item).map(Completion::Failed)
    }
}

/// Complete an item according to an exit-code-like `code`
pub fn done(item: WorkItem, code: i32) -> Result<Completion, FsqError> {
    if code == item.codes().success {
        success(item).map(Completion::Done)
    } else {
        fail(item, code)
    }
}
