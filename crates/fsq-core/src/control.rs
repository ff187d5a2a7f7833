//! Queue control: down markers and trigger FIFOs
//!
//! A queue is down while `<queue>/down` exists; scans refuse to hand out its
//! items. A trigger is a FIFO at `<queue>/trigger`; producers write a single
//! NUL byte to wake a consumer blocked reading it.

use crate::config::Config;
use crate::error::FsqError;
use crate::io::{FifoPull, create_exclusive, is_not_found, make_fifo, pull_fifo, remove_if_exists};
use crate::owner::Owner;
use crate::path::{Layout, QueueRef};
use std::fs::{OpenOptions, Permissions};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tracing::debug;

fn configure_err(path: &Path, source: std::io::Error) -> FsqError {
    FsqError::Configure {
        path: path.to_path_buf(),
        source,
    }
}

/// Fail with `ENOENT` unless the queue directory exists
fn queue_ok(dir: &Path) -> Result<(), FsqError> {
    std::fs::metadata(dir)
        .map(|_| ())
        .map_err(|e| configure_err(dir, e))
}

fn item_owner(config: &Config) -> Result<Owner, FsqError> {
    let ownership = &config.ownership;
    Owner::resolve(ownership.item_user.as_deref(), ownership.item_group.as_deref())
}

/// Create a down marker at `path`, re-applying owner and mode if it exists
pub(crate) fn write_down_marker(path: &Path, owner: Owner, mode: u32) -> Result<(), FsqError> {
    let (file, created) = match create_exclusive(path, mode) {
        Ok(file) => (file, true),
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
            let file = OpenOptions::new()
                .write(true)
                .open(path)
                .map_err(|e| configure_err(path, e))?;
            (file, false)
        }
        Err(e) => return Err(configure_err(path, e)),
    };

    let applied = owner.apply_file(&file).and_then(|()| {
        if created {
            Ok(())
        } else {
            file.set_permissions(Permissions::from_mode(mode))
        }
    });
    if let Err(e) = applied {
        if created {
            let _ = remove_if_exists(path);
        }
        return Err(configure_err(path, e));
    }
    Ok(())
}

/// Mark a queue (or host sub-queue) down with the configured item owner and mode
pub fn down(config: &Config, queue: &QueueRef) -> Result<(), FsqError> {
    down_with(config, queue, item_owner(config)?, config.ownership.item_mode)
}

pub fn down_with(config: &Config, queue: &QueueRef, owner: Owner, mode: u32) -> Result<(), FsqError> {
    let layout = config.layout();
    queue_ok(&layout.base(queue)?)?;
    write_down_marker(&layout.down(queue)?, owner, mode)?;
    debug!("{queue} is down");
    Ok(())
}

/// Remove the down marker; a queue that is already up is left alone
pub fn up(config: &Config, queue: &QueueRef) -> Result<(), FsqError> {
    let layout = config.layout();
    queue_ok(&layout.base(queue)?)?;
    let path = layout.down(queue)?;
    remove_if_exists(&path).map_err(|e| configure_err(&path, e))?;
    debug!("{queue} is up");
    Ok(())
}

pub fn is_down(config: &Config, queue: &QueueRef) -> Result<bool, FsqError> {
    is_down_in(&config.layout(), queue)
}

/// `stat` the down marker; any error other than `ENOENT` is surfaced
pub(crate) fn is_down_in(layout: &Layout, queue: &QueueRef) -> Result<bool, FsqError> {
    queue_ok(&layout.base(queue)?)?;
    let path = layout.down(queue)?;
    match std::fs::metadata(&path) {
        Ok(_) => Ok(true),
        Err(e) if is_not_found(&e) => Ok(false),
        Err(e) => Err(configure_err(&path, e)),
    }
}

/// Create a FIFO at `path`; ownership is set on the path, never through an
/// open descriptor, since opening a FIFO can block
pub(crate) fn make_trigger(path: &Path, owner: Owner, mode: u32) -> Result<(), FsqError> {
    match make_fifo(path, mode) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
            std::fs::set_permissions(path, Permissions::from_mode(mode))
                .map_err(|e| configure_err(path, e))?;
        }
        Err(e) => return Err(configure_err(path, e)),
    }
    owner.apply_path(path).map_err(|e| configure_err(path, e))
}

fn pull(path: &Path, ignore_listener: bool) -> Result<bool, FsqError> {
    match pull_fifo(path) {
        Ok(FifoPull::Delivered) => {
            debug!("pulled trigger {}", path.display());
            Ok(true)
        }
        Ok(FifoPull::NoListener) if ignore_listener => {
            debug!("no listener on {}", path.display());
            Ok(false)
        }
        Ok(FifoPull::NoListener) => Err(FsqError::NoListener {
            path: path.to_path_buf(),
        }),
        Err(source) => Err(FsqError::TriggerPull {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn trigger_at(config: &Config, dir: PathBuf, path: PathBuf) -> Result<(), FsqError> {
    queue_ok(&dir)?;
    make_trigger(&path, item_owner(config)?, config.ownership.item_mode)
}

fn untrigger_at(dir: PathBuf, path: PathBuf) -> Result<(), FsqError> {
    queue_ok(&dir)?;
    remove_if_exists(&path).map_err(|e| configure_err(&path, e))?;
    Ok(())
}

/// Install a trigger FIFO for a queue (or host sub-queue)
pub fn trigger(config: &Config, queue: &QueueRef) -> Result<(), FsqError> {
    let layout = config.layout();
    trigger_at(config, layout.base(queue)?, layout.trigger(queue)?)
}

pub fn untrigger(config: &Config, queue: &QueueRef) -> Result<(), FsqError> {
    let layout = config.layout();
    untrigger_at(layout.base(queue)?, layout.trigger(queue)?)
}

/// Wake a listener on the queue's trigger
///
/// Returns `Ok(false)` when nobody is listening and `ignore_listener` is
/// set; without it that case is [`FsqError::NoListener`].
pub fn trigger_pull(config: &Config, queue: &QueueRef, ignore_listener: bool) -> Result<bool, FsqError> {
    let layout = config.layout();
    queue_ok(&layout.base(queue)?)?;
    pull(&layout.trigger(queue)?, ignore_listener)
}

/// Install the FIFO that wakes host distributors of `queue`
pub fn host_trigger(config: &Config, queue: &str) -> Result<(), FsqError> {
    let layout = config.layout();
    trigger_at(config, layout.base(&QueueRef::new(queue))?, layout.hosts_trigger(queue)?)
}

pub fn host_untrigger(config: &Config, queue: &str) -> Result<(), FsqError> {
    let layout = config.layout();
    untrigger_at(layout.base(&QueueRef::new(queue))?, layout.hosts_trigger(queue)?)
}

pub fn host_trigger_pull(config: &Config, queue: &str, ignore_listener: bool) -> Result<bool, FsqError> {
    let layout = config.layout();
    queue_ok(&layout.base(&QueueRef::new(queue))?)?;
    pull(&layout.hosts_trigger(queue)?, ignore_listener)
}
