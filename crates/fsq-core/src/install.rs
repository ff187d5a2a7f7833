//! Installing and removing queue directory trees
//!
//! A queue is assembled under a hidden sibling name (`.<queue>.<pid>.<n>`)
//! and renamed into place, so other processes only ever see a complete
//! queue or none at all.

use crate::config::Config;
use crate::control::{make_trigger, write_down_marker};
use crate::error::FsqError;
use crate::owner::Owner;
use crate::path::{QueueRef, valid_name};
use std::fs::{DirBuilder, File, Permissions};
use std::os::unix::fs::{DirBuilderExt, PermissionsExt};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Attempts at finding a free hidden staging name
const STAGING_ATTEMPTS: u32 = 100;

#[derive(Debug, Clone, Copy, Default)]
pub struct InstallOptions {
    /// Install with a down marker in place
    pub down: bool,
    /// Install a trigger FIFO
    pub trigger: bool,
}

fn install_err(path: &Path, source: std::io::Error) -> FsqError {
    FsqError::Install {
        path: path.to_path_buf(),
        source,
    }
}

struct Owners {
    queue: Owner,
    queue_mode: u32,
    item: Owner,
    item_mode: u32,
}

impl Owners {
    fn resolve(config: &Config) -> Result<Self, FsqError> {
        let o = &config.ownership;
        Ok(Self {
            queue: Owner::resolve(o.queue_user.as_deref(), o.queue_group.as_deref())?,
            queue_mode: o.queue_mode,
            item: Owner::resolve(o.item_user.as_deref(), o.item_group.as_deref())?,
            item_mode: o.item_mode,
        })
    }
}

/// mkdir with exactly `mode`, then chown through a descriptor
fn make_dir(path: &Path, owner: Owner, mode: u32) -> std::io::Result<()> {
    DirBuilder::new().mode(mode).create(path)?;
    let dir = File::open(path)?;
    dir.set_permissions(Permissions::from_mode(mode))?;
    owner.apply_file(&dir)
}

/// Create a fresh hidden directory next to `target`
fn staging_dir(parent: &Path, name: &str, owners: &Owners) -> Result<PathBuf, FsqError> {
    let pid = std::process::id();
    for n in 0..STAGING_ATTEMPTS {
        let path = parent.join(format!(".{name}.{pid}.{n}"));
        match make_dir(&path, owners.queue, owners.queue_mode) {
            Ok(()) => return Ok(path),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
            Err(e) => {
                let _ = std::fs::remove_dir(&path);
                return Err(install_err(&path, e));
            }
        }
    }
    Err(install_err(
        parent,
        std::io::Error::from(std::io::ErrorKind::AlreadyExists),
    ))
}

fn cleanup(path: &Path) {
    if let Err(e) = std::fs::remove_dir_all(path) {
        warn!("failed to remove staging directory {}: {e}", path.display());
    }
}

/// Fill a staging directory with the queue subdirectories and markers
fn populate(
    config: &Config,
    staging: &Path,
    owners: &Owners,
    options: InstallOptions,
) -> Result<(), FsqError> {
    let names = &config.names;
    for sub in [&names.tmp, &names.queue, &names.done, &names.fail] {
        let path = staging.join(valid_name(sub)?);
        make_dir(&path, owners.queue, owners.queue_mode).map_err(|e| install_err(&path, e))?;
    }
    if options.down {
        write_down_marker(&staging.join(valid_name(&names.down)?), owners.item, owners.item_mode)?;
    }
    if options.trigger || config.policy.use_trigger {
        make_trigger(&staging.join(valid_name(&names.trigger)?), owners.item, owners.item_mode)?;
    }
    Ok(())
}

/// Build a queue skeleton at `parent/name` via a staging directory
fn install_at(
    config: &Config,
    parent: &Path,
    name: &str,
    options: InstallOptions,
) -> Result<PathBuf, FsqError> {
    let name = valid_name(name)?;
    let owners = Owners::resolve(config)?;
    let target = parent.join(name);
    if target.symlink_metadata().is_ok() {
        return Err(FsqError::QueueExists { path: target });
    }

    let staging = staging_dir(parent, name, &owners)?;
    if let Err(e) = populate(config, &staging, &owners, options) {
        cleanup(&staging);
        return Err(e);
    }

    if let Err(e) = std::fs::rename(&staging, &target) {
        cleanup(&staging);
        return match e.raw_os_error() {
            Some(libc::ENOTEMPTY) | Some(libc::EEXIST) => Err(FsqError::QueueExists { path: target }),
            _ => Err(install_err(&target, e)),
        };
    }
    debug!("installed {}", target.display());
    Ok(target)
}

/// Move `target` aside to a hidden name, then delete it
fn uninstall_at(parent: &Path, target: &Path, name: &str) -> Result<(), FsqError> {
    let pid = std::process::id();
    for n in 0..STAGING_ATTEMPTS {
        let aside = parent.join(format!(".{name}.{pid}.{n}"));
        if aside.symlink_metadata().is_ok() {
            continue;
        }
        std::fs::rename(target, &aside).map_err(|e| install_err(target, e))?;
        std::fs::remove_dir_all(&aside).map_err(|e| install_err(&aside, e))?;
        debug!("uninstalled {}", target.display());
        return Ok(());
    }
    Err(install_err(
        parent,
        std::io::Error::from(std::io::ErrorKind::AlreadyExists),
    ))
}

fn root_dir(config: &Config) -> PathBuf {
    let root = config.layout().root().to_path_buf();
    if root.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        root
    }
}

/// Atomically install `queue` under the configured root
pub fn install(config: &Config, queue: &str, options: InstallOptions) -> Result<PathBuf, FsqError> {
    install_at(config, &root_dir(config), queue, options)
}

/// Down, then remove `queue` and everything in it
pub fn uninstall(config: &Config, queue: &str) -> Result<(), FsqError> {
    let q = QueueRef::new(queue);
    let target = config.layout().base(&q)?;
    if let Err(e) = crate::control::down(config, &q) {
        return Err(match e.raw_os_error() {
            Some(libc::ENOENT) => install_err(&target, std::io::Error::from_raw_os_error(libc::ENOENT)),
            _ => e,
        });
    }
    uninstall_at(&root_dir(config), &target, queue)
}

/// Atomically install the host sub-queue `<queue>/hosts/<host>`
pub fn install_host(
    config: &Config,
    queue: &str,
    host: &str,
    options: InstallOptions,
) -> Result<PathBuf, FsqError> {
    let layout = config.layout();
    let base = layout.base(&QueueRef::new(queue))?;
    std::fs::metadata(&base).map_err(|e| install_err(&base, e))?;

    let hosts_dir = layout.hosts(queue)?;
    let owners = Owners::resolve(config)?;
    match make_dir(&hosts_dir, owners.queue, owners.queue_mode) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
        Err(e) => return Err(install_err(&hosts_dir, e)),
    }
    install_at(config, &hosts_dir, host, options)
}

pub fn uninstall_host(config: &Config, queue: &str, host: &str) -> Result<(), FsqError> {
    let q = QueueRef::host(queue, host);
    let target = config.layout().base(&q)?;
    if let Err(e) = crate::control::down(config, &q) {
        return Err(match e.raw_os_error() {
            Some(libc::ENOENT) => install_err(&target, std::io::Error::from_raw_os_error(libc::ENOENT)),
            _ => e,
        });
    }
    uninstall_at(&config.layout().hosts(queue)?, &target, host)
}
