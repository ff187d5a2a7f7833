//! Listing queues, host sub-queues and items, and fanning items out to hosts

use crate::config::Config;
use crate::done;
use crate::error::FsqError;
use crate::item::{ItemMeta, WorkItem};
use crate::path::QueueRef;
use crate::scan::list_dir;
use crate::writer::{EntropyMode, ItemWriter};
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use tracing::{debug, warn};

fn hosts_err(path: &Path, source: std::io::Error) -> FsqError {
    FsqError::Hosts {
        path: path.to_path_buf(),
        source,
    }
}

/// Names of subdirectories of `dir`, sorted, hidden entries excluded
fn subdirs(dir: &Path) -> Result<Vec<String>, FsqError> {
    let mut names = Vec::new();
    for name in list_dir(dir)? {
        if name.starts_with('.') {
            continue;
        }
        let meta = std::fs::metadata(dir.join(&name)).map_err(|e| hosts_err(dir, e))?;
        if meta.is_dir() {
            names.push(name);
        }
    }
    Ok(names)
}

/// Queues installed under the configured root
pub fn queues(config: &Config) -> Result<Vec<String>, FsqError> {
    let root = config.layout().root().to_path_buf();
    let root = if root.as_os_str().is_empty() {
        Path::new(".").to_path_buf()
    } else {
        root
    };
    let layout = config.layout();
    let mut queues = Vec::new();
    for name in subdirs(&root)? {
        // a queue is anything with a live queue directory
        if layout.queue(&QueueRef::new(name.as_str()))?.is_dir() {
            queues.push(name);
        }
    }
    Ok(queues)
}

/// Host sub-queues of `queue`; a queue without a hosts directory has none
pub fn hosts(config: &Config, queue: &str) -> Result<Vec<String>, FsqError> {
    let dir = config.layout().hosts(queue)?;
    match std::fs::metadata(&dir) {
        Ok(_) => subdirs(&dir),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(hosts_err(&dir, e)),
    }
}

/// One entry of a queue listing
#[derive(Debug)]
pub struct ItemListing {
    pub id: String,
    /// Decoded metadata, or why the identifier does not parse
    pub meta: Result<ItemMeta, FsqError>,
}

/// Items currently in `queue/`, sorted, without opening or locking them
pub fn list_items(config: &Config, queue: &QueueRef) -> Result<Vec<ItemListing>, FsqError> {
    let codec = config.codec()?;
    let timefmt = &config.codec.timefmt;
    let ids = list_dir(&config.layout().queue(queue)?)?;
    Ok(ids
        .into_iter()
        .map(|id| ItemListing {
            meta: ItemMeta::parse(&codec, timefmt, &id),
            id,
        })
        .collect())
}

/// Resolve the destination hosts for a fan-out; empty means every host
fn destinations(config: &Config, queue: &str, requested: &[String]) -> Result<Vec<String>, FsqError> {
    let layout = config.layout();
    if requested.is_empty() {
        let all = hosts(config, queue)?;
        if all.is_empty() {
            return Err(hosts_err(
                &layout.hosts(queue)?,
                std::io::Error::new(std::io::ErrorKind::NotFound, "no host queues installed"),
            ));
        }
        return Ok(all);
    }
    for host in requested {
        let base = layout.base(&QueueRef::host(queue, host.as_str()))?;
        std::fs::metadata(&base).map_err(|e| hosts_err(&base, e))?;
    }
    Ok(requested.to_vec())
}

/// Copy `item` into each of `targets`, leaving the source untouched
///
/// Metadata (creation time, entropy, pid, host, tries, arguments) is kept.
/// With `link` set the payload is hard-linked, falling back to a copy
/// across devices. Returns the id given to the item in each host.
pub fn distribute(
    writer: &ItemWriter,
    item: &WorkItem,
    targets: &[String],
    link: bool,
) -> Result<Vec<(String, String)>, FsqError> {
    let queue = item.queue().name();
    let src = item.path()?;
    let mut placed = Vec::new();

    for host in targets {
        let target = QueueRef::host(queue, host.as_str());
        let wrap = |source| FsqError::Reenqueue {
            id: item.id().to_string(),
            host: host.clone(),
            source: Box::new(source),
        };

        let mut fields = item.meta().fields();
        let linked = if link {
            match writer.publish_link(&target, &src, &mut fields) {
                Err(e) if e.raw_os_error() == Some(libc::EXDEV) => None,
                other => Some(other),
            }
        } else {
            None
        };
        let id = match linked {
            Some(result) => result.map_err(wrap)?,
            None => {
                let open_err = |source| {
                    wrap(FsqError::WorkItem {
                        path: src.clone(),
                        source,
                    })
                };
                let mut payload = std::fs::File::open(&src).map_err(open_err)?;
                let mode = payload
                    .metadata()
                    .map(|m| m.permissions().mode() & 0o7777)
                    .map_err(open_err)?;
                writer
                    .publish_stream(
                        &target,
                        &mut payload,
                        &mut fields,
                        EntropyMode::Flexible,
                        writer.owner(),
                        mode,
                    )
                    .map_err(wrap)?
            }
        };
        debug!("reenqueued {} to {target} as {id}", item.id());
        placed.push((host.clone(), id));
    }
    Ok(placed)
}

/// Copy `item` into each destination host sub-queue, then mark it done
///
/// An empty `requested` means every installed host. Unknown hosts are
/// reported before anything is copied and leave the item in place. If a
/// copy fails the item is retried through [`done::fail_tmp`], so a host
/// that keeps failing eventually sends it to `fail/`; the copy error is
/// returned either way.
pub fn reenqueue(
    config: &Config,
    writer: &ItemWriter,
    item: WorkItem,
    requested: &[String],
    link: bool,
) -> Result<Vec<(String, String)>, FsqError> {
    let targets = destinations(config, item.queue().name(), requested)?;
    match distribute(writer, &item, &targets, link) {
        Ok(placed) => {
            done::success(item)?;
            Ok(placed)
        }
        Err(e) => {
            let id = item.id().to_string();
            match done::fail_tmp(item) {
                Ok(retry) => debug!("{id} retried as {retry} after: {e}"),
                Err(escalated) => warn!("{id}: {escalated}"),
            }
            Err(e)
        }
    }
}
