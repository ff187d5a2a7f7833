//! Queue path resolution
//!
//! Maps a queue (and optional host) onto the fixed on-disk layout:
//!
//! ```text
//! <root>/<queue>/{tmp,queue,done,fail}/<id>
//! <root>/<queue>/down
//! <root>/<queue>/trigger
//! <root>/<queue>/hosts/<host>/{tmp,queue,done,fail,down,trigger}
//! ```
//!
//! Every component is validated with [`valid_name`] before it is joined, so
//! a resolved path never escapes the queue tree.

use crate::config::DirNames;
use crate::error::FsqError;
use std::path::{Path, PathBuf};

const ILLEGAL_NAMES: [&str; 2] = [".", ".."];

/// Reject names that are empty, `.`, `..`, or contain a path separator or NUL
pub fn valid_name(name: &str) -> Result<&str, FsqError> {
    if name.is_empty() || ILLEGAL_NAMES.contains(&name) || name.contains(['/', '\0']) {
        return Err(FsqError::Path {
            name: name.to_string(),
        });
    }
    Ok(name)
}

/// A queue, or a host sub-queue nested under `<queue>/hosts/<host>`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueueRef {
    name: String,
    host: Option<String>,
}

impl QueueRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            host: None,
        }
    }

    pub fn host(name: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            host: Some(host.into()),
        }
    }

    pub fn with_host(name: impl Into<String>, host: Option<String>) -> Self {
        Self {
            name: name.into(),
            host,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn host_name(&self) -> Option<&str> {
        self.host.as_deref()
    }
}

impl std::fmt::Display for QueueRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.host {
            Some(host) => write!(f, "{}@{}", self.name, host),
            None => f.write_str(&self.name),
        }
    }
}

/// Resolves queue paths under a root using configured directory names
#[derive(Debug, Clone)]
pub struct Layout {
    root: PathBuf,
    names: DirNames,
}

impl Layout {
    pub fn new(root: impl Into<PathBuf>, names: &DirNames) -> Self {
        Self {
            root: root.into(),
            names: names.clone(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn names(&self) -> &DirNames {
        &self.names
    }

    /// `<root>/<queue>` or `<root>/<queue>/hosts/<host>`
    pub fn base(&self, queue: &QueueRef) -> Result<PathBuf, FsqError> {
        let base = self.root.join(valid_name(&queue.name)?);
        match &queue.host {
            Some(host) => Ok(base
                .join(valid_name(&self.names.hosts)?)
                .join(valid_name(host)?)),
            None => Ok(base),
        }
    }

    fn child(&self, queue: &QueueRef, name: &str) -> Result<PathBuf, FsqError> {
        Ok(self.base(queue)?.join(valid_name(name)?))
    }

    pub fn tmp(&self, queue: &QueueRef) -> Result<PathBuf, FsqError> {
        self.child(queue, &self.names.tmp)
    }

    pub fn queue(&self, queue: &QueueRef) -> Result<PathBuf, FsqError> {
        self.child(queue, &self.names.queue)
    }

    pub fn done(&self, queue: &QueueRef) -> Result<PathBuf, FsqError> {
        self.child(queue, &self.names.done)
    }

    pub fn fail(&self, queue: &QueueRef) -> Result<PathBuf, FsqError> {
        self.child(queue, &self.names.fail)
    }

    pub fn down(&self, queue: &QueueRef) -> Result<PathBuf, FsqError> {
        self.child(queue, &self.names.down)
    }

    pub fn trigger(&self, queue: &QueueRef) -> Result<PathBuf, FsqError> {
        self.child(queue, &self.names.trigger)
    }

    /// Path of a live item: `<base>/queue/<id>`
    pub fn item(&self, queue: &QueueRef, id: &str) -> Result<PathBuf, FsqError> {
        Ok(self.queue(queue)?.join(valid_name(id)?))
    }

    /// `<root>/<queue>/hosts`
    pub fn hosts(&self, queue: &str) -> Result<PathBuf, FsqError> {
        Ok(self
            .root
            .join(valid_name(queue)?)
            .join(valid_name(&self.names.hosts)?))
    }

    /// `<root>/<queue>/<hosts_trigger>`, the FIFO that wakes host distributors
    pub fn hosts_trigger(&self, queue: &str) -> Result<PathBuf, FsqError> {
        Ok(self
            .root
            .join(valid_name(queue)?)
            .join(valid_name(&self.names.hosts_trigger)?))
    }
}
