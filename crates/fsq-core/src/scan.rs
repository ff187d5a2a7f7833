//! Scan iterator
//!
//! Lists a queue once, sorts the names (creation time, then entropy), and
//! claims entries lazily. Entries that vanish or are locked by another
//! scanner are skipped; a down queue stops the scan.

use crate::config::Config;
use crate::control::is_down_in;
use crate::error::FsqError;
use crate::hosts;
use crate::item::{Claim, ItemContext, ItemPolicy, WorkItem};
use crate::path::QueueRef;
use std::collections::VecDeque;
use std::path::Path;
use tracing::warn;

/// Which sub-queues a scan covers
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum HostSelection {
    /// The queue itself
    #[default]
    Queue,
    /// Every host sub-queue that is not down
    All,
    /// The named host sub-queues that are not down
    Only(Vec<String>),
}

#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub lock: bool,
    pub ttl: u64,
    pub max_tries: u32,
    /// Hand out items from down queues too
    pub ignore_down: bool,
    pub hosts: HostSelection,
}

impl ScanOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            lock: config.policy.lock,
            ttl: config.policy.ttl,
            max_tries: config.policy.max_tries,
            ignore_down: false,
            hosts: HostSelection::Queue,
        }
    }

    fn policy(&self) -> ItemPolicy {
        ItemPolicy {
            lock: self.lock,
            ttl: self.ttl,
            max_tries: self.max_tries,
        }
    }
}

/// Sorted entry names in `dir`; non-UTF-8 names are skipped
pub(crate) fn list_dir(dir: &Path) -> Result<Vec<String>, FsqError> {
    let scan_err = |source| FsqError::Scan {
        path: dir.to_path_buf(),
        source,
    };
    let mut names = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(scan_err)? {
        let entry = entry.map_err(scan_err)?;
        match entry.file_name().into_string() {
            Ok(name) => names.push(name),
            Err(raw) => warn!("skipping non UTF-8 entry {raw:?} in {}", dir.display()),
        }
    }
    names.sort();
    Ok(names)
}

/// Begin a scan of `queue`
pub fn scan(config: &Config, queue: &str, options: &ScanOptions) -> Result<ScanIter, FsqError> {
    let ctx = ItemContext::new(config)?;
    let layout = &ctx.layout;

    let mut candidates: Vec<(QueueRef, String)> = Vec::new();
    match &options.hosts {
        HostSelection::Queue => {
            let q = QueueRef::new(queue);
            for id in list_dir(&layout.queue(&q)?)? {
                candidates.push((q.clone(), id));
            }
        }
        selection => {
            let names = match selection {
                HostSelection::Only(names) => names.clone(),
                _ => hosts::hosts(config, queue)?,
            };
            for host in names {
                let q = QueueRef::host(queue, host);
                if !options.ignore_down && is_down_in(layout, &q)? {
                    continue;
                }
                for id in list_dir(&layout.queue(&q)?)? {
                    candidates.push((q.clone(), id));
                }
            }
            candidates.sort_by(|a, b| a.0.host_name().cmp(&b.0.host_name()).then_with(|| a.1.cmp(&b.1)));
        }
    }

    Ok(ScanIter {
        ctx,
        policy: options.policy(),
        ignore_down: options.ignore_down,
        candidates: candidates.into(),
        fused: false,
    })
}

/// Lazily claims the entries listed when the scan began
///
/// Yields `Err(FsqError::Down)` and then stops if a queue goes down. Other
/// errors are yielded and the scan continues with the next entry.
#[derive(Debug)]
pub struct ScanIter {
    ctx: ItemContext,
    policy: ItemPolicy,
    ignore_down: bool,
    candidates: VecDeque<(QueueRef, String)>,
    fused: bool,
}

impl ScanIter {
    /// Entries not yet visited
    pub fn remaining(&self) -> usize {
        self.candidates.len()
    }
}

impl Iterator for ScanIter {
    type Item = Result<WorkItem, FsqError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.fused {
            return None;
        }
        while let Some((queue, id)) = self.candidates.pop_front() {
            if !self.ignore_down {
                match is_down_in(&self.ctx.layout, &queue) {
                    Ok(false) => {}
                    Ok(true) => {
                        self.fused = true;
                        self.candidates.clear();
                        return Some(Err(FsqError::Down {
                            queue: queue.to_string(),
                        }));
                    }
                    Err(e) => return Some(Err(e)),
                }
            }
            match WorkItem::claim_in(self.ctx.clone(), &queue, &id, self.policy) {
                Ok(Claim::Claimed(item)) => return Some(Ok(item)),
                Ok(Claim::Skipped(_)) => continue,
                Err(e) => return Some(Err(e)),
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn setup(ids: &[&str]) -> (TempDir, Config) {
        let temp_dir = TempDir::new().unwrap();
        for sub in ["tmp", "queue", "done", "fail"] {
            fs::create_dir_all(temp_dir.path().join("q").join(sub)).unwrap();
        }
        for id in ids {
            fs::write(temp_dir.path().join("q/queue").join(id), id.as_bytes()).unwrap();
        }
        let config = Config::with_root(temp_dir.path());
        (temp_dir, config)
    }

    #[test]
    fn test_scan_yields_sorted_items() {
        let (_temp_dir, config) = setup(&[
            "_20260101120001_0_1_h_0",
            "_20260101120000_1_1_h_0",
            "_20260101120000_0_1_h_0",
        ]);
        let ids: Vec<String> = scan(&config, "q", &ScanOptions::from_config(&config))
            .unwrap()
            .map(|item| item.unwrap().id().to_string())
            .collect();
        assert_eq!(
            ids,
            vec![
                "_20260101120000_0_1_h_0",
                "_20260101120000_1_1_h_0",
                "_20260101120001_0_1_h_0",
            ]
        );
    }

    #[test]
    fn test_scan_skips_locked_items() {
        let (_temp_dir, config) = setup(&["_20260101120000_0_1_h_0", "_20260101120001_0_1_h_0"]);
        let q = QueueRef::new("q");
        let _held = WorkItem::open(&config, &q, "_20260101120000_0_1_h_0").unwrap();

        let ids: Vec<String> = scan(&config, "q", &ScanOptions::from_config(&config))
            .unwrap()
            .map(|item| item.unwrap().id().to_string())
            .collect();
        assert_eq!(ids, vec!["_20260101120001_0_1_h_0"]);
    }

    #[test]
    fn test_down_queue_fuses_scan() {
        let (temp_dir, config) = setup(&["_20260101120000_0_1_h_0"]);
        fs::write(temp_dir.path().join("q/down"), b"").unwrap();

        let mut iter = scan(&config, "q", &ScanOptions::from_config(&config)).unwrap();
        assert!(matches!(iter.next(), Some(Err(FsqError::Down { .. }))));
        assert!(iter.next().is_none());

        let options = ScanOptions {
            ignore_down: true,
            ..ScanOptions::from_config(&config)
        };
        assert_eq!(scan(&config, "q", &options).unwrap().count(), 1);
    }

    fn install_host(temp_dir: &TempDir, host: &str, ids: &[&str]) {
        let base = temp_dir.path().join("q/hosts").join(host);
        for sub in ["tmp", "queue", "done", "fail"] {
            fs::create_dir_all(base.join(sub)).unwrap();
        }
        for id in ids {
            fs::write(base.join("queue").join(id), id.as_bytes()).unwrap();
        }
    }

    fn scanned(config: &Config, options: &ScanOptions) -> Vec<(String, String)> {
        scan(config, "q", options)
            .unwrap()
            .map(|item| {
                let item = item.unwrap();
                (item.host().unwrap_or_default().to_string(), item.id().to_string())
            })
            .collect()
    }

    #[test]
    fn test_host_scan_orders_by_host_then_id() {
        let (temp_dir, config) = setup(&[]);
        install_host(&temp_dir, "h2", &["_20260101120000_0_1_h_0"]);
        install_host(&temp_dir, "h1", &["_20260101120005_0_1_h_0", "_20260101120001_0_1_h_0"]);
        let options = ScanOptions {
            hosts: HostSelection::Only(vec!["h2".to_string(), "h1".to_string()]),
            ..ScanOptions::from_config(&config)
        };

        assert_eq!(
            scanned(&config, &options),
            vec![
                ("h1".to_string(), "_20260101120001_0_1_h_0".to_string()),
                ("h1".to_string(), "_20260101120005_0_1_h_0".to_string()),
                ("h2".to_string(), "_20260101120000_0_1_h_0".to_string()),
            ]
        );
    }

    #[test]
    fn test_all_hosts_skips_down_host() {
        let (temp_dir, config) = setup(&[]);
        install_host(&temp_dir, "h1", &["_20260101120000_0_1_h_0"]);
        install_host(&temp_dir, "h2", &["_20260101120001_0_1_h_0"]);
        fs::write(temp_dir.path().join("q/hosts/h1/down"), b"").unwrap();
        let options = ScanOptions {
            hosts: HostSelection::All,
            ..ScanOptions::from_config(&config)
        };

        assert_eq!(
            scanned(&config, &options),
            vec![("h2".to_string(), "_20260101120001_0_1_h_0".to_string())]
        );
        assert!(temp_dir.path().join("q/hosts/h1/queue/_20260101120000_0_1_h_0").exists());

        let options = ScanOptions {
            ignore_down: true,
            ..options
        };
        assert_eq!(scanned(&config, &options).len(), 2);
    }

    #[test]
    fn test_missing_queue_is_scan_error() {
        let (_temp_dir, config) = setup(&[]);
        let err = scan(&config, "absent", &ScanOptions::from_config(&config)).unwrap_err();
        assert!(matches!(err, FsqError::Scan { .. }));
        assert_eq!(err.raw_os_error(), Some(libc::ENOENT));
    }
}
