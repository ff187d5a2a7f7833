//! Atomic item writer (the enqueue pipeline)
//!
//! # Workflow
//!
//! 1. Build the standard fields: `now`, `entropy`, `pid`, `host`, `tries`
//! 2. Create `tmp/<id>` with `O_CREAT|O_EXCL`, bumping entropy on collision
//! 3. Stream the payload in, then `fsync`
//! 4. Hard-link `tmp/<id>` into `queue/<id>` and unlink the temp name
//!
//! A failure after step 2 removes the temp file; nothing partial ever
//! appears in `queue/`.

use crate::codec::Codec;
use crate::config::Config;
use crate::error::FsqError;
use crate::io::{create_exclusive, remove_if_exists};
use crate::owner::Owner;
use crate::path::{Layout, QueueRef, valid_name};
use chrono::NaiveDateTime;
use std::fmt::Write as _;
use std::fs::File;
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Decoded standard fields plus caller arguments, in identifier order
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ItemFields {
    pub(crate) now: String,
    pub(crate) entropy: u64,
    pub(crate) pid: u32,
    pub(crate) host: String,
    pub(crate) tries: u32,
    pub(crate) arguments: Vec<String>,
}

impl ItemFields {
    pub(crate) fn construct(&self, codec: &Codec) -> Result<String, FsqError> {
        let mut fields = vec![
            self.now.clone(),
            self.entropy.to_string(),
            self.pid.to_string(),
            self.host.clone(),
            self.tries.to_string(),
        ];
        fields.extend(self.arguments.iter().cloned());
        codec.construct(&fields)
    }
}

/// How a naming collision is resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EntropyMode {
    /// Caller chose the entropy; a collision is an error
    Fixed,
    /// Bump entropy by the attempt counter and try again
    Flexible,
}

/// Find a free name for `fields` in `dir` by running `attempt` on candidate paths
///
/// `attempt` must fail with `AlreadyExists` when the name is taken. On
/// success `fields.entropy` holds the entropy actually used.
pub(crate) fn place_unique<T>(
    dir: &Path,
    codec: &Codec,
    fields: &mut ItemFields,
    entropy: EntropyMode,
    max_tries: u32,
    mut attempt: impl FnMut(&Path) -> std::io::Result<T>,
    wrap: fn(PathBuf, std::io::Error) -> FsqError,
) -> Result<(String, T), FsqError> {
    let base = fields.entropy;
    let mut tried: u32 = 0;
    loop {
        let name = fields.construct(codec)?;
        let path = dir.join(valid_name(&name)?);
        match attempt(&path) {
            Ok(value) => return Ok((name, value)),
            Err(e) if e.kind() == ErrorKind::AlreadyExists && entropy == EntropyMode::Flexible => {
                tried += 1;
                if max_tries > 0 && tried >= max_tries {
                    return Err(FsqError::EnqueueMaxTries {
                        path: dir.to_path_buf(),
                        attempts: tried,
                    });
                }
                fields.entropy = base.checked_add(u64::from(tried)).ok_or_else(|| {
                    FsqError::EnqueueMaxTries {
                        path: dir.to_path_buf(),
                        attempts: tried,
                    }
                })?;
            }
            Err(e) => return Err(wrap(path, e)),
        }
    }
}

/// Format `now` with a strftime pattern, rejecting patterns chrono cannot render
pub(crate) fn format_time(timefmt: &str, now: &NaiveDateTime) -> Result<String, FsqError> {
    let mut out = String::new();
    write!(out, "{}", now.format(timefmt)).map_err(|_| FsqError::TimeFmt {
        timefmt: timefmt.to_string(),
        value: now.to_string(),
    })?;
    Ok(out)
}

pub(crate) fn local_hostname() -> Result<String, FsqError> {
    let raw = hostname::get().map_err(|e| FsqError::Coerce {
        what: "hostname",
        value: e.to_string(),
    })?;
    raw.into_string().map_err(|raw| FsqError::Coerce {
        what: "hostname",
        value: raw.to_string_lossy().into_owned(),
    })
}

fn enqueue_err(path: PathBuf, source: std::io::Error) -> FsqError {
    FsqError::Enqueue { path, source }
}

/// Entropy remembered across one writer's enqueues
///
/// Two items created by the same writer in the same time quantum get
/// consecutive entropy values without touching the filesystem first.
#[derive(Debug, Default)]
struct EntropyCounter {
    last: Option<(String, u64)>,
}

impl EntropyCounter {
    fn start(&self, now: &str) -> u64 {
        match &self.last {
            Some((seen, entropy)) if seen == now => entropy.wrapping_add(1),
            _ => 0,
        }
    }

    fn record(&mut self, now: &str, entropy: u64) {
        self.last = Some((now.to_string(), entropy));
    }
}

/// Caller-supplied metadata for [`ItemWriter::enqueue_with`]
///
/// Unset fields fall back to the writer's defaults. A fixed `entropy`
/// disables collision retries.
#[derive(Debug, Clone, Default)]
pub struct EnqueueOptions {
    pub entropy: Option<u64>,
    pub tries: Option<u32>,
    pub pid: Option<u32>,
    pub now: Option<NaiveDateTime>,
    pub host: Option<String>,
    pub mode: Option<u32>,
    pub owner: Option<Owner>,
}

/// Publishes new items into queues
#[derive(Debug)]
pub struct ItemWriter {
    layout: Layout,
    codec: Codec,
    timefmt: String,
    hostname: String,
    pid: u32,
    owner: Owner,
    mode: u32,
    enqueue_max_tries: u32,
    entropy: EntropyCounter,
}

impl ItemWriter {
    pub fn new(config: &Config) -> Result<Self, FsqError> {
        let ownership = &config.ownership;
        Ok(Self {
            layout: config.layout(),
            codec: config.codec()?,
            timefmt: config.codec.timefmt.clone(),
            hostname: local_hostname()?,
            pid: std::process::id(),
            owner: Owner::resolve(ownership.item_user.as_deref(), ownership.item_group.as_deref())?,
            mode: ownership.item_mode,
            enqueue_max_tries: config.policy.enqueue_max_tries,
            entropy: EntropyCounter::default(),
        })
    }

    pub fn with_owner(mut self, owner: Owner) -> Self {
        self.owner = owner;
        self
    }

    pub fn with_mode(mut self, mode: u32) -> Self {
        self.mode = mode;
        self
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub(crate) fn owner(&self) -> Owner {
        self.owner
    }

    /// Enqueue a payload stream with the given arguments; returns the item id
    pub fn enqueue<R, S>(&mut self, queue: &QueueRef, payload: R, args: &[S]) -> Result<String, FsqError>
    where
        R: Read,
        S: AsRef<str>,
    {
        self.enqueue_with(queue, payload, args, &EnqueueOptions::default())
    }

    /// Enqueue an in-memory payload
    pub fn senqueue<S: AsRef<str>>(
        &mut self,
        queue: &QueueRef,
        payload: &[u8],
        args: &[S],
    ) -> Result<String, FsqError> {
        self.enqueue(queue, payload, args)
    }

    pub fn enqueue_with<R, S>(
        &mut self,
        queue: &QueueRef,
        payload: R,
        args: &[S],
        options: &EnqueueOptions,
    ) -> Result<String, FsqError>
    where
        R: Read,
        S: AsRef<str>,
    {
        let now_dt = options
            .now
            .unwrap_or_else(|| chrono::Local::now().naive_local());
        let now = format_time(&self.timefmt, &now_dt)?;
        let mut fields = ItemFields {
            entropy: options.entropy.unwrap_or_else(|| self.entropy.start(&now)),
            now,
            pid: options.pid.unwrap_or(self.pid),
            host: options.host.clone().unwrap_or_else(|| self.hostname.clone()),
            tries: options.tries.unwrap_or(0),
            arguments: args.iter().map(|a| a.as_ref().to_string()).collect(),
        };
        let entropy = if options.entropy.is_some() {
            EntropyMode::Fixed
        } else {
            EntropyMode::Flexible
        };
        let owner = options.owner.unwrap_or(self.owner);
        let mode = options.mode.unwrap_or(self.mode);

        let name = self.publish_stream(queue, payload, &mut fields, entropy, owner, mode)?;
        self.entropy.record(&fields.now, fields.entropy);
        Ok(name)
    }

    /// Write `payload` under a fresh name derived from `fields` and publish it
    pub(crate) fn publish_stream<R: Read>(
        &self,
        queue: &QueueRef,
        mut payload: R,
        fields: &mut ItemFields,
        entropy: EntropyMode,
        owner: Owner,
        mode: u32,
    ) -> Result<String, FsqError> {
        let tmp_dir = self.layout.tmp(queue)?;
        let queue_dir = self.layout.queue(queue)?;

        let (name, mut file) = place_unique(
            &tmp_dir,
            &self.codec,
            fields,
            entropy,
            self.enqueue_max_tries,
            |path| {
                reserve_in_queue(&queue_dir, path)?;
                create_exclusive(path, mode)
            },
            enqueue_err,
        )?;
        let tmp_path = tmp_dir.join(&name);

        if let Err(e) = fill(&mut file, &mut payload, owner) {
            discard(&tmp_path);
            return Err(enqueue_err(tmp_path, e));
        }
        drop(file);

        self.commit(queue, &tmp_path, fields, entropy)
    }

    /// Hard-link an existing file into `tmp/` under `fields` and publish it
    ///
    /// Fails with the raw link error (notably `EXDEV`) so callers can fall
    /// back to [`publish_stream`](Self::publish_stream).
    pub(crate) fn publish_link(
        &self,
        queue: &QueueRef,
        src: &Path,
        fields: &mut ItemFields,
    ) -> Result<String, FsqError> {
        let tmp_dir = self.layout.tmp(queue)?;
        let queue_dir = self.layout.queue(queue)?;

        let (name, ()) = place_unique(
            &tmp_dir,
            &self.codec,
            fields,
            EntropyMode::Flexible,
            self.enqueue_max_tries,
            |path| {
                reserve_in_queue(&queue_dir, path)?;
                std::fs::hard_link(src, path)
            },
            enqueue_err,
        )?;
        self.commit(queue, &tmp_dir.join(name), fields, EntropyMode::Flexible)
    }

    /// Link `tmp/<id>` into `queue/` and drop the temp name
    fn commit(
        &self,
        queue: &QueueRef,
        tmp_path: &Path,
        fields: &mut ItemFields,
        entropy: EntropyMode,
    ) -> Result<String, FsqError> {
        let queue_dir = self.layout.queue(queue)?;
        let published = place_unique(
            &queue_dir,
            &self.codec,
            fields,
            entropy,
            self.enqueue_max_tries,
            |path| std::fs::hard_link(tmp_path, path),
            enqueue_err,
        );
        let (name, ()) = match published {
            Ok(done) => done,
            Err(e) => {
                discard(tmp_path);
                return Err(e);
            }
        };
        std::fs::remove_file(tmp_path).map_err(|e| enqueue_err(tmp_path.to_path_buf(), e))?;
        debug!("enqueued {name} into {queue}");
        Ok(name)
    }
}

/// Treat a name already live in `queue/` as a collision in `tmp/`
fn reserve_in_queue(queue_dir: &Path, tmp_path: &Path) -> std::io::Result<()> {
    let Some(name) = tmp_path.file_name() else {
        return Ok(());
    };
    match std::fs::symlink_metadata(queue_dir.join(name)) {
        Ok(_) => Err(std::io::Error::from(ErrorKind::AlreadyExists)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

fn fill(file: &mut File, payload: &mut impl Read, owner: Owner) -> std::io::Result<()> {
    owner.apply_file(file)?;
    std::io::copy(payload, file)?;
    file.flush()?;
    file.sync_all()
}

fn discard(path: &Path) {
    if let Err(e) = remove_if_exists(path) {
        warn!("failed to remove temporary item {}: {e}", path.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn setup() -> (TempDir, Config) {
        let temp_dir = TempDir::new().unwrap();
        for sub in ["tmp", "queue", "done", "fail"] {
            fs::create_dir_all(temp_dir.path().join("q").join(sub)).unwrap();
        }
        let config = Config::with_root(temp_dir.path());
        (temp_dir, config)
    }

    fn fixed_now() -> NaiveDateTime {
        NaiveDateTime::parse_from_str("20260101120000", "%Y%m%d%H%M%S").unwrap()
    }

    #[test]
    fn test_enqueue_publishes_into_queue_only() {
        let (temp_dir, config) = setup();
        let mut writer = ItemWriter::new(&config).unwrap();
        let q = QueueRef::new("q");

        let id = writer.senqueue(&q, b"hello", &["alpha", "beta"]).unwrap();

        let published = temp_dir.path().join("q/queue").join(&id);
        assert_eq!(fs::read(&published).unwrap(), b"hello");
        assert_eq!(fs::read_dir(temp_dir.path().join("q/tmp")).unwrap().count(), 0);
        assert!(id.ends_with("_0_alpha_beta"));
        assert!(id.contains(&format!("_{}_", std::process::id())));
    }

    #[test]
    fn test_same_quantum_items_get_distinct_entropy() {
        let (_temp_dir, config) = setup();
        let mut writer = ItemWriter::new(&config).unwrap();
        let q = QueueRef::new("q");
        let options = EnqueueOptions {
            now: Some(fixed_now()),
            ..Default::default()
        };

        let first = writer.enqueue_with(&q, &b"a"[..], &["x"], &options).unwrap();
        let second = writer.enqueue_with(&q, &b"b"[..], &["x"], &options).unwrap();

        assert!(first.starts_with("_20260101120000_0_"));
        assert!(second.starts_with("_20260101120000_1_"));
    }

    #[test]
    fn test_collision_bumps_entropy_across_writers() {
        let (_temp_dir, config) = setup();
        let q = QueueRef::new("q");
        let options = EnqueueOptions {
            now: Some(fixed_now()),
            ..Default::default()
        };

        let a = ItemWriter::new(&config)
            .unwrap()
            .enqueue_with(&q, &b"a"[..], &["x"], &options)
            .unwrap();
        let b = ItemWriter::new(&config)
            .unwrap()
            .enqueue_with(&q, &b"b"[..], &["x"], &options)
            .unwrap();

        assert_ne!(a, b);
        assert!(b.starts_with("_20260101120000_1_"));
    }

    #[test]
    fn test_fixed_entropy_collision_is_an_error() {
        let (_temp_dir, config) = setup();
        let q = QueueRef::new("q");
        let options = EnqueueOptions {
            now: Some(fixed_now()),
            entropy: Some(7),
            ..Default::default()
        };
        let mut writer = ItemWriter::new(&config).unwrap();
        writer.enqueue_with(&q, &b"a"[..], &["x"], &options).unwrap();

        let err = ItemWriter::new(&config)
            .unwrap()
            .enqueue_with(&q, &b"b"[..], &["x"], &options)
            .unwrap_err();
        assert!(matches!(err, FsqError::Enqueue { .. }));
        assert_eq!(err.raw_os_error(), Some(libc::EEXIST));
    }

    #[test]
    fn test_enqueue_max_tries_bounds_collisions() {
        let (_temp_dir, mut config) = setup();
        config.policy.enqueue_max_tries = 2;
        let q = QueueRef::new("q");
        let options = EnqueueOptions {
            now: Some(fixed_now()),
            ..Default::default()
        };
        for _ in 0..2 {
            ItemWriter::new(&config)
                .unwrap()
                .enqueue_with(&q, &b"a"[..], &["x"], &options)
                .unwrap();
        }

        let err = ItemWriter::new(&config)
            .unwrap()
            .enqueue_with(&q, &b"a"[..], &["x"], &options)
            .unwrap_err();
        assert!(matches!(err, FsqError::EnqueueMaxTries { attempts: 2, .. }));
    }

    #[test]
    fn test_entropy_overflow_is_bounded() {
        let (_temp_dir, config) = setup();
        let q = QueueRef::new("q");
        let options = EnqueueOptions {
            now: Some(fixed_now()),
            entropy: Some(u64::MAX),
            ..Default::default()
        };
        let mut writer = ItemWriter::new(&config).unwrap();
        writer.enqueue_with(&q, &b"a"[..], &["x"], &options).unwrap();
        let next = EnqueueOptions {
            entropy: None,
            ..options
        };
        let id = writer.enqueue_with(&q, &b"b"[..], &["x"], &next).unwrap();
        assert!(id.starts_with("_20260101120000_0_"));

        let codec = config.codec().unwrap();
        let mut fields = ItemFields {
            now: "20260101120000".to_string(),
            entropy: u64::MAX,
            pid: std::process::id(),
            host: local_hostname().unwrap(),
            tries: 0,
            arguments: vec!["x".to_string()],
        };
        let dir = config.layout().tmp(&q).unwrap();
        let err = place_unique(
            &dir,
            &codec,
            &mut fields,
            EntropyMode::Flexible,
            0,
            |_| Err::<(), _>(std::io::Error::from(ErrorKind::AlreadyExists)),
            enqueue_err,
        )
        .unwrap_err();
        assert!(matches!(err, FsqError::EnqueueMaxTries { attempts: 1, .. }));
    }

    #[test]
    fn test_missing_queue_leaves_nothing_behind() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config::with_root(temp_dir.path());
        let err = ItemWriter::new(&config)
            .unwrap()
            .senqueue(&QueueRef::new("absent"), b"x", &["a"])
            .unwrap_err();
        assert!(matches!(err, FsqError::Enqueue { .. }));
        assert_eq!(err.raw_os_error(), Some(libc::ENOENT));
    }

    #[test]
    fn test_item_mode_applied() {
        use std::os::unix::fs::PermissionsExt;
        let (temp_dir, config) = setup();
        let mut writer = ItemWriter::new(&config).unwrap().with_mode(0o604);
        let id = writer.senqueue(&QueueRef::new("q"), b"x", &[] as &[&str]).unwrap();
        let meta = fs::metadata(temp_dir.path().join("q/queue").join(id)).unwrap();
        assert_eq!(meta.permissions().mode() & 0o7777, 0o604);
    }

    #[test]
    fn test_bad_timefmt_is_rejected() {
        let (_temp_dir, mut config) = setup();
        config.codec.timefmt = "%Q".to_string();
        let err = ItemWriter::new(&config)
            .unwrap()
            .senqueue(&QueueRef::new("q"), b"x", &["a"])
            .unwrap_err();
        assert!(matches!(err, FsqError::TimeFmt { .. }));
    }
}
