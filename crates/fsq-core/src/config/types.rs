//! Configuration types

use crate::codec::Codec;
use crate::error::FsqError;
use crate::path::Layout;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Complete configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding every queue; empty means the current directory
    #[serde(default)]
    pub root: PathBuf,
    /// Item name codec
    #[serde(default)]
    pub codec: CodecConfig,
    /// Names of the per-queue subdirectories and marker files
    #[serde(default)]
    pub names: DirNames,
    /// Owners and modes applied to created items and queues
    #[serde(default)]
    pub ownership: OwnershipConfig,
    /// Locking and retry policy
    #[serde(default)]
    pub policy: PolicyConfig,
    /// Exit-code-like sentinels understood by `done`
    #[serde(default)]
    pub codes: ExitCodes,
}

impl Config {
    /// Default configuration rooted at `root`
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Default::default()
        }
    }

    /// Validated name codec for this configuration
    pub fn codec(&self) -> Result<Codec, FsqError> {
        Codec::new(&self.codec.delimiter, &self.codec.escape)
    }

    pub fn layout(&self) -> Layout {
        Layout::new(&self.root, &self.names)
    }
}

/// Item name codec configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecConfig {
    /// Field delimiter; must be a single character
    pub delimiter: String,
    /// Escape marker; must be a single character
    pub escape: String,
    /// strftime-style pattern for the creation timestamp field
    pub timefmt: String,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            delimiter: "_".to_string(),
            escape: "\\".to_string(),
            timefmt: "%Y%m%d%H%M%S".to_string(),
        }
    }
}

/// Names of queue subdirectories and marker files
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirNames {
    pub tmp: String,
    pub queue: String,
    pub done: String,
    pub fail: String,
    pub down: String,
    pub trigger: String,
    pub hosts: String,
    pub hosts_trigger: String,
}

impl Default for DirNames {
    fn default() -> Self {
        Self {
            tmp: "tmp".to_string(),
            queue: "queue".to_string(),
            done: "done".to_string(),
            fail: "fail".to_string(),
            down: "down".to_string(),
            trigger: "trigger".to_string(),
            hosts: "hosts".to_string(),
            hosts_trigger: "hosts-trigger".to_string(),
        }
    }
}

/// Ownership and permission bits for created files and directories
///
/// Users and groups may be names or numeric ids; unset leaves ownership to
/// the creating process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OwnershipConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_group: Option<String>,
    pub item_mode: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_group: Option<String>,
    pub queue_mode: u32,
}

impl Default for OwnershipConfig {
    fn default() -> Self {
        Self {
            item_user: None,
            item_group: None,
            item_mode: 0o640,
            queue_user: None,
            queue_group: None,
            queue_mode: 0o750,
        }
    }
}

/// Locking and retry policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Take a non-blocking exclusive flock on every scanned item
    pub lock: bool,
    /// Seconds after enqueue before a temporary failure escalates (0 = never)
    pub ttl: u64,
    /// Tries before a temporary failure escalates (0 = unbounded)
    pub max_tries: u32,
    /// Name collisions tolerated per enqueue (0 = unbounded)
    pub enqueue_max_tries: u32,
    /// Install queues with a trigger FIFO
    pub use_trigger: bool,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            lock: true,
            ttl: 0,
            max_tries: 0,
            enqueue_max_tries: default_enqueue_max_tries(),
            use_trigger: false,
        }
    }
}

fn default_enqueue_max_tries() -> u32 {
    500
}

/// Sentinel codes mapping a worker's exit status to a completion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExitCodes {
    pub success: i32,
    pub fail_tmp: i32,
    pub fail_perm: i32,
}

impl Default for ExitCodes {
    fn default() -> Self {
        Self {
            success: 0,
            fail_tmp: 111,
            fail_perm: 100,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = Config::default();
        assert_eq!(config.root, PathBuf::new());
        assert_eq!(config.codec.delimiter, "_");
        assert_eq!(config.codec.escape, "\\");
        assert_eq!(config.codec.timefmt, "%Y%m%d%H%M%S");
        assert_eq!(config.names.queue, "queue");
        assert_eq!(config.ownership.item_mode, 0o640);
        assert!(config.policy.lock);
        assert_eq!(config.policy.ttl, 0);
        assert_eq!(config.policy.max_tries, 0);
        assert_eq!(config.codes.fail_tmp, 111);
        assert_eq!(config.codes.fail_perm, 100);
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::with_root("/var/spool/fsq");
        let toml_str = toml::to_string(&config).unwrap();
        let deserialized: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(config, deserialized);
    }

    #[test]
    fn test_partial_sections_keep_defaults() {
        let toml_str = r#"
root = "/srv/queues"

[codec]
escape = "^"

[policy]
max_tries = 3
ttl = 60

[ownership]
item_mode = 0o600
"#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.root, PathBuf::from("/srv/queues"));
        assert_eq!(config.codec.escape, "^");
        assert_eq!(config.codec.delimiter, "_");
        assert_eq!(config.policy.max_tries, 3);
        assert_eq!(config.policy.ttl, 60);
        assert!(config.policy.lock);
        assert_eq!(config.ownership.item_mode, 0o600);
        assert_eq!(config.ownership.queue_mode, 0o750);
        assert_eq!(config.names, DirNames::default());
        assert_eq!(config.codec().unwrap().escape(), '^');
    }

    #[test]
    fn test_invalid_codec_settings_rejected() {
        let mut config = Config::default();
        config.codec.delimiter = "--".to_string();
        assert!(matches!(config.codec(), Err(FsqError::Encode { .. })));
    }
}
