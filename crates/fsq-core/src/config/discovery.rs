//! Configuration discovery and resolution

use super::types::Config;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

/// Configuration error
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O error
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// TOML parsing error
    #[error("TOML parsing error in {path}: {source}")]
    TomlParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    /// Environment variable holds a value of the wrong shape
    #[error("invalid value for {var}: {value:?}")]
    InvalidEnv { var: &'static str, value: String },
}

/// Command-line overrides for configuration
#[derive(Debug, Default, Clone)]
pub struct ConfigOverrides {
    /// Override queue root
    pub root: Option<PathBuf>,
    /// Path to config file override
    pub config_path: Option<PathBuf>,
    /// Override lock-on-scan
    pub lock: Option<bool>,
    /// Override TTL seconds
    pub ttl: Option<u64>,
    /// Override max tries
    pub max_tries: Option<u32>,
    /// Override success sentinel
    pub success_code: Option<i32>,
    /// Override temporary failure sentinel
    pub fail_tmp_code: Option<i32>,
    /// Override permanent failure sentinel
    pub fail_perm_code: Option<i32>,
}

/// Resolve configuration from all sources
///
/// Priority (highest to lowest):
/// 1. Command-line overrides
/// 2. `FSQ_*` environment variables
/// 3. Explicit config file (`--config` or `FSQ_CONFIG`)
/// 4. Global config (~/.config/fsq/config.toml)
/// 5. Defaults
pub fn resolve_config(overrides: &ConfigOverrides, home_dir: &Path) -> Result<Config, ConfigError> {
    resolve_config_with(overrides, home_dir, |var| std::env::var(var).ok())
}

/// [`resolve_config`] with an injectable environment lookup
pub fn resolve_config_with<F>(
    overrides: &ConfigOverrides,
    home_dir: &Path,
    env: F,
) -> Result<Config, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = Config::default();

    // 4. Try global config
    let global_config_path = home_dir.join(".config/fsq/config.toml");
    if global_config_path.exists() {
        match load_config_file(&global_config_path) {
            Ok(file_config) => config = file_config,
            Err(e) => warn!("Failed to parse global config at {global_config_path:?}: {e}"),
        }
    }

    // 3. Explicit config file must parse when named
    let explicit = overrides
        .config_path
        .clone()
        .or_else(|| env("FSQ_CONFIG").filter(|p| !p.trim().is_empty()).map(PathBuf::from));
    if let Some(path) = explicit {
        config = load_config_file(&path)?;
    }

    // 2. Apply environment variables
    apply_env_overrides(&mut config, &env)?;

    // 1. Apply command-line overrides
    apply_cli_overrides(&mut config, overrides);

    Ok(config)
}

/// Load config from a TOML file
pub fn load_config_file(path: &Path) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    toml::from_str(&contents).map_err(|e| ConfigError::TomlParse {
        path: path.to_path_buf(),
        source: e,
    })
}

fn parse_env<T, F>(env: &F, var: &'static str, parse: fn(&str) -> Option<T>) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match env(var) {
        Some(value) => parse(value.trim())
            .map(Some)
            .ok_or(ConfigError::InvalidEnv { var, value }),
        None => Ok(None),
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_mode(value: &str) -> Option<u32> {
    let digits = value.strip_prefix("0o").unwrap_or(value);
    u32::from_str_radix(digits, 8).ok().filter(|mode| *mode <= 0o7777)
}

/// Apply environment variable overrides
fn apply_env_overrides<F>(config: &mut Config, env: &F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(root) = env("FSQ_ROOT") {
        config.root = PathBuf::from(root);
    }

    let strings: [(&str, &mut String); 11] = [
        ("FSQ_DELIMITER", &mut config.codec.delimiter),
        ("FSQ_ENCODE", &mut config.codec.escape),
        ("FSQ_TIMEFMT", &mut config.codec.timefmt),
        ("FSQ_TMP", &mut config.names.tmp),
        ("FSQ_QUEUE", &mut config.names.queue),
        ("FSQ_DONE", &mut config.names.done),
        ("FSQ_FAIL", &mut config.names.fail),
        ("FSQ_DOWN", &mut config.names.down),
        ("FSQ_TRIGGER", &mut config.names.trigger),
        ("FSQ_HOSTS", &mut config.names.hosts),
        ("FSQ_HOSTS_TRIGGER", &mut config.names.hosts_trigger),
    ];
    for (var, slot) in strings {
        if let Some(value) = env(var) {
            *slot = value;
        }
    }

    let owners: [(&str, &mut Option<String>); 4] = [
        ("FSQ_ITEM_USER", &mut config.ownership.item_user),
        ("FSQ_ITEM_GROUP", &mut config.ownership.item_group),
        ("FSQ_QUEUE_USER", &mut config.ownership.queue_user),
        ("FSQ_QUEUE_GROUP", &mut config.ownership.queue_group),
    ];
    for (var, slot) in owners {
        if let Some(value) = env(var) {
            *slot = Some(value).filter(|v| !v.is_empty());
        }
    }

    if let Some(mode) = parse_env(env, "FSQ_ITEM_MODE", parse_mode)? {
        config.ownership.item_mode = mode;
    }
    if let Some(mode) = parse_env(env, "FSQ_QUEUE_MODE", parse_mode)? {
        config.ownership.queue_mode = mode;
    }
    if let Some(lock) = parse_env(env, "FSQ_LOCK", parse_bool)? {
        config.policy.lock = lock;
    }
    if let Some(use_trigger) = parse_env(env, "FSQ_USE_TRIGGER", parse_bool)? {
        config.policy.use_trigger = use_trigger;
    }
    if let Some(ttl) = parse_env(env, "FSQ_TTL", |v| v.parse::<u64>().ok())? {
        config.policy.ttl = ttl;
    }
    if let Some(max_tries) = parse_env(env, "FSQ_MAX_TRIES", |v| v.parse::<u32>().ok())? {
        config.policy.max_tries = max_tries;
    }
    if let Some(tries) = parse_env(env, "FSQ_ENQUEUE_MAX_TRIES", |v| v.parse::<u32>().ok())? {
        config.policy.enqueue_max_tries = tries;
    }
    if let Some(code) = parse_env(env, "FSQ_SUCCESS", |v| v.parse::<i32>().ok())? {
        config.codes.success = code;
    }
    if let Some(code) = parse_env(env, "FSQ_FAIL_TMP", |v| v.parse::<i32>().ok())? {
        config.codes.fail_tmp = code;
    }
    if let Some(code) = parse_env(env, "FSQ_FAIL_PERM", |v| v.parse::<i32>().ok())? {
        config.codes.fail_perm = code;
    }

    Ok(())
}

/// Apply command-line overrides
fn apply_cli_overrides(config: &mut Config, overrides: &ConfigOverrides) {
    if let Some(ref root) = overrides.root {
        config.root = root.clone();
    }
    if let Some(lock) = overrides.lock {
        config.policy.lock = lock;
    }
    if let Some(ttl) = overrides.ttl {
        config.policy.ttl = ttl;
    }
    if let Some(max_tries) = overrides.max_tries {
        config.policy.max_tries = max_tries;
    }
    if let Some(code) = overrides.success_code {
        config.codes.success = code;
    }
    if let Some(code) = overrides.fail_tmp_code {
        config.codes.fail_tmp = code;
    }
    if let Some(code) = overrides.fail_perm_code {
        config.codes.fail_perm = code;
    }
}
