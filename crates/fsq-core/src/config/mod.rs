//! Configuration resolution
//!
//! Resolves configuration from multiple sources with priority:
//! 1. Command-line flags (passed as parameters)
//! 2. `FSQ_*` environment variables
//! 3. Explicit config file (`--config` or `FSQ_CONFIG`)
//! 4. Global config (~/.config/fsq/config.toml)
//! 5. Defaults

mod discovery;
mod types;

pub use discovery::{ConfigError, ConfigOverrides, load_config_file, resolve_config, resolve_config_with};
pub use types::{CodecConfig, Config, DirNames, ExitCodes, OwnershipConfig, PolicyConfig};
