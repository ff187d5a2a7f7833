//! Settings resolution helpers

use anyhow::Result;
use std::path::PathBuf;

/// Get user's home directory
pub fn get_home_dir() -> Result<PathBuf> {
    dirs::home_dir().ok_or_else(|| anyhow::anyhow!("Could not determine home directory"))
}

/// Parse a file mode given in octal, with or without a leading `0o`/`0`
pub fn parse_mode(value: &str) -> Result<u32, String> {
    let digits = value.strip_prefix("0o").unwrap_or(value);
    let mode = u32::from_str_radix(digits, 8).map_err(|_| format!("invalid octal mode: {value}"))?;
    if mode > 0o7777 {
        return Err(format!("mode out of range: {value}"));
    }
    Ok(mode)
}
