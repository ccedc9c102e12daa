//! Application directory paths.
//!
//! Uses the [`dirs`] crate for platform-appropriate directory resolution.
//!
//! | Purpose | macOS | Linux |
//! |---------|-------|-------|
//! | Config | `~/Library/Application Support/zefira/` | `~/.config/zefira/` |
//! | Data | `~/Library/Application Support/zefira/` | `~/.local/share/zefira/` |
//!
//! Set `ZEFIRA_CONFIG_DIR` or `ZEFIRA_DATA_DIR` to override either directory
//! (tests, custom deployments).

use std::path::PathBuf;

/// Environment variable overriding [`config_dir`].
pub const CONFIG_DIR_ENV: &str = "ZEFIRA_CONFIG_DIR";

/// Environment variable overriding [`data_dir`].
pub const DATA_DIR_ENV: &str = "ZEFIRA_DATA_DIR";

/// Application config directory.
///
/// Resolves to `dirs::config_dir()/zefira/` by default.
#[must_use]
pub fn config_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os(CONFIG_DIR_ENV) {
        return PathBuf::from(override_dir);
    }
    dirs::config_dir()
        .map(|d| d.join("zefira"))
        .unwrap_or_else(|| PathBuf::from("/tmp/zefira-config"))
}

/// Main config file (`config_dir()/config.toml`).
#[must_use]
pub fn config_file() -> PathBuf {
    config_dir().join("config.toml")
}

/// Application data directory.
///
/// Resolves to `dirs::data_dir()/zefira/` by default.
#[must_use]
pub fn data_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os(DATA_DIR_ENV) {
        return PathBuf::from(override_dir);
    }
    dirs::data_dir()
        .map(|d| d.join("zefira"))
        .unwrap_or_else(|| PathBuf::from("/tmp/zefira-data"))
}

/// Persisted toolkit state (`data_dir()/toolkits.json`).
#[must_use]
pub fn toolkit_state_file() -> PathBuf {
    data_dir().join("toolkits.json")
}

/// Request and reply dumps (`data_dir()/debug/`), one directory per session.
#[must_use]
pub fn debug_dir() -> PathBuf {
    data_dir().join("debug")
}
