//! Centralized application directory paths.
//!
//! Uses the [`dirs`] crate for platform-appropriate directory resolution.
//!
//! # Directory Layout
//!
//! | Purpose | macOS | Linux |
//! |---------|-------|-------|
//! | App data | `~/Library/Application Support/hubcomplete/` | `~/.local/share/hubcomplete/` |
//! | Config | `~/Library/Application Support/hubcomplete/` | `~/.config/hubcomplete/` |
//!
//! # Environment Overrides
//!
//! - `HUBCOMPLETE_DATA_DIR` overrides [`data_dir`]
//! - `HUBCOMPLETE_CONFIG_DIR` overrides [`config_dir`]

use std::path::PathBuf;

const APP_DIR: &str = "hubcomplete";

/// Application data root directory.
///
/// Holds the persisted store (cached results and rate-limit state).
#[must_use]
pub fn data_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("HUBCOMPLETE_DATA_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::data_dir()
        .map(|d| d.join(APP_DIR))
        .unwrap_or_else(|| PathBuf::from("/tmp/hubcomplete-data"))
}

/// Application config directory.
#[must_use]
pub fn config_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("HUBCOMPLETE_CONFIG_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::config_dir()
        .map(|d| d.join(APP_DIR))
        .unwrap_or_else(|| PathBuf::from("/tmp/hubcomplete-config"))
}

/// Main config file path (`config_dir()/config.toml`).
#[must_use]
pub fn config_file() -> PathBuf {
    config_dir().join("config.toml")
}

/// Key-value store directory (`data_dir()/store/`).
#[must_use]
pub fn store_dir() -> PathBuf {
    data_dir().join("store")
}
