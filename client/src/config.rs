//! Client configuration, loaded the same way [`jdfsd`'s own config is][1]:
//! a `serde::Deserialize` struct with a `Default` impl used whenever the
//! file is missing or malformed.
//!
//! [1]: ../../server/src/config.rs

use serde::Deserialize;
use std::path::Path;

#[derive(Deserialize, Debug, Clone)]
pub struct Config {
    /// TTL handed to the kernel on every `ReplyAttr` when the server's own
    /// `attr_valid_ms` is absent or larger (a local ceiling, not a second
    /// cache — the kernel is the only place attributes are cached on this
    /// side of the wire).
    pub kernel_attr_timeout_seconds: u64,
    /// Same, for `ReplyEntry`'s entry TTL.
    pub kernel_entry_timeout_seconds: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            kernel_attr_timeout_seconds: 1,
            kernel_entry_timeout_seconds: 1,
        }
    }
}

pub fn load_config(path: &Path) -> Config {
    if !path.exists() {
        tracing::info!(path = %path.display(), "config file not found, using defaults");
        return Config::default();
    }
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "could not read config, using defaults");
            return Config::default();
        }
    };
    match toml::from_str(&content) {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "could not parse config, using defaults");
            Config::default()
        }
    }
}
