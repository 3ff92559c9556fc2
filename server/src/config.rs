//! Server configuration: a `serde::Deserialize` struct with a `Default`
//! impl used whenever the config file is missing or malformed.

use serde::Deserialize;
use std::path::Path;

#[derive(Deserialize, Debug, Clone)]
pub struct Config {
    /// How long a cached inode attribute is trusted before a re-`lstat`.
    pub meta_attrs_cache_ms: u64,
    /// How long a cached directory children map is trusted before a
    /// re-`readdir`.
    pub dir_children_cache_ms: u64,
    /// TCP port the single RPC transport listens on (spec §6).
    pub rpc_port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            meta_attrs_cache_ms: 1_000,
            dir_children_cache_ms: 5_000,
            rpc_port: jdfs_proto::ops::DEFAULT_PORT,
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
