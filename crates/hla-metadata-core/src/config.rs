//! Dictionary configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::HlaResult;

pub const DEFAULT_DATA_ROOT: &str = "./hla-data";
pub const DEFAULT_MAX_CACHED_VERSIONS: usize = 16;
pub const DEFAULT_BUILD_WORKERS: usize = 4;
pub const MAX_BUILD_WORKERS: usize = 64;

pub const ENV_DATA_ROOT: &str = "HLA_METADATA_ROOT";
pub const ENV_MAX_VERSIONS: &str = "HLA_METADATA_MAX_VERSIONS";
pub const ENV_BUILD_WORKERS: &str = "HLA_METADATA_BUILD_WORKERS";
pub const ENV_INCLUDE_CONFIDENTIAL: &str = "HLA_METADATA_INCLUDE_CONFIDENTIAL";

fn default_data_root() -> PathBuf {
    PathBuf::from(DEFAULT_DATA_ROOT)
}

fn default_max_cached_versions() -> usize {
    DEFAULT_MAX_CACHED_VERSIONS
}

fn default_build_workers() -> usize {
    DEFAULT_BUILD_WORKERS
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DictionaryConfig {
    #[serde(default = "default_data_root")]
    pub data_root: PathBuf,
    /// Upper bound on `Ready` indexes held by the dictionary.
    #[serde(default = "default_max_cached_versions")]
    pub max_cached_versions: usize,
    #[serde(default = "default_build_workers")]
    pub build_workers: usize,
    #[serde(default)]
    pub include_confidential: bool,
}

impl Default for DictionaryConfig {
    fn default() -> Self {
        Self {
            data_root: default_data_root(),
            max_cached_versions: DEFAULT_MAX_CACHED_VERSIONS,
            build_workers: DEFAULT_BUILD_WORKERS,
            include_confidential: false,
        }
    }
}

pub fn clamp_count(value: usize, minimum: usize, maximum: usize) -> usize {
    value.max(minimum).min(maximum)
}

fn env_flag(name: &str, default: bool) -> bool {
    match std::env::var(name) {
        Ok(val) => {
            let v = val.trim().to_lowercase();
            if default {
                !matches!(v.as_str(), "0" | "false" | "no" | "off")
            } else {
                matches!(v.as_str(), "1" | "true" | "yes" | "on")
            }
        }
        Err(_) => default,
    }
}

fn env_count(name: &str) -> Option<usize> {
    std::env::var(name).ok()?.trim().parse().ok()
}

impl DictionaryConfig {
    pub fn with_data_root(data_root: impl Into<PathBuf>) -> Self {
        Self {
            data_root: data_root.into(),
            ..Self::default()
        }
    }

    pub fn from_json_file(path: &Path) -> HlaResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        Ok(config.normalized())
    }

    /// Defaults overridden by `HLA_METADATA_*` variables. Unparseable
    /// numbers fall back to the default.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(root) = std::env::var(ENV_DATA_ROOT) {
            if !root.trim().is_empty() {
                config.data_root = PathBuf::from(root.trim());
            }
        }
        if let Some(max_versions) = env_count(ENV_MAX_VERSIONS) {
            config.max_cached_versions = max_versions;
        }
        if let Some(workers) = env_count(ENV_BUILD_WORKERS) {
            config.build_workers = workers;
        }
        config.include_confidential = env_flag(ENV_INCLUDE_CONFIDENTIAL, false);
        config.normalized()
    }

    pub fn normalized(mut self) -> Self {
        self.max_cached_versions = self.max_cached_versions.max(1);
        self.build_workers = clamp_count(self.build_workers, 1, MAX_BUILD_WORKERS);
        self
    }
}
