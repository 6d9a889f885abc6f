use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_MAX_PAGE_SIZE: usize = 10_000;
pub const DEFAULT_MAX_UPLOAD_SIZE: usize = 16 * 1024 * 1024;
pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 5_000;

/// Strategy used when the store has to synthesize a row identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdStrategy {
    #[default]
    Uuid,
    Ulid,
    Nanoid,
}

/// Store configuration. Normally supplied by the embedding application,
/// but can also be loaded from a YAML file via [`StoreConfig::from_file`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Directory holding one `<name>.csv` file per dataset.
    pub root: PathBuf,
    #[serde(default = "default_max_page_size")]
    pub max_page_size: usize,
    #[serde(default = "default_max_upload_size")]
    pub max_upload_size: usize,
    /// Bounded wait for the per-dataset write lock, in milliseconds.
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
    #[serde(default)]
    pub id_strategy: IdStrategy,
}

impl StoreConfig {
    /// Configuration with defaults for everything but the data directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        StoreConfig {
            root: root.into(),
            max_page_size: DEFAULT_MAX_PAGE_SIZE,
            max_upload_size: DEFAULT_MAX_UPLOAD_SIZE,
            lock_timeout_ms: DEFAULT_LOCK_TIMEOUT_MS,
            id_strategy: IdStrategy::default(),
        }
    }

    /// Load configuration from a YAML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&raw)?)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

fn default_max_page_size() -> usize {
    DEFAULT_MAX_PAGE_SIZE
}

fn default_max_upload_size() -> usize {
    DEFAULT_MAX_UPLOAD_SIZE
}

fn default_lock_timeout_ms() -> u64 {
    DEFAULT_LOCK_TIMEOUT_MS
}
