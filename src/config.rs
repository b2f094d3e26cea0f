//! Objectmesh Configuration
//!
//! Configuration structures for the replication engine: node identity,
//! storage location, and replay/backoff tuning.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Main engine configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EngineConfig {
    /// Node-specific configuration
    #[serde(default)]
    pub node: NodeConfig,

    /// Replay queue and backoff configuration
    #[serde(default)]
    pub replay: ReplayConfig,

    /// Storage configuration
    #[serde(default)]
    pub storage: StorageConfig,
}

impl EngineConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: EngineConfig = toml::from_str(&contents)?;
        Ok(config)
    }
}

/// Node-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Unique node identifier
    pub id: String,

    /// Data directory for state and payload storage
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            id: String::new(),
            data_dir: default_data_dir(),
        }
    }
}

/// Replay queue and retry backoff configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayConfig {
    /// Maximum consecutive failed attempts before a node is quarantined
    /// from random replay selection
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base of the exponential backoff, in seconds. The n-th failed
    /// attempt defers the node by base^n seconds.
    #[serde(default = "default_base_retry_delay")]
    pub base_retry_delay_secs: u32,

    /// Grace window granted to a destination to acknowledge data receipt
    /// before the receival-failed escalation becomes eligible
    #[serde(default = "default_receival_failed_delay")]
    pub receival_failed_delay_secs: u32,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_retry_delay_secs: default_base_retry_delay(),
            receival_failed_delay_secs: default_receival_failed_delay(),
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Use the in-memory store instead of SQLite (testing/embedding)
    #[serde(default)]
    pub in_memory: bool,

    /// SQLite database file name within the data directory
    #[serde(default = "default_db_file")]
    pub db_file: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            in_memory: false,
            db_file: default_db_file(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("/var/lib/objectmesh")
}

fn default_max_retries() -> u32 {
    6
}

fn default_base_retry_delay() -> u32 {
    10
}

fn default_receival_failed_delay() -> u32 {
    300
}

fn default_db_file() -> String {
    "objects.db".to_string()
}
