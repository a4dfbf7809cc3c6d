//! Configuration for the voting ledger

use crate::registry::CandidateRegistry;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Ledger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Data directory for RocksDB
    pub data_dir: PathBuf,

    /// Service name
    pub service_name: String,

    /// Service version
    pub service_version: String,

    /// Candidates seeded when the registry is empty
    pub candidates: Vec<String>,

    /// Ed25519 seed file; events are signed when set (created on first use)
    pub signing_key_path: Option<PathBuf>,

    /// Capacity of the event broadcast channel
    pub event_channel_capacity: usize,

    /// Capacity of the writer mailbox (backpressure)
    pub mailbox_capacity: usize,

    /// RocksDB configuration
    pub rocksdb: RocksDBConfig,

    /// Batching configuration
    pub batching: BatchingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data/voting"),
            service_name: "voting-ledger".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            candidates: Vec::new(),
            signing_key_path: None,
            event_channel_capacity: 1024,
            mailbox_capacity: 1000,
            rocksdb: RocksDBConfig::default(),
            batching: BatchingConfig::default(),
        }
    }
}

/// RocksDB configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RocksDBConfig {
    /// Write buffer size (MB)
    pub write_buffer_size_mb: usize,

    /// Max write buffers
    pub max_write_buffer_number: i32,

    /// Max background jobs (compaction + flush)
    pub max_background_jobs: i32,

    /// Enable statistics
    pub enable_statistics: bool,

    /// fsync every commit (a returned vote survives a crash)
    pub sync_writes: bool,
}

impl Default for RocksDBConfig {
    fn default() -> Self {
        Self {
            write_buffer_size_mb: 64,
            max_write_buffer_number: 4,
            max_background_jobs: 2,
            enable_statistics: false,
            sync_writes: true,
        }
    }
}

/// Batching (group commit) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchingConfig {
    /// Maximum votes per commit group
    pub max_batch_size: usize,

    /// Batch timeout (milliseconds)
    pub batch_timeout_ms: u64,

    /// Enable batching
    pub enabled: bool,
}

impl Default for BatchingConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 64,
            batch_timeout_ms: 5,
            enabled: true,
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(data_dir) = std::env::var("VOTING_DATA_DIR") {
            config.data_dir = PathBuf::from(data_dir);
        }

        if let Ok(candidates) = std::env::var("VOTING_CANDIDATES") {
            config.candidates = candidates
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(String::from)
                .collect();
        }

        if let Ok(path) = std::env::var("VOTING_SIGNING_KEY") {
            config.signing_key_path = Some(PathBuf::from(path));
        }

        if let Ok(value) = std::env::var("VOTING_SYNC_WRITES") {
            config.rocksdb.sync_writes = parse_bool("VOTING_SYNC_WRITES", &value)?;
        }

        if let Ok(value) = std::env::var("VOTING_BATCHING") {
            config.batching.enabled = parse_bool("VOTING_BATCHING", &value)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the ledger cannot run with
    pub fn validate(&self) -> crate::Result<()> {
        if self.batching.max_batch_size == 0 {
            return Err(crate::Error::Config(
                "batching.max_batch_size must be at least 1".to_string(),
            ));
        }
        if self.batching.batch_timeout_ms == 0 {
            return Err(crate::Error::Config(
                "batching.batch_timeout_ms must be at least 1".to_string(),
            ));
        }
        if self.mailbox_capacity == 0 || self.event_channel_capacity == 0 {
            return Err(crate::Error::Config(
                "channel capacities must be at least 1".to_string(),
            ));
        }
        for (index, name) in self.candidates.iter().enumerate() {
            CandidateRegistry::validate_name(name).map_err(|e| {
                crate::Error::Config(format!("candidates[{}] is invalid: {}", index, e))
            })?;
        }
        Ok(())
    }
}

fn parse_bool(key: &str, value: &str) -> crate::Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(crate::Error::Config(format!(
            "{} must be a boolean, got {:?}",
            key, other
        ))),
    }
}
