//! Configuration for the wallet ledger

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

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

    /// RocksDB configuration
    pub rocksdb: RocksDBConfig,

    /// Commit configuration
    pub commit: CommitConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data/wallet-ledger"),
            service_name: "wallet-ledger".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            rocksdb: RocksDBConfig::default(),
            commit: CommitConfig::default(),
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

    /// Target file size (MB)
    pub target_file_size_mb: u64,

    /// Max background jobs (compaction + flush)
    pub max_background_jobs: i32,

    /// Enable statistics
    pub enable_statistics: bool,
}

impl Default for RocksDBConfig {
    fn default() -> Self {
        Self {
            write_buffer_size_mb: 64,
            max_write_buffer_number: 4,
            target_file_size_mb: 64,
            max_background_jobs: 4,
            enable_statistics: false,
        }
    }
}

/// Commit configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CommitConfig {
    /// How long a commit waits for a contended wallet lock (milliseconds)
    pub lock_timeout_ms: u64,

    /// Deadline applied when the caller supplies none (milliseconds, 0 = none)
    pub default_timeout_ms: u64,

    /// fsync the WAL on every commit
    pub sync_writes: bool,
}

impl Default for CommitConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: 1_000,
            default_timeout_ms: 5_000,
            sync_writes: true,
        }
    }
}

impl CommitConfig {
    /// Lock wait budget
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    /// Default commit deadline, if any
    pub fn default_timeout(&self) -> Option<Duration> {
        (self.default_timeout_ms > 0).then(|| Duration::from_millis(self.default_timeout_ms))
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(data_dir) = std::env::var("WALLET_LEDGER_DATA_DIR") {
            config.data_dir = PathBuf::from(data_dir);
        }

        if let Ok(ms) = std::env::var("WALLET_LEDGER_LOCK_TIMEOUT_MS") {
            config.commit.lock_timeout_ms = parse_env("WALLET_LEDGER_LOCK_TIMEOUT_MS", &ms)?;
        }

        if let Ok(ms) = std::env::var("WALLET_LEDGER_COMMIT_TIMEOUT_MS") {
            config.commit.default_timeout_ms = parse_env("WALLET_LEDGER_COMMIT_TIMEOUT_MS", &ms)?;
        }

        if let Ok(sync) = std::env::var("WALLET_LEDGER_SYNC_WRITES") {
            config.commit.sync_writes = parse_env("WALLET_LEDGER_SYNC_WRITES", &sync)?;
        }

        Ok(config)
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> crate::Result<T> {
    value
        .parse()
        .map_err(|_| crate::Error::Config(format!("Invalid value for {}: {:?}", name, value)))
}
