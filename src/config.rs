//! Server configuration, persisted as a JSON file.
//!
//! The config file is created with defaults on first run and loaded verbatim
//! afterwards, so a deployment can be tuned by editing the file and
//! restarting.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// default location of the configuration file, relative to the working directory
pub const DEFAULT_CONFIG_PATH: &str = "database_config.json";

/// Top-level server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// port the HTTP listener binds to
    pub port: u16,
    /// port the TCP listener binds to
    pub tcp_port: u16,
    /// value clients must present in the `X-API-Key` header
    pub api_key: String,
    /// version string reported by `GET /version`
    pub version: String,
    /// stem of the primary data file (kept for config compatibility)
    pub file_name: String,
    /// maximum number of root keys a single shard file may hold
    pub max_keys_per_file: usize,
    /// whether saved values are published to the cache on ingress
    pub cache_incoming_all: bool,
    /// time-to-live of ingress cache entries, in seconds
    pub cache_incoming_time_sec: u64,
    /// whether read results are published to the cache on egress
    pub cache_outgoing_all: bool,
    /// time-to-live of egress cache entries, in seconds
    pub cache_outgoing_time_sec: u64,
    /// encode shard files as BSON instead of JSON
    pub use_bson: bool,
    /// capacity of the save queue; producers block when it is full
    pub queue_save_size: usize,
    /// capacity of the delete queue
    pub queue_delete_size: usize,
    /// capacity of the read queue
    pub queue_read_size: usize,
    /// capacity of the add queue
    pub queue_add_size: usize,
    /// upper bound on concurrent shard-file readers/writers
    pub max_io_threads: usize,
    /// number of staged tasks that triggers an early batch flush
    pub batch_size: usize,
    /// auto-scaling file system settings (parsed but unused)
    pub asfs_config: AsfsConfig,
    /// auto-scaling queue system settings
    pub asqs_config: AsqsConfig,
}

/// Settings for the auto-scaling file system. The subsystem is a non-goal;
/// the block is parsed so existing config files keep loading.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AsfsConfig {
    pub enable: bool,
    pub max_cpu_usage: u8,
}

/// Settings for the worker autoscaler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AsqsConfig {
    /// whether the autoscaler loop runs at all
    pub enable: bool,
    /// seconds between queue-length samples
    pub interval_sec: u64,
    /// queue length above which one extra worker of that kind is spawned
    pub queue_threshold: usize,
    /// multiplier on the CPU count for the initial worker count per pipeline
    pub worker_count_multiplier: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            port: 5432,
            tcp_port: 5431,
            api_key: "database_access_api_key".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            file_name: "db".to_string(),
            max_keys_per_file: 10_000,
            cache_incoming_all: true,
            cache_incoming_time_sec: 120,
            cache_outgoing_all: true,
            cache_outgoing_time_sec: 120,
            use_bson: false,
            queue_save_size: 100_000,
            queue_delete_size: 100_000,
            queue_read_size: 100_000,
            queue_add_size: 100_000,
            max_io_threads: 100,
            batch_size: 100,
            asfs_config: AsfsConfig {
                enable: false,
                max_cpu_usage: 70,
            },
            asqs_config: AsqsConfig {
                enable: true,
                interval_sec: 5,
                queue_threshold: 1000,
                worker_count_multiplier: 1,
            },
        }
    }
}

impl Config {
    /// Loads the configuration from `path`. If the file does not exist it is
    /// created with default values first, so a fresh install comes up with a
    /// working config on disk.
    pub fn load_or_create(path: &Path) -> Result<Config> {
        if !path.exists() {
            let config = Config::default();
            fs::write(path, serde_json::to_vec_pretty(&config)?)?;
            return Ok(config);
        }
        let bytes = fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// TTL applied to cache entries published on the save/add path
    pub fn incoming_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_incoming_time_sec)
    }

    /// TTL applied to cache entries published on the read path
    pub fn outgoing_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_outgoing_time_sec)
    }

    /// period of the autoscaler sampling loop
    pub fn scale_interval(&self) -> Duration {
        Duration::from_secs(self.asqs_config.interval_sec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_round_trips_through_json() {
        let config = Config::default();
        let bytes = serde_json::to_vec(&config).unwrap();
        let back: Config = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(back.port, config.port);
        assert_eq!(back.max_keys_per_file, config.max_keys_per_file);
        assert_eq!(back.asqs_config.queue_threshold, config.asqs_config.queue_threshold);
    }

    #[test]
    fn load_or_create_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("database_config.json");

        let created = Config::load_or_create(&path).unwrap();
        assert!(path.exists());
        assert_eq!(created.tcp_port, 5431);

        // a second load reads the file that was just written
        let loaded = Config::load_or_create(&path).unwrap();
        assert_eq!(loaded.api_key, created.api_key);
    }
}
