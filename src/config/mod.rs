//! Layered configuration for the two binaries (spec §6), matching the
//! teacher's `figment`-based `Config::new`/`Serialized` CLI-override
//! pattern: a TOML file on disk provides defaults, and CLI flags are
//! merged on top as a `Serialized` provider.

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::providers::{Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

/// Recognized configuration keys (spec §6), shared by both binaries where
/// the key applies to both; unused fields on one side are simply ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// `receiver.writeAheadLog.enable`
    pub wal_enable: bool,
    /// `receiver.blockInterval` (ms)
    pub block_interval_ms: u64,
    /// `receiver.blockQueueSize`
    pub block_queue_size: usize,
    /// `rpc.askTimeout` (ms)
    pub ask_timeout_ms: u64,
    /// `checkpoint.dir`, required when `wal_enable` is set.
    pub checkpoint_dir: Option<PathBuf>,
    /// `coordinator.host`
    pub coordinator_host: String,
    /// `coordinator.port`
    pub coordinator_port: u16,
    /// `log.verbose`
    pub log_verbose: bool,
    /// `metrics.enable`
    pub metrics_enable: bool,
    /// `metrics.addr`
    pub metrics_addr: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            wal_enable: false,
            block_interval_ms: 200,
            block_queue_size: 10,
            ask_timeout_ms: 30_000,
            checkpoint_dir: None,
            coordinator_host: "localhost".to_string(),
            coordinator_port: 7077,
            log_verbose: false,
            metrics_enable: false,
            metrics_addr: "0.0.0.0:9200".to_string(),
        }
    }
}

impl Config {
    /// Merges the on-disk TOML file (if present) under CLI overrides and
    /// extracts the result, falling back to [`Config::default`] for any
    /// key neither source supplies.
    pub fn new(config_path: &Path, cli_overrides: Serialized<impl Serialize>) -> Self {
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(config_path))
            .merge(cli_overrides)
            .extract()
            .expect("configuration failed to parse; check config.toml and CLI flags")
    }

    pub fn ask_timeout(&self) -> Duration {
        Duration::from_millis(self.ask_timeout_ms)
    }

    pub fn block_interval(&self) -> Duration {
        Duration::from_millis(self.block_interval_ms)
    }

    pub fn coordinator_addr(&self) -> String {
        format!("{}:{}", self.coordinator_host, self.coordinator_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::value::Value;
    use std::collections::HashMap;

    #[test]
    fn defaults_when_no_file_or_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.toml");
        let overrides: Serialized<HashMap<&str, Value>> = Serialized::from(HashMap::new(), "default");
        let config = Config::new(&path, overrides);
        assert_eq!(config.block_interval_ms, 200);
        assert!(!config.wal_enable);
    }

    #[test]
    fn cli_override_wins_over_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.toml");
        let mut user_dict = HashMap::new();
        user_dict.insert("block_interval_ms", Value::from(500u64));
        let overrides = Serialized::from(user_dict, "default");
        let config = Config::new(&path, overrides);
        assert_eq!(config.block_interval_ms, 500);
    }
}
