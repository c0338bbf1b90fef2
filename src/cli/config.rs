//! Node configuration file
//!
//! ```json
//! {
//!   "data_dir": "/var/lib/mqstore/n1",
//!   "node_name": "n1",
//!   "node_address": "10.0.0.1:5000",
//!   "helper_nodes": [{ "name": "n2", "address": "10.0.0.2:5000" }]
//! }
//! ```
//!
//! Everything except `data_dir`, `node_name` and `node_address` has a
//! default.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::replication::{Durability, HelperNode, ReplicationConfig};
use crate::store::StoreConfig;

use super::errors::{CliError, CliResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    pub data_dir: String,

    pub node_name: String,

    /// Address peers use to reach this node.
    pub node_address: String,

    #[serde(default = "default_group_name")]
    pub group_name: String,

    /// Other members known at startup.
    #[serde(default)]
    pub helper_nodes: Vec<HelperNode>,

    #[serde(default)]
    pub monitor: bool,

    #[serde(default)]
    pub durability: Durability,

    #[serde(default = "default_transfer_timeout_ms")]
    pub transfer_timeout_ms: u64,

    #[serde(default = "default_replication_ack_timeout_ms")]
    pub replication_ack_timeout_ms: u64,

    #[serde(default = "default_fsync")]
    pub fsync: bool,
}

fn default_group_name() -> String {
    "default".to_string()
}
fn default_transfer_timeout_ms() -> u64 {
    30_000
}
fn default_replication_ack_timeout_ms() -> u64 {
    10_000
}
fn default_fsync() -> bool {
    true
}

impl Config {
    pub fn load(path: &Path) -> CliResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            CliError::config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> CliResult<Self> {
        let config: Config = serde_json::from_str(content)
            .map_err(|e| CliError::config(format!("invalid config JSON: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> CliResult<()> {
        if self.data_dir.trim().is_empty() {
            return Err(CliError::config("data_dir must not be empty"));
        }
        self.to_replication_config()
            .validate()
            .map_err(|e| CliError::config(e.message().to_string()))
    }

    pub fn data_path(&self) -> &Path {
        Path::new(&self.data_dir)
    }

    pub fn to_replication_config(&self) -> ReplicationConfig {
        ReplicationConfig {
            group_name: self.group_name.clone(),
            node_name: self.node_name.clone(),
            node_address: self.node_address.clone(),
            monitor: self.monitor,
            helpers: self.helper_nodes.clone(),
            durability: self.durability,
            transfer_timeout: Duration::from_millis(self.transfer_timeout_ms),
            ack_timeout: Duration::from_millis(self.replication_ack_timeout_ms),
        }
    }

    pub fn to_store_config(&self) -> StoreConfig {
        StoreConfig {
            data_dir: self.data_path().to_path_buf(),
            fsync: self.fsync,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"{
        "data_dir": "/tmp/mq/n1",
        "node_name": "n1",
        "node_address": "127.0.0.1:5000"
    }"#;

    #[test]
    fn test_defaults() {
        let config = Config::parse(MINIMAL).unwrap();
        assert_eq!(config.group_name, "default");
        assert!(config.helper_nodes.is_empty());
        assert!(!config.monitor);
        assert_eq!(config.durability, Durability::Quorum);
        assert!(config.fsync);

        let replication = config.to_replication_config();
        assert_eq!(replication.transfer_timeout, Duration::from_secs(30));
        assert_eq!(replication.ack_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_helpers_and_durability() {
        let config = Config::parse(
            r#"{
                "data_dir": "/tmp/mq/n1",
                "node_name": "n1",
                "node_address": "127.0.0.1:5000",
                "durability": "local",
                "helper_nodes": [
                    { "name": "n2", "address": "127.0.0.1:5001" },
                    { "name": "m1", "address": "127.0.0.1:5002", "monitor": true }
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(config.durability, Durability::Local);
        assert_eq!(config.helper_nodes.len(), 2);
        assert!(config.helper_nodes[1].monitor);
    }

    #[test]
    fn test_missing_required_field() {
        let err = Config::parse(r#"{ "data_dir": "/tmp/mq" }"#).unwrap_err();
        assert_eq!(err.code(), "MQ_CLI_CONFIG_ERROR");
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let err = Config::parse(
            r#"{
                "data_dir": "/tmp/mq/n1",
                "node_name": "n1",
                "node_address": "127.0.0.1:5000",
                "transfer_timeout_ms": 0
            }"#,
        )
        .unwrap_err();
        assert!(matches!(err, CliError::Config(_)));
    }

    #[test]
    fn test_helper_shadowing_local_node_rejected() {
        let err = Config::parse(
            r#"{
                "data_dir": "/tmp/mq/n1",
                "node_name": "n1",
                "node_address": "127.0.0.1:5000",
                "helper_nodes": [{ "name": "n1", "address": "127.0.0.1:5001" }]
            }"#,
        )
        .unwrap_err();
        assert!(matches!(err, CliError::Config(_)));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mqstore.json");
        fs::write(&path, MINIMAL).unwrap();
        assert_eq!(Config::load(&path).unwrap().node_name, "n1");
        assert!(Config::load(&dir.path().join("absent.json")).is_err());
    }
}
