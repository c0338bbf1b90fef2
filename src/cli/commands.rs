//! CLI command implementations
//!
//! `start` runs a single process with the in-process loopback transport:
//! a node with no reachable peers elects itself master when it is the only
//! voting member. `members` and `inspect` read the record file directly and
//! never change it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{json, Value};

use crate::attributes::{node_attributes, replication_node_schema};
use crate::observability::MetricsRegistry;
use crate::message::MESSAGE_PREFIX;
use crate::replication::{
    LoopbackTransport, NodeDescriptor, ReplicationGroup, EPOCH_KEY, NODE_PREFIX,
};
use crate::storage::RecordStore;
use crate::store::MessageStore;

use super::args::{Cli, Command};
use super::config::Config;
use super::errors::{CliError, CliResult};
use super::io::{write_error, write_response};

/// Parse arguments and run the selected command.
///
/// Errors are also written to stdout as a JSON error object.
pub async fn run() -> CliResult<()> {
    let cli = Cli::parse_args();
    let result = run_command(cli.command).await;
    if let Err(err) = &result {
        write_error(err.code(), &err.to_string())?;
    }
    result
}

pub async fn run_command(cmd: Command) -> CliResult<()> {
    match cmd {
        Command::Init { config } => init(&config).await,
        Command::Start { config } => start(&config).await,
        Command::Members { config } => members(&config),
        Command::Inspect { config, prefix } => inspect(&config, &prefix),
    }
}

fn records_file(config: &Config) -> PathBuf {
    config.data_path().join("store").join("records.dat")
}

fn ensure_initialized(config: &Config) -> CliResult<()> {
    if records_file(config).exists() {
        Ok(())
    } else {
        Err(CliError::NotInitialized(config.data_path().to_path_buf()))
    }
}

fn open_records(config: &Config) -> CliResult<Arc<dyn RecordStore>> {
    Ok(config.to_store_config().open_records()?)
}

fn open_group(
    config: &Config,
    records: Arc<dyn RecordStore>,
    metrics: Arc<MetricsRegistry>,
) -> CliResult<Arc<ReplicationGroup>> {
    let transport = Arc::new(LoopbackTransport::new());
    Ok(Arc::new(ReplicationGroup::open(
        config.to_replication_config(),
        records,
        transport,
        metrics,
    )?))
}

/// Create the data directory and record the local node and its helpers.
pub async fn init(config_path: &Path) -> CliResult<()> {
    let config = Config::load(config_path)?;
    if records_file(&config).exists() {
        return Err(CliError::AlreadyInitialized(config.data_path().to_path_buf()));
    }

    let records = open_records(&config)?;
    let group = open_group(&config, records, Arc::new(MetricsRegistry::new()))?;
    let members = group.list_members()?;

    tracing::info!(
        data_dir = %config.data_dir,
        node = %config.node_name,
        members = members.len(),
        "data directory initialized"
    );
    write_response(json!({
        "data_dir": config.data_dir,
        "group": config.group_name,
        "node": config.node_name,
        "members": members.iter().map(|n| n.name.clone()).collect::<Vec<_>>(),
    }))
}

/// Open the store, join the group and serve until Ctrl-C.
pub async fn start(config_path: &Path) -> CliResult<()> {
    let config = Config::load(config_path)?;
    ensure_initialized(&config)?;

    let metrics = Arc::new(MetricsRegistry::new());
    let records = open_records(&config)?;
    let group = open_group(&config, Arc::clone(&records), Arc::clone(&metrics))?;
    let store = MessageStore::open(records, group, Arc::clone(&metrics))?;
    let snapshot = store.start().await?;
    let recovery = store.last_recovery()?;

    write_response(json!({
        "node": config.node_name,
        "role": snapshot.role,
        "epoch": snapshot.epoch,
        "recovery": {
            "queues": recovery.queues,
            "messages": recovery.messages,
            "enqueues": recovery.enqueues,
            "orphans_deleted": recovery.orphans.len(),
        },
    }))?;

    tokio::signal::ctrl_c().await?;
    tracing::info!(node = %config.node_name, "shutdown requested");
    store.close();

    write_response(json!({
        "stopped": true,
        "metrics": serde_json::to_value(metrics.snapshot())?,
    }))
}

/// Persisted node records with secure values masked.
pub fn members(config_path: &Path) -> CliResult<()> {
    let config = Config::load(config_path)?;
    ensure_initialized(&config)?;
    let records = open_records(&config)?;
    write_response(Value::Array(list_members(records.as_ref())?))
}

fn list_members(records: &dyn RecordStore) -> CliResult<Vec<Value>> {
    let epoch = match records.get(EPOCH_KEY)? {
        Some(bytes) => serde_json::from_slice::<u64>(&bytes)?,
        None => 0,
    };
    let schema = replication_node_schema();
    records
        .scan(NODE_PREFIX)?
        .into_iter()
        .map(|(_, bytes)| -> CliResult<Value> {
            let node = NodeDescriptor::decode(&bytes)?;
            Ok(Value::Object(schema.redact(&node_attributes(&node, epoch))))
        })
        .collect()
}

/// Keys under `prefix` with their value sizes. Configuration and enqueue
/// records are shown decoded; message bodies are not.
pub fn inspect(config_path: &Path, prefix: &str) -> CliResult<()> {
    let config = Config::load(config_path)?;
    ensure_initialized(&config)?;
    let records = open_records(&config)?;
    write_response(Value::Array(dump_keys(records.as_ref(), prefix)?))
}

fn dump_keys(records: &dyn RecordStore, prefix: &str) -> CliResult<Vec<Value>> {
    let mut entries = Vec::new();
    for (key, bytes) in records.scan(prefix)? {
        let mut entry = json!({ "key": key, "bytes": bytes.len() });
        if !key.starts_with(MESSAGE_PREFIX) && !key.starts_with(NODE_PREFIX) {
            if let Ok(value) = serde_json::from_slice::<Value>(&bytes) {
                entry["value"] = value;
            }
        }
        entries.push(entry);
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::{MASKED_VALUE, TRANSPORT_SECRET};
    use crate::storage::MemoryRecordStore;

    fn config_in(dir: &Path) -> Config {
        Config::parse(
            &json!({
                "data_dir": dir.join("n1").display().to_string(),
                "node_name": "n1",
                "node_address": "127.0.0.1:5000",
                "fsync": false,
                "helper_nodes": [{ "name": "n2", "address": "127.0.0.1:5001" }]
            })
            .to_string(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_init_records_local_node_and_helpers() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let path = dir.path().join("mqstore.json");
        std::fs::write(&path, serde_json::to_string(&config).unwrap()).unwrap();

        init(&path).await.unwrap();
        assert!(records_file(&config).exists());

        let records = open_records(&config).unwrap();
        let names: Vec<String> = list_members(records.as_ref())
            .unwrap()
            .into_iter()
            .map(|m| m["name"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["n1", "n2"]);
    }

    #[tokio::test]
    async fn test_init_twice_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let path = dir.path().join("mqstore.json");
        std::fs::write(&path, serde_json::to_string(&config).unwrap()).unwrap();

        init(&path).await.unwrap();
        let err = init(&path).await.unwrap_err();
        assert!(matches!(err, CliError::AlreadyInitialized(_)));
    }

    #[test]
    fn test_members_requires_init() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let path = dir.path().join("mqstore.json");
        std::fs::write(&path, serde_json::to_string(&config).unwrap()).unwrap();

        let err = members(&path).unwrap_err();
        assert!(matches!(err, CliError::NotInitialized(_)));
    }

    #[test]
    fn test_members_mask_transport_secret() {
        let records = MemoryRecordStore::new();
        let node = NodeDescriptor {
            transport_secret: Some("s3cret".to_string()),
            ..NodeDescriptor::new("n1", "127.0.0.1:5000")
        };
        records
            .put(&format!("{}n1", NODE_PREFIX), node.encode().unwrap())
            .unwrap();

        let listed = list_members(&records).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0][TRANSPORT_SECRET], json!(MASKED_VALUE));
    }

    #[test]
    fn test_dump_keys_hides_message_bodies() {
        let records = MemoryRecordStore::new();
        records.put("cfg/group/epoch", b"3".to_vec()).unwrap();
        records.put("msg/00000000000000000001", b"{\"id\":1}".to_vec()).unwrap();

        let entries = dump_keys(&records, "").unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0]["key"], json!("cfg/group/epoch"));
        assert_eq!(entries[0]["value"], json!(3));
        assert!(entries[1].get("value").is_none());
        assert_eq!(entries[1]["bytes"], json!(8));
    }
}
