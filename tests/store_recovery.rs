//! Store recovery
//!
//! Reopening a node over its durable records restores queues, durable
//! enqueue records and reference counts, and deletes message records no
//! queue points at.

mod common;

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use tempfile::TempDir;

use mqstore::failure::FailureKind;
use mqstore::message::{EnqueueRecord, MessageId, MessageRecord};
use mqstore::observability::MetricsRegistry;
use mqstore::replication::{Durability, LoopbackTransport, NodeRole, ReplicationGroup};
use mqstore::storage::{FileRecordStore, MemoryRecordStore, RecordStore};
use mqstore::store::{MessageStore, StoreConfig};
use mqstore::txn::NoAction;

use common::{config, open_node_over};

/// A started single-node store over files under `dir`.
async fn open_file_store(dir: &Path) -> (Arc<FileRecordStore>, Arc<MessageStore>) {
    let records = StoreConfig::new(dir).open_records().unwrap();
    let metrics = Arc::new(MetricsRegistry::new());
    let group = Arc::new(
        ReplicationGroup::open(
            config("n1", &[], Durability::Quorum),
            records.clone(),
            Arc::new(LoopbackTransport::new()),
            metrics.clone(),
        )
        .unwrap(),
    );
    let store = MessageStore::open(records.clone(), group, metrics).unwrap();
    store.start().await.unwrap();
    (records, store)
}

fn orphan(id: u64) -> (String, Vec<u8>) {
    let record = MessageRecord {
        id: MessageId(id),
        size: 6,
        arrival_time: Utc::now(),
        body: b"orphan".to_vec(),
    };
    (format!("msg/{}", record.id), record.encode().unwrap())
}

#[tokio::test]
async fn test_reopen_restores_queues_and_references() {
    let dir = TempDir::new().unwrap();
    let (first, second, third) = {
        let (_records, store) = open_file_store(dir.path()).await;
        let first = store.create_message("first").unwrap();
        let second = store.create_message("second").unwrap();
        let third = store.create_message("third").unwrap();

        let mut txn = store.begin_transaction();
        store.enqueue(&mut txn, "a", &first, NoAction).unwrap();
        store.enqueue(&mut txn, "a", &second, NoAction).unwrap();
        store.enqueue(&mut txn, "b", &second, NoAction).unwrap();
        store.enqueue(&mut txn, "b", &third, NoAction).unwrap();
        store.commit(txn).await.unwrap();

        let mut txn = store.begin_transaction();
        store.dequeue(&mut txn, "b", third.id(), NoAction).unwrap();
        store.commit(txn).await.unwrap();
        store.close();
        (first.id(), second.id(), third.id())
    };

    let (_records, store) = open_file_store(dir.path()).await;
    let report = store.last_recovery().unwrap();
    assert_eq!(report.queues, 2);
    assert_eq!(report.enqueues, 3);
    assert_eq!(report.messages, 2);
    assert!(report.orphans.is_empty());

    assert_eq!(store.queue("a").unwrap().message_ids(), vec![first, second]);
    assert_eq!(store.queue("b").unwrap().message_ids(), vec![second]);
    assert!(store.is_enqueued("b", second).unwrap());
    assert!(!store.is_enqueued("b", third).unwrap());
    assert!(store.get_message(third).unwrap().is_none());

    // One count for the durable record and one for the queued entry, per queue.
    assert_eq!(store.references().count(first), 2);
    assert_eq!(store.references().count(second), 4);

    let body = store.get_message(second).unwrap().unwrap();
    assert_eq!(body.body(), b"second");
    assert!(body.is_persisted());
}

/// The recovered master keeps serving: entries restored from disk can be
/// received and acknowledged.
#[tokio::test]
async fn test_recovered_entries_can_be_acknowledged() {
    let dir = TempDir::new().unwrap();
    let id = {
        let (_records, store) = open_file_store(dir.path()).await;
        let message = store.create_message("job").unwrap();
        let mut txn = store.begin_transaction();
        store.send(&mut txn, "jobs", &message).unwrap();
        store.commit(txn).await.unwrap();
        message.id()
    };

    let (_records, store) = open_file_store(dir.path()).await;
    assert_eq!(store.group().local_role(), NodeRole::Master);
    let entry = store.receive("jobs").unwrap().unwrap();
    assert_eq!(entry.message().id(), id);
    let mut txn = store.begin_transaction();
    store.acknowledge(&mut txn, entry).unwrap();
    store.commit(txn).await.unwrap();

    assert!(store.get_message(id).unwrap().is_none());
    assert!(store.queue("jobs").unwrap().is_empty());
}

#[tokio::test]
async fn test_orphaned_messages_are_deleted_at_open() {
    let records = Arc::new(MemoryRecordStore::new());
    let (key, bytes) = orphan(42);
    records.put(&key, bytes).unwrap();

    let transport = Arc::new(LoopbackTransport::new());
    let node = open_node_over(
        records.clone(),
        config("n1", &[], Durability::Quorum),
        &transport,
    );
    let store = node.open_store();

    let report = store.last_recovery().unwrap();
    assert_eq!(report.orphans, vec![MessageId(42)]);
    assert_eq!(report.messages, 0);
    assert!(records.get(&key).unwrap().is_none());
    assert_eq!(node.metrics.snapshot().orphans_deleted, 1);
}

/// An enqueue record whose message is gone is corruption.
#[tokio::test]
async fn test_dangling_enqueue_record_fails_open() {
    let records = Arc::new(MemoryRecordStore::new());
    let record = EnqueueRecord {
        queue: "q".to_string(),
        message_id: MessageId(7),
        position: 0,
    };
    records.put(&record.key(), record.encode().unwrap()).unwrap();

    let transport = Arc::new(LoopbackTransport::new());
    let node = open_node_over(records, config("n1", &[], Durability::Quorum), &transport);
    let err = MessageStore::open(node.records.clone(), node.group.clone(), node.metrics.clone())
        .unwrap_err();

    assert_eq!(err.kind(), FailureKind::ServerScoped);
    assert!(err.message().contains("missing message"));
}

#[tokio::test]
async fn test_message_ids_are_unique_across_restart() {
    let dir = TempDir::new().unwrap();
    let before = {
        let (_records, store) = open_file_store(dir.path()).await;
        let kept = store.create_message("kept").unwrap();
        let unused = store.create_message("never enqueued").unwrap();
        let mut txn = store.begin_transaction();
        store.enqueue(&mut txn, "q", &kept, NoAction).unwrap();
        store.commit(txn).await.unwrap();
        unused.id()
    };

    let (_records, store) = open_file_store(dir.path()).await;
    let after = store.create_message("new").unwrap();
    assert!(after.id() > before);
}

/// Recovery above a persisted id floor never hands out an id already
/// present in the store.
#[tokio::test]
async fn test_ids_resume_above_stored_messages() {
    let records = Arc::new(MemoryRecordStore::new());
    let transport = Arc::new(LoopbackTransport::new());
    let node = open_node_over(
        records.clone(),
        config("n1", &[], Durability::Quorum),
        &transport,
    );
    node.group.start().await.unwrap();

    let (key, bytes) = orphan(5000);
    let record = EnqueueRecord {
        queue: "q".to_string(),
        message_id: MessageId(5000),
        position: 3,
    };
    records.put(&key, bytes).unwrap();
    records.put(&record.key(), record.encode().unwrap()).unwrap();

    let store = node.open_store();
    assert!(store.is_enqueued("q", MessageId(5000)).unwrap());
    assert!(store.create_message("next").unwrap().id() > MessageId(5000));

    // Positions continue after the recovered record.
    let message = store.create_message("m").unwrap();
    let mut txn = store.begin_transaction();
    store.enqueue(&mut txn, "q", &message, NoAction).unwrap();
    let receipt = store.commit(txn).await.unwrap();
    assert!(receipt.records[0].position > 3);
}

/// A committed enqueue is receivable at once, and the same entry is
/// receivable again after a restart.
#[tokio::test]
async fn test_enqueue_is_receivable_before_and_after_reopen() {
    let dir = TempDir::new().unwrap();
    let id = {
        let (_records, store) = open_file_store(dir.path()).await;
        let message = store.create_message("live").unwrap();
        let mut txn = store.begin_transaction();
        store.enqueue(&mut txn, "q", &message, NoAction).unwrap();
        store.commit(txn).await.unwrap();

        let entry = store.receive("q").unwrap().expect("entry after commit");
        assert_eq!(entry.message().id(), message.id());
        assert_eq!(entry.message().body(), b"live");
        store.close();
        message.id()
    };

    let (_records, store) = open_file_store(dir.path()).await;
    let entry = store.receive("q").unwrap().expect("entry after reopen");
    assert_eq!(entry.message().id(), id);
}
