//! Reference conservation
//!
//! Once no transaction, queue entry or consumer holds a message, every
//! acquire has a matching release and the message record is gone.

mod common;

use std::sync::Arc;

use mqstore::observability::{RecordingListener, StoreEvent};
use mqstore::txn::NoAction;

use common::standalone;

fn balanced(store: &mqstore::store::MessageStore) -> bool {
    let references = store.references();
    references.acquired_total() == references.released_total()
}

/// Send, receive and acknowledge: the message lives while queued and is
/// deleted once acknowledged.
#[tokio::test]
async fn test_full_delivery_cycle_releases_everything() {
    let (node, _transport) = standalone("n1").await;
    let store = node.open_store();
    let listener = Arc::new(RecordingListener::new());
    store.add_listener(listener.clone());

    let message = store.create_message("payload").unwrap();
    let id = message.id();
    let mut txn = store.begin_transaction();
    store.send(&mut txn, "jobs", &message).unwrap();
    store.commit(txn).await.unwrap();
    drop(message);

    assert_eq!(store.queue("jobs").unwrap().message_ids(), vec![id]);
    assert!(store.references().count(id) > 0);
    assert!(store.get_message(id).unwrap().is_some());

    let entry = store.receive("jobs").unwrap().expect("delivered entry");
    assert_eq!(entry.message().body(), b"payload");
    let mut txn = store.begin_transaction();
    store.acknowledge(&mut txn, entry).unwrap();
    store.commit(txn).await.unwrap();

    assert_eq!(store.references().count(id), 0);
    assert!(balanced(&store));
    assert_eq!(store.references().live_messages(), 0);
    let metrics = node.metrics.snapshot();
    assert_eq!(metrics.references_acquired, metrics.references_released);
    assert!(metrics.references_acquired > 0);
    assert!(store.get_message(id).unwrap().is_none());
    assert!(listener
        .events()
        .iter()
        .any(|event| matches!(event, StoreEvent::MessagesDeleted { ids } if ids == &vec![id])));
}

/// A rolled-back acknowledge puts the entry back and keeps the message.
#[tokio::test]
async fn test_rolled_back_acknowledge_keeps_message() {
    let (node, _transport) = standalone("n1").await;
    let store = node.open_store();

    let message = store.create_message("payload").unwrap();
    let id = message.id();
    let mut txn = store.begin_transaction();
    store.send(&mut txn, "jobs", &message).unwrap();
    store.commit(txn).await.unwrap();

    let entry = store.receive("jobs").unwrap().unwrap();
    let mut txn = store.begin_transaction();
    store.acknowledge(&mut txn, entry).unwrap();
    store.rollback(txn).unwrap();

    assert_eq!(store.queue("jobs").unwrap().message_ids(), vec![id]);
    assert!(store.is_enqueued("jobs", id).unwrap());
    assert!(store.get_message(id).unwrap().is_some());
}

/// One message on two queues is deleted only after both dequeues.
#[tokio::test]
async fn test_shared_message_survives_first_dequeue() {
    let (node, _transport) = standalone("n1").await;
    let store = node.open_store();

    let message = store.create_message("fan-out").unwrap();
    let id = message.id();
    let mut txn = store.begin_transaction();
    store.enqueue(&mut txn, "a", &message, NoAction).unwrap();
    store.enqueue(&mut txn, "b", &message, NoAction).unwrap();
    store.commit(txn).await.unwrap();
    drop(message);

    let mut txn = store.begin_transaction();
    store.dequeue(&mut txn, "a", id, NoAction).unwrap();
    store.commit(txn).await.unwrap();
    assert!(store.get_message(id).unwrap().is_some());

    let mut txn = store.begin_transaction();
    store.dequeue(&mut txn, "b", id, NoAction).unwrap();
    store.commit(txn).await.unwrap();
    assert!(store.get_message(id).unwrap().is_none());
    assert!(balanced(&store));
}

#[tokio::test]
async fn test_failed_and_dropped_transactions_release_references() {
    let (node, _transport) = standalone("n1").await;
    let store = node.open_store();
    let message = store.create_message("m").unwrap();

    let mut txn = store.begin_transaction();
    store.enqueue(&mut txn, "q", &message, NoAction).unwrap();
    store.rollback(txn).unwrap();

    {
        let mut txn = store.begin_transaction();
        store.enqueue(&mut txn, "q", &message, NoAction).unwrap();
    }

    let held = store.acquire_reference(&message);
    assert_eq!(store.references().count(message.id()), 1);
    held.release();

    assert_eq!(store.references().count(message.id()), 0);
    assert!(balanced(&store));
}

/// The message a caller still holds is not deleted under it, and is
/// deleted by the next reap once released.
#[tokio::test]
async fn test_held_reference_defers_deletion() {
    let (node, _transport) = standalone("n1").await;
    let store = node.open_store();

    let message = store.create_message("m").unwrap();
    let id = message.id();
    let mut txn = store.begin_transaction();
    store.enqueue(&mut txn, "q", &message, NoAction).unwrap();
    store.commit(txn).await.unwrap();

    let held = store.acquire_reference(&message);
    let mut txn = store.begin_transaction();
    store.dequeue(&mut txn, "q", id, NoAction).unwrap();
    store.commit(txn).await.unwrap();
    assert!(store.get_message(id).unwrap().is_some());

    held.release();
    assert_eq!(store.reap().unwrap(), vec![id]);
    assert!(store.get_message(id).unwrap().is_none());
    assert_eq!(node.metrics.snapshot().messages_deleted, 1);
}
