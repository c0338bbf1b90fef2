//! Transaction outcome exclusivity
//!
//! Every staged action receives exactly one of post-commit or rollback,
//! whatever way the transaction ends.

mod common;

use std::sync::{Arc, Mutex};

use mqstore::failure::FailureKind;
use mqstore::message::{EnqueueRecord, MessageId};
use mqstore::replication::Durability;
use mqstore::txn::{action, TransactionAction, TransactionState};

use common::{open_node, standalone};

type Log = Arc<Mutex<Vec<String>>>;

fn recorder(log: &Log, name: &str) -> impl TransactionAction + 'static {
    let committed = (Arc::clone(log), name.to_string());
    let rolled_back = (Arc::clone(log), name.to_string());
    action(
        move |records: &[EnqueueRecord]| {
            let ids: Vec<String> = records.iter().map(|r| r.message_id.to_string()).collect();
            committed
                .0
                .lock()
                .unwrap()
                .push(format!("{}:commit:{}", committed.1, ids.join(",")));
        },
        move || {
            rolled_back
                .0
                .lock()
                .unwrap()
                .push(format!("{}:rollback", rolled_back.1));
        },
    )
}

fn entries(log: &Log) -> Vec<String> {
    log.lock().unwrap().clone()
}

/// Two enqueues on one transaction: both post-commits run in staging order
/// with the durable records, and both records are persisted.
#[tokio::test]
async fn test_two_enqueues_commit_in_staging_order() {
    let (node, _transport) = standalone("n1").await;
    let store = node.open_store();
    let log = Log::default();

    let first = store.create_message("first").unwrap();
    let second = store.create_message("second").unwrap();
    let mut txn = store.begin_transaction();
    store.enqueue(&mut txn, "orders", &first, recorder(&log, "a")).unwrap();
    store.enqueue(&mut txn, "orders", &second, recorder(&log, "b")).unwrap();

    let receipt = store.commit(txn).await.unwrap();

    assert_eq!(
        entries(&log),
        vec![
            format!("a:commit:{}", first.id()),
            format!("b:commit:{}", second.id()),
        ]
    );
    assert_eq!(receipt.records.len(), 2);
    assert!(receipt.records[0].position < receipt.records[1].position);
    assert_eq!(receipt.epoch, Some(1));

    let enqueued: Vec<MessageId> = store
        .enqueued("orders")
        .unwrap()
        .into_iter()
        .map(|r| r.message_id)
        .collect();
    assert_eq!(enqueued, vec![first.id(), second.id()]);
    assert!(store.get_message(first.id()).unwrap().is_some());
    assert!(store.get_message(second.id()).unwrap().is_some());
    assert!(first.is_persisted());
}

#[tokio::test]
async fn test_explicit_rollback_runs_every_rollback_once() {
    let (node, _transport) = standalone("n1").await;
    let store = node.open_store();
    let log = Log::default();

    let message = store.create_message("m").unwrap();
    let mut txn = store.begin_transaction();
    store.enqueue(&mut txn, "q1", &message, recorder(&log, "a")).unwrap();
    store.enqueue(&mut txn, "q2", &message, recorder(&log, "b")).unwrap();
    store.rollback(txn).unwrap();

    assert_eq!(entries(&log), vec!["a:rollback", "b:rollback"]);
    assert!(!store.is_enqueued("q1", message.id()).unwrap());
    assert!(store.get_message(message.id()).unwrap().is_none());
}

/// A dequeue of something never enqueued fails the whole transaction,
/// including the enqueue staged before it.
#[tokio::test]
async fn test_invalid_operation_rolls_back_whole_transaction() {
    let (node, _transport) = standalone("n1").await;
    let store = node.open_store();
    let log = Log::default();

    let message = store.create_message("m").unwrap();
    let mut txn = store.begin_transaction();
    store.enqueue(&mut txn, "q", &message, recorder(&log, "enqueue")).unwrap();
    store
        .dequeue(&mut txn, "q", MessageId(999_999), recorder(&log, "dequeue"))
        .unwrap();

    let err = store.commit(txn).await.unwrap_err();

    assert_eq!(err.kind(), FailureKind::Validation);
    assert_eq!(entries(&log), vec!["enqueue:rollback", "dequeue:rollback"]);
    assert!(!store.is_enqueued("q", message.id()).unwrap());
    assert!(store.get_message(message.id()).unwrap().is_none());
}

#[tokio::test]
async fn test_duplicate_enqueue_is_rejected() {
    let (node, _transport) = standalone("n1").await;
    let store = node.open_store();
    let log = Log::default();

    let message = store.create_message("m").unwrap();
    let mut txn = store.begin_transaction();
    store.enqueue(&mut txn, "q", &message, recorder(&log, "first")).unwrap();
    store.commit(txn).await.unwrap();

    let mut txn = store.begin_transaction();
    store.enqueue(&mut txn, "q", &message, recorder(&log, "again")).unwrap();
    let err = store.commit(txn).await.unwrap_err();

    assert_eq!(err.kind(), FailureKind::Validation);
    assert_eq!(
        entries(&log),
        vec![format!("first:commit:{}", message.id()), "again:rollback".to_string()]
    );
    assert_eq!(store.enqueued("q").unwrap().len(), 1);
}

/// A replica refuses the commit; the caller may retry elsewhere.
#[tokio::test]
async fn test_commit_on_replica_rolls_back() {
    let transport = Arc::new(mqstore::replication::LoopbackTransport::new());
    let node = open_node("n2", &["n1"], Durability::Quorum, &transport);
    node.group.start().await.unwrap();
    let store = node.open_store();
    let log = Log::default();

    let message = store.create_message("m").unwrap();
    let mut txn = store.begin_transaction();
    store.enqueue(&mut txn, "q", &message, recorder(&log, "a")).unwrap();
    let err = store.commit(txn).await.unwrap_err();

    assert_eq!(err.kind(), FailureKind::ConnectionScoped);
    assert!(err.is_retryable());
    assert_eq!(entries(&log), vec!["a:rollback"]);
}

#[tokio::test]
async fn test_dropped_open_transaction_rolls_back() {
    let (node, _transport) = standalone("n1").await;
    let store = node.open_store();
    let log = Log::default();

    let message = store.create_message("m").unwrap();
    {
        let mut txn = store.begin_transaction();
        store.enqueue(&mut txn, "q", &message, recorder(&log, "a")).unwrap();
        assert_eq!(txn.state(), TransactionState::Open);
    }

    assert_eq!(entries(&log), vec!["a:rollback"]);
    assert_eq!(node.metrics.snapshot().transactions_auto_rolled_back, 1);
    assert_eq!(store.references().count(message.id()), 0);
}

#[tokio::test]
async fn test_commit_after_close_is_refused() {
    let (node, _transport) = standalone("n1").await;
    let store = node.open_store();
    let log = Log::default();

    let message = store.create_message("m").unwrap();
    let mut txn = store.begin_transaction();
    store.enqueue(&mut txn, "q", &message, recorder(&log, "a")).unwrap();
    store.close();

    let err = store.commit(txn).await.unwrap_err();
    assert_eq!(err.kind(), FailureKind::Validation);
    assert_eq!(entries(&log), vec!["a:rollback"]);
}

/// A panicking post-commit callback does not stop the others and the
/// commit still counts.
#[tokio::test]
async fn test_post_commit_panic_is_contained() {
    let (node, _transport) = standalone("n1").await;
    let store = node.open_store();
    let log = Log::default();

    let first = store.create_message("a").unwrap();
    let second = store.create_message("b").unwrap();
    let mut txn = store.begin_transaction();
    store
        .enqueue(
            &mut txn,
            "q",
            &first,
            action(|_: &[EnqueueRecord]| panic!("consumer bug"), || {}),
        )
        .unwrap();
    store.enqueue(&mut txn, "q", &second, recorder(&log, "b")).unwrap();

    store.commit(txn).await.unwrap();

    assert_eq!(entries(&log), vec![format!("b:commit:{}", second.id())]);
    assert_eq!(node.metrics.snapshot().callback_panics, 1);
    assert!(store.is_enqueued("q", first.id()).unwrap());
}

#[tokio::test]
async fn test_empty_transaction_commits_without_a_batch() {
    let (node, _transport) = standalone("n1").await;
    let store = node.open_store();
    let before = node.records.batches().len();

    let receipt = store.commit(store.begin_transaction()).await.unwrap();

    assert_eq!(receipt.sequence, None);
    assert!(receipt.records.is_empty());
    assert_eq!(node.records.batches().len(), before);
}
