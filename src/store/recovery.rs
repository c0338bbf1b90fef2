//! Store recovery
//!
//! Rebuilds in-memory state from the record store:
//! 1. Load every message record
//! 2. Replay enqueue records in position order into the durable index and
//!    the in-memory queues
//! 3. Delete message records no enqueue record points at
//!
//! An enqueue record whose message record is missing is corruption and
//! fails recovery as server-scoped.

use std::collections::BTreeMap;

use crate::failure::{Failure, FailureResult};
use crate::message::{
    EnqueueRecord, Message, MessageId, MessageRecord, QueueEntry, ENQUEUE_PREFIX, MESSAGE_PREFIX,
};
use crate::observability::Event;

use super::store::MessageStore;

/// What a recovery pass found.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    pub queues: usize,
    pub messages: usize,
    pub enqueues: usize,
    pub orphans: Vec<MessageId>,
    /// Lowest id above every stored message.
    pub next_id: u64,
}

pub(crate) fn recover(store: &MessageStore) -> FailureResult<RecoveryReport> {
    store.metrics().increment_recovery_runs();
    tracing::info!(event = %Event::RecoveryStart, "rebuilding store state");

    store.coordinator().reset()?;
    for queue in store.queues()? {
        while queue.take().is_some() {}
    }

    let mut bodies = BTreeMap::new();
    for (_, bytes) in store.records().scan(MESSAGE_PREFIX)? {
        let record = MessageRecord::decode(&bytes)?;
        bodies.insert(record.id, Message::from_record(record));
    }
    let next_id = bodies.keys().next_back().map_or(0, |id| id.0 + 1);

    let mut enqueues = store
        .records()
        .scan(ENQUEUE_PREFIX)?
        .into_iter()
        .map(|(_, bytes)| EnqueueRecord::decode(&bytes))
        .collect::<FailureResult<Vec<_>>>()?;
    enqueues.sort_by_key(|record| record.position);

    let references = store.references();
    for record in &enqueues {
        let Some(message) = bodies.get(&record.message_id) else {
            return Err(Failure::server_scoped(format!(
                "enqueue record {} points at missing message {}",
                record.key(),
                record.message_id
            )));
        };
        store.coordinator().restore(record.clone())?;
        let queue = store.queue(&record.queue)?;
        queue.push(QueueEntry::new(
            record.clone(),
            message.clone(),
            references.acquire(record.message_id),
        ));
    }

    let orphans: Vec<MessageId> = bodies
        .keys()
        .copied()
        .filter(|id| references.count(*id) == 0)
        .collect();
    let deleted = if orphans.is_empty() {
        Vec::new()
    } else {
        store.coordinator().schedule_delete(orphans)?;
        store.coordinator().reap()?
    };
    if !deleted.is_empty() {
        store.metrics().add_orphans_deleted(deleted.len() as u64);
        tracing::info!(event = %Event::OrphansDeleted, count = deleted.len(), "deleted unreferenced message records");
    }

    let report = RecoveryReport {
        queues: store.queues()?.len(),
        messages: bodies.len().saturating_sub(deleted.len()),
        enqueues: enqueues.len(),
        orphans: deleted,
        next_id,
    };
    tracing::info!(
        event = %Event::RecoveryComplete,
        queues = report.queues,
        messages = report.messages,
        enqueues = report.enqueues,
        orphans = report.orphans.len(),
        "store state rebuilt"
    );
    Ok(report)
}
