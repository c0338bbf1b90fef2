//! Message and enqueue records
//!
//! Key layout in the record store:
//! - `msg/<id>`            message record (body + metadata), immutable once written
//! - `enq/<queue>/<id>`    enqueue record, one per (queue, message) pair
//!
//! Ids are zero-padded so prefix scans return them in numeric order.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::failure::{Failure, FailureResult};

pub(crate) const MESSAGE_PREFIX: &str = "msg/";
pub(crate) const ENQUEUE_PREFIX: &str = "enq/";

/// Unique content id of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageId(pub u64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:020}", self.0)
    }
}

impl MessageId {
    pub fn parse(s: &str) -> Option<Self> {
        s.parse::<u64>().ok().map(MessageId)
    }
}

pub(crate) fn message_key(id: MessageId) -> String {
    format!("{}{}", MESSAGE_PREFIX, id)
}

pub(crate) fn enqueue_key(queue: &str, id: MessageId) -> String {
    format!("{}{}/{}", ENQUEUE_PREFIX, queue, id)
}

/// Queue names become key segments, so `/` is not allowed.
pub fn validate_queue_name(queue: &str) -> FailureResult<()> {
    if queue.is_empty() {
        return Err(Failure::validation("queue name must not be empty"));
    }
    if queue.contains('/') {
        return Err(Failure::validation(format!(
            "queue name '{}' must not contain '/'",
            queue
        )));
    }
    Ok(())
}

/// Persisted form of a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: MessageId,
    pub size: u64,
    pub arrival_time: DateTime<Utc>,
    pub body: Vec<u8>,
}

impl MessageRecord {
    pub fn encode(&self) -> FailureResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| {
            Failure::server_scoped(format!("failed to encode message {}", self.id)).with_source(e)
        })
    }

    pub fn decode(bytes: &[u8]) -> FailureResult<Self> {
        serde_json::from_slice(bytes).map_err(|e| {
            Failure::server_scoped("corrupt message record").with_source(e)
        })
    }
}

/// Durable binding of a message to a queue.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EnqueueRecord {
    pub queue: String,
    pub message_id: MessageId,
    /// Enqueue position; orders entries within a queue.
    pub position: u64,
}

impl EnqueueRecord {
    pub fn key(&self) -> String {
        enqueue_key(&self.queue, self.message_id)
    }

    pub fn encode(&self) -> FailureResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| {
            Failure::server_scoped("failed to encode enqueue record").with_source(e)
        })
    }

    pub fn decode(bytes: &[u8]) -> FailureResult<Self> {
        serde_json::from_slice(bytes).map_err(|e| {
            Failure::server_scoped("corrupt enqueue record").with_source(e)
        })
    }
}

struct MessageInner {
    id: MessageId,
    arrival_time: DateTime<Utc>,
    body: Vec<u8>,
    persisted: AtomicBool,
}

/// In-memory message handle. Cheap to clone; the body is shared.
#[derive(Clone)]
pub struct Message {
    inner: Arc<MessageInner>,
}

impl Message {
    pub(crate) fn new(id: MessageId, body: Vec<u8>) -> Self {
        Self {
            inner: Arc::new(MessageInner {
                id,
                arrival_time: Utc::now(),
                body,
                persisted: AtomicBool::new(false),
            }),
        }
    }

    pub(crate) fn from_record(record: MessageRecord) -> Self {
        Self {
            inner: Arc::new(MessageInner {
                id: record.id,
                arrival_time: record.arrival_time,
                body: record.body,
                persisted: AtomicBool::new(true),
            }),
        }
    }

    pub fn id(&self) -> MessageId {
        self.inner.id
    }

    pub fn body(&self) -> &[u8] {
        &self.inner.body
    }

    pub fn size(&self) -> u64 {
        self.inner.body.len() as u64
    }

    pub fn arrival_time(&self) -> DateTime<Utc> {
        self.inner.arrival_time
    }

    /// Whether the message record has been durably written.
    pub fn is_persisted(&self) -> bool {
        self.inner.persisted.load(Ordering::Acquire)
    }

    pub(crate) fn mark_persisted(&self) {
        self.inner.persisted.store(true, Ordering::Release);
    }

    pub(crate) fn to_record(&self) -> MessageRecord {
        MessageRecord {
            id: self.id(),
            size: self.size(),
            arrival_time: self.arrival_time(),
            body: self.inner.body.clone(),
        }
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("id", &self.id())
            .field("size", &self.size())
            .field("persisted", &self.is_persisted())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_sort_numerically() {
        let a = enqueue_key("orders", MessageId(9));
        let b = enqueue_key("orders", MessageId(10));
        assert!(a < b);
        assert!(a.starts_with("enq/orders/"));
        assert_eq!(message_key(MessageId(1)), "msg/00000000000000000001");
    }

    #[test]
    fn test_queue_name_validation() {
        assert!(validate_queue_name("orders").is_ok());
        assert!(validate_queue_name("").is_err());
        assert!(validate_queue_name("a/b").is_err());
    }

    #[test]
    fn test_message_record_codec() {
        let message = Message::new(MessageId(3), b"payload".to_vec());
        let bytes = message.to_record().encode().unwrap();
        let record = MessageRecord::decode(&bytes).unwrap();
        assert_eq!(record.size, 7);

        let restored = Message::from_record(record);
        assert!(restored.is_persisted());
        assert_eq!(restored.body(), b"payload");
    }
}
