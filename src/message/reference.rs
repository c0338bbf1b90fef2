//! Message reference counting
//!
//! Every holder of a message (a staged enqueue, a durable enqueue record,
//! a delivered queue entry) owns a [`MessageReference`]. The count goes up
//! once per `acquire` and down once when the reference is released or
//! dropped. Release consumes the reference, so a double release cannot be
//! expressed. When a count reaches zero the message is queued for deletion;
//! the store drains that queue with [`ReferenceCounter::take_unreferenced`].

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use super::record::MessageId;
use crate::observability::MetricsRegistry;

#[derive(Default)]
struct CounterInner {
    counts: Mutex<HashMap<MessageId, u64>>,
    unreferenced: Mutex<Vec<MessageId>>,
    acquired: AtomicU64,
    released: AtomicU64,
    metrics: Option<Arc<MetricsRegistry>>,
}

// A poisoned lock here means a panic mid-increment of a plain integer map;
// the map itself is still consistent.
fn relock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl CounterInner {
    fn release(&self, id: MessageId) {
        let reached_zero = {
            let mut counts = relock(&self.counts);
            match counts.get_mut(&id) {
                Some(count) if *count > 1 => {
                    *count -= 1;
                    false
                }
                Some(_) => {
                    counts.remove(&id);
                    true
                }
                None => {
                    debug_assert!(false, "release of unreferenced message {}", id);
                    false
                }
            }
        };
        self.released.fetch_add(1, Ordering::Relaxed);
        if let Some(metrics) = &self.metrics {
            metrics.increment_references_released();
        }

        if reached_zero {
            relock(&self.unreferenced).push(id);
        }
    }
}

/// Shared per-message reference counts.
#[derive(Clone, Default)]
pub struct ReferenceCounter {
    inner: Arc<CounterInner>,
}

impl ReferenceCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// A counter that also reports to the node's metrics.
    pub fn with_metrics(metrics: Arc<MetricsRegistry>) -> Self {
        Self {
            inner: Arc::new(CounterInner {
                metrics: Some(metrics),
                ..CounterInner::default()
            }),
        }
    }

    /// Take a new reference to `id`.
    pub fn acquire(&self, id: MessageId) -> MessageReference {
        *relock(&self.inner.counts).entry(id).or_insert(0) += 1;
        self.inner.acquired.fetch_add(1, Ordering::Relaxed);
        if let Some(metrics) = &self.inner.metrics {
            metrics.increment_references_acquired();
        }
        MessageReference {
            counter: Arc::clone(&self.inner),
            message_id: id,
        }
    }

    /// Current number of live references to `id`.
    pub fn count(&self, id: MessageId) -> u64 {
        relock(&self.inner.counts).get(&id).copied().unwrap_or(0)
    }

    /// Drain messages whose count reached zero and is still zero.
    pub fn take_unreferenced(&self) -> Vec<MessageId> {
        let pending = std::mem::take(&mut *relock(&self.inner.unreferenced));
        let counts = relock(&self.inner.counts);
        let mut ids: Vec<MessageId> = pending
            .into_iter()
            .filter(|id| !counts.contains_key(id))
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }

    /// Total acquisitions since creation.
    pub fn acquired_total(&self) -> u64 {
        self.inner.acquired.load(Ordering::Relaxed)
    }

    /// Total releases since creation.
    pub fn released_total(&self) -> u64 {
        self.inner.released.load(Ordering::Relaxed)
    }

    /// Number of messages with at least one live reference.
    pub fn live_messages(&self) -> usize {
        relock(&self.inner.counts).len()
    }
}

/// Scoped ownership of one count on a message.
///
/// Released exactly once: explicitly via [`release`](Self::release) or
/// implicitly on drop, whichever comes first.
#[must_use = "dropping a reference releases it immediately"]
pub struct MessageReference {
    counter: Arc<CounterInner>,
    message_id: MessageId,
}

impl MessageReference {
    pub fn message_id(&self) -> MessageId {
        self.message_id
    }

    pub fn release(self) {
        drop(self)
    }
}

impl Drop for MessageReference {
    fn drop(&mut self) {
        self.counter.release(self.message_id);
    }
}

impl fmt::Debug for MessageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageReference")
            .field("message_id", &self.message_id)
            .finish()
    }
}
