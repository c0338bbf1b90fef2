//! Observability
//!
//! - Structured logging through `tracing`, every line tagged with an [`Event`]
//! - Monotonic counters in [`MetricsRegistry`]
//! - After-the-fact [`StoreEvent`] notifications to registered listeners
//! - Append-only audit of cluster administration
//!
//! Observability never changes an outcome: listener and audit failures are
//! logged and swallowed.

pub mod audit;
mod events;
mod listener;
mod logging;
mod metrics;

pub use audit::{AuditAction, AuditLog, AuditOutcome, AuditRecord, FileAuditLog, MemoryAuditLog};
pub use events::Event;
pub use listener::{
    ListenerSet, LoggingListener, RecordingListener, StoreEvent, StoreEventListener,
};
pub use logging::{init_logging, LoggingError, LOG_ENV_VAR};
pub use metrics::{MetricsRegistry, MetricsSnapshot};
