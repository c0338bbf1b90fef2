//! Messages, queues and reference counting
//!
//! - A message record is written once, on the first committed enqueue
//! - An enqueue record binds one message to one queue
//! - Every holder of a message owns a [`MessageReference`]; the record is
//!   deleted once no reference remains

mod destination;
mod queue;
mod record;
mod reference;

pub use destination::QueueDestination;
pub use queue::{Queue, QueueEntry};
pub use record::{validate_queue_name, EnqueueRecord, Message, MessageId, MessageRecord};
pub use reference::{MessageReference, ReferenceCounter};

pub(crate) use record::{message_key, ENQUEUE_PREFIX, MESSAGE_PREFIX};
