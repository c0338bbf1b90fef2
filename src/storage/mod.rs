//! Durable record store
//!
//! Key/value storage of configuration records and message/queue state.
//! Knows nothing about replication.
//!
//! # Design Principles
//!
//! - Append-only batch file, no in-place updates
//! - One batch = one atomic write, fsynced before acknowledgement
//! - Checksum-verified on every read
//! - Ordered index serves `get` and `scan(prefix)`
//! - Any I/O or corruption error is fatal to the node

mod checksum;
mod errors;
mod memory;
mod reader;
mod record;
mod transaction;
mod writer;

use std::collections::BTreeMap;

pub use checksum::compute_checksum;
pub use errors::{StorageError, StorageErrorCode, StorageResult};
pub use memory::MemoryRecordStore;
pub use reader::BatchReader;
pub use record::{BatchRecord, WriteBatch, WriteOp};
pub use transaction::{CommittedBatch, RecordTransaction};
pub use writer::FileRecordStore;

/// Key/value durable storage.
///
/// Writes outside a [`RecordTransaction`] are single-op batches.
pub trait RecordStore: Send + Sync {
    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>>;

    /// All entries whose key starts with `prefix`, in key order.
    fn scan(&self, prefix: &str) -> StorageResult<Vec<(String, Vec<u8>)>>;

    /// Apply a batch atomically. Returns the batch sequence number.
    fn write_batch(&self, batch: &WriteBatch) -> StorageResult<u64>;

    fn put(&self, key: &str, value: Vec<u8>) -> StorageResult<u64> {
        let mut batch = WriteBatch::new();
        batch.put(key, value);
        self.write_batch(&batch)
    }

    fn delete(&self, key: &str) -> StorageResult<u64> {
        let mut batch = WriteBatch::new();
        batch.delete(key);
        self.write_batch(&batch)
    }
}

pub(crate) fn apply_to_index(index: &mut BTreeMap<String, Vec<u8>>, batch: &WriteBatch) {
    for op in batch.ops() {
        match op {
            WriteOp::Put { key, value } => {
                index.insert(key.clone(), value.clone());
            }
            WriteOp::Delete { key } => {
                index.remove(key);
            }
        }
    }
}

pub(crate) fn scan_index(
    index: &BTreeMap<String, Vec<u8>>,
    prefix: &str,
) -> Vec<(String, Vec<u8>)> {
    index
        .range(prefix.to_string()..)
        .take_while(|(key, _)| key.starts_with(prefix))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}
