//! In-memory record store
//!
//! Same semantics as the file store without durability. Keeps the applied
//! batches for inspection and supports one-shot write fault injection.

use std::collections::BTreeMap;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use super::errors::{StorageError, StorageResult};
use super::record::{BatchRecord, WriteBatch};
use super::{apply_to_index, scan_index, RecordStore};

#[derive(Default)]
struct MemoryInner {
    index: BTreeMap<String, Vec<u8>>,
    batches: Vec<BatchRecord>,
}

/// Non-durable record store for tests and single-process tooling.
#[derive(Default)]
pub struct MemoryRecordStore {
    inner: Mutex<MemoryInner>,
    fail_next_write: AtomicBool,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `write_batch` fail with an I/O error.
    pub fn fail_next_write(&self) {
        self.fail_next_write.store(true, Ordering::SeqCst);
    }

    /// Batches applied so far, in order.
    pub fn batches(&self) -> Vec<BatchRecord> {
        self.lock().map(|inner| inner.batches.clone()).unwrap_or_default()
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, MemoryInner>> {
        self.inner
            .lock()
            .map_err(|_| StorageError::write_failed_no_source("record store lock poisoned"))
    }
}

impl RecordStore for MemoryRecordStore {
    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.lock()?.index.get(key).cloned())
    }

    fn scan(&self, prefix: &str) -> StorageResult<Vec<(String, Vec<u8>)>> {
        Ok(scan_index(&self.lock()?.index, prefix))
    }

    fn write_batch(&self, batch: &WriteBatch) -> StorageResult<u64> {
        if self.fail_next_write.swap(false, Ordering::SeqCst) {
            return Err(StorageError::write_failed(
                "injected write failure",
                io::Error::new(io::ErrorKind::Other, "injected I/O error"),
            ));
        }

        let mut inner = self.lock()?;
        let sequence = inner.batches.len() as u64 + 1;
        apply_to_index(&mut inner.index, batch);
        inner.batches.push(BatchRecord::new(sequence, batch.clone()));
        Ok(sequence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_injected_failure_is_one_shot() {
        let store = MemoryRecordStore::new();
        store.fail_next_write();

        assert!(store.put("msg/1", b"x".to_vec()).is_err());
        assert_eq!(store.get("msg/1").unwrap(), None);

        assert_eq!(store.put("msg/1", b"x".to_vec()).unwrap(), 1);
        assert_eq!(store.batches().len(), 1);
    }
}
