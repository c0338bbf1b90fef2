//! Staged writes against a record store
//!
//! A [`RecordTransaction`] collects puts and deletes, serves reads of its
//! own staged writes, and commits them as one batch. It also captures the
//! value each touched key had before the transaction so the caller can
//! build a compensating batch if a later step of the commit fails.

use std::collections::BTreeMap;

use super::errors::StorageResult;
use super::record::WriteBatch;
use super::RecordStore;

/// Outcome of a committed record transaction.
#[derive(Debug, Clone)]
pub struct CommittedBatch {
    /// Sequence number assigned by the store.
    pub sequence: u64,
    /// The batch as written.
    pub batch: WriteBatch,
    /// Batch restoring every touched key to its prior value.
    pub undo: WriteBatch,
}

/// Writes staged against a [`RecordStore`] and applied atomically.
pub struct RecordTransaction<'a> {
    store: &'a dyn RecordStore,
    staged: BTreeMap<String, Option<Vec<u8>>>,
    before: BTreeMap<String, Option<Vec<u8>>>,
    batch: WriteBatch,
}

impl<'a> RecordTransaction<'a> {
    pub fn begin(store: &'a dyn RecordStore) -> Self {
        Self {
            store,
            staged: BTreeMap::new(),
            before: BTreeMap::new(),
            batch: WriteBatch::new(),
        }
    }

    fn capture_before(&mut self, key: &str) -> StorageResult<()> {
        if !self.before.contains_key(key) {
            let prior = self.store.get(key)?;
            self.before.insert(key.to_string(), prior);
        }
        Ok(())
    }

    pub fn put(&mut self, key: &str, value: Vec<u8>) -> StorageResult<()> {
        self.capture_before(key)?;
        self.staged.insert(key.to_string(), Some(value.clone()));
        self.batch.put(key, value);
        Ok(())
    }

    pub fn delete(&mut self, key: &str) -> StorageResult<()> {
        self.capture_before(key)?;
        self.staged.insert(key.to_string(), None);
        self.batch.delete(key);
        Ok(())
    }

    /// Read through staged writes.
    pub fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        match self.staged.get(key) {
            Some(staged) => Ok(staged.clone()),
            None => self.store.get(key),
        }
    }

    /// Prefix scan through staged writes.
    pub fn scan(&self, prefix: &str) -> StorageResult<Vec<(String, Vec<u8>)>> {
        let mut merged: BTreeMap<String, Vec<u8>> = self.store.scan(prefix)?.into_iter().collect();
        for (key, value) in self.staged.range(prefix.to_string()..) {
            if !key.starts_with(prefix) {
                break;
            }
            match value {
                Some(v) => merged.insert(key.clone(), v.clone()),
                None => merged.remove(key),
            };
        }
        Ok(merged.into_iter().collect())
    }

    pub fn is_empty(&self) -> bool {
        self.batch.is_empty()
    }

    /// Apply all staged writes as one batch.
    pub fn commit(self) -> StorageResult<CommittedBatch> {
        let mut undo = WriteBatch::new();
        for (key, prior) in self.before {
            match prior {
                Some(value) => undo.put(key, value),
                None => undo.delete(key),
            }
        }

        let sequence = self.store.write_batch(&self.batch)?;
        Ok(CommittedBatch {
            sequence,
            batch: self.batch,
            undo,
        })
    }
}
