//! Transactional message store
//!
//! - [`MessageStore`]: the store-facing API used by protocol layers
//! - Recovery rebuilds queues and reference counts from durable records
//! - Message ids come from a durable reservation and are never reused

mod ids;
mod recovery;
#[allow(clippy::module_inception)]
mod store;

use std::path::PathBuf;
use std::sync::Arc;

use crate::failure::FailureResult;
use crate::storage::FileRecordStore;

pub use recovery::RecoveryReport;
pub use store::MessageStore;

/// Where and how the record store lives on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub data_dir: PathBuf,
    /// fsync every batch before acknowledging it.
    pub fsync: bool,
}

impl StoreConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            fsync: true,
        }
    }

    pub fn open_records(&self) -> FailureResult<Arc<FileRecordStore>> {
        Ok(Arc::new(FileRecordStore::open(&self.data_dir, self.fsync)?))
    }
}
