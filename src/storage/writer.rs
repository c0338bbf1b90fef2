//! File-backed record store
//!
//! - Append-only batch file at `<data_dir>/store/records.dat`
//! - One batch per atomic write, fsynced before the write is acknowledged
//! - Ordered in-memory index rebuilt from the file on open
//! - A torn trailing batch is truncated on open

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use super::errors::{StorageError, StorageResult};
use super::reader::BatchReader;
use super::record::{BatchRecord, WriteBatch};
use super::{apply_to_index, scan_index, RecordStore};

struct FileInner {
    file: File,
    index: BTreeMap<String, Vec<u8>>,
    next_sequence: u64,
    current_offset: u64,
}

/// Durable record store backed by an append-only batch file.
pub struct FileRecordStore {
    path: PathBuf,
    fsync: bool,
    inner: Mutex<FileInner>,
}

impl FileRecordStore {
    /// Opens or creates the record file under `data_dir`.
    ///
    /// Creates `<data_dir>/store/records.dat` and parent directories if
    /// missing. Existing batches are replayed into the index.
    pub fn open(data_dir: &Path, fsync: bool) -> StorageResult<Self> {
        let store_dir = data_dir.join("store");
        let path = store_dir.join("records.dat");

        if !store_dir.exists() {
            fs::create_dir_all(&store_dir).map_err(|e| {
                StorageError::io_error(
                    format!("Failed to create store directory: {}", store_dir.display()),
                    e,
                )
            })?;
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)
            .map_err(|e| {
                StorageError::write_failed(
                    format!("Failed to open record file: {}", path.display()),
                    e,
                )
            })?;

        let mut index = BTreeMap::new();
        let mut last_sequence = 0;
        let mut reader = BatchReader::open(&path)?;
        while let Some(record) = reader.read_next()? {
            if record.sequence <= last_sequence {
                return Err(StorageError::corruption_at_offset(
                    reader.current_offset(),
                    format!(
                        "Batch sequence {} not greater than previous {}",
                        record.sequence, last_sequence
                    ),
                ));
            }
            last_sequence = record.sequence;
            apply_to_index(&mut index, &record.batch);
        }

        let current_offset = reader.current_offset();
        if let Some(torn_at) = reader.torn_at() {
            tracing::warn!(
                path = %path.display(),
                offset = torn_at,
                "truncating torn trailing batch"
            );
            file.set_len(torn_at).map_err(|e| {
                StorageError::write_failed("Failed to truncate torn batch", e)
            })?;
            file.sync_all()
                .map_err(|e| StorageError::write_failed("fsync failed after truncation", e))?;
        }

        tracing::debug!(
            path = %path.display(),
            keys = index.len(),
            last_sequence,
            "record store opened"
        );

        Ok(Self {
            path,
            fsync,
            inner: Mutex::new(FileInner {
                file,
                index,
                next_sequence: last_sequence + 1,
                current_offset,
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, FileInner>> {
        self.inner
            .lock()
            .map_err(|_| StorageError::write_failed_no_source("record store lock poisoned"))
    }
}

impl RecordStore for FileRecordStore {
    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.lock()?.index.get(key).cloned())
    }

    fn scan(&self, prefix: &str) -> StorageResult<Vec<(String, Vec<u8>)>> {
        Ok(scan_index(&self.lock()?.index, prefix))
    }

    fn write_batch(&self, batch: &WriteBatch) -> StorageResult<u64> {
        let mut inner = self.lock()?;
        let sequence = inner.next_sequence;
        let bytes = BatchRecord::new(sequence, batch.clone()).serialize();

        let written = inner.file.write_all(&bytes).and_then(|_| {
            if self.fsync {
                inner.file.sync_data()
            } else {
                Ok(())
            }
        });

        if let Err(e) = written {
            // Cut any partial bytes so a later reopen does not see them mid-file.
            let offset = inner.current_offset;
            let _ = inner.file.set_len(offset);
            return Err(StorageError::write_failed(
                format!("Failed to append batch {}", sequence),
                e,
            ));
        }

        inner.current_offset += bytes.len() as u64;
        inner.next_sequence += 1;
        apply_to_index(&mut inner.index, batch);

        Ok(sequence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_open_creates_directories() {
        let dir = TempDir::new().unwrap();
        let store = FileRecordStore::open(dir.path(), true).unwrap();
        assert!(store.path().exists());
        assert!(dir.path().join("store").exists());
    }

    #[test]
    fn test_put_get_delete() {
        let dir = TempDir::new().unwrap();
        let store = FileRecordStore::open(dir.path(), true).unwrap();

        store.put("msg/1", b"one".to_vec()).unwrap();
        assert_eq!(store.get("msg/1").unwrap(), Some(b"one".to_vec()));

        store.delete("msg/1").unwrap();
        assert_eq!(store.get("msg/1").unwrap(), None);
    }

    #[test]
    fn test_scan_is_ordered_and_prefix_bounded() {
        let dir = TempDir::new().unwrap();
        let store = FileRecordStore::open(dir.path(), false).unwrap();

        store.put("enq/b/2", b"x".to_vec()).unwrap();
        store.put("enq/a/1", b"x".to_vec()).unwrap();
        store.put("enq/a/0", b"x".to_vec()).unwrap();
        store.put("msg/1", b"x".to_vec()).unwrap();

        let keys: Vec<String> = store
            .scan("enq/a/")
            .unwrap()
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(keys, vec!["enq/a/0", "enq/a/1"]);
    }

    #[test]
    fn test_reopen_restores_state_and_sequence() {
        let dir = TempDir::new().unwrap();
        let last;
        {
            let store = FileRecordStore::open(dir.path(), true).unwrap();
            store.put("msg/1", b"one".to_vec()).unwrap();
            let mut batch = WriteBatch::new();
            batch.put("msg/2", b"two".to_vec());
            batch.delete("msg/1");
            last = store.write_batch(&batch).unwrap();
        }

        let store = FileRecordStore::open(dir.path(), true).unwrap();
        assert_eq!(store.get("msg/1").unwrap(), None);
        assert_eq!(store.get("msg/2").unwrap(), Some(b"two".to_vec()));
        assert_eq!(store.put("msg/3", b"three".to_vec()).unwrap(), last + 1);
    }

    #[test]
    fn test_torn_tail_is_truncated_on_open() {
        let dir = TempDir::new().unwrap();
        {
            let store = FileRecordStore::open(dir.path(), true).unwrap();
            store.put("msg/1", b"one".to_vec()).unwrap();
        }

        let path = dir.path().join("store").join("records.dat");
        let good_len = fs::metadata(&path).unwrap().len();
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(&[0x40, 0, 0, 0, 1, 2, 3]).unwrap();
        drop(file);

        let store = FileRecordStore::open(dir.path(), true).unwrap();
        assert_eq!(fs::metadata(&path).unwrap().len(), good_len);
        assert_eq!(store.get("msg/1").unwrap(), Some(b"one".to_vec()));
    }
}
