//! Batch reader with strict corruption detection
//!
//! - Every batch is checksum-verified on read
//! - An incomplete batch at the end of the file is a torn write: it was
//!   never acknowledged, so reading stops there and the caller truncates
//! - A bad batch anywhere else is corruption and fatal

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use super::errors::{StorageError, StorageResult};
use super::record::{BatchRecord, MIN_BATCH_SIZE};

/// Sequential reader over the record file.
pub struct BatchReader {
    path: PathBuf,
    reader: BufReader<File>,
    current_offset: u64,
    file_size: u64,
    torn_at: Option<u64>,
}

impl BatchReader {
    /// Opens the record file for reading.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let file = File::open(path).map_err(|e| {
            StorageError::read_failed(format!("Failed to open record file: {}", path.display()), e)
        })?;

        let file_size = file
            .metadata()
            .map_err(|e| StorageError::read_failed("Failed to read file metadata", e))?
            .len();

        Ok(Self {
            path: path.to_path_buf(),
            reader: BufReader::new(file),
            current_offset: 0,
            file_size,
            torn_at: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Offset just past the last complete batch read so far.
    pub fn current_offset(&self) -> u64 {
        self.current_offset
    }

    /// Offset of an incomplete trailing batch, if one was found.
    pub fn torn_at(&self) -> Option<u64> {
        self.torn_at
    }

    fn mark_torn(&mut self) -> StorageResult<Option<BatchRecord>> {
        self.torn_at = Some(self.current_offset);
        Ok(None)
    }

    /// Reads the next batch.
    ///
    /// Returns `Ok(None)` at end of file or at a torn trailing batch.
    pub fn read_next(&mut self) -> StorageResult<Option<BatchRecord>> {
        if self.torn_at.is_some() || self.current_offset >= self.file_size {
            return Ok(None);
        }

        let remaining = self.file_size - self.current_offset;
        if remaining < MIN_BATCH_SIZE as u64 {
            return self.mark_torn();
        }

        let mut len_buf = [0u8; 4];
        self.reader.read_exact(&mut len_buf).map_err(|e| {
            StorageError::corruption_at_offset(
                self.current_offset,
                format!("Failed to read batch length: {}", e),
            )
        })?;
        let batch_length = u32::from_le_bytes(len_buf) as u64;

        if batch_length < MIN_BATCH_SIZE as u64 {
            return Err(StorageError::corruption_at_offset(
                self.current_offset,
                format!("Invalid batch length: {}", batch_length),
            ));
        }

        if batch_length > remaining {
            return self.mark_torn();
        }

        let mut buf = vec![0u8; batch_length as usize];
        buf[0..4].copy_from_slice(&len_buf);
        self.reader.read_exact(&mut buf[4..]).map_err(|e| {
            StorageError::corruption_at_offset(
                self.current_offset,
                format!("Failed to read batch body: {}", e),
            )
        })?;

        match BatchRecord::deserialize(&buf) {
            Ok((record, consumed)) => {
                self.current_offset += consumed as u64;
                Ok(Some(record))
            }
            // A checksum failure on the final batch is an unacknowledged write.
            Err(_) if self.current_offset + batch_length == self.file_size => self.mark_torn(),
            Err(e) => Err(StorageError::corruption_at_offset(
                self.current_offset,
                e.to_string(),
            )),
        }
    }

    /// Reads all complete batches.
    pub fn read_all(&mut self) -> StorageResult<Vec<BatchRecord>> {
        let mut batches = Vec::new();
        while let Some(batch) = self.read_next()? {
            batches.push(batch);
        }
        Ok(batches)
    }
}

#[cfg(test)]
mod tests {
    use super::super::record::WriteBatch;
    use super::*;
    use std::fs::OpenOptions;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_batches(path: &Path, count: u64) -> Vec<u8> {
        let mut all = Vec::new();
        for seq in 1..=count {
            let mut batch = WriteBatch::new();
            batch.put(format!("msg/{}", seq), vec![seq as u8; 16]);
            all.extend(BatchRecord::new(seq, batch).serialize());
        }
        std::fs::write(path, &all).unwrap();
        all
    }

    #[test]
    fn test_read_empty_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("records.dat");
        std::fs::write(&path, b"").unwrap();

        let mut reader = BatchReader::open(&path).unwrap();
        assert!(reader.read_next().unwrap().is_none());
        assert!(reader.torn_at().is_none());
    }

    #[test]
    fn test_read_all_batches() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("records.dat");
        write_batches(&path, 3);

        let mut reader = BatchReader::open(&path).unwrap();
        let batches = reader.read_all().unwrap();
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[2].sequence, 3);
    }

    #[test]
    fn test_torn_tail_is_not_corruption() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("records.dat");
        let bytes = write_batches(&path, 2);

        // Half of a third batch.
        let mut batch = WriteBatch::new();
        batch.put("msg/3", vec![3u8; 16]);
        let third = BatchRecord::new(3, batch).serialize();
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(&third[..third.len() / 2]).unwrap();

        let mut reader = BatchReader::open(&path).unwrap();
        let batches = reader.read_all().unwrap();
        assert_eq!(batches.len(), 2);
        assert_eq!(reader.torn_at(), Some(bytes.len() as u64));
    }

    #[test]
    fn test_mid_file_corruption_is_fatal() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("records.dat");
        let mut bytes = write_batches(&path, 3);
        bytes[10] ^= 0xFF;
        std::fs::write(&path, &bytes).unwrap();

        let mut reader = BatchReader::open(&path).unwrap();
        let err = reader.read_all().unwrap_err();
        assert_eq!(err.code().code(), "MQ_DATA_CORRUPTION");
    }
}
