//! Batch record format
//!
//! The record file is a sequence of batches. One batch is one atomic write:
//!
//! ```text
//! +------------------+
//! | Batch Length     | (u32 LE, includes itself and the checksum)
//! +------------------+
//! | Sequence         | (u64 LE, strictly increasing)
//! +------------------+
//! | Op Count         | (u32 LE)
//! +------------------+
//! | Ops...           | op type (u8: 1 = put, 2 = delete)
//! |                  | key (length-prefixed UTF-8)
//! |                  | value (length-prefixed bytes, put only)
//! +------------------+
//! | Checksum         | (u32 LE)
//! +------------------+
//! ```
//!
//! Checksum covers all bytes except the checksum itself.

use std::io::{self, Cursor, Read};

use super::checksum::compute_checksum;

const OP_PUT: u8 = 1;
const OP_DELETE: u8 = 2;

/// Length + sequence + op count + checksum.
pub(crate) const MIN_BATCH_SIZE: usize = 4 + 8 + 4 + 4;

/// A single mutation inside a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    Put { key: String, value: Vec<u8> },
    Delete { key: String },
}

impl WriteOp {
    pub fn key(&self) -> &str {
        match self {
            WriteOp::Put { key, .. } | WriteOp::Delete { key } => key,
        }
    }
}

/// An ordered group of mutations applied all-or-nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, key: impl Into<String>, value: impl Into<Vec<u8>>) {
        self.ops.push(WriteOp::Put {
            key: key.into(),
            value: value.into(),
        });
    }

    pub fn delete(&mut self, key: impl Into<String>) {
        self.ops.push(WriteOp::Delete { key: key.into() });
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

impl From<Vec<WriteOp>> for WriteBatch {
    fn from(ops: Vec<WriteOp>) -> Self {
        Self { ops }
    }
}

/// A batch as framed on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchRecord {
    pub sequence: u64,
    pub batch: WriteBatch,
}

impl BatchRecord {
    pub fn new(sequence: u64, batch: WriteBatch) -> Self {
        Self { sequence, batch }
    }

    fn serialize_body(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&self.sequence.to_le_bytes());
        buf.extend_from_slice(&(self.batch.len() as u32).to_le_bytes());

        for op in self.batch.ops() {
            match op {
                WriteOp::Put { key, value } => {
                    buf.push(OP_PUT);
                    buf.extend_from_slice(&(key.len() as u32).to_le_bytes());
                    buf.extend_from_slice(key.as_bytes());
                    buf.extend_from_slice(&(value.len() as u32).to_le_bytes());
                    buf.extend_from_slice(value);
                }
                WriteOp::Delete { key } => {
                    buf.push(OP_DELETE);
                    buf.extend_from_slice(&(key.len() as u32).to_le_bytes());
                    buf.extend_from_slice(key.as_bytes());
                }
            }
        }

        buf
    }

    /// Serialize the complete batch to bytes.
    pub fn serialize(&self) -> Vec<u8> {
        let body = self.serialize_body();
        let batch_length = (4 + body.len() + 4) as u32;

        let mut record = Vec::with_capacity(batch_length as usize);
        record.extend_from_slice(&batch_length.to_le_bytes());
        record.extend_from_slice(&body);
        let checksum = compute_checksum(&record);
        record.extend_from_slice(&checksum.to_le_bytes());

        record
    }

    /// Deserialize a batch from bytes, verifying checksum.
    ///
    /// Returns the batch and the number of bytes consumed.
    pub fn deserialize(data: &[u8]) -> io::Result<(Self, usize)> {
        if data.len() < MIN_BATCH_SIZE {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "Batch too short"));
        }

        let batch_length = u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize;

        if batch_length < MIN_BATCH_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Invalid batch length: {}", batch_length),
            ));
        }

        if data.len() < batch_length {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "Batch truncated: expected {} bytes, got {}",
                    batch_length,
                    data.len()
                ),
            ));
        }

        let checksum_offset = batch_length - 4;
        let mut stored = [0u8; 4];
        stored.copy_from_slice(&data[checksum_offset..batch_length]);
        let stored_checksum = u32::from_le_bytes(stored);
        let computed_checksum = compute_checksum(&data[0..checksum_offset]);

        if computed_checksum != stored_checksum {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "Checksum mismatch: computed {:08x}, stored {:08x}",
                    computed_checksum, stored_checksum
                ),
            ));
        }

        let mut cursor = Cursor::new(&data[4..checksum_offset]);

        let mut seq_buf = [0u8; 8];
        cursor.read_exact(&mut seq_buf)?;
        let sequence = u64::from_le_bytes(seq_buf);

        let op_count = read_u32(&mut cursor)? as usize;
        let mut ops = Vec::with_capacity(op_count);

        for _ in 0..op_count {
            let mut op_type = [0u8; 1];
            cursor.read_exact(&mut op_type)?;
            let key = read_string(&mut cursor)?;
            match op_type[0] {
                OP_PUT => {
                    let value = read_bytes(&mut cursor)?;
                    ops.push(WriteOp::Put { key, value });
                }
                OP_DELETE => ops.push(WriteOp::Delete { key }),
                other => {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("Unknown op type: {}", other),
                    ))
                }
            }
        }

        Ok((Self::new(sequence, WriteBatch::from(ops)), batch_length))
    }
}

fn read_u32<R: Read>(reader: &mut R) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_bytes<R: Read>(reader: &mut R) -> io::Result<Vec<u8>> {
    let len = read_u32(reader)? as usize;
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

fn read_string<R: Read>(reader: &mut R) -> io::Result<String> {
    String::from_utf8(read_bytes(reader)?).map_err(|e| {
        io::Error::new(io::ErrorKind::InvalidData, format!("Invalid UTF-8: {}", e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_batch() -> WriteBatch {
        let mut batch = WriteBatch::new();
        batch.put("msg/00000000000000000001", b"hello".to_vec());
        batch.put("enq/orders/00000000000000000001", b"{}".to_vec());
        batch.delete("enq/orders/00000000000000000000");
        batch
    }

    #[test]
    fn test_batch_roundtrip_preserves_op_order() {
        let record = BatchRecord::new(7, sample_batch());
        let bytes = record.serialize();
        let (decoded, consumed) = BatchRecord::deserialize(&bytes).unwrap();

        assert_eq!(consumed, bytes.len());
        assert_eq!(decoded.sequence, 7);
        assert_eq!(decoded.batch.ops()[2].key(), "enq/orders/00000000000000000000");
        assert_eq!(decoded, record);
    }

    #[test]
    fn test_checksum_detects_corruption() {
        let mut bytes = BatchRecord::new(1, sample_batch()).serialize();
        let mid = bytes.len() / 2;
        bytes[mid] ^= 0xFF;

        let err = BatchRecord::deserialize(&bytes).unwrap_err();
        assert!(err.to_string().contains("Checksum mismatch"));
    }

    #[test]
    fn test_truncated_batch_is_eof() {
        let bytes = BatchRecord::new(1, sample_batch()).serialize();
        let err = BatchRecord::deserialize(&bytes[..bytes.len() - 3]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_empty_batch_is_minimal() {
        let bytes = BatchRecord::new(1, WriteBatch::new()).serialize();
        assert_eq!(bytes.len(), MIN_BATCH_SIZE);
    }
}
