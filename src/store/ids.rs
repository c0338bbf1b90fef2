//! Message id allocation
//!
//! Ids are handed out from a reserved block. The upper bound of the block
//! is written to `cfg/store/next_ids` before the first id in it is used, so
//! a restarted node never reuses an id. Ids reserved but unused before a
//! restart are skipped.

use std::sync::{Mutex, MutexGuard};

use crate::failure::{Failure, FailureResult};
use crate::message::MessageId;
use crate::storage::RecordStore;

pub(crate) const NEXT_IDS_KEY: &str = "cfg/store/next_ids";

const RESERVATION_BLOCK: u64 = 1024;

#[derive(Debug, Default)]
struct IdState {
    next: u64,
    reserved: u64,
}

#[derive(Debug, Default)]
pub(crate) struct IdAllocator {
    state: Mutex<IdState>,
}

impl IdAllocator {
    fn lock(&self) -> FailureResult<MutexGuard<'_, IdState>> {
        self.state
            .lock()
            .map_err(|_| Failure::poisoned("message id allocator"))
    }

    /// Resume after the persisted reservation and after `floor`, the
    /// lowest id not yet present in the store.
    pub(crate) fn resume(&self, records: &dyn RecordStore, floor: u64) -> FailureResult<()> {
        let persisted = match records.get(NEXT_IDS_KEY)? {
            Some(bytes) => serde_json::from_slice::<u64>(&bytes).map_err(|e| {
                Failure::server_scoped("corrupt message id reservation").with_source(e)
            })?,
            None => 0,
        };
        let mut state = self.lock()?;
        let next = state.next.max(persisted).max(floor).max(1);
        *state = IdState {
            next,
            reserved: next,
        };
        Ok(())
    }

    pub(crate) fn allocate(&self, records: &dyn RecordStore) -> FailureResult<MessageId> {
        let mut state = self.lock()?;
        if state.next >= state.reserved {
            let reserved = state.next + RESERVATION_BLOCK;
            let bytes = serde_json::to_vec(&reserved).map_err(|e| {
                Failure::server_scoped("failed to encode message id reservation").with_source(e)
            })?;
            records.put(NEXT_IDS_KEY, bytes)?;
            state.reserved = reserved;
        }
        let id = state.next;
        state.next += 1;
        Ok(MessageId(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryRecordStore;

    #[test]
    fn test_ids_are_unique_across_restart() {
        let records = MemoryRecordStore::new();

        let first = IdAllocator::default();
        first.resume(&records, 0).unwrap();
        let a = first.allocate(&records).unwrap();
        let b = first.allocate(&records).unwrap();
        assert!(b > a);

        let second = IdAllocator::default();
        second.resume(&records, 0).unwrap();
        let c = second.allocate(&records).unwrap();
        assert!(c > b);
    }

    #[test]
    fn test_floor_is_respected() {
        let records = MemoryRecordStore::new();
        let ids = IdAllocator::default();
        ids.resume(&records, 5000).unwrap();
        assert_eq!(ids.allocate(&records).unwrap(), MessageId(5000));
    }

    #[test]
    fn test_reservation_failure_is_server_scoped() {
        let records = MemoryRecordStore::new();
        let ids = IdAllocator::default();
        ids.resume(&records, 0).unwrap();
        records.fail_next_write();
        assert!(ids.allocate(&records).unwrap_err().is_fatal());
    }
}
