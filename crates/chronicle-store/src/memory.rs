//! In-memory stores.
//!
//! Both stores keep their records in a `Vec` behind `Arc<Mutex<_>>`.  Clones
//! share the same backing vector, so a test can hand one clone to a `Ledger`
//! and keep another to inspect (or deliberately damage) what was written.

use std::sync::{Arc, Mutex, MutexGuard};

use chronicle_contracts::{
    anchor::Anchor,
    entry::{Entry, StoredRecord},
    error::{ErrorContext, LedgerError, LedgerResult},
};
use chronicle_core::traits::{AnchorStore, EntryStore};

fn lock<'a, T>(mutex: &'a Mutex<T>, operation: &'static str) -> LedgerResult<MutexGuard<'a, T>> {
    mutex.lock().map_err(|_| LedgerError::LockPoisoned {
        ctx: ErrorContext::new(operation),
    })
}

/// Volatile entry storage.
#[derive(Clone, Default)]
pub struct MemoryEntryStore {
    records: Arc<Mutex<Vec<StoredRecord>>>,
}

impl MemoryEntryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with already-committed entries (e.g. an import).
    pub fn from_entries(entries: impl IntoIterator<Item = Entry>) -> Self {
        Self {
            records: Arc::new(Mutex::new(
                entries.into_iter().map(StoredRecord::Intact).collect(),
            )),
        }
    }

    /// Replace the record at `position`.  Exists so tests can simulate
    /// on-disk tampering; the ledger itself never rewrites records.
    pub fn overwrite(&self, position: usize, record: StoredRecord) -> LedgerResult<()> {
        let mut records = lock(&self.records, "overwrite")?;
        match records.get_mut(position) {
            Some(slot) => {
                *slot = record;
                Ok(())
            }
            None => Err(LedgerError::Config {
                reason: format!("no record at position {}", position),
            }),
        }
    }
}

impl EntryStore for MemoryEntryStore {
    fn append(&self, entry: &Entry) -> LedgerResult<()> {
        lock(&self.records, "append")?.push(StoredRecord::Intact(entry.clone()));
        Ok(())
    }

    fn read_all(&self) -> LedgerResult<Vec<StoredRecord>> {
        Ok(lock(&self.records, "read_entries")?.clone())
    }

    fn read_from(&self, from: u64) -> LedgerResult<Vec<StoredRecord>> {
        let records = lock(&self.records, "read_entries")?;
        let start = (from as usize).min(records.len());
        Ok(records[start..].to_vec())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

/// Volatile anchor storage.
#[derive(Clone, Default)]
pub struct MemoryAnchorStore {
    anchors: Arc<Mutex<Vec<Anchor>>>,
}

impl MemoryAnchorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AnchorStore for MemoryAnchorStore {
    fn append(&self, anchor: &Anchor) -> LedgerResult<()> {
        lock(&self.anchors, "anchor")?.push(anchor.clone());
        Ok(())
    }

    fn read_all(&self) -> LedgerResult<Vec<Anchor>> {
        Ok(lock(&self.anchors, "read_anchors")?.clone())
    }
}
