//! Collaborator trait definitions for the Chronicle ledger.
//!
//! These traits are the seams the `Ledger` is built from:
//!
//! - `EntryStore`   — durable, append-only entry persistence
//! - `AnchorStore`  — durable, append-only anchor persistence
//! - `AnchorPolicy` — decides after each commit whether to checkpoint
//! - `EntrySigner`  — optional keyed MAC over each entry hash
//! - `EntrySource`  — anything that can hand out a consistent entry snapshot
//!
//! Implementations are injected at construction.  The core never reaches
//! out to its callers; everything it needs arrives through these traits.

use chrono::{DateTime, Utc};

use chronicle_contracts::{
    anchor::{Anchor, TriggerReason},
    entry::{Entry, StoredRecord},
    error::LedgerResult,
    event::EventType,
};

/// Durable storage for committed entries.
///
/// Implementations must treat `append` as append-only and return only after
/// the record is durable.  Records are never modified or deleted by the
/// ledger.
pub trait EntryStore: Send + Sync {
    /// Persist one entry after every previously appended one.
    ///
    /// A failed append must leave the store as it was before the call.
    fn append(&self, entry: &Entry) -> LedgerResult<()>;

    /// Read every persisted record in store order.
    ///
    /// Records that cannot be decoded are returned as
    /// `StoredRecord::Unreadable`, never skipped.
    fn read_all(&self) -> LedgerResult<Vec<StoredRecord>>;

    /// Read records from position `from` onward.
    ///
    /// The default reads everything and drops the prefix; stores with an
    /// index can do better.
    fn read_from(&self, from: u64) -> LedgerResult<Vec<StoredRecord>> {
        let mut records = self.read_all()?;
        let skip = (from as usize).min(records.len());
        Ok(records.split_off(skip))
    }

    /// Short description used in log lines (e.g. a file path).
    fn describe(&self) -> String;
}

/// Durable storage for committed anchors.
pub trait AnchorStore: Send + Sync {
    fn append(&self, anchor: &Anchor) -> LedgerResult<()>;

    /// Every committed anchor, in commit order.
    fn read_all(&self) -> LedgerResult<Vec<Anchor>>;
}

/// Everything the anchor policy sees after a commit.
#[derive(Debug, Clone)]
pub struct AnchorState<'a> {
    /// The sequence that was just committed.
    pub sequence: u64,
    /// Entries committed since the last anchor was triggered, including this one.
    pub entries_since_anchor: u64,
    /// When the current anchor window opened.
    pub window_started_at: DateTime<Utc>,
    /// Commit time of the entry just written.
    pub now: DateTime<Utc>,
    pub event_type: &'a EventType,
    /// External urgency/anomaly score supplied with the append, if any.
    pub score: Option<f64>,
}

/// Decides whether the entry just committed should trigger an anchor.
///
/// Called inside the append critical section, so implementations must be
/// fast and must not perform I/O.
pub trait AnchorPolicy: Send + Sync {
    fn should_anchor(&self, state: &AnchorState<'_>) -> Option<TriggerReason>;
}

/// A policy that never triggers; anchors are only created via `anchor_now()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ManualAnchorsOnly;

impl AnchorPolicy for ManualAnchorsOnly {
    fn should_anchor(&self, _state: &AnchorState<'_>) -> Option<TriggerReason> {
        None
    }
}

/// Keyed MAC over entry hashes.
///
/// Signing is independent of the hash chain: the signature covers
/// `entry_hash` and is not part of the hash preimage, so chain verification
/// gives the same answer whether or not a signer is configured.
pub trait EntrySigner: Send + Sync {
    /// Identifier of the key in use, for log lines.
    fn key_id(&self) -> &str;

    /// Produce the signature string stored alongside the entry.
    fn sign(&self, entry_hash: &str) -> String;

    /// Check a stored signature in constant time.
    fn verify(&self, entry_hash: &str, signature: &str) -> bool;
}

/// A source of committed entries for read-only consumers.
///
/// The snapshot must contain only fully committed entries, in ascending
/// sequence order.
pub trait EntrySource {
    fn snapshot(&self) -> LedgerResult<Vec<Entry>>;
}

impl EntrySource for [Entry] {
    fn snapshot(&self) -> LedgerResult<Vec<Entry>> {
        Ok(self.to_vec())
    }
}

impl EntrySource for Vec<Entry> {
    fn snapshot(&self) -> LedgerResult<Vec<Entry>> {
        Ok(self.clone())
    }
}
