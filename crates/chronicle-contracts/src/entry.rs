//! The ledger entry and its persisted form.
//!
//! `Entry` is one committed record in the hash chain.  Its serialized JSON is
//! the stable on-disk contract: one object per line, field names as declared
//! here, `signature` written as `null` when signing is disabled.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    error::{ErrorContext, LedgerError, LedgerResult},
    event::EventType,
    payload::EventPayload,
};

/// The sentinel `prev_hash` of entry 0, and the predecessor digest of the
/// first anchor.  64 ASCII zeros.
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// The sequence number assigned to the first entry of every ledger.
pub const GENESIS_SEQUENCE: u64 = 0;

/// A single committed record in the hash chain.
///
/// Modifying any hashed field (everything except `entry_hash` and
/// `signature`) invalidates `entry_hash` and, through `prev_hash`, every
/// later link.  `verify_chain` detects both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    /// Position in the chain, contiguous from `GENESIS_SEQUENCE`.
    pub sequence: u64,

    /// Commit time, UTC, microsecond precision.
    #[serde(with = "crate::timestamp")]
    pub timestamp: DateTime<Utc>,

    pub event_type: EventType,

    /// The conversation or task thread this entry belongs to.
    pub context_id: String,

    /// Who produced the event (e.g. `"assistant"`, `"human"`, `"system"`).
    pub actor: String,

    /// Structured event body.  Hashed in canonical (RFC 8785) form.
    pub payload: serde_json::Map<String, serde_json::Value>,

    /// `entry_hash` of the previous entry, or `GENESIS_HASH`.
    pub prev_hash: String,

    /// SHA-256 (hex) over the canonical preimage of this entry.
    pub entry_hash: String,

    /// Optional keyed MAC over `entry_hash`.  Not part of the hash preimage.
    #[serde(default)]
    pub signature: Option<String>,
}

impl Entry {
    /// Recover the strongly typed payload for this entry's `event_type`.
    ///
    /// Unknown event types decode to `EventPayload::Raw`.  Returns
    /// `LedgerError::Serialization` when a known type's payload does not have
    /// the expected shape.
    pub fn decode_payload(&self) -> LedgerResult<EventPayload> {
        EventPayload::decode(&self.event_type, &self.payload).map_err(|e| {
            LedgerError::Serialization {
                ctx: ErrorContext::new("decode_payload")
                    .at(self.sequence)
                    .in_context(self.context_id.clone()),
                reason: format!("payload does not match {}: {}", self.event_type, e),
            }
        })
    }

    /// True when this is the first entry of its chain.
    pub fn is_genesis(&self) -> bool {
        self.sequence == GENESIS_SEQUENCE
    }
}

/// One record as read back from persisted storage.
///
/// Stores never hide a record they cannot decode: an unparseable line is
/// reported as `Unreadable` at its position so verification can flag it.
#[derive(Debug, Clone, PartialEq)]
pub enum StoredRecord {
    Intact(Entry),
    Unreadable {
        /// Zero-based position of the record within the store.
        position: u64,
        reason: String,
    },
}

impl StoredRecord {
    pub fn entry(&self) -> Option<&Entry> {
        match self {
            StoredRecord::Intact(entry) => Some(entry),
            StoredRecord::Unreadable { .. } => None,
        }
    }

    pub fn into_entry(self) -> Option<Entry> {
        match self {
            StoredRecord::Intact(entry) => Some(entry),
            StoredRecord::Unreadable { .. } => None,
        }
    }
}
