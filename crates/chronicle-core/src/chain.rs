//! Hash-chain primitives: canonical hashing, anchor digests, and chain
//! verification.
//!
//! Entry hash input layout (bytes, in order, separated by `0x1F`):
//!   1. sequence as decimal ASCII
//!   2. timestamp in the fixed `timestamp::format` form
//!   3. event type tag
//!   4. context_id as UTF-8
//!   5. actor as UTF-8
//!   6. RFC 8785 canonical JSON of the payload object
//!   7. prev_hash as UTF-8 (64 ASCII hex chars)
//!
//! Every field that contributes to the hash is listed explicitly so nothing
//! is accidentally omitted.  `entry_hash` and `signature` never do.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use chronicle_contracts::{
    entry::{Entry, StoredRecord, GENESIS_HASH, GENESIS_SEQUENCE},
    error::LedgerResult,
    event::EventType,
    timestamp,
    verify::ChainVerification,
};

use crate::cancel::ScanOptions;

/// Separator byte between hash preimage fields (ASCII unit separator).
pub const FIELD_SEPARATOR: u8 = 0x1F;

/// Canonical bytes of a payload object (RFC 8785 / JCS).
pub fn canonical_payload(payload: &Map<String, Value>) -> Result<Vec<u8>, serde_json::Error> {
    serde_jcs::to_vec(payload)
}

/// Compute the SHA-256 entry hash from already-canonicalized parts.
///
/// Returns a lowercase 64-character hex string.
pub fn hash_entry(
    sequence: u64,
    timestamp: &DateTime<Utc>,
    event_type: &EventType,
    context_id: &str,
    actor: &str,
    canonical_payload: &[u8],
    prev_hash: &str,
) -> String {
    let sequence = sequence.to_string();
    let timestamp = timestamp::format(timestamp);

    let mut hasher = Sha256::new();
    for (i, part) in [
        sequence.as_bytes(),
        timestamp.as_bytes(),
        event_type.as_str().as_bytes(),
        context_id.as_bytes(),
        actor.as_bytes(),
        canonical_payload,
        prev_hash.as_bytes(),
    ]
    .into_iter()
    .enumerate()
    {
        if i > 0 {
            hasher.update([FIELD_SEPARATOR]);
        }
        hasher.update(part);
    }

    hex::encode(hasher.finalize())
}

/// Recompute the hash a stored entry should have.
pub fn recompute_hash(entry: &Entry) -> Result<String, serde_json::Error> {
    let canonical = canonical_payload(&entry.payload)?;
    Ok(hash_entry(
        entry.sequence,
        &entry.timestamp,
        &entry.event_type,
        &entry.context_id,
        &entry.actor,
        &canonical,
        &entry.prev_hash,
    ))
}

/// Rolling anchor digest: SHA-256 over the previous digest followed by each
/// entry hash in the span, all as ASCII hex.
pub fn anchor_digest<'a, I>(prev_digest: &str, entry_hashes: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let mut hasher = Sha256::new();
    hasher.update(prev_digest.as_bytes());
    for hash in entry_hashes {
        hasher.update(hash.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Where a verification pass starts: the sequence it expects first, and the
/// hash it trusts as that entry's predecessor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainCursor {
    pub next_sequence: u64,
    pub prev_hash: String,
}

impl ChainCursor {
    pub fn genesis() -> Self {
        Self {
            next_sequence: GENESIS_SEQUENCE,
            prev_hash: GENESIS_HASH.to_string(),
        }
    }
}

/// Verify a run of stored records against the chain rules.
///
/// Checks, for every record in order:
///
/// 1. **Readability** — the record decoded into an entry.
/// 2. **Contiguity** — its `sequence` is exactly the next expected one.
/// 3. **Prev-hash linkage** — its `prev_hash` equals the previous entry's hash.
/// 4. **Hash correctness** — its `entry_hash` matches the recomputed value.
///
/// Stops at the first failure and reports its index.  An empty run is valid.
pub fn verify_records(
    records: &[StoredRecord],
    start: ChainCursor,
    options: &ScanOptions,
) -> LedgerResult<ChainVerification> {
    let mut expected_sequence = start.next_sequence;
    let mut expected_prev = start.prev_hash;
    let mut checked = 0u64;

    for record in records {
        options.checkpoint("verify_chain", expected_sequence)?;

        let entry = match record {
            StoredRecord::Intact(entry) => entry,
            StoredRecord::Unreadable { reason, .. } => {
                return Ok(ChainVerification::failed(
                    expected_sequence,
                    checked,
                    format!("record unreadable: {}", reason),
                ));
            }
        };

        // Rule 2: no gaps, no repeats.
        if entry.sequence != expected_sequence {
            return Ok(ChainVerification::failed(
                expected_sequence,
                checked,
                format!(
                    "sequence gap: expected {}, found {}",
                    expected_sequence, entry.sequence
                ),
            ));
        }

        // Rule 3: the stored prev_hash must match what we expect.
        if entry.prev_hash != expected_prev {
            return Ok(ChainVerification::failed(
                expected_sequence,
                checked,
                "prev_hash does not link to the preceding entry",
            ));
        }

        // Rule 4: recompute entry_hash and compare to the stored value.
        let recomputed = match recompute_hash(entry) {
            Ok(hash) => hash,
            Err(e) => {
                return Ok(ChainVerification::failed(
                    expected_sequence,
                    checked,
                    format!("payload not canonicalizable: {}", e),
                ));
            }
        };
        if entry.entry_hash != recomputed {
            return Ok(ChainVerification::failed(
                expected_sequence,
                checked,
                "entry_hash does not match recomputed hash",
            ));
        }

        checked += 1;
        expected_sequence += 1;
        expected_prev = entry.entry_hash.clone();
    }

    Ok(ChainVerification::passed(checked))
}

/// Verify a complete chain of decoded entries from genesis.
///
/// Convenience for exported logs that are not backed by a store.
pub fn verify_entries(entries: &[Entry]) -> ChainVerification {
    let records: Vec<StoredRecord> = entries.iter().cloned().map(StoredRecord::Intact).collect();
    match verify_records(&records, ChainCursor::genesis(), &ScanOptions::full()) {
        Ok(report) => report,
        // Unreachable without a cancel token or deadline.
        Err(e) => ChainVerification::failed(0, 0, e.to_string()),
    }
}
