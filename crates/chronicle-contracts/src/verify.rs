//! Verification reports.
//!
//! A report is a value, not an error: a broken chain is a legitimate answer
//! to "is this log intact?".  `LedgerError::ChainIntegrity` is only used when
//! a caller asks for a verified result and the chain cannot provide one.

use serde::{Deserialize, Serialize};

/// Outcome of checking entry hashes, linkage, and sequence contiguity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainVerification {
    /// True when every checked entry matched.
    pub valid: bool,
    /// Index (sequence position) of the first divergence, if any.
    pub first_bad_index: Option<u64>,
    /// Number of entries checked before stopping.
    pub checked: u64,
    /// Human-readable description of the divergence.
    pub reason: Option<String>,
}

impl ChainVerification {
    pub fn passed(checked: u64) -> Self {
        Self {
            valid: true,
            first_bad_index: None,
            checked,
            reason: None,
        }
    }

    pub fn failed(index: u64, checked: u64, reason: impl Into<String>) -> Self {
        Self {
            valid: false,
            first_bad_index: Some(index),
            checked,
            reason: Some(reason.into()),
        }
    }

    /// The `(valid, first_bad_index)` pair callers typically branch on.
    pub fn outcome(&self) -> (bool, Option<u64>) {
        (self.valid, self.first_bad_index)
    }
}

/// Outcome of re-deriving every anchor's rolling digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnchorVerification {
    pub valid: bool,
    /// Position of the first anchor that failed, in commit order.
    pub first_bad_anchor: Option<usize>,
    pub anchors_checked: usize,
    pub reason: Option<String>,
}

/// Outcome of checking per-entry signatures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureReport {
    /// Entries whose signature verified.
    pub verified: u64,
    /// Sequences of entries with no signature.
    pub unsigned: Vec<u64>,
    /// Sequences of entries whose signature did not verify.
    pub invalid: Vec<u64>,
}

impl SignatureReport {
    /// True when every entry carried a valid signature.
    pub fn all_valid(&self) -> bool {
        self.unsigned.is_empty() && self.invalid.is_empty()
    }
}
