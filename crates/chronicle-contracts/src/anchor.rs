//! Anchor checkpoints.
//!
//! An `Anchor` commits to a contiguous span of entries with a rolling digest:
//!
//!   chain_digest = SHA-256(prev_anchor.chain_digest ∥ entry_hash[first] ∥ … ∥ entry_hash[last])
//!
//! so a verifier holding a trusted anchor only has to check the entries after
//! `up_to_sequence`.  Anchors are append-only, like entries.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Why an anchor was committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerReason {
    /// Entry count since the last anchor reached the threshold.
    Count,
    /// Wall-clock interval since the last anchor elapsed.
    Time,
    /// The committed event type is in the always-anchor set.
    Event,
    /// An external urgency/anomaly score exceeded the threshold.
    Score,
    /// Requested explicitly via `anchor_now()`.
    Manual,
}

impl TriggerReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerReason::Count => "count",
            TriggerReason::Time => "time",
            TriggerReason::Event => "event",
            TriggerReason::Score => "score",
            TriggerReason::Manual => "manual",
        }
    }
}

impl fmt::Display for TriggerReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TriggerReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "count" => Ok(TriggerReason::Count),
            "time" => Ok(TriggerReason::Time),
            "event" => Ok(TriggerReason::Event),
            "score" => Ok(TriggerReason::Score),
            "manual" => Ok(TriggerReason::Manual),
            other => Err(format!("unknown trigger reason '{}'", other)),
        }
    }
}

/// A committed checkpoint over a span of entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anchor {
    /// UUID v4, rendered as a hyphenated string.
    pub anchor_id: String,

    #[serde(with = "crate::timestamp")]
    pub created_at: DateTime<Utc>,

    /// Last sequence covered by this anchor (inclusive).
    pub up_to_sequence: u64,

    /// Rolling SHA-256 digest (hex) over the previous anchor's digest and
    /// every entry hash in the span.
    pub chain_digest: String,

    pub trigger_reason: TriggerReason,

    /// Number of entries in the span.  Always at least 1.
    pub span_count: u64,
}

impl Anchor {
    /// First sequence covered by this anchor (inclusive).
    pub fn from_sequence(&self) -> u64 {
        (self.up_to_sequence + 1).saturating_sub(self.span_count)
    }

    /// True if `sequence` falls within this anchor's span.
    pub fn covers(&self, sequence: u64) -> bool {
        sequence >= self.from_sequence() && sequence <= self.up_to_sequence
    }
}
