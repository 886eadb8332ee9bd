//! Counts, activity buckets, and anchor span listings.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use chronicle_contracts::{
    anchor::{Anchor, TriggerReason},
    entry::Entry,
    error::{LedgerError, LedgerResult},
};

/// Aggregate counts over a set of entries.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LedgerStats {
    pub total: usize,
    /// Keyed by event type tag.
    pub by_event_type: BTreeMap<String, usize>,
    pub by_actor: BTreeMap<String, usize>,
    pub by_context: BTreeMap<String, usize>,
    pub first_sequence: Option<u64>,
    pub last_sequence: Option<u64>,
    pub first_timestamp: Option<DateTime<Utc>>,
    pub last_timestamp: Option<DateTime<Utc>>,
}

impl LedgerStats {
    pub fn from_entries(entries: &[Entry]) -> Self {
        let mut stats = LedgerStats {
            total: entries.len(),
            ..LedgerStats::default()
        };
        for entry in entries {
            *stats
                .by_event_type
                .entry(entry.event_type.as_str().to_string())
                .or_default() += 1;
            *stats.by_actor.entry(entry.actor.clone()).or_default() += 1;
            *stats.by_context.entry(entry.context_id.clone()).or_default() += 1;

            stats.first_sequence =
                Some(stats.first_sequence.map_or(entry.sequence, |s| s.min(entry.sequence)));
            stats.last_sequence =
                Some(stats.last_sequence.map_or(entry.sequence, |s| s.max(entry.sequence)));
            stats.first_timestamp =
                Some(stats.first_timestamp.map_or(entry.timestamp, |t| t.min(entry.timestamp)));
            stats.last_timestamp =
                Some(stats.last_timestamp.map_or(entry.timestamp, |t| t.max(entry.timestamp)));
        }
        stats
    }

    /// Wall-clock span between the first and last entry.
    pub fn time_span(&self) -> Option<Duration> {
        Some(self.last_timestamp? - self.first_timestamp?)
    }

    pub fn count_of(&self, event_type: &str) -> usize {
        self.by_event_type.get(event_type).copied().unwrap_or(0)
    }
}

/// Entries committed within one fixed-width time bucket.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivityBucket {
    pub start: DateTime<Utc>,
    pub count: usize,
    pub by_event_type: BTreeMap<String, usize>,
}

/// Group entries into consecutive buckets of `width`, aligned to the Unix
/// epoch.  Empty buckets between active ones are included so the series has
/// no holes.
///
/// Returns `LedgerError::Config` for a non-positive width.
pub fn activity(entries: &[Entry], width: Duration) -> LedgerResult<Vec<ActivityBucket>> {
    let width_us = width.num_microseconds().filter(|w| *w > 0).ok_or_else(|| {
        LedgerError::Config {
            reason: format!("activity bucket width must be positive, got {}", width),
        }
    })?;

    let mut counts: BTreeMap<i64, ActivityBucket> = BTreeMap::new();
    for entry in entries {
        let key = entry.timestamp.timestamp_micros().div_euclid(width_us);
        let bucket = counts.entry(key).or_insert_with(|| ActivityBucket {
            start: bucket_start(key, width_us),
            count: 0,
            by_event_type: BTreeMap::new(),
        });
        bucket.count += 1;
        *bucket
            .by_event_type
            .entry(entry.event_type.as_str().to_string())
            .or_default() += 1;
    }

    let (Some(&lo), Some(&hi)) = (counts.keys().next(), counts.keys().next_back()) else {
        return Ok(Vec::new());
    };
    Ok((lo..=hi)
        .map(|key| {
            counts.remove(&key).unwrap_or_else(|| ActivityBucket {
                start: bucket_start(key, width_us),
                count: 0,
                by_event_type: BTreeMap::new(),
            })
        })
        .collect())
}

fn bucket_start(key: i64, width_us: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_micros(key.saturating_mul(width_us)).unwrap_or_default()
}

/// One row of the anchor listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnchorSpan {
    pub anchor_id: String,
    pub from_sequence: u64,
    pub up_to_sequence: u64,
    pub span_count: u64,
    pub trigger_reason: TriggerReason,
    pub created_at: DateTime<Utc>,
    /// First 12 hex characters of the rolling digest.
    pub digest_short: String,
}

pub fn anchor_spans(anchors: &[Anchor]) -> Vec<AnchorSpan> {
    anchors
        .iter()
        .map(|anchor| AnchorSpan {
            anchor_id: anchor.anchor_id.clone(),
            from_sequence: anchor.from_sequence(),
            up_to_sequence: anchor.up_to_sequence,
            span_count: anchor.span_count,
            trigger_reason: anchor.trigger_reason,
            created_at: anchor.created_at,
            digest_short: anchor.chain_digest.chars().take(12).collect(),
        })
        .collect()
}

/// The anchor whose span contains `sequence`, if it has been anchored.
pub fn anchor_covering(anchors: &[Anchor], sequence: u64) -> Option<&Anchor> {
    anchors.iter().find(|anchor| anchor.covers(sequence))
}
