//! Entry predicates.
//!
//! Each `Filter` tests one field of an entry.  A query holds a list of them
//! and keeps an entry only if every filter matches, so the order in which
//! filters were added never changes the result.

use std::ops::RangeInclusive;

use chrono::{DateTime, Utc};

use chronicle_contracts::{entry::Entry, event::EventType};
use chronicle_core::canonical_payload;

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Event type is any of these.
    EventTypes(Vec<EventType>),
    Context(String),
    Actor(String),
    /// Sequence within the inclusive range.
    Sequences(RangeInclusive<u64>),
    /// Timestamp in `[from, until)`.  Either bound may be open.
    Time {
        from: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
    },
    /// Substring of the canonical payload JSON.
    PayloadContains(String),
}

impl Filter {
    pub fn matches(&self, entry: &Entry) -> bool {
        match self {
            Filter::EventTypes(types) => types.contains(&entry.event_type),
            Filter::Context(id) => entry.context_id == *id,
            Filter::Actor(actor) => entry.actor == *actor,
            Filter::Sequences(range) => range.contains(&entry.sequence),
            Filter::Time { from, until } => {
                from.map_or(true, |from| entry.timestamp >= from)
                    && until.map_or(true, |until| entry.timestamp < until)
            }
            Filter::PayloadContains(needle) => match canonical_payload(&entry.payload) {
                Ok(bytes) => String::from_utf8_lossy(&bytes).contains(needle.as_str()),
                Err(_) => false,
            },
        }
    }
}

/// True if `entry` passes every filter.  An empty list matches everything.
pub fn matches_all(filters: &[Filter], entry: &Entry) -> bool {
    filters.iter().all(|filter| filter.matches(entry))
}
