//! The chainable query builder.

use std::ops::RangeInclusive;

use chrono::{DateTime, Utc};
use tracing::debug;

use chronicle_contracts::{entry::Entry, error::LedgerResult, event::EventType};
use chronicle_core::traits::EntrySource;

use crate::filter::{matches_all, Filter};

/// A read-only query over the committed entries of an `EntrySource`.
///
/// Filters combine with AND semantics.  Nothing is read until a terminal
/// operation runs; each terminal takes one snapshot of the source, so it
/// sees every entry committed before it started and nothing half-written.
///
/// ```rust,ignore
/// let corrections = ledger
///     .query()
///     .context("SB-1")
///     .event_type(EventType::Correction)
///     .collect()?;
/// ```
pub struct Query<'a, S: EntrySource + ?Sized> {
    source: &'a S,
    filters: Vec<Filter>,
}

impl<'a, S: EntrySource + ?Sized> Query<'a, S> {
    pub fn new(source: &'a S) -> Self {
        Self {
            source,
            filters: Vec::new(),
        }
    }

    /// Keep entries of this event type.  Calling it twice with different
    /// types matches nothing; use `event_types` for any-of.
    pub fn event_type(self, event_type: impl Into<EventType>) -> Self {
        self.filter(Filter::EventTypes(vec![event_type.into()]))
    }

    /// Keep entries whose event type is any of `types`.
    pub fn event_types<I, T>(self, types: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<EventType>,
    {
        self.filter(Filter::EventTypes(types.into_iter().map(Into::into).collect()))
    }

    pub fn context(self, context_id: impl Into<String>) -> Self {
        self.filter(Filter::Context(context_id.into()))
    }

    pub fn actor(self, actor: impl Into<String>) -> Self {
        self.filter(Filter::Actor(actor.into()))
    }

    pub fn sequence_range(self, range: RangeInclusive<u64>) -> Self {
        self.filter(Filter::Sequences(range))
    }

    /// Keep entries with `from <= timestamp < until`.
    pub fn time_range(self, from: DateTime<Utc>, until: DateTime<Utc>) -> Self {
        self.filter(Filter::Time {
            from: Some(from),
            until: Some(until),
        })
    }

    pub fn since(self, from: DateTime<Utc>) -> Self {
        self.filter(Filter::Time {
            from: Some(from),
            until: None,
        })
    }

    pub fn until(self, until: DateTime<Utc>) -> Self {
        self.filter(Filter::Time {
            from: None,
            until: Some(until),
        })
    }

    /// Keep entries whose canonical payload JSON contains `needle`.
    pub fn payload_contains(self, needle: impl Into<String>) -> Self {
        self.filter(Filter::PayloadContains(needle.into()))
    }

    /// Add an arbitrary filter.
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    // ── Terminal operations ──────────────────────────────────────────────────

    /// Matching entries in ascending sequence order.
    pub fn collect(&self) -> LedgerResult<Vec<Entry>> {
        let mut entries = self.source.snapshot()?;
        let scanned = entries.len();
        entries.retain(|entry| matches_all(&self.filters, entry));
        entries.sort_by_key(|entry| entry.sequence);
        debug!(
            filters = self.filters.len(),
            scanned,
            matched = entries.len(),
            "query collected"
        );
        Ok(entries)
    }

    pub fn count(&self) -> LedgerResult<usize> {
        Ok(self.collect()?.len())
    }

    /// The matching entry with the lowest sequence.
    pub fn first(&self) -> LedgerResult<Option<Entry>> {
        Ok(self.collect()?.into_iter().next())
    }

    /// The matching entry with the highest sequence.
    pub fn last(&self) -> LedgerResult<Option<Entry>> {
        Ok(self.collect()?.pop())
    }
}

/// Adds `.query()` to every `EntrySource`, including `Ledger` and
/// `Vec<Entry>`.
pub trait QueryExt: EntrySource {
    fn query(&self) -> Query<'_, Self> {
        Query::new(self)
    }
}

impl<S: EntrySource + ?Sized> QueryExt for S {}
