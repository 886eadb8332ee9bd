//! Human-readable renderings: per-entry lines, session summaries, and
//! incident transcripts.
//!
//! Rendering never fails on an odd payload: anything that does not decode
//! into its typed variant falls back to the raw canonical JSON.

use std::fmt::{self, Write as _};
use std::ops::RangeInclusive;

use serde::Serialize;

use chronicle_contracts::{
    entry::Entry,
    error::LedgerResult,
    payload::{EventPayload, SidebarPayload},
    timestamp,
};
use chronicle_core::traits::EntrySource;
use chronicle_query::QueryExt;

use crate::stats::LedgerStats;

/// Number of hash characters shown in rendered headers.
const HASH_SHORT: usize = 12;

/// Render one entry as a header line followed by indented body lines.
///
/// ```text
/// #2 2026-10-16T09:30:00.123456Z [CORRECTION] human @ SB-1  a1b2c3d4e5f6
///     was:       hello
///     should be: hi there
/// ```
pub fn render_entry(entry: &Entry) -> String {
    let mut out = format!(
        "#{} {} [{}] {} @ {}  {}\n",
        entry.sequence,
        timestamp::format(&entry.timestamp),
        entry.event_type,
        entry.actor,
        entry.context_id,
        short_hash(&entry.entry_hash),
    );
    for line in body_lines(entry) {
        out.push_str("    ");
        out.push_str(&line);
        out.push('\n');
    }
    out
}

fn short_hash(hash: &str) -> &str {
    hash.get(..HASH_SHORT).unwrap_or(hash)
}

fn body_lines(entry: &Entry) -> Vec<String> {
    let payload = match entry.decode_payload() {
        Ok(payload) => payload,
        Err(_) => return vec![raw_json(entry)],
    };
    match payload {
        EventPayload::Exchange(p) => {
            let mut lines = vec![
                format!("user:      {}", p.user),
                format!("assistant: {}", p.assistant),
            ];
            if let Some(model) = p.model {
                lines.push(format!("model:     {}", model));
            }
            lines
        }
        EventPayload::Correction(p) => {
            let mut lines = vec![
                format!("was:       {}", p.was),
                format!("should be: {}", p.should_be),
            ];
            if let Some(category) = p.category {
                lines.push(format!("category:  {}", category));
            }
            if let Some(seq) = p.corrects_sequence {
                lines.push(format!("corrects:  #{}", seq));
            }
            lines
        }
        EventPayload::Uncertainty(p) => {
            let mut lines = vec![
                format!("topic:     {}", p.topic),
                format!("detail:    {}", p.detail),
            ];
            if let Some(confidence) = p.confidence {
                lines.push(format!("confidence: {:.2}", confidence));
            }
            lines
        }
        EventPayload::SidebarSpawn(p) => sidebar_lines("spawned", p),
        EventPayload::SidebarMerge(p) => sidebar_lines("merged", p),
        EventPayload::SidebarArchive(p) => sidebar_lines("archived", p),
        EventPayload::Error(p) => vec![format!(
            "{} error in {}: {}",
            if p.recoverable { "recoverable" } else { "fatal" },
            p.component,
            p.message
        )],
        EventPayload::Backup(p) => vec![format!(
            "backed up {} items of {} to {}",
            p.item_count, p.target, p.location
        )],
        EventPayload::Raw { .. } => vec![raw_json(entry)],
    }
}

fn sidebar_lines(step: &str, p: SidebarPayload) -> Vec<String> {
    let mut head = format!("sidebar {} {}", p.sidebar_id, step);
    if let Some(parent) = &p.parent_id {
        let _ = write!(head, " (parent {})", parent);
    }
    let mut lines = vec![head];
    if let Some(reason) = p.reason {
        lines.push(format!("reason:  {}", reason));
    }
    if let Some(summary) = p.summary {
        lines.push(format!("summary: {}", summary));
    }
    lines
}

fn raw_json(entry: &Entry) -> String {
    serde_json::to_string(&entry.payload).unwrap_or_else(|_| "<unrenderable payload>".to_string())
}

/// Render entries in order, one block each.
pub fn render_transcript(entries: &[Entry]) -> String {
    entries.iter().map(render_entry).collect()
}

// ── Session summary ───────────────────────────────────────────────────────────

/// Everything recorded for one context id.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub context_id: String,
    pub stats: LedgerStats,
    pub entries: Vec<Entry>,
}

impl fmt::Display for SessionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Session {}", self.context_id)?;
        writeln!(f, "{}", "=".repeat(8 + self.context_id.len()))?;
        match (self.stats.first_timestamp, self.stats.last_timestamp) {
            (Some(first), Some(last)) => writeln!(
                f,
                "{} entries, {} .. {}",
                self.stats.total,
                timestamp::format(&first),
                timestamp::format(&last)
            )?,
            _ => writeln!(f, "no entries")?,
        }
        for (event_type, count) in &self.stats.by_event_type {
            writeln!(f, "  {:<16} {}", event_type, count)?;
        }
        writeln!(f)?;
        f.write_str(&render_transcript(&self.entries))
    }
}

/// Collect and summarize every committed entry for `context_id`.
pub fn session_summary<S>(source: &S, context_id: &str) -> LedgerResult<SessionSummary>
where
    S: EntrySource + ?Sized,
{
    let entries = source.query().context(context_id).collect()?;
    Ok(SessionSummary {
        context_id: context_id.to_string(),
        stats: LedgerStats::from_entries(&entries),
        entries,
    })
}

// ── Incident export ───────────────────────────────────────────────────────────

/// Render a contiguous sequence range as a readable transcript.
///
/// The header states the requested range and how many entries were found,
/// so a short read (range past the tail) is visible in the output.
pub fn incident_export<S>(source: &S, range: RangeInclusive<u64>) -> LedgerResult<String>
where
    S: EntrySource + ?Sized,
{
    let entries = source.query().sequence_range(range.clone()).collect()?;
    let mut out = format!(
        "Incident export: sequences {}..={} ({} entries)\n\n",
        range.start(),
        range.end(),
        entries.len()
    );
    out.push_str(&render_transcript(&entries));
    Ok(out)
}
