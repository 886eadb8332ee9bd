//! # chronicle-report
//!
//! Read-only derivations over committed ledger entries.
//!
//! - `stats`: per-type / per-actor / per-context counts, activity buckets,
//!   anchor span listings
//! - `render`: entry transcripts, session summaries, incident exports
//! - `insights`: recurring correction and uncertainty patterns
//!
//! Nothing here writes to a ledger.  Every function takes entries (or an
//! `EntrySource` snapshot) and returns a fresh value.

pub mod insights;
pub mod render;
pub mod stats;

pub use insights::{find_learning_opportunities, InsightConfig, InsightKind, LearningInsight};
pub use render::{
    incident_export, render_entry, render_transcript, session_summary, SessionSummary,
};
pub use stats::{
    activity, anchor_covering, anchor_spans, ActivityBucket, AnchorSpan, LedgerStats,
};

// ── Tests ─────────────────────────────────────────────────────────────────────
