//! # chronicle-query
//!
//! Chainable, read-only queries over committed ledger entries.
//!
//! Works over any `EntrySource`: a live `Ledger`, an imported `Vec<Entry>`,
//! or a slice.  Import `QueryExt` to get `.query()` on all of them.

pub mod filter;
pub mod query;

pub use filter::Filter;
pub use query::{Query, QueryExt};

// ── Tests ─────────────────────────────────────────────────────────────────────
