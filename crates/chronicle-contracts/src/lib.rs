//! # chronicle-contracts
//!
//! Shared types for the Chronicle ledger.
//!
//! All crates in the workspace import from here.  No ledger logic lives in
//! this crate: only the entry and anchor records, the typed payload schema,
//! verification reports, and the error taxonomy.

pub mod anchor;
pub mod entry;
pub mod error;
pub mod event;
pub mod payload;
pub mod timestamp;
pub mod verify;
