//! # chronicle-store
//!
//! Persistence for the Chronicle ledger.
//!
//! - `FileEntryStore` / `FileAnchorStore`: JSON Lines files, fsync per append
//! - `MemoryEntryStore` / `MemoryAnchorStore`: volatile, for tests and imports
//! - `import_jsonl` / `import_file`: read an export back and verify it
//!
//! A ledger directory holds `entries.jsonl` and `anchors.jsonl`; `open_dir`
//! opens both.

pub mod file;
pub mod import;
pub mod memory;

pub use file::{open_dir, FileAnchorStore, FileEntryStore, ANCHORS_FILE, ENTRIES_FILE};
pub use import::{import_file, import_jsonl, ImportedLog};
pub use memory::{MemoryAnchorStore, MemoryEntryStore};

// ── Tests ─────────────────────────────────────────────────────────────────────
