//! Importing JSON Lines exports.
//!
//! An export is the same line format as the entry log, so importing is a
//! read followed by a full chain verification from genesis.  The result
//! carries both, so callers can still inspect a log that fails to verify.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use tracing::{info, warn};

use chronicle_contracts::{
    entry::{Entry, StoredRecord},
    error::{ErrorContext, LedgerError, LedgerResult},
    verify::ChainVerification,
};
use chronicle_core::{
    chain::{verify_records, ChainCursor},
    jsonl, ScanOptions,
};

/// A decoded export together with its verification outcome.
#[derive(Debug, Clone)]
pub struct ImportedLog {
    pub records: Vec<StoredRecord>,
    pub verification: ChainVerification,
}

impl ImportedLog {
    /// The decodable entries, in file order.  Unreadable lines are dropped.
    pub fn entries(&self) -> Vec<Entry> {
        self.records
            .iter()
            .filter_map(StoredRecord::entry)
            .cloned()
            .collect()
    }

    pub fn is_valid(&self) -> bool {
        self.verification.valid
    }
}

/// Read and verify an export from any buffered reader.
pub fn import_jsonl<R: BufRead>(reader: R, options: &ScanOptions) -> LedgerResult<ImportedLog> {
    let records = jsonl::read_entries(reader, "import")?;
    let verification = verify_records(&records, ChainCursor::genesis(), options)?;

    if verification.valid {
        info!(entries = records.len(), "import verified");
    } else {
        warn!(
            entries = records.len(),
            first_bad_index = ?verification.first_bad_index,
            reason = ?verification.reason,
            "imported log failed verification"
        );
    }
    Ok(ImportedLog {
        records,
        verification,
    })
}

/// Read and verify an export file.
pub fn import_file(path: impl AsRef<Path>, options: &ScanOptions) -> LedgerResult<ImportedLog> {
    let file = File::open(path.as_ref()).map_err(|source| LedgerError::Io {
        ctx: ErrorContext::new("import"),
        source,
    })?;
    import_jsonl(BufReader::new(file), options)
}
