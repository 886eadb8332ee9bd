//! JSON Lines encoding of entries and anchors.
//!
//! One compact JSON object per line, `\n` terminated.  This is both the
//! on-disk format of the file stores and the export format, so an export can
//! be re-imported and verified byte-for-byte.

use std::io::{BufRead, Write};

use serde::{de::DeserializeOwned, Serialize};

use chronicle_contracts::{
    entry::{Entry, StoredRecord},
    error::{ErrorContext, LedgerError, LedgerResult},
};

/// Encode one record as a single line, including the trailing newline.
pub fn encode_line<T: Serialize>(record: &T, ctx: ErrorContext) -> LedgerResult<Vec<u8>> {
    let mut line = serde_json::to_vec(record).map_err(|e| LedgerError::Serialization {
        ctx,
        reason: format!("failed to encode record: {}", e),
    })?;
    line.push(b'\n');
    Ok(line)
}

/// Decode one entry line, reporting failures as `Unreadable` at `position`.
///
/// Works on raw bytes so a line that is not valid UTF-8 is reported like any
/// other undecodable line.
pub fn decode_entry_line(line: &[u8], position: u64) -> StoredRecord {
    match serde_json::from_slice::<Entry>(line) {
        Ok(entry) => StoredRecord::Intact(entry),
        Err(e) => StoredRecord::Unreadable {
            position,
            reason: e.to_string(),
        },
    }
}

fn is_blank(line: &[u8]) -> bool {
    line.iter().all(u8::is_ascii_whitespace)
}

/// Write entries as JSON Lines.
pub fn write_entries<W: Write>(entries: &[Entry], writer: &mut W) -> LedgerResult<()> {
    for entry in entries {
        let ctx = ErrorContext::new("export")
            .at(entry.sequence)
            .in_context(entry.context_id.clone());
        let line = encode_line(entry, ctx.clone())?;
        writer
            .write_all(&line)
            .map_err(|source| LedgerError::Io { ctx, source })?;
    }
    writer.flush().map_err(|source| LedgerError::Io {
        ctx: ErrorContext::new("export"),
        source,
    })
}

/// Read entry records from JSON Lines.
///
/// Blank lines are ignored.  Lines that do not decode, including lines that
/// are not valid UTF-8, are kept as `StoredRecord::Unreadable` so
/// verification can point at them.  Only an I/O failure of the reader itself
/// is an error.
pub fn read_entries<R: BufRead>(
    reader: R,
    operation: &'static str,
) -> LedgerResult<Vec<StoredRecord>> {
    read_entries_from(reader, 0, operation)
}

/// Like `read_entries`, but skips the first `from` records without decoding
/// them.  Positions in the result stay absolute.
pub fn read_entries_from<R: BufRead>(
    reader: R,
    from: u64,
    operation: &'static str,
) -> LedgerResult<Vec<StoredRecord>> {
    let mut records = Vec::new();
    let mut position = 0u64;
    for line in reader.split(b'\n') {
        let line = line.map_err(|source| LedgerError::Io {
            ctx: ErrorContext::new(operation).at(position),
            source,
        })?;
        if is_blank(&line) {
            continue;
        }
        if position >= from {
            records.push(decode_entry_line(&line, position));
        }
        position += 1;
    }
    Ok(records)
}

/// Read any JSON Lines document where every line must decode.
pub fn read_strict<T: DeserializeOwned, R: BufRead>(
    reader: R,
    operation: &'static str,
) -> LedgerResult<Vec<T>> {
    let mut out = Vec::new();
    for (idx, line) in reader.split(b'\n').enumerate() {
        let line = line.map_err(|source| LedgerError::Io {
            ctx: ErrorContext::new(operation).at(idx as u64),
            source,
        })?;
        if is_blank(&line) {
            continue;
        }
        let record = serde_json::from_slice(&line).map_err(|e| LedgerError::Serialization {
            ctx: ErrorContext::new(operation).at(idx as u64),
            reason: format!("line {} does not decode: {}", idx + 1, e),
        })?;
        out.push(record);
    }
    Ok(out)
}
