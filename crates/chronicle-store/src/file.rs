//! JSON Lines file stores.
//!
//! Each store owns one append-only file.  Every append writes a single
//! `\n`-terminated line and then calls `sync_all`; the call returns only once
//! the line is durable.  If the write or the sync fails, the file is
//! truncated back to its previous length so a failed append leaves nothing
//! behind.  If that rollback fails too, the store refuses every later append
//! until it is reopened: the file may end in a partial line.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use tracing::{debug, error, warn};

use chronicle_contracts::{
    anchor::Anchor,
    entry::{Entry, StoredRecord},
    error::{ErrorContext, LedgerError, LedgerResult},
};
use chronicle_core::{
    jsonl,
    traits::{AnchorStore, EntryStore},
};

/// File name of the entry log inside a ledger directory.
pub const ENTRIES_FILE: &str = "entries.jsonl";
/// File name of the anchor log inside a ledger directory.
pub const ANCHORS_FILE: &str = "anchors.jsonl";

// ── Shared append-only file ───────────────────────────────────────────────────

struct AppendFile {
    path: PathBuf,
    file: Mutex<File>,
    /// Set when a failed append could not be rolled back.
    failed: AtomicBool,
}

impl AppendFile {
    fn open(path: PathBuf) -> LedgerResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| LedgerError::Io {
                ctx: ErrorContext::new("open_store"),
                source,
            })?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| LedgerError::Io {
                ctx: ErrorContext::new("open_store"),
                source,
            })?;
        debug!(path = %path.display(), "store file opened");
        Ok(Self::from_file(path, file))
    }

    fn from_file(path: PathBuf, file: File) -> Self {
        Self {
            path,
            file: Mutex::new(file),
            failed: AtomicBool::new(false),
        }
    }

    /// Append one encoded line and fsync it, rolling back on failure.
    fn append_line(&self, line: &[u8], ctx: ErrorContext) -> LedgerResult<()> {
        let mut file = self.file.lock().map_err(|_| LedgerError::LockPoisoned {
            ctx: ctx.clone(),
        })?;
        if self.failed.load(Ordering::Acquire) {
            return Err(LedgerError::Io {
                ctx,
                source: io::Error::other(
                    "store is in a failed state after an unrecoverable append; reopen it",
                ),
            });
        }

        let prior_len = file
            .metadata()
            .map_err(|source| LedgerError::Io {
                ctx: ctx.clone(),
                source,
            })?
            .len();

        let written = file.write_all(line).and_then(|()| file.sync_all());
        if let Err(source) = written {
            warn!(
                path = %self.path.display(),
                prior_len,
                error = %source,
                "append failed; truncating partial write"
            );
            if let Err(e) = file.set_len(prior_len).and_then(|()| file.sync_all()) {
                self.failed.store(true, Ordering::Release);
                error!(
                    path = %self.path.display(),
                    error = %e,
                    "rollback after failed append also failed; refusing further appends"
                );
            }
            return Err(LedgerError::Io { ctx, source });
        }
        Ok(())
    }

    /// Open the file for a fresh read.  A missing file reads as empty.
    fn reader(&self, operation: &'static str) -> LedgerResult<Option<BufReader<File>>> {
        match File::open(&self.path) {
            Ok(file) => Ok(Some(BufReader::new(file))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(LedgerError::Io {
                ctx: ErrorContext::new(operation),
                source,
            }),
        }
    }
}

// ── Entry store ───────────────────────────────────────────────────────────────

/// Entry log persisted as one JSON object per line.
pub struct FileEntryStore {
    inner: AppendFile,
}

impl FileEntryStore {
    /// Open (or create) the entry log at `path`.
    pub fn open(path: impl Into<PathBuf>) -> LedgerResult<Self> {
        Ok(Self {
            inner: AppendFile::open(path.into())?,
        })
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }
}

impl EntryStore for FileEntryStore {
    fn append(&self, entry: &Entry) -> LedgerResult<()> {
        let ctx = ErrorContext::new("append")
            .at(entry.sequence)
            .in_context(entry.context_id.clone());
        let line = jsonl::encode_line(entry, ctx.clone())?;
        self.inner.append_line(&line, ctx)
    }

    fn read_all(&self) -> LedgerResult<Vec<StoredRecord>> {
        self.read_from(0)
    }

    /// Lines before `from` are scanned for their newline but never decoded.
    fn read_from(&self, from: u64) -> LedgerResult<Vec<StoredRecord>> {
        match self.inner.reader("read_entries")? {
            Some(reader) => jsonl::read_entries_from(reader, from, "read_entries"),
            None => Ok(Vec::new()),
        }
    }

    fn describe(&self) -> String {
        self.inner.path.display().to_string()
    }
}

// ── Anchor store ──────────────────────────────────────────────────────────────

/// Anchor log persisted as one JSON object per line.
///
/// Unlike the entry log, every anchor line must decode: an anchor file that
/// cannot be read is an error, not a report.
pub struct FileAnchorStore {
    inner: AppendFile,
}

impl FileAnchorStore {
    pub fn open(path: impl Into<PathBuf>) -> LedgerResult<Self> {
        Ok(Self {
            inner: AppendFile::open(path.into())?,
        })
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }
}

impl AnchorStore for FileAnchorStore {
    fn append(&self, anchor: &Anchor) -> LedgerResult<()> {
        let ctx = ErrorContext::new("anchor").at(anchor.up_to_sequence);
        let line = jsonl::encode_line(anchor, ctx.clone())?;
        self.inner.append_line(&line, ctx)
    }

    fn read_all(&self) -> LedgerResult<Vec<Anchor>> {
        match self.inner.reader("read_anchors")? {
            Some(reader) => jsonl::read_strict(reader, "read_anchors"),
            None => Ok(Vec::new()),
        }
    }
}

/// Open both stores of a ledger directory (`entries.jsonl`, `anchors.jsonl`),
/// creating the directory if needed.
pub fn open_dir(dir: impl AsRef<Path>) -> LedgerResult<(FileEntryStore, FileAnchorStore)> {
    let dir = dir.as_ref();
    Ok((
        FileEntryStore::open(dir.join(ENTRIES_FILE))?,
        FileAnchorStore::open(dir.join(ANCHORS_FILE))?,
    ))
}
