//! The Chronicle ledger: serialized append, verification, and anchoring.
//!
//! The ledger enforces one write model:
//!
//!   canonicalize payload → [lock] read tail → hash → persist → advance tail [unlock] → anchor policy
//!
//! Payloads that cannot be canonicalized are rejected before the lock is
//! taken, so a rejected append never writes anything.  Readers never take the
//! writer lock: they read the committed count (published after persistence)
//! and consume exactly that many records from the store.

use std::io::Write;
use std::ops::RangeInclusive;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use chronicle_contracts::{
    anchor::{Anchor, TriggerReason},
    entry::{Entry, StoredRecord, GENESIS_HASH},
    error::{ErrorContext, LedgerError, LedgerResult},
    event::EventType,
    payload::{json_kind, EventPayload},
    timestamp,
    verify::{AnchorVerification, ChainVerification, SignatureReport},
};

use crate::{
    anchor::{with_retry, AnchorMode, AnchorWorker, RetryConfig},
    cancel::ScanOptions,
    chain::{anchor_digest, canonical_payload, hash_entry, verify_records, ChainCursor},
    jsonl,
    traits::{
        AnchorPolicy, AnchorState, AnchorStore, EntrySigner, EntrySource, EntryStore,
        ManualAnchorsOnly,
    },
};

// ── Internal mutable state ────────────────────────────────────────────────────

/// Writer-side view of the chain tail.  Guarded by the append lock.
struct ChainTail {
    /// The sequence the next append will receive.
    next_sequence: u64,
    /// `entry_hash` of the last committed entry, or `GENESIS_HASH`.
    last_hash: String,
    /// Highest sequence an anchor has been triggered for.
    triggered_up_to: Option<u64>,
    /// Start of the current anchor window, for the time trigger.
    window_started_at: DateTime<Utc>,
}

/// Last committed anchor.  Guarded separately so anchoring never holds the
/// append lock.
struct AnchorTail {
    up_to: Option<u64>,
    digest: String,
}

fn lock<'a, T>(mutex: &'a Mutex<T>, operation: &'static str) -> LedgerResult<MutexGuard<'a, T>> {
    mutex.lock().map_err(|_| LedgerError::LockPoisoned {
        ctx: ErrorContext::new(operation),
    })
}

pub(crate) struct LedgerInner {
    name: String,
    entries: Box<dyn EntryStore>,
    anchors: Box<dyn AnchorStore>,
    policy: Box<dyn AnchorPolicy>,
    signer: Option<Box<dyn EntrySigner>>,
    retry: RetryConfig,
    tail: Mutex<ChainTail>,
    /// Number of committed records.  Published after each successful persist.
    committed: AtomicU64,
    anchor_tail: Mutex<AnchorTail>,
    /// Number of leading entries covered by committed anchors.  Readable
    /// without the anchor lock.
    anchored_len: AtomicU64,
}

impl LedgerInner {
    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    /// Compute and commit an anchor covering everything up to `up_to` that
    /// is not yet anchored.  Returns `None` when the span is already covered.
    pub(crate) fn compute_anchor(
        &self,
        up_to: u64,
        reason: TriggerReason,
    ) -> LedgerResult<Option<Anchor>> {
        let mut at = lock(&self.anchor_tail, "anchor")?;
        let from = at.up_to.map_or(0, |u| u + 1);
        if up_to < from {
            return Ok(None);
        }

        let span_len = up_to - from + 1;
        debug!(ledger = %self.name, from, up_to, reason = %reason, "computing anchor");

        let records = self.entries.read_from(from)?;
        if (records.len() as u64) < span_len {
            return Err(LedgerError::AnchorCompute {
                ctx: ErrorContext::new("anchor").at(up_to),
                reason: format!(
                    "span {}..={} not fully persisted ({} records available)",
                    from,
                    up_to,
                    records.len()
                ),
            });
        }

        let mut hashes: Vec<&str> = Vec::with_capacity(span_len as usize);
        let mut prev: Option<&str> = None;
        for (offset, record) in records.iter().take(span_len as usize).enumerate() {
            let sequence = from + offset as u64;
            let entry = record.entry().ok_or_else(|| LedgerError::AnchorCompute {
                ctx: ErrorContext::new("anchor").at(sequence),
                reason: "record in span is unreadable".to_string(),
            })?;
            if entry.sequence != sequence {
                return Err(LedgerError::AnchorCompute {
                    ctx: ErrorContext::new("anchor")
                        .at(sequence)
                        .in_context(entry.context_id.clone()),
                    reason: format!("expected sequence {}, found {}", sequence, entry.sequence),
                });
            }
            if prev.is_some_and(|p| p != entry.prev_hash) {
                return Err(LedgerError::AnchorCompute {
                    ctx: ErrorContext::new("anchor")
                        .at(sequence)
                        .in_context(entry.context_id.clone()),
                    reason: "span is not hash-linked".to_string(),
                });
            }
            prev = Some(&entry.entry_hash);
            hashes.push(&entry.entry_hash);
        }

        let anchor = Anchor {
            anchor_id: uuid::Uuid::new_v4().to_string(),
            created_at: timestamp::now(),
            up_to_sequence: up_to,
            chain_digest: anchor_digest(&at.digest, hashes),
            trigger_reason: reason,
            span_count: span_len,
        };
        self.anchors.append(&anchor)?;

        at.up_to = Some(up_to);
        at.digest = anchor.chain_digest.clone();
        self.anchored_len.store(up_to + 1, Ordering::Release);

        info!(
            ledger = %self.name,
            anchor_id = %anchor.anchor_id,
            up_to_sequence = up_to,
            span_count = span_len,
            trigger = %reason,
            "anchor committed"
        );
        Ok(Some(anchor))
    }

    /// `compute_anchor` with retry and backoff.  Failures are logged, never
    /// returned: the triggering entry is already committed.
    pub(crate) fn anchor_with_retry(&self, up_to: u64, reason: TriggerReason) -> Option<Anchor> {
        with_retry(&self.retry, "anchor", || self.compute_anchor(up_to, reason)).unwrap_or(None)
    }

    fn committed(&self) -> u64 {
        self.committed.load(Ordering::Acquire)
    }

    /// Committed records, in store order, bounded by the committed count.
    fn committed_records(&self) -> LedgerResult<(u64, Vec<StoredRecord>)> {
        let committed = self.committed();
        let mut records = self.entries.read_all()?;
        records.truncate(committed as usize);
        Ok((committed, records))
    }

    /// Records at positions `from..committed`.  Earlier records are not read
    /// through the store's decoder at all.
    fn records_between(&self, from: u64, committed: u64) -> LedgerResult<Vec<StoredRecord>> {
        if from >= committed {
            return Ok(Vec::new());
        }
        let mut records = self.entries.read_from(from)?;
        records.truncate((committed - from) as usize);
        Ok(records)
    }
}

// ── Builder ───────────────────────────────────────────────────────────────────

/// Assembles a `Ledger` from its collaborators.
///
/// ```rust,ignore
/// let ledger = Ledger::builder(entry_store, anchor_store)
///     .name("SB-1")
///     .policy(Box::new(HybridAnchorPolicy::new(config.anchor)))
///     .open()?;
/// ```
pub struct LedgerBuilder {
    name: Option<String>,
    entries: Box<dyn EntryStore>,
    anchors: Box<dyn AnchorStore>,
    policy: Box<dyn AnchorPolicy>,
    signer: Option<Box<dyn EntrySigner>>,
    mode: AnchorMode,
    retry: RetryConfig,
}

impl LedgerBuilder {
    /// Name used in log lines and worker thread names.  Defaults to the
    /// entry store's description.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn policy(mut self, policy: Box<dyn AnchorPolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn signer(mut self, signer: Box<dyn EntrySigner>) -> Self {
        self.signer = Some(signer);
        self
    }

    pub fn anchor_mode(mut self, mode: AnchorMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Rebuild tail state from persisted storage and start accepting appends.
    ///
    /// Returns `LedgerError::ChainIntegrity` if the last persisted record is
    /// unreadable: the ledger refuses to extend a chain whose tail it cannot
    /// see.
    pub fn open(self) -> LedgerResult<Ledger> {
        let name = self.name.unwrap_or_else(|| self.entries.describe());

        let records = self.entries.read_all()?;
        let (next_sequence, last_hash) = match records.last() {
            None => (0, GENESIS_HASH.to_string()),
            Some(StoredRecord::Intact(entry)) => (entry.sequence + 1, entry.entry_hash.clone()),
            Some(StoredRecord::Unreadable { position, reason }) => {
                return Err(LedgerError::ChainIntegrity {
                    ctx: ErrorContext::new("open").in_context(name),
                    first_bad_index: *position,
                    reason: format!("last persisted record is unreadable: {}", reason),
                });
            }
        };
        if next_sequence != records.len() as u64 {
            warn!(
                ledger = %name,
                records = records.len(),
                next_sequence,
                "record count does not match tail sequence; run verify_chain"
            );
        }

        let anchors = self.anchors.read_all()?;
        let last_anchor = anchors.last();
        let anchored_up_to = last_anchor.map(|a| a.up_to_sequence);
        let window_started_at = match last_anchor {
            Some(anchor) => anchor.created_at,
            None => records
                .first()
                .and_then(StoredRecord::entry)
                .map(|e| e.timestamp)
                .unwrap_or_else(timestamp::now),
        };

        let inner = Arc::new(LedgerInner {
            name: name.clone(),
            entries: self.entries,
            anchors: self.anchors,
            policy: self.policy,
            signer: self.signer,
            retry: self.retry,
            tail: Mutex::new(ChainTail {
                next_sequence,
                last_hash,
                triggered_up_to: anchored_up_to,
                window_started_at,
            }),
            committed: AtomicU64::new(records.len() as u64),
            anchor_tail: Mutex::new(AnchorTail {
                up_to: anchored_up_to,
                digest: last_anchor
                    .map(|a| a.chain_digest.clone())
                    .unwrap_or_else(|| GENESIS_HASH.to_string()),
            }),
            anchored_len: AtomicU64::new(anchored_up_to.map_or(0, |u| u + 1)),
        });

        let worker = match self.mode {
            AnchorMode::Background => {
                Some(AnchorWorker::spawn(Arc::clone(&inner)).map_err(|source| {
                    LedgerError::Io {
                        ctx: ErrorContext::new("open").in_context(name.clone()),
                        source,
                    }
                })?)
            }
            AnchorMode::Inline => None,
        };

        info!(
            ledger = %name,
            entries = records.len(),
            anchors = anchors.len(),
            next_sequence,
            "ledger opened"
        );

        Ok(Ledger { inner, worker })
    }
}

// ── Public ledger ─────────────────────────────────────────────────────────────

/// An append-only, SHA-256 hash-chained event log.
///
/// # Thread safety
///
/// `Ledger` is `Send + Sync`; share it behind an `Arc`.  Appends are
/// serialized by an internal lock.  Reads, verification, and queries run
/// concurrently with appends and see every entry committed before they
/// started, never a partial one.
pub struct Ledger {
    inner: Arc<LedgerInner>,
    worker: Option<AnchorWorker>,
}

impl Ledger {
    pub fn builder(entries: Box<dyn EntryStore>, anchors: Box<dyn AnchorStore>) -> LedgerBuilder {
        LedgerBuilder {
            name: None,
            entries,
            anchors,
            policy: Box::new(ManualAnchorsOnly),
            signer: None,
            mode: AnchorMode::default(),
            retry: RetryConfig::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Number of committed entries.
    pub fn len(&self) -> u64 {
        self.inner.committed.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `entry_hash` of the last committed entry, or `GENESIS_HASH`.
    pub fn head_hash(&self) -> LedgerResult<String> {
        Ok(lock(&self.inner.tail, "head_hash")?.last_hash.clone())
    }

    // ── Append ───────────────────────────────────────────────────────────────

    /// Append one event and return the committed entry.
    ///
    /// `payload` must serialize to a JSON object.  Anything else is rejected
    /// with `LedgerError::Serialization` before any write.
    ///
    /// # Errors
    ///
    /// - `Serialization` — payload is not a canonicalizable object
    /// - `Io` — the store could not persist the entry (nothing committed)
    /// - `LockPoisoned` — a previous writer panicked mid-append
    pub fn append<P>(
        &self,
        event_type: impl Into<EventType>,
        context_id: &str,
        actor: &str,
        payload: &P,
    ) -> LedgerResult<Entry>
    where
        P: Serialize + ?Sized,
    {
        self.append_inner(event_type.into(), context_id, actor, payload, None)
    }

    /// Append with an external urgency/anomaly score for the anchor policy.
    pub fn append_scored<P>(
        &self,
        event_type: impl Into<EventType>,
        context_id: &str,
        actor: &str,
        payload: &P,
        score: f64,
    ) -> LedgerResult<Entry>
    where
        P: Serialize + ?Sized,
    {
        self.append_inner(event_type.into(), context_id, actor, payload, Some(score))
    }

    /// Append a typed payload; the event type comes from its variant.
    pub fn append_payload(
        &self,
        context_id: &str,
        actor: &str,
        payload: &EventPayload,
    ) -> LedgerResult<Entry> {
        let body = payload.to_object().map_err(|e| LedgerError::Serialization {
            ctx: ErrorContext::new("append").in_context(context_id),
            reason: e.to_string(),
        })?;
        self.append_inner(payload.event_type(), context_id, actor, &body, None)
    }

    fn append_inner<P>(
        &self,
        event_type: EventType,
        context_id: &str,
        actor: &str,
        payload: &P,
        score: Option<f64>,
    ) -> LedgerResult<Entry>
    where
        P: Serialize + ?Sized,
    {
        // Fail fast: canonicalize before taking the lock or touching storage.
        let (payload, canonical) = canonicalize(payload, context_id)?;

        let (entry, trigger) = {
            let mut tail = lock(&self.inner.tail, "append")?;

            let sequence = tail.next_sequence;
            let now = timestamp::now();
            let entry_hash = hash_entry(
                sequence,
                &now,
                &event_type,
                context_id,
                actor,
                &canonical,
                &tail.last_hash,
            );
            let signature = self.inner.signer.as_ref().map(|s| s.sign(&entry_hash));

            let entry = Entry {
                sequence,
                timestamp: now,
                event_type,
                context_id: context_id.to_string(),
                actor: actor.to_string(),
                payload,
                prev_hash: tail.last_hash.clone(),
                entry_hash,
                signature,
            };

            // Persist first; the tail only advances once the record is durable.
            self.inner.entries.append(&entry)?;

            tail.next_sequence = sequence + 1;
            tail.last_hash = entry.entry_hash.clone();
            self.inner.committed.fetch_add(1, Ordering::Release);

            let state = AnchorState {
                sequence,
                entries_since_anchor: match tail.triggered_up_to {
                    Some(up_to) => sequence.saturating_sub(up_to),
                    None => sequence + 1,
                },
                window_started_at: tail.window_started_at,
                now,
                event_type: &entry.event_type,
                score,
            };
            let trigger = self.inner.policy.should_anchor(&state);
            if trigger.is_some() {
                tail.triggered_up_to = Some(sequence);
                tail.window_started_at = now;
            }

            (entry, trigger)
        };

        debug!(
            ledger = %self.inner.name,
            sequence = entry.sequence,
            context_id = %entry.context_id,
            event_type = %entry.event_type,
            "entry committed"
        );

        if let Some(reason) = trigger {
            self.dispatch_anchor(entry.sequence, reason);
        }

        Ok(entry)
    }

    // ── Anchoring ────────────────────────────────────────────────────────────

    fn dispatch_anchor(&self, up_to: u64, reason: TriggerReason) {
        let queued = self
            .worker
            .as_ref()
            .is_some_and(|worker| worker.submit(up_to, reason));
        if !queued {
            self.inner.anchor_with_retry(up_to, reason);
        }
    }

    /// Synchronously anchor every committed entry not yet covered.
    ///
    /// Returns `Ok(None)` when every committed entry was already anchored at
    /// the time of the call.  Otherwise returns the anchor that covers the
    /// last committed entry: a new manual one, or a queued background anchor
    /// that committed first.  Unlike triggered anchors, failures here are
    /// returned to the caller.
    pub fn anchor_now(&self) -> LedgerResult<Option<Anchor>> {
        let up_to = {
            let mut tail = lock(&self.inner.tail, "anchor_now")?;
            if tail.next_sequence == 0 {
                return Ok(None);
            }
            let up_to = tail.next_sequence - 1;
            if self.inner.anchored_len.load(Ordering::Acquire) > up_to {
                return Ok(None);
            }
            tail.triggered_up_to = Some(up_to);
            tail.window_started_at = timestamp::now();
            up_to
        };

        // Queued anchors land first so spans commit in trigger order.
        self.flush_anchors();
        match self.inner.compute_anchor(up_to, TriggerReason::Manual)? {
            Some(anchor) => Ok(Some(anchor)),
            None => Ok(self.anchors()?.into_iter().rev().find(|a| a.covers(up_to))),
        }
    }

    /// Block until every anchor job queued so far has finished.
    ///
    /// A no-op in `AnchorMode::Inline`.
    pub fn flush_anchors(&self) {
        if let Some(worker) = &self.worker {
            worker.flush();
        }
    }

    /// Every committed anchor, in commit order.
    pub fn anchors(&self) -> LedgerResult<Vec<Anchor>> {
        self.inner.anchors.read_all()
    }

    pub fn latest_anchor(&self) -> LedgerResult<Option<Anchor>> {
        Ok(self.anchors()?.pop())
    }

    // ── Reads ────────────────────────────────────────────────────────────────

    /// Committed entries `range` (inclusive), ascending.
    pub fn entries_in(&self, range: RangeInclusive<u64>) -> LedgerResult<Vec<Entry>> {
        let (_, records) = self.inner.committed_records()?;
        let start = (*range.start() as usize).min(records.len());
        let end = (*range.end() as usize).saturating_add(1).min(records.len());
        decode_records(records.into_iter().skip(start).take(end.saturating_sub(start)))
    }

    /// Write committed entries as JSON Lines.
    ///
    /// Honors `options.range`, cancellation, and deadline.  Returns the number
    /// of entries written.
    pub fn export_jsonl<W: Write>(&self, options: &ScanOptions, writer: &mut W) -> LedgerResult<u64> {
        let entries = match &options.range {
            Some(range) => self.entries_in(range.clone())?,
            None => self.snapshot()?,
        };
        let mut written = 0u64;
        for entry in &entries {
            options.checkpoint("export", entry.sequence)?;
            jsonl::write_entries(std::slice::from_ref(entry), writer)?;
            written += 1;
        }
        info!(ledger = %self.inner.name, written, "entries exported");
        Ok(written)
    }

    // ── Verification ─────────────────────────────────────────────────────────

    /// Verify the whole chain from genesis.
    pub fn verify_chain(&self) -> LedgerResult<ChainVerification> {
        self.verify_with(&ScanOptions::full())
    }

    /// Verify a range of the chain, with optional cancellation and deadline.
    ///
    /// A range check trusts the stored `entry_hash` of the entry just before
    /// the range.  Returns `Err` only for I/O failures and cancellation; a
    /// broken chain is an `Ok` report with `valid == false`.
    pub fn verify_with(&self, options: &ScanOptions) -> LedgerResult<ChainVerification> {
        let committed = self.inner.committed();
        if committed == 0 {
            return Ok(ChainVerification::passed(0));
        }

        let (start, end) = match &options.range {
            Some(range) => (*range.start(), (*range.end()).min(committed - 1)),
            None => (0, committed - 1),
        };
        if start > end {
            return Ok(ChainVerification::passed(0));
        }

        // Read from the trusted predecessor onward; nothing earlier is decoded.
        let base = start.saturating_sub(1);
        let records = self.inner.records_between(base, committed)?;
        let available = base + records.len() as u64;

        let cursor = if start == 0 {
            ChainCursor::genesis()
        } else {
            match records.first() {
                Some(StoredRecord::Intact(prev)) => ChainCursor {
                    next_sequence: start,
                    prev_hash: prev.entry_hash.clone(),
                },
                Some(StoredRecord::Unreadable { reason, .. }) => {
                    return Ok(ChainVerification::failed(
                        start - 1,
                        0,
                        format!("record unreadable: {}", reason),
                    ));
                }
                None => {
                    return Ok(ChainVerification::failed(
                        available,
                        0,
                        "store holds fewer records than were committed",
                    ));
                }
            }
        };

        let lo = ((start - base) as usize).min(records.len());
        let hi = ((end - base + 1) as usize).min(records.len());
        let mut report = verify_records(&records[lo..hi], cursor, options)?;

        if report.valid && available <= end {
            report = ChainVerification::failed(
                available,
                report.checked,
                "store holds fewer records than were committed",
            );
        }

        if report.valid {
            debug!(ledger = %self.inner.name, checked = report.checked, "chain verified");
        } else {
            warn!(
                ledger = %self.inner.name,
                first_bad_index = ?report.first_bad_index,
                reason = ?report.reason,
                "chain verification failed"
            );
        }
        Ok(report)
    }

    /// Verify only the entries after a committed anchor.
    ///
    /// The anchor's digest is first confirmed against the stored entry hashes
    /// of its span (no payload rehash), then every later entry is fully
    /// verified with the anchor's last entry as the trusted predecessor.
    pub fn verify_from(&self, anchor: &Anchor) -> LedgerResult<ChainVerification> {
        let anchors = self.anchors()?;
        let idx = anchors
            .iter()
            .position(|a| a == anchor)
            .ok_or_else(|| LedgerError::ChainIntegrity {
                ctx: ErrorContext::new("verify_from").at(anchor.up_to_sequence),
                first_bad_index: anchor.from_sequence(),
                reason: format!("anchor {} is not committed to this ledger", anchor.anchor_id),
            })?;
        let prev_digest = if idx == 0 {
            GENESIS_HASH
        } else {
            anchors[idx - 1].chain_digest.as_str()
        };

        let from = anchor.from_sequence();
        let up_to = anchor.up_to_sequence;
        let records = self.inner.records_between(from, self.inner.committed())?;
        let available = from + records.len() as u64;
        if available <= up_to {
            return Ok(ChainVerification::failed(
                available,
                0,
                "anchor covers entries missing from the store",
            ));
        }

        let last = (up_to - from) as usize;
        let span = &records[..=last];
        if let Some(failure) = check_anchor_span(span, from, prev_digest, &anchor.chain_digest) {
            return Ok(failure);
        }

        let Some(trusted) = records[last].entry() else {
            return Ok(ChainVerification::failed(up_to, 0, "anchored record is unreadable"));
        };
        let cursor = ChainCursor {
            next_sequence: up_to + 1,
            prev_hash: trusted.entry_hash.clone(),
        };
        verify_records(&records[last + 1..], cursor, &ScanOptions::full())
    }

    /// Re-derive every anchor's rolling digest from the stored entry hashes
    /// and check that spans are contiguous from genesis.
    pub fn verify_anchors(&self) -> LedgerResult<AnchorVerification> {
        let anchors = self.anchors()?;
        let (_, records) = self.inner.committed_records()?;

        let mut prev_digest = GENESIS_HASH.to_string();
        let mut expected_from = 0u64;
        for (i, anchor) in anchors.iter().enumerate() {
            let fail = |reason: String| AnchorVerification {
                valid: false,
                first_bad_anchor: Some(i),
                anchors_checked: i,
                reason: Some(reason),
            };

            if anchor.span_count == 0 || anchor.from_sequence() != expected_from {
                return Ok(fail(format!(
                    "anchor {} span does not start at {}",
                    anchor.anchor_id, expected_from
                )));
            }
            if records.len() as u64 <= anchor.up_to_sequence {
                return Ok(fail(format!(
                    "anchor {} covers entries missing from the store",
                    anchor.anchor_id
                )));
            }
            let span = &records[expected_from as usize..=anchor.up_to_sequence as usize];
            if let Some(failure) =
                check_anchor_span(span, expected_from, &prev_digest, &anchor.chain_digest)
            {
                return Ok(fail(failure.reason.unwrap_or_default()));
            }

            prev_digest = anchor.chain_digest.clone();
            expected_from = anchor.up_to_sequence + 1;
        }

        Ok(AnchorVerification {
            valid: true,
            first_bad_anchor: None,
            anchors_checked: anchors.len(),
            reason: None,
        })
    }

    /// Check every entry's signature with the configured signer.
    ///
    /// Returns `LedgerError::Config` when no signer is configured.
    pub fn verify_signatures(&self) -> LedgerResult<SignatureReport> {
        let signer = self.inner.signer.as_ref().ok_or_else(|| LedgerError::Config {
            reason: "signature verification requested but no signer is configured".to_string(),
        })?;

        let mut report = SignatureReport {
            verified: 0,
            unsigned: Vec::new(),
            invalid: Vec::new(),
        };
        for entry in self.snapshot()? {
            match &entry.signature {
                None => report.unsigned.push(entry.sequence),
                Some(sig) if signer.verify(&entry.entry_hash, sig) => report.verified += 1,
                Some(_) => report.invalid.push(entry.sequence),
            }
        }
        if !report.all_valid() {
            warn!(
                ledger = %self.inner.name,
                key_id = %signer.key_id(),
                unsigned = report.unsigned.len(),
                invalid = report.invalid.len(),
                "signature check found problems"
            );
        }
        Ok(report)
    }
}

impl EntrySource for Ledger {
    /// Every committed entry, ascending.
    ///
    /// Returns `LedgerError::Serialization` if a committed record cannot be
    /// decoded; use `verify_chain` to locate damage.
    fn snapshot(&self) -> LedgerResult<Vec<Entry>> {
        let (_, records) = self.inner.committed_records()?;
        decode_records(records)
    }
}

impl Ledger {
    /// Inherent alias for `EntrySource::snapshot`.
    pub fn snapshot(&self) -> LedgerResult<Vec<Entry>> {
        EntrySource::snapshot(self)
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Serialize `payload` to an object and its canonical bytes.
fn canonicalize<P>(payload: &P, context_id: &str) -> LedgerResult<(Map<String, Value>, Vec<u8>)>
where
    P: Serialize + ?Sized,
{
    let ctx = || ErrorContext::new("append").in_context(context_id);
    let value = serde_json::to_value(payload).map_err(|e| LedgerError::Serialization {
        ctx: ctx(),
        reason: format!("payload is not serializable: {}", e),
    })?;
    let object = match value {
        Value::Object(map) => map,
        other => {
            return Err(LedgerError::Serialization {
                ctx: ctx(),
                reason: format!("payload must be a JSON object, got {}", json_kind(&other)),
            })
        }
    };
    let canonical = canonical_payload(&object).map_err(|e| LedgerError::Serialization {
        ctx: ctx(),
        reason: format!("payload is not canonicalizable: {}", e),
    })?;
    Ok((object, canonical))
}

fn decode_records<I>(records: I) -> LedgerResult<Vec<Entry>>
where
    I: IntoIterator<Item = StoredRecord>,
{
    records
        .into_iter()
        .map(|record| match record {
            StoredRecord::Intact(entry) => Ok(entry),
            StoredRecord::Unreadable { position, reason } => Err(LedgerError::Serialization {
                ctx: ErrorContext::new("read").at(position),
                reason: format!("committed record is unreadable: {}", reason),
            }),
        })
        .collect()
}

/// Check that `span` is readable, contiguous from `from`, and digests to
/// `expected` given `prev_digest`.  Returns a failed report, or `None`.
fn check_anchor_span(
    span: &[StoredRecord],
    from: u64,
    prev_digest: &str,
    expected: &str,
) -> Option<ChainVerification> {
    let mut hashes = Vec::with_capacity(span.len());
    for (offset, record) in span.iter().enumerate() {
        let sequence = from + offset as u64;
        match record {
            StoredRecord::Intact(entry) if entry.sequence == sequence => {
                hashes.push(entry.entry_hash.as_str());
            }
            StoredRecord::Intact(entry) => {
                return Some(ChainVerification::failed(
                    sequence,
                    0,
                    format!("sequence gap: expected {}, found {}", sequence, entry.sequence),
                ));
            }
            StoredRecord::Unreadable { reason, .. } => {
                return Some(ChainVerification::failed(
                    sequence,
                    0,
                    format!("record unreadable: {}", reason),
                ));
            }
        }
    }
    if anchor_digest(prev_digest, hashes) != expected {
        return Some(ChainVerification::failed(
            from,
            0,
            "anchor digest does not match stored entry hashes",
        ));
    }
    None
}
