//! # chronicle-core
//!
//! The hash-chain engine of the Chronicle ledger.
//!
//! ## Overview
//!
//! Every appended event becomes an `Entry` that links to its predecessor via
//! a SHA-256 hash over a canonical preimage.  Tampering with any persisted
//! byte, deleting a record, or reordering records breaks the chain and is
//! reported by `Ledger::verify_chain` with the first diverging index.
//!
//! After each commit an `AnchorPolicy` may trigger an anchor: a rolling
//! digest over a span of entry hashes that lets `verify_from` check only
//! the entries after a trusted checkpoint.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use chronicle_core::Ledger;
//! use chronicle_contracts::payload::ExchangePayload;
//!
//! let ledger = Ledger::builder(entry_store, anchor_store).name("SB-1").open()?;
//! ledger.append_payload("SB-1", "assistant", &ExchangePayload::new("hi", "hello").into())?;
//!
//! assert!(ledger.verify_chain()?.valid);
//! ```

pub mod anchor;
pub mod cancel;
pub mod chain;
pub mod jsonl;
pub mod ledger;
pub mod signing;
pub mod traits;

pub use anchor::{AnchorMode, RetryConfig};
pub use cancel::{CancelToken, ScanOptions};
pub use chain::{anchor_digest, canonical_payload, hash_entry, recompute_hash, verify_entries};
pub use ledger::{Ledger, LedgerBuilder};
pub use signing::HmacSigner;
pub use traits::{
    AnchorPolicy, AnchorState, AnchorStore, EntrySigner, EntrySource, EntryStore,
    ManualAnchorsOnly,
};

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Condvar, Mutex};
    use std::thread;
    use std::time::Duration;

    use serde_json::json;

    use chronicle_contracts::{
        anchor::{Anchor, TriggerReason},
        entry::{StoredRecord, GENESIS_HASH},
        error::{ErrorContext, LedgerError, LedgerResult},
        event::EventType,
        payload::{CorrectionPayload, EventPayload, ExchangePayload},
    };

    use super::*;

    // ── Mock helpers ─────────────────────────────────────────────────────────

    /// A Vec-backed entry store whose contents tests can reach into.
    #[derive(Clone, Default)]
    struct VecEntries {
        records: Arc<Mutex<Vec<StoredRecord>>>,
        fail: Arc<AtomicBool>,
        /// Start position of every read, in call order.
        reads: Arc<Mutex<Vec<u64>>>,
    }

    impl EntryStore for VecEntries {
        fn append(&self, entry: &chronicle_contracts::entry::Entry) -> LedgerResult<()> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(LedgerError::Io {
                    ctx: ErrorContext::new("append").at(entry.sequence),
                    source: std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
                });
            }
            self.records
                .lock()
                .unwrap()
                .push(StoredRecord::Intact(entry.clone()));
            Ok(())
        }

        fn read_all(&self) -> LedgerResult<Vec<StoredRecord>> {
            self.read_from(0)
        }

        fn read_from(&self, from: u64) -> LedgerResult<Vec<StoredRecord>> {
            self.reads.lock().unwrap().push(from);
            let records = self.records.lock().unwrap();
            Ok(records.iter().skip(from as usize).cloned().collect())
        }

        fn describe(&self) -> String {
            "vec-entries".to_string()
        }
    }

    #[derive(Clone, Default)]
    struct VecAnchors {
        anchors: Arc<Mutex<Vec<Anchor>>>,
        fail: Arc<AtomicBool>,
    }

    impl AnchorStore for VecAnchors {
        fn append(&self, anchor: &Anchor) -> LedgerResult<()> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(LedgerError::Io {
                    ctx: ErrorContext::new("anchor"),
                    source: std::io::Error::new(std::io::ErrorKind::Other, "anchor disk full"),
                });
            }
            self.anchors.lock().unwrap().push(anchor.clone());
            Ok(())
        }

        fn read_all(&self) -> LedgerResult<Vec<Anchor>> {
            Ok(self.anchors.lock().unwrap().clone())
        }
    }

    /// An anchor store whose appends block until the test opens the gate.
    #[derive(Clone, Default)]
    struct GatedAnchors {
        inner: VecAnchors,
        entered: Arc<AtomicBool>,
        gate: Arc<(Mutex<bool>, Condvar)>,
    }

    impl GatedAnchors {
        fn open_gate(&self) {
            let (open, cvar) = &*self.gate;
            *open.lock().unwrap() = true;
            cvar.notify_all();
        }
    }

    impl AnchorStore for GatedAnchors {
        fn append(&self, anchor: &Anchor) -> LedgerResult<()> {
            self.entered.store(true, Ordering::SeqCst);
            let (open, cvar) = &*self.gate;
            let mut is_open = open.lock().unwrap();
            while !*is_open {
                is_open = cvar.wait(is_open).unwrap();
            }
            self.inner.append(anchor)
        }

        fn read_all(&self) -> LedgerResult<Vec<Anchor>> {
            self.inner.read_all()
        }
    }

    /// Anchors every `n` entries, and immediately on corrections.
    struct EveryN(u64);

    impl AnchorPolicy for EveryN {
        fn should_anchor(&self, state: &AnchorState<'_>) -> Option<TriggerReason> {
            if *state.event_type == EventType::Correction {
                Some(TriggerReason::Event)
            } else if state.entries_since_anchor >= self.0 {
                Some(TriggerReason::Count)
            } else {
                None
            }
        }
    }

    fn fast_retry() -> RetryConfig {
        RetryConfig {
            max_attempts: 2,
            initial_delay_ms: 0,
            max_delay_ms: 0,
            multiplier: 1.0,
        }
    }

    fn open(entries: &VecEntries, anchors: &VecAnchors) -> Ledger {
        Ledger::builder(Box::new(entries.clone()), Box::new(anchors.clone()))
            .name("test")
            .anchor_mode(AnchorMode::Inline)
            .retry(fast_retry())
            .open()
            .unwrap()
    }

    fn append_n(ledger: &Ledger, n: usize) {
        for i in 0..n {
            ledger
                .append(EventType::Exchange, "SB-1", "assistant", &json!({ "turn": i }))
                .unwrap();
        }
    }

    // ── Append & chain ───────────────────────────────────────────────────────

    /// Sequential appends produce a valid, contiguous chain.
    #[test]
    fn test_sequential_appends_verify() {
        for n in [0usize, 1, 2, 17] {
            let (entries, anchors) = (VecEntries::default(), VecAnchors::default());
            let ledger = open(&entries, &anchors);
            append_n(&ledger, n);

            let report = ledger.verify_chain().unwrap();
            assert_eq!(report.outcome(), (true, None), "n = {}", n);
            assert_eq!(report.checked, n as u64);

            let snapshot = ledger.snapshot().unwrap();
            for (idx, entry) in snapshot.iter().enumerate() {
                assert_eq!(entry.sequence, idx as u64);
            }
        }
    }

    /// The first entry links to the genesis sentinel; later ones to their
    /// predecessor.
    #[test]
    fn test_genesis_and_linkage() {
        let (entries, anchors) = (VecEntries::default(), VecAnchors::default());
        let ledger = open(&entries, &anchors);
        let first = ledger
            .append(EventType::Exchange, "SB-1", "assistant", &json!({ "a": 1 }))
            .unwrap();
        let second = ledger
            .append(EventType::Exchange, "SB-1", "assistant", &json!({ "a": 2 }))
            .unwrap();

        assert_eq!(first.prev_hash, GENESIS_HASH);
        assert_eq!(second.prev_hash, first.entry_hash);
        assert_eq!(ledger.head_hash().unwrap(), second.entry_hash);
        assert_eq!(first.entry_hash.len(), 64);
    }

    /// A non-object payload is rejected before anything is written.
    #[test]
    fn test_non_object_payload_rejected_before_write() {
        let (entries, anchors) = (VecEntries::default(), VecAnchors::default());
        let ledger = open(&entries, &anchors);

        let err = ledger
            .append(EventType::Exchange, "SB-1", "assistant", &json!(["not", "an", "object"]))
            .unwrap_err();
        assert!(matches!(err, LedgerError::Serialization { .. }));
        assert!(err.to_string().contains("array"));
        assert!(entries.records.lock().unwrap().is_empty());
        assert_eq!(ledger.len(), 0);
    }

    /// Maps with non-string keys cannot be canonicalized.
    #[test]
    fn test_non_string_keys_rejected() {
        let (entries, anchors) = (VecEntries::default(), VecAnchors::default());
        let ledger = open(&entries, &anchors);

        let mut payload = BTreeMap::new();
        payload.insert((1u8, 2u8), "pair");
        let err = ledger
            .append(EventType::Exchange, "SB-1", "assistant", &payload)
            .unwrap_err();
        assert!(matches!(err, LedgerError::Serialization { .. }));
        assert!(entries.records.lock().unwrap().is_empty());
    }

    /// A store failure surfaces to the caller and does not advance the tail.
    #[test]
    fn test_io_failure_propagates() {
        let (entries, anchors) = (VecEntries::default(), VecAnchors::default());
        let ledger = open(&entries, &anchors);
        append_n(&ledger, 2);

        entries.fail.store(true, Ordering::SeqCst);
        let err = ledger
            .append(EventType::Exchange, "SB-1", "assistant", &json!({ "x": 1 }))
            .unwrap_err();
        assert!(matches!(err, LedgerError::Io { .. }));
        assert_eq!(ledger.len(), 2);

        entries.fail.store(false, Ordering::SeqCst);
        let next = ledger
            .append(EventType::Exchange, "SB-1", "assistant", &json!({ "x": 1 }))
            .unwrap();
        assert_eq!(next.sequence, 2, "failed append must not consume a sequence");
        assert!(ledger.verify_chain().unwrap().valid);
    }

    /// Typed payloads are stored under the event type of their variant.
    #[test]
    fn test_append_typed_payload() {
        let (entries, anchors) = (VecEntries::default(), VecAnchors::default());
        let ledger = open(&entries, &anchors);
        let entry = ledger
            .append_payload(
                "SB-1",
                "human",
                &EventPayload::from(CorrectionPayload::new("hello", "hi there")),
            )
            .unwrap();
        assert_eq!(entry.event_type, EventType::Correction);
        assert_eq!(entry.payload["should_be"], "hi there");
    }

    // ── Tamper detection ─────────────────────────────────────────────────────

    /// Mutating a stored payload is reported at that entry's index only.
    #[test]
    fn test_tamper_detection_reports_index() {
        let (entries, anchors) = (VecEntries::default(), VecAnchors::default());
        let ledger = open(&entries, &anchors);
        append_n(&ledger, 6);

        {
            let mut records = entries.records.lock().unwrap();
            if let StoredRecord::Intact(entry) = &mut records[3] {
                entry.payload.insert("turn".to_string(), json!(99));
            }
        }

        let report = ledger.verify_chain().unwrap();
        assert_eq!(report.outcome(), (false, Some(3)));
        assert_eq!(report.checked, 3, "entries before the tampered one pass");
    }

    /// Removing a middle record is detected as a gap.
    #[test]
    fn test_deleted_record_detected() {
        let (entries, anchors) = (VecEntries::default(), VecAnchors::default());
        let ledger = open(&entries, &anchors);
        append_n(&ledger, 5);

        entries.records.lock().unwrap().remove(2);

        let report = ledger.verify_chain().unwrap();
        assert!(!report.valid);
        assert_eq!(report.first_bad_index, Some(2));
    }

    /// Canonical hashing ignores key order in the payload.
    #[test]
    fn test_hash_is_key_order_independent() {
        let a = json!({ "user": "hi", "assistant": "hello" });
        let b = json!({ "assistant": "hello", "user": "hi" });
        let ts = chronicle_contracts::timestamp::now();
        let ha = hash_entry(
            0,
            &ts,
            &EventType::Exchange,
            "SB-1",
            "assistant",
            &canonical_payload(a.as_object().unwrap()).unwrap(),
            GENESIS_HASH,
        );
        let hb = hash_entry(
            0,
            &ts,
            &EventType::Exchange,
            "SB-1",
            "assistant",
            &canonical_payload(b.as_object().unwrap()).unwrap(),
            GENESIS_HASH,
        );
        assert_eq!(ha, hb);
    }

    /// Range verification checks only the requested entries.
    #[test]
    fn test_range_verification() {
        let (entries, anchors) = (VecEntries::default(), VecAnchors::default());
        let ledger = open(&entries, &anchors);
        append_n(&ledger, 8);

        {
            let mut records = entries.records.lock().unwrap();
            if let StoredRecord::Intact(entry) = &mut records[1] {
                entry.actor = "mallory".to_string();
            }
        }

        let tail = ledger.verify_with(&ScanOptions::range(4..=7)).unwrap();
        assert_eq!(tail.outcome(), (true, None));
        assert_eq!(tail.checked, 4);

        let head = ledger.verify_with(&ScanOptions::range(0..=3)).unwrap();
        assert_eq!(head.outcome(), (false, Some(1)));
    }

    /// A cancelled verification returns `Cancelled` without side effects.
    #[test]
    fn test_verification_cancellation() {
        let (entries, anchors) = (VecEntries::default(), VecAnchors::default());
        let ledger = open(&entries, &anchors);
        append_n(&ledger, 3);

        let token = CancelToken::new();
        token.cancel();
        let err = ledger
            .verify_with(&ScanOptions::full().with_cancel(token))
            .unwrap_err();
        assert!(matches!(err, LedgerError::Cancelled { .. }));
        assert_eq!(ledger.len(), 3);
    }

    // ── Restart ──────────────────────────────────────────────────────────────

    /// Reopening rebuilds the tail from storage.
    #[test]
    fn test_restart_continuity() {
        let (entries, anchors) = (VecEntries::default(), VecAnchors::default());
        {
            let ledger = open(&entries, &anchors);
            append_n(&ledger, 5);
        }

        let ledger = open(&entries, &anchors);
        assert_eq!(ledger.len(), 5);
        let sixth = ledger
            .append(EventType::Exchange, "SB-1", "assistant", &json!({ "turn": 5 }))
            .unwrap();

        let snapshot = ledger.snapshot().unwrap();
        assert_eq!(sixth.sequence, 5);
        assert_eq!(sixth.prev_hash, snapshot[4].entry_hash);
        assert_eq!(ledger.verify_chain().unwrap().outcome(), (true, None));
    }

    /// An unreadable tail record refuses the open.
    #[test]
    fn test_open_refuses_unreadable_tail() {
        let (entries, anchors) = (VecEntries::default(), VecAnchors::default());
        {
            let ledger = open(&entries, &anchors);
            append_n(&ledger, 2);
        }
        entries.records.lock().unwrap().push(StoredRecord::Unreadable {
            position: 2,
            reason: "truncated".to_string(),
        });

        let result = Ledger::builder(Box::new(entries.clone()), Box::new(anchors.clone()))
            .anchor_mode(AnchorMode::Inline)
            .open();
        match result {
            Err(LedgerError::ChainIntegrity { first_bad_index, .. }) => {
                assert_eq!(first_bad_index, 2)
            }
            Err(other) => panic!("expected ChainIntegrity, got {:?}", other),
            Ok(_) => panic!("expected open to fail"),
        }
    }

    // ── Concurrency ──────────────────────────────────────────────────────────

    /// Appends from many threads still form one contiguous chain.
    #[test]
    fn test_concurrent_appends_are_serialized() {
        let (entries, anchors) = (VecEntries::default(), VecAnchors::default());
        let ledger = Arc::new(open(&entries, &anchors));

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let ledger = Arc::clone(&ledger);
                thread::spawn(move || {
                    for i in 0..25 {
                        ledger
                            .append(
                                EventType::Exchange,
                                &format!("SB-{}", t),
                                "assistant",
                                &json!({ "thread": t, "i": i }),
                            )
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(ledger.len(), 100);
        assert_eq!(ledger.verify_chain().unwrap().outcome(), (true, None));
    }

    // ── Anchors ──────────────────────────────────────────────────────────────

    /// Count threshold of 10: exactly ten appends give exactly one anchor.
    #[test]
    fn test_count_anchor_spans_first_ten() {
        let (entries, anchors) = (VecEntries::default(), VecAnchors::default());
        let ledger = Ledger::builder(Box::new(entries.clone()), Box::new(anchors.clone()))
            .policy(Box::new(EveryN(10)))
            .anchor_mode(AnchorMode::Inline)
            .open()
            .unwrap();
        append_n(&ledger, 10);

        let committed = ledger.anchors().unwrap();
        assert_eq!(committed.len(), 1);
        assert_eq!(committed[0].from_sequence(), 0);
        assert_eq!(committed[0].up_to_sequence, 9);
        assert_eq!(committed[0].span_count, 10);
        assert_eq!(committed[0].trigger_reason, TriggerReason::Count);
    }

    /// Background mode produces the same anchors once flushed.
    #[test]
    fn test_background_anchor_after_flush() {
        let (entries, anchors) = (VecEntries::default(), VecAnchors::default());
        let ledger = Ledger::builder(Box::new(entries.clone()), Box::new(anchors.clone()))
            .policy(Box::new(EveryN(4)))
            .anchor_mode(AnchorMode::Background)
            .open()
            .unwrap();
        append_n(&ledger, 9);
        ledger.flush_anchors();

        let committed = ledger.anchors().unwrap();
        assert_eq!(committed.len(), 2);
        assert_eq!(committed[0].up_to_sequence, 3);
        assert_eq!(committed[1].up_to_sequence, 7);
        assert!(ledger.verify_anchors().unwrap().valid);
    }

    /// An always-anchor event type forces an anchor regardless of count.
    #[test]
    fn test_event_trigger_forces_anchor() {
        let (entries, anchors) = (VecEntries::default(), VecAnchors::default());
        let ledger = Ledger::builder(Box::new(entries.clone()), Box::new(anchors.clone()))
            .policy(Box::new(EveryN(100)))
            .anchor_mode(AnchorMode::Inline)
            .open()
            .unwrap();
        append_n(&ledger, 2);
        ledger
            .append_payload(
                "SB-1",
                "human",
                &CorrectionPayload::new("hello", "hi there").into(),
            )
            .unwrap();

        let committed = ledger.anchors().unwrap();
        assert_eq!(committed.len(), 1);
        assert_eq!(committed[0].trigger_reason, TriggerReason::Event);
        assert_eq!(committed[0].up_to_sequence, 2);
    }

    /// A failing anchor store never fails the triggering append.
    #[test]
    fn test_anchor_failure_does_not_fail_append() {
        let (entries, anchors) = (VecEntries::default(), VecAnchors::default());
        anchors.fail.store(true, Ordering::SeqCst);
        let ledger = Ledger::builder(Box::new(entries.clone()), Box::new(anchors.clone()))
            .policy(Box::new(EveryN(1)))
            .anchor_mode(AnchorMode::Inline)
            .retry(fast_retry())
            .open()
            .unwrap();

        let entry = ledger
            .append(EventType::Exchange, "SB-1", "assistant", &json!({ "x": 1 }))
            .unwrap();
        assert_eq!(entry.sequence, 0);
        assert!(ledger.anchors().unwrap().is_empty());

        // Once the store recovers the next anchor covers the whole backlog.
        anchors.fail.store(false, Ordering::SeqCst);
        ledger
            .append(EventType::Exchange, "SB-1", "assistant", &json!({ "x": 2 }))
            .unwrap();
        let committed = ledger.anchors().unwrap();
        assert_eq!(committed.len(), 1);
        assert_eq!(committed[0].from_sequence(), 0);
        assert_eq!(committed[0].up_to_sequence, 1);
    }

    /// `anchor_now` anchors the backlog, then has nothing left to do.
    #[test]
    fn test_anchor_now() {
        let (entries, anchors) = (VecEntries::default(), VecAnchors::default());
        let ledger = open(&entries, &anchors);
        assert!(ledger.anchor_now().unwrap().is_none(), "empty ledger has nothing to anchor");

        append_n(&ledger, 3);
        let anchor = ledger.anchor_now().unwrap().unwrap();
        assert_eq!(anchor.trigger_reason, TriggerReason::Manual);
        assert_eq!(anchor.span_count, 3);
        assert!(ledger.anchor_now().unwrap().is_none());
    }

    /// `verify_from` checks only entries after the anchor.
    #[test]
    fn test_verify_from_anchor() {
        let (entries, anchors) = (VecEntries::default(), VecAnchors::default());
        let ledger = open(&entries, &anchors);
        append_n(&ledger, 4);
        let anchor = ledger.anchor_now().unwrap().unwrap();
        append_n(&ledger, 3);

        let report = ledger.verify_from(&anchor).unwrap();
        assert_eq!(report.outcome(), (true, None));
        assert_eq!(report.checked, 3);

        {
            let mut records = entries.records.lock().unwrap();
            if let StoredRecord::Intact(entry) = &mut records[5] {
                entry.context_id = "SB-9".to_string();
            }
        }
        assert_eq!(ledger.verify_from(&anchor).unwrap().outcome(), (false, Some(5)));
    }

    /// Verifying from an anchor, or over a range, never reads the records
    /// before the anchored span or the range's predecessor.
    #[test]
    fn test_bounded_verification_skips_prefix() {
        let (entries, anchors) = (VecEntries::default(), VecAnchors::default());
        let ledger = open(&entries, &anchors);
        append_n(&ledger, 4);
        ledger.anchor_now().unwrap();
        append_n(&ledger, 3);
        let second = ledger.anchor_now().unwrap().unwrap();
        append_n(&ledger, 3);
        assert_eq!(second.from_sequence(), 4);

        entries.reads.lock().unwrap().clear();
        let report = ledger.verify_from(&second).unwrap();
        assert_eq!(report.outcome(), (true, None));
        assert_eq!(report.checked, 3);
        assert_eq!(*entries.reads.lock().unwrap(), vec![4]);

        entries.reads.lock().unwrap().clear();
        let ranged = ledger.verify_with(&ScanOptions::range(8..=9)).unwrap();
        assert_eq!(ranged.outcome(), (true, None));
        assert_eq!(ranged.checked, 2);
        assert_eq!(*entries.reads.lock().unwrap(), vec![7]);
    }

    /// A background anchor that commits while `anchor_now` waits is returned
    /// instead of `None`.
    #[test]
    fn test_anchor_now_returns_racing_background_anchor() {
        let entries = VecEntries::default();
        let anchors = GatedAnchors::default();
        let ledger = Arc::new(
            Ledger::builder(Box::new(entries.clone()), Box::new(anchors.clone()))
                .policy(Box::new(EveryN(3)))
                .anchor_mode(AnchorMode::Background)
                .retry(fast_retry())
                .open()
                .unwrap(),
        );
        append_n(&ledger, 3);
        while !anchors.entered.load(Ordering::SeqCst) {
            thread::sleep(Duration::from_millis(1));
        }

        let manual = {
            let ledger = Arc::clone(&ledger);
            thread::spawn(move || ledger.anchor_now())
        };
        thread::sleep(Duration::from_millis(100));
        anchors.open_gate();

        let anchor = manual.join().unwrap().unwrap().expect("entries were unanchored");
        assert_eq!(anchor.up_to_sequence, 2);
        assert_eq!(anchor.trigger_reason, TriggerReason::Count);
        assert_eq!(ledger.anchors().unwrap().len(), 1);
        assert!(ledger.anchor_now().unwrap().is_none());
    }

    /// Rewriting an anchored entry's hash breaks its anchor digest.
    #[test]
    fn test_verify_anchors_detects_rewritten_span() {
        let (entries, anchors) = (VecEntries::default(), VecAnchors::default());
        let ledger = open(&entries, &anchors);
        append_n(&ledger, 3);
        ledger.anchor_now().unwrap();
        assert!(ledger.verify_anchors().unwrap().valid);

        {
            let mut records = entries.records.lock().unwrap();
            if let StoredRecord::Intact(entry) = &mut records[1] {
                entry.entry_hash = "f".repeat(64);
            }
        }
        let report = ledger.verify_anchors().unwrap();
        assert!(!report.valid);
        assert_eq!(report.first_bad_anchor, Some(0));
    }

    // ── Signing ──────────────────────────────────────────────────────────────

    /// Signing does not change chain verification, and signatures check out.
    #[test]
    fn test_signing_is_independent_of_chain() {
        let (entries, anchors) = (VecEntries::default(), VecAnchors::default());
        let signer = HmacSigner::new("k1", vec![7u8; 32]).unwrap();
        let ledger = Ledger::builder(Box::new(entries.clone()), Box::new(anchors.clone()))
            .signer(Box::new(signer))
            .anchor_mode(AnchorMode::Inline)
            .open()
            .unwrap();
        ledger
            .append_payload("SB-1", "assistant", &ExchangePayload::new("hi", "hello").into())
            .unwrap();
        ledger
            .append_payload("SB-1", "assistant", &ExchangePayload::new("a", "b").into())
            .unwrap();

        assert_eq!(ledger.verify_chain().unwrap().outcome(), (true, None));
        let report = ledger.verify_signatures().unwrap();
        assert_eq!(report.verified, 2);
        assert!(report.all_valid());

        {
            let mut records = entries.records.lock().unwrap();
            if let StoredRecord::Intact(entry) = &mut records[1] {
                entry.signature = Some("00".repeat(32));
            }
        }
        // A forged signature is a signing problem, not a chain break.
        assert_eq!(ledger.verify_chain().unwrap().outcome(), (true, None));
        assert_eq!(ledger.verify_signatures().unwrap().invalid, vec![1]);
    }

    #[test]
    fn test_short_signing_key_rejected() {
        let err = HmacSigner::new("k1", vec![1u8; 8]).unwrap_err();
        assert!(matches!(err, LedgerError::Config { .. }));
    }

    #[test]
    fn test_verify_signatures_requires_signer() {
        let (entries, anchors) = (VecEntries::default(), VecAnchors::default());
        let ledger = open(&entries, &anchors);
        assert!(matches!(
            ledger.verify_signatures().unwrap_err(),
            LedgerError::Config { .. }
        ));
    }

    // ── Export ───────────────────────────────────────────────────────────────

    /// Exported JSON Lines re-import to the same entries and verify the same.
    #[test]
    fn test_export_round_trip() {
        let (entries, anchors) = (VecEntries::default(), VecAnchors::default());
        let ledger = open(&entries, &anchors);
        append_n(&ledger, 4);

        let mut buf = Vec::new();
        let written = ledger.export_jsonl(&ScanOptions::full(), &mut buf).unwrap();
        assert_eq!(written, 4);

        let records = jsonl::read_entries(buf.as_slice(), "import").unwrap();
        let imported: Vec<_> = records.into_iter().filter_map(StoredRecord::into_entry).collect();
        assert_eq!(imported, ledger.snapshot().unwrap());
        assert_eq!(
            verify_entries(&imported).outcome(),
            ledger.verify_chain().unwrap().outcome()
        );
    }

    /// Lines that are not UTF-8 become unreadable records at their position;
    /// read errors carry the caller's operation name.
    #[test]
    fn test_jsonl_reader_tolerates_invalid_utf8() {
        let (entries, anchors) = (VecEntries::default(), VecAnchors::default());
        let ledger = open(&entries, &anchors);
        append_n(&ledger, 3);

        let mut buf = Vec::new();
        ledger.export_jsonl(&ScanOptions::full(), &mut buf).unwrap();
        let second_line = buf.iter().position(|b| *b == b'\n').unwrap() + 1;
        buf[second_line + 2] = 0xFF;

        let records = jsonl::read_entries(buf.as_slice(), "verify_chain").unwrap();
        assert_eq!(records.len(), 3);
        assert!(matches!(records[1], StoredRecord::Unreadable { position: 1, .. }));
        let report =
            chain::verify_records(&records, chain::ChainCursor::genesis(), &ScanOptions::full())
                .unwrap();
        assert_eq!(report.outcome(), (false, Some(1)));

        let tail = jsonl::read_entries_from(buf.as_slice(), 2, "verify_from").unwrap();
        assert_eq!(tail.len(), 1);
        assert_eq!(tail[0].entry().unwrap().sequence, 2);
    }

    #[test]
    fn test_retry_delay_is_capped() {
        let retry = RetryConfig {
            max_attempts: 10,
            initial_delay_ms: 100,
            max_delay_ms: 1_000,
            multiplier: 2.0,
        };
        assert_eq!(retry.delay_for_attempt(1).as_millis(), 100);
        assert_eq!(retry.delay_for_attempt(3).as_millis(), 400);
        assert_eq!(retry.delay_for_attempt(9).as_millis(), 1_000);
    }
}
