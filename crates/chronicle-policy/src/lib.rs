//! # chronicle-policy
//!
//! TOML-driven ledger configuration and the hybrid anchor policy.
//!
//! ## Overview
//!
//! `LedgerConfig` is the single configuration document for a ledger: where
//! it lives, when it anchors, how anchor retries back off, and which key
//! signs entries.  `HybridAnchorPolicy` turns the `[anchor]` section into an
//! `AnchorPolicy` the ledger evaluates after every commit.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use chronicle_policy::{HybridAnchorPolicy, LedgerConfig};
//!
//! let config = LedgerConfig::from_file(Path::new("chronicle.toml"))?;
//! let ledger = Ledger::builder(entries, anchors)
//!     .anchor_mode(config.anchor.mode)
//!     .retry(config.anchor.retry.clone())
//!     .policy(Box::new(HybridAnchorPolicy::new(config.anchor.clone())))
//!     .open()?;
//! ```

pub mod config;
pub mod engine;

pub use config::{AnchorPolicyConfig, LedgerConfig, SigningConfig};
pub use engine::HybridAnchorPolicy;

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};
    use serde_json::json;

    use chronicle_contracts::{
        anchor::TriggerReason, error::LedgerError, event::EventType,
        payload::CorrectionPayload,
    };
    use chronicle_core::{AnchorMode, AnchorPolicy, AnchorState, Ledger};
    use chronicle_store::{MemoryAnchorStore, MemoryEntryStore};

    use crate::{AnchorPolicyConfig, HybridAnchorPolicy, LedgerConfig};

    // ── Helpers ───────────────────────────────────────────────────────────────

    fn only_count(threshold: u64) -> AnchorPolicyConfig {
        AnchorPolicyConfig {
            count_threshold: Some(threshold),
            interval_secs: None,
            always_anchor: Vec::new(),
            score_threshold: None,
            mode: AnchorMode::Inline,
            ..AnchorPolicyConfig::default()
        }
    }

    /// A state `entries_since` entries and `elapsed_secs` seconds into the
    /// current window.
    fn state(
        event_type: &EventType,
        entries_since: u64,
        elapsed_secs: i64,
        score: Option<f64>,
    ) -> AnchorState<'_> {
        let window_started_at = Utc.with_ymd_and_hms(2026, 10, 16, 9, 0, 0).unwrap();
        AnchorState {
            sequence: entries_since.saturating_sub(1),
            entries_since_anchor: entries_since,
            window_started_at,
            now: window_started_at + Duration::seconds(elapsed_secs),
            event_type,
            score,
        }
    }

    fn ledger_with(config: AnchorPolicyConfig) -> Ledger {
        Ledger::builder(
            Box::new(MemoryEntryStore::new()),
            Box::new(MemoryAnchorStore::new()),
        )
        .anchor_mode(config.mode)
        .retry(config.retry.clone())
        .policy(Box::new(HybridAnchorPolicy::new(config)))
        .open()
        .unwrap()
    }

    fn append_exchanges(ledger: &Ledger, n: usize) {
        for i in 0..n {
            ledger
                .append(EventType::Exchange, "SB-1", "assistant", &json!({ "turn": i }))
                .unwrap();
        }
    }

    // ── 1. configuration ──────────────────────────────────────────────────────

    /// An empty document yields the defaults.
    #[test]
    fn test_empty_config_uses_defaults() {
        let config = LedgerConfig::from_toml_str("").unwrap();
        assert_eq!(config, LedgerConfig::default());
        assert_eq!(config.anchor.count_threshold, Some(100));
        assert_eq!(config.anchor.mode, AnchorMode::Background);
        assert!(config.anchor.always_anchor.contains(&EventType::Correction));
        assert!(config.signing.is_none());
    }

    #[test]
    fn test_full_config_parses() {
        let toml = r#"
            name = "SB-1"
            data_dir = "/tmp/chronicle/SB-1"

            [anchor]
            count_threshold = 10
            interval_secs = 60
            always_anchor = ["CORRECTION", "SIDEBAR_MERGE", "CUSTOM_KIND"]
            score_threshold = 0.75
            mode = "inline"

            [anchor.retry]
            max_attempts = 3
            initial_delay_ms = 10

            [signing]
            key_id = "k1"
            key_hex = "0000000000000000000000000000000000000000000000000000000000000000"
        "#;

        let config = LedgerConfig::from_toml_str(toml).unwrap();
        assert_eq!(config.name.as_deref(), Some("SB-1"));
        assert_eq!(config.anchor.count_threshold, Some(10));
        assert_eq!(config.anchor.interval_secs, Some(60));
        assert_eq!(
            config.anchor.always_anchor,
            vec![
                EventType::Correction,
                EventType::SidebarMerge,
                EventType::Other("CUSTOM_KIND".to_string()),
            ]
        );
        assert_eq!(config.anchor.mode, AnchorMode::Inline);
        assert_eq!(config.anchor.retry.max_attempts, 3);
        // Unset retry fields keep their defaults.
        assert_eq!(config.anchor.retry.max_delay_ms, 5_000);

        let signer = config.signing.unwrap().signer().unwrap();
        assert_eq!(chronicle_core::EntrySigner::key_id(&signer), "k1");
    }

    /// Malformed TOML must produce a `LedgerError::Config`.
    #[test]
    fn test_toml_parse_error() {
        let result = LedgerConfig::from_toml_str("this is not valid toml ][[[");
        match result {
            Err(LedgerError::Config { reason }) => {
                assert!(
                    reason.contains("failed to parse ledger TOML"),
                    "expected parse error message, got: {reason}"
                );
            }
            other => panic!("expected Config error, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_values_rejected() {
        for toml in [
            "[anchor]\ncount_threshold = 0",
            "[anchor]\ninterval_secs = 0",
            "[anchor.retry]\nmax_attempts = 0",
            "[anchor.retry]\nmultiplier = 0.5",
        ] {
            assert!(
                matches!(LedgerConfig::from_toml_str(toml), Err(LedgerError::Config { .. })),
                "accepted: {toml}"
            );
        }
    }

    #[test]
    fn test_signing_requires_exactly_one_key_source() {
        let neither = LedgerConfig::from_toml_str("[signing]\nkey_id = \"k\"").unwrap();
        assert!(neither.signing.unwrap().signer().is_err());

        let both = LedgerConfig::from_toml_str(
            "[signing]\nkey_id = \"k\"\nkey_hex = \"00\"\nkey_env = \"X\"",
        )
        .unwrap();
        assert!(both.signing.unwrap().signer().is_err());
    }

    #[test]
    fn test_config_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("chronicle.toml");
        std::fs::write(&path, "[anchor]\ncount_threshold = 7\n").unwrap();

        let policy = HybridAnchorPolicy::from_file(&path).unwrap();
        assert_eq!(policy.config().count_threshold, Some(7));

        let missing = LedgerConfig::from_file(&dir.path().join("absent.toml"));
        assert!(matches!(missing, Err(LedgerError::Config { .. })));
    }

    // ── 2. trigger evaluation ─────────────────────────────────────────────────

    #[test]
    fn test_no_trigger_below_thresholds() {
        let policy = HybridAnchorPolicy::new(AnchorPolicyConfig {
            interval_secs: Some(60),
            score_threshold: Some(0.9),
            ..only_count(10)
        });
        assert_eq!(policy.should_anchor(&state(&EventType::Exchange, 9, 59, Some(0.9))), None);
    }

    #[test]
    fn test_each_trigger_fires_alone() {
        let policy = HybridAnchorPolicy::new(AnchorPolicyConfig {
            interval_secs: Some(60),
            score_threshold: Some(0.9),
            always_anchor: vec![EventType::Error],
            ..only_count(10)
        });
        let exchange = EventType::Exchange;
        assert_eq!(
            policy.should_anchor(&state(&exchange, 10, 0, None)),
            Some(TriggerReason::Count)
        );
        assert_eq!(
            policy.should_anchor(&state(&exchange, 1, 60, None)),
            Some(TriggerReason::Time)
        );
        assert_eq!(
            policy.should_anchor(&state(&EventType::Error, 1, 0, None)),
            Some(TriggerReason::Event)
        );
        assert_eq!(
            policy.should_anchor(&state(&exchange, 1, 0, Some(0.95))),
            Some(TriggerReason::Score)
        );
    }

    /// Score beats event beats count beats time.
    #[test]
    fn test_trigger_precedence() {
        let policy = HybridAnchorPolicy::new(AnchorPolicyConfig {
            interval_secs: Some(60),
            score_threshold: Some(0.5),
            always_anchor: vec![EventType::Correction],
            ..only_count(10)
        });
        let correction = EventType::Correction;
        assert_eq!(
            policy.should_anchor(&state(&correction, 50, 600, Some(0.9))),
            Some(TriggerReason::Score)
        );
        assert_eq!(
            policy.should_anchor(&state(&correction, 50, 600, None)),
            Some(TriggerReason::Event)
        );
        assert_eq!(
            policy.should_anchor(&state(&EventType::Exchange, 50, 600, None)),
            Some(TriggerReason::Count)
        );
    }

    /// A clock step backwards never fires the time trigger.
    #[test]
    fn test_time_trigger_ignores_negative_elapsed() {
        let policy = HybridAnchorPolicy::new(AnchorPolicyConfig {
            interval_secs: Some(1),
            count_threshold: None,
            ..only_count(1)
        });
        assert_eq!(policy.should_anchor(&state(&EventType::Exchange, 1, -30, None)), None);
    }

    // ── 3. against a live ledger ──────────────────────────────────────────────

    /// Threshold 10: ten appends give exactly one anchor spanning 0..=9.
    #[test]
    fn test_count_threshold_on_ledger() {
        let ledger = ledger_with(only_count(10));
        append_exchanges(&ledger, 10);

        let anchors = ledger.anchors().unwrap();
        assert_eq!(anchors.len(), 1);
        assert_eq!(anchors[0].from_sequence(), 0);
        assert_eq!(anchors[0].up_to_sequence, 9);
        assert_eq!(anchors[0].trigger_reason, TriggerReason::Count);

        append_exchanges(&ledger, 9);
        assert_eq!(ledger.anchors().unwrap().len(), 1, "19 entries is one full window");
    }

    /// An always-anchor event forces an anchor regardless of count.
    #[test]
    fn test_always_anchor_on_ledger() {
        let ledger = ledger_with(AnchorPolicyConfig {
            always_anchor: vec![EventType::Correction],
            ..only_count(10)
        });
        append_exchanges(&ledger, 3);
        ledger
            .append_payload(
                "SB-1",
                "human",
                &CorrectionPayload::new("hello", "hi there").into(),
            )
            .unwrap();

        let anchors = ledger.anchors().unwrap();
        assert_eq!(anchors.len(), 1);
        assert_eq!(anchors[0].trigger_reason, TriggerReason::Event);
        assert_eq!(anchors[0].up_to_sequence, 3);

        // The count window restarts after the forced anchor.
        append_exchanges(&ledger, 10);
        let anchors = ledger.anchors().unwrap();
        assert_eq!(anchors.len(), 2);
        assert_eq!(anchors[1].up_to_sequence, 13);
        assert!(ledger.verify_anchors().unwrap().valid);
    }

    #[test]
    fn test_score_on_ledger() {
        let ledger = ledger_with(AnchorPolicyConfig {
            score_threshold: Some(0.8),
            ..only_count(100)
        });
        ledger
            .append_scored(EventType::Exchange, "SB-1", "assistant", &json!({ "a": 1 }), 0.2)
            .unwrap();
        assert!(ledger.anchors().unwrap().is_empty());

        ledger
            .append_scored(EventType::Exchange, "SB-1", "assistant", &json!({ "a": 2 }), 0.99)
            .unwrap();
        let anchors = ledger.anchors().unwrap();
        assert_eq!(anchors.len(), 1);
        assert_eq!(anchors[0].trigger_reason, TriggerReason::Score);
        assert_eq!(anchors[0].span_count, 2);
    }

    /// The background worker commits the same anchors once flushed.
    #[test]
    fn test_background_mode_on_ledger() {
        let ledger = ledger_with(AnchorPolicyConfig {
            mode: AnchorMode::Background,
            ..only_count(5)
        });
        append_exchanges(&ledger, 12);
        ledger.flush_anchors();

        let anchors = ledger.anchors().unwrap();
        assert_eq!(anchors.len(), 2);
        assert_eq!(anchors[1].up_to_sequence, 9);
        assert!(ledger.verify_anchors().unwrap().valid);
    }
}
