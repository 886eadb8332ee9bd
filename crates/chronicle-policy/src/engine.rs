//! Hybrid anchor policy.
//!
//! `HybridAnchorPolicy` implements the `AnchorPolicy` trait from
//! chronicle-core from an `AnchorPolicyConfig`.
//!
//! Evaluation order, first match wins:
//!
//! 1. **Score**: the append carried a score above `score_threshold`.
//! 2. **Event**: the committed event type is in `always_anchor`.
//! 3. **Count**: `entries_since_anchor >= count_threshold`.
//! 4. **Time**: `now - window_started_at >= interval_secs`.
//!
//! The reported reason is the highest-precedence trigger that fired.

use std::path::Path;

use tracing::debug;

use chronicle_contracts::{anchor::TriggerReason, error::LedgerResult};
use chronicle_core::traits::{AnchorPolicy, AnchorState};

use crate::config::{AnchorPolicyConfig, LedgerConfig};

/// An `AnchorPolicy` combining count, time, event, and score triggers.
///
/// ```rust,ignore
/// use chronicle_policy::HybridAnchorPolicy;
///
/// let policy = HybridAnchorPolicy::from_file(Path::new("chronicle.toml"))?;
/// let ledger = Ledger::builder(entries, anchors).policy(Box::new(policy)).open()?;
/// ```
#[derive(Debug, Clone)]
pub struct HybridAnchorPolicy {
    config: AnchorPolicyConfig,
}

impl HybridAnchorPolicy {
    pub fn new(config: AnchorPolicyConfig) -> Self {
        Self { config }
    }

    /// Build from the `[anchor]` section of a TOML ledger config.
    pub fn from_toml_str(s: &str) -> LedgerResult<Self> {
        Ok(Self::new(LedgerConfig::from_toml_str(s)?.anchor))
    }

    pub fn from_file(path: &Path) -> LedgerResult<Self> {
        Ok(Self::new(LedgerConfig::from_file(path)?.anchor))
    }

    pub fn config(&self) -> &AnchorPolicyConfig {
        &self.config
    }

    fn score_fired(&self, state: &AnchorState<'_>) -> bool {
        matches!(
            (state.score, self.config.score_threshold),
            (Some(score), Some(threshold)) if score > threshold
        )
    }

    fn event_fired(&self, state: &AnchorState<'_>) -> bool {
        self.config.always_anchor.contains(state.event_type)
    }

    fn count_fired(&self, state: &AnchorState<'_>) -> bool {
        self.config
            .count_threshold
            .is_some_and(|threshold| state.entries_since_anchor >= threshold)
    }

    fn time_fired(&self, state: &AnchorState<'_>) -> bool {
        self.config.interval_secs.is_some_and(|secs| {
            let elapsed = (state.now - state.window_started_at).num_seconds();
            u64::try_from(elapsed).is_ok_and(|elapsed| elapsed >= secs)
        })
    }
}

impl AnchorPolicy for HybridAnchorPolicy {
    fn should_anchor(&self, state: &AnchorState<'_>) -> Option<TriggerReason> {
        let reason = if self.score_fired(state) {
            TriggerReason::Score
        } else if self.event_fired(state) {
            TriggerReason::Event
        } else if self.count_fired(state) {
            TriggerReason::Count
        } else if self.time_fired(state) {
            TriggerReason::Time
        } else {
            return None;
        };

        debug!(
            sequence = state.sequence,
            event_type = %state.event_type,
            entries_since_anchor = state.entries_since_anchor,
            trigger = %reason,
            "anchor policy fired"
        );
        Some(reason)
    }
}
