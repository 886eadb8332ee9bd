//! Learning-opportunity analytics.
//!
//! Scans committed corrections and uncertainty flags for patterns that keep
//! coming back.  A correction's pattern is its `category` when one was
//! recorded, else its normalized `was` text; an uncertainty's pattern is its
//! normalized `topic`.  Groups with at least `min_recurrence` members become
//! `LearningInsight`s pointing at the entries that support them.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use chronicle_contracts::{entry::Entry, payload::EventPayload};

/// Which kind of recurring signal an insight groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightKind {
    Correction,
    Uncertainty,
}

impl fmt::Display for InsightKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            InsightKind::Correction => "correction",
            InsightKind::Uncertainty => "uncertainty",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InsightConfig {
    /// Smallest group size reported.
    pub min_recurrence: usize,
    pub include_corrections: bool,
    pub include_uncertainty: bool,
}

impl Default for InsightConfig {
    fn default() -> Self {
        Self {
            min_recurrence: 3,
            include_corrections: true,
            include_uncertainty: true,
        }
    }
}

/// A pattern that recurred often enough to be worth a look.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LearningInsight {
    pub kind: InsightKind,
    pub pattern: String,
    pub occurrences: usize,
    /// Sequences of the entries in this group, ascending.
    pub supporting_sequences: Vec<u64>,
    /// Distinct context ids the pattern appeared in.
    pub contexts: Vec<String>,
}

impl fmt::Display for LearningInsight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] \"{}\" x{} in {} context(s); entries {:?}",
            self.kind,
            self.pattern,
            self.occurrences,
            self.contexts.len(),
            self.supporting_sequences
        )
    }
}

/// Lowercase, trim, collapse inner whitespace, and drop trailing punctuation.
pub fn normalize_pattern(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed
        .trim_end_matches(|c: char| c.is_ascii_punctuation())
        .to_lowercase()
}

#[derive(Default)]
struct Group {
    sequences: Vec<u64>,
    contexts: BTreeSet<String>,
}

/// Group recurring corrections and uncertainty flags.
///
/// Results are ordered by occurrences (most first), then kind, then pattern.
/// Entries whose payload does not decode are skipped.
pub fn find_learning_opportunities(
    entries: &[Entry],
    config: &InsightConfig,
) -> Vec<LearningInsight> {
    let mut groups: BTreeMap<(InsightKind, String), Group> = BTreeMap::new();
    let mut skipped = 0usize;

    for entry in entries {
        let key = match entry.decode_payload() {
            Ok(EventPayload::Correction(p)) if config.include_corrections => {
                let pattern = p
                    .category
                    .as_deref()
                    .map(normalize_pattern)
                    .filter(|c| !c.is_empty())
                    .unwrap_or_else(|| normalize_pattern(&p.was));
                (InsightKind::Correction, pattern)
            }
            Ok(EventPayload::Uncertainty(p)) if config.include_uncertainty => {
                (InsightKind::Uncertainty, normalize_pattern(&p.topic))
            }
            Ok(_) => continue,
            Err(_) => {
                skipped += 1;
                continue;
            }
        };
        if key.1.is_empty() {
            continue;
        }
        let group = groups.entry(key).or_default();
        group.sequences.push(entry.sequence);
        group.contexts.insert(entry.context_id.clone());
    }

    let min = config.min_recurrence.max(1);
    let mut insights: Vec<LearningInsight> = groups
        .into_iter()
        .filter(|(_, group)| group.sequences.len() >= min)
        .map(|((kind, pattern), mut group)| {
            group.sequences.sort_unstable();
            LearningInsight {
                kind,
                pattern,
                occurrences: group.sequences.len(),
                supporting_sequences: group.sequences,
                contexts: group.contexts.into_iter().collect(),
            }
        })
        .collect();
    insights.sort_by(|a, b| {
        b.occurrences
            .cmp(&a.occurrences)
            .then(a.kind.cmp(&b.kind))
            .then_with(|| a.pattern.cmp(&b.pattern))
    });

    debug!(
        scanned = entries.len(),
        skipped,
        insights = insights.len(),
        min_recurrence = min,
        "learning opportunities scanned"
    );
    insights
}
