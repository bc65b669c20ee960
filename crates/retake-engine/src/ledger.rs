//! The mistake ledger.
//!
//! Failed checks from finished runs are folded into a long-lived list of
//! [`MistakeRecord`]s. Records are matched by [`fingerprint`] so the same
//! failure recurring across runs bumps a counter instead of adding a row.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Characters of the normalized context snippet that take part in the
/// fingerprint. Snippets that agree on this prefix merge even if they differ
/// further on.
pub const FINGERPRINT_PREFIX_CHARS: usize = 50;

// ============================================================================
// QuestionKind
// ============================================================================

/// Category of an interactive check inside a lesson screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QuestionKind {
    /// Pick one answer from several.
    MultipleChoice,
    /// Type the missing piece of code or text.
    FillIn,
    /// Put shuffled lines back in order.
    Reorder,
    /// Decide whether a statement holds.
    TrueFalse,
    /// Edit a code snippet until it passes.
    CodeEdit,
    /// Explanatory content with nothing to answer.
    Narrative,
}

impl QuestionKind {
    /// The wire name of the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MultipleChoice => "multipleChoice",
            Self::FillIn => "fillIn",
            Self::Reorder => "reorder",
            Self::TrueFalse => "trueFalse",
            Self::CodeEdit => "codeEdit",
            Self::Narrative => "narrative",
        }
    }

    /// Returns `false` for kinds that cannot meaningfully be failed.
    ///
    /// # Examples
    ///
    /// ```
    /// use retake_engine::QuestionKind;
    ///
    /// assert!(QuestionKind::FillIn.is_interactive());
    /// assert!(!QuestionKind::Narrative.is_interactive());
    /// ```
    #[must_use]
    pub const fn is_interactive(self) -> bool {
        !matches!(self, Self::Narrative)
    }

    /// Parses a kind name, case-insensitively.
    fn from_str_case_insensitive(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "multiplechoice" => Some(Self::MultipleChoice),
            "fillin" => Some(Self::FillIn),
            "reorder" => Some(Self::Reorder),
            "truefalse" => Some(Self::TrueFalse),
            "codeedit" => Some(Self::CodeEdit),
            "narrative" => Some(Self::Narrative),
            _ => None,
        }
    }
}

impl fmt::Display for QuestionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for QuestionKind {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_str_case_insensitive(&s).ok_or_else(|| {
            serde::de::Error::custom(format!(
                "invalid question kind '{s}': expected one of 'multipleChoice', 'fillIn', 'reorder', 'trueFalse', 'codeEdit', 'narrative'"
            ))
        })
    }
}

impl Serialize for QuestionKind {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

// ============================================================================
// MistakeRecord
// ============================================================================

/// One remembered failure on a practice item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MistakeRecord {
    /// Opaque identifier assigned on creation.
    pub id: String,
    /// The practice item the failure belongs to.
    pub item_id: String,
    /// Kind of check that failed.
    pub question_kind: QuestionKind,
    /// Free-text description of the failure.
    pub context_snippet: String,
    /// Payload needed to re-render the failed check during repair.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub widget_snapshot: Option<serde_json::Value>,
    /// How many times this fingerprint has occurred.
    pub failure_count: u32,
    /// Set by an outer concern; cleared whenever the failure recurs.
    #[serde(default)]
    pub is_resolved: bool,
    /// Most recent occurrence.
    pub last_seen_at: DateTime<Utc>,
}

impl MistakeRecord {
    /// Creates a fresh, unresolved record seen once at `seen_at`.
    #[must_use]
    pub fn new(
        item_id: impl Into<String>,
        question_kind: QuestionKind,
        context_snippet: impl Into<String>,
        seen_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            item_id: item_id.into(),
            question_kind,
            context_snippet: context_snippet.into(),
            widget_snapshot: None,
            failure_count: 1,
            is_resolved: false,
            last_seen_at: seen_at,
        }
    }

    /// Attaches the widget payload used to replay the check.
    #[must_use]
    pub fn with_snapshot(mut self, snapshot: serde_json::Value) -> Self {
        self.widget_snapshot = Some(snapshot);
        self
    }

    /// Shorthand for [`fingerprint`].
    #[must_use]
    pub fn fingerprint(&self) -> String {
        fingerprint(self)
    }
}

/// Key that identifies "the same mistake" across runs.
///
/// Built from the item id, the question kind and the first
/// [`FINGERPRINT_PREFIX_CHARS`] characters of the trimmed, lowercased
/// context snippet.
///
/// # Examples
///
/// ```
/// use chrono::Utc;
/// use retake_engine::{fingerprint, MistakeRecord, QuestionKind};
///
/// let record = MistakeRecord::new("two-sum", QuestionKind::FillIn, "  Off By One ", Utc::now());
/// assert_eq!(fingerprint(&record), "two-sum|fillIn|off by one");
/// ```
#[must_use]
pub fn fingerprint(record: &MistakeRecord) -> String {
    let context: String = record
        .context_snippet
        .trim()
        .to_lowercase()
        .chars()
        .take(FINGERPRINT_PREFIX_CHARS)
        .collect();
    format!(
        "{}|{}|{context}",
        record.item_id,
        record.question_kind.as_str()
    )
}

// ============================================================================
// Merging
// ============================================================================

/// Counts produced by folding a batch into the ledger.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeReport {
    /// Records appended because their fingerprint was new.
    pub added: usize,
    /// Records folded into an existing entry.
    pub recurred: usize,
}

/// Folds `incoming` failures into a copy of `existing`.
///
/// A failure whose fingerprint already exists updates that entry's
/// `last_seen_at`, bumps its `failure_count` and marks it unresolved.
/// Anything else is appended with a count of 1. Nothing is ever removed.
#[must_use]
pub fn merge(existing: &[MistakeRecord], incoming: &[MistakeRecord]) -> Vec<MistakeRecord> {
    let mut merged = existing.to_vec();
    merge_into(&mut merged, incoming);
    merged
}

fn merge_into(records: &mut Vec<MistakeRecord>, incoming: &[MistakeRecord]) -> MergeReport {
    let mut index: HashMap<String, usize> = HashMap::with_capacity(records.len());
    for (position, record) in records.iter().enumerate() {
        index.entry(fingerprint(record)).or_insert(position);
    }

    let mut report = MergeReport::default();
    for failure in incoming {
        let key = fingerprint(failure);
        if let Some(existing) = index.get(&key).and_then(|&pos| records.get_mut(pos)) {
            existing.last_seen_at = failure.last_seen_at;
            existing.failure_count = existing.failure_count.saturating_add(1);
            existing.is_resolved = false;
            report.recurred += 1;
        } else {
            let mut fresh = failure.clone();
            fresh.failure_count = 1;
            fresh.is_resolved = false;
            index.insert(key, records.len());
            records.push(fresh);
            report.added += 1;
        }
    }
    report
}

// ============================================================================
// MistakeLedger
// ============================================================================

/// The learner's accumulated mistakes, in first-seen order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MistakeLedger {
    records: Vec<MistakeRecord>,
}

impl MistakeLedger {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restores a ledger from persisted records.
    #[must_use]
    pub const fn from_records(records: Vec<MistakeRecord>) -> Self {
        Self { records }
    }

    /// Folds a batch of failures into the ledger in place.
    pub fn merge(&mut self, incoming: &[MistakeRecord]) -> MergeReport {
        merge_into(&mut self.records, incoming)
    }

    /// All records in first-seen order.
    #[must_use]
    pub fn records(&self) -> &[MistakeRecord] {
        &self.records
    }

    /// Records belonging to one item.
    #[must_use]
    pub fn for_item(&self, item_id: &str) -> Vec<MistakeRecord> {
        self.records
            .iter()
            .filter(|r| r.item_id == item_id)
            .cloned()
            .collect()
    }

    /// Records not yet marked resolved.
    pub fn unresolved(&self) -> impl Iterator<Item = &MistakeRecord> {
        self.records.iter().filter(|r| !r.is_resolved)
    }

    /// Unresolved records that recur most, ties broken by most recent.
    #[must_use]
    pub fn top_recurring(&self, limit: usize) -> Vec<&MistakeRecord> {
        let mut top: Vec<_> = self.unresolved().collect();
        top.sort_by(|a, b| {
            b.failure_count
                .cmp(&a.failure_count)
                .then_with(|| b.last_seen_at.cmp(&a.last_seen_at))
        });
        top.truncate(limit);
        top
    }

    /// Marks a record resolved. Returns `false` if no record has that id.
    pub fn mark_resolved(&mut self, id: &str) -> bool {
        self.records
            .iter_mut()
            .find(|r| r.id == id)
            .map(|record| record.is_resolved = true)
            .is_some()
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` when nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Consumes the ledger, yielding its records.
    #[must_use]
    pub fn into_records(self) -> Vec<MistakeRecord> {
        self.records
    }
}

// ============================================================================
// Tests
// ============================================================================
