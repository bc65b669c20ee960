//! Retake Review Digests
//!
//! Summarizes a learner's engine state at a point in time: what is due, what
//! is coming up, how much has been mastered and which mistakes keep coming
//! back. A digest can be serialized to JSON or rendered to Markdown.
//!
//! # Example
//!
//! ```rust
//! use chrono::Utc;
//! use retake_engine::{EngineState, Quality, ReportConfig};
//! use retake_report::{json::JsonGenerator, MarkdownGenerator, ReviewDigest};
//!
//! let mut state = EngineState::new();
//! state.schedule.record("two-sum", Quality::Good, Utc::now(), 300);
//!
//! let digest = ReviewDigest::from_state(&state, Utc::now(), &ReportConfig::default());
//! assert_eq!(digest.tracked_items, 1);
//!
//! let json = JsonGenerator::new(&digest).generate_pretty().unwrap();
//! let markdown = MarkdownGenerator::new(&digest).generate();
//! assert!(markdown.contains("# Retake Review Digest"));
//! # let _ = json;
//! ```

pub mod json;
mod markdown;

pub use markdown::MarkdownGenerator;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use retake_engine::{
    EngineSnapshot, EngineState, MistakeRecord, QuestionKind, ReportConfig, RetentionRecord,
    ReviewInterval,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur during digest generation.
#[derive(Debug, Error)]
pub enum ReportError {
    /// Failed to serialize the digest to JSON.
    #[error("failed to serialize digest: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Failed to write the digest file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for report operations.
pub type Result<T> = std::result::Result<T, ReportError>;

// ============================================================================
// ReviewDigest
// ============================================================================

/// A point-in-time overview of a learner's review state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewDigest {
    /// The instant the digest describes.
    pub generated_at: DateTime<Utc>,
    /// Number of items with a retention record.
    pub tracked_items: usize,
    /// Items at the 30-day ceiling.
    pub mastered: usize,
    /// Look-ahead window used for `upcoming`, in days.
    pub upcoming_days: u32,
    /// Items due now, most overdue first.
    pub due: Vec<ScheduledItem>,
    /// Items due within the look-ahead window, soonest first.
    pub upcoming: Vec<ScheduledItem>,
    /// Unresolved mistakes that recur most.
    pub top_mistakes: Vec<MistakeSummary>,
    /// Daily streak.
    pub streak: StreakSummary,
}

/// One item on the due or upcoming list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledItem {
    /// The practice item.
    pub item_id: String,
    /// When it is (or was) due.
    pub next_review: DateTime<Utc>,
    /// Current interval in days.
    pub interval_days: u32,
    /// Consecutive passing reviews.
    pub streak: u32,
    /// Whole days until due; negative when overdue.
    pub days_until_due: i64,
}

impl ScheduledItem {
    fn from_record(record: &RetentionRecord, now: DateTime<Utc>) -> Self {
        Self {
            item_id: record.item_id.clone(),
            next_review: record.next_review,
            interval_days: record.interval.days(),
            streak: record.streak,
            days_until_due: record.days_until_due(now),
        }
    }

    /// The interval rung, for display.
    #[must_use]
    pub fn interval(&self) -> Option<ReviewInterval> {
        ReviewInterval::from_days(self.interval_days)
    }
}

/// One recurring mistake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MistakeSummary {
    /// Ledger record id.
    pub id: String,
    /// The practice item.
    pub item_id: String,
    /// Kind of check that failed.
    pub question_kind: QuestionKind,
    /// What went wrong.
    pub context: String,
    /// Times the mistake occurred.
    pub failure_count: u32,
    /// Most recent occurrence.
    pub last_seen_at: DateTime<Utc>,
}

impl From<&MistakeRecord> for MistakeSummary {
    fn from(record: &MistakeRecord) -> Self {
        Self {
            id: record.id.clone(),
            item_id: record.item_id.clone(),
            question_kind: record.question_kind,
            context: record.context_snippet.clone(),
            failure_count: record.failure_count,
            last_seen_at: record.last_seen_at,
        }
    }
}

/// Daily streak as of the digest instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreakSummary {
    /// Consecutive days still alive today; 0 once a day was skipped.
    pub current: u32,
    /// Day of the last completed run.
    pub last_completed: Option<NaiveDate>,
}

impl ReviewDigest {
    /// Builds a digest from live engine state.
    #[must_use]
    pub fn from_state(state: &EngineState, now: DateTime<Utc>, config: &ReportConfig) -> Self {
        let window = Duration::days(i64::from(config.upcoming_days));
        Self {
            generated_at: now,
            tracked_items: state.schedule.len(),
            mastered: state.schedule.mastered_count(),
            upcoming_days: config.upcoming_days,
            due: state
                .schedule
                .due_items(now)
                .into_iter()
                .map(|r| ScheduledItem::from_record(r, now))
                .collect(),
            upcoming: state
                .schedule
                .upcoming(now, window)
                .into_iter()
                .map(|r| ScheduledItem::from_record(r, now))
                .collect(),
            top_mistakes: state
                .ledger
                .top_recurring(config.top_mistakes)
                .into_iter()
                .map(MistakeSummary::from)
                .collect(),
            streak: StreakSummary {
                current: state.streak.current(now.date_naive()),
                last_completed: state.streak.last_completed,
            },
        }
    }

    /// Builds a digest from a persisted snapshot.
    #[must_use]
    pub fn from_snapshot(
        snapshot: &EngineSnapshot,
        now: DateTime<Utc>,
        config: &ReportConfig,
    ) -> Self {
        Self::from_state(&snapshot.clone().into_state(), now, config)
    }

    /// Returns `true` when nothing is due and nothing recurs.
    #[must_use]
    pub fn is_all_clear(&self) -> bool {
        self.due.is_empty() && self.top_mistakes.is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use retake_engine::Quality;

    use super::*;

    pub(crate) fn at(rfc3339: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(rfc3339)
            .unwrap()
            .with_timezone(&Utc)
    }

    /// Three items (one due, one upcoming, one far out) and two mistakes.
    pub(crate) fn sample_state() -> EngineState {
        let mut state = EngineState::new();

        // due on 2026-06-04
        state
            .schedule
            .record("two-sum", Quality::Good, at("2026-06-01T09:00:00Z"), 120);
        // due on 2026-06-11
        state
            .schedule
            .record("lru-cache", Quality::Forgot, at("2026-06-10T09:00:00Z"), 600);
        // walk "merge-intervals" up to the ceiling
        let mut when = at("2026-04-01T09:00:00Z");
        for _ in 0..5 {
            let record = state
                .schedule
                .record("merge-intervals", Quality::Perfect, when, 60);
            when = record.next_review;
        }

        let mut repeated = MistakeRecord::new(
            "lru-cache",
            QuestionKind::FillIn,
            "move node to head on get",
            at("2026-06-10T09:00:00Z"),
        );
        repeated.id = "m-1".to_string();
        let mut once = MistakeRecord::new(
            "two-sum",
            QuestionKind::MultipleChoice,
            "picked the O(n^2) scan",
            at("2026-06-01T09:00:00Z"),
        );
        once.id = "m-2".to_string();
        state.ledger.merge(&[repeated.clone(), once, repeated]);

        state.streak.record_completion(at("2026-06-09T09:00:00Z").date_naive());
        state.streak.record_completion(at("2026-06-10T09:00:00Z").date_naive());
        state
    }

    pub(crate) fn sample_digest() -> ReviewDigest {
        ReviewDigest::from_state(
            &sample_state(),
            at("2026-06-10T12:00:00Z"),
            &ReportConfig::default(),
        )
    }

    #[test]
    fn test_digest_lists() {
        let digest = sample_digest();

        assert_eq!(digest.tracked_items, 3);
        assert_eq!(digest.mastered, 1);

        assert_eq!(digest.due.len(), 1);
        assert_eq!(digest.due[0].item_id, "two-sum");
        assert_eq!(digest.due[0].interval(), Some(ReviewInterval::ThreeDays));
        assert_eq!(digest.due[0].days_until_due, -6);

        assert_eq!(digest.upcoming.len(), 1);
        assert_eq!(digest.upcoming[0].item_id, "lru-cache");
        assert_eq!(digest.upcoming[0].interval_days, 1);
    }

    #[test]
    fn test_digest_top_mistakes() {
        let digest = sample_digest();

        let ids: Vec<_> = digest.top_mistakes.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["m-1", "m-2"]);
        assert_eq!(digest.top_mistakes[0].failure_count, 2);
    }

    #[test]
    fn test_digest_respects_limits() {
        let config = ReportConfig {
            upcoming_days: 1,
            top_mistakes: 1,
        };
        let digest = ReviewDigest::from_state(&sample_state(), at("2026-06-10T12:00:00Z"), &config);

        assert_eq!(digest.top_mistakes.len(), 1);
        assert_eq!(digest.upcoming.len(), 1);
        assert_eq!(digest.upcoming_days, 1);
    }

    #[test]
    fn test_digest_skips_resolved_mistakes() {
        let mut state = sample_state();
        state.ledger.mark_resolved("m-1");
        let digest =
            ReviewDigest::from_state(&state, at("2026-06-10T12:00:00Z"), &ReportConfig::default());

        assert_eq!(digest.top_mistakes.len(), 1);
        assert_eq!(digest.top_mistakes[0].id, "m-2");
    }

    #[test]
    fn test_digest_streak() {
        let digest = sample_digest();
        assert_eq!(digest.streak.current, 2);
        assert_eq!(
            digest.streak.last_completed,
            Some(NaiveDate::from_ymd_opt(2026, 6, 10).unwrap())
        );

        let later = ReviewDigest::from_state(
            &sample_state(),
            at("2026-06-20T12:00:00Z"),
            &ReportConfig::default(),
        );
        assert_eq!(later.streak.current, 0);
    }

    #[test]
    fn test_digest_from_snapshot_matches_state() {
        let state = sample_state();
        let now = at("2026-06-10T12:00:00Z");
        let snapshot = EngineSnapshot::capture(&state, now);

        assert_eq!(
            ReviewDigest::from_snapshot(&snapshot, now, &ReportConfig::default()),
            ReviewDigest::from_state(&state, now, &ReportConfig::default())
        );
    }

    #[test]
    fn test_empty_state_is_all_clear() {
        let digest = ReviewDigest::from_state(
            &EngineState::new(),
            at("2026-06-10T12:00:00Z"),
            &ReportConfig::default(),
        );
        assert!(digest.is_all_clear());
        assert_eq!(digest.tracked_items, 0);
    }
}
