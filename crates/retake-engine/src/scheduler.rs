//! Bucketed spaced-repetition scheduling.
//!
//! Every practice item carries a [`RetentionRecord`]: the current review
//! interval, when it is next due, the promotion streak and a short history of
//! evaluations. [`schedule`] folds one scored evaluation into a record and
//! [`preview`] computes the same transition without committing it.
//!
//! Intervals move through a fixed ladder of buckets (new, 1, 3, 7, 15 and 30
//! days). Only the first evaluation after an item becomes due moves it along
//! the ladder; evaluations before the due date are recorded in the history
//! but leave the schedule untouched.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::RetakeError;

/// Longest interval the ladder produces, in days.
pub const MAX_INTERVAL_DAYS: u32 = 30;

/// Number of evaluations kept in [`RetentionRecord::history`].
pub const HISTORY_LIMIT: usize = 10;

// ============================================================================
// Quality
// ============================================================================

/// How well the learner performed on an item during one evaluation.
///
/// Serialized as the bare integer score `0..=3`. Scores of 2 and above count
/// as a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Quality {
    /// Could not solve the item.
    Forgot = 0,
    /// Solved with substantial trouble.
    Struggled = 1,
    /// Solved with minor slips.
    Good = 2,
    /// Solved without a single mistake.
    Perfect = 3,
}

impl Quality {
    /// Returns the integer score.
    #[must_use]
    pub const fn value(self) -> u8 {
        self as u8
    }

    /// Returns `true` for scores that promote the item (2 or 3).
    ///
    /// # Examples
    ///
    /// ```
    /// use retake_engine::Quality;
    ///
    /// assert!(Quality::Good.is_pass());
    /// assert!(!Quality::Struggled.is_pass());
    /// ```
    #[must_use]
    pub const fn is_pass(self) -> bool {
        matches!(self, Self::Good | Self::Perfect)
    }

    /// Returns `true` for a flawless evaluation.
    #[must_use]
    pub const fn is_perfect(self) -> bool {
        matches!(self, Self::Perfect)
    }

    /// Scores a finished run from its question and mistake counts.
    ///
    /// No mistakes (or nothing to answer) is perfect; otherwise the share of
    /// correct answers decides: at least 80% is good, at least half is a
    /// struggle, anything lower is forgotten.
    ///
    /// # Examples
    ///
    /// ```
    /// use retake_engine::Quality;
    ///
    /// assert_eq!(Quality::from_run(10, 0), Quality::Perfect);
    /// assert_eq!(Quality::from_run(10, 2), Quality::Good);
    /// assert_eq!(Quality::from_run(10, 5), Quality::Struggled);
    /// assert_eq!(Quality::from_run(10, 6), Quality::Forgot);
    /// ```
    #[must_use]
    pub const fn from_run(question_count: usize, mistake_count: usize) -> Self {
        if mistake_count == 0 || question_count == 0 {
            return Self::Perfect;
        }
        let correct = question_count.saturating_sub(mistake_count);
        if correct * 10 >= question_count * 8 {
            Self::Good
        } else if correct * 2 >= question_count {
            Self::Struggled
        } else {
            Self::Forgot
        }
    }
}

impl TryFrom<u8> for Quality {
    type Error = RetakeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Forgot),
            1 => Ok(Self::Struggled),
            2 => Ok(Self::Good),
            3 => Ok(Self::Perfect),
            _ => Err(RetakeError::InvalidQuality { value }),
        }
    }
}

impl From<Quality> for u8 {
    fn from(quality: Quality) -> Self {
        quality.value()
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value())
    }
}

// ============================================================================
// ReviewInterval
// ============================================================================

/// One rung of the interval ladder.
///
/// Serialized as the day count. Deserializing any other number fails, so a
/// persisted record can never hold an off-ladder interval.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "u32", into = "u32")]
pub enum ReviewInterval {
    /// Never evaluated.
    #[default]
    New,
    /// 1 day.
    OneDay,
    /// 3 days.
    ThreeDays,
    /// 7 days.
    OneWeek,
    /// 15 days.
    TwoWeeks,
    /// 30 days, the ceiling.
    OneMonth,
}

impl ReviewInterval {
    /// Length of the interval in days.
    #[must_use]
    pub const fn days(self) -> u32 {
        match self {
            Self::New => 0,
            Self::OneDay => 1,
            Self::ThreeDays => 3,
            Self::OneWeek => 7,
            Self::TwoWeeks => 15,
            Self::OneMonth => MAX_INTERVAL_DAYS,
        }
    }

    /// Looks up the rung for an exact day count.
    #[must_use]
    pub const fn from_days(days: u32) -> Option<Self> {
        match days {
            0 => Some(Self::New),
            1 => Some(Self::OneDay),
            3 => Some(Self::ThreeDays),
            7 => Some(Self::OneWeek),
            15 => Some(Self::TwoWeeks),
            30 => Some(Self::OneMonth),
            _ => None,
        }
    }

    /// The interval that follows a due evaluation of the given quality.
    ///
    /// | current      | pass | fail |
    /// |--------------|------|------|
    /// | new, 1 day   | 3    | 1    |
    /// | 3 days       | 7    | 1    |
    /// | 7, 15 days   | 15   | 3    |
    /// | 30 days      | 30   | 7    |
    ///
    /// The one place a perfect score differs from a plain pass is the
    /// 15-day rung, where it promotes to 30 days. The ladder tops out at
    /// [`MAX_INTERVAL_DAYS`].
    #[must_use]
    pub const fn next(self, quality: Quality) -> Self {
        let pass = quality.is_pass();
        match self {
            Self::New | Self::OneDay => {
                if pass {
                    Self::ThreeDays
                } else {
                    Self::OneDay
                }
            }
            Self::ThreeDays => {
                if pass {
                    Self::OneWeek
                } else {
                    Self::OneDay
                }
            }
            Self::TwoWeeks if quality.is_perfect() => Self::OneMonth,
            Self::OneWeek | Self::TwoWeeks => {
                if pass {
                    Self::TwoWeeks
                } else {
                    Self::ThreeDays
                }
            }
            Self::OneMonth => {
                if pass {
                    Self::OneMonth
                } else {
                    Self::OneWeek
                }
            }
        }
    }

    /// Returns `true` at the top of the ladder.
    #[must_use]
    pub const fn is_mastered(self) -> bool {
        matches!(self, Self::OneMonth)
    }

    /// The interval as a chrono duration.
    #[must_use]
    pub fn as_duration(self) -> Duration {
        Duration::days(i64::from(self.days()))
    }
}

impl TryFrom<u32> for ReviewInterval {
    type Error = RetakeError;

    fn try_from(days: u32) -> Result<Self, Self::Error> {
        Self::from_days(days).ok_or(RetakeError::InvalidInterval { days })
    }
}

impl From<ReviewInterval> for u32 {
    fn from(interval: ReviewInterval) -> Self {
        interval.days()
    }
}

impl fmt::Display for ReviewInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::New => write!(f, "new"),
            Self::OneDay => write!(f, "1 day"),
            other => write!(f, "{} days", other.days()),
        }
    }
}

// ============================================================================
// RetentionRecord
// ============================================================================

/// One evaluation in a record's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewEntry {
    /// When the evaluation happened.
    pub at: DateTime<Utc>,
    /// The score it received.
    pub quality: Quality,
    /// Seconds the learner spent on the run.
    pub time_spent_secs: u32,
}

/// Spaced-repetition schedule for a single practice item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetentionRecord {
    /// The practice item this schedule belongs to.
    pub item_id: String,
    /// When the item was last evaluated, due or not.
    pub last_review: DateTime<Utc>,
    /// When the item becomes due again.
    pub next_review: DateTime<Utc>,
    /// Current rung of the interval ladder.
    pub interval: ReviewInterval,
    /// Consecutive due evaluations that passed.
    pub streak: u32,
    /// Most recent evaluations, oldest first, at most [`HISTORY_LIMIT`].
    #[serde(default)]
    pub history: Vec<ReviewEntry>,
}

impl RetentionRecord {
    /// Returns `true` once `next_review` has been reached.
    #[must_use]
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_review <= now
    }

    /// Whole days until the item is due; negative when overdue.
    #[must_use]
    pub fn days_until_due(&self, now: DateTime<Utc>) -> i64 {
        (self.next_review - now).num_days()
    }

    /// Returns `true` when the item sits at the 30-day ceiling.
    #[must_use]
    pub const fn is_mastered(&self) -> bool {
        self.interval.is_mastered()
    }

    fn push_history(&mut self, entry: ReviewEntry) {
        self.history.push(entry);
        if self.history.len() > HISTORY_LIMIT {
            let excess = self.history.len() - HISTORY_LIMIT;
            self.history.drain(..excess);
        }
    }
}

// ============================================================================
// Transitions
// ============================================================================

/// Outcome of an evaluation, computed before it is committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulePreview {
    /// Whether the evaluation would move the schedule.
    pub due: bool,
    /// Interval after the evaluation.
    pub interval: ReviewInterval,
    /// Next due date after the evaluation.
    pub next_review: DateTime<Utc>,
    /// Streak after the evaluation.
    pub streak: u32,
}

impl SchedulePreview {
    /// Whole days from `now` until the resulting due date.
    #[must_use]
    pub fn days_until_next(&self, now: DateTime<Utc>) -> i64 {
        (self.next_review - now).num_days()
    }
}

/// Computes the transition shared by [`preview`] and [`schedule`].
///
/// A missing record or one whose due date has passed is evaluated in due
/// mode; anything else is early practice and keeps its schedule.
#[must_use]
pub fn preview(
    record: Option<&RetentionRecord>,
    quality: Quality,
    now: DateTime<Utc>,
) -> SchedulePreview {
    match record {
        Some(record) if !record.is_due(now) => SchedulePreview {
            due: false,
            interval: record.interval,
            next_review: record.next_review,
            streak: record.streak,
        },
        _ => {
            let current = record.map_or(ReviewInterval::New, |r| r.interval);
            let interval = current.next(quality);
            let streak = if quality.is_pass() {
                record.map_or(0, |r| r.streak) + 1
            } else {
                0
            };
            SchedulePreview {
                due: true,
                interval,
                next_review: now + interval.as_duration(),
                streak,
            }
        }
    }
}

/// Folds one scored evaluation into an item's schedule.
///
/// Returns the updated record (a new one when `record` is `None`). The
/// history always grows and `last_review` always moves to `now`; interval,
/// due date and streak only change in due mode.
///
/// # Examples
///
/// ```
/// use chrono::Utc;
/// use retake_engine::{schedule, Quality, ReviewInterval};
///
/// let now = Utc::now();
/// let record = schedule("lru-cache", None, Quality::Good, now, 300);
/// assert_eq!(record.interval, ReviewInterval::ThreeDays);
/// assert_eq!(record.streak, 1);
/// assert_eq!(record.history.len(), 1);
/// ```
#[must_use]
pub fn schedule(
    item_id: &str,
    record: Option<&RetentionRecord>,
    quality: Quality,
    now: DateTime<Utc>,
    time_spent_secs: u32,
) -> RetentionRecord {
    let outcome = preview(record, quality, now);

    let mut updated = record.cloned().unwrap_or_else(|| RetentionRecord {
        item_id: item_id.to_string(),
        last_review: now,
        next_review: now,
        interval: ReviewInterval::New,
        streak: 0,
        history: Vec::new(),
    });

    updated.interval = outcome.interval;
    updated.next_review = outcome.next_review;
    updated.streak = outcome.streak;
    updated.last_review = now;
    updated.push_history(ReviewEntry {
        at: now,
        quality,
        time_spent_secs,
    });

    debug!(
        item_id = %updated.item_id,
        quality = quality.value(),
        due = outcome.due,
        interval = updated.interval.days(),
        streak = updated.streak,
        "Scheduled evaluation"
    );

    updated
}

// ============================================================================
// RetentionSchedule
// ============================================================================

/// All retention records owned by one learner, keyed by item id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetentionSchedule {
    records: BTreeMap<String, RetentionRecord>,
}

impl RetentionSchedule {
    /// Creates an empty schedule.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a schedule from previously persisted records.
    pub fn from_records(records: impl IntoIterator<Item = RetentionRecord>) -> Self {
        Self {
            records: records
                .into_iter()
                .map(|record| (record.item_id.clone(), record))
                .collect(),
        }
    }

    /// Returns the record for an item, if it has ever been evaluated.
    #[must_use]
    pub fn get(&self, item_id: &str) -> Option<&RetentionRecord> {
        self.records.get(item_id)
    }

    /// Commits an evaluation and returns the item's updated record.
    pub fn record(
        &mut self,
        item_id: &str,
        quality: Quality,
        now: DateTime<Utc>,
        time_spent_secs: u32,
    ) -> &RetentionRecord {
        let updated = schedule(item_id, self.records.get(item_id), quality, now, time_spent_secs);
        match self.records.entry(item_id.to_string()) {
            Entry::Occupied(mut slot) => {
                slot.insert(updated);
                slot.into_mut()
            }
            Entry::Vacant(slot) => slot.insert(updated),
        }
    }

    /// Computes what [`Self::record`] would do without changing anything.
    #[must_use]
    pub fn preview(&self, item_id: &str, quality: Quality, now: DateTime<Utc>) -> SchedulePreview {
        preview(self.records.get(item_id), quality, now)
    }

    /// Items due at `now`, most overdue first.
    #[must_use]
    pub fn due_items(&self, now: DateTime<Utc>) -> Vec<&RetentionRecord> {
        let mut due: Vec<_> = self.records.values().filter(|r| r.is_due(now)).collect();
        due.sort_by(|a, b| a.next_review.cmp(&b.next_review));
        due
    }

    /// Items that are not yet due but will be within `window`, soonest first.
    #[must_use]
    pub fn upcoming(&self, now: DateTime<Utc>, window: Duration) -> Vec<&RetentionRecord> {
        let horizon = now + window;
        let mut upcoming: Vec<_> = self
            .records
            .values()
            .filter(|r| !r.is_due(now) && r.next_review <= horizon)
            .collect();
        upcoming.sort_by(|a, b| a.next_review.cmp(&b.next_review));
        upcoming
    }

    /// Number of items at the 30-day ceiling.
    #[must_use]
    pub fn mastered_count(&self) -> usize {
        self.records.values().filter(|r| r.is_mastered()).count()
    }

    /// Iterates over all records in item id order.
    pub fn iter(&self) -> impl Iterator<Item = &RetentionRecord> {
        self.records.values()
    }

    /// Number of tracked items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` when no item has been evaluated yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Consumes the schedule, yielding its records in item id order.
    #[must_use]
    pub fn into_records(self) -> Vec<RetentionRecord> {
        self.records.into_values().collect()
    }
}

// ============================================================================
// Tests
// ============================================================================
