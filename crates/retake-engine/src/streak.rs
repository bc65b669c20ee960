//! Daily streak tracking.
//!
//! The engine remembers the calendar day (UTC) of the last completed run.
//! The first completed run of a new day earns a celebration and extends the
//! streak when the previous completion was the day before.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Persisted last-completed-date marker plus the running day count.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyStreak {
    /// Day of the most recent completed run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_completed: Option<NaiveDate>,
    /// Consecutive days ending at `last_completed`.
    #[serde(default)]
    pub count: u32,
}

/// What a run needs to know about the streak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreakStatus {
    /// Whether no run has been completed yet today.
    pub first_run_today: bool,
    /// Streak length the learner will see if they finish today.
    pub count_if_completed: u32,
}

impl DailyStreak {
    /// Returns `true` if nothing has been completed on `today` yet.
    ///
    /// # Examples
    ///
    /// ```
    /// use chrono::NaiveDate;
    /// use retake_engine::DailyStreak;
    ///
    /// let today = NaiveDate::from_ymd_opt(2026, 3, 9).unwrap();
    /// let mut streak = DailyStreak::default();
    /// assert!(streak.is_first_run_on(today));
    /// streak.record_completion(today);
    /// assert!(!streak.is_first_run_on(today));
    /// ```
    #[must_use]
    pub fn is_first_run_on(&self, today: NaiveDate) -> bool {
        self.last_completed.map_or(true, |last| last < today)
    }

    /// Streak still alive on `today`: zero once a whole day was skipped.
    #[must_use]
    pub fn current(&self, today: NaiveDate) -> u32 {
        match self.last_completed {
            Some(last) if last == today || continues_into(last, today) => self.count,
            _ => 0,
        }
    }

    /// Status of the streak as seen at `now`.
    #[must_use]
    pub fn status_at(&self, now: DateTime<Utc>) -> StreakStatus {
        let today = now.date_naive();
        let first_run_today = self.is_first_run_on(today);
        let count_if_completed = if first_run_today {
            self.current(today) + 1
        } else {
            self.count
        };
        StreakStatus {
            first_run_today,
            count_if_completed,
        }
    }

    /// Records a completed run on `today` and returns the streak delta (0 or 1).
    pub fn record_completion(&mut self, today: NaiveDate) -> u32 {
        if !self.is_first_run_on(today) {
            return 0;
        }
        self.count = match self.last_completed {
            Some(last) if continues_into(last, today) => self.count.saturating_add(1),
            _ => 1,
        };
        self.last_completed = Some(today);
        1
    }
}

fn continues_into(last: NaiveDate, today: NaiveDate) -> bool {
    last.succ_opt() == Some(today)
}
