//! The run state machine.
//!
//! A [`RunSession`] drives one practice run of one item:
//!
//! ```text
//! active ──► repair_intro ──► repair_loop ──► summary ──► celebration ──► exit
//!    │                                          ▲  │  ▲                    ▲
//!    └──────────────────────────────────────────┘  │  └── redo / restart   │
//!                                                  └───────────────────────┘
//! ```
//!
//! Every phase also accepts `abort`, which exits without persisting. The
//! completion callback fires exactly once, when the session exits.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::RunConfig;
use crate::content::{Check, LessonContent, Validator};
use crate::error::{Result, RetakeError};
use crate::ledger::MistakeRecord;
use crate::scheduler::Quality;
use crate::streak::StreakStatus;

// ============================================================================
// RunPhase
// ============================================================================

/// Phase of a practice run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    /// Lesson screens are being worked through.
    #[default]
    Active,
    /// Confirmation before replaying the failed checks.
    RepairIntro,
    /// Failed checks are replayed one per screen.
    RepairLoop,
    /// Results are shown; the learner picks redo or continue.
    Summary,
    /// First completion of the day.
    Celebration,
}

impl RunPhase {
    /// The snake_case name of the phase.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::RepairIntro => "repair_intro",
            Self::RepairLoop => "repair_loop",
            Self::Summary => "summary",
            Self::Celebration => "celebration",
        }
    }

    /// Returns `true` while a screen with a check may be on display.
    ///
    /// # Examples
    ///
    /// ```
    /// use retake_engine::RunPhase;
    ///
    /// assert!(RunPhase::Active.is_answering());
    /// assert!(RunPhase::RepairLoop.is_answering());
    /// assert!(!RunPhase::Summary.is_answering());
    /// ```
    #[must_use]
    pub const fn is_answering(self) -> bool {
        matches!(self, Self::Active | Self::RepairLoop)
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// RunMode
// ============================================================================

/// Why the run was opened.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// Regular practice; failures lead into the repair loop.
    #[default]
    Practice,
    /// A scheduled review opened by the queue.
    Review,
    /// A run that is itself a correction pass.
    Repair,
}

impl RunMode {
    /// Only plain practice runs branch into repair.
    #[must_use]
    pub const fn allows_repair(self) -> bool {
        matches!(self, Self::Practice)
    }
}

// ============================================================================
// RunEvent and Step
// ============================================================================

/// Learner actions fed into a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum RunEvent {
    /// Grade the current screen's check against `input`.
    Answer {
        /// The learner's answer.
        input: Value,
    },
    /// Move past the current screen.
    Advance,
    /// Leave the repair intro and start replaying failed checks.
    StartRepair,
    /// Reject the results and ask for fresh content.
    Redo,
    /// Accept the results.
    Continue,
    /// Dismiss the celebration.
    FinishCelebration,
    /// Discard the run.
    Abort,
}

impl RunEvent {
    /// Name used in logs and transition errors.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Answer { .. } => "answer",
            Self::Advance => "advance",
            Self::StartRepair => "start_repair",
            Self::Redo => "redo",
            Self::Continue => "continue",
            Self::FinishCelebration => "finish_celebration",
            Self::Abort => "abort",
        }
    }
}

/// Outcome of feeding one event into a session.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// The check was graded; `None` means the answer could not be judged.
    Graded {
        /// Whether the answer was right.
        correct: Option<bool>,
    },
    /// The session is now (or still) in this phase.
    Phase(RunPhase),
    /// The learner asked for a redo; fetch new content and call
    /// [`RunSession::restart`].
    Regenerate,
    /// The run is over and the completion callback has fired.
    Exit(RunExit),
}

// ============================================================================
// Stats
// ============================================================================

/// Live counters while a run is in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStats {
    /// Whole seconds since the run (or its latest restart) began.
    pub elapsed_secs: u32,
    /// Failures recorded so far.
    pub mistake_count: usize,
    /// XP earned so far.
    pub xp: u32,
}

/// Figures shown on the summary screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    /// Whole seconds spent in the run.
    pub elapsed_secs: u32,
    /// Content screens, plus the replayed checks if a repair loop ran.
    pub question_count: usize,
    /// Approximated as `question_count - mistake_count`.
    pub correct_count: usize,
    /// Failures recorded during the active phase.
    pub mistake_count: usize,
    /// XP for the run.
    pub xp: u32,
    /// Whether the repair loop was entered.
    pub repaired: bool,
}

impl RunSummary {
    /// The retention quality this run earns.
    #[must_use]
    pub const fn quality(&self) -> Quality {
        Quality::from_run(self.question_count, self.mistake_count)
    }
}

/// Payload passed to the completion callback.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionStats {
    /// XP earned.
    pub xp: u32,
    /// 1 when this run extended the daily streak, else 0.
    pub streak_delta: u32,
}

/// Everything a finished run hands back to its owner.
#[derive(Debug, Clone, PartialEq)]
pub struct RunExit {
    /// The item that was practiced.
    pub item_id: String,
    /// Why the run was opened.
    pub mode: RunMode,
    /// XP and streak movement.
    pub stats: CompletionStats,
    /// `false` when the learner aborted.
    pub should_persist: bool,
    /// Failures to fold into the ledger.
    pub session_mistakes: Vec<MistakeRecord>,
    /// Summary figures, absent when the run was aborted.
    pub summary: Option<RunSummary>,
    /// When the run ended.
    pub finished_at: DateTime<Utc>,
}

impl RunExit {
    /// Quality score to commit to the scheduler, if the run should persist.
    #[must_use]
    pub fn quality(&self) -> Option<Quality> {
        self.summary
            .filter(|_| self.should_persist)
            .map(|summary| summary.quality())
    }

    /// Time to record in the retention history.
    #[must_use]
    pub fn time_spent_secs(&self) -> u32 {
        self.summary.map_or(0, |s| s.elapsed_secs)
    }
}

/// Caller-supplied hook invoked once when a run exits:
/// `(stats, should_persist, session_mistakes)`.
pub type CompletionCallback = Box<dyn FnOnce(CompletionStats, bool, &[MistakeRecord]) + Send>;

// ============================================================================
// RunSession
// ============================================================================

/// Grade recorded for the screen currently on display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Grade {
    Correct,
    Incorrect,
    Ungradable,
}

/// State of one practice run.
pub struct RunSession {
    item_id: String,
    mode: RunMode,
    content: LessonContent,
    validator: Arc<dyn Validator + Send + Sync>,
    settings: RunConfig,
    streak: StreakStatus,
    phase: RunPhase,
    stage: u32,
    cursor: usize,
    grade: Option<Grade>,
    session_mistakes: Vec<MistakeRecord>,
    failed_checks: Vec<Check>,
    repair_plan: Vec<Check>,
    repair_correct: u32,
    repaired: bool,
    started_at: DateTime<Utc>,
    summary: Option<RunSummary>,
    on_complete: Option<CompletionCallback>,
    exited: bool,
}

impl fmt::Debug for RunSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunSession")
            .field("item_id", &self.item_id)
            .field("mode", &self.mode)
            .field("phase", &self.phase)
            .field("stage", &self.stage)
            .field("cursor", &self.cursor)
            .field("session_mistakes", &self.session_mistakes.len())
            .field("exited", &self.exited)
            .finish_non_exhaustive()
    }
}

impl RunSession {
    /// Opens a run in the `active` phase.
    #[must_use]
    pub fn new(
        item_id: impl Into<String>,
        mode: RunMode,
        content: LessonContent,
        validator: Arc<dyn Validator + Send + Sync>,
        now: DateTime<Utc>,
    ) -> Self {
        let session = Self {
            item_id: item_id.into(),
            mode,
            content,
            validator,
            settings: RunConfig::default(),
            streak: StreakStatus {
                first_run_today: false,
                count_if_completed: 0,
            },
            phase: RunPhase::Active,
            stage: 0,
            cursor: 0,
            grade: None,
            session_mistakes: Vec::new(),
            failed_checks: Vec::new(),
            repair_plan: Vec::new(),
            repair_correct: 0,
            repaired: false,
            started_at: now,
            summary: None,
            on_complete: None,
            exited: false,
        };
        info!(
            item_id = %session.item_id,
            mode = ?session.mode,
            screens = session.content.screens.len(),
            "Run started"
        );
        session
    }

    /// Overrides the XP and celebration settings.
    #[must_use]
    pub fn with_settings(mut self, settings: RunConfig) -> Self {
        self.settings = settings;
        self
    }

    /// Supplies the daily streak status used by the celebration phase.
    #[must_use]
    pub const fn with_streak(mut self, streak: StreakStatus) -> Self {
        self.streak = streak;
        self
    }

    /// Replaces the streak status of an open run.
    ///
    /// The status is read when `continue` is handled, so a run that crosses
    /// midnight can be refreshed before it is accepted.
    pub fn set_streak(&mut self, streak: StreakStatus) {
        self.streak = streak;
    }

    /// Registers the completion callback.
    #[must_use]
    pub fn on_complete(
        mut self,
        callback: impl FnOnce(CompletionStats, bool, &[MistakeRecord]) + Send + 'static,
    ) -> Self {
        self.on_complete = Some(Box::new(callback));
        self
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    /// The item being practiced.
    #[must_use]
    pub fn item_id(&self) -> &str {
        &self.item_id
    }

    /// Why the run was opened.
    #[must_use]
    pub const fn mode(&self) -> RunMode {
        self.mode
    }

    /// Current phase.
    #[must_use]
    pub const fn phase(&self) -> RunPhase {
        self.phase
    }

    /// Content stage: 0, plus one per redo.
    #[must_use]
    pub const fn stage(&self) -> u32 {
        self.stage
    }

    /// Returns `true` once the session has exited.
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        self.exited
    }

    /// Failures recorded so far, in the order they happened.
    #[must_use]
    pub fn session_mistakes(&self) -> &[MistakeRecord] {
        &self.session_mistakes
    }

    /// Corrections awaiting the learner, as shown on the repair intro.
    #[must_use]
    pub fn pending_repairs(&self) -> usize {
        match self.phase {
            RunPhase::RepairIntro => plan_repairs(&self.failed_checks).len(),
            RunPhase::RepairLoop => self.repair_plan.len().saturating_sub(self.cursor),
            _ => 0,
        }
    }

    /// The check on display, if any.
    #[must_use]
    pub fn current_check(&self) -> Option<&Check> {
        match self.phase {
            RunPhase::Active => self
                .content
                .screens
                .get(self.cursor)
                .and_then(|screen| screen.check.as_ref()),
            RunPhase::RepairLoop => self.repair_plan.get(self.cursor),
            _ => None,
        }
    }

    /// Number of lesson screens in the current content.
    #[must_use]
    pub fn screen_count(&self) -> usize {
        self.content.screens.len()
    }

    /// Index of the screen on display within the current phase.
    #[must_use]
    pub const fn position(&self) -> usize {
        self.cursor
    }

    /// Current streak status.
    #[must_use]
    pub const fn streak(&self) -> StreakStatus {
        self.streak
    }

    /// Summary figures once the run reached `summary`.
    #[must_use]
    pub const fn summary(&self) -> Option<&RunSummary> {
        self.summary.as_ref()
    }

    /// Live counters.
    #[must_use]
    pub fn stats(&self, now: DateTime<Utc>) -> RunStats {
        RunStats {
            elapsed_secs: self.elapsed_secs(now),
            mistake_count: self.session_mistakes.len(),
            xp: self.xp_so_far(),
        }
    }

    // ------------------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------------------

    /// Applies an event at the current wall-clock time.
    ///
    /// # Errors
    ///
    /// See [`Self::handle_at`].
    pub fn handle(&mut self, event: RunEvent) -> Result<Step> {
        self.handle_at(event, Utc::now())
    }

    /// Applies an event as if it happened at `now`.
    ///
    /// # Errors
    ///
    /// Returns `RetakeError::NoActiveRun` after the session has exited and
    /// `RetakeError::InvalidStateTransition` when the current phase does not
    /// accept the event. A rejected event leaves the session untouched.
    pub fn handle_at(&mut self, event: RunEvent, now: DateTime<Utc>) -> Result<Step> {
        if self.exited {
            return Err(RetakeError::NoActiveRun);
        }

        let result = match (self.phase, event) {
            (_, RunEvent::Abort) => Ok(self.abort(now)),
            (phase, RunEvent::Answer { input }) if phase.is_answering() => self.answer(&input, now),
            (phase, RunEvent::Advance) if phase.is_answering() => self.advance(now),
            (RunPhase::RepairIntro, RunEvent::StartRepair) => Ok(self.start_repair()),
            (RunPhase::Summary, RunEvent::Redo) => {
                info!(item_id = %self.item_id, stage = self.stage, "Redo requested");
                Ok(Step::Regenerate)
            }
            (RunPhase::Summary, RunEvent::Continue) => Ok(self.accept(now)),
            (RunPhase::Celebration, RunEvent::FinishCelebration) => Ok(self.exit(now, 1, true)),
            (phase, event) => Err(RetakeError::invalid_transition(phase, event.name())),
        };

        if let Err(e) = &result {
            warn!(item_id = %self.item_id, phase = %self.phase, error = %e, "Rejected run event");
        }
        result
    }

    /// Starts the run over with regenerated content after a redo.
    ///
    /// # Errors
    ///
    /// Returns `RetakeError::InvalidStateTransition` unless the session is in
    /// `summary`.
    pub fn restart(&mut self, content: LessonContent, now: DateTime<Utc>) -> Result<()> {
        if self.exited {
            return Err(RetakeError::NoActiveRun);
        }
        if self.phase != RunPhase::Summary {
            return Err(RetakeError::invalid_transition(self.phase, RunPhase::Active));
        }

        self.content = content;
        self.stage += 1;
        self.phase = RunPhase::Active;
        self.cursor = 0;
        self.grade = None;
        self.session_mistakes.clear();
        self.failed_checks.clear();
        self.repair_plan.clear();
        self.repair_correct = 0;
        self.repaired = false;
        self.started_at = now;
        self.summary = None;

        info!(item_id = %self.item_id, stage = self.stage, "Run restarted");
        Ok(())
    }

    fn answer(&mut self, input: &Value, now: DateTime<Utc>) -> Result<Step> {
        if self.grade.is_some() {
            return Err(RetakeError::invalid_transition(self.phase, "answer (already graded)"));
        }
        let Some(check) = self.current_check().filter(|c| c.is_interactive()).cloned() else {
            return Err(RetakeError::invalid_transition(self.phase, "answer (no check)"));
        };

        let verdict = self.validator.validate(&check, input);
        self.grade = Some(match verdict {
            Some(true) => Grade::Correct,
            Some(false) => Grade::Incorrect,
            None => Grade::Ungradable,
        });
        debug!(
            item_id = %self.item_id,
            phase = %self.phase,
            position = self.cursor,
            kind = %check.kind,
            correct = ?verdict,
            "Check graded"
        );

        match (self.phase, verdict) {
            (RunPhase::Active, Some(false)) => {
                let mut mistake = MistakeRecord::new(&self.item_id, check.kind, &check.prompt, now);
                if let Some(widget) = &check.widget {
                    mistake = mistake.with_snapshot(widget.clone());
                }
                self.session_mistakes.push(mistake);
                self.failed_checks.push(check);
            }
            (RunPhase::RepairLoop, Some(true)) => self.repair_correct += 1,
            _ => {}
        }

        Ok(Step::Graded { correct: verdict })
    }

    fn advance(&mut self, now: DateTime<Utc>) -> Result<Step> {
        let needs_grade = self.current_check().is_some_and(Check::is_interactive);
        if needs_grade && self.grade.is_none() {
            return Err(RetakeError::invalid_transition(self.phase, "advance (ungraded check)"));
        }

        self.cursor += 1;
        self.grade = None;

        let screens = match self.phase {
            RunPhase::RepairLoop => self.repair_plan.len(),
            _ => self.content.screens.len(),
        };
        if self.cursor < screens {
            return Ok(Step::Phase(self.phase));
        }

        let next = if self.phase == RunPhase::Active
            && !self.session_mistakes.is_empty()
            && self.mode.allows_repair()
        {
            RunPhase::RepairIntro
        } else {
            self.summary = Some(self.summarize(now));
            RunPhase::Summary
        };
        Ok(Step::Phase(self.enter(next)))
    }

    fn start_repair(&mut self) -> Step {
        self.repair_plan = plan_repairs(&self.failed_checks);
        self.repaired = true;
        self.cursor = 0;
        self.grade = None;
        Step::Phase(self.enter(RunPhase::RepairLoop))
    }

    fn accept(&mut self, now: DateTime<Utc>) -> Step {
        if self.settings.celebrate_daily_streak && self.streak.first_run_today {
            Step::Phase(self.enter(RunPhase::Celebration))
        } else {
            self.exit(now, u32::from(self.streak.first_run_today), true)
        }
    }

    fn abort(&mut self, now: DateTime<Utc>) -> Step {
        self.session_mistakes.clear();
        self.summary = None;
        self.exit(now, 0, false)
    }

    fn enter(&mut self, phase: RunPhase) -> RunPhase {
        debug!(item_id = %self.item_id, from = %self.phase, to = %phase, "Phase changed");
        self.phase = phase;
        phase
    }

    fn exit(&mut self, now: DateTime<Utc>, streak_delta: u32, should_persist: bool) -> Step {
        self.exited = true;
        let stats = CompletionStats {
            xp: if should_persist {
                self.summary.map_or(0, |s| s.xp)
            } else {
                0
            },
            streak_delta,
        };
        let exit = RunExit {
            item_id: self.item_id.clone(),
            mode: self.mode,
            stats,
            should_persist,
            session_mistakes: std::mem::take(&mut self.session_mistakes),
            summary: self.summary,
            finished_at: now,
        };

        info!(
            item_id = %exit.item_id,
            persist = should_persist,
            xp = stats.xp,
            streak_delta,
            mistakes = exit.session_mistakes.len(),
            "Run finished"
        );

        if let Some(callback) = self.on_complete.take() {
            callback(stats, should_persist, &exit.session_mistakes);
        }
        Step::Exit(exit)
    }

    fn summarize(&self, now: DateTime<Utc>) -> RunSummary {
        let mistake_count = self.session_mistakes.len();
        let question_count =
            self.content.screens.len() + if self.repaired { mistake_count } else { 0 };
        RunSummary {
            elapsed_secs: self.elapsed_secs(now),
            question_count,
            correct_count: question_count.saturating_sub(mistake_count),
            mistake_count,
            xp: self.xp_so_far(),
            repaired: self.repaired,
        }
    }

    fn xp_so_far(&self) -> u32 {
        let screens = u32::try_from(self.content.screens.len()).unwrap_or(u32::MAX);
        screens
            .saturating_mul(self.settings.xp_per_screen)
            .saturating_add(self.repair_correct.saturating_mul(self.settings.xp_per_repair))
    }

    fn elapsed_secs(&self, now: DateTime<Utc>) -> u32 {
        let secs = (now - self.started_at).num_seconds().max(0);
        u32::try_from(secs).unwrap_or(u32::MAX)
    }
}

/// Checks to replay in the repair loop.
///
/// Non-interactive kinds are dropped unless that would leave nothing, in
/// which case every failed check is replayed.
#[must_use]
pub fn plan_repairs(failed: &[Check]) -> Vec<Check> {
    let interactive: Vec<Check> = failed.iter().filter(|c| c.is_interactive()).cloned().collect();
    if interactive.is_empty() {
        failed.to_vec()
    } else {
        interactive
    }
}

// ============================================================================
// Tests
// ============================================================================
