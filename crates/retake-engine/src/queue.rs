//! The queue orchestrator.
//!
//! Sequences practice runs over a FIFO list of items. Exactly one
//! [`RunSession`] is open at a time; the next item opens only after the
//! previous run has exited, and each persisted exit is folded into the
//! caller's [`EngineState`] before the queue moves on.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::config::Config;
use crate::content::{ContentProvider, ContentRequest, LessonContent, Validator};
use crate::error::{Result, RetakeError};
use crate::events::{EngineEvent, EventBroadcaster};
use crate::ledger::{MergeReport, MistakeLedger};
use crate::run_state::{RunEvent, RunExit, RunMode, RunSession, Step};
use crate::scheduler::{Quality, RetentionSchedule};
use crate::streak::DailyStreak;

// ============================================================================
// EngineState
// ============================================================================

/// Everything the engine remembers between sessions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineState {
    /// Accumulated mistakes.
    pub ledger: MistakeLedger,
    /// Per-item retention records.
    pub schedule: RetentionSchedule,
    /// Daily completion marker.
    pub streak: DailyStreak,
}

/// What folding one run changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FoldOutcome {
    /// Quality committed to the scheduler.
    pub quality: Quality,
    /// Ledger changes.
    pub mistakes: MergeReport,
    /// Streak movement (0 or 1).
    pub streak_delta: u32,
}

impl EngineState {
    /// Creates an empty state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds a finished run into the ledger, schedule and streak.
    ///
    /// Returns `None` (and changes nothing) for aborted runs.
    pub fn apply_exit(&mut self, exit: &RunExit) -> Option<FoldOutcome> {
        let quality = exit.quality()?;
        let mistakes = self.ledger.merge(&exit.session_mistakes);
        self.schedule
            .record(&exit.item_id, quality, exit.finished_at, exit.time_spent_secs());
        let streak_delta = self.streak.record_completion(exit.finished_at.date_naive());
        Some(FoldOutcome {
            quality,
            mistakes,
            streak_delta,
        })
    }
}

// ============================================================================
// ReviewQueue
// ============================================================================

/// Item ids awaiting sequential practice, front first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReviewQueue {
    items: VecDeque<String>,
}

impl ReviewQueue {
    /// Builds a queue in the given order.
    pub fn new<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            items: items.into_iter().map(Into::into).collect(),
        }
    }

    /// The item currently being (or about to be) practiced.
    #[must_use]
    pub fn front(&self) -> Option<&str> {
        self.items.front().map(String::as_str)
    }

    /// Drops the front item.
    pub fn pop_front(&mut self) -> Option<String> {
        self.items.pop_front()
    }

    /// Items still queued, including the front.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` once every item has been handled.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Iterates over the queued ids, front first.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.items.iter().map(String::as_str)
    }
}

// ============================================================================
// QueueOrchestrator
// ============================================================================

/// Runs a [`ReviewQueue`] to completion, one item at a time.
pub struct QueueOrchestrator<P> {
    provider: P,
    validator: Arc<dyn Validator + Send + Sync>,
    config: Config,
    state: EngineState,
    queue: ReviewQueue,
    active: Option<RunSession>,
    completed: usize,
    events: EventBroadcaster,
}

impl<P: ContentProvider> QueueOrchestrator<P> {
    /// Creates an idle orchestrator over the caller's state.
    #[must_use]
    pub fn new(
        provider: P,
        validator: Arc<dyn Validator + Send + Sync>,
        state: EngineState,
        config: Config,
    ) -> Self {
        Self {
            provider,
            validator,
            config,
            state,
            queue: ReviewQueue::default(),
            active: None,
            completed: 0,
            events: EventBroadcaster::default(),
        }
    }

    /// The event stream.
    #[must_use]
    pub const fn events(&self) -> &EventBroadcaster {
        &self.events
    }

    /// Current engine state.
    #[must_use]
    pub const fn state(&self) -> &EngineState {
        &self.state
    }

    /// Hands the state back, e.g. for persisting.
    #[must_use]
    pub fn into_state(self) -> EngineState {
        self.state
    }

    /// Items not yet finished, the active one first.
    #[must_use]
    pub const fn queue(&self) -> &ReviewQueue {
        &self.queue
    }

    /// The open run, if any.
    #[must_use]
    pub const fn active(&self) -> Option<&RunSession> {
        self.active.as_ref()
    }

    /// Replaces the queue and opens a run for its first item now.
    ///
    /// # Errors
    ///
    /// See [`Self::start_queue_at`].
    pub async fn start_queue<I, S>(&mut self, item_ids: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.start_queue_at(item_ids, Utc::now()).await
    }

    /// Replaces the queue and opens a run for its first item at `now`.
    ///
    /// # Errors
    ///
    /// Returns `RetakeError::RunAlreadyActive` if a run is still open and
    /// `RetakeError::ContentUnavailable` if the first lesson cannot be
    /// fetched; in that case the item stays queued for [`Self::resume_at`].
    pub async fn start_queue_at<I, S>(&mut self, item_ids: I, now: DateTime<Utc>) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if let Some(session) = &self.active {
            return Err(RetakeError::run_already_active(session.item_id()));
        }
        self.queue = ReviewQueue::new(item_ids);
        self.completed = 0;
        info!(items = self.queue.len(), "Review queue started");

        if self.queue.is_empty() {
            self.events.send(EngineEvent::queue_drained(0));
            return Ok(());
        }
        self.open_front(now).await
    }

    /// Retries opening the front item after a failed fetch.
    ///
    /// # Errors
    ///
    /// See [`Self::resume_at`].
    pub async fn resume(&mut self) -> Result<()> {
        self.resume_at(Utc::now()).await
    }

    /// Retries opening the front item at `now`.
    ///
    /// # Errors
    ///
    /// Same as [`Self::start_queue_at`].
    pub async fn resume_at(&mut self, now: DateTime<Utc>) -> Result<()> {
        if let Some(session) = &self.active {
            return Err(RetakeError::run_already_active(session.item_id()));
        }
        self.open_front(now).await
    }

    /// Feeds a learner event into the active run at the current time.
    ///
    /// # Errors
    ///
    /// See [`Self::dispatch_at`].
    pub async fn dispatch(&mut self, event: RunEvent) -> Result<Step> {
        self.dispatch_at(event, Utc::now()).await
    }

    /// Feeds a learner event into the active run.
    ///
    /// The run's streak status is refreshed from the state at `now`, so the
    /// celebration decision follows the day the run is accepted on.
    ///
    /// A redo fetches the next content stage and restarts the run before
    /// returning [`Step::Regenerate`]. An exit is folded into the state, then
    /// the queue waits `queue.advanceDelayMs` and opens the next item at
    /// `now` plus that delay. The exit is returned even when the next item
    /// cannot be opened: the failure is sent as an `error` event, and the
    /// item stays at the front of the queue for [`Self::resume_at`].
    ///
    /// # Errors
    ///
    /// Returns `RetakeError::NoActiveRun` when nothing is open, any error the
    /// run rejects the event with, and `RetakeError::ContentUnavailable` when
    /// a redo cannot fetch fresh content.
    pub async fn dispatch_at(&mut self, event: RunEvent, now: DateTime<Utc>) -> Result<Step> {
        let session = self.active.as_mut().ok_or(RetakeError::NoActiveRun)?;
        session.set_streak(self.state.streak.status_at(now));
        let from = session.phase();
        let step = session.handle_at(event, now)?;

        match &step {
            Step::Phase(to) if *to != from => {
                self.events
                    .send(EngineEvent::phase_changed(session.item_id(), from, *to));
            }
            Step::Regenerate => {
                let request = ContentRequest {
                    item_id: session.item_id().to_string(),
                    stage: session.stage() + 1,
                    prior_mistakes: self.state.ledger.for_item(session.item_id()),
                };
                let content = fetch(&self.provider, &request, &self.events).await?;
                session.restart(content, now)?;
                self.events.send(EngineEvent::phase_changed(
                    session.item_id(),
                    from,
                    session.phase(),
                ));
            }
            Step::Exit(exit) => {
                self.active = None;
                if let Err(e) = self.finish(exit).await {
                    warn!(
                        finished = %exit.item_id,
                        next = ?self.queue.front(),
                        error = %e,
                        "Next review item not opened"
                    );
                }
            }
            _ => {}
        }
        Ok(step)
    }

    async fn finish(&mut self, exit: &RunExit) -> Result<()> {
        let outcome = if exit.should_persist {
            self.state.apply_exit(exit)
        } else {
            None
        };
        self.completed += 1;
        self.events.send(EngineEvent::run_completed(
            exit.item_id.clone(),
            exit.should_persist,
            outcome.map(|o| o.quality.value()),
            exit.session_mistakes.len(),
            exit.stats.xp,
        ));

        self.queue.pop_front();
        let Some(next) = self.queue.front() else {
            info!(completed = self.completed, "Review queue drained");
            self.events.send(EngineEvent::queue_drained(self.completed));
            return Ok(());
        };

        info!(next = next, remaining = self.queue.len(), "Advancing review queue");
        self.events
            .send(EngineEvent::queue_advanced(next, self.queue.len()));
        let delay = self.config.queue.advance_delay();
        tokio::time::sleep(delay).await;
        let opened_at = exit.finished_at
            + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());
        self.open_front(opened_at).await
    }

    async fn open_front(&mut self, now: DateTime<Utc>) -> Result<()> {
        let Some(item_id) = self.queue.front().map(str::to_string) else {
            return Ok(());
        };
        let request = ContentRequest {
            prior_mistakes: self.state.ledger.for_item(&item_id),
            item_id,
            stage: 0,
        };
        let content = fetch(&self.provider, &request, &self.events).await?;

        let session = RunSession::new(
            &request.item_id,
            RunMode::Review,
            content,
            Arc::clone(&self.validator),
            now,
        )
        .with_settings(self.config.run.clone())
        .with_streak(self.state.streak.status_at(now));

        self.events.send(EngineEvent::run_started(
            session.item_id(),
            session.mode(),
            session.screen_count(),
        ));
        self.active = Some(session);
        Ok(())
    }
}

async fn fetch<P: ContentProvider>(
    provider: &P,
    request: &ContentRequest,
    events: &EventBroadcaster,
) -> Result<LessonContent> {
    provider.fetch(request).await.map_err(|e| {
        warn!(item_id = %request.item_id, stage = request.stage, error = %e, "Content fetch failed");
        events.send(EngineEvent::error(e.to_string()));
        match e {
            RetakeError::ContentUnavailable { .. } => e,
            other => RetakeError::content_unavailable(&request.item_id, other.to_string()),
        }
    })
}

// ============================================================================
// Tests
// ============================================================================
