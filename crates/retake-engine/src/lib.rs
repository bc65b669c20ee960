//! Retake review engine
//!
//! Decides when a learner should revisit a practice item, drives a single
//! practice run through correction and completion, and keeps a deduplicated
//! ledger of recurring mistakes.

pub mod config;
pub mod content;
pub mod error;
pub mod events;
pub mod ledger;
pub mod queue;
pub mod run_state;
pub mod scheduler;
pub mod store;
pub mod streak;

pub use config::{Config, QueueConfig, ReportConfig, RunConfig, MAX_ADVANCE_DELAY_MS};
pub use content::{
    Check, ContentProvider, ContentRequest, ExactMatchValidator, LessonContent, Screen, Validator,
};
pub use error::{Result, RetakeError};
pub use events::{EngineEvent, EventBroadcaster};
pub use ledger::{
    fingerprint, merge, MergeReport, MistakeLedger, MistakeRecord, QuestionKind,
    FINGERPRINT_PREFIX_CHARS,
};
pub use queue::{EngineState, FoldOutcome, QueueOrchestrator, ReviewQueue};
pub use run_state::{
    plan_repairs, CompletionCallback, CompletionStats, RunEvent, RunExit, RunMode, RunPhase,
    RunSession, RunStats, RunSummary, Step,
};
pub use scheduler::{
    preview, schedule, Quality, RetentionRecord, RetentionSchedule, ReviewEntry, ReviewInterval,
    SchedulePreview, HISTORY_LIMIT, MAX_INTERVAL_DAYS,
};
pub use store::{EngineSnapshot, STORE_VERSION};
pub use streak::{DailyStreak, StreakStatus};
