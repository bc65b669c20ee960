//! Error types for the Retake review engine.
//!
//! The pure scheduling and ledger operations never fail; errors come from
//! configuration loading, snapshot persistence, guarded run transitions and
//! the external content provider.

use std::path::PathBuf;

/// A specialized `Result` type for Retake engine operations.
pub type Result<T> = std::result::Result<T, RetakeError>;

/// Errors that can occur while driving the review engine.
///
/// User-facing variants carry an actionable suggestion, in the same shape
/// the CLI prints them.
#[derive(Debug, thiserror::Error)]
pub enum RetakeError {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Invalid JSON syntax in the configuration file.
    #[error("Invalid JSON in config file '{path}': {message}\n\nSuggestion: Validate your retake.json with a JSON linter")]
    ConfigParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Description of the parse error.
        message: String,
    },

    /// Configuration validation failed.
    #[error("Invalid configuration: {message}\n\nSuggestion: {suggestion}")]
    ConfigValidationError {
        /// Description of the validation failure.
        message: String,
        /// Actionable suggestion for the user.
        suggestion: String,
    },

    // ========================================================================
    // Scheduler Input Errors
    // ========================================================================
    /// A quality score outside `0..=3`.
    #[error("Invalid quality score {value}: expected 0, 1, 2 or 3")]
    InvalidQuality {
        /// The rejected value.
        value: u8,
    },

    /// An interval that is not one of the canonical buckets.
    #[error("Invalid review interval {days} days: expected one of 0, 1, 3, 7, 15, 30")]
    InvalidInterval {
        /// The rejected day count.
        days: u32,
    },

    // ========================================================================
    // Run State Machine Errors
    // ========================================================================
    /// An event that the current run phase does not accept.
    #[error("Invalid state transition: cannot go from {from} to {to}")]
    InvalidStateTransition {
        /// The current phase.
        from: String,
        /// The attempted target.
        to: String,
    },

    /// An event arrived while no run is open.
    #[error("No practice run is active")]
    NoActiveRun,

    /// A queue or run was started while another run is still open.
    #[error("A practice run for '{item_id}' is already active\n\nSuggestion: Finish or abort the current run before starting another")]
    RunAlreadyActive {
        /// The item of the run that is still open.
        item_id: String,
    },

    // ========================================================================
    // Content Provider Errors
    // ========================================================================
    /// The content provider could not produce a lesson for an item.
    #[error("Content unavailable for '{item_id}': {message}\n\nSuggestion: Retry once the content provider is reachable")]
    ContentUnavailable {
        /// The item whose content was requested.
        item_id: String,
        /// Description of the provider failure.
        message: String,
    },

    // ========================================================================
    // Snapshot Persistence Errors
    // ========================================================================
    /// Snapshot file contains malformed JSON.
    #[error("Corrupted store file '{path}': {message}\n\nSuggestion: Remove the store file to start fresh, or restore from backup")]
    StoreCorrupted {
        /// Path to the corrupted file.
        path: PathBuf,
        /// Description of the corruption.
        message: String,
    },

    /// Snapshot was written by a newer engine.
    #[error("Store file '{path}' has version {found}, newer than supported version {supported}\n\nSuggestion: Upgrade retake to read this store")]
    UnsupportedStoreVersion {
        /// Path to the snapshot file.
        path: PathBuf,
        /// Version found in the file.
        found: u32,
        /// Highest version this build understands.
        supported: u32,
    },

    // ========================================================================
    // General I/O Errors
    // ========================================================================
    /// General I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RetakeError {
    /// Creates a new `ConfigParseError` with the given path and message.
    #[must_use]
    pub fn config_parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ConfigParseError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a new `ConfigValidationError` with the given message and suggestion.
    #[must_use]
    pub fn config_validation(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::ConfigValidationError {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Creates a new `InvalidStateTransition` error.
    #[must_use]
    pub fn invalid_transition(from: impl std::fmt::Display, to: impl std::fmt::Display) -> Self {
        Self::InvalidStateTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// Creates a new `RunAlreadyActive` error.
    #[must_use]
    pub fn run_already_active(item_id: impl Into<String>) -> Self {
        Self::RunAlreadyActive {
            item_id: item_id.into(),
        }
    }

    /// Creates a new `ContentUnavailable` error.
    #[must_use]
    pub fn content_unavailable(item_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ContentUnavailable {
            item_id: item_id.into(),
            message: message.into(),
        }
    }

    /// Creates a new `StoreCorrupted` error.
    #[must_use]
    pub fn store_corrupted(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::StoreCorrupted {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Returns `true` if this error should stop the caller outright.
    ///
    /// Transition and provider errors leave the engine state intact and the
    /// caller can keep driving it.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ConfigParseError { .. }
                | Self::ConfigValidationError { .. }
                | Self::StoreCorrupted { .. }
                | Self::UnsupportedStoreVersion { .. }
        )
    }
}
