//! Configuration types for the Retake review engine.
//!
//! Settings live in a `retake.json` file next to the learner's data. Every
//! field has a default, so a missing file or an empty object is a valid
//! configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, RetakeError};

/// The default config file name.
const CONFIG_FILE_NAME: &str = "retake.json";

/// Upper bound on the pause between queued runs.
pub const MAX_ADVANCE_DELAY_MS: u64 = 10_000;

fn default_store_file() -> String {
    ".retake/store.json".to_string()
}

const fn default_advance_delay_ms() -> u64 {
    800
}

const fn default_xp_per_screen() -> u32 {
    10
}

const fn default_xp_per_repair() -> u32 {
    5
}

const fn default_upcoming_days() -> u32 {
    7
}

const fn default_top_mistakes() -> usize {
    5
}

const fn default_true() -> bool {
    true
}

/// Main configuration for the review engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Path to the persisted engine snapshot.
    #[serde(default = "default_store_file")]
    pub store_file: String,

    /// Queue sequencing settings.
    #[serde(default)]
    pub queue: QueueConfig,

    /// Practice run settings.
    #[serde(default)]
    pub run: RunConfig,

    /// Review digest settings.
    #[serde(default)]
    pub report: ReportConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store_file: default_store_file(),
            queue: QueueConfig::default(),
            run: RunConfig::default(),
            report: ReportConfig::default(),
        }
    }
}

impl Config {
    /// Loads configuration from the current working directory.
    ///
    /// # Errors
    ///
    /// Returns an error if `retake.json` exists but is invalid.
    pub fn load() -> Result<Self> {
        let current_dir = std::env::current_dir().map_err(|e| {
            RetakeError::config_parse(
                "<current directory>",
                format!("cannot determine current directory: {e}"),
            )
        })?;
        Self::load_from_dir(&current_dir)
    }

    /// Loads `retake.json` from a specific directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but is invalid.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        Self::load_from_file(&dir.join(CONFIG_FILE_NAME))
    }

    /// Loads configuration from a specific file path.
    ///
    /// A missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns `RetakeError::ConfigParseError` if the file cannot be read or
    /// is not valid JSON, and `RetakeError::ConfigValidationError` if a value
    /// is out of range.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let config = Self::default();
                config.validate()?;
                return Ok(config);
            }
            Err(e) => {
                return Err(RetakeError::config_parse(
                    path,
                    format!("failed to read file: {e}"),
                ));
            }
        };

        let config: Self = serde_json::from_str(&contents)
            .map_err(|e| RetakeError::config_parse(path, e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `RetakeError::ConfigValidationError` on the first bad value.
    pub fn validate(&self) -> Result<()> {
        if self.store_file.trim().is_empty() {
            return Err(RetakeError::config_validation(
                "storeFile must not be empty",
                "Provide a path for the engine snapshot in your retake.json",
            ));
        }

        if self.queue.advance_delay_ms > MAX_ADVANCE_DELAY_MS {
            return Err(RetakeError::config_validation(
                format!(
                    "queue.advanceDelayMs must be at most {MAX_ADVANCE_DELAY_MS}, got {}",
                    self.queue.advance_delay_ms
                ),
                "Lower queue.advanceDelayMs in your retake.json",
            ));
        }

        if self.run.xp_per_screen == 0 {
            return Err(RetakeError::config_validation(
                "run.xpPerScreen must be greater than 0",
                "Set run.xpPerScreen to at least 1 in your retake.json",
            ));
        }

        if self.report.upcoming_days == 0 {
            return Err(RetakeError::config_validation(
                "report.upcomingDays must be greater than 0",
                "Set report.upcomingDays to at least 1 in your retake.json",
            ));
        }

        Ok(())
    }
}

/// Queue sequencing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueConfig {
    /// Pause between a finished run and the next queued one, in milliseconds.
    #[serde(default = "default_advance_delay_ms")]
    pub advance_delay_ms: u64,
}

impl QueueConfig {
    /// The advance delay as a [`Duration`].
    #[must_use]
    pub const fn advance_delay(&self) -> Duration {
        Duration::from_millis(self.advance_delay_ms)
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            advance_delay_ms: default_advance_delay_ms(),
        }
    }
}

/// Practice run settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunConfig {
    /// XP awarded per content screen.
    #[serde(default = "default_xp_per_screen")]
    pub xp_per_screen: u32,

    /// XP awarded per repair check answered correctly.
    #[serde(default = "default_xp_per_repair")]
    pub xp_per_repair: u32,

    /// Whether the first completed run of the day shows a celebration.
    #[serde(default = "default_true")]
    pub celebrate_daily_streak: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            xp_per_screen: default_xp_per_screen(),
            xp_per_repair: default_xp_per_repair(),
            celebrate_daily_streak: default_true(),
        }
    }
}

/// Review digest settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportConfig {
    /// How many days ahead the "upcoming" list looks.
    #[serde(default = "default_upcoming_days")]
    pub upcoming_days: u32,

    /// How many recurring mistakes the digest lists.
    #[serde(default = "default_top_mistakes")]
    pub top_mistakes: usize,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            upcoming_days: default_upcoming_days(),
            top_mistakes: default_top_mistakes(),
        }
    }
}
