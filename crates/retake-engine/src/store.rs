//! Persisted engine snapshot.
//!
//! The engine itself never touches the disk. Callers that want to keep the
//! ledger, the retention records and the streak marker between sessions can
//! capture an [`EngineSnapshot`] and write it with [`EngineSnapshot::save`].

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, RetakeError};
use crate::ledger::{MistakeLedger, MistakeRecord};
use crate::queue::EngineState;
use crate::scheduler::{RetentionRecord, RetentionSchedule};
use crate::streak::DailyStreak;

/// Snapshot format written by this build.
pub const STORE_VERSION: u32 = 1;

/// Serialized shape of an [`EngineState`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineSnapshot {
    /// Format version.
    pub version: u32,
    /// When the snapshot was captured.
    pub saved_at: DateTime<Utc>,
    /// Ledger records in first-seen order.
    #[serde(default)]
    pub mistakes: Vec<MistakeRecord>,
    /// Retention records in item id order.
    #[serde(default)]
    pub retention: Vec<RetentionRecord>,
    /// Daily streak marker.
    #[serde(default)]
    pub streak: DailyStreak,
}

#[derive(Deserialize)]
struct VersionProbe {
    version: u32,
}

impl EngineSnapshot {
    /// Captures the current state.
    #[must_use]
    pub fn capture(state: &EngineState, now: DateTime<Utc>) -> Self {
        Self {
            version: STORE_VERSION,
            saved_at: now,
            mistakes: state.ledger.records().to_vec(),
            retention: state.schedule.iter().cloned().collect(),
            streak: state.streak,
        }
    }

    /// Rebuilds the live state.
    #[must_use]
    pub fn into_state(self) -> EngineState {
        EngineState {
            ledger: MistakeLedger::from_records(self.mistakes),
            schedule: RetentionSchedule::from_records(self.retention),
            streak: self.streak,
        }
    }

    /// Writes the snapshot as pretty JSON, replacing any previous file.
    ///
    /// Parent directories are created as needed. The file is written next to
    /// its destination and renamed into place.
    ///
    /// # Errors
    ///
    /// Returns `RetakeError::Io` if the file cannot be written.
    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(self)?;
        let tmp_path = path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, json).await?;
        tokio::fs::rename(&tmp_path, path).await?;
        debug!(
            path = %path.display(),
            mistakes = self.mistakes.len(),
            items = self.retention.len(),
            "Snapshot saved"
        );
        Ok(())
    }

    /// Reads a snapshot. A missing file yields `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns `RetakeError::StoreCorrupted` for malformed content and
    /// `RetakeError::UnsupportedStoreVersion` for snapshots written by a newer
    /// build.
    pub async fn load(path: &Path) -> Result<Option<Self>> {
        let contents = match tokio::fs::read_to_string(path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let probe: VersionProbe = serde_json::from_str(&contents)
            .map_err(|e| RetakeError::store_corrupted(path, e.to_string()))?;
        if probe.version > STORE_VERSION {
            return Err(RetakeError::UnsupportedStoreVersion {
                path: path.to_path_buf(),
                found: probe.version,
                supported: STORE_VERSION,
            });
        }

        let snapshot = serde_json::from_str(&contents)
            .map_err(|e| RetakeError::store_corrupted(path, e.to_string()))?;
        Ok(Some(snapshot))
    }
}

impl From<EngineSnapshot> for EngineState {
    fn from(snapshot: EngineSnapshot) -> Self {
        snapshot.into_state()
    }
}
