//! The `{active, history}` document shared by the file and memory stores.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use blockwright_types::{BuildStatus, CheckpointRecord};

use crate::error::StoreError;

/// Default number of terminal records kept per agent.
pub const DEFAULT_HISTORY_RETENTION: usize = 100;

/// One agent's single active slot plus its terminal history.
///
/// `history` is stored oldest first; queries reverse it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildDocument {
    /// The in-progress build, if any.
    #[serde(default)]
    pub active: Option<CheckpointRecord>,
    /// Completed and cancelled builds.
    #[serde(default)]
    pub history: Vec<CheckpointRecord>,
}

/// Copy of a terminal `record` ready for history.
///
/// `ended_at` is kept when already set, so re-archiving a record left in
/// the active slot by an earlier run keeps its original end time.
pub fn finish_record(
    record: &CheckpointRecord,
    now: DateTime<Utc>,
) -> Result<CheckpointRecord, StoreError> {
    if !record.status.is_terminal() {
        return Err(StoreError::NotTerminal {
            status: record.status,
        });
    }
    let mut finished = record.clone();
    finished.pause_reason = None;
    finished.ended_at.get_or_insert(now);
    Ok(finished)
}

impl BuildDocument {
    /// Append the terminal `record` to history and clear the active slot.
    ///
    /// `retention == 0` keeps every record.
    pub fn archive(
        &mut self,
        record: &CheckpointRecord,
        now: DateTime<Utc>,
        retention: usize,
    ) -> Result<CheckpointRecord, StoreError> {
        let finished = finish_record(record, now)?;
        self.active = None;
        self.history.push(finished.clone());
        self.trim(retention);
        Ok(finished)
    }

    /// Drop the oldest records beyond `retention`.
    pub fn trim(&mut self, retention: usize) {
        if retention > 0 && self.history.len() > retention {
            let excess = self.history.len().saturating_sub(retention);
            self.history.drain(..excess);
        }
    }

    /// Up to `limit` terminal records, newest first.
    pub fn recent(&self, limit: usize) -> Vec<CheckpointRecord> {
        self.history.iter().rev().take(limit).cloned().collect()
    }
}
