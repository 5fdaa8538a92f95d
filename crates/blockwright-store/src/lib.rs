//! Checkpoint store and build history for Blockwright.
//!
//! Each agent owns one *active* slot holding the checkpoint of its running or
//! paused build, plus an append-only history of terminal builds. A new
//! `save_active` overwrites the slot; `archive_active` writes the final
//! record into history and empties the slot in one operation.
//!
//! # Backends
//!
//! | Backend | Layout |
//! |---------|--------|
//! | [`FileCheckpointStore`] | `<data_dir>/<agent>.builds.json` holding `{active, history}` |
//! | [`MemoryCheckpointStore`] | in-process, for tests and ephemeral runs |
//! | [`DragonflyCheckpointStore`] | `build:{agent}:active` (JSON), `build:{agent}:history` (list) |
//!
//! History keeps the newest `retention` records (`0` keeps everything).

pub mod document;
pub mod dragonfly;
pub mod error;
pub mod file;
pub mod memory;

use async_trait::async_trait;

use blockwright_types::CheckpointRecord;

pub use document::{BuildDocument, DEFAULT_HISTORY_RETENTION};
pub use dragonfly::DragonflyCheckpointStore;
pub use error::StoreError;
pub use file::FileCheckpointStore;
pub use memory::MemoryCheckpointStore;

/// Durable storage for one agent's build checkpoints.
///
/// Write failures are returned, but callers are expected to log them and
/// carry on: losing a checkpoint costs progress on a later crash, never the
/// running build.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Overwrite the active slot.
    async fn save_active(&self, record: &CheckpointRecord) -> Result<(), StoreError>;

    /// The active record, if one exists.
    async fn load_active(&self) -> Result<Option<CheckpointRecord>, StoreError>;

    /// Append the terminal `record` to history and clear the active slot.
    /// Returns the record as stored.
    ///
    /// On failure the slot is never left empty without the history entry.
    async fn archive_active(&self, record: &CheckpointRecord)
    -> Result<CheckpointRecord, StoreError>;

    /// Up to `limit` terminal records, newest first.
    async fn history(&self, limit: usize) -> Result<Vec<CheckpointRecord>, StoreError>;
}
