//! `Dragonfly` (Redis-compatible) checkpoint store.
//!
//! # Key Patterns
//!
//! | Pattern | Type | Description |
//! |---------|------|-------------|
//! | `build:{agent}:active` | JSON | Active checkpoint record |
//! | `build:{agent}:history` | List | Terminal records, oldest first |

use async_trait::async_trait;
use chrono::Utc;
use fred::prelude::*;

use blockwright_types::CheckpointRecord;

use crate::document::finish_record;
use crate::error::StoreError;
use crate::CheckpointStore;

/// Checkpoint store backed by a `Dragonfly` instance.
#[derive(Clone)]
pub struct DragonflyCheckpointStore {
    client: Client,
    active_key: String,
    history_key: String,
    retention: usize,
}

impl DragonflyCheckpointStore {
    /// Connect to `Dragonfly` at `url` (`redis://host:port[/db]`).
    pub async fn connect(url: &str, agent: &str, retention: usize) -> Result<Self, StoreError> {
        let config = Config::from_url(url)
            .map_err(|e| StoreError::Config(format!("Invalid Dragonfly URL: {e}")))?;
        let client = Builder::from_config(config).build()?;
        client.init().await?;
        tracing::info!(agent, "Connected to Dragonfly checkpoint store");
        Ok(Self::from_client(client, agent, retention))
    }

    /// Wrap an already-initialised client.
    pub fn from_client(client: Client, agent: &str, retention: usize) -> Self {
        Self {
            client,
            active_key: format!("build:{agent}:active"),
            history_key: format!("build:{agent}:history"),
            retention,
        }
    }

    async fn trim_history(&self) -> Result<(), StoreError> {
        if self.retention == 0 {
            return Ok(());
        }
        let keep = i64::try_from(self.retention).unwrap_or(i64::MAX);
        let _: () = self
            .client
            .ltrim(&self.history_key, keep.saturating_neg(), -1)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl CheckpointStore for DragonflyCheckpointStore {
    async fn save_active(&self, record: &CheckpointRecord) -> Result<(), StoreError> {
        let json = serde_json::to_string(record)?;
        let _: () = self
            .client
            .set(&self.active_key, json.as_str(), None, None, false)
            .await?;
        Ok(())
    }

    async fn load_active(&self) -> Result<Option<CheckpointRecord>, StoreError> {
        let value: Option<String> = self.client.get(&self.active_key).await?;
        value
            .map(|s| serde_json::from_str(&s))
            .transpose()
            .map_err(StoreError::from)
    }

    async fn archive_active(
        &self,
        record: &CheckpointRecord,
    ) -> Result<CheckpointRecord, StoreError> {
        let finished = finish_record(record, Utc::now())?;
        let json = serde_json::to_string(&finished)?;
        // Terminal record goes into the slot first; a failure after this
        // point leaves it there for the next startup to archive.
        let _: () = self
            .client
            .set(&self.active_key, json.as_str(), None, None, false)
            .await?;
        let _: u64 = self.client.rpush(&self.history_key, json.as_str()).await?;
        self.trim_history().await?;
        let _: u32 = self.client.del(&self.active_key).await?;
        Ok(finished)
    }

    async fn history(&self, limit: usize) -> Result<Vec<CheckpointRecord>, StoreError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let start = i64::try_from(limit).unwrap_or(i64::MAX).saturating_neg();
        let values: Vec<String> = self.client.lrange(&self.history_key, start, -1).await?;
        let mut records = Vec::with_capacity(values.len());
        for v in values.iter().rev() {
            records.push(serde_json::from_str(v)?);
        }
        Ok(records)
    }
}
