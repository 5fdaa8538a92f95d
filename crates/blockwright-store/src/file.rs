//! JSON file checkpoint store.
//!
//! One document per agent at `<data_dir>/<agent>.builds.json`. Every write
//! goes to a sibling temp file, is fsynced, then renamed over the document,
//! so a crash mid-write leaves either the old or the new document intact.
//! A document that fails to parse is moved aside to
//! `<agent>.builds.json.corrupt-<unix_ms>` and the store starts empty.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use blockwright_types::CheckpointRecord;

use crate::document::BuildDocument;
use crate::error::StoreError;
use crate::CheckpointStore;

/// File-backed checkpoint store for one agent.
#[derive(Debug)]
pub struct FileCheckpointStore {
    path: PathBuf,
    retention: usize,
    // Serializes read-modify-write cycles on the document.
    lock: Mutex<()>,
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

impl FileCheckpointStore {
    /// Store for `agent` under `data_dir`, keeping `retention` history
    /// records (`0` keeps all).
    pub fn new(
        data_dir: impl AsRef<Path>,
        agent: &str,
        retention: usize,
    ) -> Result<Self, StoreError> {
        let valid = !agent.is_empty()
            && agent
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(StoreError::Config(format!(
                "agent name {agent:?} is not usable as a file name"
            )));
        }
        Ok(Self {
            path: data_dir.as_ref().join(format!("{agent}.builds.json")),
            retention,
            lock: Mutex::new(()),
        })
    }

    /// Location of the document.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_document(&self) -> Result<BuildDocument, StoreError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(BuildDocument::default());
            }
            Err(e) => return Err(io_error(&self.path)(e)),
        };
        match serde_json::from_slice(&bytes) {
            Ok(doc) => Ok(doc),
            Err(parse_error) => {
                self.quarantine(&parse_error).await?;
                Ok(BuildDocument::default())
            }
        }
    }

    async fn quarantine(&self, parse_error: &serde_json::Error) -> Result<(), StoreError> {
        let mut name = self.path.as_os_str().to_owned();
        name.push(format!(".corrupt-{}", Utc::now().timestamp_millis()));
        let aside = PathBuf::from(name);
        tokio::fs::rename(&self.path, &aside)
            .await
            .map_err(io_error(&self.path))?;
        tracing::warn!(
            path = %self.path.display(),
            moved_to = %aside.display(),
            error = %parse_error,
            "Checkpoint document is corrupt; starting empty"
        );
        Ok(())
    }

    async fn write_document(&self, doc: &BuildDocument) -> Result<(), StoreError> {
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        tokio::fs::create_dir_all(dir).await.map_err(io_error(dir))?;

        let json = serde_json::to_vec_pretty(doc)?;
        let mut tmp_name = self.path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp = PathBuf::from(tmp_name);
        {
            let mut file = tokio::fs::File::create(&tmp)
                .await
                .map_err(io_error(&tmp))?;
            file.write_all(&json).await.map_err(io_error(&tmp))?;
            file.flush().await.map_err(io_error(&tmp))?;
            file.sync_all().await.map_err(io_error(&tmp))?;
        }
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(io_error(&self.path))?;

        // Persist the rename itself. Not every platform can open a directory.
        if let Ok(handle) = tokio::fs::File::open(dir).await {
            if let Err(e) = handle.sync_all().await {
                tracing::debug!(dir = %dir.display(), error = %e, "Directory fsync failed");
            }
        }
        Ok(())
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn save_active(&self, record: &CheckpointRecord) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        let mut doc = self.read_document().await?;
        doc.active = Some(record.clone());
        self.write_document(&doc).await?;
        tracing::debug!(
            build_id = %record.build_id,
            cursor = record.cursor,
            placed = record.placed_count,
            total = record.total_count,
            "Checkpoint written"
        );
        Ok(())
    }

    async fn load_active(&self) -> Result<Option<CheckpointRecord>, StoreError> {
        let _guard = self.lock.lock().await;
        Ok(self.read_document().await?.active)
    }

    async fn archive_active(
        &self,
        record: &CheckpointRecord,
    ) -> Result<CheckpointRecord, StoreError> {
        let _guard = self.lock.lock().await;
        let mut doc = self.read_document().await?;
        let archived = doc.archive(record, Utc::now(), self.retention)?;
        self.write_document(&doc).await?;
        Ok(archived)
    }

    async fn history(&self, limit: usize) -> Result<Vec<CheckpointRecord>, StoreError> {
        let _guard = self.lock.lock().await;
        Ok(self.read_document().await?.recent(limit))
    }
}
