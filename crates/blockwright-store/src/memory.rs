//! In-process checkpoint store.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use blockwright_types::CheckpointRecord;

use crate::document::{BuildDocument, DEFAULT_HISTORY_RETENTION};
use crate::error::StoreError;
use crate::CheckpointStore;

/// Checkpoint store that lives only as long as the process.
///
/// Writes can be made to fail on demand, which is how callers exercise
/// their persistence-failure handling.
#[derive(Debug)]
pub struct MemoryCheckpointStore {
    document: Mutex<BuildDocument>,
    retention: usize,
    fail_writes: AtomicBool,
    fail_reads: AtomicBool,
    saves: AtomicU64,
}

impl Default for MemoryCheckpointStore {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_RETENTION)
    }
}

impl MemoryCheckpointStore {
    /// Empty store keeping `retention` history records.
    pub fn new(retention: usize) -> Self {
        Self::with_document(BuildDocument::default(), retention)
    }

    /// Store pre-loaded with a document, as if left by a previous run.
    pub fn with_document(document: BuildDocument, retention: usize) -> Self {
        Self {
            document: Mutex::new(document),
            retention,
            fail_writes: AtomicBool::new(false),
            fail_reads: AtomicBool::new(false),
            saves: AtomicU64::new(0),
        }
    }

    /// Make every subsequent write fail (or succeed again).
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent read fail (or succeed again).
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Number of successful `save_active` calls.
    pub fn save_count(&self) -> u64 {
        self.saves.load(Ordering::SeqCst)
    }

    /// Copy of the whole document.
    pub async fn snapshot(&self) -> BuildDocument {
        self.document.lock().await.clone()
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        Self::check(&self.fail_writes, "writes disabled")
    }

    fn check_readable(&self) -> Result<(), StoreError> {
        Self::check(&self.fail_reads, "reads disabled")
    }

    fn check(flag: &AtomicBool, detail: &str) -> Result<(), StoreError> {
        if flag.load(Ordering::SeqCst) {
            return Err(StoreError::Io {
                path: "memory".into(),
                source: std::io::Error::other(detail),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn save_active(&self, record: &CheckpointRecord) -> Result<(), StoreError> {
        self.check_writable()?;
        self.document.lock().await.active = Some(record.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn load_active(&self) -> Result<Option<CheckpointRecord>, StoreError> {
        self.check_readable()?;
        Ok(self.document.lock().await.active.clone())
    }

    async fn archive_active(
        &self,
        record: &CheckpointRecord,
    ) -> Result<CheckpointRecord, StoreError> {
        self.check_writable()?;
        let mut doc = self.document.lock().await;
        doc.archive(record, Utc::now(), self.retention)
    }

    async fn history(&self, limit: usize) -> Result<Vec<CheckpointRecord>, StoreError> {
        self.check_readable()?;
        Ok(self.document.lock().await.recent(limit))
    }
}
