//! Error types for the checkpoint store.
//!
//! A [`StoreError`] is a persistence failure. Callers log it and keep
//! building; it never halts a session on its own.

use std::path::PathBuf;

/// Errors that can occur while reading or writing checkpoints.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A filesystem operation failed.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        /// File being accessed.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// A record could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A `Dragonfly`/Redis operation failed.
    #[error("Dragonfly error: {0}")]
    Dragonfly(#[from] fred::error::Error),

    /// Only terminal statuses can be archived.
    #[error("cannot archive a build with status {status}")]
    NotTerminal {
        /// Rejected status.
        status: blockwright_types::BuildStatus,
    },

    /// The store was configured with invalid parameters.
    #[error("configuration error: {0}")]
    Config(String),
}
