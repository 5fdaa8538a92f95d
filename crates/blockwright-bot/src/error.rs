//! Error types for the bot binary.
//!
//! [`BotError`] covers startup failures and `!url` downloads. Command
//! rejections from the executor are rendered back to the requester rather
//! than propagated.

use blockwright_core::ConfigError;
use blockwright_plan::PlanError;
use blockwright_store::StoreError;

/// Top-level error for the bot binary.
#[derive(Debug, thiserror::Error)]
pub enum BotError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: ConfigError,
    },

    /// The checkpoint store could not be opened.
    #[error("store error: {source}")]
    Store {
        /// The underlying store error.
        #[from]
        source: StoreError,
    },

    /// Plan directories could not be prepared or written.
    #[error("plan library error: {source}")]
    Plan {
        /// The underlying plan error.
        #[from]
        source: PlanError,
    },

    /// The address is not an http(s) URL.
    #[error("not a downloadable URL: {url}")]
    InvalidUrl {
        /// The rejected address.
        url: String,
    },

    /// The request failed or the server answered with an error status.
    #[error("download failed: {message}")]
    Fetch {
        /// Description of the failure.
        message: String,
    },

    /// The response body exceeds the configured cap.
    #[error("download is larger than {limit} bytes")]
    TooLarge {
        /// Configured cap in bytes.
        limit: u64,
    },
}
