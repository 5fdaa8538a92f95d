//! Error types for the `blockwright-plan` crate.
//!
//! Every failure here is a plan compilation error: it aborts before a build
//! session exists, so no session state has to be unwound.

use std::path::PathBuf;

/// Errors that can occur while loading or compiling a plan source.
#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    /// The source file does not exist in its plan directory.
    #[error("plan source not found: {file}")]
    NotFound {
        /// Requested file name.
        file: String,
    },

    /// The file name tries to escape its plan directory.
    #[error("invalid plan file name: {file}")]
    InvalidFileName {
        /// Rejected file name.
        file: String,
    },

    /// Reading or writing a plan file failed.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        /// File being accessed.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The image bytes could not be decoded.
    #[error("image decode error: {0}")]
    Image(#[from] image::ImageError),

    /// The image has no pixels.
    #[error("image is empty")]
    EmptyImage,

    /// Requested raster size is outside the allowed range.
    #[error("invalid target size {width}x{height} (allowed 1..={max})")]
    InvalidDimensions {
        /// Requested width.
        width: u32,
        /// Requested or derived height.
        height: u32,
        /// Largest allowed extent.
        max: u32,
    },

    /// The blueprint NBT could not be parsed.
    #[error("blueprint NBT error: {0}")]
    Nbt(#[from] fastnbt::error::Error),

    /// The blueprint parsed but its contents are inconsistent.
    #[error("malformed blueprint: {reason}")]
    MalformedBlueprint {
        /// What was wrong.
        reason: String,
    },

    /// The blueprint has a zero extent.
    #[error("blueprint has no volume ({width}x{height}x{length})")]
    EmptyBlueprint {
        /// Extent along x.
        width: u32,
        /// Extent along y.
        height: u32,
        /// Extent along z.
        length: u32,
    },
}
