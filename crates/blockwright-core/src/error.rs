//! Error types for the build executor and its capabilities.

use rust_decimal::Decimal;

use blockwright_plan::PlanError;
use blockwright_store::StoreError;
use blockwright_types::{BlockPos, BuildId, BuildStatus, MaterialId};

/// Errors returned by executor operations.
///
/// Material shortages and unrecoverable displacement during the step loop
/// are not errors: they pause the session. The variants here reject a
/// command without changing the session, except where noted.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// A session is already Running or Paused for this agent.
    #[error("build {build_id} is already active; pause, resume or stop it first")]
    BuildActive {
        /// The session that is in the way.
        build_id: BuildId,
    },

    /// A checkpoint from a previous run is waiting to be resumed or stopped.
    #[error("unfinished build {build_id} found; resume or stop it first")]
    UnfinishedBuild {
        /// The session recorded in the checkpoint.
        build_id: BuildId,
    },

    /// The command needs a session but none exists.
    #[error("no active build")]
    NoActiveBuild,

    /// Resume was requested for a session that is not paused.
    #[error("build is {status}, not paused")]
    NotPaused {
        /// Current status.
        status: BuildStatus,
    },

    /// The requested speed factor is outside the configured bounds.
    #[error("speed factor {speed} is outside {min}..={max}")]
    InvalidSpeed {
        /// Requested value.
        speed: Decimal,
        /// Lower bound.
        min: Decimal,
        /// Upper bound.
        max: Decimal,
    },

    /// The plan source could not be read or compiled.
    #[error("plan compilation failed: {0}")]
    PlanCompilation(#[from] PlanError),

    /// The recompiled plan does not match the checkpoint.
    #[error("plan source changed since the checkpoint (expected {expected}, got {actual})")]
    PlanChanged {
        /// Digest recorded in the checkpoint.
        expected: String,
        /// Digest of the freshly compiled plan.
        actual: String,
    },

    /// The world has not reported an agent position yet. Start needs it when
    /// no origin is given; resume always needs it.
    #[error("agent position is unknown")]
    PositionUnknown,

    /// Relocation to the origin failed on resume. The session stays paused.
    #[error("could not return to the build origin ({distance:.1} blocks away)")]
    DisplacementUnrecoverable {
        /// Distance to the origin after the failed attempt.
        distance: f64,
    },

    /// A checkpoint store operation failed where the command depends on it.
    #[error("checkpoint store error: {0}")]
    Store(#[from] StoreError),

    /// The agent session task is no longer running.
    #[error("agent session is closed")]
    SessionClosed,
}

/// Failure of a world capability call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActionError {
    /// The agent could not reach the target.
    #[error("navigation to {target} failed: {reason}")]
    NavigationFailed {
        /// Destination.
        target: BlockPos,
        /// Pathfinder detail.
        reason: String,
    },

    /// The block could not be placed.
    #[error("placing {material} at {target} failed: {reason}")]
    PlacementFailed {
        /// Target voxel.
        target: BlockPos,
        /// Material being placed.
        material: MaterialId,
        /// World detail.
        reason: String,
    },

    /// The material could not be put in hand.
    #[error("equipping {material} failed")]
    EquipFailed {
        /// Material requested.
        material: MaterialId,
    },

    /// No reachable container held the material.
    #[error("restocking {material} failed: {reason}")]
    RestockFailed {
        /// Material requested.
        material: MaterialId,
        /// World detail.
        reason: String,
    },

    /// The world connection is gone.
    #[error("world unavailable: {0}")]
    Unavailable(String),
}

/// Failure to turn a chat line into a command.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// The command was recognised but its arguments were wrong.
    #[error("usage: {usage}")]
    Usage {
        /// Expected syntax.
        usage: &'static str,
    },

    /// An argument could not be parsed.
    #[error("invalid {what}: {input}")]
    Invalid {
        /// Which argument.
        what: &'static str,
        /// What was given.
        input: String,
    },
}
