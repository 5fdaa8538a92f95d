//! Shared type definitions for Blockwright.
//!
//! Every crate in the workspace speaks in these types: the plan compiler
//! produces [`PlacementPlan`]s, the executor mutates [`BuildSession`]s, the
//! checkpoint store persists [`CheckpointRecord`]s, and the dispatch layer
//! renders [`BuildEvent`]s. Serializable types also export `TypeScript`
//! bindings via `ts-rs`.
//!
//! # Modules
//!
//! - [`ids`] -- UUID v7 build identifiers
//! - [`geometry`] -- voxel coordinates, agent positions, dimensions
//! - [`plan`] -- placement ops, plans, material histograms
//! - [`session`] -- session state, checkpoint records, status projections
//! - [`events`] -- outbound build events

pub mod events;
pub mod geometry;
pub mod ids;
pub mod plan;
pub mod session;

pub use events::{BuildEvent, CompletionSummary};
pub use geometry::{BlockPos, Dimensions, Position};
pub use ids::BuildId;
pub use plan::{MaterialHistogram, MaterialId, PlacementOp, PlacementPlan};
pub use session::{
    BuildSession, BuildStatus, CHECKPOINT_FORMAT_VERSION, CheckpointRecord, CompileOptions,
    ImageLayout, PaletteSelection, PauseReason, PlanSource, Requester, SessionSummary,
    UnknownVariant,
};
