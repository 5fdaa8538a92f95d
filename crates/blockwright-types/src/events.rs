//! Outbound build events.
//!
//! The executor publishes a [`BuildEvent`] for every lifecycle change. The
//! dispatch layer subscribes and renders them for the requester; nothing in
//! the executor formats chat text itself.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::geometry::Dimensions;
use crate::ids::BuildId;
use crate::session::{PauseReason, PlanSource, Requester};

/// Totals reported when a build completes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct CompletionSummary {
    /// Blocks placed over the whole session.
    pub total_placed: u64,
    /// Placements that failed and were skipped.
    pub skipped: u64,
    /// Wall-clock seconds from start to completion.
    pub elapsed_seconds: i64,
}

/// Event emitted by a build executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BuildEvent {
    /// A new session was accepted and is running.
    Started {
        /// Session identifier.
        build_id: BuildId,
        /// Source artifact.
        source: PlanSource,
        /// Non-empty ops to place.
        total: u64,
        /// Plan extents.
        dimensions: Dimensions,
        /// Advisory material deficits at start (`name: have/need`).
        deficits: Vec<String>,
        /// Reply target.
        requester: Requester,
    },
    /// Periodic progress report.
    Progress {
        /// Session identifier.
        build_id: BuildId,
        /// Successful placements.
        placed: u64,
        /// Non-empty ops in the plan.
        total: u64,
        /// Completion percentage (one decimal).
        #[ts(as = "String")]
        percent: Decimal,
        /// Reply target.
        requester: Requester,
    },
    /// The session halted and can be resumed.
    Paused {
        /// Session identifier.
        build_id: BuildId,
        /// Why it halted.
        reason: PauseReason,
        /// Index of the next op.
        cursor: u64,
        /// Successful placements.
        placed: u64,
        /// Reply target.
        requester: Requester,
    },
    /// The session is running again.
    Resumed {
        /// Session identifier.
        build_id: BuildId,
        /// Index the step loop continues from.
        cursor: u64,
        /// Successful placements.
        placed: u64,
        /// Non-empty ops in the plan.
        total: u64,
        /// Reply target.
        requester: Requester,
    },
    /// The agent is walking back to the build origin.
    Relocating {
        /// Session identifier.
        build_id: BuildId,
        /// Distance to the origin.
        distance: f64,
    },
    /// Every op of the plan has been consumed.
    Completed {
        /// Session identifier.
        build_id: BuildId,
        /// Totals for the session.
        summary: CompletionSummary,
        /// Reply target.
        requester: Requester,
    },
    /// The session was stopped by an operator.
    Cancelled {
        /// Session identifier.
        build_id: BuildId,
        /// Successful placements before the stop.
        placed: u64,
        /// Non-empty ops in the plan.
        total: u64,
        /// Reply target.
        requester: Requester,
    },
    /// A non-fatal problem, or a rejected command.
    Error {
        /// Session the error belongs to, if any.
        build_id: Option<BuildId>,
        /// Human-readable detail.
        detail: String,
        /// Reply target, if known.
        requester: Option<Requester>,
    },
    /// A checkpoint from a previous run was found at startup.
    UnfinishedBuild {
        /// Session identifier.
        build_id: BuildId,
        /// Source artifact.
        source: PlanSource,
        /// Successful placements recorded.
        placed: u64,
        /// Non-empty ops in the plan.
        total: u64,
        /// Completion percentage (one decimal).
        #[ts(as = "String")]
        percent: Decimal,
    },
}

impl BuildEvent {
    /// The session this event belongs to, if any.
    pub const fn build_id(&self) -> Option<BuildId> {
        match self {
            Self::Started { build_id, .. }
            | Self::Progress { build_id, .. }
            | Self::Paused { build_id, .. }
            | Self::Resumed { build_id, .. }
            | Self::Relocating { build_id, .. }
            | Self::Completed { build_id, .. }
            | Self::Cancelled { build_id, .. }
            | Self::UnfinishedBuild { build_id, .. } => Some(*build_id),
            Self::Error { build_id, .. } => *build_id,
        }
    }

    /// Who should receive the rendered event. `None` means global chat.
    pub const fn requester(&self) -> Option<&Requester> {
        match self {
            Self::Started { requester, .. }
            | Self::Progress { requester, .. }
            | Self::Paused { requester, .. }
            | Self::Resumed { requester, .. }
            | Self::Completed { requester, .. }
            | Self::Cancelled { requester, .. } => Some(requester),
            Self::Error { requester, .. } => requester.as_ref(),
            Self::Relocating { .. } | Self::UnfinishedBuild { .. } => None,
        }
    }
}
