//! Build session state, checkpoint records, and status projections.
//!
//! A [`BuildSession`] is the mutable state of one construction task. It is
//! persisted as a [`CheckpointRecord`], which carries every field needed to
//! rebuild the session after a process restart.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::geometry::{BlockPos, Dimensions};
use crate::ids::BuildId;
use crate::plan::{MaterialHistogram, MaterialId};

/// Version written into every checkpoint record.
pub const CHECKPOINT_FORMAT_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Lifecycle status of a build session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "snake_case")]
pub enum BuildStatus {
    /// No plan is loaded.
    Idle,
    /// The step loop is placing blocks.
    Running,
    /// Halted; resumable from the persisted cursor.
    Paused,
    /// Every op of the plan has been consumed.
    Completed,
    /// Stopped by an operator before completion.
    Cancelled,
}

impl BuildStatus {
    /// Statuses reachable from this one.
    pub const fn valid_next(self) -> &'static [Self] {
        match self {
            Self::Idle => &[Self::Running],
            Self::Running => &[Self::Paused, Self::Completed, Self::Cancelled],
            Self::Paused => &[Self::Running, Self::Cancelled],
            Self::Completed | Self::Cancelled => &[],
        }
    }

    /// Whether moving to `next` is a legal transition.
    pub fn can_transition_to(self, next: Self) -> bool {
        self.valid_next().contains(&next)
    }

    /// Completed or Cancelled.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Running or Paused: occupies the agent's single build slot.
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Running | Self::Paused)
    }

    /// Lowercase label used in chat output.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl core::fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Compile options
// ---------------------------------------------------------------------------

/// Which subset of the material palette an image may be matched against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "snake_case")]
pub enum PaletteSelection {
    /// The sixteen wool colours.
    #[default]
    Wool,
    /// The sixteen concrete colours.
    Concrete,
    /// Plain building blocks (dirt, stone, planks, ...).
    Basic,
    /// Every known material.
    All,
}

impl PaletteSelection {
    /// Lowercase name as accepted by [`FromStr`].
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Wool => "wool",
            Self::Concrete => "concrete",
            Self::Basic => "basic",
            Self::All => "all",
        }
    }
}

impl core::fmt::Display for PaletteSelection {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A string did not name a known variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant {
    /// The kind of value being parsed.
    pub kind: &'static str,
    /// The rejected input.
    pub input: String,
}

impl core::fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "unknown {}: {}", self.kind, self.input)
    }
}

impl std::error::Error for UnknownVariant {}

impl FromStr for PaletteSelection {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "wool" => Ok(Self::Wool),
            "concrete" => Ok(Self::Concrete),
            "basic" => Ok(Self::Basic),
            "all" => Ok(Self::All),
            _ => Err(UnknownVariant {
                kind: "palette",
                input: s.to_owned(),
            }),
        }
    }
}

/// How a raster image is laid into the world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "snake_case")]
pub enum ImageLayout {
    /// Upright in the x/y plane. Row `r` of the image lands at height `r`.
    #[default]
    Wall,
    /// Flat in the x/z plane.
    Floor,
}

impl ImageLayout {
    /// Relative offset of pixel (`col`, `row`).
    pub const fn offset(self, col: i32, row: i32) -> BlockPos {
        match self {
            Self::Wall => BlockPos::new(col, row, 0),
            Self::Floor => BlockPos::new(col, 0, row),
        }
    }
}

impl FromStr for ImageLayout {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "wall" => Ok(Self::Wall),
            "floor" => Ok(Self::Floor),
            _ => Err(UnknownVariant {
                kind: "layout",
                input: s.to_owned(),
            }),
        }
    }
}

/// Parameters the compiler needs besides the source bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct CompileOptions {
    /// Palette subset for colour matching.
    pub palette: PaletteSelection,
    /// Target width in voxels; `None` uses the configured default.
    pub width: Option<u32>,
    /// Target height in voxels; `None` derives it from the aspect ratio.
    pub height: Option<u32>,
    /// Image orientation.
    pub layout: ImageLayout,
}

// ---------------------------------------------------------------------------
// Plan source
// ---------------------------------------------------------------------------

/// Where a plan came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlanSource {
    /// A raster image in the images directory.
    Image {
        /// File name relative to the images directory.
        file: String,
        /// Remote address the file was downloaded from, if any.
        url: Option<String>,
    },
    /// A structured blueprint in the schematics directory.
    Blueprint {
        /// File name relative to the schematics directory.
        file: String,
    },
}

impl PlanSource {
    /// File name of the source artifact.
    pub fn file(&self) -> &str {
        match self {
            Self::Image { file, .. } | Self::Blueprint { file } => file,
        }
    }

    /// Whether the source is a raster image.
    pub const fn is_image(&self) -> bool {
        matches!(self, Self::Image { .. })
    }
}

impl core::fmt::Display for PlanSource {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Image { file, .. } => write!(f, "image {file}"),
            Self::Blueprint { file } => write!(f, "blueprint {file}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Pause reasons and requesters
// ---------------------------------------------------------------------------

/// Why a session is paused.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PauseReason {
    /// An operator issued a pause command.
    Operator,
    /// The agent holds none of the material the next op needs.
    MaterialShortage {
        /// Material the blocked op needs.
        material: MaterialId,
        /// Outstanding deficits of the remaining plan (`name: have/need`).
        deficits: Vec<String>,
    },
    /// The agent drifted beyond the relocation threshold and could not
    /// return to the origin.
    DisplacementUnrecoverable {
        /// Distance to the origin when relocation failed.
        distance: f64,
    },
    /// Too many consecutive placements failed.
    PlacementFailures {
        /// Length of the failure streak.
        consecutive: u32,
    },
    /// The session was rebuilt from a checkpoint after a restart.
    Restored,
}

impl PauseReason {
    /// Human-readable explanation for chat output.
    pub fn describe(&self) -> String {
        match self {
            Self::Operator => "paused by operator".to_owned(),
            Self::MaterialShortage { material, deficits } => {
                if deficits.is_empty() {
                    format!("out of {material}")
                } else {
                    format!("out of {material} (missing {})", deficits.join(", "))
                }
            }
            Self::DisplacementUnrecoverable { distance } => {
                format!("could not return to the build site ({distance:.1} blocks away)")
            }
            Self::PlacementFailures { consecutive } => {
                format!("{consecutive} placements failed in a row")
            }
            Self::Restored => "restored after restart".to_owned(),
        }
    }
}

/// Who asked for a build and how replies reach them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Requester {
    /// Player name.
    pub name: String,
    /// Reply by private message instead of global chat.
    pub delivery_is_private: bool,
}

impl Requester {
    /// A requester answered in global chat.
    pub fn public(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            delivery_is_private: false,
        }
    }

    /// A requester answered by private message.
    pub fn private(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            delivery_is_private: true,
        }
    }
}

// ---------------------------------------------------------------------------
// BuildSession
// ---------------------------------------------------------------------------

/// Mutable state of one build.
///
/// `cursor` is the index of the next op to process. Everything before it has
/// been either placed, skipped as empty, or recorded in `skipped`.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildSession {
    /// Unique identifier.
    pub id: BuildId,
    /// Agent that owns the session.
    pub agent: String,
    /// Source artifact.
    pub source: PlanSource,
    /// Options the plan was compiled with.
    pub options: CompileOptions,
    /// Extents of the compiled plan.
    pub dimensions: Dimensions,
    /// Absolute anchor of the plan's relative offsets.
    pub origin: BlockPos,
    /// Index of the next op to process.
    pub cursor: u64,
    /// Successful placements so far.
    pub placed_count: u64,
    /// Non-empty ops in the plan.
    pub total_count: u64,
    /// Lifecycle status.
    pub status: BuildStatus,
    /// Set while paused.
    pub pause_reason: Option<PauseReason>,
    /// Reply target.
    pub requester: Requester,
    /// Multiplier on placement rate (0.1 to 5.0).
    pub speed_factor: Decimal,
    /// Restock from the nearest container before pausing on a shortage.
    pub use_containers: bool,
    /// Material totals of the whole plan.
    pub histogram: MaterialHistogram,
    /// Hex SHA-256 of the compiled plan.
    pub plan_digest: String,
    /// Plan indices whose placement failed and was skipped.
    pub skipped: Vec<u64>,
    /// When the session was created.
    pub started_at: DateTime<Utc>,
    /// Last successful checkpoint write.
    pub last_checkpoint_at: Option<DateTime<Utc>>,
}

impl BuildSession {
    /// Completion percentage, rounded to one decimal place.
    pub fn percent(&self) -> Decimal {
        if self.total_count == 0 {
            return Decimal::ONE_HUNDRED;
        }
        Decimal::from(self.placed_count)
            .checked_mul(Decimal::ONE_HUNDRED)
            .and_then(|scaled| scaled.checked_div(Decimal::from(self.total_count)))
            .map_or(Decimal::ZERO, |pct| pct.round_dp(1))
    }

    /// Record a successful placement: count and cursor move together.
    pub const fn record_placed(&mut self) {
        if self.placed_count < self.total_count {
            self.placed_count = self.placed_count.saturating_add(1);
        }
        self.cursor = self.cursor.saturating_add(1);
    }

    /// Record a failed placement that is being skipped.
    pub fn record_skipped(&mut self) {
        self.skipped.push(self.cursor);
        self.cursor = self.cursor.saturating_add(1);
    }

    /// Step past an empty op.
    pub const fn record_empty(&mut self) {
        self.cursor = self.cursor.saturating_add(1);
    }

    /// Seconds since the session started.
    pub fn elapsed_seconds(&self, now: DateTime<Utc>) -> i64 {
        now.signed_duration_since(self.started_at)
            .num_seconds()
            .max(0)
    }

    /// Status projection for chat output.
    pub fn summary(&self, now: DateTime<Utc>, distance_to_origin: Option<f64>) -> SessionSummary {
        SessionSummary {
            build_id: self.id,
            source: self.source.clone(),
            status: self.status,
            placed: self.placed_count,
            total: self.total_count,
            percent: self.percent(),
            cursor: self.cursor,
            dimensions: self.dimensions,
            elapsed_seconds: self.elapsed_seconds(now),
            pause_reason: self.pause_reason.clone(),
            skipped: u64::try_from(self.skipped.len()).unwrap_or(u64::MAX),
            distance_to_origin,
        }
    }

    /// Snapshot every persisted field.
    pub fn to_record(&self) -> CheckpointRecord {
        CheckpointRecord {
            format_version: CHECKPOINT_FORMAT_VERSION,
            build_id: self.id,
            agent: self.agent.clone(),
            plan_source: self.source.clone(),
            options: self.options,
            origin: self.origin,
            dimensions: self.dimensions,
            cursor: self.cursor,
            placed_count: self.placed_count,
            total_count: self.total_count,
            material_histogram: self.histogram.clone(),
            plan_digest: self.plan_digest.clone(),
            skipped: self.skipped.clone(),
            started_at: self.started_at,
            last_checkpoint_at: self.last_checkpoint_at,
            requester: self.requester.name.clone(),
            delivery_is_private: self.requester.delivery_is_private,
            speed_factor: self.speed_factor,
            use_containers: self.use_containers,
            status: self.status,
            pause_reason: self.pause_reason.clone(),
            ended_at: None,
        }
    }

    /// Rebuild a session from a stored record.
    ///
    /// A record that was `Running` when the process died comes back
    /// `Paused` with [`PauseReason::Restored`]; it only runs again after an
    /// explicit resume.
    pub fn from_record(record: CheckpointRecord) -> Self {
        let (status, pause_reason) = match record.status {
            BuildStatus::Running | BuildStatus::Idle => {
                (BuildStatus::Paused, Some(PauseReason::Restored))
            }
            BuildStatus::Paused => (
                BuildStatus::Paused,
                record.pause_reason.or(Some(PauseReason::Restored)),
            ),
            terminal => (terminal, record.pause_reason),
        };
        Self {
            id: record.build_id,
            agent: record.agent,
            source: record.plan_source,
            options: record.options,
            dimensions: record.dimensions,
            origin: record.origin,
            cursor: record.cursor,
            placed_count: record.placed_count.min(record.total_count),
            total_count: record.total_count,
            status,
            pause_reason,
            requester: Requester {
                name: record.requester,
                delivery_is_private: record.delivery_is_private,
            },
            speed_factor: record.speed_factor,
            use_containers: record.use_containers,
            histogram: record.material_histogram,
            plan_digest: record.plan_digest,
            skipped: record.skipped,
            started_at: record.started_at,
            last_checkpoint_at: record.last_checkpoint_at,
        }
    }
}

// ---------------------------------------------------------------------------
// CheckpointRecord
// ---------------------------------------------------------------------------

/// Durable snapshot of one build session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct CheckpointRecord {
    /// Record layout version.
    pub format_version: u32,
    /// Session identifier.
    pub build_id: BuildId,
    /// Owning agent.
    pub agent: String,
    /// Source artifact.
    pub plan_source: PlanSource,
    /// Compile options, needed to rebuild an identical plan.
    pub options: CompileOptions,
    /// Absolute plan anchor.
    pub origin: BlockPos,
    /// Plan extents.
    pub dimensions: Dimensions,
    /// Index of the next op to process.
    pub cursor: u64,
    /// Successful placements.
    pub placed_count: u64,
    /// Non-empty ops in the plan.
    pub total_count: u64,
    /// Material totals of the whole plan.
    pub material_histogram: MaterialHistogram,
    /// Hex SHA-256 of the compiled plan.
    pub plan_digest: String,
    /// Indices of skipped placements.
    #[serde(default)]
    pub skipped: Vec<u64>,
    /// Session creation time.
    pub started_at: DateTime<Utc>,
    /// Time of the previous checkpoint write.
    pub last_checkpoint_at: Option<DateTime<Utc>>,
    /// Requester name.
    pub requester: String,
    /// Reply privately.
    pub delivery_is_private: bool,
    /// Placement rate multiplier.
    #[ts(as = "String")]
    pub speed_factor: Decimal,
    /// Restock from containers on a shortage.
    #[serde(default)]
    pub use_containers: bool,
    /// Status at the time of writing.
    pub status: BuildStatus,
    /// Set when the record was written while paused.
    #[serde(default)]
    pub pause_reason: Option<PauseReason>,
    /// Set on terminal records in the history list.
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
}

impl CheckpointRecord {
    /// Completion percentage of the record, rounded to one decimal place.
    pub fn percent(&self) -> Decimal {
        if self.total_count == 0 {
            return Decimal::ONE_HUNDRED;
        }
        Decimal::from(self.placed_count)
            .checked_mul(Decimal::ONE_HUNDRED)
            .and_then(|scaled| scaled.checked_div(Decimal::from(self.total_count)))
            .map_or(Decimal::ZERO, |pct| pct.round_dp(1))
    }
}

/// Status projection of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct SessionSummary {
    /// Session identifier.
    pub build_id: BuildId,
    /// Source artifact.
    pub source: PlanSource,
    /// Lifecycle status.
    pub status: BuildStatus,
    /// Successful placements.
    pub placed: u64,
    /// Non-empty ops in the plan.
    pub total: u64,
    /// Completion percentage (one decimal).
    #[ts(as = "String")]
    pub percent: Decimal,
    /// Index of the next op.
    pub cursor: u64,
    /// Plan extents.
    pub dimensions: Dimensions,
    /// Seconds since start.
    pub elapsed_seconds: i64,
    /// Set while paused.
    pub pause_reason: Option<PauseReason>,
    /// Number of skipped placements.
    pub skipped: u64,
    /// Agent distance to the origin, if the world reported a position.
    pub distance_to_origin: Option<f64>,
}
