//! Drift monitor: how far the agent has wandered from where it must be.

use blockwright_types::{BlockPos, Position};

/// Distance bands for placement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriftThresholds {
    /// At or below this distance the agent places without moving.
    pub reach: f64,
    /// Above this distance the agent must return to the origin.
    pub relocate: f64,
}

impl DriftThresholds {
    /// Thresholds with the given bands.
    pub const fn new(reach: f64, relocate: f64) -> Self {
        Self { reach, relocate }
    }
}

impl Default for DriftThresholds {
    fn default() -> Self {
        Self::new(4.5, 10.0)
    }
}

/// Which band a distance falls in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriftClass {
    /// Place directly.
    InRange,
    /// Walk toward the target first.
    NeedsNavigate,
    /// Walk back to the origin before anything else.
    NeedsRelocate,
}

impl DriftClass {
    /// Lowercase name for logs.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InRange => "in_range",
            Self::NeedsNavigate => "needs_navigate",
            Self::NeedsRelocate => "needs_relocate",
        }
    }
}

/// A classified distance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriftReading {
    /// Band.
    pub class: DriftClass,
    /// Euclidean distance from the agent to the anchor's corner.
    pub distance: f64,
}

/// Classify the agent's distance to `anchor`.
pub fn classify(thresholds: DriftThresholds, anchor: BlockPos, agent: &Position) -> DriftReading {
    let distance = agent.distance_to(&anchor.to_position());
    let class = if distance <= thresholds.reach {
        DriftClass::InRange
    } else if distance <= thresholds.relocate {
        DriftClass::NeedsNavigate
    } else {
        DriftClass::NeedsRelocate
    };
    DriftReading { class, distance }
}
