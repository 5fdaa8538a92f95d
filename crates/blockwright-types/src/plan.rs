//! Placement plans and material histograms.
//!
//! A [`PlacementPlan`] is the immutable, ordered output of the plan compiler.
//! The executor walks it by index; the index is the only progress marker
//! that is persisted, so the ordering must never change after compilation.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::geometry::{BlockPos, Dimensions};

/// Symbolic material identifier (for example `red_wool`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct MaterialId(pub String);

impl MaterialId {
    /// Create a material id from any string-like value.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Borrow the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for MaterialId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MaterialId {
    fn from(name: &str) -> Self {
        Self(name.to_owned())
    }
}

/// One voxel of a plan: a relative offset and the material to place there,
/// or `None` for a position that must stay empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacementOp {
    /// Offset from the build origin.
    pub position: BlockPos,
    /// Material to place; `None` marks an empty op.
    pub material: Option<MaterialId>,
}

impl PlacementOp {
    /// A non-empty op placing `material` at `position`.
    pub const fn place(position: BlockPos, material: MaterialId) -> Self {
        Self {
            position,
            material: Some(material),
        }
    }

    /// An empty op; the executor skips it without touching counts.
    pub const fn empty(position: BlockPos) -> Self {
        Self {
            position,
            material: None,
        }
    }

    /// Whether this op places nothing.
    pub const fn is_empty(&self) -> bool {
        self.material.is_none()
    }
}

/// Ordered, immutable sequence of placement ops.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacementPlan {
    ops: Vec<PlacementOp>,
    dimensions: Dimensions,
    total_count: u64,
}

impl PlacementPlan {
    /// Freeze a sequence of ops into a plan.
    pub fn new(ops: Vec<PlacementOp>, dimensions: Dimensions) -> Self {
        let total_count = ops
            .iter()
            .filter(|op| !op.is_empty())
            .fold(0_u64, |acc, _| acc.saturating_add(1));
        Self {
            ops,
            dimensions,
            total_count,
        }
    }

    /// All ops in execution order.
    pub fn ops(&self) -> &[PlacementOp] {
        &self.ops
    }

    /// The op at `index`, if any.
    pub fn get(&self, index: u64) -> Option<&PlacementOp> {
        usize::try_from(index).ok().and_then(|i| self.ops.get(i))
    }

    /// Number of ops including empty ones.
    pub fn len(&self) -> u64 {
        u64::try_from(self.ops.len()).unwrap_or(u64::MAX)
    }

    /// Whether the plan has no ops at all.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Number of non-empty ops.
    pub const fn total_count(&self) -> u64 {
        self.total_count
    }

    /// Extents of the plan.
    pub const fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    /// Materials required by the whole plan.
    pub fn histogram(&self) -> MaterialHistogram {
        self.histogram_from(0)
    }

    /// Materials still required from op `cursor` onwards.
    pub fn histogram_from(&self, cursor: u64) -> MaterialHistogram {
        let start = usize::try_from(cursor).unwrap_or(usize::MAX);
        MaterialHistogram::from_ops(self.ops.iter().skip(start))
    }
}

/// Required count per material, derived by summing non-empty ops.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct MaterialHistogram(pub BTreeMap<MaterialId, u64>);

impl MaterialHistogram {
    /// Count the materials of the given ops.
    pub fn from_ops<'a>(ops: impl IntoIterator<Item = &'a PlacementOp>) -> Self {
        let mut counts: BTreeMap<MaterialId, u64> = BTreeMap::new();
        for material in ops.into_iter().filter_map(|op| op.material.as_ref()) {
            let entry = counts.entry(material.clone()).or_insert(0);
            *entry = entry.saturating_add(1);
        }
        Self(counts)
    }

    /// Required count for one material (zero if absent).
    pub fn get(&self, material: &MaterialId) -> u64 {
        self.0.get(material).copied().unwrap_or(0)
    }

    /// Sum of all required counts.
    pub fn total(&self) -> u64 {
        self.0.values().fold(0_u64, |acc, n| acc.saturating_add(*n))
    }

    /// Number of distinct materials.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no material is required.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate `(material, required)` pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&MaterialId, u64)> {
        self.0.iter().map(|(m, n)| (m, *n))
    }
}

impl FromIterator<(MaterialId, u64)> for MaterialHistogram {
    fn from_iter<I: IntoIterator<Item = (MaterialId, u64)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
