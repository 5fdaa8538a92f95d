//! Material availability gate.
//!
//! Compares a [`MaterialHistogram`] against what the agent holds. The report
//! is advisory: a build starts regardless, and the executor's runtime
//! shortage check is what actually pauses a session.

use blockwright_types::{MaterialHistogram, MaterialId};

use crate::capabilities::WorldActions;

/// Requirement and holdings for one material.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterialLine {
    /// Material.
    pub material: MaterialId,
    /// Blocks the plan needs.
    pub required: u64,
    /// Blocks the agent holds.
    pub available: u64,
    /// `required - available`, floored at zero.
    pub deficit: u64,
}

/// Gate result over a whole histogram.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GateReport {
    /// One line per material, in histogram order.
    pub lines: Vec<MaterialLine>,
    /// `"name: available/required"` for every line with a deficit.
    pub deficits: Vec<String>,
}

impl GateReport {
    /// No material is short.
    pub fn is_satisfied(&self) -> bool {
        self.deficits.is_empty()
    }

    /// The first `n` deficit strings.
    pub fn top(&self, n: usize) -> Vec<String> {
        self.deficits.iter().take(n).cloned().collect()
    }

    /// Sum of all deficits.
    pub fn total_deficit(&self) -> u64 {
        self.lines
            .iter()
            .fold(0_u64, |acc, line| acc.saturating_add(line.deficit))
    }
}

/// Evaluate `histogram` against a holdings lookup.
pub fn evaluate(
    histogram: &MaterialHistogram,
    mut holdings: impl FnMut(&MaterialId) -> u64,
) -> GateReport {
    let mut report = GateReport::default();
    for (material, required) in histogram.iter() {
        let available = holdings(material);
        let deficit = required.saturating_sub(available);
        if deficit > 0 {
            report
                .deficits
                .push(format!("{material}: {available}/{required}"));
        }
        report.lines.push(MaterialLine {
            material: material.clone(),
            required,
            available,
            deficit,
        });
    }
    report
}

/// Snapshot holdings through the world and evaluate `histogram`.
pub async fn survey(histogram: &MaterialHistogram, world: &dyn WorldActions) -> GateReport {
    let mut counts = Vec::with_capacity(histogram.len());
    for (material, _) in histogram.iter() {
        counts.push((material.clone(), world.inventory_count(material).await));
    }
    evaluate(histogram, |material| {
        counts
            .iter()
            .find(|(m, _)| m == material)
            .map_or(0, |(_, count)| *count)
    })
}
