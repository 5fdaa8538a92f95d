//! Content digest of a compiled plan.
//!
//! The digest is stored in every checkpoint. On resume the plan is
//! recompiled and the digests are compared, so a source file edited between
//! runs cannot silently shift the cursor onto different ops.

use sha2::{Digest, Sha256};

use blockwright_types::PlacementPlan;

const EMPTY_MARKER: u32 = u32::MAX;

/// Hex SHA-256 over a canonical little-endian encoding of the plan.
pub fn plan_digest(plan: &PlacementPlan) -> String {
    let mut hasher = Sha256::new();
    let dims = plan.dimensions();
    hasher.update(dims.width.to_le_bytes());
    hasher.update(dims.height.to_le_bytes());
    hasher.update(dims.length.to_le_bytes());
    hasher.update(plan.len().to_le_bytes());
    for op in plan.ops() {
        hasher.update(op.position.x.to_le_bytes());
        hasher.update(op.position.y.to_le_bytes());
        hasher.update(op.position.z.to_le_bytes());
        match &op.material {
            Some(material) => {
                let name = material.as_str().as_bytes();
                let len = u32::try_from(name.len()).unwrap_or(EMPTY_MARKER.saturating_sub(1));
                hasher.update(len.to_le_bytes());
                hasher.update(name);
            }
            None => hasher.update(EMPTY_MARKER.to_le_bytes()),
        }
    }
    format!("{:x}", hasher.finalize())
}
