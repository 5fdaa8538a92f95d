//! World capabilities the executor drives.
//!
//! The executor never talks to a game connection directly. It holds an
//! `Arc<dyn WorldActions>` and calls these methods from its step loop; any
//! of them may be slow, and navigation in particular can take seconds.

use async_trait::async_trait;

use blockwright_types::{BlockPos, MaterialId, Position};

use crate::error::ActionError;

/// Actions an agent can take in the world.
#[async_trait]
pub trait WorldActions: Send + Sync {
    /// Current agent position, or `None` while the world has not reported
    /// one yet.
    async fn position(&self) -> Option<Position>;

    /// Walk until within `range` of `target`.
    async fn navigate(&self, target: BlockPos, range: f64) -> Result<(), ActionError>;

    /// Place `material` at `target`, attaching it to `reference` when the
    /// world needs a supporting face.
    async fn place(
        &self,
        target: BlockPos,
        material: &MaterialId,
        reference: Option<BlockPos>,
    ) -> Result<(), ActionError>;

    /// How many of `material` the agent holds.
    async fn inventory_count(&self, material: &MaterialId) -> u64;

    /// Put `material` in the agent's hand.
    async fn equip(&self, material: &MaterialId) -> Result<(), ActionError>;

    /// Take `material` from the nearest container. Returns how many the
    /// agent holds afterwards.
    async fn restock(&self, material: &MaterialId) -> Result<u64, ActionError>;
}
