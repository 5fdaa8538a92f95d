//! A scriptable in-process world.
//!
//! [`SimulatedWorld`] implements [`WorldActions`] without a game connection.
//! The binary uses it for dry runs and the tests use it to script
//! shortages, container restocks, navigation failures, failed placements
//! and displacement.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use blockwright_types::{BlockPos, MaterialId, Position};

use crate::capabilities::WorldActions;
use crate::error::ActionError;

#[derive(Debug, Default)]
struct WorldState {
    position: Option<Position>,
    unlimited: bool,
    inventory: BTreeMap<MaterialId, u64>,
    containers: BTreeMap<MaterialId, u64>,
    restocks: u64,
    blocks: BTreeMap<BlockPos, MaterialId>,
    placements: Vec<(BlockPos, MaterialId)>,
    navigations: u64,
    fail_navigation: bool,
    fail_all_placements: bool,
    fail_place_at: BTreeSet<BlockPos>,
    displace_after: Option<(u64, Position)>,
}

/// In-memory world with scripted failure knobs.
#[derive(Debug, Default)]
pub struct SimulatedWorld {
    state: Mutex<WorldState>,
}

impl SimulatedWorld {
    /// World with the agent standing at `position` and an empty inventory.
    pub fn new(position: Position) -> Self {
        Self {
            state: Mutex::new(WorldState {
                position: Some(position),
                ..WorldState::default()
            }),
        }
    }

    /// World where every material is always in stock.
    pub fn unlimited(position: Position) -> Self {
        let world = Self::new(position);
        world.state().unlimited = true;
        world
    }

    fn state(&self) -> MutexGuard<'_, WorldState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Give the agent `count` of `material` (replacing any previous count).
    #[must_use]
    pub fn with_item(self, material: &str, count: u64) -> Self {
        self.set_item(material, count);
        self
    }

    /// Set the held count of `material`.
    pub fn set_item(&self, material: &str, count: u64) {
        self.state().inventory.insert(MaterialId::from(material), count);
    }

    /// Put `count` of `material` in a nearby container.
    pub fn stock_container(&self, material: &str, count: u64) {
        self.state()
            .containers
            .insert(MaterialId::from(material), count);
    }

    /// Restock calls made so far, successful or not.
    pub fn restock_count(&self) -> u64 {
        self.state().restocks
    }

    /// Teleport the agent. `None` simulates a world that has not reported a
    /// position yet.
    pub fn set_position(&self, position: Option<Position>) {
        self.state().position = position;
    }

    /// Make every navigation attempt fail.
    pub fn set_fail_navigation(&self, fail: bool) {
        self.state().fail_navigation = fail;
    }

    /// Make every placement attempt fail.
    pub fn set_fail_placements(&self, fail: bool) {
        self.state().fail_all_placements = fail;
    }

    /// Make placements at `target` fail.
    pub fn fail_placement_at(&self, target: BlockPos) {
        self.state().fail_place_at.insert(target);
    }

    /// After `placements` more successful placements, move the agent to
    /// `position`.
    pub fn displace_after(&self, placements: u64, position: Position) {
        let mut state = self.state();
        let done = u64::try_from(state.placements.len()).unwrap_or(u64::MAX);
        state.displace_after = Some((done.saturating_add(placements), position));
    }

    /// Every successful placement in order.
    pub fn placements(&self) -> Vec<(BlockPos, MaterialId)> {
        self.state().placements.clone()
    }

    /// The block at `pos`, if one was placed.
    pub fn block_at(&self, pos: BlockPos) -> Option<MaterialId> {
        self.state().blocks.get(&pos).cloned()
    }

    /// Navigation calls made so far, successful or not.
    pub fn navigation_count(&self) -> u64 {
        self.state().navigations
    }
}

#[async_trait]
impl WorldActions for SimulatedWorld {
    async fn position(&self) -> Option<Position> {
        self.state().position
    }

    async fn navigate(&self, target: BlockPos, _range: f64) -> Result<(), ActionError> {
        let mut state = self.state();
        state.navigations = state.navigations.saturating_add(1);
        if state.fail_navigation {
            return Err(ActionError::NavigationFailed {
                target,
                reason: "no path".to_owned(),
            });
        }
        state.position = Some(target.to_position());
        Ok(())
    }

    async fn place(
        &self,
        target: BlockPos,
        material: &MaterialId,
        _reference: Option<BlockPos>,
    ) -> Result<(), ActionError> {
        let mut state = self.state();
        if state.fail_all_placements || state.fail_place_at.contains(&target) {
            return Err(ActionError::PlacementFailed {
                target,
                material: material.clone(),
                reason: "placement rejected".to_owned(),
            });
        }
        if !state.unlimited {
            let Some(count) = state.inventory.get_mut(material).filter(|c| **c > 0) else {
                return Err(ActionError::PlacementFailed {
                    target,
                    material: material.clone(),
                    reason: "not in inventory".to_owned(),
                });
            };
            *count = count.saturating_sub(1);
        }
        state.blocks.insert(target, material.clone());
        state.placements.push((target, material.clone()));

        let done = u64::try_from(state.placements.len()).unwrap_or(u64::MAX);
        if let Some((at, position)) = state.displace_after {
            if done >= at {
                state.position = Some(position);
                state.displace_after = None;
            }
        }
        Ok(())
    }

    async fn inventory_count(&self, material: &MaterialId) -> u64 {
        let state = self.state();
        if state.unlimited {
            return u64::MAX;
        }
        state.inventory.get(material).copied().unwrap_or(0)
    }

    async fn equip(&self, material: &MaterialId) -> Result<(), ActionError> {
        let state = self.state();
        if state.unlimited || state.inventory.get(material).is_some_and(|c| *c > 0) {
            Ok(())
        } else {
            Err(ActionError::EquipFailed {
                material: material.clone(),
            })
        }
    }

    async fn restock(&self, material: &MaterialId) -> Result<u64, ActionError> {
        let mut state = self.state();
        state.restocks = state.restocks.saturating_add(1);
        if state.unlimited {
            return Ok(u64::MAX);
        }
        let taken = state.containers.remove(material).unwrap_or(0);
        if taken == 0 {
            return Err(ActionError::RestockFailed {
                material: material.clone(),
                reason: "no container holds it".to_owned(),
            });
        }
        let held = state.inventory.entry(material.clone()).or_insert(0);
        *held = held.saturating_add(taken);
        Ok(*held)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn placing_consumes_inventory() {
        let world = SimulatedWorld::new(Position::new(0.0, 64.0, 0.0)).with_item("stone", 1);
        let stone = MaterialId::from("stone");
        world.place(BlockPos::new(0, 64, 0), &stone, None).await.unwrap();
        assert_eq!(world.inventory_count(&stone).await, 0);
        assert!(world.place(BlockPos::new(1, 64, 0), &stone, None).await.is_err());
        assert!(world.equip(&stone).await.is_err());
        assert_eq!(world.block_at(BlockPos::new(0, 64, 0)), Some(stone));
    }

    #[tokio::test]
    async fn restock_empties_the_container_into_the_inventory() {
        let world = SimulatedWorld::new(Position::new(0.0, 64.0, 0.0)).with_item("oak_planks", 2);
        let planks = MaterialId::from("oak_planks");
        world.stock_container("oak_planks", 30);
        assert_eq!(world.restock(&planks).await.unwrap(), 32);
        assert!(matches!(
            world.restock(&planks).await,
            Err(ActionError::RestockFailed { .. })
        ));
        assert_eq!(world.inventory_count(&planks).await, 32);
        assert_eq!(world.restock_count(), 2);
    }

    #[tokio::test]
    async fn displacement_triggers_after_scripted_placements() {
        let world = SimulatedWorld::unlimited(Position::new(0.0, 64.0, 0.0));
        let far = Position::new(100.0, 64.0, 0.0);
        world.displace_after(2, far);
        let dirt = MaterialId::from("dirt");
        world.place(BlockPos::new(0, 64, 0), &dirt, None).await.unwrap();
        assert_eq!(world.position().await, Some(Position::new(0.0, 64.0, 0.0)));
        world.place(BlockPos::new(1, 64, 0), &dirt, None).await.unwrap();
        assert_eq!(world.position().await, Some(far));
        assert_eq!(world.placements().len(), 2);
    }

    #[tokio::test]
    async fn navigation_moves_the_agent_unless_scripted_to_fail() {
        let world = SimulatedWorld::new(Position::new(0.0, 64.0, 0.0));
        world.navigate(BlockPos::new(5, 64, 5), 1.0).await.unwrap();
        assert_eq!(world.position().await, Some(Position::new(5.0, 64.0, 5.0)));
        world.set_fail_navigation(true);
        assert!(world.navigate(BlockPos::ORIGIN, 1.0).await.is_err());
        assert_eq!(world.navigation_count(), 2);
    }
}
