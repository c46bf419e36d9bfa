//! Entity state and the Animal/Plant behaviors.

use ecosim_core::{EntityId, EntityKind, Error, Position, Result, SimulationConfig};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Shared reference to a live entity.
///
/// The engine's registries own the authoritative handles; grid cells hold
/// clones of the same handles for spatial queries.
pub type EntityHandle = Arc<Entity>;

/// Mutable part of an entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityState {
    pub position: Position,
    pub energy: i32,
    pub age: u32,
}

/// An animal or a plant on the grid.
///
/// Identity and variant never change after construction. Position, energy
/// and age live behind a lock so a renderer can read them while the engine
/// thread mutates them; every method takes the lock once and releases it
/// before returning.
#[derive(Debug)]
pub struct Entity {
    id: EntityId,
    kind: EntityKind,
    state: RwLock<EntityState>,
}

impl Entity {
    /// Create an entity with the given starting energy, clamped to its
    /// variant's current maximum.
    pub fn new(
        id: EntityId,
        kind: EntityKind,
        position: Position,
        energy: i32,
        config: &SimulationConfig,
    ) -> Self {
        let energy = energy.clamp(0, max_energy(kind, config));
        Self {
            id,
            kind,
            state: RwLock::new(EntityState {
                position,
                energy,
                age: 0,
            }),
        }
    }

    /// Create a fresh animal with the configured initial energy
    pub fn animal(id: EntityId, position: Position, config: &SimulationConfig) -> Self {
        Self::new(id, EntityKind::Animal, position, config.initial_energy(), config)
    }

    /// Create a fresh plant with the configured initial energy
    pub fn plant(id: EntityId, position: Position, config: &SimulationConfig) -> Self {
        Self::new(id, EntityKind::Plant, position, config.initial_energy(), config)
    }

    pub fn into_handle(self) -> EntityHandle {
        Arc::new(self)
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn is_animal(&self) -> bool {
        self.kind == EntityKind::Animal
    }

    pub fn is_plant(&self) -> bool {
        self.kind == EntityKind::Plant
    }

    /// Consistent copy of position, energy and age
    pub fn state(&self) -> EntityState {
        *self.state.read()
    }

    pub fn position(&self) -> Position {
        self.state.read().position
    }

    pub fn energy(&self) -> i32 {
        self.state.read().energy
    }

    pub fn age(&self) -> u32 {
        self.state.read().age
    }

    pub fn max_energy(&self, config: &SimulationConfig) -> i32 {
        max_energy(self.kind, config)
    }

    pub fn increment_age(&self) {
        self.state.write().age += 1;
    }

    /// Add energy, capped at the variant maximum
    pub fn add_energy(&self, amount: i32, config: &SimulationConfig) {
        let max = self.max_energy(config);
        let mut state = self.state.write();
        state.energy = state.energy.saturating_add(amount).min(max);
    }

    /// Bring energy back under the variant maximum after the maximum was lowered
    pub fn cap_energy(&self, config: &SimulationConfig) {
        let max = self.max_energy(config);
        let mut state = self.state.write();
        state.energy = state.energy.min(max);
    }

    /// Remove energy, floored at zero
    pub fn reduce_energy(&self, amount: i32) {
        let mut state = self.state.write();
        state.energy = state.energy.saturating_sub(amount).max(0);
    }

    pub fn is_dead(&self, config: &SimulationConfig) -> bool {
        let state = self.state.read();
        state.energy <= 0 || state.age >= max_age(config)
    }

    pub fn can_reproduce(&self, config: &SimulationConfig) -> bool {
        self.age() >= config.reproductive_age().max(0) as u32
    }

    /// Animal feeds on a plant.
    ///
    /// The animal always gains the full transfer amount, even when the plant
    /// holds less than that; the plant loses the same amount, floored at zero.
    pub fn eat(&self, plant: &Entity, config: &SimulationConfig) -> Result<()> {
        if !self.is_animal() {
            return Err(Error::InvalidEntity(format!(
                "{} {} cannot eat",
                self.kind, self.id
            )));
        }
        if !plant.is_plant() {
            return Err(Error::InvalidEntity(format!(
                "{} {} is not edible",
                plant.kind, plant.id
            )));
        }

        let transfer = config.energy_transfer();
        self.add_energy(transfer, config);
        plant.reduce_energy(transfer);
        Ok(())
    }

    /// Animal produces an offspring at `position`.
    ///
    /// The parent pays the transfer amount; the offspring starts at age 0
    /// with the configured initial energy.
    pub fn reproduce(
        &self,
        offspring_id: EntityId,
        position: Position,
        config: &SimulationConfig,
    ) -> Result<Entity> {
        if !self.is_animal() {
            return Err(Error::InvalidEntity(format!(
                "{} {} cannot reproduce",
                self.kind, self.id
            )));
        }

        self.reduce_energy(config.energy_transfer());
        Ok(Entity::animal(offspring_id, position, config))
    }

    pub(crate) fn set_position(&self, position: Position) {
        self.state.write().position = position;
    }
}

fn max_energy(kind: EntityKind, config: &SimulationConfig) -> i32 {
    match kind {
        EntityKind::Animal => config.max_animal_energy(),
        EntityKind::Plant => config.max_plant_energy(),
    }
}

fn max_age(config: &SimulationConfig) -> u32 {
    config.max_age().max(0) as u32
}
