//! Registries of live animals and plants.

use crate::entity::{Entity, EntityHandle};
use ecosim_core::{EntityId, EntityKind};
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// The authoritative set of live entities, keyed by id.
///
/// Ordered maps keep snapshots in creation order, which makes the engine's
/// shuffles reproducible for a given seed.
#[derive(Debug, Default)]
pub struct Population {
    animals: RwLock<BTreeMap<EntityId, EntityHandle>>,
    plants: RwLock<BTreeMap<EntityId, EntityHandle>>,
}

impl Population {
    pub fn new() -> Self {
        Self::default()
    }

    fn registry(&self, kind: EntityKind) -> &RwLock<BTreeMap<EntityId, EntityHandle>> {
        match kind {
            EntityKind::Animal => &self.animals,
            EntityKind::Plant => &self.plants,
        }
    }

    pub fn insert(&self, entity: EntityHandle) {
        self.registry(entity.kind())
            .write()
            .insert(entity.id(), entity);
    }

    pub fn remove(&self, entity: &Entity) -> Option<EntityHandle> {
        self.registry(entity.kind()).write().remove(&entity.id())
    }

    pub fn contains(&self, entity: &Entity) -> bool {
        self.registry(entity.kind())
            .read()
            .contains_key(&entity.id())
    }

    pub fn animal_count(&self) -> usize {
        self.animals.read().len()
    }

    pub fn plant_count(&self) -> usize {
        self.plants.read().len()
    }

    /// Live animals in creation order
    pub fn animals(&self) -> Vec<EntityHandle> {
        self.animals.read().values().cloned().collect()
    }

    /// Live plants in creation order
    pub fn plants(&self) -> Vec<EntityHandle> {
        self.plants.read().values().cloned().collect()
    }

    pub fn clear(&self) {
        self.animals.write().clear();
        self.plants.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ecosim_core::{Position, SimulationConfig};

    #[test]
    fn test_insert_and_remove() {
        let config = SimulationConfig::default();
        let population = Population::new();
        let animal = Entity::animal(EntityId(2), Position::new(0, 0), &config).into_handle();
        let plant = Entity::plant(EntityId(1), Position::new(1, 0), &config).into_handle();

        population.insert(animal.clone());
        population.insert(plant.clone());
        assert_eq!(population.animal_count(), 1);
        assert_eq!(population.plant_count(), 1);
        assert!(population.contains(&animal));

        assert!(population.remove(&animal).is_some());
        assert!(!population.contains(&animal));
        assert!(population.remove(&animal).is_none());
    }

    #[test]
    fn test_snapshots_are_in_creation_order() {
        let config = SimulationConfig::default();
        let population = Population::new();
        for id in [5, 1, 3] {
            population.insert(Entity::animal(EntityId(id), Position::new(0, 0), &config).into_handle());
        }

        let ids: Vec<EntityId> = population.animals().iter().map(|a| a.id()).collect();
        assert_eq!(ids, vec![EntityId(1), EntityId(3), EntityId(5)]);

        population.clear();
        assert_eq!(population.animal_count(), 0);
    }
}
