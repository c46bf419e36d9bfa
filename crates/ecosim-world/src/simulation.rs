//! Simulation engine: one cycle of aging, feeding, movement, reproduction and death.

use crate::entity::{Entity, EntityHandle};
use crate::grid::Grid;
use crate::population::Population;
use crate::stats::{StatsSink, StatsSnapshot};
use ecosim_core::{
    EntityId, EntityKind, Error, Neighborhood, Position, Result, RunId, SharedConfig,
    SimulationConfig, WorldConfig,
};
use parking_lot::RwLock;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, instrument, trace, warn};

/// Lifecycle of an engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimulationState {
    Uninitialized,
    Initialized,
    Running,
    /// Halted by an explicit stop request
    Stopped,
    /// A cycle reported an unbalanced ecosystem
    Completed,
}

impl fmt::Display for SimulationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SimulationState::Uninitialized => "uninitialized",
            SimulationState::Initialized => "initialized",
            SimulationState::Running => "running",
            SimulationState::Stopped => "stopped",
            SimulationState::Completed => "completed",
        };
        f.write_str(name)
    }
}

/// Outcome of the per-cycle population bounds check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Balance {
    Balanced,
    NoAnimals,
    NoPlants,
    /// More animals than cells left over by the plants
    Overcrowded,
}

impl Balance {
    pub fn evaluate(animals: usize, plants: usize, cell_count: usize) -> Self {
        if animals == 0 {
            Balance::NoAnimals
        } else if plants == 0 {
            Balance::NoPlants
        } else if animals > cell_count.saturating_sub(plants) {
            Balance::Overcrowded
        } else {
            Balance::Balanced
        }
    }

    pub fn is_balanced(&self) -> bool {
        *self == Balance::Balanced
    }

    pub fn reason(&self) -> Option<&'static str> {
        match self {
            Balance::Balanced => None,
            Balance::NoAnimals => Some("No more animals remaining"),
            Balance::NoPlants => Some("No more plants remaining"),
            Balance::Overcrowded => Some("Too many animals"),
        }
    }
}

#[derive(Debug)]
struct Control {
    state: RwLock<SimulationState>,
    cycle: AtomicU64,
    stop_requested: AtomicBool,
    neighborhood: RwLock<Neighborhood>,
}

impl Control {
    fn new(neighborhood: Neighborhood) -> Self {
        Self {
            state: RwLock::new(SimulationState::Uninitialized),
            cycle: AtomicU64::new(0),
            stop_requested: AtomicBool::new(false),
            neighborhood: RwLock::new(neighborhood),
        }
    }

    fn state(&self) -> SimulationState {
        *self.state.read()
    }

    fn set_state(&self, state: SimulationState) {
        *self.state.write() = state;
    }
}

/// Cloneable handle to an engine's cooperative stop flag
#[derive(Debug, Clone)]
pub struct StopHandle {
    control: Arc<Control>,
}

impl StopHandle {
    /// Ask the engine to stop; honored at the top of its next cycle
    pub fn stop(&self) {
        self.control.stop_requested.store(true, Ordering::SeqCst);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.control.stop_requested.load(Ordering::SeqCst)
    }
}

/// Read-only view of a running engine for another thread
#[derive(Debug, Clone)]
pub struct SimulationObserver {
    run_id: RunId,
    grid: Arc<Grid>,
    population: Arc<Population>,
    stats: Arc<StatsSink>,
    control: Arc<Control>,
}

impl SimulationObserver {
    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn animal_count(&self) -> usize {
        self.population.animal_count()
    }

    pub fn plant_count(&self) -> usize {
        self.population.plant_count()
    }

    pub fn births(&self) -> u64 {
        self.stats.births()
    }

    pub fn deaths(&self) -> u64 {
        self.stats.deaths()
    }

    pub fn current_cycle(&self) -> u64 {
        self.control.cycle.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> SimulationState {
        self.control.state()
    }

    pub fn neighborhood(&self) -> Neighborhood {
        *self.control.neighborhood.read()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn render(&self) -> String {
        self.grid.render()
    }
}

/// Grid-based predator/prey simulation.
///
/// Owns its grid, registries and statistics; nothing is shared with other
/// engines. Cycles run on whichever thread calls [`Simulation::execute_cycle`],
/// while [`SimulationObserver`] and [`StopHandle`] may be used from others.
pub struct Simulation {
    run_id: RunId,
    world: WorldConfig,
    config: SharedConfig,
    grid: Arc<Grid>,
    population: Arc<Population>,
    stats: Arc<StatsSink>,
    control: Arc<Control>,
    rng: ChaCha8Rng,
    next_id: u64,
}

impl Simulation {
    /// Create an engine seeded from `world.seed`, or from entropy when unset
    pub fn new(world: WorldConfig, config: SharedConfig, stats: StatsSink) -> Result<Self> {
        let rng = match world.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        Self::with_rng(world, config, stats, rng)
    }

    /// Create an engine driven by the given random source
    pub fn with_rng(
        world: WorldConfig,
        config: SharedConfig,
        stats: StatsSink,
        rng: ChaCha8Rng,
    ) -> Result<Self> {
        world.validate()?;
        let grid = Arc::new(Grid::from_config(&world)?);
        let control = Arc::new(Control::new(world.neighborhood));

        Ok(Self {
            run_id: RunId::new(),
            world,
            config,
            grid,
            population: Arc::new(Population::new()),
            stats: Arc::new(stats),
            control,
            rng,
            next_id: 0,
        })
    }

    /// Seed the grid with the configured numbers of animals and plants.
    ///
    /// Every entity goes to a distinct, randomly drawn empty cell. Running out
    /// of placement attempts leaves the engine uninitialized and empty.
    #[instrument(skip(self), fields(run_id = %self.run_id))]
    pub fn initialize(&mut self) -> Result<()> {
        self.ensure_uninitialized()?;
        let config = self.config_snapshot();

        if let Err(e) = self.populate(&config) {
            warn!(error = %e, "Initialization failed, clearing world");
            self.clear_world();
            return Err(e);
        }

        self.finish_initialization();
        Ok(())
    }

    /// Seed the grid with entities at fixed positions.
    ///
    /// Positions may repeat; a cell then starts in overflow.
    pub fn initialize_with_layout(&mut self, layout: &[(EntityKind, Position)]) -> Result<()> {
        self.ensure_uninitialized()?;
        let config = self.config_snapshot();

        for &(kind, position) in layout {
            if let Err(e) = self.spawn(kind, position, &config) {
                self.clear_world();
                return Err(e);
            }
        }

        self.finish_initialization();
        Ok(())
    }

    fn ensure_uninitialized(&self) -> Result<()> {
        match self.state() {
            SimulationState::Uninitialized => Ok(()),
            state => Err(Error::InvalidState(format!(
                "cannot initialize a simulation that is {}",
                state
            ))),
        }
    }

    fn populate(&mut self, config: &SimulationConfig) -> Result<()> {
        for _ in 0..config.initial_animal_count() {
            let position = self.find_random_empty_position()?;
            self.spawn(EntityKind::Animal, position, config)?;
        }
        for _ in 0..config.initial_plant_count() {
            let position = self.find_random_empty_position()?;
            self.spawn(EntityKind::Plant, position, config)?;
        }
        Ok(())
    }

    fn finish_initialization(&self) {
        self.control.set_state(SimulationState::Initialized);
        info!(
            event = "simulation_initialized",
            run_id = %self.run_id,
            width = self.world.width,
            height = self.world.height,
            animals = self.population.animal_count(),
            plants = self.population.plant_count(),
            neighborhood = %self.neighborhood(),
            "Simulation initialized"
        );
    }

    /// Run one full cycle and return the balance verdict.
    ///
    /// Returns `Ok(false)` without doing anything once a stop has been
    /// requested. An unbalanced verdict moves the engine to `Completed`, but
    /// further cycles may still be run.
    #[instrument(skip(self), fields(cycle = self.current_cycle()))]
    pub fn execute_cycle(&mut self) -> Result<bool> {
        match self.state() {
            SimulationState::Uninitialized => {
                return Err(Error::InvalidState(
                    "simulation has not been initialized".to_string(),
                ))
            }
            SimulationState::Stopped => return Ok(false),
            _ => {}
        }

        if self.control.stop_requested.load(Ordering::SeqCst) {
            self.control.set_state(SimulationState::Stopped);
            info!(
                event = "simulation_stopped",
                cycle = self.current_cycle(),
                "Simulation stopped"
            );
            return Ok(false);
        }

        if self.state() == SimulationState::Initialized {
            self.control.set_state(SimulationState::Running);
        }

        let config = self.config_snapshot();
        let neighborhood = self.neighborhood();
        let cycle = self.current_cycle();

        let live = self.population.animals().into_iter().chain(self.population.plants());
        for entity in live {
            entity.cap_energy(&config);
        }

        self.process_animals(&config, neighborhood)?;
        self.process_plants(&config)?;

        let animals = self.population.animal_count();
        let plants = self.population.plant_count();
        let balance = Balance::evaluate(animals, plants, self.grid.cell_count());
        if let Some(reason) = balance.reason() {
            info!(
                event = "ecosystem_unbalanced",
                cycle,
                animals,
                plants,
                "Ecosystem unbalanced: {}",
                reason
            );
            self.stats
                .record_event(format!("Ecosystem unbalanced: {}", reason));
            self.control.set_state(SimulationState::Completed);
        }

        self.stats.report_cycle(cycle, animals, plants);
        self.control.cycle.fetch_add(1, Ordering::SeqCst);

        Ok(balance.is_balanced())
    }

    fn process_animals(
        &mut self,
        config: &SimulationConfig,
        neighborhood: Neighborhood,
    ) -> Result<()> {
        let mut animals = self.population.animals();
        animals.shuffle(&mut self.rng);

        for animal in animals {
            if !self.population.contains(&animal) {
                continue;
            }

            animal.increment_age();
            animal.reduce_energy(1);

            if animal.is_dead(config) {
                self.remove_dead(&animal, config)?;
                continue;
            }

            self.move_animal(&animal, config, neighborhood)?;

            if animal.can_reproduce(config) && animal.energy() > config.energy_transfer() {
                self.try_reproduce(&animal, config, neighborhood)?;
            }
        }

        Ok(())
    }

    /// Eat the first plant found among shuffled neighbors, or step into the
    /// first neighbor cell when there is none.
    fn move_animal(
        &mut self,
        animal: &EntityHandle,
        config: &SimulationConfig,
        neighborhood: Neighborhood,
    ) -> Result<()> {
        let grid = Arc::clone(&self.grid);
        let from = animal.position();
        let mut neighbors = grid.neighbors(from, neighborhood)?;
        neighbors.shuffle(&mut self.rng);

        let prey = neighbors
            .iter()
            .find_map(|cell| cell.find_kind(EntityKind::Plant));

        if let Some(plant) = prey {
            animal.eat(&plant, config)?;
            trace!(animal = %animal.id(), plant = %plant.id(), energy = animal.energy(), "Animal fed");

            if plant.is_dead(config) {
                self.remove_entity(&plant)?;
                self.stats.record_death();
                self.stats.record_event(format!("Plant {} eaten", plant.id()));
                debug!(event = "plant_eaten", plant = %plant.id(), by = %animal.id(), "Plant eaten");
            }
            return Ok(());
        }

        if let Some(target) = neighbors.first() {
            grid.move_entity(animal, from, target.position())?;
        }

        Ok(())
    }

    /// Place an offspring in an empty neighbor cell when a qualifying mate is
    /// adjacent. The mate is only required to exist; it pays nothing.
    fn try_reproduce(
        &mut self,
        animal: &EntityHandle,
        config: &SimulationConfig,
        neighborhood: Neighborhood,
    ) -> Result<()> {
        let grid = Arc::clone(&self.grid);
        let mut neighbors = grid.neighbors(animal.position(), neighborhood)?;
        neighbors.shuffle(&mut self.rng);

        let transfer = config.energy_transfer();
        let has_mate = neighbors.iter().any(|cell| {
            cell.entities().iter().any(|other| {
                other.is_animal() && other.can_reproduce(config) && other.energy() > transfer
            })
        });
        if !has_mate {
            return Ok(());
        }

        let Some(nest) = neighbors.iter().find(|cell| cell.is_empty()) else {
            trace!(animal = %animal.id(), "No empty cell for offspring");
            return Ok(());
        };

        let offspring_id = self.allocate_id();
        let offspring = animal
            .reproduce(offspring_id, nest.position(), config)?
            .into_handle();
        grid.add_entity(&offspring, nest.position())?;
        self.population.insert(Arc::clone(&offspring));

        self.stats.record_birth();
        self.stats
            .record_event(format!("Animal {} born", offspring.id()));
        debug!(
            event = "animal_born",
            parent = %animal.id(),
            offspring = %offspring.id(),
            position = %nest.position(),
            "Animal born"
        );

        Ok(())
    }

    fn process_plants(&mut self, config: &SimulationConfig) -> Result<()> {
        for plant in self.population.plants() {
            if !self.population.contains(&plant) {
                continue;
            }

            plant.increment_age();
            plant.add_energy(1, config);

            if plant.is_dead(config) {
                self.remove_dead(&plant, config)?;
            }
        }
        Ok(())
    }

    fn remove_dead(&self, entity: &Entity, config: &SimulationConfig) -> Result<()> {
        self.remove_entity(entity)?;
        self.stats.record_death();

        let cause = if entity.energy() <= 0 {
            match entity.kind() {
                EntityKind::Animal => "starved",
                EntityKind::Plant => "withered",
            }
        } else {
            "died of old age"
        };
        let label = match entity.kind() {
            EntityKind::Animal => "Animal",
            EntityKind::Plant => "Plant",
        };
        self.stats
            .record_event(format!("{} {} {}", label, entity.id(), cause));
        debug!(
            event = "entity_death",
            id = %entity.id(),
            kind = %entity.kind(),
            age = entity.age(),
            max_age = config.max_age(),
            cause,
            "Entity died"
        );

        Ok(())
    }

    fn remove_entity(&self, entity: &Entity) -> Result<()> {
        self.grid.remove_entity(entity)?;
        self.population.remove(entity);
        Ok(())
    }

    fn spawn(
        &mut self,
        kind: EntityKind,
        position: Position,
        config: &SimulationConfig,
    ) -> Result<EntityHandle> {
        let id = self.allocate_id();
        let entity = Entity::new(id, kind, position, config.initial_energy(), config).into_handle();
        self.grid.add_entity(&entity, position)?;
        self.population.insert(Arc::clone(&entity));
        Ok(entity)
    }

    fn allocate_id(&mut self) -> EntityId {
        let id = EntityId(self.next_id);
        self.next_id += 1;
        id
    }

    fn find_random_empty_position(&mut self) -> Result<Position> {
        let attempts = self.grid.cell_count();
        let (width, height) = (self.grid.width(), self.grid.height());

        for _ in 0..attempts {
            let pos = Position::new(self.rng.gen_range(0..width), self.rng.gen_range(0..height));
            if self.grid.cell(pos)?.is_empty() {
                return Ok(pos);
            }
        }

        Err(Error::ResourceExhausted(format!(
            "could not find an empty cell after {} attempts",
            attempts
        )))
    }

    fn clear_world(&mut self) {
        self.grid.clear();
        self.population.clear();
        self.next_id = 0;
    }

    fn config_snapshot(&self) -> SimulationConfig {
        self.config.read().clone()
    }

    /// Return to `Uninitialized` with an empty grid, zeroed counters and a
    /// fresh statistics log. The random stream continues where it was.
    pub fn reset(&mut self) {
        self.clear_world();
        self.stats.reset();
        self.control.cycle.store(0, Ordering::SeqCst);
        self.control.stop_requested.store(false, Ordering::SeqCst);
        self.control.set_state(SimulationState::Uninitialized);
        info!(event = "simulation_reset", run_id = %self.run_id, "Simulation reset");
    }

    /// Request a cooperative stop; the current cycle, if any, completes first
    pub fn stop(&self) {
        self.stop_handle().stop();
        info!(event = "stop_requested", cycle = self.current_cycle(), "Stop requested");
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            control: Arc::clone(&self.control),
        }
    }

    pub fn observer(&self) -> SimulationObserver {
        SimulationObserver {
            run_id: self.run_id,
            grid: Arc::clone(&self.grid),
            population: Arc::clone(&self.population),
            stats: Arc::clone(&self.stats),
            control: Arc::clone(&self.control),
        }
    }

    /// Change the topology used from the next cycle on
    pub fn set_neighborhood(&self, neighborhood: Neighborhood) {
        *self.control.neighborhood.write() = neighborhood;
        info!(neighborhood = %neighborhood, "Neighborhood type set");
    }

    pub fn neighborhood(&self) -> Neighborhood {
        *self.control.neighborhood.read()
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn config(&self) -> &SharedConfig {
        &self.config
    }

    pub fn animals(&self) -> Vec<EntityHandle> {
        self.population.animals()
    }

    pub fn plants(&self) -> Vec<EntityHandle> {
        self.population.plants()
    }

    pub fn animal_count(&self) -> usize {
        self.population.animal_count()
    }

    pub fn plant_count(&self) -> usize {
        self.population.plant_count()
    }

    pub fn births(&self) -> u64 {
        self.stats.births()
    }

    pub fn deaths(&self) -> u64 {
        self.stats.deaths()
    }

    /// Number of cycles executed so far
    pub fn current_cycle(&self) -> u64 {
        self.control.cycle.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> SimulationState {
        self.control.state()
    }

    pub fn stats(&self) -> &StatsSink {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SharedConfig {
        SimulationConfig::default().shared()
    }

    fn world(width: i32, height: i32) -> WorldConfig {
        WorldConfig {
            width,
            height,
            seed: Some(42),
            ..Default::default()
        }
    }

    fn simulation(width: i32, height: i32) -> Simulation {
        Simulation::new(world(width, height), config(), StatsSink::in_memory()).unwrap()
    }

    fn layout_simulation(
        width: i32,
        height: i32,
        layout: &[(EntityKind, Position)],
    ) -> Simulation {
        let mut sim = simulation(width, height);
        sim.initialize_with_layout(layout).unwrap();
        sim
    }

    #[test]
    fn test_initialize_places_configured_counts() {
        let mut sim = simulation(30, 10);
        sim.initialize().unwrap();

        assert_eq!(sim.state(), SimulationState::Initialized);
        assert_eq!(sim.animal_count(), 3);
        assert_eq!(sim.plant_count(), 5);
        assert_eq!(sim.grid().entity_count(), 8);
        // Initial placement never stacks
        assert!(sim.grid().iter().all(|cell| cell.len() <= 1));
    }

    #[test]
    fn test_initialize_twice_fails() {
        let mut sim = simulation(30, 10);
        sim.initialize().unwrap();
        assert!(matches!(sim.initialize(), Err(Error::InvalidState(_))));
    }

    #[test]
    fn test_placement_exhaustion() {
        let config = config();
        config.write().set_initial_counts(3, 2);
        let mut sim =
            Simulation::new(world(2, 2), config, StatsSink::in_memory()).unwrap();

        let result = sim.initialize();

        assert!(matches!(result, Err(Error::ResourceExhausted(_))));
        assert_eq!(sim.state(), SimulationState::Uninitialized);
        assert_eq!(sim.grid().entity_count(), 0);
        assert_eq!(sim.animal_count() + sim.plant_count(), 0);
    }

    #[test]
    fn test_cycle_before_initialize_fails() {
        let mut sim = simulation(5, 5);
        assert!(matches!(sim.execute_cycle(), Err(Error::InvalidState(_))));
    }

    #[test]
    fn test_plant_dies_of_old_age() {
        let mut sim = layout_simulation(
            5,
            5,
            &[
                (EntityKind::Plant, Position::new(0, 0)),
                (EntityKind::Plant, Position::new(4, 4)),
            ],
        );
        let max_age = sim.config().read().max_age();
        let plant = sim.plants()[0].clone();
        for _ in 0..max_age - 1 {
            plant.increment_age();
        }

        sim.process_plants(&SimulationConfig::default()).unwrap();

        assert_eq!(plant.age(), max_age as u32);
        assert_eq!(sim.plant_count(), 1);
        assert!(sim.grid().cell(Position::new(0, 0)).unwrap().is_empty());
        assert_eq!(sim.deaths(), 1);
        assert!(sim.stats().pending_events().contains("died of old age"));
    }

    #[test]
    fn test_animal_starves_before_moving() {
        let mut sim = layout_simulation(
            5,
            5,
            &[
                (EntityKind::Animal, Position::new(2, 2)),
                (EntityKind::Plant, Position::new(2, 1)),
            ],
        );
        let animal = sim.animals()[0].clone();
        animal.reduce_energy(animal.energy() - 1);

        sim.execute_cycle().unwrap();

        assert_eq!(animal.energy(), 0);
        assert_eq!(sim.animal_count(), 0);
        assert_eq!(sim.deaths(), 1);
        // The neighboring plant was not eaten
        let plant = sim.plants()[0].clone();
        assert_eq!(plant.energy(), 11);
        assert!(sim.grid().cell(Position::new(2, 2)).unwrap().is_empty());
    }

    #[test]
    fn test_animal_eats_adjacent_plant_without_moving() {
        let mut sim = layout_simulation(
            3,
            3,
            &[
                (EntityKind::Animal, Position::new(1, 1)),
                (EntityKind::Plant, Position::new(1, 0)),
            ],
        );
        let animal = sim.animals()[0].clone();
        let plant = sim.plants()[0].clone();

        assert!(sim.execute_cycle().unwrap());

        assert_eq!(animal.position(), Position::new(1, 1));
        // 10 - 1 movement + 3 eaten, capped at 11
        assert_eq!(animal.energy(), 11);
        // 10 - 3 eaten + 1 growth
        assert_eq!(plant.energy(), 8);
        assert_eq!(sim.current_cycle(), 1);
    }

    #[test]
    fn test_eating_depleted_plant_removes_it() {
        let mut sim = layout_simulation(
            3,
            1,
            &[
                (EntityKind::Animal, Position::new(0, 0)),
                (EntityKind::Plant, Position::new(1, 0)),
                (EntityKind::Plant, Position::new(2, 0)),
            ],
        );
        let plant = sim.plants()[0].clone();
        plant.reduce_energy(plant.energy() - 2);

        sim.execute_cycle().unwrap();

        assert_eq!(plant.energy(), 0);
        assert_eq!(sim.plant_count(), 1);
        assert_eq!(sim.deaths(), 1);
        assert!(sim.grid().cell(Position::new(1, 0)).unwrap().is_empty());
        let record = sim.stats().snapshot();
        assert_eq!(record.deaths, 1);
    }

    #[test]
    fn test_animal_moves_when_no_plant_adjacent() {
        let mut sim = layout_simulation(
            5,
            5,
            &[
                (EntityKind::Animal, Position::new(2, 2)),
                (EntityKind::Plant, Position::new(4, 4)),
            ],
        );
        let animal = sim.animals()[0].clone();

        sim.execute_cycle().unwrap();

        let pos = animal.position();
        let distance = (pos.x - 2).abs() + (pos.y - 2).abs();
        assert_eq!(distance, 1);
        assert!(sim.grid().cell(pos).unwrap().contains(animal.id()));
        assert!(sim.grid().cell(Position::new(2, 2)).unwrap().is_empty());
    }

    #[test]
    fn test_reproduction_with_mate() {
        // Corridor: two animals side by side, plants out of reach
        let mut sim = layout_simulation(
            6,
            1,
            &[
                (EntityKind::Animal, Position::new(2, 0)),
                (EntityKind::Animal, Position::new(3, 0)),
                (EntityKind::Plant, Position::new(0, 0)),
            ],
        );
        for animal in sim.animals() {
            animal.increment_age();
        }
        let config = SimulationConfig::default();

        let first = sim.animals()[0].clone();
        sim.try_reproduce(&first, &config, Neighborhood::VonNeumann)
            .unwrap();

        assert_eq!(sim.animal_count(), 3);
        assert_eq!(sim.births(), 1);
        assert_eq!(first.energy(), 10 - config.energy_transfer());
        let child = sim
            .animals()
            .into_iter()
            .find(|a| a.age() == 0)
            .unwrap();
        assert_eq!(child.position(), Position::new(1, 0));
        assert_eq!(child.energy(), config.initial_energy());
        assert!(sim.stats().pending_events().contains("born"));
    }

    #[test]
    fn test_no_reproduction_without_mate_or_space() {
        let config = SimulationConfig::default();

        // Lone animal
        let mut sim = layout_simulation(
            3,
            3,
            &[
                (EntityKind::Animal, Position::new(1, 1)),
                (EntityKind::Plant, Position::new(0, 0)),
            ],
        );
        let lone = sim.animals()[0].clone();
        lone.increment_age();
        sim.try_reproduce(&lone, &config, Neighborhood::VonNeumann)
            .unwrap();
        assert_eq!(sim.births(), 0);

        // Mate present but no empty neighbor
        let mut sim = layout_simulation(
            2,
            1,
            &[
                (EntityKind::Animal, Position::new(0, 0)),
                (EntityKind::Animal, Position::new(1, 0)),
            ],
        );
        for animal in sim.animals() {
            animal.increment_age();
        }
        let parent = sim.animals()[0].clone();
        sim.try_reproduce(&parent, &config, Neighborhood::VonNeumann)
            .unwrap();
        assert_eq!(sim.births(), 0);
        assert_eq!(parent.energy(), 10);
    }

    #[test]
    fn test_lowered_maximum_caps_energy_next_cycle() {
        let mut sim = layout_simulation(
            5,
            5,
            &[
                (EntityKind::Animal, Position::new(2, 2)),
                (EntityKind::Plant, Position::new(4, 4)),
            ],
        );
        {
            let mut config = sim.config().write();
            assert!(config.set_max_animal_energy(5));
            assert!(config.set_max_plant_energy(5));
        }
        let animal = sim.animals()[0].clone();
        let plant = sim.plants()[0].clone();

        sim.execute_cycle().unwrap();

        let snapshot = sim.config().read().clone();
        // Capped to 5, then the movement cost
        assert_eq!(animal.energy(), 4);
        // Capped to 5, growth cannot exceed it
        assert_eq!(plant.energy(), 5);
        for entity in sim.animals().iter().chain(sim.plants().iter()) {
            assert!(entity.energy() <= entity.max_energy(&snapshot));
        }
    }

    #[test]
    fn test_balance_verdict() {
        assert_eq!(Balance::evaluate(296, 5, 300), Balance::Overcrowded);
        assert!(!Balance::evaluate(296, 5, 300).is_balanced());
        assert!(Balance::evaluate(295, 5, 300).is_balanced());
        assert_eq!(Balance::evaluate(0, 5, 300), Balance::NoAnimals);
        assert_eq!(Balance::evaluate(3, 0, 300), Balance::NoPlants);
        assert_eq!(Balance::evaluate(0, 0, 300), Balance::NoAnimals);
        assert_eq!(Balance::Overcrowded.reason(), Some("Too many animals"));
    }

    #[test]
    fn test_unbalanced_cycle_completes() {
        let mut sim = layout_simulation(3, 3, &[(EntityKind::Animal, Position::new(1, 1))]);

        assert!(!sim.execute_cycle().unwrap());
        assert_eq!(sim.state(), SimulationState::Completed);
        assert_eq!(sim.current_cycle(), 1);

        let last = sim.stats().snapshot();
        assert_eq!(last.cycles, 1);

        // The engine keeps stepping if asked to
        assert!(!sim.execute_cycle().unwrap());
        assert_eq!(sim.current_cycle(), 2);
    }

    #[test]
    fn test_stop_is_honored_at_next_cycle() {
        let mut sim = simulation(30, 10);
        sim.initialize().unwrap();
        let handle = sim.stop_handle();

        assert!(sim.execute_cycle().unwrap());
        handle.stop();
        assert!(handle.is_stop_requested());

        assert!(!sim.execute_cycle().unwrap());
        assert_eq!(sim.state(), SimulationState::Stopped);
        assert_eq!(sim.current_cycle(), 1);
        assert!(!sim.execute_cycle().unwrap());
        assert_eq!(sim.current_cycle(), 1);
    }

    #[test]
    fn test_same_seed_same_run() {
        let run = || {
            let mut sim = simulation(30, 10);
            sim.initialize().unwrap();
            let mut history = Vec::new();
            for _ in 0..15 {
                sim.execute_cycle().unwrap();
                history.push((sim.animal_count(), sim.plant_count(), sim.births(), sim.deaths()));
            }
            (history, sim.grid().render())
        };

        assert_eq!(run(), run());
    }

    #[test]
    fn test_moore_neighborhood_applies_from_next_cycle() {
        let mut sim = layout_simulation(
            3,
            3,
            &[
                (EntityKind::Animal, Position::new(1, 1)),
                (EntityKind::Plant, Position::new(0, 0)),
            ],
        );
        let plant = sim.plants()[0].clone();

        sim.set_neighborhood(Neighborhood::Moore);
        assert_eq!(sim.observer().neighborhood(), Neighborhood::Moore);
        sim.execute_cycle().unwrap();

        // Diagonal plant is reachable under Moore
        assert_eq!(plant.energy(), 10 - 3 + 1);
    }

    #[test]
    fn test_reset_returns_to_uninitialized() {
        let mut sim = simulation(30, 10);
        sim.initialize().unwrap();
        for _ in 0..3 {
            sim.execute_cycle().unwrap();
        }
        sim.stop();

        sim.reset();

        assert_eq!(sim.state(), SimulationState::Uninitialized);
        assert_eq!(sim.current_cycle(), 0);
        assert_eq!(sim.births(), 0);
        assert_eq!(sim.deaths(), 0);
        assert_eq!(sim.grid().entity_count(), 0);
        assert!(!sim.stop_handle().is_stop_requested());

        sim.initialize().unwrap();
        assert!(sim.animals().iter().any(|a| a.id() == EntityId(0)));
    }

    #[test]
    fn test_observer_tracks_engine() {
        let mut sim = simulation(30, 10);
        let observer = sim.observer();
        sim.initialize().unwrap();
        sim.execute_cycle().unwrap();

        assert_eq!(observer.run_id(), sim.run_id());
        assert_eq!(observer.current_cycle(), 1);
        assert_eq!(observer.animal_count(), sim.animal_count());
        assert_eq!(observer.plant_count(), sim.plant_count());
        assert_eq!(observer.state(), sim.state());
        assert_eq!(observer.stats().cycles, 1);
        assert_eq!(observer.render(), sim.grid().render());
    }

    #[test]
    fn test_single_cell_grid_animal_stays_put() {
        let mut sim = layout_simulation(
            1,
            1,
            &[
                (EntityKind::Animal, Position::new(0, 0)),
                (EntityKind::Plant, Position::new(0, 0)),
            ],
        );

        assert!(!sim.execute_cycle().unwrap());
        let animal = sim.animals()[0].clone();
        assert_eq!(animal.position(), Position::new(0, 0));
    }
}
