//! Ecosystem world: the grid, its inhabitants and the engine that steps them.
//!
//! Plants and animals live on a bounded grid of lockable cells. Each cycle
//! animals age, feed, move and reproduce in a shuffled order, plants grow, the
//! dead are removed, and the outcome is reported to a [`StatsSink`].

pub mod entity;
pub mod grid;
pub mod population;
pub mod render;
pub mod simulation;
pub mod stats;

pub use entity::{Entity, EntityHandle, EntityState};
pub use grid::{Cell, Grid, Occupancy};
pub use population::Population;
pub use simulation::{Balance, Simulation, SimulationObserver, SimulationState, StopHandle};
pub use stats::{CycleRecord, StatsSink, StatsSnapshot};
