//! Configuration types for the simulation.
//!
//! [`SimulationConfig`] is the runtime-adjustable parameter store. It is
//! shared with the engine as a [`SharedConfig`] and read at entity
//! construction and rule evaluation time, so edits apply from the next cycle.
//! Writes are validated against fixed ranges; an out-of-range write is
//! logged and ignored, never surfaced as an error.

use crate::{Error, Neighborhood, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, warn};

/// Largest accepted grid side
pub const MAX_GRID_SIZE: i32 = 1000;

/// Parameter store shared between the engine and whoever edits it
pub type SharedConfig = Arc<RwLock<SimulationConfig>>;

/// A named, range-checked simulation parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Parameter {
    InitialEnergy,
    MaxAnimalEnergy,
    MaxPlantEnergy,
    EnergyTransfer,
    ReproductiveAge,
    MaxAge,
    InitialAnimalCount,
    InitialPlantCount,
}

impl Parameter {
    pub const ALL: [Parameter; 8] = [
        Parameter::InitialEnergy,
        Parameter::MaxAnimalEnergy,
        Parameter::MaxPlantEnergy,
        Parameter::EnergyTransfer,
        Parameter::ReproductiveAge,
        Parameter::MaxAge,
        Parameter::InitialAnimalCount,
        Parameter::InitialPlantCount,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Parameter::InitialEnergy => "initial_energy",
            Parameter::MaxAnimalEnergy => "max_animal_energy",
            Parameter::MaxPlantEnergy => "max_plant_energy",
            Parameter::EnergyTransfer => "energy_transfer",
            Parameter::ReproductiveAge => "reproductive_age",
            Parameter::MaxAge => "max_age",
            Parameter::InitialAnimalCount => "initial_animal_count",
            Parameter::InitialPlantCount => "initial_plant_count",
        }
    }

    /// Accepted values, inclusive on both ends
    pub fn range(&self) -> RangeInclusive<i32> {
        match self {
            Parameter::InitialEnergy => 5..=20,
            Parameter::MaxAnimalEnergy => 5..=30,
            Parameter::MaxPlantEnergy => 5..=30,
            Parameter::EnergyTransfer => 1..=10,
            Parameter::ReproductiveAge => 1..=5,
            Parameter::MaxAge => 3..=20,
            Parameter::InitialAnimalCount => 1..=100,
            Parameter::InitialPlantCount => 1..=100,
        }
    }

    pub fn default_value(&self) -> i32 {
        match self {
            Parameter::InitialEnergy => 10,
            Parameter::MaxAnimalEnergy => 11,
            Parameter::MaxPlantEnergy => 14,
            Parameter::EnergyTransfer => 3,
            Parameter::ReproductiveAge => 1,
            Parameter::MaxAge => 8,
            Parameter::InitialAnimalCount => 3,
            Parameter::InitialPlantCount => 5,
        }
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Parameter {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('-', "_");
        Parameter::ALL
            .iter()
            .copied()
            .find(|param| param.name() == wanted)
            .ok_or_else(|| format!("unknown parameter: {}", s))
    }
}

/// Runtime-adjustable simulation parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SimulationConfig {
    initial_energy: i32,
    max_animal_energy: i32,
    max_plant_energy: i32,
    energy_transfer: i32,
    reproductive_age: i32,
    max_age: i32,
    initial_animal_count: i32,
    initial_plant_count: i32,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            initial_energy: Parameter::InitialEnergy.default_value(),
            max_animal_energy: Parameter::MaxAnimalEnergy.default_value(),
            max_plant_energy: Parameter::MaxPlantEnergy.default_value(),
            energy_transfer: Parameter::EnergyTransfer.default_value(),
            reproductive_age: Parameter::ReproductiveAge.default_value(),
            max_age: Parameter::MaxAge.default_value(),
            initial_animal_count: Parameter::InitialAnimalCount.default_value(),
            initial_plant_count: Parameter::InitialPlantCount.default_value(),
        }
    }
}

impl SimulationConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap this configuration for sharing with an engine
    pub fn shared(self) -> SharedConfig {
        Arc::new(RwLock::new(self))
    }

    pub fn get(&self, param: Parameter) -> i32 {
        match param {
            Parameter::InitialEnergy => self.initial_energy,
            Parameter::MaxAnimalEnergy => self.max_animal_energy,
            Parameter::MaxPlantEnergy => self.max_plant_energy,
            Parameter::EnergyTransfer => self.energy_transfer,
            Parameter::ReproductiveAge => self.reproductive_age,
            Parameter::MaxAge => self.max_age,
            Parameter::InitialAnimalCount => self.initial_animal_count,
            Parameter::InitialPlantCount => self.initial_plant_count,
        }
    }

    /// Write a parameter if `value` is within its range.
    ///
    /// Returns whether the write was accepted. A rejected write leaves the
    /// previous value in place.
    pub fn set(&mut self, param: Parameter, value: i32) -> bool {
        if !param.range().contains(&value) {
            warn!(parameter = param.name(), value, "Invalid {} value: {}", param, value);
            return false;
        }

        *self.slot_mut(param) = value;
        info!(parameter = param.name(), value, "{} set to: {}", param, value);
        true
    }

    /// Restore every parameter to its built-in default
    pub fn reset_to_defaults(&mut self) {
        *self = Self::default();
        info!("All configuration parameters reset to defaults");
    }

    fn slot_mut(&mut self, param: Parameter) -> &mut i32 {
        match param {
            Parameter::InitialEnergy => &mut self.initial_energy,
            Parameter::MaxAnimalEnergy => &mut self.max_animal_energy,
            Parameter::MaxPlantEnergy => &mut self.max_plant_energy,
            Parameter::EnergyTransfer => &mut self.energy_transfer,
            Parameter::ReproductiveAge => &mut self.reproductive_age,
            Parameter::MaxAge => &mut self.max_age,
            Parameter::InitialAnimalCount => &mut self.initial_animal_count,
            Parameter::InitialPlantCount => &mut self.initial_plant_count,
        }
    }

    pub fn initial_energy(&self) -> i32 {
        self.initial_energy
    }

    pub fn max_animal_energy(&self) -> i32 {
        self.max_animal_energy
    }

    pub fn max_plant_energy(&self) -> i32 {
        self.max_plant_energy
    }

    pub fn energy_transfer(&self) -> i32 {
        self.energy_transfer
    }

    pub fn reproductive_age(&self) -> i32 {
        self.reproductive_age
    }

    pub fn max_age(&self) -> i32 {
        self.max_age
    }

    pub fn initial_animal_count(&self) -> usize {
        self.initial_animal_count as usize
    }

    pub fn initial_plant_count(&self) -> usize {
        self.initial_plant_count as usize
    }

    pub fn set_initial_energy(&mut self, value: i32) -> bool {
        self.set(Parameter::InitialEnergy, value)
    }

    pub fn set_max_animal_energy(&mut self, value: i32) -> bool {
        self.set(Parameter::MaxAnimalEnergy, value)
    }

    pub fn set_max_plant_energy(&mut self, value: i32) -> bool {
        self.set(Parameter::MaxPlantEnergy, value)
    }

    pub fn set_energy_transfer(&mut self, value: i32) -> bool {
        self.set(Parameter::EnergyTransfer, value)
    }

    pub fn set_reproductive_age(&mut self, value: i32) -> bool {
        self.set(Parameter::ReproductiveAge, value)
    }

    pub fn set_max_age(&mut self, value: i32) -> bool {
        self.set(Parameter::MaxAge, value)
    }

    pub fn set_initial_counts(&mut self, animals: i32, plants: i32) -> bool {
        let animals_ok = self.set(Parameter::InitialAnimalCount, animals);
        let plants_ok = self.set(Parameter::InitialPlantCount, plants);
        animals_ok && plants_ok
    }
}

/// Parameter values read from a configuration file.
///
/// Every field is optional; present values are applied through the
/// validated setters so a bad file entry is rejected like any other write.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ParameterOverrides {
    pub initial_energy: Option<i32>,
    pub max_animal_energy: Option<i32>,
    pub max_plant_energy: Option<i32>,
    pub energy_transfer: Option<i32>,
    pub reproductive_age: Option<i32>,
    pub max_age: Option<i32>,
    pub initial_animal_count: Option<i32>,
    pub initial_plant_count: Option<i32>,
}

impl ParameterOverrides {
    fn entries(&self) -> [(Parameter, Option<i32>); 8] {
        [
            (Parameter::InitialEnergy, self.initial_energy),
            (Parameter::MaxAnimalEnergy, self.max_animal_energy),
            (Parameter::MaxPlantEnergy, self.max_plant_energy),
            (Parameter::EnergyTransfer, self.energy_transfer),
            (Parameter::ReproductiveAge, self.reproductive_age),
            (Parameter::MaxAge, self.max_age),
            (Parameter::InitialAnimalCount, self.initial_animal_count),
            (Parameter::InitialPlantCount, self.initial_plant_count),
        ]
    }

    /// Apply every present value, returning how many writes were rejected
    pub fn apply_to(&self, config: &mut SimulationConfig) -> usize {
        self.entries()
            .into_iter()
            .filter_map(|(param, value)| value.map(|v| (param, v)))
            .filter(|&(param, value)| !config.set(param, value))
            .count()
    }
}

/// Construction-time world settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// Width of the world grid
    pub width: i32,
    /// Height of the world grid
    pub height: i32,
    /// Random seed for reproducibility; `None` seeds from entropy
    pub seed: Option<u64>,
    /// Topology applied to every animal until changed
    pub neighborhood: Neighborhood,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            width: 30,
            height: 10,
            seed: None,
            neighborhood: Neighborhood::VonNeumann,
        }
    }
}

impl WorldConfig {
    pub fn validate(&self) -> Result<()> {
        validate_dimensions(self.width, self.height)
    }

    pub fn cell_count(&self) -> usize {
        (self.width.max(0) as usize) * (self.height.max(0) as usize)
    }
}

/// Check that both sides lie within `1..=MAX_GRID_SIZE`
pub fn validate_dimensions(width: i32, height: i32) -> Result<()> {
    let valid = 1..=MAX_GRID_SIZE;
    if valid.contains(&width) && valid.contains(&height) {
        Ok(())
    } else {
        Err(Error::InvalidDimensions {
            width,
            height,
            max: MAX_GRID_SIZE,
        })
    }
}
