//! Error types for the simulation.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid grid dimensions: {width}x{height} (each side must be within 1..={max})")]
    InvalidDimensions { width: i32, height: i32, max: i32 },

    #[error("Invalid coordinates: x={x}, y={y}")]
    InvalidCoordinates { x: i32, y: i32 },

    #[error("Entity {id} is stored at ({entity_x}, {entity_y}) but was placed in cell ({cell_x}, {cell_y})")]
    PositionMismatch {
        id: u64,
        entity_x: i32,
        entity_y: i32,
        cell_x: i32,
        cell_y: i32,
    },

    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Invalid entity operation: {0}")]
    InvalidEntity(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
