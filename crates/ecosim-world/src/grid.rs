//! Bounded 2D grid of independently lockable cells.

use crate::entity::{Entity, EntityHandle};
use ecosim_core::{
    validate_dimensions, EntityId, EntityKind, Error, Neighborhood, Position, Result, WorldConfig,
};
use parking_lot::RwLock;

/// What a cell currently shows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Occupancy {
    Empty,
    Animal,
    Plant,
    /// More than one entity in the same cell
    Overflow,
}

/// A single grid cell.
///
/// Many readers or one writer at a time; every entity in the set stores
/// this cell's coordinates as its position.
#[derive(Debug)]
pub struct Cell {
    position: Position,
    entities: RwLock<Vec<EntityHandle>>,
}

impl Cell {
    fn new(position: Position) -> Self {
        Self {
            position,
            entities: RwLock::new(Vec::new()),
        }
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn x(&self) -> i32 {
        self.position.x
    }

    pub fn y(&self) -> i32 {
        self.position.y
    }

    /// Snapshot of the entities in this cell
    pub fn entities(&self) -> Vec<EntityHandle> {
        self.entities.read().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.read().is_empty()
    }

    pub fn len(&self) -> usize {
        self.entities.read().len()
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.read().iter().any(|e| e.id() == id)
    }

    /// First entity of the given variant, in insertion order
    pub fn find_kind(&self, kind: EntityKind) -> Option<EntityHandle> {
        self.entities
            .read()
            .iter()
            .find(|e| e.kind() == kind)
            .cloned()
    }

    pub fn occupancy(&self) -> Occupancy {
        let entities = self.entities.read();
        match entities.as_slice() {
            [] => Occupancy::Empty,
            [only] => match only.kind() {
                EntityKind::Animal => Occupancy::Animal,
                EntityKind::Plant => Occupancy::Plant,
            },
            _ => Occupancy::Overflow,
        }
    }

    fn clear(&self) {
        self.entities.write().clear();
    }
}

fn take_by_id(entities: &mut Vec<EntityHandle>, id: EntityId) -> Option<EntityHandle> {
    let index = entities.iter().position(|e| e.id() == id)?;
    Some(entities.remove(index))
}

/// A bounded (non-wrapping) 2D grid
#[derive(Debug)]
pub struct Grid {
    width: i32,
    height: i32,
    cells: Vec<Cell>,
}

impl Grid {
    /// Create an empty grid; each side must lie within `1..=MAX_GRID_SIZE`
    pub fn new(width: i32, height: i32) -> Result<Self> {
        validate_dimensions(width, height)?;

        let cells = (0..height)
            .flat_map(|y| (0..width).map(move |x| Cell::new(Position::new(x, y))))
            .collect();

        Ok(Self {
            width,
            height,
            cells,
        })
    }

    /// Create a grid from world configuration
    pub fn from_config(config: &WorldConfig) -> Result<Self> {
        Self::new(config.width, config.height)
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    /// Get the cell at `pos`, failing if it lies off the grid
    pub fn cell(&self, pos: Position) -> Result<&Cell> {
        let index = self.pos_to_index(pos)?;
        Ok(&self.cells[index])
    }

    /// In-bounds neighbor cells of `pos` under the given topology.
    ///
    /// Off-grid offsets are dropped; there is no wraparound. Cells come back
    /// in clockwise order starting from north.
    pub fn neighbors(&self, pos: Position, neighborhood: Neighborhood) -> Result<Vec<&Cell>> {
        self.pos_to_index(pos)?;

        let neighbors = neighborhood
            .directions()
            .iter()
            .map(|dir| {
                let (dx, dy) = dir.to_delta();
                pos.add(dx, dy)
            })
            .filter(|p| self.contains(*p))
            .map(|p| &self.cells[self.index_unchecked(p)])
            .collect();

        Ok(neighbors)
    }

    /// Put `entity` into the cell at `pos`.
    ///
    /// The entity must already store `pos` as its position.
    pub fn add_entity(&self, entity: &EntityHandle, pos: Position) -> Result<()> {
        let cell = self.cell(pos)?;
        check_position(entity, pos)?;
        cell.entities.write().push(entity.clone());
        Ok(())
    }

    /// Take `entity` out of the cell matching its stored position.
    ///
    /// Returns whether the entity was present.
    pub fn remove_entity(&self, entity: &Entity) -> Result<bool> {
        let cell = self.cell(entity.position())?;
        let removed = take_by_id(&mut cell.entities.write(), entity.id());
        Ok(removed.is_some())
    }

    /// Relocate `entity` from `from` to `to` and update its stored position.
    ///
    /// Both cell locks are taken in ascending index order and held while the
    /// entity changes cells, so a concurrent reader sees it in exactly one of
    /// the two cells.
    pub fn move_entity(&self, entity: &EntityHandle, from: Position, to: Position) -> Result<()> {
        let from_index = self.pos_to_index(from)?;
        let to_index = self.pos_to_index(to)?;
        check_position(entity, from)?;

        if from_index == to_index {
            return Ok(());
        }

        let (low, high) = (from_index.min(to_index), from_index.max(to_index));
        let mut low_guard = self.cells[low].entities.write();
        let mut high_guard = self.cells[high].entities.write();
        let (source, target) = if from_index < to_index {
            (&mut *low_guard, &mut *high_guard)
        } else {
            (&mut *high_guard, &mut *low_guard)
        };

        let moved = take_by_id(source, entity.id()).ok_or_else(|| {
            Error::InvalidState(format!("entity {} is not in cell {}", entity.id(), from))
        })?;
        target.push(moved);
        entity.set_position(to);

        Ok(())
    }

    /// Remove every entity from every cell
    pub fn clear(&self) {
        for cell in &self.cells {
            cell.clear();
        }
    }

    /// Total number of entity references held by all cells
    pub fn entity_count(&self) -> usize {
        self.cells.iter().map(Cell::len).sum()
    }

    /// Iterator over all cells, row by row
    pub fn iter(&self) -> impl Iterator<Item = &Cell> + '_ {
        self.cells.iter()
    }

    /// Iterator over one row of cells
    pub fn row(&self, y: i32) -> impl Iterator<Item = &Cell> + '_ {
        let start = (y.clamp(0, self.height) * self.width) as usize;
        let end = if (0..self.height).contains(&y) {
            start + self.width as usize
        } else {
            start
        };
        self.cells[start..end].iter()
    }

    pub fn contains(&self, pos: Position) -> bool {
        pos.in_bounds(self.width, self.height)
    }

    fn pos_to_index(&self, pos: Position) -> Result<usize> {
        if self.contains(pos) {
            Ok(self.index_unchecked(pos))
        } else {
            Err(Error::InvalidCoordinates { x: pos.x, y: pos.y })
        }
    }

    fn index_unchecked(&self, pos: Position) -> usize {
        (pos.y * self.width + pos.x) as usize
    }
}

fn check_position(entity: &Entity, cell: Position) -> Result<()> {
    let stored = entity.position();
    if stored == cell {
        Ok(())
    } else {
        Err(Error::PositionMismatch {
            id: entity.id().0,
            entity_x: stored.x,
            entity_y: stored.y,
            cell_x: cell.x,
            cell_y: cell.y,
        })
    }
}
