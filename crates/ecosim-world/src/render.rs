//! Textual projection of the grid.

use crate::grid::{Grid, Occupancy};
use std::fmt;

pub const EMPTY_SYMBOL: char = '.';
pub const ANIMAL_SYMBOL: char = 'A';
pub const PLANT_SYMBOL: char = '*';
pub const OVERFLOW_SYMBOL: char = '#';

impl Occupancy {
    pub fn symbol(&self) -> char {
        match self {
            Occupancy::Empty => EMPTY_SYMBOL,
            Occupancy::Animal => ANIMAL_SYMBOL,
            Occupancy::Plant => PLANT_SYMBOL,
            Occupancy::Overflow => OVERFLOW_SYMBOL,
        }
    }
}

impl Grid {
    /// Bordered render, one text line per grid row
    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Grid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let border = format!("+{}+", "-".repeat(self.width() as usize));

        writeln!(f, "{}", border)?;
        for y in 0..self.height() {
            let row: String = self.row(y).map(|cell| cell.occupancy().symbol()).collect();
            writeln!(f, "|{}|", row)?;
        }
        writeln!(f, "{}", border)
    }
}
