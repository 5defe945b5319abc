use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::PlayerId;

/// Smallest board edge for which a cell's capacity equals its neighbour count.
pub const MIN_BOARD_EDGE: u32 = 2;

/// Grid coordinate. `x` is the column, `y` the row.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Coord {
    pub x: u32,
    pub y: u32,
}

impl Coord {
    #[inline]
    pub const fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cell {
    pub orbs: u32,
    pub owner: Option<PlayerId>,
}

impl Cell {
    pub fn is_empty(&self) -> bool {
        self.orbs == 0
    }

    pub fn is_owned_by(&self, player: &PlayerId) -> bool {
        self.orbs > 0 && self.owner.as_ref() == Some(player)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BoardError {
    #[error("board must be at least {min}x{min}, got {rows}x{columns}")]
    TooSmall { rows: u32, columns: u32, min: u32 },
}

/// Fixed-size grid of cells, stored row-major.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Board {
    rows: u32,
    columns: u32,
    cells: Vec<Cell>,
}

impl Board {
    /// Create an all-empty board.
    pub fn new(rows: u32, columns: u32) -> Result<Self, BoardError> {
        if rows < MIN_BOARD_EDGE || columns < MIN_BOARD_EDGE {
            return Err(BoardError::TooSmall {
                rows,
                columns,
                min: MIN_BOARD_EDGE,
            });
        }
        Ok(Self {
            rows,
            columns,
            cells: vec![Cell::default(); (rows as usize) * (columns as usize)],
        })
    }

    pub fn rows(&self) -> u32 {
        self.rows
    }

    pub fn columns(&self) -> u32 {
        self.columns
    }

    /// Number of cells (`rows * columns`).
    pub fn area(&self) -> usize {
        self.cells.len()
    }

    pub fn contains(&self, at: Coord) -> bool {
        at.x < self.columns && at.y < self.rows
    }

    pub fn index_of(&self, at: Coord) -> Option<usize> {
        if !self.contains(at) {
            return None;
        }
        Some((at.y as usize) * (self.columns as usize) + (at.x as usize))
    }

    pub fn coord_at_index(&self, index: usize) -> Option<Coord> {
        if index >= self.cells.len() {
            return None;
        }
        let columns = self.columns as usize;
        Some(Coord::new((index % columns) as u32, (index / columns) as u32))
    }

    pub fn get(&self, at: Coord) -> Option<&Cell> {
        self.index_of(at).map(|i| &self.cells[i])
    }

    pub fn get_mut(&mut self, at: Coord) -> Option<&mut Cell> {
        self.index_of(at).map(move |i| &mut self.cells[i])
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    /// Cells in row-major order together with their coordinates.
    pub fn iter(&self) -> impl Iterator<Item = (Coord, &Cell)> + '_ {
        let columns = self.columns as usize;
        self.cells.iter().enumerate().map(move |(i, cell)| {
            (Coord::new((i % columns) as u32, (i / columns) as u32), cell)
        })
    }

    /// Orbs a cell holds before it explodes: 4, minus one per board edge it touches.
    pub fn capacity(&self, at: Coord) -> u32 {
        let mut capacity = 4;
        if at.x == 0 || at.x + 1 == self.columns {
            capacity -= 1;
        }
        if at.y == 0 || at.y + 1 == self.rows {
            capacity -= 1;
        }
        capacity
    }

    /// Orthogonal in-bounds neighbours in fixed order: left, right, up, down.
    pub fn neighbors(&self, at: Coord) -> impl Iterator<Item = Coord> {
        let mut out = [None; 4];
        if at.x > 0 {
            out[0] = Some(Coord::new(at.x - 1, at.y));
        }
        if at.x + 1 < self.columns {
            out[1] = Some(Coord::new(at.x + 1, at.y));
        }
        if at.y > 0 {
            out[2] = Some(Coord::new(at.x, at.y - 1));
        }
        if at.y + 1 < self.rows {
            out[3] = Some(Coord::new(at.x, at.y + 1));
        }
        out.into_iter().flatten()
    }

    /// `true` while the cell can take another orb without exploding.
    /// Out-of-bounds coordinates are never within capacity.
    pub fn is_within_capacity(&self, at: Coord) -> bool {
        self.get(at)
            .is_some_and(|cell| cell.orbs < self.capacity(at))
    }

    pub fn total_orbs(&self) -> u64 {
        self.cells.iter().map(|c| u64::from(c.orbs)).sum()
    }

    /// Number of cells with orbs owned by `player`.
    pub fn owned_cells(&self, player: &PlayerId) -> usize {
        self.cells.iter().filter(|c| c.is_owned_by(player)).count()
    }

    /// Distinct owners of non-empty cells, in first-seen row-major order.
    pub fn owners(&self) -> Vec<&PlayerId> {
        let mut owners: Vec<&PlayerId> = Vec::new();
        for cell in &self.cells {
            if cell.orbs == 0 {
                continue;
            }
            if let Some(owner) = &cell.owner {
                if !owners.contains(&owner) {
                    owners.push(owner);
                }
            }
        }
        owners
    }

    /// Reset every cell owned by `player` to empty. Returns the number of orbs removed.
    pub fn clear_owner(&mut self, player: &PlayerId) -> u64 {
        let mut removed = 0;
        for cell in self.cells.iter_mut() {
            if cell.owner.as_ref() == Some(player) {
                removed += u64::from(cell.orbs);
                *cell = Cell::default();
            }
        }
        removed
    }

    /// `true` when no cell has reached its capacity.
    pub fn is_stable(&self) -> bool {
        self.iter().all(|(at, cell)| cell.orbs < self.capacity(at))
    }
}
