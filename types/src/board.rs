//! The 3x3 board as exchanged with the match API and the real-time channel.

use serde::{Deserialize, Serialize};
use std::fmt;

pub const BOARD_CELLS: usize = 9;

/// A single board cell. On the wire: `""`, `"X"` or `"O"`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Cell {
    #[default]
    #[serde(rename = "")]
    Empty,
    X,
    O,
}

impl Cell {
    pub fn is_empty(self) -> bool {
        self == Cell::Empty
    }
}

/// The mark a player places. The match creator is always `X` and moves first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Symbol {
    X,
    O,
}

impl From<Symbol> for Cell {
    fn from(symbol: Symbol) -> Self {
        match symbol {
            Symbol::X => Cell::X,
            Symbol::O => Cell::O,
        }
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Symbol::X => f.write_str("X"),
            Symbol::O => f.write_str("O"),
        }
    }
}

/// Nine cells in row-major order. Deserialization rejects any other length.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Board([Cell; BOARD_CELLS]);

impl Board {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_cells(cells: [Cell; BOARD_CELLS]) -> Self {
        Self(cells)
    }

    pub fn get(&self, index: usize) -> Option<Cell> {
        self.0.get(index).copied()
    }

    /// True when `index` is on the board and unoccupied.
    pub fn is_open(&self, index: usize) -> bool {
        matches!(self.get(index), Some(Cell::Empty))
    }

    pub fn is_clear(&self) -> bool {
        self.0.iter().all(|cell| cell.is_empty())
    }

    /// Copy of the board with `symbol` written at `index`, or `None` if the
    /// cell is occupied or out of range.
    pub fn with_mark(&self, index: usize, symbol: Symbol) -> Option<Self> {
        if !self.is_open(index) {
            return None;
        }
        let mut next = *self;
        next.0[index] = symbol.into();
        Some(next)
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (row, cells) in self.0.chunks(3).enumerate() {
            if row > 0 {
                writeln!(f)?;
            }
            for (col, cell) in cells.iter().enumerate() {
                let mark = match cell {
                    Cell::Empty => char::from(b'0' + (row * 3 + col) as u8),
                    Cell::X => 'X',
                    Cell::O => 'O',
                };
                if col > 0 {
                    f.write_str(" | ")?;
                }
                write!(f, "{mark}")?;
            }
        }
        Ok(())
    }
}
