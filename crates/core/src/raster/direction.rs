//! D8 compass directions and configurable direction codes
//!
//! `Direction` is the engine's internal view of a flow step. A
//! `DirectionScheme` maps the eight directions onto whatever integer codes a
//! caller's toolchain uses (ESRI powers of two, TauDEM 1-8, ...) plus one
//! sentinel for "no direction".

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::f64::consts::SQRT_2;

/// One of the eight D8 compass directions.
///
/// Discriminants run clockwise from north and index `DirectionScheme::codes`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    N = 0,
    NE = 1,
    E = 2,
    SE = 3,
    S = 4,
    SW = 5,
    W = 6,
    NW = 7,
}

impl Direction {
    /// All directions clockwise from north
    pub const ALL: [Direction; 8] = [
        Direction::N,
        Direction::NE,
        Direction::E,
        Direction::SE,
        Direction::S,
        Direction::SW,
        Direction::W,
        Direction::NW,
    ];

    /// Tie-break order for routing: cardinal before diagonal, each clockwise from north
    pub const PRIORITY: [Direction; 8] = [
        Direction::N,
        Direction::E,
        Direction::S,
        Direction::W,
        Direction::NE,
        Direction::SE,
        Direction::SW,
        Direction::NW,
    ];

    /// Position in [`Direction::ALL`]
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    #[inline]
    pub fn from_index(index: usize) -> Option<Direction> {
        Direction::ALL.get(index).copied()
    }

    /// (row_offset, col_offset); rows grow southward
    #[inline]
    pub fn offset(self) -> (isize, isize) {
        match self {
            Direction::N => (-1, 0),
            Direction::NE => (-1, 1),
            Direction::E => (0, 1),
            Direction::SE => (1, 1),
            Direction::S => (1, 0),
            Direction::SW => (1, -1),
            Direction::W => (0, -1),
            Direction::NW => (-1, -1),
        }
    }

    #[inline]
    pub fn opposite(self) -> Direction {
        Direction::ALL[(self.index() + 4) % 8]
    }

    #[inline]
    pub fn is_diagonal(self) -> bool {
        self.index() % 2 == 1
    }

    /// Step length in cell units (1 or √2)
    #[inline]
    pub fn unit_length(self) -> f64 {
        if self.is_diagonal() {
            SQRT_2
        } else {
            1.0
        }
    }

    /// Apply this direction to a cell; `None` when the step leaves the grid.
    #[inline]
    pub fn step(self, row: usize, col: usize, rows: usize, cols: usize) -> Option<(usize, usize)> {
        let (dr, dc) = self.offset();
        let nr = row as isize + dr;
        let nc = col as isize + dc;
        if nr < 0 || nc < 0 || nr >= rows as isize || nc >= cols as isize {
            None
        } else {
            Some((nr as usize, nc as usize))
        }
    }
}

/// Bijection between the eight directions and caller-defined integer codes.
///
/// `codes` is indexed clockwise from north (see [`Direction::ALL`]);
/// `none` marks nodata and unresolved sinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawScheme", into = "RawScheme")]
pub struct DirectionScheme {
    codes: [i32; 8],
    none: i32,
}

#[derive(Serialize, Deserialize)]
struct RawScheme {
    codes: [i32; 8],
    none: i32,
}

impl TryFrom<RawScheme> for DirectionScheme {
    type Error = Error;

    fn try_from(raw: RawScheme) -> Result<Self> {
        DirectionScheme::new(raw.codes, raw.none)
    }
}

impl From<DirectionScheme> for RawScheme {
    fn from(scheme: DirectionScheme) -> Self {
        RawScheme {
            codes: scheme.codes,
            none: scheme.none,
        }
    }
}

impl DirectionScheme {
    /// Build a scheme from codes ordered N, NE, E, SE, S, SW, W, NW.
    pub fn new(codes: [i32; 8], none: i32) -> Result<Self> {
        for (i, &a) in codes.iter().enumerate() {
            if a == none {
                return Err(Error::InvalidDirectionScheme(format!(
                    "code {} for {:?} collides with the no-direction sentinel",
                    a,
                    Direction::ALL[i]
                )));
            }
            if let Some(j) = codes[i + 1..].iter().position(|&b| b == a) {
                return Err(Error::InvalidDirectionScheme(format!(
                    "code {} assigned to both {:?} and {:?}",
                    a,
                    Direction::ALL[i],
                    Direction::ALL[i + 1 + j]
                )));
            }
        }
        Ok(Self { codes, none })
    }

    /// Build a scheme from explicit (direction, code) pairs in any order.
    ///
    /// Every direction must appear exactly once.
    pub fn from_pairs(pairs: &[(Direction, i32)], none: i32) -> Result<Self> {
        if pairs.len() != 8 {
            return Err(Error::InvalidDirectionScheme(format!(
                "expected 8 direction codes, got {}",
                pairs.len()
            )));
        }
        let mut codes: [Option<i32>; 8] = [None; 8];
        for &(dir, code) in pairs {
            if codes[dir.index()].replace(code).is_some() {
                return Err(Error::InvalidDirectionScheme(format!(
                    "direction {:?} given more than once",
                    dir
                )));
            }
        }
        let mut out = [0i32; 8];
        for (slot, code) in out.iter_mut().zip(codes) {
            // 8 pairs with no repeated direction cover all eight slots
            *slot = code.ok_or_else(|| {
                Error::InvalidDirectionScheme("missing direction".to_string())
            })?;
        }
        Self::new(out, none)
    }

    /// ESRI / ArcGIS encoding: E=1, SE=2, S=4, SW=8, W=16, NW=32, N=64, NE=128
    pub fn esri() -> Self {
        Self {
            codes: [64, 128, 1, 2, 4, 8, 16, 32],
            none: 0,
        }
    }

    /// TauDEM / GRASS-style encoding: E=1, NE=2, N=3, ... counter-clockwise to SE=8
    pub fn taudem() -> Self {
        Self {
            codes: [3, 2, 1, 8, 7, 6, 5, 4],
            none: 0,
        }
    }

    /// Code for a direction
    #[inline]
    pub fn code(&self, dir: Direction) -> i32 {
        self.codes[dir.index()]
    }

    /// The no-direction sentinel
    #[inline]
    pub fn none(&self) -> i32 {
        self.none
    }

    /// Codes ordered N, NE, E, SE, S, SW, W, NW
    pub fn codes(&self) -> [i32; 8] {
        self.codes
    }

    #[inline]
    pub fn encode(&self, dir: Option<Direction>) -> i32 {
        dir.map_or(self.none, |d| self.code(d))
    }

    /// Decode a code; `Ok(None)` for the sentinel.
    pub fn decode(&self, code: i32) -> Result<Option<Direction>> {
        if code == self.none {
            return Ok(None);
        }
        self.codes
            .iter()
            .position(|&c| c == code)
            .map(|i| Some(Direction::ALL[i]))
            .ok_or_else(|| {
                Error::InvalidDirectionScheme(format!("code {} is not part of the scheme", code))
            })
    }
}

impl Default for DirectionScheme {
    fn default() -> Self {
        Self::esri()
    }
}
