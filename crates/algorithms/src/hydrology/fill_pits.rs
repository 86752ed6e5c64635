//! Single-cell pit filling
//!
//! A pit is an interior cell whose valid neighbours are all strictly
//! higher. Raising each pit to its lowest neighbour removes one-cell sinks
//! (typically DEM noise) cheaply; multi-cell depressions need
//! [`priority_flood`](super::priority_flood).

use cuenca_core::raster::Raster;
use cuenca_core::{Algorithm, Error, Result};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Parameters for pit filling
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PitFillParams {
    /// Added on top of the lowest neighbour so the filled cell drains strictly
    pub epsilon: f64,
}

impl Default for PitFillParams {
    fn default() -> Self {
        Self { epsilon: 0.0 }
    }
}

/// Pit filling algorithm
#[derive(Debug, Clone, Default)]
pub struct FillPits;

impl Algorithm for FillPits {
    type Input = Raster<f64>;
    type Output = Raster<f64>;
    type Params = PitFillParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "Fill Pits"
    }

    fn description(&self) -> &'static str {
        "Raise single-cell pits to their lowest neighbour"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        fill_pits(&input, params)
    }
}

/// Lowest neighbour elevation when (row, col) is an interior pit.
///
/// Boundary cells are never pits: water leaves the grid through them.
fn pit_spill(dem: &Raster<f64>, row: usize, col: usize) -> Option<f64> {
    let z = unsafe { dem.get_unchecked(row, col) };
    if dem.is_nodata(z) || dem.is_boundary(row, col) {
        return None;
    }
    let lowest = dem
        .neighbors(row, col)
        .map(|(nr, nc, _)| unsafe { dem.get_unchecked(nr, nc) })
        .fold(f64::INFINITY, f64::min);
    (lowest > z).then_some(lowest)
}

/// Raise every pit to the minimum of its neighbours (plus `epsilon`).
///
/// Pits are detected on the input surface, so filling one pit never
/// cascades into its neighbours within the same call.
pub fn fill_pits(dem: &Raster<f64>, params: PitFillParams) -> Result<Raster<f64>> {
    let (rows, cols) = dem.shape();
    let mut output = dem.data().clone();
    let mut filled = 0usize;

    for row in 0..rows {
        for col in 0..cols {
            if let Some(spill) = pit_spill(dem, row, col) {
                output[(row, col)] = spill + params.epsilon;
                filled += 1;
            }
        }
    }

    debug!(filled, "pits filled");
    dem.derive(output, dem.nodata())
}

/// Mask of single-cell pits (1 = pit)
pub fn detect_pits(dem: &Raster<f64>) -> Result<Raster<u8>> {
    let (rows, cols) = dem.shape();
    let mask = Array2::from_shape_fn((rows, cols), |(row, col)| {
        u8::from(pit_spill(dem, row, col).is_some())
    });
    dem.derive(mask, None)
}
