//! Hydrological conditioning
//!
//! Pit filling, depression filling and flat resolution chained into one
//! pass that turns a raw DEM into a surface on which every cell has a
//! strictly descending D8 path to the grid boundary.

use cuenca_core::raster::Raster;
use cuenca_core::{Algorithm, Error, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::fill_pits::{fill_pits, PitFillParams};
use super::flats::{resolve_flats, FlatParams};
use super::priority_flood::{priority_flood, PriorityFloodParams};

/// Parameters for the conditioning pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConditionParams {
    /// Run single-cell pit filling before depression filling
    pub fill_pits: bool,
    pub pits: PitFillParams,
    pub flood: PriorityFloodParams,
    /// Lift flats so they drain; turn off to keep filled areas perfectly flat
    pub resolve_flats: bool,
    pub flats: FlatParams,
}

impl Default for ConditionParams {
    fn default() -> Self {
        Self {
            fill_pits: true,
            pits: PitFillParams::default(),
            flood: PriorityFloodParams::default(),
            resolve_flats: true,
            flats: FlatParams::default(),
        }
    }
}

/// DEM conditioning algorithm
#[derive(Debug, Clone, Default)]
pub struct Conditioner;

impl Algorithm for Conditioner {
    type Input = Raster<f64>;
    type Output = Raster<f64>;
    type Params = ConditionParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "Condition DEM"
    }

    fn description(&self) -> &'static str {
        "Fill pits and depressions, then resolve flats"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        condition(&input, params)
    }
}

/// Condition a DEM for D8 routing. The input is left untouched.
///
/// With the default parameters the result has no pits, depressions or
/// flats, and conditioning it again returns an identical grid.
pub fn condition(dem: &Raster<f64>, params: ConditionParams) -> Result<Raster<f64>> {
    let (rows, cols) = dem.shape();
    info!(rows, cols, "conditioning DEM");

    let pitless = if params.fill_pits {
        Some(fill_pits(dem, params.pits)?)
    } else {
        None
    };
    let filled = priority_flood(pitless.as_ref().unwrap_or(dem), params.flood)?;

    if params.resolve_flats {
        resolve_flats(&filled, params.flats)
    } else {
        Ok(filled)
    }
}
