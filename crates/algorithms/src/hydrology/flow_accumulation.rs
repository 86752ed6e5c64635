//! Flow accumulation
//!
//! Counts, for every cell, the cells whose flow path passes through it,
//! itself included. With a weight grid the count becomes a weighted sum
//! (rainfall, runoff coefficient...), and with [`Combine::Max`] the largest
//! upstream value is propagated instead.
//!
//! Cells are visited in topological order of the D8 graph (Kahn's
//! algorithm). The wave mode releases whole zero-in-degree frontiers at
//! once: contributions of a frontier are gathered in parallel, then added
//! to their receivers grouped by target.

use cuenca_core::raster::Raster;
use cuenca_core::{Algorithm, Error, ParallelAlgorithm, Result};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::flow_direction::FlowDirectionGrid;
use super::flow_graph::FlowGraph;
use crate::maybe_rayon::*;

/// How a cell merges the values arriving from its donors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Combine {
    /// Add upstream values (contributing area)
    #[default]
    Sum,
    /// Keep the largest of the cell's own and upstream values
    Max,
}

impl Combine {
    #[inline]
    fn apply(self, acc: f64, incoming: f64) -> f64 {
        match self {
            Combine::Sum => acc + incoming,
            Combine::Max => acc.max(incoming),
        }
    }
}

/// Traversal strategy for the topological pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingMode {
    /// Single Kahn queue
    #[default]
    Sequential,
    /// Frontier by frontier, gathering each frontier in parallel
    Wave,
}

/// Parameters for flow accumulation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AccumulationParams {
    pub combine: Combine,
    pub mode: ProcessingMode,
}

/// Flow accumulation algorithm (unweighted)
#[derive(Debug, Clone, Default)]
pub struct AccumulationEngine;

impl Algorithm for AccumulationEngine {
    type Input = FlowDirectionGrid;
    type Output = Raster<f64>;
    type Params = AccumulationParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "Flow Accumulation"
    }

    fn description(&self) -> &'static str {
        "Count upstream contributing cells along D8 flow directions"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        accumulate(&input, None, params)
    }
}

impl ParallelAlgorithm for AccumulationEngine {
    fn execute_parallel(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        let params = AccumulationParams {
            mode: ProcessingMode::Wave,
            ..params
        };
        accumulate(&input, None, params)
    }
}

/// Calculate flow accumulation from a D8 flow direction grid.
///
/// Each valid cell starts at 1 (or its weight; nodata and NaN weights
/// count as 0) and passes its value to its receiver once all of its own
/// donors are done. Nodata cells are NaN in the output.
///
/// # Errors
/// - `ShapeMismatch` when `weights` does not match the grid
/// - `CycleDetected` when the directions contain a loop
pub fn accumulate(
    fdir: &FlowDirectionGrid,
    weights: Option<&Raster<f64>>,
    params: AccumulationParams,
) -> Result<Raster<f64>> {
    let (rows, cols) = fdir.shape();
    if let Some(w) = weights {
        fdir.ensure_same_shape(w)?;
    }
    debug!(rows, cols, mode = ?params.mode, combine = ?params.combine, "accumulating flow");

    let graph = FlowGraph::new(fdir);
    let mut acc: Vec<f64> = (0..rows * cols)
        .map(|idx| {
            if !graph.is_valid(idx) {
                return f64::NAN;
            }
            match weights {
                None => 1.0,
                Some(w) => {
                    let v = unsafe { w.get_unchecked(idx / cols, idx % cols) };
                    if w.is_nodata(v) {
                        0.0
                    } else {
                        v
                    }
                }
            }
        })
        .collect();

    match params.mode {
        ProcessingMode::Sequential => {
            for idx in graph.topological_order()? {
                if let Some(r) = graph.receiver(idx) {
                    acc[r] = params.combine.apply(acc[r], acc[idx]);
                }
            }
        }
        ProcessingMode::Wave => {
            let waves = graph.waves()?;
            debug!(waves = waves.len(), "wave schedule built");
            for wave in &waves {
                let mut contributions: Vec<(usize, f64)> = wave
                    .as_slice()
                    .into_par_iter()
                    .filter_map(|&idx| graph.receiver(idx).map(|r| (r, acc[idx])))
                    .collect();
                // Stable so donors reach a shared receiver in frontier order
                contributions.sort_by_key(|&(r, _)| r);
                for (r, value) in contributions {
                    acc[r] = params.combine.apply(acc[r], value);
                }
            }
        }
    }

    let max = acc.iter().copied().filter(|v| v.is_finite()).fold(0.0_f64, f64::max);
    info!(max, "flow accumulation done");

    let data = Array2::from_shape_vec((rows, cols), acc).map_err(|e| Error::Other(e.to_string()))?;
    fdir.derive(data, Some(f64::NAN))
}

/// Unweighted upstream cell counts
pub fn flow_accumulation(fdir: &FlowDirectionGrid) -> Result<Raster<f64>> {
    accumulate(fdir, None, AccumulationParams::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hydrology::flow_direction::{flow_direction, Flow, FlowDirectionParams};
    use cuenca_core::{DirectionScheme, GeoTransform};

    fn strip_east(n: usize) -> FlowDirectionGrid {
        let codes = Raster::from_vec(vec![1; n], 1, n).unwrap();
        FlowDirectionGrid::from_codes(&codes, DirectionScheme::esri()).unwrap()
    }

    fn routed(values: Vec<f64>, rows: usize, cols: usize) -> FlowDirectionGrid {
        let mut dem = Raster::from_vec(values, rows, cols).unwrap();
        dem.set_transform(GeoTransform::new(0.0, rows as f64, 1.0, -1.0));
        flow_direction(&dem, FlowDirectionParams::default()).unwrap()
    }

    fn terrain() -> FlowDirectionGrid {
        let mut values = Vec::new();
        for row in 0..9 {
            for col in 0..11 {
                let noise = ((row * 5 + col * 3) % 4) as f64 * 0.3;
                let v = (row as f64 - 4.0).abs() * 2.0 + col as f64 + noise;
                values.push(v);
            }
        }
        routed(values, 9, 11)
    }

    #[test]
    fn test_linear_strip_counts_itself() {
        let acc = flow_accumulation(&strip_east(5)).unwrap();
        let values: Vec<f64> = acc.data().iter().copied().collect();
        assert_eq!(values, vec![1.0, 2.0, 3.0, 4.0, 5.0]);
    }

    #[test]
    fn test_convergent_center() {
        #[rustfmt::skip]
        let fdir = routed(vec![
            5.0, 5.0, 5.0,
            5.0, 1.0, 5.0,
            5.0, 5.0, 5.0,
        ], 3, 3);
        let acc = flow_accumulation(&fdir).unwrap();
        assert_eq!(
            acc.get(1, 1).unwrap(),
            9.0,
            "center should collect all 8 neighbours plus itself"
        );
        assert_eq!(acc.get(0, 0).unwrap(), 1.0);
    }

    #[test]
    fn test_mass_conserved_at_outlets() {
        let fdir = terrain();
        let acc = flow_accumulation(&fdir).unwrap();
        let (rows, cols) = fdir.shape();

        let mut at_outlets = 0.0;
        for row in 0..rows {
            for col in 0..cols {
                if matches!(fdir.downstream(row, col), Flow::Exit | Flow::Sink) {
                    at_outlets += acc.get(row, col).unwrap();
                }
            }
        }
        assert_eq!(at_outlets, fdir.valid_count() as f64);
    }

    #[test]
    fn test_wave_matches_sequential() {
        let fdir = terrain();
        let seq = flow_accumulation(&fdir).unwrap();
        let wave = accumulate(
            &fdir,
            None,
            AccumulationParams { mode: ProcessingMode::Wave, ..Default::default() },
        )
        .unwrap();
        assert_eq!(seq.data(), wave.data());

        let parallel = AccumulationEngine
            .execute_parallel(fdir, AccumulationParams::default())
            .unwrap();
        assert_eq!(seq.data(), parallel.data());
    }

    #[test]
    fn test_weights_replace_unit_count() {
        let mut weights = Raster::from_vec(vec![2.0, 0.0, -1.0, 1.0, 1.0], 1, 5).unwrap();
        weights.set_nodata(Some(-1.0));
        let acc =
            accumulate(&strip_east(5), Some(&weights), AccumulationParams::default()).unwrap();
        let values: Vec<f64> = acc.data().iter().copied().collect();
        assert_eq!(values, vec![2.0, 2.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_max_combine() {
        let weights = Raster::from_vec(vec![3.0, 1.0, 5.0, 2.0, 0.0], 1, 5).unwrap();
        let params = AccumulationParams { combine: Combine::Max, ..Default::default() };
        let acc = accumulate(&strip_east(5), Some(&weights), params).unwrap();
        let values: Vec<f64> = acc.data().iter().copied().collect();
        assert_eq!(values, vec![3.0, 3.0, 5.0, 5.0, 5.0]);
    }

    #[test]
    fn test_nodata_cells_are_nan() {
        let mut codes = Raster::from_vec(vec![1, 1, -9, 1], 1, 4).unwrap();
        codes.set_nodata(Some(-9));
        let fdir = FlowDirectionGrid::from_codes(&codes, DirectionScheme::esri()).unwrap();
        let acc = flow_accumulation(&fdir).unwrap();
        assert_eq!(acc.get(0, 1).unwrap(), 2.0);
        assert!(acc.get(0, 2).unwrap().is_nan());
        assert_eq!(acc.get(0, 3).unwrap(), 1.0);
    }

    #[test]
    fn test_weight_shape_mismatch() {
        let weights = Raster::filled(2, 5, 1.0);
        let err = accumulate(&strip_east(5), Some(&weights), AccumulationParams::default());
        assert!(matches!(err, Err(Error::ShapeMismatch { .. })));
    }

    #[test]
    fn test_cycle_is_fatal() {
        let codes = Raster::from_vec(vec![1, 16], 1, 2).unwrap();
        let fdir = FlowDirectionGrid::from_codes(&codes, DirectionScheme::esri()).unwrap();
        assert!(matches!(
            flow_accumulation(&fdir),
            Err(Error::CycleDetected { remaining: 2, .. })
        ));
    }

    #[test]
    fn test_params_from_json() {
        let params: AccumulationParams = serde_json::from_str(r#"{"mode": "wave"}"#).unwrap();
        assert_eq!(params.mode, ProcessingMode::Wave);
        assert_eq!(params.combine, Combine::Sum);
    }
}
