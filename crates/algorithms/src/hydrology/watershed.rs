//! Catchment delineation and flow distance
//!
//! Catchments are found by walking the flow graph backwards from an outlet:
//! a cell is in the catchment if its flow path reaches the outlet. Since
//! every cell has a single receiver, that path is unique and the distance
//! to the outlet is built up in the same breadth-first pass.

use std::collections::VecDeque;

use cuenca_core::raster::Raster;
use cuenca_core::{Algorithm, Error, Result};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::flow_direction::{Flow, FlowDirectionGrid};
use super::flow_graph::validate_acyclic;

/// Parameters for catchment delineation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CatchmentParams {
    /// Outlet cell as (row, col)
    pub outlet: (usize, usize),
}

/// Catchment delineation algorithm
#[derive(Debug, Clone, Default)]
pub struct CatchmentTracer;

impl Algorithm for CatchmentTracer {
    type Input = FlowDirectionGrid;
    type Output = Raster<u8>;
    type Params = CatchmentParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "Catchment"
    }

    fn description(&self) -> &'static str {
        "Delineate the area draining to an outlet cell"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        catchment(&input, params.outlet)
    }
}

fn check_outlet(fdir: &FlowDirectionGrid, (row, col): (usize, usize)) -> Result<()> {
    let (rows, cols) = fdir.shape();
    if row >= rows || col >= cols {
        return Err(Error::IndexOutOfBounds { row, col, rows, cols });
    }
    if fdir.is_nodata(row, col) {
        return Err(Error::EmptyCatchment { row, col });
    }
    Ok(())
}

/// Breadth-first walk up the flow graph from `outlet`, calling `visit`
/// with each cell and the cell it drains to (the outlet has none).
///
/// Only a cycle through the outlet is reachable from it, and the walk then
/// comes back to the outlet; that is reported as `CycleDetected`.
fn trace_upstream<F>(
    fdir: &FlowDirectionGrid,
    outlet: (usize, usize),
    mut visit: F,
) -> Result<usize>
where
    F: FnMut((usize, usize), Option<(usize, usize)>),
{
    let mut queue = VecDeque::new();
    visit(outlet, None);
    queue.push_back(outlet);
    let mut visited = 1usize;

    while let Some((row, col)) = queue.pop_front() {
        for donor in fdir.upstream(row, col) {
            if donor == outlet {
                warn!(row = outlet.0, col = outlet.1, "flow path loops back to the outlet");
                return Err(Error::CycleDetected {
                    remaining: visited,
                    row: outlet.0,
                    col: outlet.1,
                });
            }
            visit(donor, Some((row, col)));
            queue.push_back(donor);
            visited += 1;
        }
    }
    Ok(visited)
}

/// Mask of every cell draining to `outlet` (1 = inside, 0 = outside).
///
/// The outlet itself is always inside. On an acyclic grid each cell is
/// visited once.
///
/// # Errors
/// - `IndexOutOfBounds` when the outlet is outside the grid
/// - `EmptyCatchment` when the outlet cell is nodata
/// - `CycleDetected` when the outlet lies on a flow loop
pub fn catchment(fdir: &FlowDirectionGrid, outlet: (usize, usize)) -> Result<Raster<u8>> {
    check_outlet(fdir, outlet)?;
    let (rows, cols) = fdir.shape();

    let mut mask = Array2::<u8>::zeros((rows, cols));
    let area = trace_upstream(fdir, outlet, |cell, _| mask[cell] = 1)?;

    info!(row = outlet.0, col = outlet.1, cells = area, "catchment delineated");
    fdir.derive(mask, Some(0))
}

/// Length of the flow path from each catchment cell to `outlet`.
///
/// Each step costs the ground distance between the two cell centres
/// (diagonal steps are longer), multiplied by the weight of the cell the
/// step leaves when `weights` is given; nodata weights count as 0. The
/// outlet is 0 and cells outside the catchment are NaN.
///
/// Fails like [`catchment`], and with `ShapeMismatch` for mismatched weights.
pub fn flow_distance(
    fdir: &FlowDirectionGrid,
    outlet: (usize, usize),
    weights: Option<&Raster<f64>>,
) -> Result<Raster<f64>> {
    check_outlet(fdir, outlet)?;
    if let Some(w) = weights {
        fdir.ensure_same_shape(w)?;
    }
    let (rows, cols) = fdir.shape();

    let mut dist = Array2::<f64>::from_elem((rows, cols), f64::NAN);
    trace_upstream(fdir, outlet, |cell, receiver| {
        let Some(receiver) = receiver else {
            dist[cell] = 0.0;
            return;
        };
        let step = fdir
            .direction(cell.0, cell.1)
            .map_or(0.0, |d| fdir.step_distance(d));
        let weight = match weights {
            None => 1.0,
            Some(w) => {
                let v = unsafe { w.get_unchecked(cell.0, cell.1) };
                if w.is_nodata(v) {
                    0.0
                } else {
                    v
                }
            }
        };
        dist[cell] = dist[receiver] + step * weight;
    })?;

    debug!(row = outlet.0, col = outlet.1, "flow distance computed");
    fdir.derive(dist, Some(f64::NAN))
}

/// Label every drainage basin of the grid.
///
/// Each terminal cell (one that drains off the grid, into nodata, or
/// nowhere) seeds a basin; labels start at 1 in row-major order of the
/// terminals. Nodata cells are 0.
///
/// # Errors
/// `CycleDetected` when the directions contain a loop, whose cells would
/// belong to no basin.
pub fn label_basins(fdir: &FlowDirectionGrid) -> Result<Raster<i32>> {
    validate_acyclic(fdir)?;
    let (rows, cols) = fdir.shape();
    let mut labels = Array2::<i32>::zeros((rows, cols));
    let mut next_id = 0i32;

    for row in 0..rows {
        for col in 0..cols {
            if !matches!(fdir.downstream(row, col), Flow::Exit | Flow::Sink) {
                continue;
            }
            next_id += 1;
            let id = next_id;
            trace_upstream(fdir, (row, col), |cell, _| labels[cell] = id)?;
        }
    }

    info!(basins = next_id, "basins labelled");
    fdir.derive(labels, Some(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use cuenca_core::{DirectionScheme, GeoTransform};
    use std::f64::consts::SQRT_2;

    /// Two branches meeting at the bottom-centre outlet:
    ///
    /// ```text
    ///  S   S   S   S
    ///  S   S   S   S
    ///  SE  S   SW  S
    ///  E   S   W   E
    /// ```
    ///
    /// Everything reaches (3,1) except the east column, which exits at (3,3).
    fn branches() -> FlowDirectionGrid {
        #[rustfmt::skip]
        let codes = vec![
            4, 4, 4, 4,
            4, 4, 4, 4,
            2, 4, 8, 4,
            1, 4, 16, 1,
        ];
        let mut raster = Raster::from_vec(codes, 4, 4).unwrap();
        raster.set_transform(GeoTransform::new(0.0, 40.0, 10.0, -10.0));
        FlowDirectionGrid::from_codes(&raster, DirectionScheme::esri()).unwrap()
    }

    #[test]
    fn test_catchment_of_outlet() {
        let fdir = branches();
        let mask = catchment(&fdir, (3, 1)).unwrap();
        let inside = [
            (0, 0), (0, 1), (0, 2),
            (1, 0), (1, 1), (1, 2),
            (2, 0), (2, 1), (2, 2),
            (3, 0), (3, 1), (3, 2),
        ];
        for &(r, c) in &inside {
            assert_eq!(mask.get(r, c).unwrap(), 1, "({}, {}) should drain to the outlet", r, c);
        }
        assert_eq!(mask.data().iter().map(|&v| v as usize).sum::<usize>(), inside.len());
        assert_eq!(mask.get(3, 3).unwrap(), 0);
    }

    #[test]
    fn test_disjoint_branches() {
        let fdir = branches();
        let west = catchment(&fdir, (2, 0)).unwrap();
        let east = catchment(&fdir, (2, 2)).unwrap();
        assert_eq!(west.get(0, 0).unwrap(), 1);
        assert_eq!(east.get(0, 2).unwrap(), 1);
        for (a, b) in west.data().iter().zip(east.data().iter()) {
            assert!(!(*a == 1 && *b == 1), "catchments of sibling cells must not overlap");
        }
    }

    #[test]
    fn test_downstream_catchment_contains_upstream() {
        let fdir = branches();
        let up = catchment(&fdir, (1, 1)).unwrap();
        let down = catchment(&fdir, (3, 1)).unwrap();
        for (u, d) in up.data().iter().zip(down.data().iter()) {
            assert!(*u <= *d);
        }
    }

    #[test]
    fn test_flow_distance_counts_diagonals() {
        let fdir = branches();
        let dist = flow_distance(&fdir, (3, 1), None).unwrap();
        assert_eq!(dist.get(3, 1).unwrap(), 0.0);
        assert_relative_eq!(dist.get(0, 1).unwrap(), 30.0);
        // (2,2) -> SW -> (3,1)
        assert_relative_eq!(dist.get(2, 2).unwrap(), 10.0 * SQRT_2);
        // (1,0) -> S -> (2,0) -> SE -> (3,1)
        assert_relative_eq!(dist.get(1, 0).unwrap(), 10.0 + 10.0 * SQRT_2);
        assert!(dist.get(3, 3).unwrap().is_nan());
    }

    #[test]
    fn test_weighted_flow_distance() {
        let fdir = branches();
        let mut weights = fdir.template::<f64>();
        weights.data_mut().fill(2.0);
        weights.set(1, 1, 0.5).unwrap();
        let dist = flow_distance(&fdir, (3, 1), Some(&weights)).unwrap();
        // (0,1): 2*10 + 0.5*10 + 2*10
        assert_relative_eq!(dist.get(0, 1).unwrap(), 45.0);
    }

    #[test]
    fn test_bad_outlets() {
        let fdir = branches();
        assert!(matches!(catchment(&fdir, (9, 0)), Err(Error::IndexOutOfBounds { .. })));

        let mut codes = Raster::from_vec(vec![1, -1], 1, 2).unwrap();
        codes.set_nodata(Some(-1));
        let fdir = FlowDirectionGrid::from_codes(&codes, DirectionScheme::esri()).unwrap();
        assert!(matches!(
            catchment(&fdir, (0, 1)),
            Err(Error::EmptyCatchment { row: 0, col: 1 })
        ));
    }

    #[test]
    fn test_label_basins_partitions_grid() {
        let fdir = branches();
        let labels = label_basins(&fdir).unwrap();
        assert!(labels.data().iter().all(|&l| l > 0));
        assert_eq!(labels.get(0, 0).unwrap(), 1);
        assert_eq!(labels.get(3, 2).unwrap(), 1);
        assert_eq!(labels.get(0, 3).unwrap(), 2);
        assert_eq!(labels.get(3, 3).unwrap(), 2);
    }

    #[test]
    fn test_loop_through_outlet_is_an_error() {
        // (0,0) -> E, (0,1) -> W
        let codes = Raster::from_vec(vec![1, 16], 1, 2).unwrap();
        let fdir = FlowDirectionGrid::from_codes(&codes, DirectionScheme::esri()).unwrap();
        assert!(matches!(
            catchment(&fdir, (0, 0)),
            Err(Error::CycleDetected { row: 0, col: 0, .. })
        ));
        assert!(matches!(
            flow_distance(&fdir, (0, 1), None),
            Err(Error::CycleDetected { .. })
        ));
        assert!(matches!(label_basins(&fdir), Err(Error::CycleDetected { .. })));
    }

    #[test]
    fn test_loop_elsewhere_does_not_affect_catchment() {
        // Row 0 loops, row 1 drains east off the grid
        let codes = Raster::from_vec(vec![1, 16, 1, 1], 2, 2).unwrap();
        let fdir = FlowDirectionGrid::from_codes(&codes, DirectionScheme::esri()).unwrap();
        let mask = catchment(&fdir, (1, 1)).unwrap();
        assert_eq!(mask.data().iter().map(|&v| v as usize).sum::<usize>(), 2);
        assert_eq!(mask.get(0, 0).unwrap(), 0);
    }

    #[test]
    fn test_tracer_algorithm() {
        let mask = CatchmentTracer
            .execute(branches(), CatchmentParams { outlet: (3, 1) })
            .unwrap();
        assert_eq!(mask.get(0, 0).unwrap(), 1);
    }
}
