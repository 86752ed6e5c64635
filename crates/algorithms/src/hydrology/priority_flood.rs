//! Priority-Flood depression filling
//!
//! O(n log n) depression filling: cells are processed in order of filled
//! elevation from a min-heap seeded with every cell where water can leave
//! the grid (the outer edge and cells next to nodata). Each cell is pushed
//! once, so its first pop is final.
//!
//! Reference:
//! Barnes, R., Lehman, C., & Mulla, D. (2014). Priority-Flood: An optimal
//! depression-filling and watershed-labeling algorithm for digital elevation
//! models. *Computers & Geosciences*, 62, 117–127.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use cuenca_core::raster::Raster;
use cuenca_core::Result;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// A cell in the priority queue, ordered by elevation (min-heap).
#[derive(Debug, Clone, Copy)]
struct Cell {
    elevation: f64,
    row: usize,
    col: usize,
}

impl PartialEq for Cell {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Cell {}

impl PartialOrd for Cell {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Cell {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so BinaryHeap pops the lowest elevation; ties pop in row-major order
        other
            .elevation
            .total_cmp(&self.elevation)
            .then_with(|| (other.row, other.col).cmp(&(self.row, self.col)))
    }
}

/// Parameters for Priority-Flood filling
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PriorityFloodParams {
    /// Minimum rise enforced from a cell to the cells it floods.
    ///
    /// `0.0` (default) leaves filled depressions perfectly flat for flat
    /// resolution to handle; a small positive value builds the gradient
    /// into the fill directly.
    pub epsilon: f64,
}

impl Default for PriorityFloodParams {
    fn default() -> Self {
        Self { epsilon: 0.0 }
    }
}

/// Fill every depression in a DEM.
///
/// # Algorithm
/// 1. Seed a min-heap with all boundary cells (edge or nodata-adjacent) at
///    their own elevation
/// 2. Pop the lowest cell
/// 3. For each unvisited valid neighbour set
///    `filled = max(neighbour_elevation, popped_elevation + epsilon)`,
///    mark it visited and push it
/// 4. Repeat until the heap is empty
///
/// Every interior cell ends with a non-increasing path to the boundary.
/// Elevations are never lowered and nodata is preserved.
pub fn priority_flood(dem: &Raster<f64>, params: PriorityFloodParams) -> Result<Raster<f64>> {
    let (rows, cols) = dem.shape();
    let epsilon = params.epsilon;
    debug!(rows, cols, epsilon, "priority-flood: start");

    let mut output = dem.data().clone();
    let mut visited = Array2::<bool>::from_elem((rows, cols), false);
    let mut heap = BinaryHeap::new();

    for row in 0..rows {
        for col in 0..cols {
            let val = unsafe { dem.get_unchecked(row, col) };
            if dem.is_nodata(val) {
                visited[(row, col)] = true;
                continue;
            }
            if dem.is_boundary(row, col) {
                heap.push(Cell { elevation: val, row, col });
                visited[(row, col)] = true;
            }
        }
    }
    let seeds = heap.len();

    let mut raised = 0usize;
    while let Some(cell) = heap.pop() {
        for (nr, nc, _) in dem.neighbors(cell.row, cell.col) {
            if visited[(nr, nc)] {
                continue;
            }
            visited[(nr, nc)] = true;

            let neighbor_elev = unsafe { dem.get_unchecked(nr, nc) };
            let filled = if neighbor_elev < cell.elevation + epsilon {
                raised += 1;
                cell.elevation + epsilon
            } else {
                neighbor_elev
            };

            output[(nr, nc)] = filled;
            heap.push(Cell {
                elevation: filled,
                row: nr,
                col: nc,
            });
        }
    }

    info!(seeds, raised, "priority-flood: depressions filled");
    dem.derive(output, dem.nodata())
}

/// Depression filling with a zero epsilon: filled depressions are flat.
pub fn fill_depressions(dem: &Raster<f64>) -> Result<Raster<f64>> {
    priority_flood(dem, PriorityFloodParams::default())
}

/// Mask of cells that lie inside a depression (1 = raised by filling).
pub fn detect_depressions(dem: &Raster<f64>) -> Result<Raster<u8>> {
    let filled = fill_depressions(dem)?;
    let mask = ndarray::Zip::from(dem.data())
        .and(filled.data())
        .map_collect(|&orig, &fill| u8::from(!dem.is_nodata(orig) && fill > orig));
    dem.derive(mask, None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cuenca_core::GeoTransform;

    fn create_dem_with_sink() -> Raster<f64> {
        // 7x7 DEM with a depression in the center
        let values = vec![
            9.0, 9.0, 9.0, 9.0, 9.0, 9.0, 9.0,
            9.0, 8.0, 8.0, 8.0, 8.0, 8.0, 9.0,
            9.0, 8.0, 7.0, 7.0, 7.0, 8.0, 9.0,
            9.0, 8.0, 7.0, 3.0, 7.0, 8.0, 9.0,
            9.0, 8.0, 7.0, 7.0, 7.0, 8.0, 9.0,
            9.0, 8.0, 8.0, 8.0, 8.0, 8.0, 9.0,
            9.0, 9.0, 9.0, 9.0, 9.0, 9.0, 9.0,
        ];
        let mut dem = Raster::from_vec(values, 7, 7).unwrap();
        dem.set_transform(GeoTransform::new(0.0, 7.0, 1.0, -1.0));
        dem
    }

    #[test]
    fn test_bowl_fills_to_rim() {
        let dem = create_dem_with_sink();
        let filled = fill_depressions(&dem).unwrap();

        // The whole bowl spills over the 9.0 rim
        for row in 1..6 {
            for col in 1..6 {
                assert_eq!(filled.get(row, col).unwrap(), 9.0, "cell ({}, {})", row, col);
            }
        }
    }

    #[test]
    fn test_never_lowers_elevation() {
        let dem = create_dem_with_sink();
        let filled = priority_flood(&dem, PriorityFloodParams { epsilon: 0.01 }).unwrap();

        for row in 0..7 {
            for col in 0..7 {
                let orig = dem.get(row, col).unwrap();
                let fill = filled.get(row, col).unwrap();
                assert!(
                    fill >= orig,
                    "Priority-Flood must never lower elevation at ({}, {}): orig={}, fill={}",
                    row, col, orig, fill
                );
            }
        }
    }

    #[test]
    fn test_clean_dem_unchanged() {
        let mut dem = Raster::new(10, 10);
        for row in 0..10 {
            for col in 0..10 {
                dem.set(row, col, (row + col) as f64).unwrap();
            }
        }

        let filled = fill_depressions(&dem).unwrap();
        assert_eq!(filled.data(), dem.data());
    }

    #[test]
    fn test_outlet_respects_low_border() {
        // 5x5: border=10 except outlet at (4,2)=2, interior 5, sink at (2,2)=1
        let mut dem = Raster::new(5, 5);
        for row in 0..5 {
            for col in 0..5 {
                let is_border = row == 0 || row == 4 || col == 0 || col == 4;
                dem.set(row, col, if is_border { 10.0 } else { 5.0 }).unwrap();
            }
        }
        dem.set(2, 2, 1.0).unwrap();
        dem.set(4, 2, 2.0).unwrap();

        let filled = fill_depressions(&dem).unwrap();

        // The interior already drains over the low outlet; only the sink is raised
        assert_eq!(filled.get(2, 2).unwrap(), 5.0);
        assert_eq!(filled.get(3, 2).unwrap(), 5.0);
        assert_eq!(filled.get(4, 2).unwrap(), 2.0);
    }

    #[test]
    fn test_epsilon_builds_gradient() {
        let dem = create_dem_with_sink();
        let filled = priority_flood(&dem, PriorityFloodParams { epsilon: 0.01 }).unwrap();

        let ring = filled.get(1, 3).unwrap();
        let center = filled.get(3, 3).unwrap();
        assert!(ring > 9.0, "inner ring should sit above the rim, got {}", ring);
        assert!(center > ring, "center {} should sit above ring {}", center, ring);
    }

    #[test]
    fn test_nodata_hole_is_an_outlet() {
        // The nodata cell in the middle of the bowl drains it
        let mut dem = create_dem_with_sink();
        dem.set_nodata(Some(-9999.0));
        dem.set(3, 3, -9999.0).unwrap();

        let filled = fill_depressions(&dem).unwrap();
        assert_eq!(filled.get(3, 3).unwrap(), -9999.0);
        assert_eq!(filled.get(2, 2).unwrap(), 7.0);
        assert_eq!(filled.get(1, 1).unwrap(), 8.0);
        assert_eq!(filled.nodata(), Some(-9999.0));
    }

    #[test]
    fn test_detect_depressions() {
        let dem = create_dem_with_sink();
        let mask = detect_depressions(&dem).unwrap();
        assert_eq!(mask.get(3, 3).unwrap(), 1);
        assert_eq!(mask.get(1, 1).unwrap(), 1);
        assert_eq!(mask.get(0, 0).unwrap(), 0);
    }
}
