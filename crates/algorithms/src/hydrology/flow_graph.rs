//! Flow graph over a direction grid
//!
//! Every valid cell has at most one receiver, so the grid is a forest of
//! in-trees as long as no cycle exists. Kahn's algorithm produces an
//! upstream-to-downstream order and detects cycles in the same pass.

use std::collections::VecDeque;

use cuenca_core::{Error, Result};
use tracing::{debug, warn};

use super::flow_direction::{Flow, FlowDirectionGrid};

/// Receiver lists and in-degrees of a direction grid, indexed row-major.
#[derive(Debug, Clone)]
pub struct FlowGraph {
    rows: usize,
    cols: usize,
    receivers: Vec<Option<usize>>,
    valid: Vec<bool>,
}

impl FlowGraph {
    pub fn new(fdir: &FlowDirectionGrid) -> Self {
        let (rows, cols) = fdir.shape();
        let mut receivers = vec![None; rows * cols];
        let mut valid = vec![false; rows * cols];

        for row in 0..rows {
            for col in 0..cols {
                let idx = row * cols + col;
                match fdir.downstream(row, col) {
                    Flow::NoData => {}
                    Flow::Cell(r, c) => {
                        valid[idx] = true;
                        receivers[idx] = Some(r * cols + c);
                    }
                    Flow::Exit | Flow::Sink => valid[idx] = true,
                }
            }
        }

        Self { rows, cols, receivers, valid }
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// Downstream cell of a flat index
    #[inline]
    pub fn receiver(&self, idx: usize) -> Option<usize> {
        self.receivers[idx]
    }

    #[inline]
    pub fn is_valid(&self, idx: usize) -> bool {
        self.valid[idx]
    }

    pub fn valid_count(&self) -> usize {
        self.valid.iter().filter(|&&v| v).count()
    }

    /// Number of donors draining into each cell
    pub fn in_degrees(&self) -> Vec<u32> {
        let mut deg = vec![0u32; self.receivers.len()];
        for r in self.receivers.iter().flatten() {
            deg[*r] += 1;
        }
        deg
    }

    /// Flat (row-major) indices ordered so every cell comes before its
    /// receiver. Cells with no donors start the order in row-major order.
    ///
    /// Fails with `CycleDetected` when some cells can never be released,
    /// reporting the first such cell in row-major order.
    pub fn topological_order(&self) -> Result<Vec<usize>> {
        let mut deg = self.in_degrees();
        let mut queue: VecDeque<usize> = (0..self.receivers.len())
            .filter(|&i| self.valid[i] && deg[i] == 0)
            .collect();
        let mut order = Vec::with_capacity(self.receivers.len());

        while let Some(idx) = queue.pop_front() {
            order.push(idx);
            if let Some(r) = self.receivers[idx] {
                deg[r] -= 1;
                if deg[r] == 0 {
                    queue.push_back(r);
                }
            }
        }

        let expected = self.valid_count();
        if order.len() < expected {
            let remaining = expected - order.len();
            // Cells left with donors are on or below a cycle
            let first = (0..deg.len()).find(|&i| self.valid[i] && deg[i] > 0).unwrap_or(0);
            let (row, col) = (first / self.cols, first % self.cols);
            warn!(remaining, row, col, "flow graph has a cycle");
            return Err(Error::CycleDetected { remaining, row, col });
        }

        debug!(cells = order.len(), "topological order built");
        Ok(order)
    }

    /// Cells grouped by longest distance from a source cell.
    ///
    /// Wave `k` holds the cells whose longest upstream chain has `k` links;
    /// a cell's donors are all in earlier waves, so cells of one wave can be
    /// processed independently.
    pub fn waves(&self) -> Result<Vec<Vec<usize>>> {
        let order = self.topological_order()?;
        let mut level = vec![0usize; self.receivers.len()];
        let mut waves: Vec<Vec<usize>> = Vec::new();

        for idx in order {
            let k = level[idx];
            if waves.len() <= k {
                waves.push(Vec::new());
            }
            waves[k].push(idx);
            if let Some(r) = self.receivers[idx] {
                level[r] = level[r].max(k + 1);
            }
        }
        Ok(waves)
    }
}

/// Fail with `CycleDetected` if following directions can loop forever.
pub fn validate_acyclic(fdir: &FlowDirectionGrid) -> Result<()> {
    FlowGraph::new(fdir).topological_order().map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cuenca_core::{DirectionScheme, Raster};

    fn grid(codes: Vec<i32>, rows: usize, cols: usize) -> FlowDirectionGrid {
        let raster = Raster::from_vec(codes, rows, cols).unwrap();
        FlowDirectionGrid::from_codes(&raster, DirectionScheme::esri()).unwrap()
    }

    #[test]
    fn test_order_puts_donors_first() {
        // All cells drain east along one row
        let g = FlowGraph::new(&grid(vec![1, 1, 1, 1], 1, 4));
        assert_eq!(g.topological_order().unwrap(), vec![0, 1, 2, 3]);
        assert_eq!(g.in_degrees(), vec![0, 1, 1, 1]);
    }

    #[test]
    fn test_two_cell_cycle_detected() {
        // (0,0) -> E, (0,1) -> W
        let fdir = grid(vec![1, 16, 64, 64], 2, 2);
        let err = validate_acyclic(&fdir).unwrap_err();
        match err {
            Error::CycleDetected { remaining, row, col } => {
                assert_eq!(remaining, 2);
                assert_eq!((row, col), (0, 0));
            }
            other => panic!("expected CycleDetected, got {:?}", other),
        }
    }

    #[test]
    fn test_cells_below_cycle_counted() {
        // 0 <-> 1 loop, 2 drains into the loop
        let fdir = grid(vec![1, 16, 16], 1, 3);
        match validate_acyclic(&fdir) {
            Err(Error::CycleDetected { remaining, .. }) => assert_eq!(remaining, 2),
            other => panic!("expected CycleDetected, got {:?}", other),
        }
    }

    #[test]
    fn test_nodata_excluded() {
        let mut raster = Raster::from_vec(vec![1, 1, -1, 0], 2, 2).unwrap();
        raster.set_nodata(Some(-1));
        let fdir = FlowDirectionGrid::from_codes(&raster, DirectionScheme::esri()).unwrap();
        let g = FlowGraph::new(&fdir);
        assert_eq!(g.valid_count(), 3);
        // (0,1) drains east off the grid
        assert_eq!(g.receiver(1), None);
        assert_eq!(g.topological_order().unwrap().len(), 3);
    }

    #[test]
    fn test_waves_follow_chain_length() {
        // (0,0) E -> (0,1) S -> (1,1) E -> off grid, and (1,0) E -> (1,1)
        let g = FlowGraph::new(&grid(vec![1, 4, 1, 1], 2, 2));
        let waves = g.waves().unwrap();
        assert_eq!(waves, vec![vec![0, 2], vec![1], vec![3]]);
    }
}
