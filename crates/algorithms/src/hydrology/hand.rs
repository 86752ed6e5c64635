//! HAND: Height Above Nearest Drainage
//!
//! Each cell follows its flow path down to the first channel cell and is
//! assigned the elevation difference to it. Channel cells are 0; the value
//! grows away from the network, which makes it a simple flood-exposure
//! index.
//!
//! Reference:
//! Nobre, A.D. et al. (2011). HAND, a new terrain descriptor using
//! SRTM-DEM. *Mapping Ecology and Conservation*, 275–287.

use cuenca_core::raster::Raster;
use cuenca_core::Result;
use ndarray::Array2;
use tracing::debug;

use super::flow_direction::{Flow, FlowDirectionGrid};

#[derive(Debug, Clone, Copy)]
enum Drainage {
    Unvisited,
    /// Elevation of the channel cell the path reaches
    Reaches(f64),
    /// Path leaves the grid or stops before reaching a channel
    Dead,
}

/// Height above the nearest channel cell along the flow path.
///
/// `channel_mask` marks channel cells with 1 (see
/// [`channel_mask`](super::stream_network::channel_mask)). Cells whose
/// path never meets a channel, and nodata cells, are NaN. Negative
/// differences (a channel higher than the cell draining to it, possible
/// on unconditioned DEMs) are clamped to 0.
pub fn hand(
    dem: &Raster<f64>,
    fdir: &FlowDirectionGrid,
    channel_mask: &Raster<u8>,
) -> Result<Raster<f64>> {
    fdir.ensure_same_shape(dem)?;
    fdir.ensure_same_shape(channel_mask)?;
    let (rows, cols) = dem.shape();
    let total = rows * cols;

    let mut state = vec![Drainage::Unvisited; total];
    for row in 0..rows {
        for col in 0..cols {
            let z = unsafe { dem.get_unchecked(row, col) };
            if unsafe { channel_mask.get_unchecked(row, col) } == 1 && !dem.is_nodata(z) {
                state[row * cols + col] = Drainage::Reaches(z);
            }
        }
    }

    // Walk each unresolved path once and cache the outcome on every cell of it
    let mut path: Vec<usize> = Vec::new();
    for start in 0..total {
        if !matches!(state[start], Drainage::Unvisited) {
            continue;
        }
        path.clear();
        let mut current = (start / cols, start % cols);
        let outcome = loop {
            let idx = current.0 * cols + current.1;
            match state[idx] {
                Drainage::Unvisited => {}
                resolved => break resolved,
            }
            path.push(idx);
            if path.len() > total {
                break Drainage::Dead;
            }
            match fdir.downstream(current.0, current.1) {
                Flow::Cell(r, c) => current = (r, c),
                _ => break Drainage::Dead,
            }
        };
        for &idx in &path {
            state[idx] = outcome;
        }
    }

    let mut output = Array2::<f64>::from_elem((rows, cols), f64::NAN);
    let mut resolved = 0usize;
    for ((row, col), out) in output.indexed_iter_mut() {
        let z = unsafe { dem.get_unchecked(row, col) };
        if dem.is_nodata(z) {
            continue;
        }
        if let Drainage::Reaches(channel_z) = state[row * cols + col] {
            *out = (z - channel_z).max(0.0);
            resolved += 1;
        }
    }

    debug!(resolved, "height above nearest drainage computed");
    dem.derive(output, Some(f64::NAN))
}
