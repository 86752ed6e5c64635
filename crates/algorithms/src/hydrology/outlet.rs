//! Outlet snapping
//!
//! Gauges and pour points are rarely digitised exactly on the modelled
//! channel. Snapping moves a map coordinate to the nearest cell whose
//! accumulation satisfies a predicate (usually a minimum contributing area).

use cuenca_core::raster::Raster;
use cuenca_core::{Error, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Parameters for outlet snapping
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapParams {
    /// Search radius in cells around the cell containing the coordinate
    pub max_radius: usize,
}

impl Default for SnapParams {
    fn default() -> Self {
        Self { max_radius: 5 }
    }
}

/// Snap a map coordinate to the nearest accepted cell.
///
/// The search covers the square window of `max_radius` cells around the
/// cell containing `(x, y)`, so a coordinate slightly off the grid may
/// still snap to an edge cell. Distance is measured from the coordinate's
/// fractional pixel position to cell centres. Nodata and NaN cells are
/// never offered to the predicate. Equally distant candidates resolve to
/// the first in row-major order.
///
/// # Errors
/// `OutletUnresolved` when no cell within the window is accepted.
pub fn snap_outlet<F>(
    acc: &Raster<f64>,
    (x, y): (f64, f64),
    predicate: F,
    params: SnapParams,
) -> Result<(usize, usize)>
where
    F: Fn(f64) -> bool,
{
    let unresolved = || Error::OutletUnresolved { x, y, max_radius: params.max_radius };

    let (col_f, row_f) = acc.geo_to_pixel(x, y);
    if !(col_f.is_finite() && row_f.is_finite()) {
        return Err(unresolved());
    }

    let (rows, cols) = acc.shape();
    let radius = isize::try_from(params.max_radius).unwrap_or(isize::MAX);
    let base_row = row_f.floor() as isize;
    let base_col = col_f.floor() as isize;

    let row_lo = base_row.saturating_sub(radius).max(0);
    let row_hi = base_row.saturating_add(radius).min(rows as isize - 1);
    let col_lo = base_col.saturating_sub(radius).max(0);
    let col_hi = base_col.saturating_add(radius).min(cols as isize - 1);

    let mut best: Option<(f64, usize, usize)> = None;
    for row in row_lo..=row_hi {
        for col in col_lo..=col_hi {
            let (row, col) = (row as usize, col as usize);
            let value = unsafe { acc.get_unchecked(row, col) };
            if acc.is_nodata(value) || !predicate(value) {
                continue;
            }
            let dr = row as f64 + 0.5 - row_f;
            let dc = col as f64 + 0.5 - col_f;
            let d2 = dr * dr + dc * dc;
            // Row-major scan: only a strictly closer cell replaces the current pick
            if best.map_or(true, |(bd, _, _)| d2 < bd) {
                best = Some((d2, row, col));
            }
        }
    }

    let (d2, row, col) = best.ok_or_else(unresolved)?;
    debug!(x, y, row, col, distance = d2.sqrt(), "outlet snapped");
    Ok((row, col))
}

/// Snap to the nearest cell with accumulation at or above `threshold`
pub fn snap_to_threshold(
    acc: &Raster<f64>,
    xy: (f64, f64),
    threshold: f64,
    params: SnapParams,
) -> Result<(usize, usize)> {
    snap_outlet(acc, xy, |v| v >= threshold, params)
}
