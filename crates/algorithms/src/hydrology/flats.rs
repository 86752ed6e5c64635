//! Flat resolution
//!
//! After depression filling, filled basins and natural plateaus are flats:
//! connected cells of equal elevation with no strictly lower neighbour.
//! Each flat cell is lifted by a tiny amount built from two breadth-first
//! gradients, so that every flat cell gets a strictly descending path to
//! the flat's outlet while the flat stays below all surrounding terrain.
//!
//! - *towards lower*: distance `t` from the flat's low edges (cells of the
//!   same elevation that already drain)
//! - *away from higher*: distance `a` from the flat's high edges (flat
//!   cells touching higher terrain), with `H` the largest `a` of the flat
//!
//! The combined gradient `g = 2t + (H - a)` strictly decreases along some
//! neighbour step for every flat cell, because `t` drops by one while `a`
//! changes by at most one.
//!
//! Reference:
//! Barnes, R., Lehman, C., & Mulla, D. (2014). An efficient assignment of
//! drainage direction over flat surfaces in raster digital elevation
//! models. *Computers & Geosciences*, 62, 128–135.

use std::collections::VecDeque;

use cuenca_core::raster::Raster;
use cuenca_core::Result;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Parameters for flat resolution
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FlatParams {
    /// Upper bound on the elevation added per gradient step.
    ///
    /// The step used for a flat is further capped so the largest lift stays
    /// strictly below the smallest rise to the terrain around the flat.
    pub increment: f64,
}

impl Default for FlatParams {
    fn default() -> Self {
        Self { increment: 1e-5 }
    }
}

/// Steps smaller than this fraction of the elevation are lost to rounding.
const MIN_RELATIVE_STEP: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Drainage {
    NoData,
    /// Has a strictly lower neighbour or sits on the boundary
    Drained,
    /// Flat cell
    Undrained,
}

fn classify(dem: &Raster<f64>) -> Array2<Drainage> {
    Array2::from_shape_fn(dem.shape(), |(row, col)| {
        let z = unsafe { dem.get_unchecked(row, col) };
        if dem.is_nodata(z) {
            return Drainage::NoData;
        }
        let has_lower = dem
            .neighbors(row, col)
            .any(|(nr, nc, _)| unsafe { dem.get_unchecked(nr, nc) } < z);
        if has_lower || dem.is_boundary(row, col) {
            Drainage::Drained
        } else {
            Drainage::Undrained
        }
    })
}

/// Mask of flat cells that have no drainage direction (1 = flat)
pub fn detect_flats(dem: &Raster<f64>) -> Result<Raster<u8>> {
    let mask = classify(dem).mapv(|d| u8::from(d == Drainage::Undrained));
    dem.derive(mask, None)
}

/// Per-flat bookkeeping, indexed by label - 1
#[derive(Debug, Clone)]
struct Flat {
    elevation: f64,
    /// Largest away-from-higher distance
    height: u32,
    /// Smallest positive rise from a flat cell to a higher neighbour
    gap: f64,
    max_gradient: u32,
    has_outlet: bool,
}

/// Lift every flat so that D8 routing finds a strictly descending path
/// across it.
///
/// Drained cells are returned untouched. Flats with no low edge (possible
/// only on a DEM that was not depression-filled first) are left flat and
/// reported with a warning.
pub fn resolve_flats(dem: &Raster<f64>, params: FlatParams) -> Result<Raster<f64>> {
    let (rows, cols) = dem.shape();
    let drainage = classify(dem);
    let z = |r: usize, c: usize| unsafe { dem.get_unchecked(r, c) };

    // Label flats by 8-connected flood fill over equal-elevation flat cells
    let mut labels = Array2::<u32>::zeros((rows, cols));
    let mut flats: Vec<Flat> = Vec::new();
    let mut queue: VecDeque<(usize, usize)> = VecDeque::new();
    for row in 0..rows {
        for col in 0..cols {
            if drainage[(row, col)] != Drainage::Undrained || labels[(row, col)] != 0 {
                continue;
            }
            flats.push(Flat {
                elevation: z(row, col),
                height: 0,
                gap: f64::INFINITY,
                max_gradient: 0,
                has_outlet: false,
            });
            let label = flats.len() as u32;
            labels[(row, col)] = label;
            queue.push_back((row, col));
            while let Some((r, c)) = queue.pop_front() {
                for (nr, nc, _) in dem.neighbors(r, c) {
                    if drainage[(nr, nc)] == Drainage::Undrained
                        && labels[(nr, nc)] == 0
                        && z(nr, nc) == z(r, c)
                    {
                        labels[(nr, nc)] = label;
                        queue.push_back((nr, nc));
                    }
                }
            }
        }
    }

    if flats.is_empty() {
        debug!("no flats to resolve");
        return Ok(dem.clone());
    }

    // Towards lower ground: BFS from low edges (drained cells beside a flat cell of equal height)
    let mut towards = Array2::<u32>::zeros((rows, cols));
    for row in 0..rows {
        for col in 0..cols {
            if drainage[(row, col)] != Drainage::Drained {
                continue;
            }
            let is_low_edge = dem.neighbors(row, col).any(|(nr, nc, _)| {
                drainage[(nr, nc)] == Drainage::Undrained && z(nr, nc) == z(row, col)
            });
            if is_low_edge {
                queue.push_back((row, col));
            }
        }
    }
    while let Some((r, c)) = queue.pop_front() {
        let t = towards[(r, c)];
        for (nr, nc, _) in dem.neighbors(r, c) {
            if drainage[(nr, nc)] == Drainage::Undrained
                && towards[(nr, nc)] == 0
                && z(nr, nc) == z(r, c)
            {
                towards[(nr, nc)] = t + 1;
                let flat = &mut flats[labels[(nr, nc)] as usize - 1];
                flat.has_outlet = true;
                queue.push_back((nr, nc));
            }
        }
    }

    // Away from higher ground: BFS from high edges within each flat
    let mut away = Array2::<u32>::zeros((rows, cols));
    for row in 0..rows {
        for col in 0..cols {
            let label = labels[(row, col)];
            if label == 0 {
                continue;
            }
            let here = z(row, col);
            let flat = &mut flats[label as usize - 1];
            let mut high_edge = false;
            for (nr, nc, _) in dem.neighbors(row, col) {
                let rise = z(nr, nc) - here;
                if rise > 0.0 {
                    high_edge = true;
                    flat.gap = flat.gap.min(rise);
                }
            }
            if high_edge {
                away[(row, col)] = 1;
                flat.height = flat.height.max(1);
                queue.push_back((row, col));
            }
        }
    }
    while let Some((r, c)) = queue.pop_front() {
        let a = away[(r, c)];
        let label = labels[(r, c)];
        for (nr, nc, _) in dem.neighbors(r, c) {
            if labels[(nr, nc)] == label && away[(nr, nc)] == 0 {
                away[(nr, nc)] = a + 1;
                let flat = &mut flats[label as usize - 1];
                flat.height = flat.height.max(a + 1);
                queue.push_back((nr, nc));
            }
        }
    }

    // Combine the gradients
    let mut gradient = Array2::<u32>::zeros((rows, cols));
    for row in 0..rows {
        for col in 0..cols {
            let label = labels[(row, col)];
            if label == 0 {
                continue;
            }
            let flat = &mut flats[label as usize - 1];
            let a = away[(row, col)];
            let g = 2 * towards[(row, col)] + if a > 0 { flat.height - a } else { 0 };
            gradient[(row, col)] = g;
            flat.max_gradient = flat.max_gradient.max(g);
        }
    }

    let steps: Vec<Option<f64>> = flats
        .iter()
        .enumerate()
        .map(|(i, flat)| {
            if !flat.has_outlet {
                warn!(
                    label = i + 1,
                    elevation = flat.elevation,
                    "flat has no outlet; fill depressions before resolving flats"
                );
                return None;
            }
            let step = params
                .increment
                .min(flat.gap / (f64::from(flat.max_gradient) + 1.0));
            if !(step > flat.elevation.abs() * MIN_RELATIVE_STEP) || step <= 0.0 {
                warn!(
                    label = i + 1,
                    elevation = flat.elevation,
                    gap = flat.gap,
                    "flat too shallow to perturb at f64 precision; left unresolved"
                );
                return None;
            }
            Some(step)
        })
        .collect();

    let mut output = dem.data().clone();
    for row in 0..rows {
        for col in 0..cols {
            let label = labels[(row, col)];
            if label == 0 {
                continue;
            }
            if let Some(step) = steps[label as usize - 1] {
                output[(row, col)] = z(row, col) + f64::from(gradient[(row, col)]) * step;
            }
        }
    }

    let resolved = steps.iter().filter(|s| s.is_some()).count();
    info!(flats = flats.len(), resolved, "flats resolved");
    dem.derive(output, dem.nodata())
}
