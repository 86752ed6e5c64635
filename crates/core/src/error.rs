//! Error types for cuenca

use thiserror::Error;

/// Main error type for cuenca operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid raster dimensions: {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },

    #[error("Index out of bounds: ({row}, {col}) in raster of size ({rows}, {cols})")]
    IndexOutOfBounds {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },

    #[error("Raster shape mismatch: expected ({er}, {ec}), got ({ar}, {ac})")]
    ShapeMismatch { er: usize, ec: usize, ar: usize, ac: usize },

    #[error("Invalid flow direction scheme: {0}")]
    InvalidDirectionScheme(String),

    #[error("Flow graph contains a cycle: {remaining} cells unresolved, e.g. ({row}, {col})")]
    CycleDetected {
        remaining: usize,
        row: usize,
        col: usize,
    },

    #[error("No outlet satisfying the predicate within {max_radius} cells of ({x}, {y})")]
    OutletUnresolved { x: f64, y: f64, max_radius: usize },

    #[error("Outlet cell ({row}, {col}) is nodata")]
    EmptyCatchment { row: usize, col: usize },

    #[error("Invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("Algorithm error: {0}")]
    Algorithm(String),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for cuenca operations
pub type Result<T> = std::result::Result<T, Error>;
