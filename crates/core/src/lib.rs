//! # cuenca core
//!
//! Core types and traits for the cuenca raster hydrology engine.
//!
//! This crate provides:
//! - `Raster<T>`: georeferenced grid with nodata mask and neighbour indexing
//! - `GeoTransform`: affine transformation for georeferencing
//! - `CRS`: opaque coordinate reference system tag
//! - `Direction` / `DirectionScheme`: D8 compass directions and their codes
//! - Vector features for exporting stream polylines
//! - Algorithm traits for consistent API

pub mod crs;
pub mod error;
pub mod raster;
pub mod vector;

pub use crs::CRS;
pub use error::{Error, Result};
pub use raster::{Direction, DirectionScheme, GeoTransform, Raster, RasterElement};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::crs::CRS;
    pub use crate::error::{Error, Result};
    pub use crate::raster::{Direction, DirectionScheme, GeoTransform, Raster, RasterElement};
    pub use crate::{Algorithm, ParallelAlgorithm};
}

/// Core trait for all algorithms in cuenca.
///
/// Algorithms are pure functions that transform input data according to parameters.
pub trait Algorithm {
    /// Input type for the algorithm
    type Input;
    /// Output type for the algorithm
    type Output;
    /// Parameters controlling algorithm behavior
    type Params: Default;
    /// Error type for algorithm execution
    type Error: std::error::Error;

    /// Returns the algorithm name
    fn name(&self) -> &'static str;

    /// Returns a description of what the algorithm does
    fn description(&self) -> &'static str;

    /// Execute the algorithm
    fn execute(
        &self,
        input: Self::Input,
        params: Self::Params,
    ) -> std::result::Result<Self::Output, Self::Error>;

    /// Execute with default parameters
    fn execute_default(
        &self,
        input: Self::Input,
    ) -> std::result::Result<Self::Output, Self::Error> {
        self.execute(input, Self::Params::default())
    }
}

/// Marker trait for algorithms that can be parallelized
pub trait ParallelAlgorithm: Algorithm {
    /// Execute in parallel using available cores
    fn execute_parallel(
        &self,
        input: Self::Input,
        params: Self::Params,
    ) -> std::result::Result<Self::Output, Self::Error>;
}
