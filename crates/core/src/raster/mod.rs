//! Raster data structures and operations

mod direction;
mod element;
mod geotransform;
mod grid;
mod neighborhood;

pub use direction::{Direction, DirectionScheme};
pub use element::RasterElement;
pub use geotransform::GeoTransform;
pub use grid::{Raster, RasterStatistics};
pub use neighborhood::Neighbors;
