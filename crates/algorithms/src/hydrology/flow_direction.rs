//! D8 flow direction
//!
//! Each cell drains to the neighbour with the steepest descent
//! `(z - z_n) / distance`. Ties go to the first candidate in
//! [`Direction::PRIORITY`] (cardinal before diagonal, clockwise from
//! north). Boundary cells without a lower neighbour drain out of the grid.
//!
//! Directions are stored internally as [`Direction`]s; a
//! [`DirectionScheme`] translates them to and from the integer codes of
//! whatever toolchain the grid is exchanged with.

use cuenca_core::raster::{Direction, DirectionScheme, GeoTransform, Raster};
use cuenca_core::{Algorithm, Error, ParallelAlgorithm, Result, CRS};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::maybe_rayon::*;

/// Internal code for a valid cell with no outflow
const NO_FLOW: u8 = 8;
/// Internal code for nodata
const NODATA: u8 = u8::MAX;

/// Where the water leaving a cell goes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Into another valid cell of the grid
    Cell(usize, usize),
    /// Off the grid edge or into a nodata cell
    Exit,
    /// Nowhere: a valid cell without a direction
    Sink,
    /// The cell itself is nodata
    NoData,
}

/// D8 flow directions over a grid.
///
/// Shares shape, transform and CRS with the DEM it was routed on.
#[derive(Debug, Clone)]
pub struct FlowDirectionGrid {
    dirs: Raster<u8>,
    scheme: DirectionScheme,
}

impl FlowDirectionGrid {
    pub(crate) fn from_raw(dirs: Raster<u8>, scheme: DirectionScheme) -> Self {
        Self { dirs, scheme }
    }

    /// Decode a grid of direction codes.
    ///
    /// Cells equal to the raster's nodata value are nodata. The scheme's
    /// sentinel marks a sink unless it is also the raster's nodata value,
    /// in which case it means nodata. Any other value outside the scheme
    /// is an `InvalidDirectionScheme` error.
    pub fn from_codes(codes: &Raster<i32>, scheme: DirectionScheme) -> Result<Self> {
        let (rows, cols) = codes.shape();
        let mut dirs = Array2::<u8>::from_elem((rows, cols), NODATA);
        for row in 0..rows {
            for col in 0..cols {
                let code = unsafe { codes.get_unchecked(row, col) };
                if codes.is_nodata(code) {
                    continue;
                }
                dirs[(row, col)] = match scheme.decode(code)? {
                    Some(d) => d.index() as u8,
                    None => NO_FLOW,
                };
            }
        }
        Ok(Self::from_raw(codes.derive(dirs, Some(NODATA))?, scheme))
    }

    /// Encode with the grid's scheme. Nodata and sinks both carry the
    /// sentinel, which is also set as the raster's nodata value.
    pub fn to_codes(&self) -> Raster<i32> {
        let none = self.scheme.none();
        let mut out = self.dirs.with_same_meta::<i32>(self.rows(), self.cols());
        out.set_nodata(Some(none));
        for ((row, col), v) in out.data_mut().indexed_iter_mut() {
            *v = self.scheme.encode(self.direction(row, col));
        }
        out
    }

    /// Same directions, encoded with another scheme
    pub fn with_scheme(mut self, scheme: DirectionScheme) -> Self {
        self.scheme = scheme;
        self
    }

    pub fn scheme(&self) -> &DirectionScheme {
        &self.scheme
    }

    pub fn shape(&self) -> (usize, usize) {
        self.dirs.shape()
    }

    pub fn rows(&self) -> usize {
        self.dirs.rows()
    }

    pub fn cols(&self) -> usize {
        self.dirs.cols()
    }

    pub fn len(&self) -> usize {
        self.dirs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dirs.is_empty()
    }

    pub fn transform(&self) -> &GeoTransform {
        self.dirs.transform()
    }

    pub fn crs(&self) -> Option<&CRS> {
        self.dirs.crs()
    }

    /// A zero-filled raster carrying this grid's shape and georeferencing
    pub fn template<U: cuenca_core::RasterElement>(&self) -> Raster<U> {
        self.dirs.with_same_meta(self.rows(), self.cols())
    }

    /// Wrap an array with this grid's georeferencing
    pub fn derive<U: cuenca_core::RasterElement>(
        &self,
        data: Array2<U>,
        nodata: Option<U>,
    ) -> Result<Raster<U>> {
        self.dirs.derive(data, nodata)
    }

    /// Fail with `ShapeMismatch` unless `other` has the same dimensions
    pub fn ensure_same_shape<U: cuenca_core::RasterElement>(
        &self,
        other: &Raster<U>,
    ) -> Result<()> {
        self.dirs.ensure_same_shape(other)
    }

    #[inline]
    fn raw(&self, row: usize, col: usize) -> u8 {
        debug_assert!(row < self.rows() && col < self.cols());
        unsafe { self.dirs.get_unchecked(row, col) }
    }

    /// Flow direction of (row, col); `None` for sinks, nodata and
    /// out-of-bounds indices.
    #[inline]
    pub fn direction(&self, row: usize, col: usize) -> Option<Direction> {
        if row >= self.rows() || col >= self.cols() {
            return None;
        }
        Direction::from_index(self.raw(row, col) as usize)
    }

    #[inline]
    pub fn is_nodata(&self, row: usize, col: usize) -> bool {
        row >= self.rows() || col >= self.cols() || self.raw(row, col) == NODATA
    }

    /// Where water leaving (row, col) goes
    pub fn downstream(&self, row: usize, col: usize) -> Flow {
        if self.is_nodata(row, col) {
            return Flow::NoData;
        }
        let Some(dir) = self.direction(row, col) else {
            return Flow::Sink;
        };
        match dir.step(row, col, self.rows(), self.cols()) {
            Some((nr, nc)) if !self.is_nodata(nr, nc) => Flow::Cell(nr, nc),
            _ => Flow::Exit,
        }
    }

    /// Valid neighbours that drain into (row, col)
    pub fn upstream(&self, row: usize, col: usize) -> impl Iterator<Item = (usize, usize)> + '_ {
        let (rows, cols) = self.shape();
        Direction::ALL.into_iter().filter_map(move |d| {
            let (nr, nc) = d.step(row, col, rows, cols)?;
            (self.direction(nr, nc) == Some(d.opposite())).then_some((nr, nc))
        })
    }

    /// Ground length of one step in `dir`
    #[inline]
    pub fn step_distance(&self, dir: Direction) -> f64 {
        self.dirs.step_distance(dir)
    }

    /// Number of non-nodata cells
    pub fn valid_count(&self) -> usize {
        self.dirs.data().iter().filter(|&&v| v != NODATA).count()
    }

    /// Map coordinates of the centre of (row, col)
    pub fn cell_center(&self, row: usize, col: usize) -> (f64, f64) {
        self.dirs.pixel_to_geo(col, row)
    }
}

/// Parameters for D8 routing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowDirectionParams {
    /// Code scheme attached to the output grid
    pub scheme: DirectionScheme,
    /// Let boundary cells with no lower neighbour drain off the grid
    /// (or into adjacent nodata). When off they become sinks.
    pub edge_outflow: bool,
}

impl Default for FlowDirectionParams {
    fn default() -> Self {
        Self {
            scheme: DirectionScheme::default(),
            edge_outflow: true,
        }
    }
}

/// D8 flow routing algorithm
#[derive(Debug, Clone, Default)]
pub struct FlowRouter;

impl Algorithm for FlowRouter {
    type Input = Raster<f64>;
    type Output = FlowDirectionGrid;
    type Params = FlowDirectionParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "Flow Direction (D8)"
    }

    fn description(&self) -> &'static str {
        "Assign each cell its steepest-descent D8 neighbour"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        flow_direction(&input, params)
    }
}

impl ParallelAlgorithm for FlowRouter {
    fn execute_parallel(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        flow_direction(&input, params)
    }
}

/// Steepest-descent direction for one cell, as an internal code.
fn route_cell(
    dem: &Raster<f64>,
    dist: &[f64; 8],
    edge_outflow: bool,
    row: usize,
    col: usize,
) -> u8 {
    let z = unsafe { dem.get_unchecked(row, col) };
    if dem.is_nodata(z) {
        return NODATA;
    }

    let mut best: Option<Direction> = None;
    let mut max_slope = 0.0_f64;
    for (nr, nc, dir) in dem.neighbors(row, col) {
        let slope = (z - unsafe { dem.get_unchecked(nr, nc) }) / dist[dir.index()];
        if slope > max_slope {
            max_slope = slope;
            best = Some(dir);
        }
    }

    if best.is_none() && edge_outflow && dem.is_boundary(row, col) {
        let (rows, cols) = dem.shape();
        best = Direction::PRIORITY.into_iter().find(|d| match d.step(row, col, rows, cols) {
            None => true,
            Some((nr, nc)) => dem.is_nodata(unsafe { dem.get_unchecked(nr, nc) }),
        });
    }

    best.map_or(NO_FLOW, |d| d.index() as u8)
}

/// Compute D8 flow directions from a (conditioned) DEM.
///
/// Rows are routed in parallel; the DEM is only read. Nodata cells stay
/// nodata, and a valid cell without a lower neighbour that cannot drain
/// off the grid is a sink.
pub fn flow_direction(dem: &Raster<f64>, params: FlowDirectionParams) -> Result<FlowDirectionGrid> {
    let (rows, cols) = dem.shape();
    debug!(rows, cols, "routing D8 flow directions");
    let dist: [f64; 8] = Direction::ALL.map(|d| dem.step_distance(d));
    if dist.iter().any(|&d| !(d > 0.0)) {
        return Err(Error::InvalidParameter {
            name: "transform",
            value: format!("{:?}", dem.transform()),
            reason: "cell size must be positive".to_string(),
        });
    }

    let codes: Vec<u8> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            (0..cols)
                .map(|col| route_cell(dem, &dist, params.edge_outflow, row, col))
                .collect::<Vec<u8>>()
        })
        .collect();

    let sinks = codes.iter().filter(|&&c| c == NO_FLOW).count();
    info!(sinks, "flow directions assigned");

    let data =
        Array2::from_shape_vec((rows, cols), codes).map_err(|e| Error::Other(e.to_string()))?;
    Ok(FlowDirectionGrid::from_raw(dem.derive(data, Some(NODATA))?, params.scheme))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cuenca_core::GeoTransform;

    fn plane(rows: usize, cols: usize, f: impl Fn(usize, usize) -> f64) -> Raster<f64> {
        let mut dem = Raster::new(rows, cols);
        dem.set_transform(GeoTransform::new(0.0, rows as f64, 1.0, -1.0));
        for row in 0..rows {
            for col in 0..cols {
                dem.set(row, col, f(row, col)).unwrap();
            }
        }
        dem
    }

    #[test]
    fn test_flow_direction_slope_east() {
        let dem = plane(5, 5, |_, col| (5 - col) as f64 * 10.0);
        let fdir = flow_direction(&dem, FlowDirectionParams::default()).unwrap();
        assert_eq!(fdir.direction(2, 2), Some(Direction::E));
        assert_eq!(fdir.to_codes().get(2, 2).unwrap(), 1);
    }

    #[test]
    fn test_flow_direction_slope_south() {
        let dem = plane(5, 5, |row, _| (5 - row) as f64 * 10.0);
        let fdir = flow_direction(&dem, FlowDirectionParams::default()).unwrap();
        assert_eq!(fdir.direction(2, 2), Some(Direction::S));
        assert_eq!(fdir.downstream(2, 2), Flow::Cell(3, 2));
        assert_eq!(fdir.downstream(4, 2), Flow::Exit);
    }

    #[test]
    fn test_flow_direction_diagonal() {
        let dem = plane(5, 5, |row, col| (10 - row - col) as f64 * 10.0);
        let fdir = flow_direction(&dem, FlowDirectionParams::default()).unwrap();
        assert_eq!(fdir.direction(2, 2), Some(Direction::SE));
    }

    #[test]
    fn test_interior_pit_is_sink() {
        let mut dem = plane(5, 5, |_, _| 10.0);
        dem.set(2, 2, 1.0).unwrap();
        let fdir = flow_direction(&dem, FlowDirectionParams::default()).unwrap();
        assert_eq!(fdir.direction(2, 2), None);
        assert_eq!(fdir.downstream(2, 2), Flow::Sink);
        assert_eq!(fdir.to_codes().get(2, 2).unwrap(), 0);
    }

    #[test]
    fn test_ties_prefer_cardinal_clockwise_from_north() {
        // Center higher than 8 equal neighbours: N wins the tie
        let mut dem = plane(3, 3, |_, _| 1.0);
        dem.set(1, 1, 2.0).unwrap();
        let fdir = flow_direction(&dem, FlowDirectionParams::default()).unwrap();
        assert_eq!(fdir.direction(1, 1), Some(Direction::N));

        // Only E and W lower by the same amount: E comes before W
        let mut dem = plane(3, 3, |_, _| 5.0);
        dem.set(1, 0, 4.0).unwrap();
        dem.set(1, 2, 4.0).unwrap();
        let fdir = flow_direction(&dem, FlowDirectionParams::default()).unwrap();
        assert_eq!(fdir.direction(1, 1), Some(Direction::E));
    }

    #[test]
    fn test_flat_edge_drains_off_grid() {
        let dem = plane(3, 3, |_, _| 1.0);
        let fdir = flow_direction(&dem, FlowDirectionParams::default()).unwrap();
        assert_eq!(fdir.direction(0, 1), Some(Direction::N));
        assert_eq!(fdir.direction(1, 2), Some(Direction::E));
        assert_eq!(fdir.direction(2, 0), Some(Direction::S));
        assert_eq!(fdir.downstream(0, 1), Flow::Exit);
        // Interior of a flat has no direction
        assert_eq!(fdir.direction(1, 1), None);

        let closed = flow_direction(
            &dem,
            FlowDirectionParams { edge_outflow: false, ..Default::default() },
        )
        .unwrap();
        assert_eq!(closed.downstream(0, 1), Flow::Sink);
    }

    #[test]
    fn test_nodata_propagates_and_acts_as_exit() {
        let mut dem = plane(4, 4, |_, _| 5.0);
        dem.set_nodata(Some(-9999.0));
        dem.set(1, 1, -9999.0).unwrap();

        let fdir = flow_direction(&dem, FlowDirectionParams::default()).unwrap();
        assert!(fdir.is_nodata(1, 1));
        assert_eq!(fdir.downstream(1, 1), Flow::NoData);
        // (2,2) is flat but touches the hole, so it drains into it
        assert_eq!(fdir.direction(2, 2), Some(Direction::NW));
        assert_eq!(fdir.downstream(2, 2), Flow::Exit);
    }

    #[test]
    fn test_codes_roundtrip_through_another_scheme() {
        let dem = plane(6, 6, |row, col| (row * 3 + (col % 4)) as f64);
        let fdir = flow_direction(&dem, FlowDirectionParams::default()).unwrap();

        let taudem = fdir.clone().with_scheme(DirectionScheme::taudem()).to_codes();
        let back = FlowDirectionGrid::from_codes(&taudem, DirectionScheme::taudem()).unwrap();
        for row in 0..6 {
            for col in 0..6 {
                assert_eq!(back.direction(row, col), fdir.direction(row, col));
            }
        }
    }

    #[test]
    fn test_from_codes_rejects_unknown_code() {
        let codes = Raster::<i32>::filled(2, 2, 3);
        assert!(matches!(
            FlowDirectionGrid::from_codes(&codes, DirectionScheme::esri()),
            Err(Error::InvalidDirectionScheme(_))
        ));
    }

    #[test]
    fn test_upstream_neighbours() {
        let dem = plane(3, 3, |row, _| (3 - row) as f64);
        let fdir = flow_direction(&dem, FlowDirectionParams::default()).unwrap();
        let mut donors: Vec<_> = fdir.upstream(1, 1).collect();
        donors.sort();
        assert_eq!(donors, vec![(0, 1)]);
    }

    #[test]
    fn test_georeferencing_carried() {
        let mut dem = plane(3, 4, |_, col| col as f64);
        dem.set_crs(Some(CRS::from_epsg(32633)));
        let fdir = FlowRouter.execute_default(dem.clone()).unwrap();
        assert_eq!(fdir.shape(), (3, 4));
        assert_eq!(fdir.transform(), dem.transform());
        assert_eq!(fdir.crs(), dem.crs());
    }
}
