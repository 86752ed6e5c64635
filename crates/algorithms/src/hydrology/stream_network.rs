//! Stream network extraction
//!
//! Channel cells are selected by thresholding flow accumulation. The
//! channels are then cut into links: a link starts at a channel head (no
//! channel cell drains into it) or at a confluence (two or more do), and
//! follows the flow directions until the next confluence or the last
//! channel cell. A link that stops at a confluence includes it as its last
//! vertex, so the network stays connected when exported as polylines.

use std::collections::HashMap;

use cuenca_core::raster::Raster;
use cuenca_core::vector::{Feature, FeatureCollection};
use cuenca_core::{Algorithm, Error, Result, CRS};
use geo_types::{Coord, LineString};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::flow_direction::{Flow, FlowDirectionGrid};
use super::flow_graph::validate_acyclic;

/// Parameters for channel selection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelParams {
    /// Flow accumulation threshold (in cell counts, or weight units for
    /// weighted accumulation). Cells with accumulation >= this value are
    /// channel cells.
    /// Default: 1000.0
    pub threshold: f64,
}

impl Default for ChannelParams {
    fn default() -> Self {
        Self { threshold: 1000.0 }
    }
}

/// Select channel cells.
///
/// # Returns
/// Raster<u8> with 1 = channel cell, 0 = everything else (including nodata)
pub fn channel_mask(acc: &Raster<f64>, params: ChannelParams) -> Result<Raster<u8>> {
    let threshold = params.threshold;
    if threshold.is_nan() {
        return Err(Error::InvalidParameter {
            name: "threshold",
            value: threshold.to_string(),
            reason: "must be a number".to_string(),
        });
    }
    if threshold <= 1.0 {
        warn!(threshold, "threshold selects every valid cell as channel");
    }

    let mask = acc
        .data()
        .mapv(|v| u8::from(!acc.is_nodata(v) && v >= threshold));
    let channels = mask.iter().filter(|&&v| v == 1).count();
    debug!(threshold, channels, "channel cells selected");

    acc.derive(mask, Some(0))
}

/// A stretch of channel between heads, confluences and outlets
#[derive(Debug, Clone)]
pub struct StreamLink {
    /// Index of the link in its network
    pub id: usize,
    /// Cells from upstream to downstream, as (row, col)
    pub cells: Vec<(usize, usize)>,
    /// Cell centres in map coordinates. A single-cell link gets a second
    /// vertex half a step downstream, so every line has two points.
    pub line: LineString<f64>,
    /// Links ending at this link's first cell
    pub upstream: Vec<usize>,
    /// Link starting at this link's last cell, if it ends at a confluence
    pub downstream: Option<usize>,
}

impl StreamLink {
    /// First (most upstream) cell
    pub fn start(&self) -> (usize, usize) {
        self.cells[0]
    }

    /// Last (most downstream) cell
    pub fn end(&self) -> (usize, usize) {
        self.cells[self.cells.len() - 1]
    }

    /// Polyline length in map units
    pub fn length(&self) -> f64 {
        self.line.lines().map(|l| l.dx().hypot(l.dy())).sum()
    }

    pub fn is_head(&self) -> bool {
        self.upstream.is_empty()
    }

    pub fn is_outlet(&self) -> bool {
        self.downstream.is_none()
    }
}

/// Links with upstream/downstream adjacency
#[derive(Debug, Clone, Default)]
pub struct StreamNetwork {
    links: Vec<StreamLink>,
    crs: Option<CRS>,
}

impl StreamNetwork {
    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn links(&self) -> &[StreamLink] {
        &self.links
    }

    pub fn link(&self, id: usize) -> Option<&StreamLink> {
        self.links.get(id)
    }

    pub fn crs(&self) -> Option<&CRS> {
        self.crs.as_ref()
    }

    /// Links that do not flow into another link
    pub fn outlets(&self) -> impl Iterator<Item = &StreamLink> {
        self.links.iter().filter(|l| l.is_outlet())
    }

    /// Links starting at a channel head
    pub fn heads(&self) -> impl Iterator<Item = &StreamLink> {
        self.links.iter().filter(|l| l.is_head())
    }

    /// One line feature per link, with `link_id`, `downstream`, `n_cells`
    /// and `length` attributes.
    pub fn to_features(&self) -> FeatureCollection {
        let mut fc = FeatureCollection::new(self.crs.clone());
        for link in &self.links {
            let mut feature = Feature::new(link.line.clone()).with_id(link.id.to_string());
            feature.set_property("link_id", link.id as i64);
            feature.set_property("downstream", link.downstream.map(|d| d as i64));
            feature.set_property("n_cells", link.cells.len() as i64);
            feature.set_property("length", link.length());
            fc.push(feature);
        }
        fc
    }
}

/// Stream network extraction algorithm: accumulation threshold followed by
/// link tracing. Input is the direction grid and its accumulation.
#[derive(Debug, Clone, Default)]
pub struct NetworkExtractor;

impl Algorithm for NetworkExtractor {
    type Input = (FlowDirectionGrid, Raster<f64>);
    type Output = StreamNetwork;
    type Params = ChannelParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "Stream Network"
    }

    fn description(&self) -> &'static str {
        "Extract stream links from flow accumulation"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        let (fdir, acc) = input;
        fdir.ensure_same_shape(&acc)?;
        let mask = channel_mask(&acc, params)?;
        extract_network(&fdir, &mask)
    }
}

/// Trace the links of the channel cells marked 1 in `channel_mask`.
///
/// Link ids follow the row-major order of their first cells. A mask with
/// no channel cells gives an empty network.
///
/// # Errors
/// - `ShapeMismatch` when the mask does not match the grid
/// - `CycleDetected` when the directions contain a loop
pub fn extract_network(
    fdir: &FlowDirectionGrid,
    channel_mask: &Raster<u8>,
) -> Result<StreamNetwork> {
    fdir.ensure_same_shape(channel_mask)?;
    validate_acyclic(fdir)?;

    let (rows, cols) = fdir.shape();
    let is_channel = |row: usize, col: usize| {
        let v = unsafe { channel_mask.get_unchecked(row, col) };
        v == 1 && !fdir.is_nodata(row, col)
    };

    // Channel donors per channel cell
    let mut donors = Array2::<u8>::zeros((rows, cols));
    let mut n_channel = 0usize;
    for row in 0..rows {
        for col in 0..cols {
            if !is_channel(row, col) {
                continue;
            }
            n_channel += 1;
            if let Flow::Cell(r, c) = fdir.downstream(row, col) {
                if is_channel(r, c) {
                    donors[(r, c)] += 1;
                }
            }
        }
    }

    let mut starts = Vec::new();
    for row in 0..rows {
        for col in 0..cols {
            if is_channel(row, col) && donors[(row, col)] != 1 {
                starts.push((row, col));
            }
        }
    }
    let start_ids: HashMap<(usize, usize), usize> =
        starts.iter().enumerate().map(|(id, &cell)| (cell, id)).collect();

    let mut links = Vec::with_capacity(starts.len());
    for (id, &start) in starts.iter().enumerate() {
        let mut cells = vec![start];
        let mut current = start;
        let mut downstream = None;

        while let Flow::Cell(r, c) = fdir.downstream(current.0, current.1) {
            if !is_channel(r, c) {
                break;
            }
            cells.push((r, c));
            if donors[(r, c)] >= 2 {
                downstream = start_ids.get(&(r, c)).copied();
                break;
            }
            if cells.len() > n_channel {
                return Err(Error::CycleDetected { remaining: cells.len(), row: r, col: c });
            }
            current = (r, c);
        }

        let mut coords: Vec<Coord<f64>> = cells
            .iter()
            .map(|&(row, col)| {
                let (x, y) = fdir.cell_center(row, col);
                Coord { x, y }
            })
            .collect();
        if coords.len() == 1 {
            coords.push(exit_vertex(fdir, start));
        }
        let line = LineString::new(coords);

        links.push(StreamLink { id, cells, line, upstream: Vec::new(), downstream });
    }

    for id in 0..links.len() {
        if let Some(d) = links[id].downstream {
            links[d].upstream.push(id);
        }
    }

    let outlets = links.iter().filter(|l| l.is_outlet()).count();
    info!(links = links.len(), channel_cells = n_channel, outlets, "stream network extracted");

    Ok(StreamNetwork { links, crs: fdir.crs().cloned() })
}

/// Closing vertex for a single-cell link: half a step along the cell's
/// flow direction, or the centre again when the cell has none.
fn exit_vertex(fdir: &FlowDirectionGrid, (row, col): (usize, usize)) -> Coord<f64> {
    let (x, y) = fdir.cell_center(row, col);
    let Some(dir) = fdir.direction(row, col) else {
        return Coord { x, y };
    };
    let (dr, dc) = dir.offset();
    let gt = fdir.transform().to_gdal();
    let (dr, dc) = (dr as f64 * 0.5, dc as f64 * 0.5);
    Coord {
        x: x + dc * gt[1] + dr * gt[2],
        y: y + dc * gt[4] + dr * gt[5],
    }
}
