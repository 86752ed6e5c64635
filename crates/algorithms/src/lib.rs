//! # cuenca algorithms
//!
//! Raster hydrology on top of `cuenca-core`.
//!
//! The pipeline runs strictly downstream:
//!
//! ```text
//! DEM ─▶ condition ─▶ flow_direction ─▶ accumulate ─┬─▶ snap_outlet / catchment / flow_distance
//!                                                   └─▶ channel_mask ─▶ extract_network
//! ```
//!
//! Every stage is a pure function of its inputs; grids keep the DEM's
//! shape, transform and CRS, and nodata cells stay nodata throughout.

pub mod hydrology;
pub(crate) mod maybe_rayon;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::hydrology::{
        accumulate, catchment, channel_mask, condition, extract_network, flow_accumulation,
        flow_direction, flow_distance, snap_outlet, AccumulationEngine, AccumulationParams,
        CatchmentTracer, ChannelParams, ConditionParams, Conditioner, Flow, FlowDirectionGrid,
        FlowDirectionParams, FlowRouter, NetworkExtractor, SnapParams, StreamLink, StreamNetwork,
    };
    pub use cuenca_core::prelude::*;
}
