//! Hydrological analysis of digital elevation models
//!
//! - Conditioning: pit filling, Priority-Flood depression filling (Barnes
//!   2014) and flat resolution (Barnes, Lehman & Mulla 2014)
//! - D8 flow direction with a configurable code scheme
//! - Flow accumulation by topological ordering of the flow graph
//! - Outlet snapping, catchment masks and flow distance to an outlet
//! - Channel masks, stream link extraction and HAND

mod condition;
mod fill_pits;
mod flats;
mod flow_accumulation;
mod flow_direction;
mod flow_graph;
mod hand;
mod outlet;
mod priority_flood;
mod stream_network;
mod watershed;

pub use condition::{condition, ConditionParams, Conditioner};
pub use fill_pits::{detect_pits, fill_pits, FillPits, PitFillParams};
pub use flats::{detect_flats, resolve_flats, FlatParams};
pub use flow_accumulation::{
    accumulate, flow_accumulation, AccumulationEngine, AccumulationParams, Combine,
    ProcessingMode,
};
pub use flow_direction::{flow_direction, Flow, FlowDirectionGrid, FlowDirectionParams, FlowRouter};
pub use flow_graph::{validate_acyclic, FlowGraph};
pub use hand::hand;
pub use outlet::{snap_outlet, snap_to_threshold, SnapParams};
pub use priority_flood::{detect_depressions, fill_depressions, priority_flood, PriorityFloodParams};
pub use stream_network::{
    channel_mask, extract_network, ChannelParams, NetworkExtractor, StreamLink, StreamNetwork,
};
pub use watershed::{catchment, flow_distance, label_basins, CatchmentParams, CatchmentTracer};
