pub mod cost;
pub mod errors;
pub mod funnel;
pub mod geometry;
pub mod graph;
pub mod options;
pub mod ring_buffer;
pub mod tracer;

pub use cost::{CostModel, TraversalCost};
pub use errors::{PathError, SettingsError};
pub use funnel::{Corner, FunnelState, Side};
pub use glam;
pub use graph::world::{GraphHandle, NavWorld};
pub use graph::{NavGraph, NodeId, NodeInfo, NodeKind, Portal};
pub use options::{RepairQuality, TracerSettings};
pub use ring_buffer::RingBuffer;
pub use tracer::{PartKind, PathPart, PathTracer, RepairStatus};

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
