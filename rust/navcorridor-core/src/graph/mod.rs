//! Navigation graph seen from the corridor engine.
//!
//! The corridor only ever stores [`NodeId`]s. Everything it needs to know about
//! a node is read through [`NavGraph`], and [`NavGraph::node_info`] returning
//! `None` is how a destroyed node shows up.

pub mod portal;
pub mod world;

use glam::DVec3;
use serde::{Deserialize, Serialize};

pub use world::NavWorld;

pub type NodeId = u32;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    Triangle,
    GridCell,
    /// Endpoint of an off-mesh link.
    Link,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NodeInfo {
    pub kind: NodeKind,
    /// Index of the graph the node belongs to.
    pub graph: u32,
    pub walkable: bool,
    /// Connected-component id.
    pub area: u32,
    /// Cost class.
    pub tag: u8,
    /// Bumped whenever the node's geometry or connections change.
    pub epoch: u32,
}

/// Shared edge between two adjacent nodes, oriented as seen when walking from
/// the first node into the second.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Portal {
    pub left: DVec3,
    pub right: DVec3,
}

impl Portal {
    pub fn is_degenerate(&self) -> bool {
        crate::geometry::same_xz(self.left, self.right)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LinecastResult {
    /// Node and point where the line left the walkable surface, if it did.
    pub hit: Option<(NodeId, DVec3)>,
    /// Last node the line reached.
    pub end_node: NodeId,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NearestConstraint {
    pub graph: Option<u32>,
    pub area: Option<u32>,
    pub walkable_only: bool,
    pub max_distance: f64,
}

impl Default for NearestConstraint {
    fn default() -> Self {
        Self { graph: None, area: None, walkable_only: true, max_distance: f64::INFINITY }
    }
}

impl NearestConstraint {
    pub fn accepts(&self, info: &NodeInfo) -> bool {
        if info.kind == NodeKind::Link {
            return false;
        }
        if self.walkable_only && !info.walkable {
            return false;
        }
        if let Some(g) = self.graph {
            if info.graph != g {
                return false;
            }
        }
        if let Some(a) = self.area {
            if info.area != a {
                return false;
            }
        }
        true
    }
}

/// Read-only view of the navigation graph.
pub trait NavGraph {
    /// `None` when the node no longer exists.
    fn node_info(&self, node: NodeId) -> Option<NodeInfo>;

    /// Appends the node's outgoing connections to `out`.
    fn connections(&self, node: NodeId, out: &mut Vec<NodeId>);

    fn portal(&self, from: NodeId, to: NodeId) -> Option<Portal>;

    fn contains_point(&self, node: NodeId, point: DVec3) -> bool;

    fn closest_point_on_node(&self, node: NodeId, point: DVec3) -> DVec3;

    /// Representative position used for distance-based costs.
    fn position(&self, node: NodeId) -> DVec3;

    /// Corner vertices of the node (three for triangles, four for grid cells).
    fn vertices(&self, node: NodeId, out: &mut Vec<DVec3>);

    /// Axis used to flatten portals of this node's graph, if it has one.
    fn projection_axis(&self, _node: NodeId) -> Option<DVec3> {
        None
    }

    /// Straight line visibility query. Traversed nodes are appended to `trace`.
    /// `None` when the node's graph does not support linecasts.
    fn linecast(&self, start_node: NodeId, from: DVec3, to: DVec3, trace: &mut Vec<NodeId>) -> Option<LinecastResult>;

    fn nearest(&self, point: DVec3, constraint: &NearestConstraint) -> Option<(NodeId, DVec3)>;

    fn is_destroyed(&self, node: NodeId) -> bool {
        self.node_info(node).is_none()
    }

    fn is_walkable(&self, node: NodeId) -> bool {
        self.node_info(node).map(|i| i.walkable).unwrap_or(false)
    }
}
