use serde::{Deserialize, Serialize};

use crate::graph::{NavGraph, NodeId, NodeInfo};

pub const DEFAULT_COST_SCALE: f64 = 1000.0;
pub const TAG_COUNT: usize = 32;

/// Decides which nodes an agent may enter and what each step costs.
pub trait TraversalCost {
    fn can_traverse(&self, info: &NodeInfo) -> bool {
        info.walkable
    }

    /// Cost of stepping from `from` into `to`.
    fn cost<G: NavGraph + ?Sized>(&self, graph: &G, from: NodeId, to: NodeId, to_info: &NodeInfo) -> u32;

    /// Accumulated cost of walking `nodes` in order. Destroyed nodes cost
    /// `u32::MAX` so a run through them never looks cheaper.
    fn path_cost<G: NavGraph + ?Sized>(&self, graph: &G, nodes: &[NodeId]) -> u64 {
        nodes
            .windows(2)
            .map(|w| match graph.node_info(w[1]) {
                Some(info) => self.cost(graph, w[0], w[1], &info) as u64,
                None => u32::MAX as u64,
            })
            .sum()
    }
}

/// Distance between node positions, scaled to integers, plus a flat penalty
/// per tag of the entered node.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CostModel {
    pub cost_scale: f64,
    /// Indexed by tag; missing entries cost nothing extra.
    pub tag_penalties: Vec<u32>,
    /// Bit `t` set means nodes tagged `t` may be entered.
    pub traversable_tags: u32,
}

impl Default for CostModel {
    fn default() -> Self {
        Self { cost_scale: DEFAULT_COST_SCALE, tag_penalties: Vec::new(), traversable_tags: u32::MAX }
    }
}

impl CostModel {
    pub fn with_tag_penalty(mut self, tag: u8, penalty: u32) -> Self {
        let idx = tag as usize % TAG_COUNT;
        if self.tag_penalties.len() <= idx {
            self.tag_penalties.resize(idx + 1, 0);
        }
        self.tag_penalties[idx] = penalty;
        self
    }

    pub fn tag_penalty(&self, tag: u8) -> u32 {
        self.tag_penalties.get(tag as usize % TAG_COUNT).copied().unwrap_or(0)
    }

    pub fn tag_traversable(&self, tag: u8) -> bool {
        self.traversable_tags & (1u32 << (tag as u32 % TAG_COUNT as u32)) != 0
    }
}

impl TraversalCost for CostModel {
    fn can_traverse(&self, info: &NodeInfo) -> bool {
        info.walkable && self.tag_traversable(info.tag)
    }

    fn cost<G: NavGraph + ?Sized>(&self, graph: &G, from: NodeId, to: NodeId, to_info: &NodeInfo) -> u32 {
        let d = graph.position(from).distance(graph.position(to));
        let base = (d * self.cost_scale).round().clamp(0.0, u32::MAX as f64) as u32;
        base.saturating_add(self.tag_penalty(to_info.tag))
    }
}
