//! Global search used to hand the corridor its initial path.
//!
//! A* over `NavWorld` connections with the same cost model the corridor
//! uses, then the node list is cut into node-sequence and off-mesh-link
//! parts.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use navcorridor_core::glam::DVec3;
use navcorridor_core::graph::NearestConstraint;
use navcorridor_core::{CostModel, NavGraph, NavWorld, NodeId, NodeKind, PathPart, TraversalCost};
use rustc_hash::FxHashMap;
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_MAX_EXPANSIONS: u64 = 100_000;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlanError {
    #[error("no walkable node near start {0:?}")]
    NoStartNode(DVec3),
    #[error("no walkable node near goal {0:?}")]
    NoGoalNode(DVec3),
    #[error("goal unreachable after {expanded} expansions")]
    Unreachable { expanded: u64 },
    #[error("expansion limit {limit} reached")]
    ExpansionLimit { limit: u64 },
    #[error("off-mesh link node {0} is not paired with its other end")]
    BrokenLink(NodeId),
}

#[derive(Clone, Debug)]
pub struct Plan {
    pub nodes: Vec<NodeId>,
    pub parts: Vec<PathPart>,
    pub start: DVec3,
    pub goal: DVec3,
    pub cost: u64,
    pub expanded: u64,
}

#[derive(Clone, Copy, Debug)]
struct QueueNode {
    node: NodeId,
    f: u64,
    g: u64,
    seq: u64,
}

impl PartialEq for QueueNode {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}
impl Eq for QueueNode {}
impl PartialOrd for QueueNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for QueueNode {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; invert for min-f first, FIFO on ties.
        (other.f, other.g, other.seq, other.node).cmp(&(self.f, self.g, self.seq, self.node))
    }
}

pub struct Planner<'a> {
    world: &'a NavWorld,
    cost: &'a CostModel,
    max_expansions: u64,
}

impl<'a> Planner<'a> {
    pub fn new(world: &'a NavWorld, cost: &'a CostModel) -> Self {
        Self { world, cost, max_expansions: DEFAULT_MAX_EXPANSIONS }
    }

    pub fn with_max_expansions(mut self, max_expansions: u64) -> Self {
        self.max_expansions = max_expansions;
        self
    }

    fn heuristic(&self, node: NodeId, goal: NodeId) -> u64 {
        let d = self.world.position(node).distance(self.world.position(goal));
        (d * self.cost.cost_scale).floor() as u64
    }

    pub fn find_path(&self, start: DVec3, goal: DVec3) -> Result<Plan, PlanError> {
        let constraint = NearestConstraint::default();
        let (start_node, _) = self.world.nearest(start, &constraint).ok_or(PlanError::NoStartNode(start))?;
        let (goal_node, _) = self.world.nearest(goal, &constraint).ok_or(PlanError::NoGoalNode(goal))?;

        let mut open = BinaryHeap::new();
        let mut g_score: FxHashMap<NodeId, u64> = FxHashMap::default();
        let mut came_from: FxHashMap<NodeId, NodeId> = FxHashMap::default();
        let mut neighbours = Vec::new();
        let mut expanded = 0u64;
        let mut seq = 0u64;

        open.push(QueueNode { node: start_node, f: self.heuristic(start_node, goal_node), g: 0, seq });
        g_score.insert(start_node, 0);

        while let Some(qn) = open.pop() {
            if g_score.get(&qn.node).map(|&g| qn.g > g).unwrap_or(false) {
                continue;
            }
            expanded += 1;
            if expanded > self.max_expansions {
                return Err(PlanError::ExpansionLimit { limit: self.max_expansions });
            }
            if qn.node == goal_node {
                let nodes = reconstruct(&came_from, start_node, goal_node);
                let parts = split_parts(self.world, &nodes, start, goal)?;
                debug!(nodes = nodes.len(), parts = parts.len(), cost = qn.g, expanded, "plan_found");
                return Ok(Plan { nodes, parts, start, goal, cost: qn.g, expanded });
            }

            neighbours.clear();
            self.world.connections(qn.node, &mut neighbours);
            for &n in &neighbours {
                let Some(info) = self.world.node_info(n) else { continue };
                if !self.cost.can_traverse(&info) {
                    continue;
                }
                let tentative = qn.g + self.cost.cost(self.world, qn.node, n, &info) as u64;
                if g_score.get(&n).map(|&g| tentative < g).unwrap_or(true) {
                    g_score.insert(n, tentative);
                    came_from.insert(n, qn.node);
                    seq += 1;
                    open.push(QueueNode { node: n, f: tentative + self.heuristic(n, goal_node), g: tentative, seq });
                }
            }
        }
        Err(PlanError::Unreachable { expanded })
    }
}

fn reconstruct(came_from: &FxHashMap<NodeId, NodeId>, start: NodeId, goal: NodeId) -> Vec<NodeId> {
    let mut nodes = vec![goal];
    let mut cur = goal;
    while cur != start {
        match came_from.get(&cur) {
            Some(&prev) => {
                nodes.push(prev);
                cur = prev;
            }
            None => break,
        }
    }
    nodes.reverse();
    nodes
}

/// Cuts `nodes` into alternating node-sequence and off-mesh-link parts. Link
/// nodes must come in entry/exit pairs.
pub fn split_parts<G: NavGraph + ?Sized>(graph: &G, nodes: &[NodeId], start: DVec3, goal: DVec3) -> Result<Vec<PathPart>, PlanError> {
    let is_link = |n: NodeId| graph.node_info(n).map(|i| i.kind == NodeKind::Link).unwrap_or(false);
    let mut parts = Vec::new();
    let mut run_start = 0usize;
    let mut run_point = start;
    let mut i = 0usize;
    while i < nodes.len() {
        if !is_link(nodes[i]) {
            i += 1;
            continue;
        }
        if i + 1 >= nodes.len() || !is_link(nodes[i + 1]) || i == 0 {
            return Err(PlanError::BrokenLink(nodes[i]));
        }
        let (entry, exit) = (graph.position(nodes[i]), graph.position(nodes[i + 1]));
        parts.push(PathPart::sequence(run_start as isize, i as isize - 1, run_point, entry));
        parts.push(PathPart::link(i as isize, entry, exit));
        run_start = i + 2;
        run_point = exit;
        i += 2;
    }
    if run_start >= nodes.len() {
        return Err(PlanError::BrokenLink(nodes[nodes.len() - 1]));
    }
    parts.push(PathPart::sequence(run_start as isize, nodes.len() as isize - 1, run_point, goal));
    Ok(parts)
}
