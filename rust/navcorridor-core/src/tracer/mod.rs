//! Path corridor maintenance.
//!
//! A [`PathTracer`] owns the node corridor handed over by a global search and
//! keeps it usable while the agent moves and the graph changes underneath
//! it. The corridor never dereferences a node it has not revalidated: every
//! stored node carries a hash of its identity, walkability and structural
//! epoch taken at insertion time, and a node whose hash no longer matches is
//! treated as destroyed.
//!
//! Only the first part has funnel portals. Later parts are plain node runs
//! until [`PathTracer::pop_parts`] promotes them.

mod repair;
mod simplify;

use std::hash::{Hash, Hasher};

use glam::DVec3;
use rustc_hash::FxHasher;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cost::{CostModel, TraversalCost};
use crate::errors::PathError;
use crate::funnel::{Corner, FunnelState};
use crate::geometry::EPS;
use crate::graph::{NavGraph, NodeId, NodeInfo, Portal};
use crate::options::{RepairQuality, TracerSettings};
use crate::ring_buffer::RingBuffer;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartKind {
    NodeSequence,
    OffMeshLink,
}

/// A maximal run of same-graph nodes, or a two-node off-mesh link.
/// Indices are absolute and inclusive.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PathPart {
    pub kind: PartKind,
    pub start_index: isize,
    pub end_index: isize,
    pub start_point: DVec3,
    pub end_point: DVec3,
}

impl PathPart {
    pub fn sequence(start_index: isize, end_index: isize, start_point: DVec3, end_point: DVec3) -> Self {
        Self { kind: PartKind::NodeSequence, start_index, end_index, start_point, end_point }
    }

    pub fn link(start_index: isize, start_point: DVec3, end_point: DVec3) -> Self {
        Self { kind: PartKind::OffMeshLink, start_index, end_index: start_index + 1, start_point, end_point }
    }

    pub fn node_count(&self) -> usize {
        (self.end_index - self.start_index + 1).max(0) as usize
    }
}

/// Outcome of the last start or end update.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepairStatus {
    /// The point lies inside the boundary node.
    #[default]
    Repaired,
    /// The point was clamped to the closest node the bounded search reached.
    PartiallyRepaired,
    /// No valid node covers the point; the corridor needs a new path.
    Stale,
}

#[derive(Clone, Debug, Default)]
struct Scratch {
    corners: Vec<Corner>,
    chain: Vec<NodeId>,
    expanded: Vec<NodeId>,
    fan: Vec<NodeId>,
    connections: Vec<NodeId>,
    vertices: Vec<DVec3>,
    slots: Vec<repair::Slot>,
    lefts: Vec<DVec3>,
    rights: Vec<DVec3>,
    hashes: Vec<u64>,
}

pub(crate) fn node_hash(node: NodeId, info: Option<&NodeInfo>) -> u64 {
    let mut h = FxHasher::default();
    node.hash(&mut h);
    match info {
        Some(info) => {
            info.walkable.hash(&mut h);
            info.epoch.hash(&mut h);
        }
        None => u64::MAX.hash(&mut h),
    }
    h.finish()
}

#[track_caller]
fn portal_between<G: NavGraph + ?Sized>(graph: &G, from: NodeId, to: NodeId) -> Portal {
    match graph.portal(from, to) {
        Some(p) => p,
        None => panic!("path nodes {from} and {to} are not adjacent"),
    }
}

fn validate_parts(parts: &[PathPart], node_count: usize) -> Result<(), PathError> {
    if node_count == 0 {
        return Err(PathError::EmptyPath);
    }
    let (Some(first), Some(last)) = (parts.first(), parts.last()) else {
        return Err(PathError::EmptyParts);
    };
    if first.kind != PartKind::NodeSequence || last.kind != PartKind::NodeSequence {
        return Err(PathError::BoundaryPartIsLink);
    }
    let mut expected = 0isize;
    for (i, part) in parts.iter().enumerate() {
        if part.start_index != expected {
            return Err(PathError::NonContiguous { part: i, expected, found: part.start_index });
        }
        if part.end_index < part.start_index || part.end_index >= node_count as isize {
            return Err(PathError::PartOutOfRange {
                part: i,
                start: part.start_index,
                end: part.end_index,
                len: node_count,
            });
        }
        if part.kind == PartKind::OffMeshLink && part.node_count() != 2 {
            return Err(PathError::LinkPartBounds { part: i });
        }
        if let Some(next) = parts.get(i + 1) {
            if next.kind == part.kind {
                return Err(PathError::NotAlternating { part: i, next: i + 1 });
            }
        }
        expected = part.end_index + 1;
    }
    if expected != node_count as isize {
        let part = parts.len() - 1;
        return Err(PathError::PartOutOfRange {
            part,
            start: parts[part].start_index,
            end: parts[part].end_index,
            len: node_count,
        });
    }
    Ok(())
}

pub struct PathTracer<T: TraversalCost = CostModel> {
    cost: T,
    settings: TracerSettings,
    parts: Vec<PathPart>,
    nodes: RingBuffer<NodeId>,
    hashes: RingBuffer<u64>,
    funnel: FunnelState,
    unclamped_start: DVec3,
    unclamped_end: DVec3,
    start_distance: f64,
    end_distance: f64,
    start_up_to_date: bool,
    end_up_to_date: bool,
    first_part_has_invalid_nodes: bool,
    start_status: RepairStatus,
    end_status: RepairStatus,
    version: u64,
    simplify_cursor: u32,
    scratch: Scratch,
}

impl<T: TraversalCost + Default> Default for PathTracer<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: TraversalCost> PathTracer<T> {
    pub fn new(cost: T) -> Self {
        Self {
            cost,
            settings: TracerSettings::default(),
            parts: Vec::new(),
            nodes: RingBuffer::with_capacity(32),
            hashes: RingBuffer::with_capacity(32),
            funnel: FunnelState::new(),
            unclamped_start: DVec3::ZERO,
            unclamped_end: DVec3::ZERO,
            start_distance: 0.0,
            end_distance: 0.0,
            start_up_to_date: true,
            end_up_to_date: true,
            first_part_has_invalid_nodes: false,
            start_status: RepairStatus::Repaired,
            end_status: RepairStatus::Repaired,
            version: 0,
            simplify_cursor: 0,
            scratch: Scratch::default(),
        }
    }

    pub fn cost(&self) -> &T {
        &self.cost
    }

    pub fn settings(&self) -> &TracerSettings {
        &self.settings
    }

    /// Incremented on every observable change of the corridor.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn part_count(&self) -> usize {
        self.parts.len()
    }

    #[track_caller]
    pub fn get_part_type(&self, index: usize) -> PartKind {
        self.parts[index].kind
    }

    pub fn part(&self, index: usize) -> Option<&PathPart> {
        self.parts.get(index)
    }

    pub fn is_stale(&self) -> bool {
        !self.start_up_to_date || !self.end_up_to_date || self.first_part_has_invalid_nodes
    }

    pub fn start_up_to_date(&self) -> bool {
        self.start_up_to_date
    }

    pub fn end_up_to_date(&self) -> bool {
        self.end_up_to_date
    }

    pub fn first_part_has_invalid_nodes(&self) -> bool {
        self.first_part_has_invalid_nodes
    }

    pub fn start_status(&self) -> RepairStatus {
        self.start_status
    }

    pub fn end_status(&self) -> RepairStatus {
        self.end_status
    }

    pub fn start_point(&self) -> DVec3 {
        self.parts.first().map(|p| p.start_point).unwrap_or(self.unclamped_start)
    }

    pub fn end_point(&self) -> DVec3 {
        self.parts.last().map(|p| p.end_point).unwrap_or(self.unclamped_end)
    }

    pub fn portal_count(&self) -> usize {
        self.funnel.len()
    }

    pub fn funnel(&self) -> &FunnelState {
        &self.funnel
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.iter()
    }

    pub fn first_part_nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        let (start, end) = self.parts.first().map(|p| (p.start_index, p.end_index + 1)).unwrap_or((0, 0));
        (start..end).map(move |a| self.nodes.get_absolute(a))
    }

    pub fn clear(&mut self) {
        self.parts.clear();
        self.nodes.reset_to(0);
        self.hashes.reset_to(0);
        self.funnel.clear();
        self.start_up_to_date = true;
        self.end_up_to_date = true;
        self.first_part_has_invalid_nodes = false;
        self.start_status = RepairStatus::Repaired;
        self.end_status = RepairStatus::Repaired;
        self.version += 1;
    }

    /// Replaces the corridor. Part indices are relative to `nodes`.
    pub fn set_path<G: NavGraph + ?Sized>(
        &mut self,
        graph: &G,
        parts: &[PathPart],
        nodes: &[NodeId],
        start: DVec3,
        end: DVec3,
        settings: &TracerSettings,
    ) -> Result<(), PathError> {
        validate_parts(parts, nodes.len())?;
        self.settings = settings.clone();
        self.funnel.set_iteration_factor(settings.max_funnel_iterations_factor);

        self.nodes.reset_to(0);
        self.hashes.reset_to(0);
        self.parts.clear();
        let mut expanded = std::mem::take(&mut self.scratch.expanded);
        for part in parts {
            let run = &nodes[part.start_index as usize..=part.end_index as usize];
            let start_index = self.nodes.absolute_end();
            match part.kind {
                PartKind::NodeSequence => {
                    simplify::expand_diagonals(graph, &self.cost, run, &mut expanded);
                    for &n in &expanded {
                        self.push_raw_end(graph, n);
                    }
                }
                PartKind::OffMeshLink => {
                    for &n in run {
                        self.push_raw_end(graph, n);
                    }
                }
            }
            self.parts.push(PathPart { start_index, end_index: self.nodes.absolute_end() - 1, ..*part });
        }
        self.scratch.expanded = expanded;

        self.unclamped_start = start;
        self.unclamped_end = end;
        self.start_up_to_date = true;
        self.end_up_to_date = true;
        self.start_status = RepairStatus::Repaired;
        self.end_status = RepairStatus::Repaired;
        self.version += 1;

        if !self.rebuild_funnel(graph) {
            self.degrade_to_single_node(graph);
        }
        self.clamp_start(graph);
        self.clamp_end(graph);
        debug!(parts = self.parts.len(), nodes = self.nodes.len(), portals = self.funnel.len(), "path_set");
        Ok(())
    }

    /// Moves the start of the corridor to `point` and returns the clamped
    /// start point.
    pub fn update_start<G: NavGraph + ?Sized>(&mut self, graph: &G, point: DVec3, quality: RepairQuality) -> DVec3 {
        if self.parts.is_empty() {
            return point;
        }
        self.refresh_validity(graph);
        let head = self.nodes.head();
        let node = self.nodes.get_absolute(head);
        let valid = self.is_valid(graph, head);
        if valid && point == self.unclamped_start {
            return self.parts[0].start_point;
        }
        if valid && graph.contains_point(node, point) {
            let clamped = graph.closest_point_on_node(node, point);
            self.accept_start(point, clamped, true, RepairStatus::Repaired);
            return clamped;
        }
        repair::repair_start(self, graph, point, quality)
    }

    /// Moves the end of the corridor to `point` and returns the clamped end
    /// point.
    pub fn update_end<G: NavGraph + ?Sized>(&mut self, graph: &G, point: DVec3, quality: RepairQuality) -> DVec3 {
        if self.parts.is_empty() {
            return point;
        }
        self.refresh_validity(graph);
        let tail = self.nodes.absolute_end() - 1;
        let node = self.nodes.get_absolute(tail);
        let valid = self.is_valid(graph, tail);
        if valid && point == self.unclamped_end {
            return self.end_point();
        }
        if valid && graph.contains_point(node, point) {
            let clamped = graph.closest_point_on_node(node, point);
            self.accept_end(point, clamped, true, RepairStatus::Repaired);
            return clamped;
        }
        repair::repair_end(self, graph, point, quality)
    }

    /// Writes the start point, the next corners and, when reached, the end of
    /// the first part into `out`; at most `max_corners` points. Returns true
    /// when the end of the first part is included.
    pub fn get_next_corners<G: NavGraph + ?Sized>(&mut self, graph: &G, max_corners: usize, out: &mut Vec<DVec3>) -> bool {
        assert!(max_corners >= 2, "max_corners must be at least 2, got {max_corners}");
        out.clear();
        if self.parts.is_empty() {
            return true;
        }
        self.refresh_validity(graph);

        let mut corners = std::mem::take(&mut self.scratch.corners);
        let mut simplified = 0;
        let is_last = loop {
            let (start, end) = (self.parts[0].start_point, self.parts[0].end_point);
            let is_last = self.funnel.calculate_next_corner_indices(max_corners - 1, start, end, &mut corners);
            if !self.settings.simplify_corridor
                || self.first_part_has_invalid_nodes
                || simplified >= self.settings.max_simplifications_per_call
            {
                break is_last;
            }
            if !simplify::simplify_once(self, graph, &corners) {
                break is_last;
            }
            simplified += 1;
        };

        out.push(self.parts[0].start_point);
        out.extend(corners.iter().map(|&c| self.funnel.corner_point(c)));
        if is_last {
            out.push(self.parts[0].end_point);
        }
        self.scratch.corners = corners;
        is_last
    }

    /// Drops the first `count` parts, typically after the agent traversed an
    /// off-mesh link, and rebuilds the funnel for the new first part.
    pub fn pop_parts<G: NavGraph + ?Sized>(&mut self, graph: &G, count: usize) {
        if count == 0 {
            return;
        }
        assert!(count < self.parts.len(), "cannot pop {count} of {} parts", self.parts.len());
        let new_first = self.parts[count];
        assert!(
            new_first.kind == PartKind::NodeSequence,
            "part {count} is an off-mesh link and cannot become the first part"
        );
        while self.nodes.head() < new_first.start_index {
            self.nodes.pop_start();
            self.hashes.pop_start();
        }
        self.parts.drain(..count);
        self.unclamped_start = new_first.start_point;
        self.start_up_to_date = true;
        self.start_status = RepairStatus::Repaired;
        self.start_distance = 0.0;
        self.version += 1;

        if !self.rebuild_funnel(graph) {
            self.degrade_to_single_node(graph);
        }
        self.clamp_start(graph);
        debug!(count, remaining = self.parts.len(), "parts_popped");
    }

    fn is_valid<G: NavGraph + ?Sized>(&self, graph: &G, absolute: isize) -> bool {
        let node = self.nodes.get_absolute(absolute);
        match graph.node_info(node) {
            Some(info) => node_hash(node, Some(&info)) == self.hashes.get_absolute(absolute),
            None => false,
        }
    }

    fn push_raw_end<G: NavGraph + ?Sized>(&mut self, graph: &G, node: NodeId) {
        self.nodes.push_end(node);
        self.hashes.push_end(node_hash(node, graph.node_info(node).as_ref()));
    }

    fn first_part_range(&self) -> std::ops::RangeInclusive<isize> {
        let p = self.parts[0];
        p.start_index..=p.end_index
    }

    /// Recomputes the invalid-node flag of the first part.
    fn refresh_validity<G: NavGraph + ?Sized>(&mut self, graph: &G) {
        let invalid = self.first_part_range().any(|a| !self.is_valid(graph, a));
        if invalid != self.first_part_has_invalid_nodes {
            self.first_part_has_invalid_nodes = invalid;
            self.version += 1;
            debug!(invalid, "first_part_validity_changed");
        }
    }

    /// Rebuilds every portal of the first part. Returns false, leaving the
    /// funnel empty, when the part contains invalid nodes.
    fn rebuild_funnel<G: NavGraph + ?Sized>(&mut self, graph: &G) -> bool {
        self.funnel.clear();
        if self.first_part_range().any(|a| !self.is_valid(graph, a)) {
            self.first_part_has_invalid_nodes = true;
            return false;
        }
        self.first_part_has_invalid_nodes = false;
        let range = self.first_part_range();
        self.funnel.set_projection_axis(graph.projection_axis(self.nodes.get_absolute(*range.start())));
        for a in *range.start()..*range.end() {
            let p = portal_between(graph, self.nodes.get_absolute(a), self.nodes.get_absolute(a + 1));
            self.funnel.push_end(p.left, p.right);
        }
        true
    }

    /// Collapses the first part to one node: the first valid one, else the
    /// first one that still exists, else the first one.
    fn degrade_to_single_node<G: NavGraph + ?Sized>(&mut self, graph: &G) {
        let range = self.first_part_range();
        let pick = range
            .clone()
            .find(|&a| self.is_valid(graph, a))
            .or_else(|| range.clone().find(|&a| graph.node_info(self.nodes.get_absolute(a)).is_some()))
            .unwrap_or(*range.start());
        let node = self.nodes.get_absolute(pick);
        let point = graph.closest_point_on_node(node, self.unclamped_start);
        self.collapse_to_node(graph, node, point);
    }

    /// Replaces the whole corridor by `node`, with the start at `point`.
    fn collapse_to_node<G: NavGraph + ?Sized>(&mut self, graph: &G, node: NodeId, point: DVec3) {
        let dropped = self.nodes.len();
        self.nodes.reset_to(0);
        self.hashes.reset_to(0);
        self.push_raw_end(graph, node);
        let end = graph.closest_point_on_node(node, self.unclamped_end);
        self.parts.clear();
        self.parts.push(PathPart::sequence(0, 0, point, end));
        self.funnel.clear();
        self.funnel.set_projection_axis(graph.projection_axis(node));
        self.first_part_has_invalid_nodes = !self.is_valid(graph, 0);
        self.end_up_to_date = !self.first_part_has_invalid_nodes && graph.contains_point(node, self.unclamped_end);
        if !self.end_up_to_date {
            self.end_status = RepairStatus::Stale;
        }
        self.end_distance = end.distance(self.unclamped_end);
        self.version += 1;
        debug!(node, dropped, "corridor_collapsed");
    }

    fn clamp_start<G: NavGraph + ?Sized>(&mut self, graph: &G) {
        let head = self.nodes.head();
        let point = if self.is_valid(graph, head) {
            graph.closest_point_on_node(self.nodes.get_absolute(head), self.unclamped_start)
        } else {
            self.start_up_to_date = false;
            self.start_status = RepairStatus::Stale;
            self.unclamped_start
        };
        self.parts[0].start_point = point;
        self.start_distance = point.distance(self.unclamped_start);
    }

    fn clamp_end<G: NavGraph + ?Sized>(&mut self, graph: &G) {
        let tail = self.nodes.absolute_end() - 1;
        let point = if self.is_valid(graph, tail) {
            graph.closest_point_on_node(self.nodes.get_absolute(tail), self.unclamped_end)
        } else {
            self.end_up_to_date = false;
            self.end_status = RepairStatus::Stale;
            self.unclamped_end
        };
        let last = self.parts.len() - 1;
        self.parts[last].end_point = point;
        self.end_distance = point.distance(self.unclamped_end);
    }

    /// A point is up to date when it is covered, or when it got no further
    /// from its target than last time and last time was up to date.
    fn accept_start(&mut self, point: DVec3, clamped: DVec3, contained: bool, status: RepairStatus) {
        let d = clamped.distance(point);
        self.start_up_to_date = contained || (self.start_up_to_date && d <= self.start_distance + EPS);
        self.start_distance = d;
        self.start_status = status;
        self.unclamped_start = point;
        self.parts[0].start_point = clamped;
        self.version += 1;
    }

    fn accept_end(&mut self, point: DVec3, clamped: DVec3, contained: bool, status: RepairStatus) {
        let d = clamped.distance(point);
        self.end_up_to_date = contained || (self.end_up_to_date && d <= self.end_distance + EPS);
        self.end_distance = d;
        self.end_status = status;
        self.unclamped_end = point;
        let last = self.parts.len() - 1;
        self.parts[last].end_point = clamped;
        self.version += 1;
    }

    fn push_node_start<G: NavGraph + ?Sized>(&mut self, graph: &G, node: NodeId) {
        let Some(first) = self.nodes.first() else {
            panic!("cannot extend an empty corridor");
        };
        let p = portal_between(graph, node, first);
        self.funnel.push_start(p.left, p.right);
        self.nodes.push_start(node);
        self.hashes.push_start(node_hash(node, graph.node_info(node).as_ref()));
        self.parts[0].start_index -= 1;
    }

    fn pop_node_start(&mut self) {
        assert!(self.parts[0].node_count() > 1, "first part must keep a node");
        self.nodes.pop_start();
        self.hashes.pop_start();
        self.parts[0].start_index += 1;
        self.funnel.pop_start();
    }

    fn push_node_end<G: NavGraph + ?Sized>(&mut self, graph: &G, node: NodeId) {
        let Some(last) = self.nodes.last() else {
            panic!("cannot extend an empty corridor");
        };
        if self.parts.len() == 1 {
            let p = portal_between(graph, last, node);
            self.funnel.push_end(p.left, p.right);
        }
        self.nodes.push_end(node);
        self.hashes.push_end(node_hash(node, graph.node_info(node).as_ref()));
        let i = self.parts.len() - 1;
        self.parts[i].end_index += 1;
    }

    fn pop_node_end(&mut self) {
        let i = self.parts.len() - 1;
        assert!(self.parts[i].node_count() > 1, "last part must keep a node");
        self.nodes.pop_end();
        self.hashes.pop_end();
        self.parts[i].end_index -= 1;
        if i == 0 {
            self.funnel.pop_end();
        }
    }

    /// Replaces `remove` nodes of the first part, starting `offset` nodes
    /// after its first node, and re-derives only the portals around the seam.
    fn splice_first_part<G: NavGraph + ?Sized>(&mut self, graph: &G, offset: usize, remove: usize, insert: &[NodeId]) {
        let first = self.parts[0];
        let old_len = first.node_count();
        assert!(offset + remove <= old_len, "splice {offset}+{remove} past the first part ({old_len} nodes)");
        let new_len = old_len - remove + insert.len();
        assert!(new_len > 0, "splice would empty the first part");

        let abs = first.start_index + offset as isize;
        let mut hashes = std::mem::take(&mut self.scratch.hashes);
        hashes.clear();
        hashes.extend(insert.iter().map(|&n| node_hash(n, graph.node_info(n).as_ref())));
        self.nodes.splice_absolute(abs, remove, insert);
        self.hashes.splice_absolute(abs, remove, &hashes);
        self.scratch.hashes = hashes;

        let delta = insert.len() as isize - remove as isize;
        self.parts[0].end_index += delta;
        for p in &mut self.parts[1..] {
            p.start_index += delta;
            p.end_index += delta;
        }

        let p0 = offset.saturating_sub(1);
        let old_end = (offset + remove).min(old_len - 1);
        let new_end = (offset + insert.len()).min(new_len - 1);
        let mut lefts = std::mem::take(&mut self.scratch.lefts);
        let mut rights = std::mem::take(&mut self.scratch.rights);
        lefts.clear();
        rights.clear();
        for j in p0..new_end {
            let a = first.start_index + j as isize;
            let p = portal_between(graph, self.nodes.get_absolute(a), self.nodes.get_absolute(a + 1));
            lefts.push(p.left);
            rights.push(p.right);
        }
        self.funnel.splice(p0, old_end.saturating_sub(p0), &lefts, &rights);
        self.scratch.lefts = lefts;
        self.scratch.rights = rights;
        self.version += 1;
    }
}
