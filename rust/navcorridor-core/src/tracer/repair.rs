//! Start/end repair.
//!
//! When the agent (or its destination) leaves the boundary node, a small
//! breadth-first search from that node looks for the node containing the
//! new point, following only neighbours that do not get much further from
//! it. The search queue has a fixed capacity, so the work per call is
//! bounded; when it runs out the closest node seen wins.

use glam::DVec3;
use tracing::debug;

use super::{simplify, PathTracer, RepairStatus, Scratch};
use crate::cost::TraversalCost;
use crate::geometry::EPS;
use crate::graph::{NavGraph, NearestConstraint, NodeId, NodeKind};
use crate::options::RepairQuality;

#[derive(Clone, Copy, Debug)]
pub(super) struct Slot {
    node: NodeId,
    parent: usize,
    dist: f64,
}

const NO_PARENT: usize = usize::MAX;

/// Bounded search from `root` towards `target`. Fills `scratch.chain` with the
/// nodes from `root` to the best node found and returns whether that node
/// contains `target`.
pub(super) fn local_search<G: NavGraph + ?Sized, T: TraversalCost>(
    graph: &G,
    cost: &T,
    root: NodeId,
    target: DVec3,
    capacity: usize,
    slack: f64,
    scratch: &mut Scratch,
) -> bool {
    let slots = &mut scratch.slots;
    let conns = &mut scratch.connections;
    slots.clear();
    scratch.chain.clear();
    let Some(root_info) = graph.node_info(root) else {
        return false;
    };
    let dist_to = |n: NodeId| graph.closest_point_on_node(n, target).distance(target);
    slots.push(Slot { node: root, parent: NO_PARENT, dist: dist_to(root) });

    let mut found = None;
    let mut head = 0;
    while head < slots.len() {
        let cur = slots[head];
        if graph.contains_point(cur.node, target) {
            found = Some(head);
            break;
        }
        conns.clear();
        graph.connections(cur.node, conns);
        for &n in conns.iter() {
            if slots.len() >= capacity {
                break;
            }
            if slots.iter().any(|s| s.node == n) {
                continue;
            }
            let Some(info) = graph.node_info(n) else { continue };
            if info.kind == NodeKind::Link || info.graph != root_info.graph || !cost.can_traverse(&info) {
                continue;
            }
            let d = dist_to(n);
            if d <= cur.dist * slack + EPS {
                slots.push(Slot { node: n, parent: head, dist: d });
            }
        }
        head += 1;
    }

    let contained = found.is_some();
    let best = found.unwrap_or_else(|| {
        let mut best = 0;
        for (i, s) in slots.iter().enumerate() {
            if s.dist < slots[best].dist {
                best = i;
            }
        }
        best
    });
    let mut i = best;
    while i != NO_PARENT {
        scratch.chain.push(slots[i].node);
        i = slots[i].parent;
    }
    scratch.chain.reverse();
    debug!(root, visited = slots.len(), contained, best = slots[best].node, "local_search_done");
    contained
}

pub(super) fn repair_start<G: NavGraph + ?Sized, T: TraversalCost>(
    tracer: &mut PathTracer<T>,
    graph: &G,
    point: DVec3,
    quality: RepairQuality,
) -> DVec3 {
    let head = tracer.nodes.head();
    let boundary_invalid =
        !tracer.is_valid(graph, head) || (tracer.parts[0].node_count() > 1 && !tracer.is_valid(graph, head + 1));
    if boundary_invalid {
        let end = tracer.parts[0].end_point;
        let mut popped = 0;
        while tracer.parts[0].node_count() > 1 && tracer.funnel.is_reasonable_to_pop_start(point, end) {
            tracer.pop_node_start();
            popped += 1;
        }
        if popped > 0 {
            tracer.version += 1;
            debug!(popped, "passed_portals_popped");
        }
    }

    let head = tracer.nodes.head();
    if !tracer.is_valid(graph, head) {
        return fallback_start(tracer, graph, point);
    }

    let root = tracer.nodes.get_absolute(head);
    let capacity = tracer.settings.local_search_slots(quality);
    let slack = tracer.settings.local_search_slack;
    let mut scratch = std::mem::take(&mut tracer.scratch);
    let contained = local_search(graph, &tracer.cost, root, point, capacity, slack, &mut scratch);
    simplify::expand_diagonals(graph, &tracer.cost, &scratch.chain, &mut scratch.expanded);
    merge_start(tracer, graph, &scratch.expanded);
    tracer.scratch = scratch;

    let node = tracer.nodes.get_absolute(tracer.nodes.head());
    let clamped = graph.closest_point_on_node(node, point);
    let status = if contained { RepairStatus::Repaired } else { RepairStatus::PartiallyRepaired };
    tracer.accept_start(point, clamped, contained, status);
    debug!(node, contained, up_to_date = tracer.start_up_to_date, "start_repaired");
    clamped
}

pub(super) fn repair_end<G: NavGraph + ?Sized, T: TraversalCost>(
    tracer: &mut PathTracer<T>,
    graph: &G,
    point: DVec3,
    quality: RepairQuality,
) -> DVec3 {
    let last = tracer.parts.len() - 1;
    let tail = tracer.nodes.absolute_end() - 1;
    let boundary_invalid =
        !tracer.is_valid(graph, tail) || (tracer.parts[last].node_count() > 1 && !tracer.is_valid(graph, tail - 1));
    // Only the first part has portals to judge by.
    if boundary_invalid && last == 0 {
        let start = tracer.parts[0].start_point;
        let mut popped = 0;
        while tracer.parts[0].node_count() > 1 && tracer.funnel.is_reasonable_to_pop_end(point, start) {
            tracer.pop_node_end();
            popped += 1;
        }
        if popped > 0 {
            tracer.version += 1;
            debug!(popped, "passed_portals_popped");
        }
    }

    // Destroyed geometry at the destination is shed; the end stays stale
    // until the caller replans.
    let mut trimmed = 0;
    while tracer.parts[last].node_count() > 1 && !tracer.is_valid(graph, tracer.nodes.absolute_end() - 1) {
        tracer.pop_node_end();
        trimmed += 1;
    }
    if trimmed > 0 {
        tracer.version += 1;
        tracer.refresh_validity(graph);
        debug!(trimmed, "invalid_end_nodes_trimmed");
    }

    let tail = tracer.nodes.absolute_end() - 1;
    if !tracer.is_valid(graph, tail) {
        return fallback_end(tracer, graph, point);
    }

    let root = tracer.nodes.get_absolute(tail);
    let capacity = tracer.settings.local_search_slots(quality);
    let slack = tracer.settings.local_search_slack;
    let mut scratch = std::mem::take(&mut tracer.scratch);
    let contained = local_search(graph, &tracer.cost, root, point, capacity, slack, &mut scratch);
    simplify::expand_diagonals(graph, &tracer.cost, &scratch.chain, &mut scratch.expanded);
    merge_end(tracer, graph, &scratch.expanded);
    tracer.scratch = scratch;

    let node = tracer.nodes.get_absolute(tracer.nodes.absolute_end() - 1);
    let clamped = graph.closest_point_on_node(node, point);
    if boundary_invalid {
        tracer.accept_end(point, clamped, false, RepairStatus::Stale);
        tracer.end_up_to_date = false;
    } else {
        let status = if contained { RepairStatus::Repaired } else { RepairStatus::PartiallyRepaired };
        tracer.accept_end(point, clamped, contained, status);
    }
    debug!(node, contained, up_to_date = tracer.end_up_to_date, "end_repaired");
    clamped
}

/// No valid node left at the start: clamp to the nearest node if it is close
/// and restart the corridor there, else keep the point as given.
fn fallback_start<G: NavGraph + ?Sized, T: TraversalCost>(tracer: &mut PathTracer<T>, graph: &G, point: DVec3) -> DVec3 {
    let constraint = NearestConstraint { max_distance: tracer.settings.fallback_max_distance, ..NearestConstraint::default() };
    match graph.nearest(point, &constraint) {
        Some((node, clamped)) => {
            tracer.unclamped_start = point;
            tracer.collapse_to_node(graph, node, clamped);
            tracer.accept_start(point, clamped, graph.contains_point(node, point), RepairStatus::Stale);
            clamped
        }
        None => {
            tracer.unclamped_start = point;
            tracer.parts[0].start_point = point;
            tracer.start_up_to_date = false;
            tracer.start_status = RepairStatus::Stale;
            tracer.version += 1;
            debug!("start_unrepairable");
            point
        }
    }
}

/// No valid node left at the end. The destination is clamped to the nearest
/// node when one is close but never collapsed onto, since that would drop
/// the start of the corridor.
fn fallback_end<G: NavGraph + ?Sized, T: TraversalCost>(tracer: &mut PathTracer<T>, graph: &G, point: DVec3) -> DVec3 {
    let constraint = NearestConstraint { max_distance: tracer.settings.fallback_max_distance, ..NearestConstraint::default() };
    let clamped = match graph.nearest(point, &constraint) {
        Some((node, clamped)) => {
            debug!(node, "end_clamped_to_nearest");
            clamped
        }
        None => {
            debug!("end_unrepairable");
            point
        }
    };
    tracer.accept_end(point, clamped, false, RepairStatus::Stale);
    tracer.end_up_to_date = false;
    clamped
}

/// Position of `node` among the first `part_len` nodes counted from `first`,
/// stepping by `step`.
fn find_in_part<T: TraversalCost>(tracer: &PathTracer<T>, first: isize, step: isize, part_len: usize, node: NodeId) -> Option<usize> {
    (0..part_len).find(|&p| tracer.nodes.get_absolute(first + step * p as isize) == node)
}

/// `chain` runs from the current first node to the node that should become
/// the first one. The furthest chain node already in the corridor is kept
/// and everything before it is replaced by the rest of the chain.
fn merge_start<G: NavGraph + ?Sized, T: TraversalCost>(tracer: &mut PathTracer<T>, graph: &G, chain: &[NodeId]) {
    let part = tracer.parts[0];
    let len = part.node_count();
    let (j, p) = (0..chain.len())
        .rev()
        .find_map(|j| find_in_part(tracer, part.start_index, 1, len, chain[j]).map(|p| (j, p)))
        .unwrap_or((0, 0));
    for _ in 0..p {
        tracer.pop_node_start();
    }
    for &node in &chain[j + 1..] {
        tracer.push_node_start(graph, node);
    }
}

fn merge_end<G: NavGraph + ?Sized, T: TraversalCost>(tracer: &mut PathTracer<T>, graph: &G, chain: &[NodeId]) {
    let part = tracer.parts[tracer.parts.len() - 1];
    let len = part.node_count();
    let (j, p) = (0..chain.len())
        .rev()
        .find_map(|j| find_in_part(tracer, part.end_index, -1, len, chain[j]).map(|p| (j, p)))
        .unwrap_or((0, 0));
    for _ in 0..p {
        tracer.pop_node_end();
    }
    for &node in &chain[j + 1..] {
        tracer.push_node_end(graph, node);
    }
}
