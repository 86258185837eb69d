//! Corridor simplification.
//!
//! Triangle corridors drop "inner" vertices: when the path bends around a
//! mesh vertex that is surrounded by walkable triangles, the run of nodes
//! around that vertex is swapped for the fan on its other side if that is not
//! more expensive. Grid corridors try a straight line of sight between two
//! corridor cells instead. Both only ever touch the first part.

use glam::DVec3;
use tracing::{debug, warn};

use super::PathTracer;
use crate::cost::TraversalCost;
use crate::funnel::Corner;
use crate::geometry::same_xz;
use crate::graph::{NavGraph, NodeId, NodeKind};

fn is_diagonal_step<G: NavGraph + ?Sized>(graph: &G, a: NodeId, b: NodeId) -> bool {
    let kinds = (graph.node_info(a).map(|i| i.kind), graph.node_info(b).map(|i| i.kind));
    if kinds != (Some(NodeKind::GridCell), Some(NodeKind::GridCell)) {
        return false;
    }
    graph.portal(a, b).map(|p| p.is_degenerate()).unwrap_or(false)
}

/// Cheapest cell orthogonally adjacent to both `a` and `b`.
fn common_neighbour<G: NavGraph + ?Sized, T: TraversalCost>(graph: &G, cost: &T, a: NodeId, b: NodeId) -> Option<NodeId> {
    let mut from_a = Vec::new();
    let mut from_b = Vec::new();
    graph.connections(a, &mut from_a);
    graph.connections(b, &mut from_b);
    let wide = |x: NodeId, y: NodeId| graph.portal(x, y).map(|p| !p.is_degenerate()).unwrap_or(false);
    from_a
        .into_iter()
        .filter(|c| from_b.contains(c))
        .filter_map(|c| {
            let info = graph.node_info(c)?;
            if info.kind != NodeKind::GridCell || !cost.can_traverse(&info) || !wide(a, c) || !wide(c, b) {
                return None;
            }
            let b_info = graph.node_info(b)?;
            let total = cost.cost(graph, a, c, &info) as u64 + cost.cost(graph, c, b, &b_info) as u64;
            Some((total, c))
        })
        .min()
        .map(|(_, c)| c)
}

/// Copies `nodes` into `out`, replacing every diagonal grid step by two
/// axis-aligned ones through the cheaper shared neighbour.
pub(super) fn expand_diagonals<G: NavGraph + ?Sized, T: TraversalCost>(graph: &G, cost: &T, nodes: &[NodeId], out: &mut Vec<NodeId>) {
    out.clear();
    let Some(&first) = nodes.first() else { return };
    out.push(first);
    for w in nodes.windows(2) {
        if is_diagonal_step(graph, w[0], w[1]) {
            if let Some(c) = common_neighbour(graph, cost, w[0], w[1]) {
                out.push(c);
            }
        }
        out.push(w[1]);
    }
}

/// Tries one simplification of the first part. Returns true when the
/// corridor changed.
pub(super) fn simplify_once<G: NavGraph + ?Sized, T: TraversalCost>(tracer: &mut PathTracer<T>, graph: &G, corners: &[Corner]) -> bool {
    if tracer.parts[0].node_count() < 3 {
        return false;
    }
    let head = tracer.nodes.head();
    match graph.node_info(tracer.nodes.get_absolute(head)).map(|i| i.kind) {
        Some(NodeKind::Triangle) => corners.iter().any(|&c| remove_inner_vertex(tracer, graph, c)),
        Some(NodeKind::GridCell) => shortcut_grid(tracer, graph),
        _ => false,
    }
}

/// `p`-th node of the first part.
fn part_node<T: TraversalCost>(tracer: &PathTracer<T>, p: usize) -> NodeId {
    tracer.nodes.get_absolute(tracer.parts[0].start_index + p as isize)
}

fn touches<G: NavGraph + ?Sized>(graph: &G, node: NodeId, v: DVec3, verts: &mut Vec<DVec3>) -> bool {
    verts.clear();
    graph.vertices(node, verts);
    verts.iter().any(|&p| same_xz(p, v) && (p.y - v.y).abs() <= 1e-6)
}

/// Accepts `alt` in place of the first-part nodes `from..=to` when it differs,
/// does not revisit corridor nodes and is not more expensive.
fn try_replace<G: NavGraph + ?Sized, T: TraversalCost>(tracer: &mut PathTracer<T>, graph: &G, from: usize, to: usize, alt: &[NodeId]) -> bool {
    let orig: Vec<NodeId> = (from..=to).map(|p| part_node(tracer, p)).collect();
    if alt.len() < 2 || alt == orig.as_slice() || alt[0] != orig[0] || alt[alt.len() - 1] != orig[orig.len() - 1] {
        return false;
    }
    let inner = &alt[1..alt.len() - 1];
    let revisits = tracer
        .first_part_nodes()
        .enumerate()
        .any(|(p, n)| (p < from || p > to) && inner.contains(&n));
    if revisits {
        return false;
    }
    if inner.iter().any(|&n| graph.node_info(n).map(|i| !tracer.cost.can_traverse(&i)).unwrap_or(true)) {
        return false;
    }
    let orig_cost = tracer.cost.path_cost(graph, &orig);
    let alt_cost = tracer.cost.path_cost(graph, alt);
    if alt_cost > orig_cost + tracer.settings.simplification_cost_tolerance as u64 {
        return false;
    }
    tracer.splice_first_part(graph, from + 1, to - from - 1, inner);
    debug!(from, to, removed = to - from - 1, inserted = inner.len(), orig_cost, alt_cost, "corridor_simplified");
    true
}

fn remove_inner_vertex<G: NavGraph + ?Sized, T: TraversalCost>(tracer: &mut PathTracer<T>, graph: &G, corner: Corner) -> bool {
    let v = tracer.funnel.corner_point(corner);
    let n = tracer.parts[0].node_count();
    if corner.index + 1 >= n {
        return false;
    }
    let mut verts = std::mem::take(&mut tracer.scratch.vertices);
    let mut fan = std::mem::take(&mut tracer.scratch.fan);
    let mut conns = std::mem::take(&mut tracer.scratch.connections);

    let mut a = corner.index;
    while a > 0 && touches(graph, part_node(tracer, a - 1), v, &mut verts) {
        a -= 1;
    }
    let mut b = corner.index + 1;
    while b + 1 < n && touches(graph, part_node(tracer, b + 1), v, &mut verts) {
        b += 1;
    }

    // Walk around `v` the other way, from the first node of the run to its last.
    let target = part_node(tracer, b);
    let mut prev = part_node(tracer, a + 1);
    let mut cur = part_node(tracer, a);
    let home_graph = graph.node_info(cur).map(|i| i.graph);
    fan.clear();
    fan.push(cur);
    let mut reached = false;
    for _ in 0..tracer.settings.max_fan_iterations {
        conns.clear();
        graph.connections(cur, &mut conns);
        let next = conns.iter().copied().find(|&c| {
            c != prev
                && graph
                    .node_info(c)
                    .map(|i| i.kind == NodeKind::Triangle && Some(i.graph) == home_graph && tracer.cost.can_traverse(&i))
                    .unwrap_or(false)
                && graph.portal(cur, c).map(|p| same_xz(p.left, v) || same_xz(p.right, v)).unwrap_or(false)
                && touches(graph, c, v, &mut verts)
        });
        let Some(next) = next else { break };
        fan.push(next);
        if next == target {
            reached = true;
            break;
        }
        prev = cur;
        cur = next;
    }
    if !reached && fan.len() as u32 > tracer.settings.max_fan_iterations {
        warn!(vertex = ?v, iterations = tracer.settings.max_fan_iterations, "vertex_fan_iteration_cap");
    }

    let changed = reached && try_replace(tracer, graph, a, b, &fan);
    if changed {
        debug!(vertex = ?v, "inner_vertex_removed");
    }
    tracer.scratch.vertices = verts;
    tracer.scratch.fan = fan;
    tracer.scratch.connections = conns;
    changed
}

/// Line-of-sight shortcut between two first-part cells. The probed pair
/// rotates across calls so repeated calls cover the corridor.
fn shortcut_grid<G: NavGraph + ?Sized, T: TraversalCost>(tracer: &mut PathTracer<T>, graph: &G) -> bool {
    let n = tracer.parts[0].node_count();
    let c = tracer.simplify_cursor;
    tracer.simplify_cursor = c.wrapping_add(1);
    let span = (2 + (c % 3) as usize).min(n - 1);
    let from = (c as usize / 3) % (n - span);
    let to = from + span;
    let a = part_node(tracer, from);
    let b = part_node(tracer, to);

    let mut trace = std::mem::take(&mut tracer.scratch.chain);
    let mut alt = std::mem::take(&mut tracer.scratch.expanded);
    trace.clear();
    let clear = match graph.linecast(a, graph.position(a), graph.position(b), &mut trace) {
        Some(hit) => hit.hit.is_none() && hit.end_node == b && trace.first() == Some(&a),
        None => false,
    };
    let changed = if clear {
        expand_diagonals(graph, &tracer.cost, &trace, &mut alt);
        try_replace(tracer, graph, from, to, &alt)
    } else {
        false
    };
    tracer.scratch.chain = trace;
    tracer.scratch.expanded = alt;
    changed
}
