//! In-memory reference navigation world.
//!
//! Holds any number of triangle meshes and grids plus off-mesh links between
//! them, and exposes the mutations a background graph-update pipeline would
//! perform (destroying nodes, toggling walkability, re-tiling). Every
//! structural mutation bumps the node's epoch so corridor hashes notice it.

use std::collections::{HashMap, VecDeque};

use glam::{DVec2, DVec3};
use tracing::debug;

use crate::geometry::{segment_intersection_xz, xz, EPS};
use crate::graph::portal::{shape_portal, CellRect, NodeShape};
use crate::graph::{LinecastResult, NavGraph, NearestConstraint, NodeId, NodeInfo, NodeKind, Portal};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GraphHandle {
    pub graph: u32,
    pub first_node: NodeId,
    pub node_count: u32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GridLayout {
    /// Minimum corner of cell (0, 0); `y` is the floor height.
    pub origin: DVec3,
    pub cell_size: f64,
    pub width: u32,
    pub depth: u32,
    pub first_node: NodeId,
    pub diagonals: bool,
}

impl GridLayout {
    fn cell_of(&self, p: DVec3) -> (i64, i64) {
        (
            ((p.x - self.origin.x) / self.cell_size).floor() as i64,
            ((p.z - self.origin.z) / self.cell_size).floor() as i64,
        )
    }

    fn node_at(&self, x: i64, z: i64) -> Option<NodeId> {
        if x < 0 || z < 0 || x >= self.width as i64 || z >= self.depth as i64 {
            return None;
        }
        Some(self.first_node + (z as u32) * self.width + x as u32)
    }

    fn coords(&self, node: NodeId) -> (i64, i64) {
        let local = node - self.first_node;
        ((local % self.width) as i64, (local / self.width) as i64)
    }
}

#[derive(Clone, Debug)]
enum GraphLayout {
    Mesh,
    Grid(GridLayout),
    Links,
}

#[derive(Clone, Debug)]
struct NodeSlot {
    graph: u32,
    shape: NodeShape,
    walkable: bool,
    area: u32,
    tag: u8,
    epoch: u32,
    destroyed: bool,
    /// Explicit connections. Grid neighbours are derived on the fly and only
    /// link connections are stored for grid cells.
    connections: Vec<NodeId>,
}

#[derive(Clone, Debug, Default)]
pub struct NavWorld {
    nodes: Vec<NodeSlot>,
    graphs: Vec<GraphLayout>,
    link_graph: Option<u32>,
    next_area: u32,
}

impl NavWorld {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn graph_count(&self) -> usize {
        self.graphs.len()
    }

    pub fn grid_layout(&self, graph: u32) -> Option<&GridLayout> {
        match self.graphs.get(graph as usize) {
            Some(GraphLayout::Grid(g)) => Some(g),
            _ => None,
        }
    }

    pub fn grid_node(&self, graph: u32, x: i64, z: i64) -> Option<NodeId> {
        self.grid_layout(graph).and_then(|g| g.node_at(x, z))
    }

    /// Adds a triangle mesh. Triangles sharing an edge (two vertex indices)
    /// are connected both ways.
    pub fn add_trimesh(&mut self, vertices: &[DVec3], triangles: &[[u32; 3]]) -> GraphHandle {
        let graph = self.graphs.len() as u32;
        self.graphs.push(GraphLayout::Mesh);
        let first_node = self.nodes.len() as NodeId;

        let mut edges: HashMap<(u32, u32), Vec<NodeId>> = HashMap::new();
        for (i, tri) in triangles.iter().enumerate() {
            let node = first_node + i as NodeId;
            let shape = NodeShape::Triangle([
                vertices[tri[0] as usize],
                vertices[tri[1] as usize],
                vertices[tri[2] as usize],
            ]);
            self.nodes.push(NodeSlot {
                graph,
                shape,
                walkable: true,
                area: 0,
                tag: 0,
                epoch: 0,
                destroyed: false,
                connections: Vec::new(),
            });
            for k in 0..3 {
                let a = tri[k];
                let b = tri[(k + 1) % 3];
                edges.entry((a.min(b), a.max(b))).or_default().push(node);
            }
        }
        for tris in edges.values() {
            for &a in tris {
                for &b in tris {
                    if a != b && !self.nodes[a as usize].connections.contains(&b) {
                        self.nodes[a as usize].connections.push(b);
                    }
                }
            }
        }
        for slot in &mut self.nodes[first_node as usize..] {
            slot.connections.sort_unstable();
        }
        let node_count = triangles.len() as u32;
        self.label_areas(first_node, node_count);
        GraphHandle { graph, first_node, node_count }
    }

    /// Adds a `width` x `depth` grid of square cells. `walkable(x, z)` decides
    /// the initial walkability of each cell.
    pub fn add_grid(
        &mut self,
        origin: DVec3,
        cell_size: f64,
        width: u32,
        depth: u32,
        diagonals: bool,
        walkable: impl Fn(u32, u32) -> bool,
    ) -> GraphHandle {
        let graph = self.graphs.len() as u32;
        let first_node = self.nodes.len() as NodeId;
        let layout = GridLayout { origin, cell_size, width, depth, first_node, diagonals };
        self.graphs.push(GraphLayout::Grid(layout));
        for z in 0..depth {
            for x in 0..width {
                let rect = CellRect {
                    min_x: origin.x + x as f64 * cell_size,
                    min_z: origin.z + z as f64 * cell_size,
                    size: cell_size,
                    y: origin.y,
                };
                self.nodes.push(NodeSlot {
                    graph,
                    shape: NodeShape::Cell(rect),
                    walkable: walkable(x, z),
                    area: 0,
                    tag: 0,
                    epoch: 0,
                    destroyed: false,
                    connections: Vec::new(),
                });
            }
        }
        let node_count = width * depth;
        self.label_areas(first_node, node_count);
        GraphHandle { graph, first_node, node_count }
    }

    /// Adds an off-mesh link from `from` (entered at `from_point`) to `to`
    /// (left at `to_point`). Returns the two link endpoint nodes.
    pub fn add_link(&mut self, from: NodeId, from_point: DVec3, to: NodeId, to_point: DVec3) -> (NodeId, NodeId) {
        let graph = match self.link_graph {
            Some(g) => g,
            None => {
                let g = self.graphs.len() as u32;
                self.graphs.push(GraphLayout::Links);
                self.link_graph = Some(g);
                g
            }
        };
        let a = self.nodes.len() as NodeId;
        let b = a + 1;
        for (p, attached, other) in [(from_point, from, b), (to_point, to, a)] {
            self.nodes.push(NodeSlot {
                graph,
                shape: NodeShape::Link(p),
                walkable: true,
                area: 0,
                tag: 0,
                epoch: 0,
                destroyed: false,
                connections: vec![attached, other],
            });
        }
        self.nodes[from as usize].connections.push(a);
        self.nodes[to as usize].connections.push(b);
        (a, b)
    }

    pub fn destroy_node(&mut self, node: NodeId) {
        let slot = &mut self.nodes[node as usize];
        if slot.destroyed {
            return;
        }
        slot.destroyed = true;
        slot.epoch = slot.epoch.wrapping_add(1);
        let neighbours = std::mem::take(&mut slot.connections);
        for n in neighbours {
            self.nodes[n as usize].connections.retain(|&c| c != node);
        }
        debug!(node, "node_destroyed");
    }

    pub fn set_walkable(&mut self, node: NodeId, walkable: bool) {
        let slot = &mut self.nodes[node as usize];
        if slot.walkable != walkable {
            slot.walkable = walkable;
            slot.epoch = slot.epoch.wrapping_add(1);
        }
    }

    /// Tags only change traversal cost; node hashes stay valid.
    pub fn set_tag(&mut self, node: NodeId, tag: u8) {
        self.nodes[node as usize].tag = tag;
    }

    /// Marks the node as structurally changed without changing its shape, as a
    /// re-tiling pass that reuses the node id would.
    pub fn touch_node(&mut self, node: NodeId) {
        let slot = &mut self.nodes[node as usize];
        slot.epoch = slot.epoch.wrapping_add(1);
    }

    fn live(&self, node: NodeId) -> Option<&NodeSlot> {
        self.nodes.get(node as usize).filter(|s| !s.destroyed)
    }

    fn label_areas(&mut self, first_node: NodeId, count: u32) {
        let mut scratch = Vec::new();
        let mut queue = VecDeque::new();
        let mut labelled = vec![false; count as usize];
        for i in 0..count {
            if labelled[i as usize] {
                continue;
            }
            self.next_area += 1;
            let area = self.next_area;
            labelled[i as usize] = true;
            queue.push_back(first_node + i);
            while let Some(n) = queue.pop_front() {
                self.nodes[n as usize].area = area;
                scratch.clear();
                self.connections(n, &mut scratch);
                for &c in &scratch {
                    if c < first_node || c >= first_node + count {
                        continue;
                    }
                    let local = (c - first_node) as usize;
                    if !labelled[local] {
                        labelled[local] = true;
                        queue.push_back(c);
                    }
                }
            }
        }
    }

    fn grid_connections(&self, layout: &GridLayout, node: NodeId, out: &mut Vec<NodeId>) {
        let (x, z) = layout.coords(node);
        let open = |cx: i64, cz: i64| -> Option<NodeId> {
            let n = layout.node_at(cx, cz)?;
            let slot = self.live(n)?;
            if slot.walkable { Some(n) } else { None }
        };
        for (dx, dz) in [(0, 1), (0, -1), (1, 0), (-1, 0)] {
            if let Some(n) = open(x + dx, z + dz) {
                out.push(n);
            }
        }
        if layout.diagonals {
            for (dx, dz) in [(1, 1), (-1, 1), (1, -1), (-1, -1)] {
                // No corner cutting.
                if open(x + dx, z).is_some() && open(x, z + dz).is_some() {
                    if let Some(n) = open(x + dx, z + dz) {
                        out.push(n);
                    }
                }
            }
        }
    }

    fn linecast_mesh(&self, start_node: NodeId, from: DVec3, to: DVec3, trace: &mut Vec<NodeId>) -> LinecastResult {
        let a = xz(from);
        let b = xz(to);
        let mut cur = start_node;
        let mut t_enter = 0.0f64;
        trace.push(cur);
        // Each step moves strictly forward along the segment, so the walk
        // cannot visit more triangles than exist.
        for _ in 0..=self.nodes.len() {
            let Some(NodeShape::Triangle(tri)) = self.live(cur).map(|s| s.shape) else {
                return LinecastResult { hit: Some((cur, from)), end_node: cur };
            };
            if crate::geometry::triangle_contains_xz(&tri, to) {
                return LinecastResult { hit: None, end_node: cur };
            }
            let mut exit: Option<(f64, usize)> = None;
            for k in 0..3 {
                let p = xz(tri[k]);
                let q = xz(tri[(k + 1) % 3]);
                if let Some((t, u)) = segment_intersection_xz(a, b, p, q) {
                    if (-1e-7..=1.0 + 1e-7).contains(&u) && t >= t_enter - 1e-7 && exit.map(|(et, _)| t > et).unwrap_or(true) {
                        exit = Some((t, k));
                    }
                }
            }
            let Some((t_exit, k)) = exit else {
                return LinecastResult { hit: Some((cur, from.lerp(to, t_enter))), end_node: cur };
            };
            if t_exit >= 1.0 {
                return LinecastResult { hit: None, end_node: cur };
            }
            let e0 = tri[k];
            let e1 = tri[(k + 1) % 3];
            let slot = &self.nodes[cur as usize];
            let next = slot.connections.iter().copied().find(|&c| {
                self.live(c).map(|s| s.walkable && s.graph == slot.graph).unwrap_or(false)
                    && self
                        .portal(cur, c)
                        .map(|p| edge_matches(&p, e0, e1))
                        .unwrap_or(false)
            });
            let hit_point = from.lerp(to, t_exit);
            match next {
                Some(n) => {
                    cur = n;
                    t_enter = t_exit;
                    trace.push(n);
                }
                None => return LinecastResult { hit: Some((cur, hit_point)), end_node: cur },
            }
        }
        LinecastResult { hit: Some((cur, from)), end_node: cur }
    }

    fn linecast_grid(&self, layout: &GridLayout, start_node: NodeId, from: DVec3, to: DVec3, trace: &mut Vec<NodeId>) -> LinecastResult {
        let (mut x, mut z) = layout.coords(start_node);
        let (tx, tz) = layout.cell_of(to);
        let d = DVec2::new(to.x - from.x, to.z - from.z);
        let step_x: i64 = if d.x > 0.0 { 1 } else { -1 };
        let step_z: i64 = if d.y > 0.0 { 1 } else { -1 };
        let cell = layout.cell_size;
        let next_boundary = |c: i64, step: i64, origin: f64| origin + (c + if step > 0 { 1 } else { 0 }) as f64 * cell;
        let mut t_max_x = if d.x.abs() <= EPS {
            f64::INFINITY
        } else {
            (next_boundary(x, step_x, layout.origin.x) - from.x) / d.x
        };
        let mut t_max_z = if d.y.abs() <= EPS {
            f64::INFINITY
        } else {
            (next_boundary(z, step_z, layout.origin.z) - from.z) / d.y
        };
        let t_delta_x = if d.x.abs() <= EPS { f64::INFINITY } else { cell / d.x.abs() };
        let t_delta_z = if d.y.abs() <= EPS { f64::INFINITY } else { cell / d.y.abs() };

        let mut cur = start_node;
        trace.push(cur);
        let steps = (tx - x).abs() + (tz - z).abs();
        for _ in 0..steps {
            let t = if t_max_x <= t_max_z {
                x += step_x;
                let t = t_max_x;
                t_max_x += t_delta_x;
                t
            } else {
                z += step_z;
                let t = t_max_z;
                t_max_z += t_delta_z;
                t
            };
            let blocked = match layout.node_at(x, z) {
                Some(n) => match self.live(n) {
                    Some(s) if s.walkable => {
                        cur = n;
                        trace.push(n);
                        false
                    }
                    _ => true,
                },
                None => true,
            };
            if blocked {
                return LinecastResult { hit: Some((cur, from.lerp(to, t.clamp(0.0, 1.0)))), end_node: cur };
            }
        }
        LinecastResult { hit: None, end_node: cur }
    }
}

fn edge_matches(p: &Portal, a: DVec3, b: DVec3) -> bool {
    let same = |u: DVec3, v: DVec3| xz(u).distance_squared(xz(v)) <= EPS * EPS;
    (same(p.left, a) && same(p.right, b)) || (same(p.left, b) && same(p.right, a))
}

impl NavGraph for NavWorld {
    fn node_info(&self, node: NodeId) -> Option<NodeInfo> {
        let slot = self.live(node)?;
        let kind = match slot.shape {
            NodeShape::Triangle(_) => NodeKind::Triangle,
            NodeShape::Cell(_) => NodeKind::GridCell,
            NodeShape::Link(_) => NodeKind::Link,
        };
        Some(NodeInfo {
            kind,
            graph: slot.graph,
            walkable: slot.walkable,
            area: slot.area,
            tag: slot.tag,
            epoch: slot.epoch,
        })
    }

    fn connections(&self, node: NodeId, out: &mut Vec<NodeId>) {
        let Some(slot) = self.live(node) else { return };
        if let Some(GraphLayout::Grid(layout)) = self.graphs.get(slot.graph as usize) {
            self.grid_connections(layout, node, out);
        }
        out.extend(slot.connections.iter().copied().filter(|&c| self.live(c).is_some()));
    }

    fn portal(&self, from: NodeId, to: NodeId) -> Option<Portal> {
        let a = self.live(from)?;
        let b = self.live(to)?;
        if a.graph != b.graph {
            return None;
        }
        shape_portal(&a.shape, &b.shape)
    }

    fn contains_point(&self, node: NodeId, point: DVec3) -> bool {
        self.live(node).map(|s| s.shape.contains(point)).unwrap_or(false)
    }

    fn closest_point_on_node(&self, node: NodeId, point: DVec3) -> DVec3 {
        self.live(node).map(|s| s.shape.closest_point(point)).unwrap_or(point)
    }

    fn position(&self, node: NodeId) -> DVec3 {
        self.nodes[node as usize].shape.center()
    }

    fn vertices(&self, node: NodeId, out: &mut Vec<DVec3>) {
        if let Some(s) = self.live(node) {
            s.shape.vertices(out);
        }
    }

    fn projection_axis(&self, node: NodeId) -> Option<DVec3> {
        let slot = self.live(node)?;
        match self.graphs.get(slot.graph as usize) {
            Some(GraphLayout::Grid(_)) => Some(DVec3::Y),
            _ => None,
        }
    }

    fn linecast(&self, start_node: NodeId, from: DVec3, to: DVec3, trace: &mut Vec<NodeId>) -> Option<LinecastResult> {
        let slot = self.live(start_node)?;
        match self.graphs.get(slot.graph as usize)? {
            GraphLayout::Mesh => Some(self.linecast_mesh(start_node, from, to, trace)),
            GraphLayout::Grid(layout) => Some(self.linecast_grid(layout, start_node, from, to, trace)),
            GraphLayout::Links => None,
        }
    }

    fn nearest(&self, point: DVec3, constraint: &NearestConstraint) -> Option<(NodeId, DVec3)> {
        let mut best: Option<(NodeId, DVec3, f64)> = None;
        for i in 0..self.nodes.len() as NodeId {
            let Some(info) = self.node_info(i) else { continue };
            if !constraint.accepts(&info) {
                continue;
            }
            let p = self.nodes[i as usize].shape.closest_point(point);
            let d = p.distance_squared(point);
            if d > constraint.max_distance * constraint.max_distance {
                continue;
            }
            if best.map(|(_, _, bd)| d < bd).unwrap_or(true) {
                best = Some((i, p, d));
            }
        }
        best.map(|(n, p, _)| (n, p))
    }
}
