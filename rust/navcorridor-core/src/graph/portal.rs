//! Portal geometry per node kind.
//!
//! Each node kind brings its own shape; these free functions compute the
//! shared edge between two shapes and the point queries on a single shape.
//! [`NodeShape`] is the closed set of shapes the reference world stores.

use glam::DVec3;

use crate::geometry::{self, area2, same_xz, xz, EPS};
use crate::graph::Portal;

/// Axis aligned grid cell in the XZ plane at a fixed height.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CellRect {
    pub min_x: f64,
    pub min_z: f64,
    pub size: f64,
    pub y: f64,
}

impl CellRect {
    pub fn max_x(&self) -> f64 {
        self.min_x + self.size
    }

    pub fn max_z(&self) -> f64 {
        self.min_z + self.size
    }

    pub fn center(&self) -> DVec3 {
        DVec3::new(self.min_x + self.size * 0.5, self.y, self.min_z + self.size * 0.5)
    }

    pub fn corners(&self) -> [DVec3; 4] {
        [
            DVec3::new(self.min_x, self.y, self.min_z),
            DVec3::new(self.max_x(), self.y, self.min_z),
            DVec3::new(self.max_x(), self.y, self.max_z()),
            DVec3::new(self.min_x, self.y, self.max_z()),
        ]
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum NodeShape {
    Triangle([DVec3; 3]),
    Cell(CellRect),
    Link(DVec3),
}

impl NodeShape {
    pub fn center(&self) -> DVec3 {
        match self {
            NodeShape::Triangle(t) => geometry::triangle_centroid(t),
            NodeShape::Cell(c) => c.center(),
            NodeShape::Link(p) => *p,
        }
    }

    pub fn contains(&self, p: DVec3) -> bool {
        match self {
            NodeShape::Triangle(t) => geometry::triangle_contains_xz(t, p),
            NodeShape::Cell(c) => cell_contains(c, p),
            NodeShape::Link(q) => same_xz(*q, p),
        }
    }

    pub fn closest_point(&self, p: DVec3) -> DVec3 {
        match self {
            NodeShape::Triangle(t) => geometry::closest_on_triangle_xz(t, p),
            NodeShape::Cell(c) => cell_closest(c, p),
            NodeShape::Link(q) => *q,
        }
    }

    pub fn vertices(&self, out: &mut Vec<DVec3>) {
        match self {
            NodeShape::Triangle(t) => out.extend_from_slice(t),
            NodeShape::Cell(c) => out.extend_from_slice(&c.corners()),
            NodeShape::Link(_) => {}
        }
    }
}

/// Portal between two shapes of the same kind. Links have no geometric
/// portal; the corridor never asks for one across a part boundary.
pub fn shape_portal(from: &NodeShape, to: &NodeShape) -> Option<Portal> {
    match (from, to) {
        (NodeShape::Triangle(a), NodeShape::Triangle(b)) => triangle_portal(a, b),
        (NodeShape::Cell(a), NodeShape::Cell(b)) => cell_portal(a, b),
        _ => None,
    }
}

/// Orients the edge `p-q` so that `left` is on the left when walking from
/// `from_center` towards `to_center`.
pub fn orient(from_center: DVec3, to_center: DVec3, p: DVec3, q: DVec3) -> Portal {
    let a = xz(from_center);
    let b = xz(to_center);
    let mid = (xz(p) + xz(q)) * 0.5;
    // Measure relative to the edge midpoint so long thin edges still orient.
    let dir = b - a;
    let side = dir.perp_dot(xz(p) - mid);
    if side > 0.0 || (side == 0.0 && area2(a, b, xz(p)) > 0.0) {
        Portal { left: p, right: q }
    } else {
        Portal { left: q, right: p }
    }
}

pub fn triangle_portal(a: &[DVec3; 3], b: &[DVec3; 3]) -> Option<Portal> {
    let mut shared: [DVec3; 2] = [DVec3::ZERO; 2];
    let mut n = 0;
    for va in a {
        if b.iter().any(|vb| same_xz(*va, *vb) && (va.y - vb.y).abs() <= 1e-6) {
            if n == 2 {
                // Identical triangles.
                return None;
            }
            shared[n] = *va;
            n += 1;
        }
    }
    if n != 2 {
        return None;
    }
    let ca = geometry::triangle_centroid(a);
    let cb = geometry::triangle_centroid(b);
    Some(orient(ca, cb, shared[0], shared[1]))
}

/// Portal between two grid cells: their shared side, or the shared corner as
/// a zero width portal for diagonal neighbours.
pub fn cell_portal(a: &CellRect, b: &CellRect) -> Option<Portal> {
    let x0 = a.min_x.max(b.min_x);
    let x1 = a.max_x().min(b.max_x());
    let z0 = a.min_z.max(b.min_z);
    let z1 = a.max_z().min(b.max_z());
    if x1 < x0 - EPS || z1 < z0 - EPS {
        return None;
    }
    let y = (a.y + b.y) * 0.5;
    let wx = x1 - x0;
    let wz = z1 - z0;
    let (p, q) = if wx > EPS && wz <= EPS {
        (DVec3::new(x0, y, z0), DVec3::new(x1, y, z0))
    } else if wz > EPS && wx <= EPS {
        (DVec3::new(x0, y, z0), DVec3::new(x0, y, z1))
    } else if wx <= EPS && wz <= EPS {
        let c = DVec3::new(x0, y, z0);
        (c, c)
    } else {
        // Overlapping cells are not neighbours.
        return None;
    };
    Some(orient(a.center(), b.center(), p, q))
}

pub fn cell_contains(c: &CellRect, p: DVec3) -> bool {
    p.x >= c.min_x - EPS && p.x <= c.max_x() + EPS && p.z >= c.min_z - EPS && p.z <= c.max_z() + EPS
}

pub fn cell_closest(c: &CellRect, p: DVec3) -> DVec3 {
    DVec3::new(p.x.clamp(c.min_x, c.max_x()), c.y, p.z.clamp(c.min_z, c.max_z()))
}
