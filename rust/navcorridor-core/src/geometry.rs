//! Small geometry helpers over `glam` doubles.
//!
//! The walkable plane is XZ with `y` up. 2D helpers work on the `(x, z)`
//! projection.

use glam::{DVec2, DVec3};

pub const EPS: f64 = 1e-9;

#[inline]
pub fn xz(p: DVec3) -> DVec2 {
    DVec2::new(p.x, p.z)
}

/// Twice the signed area of triangle `a, b, c`. Positive when `c` is
/// counter-clockwise (to the left) of `a -> b`.
#[inline]
pub fn area2(a: DVec2, b: DVec2, c: DVec2) -> f64 {
    (b - a).perp_dot(c - a)
}

#[inline]
pub fn same_xz(a: DVec3, b: DVec3) -> bool {
    xz(a).distance_squared(xz(b)) <= EPS * EPS
}

/// Closest point to `p` on segment `a-b`.
pub fn closest_on_segment(p: DVec3, a: DVec3, b: DVec3) -> DVec3 {
    let ab = b - a;
    let len_sq = ab.length_squared();
    if len_sq <= EPS * EPS {
        return a;
    }
    let t = ((p - a).dot(ab) / len_sq).clamp(0.0, 1.0);
    a + ab * t
}

/// XZ point-in-triangle test with a small tolerance on the edges.
pub fn triangle_contains_xz(tri: &[DVec3; 3], p: DVec3) -> bool {
    let q = xz(p);
    let (a, b, c) = (xz(tri[0]), xz(tri[1]), xz(tri[2]));
    let d1 = area2(a, b, q);
    let d2 = area2(b, c, q);
    let d3 = area2(c, a, q);
    let eps = 1e-7;
    let has_neg = d1 < -eps || d2 < -eps || d3 < -eps;
    let has_pos = d1 > eps || d2 > eps || d3 > eps;
    !(has_neg && has_pos)
}

/// Height of the triangle plane at the XZ position of `p`, by barycentric
/// interpolation. Falls back to the mean height for degenerate triangles.
pub fn triangle_height_at(tri: &[DVec3; 3], p: DVec3) -> f64 {
    let (a, b, c) = (xz(tri[0]), xz(tri[1]), xz(tri[2]));
    let q = xz(p);
    let denom = area2(a, b, c);
    if denom.abs() <= EPS {
        return (tri[0].y + tri[1].y + tri[2].y) / 3.0;
    }
    let wa = area2(b, c, q) / denom;
    let wb = area2(c, a, q) / denom;
    let wc = 1.0 - wa - wb;
    tri[0].y * wa + tri[1].y * wb + tri[2].y * wc
}

/// Closest point on the triangle to `p`, measured in the XZ plane, lifted
/// back onto the triangle surface.
pub fn closest_on_triangle_xz(tri: &[DVec3; 3], p: DVec3) -> DVec3 {
    if triangle_contains_xz(tri, p) {
        return DVec3::new(p.x, triangle_height_at(tri, p), p.z);
    }
    let flat = DVec3::new(p.x, 0.0, p.z);
    let mut best = tri[0];
    let mut best_d = f64::INFINITY;
    for i in 0..3 {
        let a = tri[i];
        let b = tri[(i + 1) % 3];
        let fa = DVec3::new(a.x, 0.0, a.z);
        let fb = DVec3::new(b.x, 0.0, b.z);
        let c = closest_on_segment(flat, fa, fb);
        let d = c.distance_squared(flat);
        if d < best_d {
            best_d = d;
            let t = if fa.distance_squared(fb) <= EPS * EPS { 0.0 } else { (c - fa).length() / (fb - fa).length() };
            best = a.lerp(b, t);
        }
    }
    best
}

#[inline]
pub fn triangle_centroid(tri: &[DVec3; 3]) -> DVec3 {
    (tri[0] + tri[1] + tri[2]) / 3.0
}

/// True when `p` lies on the infinite line through `a` and `b`.
pub fn is_colinear(a: DVec3, b: DVec3, p: DVec3) -> bool {
    let ab = b - a;
    let ap = p - a;
    let scale = ab.length_squared().max(ap.length_squared()).max(1.0);
    ab.cross(ap).length_squared() <= 1e-12 * scale * scale
}

/// Parameter `t` along `a + t * (b - a)` where it crosses segment `c-d` in XZ,
/// together with the parameter `u` along `c-d`. `None` when parallel.
pub fn segment_intersection_xz(a: DVec2, b: DVec2, c: DVec2, d: DVec2) -> Option<(f64, f64)> {
    let r = b - a;
    let s = d - c;
    let denom = r.perp_dot(s);
    if denom.abs() <= EPS {
        return None;
    }
    let t = (c - a).perp_dot(s) / denom;
    let u = (c - a).perp_dot(r) / denom;
    Some((t, u))
}
