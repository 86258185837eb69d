//! Funnel (string-pulling) over an incrementally maintained portal corridor.
//!
//! Portals are stored in world space and unwrapped lazily onto a flat plane:
//! each portal is placed relative to the previous unwrapped one using its
//! projected length along and signed distance across that portal. The funnel
//! itself only ever runs on unwrapped points, so corridors that bend in 3D
//! (ramps, stacked floors, curved worlds) still get valid 2D cross products.
//!
//! In unwrapped space the first portal runs from `left = (0, 0)` to
//! `right = (w, 0)` and the corridor advances towards `+y`.

use glam::{DVec2, DVec3};
use tracing::warn;

use crate::geometry::{is_colinear, EPS};
use crate::options::DEFAULT_MAX_FUNNEL_ITERATIONS_FACTOR;
use crate::ring_buffer::RingBuffer;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

/// A confirmed corner: the `side` endpoint of portal `index`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Corner {
    pub index: usize,
    pub side: Side,
}

#[derive(Clone, Debug)]
pub struct FunnelState {
    left: RingBuffer<DVec3>,
    right: RingBuffer<DVec3>,
    /// Prefix of the portals in unwrapped space; entry `i` belongs to portal `i`.
    unwrapped: RingBuffer<[DVec2; 2]>,
    projection_axis: Option<DVec3>,
    iteration_factor: u32,
}

impl Default for FunnelState {
    fn default() -> Self {
        Self::new()
    }
}

#[inline]
fn same2(a: DVec2, b: DVec2) -> bool {
    a.distance_squared(b) <= EPS * EPS
}

impl FunnelState {
    pub fn new() -> Self {
        Self {
            left: RingBuffer::with_capacity(16),
            right: RingBuffer::with_capacity(16),
            unwrapped: RingBuffer::with_capacity(16),
            projection_axis: None,
            iteration_factor: DEFAULT_MAX_FUNNEL_ITERATIONS_FACTOR,
        }
    }

    pub fn len(&self) -> usize {
        self.left.len()
    }

    pub fn is_empty(&self) -> bool {
        self.left.is_empty()
    }

    pub fn left(&self) -> &RingBuffer<DVec3> {
        &self.left
    }

    pub fn right(&self) -> &RingBuffer<DVec3> {
        &self.right
    }

    /// Number of portals currently cached in unwrapped form.
    pub fn unwrapped_len(&self) -> usize {
        self.unwrapped.len()
    }

    pub fn projection_axis(&self) -> Option<DVec3> {
        self.projection_axis
    }

    /// Changing the axis invalidates everything unwrapped so far.
    pub fn set_projection_axis(&mut self, axis: Option<DVec3>) {
        let axis = axis.and_then(|a| a.try_normalize());
        if axis != self.projection_axis {
            self.projection_axis = axis;
            self.unwrapped.clear();
        }
    }

    pub fn set_iteration_factor(&mut self, factor: u32) {
        self.iteration_factor = factor.max(1);
    }

    pub fn clear(&mut self) {
        self.left.clear();
        self.right.clear();
        self.unwrapped.clear();
    }

    pub fn push_end(&mut self, left: DVec3, right: DVec3) {
        self.left.push_end(left);
        self.right.push_end(right);
    }

    pub fn push_start(&mut self, left: DVec3, right: DVec3) {
        if !self.unwrapped.is_empty() {
            let [l0, r0] = self.unwrapped.get(0);
            let (wl, wr) = (self.left.get(0), self.right.get(0));
            let ul = self.unwrap_point(wl, wr, l0, r0, left, -1.0);
            let ur = self.unwrap_point(wl, wr, l0, r0, right, -1.0);
            self.unwrapped.push_start([ul, ur]);
        }
        self.left.push_start(left);
        self.right.push_start(right);
    }

    pub fn pop_start(&mut self) {
        self.left.pop_start();
        self.right.pop_start();
        self.unwrapped.pop_start();
    }

    pub fn pop_end(&mut self) {
        self.left.pop_end();
        self.right.pop_end();
        self.unwrapped.truncate(self.left.len());
    }

    /// Replaces `remove` portals starting at `start` with the given ones.
    #[track_caller]
    pub fn splice(&mut self, start: usize, remove: usize, left: &[DVec3], right: &[DVec3]) {
        assert_eq!(left.len(), right.len(), "portal sides must have the same length");
        self.left.splice(start, remove, left);
        self.right.splice(start, remove, right);
        self.unwrapped.truncate(start);
    }

    fn unwrap_point(&self, pl: DVec3, pr: DVec3, ul: DVec2, ur: DVec2, p: DVec3, side: f64) -> DVec2 {
        let d = pr - pl;
        let q = p - pl;
        let len_sq = d.length_squared();
        let d2 = ur - ul;
        let d2_len = d2.length();
        if len_sq <= EPS * EPS || d2_len <= EPS {
            // Zero width portal: place the point straight ahead or behind it.
            let dir = if d2_len <= EPS { DVec2::X } else { d2 / d2_len };
            return ul + dir.perp() * q.length() * side;
        }
        let proj = q.dot(d) / len_sq;
        let mut dist = (q - d * proj).length();
        match self.projection_axis {
            Some(axis) => {
                let s = q.cross(d).dot(axis);
                if s < 0.0 {
                    dist = -dist;
                }
            }
            // Unsigned is enough for triangles: each new vertex lies ahead of the portal before it.
            None => dist *= side,
        }
        ul + d2 * proj + d2.perp() / d2_len * dist
    }

    fn ensure_unwrapped(&mut self, upto: usize) {
        while self.unwrapped.len() <= upto {
            let i = self.unwrapped.len();
            let entry = if i == 0 {
                let w = self.left.get(0).distance(self.right.get(0));
                [DVec2::ZERO, DVec2::new(w, 0.0)]
            } else {
                let [ul, ur] = self.unwrapped.get(i - 1);
                let (pl, pr) = (self.left.get(i - 1), self.right.get(i - 1));
                [
                    self.unwrap_point(pl, pr, ul, ur, self.left.get(i), 1.0),
                    self.unwrap_point(pl, pr, ul, ur, self.right.get(i), 1.0),
                ]
            };
            self.unwrapped.push_end(entry);
        }
    }

    fn unwrap_relative(&mut self, index: usize, p: DVec3, side: f64) -> DVec2 {
        self.ensure_unwrapped(index);
        let [ul, ur] = self.unwrapped.get(index);
        self.unwrap_point(self.left.get(index), self.right.get(index), ul, ur, p, side)
    }

    pub fn corner_point(&self, corner: Corner) -> DVec3 {
        match corner.side {
            Side::Left => self.left.get(corner.index),
            Side::Right => self.right.get(corner.index),
        }
    }

    /// Runs the funnel from `start` through every portal to `end`, writing up
    /// to `max_corners` interior corners into `out`. Returns true when the end
    /// was reached with fewer corners than that.
    pub fn calculate_next_corner_indices(&mut self, max_corners: usize, start: DVec3, end: DVec3, out: &mut Vec<Corner>) -> bool {
        out.clear();
        let n = self.len();
        if n == 0 {
            return true;
        }
        if max_corners == 0 {
            return false;
        }

        let mut apex = self.unwrap_relative(0, start, -1.0);
        let mut pl = apex;
        let mut pr = apex;
        let mut li: isize = -1;
        let mut ri: isize = -1;
        let mut end2: Option<DVec2> = None;

        let guard = (n + 2) * (max_corners + 2) * self.iteration_factor as usize;
        let mut iterations = 0usize;
        let mut i = 0usize;
        while i <= n {
            iterations += 1;
            if iterations > guard {
                warn!(portals = n, max_corners, iterations, "funnel_iteration_cap");
                return false;
            }
            let (l, r) = if i < n {
                self.ensure_unwrapped(i);
                let [l, r] = self.unwrapped.get(i);
                (l, r)
            } else {
                let e = match end2 {
                    Some(e) => e,
                    None => {
                        let e = self.unwrap_relative(n - 1, end, 1.0);
                        end2 = Some(e);
                        e
                    }
                };
                (e, e)
            };

            if (pr - apex).perp_dot(r - apex) >= 0.0 {
                if same2(apex, pr) || same2(apex, pl) || (pl - apex).perp_dot(r - apex) <= 0.0 {
                    pr = r;
                    ri = i as isize;
                } else {
                    debug_assert!(li >= 0);
                    out.push(Corner { index: li as usize, side: Side::Left });
                    if out.len() >= max_corners {
                        return false;
                    }
                    apex = pl;
                    pr = apex;
                    ri = li;
                    i = (li + 1) as usize;
                    continue;
                }
            }

            if (pl - apex).perp_dot(l - apex) <= 0.0 {
                if same2(apex, pl) || same2(apex, pr) || (pr - apex).perp_dot(l - apex) >= 0.0 {
                    pl = l;
                    li = i as isize;
                } else {
                    debug_assert!(ri >= 0);
                    out.push(Corner { index: ri as usize, side: Side::Right });
                    if out.len() >= max_corners {
                        return false;
                    }
                    apex = pr;
                    pl = apex;
                    li = ri;
                    i = (ri + 1) as usize;
                    continue;
                }
            }
            i += 1;
        }
        true
    }

    /// True when `point` has already crossed the first portal, judged only
    /// by geometry. `end` is the reference when every later portal point is
    /// colinear with the first portal.
    pub fn is_reasonable_to_pop_start(&self, point: DVec3, end: DVec3) -> bool {
        if self.is_empty() {
            return false;
        }
        let (l, r) = (self.left.get(0), self.right.get(0));
        let reference = (1..self.len())
            .flat_map(|i| [self.left.get(i), self.right.get(i)])
            .find(|&p| !is_colinear(l, r, p))
            .unwrap_or(end);
        self.same_side_of_portal(l, r, reference, point)
    }

    /// Mirror of [`FunnelState::is_reasonable_to_pop_start`] for the last portal.
    pub fn is_reasonable_to_pop_end(&self, point: DVec3, start: DVec3) -> bool {
        if self.is_empty() {
            return false;
        }
        let last = self.len() - 1;
        let (l, r) = (self.left.get(last), self.right.get(last));
        let reference = (0..last)
            .rev()
            .flat_map(|i| [self.left.get(i), self.right.get(i)])
            .find(|&p| !is_colinear(l, r, p))
            .unwrap_or(start);
        self.same_side_of_portal(l, r, reference, point)
    }

    fn same_side_of_portal(&self, l: DVec3, r: DVec3, reference: DVec3, point: DVec3) -> bool {
        let d = r - l;
        if is_colinear(l, r, reference) || d.length_squared() <= EPS * EPS {
            return false;
        }
        let normal = self.projection_axis.unwrap_or_else(|| d.cross(reference - l));
        let ref_side = d.cross(reference - l).dot(normal);
        let point_side = d.cross(point - l).dot(normal);
        ref_side * point_side > EPS * EPS
    }
}
