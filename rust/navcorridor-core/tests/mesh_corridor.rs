use navcorridor_core::glam::DVec3;
use navcorridor_core::{NavGraph, NavWorld, NodeId, PathPart, PathTracer, RepairQuality, RepairStatus, TracerSettings};

fn v(x: f64, z: f64) -> DVec3 {
    DVec3::new(x, 0.0, z)
}

fn close(a: DVec3, b: DVec3) -> bool {
    a.distance(b) < 1e-6
}

/// A 1-wide strip of `squares` unit squares along +x, two triangles each.
/// Square `i` has its lower triangle at node `2i` and its upper one at `2i + 1`.
/// Returns the world and the corridor from the upper left to the lower right
/// triangle.
fn strip(squares: u32) -> (NavWorld, Vec<NodeId>) {
    let mut verts = Vec::new();
    for i in 0..=squares {
        verts.push(v(i as f64, 0.0));
        verts.push(v(i as f64, 1.0));
    }
    let b = |i: u32| 2 * i;
    let t = |i: u32| 2 * i + 1;
    let mut tris = Vec::new();
    for i in 0..squares {
        tris.push([b(i), b(i + 1), t(i + 1)]);
        tris.push([b(i), t(i + 1), t(i)]);
    }
    let mut world = NavWorld::new();
    world.add_trimesh(&verts, &tris);
    let path = (0..squares).flat_map(|i| [2 * i + 1, 2 * i]).collect();
    (world, path)
}

fn load(world: &NavWorld, path: &[NodeId], start: DVec3, end: DVec3, settings: &TracerSettings) -> PathTracer {
    let mut tracer: PathTracer = PathTracer::default();
    let parts = [PathPart::sequence(0, path.len() as isize - 1, start, end)];
    tracer.set_path(world, &parts, path, start, end, settings).unwrap();
    tracer
}

#[test]
fn straight_strip_has_no_corners() {
    let (world, path) = strip(5);
    let mut tracer = load(&world, &path, v(0.2, 0.5), v(4.8, 0.5), &TracerSettings::default());
    assert_eq!(tracer.portal_count(), path.len() - 1);
    let mut out = Vec::new();
    assert!(tracer.get_next_corners(&world, 10, &mut out));
    assert_eq!(out.len(), 2);
    assert!(close(out[0], v(0.2, 0.5)));
    assert!(close(out[1], v(4.8, 0.5)));
    assert!(!tracer.is_stale());
}

#[test]
fn repeated_queries_do_not_change_the_corridor() {
    let (world, path) = strip(5);
    let mut tracer = load(&world, &path, v(0.2, 0.5), v(4.8, 0.5), &TracerSettings::default());
    let mut first = Vec::new();
    tracer.get_next_corners(&world, 10, &mut first);
    let version = tracer.version();

    let clamped = tracer.update_start(&world, v(0.2, 0.5), RepairQuality::Low);
    assert!(close(clamped, v(0.2, 0.5)));
    let mut second = Vec::new();
    tracer.get_next_corners(&world, 10, &mut second);
    assert_eq!(first, second);
    assert_eq!(tracer.version(), version);
}

#[test]
fn moving_start_forward_drops_passed_nodes() {
    let (world, path) = strip(5);
    let mut tracer = load(&world, &path, v(0.2, 0.5), v(4.8, 0.5), &TracerSettings::default());
    let clamped = tracer.update_start(&world, v(1.6, 0.3), RepairQuality::Low);
    assert!(close(clamped, v(1.6, 0.3)));
    assert_eq!(tracer.start_status(), RepairStatus::Repaired);
    assert_eq!(tracer.nodes().next(), Some(2));
    assert_eq!(tracer.node_count(), path.len() - 3);
    assert_eq!(tracer.portal_count(), tracer.node_count() - 1);

    let mut out = Vec::new();
    assert!(tracer.get_next_corners(&world, 10, &mut out));
    assert_eq!(out.len(), 2);
    assert!(!tracer.is_stale());
}

#[test]
fn moving_end_back_drops_trailing_nodes() {
    let (world, path) = strip(5);
    let mut tracer = load(&world, &path, v(0.2, 0.5), v(4.8, 0.5), &TracerSettings::default());
    let clamped = tracer.update_end(&world, v(3.6, 0.3), RepairQuality::High);
    assert!(close(clamped, v(3.6, 0.3)));
    assert_eq!(tracer.end_status(), RepairStatus::Repaired);
    assert_eq!(tracer.nodes().last(), Some(6));
    assert!(close(tracer.end_point(), v(3.6, 0.3)));
    assert_eq!(tracer.portal_count(), tracer.node_count() - 1);
}

#[test]
fn moving_start_outside_the_mesh_is_clamped() {
    let (world, path) = strip(3);
    let mut tracer = load(&world, &path, v(0.2, 0.5), v(2.8, 0.5), &TracerSettings::default());
    let clamped = tracer.update_start(&world, v(0.5, 1.5), RepairQuality::Low);
    assert!((clamped.z - 1.0).abs() < 1e-6);
    assert!(!tracer.start_up_to_date());
    assert!(tracer.is_stale());
}

#[test]
fn destroyed_corridor_node_marks_path_stale() {
    let (mut world, path) = strip(5);
    let mut tracer = load(&world, &path, v(0.2, 0.5), v(4.8, 0.5), &TracerSettings::default());
    world.destroy_node(4);
    let mut out = Vec::new();
    tracer.get_next_corners(&world, 10, &mut out);
    assert!(tracer.first_part_has_invalid_nodes());
    assert!(tracer.is_stale());
    assert!(close(out[0], v(0.2, 0.5)));
}

#[test]
fn destroyed_start_node_falls_back_to_nearest() {
    let (mut world, path) = strip(5);
    let mut tracer = load(&world, &path, v(0.2, 0.5), v(4.8, 0.5), &TracerSettings::default());
    world.destroy_node(1);
    let clamped = tracer.update_start(&world, v(0.2, 0.5), RepairQuality::Low);
    assert!(world.contains_point(0, clamped));
    assert_eq!(tracer.start_status(), RepairStatus::Stale);
    assert_eq!(tracer.nodes().collect::<Vec<_>>(), vec![0]);
    assert!(tracer.is_stale());

    let mut out = Vec::new();
    assert!(tracer.get_next_corners(&world, 4, &mut out));
    assert_eq!(out.len(), 2);
}

#[test]
fn tag_changes_keep_corridor_valid() {
    let (mut world, path) = strip(3);
    let mut tracer = load(&world, &path, v(0.2, 0.5), v(2.8, 0.5), &TracerSettings::default());
    world.set_tag(2, 3);
    let mut out = Vec::new();
    tracer.get_next_corners(&world, 4, &mut out);
    assert!(!tracer.is_stale());
    world.touch_node(2);
    tracer.get_next_corners(&world, 4, &mut out);
    assert!(tracer.is_stale());
}

/// Four triangles around the centre of a 2x2 square: bottom 0, right 1,
/// top 2, left 3.
fn pinwheel() -> NavWorld {
    let verts = [v(1.0, 1.0), v(0.0, 0.0), v(2.0, 0.0), v(2.0, 2.0), v(0.0, 2.0)];
    let mut world = NavWorld::new();
    world.add_trimesh(&verts, &[[0, 1, 2], [0, 2, 3], [0, 3, 4], [0, 4, 1]]);
    world
}

#[test]
fn detour_around_inner_vertex_is_reported_without_simplification() {
    let world = pinwheel();
    let settings = TracerSettings { simplify_corridor: false, ..TracerSettings::default() };
    let mut tracer = load(&world, &[3, 2, 1], v(0.3, 0.9), v(1.7, 0.9), &settings);
    let mut out = Vec::new();
    assert!(tracer.get_next_corners(&world, 8, &mut out));
    assert_eq!(out.len(), 3);
    assert!(close(out[1], v(1.0, 1.0)));
}

#[test]
fn inner_vertex_detour_is_replaced_by_the_other_fan() {
    let world = pinwheel();
    let mut tracer = load(&world, &[3, 2, 1], v(0.3, 0.9), v(1.7, 0.9), &TracerSettings::default());
    let mut out = Vec::new();
    assert!(tracer.get_next_corners(&world, 8, &mut out));
    assert_eq!(tracer.first_part_nodes().collect::<Vec<_>>(), vec![3, 0, 1]);
    assert_eq!(out.len(), 2);
    assert_eq!(tracer.portal_count(), 2);
}

#[test]
fn inner_vertex_next_to_blocked_triangle_is_kept() {
    let mut world = pinwheel();
    world.set_walkable(0, false);
    let mut tracer = load(&world, &[3, 2, 1], v(0.3, 0.9), v(1.7, 0.9), &TracerSettings::default());
    let mut out = Vec::new();
    tracer.get_next_corners(&world, 8, &mut out);
    assert_eq!(tracer.first_part_nodes().collect::<Vec<_>>(), vec![3, 2, 1]);
    assert_eq!(out.len(), 3);
}

#[test]
fn corner_budget_stops_early() {
    let world = pinwheel();
    let settings = TracerSettings { simplify_corridor: false, ..TracerSettings::default() };
    let mut tracer = load(&world, &[3, 2, 1], v(0.3, 0.9), v(1.7, 0.9), &settings);
    let mut out = Vec::new();
    assert!(!tracer.get_next_corners(&world, 2, &mut out));
    assert_eq!(out.len(), 2);
    assert!(close(out[1], v(1.0, 1.0)));
}

#[test]
#[should_panic]
fn corner_budget_below_two_panics() {
    let world = pinwheel();
    let mut tracer = load(&world, &[3, 2, 1], v(0.3, 0.9), v(1.7, 0.9), &TracerSettings::default());
    let mut out = Vec::new();
    tracer.get_next_corners(&world, 1, &mut out);
}

#[test]
fn destroyed_node_is_seen_by_the_next_start_update() {
    let (mut world, path) = strip(3);
    let path = &path[..5];
    let mut tracer = load(&world, path, v(0.2, 0.8), v(2.5, 0.9), &TracerSettings::default());
    let mut out = Vec::new();
    assert!(tracer.get_next_corners(&world, 10, &mut out));
    assert_eq!(out.len(), 2);

    world.destroy_node(path[2]);
    let clamped = tracer.update_start(&world, v(0.25, 0.75), RepairQuality::Low);
    assert!(close(clamped, v(0.25, 0.75)));
    assert!(tracer.is_stale());
    assert!(tracer.first_part_has_invalid_nodes());
}

#[test]
fn repeated_end_updates_are_idempotent() {
    let (world, path) = strip(5);
    let mut tracer = load(&world, &path, v(0.2, 0.5), v(4.8, 0.5), &TracerSettings::default());
    let first = tracer.update_end(&world, v(3.6, 0.3), RepairQuality::Low);
    let version = tracer.version();
    let nodes: Vec<NodeId> = tracer.nodes().collect();

    let second = tracer.update_end(&world, v(3.6, 0.3), RepairQuality::Low);
    assert_eq!(first, second);
    assert_eq!(tracer.version(), version);
    assert_eq!(tracer.nodes().collect::<Vec<_>>(), nodes);
}

#[test]
fn destroyed_end_nodes_are_trimmed_and_end_clamped() {
    let (mut world, path) = strip(4);
    let mut tracer = load(&world, &path, v(0.2, 0.8), v(3.8, 0.2), &TracerSettings::default());
    world.destroy_node(6);
    world.destroy_node(7);

    let clamped = tracer.update_end(&world, v(3.5, 1.7), RepairQuality::High);
    assert!(close(clamped, v(3.0, 1.0)), "clamped to {clamped:?}");
    assert!(tracer.nodes().all(|n| n != 6 && n != 7));
    assert_eq!(tracer.end_status(), RepairStatus::Stale);
    assert!(!tracer.end_up_to_date());
    assert!(tracer.is_stale());
    assert_eq!(tracer.portal_count(), tracer.node_count() - 1);

    let version = tracer.version();
    assert_eq!(tracer.update_end(&world, v(3.5, 1.7), RepairQuality::High), clamped);
    assert_eq!(tracer.version(), version);

    let mut out = Vec::new();
    assert!(tracer.get_next_corners(&world, 10, &mut out));
    assert!(close(*out.last().unwrap(), v(3.0, 1.0)));
}

#[test]
fn end_without_live_corridor_node_clamps_to_nearest() {
    let (mut world, path) = strip(2);
    let mut tracer = load(&world, &path[..2], v(0.2, 0.8), v(0.8, 0.2), &TracerSettings::default());
    world.destroy_node(0);
    world.destroy_node(1);

    let clamped = tracer.update_end(&world, v(1.5, 1.4), RepairQuality::Low);
    assert!(close(clamped, v(1.5, 1.0)), "clamped to {clamped:?}");
    assert!(close(tracer.end_point(), clamped));
    assert_eq!(tracer.end_status(), RepairStatus::Stale);
    assert!(!tracer.end_up_to_date());
    assert!(tracer.is_stale());
}

#[test]
fn vertex_fan_walk_gives_up_at_the_iteration_cap() {
    let world = pinwheel();
    let settings = TracerSettings { max_fan_iterations: 1, ..TracerSettings::default() };
    let mut tracer = load(&world, &[3, 2, 1], v(0.3, 0.9), v(1.7, 0.9), &settings);
    let version = tracer.version();
    let mut out = Vec::new();
    assert!(tracer.get_next_corners(&world, 8, &mut out));
    assert_eq!(tracer.first_part_nodes().collect::<Vec<_>>(), vec![3, 2, 1]);
    assert_eq!(tracer.version(), version);
    assert_eq!(out.len(), 3);
}
