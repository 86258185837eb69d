use navcorridor_core::glam::DVec3;
use navcorridor_core::{NavWorld, NodeId, PartKind, PathError, PathPart, PathTracer, RepairQuality, TracerSettings};

fn v(x: f64, z: f64) -> DVec3 {
    DVec3::new(x, 0.0, z)
}

fn close(a: DVec3, b: DVec3) -> bool {
    a.distance(b) < 1e-6
}

struct Scene {
    world: NavWorld,
    nodes: Vec<NodeId>,
    parts: Vec<PathPart>,
}

/// A unit square mesh (nodes 0 and 1) linked to a 2x1 grid at x = 5
/// (nodes 2 and 3).
fn scene() -> Scene {
    let mut world = NavWorld::new();
    let mesh = world.add_trimesh(&[v(0.0, 0.0), v(1.0, 0.0), v(1.0, 1.0), v(0.0, 1.0)], &[[0, 1, 2], [0, 2, 3]]);
    let grid = world.add_grid(v(5.0, 0.0), 1.0, 2, 1, false, |_, _| true);
    let (a, b) = world.add_link(mesh.first_node, v(0.8, 0.2), grid.first_node, v(5.5, 0.5));
    let nodes = vec![1, 0, a, b, 2, 3];
    let parts = vec![
        PathPart::sequence(0, 1, v(0.2, 0.8), v(0.8, 0.2)),
        PathPart::link(2, v(0.8, 0.2), v(5.5, 0.5)),
        PathPart::sequence(4, 5, v(5.5, 0.5), v(6.5, 0.5)),
    ];
    Scene { world, nodes, parts }
}

fn load(s: &Scene) -> PathTracer {
    let mut tracer: PathTracer = PathTracer::default();
    tracer
        .set_path(&s.world, &s.parts, &s.nodes, v(0.2, 0.8), v(6.5, 0.5), &TracerSettings::default())
        .unwrap();
    tracer
}

#[test]
fn corners_stop_at_the_link() {
    let s = scene();
    let mut tracer = load(&s);
    assert_eq!(tracer.part_count(), 3);
    assert_eq!(tracer.get_part_type(1), PartKind::OffMeshLink);
    assert_eq!(tracer.portal_count(), 1);

    let mut out = Vec::new();
    assert!(tracer.get_next_corners(&s.world, 8, &mut out));
    assert!(close(out[0], v(0.2, 0.8)));
    assert!(close(*out.last().unwrap(), v(0.8, 0.2)));
    assert!(close(tracer.end_point(), v(6.5, 0.5)));
}

#[test]
fn popping_the_link_promotes_the_grid_part() {
    let s = scene();
    let mut tracer = load(&s);
    tracer.pop_parts(&s.world, 2);
    assert_eq!(tracer.part_count(), 1);
    assert_eq!(tracer.get_part_type(0), PartKind::NodeSequence);
    assert_eq!(tracer.nodes().collect::<Vec<_>>(), vec![2, 3]);
    assert_eq!(tracer.portal_count(), 1);

    let mut out = Vec::new();
    assert!(tracer.get_next_corners(&s.world, 8, &mut out));
    assert_eq!(out.len(), 2);
    assert!(close(out[0], v(5.5, 0.5)));
    assert!(close(out[1], v(6.5, 0.5)));
    assert!(!tracer.is_stale());
}

#[test]
fn end_moves_within_the_last_part() {
    let s = scene();
    let mut tracer = load(&s);
    let clamped = tracer.update_end(&s.world, v(5.6, 0.4), RepairQuality::Low);
    assert!(close(clamped, v(5.6, 0.4)));
    assert_eq!(tracer.nodes().last(), Some(2));
    assert_eq!(tracer.portal_count(), 1);
    assert!(close(tracer.part(2).unwrap().end_point, v(5.6, 0.4)));
}

#[test]
fn destroyed_later_part_does_not_invalidate_first_part() {
    let mut s = scene();
    let mut tracer = load(&s);
    s.world.destroy_node(3);
    let mut out = Vec::new();
    tracer.get_next_corners(&s.world, 8, &mut out);
    assert!(!tracer.first_part_has_invalid_nodes());
    tracer.update_end(&s.world, v(6.5, 0.5), RepairQuality::Low);
    assert!(tracer.is_stale());
}

#[test]
#[should_panic]
fn popping_onto_a_link_panics() {
    let s = scene();
    let mut tracer = load(&s);
    tracer.pop_parts(&s.world, 1);
}

#[test]
fn malformed_link_parts_are_rejected() {
    let s = scene();
    let mut tracer: PathTracer = PathTracer::default();
    let mut parts = s.parts.clone();
    parts[1].end_index = 3;
    parts[1].start_index = 1;
    parts[0].end_index = 0;
    let err = tracer
        .set_path(&s.world, &parts, &s.nodes, v(0.2, 0.8), v(6.5, 0.5), &TracerSettings::default())
        .unwrap_err();
    assert_eq!(err, PathError::LinkPartBounds { part: 1 });
    assert_eq!(tracer.part_count(), 0);
}
