use navcorridor_core::glam::DVec3;
use navcorridor_core::{
    CostModel, NavGraph, NavWorld, NodeId, NodeInfo, PathPart, PathTracer, RepairQuality, RepairStatus, TracerSettings,
    TraversalCost,
};

fn v(x: f64, z: f64) -> DVec3 {
    DVec3::new(x, 0.0, z)
}

fn close(a: DVec3, b: DVec3) -> bool {
    a.distance(b) < 1e-6
}

/// Open 5x3 grid of unit cells; node id is `z * 5 + x`.
fn open_grid() -> NavWorld {
    let mut world = NavWorld::new();
    world.add_grid(DVec3::ZERO, 1.0, 5, 3, false, |_, _| true);
    world
}

/// Up one row, along it and back down: (0,0) (0,1) (1,1) .. (4,1) (4,0).
const DETOUR: [NodeId; 7] = [0, 5, 6, 7, 8, 9, 4];
const ROW: [NodeId; 5] = [0, 1, 2, 3, 4];

fn load<T: TraversalCost>(tracer: &mut PathTracer<T>, world: &NavWorld, path: &[NodeId], settings: &TracerSettings) {
    let (start, end) = (v(0.5, 0.5), v(4.5, 0.5));
    let parts = [PathPart::sequence(0, path.len() as isize - 1, start, end)];
    tracer.set_path(world, &parts, path, start, end, settings).unwrap();
}

#[test]
fn l_turn_bends_at_the_shared_corner() {
    let world = open_grid();
    let mut tracer: PathTracer = PathTracer::default();
    let path = [0, 1, 2, 7];
    let parts = [PathPart::sequence(0, 3, v(0.5, 0.5), v(2.5, 1.5))];
    let settings = TracerSettings { simplify_corridor: false, ..TracerSettings::default() };
    tracer.set_path(&world, &parts, &path, v(0.5, 0.5), v(2.5, 1.5), &settings).unwrap();
    let mut out = Vec::new();
    assert!(tracer.get_next_corners(&world, 8, &mut out));
    assert_eq!(out.len(), 3);
    assert!(close(out[1], v(2.0, 1.0)));
}

#[test]
fn diagonal_steps_are_expanded_on_load() {
    let mut world = NavWorld::new();
    world.add_grid(DVec3::ZERO, 1.0, 3, 3, true, |_, _| true);
    let mut tracer: PathTracer = PathTracer::default();
    let parts = [PathPart::sequence(0, 2, v(0.5, 0.5), v(2.5, 2.5))];
    tracer.set_path(&world, &parts, &[0, 4, 8], v(0.5, 0.5), v(2.5, 2.5), &TracerSettings::default()).unwrap();
    assert_eq!(tracer.node_count(), 5);
    let nodes: Vec<NodeId> = tracer.nodes().collect();
    for w in nodes.windows(2) {
        assert!(!world.portal(w[0], w[1]).unwrap().is_degenerate());
    }
}

#[test]
fn detour_converges_to_straight_row() {
    let world = open_grid();
    let mut tracer: PathTracer = PathTracer::default();
    load(&mut tracer, &world, &DETOUR, &TracerSettings::default());
    let cost = CostModel::default();
    let mut last_cost = cost.path_cost(&world, &DETOUR);
    let mut out = Vec::new();
    for _ in 0..10 {
        tracer.get_next_corners(&world, 8, &mut out);
        let nodes: Vec<NodeId> = tracer.first_part_nodes().collect();
        let now = cost.path_cost(&world, &nodes);
        assert!(now <= last_cost);
        last_cost = now;
        for w in nodes.windows(2) {
            assert!(world.portal(w[0], w[1]).is_some());
        }
    }
    assert_eq!(tracer.first_part_nodes().collect::<Vec<_>>(), ROW.to_vec());
    assert_eq!(out.len(), 2);
    assert!(close(out[0], v(0.5, 0.5)));
    assert!(close(out[1], v(4.5, 0.5)));
}

#[test]
fn disabled_simplification_keeps_detour() {
    let world = open_grid();
    let mut tracer: PathTracer = PathTracer::default();
    let settings = TracerSettings { simplify_corridor: false, ..TracerSettings::default() };
    load(&mut tracer, &world, &DETOUR, &settings);
    let mut out = Vec::new();
    for _ in 0..5 {
        tracer.get_next_corners(&world, 8, &mut out);
    }
    assert_eq!(tracer.first_part_nodes().collect::<Vec<_>>(), DETOUR.to_vec());
    assert!(out.len() >= 4);
    assert!(close(out[1], v(1.0, 1.0)));
    assert!(close(out[out.len() - 2], v(4.0, 1.0)));
}

#[test]
fn penalised_cells_are_not_shortcut_through() {
    let mut world = open_grid();
    for n in 1..=3 {
        world.set_tag(n, 1);
    }
    let cost = CostModel::default().with_tag_penalty(1, 50_000);
    let mut tracer = PathTracer::new(cost.clone());
    load(&mut tracer, &world, &DETOUR, &TracerSettings::default());
    let initial = cost.path_cost(&world, &DETOUR);
    let mut out = Vec::new();
    for _ in 0..10 {
        tracer.get_next_corners(&world, 8, &mut out);
    }
    let nodes: Vec<NodeId> = tracer.first_part_nodes().collect();
    assert!(cost.path_cost(&world, &nodes) <= initial);
    assert!(nodes.iter().all(|n| !(1..=3).contains(n)));
}

/// Refuses tagged cells outright and charges one unit per step.
struct AvoidTagged;

impl TraversalCost for AvoidTagged {
    fn can_traverse(&self, info: &NodeInfo) -> bool {
        info.walkable && info.tag == 0
    }

    fn cost<G: NavGraph + ?Sized>(&self, _graph: &G, _from: NodeId, _to: NodeId, _to_info: &NodeInfo) -> u32 {
        1
    }
}

#[test]
fn custom_cost_filters_shortcuts() {
    let mut world = open_grid();
    world.set_tag(2, 9);
    let mut tracer = PathTracer::new(AvoidTagged);
    load(&mut tracer, &world, &DETOUR, &TracerSettings::default());
    let mut out = Vec::new();
    for _ in 0..10 {
        tracer.get_next_corners(&world, 8, &mut out);
    }
    let nodes: Vec<NodeId> = tracer.first_part_nodes().collect();
    assert!(!nodes.contains(&2));
    assert!(nodes.len() <= DETOUR.len());
    assert_eq!(nodes.first(), Some(&0));
    assert_eq!(nodes.last(), Some(&4));
}

#[test]
fn blocked_start_cell_falls_back_to_nearest_open_cell() {
    let mut world = open_grid();
    let mut tracer: PathTracer = PathTracer::default();
    let settings = TracerSettings { simplify_corridor: false, ..TracerSettings::default() };
    load(&mut tracer, &world, &ROW, &settings);
    world.set_walkable(0, false);

    let clamped = tracer.update_start(&world, v(0.5, 1.5), RepairQuality::High);
    assert!(world.contains_point(5, clamped));
    assert_eq!(tracer.nodes().collect::<Vec<_>>(), vec![5]);
    assert_eq!(tracer.start_status(), RepairStatus::Stale);
    assert!(tracer.is_stale());
}

#[test]
fn agent_walking_the_row_keeps_corridor_short() {
    let world = open_grid();
    let mut tracer: PathTracer = PathTracer::default();
    load(&mut tracer, &world, &ROW, &TracerSettings::default());
    let mut out = Vec::new();
    for step in 1..=8 {
        let p = v(0.3 + step as f64 * 0.5, 0.5);
        let clamped = tracer.update_start(&world, p, RepairQuality::Low);
        assert!(close(clamped, p));
        assert!(tracer.get_next_corners(&world, 4, &mut out));
        assert_eq!(out.len(), 2);
        assert!(!tracer.is_stale());
    }
    assert_eq!(tracer.nodes().collect::<Vec<_>>(), vec![4]);
    assert_eq!(tracer.portal_count(), 0);
}

/// xorshift64; enough to scatter tags without pulling in a generator crate.
fn scramble(state: &mut u64) -> u64 {
    *state ^= *state << 13;
    *state ^= *state >> 7;
    *state ^= *state << 17;
    *state
}

#[test]
fn simplification_never_raises_cost_under_scattered_penalties() {
    for seed in 1..=32u64 {
        let mut state = seed.wrapping_mul(0x9E37_79B9_7F4A_7C15);
        let mut world = open_grid();
        for n in 0..15 {
            world.set_tag(n, (scramble(&mut state) % 4) as u8);
        }
        let mut cost = CostModel::default();
        for tag in 1..4u8 {
            cost = cost.with_tag_penalty(tag, (scramble(&mut state) % 3000) as u32);
        }
        let mut tracer = PathTracer::new(cost.clone());
        load(&mut tracer, &world, &DETOUR, &TracerSettings::default());

        let mut out = Vec::new();
        let mut before = cost.path_cost(&world, &tracer.first_part_nodes().collect::<Vec<_>>());
        for _ in 0..8 {
            tracer.get_next_corners(&world, 4, &mut out);
            let after = cost.path_cost(&world, &tracer.first_part_nodes().collect::<Vec<_>>());
            assert!(after <= before, "seed {seed}: cost rose from {before} to {after}");
            before = after;
        }
    }
}
