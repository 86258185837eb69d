use clap::ValueEnum;
use navcorridor_core::glam::DVec3;
use navcorridor_core::{NavWorld, NodeId};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioKind {
    /// Triangle strip; one triangle ahead of the agent is re-tiled mid-run.
    Strip,
    /// Grid with a wall; the gap the agent heads for is blocked mid-run.
    Grid,
    /// Triangle mesh joined to a grid by an off-mesh link.
    Linked,
}

/// A graph mutation applied at the start of a frame.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorldEvent {
    Destroy(NodeId),
    SetWalkable(NodeId, bool),
    SetTag(NodeId, u8),
    Retile(NodeId),
}

impl WorldEvent {
    pub fn apply(&self, world: &mut NavWorld) {
        match *self {
            WorldEvent::Destroy(n) => world.destroy_node(n),
            WorldEvent::SetWalkable(n, walkable) => world.set_walkable(n, walkable),
            WorldEvent::SetTag(n, tag) => world.set_tag(n, tag),
            WorldEvent::Retile(n) => world.touch_node(n),
        }
        debug!(event = ?self, "world_event_applied");
    }
}

pub struct Scenario {
    pub kind: ScenarioKind,
    pub world: NavWorld,
    pub start: DVec3,
    pub goal: DVec3,
    /// `(frame, event)`, sorted by frame.
    pub events: Vec<(u32, WorldEvent)>,
}

impl Scenario {
    pub fn build(kind: ScenarioKind) -> Self {
        match kind {
            ScenarioKind::Strip => strip(),
            ScenarioKind::Grid => walled_grid(),
            ScenarioKind::Linked => linked(),
        }
    }

    /// Events scheduled for `frame`.
    pub fn events_at(&self, frame: u32) -> impl Iterator<Item = &WorldEvent> + '_ {
        self.events.iter().filter(move |(f, _)| *f == frame).map(|(_, e)| e)
    }
}

fn v(x: f64, z: f64) -> DVec3 {
    DVec3::new(x, 0.0, z)
}

/// Unit squares along +x, two triangles each; lower triangle of square `i`
/// is node `2i`, upper `2i + 1`.
fn strip_mesh(world: &mut NavWorld, squares: u32) {
    let mut verts = Vec::new();
    for i in 0..=squares {
        verts.push(v(i as f64, 0.0));
        verts.push(v(i as f64, 1.0));
    }
    let mut tris = Vec::new();
    for i in 0..squares {
        tris.push([2 * i, 2 * (i + 1), 2 * (i + 1) + 1]);
        tris.push([2 * i, 2 * (i + 1) + 1, 2 * i + 1]);
    }
    world.add_trimesh(&verts, &tris);
}

fn strip() -> Scenario {
    let mut world = NavWorld::new();
    strip_mesh(&mut world, 8);
    Scenario {
        kind: ScenarioKind::Strip,
        world,
        start: v(0.2, 0.5),
        goal: v(7.8, 0.5),
        events: vec![(4, WorldEvent::Retile(8))],
    }
}

/// 10x6 cells with a wall at x = 4 from z = 0 to 3. The agent starts in the
/// bottom left and heads for the bottom right; cell (4, 4) closes on frame 6.
fn walled_grid() -> Scenario {
    let mut world = NavWorld::new();
    let h = world.add_grid(DVec3::ZERO, 1.0, 10, 6, false, |x, z| !(x == 4 && z <= 3));
    let gap = h.first_node + 4 * 10 + 4;
    Scenario {
        kind: ScenarioKind::Grid,
        world,
        start: v(0.5, 0.5),
        goal: v(9.5, 0.5),
        events: vec![(6, WorldEvent::SetWalkable(gap, false))],
    }
}

/// A short strip whose far end is linked to a 3x1 grid further along +x.
fn linked() -> Scenario {
    let mut world = NavWorld::new();
    strip_mesh(&mut world, 2);
    let grid = world.add_grid(v(6.0, 0.0), 1.0, 3, 1, false, |_, _| true);
    // Lower triangle of the last square.
    world.add_link(2, v(1.8, 0.2), grid.first_node, v(6.5, 0.5));
    Scenario {
        kind: ScenarioKind::Linked,
        world,
        start: v(0.2, 0.8),
        goal: v(8.5, 0.5),
        events: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use navcorridor_core::NavGraph;

    #[test]
    fn scenarios_place_start_and_goal_on_walkable_nodes() {
        for kind in [ScenarioKind::Strip, ScenarioKind::Grid, ScenarioKind::Linked] {
            let s = Scenario::build(kind);
            let covers = |p: DVec3| {
                (0..s.world.node_count() as NodeId).any(|n| s.world.is_walkable(n) && s.world.contains_point(n, p))
            };
            assert!(covers(s.start), "{kind:?} start");
            assert!(covers(s.goal), "{kind:?} goal");
        }
    }

    #[test]
    fn events_apply_to_the_world() {
        let mut s = Scenario::build(ScenarioKind::Grid);
        let events: Vec<WorldEvent> = s.events_at(6).copied().collect();
        assert_eq!(events.len(), 1);
        for e in &events {
            e.apply(&mut s.world);
        }
        assert!(!s.world.is_walkable(44));
        assert_eq!(s.events_at(5).count(), 0);
    }
}
