//! Frame loop: apply scheduled world events, move the corridor start to the
//! agent, replan when the corridor went stale, then walk the agent along the
//! next corners.

use navcorridor_core::glam::DVec3;
use navcorridor_core::{CostModel, PartKind, PathTracer, RepairQuality, RepairStatus, TracerSettings};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::planner::{PlanError, Planner, DEFAULT_MAX_EXPANSIONS};
use crate::scenario::Scenario;

const ARRIVAL_EPS: f64 = 1e-6;

#[derive(Clone, Debug)]
pub struct SimOptions {
    pub frames: u32,
    /// World units per frame.
    pub speed: f64,
    pub max_corners: usize,
    pub quality: RepairQuality,
    pub max_expansions: u64,
}

impl Default for SimOptions {
    fn default() -> Self {
        Self { frames: 120, speed: 0.25, max_corners: 4, quality: RepairQuality::Low, max_expansions: DEFAULT_MAX_EXPANSIONS }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct FrameReport {
    pub frame: u32,
    pub position: [f64; 3],
    pub corners: Vec<[f64; 3]>,
    pub corners_reach_part_end: bool,
    pub stale: bool,
    pub replanned: bool,
    pub crossed_link: bool,
    pub arrived: bool,
    pub start_status: RepairStatus,
    pub end_status: RepairStatus,
    pub parts: usize,
    pub nodes: usize,
    pub version: u64,
}

pub struct Simulation {
    scenario: Scenario,
    cost: CostModel,
    settings: TracerSettings,
    options: SimOptions,
    tracer: PathTracer,
    position: DVec3,
    frame: u32,
    replans: u32,
    corners: Vec<DVec3>,
}

impl Simulation {
    pub fn new(scenario: Scenario, settings: TracerSettings, options: SimOptions) -> Result<Self, PlanError> {
        let cost = CostModel::default();
        let position = scenario.start;
        let mut sim = Self {
            scenario,
            tracer: PathTracer::new(cost.clone()),
            cost,
            settings,
            options,
            position,
            frame: 0,
            replans: 0,
            corners: Vec::new(),
        };
        sim.replan()?;
        Ok(sim)
    }

    pub fn tracer(&self) -> &PathTracer {
        &self.tracer
    }

    pub fn position(&self) -> DVec3 {
        self.position
    }

    pub fn replans(&self) -> u32 {
        self.replans
    }

    fn replan(&mut self) -> Result<(), PlanError> {
        let plan = Planner::new(&self.scenario.world, &self.cost)
            .with_max_expansions(self.options.max_expansions)
            .find_path(self.position, self.scenario.goal)?;
        // Parts come straight from the planner, so they are well formed.
        if let Err(e) = self.tracer.set_path(&self.scenario.world, &plan.parts, &plan.nodes, plan.start, plan.goal, &self.settings) {
            warn!(error = %e, "planner_produced_malformed_parts");
        }
        debug!(nodes = plan.nodes.len(), parts = plan.parts.len(), cost = plan.cost, "corridor_replanned");
        Ok(())
    }

    /// Advances one frame.
    pub fn step(&mut self) -> FrameReport {
        let frame = self.frame;
        self.frame += 1;
        let events: Vec<_> = self.scenario.events_at(frame).copied().collect();
        for e in &events {
            e.apply(&mut self.scenario.world);
        }

        let world = &self.scenario.world;
        self.position = self.tracer.update_start(world, self.position, self.options.quality);
        let mut replanned = false;
        if self.tracer.is_stale() {
            match self.replan() {
                Ok(()) => {
                    replanned = true;
                    self.replans += 1;
                }
                Err(e) => warn!(frame, error = %e, "replan_failed"),
            }
        }

        let mut corners = std::mem::take(&mut self.corners);
        let reaches_end = self.tracer.get_next_corners(&self.scenario.world, self.options.max_corners, &mut corners);
        let reached_last = self.walk(&corners, reaches_end);

        let mut crossed_link = false;
        if reached_last && self.tracer.part_count() > 2 && self.tracer.get_part_type(1) == PartKind::OffMeshLink {
            if let Some(link) = self.tracer.part(1) {
                self.position = link.end_point;
            }
            self.tracer.pop_parts(&self.scenario.world, 2);
            crossed_link = true;
            debug!(frame, position = ?self.position, "off_mesh_link_crossed");
        }
        let arrived = reached_last && self.tracer.part_count() == 1 && self.position.distance(self.tracer.end_point()) <= ARRIVAL_EPS;

        let report = FrameReport {
            frame,
            position: self.position.to_array(),
            corners: corners.iter().map(|c| c.to_array()).collect(),
            corners_reach_part_end: reaches_end,
            stale: self.tracer.is_stale(),
            replanned,
            crossed_link,
            arrived,
            start_status: self.tracer.start_status(),
            end_status: self.tracer.end_status(),
            parts: self.tracer.part_count(),
            nodes: self.tracer.node_count(),
            version: self.tracer.version(),
        };
        self.corners = corners;
        report
    }

    /// Moves the agent along `corners` by one frame of travel. Returns true
    /// when it stands on the final corner of a list that reaches the part end.
    fn walk(&mut self, corners: &[DVec3], reaches_end: bool) -> bool {
        let mut budget = self.options.speed;
        for (i, &target) in corners.iter().enumerate().skip(1) {
            let d = self.position.distance(target);
            if d <= budget {
                self.position = target;
                budget -= d;
                if i + 1 == corners.len() {
                    return reaches_end;
                }
            } else {
                self.position += (target - self.position) / d * budget;
                return false;
            }
        }
        reaches_end && corners.len() <= 1
    }

    /// Runs until the agent arrives or the frame budget is spent.
    pub fn run(&mut self, mut on_frame: impl FnMut(&FrameReport)) -> Vec<FrameReport> {
        let mut reports = Vec::new();
        while self.frame < self.options.frames {
            let report = self.step();
            on_frame(&report);
            let arrived = report.arrived;
            reports.push(report);
            if arrived {
                break;
            }
        }
        let arrived = reports.last().map(|r| r.arrived).unwrap_or(false);
        info!(frames = reports.len(), arrived, replans = self.replans, kind = ?self.scenario.kind, "simulation_finished");
        reports
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::ScenarioKind;

    #[test]
    fn walk_stops_between_corners() {
        let scenario = Scenario::build(ScenarioKind::Strip);
        let options = SimOptions { speed: 1.0, ..SimOptions::default() };
        let mut sim = Simulation::new(scenario, TracerSettings::default(), options).unwrap();
        sim.position = DVec3::ZERO;
        let corners = [DVec3::ZERO, DVec3::new(0.5, 0.0, 0.0), DVec3::new(0.5, 0.0, 2.0)];
        assert!(!sim.walk(&corners, true));
        assert!((sim.position - DVec3::new(0.5, 0.0, 0.5)).length() < 1e-9);
        let rest = [sim.position, DVec3::new(0.5, 0.0, 1.0)];
        assert!(sim.walk(&rest, true));
        assert!((sim.position - rest[1]).length() < 1e-9);
        assert!(!sim.walk(&rest[1..], false));
    }
}
