//! K3 – world update: deterministic summary for the oracle and arbiter.
//!
//! Pulls zones and obstacles from the [`WorldSource`] and renders an English
//! one-line summary.  The rendering is a pure function of its inputs so that
//! identical worlds always produce identical prompts.

use brainstem_skills::zones;
use brainstem_types::BrainState;

use crate::sources::WorldSource;

/// How close the robot must be to a zone reference point to be "in" it.
const ZONE_RADIUS_M: f64 = 2.5;

/// At most this many obstacles are named in the summary.
const MAX_OBSTACLES_IN_SUMMARY: usize = 3;

/// K3 node.  Writes `world`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WorldUpdate;

impl WorldUpdate {
    pub fn new() -> Self {
        Self
    }

    pub fn run(&self, mut state: BrainState, source: &dyn WorldSource) -> BrainState {
        let zone_names = source.zones();
        let obstacles = source.obstacles();
        let summary = Self::render_summary(&state, source, &zone_names, &obstacles);

        state.trace(format!(
            "[world_update] zones={} obstacles={}",
            zone_names.len(),
            obstacles.len()
        ));
        state.world.zones = zone_names;
        state.world.obstacles = obstacles;
        state.world.summary = summary;
        state
    }

    fn render_summary(
        state: &BrainState,
        source: &dyn WorldSource,
        zone_names: &[String],
        obstacles: &[brainstem_types::Obstacle],
    ) -> String {
        let mut parts = Vec::new();

        let pose = &state.robot.pose;
        match zones::zone_at(pose.x, pose.y, ZONE_RADIUS_M) {
            Some(zone) => parts.push(format!("robot is in {zone}")),
            None => parts.push(format!("robot is at ({:.1}, {:.1})", pose.x, pose.y)),
        }

        let accessible: Vec<&str> = zone_names
            .iter()
            .filter(|z| source.zone_accessible(z))
            .map(String::as_str)
            .collect();
        if !accessible.is_empty() {
            parts.push(format!("reachable zones: {}", accessible.join(", ")));
        }

        if !obstacles.is_empty() {
            let described: Vec<String> = obstacles
                .iter()
                .take(MAX_OBSTACLES_IN_SUMMARY)
                .map(|o| format!("{}@({:.1}, {:.1})", o.kind, o.x, o.y))
                .collect();
            parts.push(format!("obstacles: {}", described.join(", ")));
        }

        if let Some(task) = state.tasks.active_task() {
            parts.push(format!("active task: {}", task.goal));
            if state.robot.distance_to_target > 0.0 {
                parts.push(format!(
                    "distance to target: {:.1}m",
                    state.robot.distance_to_target
                ));
            }
        }

        parts.join("; ")
    }
}
