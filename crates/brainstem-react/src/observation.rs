//! R1 – build the structured observation.
//!
//! Compresses world, robot, task, and skill state into the typed
//! [`Observation`] record the oracle reasons over, appends the rendered
//! form to the message log, and advances the iteration counter.

use brainstem_types::{
    BrainState, Message, Observation, RobotObservation, RunningBrief, SkillsObservation,
    TaskObservation, WorldObservation,
};

/// R1 node.  Writes `react.observation`, `react.iter`, `messages`.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuildObservation;

impl BuildObservation {
    pub fn new() -> Self {
        Self
    }

    pub fn run(&self, mut state: BrainState) -> BrainState {
        let iteration = state.react.iter + 1;
        let observation = Self::build(&state, iteration);
        let rendered = Self::render(&observation);

        state.react.iter = iteration;
        state.react.observation = observation;
        state.messages.push(Message::observation(rendered));
        state.trace(format!("[build_observation] iter={iteration}"));
        state
    }

    fn build(state: &BrainState, iteration: u32) -> Observation {
        let risk_count = state
            .world
            .obstacles
            .iter()
            .filter(|o| o.collision_risk)
            .count();

        Observation {
            iteration,
            world: WorldObservation {
                summary: state.world.summary.clone(),
                zones: state.world.zones.clone(),
                obstacle_count: state.world.obstacles.len(),
                risk_count,
            },
            robot: RobotObservation {
                x: state.robot.pose.x,
                y: state.robot.pose.y,
                battery_pct: state.robot.battery_pct,
                battery_state: state.robot.battery_state.clone(),
                distance_to_target: state.robot.distance_to_target,
                resources: state.robot.resources,
            },
            task: TaskObservation {
                active_task_id: state.tasks.active_task_id.clone(),
                goal: state.tasks.active_task().map(|t| t.goal.clone()),
                queue_len: state.tasks.queue.len(),
                mode: state.tasks.mode,
            },
            skills: SkillsObservation {
                running: state
                    .skills
                    .running
                    .iter()
                    .map(|rs| RunningBrief {
                        skill_name: rs.skill_name.clone(),
                        goal_id: rs.goal_id.clone(),
                    })
                    .collect(),
                last_result: state.skills.last_result.clone(),
                suggested_recovery: Self::suggested_recovery(state),
            },
        }
    }

    /// The error-map disposition for the most recent failure, when the
    /// failing skill maps its error code.
    fn suggested_recovery(
        state: &BrainState,
    ) -> Option<brainstem_types::ErrorDisposition> {
        let result = state.skills.last_result.as_ref()?;
        if result.status != brainstem_types::SkillStatus::Failed
            || result.error_code.is_empty()
        {
            return None;
        }
        let failing_skill = &state.skills.failure_streak.skill_name;
        state
            .skills
            .registry
            .get(failing_skill)?
            .error_map
            .get(&result.error_code)
            .copied()
    }

    /// Render the observation as the message the oracle reads.
    pub fn render(observation: &Observation) -> String {
        let mut parts = vec![format!("[Observation - iteration {}]", observation.iteration)];
        parts.push(format!("World: {}", observation.world.summary));
        parts.push(format!(
            "Robot: pos=({:.2}, {:.2}), battery={:.1}% ({}), distance_to_target={:.2}m",
            observation.robot.x,
            observation.robot.y,
            observation.robot.battery_pct,
            observation.robot.battery_state,
            observation.robot.distance_to_target,
        ));
        match &observation.task.goal {
            Some(goal) => parts.push(format!(
                "Task: {} (mode={}, queued={})",
                goal, observation.task.mode, observation.task.queue_len
            )),
            None => parts.push(format!("Task: none (mode={})", observation.task.mode)),
        }
        if !observation.skills.running.is_empty() {
            let names: Vec<&str> = observation
                .skills
                .running
                .iter()
                .map(|r| r.skill_name.as_str())
                .collect();
            parts.push(format!("Running skills: {}", names.join(", ")));
        }
        if let Some(result) = &observation.skills.last_result {
            let mut line = format!("Last result: {:?}", result.status);
            if !result.error_code.is_empty() {
                line.push_str(&format!(" ({}: {})", result.error_code, result.error_msg));
            }
            parts.push(line);
        }
        if let Some(recovery) = &observation.skills.suggested_recovery {
            parts.push(format!("Suggested recovery: {recovery:?}"));
        }
        parts.join("\n")
    }
}
