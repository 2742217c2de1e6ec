//! R7 – observe results: poll running skills and publish what finished.
//!
//! Completed goals leave the running set and the most recent result lands
//! in `skills.last_result`; a goal that outlives its timeout is failed with
//! `TIMEOUT` and a best-effort cancel.  Feedback from still-running goals
//! is threaded back into the message log so the next observation carries
//! it.  The failure streak is updated for every published result.

use brainstem_skills::{PollStatus, SkillExecutor};
use brainstem_types::{BrainState, Message, ResourceFlags, SkillResult};
use chrono::Utc;

/// R7 node.  Writes `skills.running`, `skills.last_result`,
/// `skills.failure_streak`, `robot.resources`, `messages`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ObserveResult;

impl ObserveResult {
    pub fn new() -> Self {
        Self
    }

    pub fn run(&self, mut state: BrainState, executor: &mut dyn SkillExecutor) -> BrainState {
        let now = Utc::now();
        let mut still_running = Vec::new();
        let mut completed: Vec<(String, SkillResult)> = Vec::new();

        for rs in std::mem::take(&mut state.skills.running) {
            match executor.poll(&rs.goal_id) {
                Ok(PollStatus::Done { result }) => {
                    state.trace(format!(
                        "[observe_result] {} finished: {:?}",
                        rs.skill_name, result.status
                    ));
                    completed.push((rs.skill_name.clone(), result));
                }
                Ok(PollStatus::Running { feedback }) => {
                    if rs.elapsed_s(now) > rs.timeout_s {
                        let result = SkillResult::failed(
                            "TIMEOUT",
                            format!(
                                "skill {} timed out after {}s",
                                rs.skill_name, rs.timeout_s
                            ),
                        );
                        state.trace(format!("[observe_result] {} timed out", rs.skill_name));
                        tracing::warn!(skill = %rs.skill_name, "skill timeout");
                        let _ = executor.cancel(&rs.goal_id);
                        completed.push((rs.skill_name.clone(), result));
                    } else {
                        if let Some(feedback) = feedback {
                            state.messages.push(Message::tool_result(format!(
                                "Feedback from {}: {feedback}",
                                rs.skill_name
                            )));
                        }
                        still_running.push(rs);
                    }
                }
                Err(e) => {
                    state.trace(format!(
                        "[observe_result] poll {} failed: {e}",
                        rs.goal_id
                    ));
                    completed.push((
                        rs.skill_name.clone(),
                        SkillResult::failed("EXECUTOR_ERROR", e.to_string()),
                    ));
                }
            }
        }

        for (skill_name, result) in &completed {
            state
                .skills
                .failure_streak
                .record(skill_name, result.status);
            let mut line = format!("Skill {skill_name} result: {:?}", result.status);
            if !result.error_code.is_empty() {
                line.push_str(&format!(" ({}: {})", result.error_code, result.error_msg));
            }
            state.messages.push(Message::tool_result(line));
        }
        if let Some((_, result)) = completed.last() {
            state.skills.last_result = Some(result.clone());
        }

        state.skills.running = still_running;
        let occupied: Vec<_> = state
            .skills
            .running
            .iter()
            .flat_map(|rs| rs.resources_occupied.iter().copied())
            .collect();
        state.robot.resources = ResourceFlags::from_occupied(occupied.iter());

        state
    }
}
