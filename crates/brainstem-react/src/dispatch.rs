//! R6 – dispatch: the sole side-effecting node.
//!
//! Cancels complete before dispatches begin; speech goes last.  Every
//! executor call that creates an effect carries a deterministic idempotency
//! key `"<thread>:<epoch>:<iter>:<tag><index>"`, so a replay of this node
//! after a crash re-issues calls the adapter has already seen and the
//! adapter suppresses them.  From the state's point of view, a successful
//! dispatch atomically records the running handle and marks its resources
//! busy.

use brainstem_skills::SkillExecutor;
use brainstem_types::{BrainState, ResourceFlags, RunningSkill, SkillResult};
use chrono::Utc;

/// Timeout applied to skills dispatched without a registry entry.
const DEFAULT_TIMEOUT_S: f64 = 60.0;

/// Deterministic side-effect key for one operation.
pub fn idempotency_key(thread_id: &str, epoch: u64, iter: u32, tag: char, index: usize) -> String {
    format!("{thread_id}:{epoch}:{iter}:{tag}{index}")
}

/// R6 node.  Writes `skills.running`, `skills.last_result` on dispatch
/// failure, `robot.resources`, trace.
#[derive(Debug, Clone, Copy, Default)]
pub struct DispatchSkills;

impl DispatchSkills {
    pub fn new() -> Self {
        Self
    }

    pub fn run(
        &self,
        mut state: BrainState,
        executor: &mut dyn SkillExecutor,
        thread_id: &str,
    ) -> BrainState {
        let Some(ops) = state.react.proposed_ops.clone() else {
            return state;
        };
        let epoch = state.react.epoch;
        let iter = state.react.iter;

        // 1. Cancels, confirmed before any dispatch goes out.
        for goal_id in &ops.to_cancel {
            match executor.cancel(goal_id) {
                Ok(()) => {
                    state.skills.running.retain(|rs| &rs.goal_id != goal_id);
                    state.trace(format!("[dispatch_skills] cancelled {goal_id}"));
                }
                Err(e) => {
                    state.trace(format!("[dispatch_skills] cancel {goal_id} failed: {e}"));
                }
            }
        }

        // 2. Dispatches, in list order.
        for (index, op) in ops.to_dispatch.iter().enumerate() {
            let key = idempotency_key(thread_id, epoch, iter, 'd', index);
            match executor.dispatch(&op.skill_name, &op.params, &key) {
                Ok(goal_id) => {
                    // A replayed dispatch can return a goal the state
                    // already tracks.
                    if state.skills.running.iter().any(|rs| rs.goal_id == goal_id) {
                        continue;
                    }
                    let def = state.skills.registry.get(&op.skill_name);
                    state.skills.running.push(RunningSkill {
                        goal_id: goal_id.clone(),
                        skill_name: op.skill_name.clone(),
                        params: op.params.clone(),
                        start_time: Utc::now(),
                        timeout_s: def.map(|d| d.timeout_s).unwrap_or(DEFAULT_TIMEOUT_S),
                        resources_occupied: def
                            .map(|d| d.resources_required.clone())
                            .unwrap_or_default(),
                    });
                    tracing::info!(skill = %op.skill_name, %goal_id, "skill dispatched");
                    state.trace(format!(
                        "[dispatch_skills] dispatched {} -> {goal_id}",
                        op.skill_name
                    ));
                }
                Err(e) => {
                    state.skills.last_result =
                        Some(SkillResult::failed("DISPATCH_FAILED", e.to_string()));
                    state.trace(format!(
                        "[dispatch_skills] dispatch {} failed: {e}",
                        op.skill_name
                    ));
                }
            }
        }

        // 3. Speech.
        for (index, text) in ops.to_speak.iter().enumerate() {
            let key = idempotency_key(thread_id, epoch, iter, 's', index);
            if let Err(e) = executor.speak(text, &key) {
                state.trace(format!("[dispatch_skills] speak failed: {e}"));
            }
        }

        // Resource flags reflect exactly the surviving running set.
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

#[cfg(test)]
mod tests {
    use super::*;
    use brainstem_skills::{ExecutorError, PollStatus, SkillRegistry};
    use brainstem_types::{DispatchOp, ProposedOps, Resource, SkillStatus};
    use serde_json::{json, Value};
    use std::collections::HashMap;

    /// Recording executor double with key dedup.
    #[derive(Default)]
    struct RecordingExecutor {
        dispatched: Vec<(String, Value, String)>,
        cancelled: Vec<String>,
        spoken: Vec<(String, String)>,
        keys: HashMap<String, String>,
        fail_dispatch: bool,
        next_goal: usize,
    }

    impl SkillExecutor for RecordingExecutor {
        fn dispatch(
            &mut self,
            skill_name: &str,
            params: &Value,
            idempotency_key: &str,
        ) -> Result<String, ExecutorError> {
            if self.fail_dispatch {
                return Err(ExecutorError::DispatchRejected {
                    skill: skill_name.to_string(),
                    reason: "offline".to_string(),
                });
            }
            if let Some(goal) = self.keys.get(idempotency_key) {
                return Ok(goal.clone());
            }
            self.next_goal += 1;
            let goal_id = format!("goal_{}", self.next_goal);
            self.keys
                .insert(idempotency_key.to_string(), goal_id.clone());
            self.dispatched.push((
                skill_name.to_string(),
                params.clone(),
                idempotency_key.to_string(),
            ));
            Ok(goal_id)
        }

        fn cancel(&mut self, goal_id: &str) -> Result<(), ExecutorError> {
            self.cancelled.push(goal_id.to_string());
            Ok(())
        }

        fn poll(&mut self, _goal_id: &str) -> Result<PollStatus, ExecutorError> {
            Ok(PollStatus::Running { feedback: None })
        }

        fn speak(&mut self, text: &str, idempotency_key: &str) -> Result<(), ExecutorError> {
            if self.keys.contains_key(idempotency_key) {
                return Ok(());
            }
            self.keys
                .insert(idempotency_key.to_string(), String::new());
            self.spoken
                .push((text.to_string(), idempotency_key.to_string()));
            Ok(())
        }
    }

    fn state_with_ops(ops: ProposedOps) -> BrainState {
        let mut state = BrainState::new();
        state.skills.registry = SkillRegistry::builtin().to_map();
        state.react.epoch = 1;
        state.react.iter = 1;
        state.react.proposed_ops = Some(ops);
        state
    }

    #[test]
    fn dispatch_records_running_skill_and_resources() {
        let mut exec = RecordingExecutor::default();
        let state = state_with_ops(ProposedOps {
            to_dispatch: vec![DispatchOp {
                skill_name: "NavigateToPose".to_string(),
                params: json!({"target_x": 2.0, "target_y": 2.0}),
            }],
            ..ProposedOps::default()
        });
        let state = DispatchSkills::new().run(state, &mut exec, "thread_a");

        assert_eq!(state.skills.running.len(), 1);
        let rs = &state.skills.running[0];
        assert_eq!(rs.skill_name, "NavigateToPose");
        assert!((rs.timeout_s - 300.0).abs() < f64::EPSILON);
        assert_eq!(rs.resources_occupied, vec![Resource::Base]);
        assert!(state.robot.resources.is_busy(Resource::Base));
    }

    #[test]
    fn cancels_run_before_dispatches() {
        let mut exec = RecordingExecutor::default();
        let mut state = state_with_ops(ProposedOps {
            to_cancel: vec!["goal_old".to_string()],
            to_dispatch: vec![DispatchOp {
                skill_name: "NavigateToPose".to_string(),
                params: json!({"target_x": 2.0, "target_y": 2.0}),
            }],
            ..ProposedOps::default()
        });
        state.skills.running.push(RunningSkill {
            goal_id: "goal_old".to_string(),
            skill_name: "NavigateToPose".to_string(),
            params: Value::Null,
            start_time: Utc::now(),
            timeout_s: 300.0,
            resources_occupied: vec![Resource::Base],
        });
        let state = DispatchSkills::new().run(state, &mut exec, "thread_a");

        assert_eq!(exec.cancelled, vec!["goal_old".to_string()]);
        assert_eq!(state.skills.running.len(), 1);
        assert_ne!(state.skills.running[0].goal_id, "goal_old");
    }

    #[test]
    fn idempotency_keys_are_deterministic_and_distinct() {
        assert_eq!(
            idempotency_key("thread_a", 2, 5, 'd', 0),
            "thread_a:2:5:d0"
        );
        assert_ne!(
            idempotency_key("thread_a", 2, 5, 'd', 0),
            idempotency_key("thread_a", 2, 5, 's', 0)
        );
        assert_ne!(
            idempotency_key("thread_a", 2, 5, 'd', 0),
            idempotency_key("thread_a", 3, 5, 'd', 0)
        );
    }

    #[test]
    fn replayed_dispatch_does_not_duplicate() {
        let mut exec = RecordingExecutor::default();
        let ops = ProposedOps {
            to_dispatch: vec![DispatchOp {
                skill_name: "NavigateToPose".to_string(),
                params: json!({"target_x": 2.0, "target_y": 2.0}),
            }],
            ..ProposedOps::default()
        };

        let state = state_with_ops(ops.clone());
        let state = DispatchSkills::new().run(state, &mut exec, "thread_a");
        assert_eq!(state.skills.running.len(), 1);

        // Replay the same node pass on the same state (same epoch/iter).
        let state = DispatchSkills::new().run(state, &mut exec, "thread_a");
        assert_eq!(exec.dispatched.len(), 1, "adapter saw one real dispatch");
        assert_eq!(state.skills.running.len(), 1, "no duplicate handle");
    }

    #[test]
    fn dispatch_failure_writes_last_result() {
        let mut exec = RecordingExecutor {
            fail_dispatch: true,
            ..RecordingExecutor::default()
        };
        let state = state_with_ops(ProposedOps {
            to_dispatch: vec![DispatchOp {
                skill_name: "NavigateToPose".to_string(),
                params: json!({"target_x": 2.0, "target_y": 2.0}),
            }],
            ..ProposedOps::default()
        });
        let state = DispatchSkills::new().run(state, &mut exec, "thread_a");
        assert!(state.skills.running.is_empty());
        let result = state.skills.last_result.unwrap();
        assert_eq!(result.status, SkillStatus::Failed);
        assert_eq!(result.error_code, "DISPATCH_FAILED");
    }

    #[test]
    fn speech_is_emitted_with_keys() {
        let mut exec = RecordingExecutor::default();
        let state = state_with_ops(ProposedOps {
            to_speak: vec!["Task finished".to_string()],
            ..ProposedOps::default()
        });
        let _ = DispatchSkills::new().run(state, &mut exec, "thread_a");
        assert_eq!(exec.spoken.len(), 1);
        assert_eq!(exec.spoken[0].0, "Task finished");
        assert_eq!(exec.spoken[0].1, "thread_a:1:1:s0");
    }

    #[test]
    fn no_ops_is_a_no_op() {
        let mut exec = RecordingExecutor::default();
        let state = DispatchSkills::new().run(BrainState::new(), &mut exec, "thread_a");
        assert!(state.skills.running.is_empty());
        assert!(exec.dispatched.is_empty());
    }
}
