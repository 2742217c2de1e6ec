//! R3 – compile the oracle decision into an executable operation set.
//!
//! Pure translation, no validation: the guardrails node decides what is
//! actually allowed.  A raised preempt flag always contributes a cancel for
//! every preemptible running skill; non-preemptible skills are left to
//! finish.

use brainstem_skills::zones;
use brainstem_types::{
    BrainState, DecisionKind, DispatchOp, ProposedOps, SkillOp, TaskStatus,
};
use serde_json::{json, Value};

/// R3 node.  Writes `react.proposed_ops`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompileOps;

impl CompileOps {
    pub fn new() -> Self {
        Self
    }

    pub fn run(&self, mut state: BrainState) -> BrainState {
        let ops = Self::compile(&state);
        state.trace(format!(
            "[compile_ops] cancel={} dispatch={} speak={} approval={}",
            ops.to_cancel.len(),
            ops.to_dispatch.len(),
            ops.to_speak.len(),
            ops.need_approval
        ));
        state.react.proposed_ops = Some(ops);
        state
    }

    fn compile(state: &BrainState) -> ProposedOps {
        let Some(decision) = &state.react.decision else {
            return ProposedOps::default();
        };

        let mut ops = ProposedOps::default();

        // Preemption cancels everything that may legally be cancelled.
        if state.tasks.preempt_flag {
            ops.to_cancel
                .extend(state.skills.preemptible_running().map(|rs| rs.goal_id.clone()));
        }

        match decision.kind {
            DecisionKind::Continue => {}

            DecisionKind::Retry => {
                // Re-dispatch the current skill with its own parameters.
                if let Some(current) = state.skills.running.first() {
                    Self::push_cancel(&mut ops, &current.goal_id);
                    ops.to_dispatch.push(DispatchOp {
                        skill_name: current.skill_name.clone(),
                        params: current.params.clone(),
                    });
                } else {
                    Self::push_decision_ops(&mut ops, &decision.ops);
                }
            }

            DecisionKind::Replan => {
                for rs in Self::cancellable(state) {
                    Self::push_cancel(&mut ops, &rs);
                }
                Self::push_decision_ops(&mut ops, &decision.ops);
            }

            DecisionKind::SwitchTask => {
                for rs in Self::cancellable(state) {
                    Self::push_cancel(&mut ops, &rs);
                }
                // Switching away from live work needs a human sign-off.
                if !state.skills.running.is_empty() {
                    ops.need_approval = true;
                    ops.approval_payload = json!({
                        "reason": decision.reason,
                        "kind": "switch_task",
                    });
                }
                match Self::next_pending_task_op(state) {
                    Some(op) => ops.to_dispatch.push(op),
                    None => ops.to_speak.push("No alternate task to switch to".to_string()),
                }
            }

            DecisionKind::AskHuman => {
                ops.need_approval = true;
                ops.approval_payload = json!({
                    "reason": decision.reason,
                    "ops": decision.ops,
                });
                if !decision.reason.is_empty() {
                    ops.to_speak
                        .push(format!("I need help: {}", decision.reason));
                }
            }

            DecisionKind::Finish | DecisionKind::Abort => {
                for rs in Self::cancellable(state) {
                    Self::push_cancel(&mut ops, &rs);
                }
                let summary = if decision.reason.is_empty() {
                    match decision.kind {
                        DecisionKind::Finish => "Task finished".to_string(),
                        _ => "Task aborted".to_string(),
                    }
                } else {
                    decision.reason.clone()
                };
                ops.to_speak.push(summary);
            }
        }

        ops
    }

    /// Goal ids of running skills whose defs support cancellation.
    fn cancellable(state: &BrainState) -> Vec<String> {
        state
            .skills
            .running
            .iter()
            .filter(|rs| {
                state
                    .skills
                    .registry
                    .get(&rs.skill_name)
                    .map(|def| def.cancel_supported)
                    .unwrap_or(true)
            })
            .map(|rs| rs.goal_id.clone())
            .collect()
    }

    fn push_cancel(ops: &mut ProposedOps, goal_id: &str) {
        if !ops.to_cancel.iter().any(|g| g == goal_id) {
            ops.to_cancel.push(goal_id.to_string());
        }
    }

    fn push_decision_ops(ops: &mut ProposedOps, decision_ops: &[SkillOp]) {
        for op in decision_ops {
            if op.skill.is_empty() {
                continue;
            }
            ops.to_dispatch.push(DispatchOp {
                skill_name: op.skill.clone(),
                params: Self::convert_params(&op.skill, &op.params),
            });
        }
    }

    /// The primary skill op for the next pending task other than the active
    /// one.
    fn next_pending_task_op(state: &BrainState) -> Option<DispatchOp> {
        let active = state.tasks.active_task_id.as_deref();
        let task = state.tasks.queue.iter().find(|t| {
            t.status == TaskStatus::Pending && Some(t.id.as_str()) != active
        })?;
        let target = task.goal.strip_prefix("navigate_to:")?;
        Some(DispatchOp {
            skill_name: "NavigateToPose".to_string(),
            params: Self::convert_params(
                "NavigateToPose",
                &json!({ "target": target }),
            ),
        })
    }

    /// Normalise oracle-level params into executor-level params.
    ///
    /// Navigation accepts either explicit coordinates or a zone name;
    /// `Speak` accepts a legacy `content` alias for `message`.
    pub fn convert_params(skill_name: &str, params: &Value) -> Value {
        match skill_name {
            "NavigateToPose" => {
                if params.get("target_x").is_some() {
                    return params.clone();
                }
                if let Some(target) = params.get("target").and_then(|t| t.as_str()) {
                    if let Some((x, y)) = zones::coordinates(target) {
                        return json!({
                            "target_x": x,
                            "target_y": y,
                            "target_theta": params.get("target_theta").cloned().unwrap_or(json!(0.0)),
                        });
                    }
                }
                params.clone()
            }
            "Speak" => {
                if params.get("message").is_none() {
                    if let Some(content) = params.get("content") {
                        let mut out = params.clone();
                        if let Some(map) = out.as_object_mut() {
                            map.remove("content");
                            map.insert("message".to_string(), content.clone());
                        }
                        return out;
                    }
                }
                params.clone()
            }
            _ => params.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use brainstem_skills::SkillRegistry;
    use brainstem_types::{Decision, Resource, RunningSkill, Task};
    use chrono::Utc;

    fn running(goal_id: &str, skill: &str) -> RunningSkill {
        RunningSkill {
            goal_id: goal_id.to_string(),
            skill_name: skill.to_string(),
            params: json!({"target_x": 2.0, "target_y": 2.0}),
            start_time: Utc::now(),
            timeout_s: 300.0,
            resources_occupied: vec![Resource::Base],
        }
    }

    fn exec_state() -> BrainState {
        let mut state = BrainState::new();
        state.skills.registry = SkillRegistry::builtin().to_map();
        state
    }

    #[test]
    fn no_decision_yields_empty_ops() {
        let state = CompileOps::new().run(exec_state());
        let ops = state.react.proposed_ops.unwrap();
        assert_eq!(ops, ProposedOps::default());
    }

    #[test]
    fn continue_keeps_running_skills() {
        let mut state = exec_state();
        state.skills.running.push(running("goal_1", "NavigateToPose"));
        state.react.decision = Some(Decision::of(DecisionKind::Continue));
        let state = CompileOps::new().run(state);
        let ops = state.react.proposed_ops.unwrap();
        assert!(ops.to_cancel.is_empty());
        assert!(ops.to_dispatch.is_empty());
    }

    #[test]
    fn preempt_flag_cancels_preemptible_running() {
        let mut state = exec_state();
        state.skills.running.push(running("goal_nav", "NavigateToPose"));
        state.skills.running.push(RunningSkill {
            goal_id: "goal_stop".to_string(),
            skill_name: "StopBase".to_string(),
            params: Value::Null,
            start_time: Utc::now(),
            timeout_s: 5.0,
            resources_occupied: vec![Resource::Base],
        });
        state.tasks.preempt_flag = true;
        state.react.decision = Some(Decision::of(DecisionKind::Continue));
        let state = CompileOps::new().run(state);
        let ops = state.react.proposed_ops.unwrap();
        // StopBase is non-preemptible and is allowed to finish.
        assert_eq!(ops.to_cancel, vec!["goal_nav".to_string()]);
    }

    #[test]
    fn retry_redispatches_current_skill_params() {
        let mut state = exec_state();
        state.skills.running.push(running("goal_1", "NavigateToPose"));
        state.react.decision = Some(Decision::of(DecisionKind::Retry));
        let state = CompileOps::new().run(state);
        let ops = state.react.proposed_ops.unwrap();
        assert_eq!(ops.to_cancel, vec!["goal_1".to_string()]);
        assert_eq!(ops.to_dispatch.len(), 1);
        assert_eq!(ops.to_dispatch[0].skill_name, "NavigateToPose");
        assert_eq!(ops.to_dispatch[0].params["target_x"], json!(2.0));
    }

    #[test]
    fn retry_without_running_uses_decision_ops() {
        let mut state = exec_state();
        let mut decision = Decision::of(DecisionKind::Retry);
        decision.ops.push(SkillOp {
            skill: "NavigateToPose".to_string(),
            params: json!({"target": "kitchen"}),
        });
        state.react.decision = Some(decision);
        let state = CompileOps::new().run(state);
        let ops = state.react.proposed_ops.unwrap();
        assert!(ops.to_cancel.is_empty());
        assert_eq!(ops.to_dispatch.len(), 1);
    }

    #[test]
    fn replan_cancels_and_dispatches_new_ops() {
        let mut state = exec_state();
        state.skills.running.push(running("goal_1", "NavigateToPose"));
        let mut decision = Decision::of(DecisionKind::Replan);
        decision.ops.push(SkillOp {
            skill: "NavigateToPose".to_string(),
            params: json!({"target": "bedroom"}),
        });
        state.react.decision = Some(decision);
        let state = CompileOps::new().run(state);
        let ops = state.react.proposed_ops.unwrap();
        assert_eq!(ops.to_cancel, vec!["goal_1".to_string()]);
        assert_eq!(ops.to_dispatch[0].params["target_x"], json!(2.0));
        assert_eq!(ops.to_dispatch[0].params["target_y"], json!(7.0));
    }

    #[test]
    fn ask_human_sets_approval_payload() {
        let mut state = exec_state();
        state.react.decision = Some(Decision::with_reason(
            DecisionKind::AskHuman,
            "which shelf?",
        ));
        let state = CompileOps::new().run(state);
        let ops = state.react.proposed_ops.unwrap();
        assert!(ops.need_approval);
        assert_eq!(ops.approval_payload["reason"], json!("which shelf?"));
        assert!(ops.to_dispatch.is_empty());
    }

    #[test]
    fn finish_cancels_all_and_speaks() {
        let mut state = exec_state();
        state.skills.running.push(running("goal_1", "NavigateToPose"));
        state.react.decision = Some(Decision::of(DecisionKind::Finish));
        let state = CompileOps::new().run(state);
        let ops = state.react.proposed_ops.unwrap();
        assert_eq!(ops.to_cancel, vec!["goal_1".to_string()]);
        assert!(ops.to_dispatch.is_empty());
        assert_eq!(ops.to_speak, vec!["Task finished".to_string()]);
    }

    #[test]
    fn abort_speaks_reason_when_present() {
        let mut state = exec_state();
        state.react.decision = Some(Decision::with_reason(
            DecisionKind::Abort,
            "cannot reach target",
        ));
        let state = CompileOps::new().run(state);
        let ops = state.react.proposed_ops.unwrap();
        assert_eq!(ops.to_speak, vec!["cannot reach target".to_string()]);
    }

    #[test]
    fn switch_task_requires_approval_when_running() {
        let mut state = exec_state();
        state.skills.running.push(running("goal_1", "NavigateToPose"));
        state.tasks.queue.push(Task {
            id: "task_next".to_string(),
            goal: "navigate_to:bedroom".to_string(),
            priority: 60,
            deadline: None,
            resources_required: vec![Resource::Base],
            preemptible: true,
            status: TaskStatus::Pending,
            created_at: Utc::now(),
            metadata: Value::Null,
        });
        state.react.decision = Some(Decision::of(DecisionKind::SwitchTask));
        let state = CompileOps::new().run(state);
        let ops = state.react.proposed_ops.unwrap();
        assert!(ops.need_approval);
        assert_eq!(ops.to_cancel, vec!["goal_1".to_string()]);
        assert_eq!(ops.to_dispatch[0].skill_name, "NavigateToPose");
        assert_eq!(ops.to_dispatch[0].params["target_y"], json!(7.0));
    }

    #[test]
    fn switch_task_without_alternative_speaks() {
        let mut state = exec_state();
        state.react.decision = Some(Decision::of(DecisionKind::SwitchTask));
        let state = CompileOps::new().run(state);
        let ops = state.react.proposed_ops.unwrap();
        assert!(!ops.need_approval);
        assert!(ops.to_dispatch.is_empty());
        assert_eq!(ops.to_speak.len(), 1);
    }

    #[test]
    fn convert_params_passes_through_coordinates() {
        let params = json!({"target_x": 1.0, "target_y": 2.0});
        assert_eq!(
            CompileOps::convert_params("NavigateToPose", &params),
            params
        );
    }

    #[test]
    fn convert_params_maps_speak_content_alias() {
        let converted =
            CompileOps::convert_params("Speak", &json!({"content": "hello there"}));
        assert_eq!(converted["message"], json!("hello there"));
        assert!(converted.get("content").is_none());
    }

    #[test]
    fn convert_params_leaves_unknown_zone_untouched() {
        let params = json!({"target": "the moon"});
        assert_eq!(
            CompileOps::convert_params("NavigateToPose", &params),
            params
        );
    }
}
