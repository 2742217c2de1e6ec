//! R4 – hard guardrails and resource discipline.
//!
//! The single place where a proposed dispatch can be refused: unknown
//! skills, argument-schema violations, and exclusive-resource conflicts
//! with non-preemptible running skills.  Rejection rewrites the decision so
//! the next iteration recovers (REPLAN) or escalates (ASK_HUMAN), records a
//! synthetic failure in `skills.last_result`, and clears the dispatch list.
//!
//! In SAFE or CHARGE mode the node also demotes any dispatching decision to
//! ASK_HUMAN unless every op is the mode's canonical response.

use brainstem_types::{
    BrainState, DecisionKind, DispatchOp, Mode, Resource, SkillDef, SkillResult,
};
use serde_json::json;

/// Rejection error codes written to `skills.last_result`.
pub const REJECT_UNKNOWN_SKILL: &str = "REJECT_UNKNOWN_SKILL";
pub const REJECT_PARAMS: &str = "REJECT_PARAMS";
pub const REJECT_RESOURCE_CONFLICT: &str = "REJECT_RESOURCE_CONFLICT";

#[derive(Debug)]
struct Rejection {
    code: &'static str,
    message: String,
}

/// R4 node.  Writes `react.proposed_ops`, `react.decision`,
/// `skills.last_result` on reject.
#[derive(Debug, Clone, Copy, Default)]
pub struct GuardrailsCheck;

impl GuardrailsCheck {
    pub fn new() -> Self {
        Self
    }

    pub fn run(&self, mut state: BrainState) -> BrainState {
        let Some(ops) = state.react.proposed_ops.clone() else {
            return state;
        };

        // Mode demotion: while a hard mode owns the robot, only its
        // canonical response may be dispatched without a human.
        if let Some(canonical) = Self::canonical_skill(state.tasks.mode) {
            let foreign = ops
                .to_dispatch
                .iter()
                .any(|op| op.skill_name != canonical);
            if foreign && !ops.to_dispatch.is_empty() {
                state.trace(format!(
                    "[guardrails_check] demoted to ASK_HUMAN: dispatch in {} mode",
                    state.tasks.mode
                ));
                if let Some(decision) = state.react.decision.as_mut() {
                    decision.kind = DecisionKind::AskHuman;
                }
                let mut demoted = ops;
                demoted.to_dispatch.clear();
                demoted.need_approval = true;
                demoted.approval_payload = json!({
                    "reason": format!("dispatch requested in {} mode", state.tasks.mode),
                });
                state.react.proposed_ops = Some(demoted);
                return state;
            }
        }

        let mut rejections = Vec::new();
        let mut batch_claims: Vec<Resource> = Vec::new();
        for op in &ops.to_dispatch {
            match Self::check_op(&state, op, &batch_claims) {
                Some(rejection) => rejections.push(rejection),
                None => {
                    if let Some(def) = state.skills.registry.get(&op.skill_name) {
                        batch_claims.extend(def.resources_required.iter().copied());
                    }
                }
            }
        }

        if rejections.is_empty() {
            state.trace("[guardrails_check] passed".to_string());
            return state;
        }

        // Unknown skills are unrecoverable without a human; everything else
        // the oracle can replan around.
        let unrecoverable = rejections
            .iter()
            .any(|r| r.code == REJECT_UNKNOWN_SKILL);
        let first = &rejections[0];
        let message = rejections
            .iter()
            .map(|r| r.message.as_str())
            .collect::<Vec<_>>()
            .join("; ");

        state.trace(format!("[guardrails_check] rejected: {message}"));
        tracing::warn!(code = first.code, "guardrails rejection");

        state.skills.last_result = Some(SkillResult::failed(first.code, message.clone()));
        if let Some(decision) = state.react.decision.as_mut() {
            decision.kind = if unrecoverable {
                DecisionKind::AskHuman
            } else {
                DecisionKind::Replan
            };
            decision.reason = format!("guardrails rejected: {message}");
        }
        let mut cleared = ops;
        cleared.to_dispatch.clear();
        if unrecoverable {
            cleared.need_approval = true;
            cleared.approval_payload = json!({ "reason": message });
        }
        state.react.proposed_ops = Some(cleared);
        state
    }

    fn canonical_skill(mode: Mode) -> Option<&'static str> {
        match mode {
            Mode::Safe => Some("StopBase"),
            Mode::Charge => Some("NavigateToPose"),
            _ => None,
        }
    }

    fn check_op(
        state: &BrainState,
        op: &DispatchOp,
        batch_claims: &[Resource],
    ) -> Option<Rejection> {
        let Some(def) = state.skills.registry.get(&op.skill_name) else {
            return Some(Rejection {
                code: REJECT_UNKNOWN_SKILL,
                message: format!("skill not found: {}", op.skill_name),
            });
        };

        if let Some(missing) = Self::missing_required_arg(def, op) {
            return Some(Rejection {
                code: REJECT_PARAMS,
                message: format!(
                    "invalid params for {}: missing required field {missing}",
                    op.skill_name
                ),
            });
        }

        // An earlier op in this batch may already claim the resource.
        if let Some(resource) = def
            .resources_required
            .iter()
            .copied()
            .find(|r| batch_claims.contains(r))
        {
            return Some(Rejection {
                code: REJECT_RESOURCE_CONFLICT,
                message: format!(
                    "resource {resource} needed by {} is already claimed in this batch",
                    op.skill_name
                ),
            });
        }

        if let Some(resource) = Self::resource_conflict(state, def) {
            return Some(Rejection {
                code: REJECT_RESOURCE_CONFLICT,
                message: format!(
                    "resource {resource} needed by {} is held by a non-preemptible skill",
                    op.skill_name
                ),
            });
        }

        None
    }

    /// First required schema field absent from the op's params.
    fn missing_required_arg(def: &SkillDef, op: &DispatchOp) -> Option<String> {
        let required = def.args_schema.get("required")?.as_array()?;
        for field in required {
            let name = field.as_str()?;
            if op.params.get(name).is_none() {
                return Some(name.to_string());
            }
        }
        None
    }

    /// A required resource currently held by a non-preemptible running
    /// skill.  Resources held by preemptible skills are not conflicts; the
    /// compiled cancel list releases them before dispatch.
    fn resource_conflict(state: &BrainState, def: &SkillDef) -> Option<Resource> {
        for rs in &state.skills.running {
            let holder_preemptible = state
                .skills
                .registry
                .get(&rs.skill_name)
                .map(|d| d.preemptible)
                .unwrap_or(true);
            if holder_preemptible {
                continue;
            }
            for resource in &def.resources_required {
                if rs.resources_occupied.contains(resource) {
                    return Some(*resource);
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use brainstem_skills::SkillRegistry;
    use brainstem_types::{Decision, ProposedOps, RunningSkill, SkillStatus};
    use chrono::Utc;
    use serde_json::Value;

    fn state_with_dispatch(skill: &str, params: Value) -> BrainState {
        let mut state = BrainState::new();
        state.skills.registry = SkillRegistry::builtin().to_map();
        state.tasks.mode = Mode::Exec;
        state.react.decision = Some(Decision::of(DecisionKind::Replan));
        state.react.proposed_ops = Some(ProposedOps {
            to_dispatch: vec![DispatchOp {
                skill_name: skill.to_string(),
                params,
            }],
            ..ProposedOps::default()
        });
        state
    }

    #[test]
    fn valid_dispatch_passes_unchanged() {
        let state = state_with_dispatch(
            "NavigateToPose",
            json!({"target_x": 2.0, "target_y": 2.0}),
        );
        let state = GuardrailsCheck::new().run(state);
        let ops = state.react.proposed_ops.unwrap();
        assert_eq!(ops.to_dispatch.len(), 1);
        assert!(state.skills.last_result.is_none());
        assert_eq!(
            state.react.decision.unwrap().kind,
            DecisionKind::Replan
        );
    }

    #[test]
    fn unknown_skill_escalates_to_human() {
        let state = state_with_dispatch("Levitate", json!({}));
        let state = GuardrailsCheck::new().run(state);
        let ops = state.react.proposed_ops.unwrap();
        assert!(ops.to_dispatch.is_empty());
        assert!(ops.need_approval);
        let result = state.skills.last_result.unwrap();
        assert_eq!(result.status, SkillStatus::Failed);
        assert_eq!(result.error_code, REJECT_UNKNOWN_SKILL);
        assert_eq!(state.react.decision.unwrap().kind, DecisionKind::AskHuman);
    }

    #[test]
    fn missing_required_param_replans() {
        let state = state_with_dispatch("NavigateToPose", json!({"target_x": 2.0}));
        let state = GuardrailsCheck::new().run(state);
        let ops = state.react.proposed_ops.unwrap();
        assert!(ops.to_dispatch.is_empty());
        let result = state.skills.last_result.unwrap();
        assert_eq!(result.error_code, REJECT_PARAMS);
        assert!(result.error_msg.contains("target_y"));
        assert_eq!(state.react.decision.unwrap().kind, DecisionKind::Replan);
    }

    #[test]
    fn conflict_with_non_preemptible_holder_rejected() {
        let mut state = state_with_dispatch(
            "NavigateToPose",
            json!({"target_x": 2.0, "target_y": 2.0}),
        );
        state.skills.running.push(RunningSkill {
            goal_id: "goal_stop".to_string(),
            skill_name: "StopBase".to_string(),
            params: Value::Null,
            start_time: Utc::now(),
            timeout_s: 5.0,
            resources_occupied: vec![Resource::Base],
        });
        let state = GuardrailsCheck::new().run(state);
        let result = state.skills.last_result.unwrap();
        assert_eq!(result.error_code, REJECT_RESOURCE_CONFLICT);
        assert_eq!(state.react.decision.unwrap().kind, DecisionKind::Replan);
    }

    #[test]
    fn preemptible_holder_is_not_a_conflict() {
        let mut state = state_with_dispatch(
            "NavigateToPose",
            json!({"target_x": 2.0, "target_y": 2.0}),
        );
        state.skills.running.push(RunningSkill {
            goal_id: "goal_nav".to_string(),
            skill_name: "NavigateToPose".to_string(),
            params: Value::Null,
            start_time: Utc::now(),
            timeout_s: 300.0,
            resources_occupied: vec![Resource::Base],
        });
        let state = GuardrailsCheck::new().run(state);
        let ops = state.react.proposed_ops.unwrap();
        assert_eq!(ops.to_dispatch.len(), 1);
        assert!(state.skills.last_result.is_none());
    }

    #[test]
    fn two_ops_claiming_same_resource_rejected() {
        let mut state = state_with_dispatch(
            "NavigateToPose",
            json!({"target_x": 2.0, "target_y": 2.0}),
        );
        if let Some(ops) = state.react.proposed_ops.as_mut() {
            ops.to_dispatch.push(DispatchOp {
                skill_name: "NavigateToPose".to_string(),
                params: json!({"target_x": 5.0, "target_y": 5.0}),
            });
        }
        let state = GuardrailsCheck::new().run(state);
        let result = state.skills.last_result.unwrap();
        assert_eq!(result.error_code, REJECT_RESOURCE_CONFLICT);
        assert!(result.error_msg.contains("already claimed"));
        assert!(state.react.proposed_ops.unwrap().to_dispatch.is_empty());
    }

    #[test]
    fn safe_mode_demotes_foreign_dispatch() {
        let mut state = state_with_dispatch(
            "NavigateToPose",
            json!({"target_x": 2.0, "target_y": 2.0}),
        );
        state.tasks.mode = Mode::Safe;
        let state = GuardrailsCheck::new().run(state);
        let ops = state.react.proposed_ops.unwrap();
        assert!(ops.to_dispatch.is_empty());
        assert!(ops.need_approval);
        assert_eq!(state.react.decision.unwrap().kind, DecisionKind::AskHuman);
    }

    #[test]
    fn safe_mode_allows_stop_base() {
        let mut state = state_with_dispatch("StopBase", json!({}));
        state.tasks.mode = Mode::Safe;
        let state = GuardrailsCheck::new().run(state);
        let ops = state.react.proposed_ops.unwrap();
        assert_eq!(ops.to_dispatch.len(), 1);
        assert_eq!(state.react.decision.unwrap().kind, DecisionKind::Replan);
    }

    #[test]
    fn charge_mode_allows_navigation() {
        let mut state = state_with_dispatch(
            "NavigateToPose",
            json!({"target_x": -1.0, "target_y": 1.0}),
        );
        state.tasks.mode = Mode::Charge;
        let state = GuardrailsCheck::new().run(state);
        let ops = state.react.proposed_ops.unwrap();
        assert_eq!(ops.to_dispatch.len(), 1);
    }

    #[test]
    fn no_proposed_ops_is_a_no_op() {
        let mut state = BrainState::new();
        state.skills.registry = SkillRegistry::builtin().to_map();
        let state = GuardrailsCheck::new().run(state);
        assert!(state.react.proposed_ops.is_none());
    }

    #[test]
    fn cancel_and_speak_survive_rejection() {
        let mut state = state_with_dispatch("Levitate", json!({}));
        if let Some(ops) = state.react.proposed_ops.as_mut() {
            ops.to_cancel.push("goal_old".to_string());
            ops.to_speak.push("switching plan".to_string());
        }
        let state = GuardrailsCheck::new().run(state);
        let ops = state.react.proposed_ops.unwrap();
        assert_eq!(ops.to_cancel, vec!["goal_old".to_string()]);
        assert_eq!(ops.to_speak, vec!["switching plan".to_string()]);
    }
}
