//! R5 – the human-in-the-loop approval gate.
//!
//! When the compiled operations require approval and no response has been
//! delivered, the node reports a suspension: the driver checkpoints, hands
//! the approval payload to the host, and the whole graph parks until the
//! host resumes the thread with `hci.approval_response` pre-populated.
//!
//! On resume: APPROVE keeps the operations unchanged, EDIT merges the
//! operator's parameter overrides and asks the driver to re-run the
//! guardrails, REJECT clears the dispatch list and rewrites the decision to
//! ABORT with a `user_rejected` stop reason.

use brainstem_types::{ApprovalResponse, BrainState, DecisionKind, StopReason};
use serde_json::Value;

/// What the gate decided; the driver acts on it.
#[derive(Debug, Clone, PartialEq)]
pub enum ApprovalOutcome {
    /// No approval needed; continue to dispatch.
    PassThrough,
    /// Park the graph and surface this payload to the host.
    Suspend(Value),
    /// Operator approved; continue to dispatch.
    Approved,
    /// Operator edited the params; re-run guardrails before dispatch.
    Edited,
    /// Operator rejected; the dispatch list is now empty.
    Rejected,
}

/// R5 node.  Writes `react.proposed_ops`, `react.decision`,
/// `react.stop_reason`; consumes `hci.approval_response` on APPROVE/EDIT.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApprovalGate;

impl ApprovalGate {
    pub fn new() -> Self {
        Self
    }

    pub fn run(&self, mut state: BrainState) -> (BrainState, ApprovalOutcome) {
        let needs_approval = state
            .react
            .proposed_ops
            .as_ref()
            .map(|ops| ops.need_approval)
            .unwrap_or(false);
        if !needs_approval {
            return (state, ApprovalOutcome::PassThrough);
        }

        let Some(response) = state.hci.approval_response.clone() else {
            let payload = state
                .react
                .proposed_ops
                .as_ref()
                .map(|ops| ops.approval_payload.clone())
                .unwrap_or(Value::Null);
            state.react.stop_reason = Some(StopReason::AwaitingApproval);
            state.trace("[human_approval] suspended awaiting approval".to_string());
            return (state, ApprovalOutcome::Suspend(payload));
        };

        match response {
            ApprovalResponse::Approve => {
                state.hci.approval_response = None;
                if let Some(ops) = state.react.proposed_ops.as_mut() {
                    ops.need_approval = false;
                    ops.approval_payload = Value::Null;
                }
                state.react.stop_reason = None;
                state.trace("[human_approval] approved".to_string());
                (state, ApprovalOutcome::Approved)
            }
            ApprovalResponse::Edit { params } => {
                state.hci.approval_response = None;
                if let Some(ops) = state.react.proposed_ops.as_mut() {
                    for op in ops.to_dispatch.iter_mut() {
                        merge_params(&mut op.params, &params);
                    }
                    ops.need_approval = false;
                    ops.approval_payload = Value::Null;
                }
                state.react.stop_reason = None;
                state.trace(format!("[human_approval] edited params: {params}"));
                (state, ApprovalOutcome::Edited)
            }
            ApprovalResponse::Reject => {
                // The response stays in hci so the stop node can report the
                // specific user_rejected exit; the driver clears it on exit.
                if let Some(ops) = state.react.proposed_ops.as_mut() {
                    ops.to_dispatch.clear();
                    ops.need_approval = false;
                    ops.approval_payload = Value::Null;
                    ops.to_speak.push("Operation rejected by operator".to_string());
                }
                if let Some(decision) = state.react.decision.as_mut() {
                    decision.kind = DecisionKind::Abort;
                }
                state.react.stop_reason = Some(StopReason::UserRejected);
                state.trace("[human_approval] rejected".to_string());
                (state, ApprovalOutcome::Rejected)
            }
        }
    }
}

/// Merge an edit payload into an op's params, overwriting on key collision.
fn merge_params(target: &mut Value, edits: &Value) {
    let Some(edit_map) = edits.as_object() else {
        return;
    };
    if !target.is_object() {
        *target = Value::Object(serde_json::Map::new());
    }
    if let Some(map) = target.as_object_mut() {
        for (k, v) in edit_map {
            map.insert(k.clone(), v.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use brainstem_types::{Decision, DispatchOp, ProposedOps};
    use serde_json::json;

    fn state_needing_approval() -> BrainState {
        let mut state = BrainState::new();
        state.react.decision = Some(Decision::of(DecisionKind::AskHuman));
        state.react.proposed_ops = Some(ProposedOps {
            to_dispatch: vec![DispatchOp {
                skill_name: "NavigateToPose".to_string(),
                params: json!({"target_x": 2.0, "target_y": 2.0}),
            }],
            need_approval: true,
            approval_payload: json!({"reason": "confirm target"}),
            ..ProposedOps::default()
        });
        state
    }

    #[test]
    fn no_approval_needed_passes_through() {
        let mut state = BrainState::new();
        state.react.proposed_ops = Some(ProposedOps::default());
        let (_, outcome) = ApprovalGate::new().run(state);
        assert_eq!(outcome, ApprovalOutcome::PassThrough);
    }

    #[test]
    fn pending_approval_suspends_with_payload() {
        let (state, outcome) = ApprovalGate::new().run(state_needing_approval());
        match outcome {
            ApprovalOutcome::Suspend(payload) => {
                assert_eq!(payload["reason"], json!("confirm target"));
            }
            other => panic!("expected Suspend, got {other:?}"),
        }
        assert_eq!(state.react.stop_reason, Some(StopReason::AwaitingApproval));
    }

    #[test]
    fn approve_preserves_ops() {
        let mut state = state_needing_approval();
        state.hci.approval_response = Some(ApprovalResponse::Approve);
        let (state, outcome) = ApprovalGate::new().run(state);
        assert_eq!(outcome, ApprovalOutcome::Approved);
        let ops = state.react.proposed_ops.unwrap();
        assert_eq!(ops.to_dispatch.len(), 1);
        assert_eq!(ops.to_dispatch[0].params["target_x"], json!(2.0));
        assert!(!ops.need_approval);
        assert!(state.hci.approval_response.is_none());
        assert!(state.react.stop_reason.is_none());
    }

    #[test]
    fn edit_merges_params() {
        let mut state = state_needing_approval();
        state.hci.approval_response = Some(ApprovalResponse::Edit {
            params: json!({"target_x": 9.0, "speed": "slow"}),
        });
        let (state, outcome) = ApprovalGate::new().run(state);
        assert_eq!(outcome, ApprovalOutcome::Edited);
        let ops = state.react.proposed_ops.unwrap();
        assert_eq!(ops.to_dispatch[0].params["target_x"], json!(9.0));
        assert_eq!(ops.to_dispatch[0].params["target_y"], json!(2.0));
        assert_eq!(ops.to_dispatch[0].params["speed"], json!("slow"));
    }

    #[test]
    fn reject_clears_dispatch_and_aborts() {
        let mut state = state_needing_approval();
        state.hci.approval_response = Some(ApprovalResponse::Reject);
        let (state, outcome) = ApprovalGate::new().run(state);
        assert_eq!(outcome, ApprovalOutcome::Rejected);
        let ops = state.react.proposed_ops.unwrap();
        assert!(ops.to_dispatch.is_empty());
        assert_eq!(
            state.react.decision.unwrap().kind,
            DecisionKind::Abort
        );
        assert_eq!(state.react.stop_reason, Some(StopReason::UserRejected));
        // Response retained for the stop node's user_rejected exit.
        assert_eq!(state.hci.approval_response, Some(ApprovalResponse::Reject));
    }

    #[test]
    fn merge_params_handles_non_object_target() {
        let mut target = Value::Null;
        merge_params(&mut target, &json!({"a": 1}));
        assert_eq!(target, json!({"a": 1}));
    }
}
