//! R8 – stop or loop: ordered exit conditions for the inner loop.
//!
//! Conditions are checked in a fixed order; the first match wins:
//!
//! 1. A terminal decision (FINISH, ABORT, ASK_HUMAN).
//! 2. Iteration cap reached: exit `iter_cap`, force ASK_HUMAN.
//! 3. Consecutive-failure cap reached: exit `consecutive_failure`, force
//!    ASK_HUMAN.
//! 4. A hard mode (SAFE, CHARGE) took the robot: exit `mode_preempt`.
//! 5. The operator rejected an approval: exit `user_rejected`.
//! 6. Otherwise, loop back to R1.
//!
//! A rejection that already rewrote the decision to ABORT keeps its more
//! specific `user_rejected` reason.

use brainstem_types::{
    ApprovalResponse, BrainState, Decision, DecisionKind, Mode, StopReason,
};

/// Default iteration ceiling for one EXEC session.
pub const MAX_ITER: u32 = 20;

/// Default consecutive-failure ceiling for one skill.
pub const MAX_CONSECUTIVE_FAILURES: u32 = 3;

/// The verdict the driver acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopVerdict {
    /// Run another R1..R8 iteration.
    Continue,
    /// Leave the ReAct loop with the given reason.
    Exit(StopReason),
}

/// R8 node.  Writes `react.stop_reason`, may force the decision to
/// ASK_HUMAN on cap exits.
#[derive(Debug, Clone, Copy)]
pub struct StopOrLoop {
    pub max_iter: u32,
    pub failure_cap: u32,
}

impl Default for StopOrLoop {
    fn default() -> Self {
        Self {
            max_iter: MAX_ITER,
            failure_cap: MAX_CONSECUTIVE_FAILURES,
        }
    }
}

impl StopOrLoop {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn run(&self, mut state: BrainState) -> (BrainState, LoopVerdict) {
        let verdict = self.evaluate(&state);

        match verdict {
            LoopVerdict::Exit(reason) => {
                state.react.stop_reason = Some(reason);
                if matches!(
                    reason,
                    StopReason::IterCap | StopReason::ConsecutiveFailure
                ) {
                    // Cap exits hand control to a human.
                    match state.react.decision.as_mut() {
                        Some(decision) => decision.kind = DecisionKind::AskHuman,
                        None => {
                            state.react.decision =
                                Some(Decision::with_reason(DecisionKind::AskHuman, reason.to_string()));
                        }
                    }
                }
                state.trace(format!("[stop_or_loop] exit: {reason}"));
            }
            LoopVerdict::Continue => {
                state.react.stop_reason = None;
                state.trace("[stop_or_loop] continue".to_string());
            }
        }

        (state, verdict)
    }

    fn evaluate(&self, state: &BrainState) -> LoopVerdict {
        if let Some(decision) = &state.react.decision {
            match decision.kind {
                DecisionKind::Finish => return LoopVerdict::Exit(StopReason::Finished),
                DecisionKind::Abort => {
                    // An abort caused by operator rejection keeps the
                    // specific reason.
                    if state.react.stop_reason == Some(StopReason::UserRejected) {
                        return LoopVerdict::Exit(StopReason::UserRejected);
                    }
                    return LoopVerdict::Exit(StopReason::Aborted);
                }
                DecisionKind::AskHuman => return LoopVerdict::Exit(StopReason::AskHuman),
                _ => {}
            }
        }

        if state.react.iter >= self.max_iter {
            return LoopVerdict::Exit(StopReason::IterCap);
        }

        if state.skills.failure_streak.is_stuck(self.failure_cap) {
            return LoopVerdict::Exit(StopReason::ConsecutiveFailure);
        }

        if matches!(state.tasks.mode, Mode::Safe | Mode::Charge) {
            return LoopVerdict::Exit(StopReason::ModePreempt);
        }

        if state.hci.approval_response == Some(ApprovalResponse::Reject) {
            return LoopVerdict::Exit(StopReason::UserRejected);
        }

        LoopVerdict::Continue
    }
}
