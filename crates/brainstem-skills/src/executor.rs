//! The [`SkillExecutor`] contract – the seam to the skill execution layer.
//!
//! The dispatch node is the only side-effecting node in the graph, and this
//! trait is the only way it touches the world.  Every mutating call carries
//! a deterministic idempotency key derived from `(thread id, epoch, iter,
//! op index)`; implementations must remember the keys they have seen and
//! turn a repeated call into a no-op that returns the original outcome, so
//! that replaying a checkpointed graph never duplicates a physical effect.

use serde_json::Value;
use thiserror::Error;

use brainstem_types::SkillResult;

/// Errors surfaced by an executor adapter.
#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("skill not found: {0}")]
    UnknownSkill(String),
    #[error("goal not found: {0}")]
    UnknownGoal(String),
    #[error("skill {skill} rejected dispatch: {reason}")]
    DispatchRejected { skill: String, reason: String },
    #[error("executor transport error: {0}")]
    Transport(String),
}

/// Progress report for a single dispatched goal.
#[derive(Debug, Clone, PartialEq)]
pub enum PollStatus {
    /// Still executing; optional structured feedback.
    Running { feedback: Option<Value> },
    /// Finished; terminal result.
    Done { result: SkillResult },
}

/// The four-operation contract every execution backend implements.
pub trait SkillExecutor {
    /// Start a skill; returns the executor-allocated goal id.
    ///
    /// A repeated `idempotency_key` must not start a second execution and
    /// must return the goal id allocated by the first call.
    fn dispatch(
        &mut self,
        skill_name: &str,
        params: &Value,
        idempotency_key: &str,
    ) -> Result<String, ExecutorError>;

    /// Cancel a running goal.  Cancelling an unknown or already-finished
    /// goal is not an error; the confirmation simply reports nothing to do.
    fn cancel(&mut self, goal_id: &str) -> Result<(), ExecutorError>;

    /// Poll a goal for progress or its terminal result.
    fn poll(&mut self, goal_id: &str) -> Result<PollStatus, ExecutorError>;

    /// Emit speech.  Deduplicated by `idempotency_key` like dispatch.
    fn speak(&mut self, text: &str, idempotency_key: &str) -> Result<(), ExecutorError>;
}
