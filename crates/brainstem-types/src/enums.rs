//! Closed vocabularies of the scheduler.
//!
//! Every enum here serializes to the exact wire string used in checkpoints
//! and oracle I/O, so variants must never be renamed without a migration.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// The four-valued operating mode computed fresh each tick by the arbiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Mode {
    /// Safety override: stop the base, ignore the task queue.
    Safe,
    /// Battery low: return to the charging station.
    Charge,
    /// Normal execution: the ReAct inner loop is active.
    Exec,
    /// Nothing to do.
    #[default]
    Idle,
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Safe => write!(f, "SAFE"),
            Mode::Charge => write!(f, "CHARGE"),
            Mode::Exec => write!(f, "EXEC"),
            Mode::Idle => write!(f, "IDLE"),
        }
    }
}

/// The seven decision kinds the oracle may emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionKind {
    /// Keep the current plan running.
    Continue,
    /// Discard the current plan and dispatch new operations.
    Replan,
    /// Re-dispatch the current skill with the same parameters.
    Retry,
    /// Abandon the active task in favour of another queued one.
    SwitchTask,
    /// Escalate to a human operator.
    AskHuman,
    /// Goal achieved; wind down.
    Finish,
    /// Unrecoverable; cancel everything.
    Abort,
}

impl std::fmt::Display for DecisionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DecisionKind::Continue => "CONTINUE",
            DecisionKind::Replan => "REPLAN",
            DecisionKind::Retry => "RETRY",
            DecisionKind::SwitchTask => "SWITCH_TASK",
            DecisionKind::AskHuman => "ASK_HUMAN",
            DecisionKind::Finish => "FINISH",
            DecisionKind::Abort => "ABORT",
        };
        write!(f, "{s}")
    }
}

/// A user interrupt recognised by the HCI ingress node.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserInterrupt {
    /// No interrupt in the current utterance.
    #[default]
    None,
    /// Suspend the current plan without cancelling anything.
    Pause,
    /// Cancel everything and go idle.
    Stop,
    /// A new goal extracted from the utterance.
    NewGoal { goal_text: String },
}

impl UserInterrupt {
    /// The bare interrupt kind as a wire string, payload stripped.
    pub fn kind(&self) -> &'static str {
        match self {
            UserInterrupt::None => "NONE",
            UserInterrupt::Pause => "PAUSE",
            UserInterrupt::Stop => "STOP",
            UserInterrupt::NewGoal { .. } => "NEW_GOAL",
        }
    }
}

/// A human operator's response to an approval interrupt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApprovalResponse {
    /// Execute the proposed operations unchanged.
    Approve,
    /// Execute with the supplied parameter overrides merged in.
    Edit { params: serde_json::Value },
    /// Do not execute; abort the plan.
    Reject,
}

/// Terminal status of a single skill execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SkillStatus {
    Success,
    Failed,
    Cancelled,
}

/// Lifecycle state of a task in the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

/// How a skill is reached by the execution layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterfaceKind {
    /// Long-running goal with feedback and cancellation (e.g. navigation).
    #[default]
    Action,
    /// Short request/response call (e.g. base stop).
    Service,
    /// Handled in-process by the executor adapter (e.g. speech).
    Internal,
}

/// The exclusive physical resources a skill may claim.
///
/// At most one running skill may hold each resource at a time; the
/// guardrails node is the only place where a conflict is decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resource {
    Base,
    Arm,
    Gripper,
}

impl Resource {
    /// All exclusive resources, in canonical order.
    pub const ALL: [Resource; 3] = [Resource::Base, Resource::Arm, Resource::Gripper];
}

impl std::fmt::Display for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Resource::Base => write!(f, "base"),
            Resource::Arm => write!(f, "arm"),
            Resource::Gripper => write!(f, "gripper"),
        }
    }
}

/// Why the arbiter raised (or declined to raise) the preempt flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PreemptReason {
    Safety,
    Battery,
    UserStop,
    UserPause,
}

/// Why the ReAct loop exited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Finished,
    Aborted,
    AskHuman,
    IterCap,
    ConsecutiveFailure,
    ModePreempt,
    UserRejected,
    AwaitingApproval,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StopReason::Finished => "finished",
            StopReason::Aborted => "aborted",
            StopReason::AskHuman => "ask_human",
            StopReason::IterCap => "iter_cap",
            StopReason::ConsecutiveFailure => "consecutive_failure",
            StopReason::ModePreempt => "mode_preempt",
            StopReason::UserRejected => "user_rejected",
            StopReason::AwaitingApproval => "awaiting_approval",
        };
        write!(f, "{s}")
    }
}

/// What happens next when a skill reports a given error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorDisposition {
    Retry,
    Replan,
    AskHuman,
    Abort,
}

impl ErrorDisposition {
    /// Whether the ReAct loop can recover without a human.
    pub fn recoverable(&self) -> bool {
        matches!(self, ErrorDisposition::Retry | ErrorDisposition::Replan)
    }
}

/// The role of a participant in the oracle conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// What a message in the log represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    #[default]
    Chat,
    Observation,
    Decision,
    ToolResult,
}
