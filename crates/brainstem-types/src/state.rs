//! The unified state aggregate.
//!
//! [`BrainState`] is the single value that flows through the node graphs.
//! Sub-states are mutated only by their owning nodes; the whole aggregate
//! round-trips losslessly through its JSON byte encoding, which is exactly
//! what the checkpointer persists.  Maps are `BTreeMap` so the encoding is
//! deterministic and re-serialization of a deserialized state is
//! byte-identical.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::enums::{ApprovalResponse, Mode, PreemptReason, StopReason, UserInterrupt};
use crate::models::{
    Decision, FailureStreak, GoalRequest, Message, Observation, Obstacle, Pose, ProposedOps,
    ResourceFlags, RunningSkill, SkillDef, SkillResult, Task, Twist,
};

/// Errors arising from state encoding and decoding.
#[derive(Error, Debug)]
pub enum StateError {
    #[error("state serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

// ─────────────────────────────────────────────────────────────────────────────
// Sub-states
// ─────────────────────────────────────────────────────────────────────────────

/// Human-computer interaction channel: the latest utterance, the recognised
/// interrupt, and any pending approval response delivered by the host.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HciState {
    pub user_utterance: String,
    pub user_interrupt: UserInterrupt,
    pub approval_response: Option<ApprovalResponse>,
}

/// Semantic world summary for the oracle and the arbiter.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldState {
    pub summary: String,
    pub zones: Vec<String>,
    pub obstacles: Vec<Obstacle>,
}

/// Objective robot telemetry, written only by the telemetry sync node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RobotState {
    pub pose: Pose,
    pub home_pose: Pose,
    pub twist: Twist,
    pub battery_pct: f64,
    pub battery_state: String,
    pub resources: ResourceFlags,
    pub distance_to_target: f64,
}

impl Default for RobotState {
    fn default() -> Self {
        Self {
            pose: Pose::default(),
            home_pose: Pose::default(),
            twist: Twist::default(),
            battery_pct: 100.0,
            battery_state: "FULL".to_string(),
            resources: ResourceFlags::default(),
            distance_to_target: 0.0,
        }
    }
}

/// Task inbox, structured queue, and the arbiter's mode verdict.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TasksState {
    pub inbox: Vec<GoalRequest>,
    pub queue: Vec<Task>,
    pub active_task_id: Option<String>,
    pub mode: Mode,
    pub preempt_flag: bool,
    pub preempt_reason: Option<PreemptReason>,
}

impl TasksState {
    /// The active task record, if the id refers to a queued task.
    pub fn active_task(&self) -> Option<&Task> {
        let id = self.active_task_id.as_deref()?;
        self.queue.iter().find(|t| t.id == id)
    }
}

/// Skill registry snapshot, running handles, and the latest published result.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SkillsState {
    pub registry: BTreeMap<String, SkillDef>,
    pub running: Vec<RunningSkill>,
    pub last_result: Option<SkillResult>,
    pub failure_streak: FailureStreak,
}

impl SkillsState {
    /// Running skills whose definitions permit preemption.
    ///
    /// A skill with no registry entry is treated as preemptible so that a
    /// stale handle can never wedge the scheduler.
    pub fn preemptible_running(&self) -> impl Iterator<Item = &RunningSkill> {
        self.running.iter().filter(|rs| {
            self.registry
                .get(&rs.skill_name)
                .map(|def| def.preemptible)
                .unwrap_or(true)
        })
    }
}

/// ReAct inner-loop bookkeeping.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReactState {
    /// Monotonic per thread; bumped on every fresh EXEC entry so that
    /// idempotency keys never collide across successive sessions.
    pub epoch: u64,
    pub iter: u32,
    pub observation: Observation,
    pub decision: Option<Decision>,
    pub proposed_ops: Option<ProposedOps>,
    pub stop_reason: Option<StopReason>,
}

/// Append-only rationale log plus free-form metrics.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceState {
    pub log: Vec<String>,
    pub metrics: BTreeMap<String, Value>,
}

// ─────────────────────────────────────────────────────────────────────────────
// BrainState
// ─────────────────────────────────────────────────────────────────────────────

/// The unified robot-brain state: seven sub-states plus the message log.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BrainState {
    pub messages: Vec<Message>,
    pub hci: HciState,
    pub world: WorldState,
    pub robot: RobotState,
    pub tasks: TasksState,
    pub skills: SkillsState,
    pub react: ReactState,
    pub trace: TraceState,
}

impl BrainState {
    /// A fresh, empty state as created at startup.
    pub fn new() -> Self {
        Self::default()
    }

    /// Encode the full state as checkpoint bytes (JSON).
    pub fn serialize(&self) -> Result<Vec<u8>, StateError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode a state from checkpoint bytes.
    pub fn deserialize(bytes: &[u8]) -> Result<Self, StateError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Append a rationale line to the trace log.
    pub fn trace(&mut self, line: impl Into<String>) {
        self.trace.log.push(line.into());
    }
}
