//! Value models carried inside the state aggregate.
//!
//! All types here are plain values: `Clone + PartialEq + Serialize +
//! Deserialize`, no interior sharing.  Running skills reference registry
//! entries by name, never by pointer, so the aggregate stays a tree.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::enums::{
    DecisionKind, ErrorDisposition, InterfaceKind, MessageKind, Mode, Resource, Role,
    SkillStatus, TaskStatus,
};

// ─────────────────────────────────────────────────────────────────────────────
// Geometry
// ─────────────────────────────────────────────────────────────────────────────

/// Robot pose in the map frame.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Pose {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub orientation: Orientation,
}

/// Unit quaternion orientation; identity by default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Orientation {
    pub w: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Default for Orientation {
    fn default() -> Self {
        Self {
            w: 1.0,
            x: 0.0,
            y: 0.0,
            z: 0.0,
        }
    }
}

/// Planar velocity command/readback.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Twist {
    pub linear_x: f64,
    pub angular_z: f64,
}

/// A semantic obstacle record from the world model.
///
/// `collision_risk` is an opaque pre-computed safety flag; the arbiter
/// reacts to it without inferring the underlying sensor logic.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Obstacle {
    pub kind: String,
    pub x: f64,
    pub y: f64,
    pub collision_risk: bool,
}

// ─────────────────────────────────────────────────────────────────────────────
// Resources
// ─────────────────────────────────────────────────────────────────────────────

/// Busy flags for the fixed exclusive resource set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceFlags {
    pub base: bool,
    pub arm: bool,
    pub gripper: bool,
}

impl ResourceFlags {
    /// Whether the given resource is currently busy.
    pub fn is_busy(&self, resource: Resource) -> bool {
        match resource {
            Resource::Base => self.base,
            Resource::Arm => self.arm,
            Resource::Gripper => self.gripper,
        }
    }

    /// Set the busy flag for a single resource.
    pub fn set(&mut self, resource: Resource, busy: bool) {
        match resource {
            Resource::Base => self.base = busy,
            Resource::Arm => self.arm = busy,
            Resource::Gripper => self.gripper = busy,
        }
    }

    /// Flags with exactly the given resources marked busy.
    pub fn from_occupied<'a>(occupied: impl IntoIterator<Item = &'a Resource>) -> Self {
        let mut flags = Self::default();
        for r in occupied {
            flags.set(*r, true);
        }
        flags
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tasks
// ─────────────────────────────────────────────────────────────────────────────

/// A raw new-goal request sitting in the inbox before K5 structures it.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GoalRequest {
    pub goal: String,
    pub priority: i32,
    pub deadline: Option<DateTime<Utc>>,
    pub resources_required: Vec<Resource>,
    pub preemptible: bool,
    pub metadata: Value,
}

/// A structured task in the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub goal: String,
    pub priority: i32,
    #[serde(default)]
    pub deadline: Option<DateTime<Utc>>,
    #[serde(default)]
    pub resources_required: Vec<Resource>,
    #[serde(default = "default_true")]
    pub preemptible: bool,
    #[serde(default)]
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Value,
}

fn default_true() -> bool {
    true
}

// ─────────────────────────────────────────────────────────────────────────────
// Skills
// ─────────────────────────────────────────────────────────────────────────────

/// Static definition of a callable skill: the canonical eight fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillDef {
    pub name: String,
    pub interface_kind: InterfaceKind,
    /// JSON-schema-shaped object: `{"required": [...], "properties": {...}}`.
    pub args_schema: Value,
    pub resources_required: Vec<Resource>,
    pub preemptible: bool,
    pub cancel_supported: bool,
    pub timeout_s: f64,
    pub error_map: BTreeMap<String, ErrorDisposition>,
}

/// A dispatched skill the executor has acknowledged but not yet finished.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunningSkill {
    pub goal_id: String,
    pub skill_name: String,
    #[serde(default)]
    pub params: Value,
    pub start_time: DateTime<Utc>,
    pub timeout_s: f64,
    #[serde(default)]
    pub resources_occupied: Vec<Resource>,
}

impl RunningSkill {
    /// Seconds elapsed since dispatch, measured against `now`.
    pub fn elapsed_s(&self, now: DateTime<Utc>) -> f64 {
        (now - self.start_time).num_milliseconds() as f64 / 1000.0
    }
}

/// The terminal result of a skill execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillResult {
    pub status: SkillStatus,
    #[serde(default)]
    pub error_code: String,
    #[serde(default)]
    pub error_msg: String,
    #[serde(default)]
    pub metrics: BTreeMap<String, Value>,
}

impl SkillResult {
    pub fn success() -> Self {
        Self {
            status: SkillStatus::Success,
            error_code: String::new(),
            error_msg: String::new(),
            metrics: BTreeMap::new(),
        }
    }

    pub fn failed(code: impl Into<String>, msg: impl Into<String>) -> Self {
        Self {
            status: SkillStatus::Failed,
            error_code: code.into(),
            error_msg: msg.into(),
            metrics: BTreeMap::new(),
        }
    }

    pub fn cancelled() -> Self {
        Self {
            status: SkillStatus::Cancelled,
            error_code: "CANCELLED".to_string(),
            error_msg: String::new(),
            metrics: BTreeMap::new(),
        }
    }
}

/// Tracks trailing consecutive failures of one skill.
///
/// The observe node records every published result; the stop node asks
/// [`FailureStreak::is_stuck`] to decide whether a human must take over.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FailureStreak {
    pub skill_name: String,
    pub count: u32,
}

impl FailureStreak {
    /// Record a published result for `skill`.
    ///
    /// A failure of the same skill extends the streak; a failure of a
    /// different skill starts a fresh streak; any non-failure resets it.
    pub fn record(&mut self, skill: &str, status: SkillStatus) {
        if status == SkillStatus::Failed {
            if self.skill_name == skill {
                self.count += 1;
            } else {
                self.skill_name = skill.to_string();
                self.count = 1;
            }
        } else {
            self.reset();
        }
    }

    /// Clear the streak.
    pub fn reset(&mut self) {
        self.skill_name.clear();
        self.count = 0;
    }

    /// Whether the streak has reached `threshold` consecutive failures.
    pub fn is_stuck(&self, threshold: u32) -> bool {
        threshold > 0 && self.count >= threshold
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Oracle decisions and compiled operations
// ─────────────────────────────────────────────────────────────────────────────

/// One skill invocation requested by the oracle.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct SkillOp {
    pub skill: String,
    #[serde(default)]
    pub params: Value,
}

/// A structured decision produced by the oracle and validated by the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Decision {
    #[serde(rename = "type")]
    pub kind: DecisionKind,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub plan_patch: Option<Value>,
    #[serde(default)]
    pub ops: Vec<SkillOp>,
}

impl Decision {
    /// A bare decision with no reason, patch, or operations.
    pub fn of(kind: DecisionKind) -> Self {
        Self {
            kind,
            reason: String::new(),
            plan_patch: None,
            ops: Vec::new(),
        }
    }

    pub fn with_reason(kind: DecisionKind, reason: impl Into<String>) -> Self {
        Self {
            kind,
            reason: reason.into(),
            plan_patch: None,
            ops: Vec::new(),
        }
    }
}

/// A concrete dispatch the executor will receive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchOp {
    pub skill_name: String,
    #[serde(default)]
    pub params: Value,
}

/// The compiled, validated operation set for one ReAct iteration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProposedOps {
    pub to_cancel: Vec<String>,
    pub to_dispatch: Vec<DispatchOp>,
    pub to_speak: Vec<String>,
    pub need_approval: bool,
    pub approval_payload: Value,
}

// ─────────────────────────────────────────────────────────────────────────────
// Observation
// ─────────────────────────────────────────────────────────────────────────────

/// The structured snapshot handed to the oracle each iteration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Observation {
    pub iteration: u32,
    pub world: WorldObservation,
    pub robot: RobotObservation,
    pub task: TaskObservation,
    pub skills: SkillsObservation,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldObservation {
    pub summary: String,
    pub zones: Vec<String>,
    pub obstacle_count: usize,
    pub risk_count: usize,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RobotObservation {
    pub x: f64,
    pub y: f64,
    pub battery_pct: f64,
    pub battery_state: String,
    pub distance_to_target: f64,
    pub resources: ResourceFlags,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskObservation {
    pub active_task_id: Option<String>,
    pub goal: Option<String>,
    pub queue_len: usize,
    pub mode: Mode,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SkillsObservation {
    pub running: Vec<RunningBrief>,
    pub last_result: Option<SkillResult>,
    /// The registry's error-map disposition for the last failure, when the
    /// failing skill maps its error code.
    pub suggested_recovery: Option<ErrorDisposition>,
}

/// Minimal handle to a running skill, for observation rendering.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RunningBrief {
    pub skill_name: String,
    pub goal_id: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Messages
// ─────────────────────────────────────────────────────────────────────────────

/// One entry in the conversation log threaded to the oracle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub kind: MessageKind,
}

impl Message {
    pub fn new(role: Role, kind: MessageKind, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            kind,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, MessageKind::Chat, content)
    }

    pub fn observation(content: impl Into<String>) -> Self {
        Self::new(Role::System, MessageKind::Observation, content)
    }

    pub fn decision(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, MessageKind::Decision, content)
    }

    pub fn tool_result(content: impl Into<String>) -> Self {
        Self::new(Role::System, MessageKind::ToolResult, content)
    }
}
