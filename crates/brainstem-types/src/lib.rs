//! `brainstem-types` – Shared State Schema
//!
//! The single source of truth for the Brainstem decision core.  Every other
//! crate operates on the value types defined here; the [`BrainState`]
//! aggregate is what flows through the Kernel and ReAct node graphs and what
//! the checkpointer persists between ticks.
//!
//! # Modules
//!
//! - [`enums`] – the closed vocabularies of the scheduler: operating
//!   [`Mode`], oracle [`DecisionKind`], user [`UserInterrupt`] kinds,
//!   approval actions, skill/task statuses, and exclusive [`Resource`]s.
//! - [`models`] – value models: poses, tasks, skill definitions, running
//!   skill handles, oracle decisions, and compiled operation sets.
//! - [`state`] – the seven sub-states and the [`BrainState`] aggregate with
//!   its byte-level serialize/deserialize round-trip.

pub mod enums;
pub mod models;
pub mod state;

pub use enums::{
    ApprovalResponse, DecisionKind, ErrorDisposition, InterfaceKind, MessageKind, Mode,
    PreemptReason, Resource, Role, SkillStatus, StopReason, TaskStatus, UserInterrupt,
};
pub use models::{
    Decision, DispatchOp, FailureStreak, GoalRequest, Message, Observation, Obstacle,
    Orientation, Pose, ProposedOps, ResourceFlags, RobotObservation, RunningBrief,
    RunningSkill, SkillDef, SkillOp, SkillResult, SkillsObservation, Task, TaskObservation,
    Twist, WorldObservation,
};
pub use state::{
    BrainState, HciState, ReactState, RobotState, SkillsState, StateError, TasksState,
    TraceState, WorldState,
};
