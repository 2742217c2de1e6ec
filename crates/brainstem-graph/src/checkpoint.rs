//! Checkpoint records and the pluggable storage trait.
//!
//! A checkpoint is written after every node boundary: the thread id, a
//! monotonic step index, the node that just completed, and the opaque
//! serialized state bytes.  Restoring the latest checkpoint and resuming
//! after its node is what makes execution durable.
//!
//! Two backends live here (in-memory for tests and embedding, one JSON
//! file per step for simple deployments); the SQLite backend is in
//! [`crate::sqlite`].

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use brainstem_types::{BrainState, StateError};

/// Errors that can arise from checkpoint operations.
#[derive(Error, Debug)]
pub enum CheckpointError {
    #[error("state encoding error: {0}")]
    State(#[from] StateError),
    #[error("checkpoint I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("corrupt checkpoint: {0}")]
    Corrupt(String),
}

/// Every node boundary the driver checkpoints at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeId {
    HciIngress,
    TelemetrySync,
    WorldUpdate,
    EventArbitrate,
    TaskQueue,
    KernelRoute,
    ModeHandler,
    BuildObservation,
    Decide,
    CompileOps,
    GuardrailsCheck,
    HumanApproval,
    DispatchSkills,
    ObserveResult,
    StopOrLoop,
}

impl NodeId {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeId::HciIngress => "hci_ingress",
            NodeId::TelemetrySync => "telemetry_sync",
            NodeId::WorldUpdate => "world_update",
            NodeId::EventArbitrate => "event_arbitrate",
            NodeId::TaskQueue => "task_queue",
            NodeId::KernelRoute => "kernel_route",
            NodeId::ModeHandler => "mode_handler",
            NodeId::BuildObservation => "build_observation",
            NodeId::Decide => "react_decide",
            NodeId::CompileOps => "compile_ops",
            NodeId::GuardrailsCheck => "guardrails_check",
            NodeId::HumanApproval => "human_approval",
            NodeId::DispatchSkills => "dispatch_skills",
            NodeId::ObserveResult => "observe_result",
            NodeId::StopOrLoop => "stop_or_loop",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "hci_ingress" => NodeId::HciIngress,
            "telemetry_sync" => NodeId::TelemetrySync,
            "world_update" => NodeId::WorldUpdate,
            "event_arbitrate" => NodeId::EventArbitrate,
            "task_queue" => NodeId::TaskQueue,
            "kernel_route" => NodeId::KernelRoute,
            "mode_handler" => NodeId::ModeHandler,
            "build_observation" => NodeId::BuildObservation,
            "react_decide" => NodeId::Decide,
            "compile_ops" => NodeId::CompileOps,
            "guardrails_check" => NodeId::GuardrailsCheck,
            "human_approval" => NodeId::HumanApproval,
            "dispatch_skills" => NodeId::DispatchSkills,
            "observe_result" => NodeId::ObserveResult,
            "stop_or_loop" => NodeId::StopOrLoop,
            _ => return None,
        })
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One durable snapshot of the state after a node completed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub thread_id: String,
    pub step_index: u64,
    pub node: NodeId,
    pub created_at: DateTime<Utc>,
    /// Opaque serialized form of the full state (JSON bytes).
    #[serde(with = "state_bytes")]
    pub state: Vec<u8>,
}

/// Serialize the state bytes as the embedded JSON value they already are,
/// keeping checkpoint files human-inspectable.
mod state_bytes {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        let value: serde_json::Value =
            serde_json::from_slice(bytes).map_err(serde::ser::Error::custom)?;
        value.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        serde_json::to_vec(&value).map_err(serde::de::Error::custom)
    }
}

impl Checkpoint {
    /// Capture the current state into a checkpoint record.
    pub fn capture(
        thread_id: &str,
        step_index: u64,
        node: NodeId,
        state: &BrainState,
    ) -> Result<Self, CheckpointError> {
        Ok(Self {
            thread_id: thread_id.to_string(),
            step_index,
            node,
            created_at: Utc::now(),
            state: state.serialize()?,
        })
    }

    /// Decode the stored state.
    pub fn restore(&self) -> Result<BrainState, CheckpointError> {
        Ok(BrainState::deserialize(&self.state)?)
    }
}

/// Pluggable checkpoint storage, keyed by `(thread_id, step_index)`.
pub trait Checkpointer {
    fn save(&mut self, checkpoint: &Checkpoint) -> Result<(), CheckpointError>;
    fn latest(&self, thread_id: &str) -> Result<Option<Checkpoint>, CheckpointError>;
    fn load(&self, thread_id: &str, step_index: u64)
        -> Result<Option<Checkpoint>, CheckpointError>;
    /// All stored step indices for a thread, ascending.
    fn list(&self, thread_id: &str) -> Result<Vec<u64>, CheckpointError>;
    fn delete_thread(&mut self, thread_id: &str) -> Result<(), CheckpointError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// MemoryCheckpointer
// ─────────────────────────────────────────────────────────────────────────────

/// In-process checkpoint store for tests and embedded use.
#[derive(Debug, Default)]
pub struct MemoryCheckpointer {
    threads: HashMap<String, BTreeMap<u64, Checkpoint>>,
}

impl MemoryCheckpointer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Checkpointer for MemoryCheckpointer {
    fn save(&mut self, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        self.threads
            .entry(checkpoint.thread_id.clone())
            .or_default()
            .insert(checkpoint.step_index, checkpoint.clone());
        Ok(())
    }

    fn latest(&self, thread_id: &str) -> Result<Option<Checkpoint>, CheckpointError> {
        Ok(self
            .threads
            .get(thread_id)
            .and_then(|cps| cps.values().next_back().cloned()))
    }

    fn load(
        &self,
        thread_id: &str,
        step_index: u64,
    ) -> Result<Option<Checkpoint>, CheckpointError> {
        Ok(self
            .threads
            .get(thread_id)
            .and_then(|cps| cps.get(&step_index).cloned()))
    }

    fn list(&self, thread_id: &str) -> Result<Vec<u64>, CheckpointError> {
        Ok(self
            .threads
            .get(thread_id)
            .map(|cps| cps.keys().copied().collect())
            .unwrap_or_default())
    }

    fn delete_thread(&mut self, thread_id: &str) -> Result<(), CheckpointError> {
        self.threads.remove(thread_id);
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// FileCheckpointer
// ─────────────────────────────────────────────────────────────────────────────

/// One JSON file per step under `<dir>/<thread_id>/cp_<step>.json`.
#[derive(Debug)]
pub struct FileCheckpointer {
    dir: PathBuf,
}

impl FileCheckpointer {
    /// Open (creating if needed) a checkpoint directory.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, CheckpointError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn thread_dir(&self, thread_id: &str) -> PathBuf {
        self.dir.join(thread_id)
    }

    fn step_path(&self, thread_id: &str, step_index: u64) -> PathBuf {
        self.thread_dir(thread_id)
            .join(format!("cp_{step_index:010}.json"))
    }

    fn read_checkpoint(path: &Path) -> Result<Checkpoint, CheckpointError> {
        let raw = fs::read(path)?;
        serde_json::from_slice(&raw)
            .map_err(|e| CheckpointError::Corrupt(format!("{}: {e}", path.display())))
    }
}

impl Checkpointer for FileCheckpointer {
    fn save(&mut self, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        let dir = self.thread_dir(&checkpoint.thread_id);
        fs::create_dir_all(&dir)?;
        let raw = serde_json::to_vec_pretty(checkpoint)
            .map_err(|e| CheckpointError::Corrupt(e.to_string()))?;
        fs::write(self.step_path(&checkpoint.thread_id, checkpoint.step_index), raw)?;
        Ok(())
    }

    fn latest(&self, thread_id: &str) -> Result<Option<Checkpoint>, CheckpointError> {
        let steps = self.list(thread_id)?;
        match steps.last() {
            Some(step) => self.load(thread_id, *step),
            None => Ok(None),
        }
    }

    fn load(
        &self,
        thread_id: &str,
        step_index: u64,
    ) -> Result<Option<Checkpoint>, CheckpointError> {
        let path = self.step_path(thread_id, step_index);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(Self::read_checkpoint(&path)?))
    }

    fn list(&self, thread_id: &str) -> Result<Vec<u64>, CheckpointError> {
        let dir = self.thread_dir(thread_id);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut steps = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let name = entry?.file_name();
            let name = name.to_string_lossy();
            if let Some(step) = name
                .strip_prefix("cp_")
                .and_then(|s| s.strip_suffix(".json"))
                .and_then(|s| s.parse::<u64>().ok())
            {
                steps.push(step);
            }
        }
        steps.sort_unstable();
        Ok(steps)
    }

    fn delete_thread(&mut self, thread_id: &str) -> Result<(), CheckpointError> {
        let dir = self.thread_dir(thread_id);
        if dir.exists() {
            fs::remove_dir_all(&dir)?;
        }
        Ok(())
    }
}
