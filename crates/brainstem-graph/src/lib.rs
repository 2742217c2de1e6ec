//! `brainstem-graph` – Graph Driver & Durable Execution
//!
//! Sequences the kernel and ReAct nodes, writes a checkpoint after every
//! node boundary, suspends the whole graph at the approval gate, and
//! resumes after the last completed node on restart.  Replay of the one
//! side-effecting node is made safe by the deterministic idempotency keys
//! the executor adapters deduplicate.
//!
//! # Modules
//!
//! - [`checkpoint`] – the [`Checkpointer`][checkpoint::Checkpointer] trait
//!   with in-memory and one-file-per-step backends.
//! - [`sqlite`] – [`SqliteCheckpointer`][sqlite::SqliteCheckpointer]: the
//!   SQLite-backed store.
//! - [`driver`] – [`BrainDriver`][driver::BrainDriver]: tick / resume /
//!   recover.

pub mod checkpoint;
pub mod driver;
pub mod sqlite;

pub use checkpoint::{
    Checkpoint, CheckpointError, Checkpointer, FileCheckpointer, MemoryCheckpointer, NodeId,
};
pub use driver::{BrainDriver, DriverError, Recovered, TickOutcome};
pub use sqlite::SqliteCheckpointer;
