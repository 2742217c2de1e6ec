//! `brainstem-skills` – Skill Catalog & Execution Seam
//!
//! Everything the scheduler knows about callable skills, without any
//! knowledge of how they are physically executed.
//!
//! # Modules
//!
//! - [`registry`] – [`SkillRegistry`][registry::SkillRegistry]: the
//!   read-mostly catalog of [`SkillDef`][brainstem_types::SkillDef]s with
//!   integrity validation, resource queries, and the deterministic prompt
//!   summary handed to the oracle.
//! - [`executor`] – the [`SkillExecutor`][executor::SkillExecutor] contract:
//!   dispatch / cancel / poll / speak with idempotency keys, plus
//!   [`PollStatus`][executor::PollStatus].
//! - [`zones`] – the shared semantic-zone coordinate map used when compiling
//!   zone-name navigation parameters and by the simulator.

pub mod executor;
pub mod registry;
pub mod zones;

pub use executor::{ExecutorError, PollStatus, SkillExecutor};
pub use registry::{RegistryError, SkillRegistry};
