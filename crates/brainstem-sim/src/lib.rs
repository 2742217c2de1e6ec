//! `brainstem-sim` – In-Process Simulation Adapters
//!
//! Stub implementations of every external contract the core consumes, so
//! the full stack runs headless in tests and CI without a robot, a map
//! server, or a model endpoint: a kinematic [`SimRig`] world, a
//! [`SimExecutor`] with idempotency-key deduplication, a [`SimTelemetry`]
//! source, and a [`SimWorldSource`].
//!
//! All handles produced by one [`SimRig`] share a single world model, so a
//! navigation dispatched through the executor is visible in the next
//! telemetry snapshot.  The core is single-threaded cooperative, so the
//! sharing is a plain `Rc<RefCell<_>>`.
//!
//! # Example
//!
//! ```rust
//! use brainstem_sim::SimRig;
//! use brainstem_skills::{PollStatus, SkillExecutor};
//! use serde_json::json;
//!
//! let rig = SimRig::new();
//! rig.set_move_speed(5.0);
//! let mut executor = rig.executor();
//!
//! let goal = executor
//!     .dispatch("NavigateToPose", &json!({"target_x": 2.0, "target_y": 2.0}), "t:1:1:d0")
//!     .unwrap();
//! // One fast step reaches the target.
//! assert!(matches!(executor.poll(&goal).unwrap(), PollStatus::Done { .. }));
//! ```

pub mod rig;

pub use rig::{SimExecutor, SimRig, SimTelemetry, SimWorldSource};
