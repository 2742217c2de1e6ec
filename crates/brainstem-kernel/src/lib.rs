//! `brainstem-kernel` – The Outer Scheduling Loop
//!
//! Hard, rule-based arbitration of the system's operating mode.  Each node
//! is a pure transition over [`BrainState`][brainstem_types::BrainState]
//! with strict writer ownership; the graph driver sequences them K1 through
//! K6 once per tick.
//!
//! # Modules
//!
//! - [`sources`] – the [`TelemetrySource`][sources::TelemetrySource] and
//!   [`WorldSource`][sources::WorldSource] adapter contracts.
//! - [`hci_ingress`] – K1: lexical intent recognition over the latest user
//!   utterance.
//! - [`telemetry_sync`] – K2: copies one telemetry snapshot into the robot
//!   sub-state, derivation-free.
//! - [`world_update`] – K3: deterministic world summary for the oracle and
//!   the arbiter.
//! - [`event_arbitrate`] – K4: the only priority authority; computes mode
//!   and the preempt flag from a fixed rank table.
//! - [`task_queue`] – K5: structures new goals into the queue and elects the
//!   active task.
//! - [`kernel_route`] – K6: maps mode to a routing target for the driver.

pub mod event_arbitrate;
pub mod hci_ingress;
pub mod kernel_route;
pub mod sources;
pub mod task_queue;
pub mod telemetry_sync;
pub mod world_update;

pub use event_arbitrate::EventArbitrate;
pub use hci_ingress::HciIngress;
pub use kernel_route::{KernelRoute, RouteTarget};
pub use sources::{TelemetrySnapshot, TelemetrySource, WorldSource};
pub use task_queue::TaskQueue;
pub use telemetry_sync::TelemetrySync;
pub use world_update::WorldUpdate;
