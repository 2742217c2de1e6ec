//! Adapter contracts for the objective inputs of the kernel.
//!
//! The core never talks to a robot or a map server directly; K2 pulls one
//! [`TelemetrySnapshot`] per tick from a [`TelemetrySource`] and K3 pulls
//! zones and obstacles from a [`WorldSource`].  Simulation implementations
//! live in `brainstem-sim`.

use brainstem_types::{Obstacle, Pose, ResourceFlags, Twist};

/// One complete objective reading of the robot, produced by the adapter.
///
/// K2 copies these fields into the state verbatim; no derivation happens in
/// the core.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TelemetrySnapshot {
    pub pose: Pose,
    pub home_pose: Pose,
    pub twist: Twist,
    pub battery_pct: f64,
    pub battery_state: String,
    pub resources: ResourceFlags,
    pub distance_to_target: f64,
}

/// Supplies objective robot telemetry, one snapshot per tick.
pub trait TelemetrySource {
    fn snapshot(&mut self) -> TelemetrySnapshot;
}

/// Supplies the semantic world picture.
pub trait WorldSource {
    /// Known zone names, in stable order.
    fn zones(&self) -> Vec<String>;

    /// Current obstacle records, including pre-computed collision flags.
    fn obstacles(&self) -> Vec<Obstacle>;

    /// Whether a zone is currently reachable.
    fn zone_accessible(&self, zone: &str) -> bool;
}
