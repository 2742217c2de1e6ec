//! K2 – telemetry sync: one snapshot per tick, no derivation.
//!
//! Copies the adapter's [`TelemetrySnapshot`] into the robot sub-state
//! verbatim.  Distance, battery labels, and busy flags are computed below
//! this core; K2 only transports them.

use brainstem_types::BrainState;

use crate::sources::{TelemetrySnapshot, TelemetrySource};

/// K2 node.  Writes `robot`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TelemetrySync;

impl TelemetrySync {
    pub fn new() -> Self {
        Self
    }

    pub fn run(&self, mut state: BrainState, source: &mut dyn TelemetrySource) -> BrainState {
        let snap = source.snapshot();
        state.trace(format!(
            "[telemetry_sync] pos=({:.2}, {:.2}) battery={:.1}% distance={:.2}m",
            snap.pose.x, snap.pose.y, snap.battery_pct, snap.distance_to_target
        ));
        state.robot.pose = snap.pose;
        state.robot.home_pose = snap.home_pose;
        state.robot.twist = snap.twist;
        state.robot.battery_pct = snap.battery_pct;
        state.robot.battery_state = snap.battery_state;
        state.robot.resources = snap.resources;
        state.robot.distance_to_target = snap.distance_to_target;
        state
    }
}

/// A settable telemetry source for tests and bring-up.
#[derive(Debug, Clone, Default)]
pub struct FixedTelemetry {
    pub snapshot: TelemetrySnapshot,
}

impl FixedTelemetry {
    pub fn new(snapshot: TelemetrySnapshot) -> Self {
        Self { snapshot }
    }
}

impl TelemetrySource for FixedTelemetry {
    fn snapshot(&mut self) -> TelemetrySnapshot {
        self.snapshot.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use brainstem_types::{Pose, Resource};

    #[test]
    fn run_copies_snapshot_fields() {
        let mut source = FixedTelemetry::default();
        source.snapshot.pose = Pose {
            x: 3.5,
            y: -1.0,
            ..Pose::default()
        };
        source.snapshot.battery_pct = 42.0;
        source.snapshot.battery_state = "LOW".to_string();
        source.snapshot.resources.set(Resource::Arm, true);
        source.snapshot.distance_to_target = 7.25;

        let state = TelemetrySync::new().run(BrainState::new(), &mut source);

        assert!((state.robot.pose.x - 3.5).abs() < f64::EPSILON);
        assert!((state.robot.battery_pct - 42.0).abs() < f64::EPSILON);
        assert_eq!(state.robot.battery_state, "LOW");
        assert!(state.robot.resources.is_busy(Resource::Arm));
        assert!((state.robot.distance_to_target - 7.25).abs() < f64::EPSILON);
    }

    #[test]
    fn run_overwrites_previous_reading() {
        let mut source = FixedTelemetry::default();
        source.snapshot.battery_pct = 80.0;
        source.snapshot.battery_state = "OK".to_string();

        let mut state = BrainState::new();
        state.robot.battery_pct = 10.0;
        let state = TelemetrySync::new().run(state, &mut source);
        assert!((state.robot.battery_pct - 80.0).abs() < f64::EPSILON);
    }

    #[test]
    fn run_appends_trace() {
        let mut source = FixedTelemetry::default();
        let state = TelemetrySync::new().run(BrainState::new(), &mut source);
        assert!(state.trace.log.iter().any(|l| l.contains("[telemetry_sync]")));
    }
}
