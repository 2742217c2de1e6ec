//! K4 – event arbitration: the only priority authority.
//!
//! Computes the operating mode fresh each tick from a fixed rank table,
//! first match wins.  No hysteresis: mode is a pure function of the current
//! state and inputs.
//!
//! | Rank | Condition | Mode | Preempt | Reason |
//! |---|---|---|---|---|
//! | 1 | battery < 5% or any obstacle flags collision risk | SAFE | yes | SAFETY |
//! | 2 | battery < 20% | CHARGE | yes | BATTERY |
//! | 3 | user interrupt STOP | IDLE | yes | USER_STOP |
//! | 4 | user interrupt PAUSE | IDLE | no | USER_PAUSE |
//! | 5 | task queue non-empty or a task is active | EXEC | no | – |
//! | 6 | otherwise | IDLE | no | – |

use brainstem_types::{BrainState, Mode, PreemptReason, TaskStatus, UserInterrupt};

/// Below this battery percentage the robot must stop where it stands.
pub const BATTERY_CRITICAL_PCT: f64 = 5.0;

/// Below this battery percentage the robot must head for the charger.
pub const BATTERY_LOW_PCT: f64 = 20.0;

/// K4 node.  Writes `tasks.mode`, `tasks.preempt_flag`,
/// `tasks.preempt_reason`, and the trace log.
#[derive(Debug, Clone, Copy, Default)]
pub struct EventArbitrate;

impl EventArbitrate {
    pub fn new() -> Self {
        Self
    }

    pub fn run(&self, mut state: BrainState) -> BrainState {
        let (mode, preempt, reason) = Self::arbitrate(&state);
        state.trace(format!(
            "[event_arbitrate] mode={mode} preempt={preempt} reason={}",
            reason.map(|r| format!("{r:?}")).unwrap_or_else(|| "-".to_string())
        ));
        tracing::debug!(%mode, preempt, "mode arbitration");
        state.tasks.mode = mode;
        state.tasks.preempt_flag = preempt;
        state.tasks.preempt_reason = reason;
        state
    }

    /// The pure arbitration function, exposed for property testing.
    pub fn arbitrate(state: &BrainState) -> (Mode, bool, Option<PreemptReason>) {
        let collision_risk = state.world.obstacles.iter().any(|o| o.collision_risk);
        if state.robot.battery_pct < BATTERY_CRITICAL_PCT || collision_risk {
            return (Mode::Safe, true, Some(PreemptReason::Safety));
        }
        if state.robot.battery_pct < BATTERY_LOW_PCT {
            return (Mode::Charge, true, Some(PreemptReason::Battery));
        }
        match state.hci.user_interrupt {
            UserInterrupt::Stop => {
                return (Mode::Idle, true, Some(PreemptReason::UserStop));
            }
            UserInterrupt::Pause => {
                return (Mode::Idle, false, Some(PreemptReason::UserPause));
            }
            _ => {}
        }
        let has_work = state.tasks.active_task_id.is_some()
            || state
                .tasks
                .queue
                .iter()
                .any(|t| matches!(t.status, TaskStatus::Pending | TaskStatus::Running));
        if has_work {
            return (Mode::Exec, false, None);
        }
        (Mode::Idle, false, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use brainstem_types::{Obstacle, Task, TaskStatus};
    use chrono::Utc;

    fn task(id: &str) -> Task {
        Task {
            id: id.to_string(),
            goal: "navigate_to:kitchen".to_string(),
            priority: 50,
            deadline: None,
            resources_required: vec![],
            preemptible: true,
            status: TaskStatus::Pending,
            created_at: Utc::now(),
            metadata: serde_json::Value::Null,
        }
    }

    #[test]
    fn critical_battery_forces_safe() {
        for pct in [0.0, 2.5, 4.99] {
            let mut state = BrainState::new();
            state.robot.battery_pct = pct;
            let (mode, preempt, reason) = EventArbitrate::arbitrate(&state);
            assert_eq!(mode, Mode::Safe, "battery {pct}");
            assert!(preempt);
            assert_eq!(reason, Some(PreemptReason::Safety));
        }
    }

    #[test]
    fn collision_risk_forces_safe() {
        let mut state = BrainState::new();
        state.world.obstacles.push(Obstacle {
            kind: "person".to_string(),
            x: 1.0,
            y: 1.0,
            collision_risk: true,
        });
        let (mode, preempt, _) = EventArbitrate::arbitrate(&state);
        assert_eq!(mode, Mode::Safe);
        assert!(preempt);
    }

    #[test]
    fn low_battery_forces_charge() {
        for pct in [5.0, 12.0, 19.99] {
            let mut state = BrainState::new();
            state.robot.battery_pct = pct;
            let (mode, preempt, reason) = EventArbitrate::arbitrate(&state);
            assert_eq!(mode, Mode::Charge, "battery {pct}");
            assert!(preempt);
            assert_eq!(reason, Some(PreemptReason::Battery));
        }
    }

    #[test]
    fn healthy_battery_never_charges() {
        for pct in [20.0, 50.0, 100.0] {
            let mut state = BrainState::new();
            state.robot.battery_pct = pct;
            let (mode, _, _) = EventArbitrate::arbitrate(&state);
            assert_ne!(mode, Mode::Charge, "battery {pct}");
            assert_ne!(mode, Mode::Safe, "battery {pct}");
        }
    }

    #[test]
    fn safety_outranks_battery() {
        // Low battery and collision risk together resolve to rank 1.
        let mut state = BrainState::new();
        state.robot.battery_pct = 15.0;
        state.world.obstacles.push(Obstacle {
            kind: "person".to_string(),
            x: 0.0,
            y: 0.0,
            collision_risk: true,
        });
        let (mode, _, reason) = EventArbitrate::arbitrate(&state);
        assert_eq!(mode, Mode::Safe);
        assert_eq!(reason, Some(PreemptReason::Safety));
    }

    #[test]
    fn stop_interrupt_idles_with_preempt() {
        let mut state = BrainState::new();
        state.hci.user_interrupt = UserInterrupt::Stop;
        state.tasks.queue.push(task("task_1"));
        let (mode, preempt, reason) = EventArbitrate::arbitrate(&state);
        assert_eq!(mode, Mode::Idle);
        assert!(preempt);
        assert_eq!(reason, Some(PreemptReason::UserStop));
    }

    #[test]
    fn pause_interrupt_idles_without_preempt() {
        let mut state = BrainState::new();
        state.hci.user_interrupt = UserInterrupt::Pause;
        let (mode, preempt, reason) = EventArbitrate::arbitrate(&state);
        assert_eq!(mode, Mode::Idle);
        assert!(!preempt);
        assert_eq!(reason, Some(PreemptReason::UserPause));
    }

    #[test]
    fn battery_outranks_user_stop() {
        let mut state = BrainState::new();
        state.robot.battery_pct = 15.0;
        state.hci.user_interrupt = UserInterrupt::Stop;
        let (mode, _, reason) = EventArbitrate::arbitrate(&state);
        assert_eq!(mode, Mode::Charge);
        assert_eq!(reason, Some(PreemptReason::Battery));
    }

    #[test]
    fn queued_work_enters_exec() {
        let mut state = BrainState::new();
        state.tasks.queue.push(task("task_1"));
        let (mode, preempt, reason) = EventArbitrate::arbitrate(&state);
        assert_eq!(mode, Mode::Exec);
        assert!(!preempt);
        assert_eq!(reason, None);
    }

    #[test]
    fn active_task_alone_enters_exec() {
        let mut state = BrainState::new();
        state.tasks.active_task_id = Some("task_1".to_string());
        let (mode, _, _) = EventArbitrate::arbitrate(&state);
        assert_eq!(mode, Mode::Exec);
    }

    #[test]
    fn completed_tasks_do_not_hold_exec() {
        let mut state = BrainState::new();
        let mut done = task("task_done");
        done.status = TaskStatus::Completed;
        state.tasks.queue.push(done);
        let (mode, _, _) = EventArbitrate::arbitrate(&state);
        assert_eq!(mode, Mode::Idle);
    }

    #[test]
    fn nothing_to_do_is_idle() {
        let state = BrainState::new();
        let (mode, preempt, reason) = EventArbitrate::arbitrate(&state);
        assert_eq!(mode, Mode::Idle);
        assert!(!preempt);
        assert_eq!(reason, None);
    }

    #[test]
    fn arbitration_is_deterministic() {
        let mut state = BrainState::new();
        state.robot.battery_pct = 17.0;
        state.tasks.queue.push(task("task_1"));
        let first = EventArbitrate::arbitrate(&state);
        let second = EventArbitrate::arbitrate(&state);
        assert_eq!(first, second);
    }

    #[test]
    fn run_writes_mode_and_trace() {
        let mut state = BrainState::new();
        state.robot.battery_pct = 3.0;
        let state = EventArbitrate::new().run(state);
        assert_eq!(state.tasks.mode, Mode::Safe);
        assert!(state.tasks.preempt_flag);
        assert!(state
            .trace
            .log
            .iter()
            .any(|l| l.contains("[event_arbitrate]") && l.contains("SAFE")));
    }
}
