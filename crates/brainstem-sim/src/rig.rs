//! The simulated robot: one shared world model behind cloneable adapter
//! handles.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::Rc;

use serde_json::{json, Value};

use brainstem_kernel::{TelemetrySnapshot, TelemetrySource, WorldSource};
use brainstem_skills::{zones, ExecutorError, PollStatus, SkillExecutor};
use brainstem_types::{Obstacle, Pose, ResourceFlags, SkillResult};

const ARRIVAL_THRESHOLD: f64 = 0.1;

#[derive(Debug)]
struct SimGoal {
    skill_name: String,
    target: Option<(f64, f64)>,
}

#[derive(Debug)]
struct SimCore {
    pose: (f64, f64),
    home: (f64, f64),
    battery_pct: f64,
    move_speed: f64,
    battery_drain: f64,
    obstacles: Vec<Obstacle>,
    target: Option<(f64, f64)>,
    moving: bool,
    resources: ResourceFlags,

    goals: HashMap<String, SimGoal>,
    results: HashMap<String, SkillResult>,
    dispatch_keys: HashMap<String, String>,
    speak_keys: HashSet<String>,
    dispatches: Vec<(String, Value)>,
    cancelled: Vec<String>,
    spoken: Vec<String>,
    forced_nav_results: VecDeque<SkillResult>,
    next_goal: u64,
}

impl Default for SimCore {
    fn default() -> Self {
        let home = zones::coordinates("charging_station").unwrap_or((-1.0, 1.0));
        Self {
            pose: (0.0, 0.0),
            home,
            battery_pct: 100.0,
            move_speed: 1.0,
            battery_drain: 0.0,
            obstacles: Vec::new(),
            target: None,
            moving: false,
            resources: ResourceFlags::default(),
            goals: HashMap::new(),
            results: HashMap::new(),
            dispatch_keys: HashMap::new(),
            speak_keys: HashSet::new(),
            dispatches: Vec::new(),
            cancelled: Vec::new(),
            spoken: Vec::new(),
            forced_nav_results: VecDeque::new(),
            next_goal: 0,
        }
    }
}

impl SimCore {
    fn distance_to_target(&self) -> f64 {
        match self.target {
            Some((tx, ty)) => {
                ((tx - self.pose.0).powi(2) + (ty - self.pose.1).powi(2)).sqrt()
            }
            None => 0.0,
        }
    }

    fn release_nav(&mut self) {
        self.target = None;
        self.moving = false;
        self.resources.base = false;
    }

    fn battery_state(&self) -> String {
        let pct = self.battery_pct;
        if pct < 5.0 {
            "CRITICAL".to_string()
        } else if pct < 20.0 {
            "LOW".to_string()
        } else if pct < 90.0 {
            "OK".to_string()
        } else {
            "FULL".to_string()
        }
    }

    /// Advance one kinematic step toward the target; returns the remaining
    /// distance.
    fn step(&mut self) -> f64 {
        let Some((tx, ty)) = self.target else {
            return 0.0;
        };
        let dx = tx - self.pose.0;
        let dy = ty - self.pose.1;
        let dist = (dx * dx + dy * dy).sqrt();
        if dist > f64::EPSILON {
            let step = self.move_speed.min(dist);
            self.pose.0 += dx / dist * step;
            self.pose.1 += dy / dist * step;
        }
        self.battery_pct = (self.battery_pct - self.battery_drain).max(0.0);
        self.distance_to_target()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// SimRig
// ─────────────────────────────────────────────────────────────────────────────

/// Builder and inspection handle for one simulated robot.
#[derive(Clone, Default)]
pub struct SimRig {
    core: Rc<RefCell<SimCore>>,
}

impl SimRig {
    pub fn new() -> Self {
        Self::default()
    }

    /// An executor handle sharing this rig's world.
    pub fn executor(&self) -> SimExecutor {
        SimExecutor {
            core: self.core.clone(),
        }
    }

    /// A telemetry handle sharing this rig's world.
    pub fn telemetry(&self) -> SimTelemetry {
        SimTelemetry {
            core: self.core.clone(),
        }
    }

    /// A world-source handle sharing this rig's world.
    pub fn world_source(&self) -> SimWorldSource {
        SimWorldSource {
            core: self.core.clone(),
        }
    }

    pub fn set_battery(&self, pct: f64) {
        self.core.borrow_mut().battery_pct = pct;
    }

    pub fn set_battery_drain(&self, pct_per_step: f64) {
        self.core.borrow_mut().battery_drain = pct_per_step;
    }

    pub fn set_pose(&self, x: f64, y: f64) {
        self.core.borrow_mut().pose = (x, y);
    }

    pub fn set_move_speed(&self, units_per_step: f64) {
        self.core.borrow_mut().move_speed = units_per_step;
    }

    pub fn add_obstacle(&self, kind: &str, x: f64, y: f64, collision_risk: bool) {
        self.core.borrow_mut().obstacles.push(Obstacle {
            kind: kind.to_string(),
            x,
            y,
            collision_risk,
        });
    }

    pub fn clear_obstacles(&self) {
        self.core.borrow_mut().obstacles.clear();
    }

    /// Force the next navigation poll to finish with this result.
    pub fn fail_next_nav(&self, result: SkillResult) {
        self.core.borrow_mut().forced_nav_results.push_back(result);
    }

    pub fn pose(&self) -> (f64, f64) {
        self.core.borrow().pose
    }

    /// Physical dispatches the executor actually performed (deduplicated
    /// replays excluded).
    pub fn dispatches(&self) -> Vec<(String, Value)> {
        self.core.borrow().dispatches.clone()
    }

    pub fn dispatch_count(&self) -> usize {
        self.core.borrow().dispatches.len()
    }

    pub fn cancelled(&self) -> Vec<String> {
        self.core.borrow().cancelled.clone()
    }

    pub fn spoken(&self) -> Vec<String> {
        self.core.borrow().spoken.clone()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// SimExecutor
// ─────────────────────────────────────────────────────────────────────────────

/// Simulated skill execution backend with idempotency-key deduplication.
#[derive(Clone)]
pub struct SimExecutor {
    core: Rc<RefCell<SimCore>>,
}

impl SkillExecutor for SimExecutor {
    fn dispatch(
        &mut self,
        skill_name: &str,
        params: &Value,
        idempotency_key: &str,
    ) -> Result<String, ExecutorError> {
        let mut core = self.core.borrow_mut();

        if let Some(goal_id) = core.dispatch_keys.get(idempotency_key) {
            return Ok(goal_id.clone());
        }

        core.next_goal += 1;
        let goal_id = format!("sim_goal_{}", core.next_goal);

        match skill_name {
            "NavigateToPose" => {
                let tx = params.get("target_x").and_then(Value::as_f64);
                let ty = params.get("target_y").and_then(Value::as_f64);
                let (Some(tx), Some(ty)) = (tx, ty) else {
                    return Err(ExecutorError::DispatchRejected {
                        skill: skill_name.to_string(),
                        reason: "missing target coordinates".to_string(),
                    });
                };
                core.target = Some((tx, ty));
                core.moving = true;
                core.resources.base = true;
                core.goals.insert(
                    goal_id.clone(),
                    SimGoal {
                        skill_name: skill_name.to_string(),
                        target: Some((tx, ty)),
                    },
                );
            }
            "StopBase" => {
                core.release_nav();
                core.goals.insert(
                    goal_id.clone(),
                    SimGoal {
                        skill_name: skill_name.to_string(),
                        target: None,
                    },
                );
                core.results.insert(goal_id.clone(), SkillResult::success());
            }
            "Speak" => {
                let text = params
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                core.spoken.push(text);
                core.goals.insert(
                    goal_id.clone(),
                    SimGoal {
                        skill_name: skill_name.to_string(),
                        target: None,
                    },
                );
                core.results.insert(goal_id.clone(), SkillResult::success());
            }
            other => return Err(ExecutorError::UnknownSkill(other.to_string())),
        }

        core.dispatch_keys
            .insert(idempotency_key.to_string(), goal_id.clone());
        core.dispatches
            .push((skill_name.to_string(), params.clone()));
        Ok(goal_id)
    }

    fn cancel(&mut self, goal_id: &str) -> Result<(), ExecutorError> {
        let mut core = self.core.borrow_mut();
        if core.results.contains_key(goal_id) {
            return Ok(()); // already finished, nothing to do
        }
        if let Some(goal) = core.goals.remove(goal_id) {
            if goal.skill_name == "NavigateToPose" {
                core.release_nav();
            }
            core.results
                .insert(goal_id.to_string(), SkillResult::cancelled());
            core.cancelled.push(goal_id.to_string());
        }
        Ok(())
    }

    fn poll(&mut self, goal_id: &str) -> Result<PollStatus, ExecutorError> {
        let mut core = self.core.borrow_mut();

        if let Some(result) = core.results.get(goal_id) {
            return Ok(PollStatus::Done {
                result: result.clone(),
            });
        }

        let is_nav = core
            .goals
            .get(goal_id)
            .map(|g| g.skill_name == "NavigateToPose")
            .ok_or_else(|| ExecutorError::UnknownGoal(goal_id.to_string()))?;

        if is_nav {
            if let Some(forced) = core.forced_nav_results.pop_front() {
                core.goals.remove(goal_id);
                core.release_nav();
                core.results.insert(goal_id.to_string(), forced.clone());
                return Ok(PollStatus::Done { result: forced });
            }
            let remaining = core.step();
            if remaining < ARRIVAL_THRESHOLD {
                core.goals.remove(goal_id);
                core.release_nav();
                let mut result = SkillResult::success();
                result
                    .metrics
                    .insert("distance_remaining".to_string(), json!(remaining));
                core.results.insert(goal_id.to_string(), result.clone());
                return Ok(PollStatus::Done { result });
            }
            return Ok(PollStatus::Running {
                feedback: Some(json!({ "distance_remaining": remaining })),
            });
        }

        Ok(PollStatus::Running { feedback: None })
    }

    fn speak(&mut self, text: &str, idempotency_key: &str) -> Result<(), ExecutorError> {
        let mut core = self.core.borrow_mut();
        if !core.speak_keys.insert(idempotency_key.to_string()) {
            return Ok(());
        }
        core.spoken.push(text.to_string());
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// SimTelemetry / SimWorldSource
// ─────────────────────────────────────────────────────────────────────────────

/// Simulated telemetry source reading the shared world.
#[derive(Clone)]
pub struct SimTelemetry {
    core: Rc<RefCell<SimCore>>,
}

impl TelemetrySource for SimTelemetry {
    fn snapshot(&mut self) -> TelemetrySnapshot {
        let core = self.core.borrow();
        TelemetrySnapshot {
            pose: Pose {
                x: core.pose.0,
                y: core.pose.1,
                ..Pose::default()
            },
            home_pose: Pose {
                x: core.home.0,
                y: core.home.1,
                ..Pose::default()
            },
            twist: brainstem_types::Twist {
                linear_x: if core.moving { core.move_speed } else { 0.0 },
                angular_z: 0.0,
            },
            battery_pct: core.battery_pct,
            battery_state: core.battery_state(),
            resources: core.resources,
            distance_to_target: core.distance_to_target(),
        }
    }
}

/// Simulated semantic world source.
#[derive(Clone)]
pub struct SimWorldSource {
    core: Rc<RefCell<SimCore>>,
}

impl WorldSource for SimWorldSource {
    fn zones(&self) -> Vec<String> {
        zones::names().into_iter().map(String::from).collect()
    }

    fn obstacles(&self) -> Vec<Obstacle> {
        self.core.borrow().obstacles.clone()
    }

    fn zone_accessible(&self, _zone: &str) -> bool {
        true
    }
}
