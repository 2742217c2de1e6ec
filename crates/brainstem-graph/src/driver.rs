//! [`BrainDriver`] – sequences the dual-loop graph.
//!
//! One [`tick`][BrainDriver::tick] runs the kernel pass K1..K6, then routes
//! on the arbitrated mode: the SAFE/CHARGE one-shot handlers, the ReAct
//! loop, or an idle yield.  A checkpoint is written after every node, so a
//! restart resumes after the last completed node
//! ([`recover`][BrainDriver::recover]); the approval gate suspends the
//! whole graph and [`resume`][BrainDriver::resume] continues it with the
//! operator's response.
//!
//! A host that receives [`TickOutcome::AwaitingApproval`] must resume the
//! thread rather than tick it again; a fresh tick starts a new EXEC session
//! and the suspended plan is discarded.

use brainstem_kernel::{
    EventArbitrate, HciIngress, KernelRoute, RouteTarget, TaskQueue, TelemetrySource,
    TelemetrySync, WorldSource, WorldUpdate,
};
use brainstem_react::{
    ApprovalGate, ApprovalOutcome, BuildObservation, CompileOps, Decide, DecisionOracle,
    DispatchSkills, GuardrailsCheck, LoopVerdict, ObserveResult, StopOrLoop,
};
use brainstem_skills::{zones, SkillExecutor, SkillRegistry};
use brainstem_types::{
    ApprovalResponse, BrainState, DispatchOp, Mode, ProposedOps, StopReason, TaskStatus,
};
use serde_json::{json, Value};
use thiserror::Error;

use crate::checkpoint::{Checkpoint, CheckpointError, Checkpointer, NodeId};

/// Errors that can arise while driving the graph.
#[derive(Error, Debug)]
pub enum DriverError {
    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),
}

/// What one tick (or resume) produced.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// Nothing to do; the kernel yielded.
    Idle,
    /// The SAFE handler ran.
    SafetyStop,
    /// The CHARGE handler ran.
    Charging,
    /// The ReAct loop exited with the given stop reason.
    ReactExited(StopReason),
    /// The graph is suspended at the approval gate; the payload describes
    /// what needs sign-off.  Resume the thread to continue.
    AwaitingApproval(Value),
}

/// Result of crash recovery.
#[derive(Debug)]
pub enum Recovered {
    /// The last checkpoint was a kernel boundary; run a fresh tick.
    NeedsTick(BrainState),
    /// The ReAct pass was continued to completion (or re-suspension).
    Outcome(BrainState, TickOutcome),
}

/// Where to (re-)enter the R1..R8 pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum ReactStage {
    Observation,
    Decide,
    Compile,
    Guardrails,
    Approval,
    Dispatch,
    Observe,
    Stop,
}

/// The dual-loop graph driver for one thread id.
pub struct BrainDriver {
    thread_id: String,
    step_index: u64,

    telemetry: Box<dyn TelemetrySource>,
    world: Box<dyn WorldSource>,
    oracle: Box<dyn DecisionOracle>,
    executor: Box<dyn SkillExecutor>,
    checkpointer: Box<dyn Checkpointer>,

    hci_ingress: HciIngress,
    telemetry_sync: TelemetrySync,
    world_update: WorldUpdate,
    event_arbitrate: EventArbitrate,
    task_queue: TaskQueue,
    kernel_route: KernelRoute,

    build_observation: BuildObservation,
    decide: Decide,
    compile_ops: CompileOps,
    guardrails: GuardrailsCheck,
    approval: ApprovalGate,
    dispatch: DispatchSkills,
    observe: ObserveResult,
    stop_or_loop: StopOrLoop,
}

impl BrainDriver {
    pub fn new(
        thread_id: impl Into<String>,
        telemetry: Box<dyn TelemetrySource>,
        world: Box<dyn WorldSource>,
        oracle: Box<dyn DecisionOracle>,
        executor: Box<dyn SkillExecutor>,
        checkpointer: Box<dyn Checkpointer>,
    ) -> Self {
        Self {
            thread_id: thread_id.into(),
            step_index: 0,
            telemetry,
            world,
            oracle,
            executor,
            checkpointer,
            hci_ingress: HciIngress::new(),
            telemetry_sync: TelemetrySync::new(),
            world_update: WorldUpdate::new(),
            event_arbitrate: EventArbitrate::new(),
            task_queue: TaskQueue::new(),
            kernel_route: KernelRoute::new(),
            build_observation: BuildObservation::new(),
            decide: Decide::new(),
            compile_ops: CompileOps::new(),
            guardrails: GuardrailsCheck::new(),
            approval: ApprovalGate::new(),
            dispatch: DispatchSkills::new(),
            observe: ObserveResult::new(),
            stop_or_loop: StopOrLoop::new(),
        }
    }

    /// Override the inner-loop stop configuration.
    pub fn with_stop_config(mut self, stop: StopOrLoop) -> Self {
        self.stop_or_loop = stop;
        self
    }

    pub fn thread_id(&self) -> &str {
        &self.thread_id
    }

    /// A startup state with the given skill catalog installed.
    pub fn initial_state(registry: &SkillRegistry) -> BrainState {
        let mut state = BrainState::new();
        state.skills.registry = registry.to_map();
        state
    }

    // ─────────────────────────────────────────────────────────────────────
    // Tick
    // ─────────────────────────────────────────────────────────────────────

    /// Advance the graph by one kernel pass and, in EXEC, run the ReAct
    /// loop to a suspension point.
    pub fn tick(
        &mut self,
        mut state: BrainState,
    ) -> Result<(BrainState, TickOutcome), DriverError> {
        state = self.hci_ingress.run(state);
        self.checkpoint(&state, NodeId::HciIngress)?;

        state = self.telemetry_sync.run(state, self.telemetry.as_mut());
        self.checkpoint(&state, NodeId::TelemetrySync)?;

        state = self.world_update.run(state, self.world.as_ref());
        self.checkpoint(&state, NodeId::WorldUpdate)?;

        state = self.event_arbitrate.run(state);
        self.checkpoint(&state, NodeId::EventArbitrate)?;

        state = self.task_queue.run(state);
        self.checkpoint(&state, NodeId::TaskQueue)?;

        state = self.kernel_route.run(state);
        self.checkpoint(&state, NodeId::KernelRoute)?;

        let route = KernelRoute::target(state.tasks.mode);
        tracing::debug!(thread = %self.thread_id, %route, "kernel pass complete");

        match route {
            RouteTarget::IdleWait => {
                if state.tasks.preempt_flag {
                    state = self.run_preempt_cancel(state)?;
                }
                state.hci.user_utterance.clear();
                Ok((state, TickOutcome::Idle))
            }
            RouteTarget::SafeHandler => {
                let (mut state, outcome) = self.run_mode_handler(state, Mode::Safe)?;
                state.hci.user_utterance.clear();
                Ok((state, outcome))
            }
            RouteTarget::ChargeHandler => {
                let (mut state, outcome) = self.run_mode_handler(state, Mode::Charge)?;
                state.hci.user_utterance.clear();
                Ok((state, outcome))
            }
            RouteTarget::ReactLoop => {
                // Fresh EXEC entry: new side-effect epoch, iteration zero.
                state.react.epoch += 1;
                state.react.iter = 0;
                state.react.decision = None;
                state.react.proposed_ops = None;
                state.react.stop_reason = None;
                self.run_react(state, ReactStage::Observation)
            }
        }
    }

    /// Resume a graph suspended at the approval gate.
    pub fn resume(
        &mut self,
        mut state: BrainState,
        response: ApprovalResponse,
    ) -> Result<(BrainState, TickOutcome), DriverError> {
        state.hci.approval_response = Some(response);
        state.react.stop_reason = None;
        self.run_react(state, ReactStage::Approval)
    }

    /// Restore the latest checkpoint and continue after its node.
    ///
    /// Returns `None` when the thread has no checkpoints.  Replay of the
    /// dispatch node is safe: the executor adapter deduplicates the
    /// deterministic idempotency keys it has already seen.
    pub fn recover(&mut self) -> Result<Option<Recovered>, DriverError> {
        let Some(checkpoint) = self.checkpointer.latest(&self.thread_id)? else {
            return Ok(None);
        };
        self.step_index = checkpoint.step_index + 1;
        let state = checkpoint.restore()?;
        tracing::info!(
            thread = %self.thread_id,
            node = %checkpoint.node,
            step = checkpoint.step_index,
            "recovering from checkpoint"
        );

        let stage = match checkpoint.node {
            NodeId::HciIngress
            | NodeId::TelemetrySync
            | NodeId::WorldUpdate
            | NodeId::EventArbitrate
            | NodeId::TaskQueue
            | NodeId::KernelRoute
            | NodeId::ModeHandler => return Ok(Some(Recovered::NeedsTick(state))),
            NodeId::BuildObservation => ReactStage::Decide,
            NodeId::Decide => ReactStage::Compile,
            NodeId::CompileOps => ReactStage::Guardrails,
            NodeId::GuardrailsCheck => ReactStage::Approval,
            NodeId::HumanApproval => {
                if state.react.stop_reason == Some(StopReason::AwaitingApproval) {
                    // Still parked: re-running the gate re-suspends.
                    ReactStage::Approval
                } else {
                    ReactStage::Dispatch
                }
            }
            NodeId::DispatchSkills => ReactStage::Observe,
            NodeId::ObserveResult => ReactStage::Stop,
            NodeId::StopOrLoop => match state.react.stop_reason {
                Some(reason) => {
                    return Ok(Some(Recovered::Outcome(
                        state,
                        TickOutcome::ReactExited(reason),
                    )))
                }
                None => ReactStage::Observation,
            },
        };

        let (state, outcome) = self.run_react(state, stage)?;
        Ok(Some(Recovered::Outcome(state, outcome)))
    }

    // ─────────────────────────────────────────────────────────────────────
    // ReAct pass
    // ─────────────────────────────────────────────────────────────────────

    fn run_react(
        &mut self,
        mut state: BrainState,
        start: ReactStage,
    ) -> Result<(BrainState, TickOutcome), DriverError> {
        let thread_id = self.thread_id.clone();
        let mut stage = start;

        loop {
            if stage <= ReactStage::Observation {
                state = self.build_observation.run(state);
                self.checkpoint(&state, NodeId::BuildObservation)?;
            }
            if stage <= ReactStage::Decide {
                state = self.decide.run(state, self.oracle.as_mut());
                self.checkpoint(&state, NodeId::Decide)?;
            }
            if stage <= ReactStage::Compile {
                state = self.compile_ops.run(state);
                self.checkpoint(&state, NodeId::CompileOps)?;
            }
            if stage <= ReactStage::Guardrails {
                state = self.guardrails.run(state);
                self.checkpoint(&state, NodeId::GuardrailsCheck)?;
            }
            if stage <= ReactStage::Approval {
                loop {
                    let (next, outcome) = self.approval.run(state);
                    state = next;
                    self.checkpoint(&state, NodeId::HumanApproval)?;
                    match outcome {
                        ApprovalOutcome::Suspend(payload) => {
                            return Ok((state, TickOutcome::AwaitingApproval(payload)));
                        }
                        ApprovalOutcome::Edited => {
                            // Edited params must pass the guardrails again.
                            state = self.guardrails.run(state);
                            self.checkpoint(&state, NodeId::GuardrailsCheck)?;
                        }
                        _ => break,
                    }
                }
            }
            if stage <= ReactStage::Dispatch {
                state = self
                    .dispatch
                    .run(state, self.executor.as_mut(), &thread_id);
                self.checkpoint(&state, NodeId::DispatchSkills)?;
            }
            if stage <= ReactStage::Observe {
                state = self.observe.run(state, self.executor.as_mut());
                self.checkpoint(&state, NodeId::ObserveResult)?;
            }

            let (next, verdict) = self.stop_or_loop.run(state);
            state = next;
            self.checkpoint(&state, NodeId::StopOrLoop)?;

            match verdict {
                LoopVerdict::Exit(reason) => {
                    Self::settle_active_task(&mut state, reason);
                    state.hci.approval_response = None;
                    return Ok((state, TickOutcome::ReactExited(reason)));
                }
                LoopVerdict::Continue => {
                    stage = ReactStage::Observation;
                }
            }
        }
    }

    /// Task bookkeeping on loop exit.
    fn settle_active_task(state: &mut BrainState, reason: StopReason) {
        let status = match reason {
            StopReason::Finished => Some(TaskStatus::Completed),
            StopReason::Aborted | StopReason::UserRejected => Some(TaskStatus::Cancelled),
            _ => None,
        };
        let Some(status) = status else { return };
        if let Some(id) = state.tasks.active_task_id.take() {
            if let Some(task) = state.tasks.queue.iter_mut().find(|t| t.id == id) {
                task.status = status;
            }
            state.trace(format!("[driver] task {id} settled as {status:?}"));
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Mode handlers
    // ─────────────────────────────────────────────────────────────────────

    /// Cancel preemptible work when an IDLE arbitration preempts (user
    /// stop) without entering ReAct.
    fn run_preempt_cancel(&mut self, mut state: BrainState) -> Result<BrainState, DriverError> {
        let to_cancel: Vec<String> = state
            .skills
            .preemptible_running()
            .map(|rs| rs.goal_id.clone())
            .collect();
        if to_cancel.is_empty() {
            return Ok(state);
        }
        let thread_id = self.thread_id.clone();
        state.react.epoch += 1;
        state.react.iter = 0;
        state.react.proposed_ops = Some(ProposedOps {
            to_cancel,
            ..ProposedOps::default()
        });
        state = self
            .dispatch
            .run(state, self.executor.as_mut(), &thread_id);
        state.react.proposed_ops = None;
        self.checkpoint(&state, NodeId::ModeHandler)?;
        Ok(state)
    }

    /// The SAFE/CHARGE one-shot handlers: synthesize a dispatch and push it
    /// through the side-effect and observe nodes, bypassing the oracle.
    fn run_mode_handler(
        &mut self,
        mut state: BrainState,
        mode: Mode,
    ) -> Result<(BrainState, TickOutcome), DriverError> {
        let thread_id = self.thread_id.clone();
        let charger = zones::coordinates("charging_station").unwrap_or((-1.0, 1.0));

        let mut ops = ProposedOps::default();
        match mode {
            Mode::Safe => {
                let moving = state.robot.twist.linear_x.abs() > 1e-6
                    || state.robot.twist.angular_z.abs() > 1e-6;
                ops.to_cancel = state
                    .skills
                    .preemptible_running()
                    .map(|rs| rs.goal_id.clone())
                    .collect();
                if moving || !state.skills.running.is_empty() {
                    ops.to_dispatch.push(DispatchOp {
                        skill_name: "StopBase".to_string(),
                        params: json!({}),
                    });
                    ops.to_speak.push("Safety stop engaged".to_string());
                }
            }
            Mode::Charge => {
                let heading_to_charger = state.skills.running.iter().any(|rs| {
                    rs.skill_name == "NavigateToPose"
                        && rs.params.get("target_x").and_then(Value::as_f64) == Some(charger.0)
                        && rs.params.get("target_y").and_then(Value::as_f64) == Some(charger.1)
                });
                if !heading_to_charger {
                    ops.to_cancel = state
                        .skills
                        .preemptible_running()
                        .map(|rs| rs.goal_id.clone())
                        .collect();
                    ops.to_dispatch.push(DispatchOp {
                        skill_name: "NavigateToPose".to_string(),
                        params: json!({
                            "target_x": charger.0,
                            "target_y": charger.1,
                            "target_theta": 0.0,
                        }),
                    });
                    ops.to_speak
                        .push("Battery low, returning to charging station".to_string());
                }
            }
            _ => {}
        }

        let outcome = match mode {
            Mode::Safe => TickOutcome::SafetyStop,
            _ => TickOutcome::Charging,
        };

        if ops == ProposedOps::default() {
            state.trace(format!("[driver] {mode} handler: nothing to do"));
            return Ok((state, outcome));
        }

        // Handlers get their own side-effect epoch so their keys can never
        // collide with a ReAct pass.
        state.react.epoch += 1;
        state.react.iter = 0;
        state.react.proposed_ops = Some(ops);

        state = self
            .dispatch
            .run(state, self.executor.as_mut(), &thread_id);
        self.checkpoint(&state, NodeId::ModeHandler)?;

        state = self.observe.run(state, self.executor.as_mut());
        state.react.proposed_ops = None;
        self.checkpoint(&state, NodeId::ModeHandler)?;

        Ok((state, outcome))
    }

    fn checkpoint(&mut self, state: &BrainState, node: NodeId) -> Result<(), DriverError> {
        let checkpoint = Checkpoint::capture(&self.thread_id, self.step_index, node, state)?;
        self.checkpointer.save(&checkpoint)?;
        self.step_index += 1;
        Ok(())
    }
}
