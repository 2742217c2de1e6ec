//! `brainstem-react` – The Inner ReAct Loop
//!
//! While the kernel is in EXEC, the graph driver repeats R1 through R8 until
//! a stop condition fires: build an observation, ask the oracle for a
//! structured decision, compile it into operations, validate them against
//! the guardrails, optionally wait for human approval, dispatch, observe
//! results, and decide whether to loop.
//!
//! # Modules
//!
//! - [`oracle`] – the [`DecisionOracle`][oracle::DecisionOracle] contract,
//!   the blocking OpenAI-compatible HTTP driver, and a scripted test oracle.
//! - [`observation`] – R1: compose the structured observation.
//! - [`decide`] – R2: call the oracle and parse its output with validated
//!   fallback.
//! - [`compile_ops`] – R3: translate a decision into cancel/dispatch/speak
//!   operations.
//! - [`guardrails`] – R4: skill existence, argument schema, and resource
//!   conflict checks; the only place resource conflicts are decided.
//! - [`approval`] – R5: the human-in-the-loop gate; suspends the graph.
//! - [`dispatch`] – R6: the sole side-effecting node, idempotency-keyed.
//! - [`observe`] – R7: poll running skills, publish results, track failure
//!   streaks.
//! - [`stop_or_loop`] – R8: ordered exit conditions.

pub mod approval;
pub mod compile_ops;
pub mod decide;
pub mod dispatch;
pub mod guardrails;
pub mod observation;
pub mod observe;
pub mod oracle;
pub mod stop_or_loop;

pub use approval::{ApprovalGate, ApprovalOutcome};
pub use compile_ops::CompileOps;
pub use decide::Decide;
pub use dispatch::DispatchSkills;
pub use guardrails::GuardrailsCheck;
pub use observation::BuildObservation;
pub use observe::ObserveResult;
pub use oracle::{DecisionOracle, OpenAiCompatOracle, OracleError, ScriptedOracle};
pub use stop_or_loop::{LoopVerdict, StopOrLoop};
