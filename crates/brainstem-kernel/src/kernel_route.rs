//! K6 – kernel route: map the arbitrated mode to a handler.
//!
//! Writes nothing structural; the routing token tells the graph driver
//! whether to run the SAFE/CHARGE one-shot handlers, enter the ReAct loop,
//! or yield the tick.

use brainstem_types::{BrainState, Mode};

/// Where the driver goes after the kernel pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteTarget {
    /// Synthesize a StopBase dispatch, bypassing ReAct.
    SafeHandler,
    /// Synthesize a NavigateToPose to the charging station, bypassing ReAct.
    ChargeHandler,
    /// Enter the ReAct inner loop.
    ReactLoop,
    /// Nothing to do this tick.
    IdleWait,
}

impl std::fmt::Display for RouteTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RouteTarget::SafeHandler => "safe_handler",
            RouteTarget::ChargeHandler => "charge_handler",
            RouteTarget::ReactLoop => "react_loop",
            RouteTarget::IdleWait => "idle_wait",
        };
        write!(f, "{s}")
    }
}

/// K6 node.
#[derive(Debug, Clone, Copy, Default)]
pub struct KernelRoute;

impl KernelRoute {
    pub fn new() -> Self {
        Self
    }

    pub fn run(&self, mut state: BrainState) -> BrainState {
        let target = Self::target(state.tasks.mode);
        state.trace(format!(
            "[kernel_route] mode={} -> {target}",
            state.tasks.mode
        ));
        state
            .trace
            .metrics
            .insert("route_target".to_string(), serde_json::json!(target.to_string()));
        state
    }

    /// The routing token for a mode.
    pub fn target(mode: Mode) -> RouteTarget {
        match mode {
            Mode::Safe => RouteTarget::SafeHandler,
            Mode::Charge => RouteTarget::ChargeHandler,
            Mode::Exec => RouteTarget::ReactLoop,
            Mode::Idle => RouteTarget::IdleWait,
        }
    }
}
