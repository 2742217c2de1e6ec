//! `brainstem` – the host binary.
//!
//! Wires the decision core to the in-process simulation adapters and an
//! OpenAI-compatible oracle, then drives it from stdin:
//!
//! 1. Initialises structured logging (optionally OTLP, see [`telemetry`]).
//! 2. Loads `~/.brainstem/config.toml`, writing defaults on first run.
//! 3. Recovers the thread from its latest checkpoint when one exists.
//! 4. Reads utterances line by line; each line is injected and ticked to a
//!    suspension point.  Approval interrupts are answered interactively.
//! 5. Intercepts **Ctrl-C** to issue a final `StopBase` and exit safely.

mod config;
mod telemetry;

use std::io::{BufRead, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use colored::Colorize;
use serde_json::json;
use tracing::warn;

use brainstem_graph::{
    BrainDriver, Checkpointer, FileCheckpointer, MemoryCheckpointer, Recovered,
    SqliteCheckpointer, TickOutcome,
};
use brainstem_react::OpenAiCompatOracle;
use brainstem_skills::{SkillExecutor, SkillRegistry};
use brainstem_sim::SimRig;
use brainstem_types::{ApprovalResponse, BrainState};

use config::{CheckpointBackend, Config};

fn main() {
    let telemetry = telemetry::init("brainstem");
    print_banner();

    // ── Configuration ─────────────────────────────────────────────────────
    let vault = config::vault_path();
    let cfg = match Config::load(&vault) {
        Ok(Some(cfg)) => {
            println!(
                "  Config loaded from {}",
                vault.display().to_string().bold()
            );
            cfg
        }
        Ok(None) => {
            let cfg = Config::default();
            match cfg.save(&vault) {
                Ok(()) => println!(
                    "  First run: defaults written to {}",
                    vault.display().to_string().bold()
                ),
                Err(e) => println!("{}: {e}", "Config error".red()),
            }
            cfg
        }
        Err(e) => {
            println!("{}: {e}", "Config error".red());
            println!("  Using built-in defaults.");
            Config::default()
        }
    };

    // ── Shutdown hook ─────────────────────────────────────────────────────
    let shutdown = Arc::new(AtomicBool::new(false));
    let rig = SimRig::new();
    rig.set_battery(85.0);

    {
        let shutdown = shutdown.clone();
        if let Err(e) = ctrlc::set_handler(move || {
            println!();
            println!("{}", "Ctrl-C received, shutting down ...".yellow().bold());
            shutdown.store(true, Ordering::SeqCst);
        }) {
            warn!(error = %e, "failed to install Ctrl-C handler");
        }
    }

    // ── Driver assembly ───────────────────────────────────────────────────
    let registry = SkillRegistry::builtin();
    let oracle = OpenAiCompatOracle::new(&cfg.oracle_url, &cfg.oracle_model)
        .with_api_key(&cfg.oracle_api_key);

    let checkpointer: Box<dyn Checkpointer> = match cfg.checkpoint_backend {
        CheckpointBackend::Memory => Box::new(MemoryCheckpointer::new()),
        CheckpointBackend::File => match FileCheckpointer::open(&cfg.checkpoint_path) {
            Ok(store) => Box::new(store),
            Err(e) => {
                println!("{}: {e}; falling back to memory", "Checkpoint error".red());
                Box::new(MemoryCheckpointer::new())
            }
        },
        CheckpointBackend::Sqlite => match SqliteCheckpointer::open(&cfg.checkpoint_path) {
            Ok(store) => Box::new(store),
            Err(e) => {
                println!("{}: {e}; falling back to memory", "Checkpoint error".red());
                Box::new(MemoryCheckpointer::new())
            }
        },
    };

    let mut driver = BrainDriver::new(
        cfg.thread_id.clone(),
        Box::new(rig.telemetry()),
        Box::new(rig.world_source()),
        Box::new(oracle),
        Box::new(rig.executor()),
        checkpointer,
    );

    // ── Recovery ──────────────────────────────────────────────────────────
    let mut state = match driver.recover() {
        Ok(Some(Recovered::NeedsTick(state))) => {
            println!("  Recovered thread {} from checkpoint.", cfg.thread_id.bold());
            state
        }
        Ok(Some(Recovered::Outcome(state, outcome))) => {
            println!("  Recovered thread {}: {}", cfg.thread_id.bold(), describe(&outcome));
            state
        }
        Ok(None) => BrainDriver::initial_state(&registry),
        Err(e) => {
            println!("{}: {e}", "Recovery error".red());
            BrainDriver::initial_state(&registry)
        }
    };

    println!();
    println!(
        "  Type a command ({}), or press Enter to tick. Ctrl-C exits.",
        "\"go to kitchen\"".bold().cyan()
    );
    println!();

    // ── Tick loop ─────────────────────────────────────────────────────────
    let stdin = std::io::stdin();
    while !shutdown.load(Ordering::SeqCst) {
        print!("{}", "you> ".bold());
        std::io::stdout().flush().ok();

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break, // EOF
            Ok(_) => {}
            Err(_) => break,
        }
        if shutdown.load(Ordering::SeqCst) {
            break;
        }

        state.hci.user_utterance = line.trim().to_string();

        match driver.tick(state) {
            Ok((next, outcome)) => {
                state = next;
                report(&state, &outcome);
                state = match outcome {
                    TickOutcome::AwaitingApproval(payload) => {
                        handle_approval(&mut driver, state, &payload)
                    }
                    _ => state,
                };
            }
            Err(e) => {
                println!("{}: {e}", "Driver error".red());
                state = BrainDriver::initial_state(&registry);
            }
        }
    }

    // Leave the base stopped on the way out, then flush the exporter.
    let mut executor = rig.executor();
    let _ = executor.dispatch("StopBase", &json!({}), "shutdown:stop_base");
    telemetry.shutdown();
    println!("{}", "  Base stopped. Bye.".green());
}

/// Prompt the operator for an approval verdict and resume the thread.
fn handle_approval(
    driver: &mut BrainDriver,
    state: BrainState,
    payload: &serde_json::Value,
) -> BrainState {
    println!(
        "{} {}",
        "approval needed:".yellow().bold(),
        payload
    );
    print!("  approve / reject / edit {{json}} > ");
    std::io::stdout().flush().ok();

    let mut line = String::new();
    if std::io::stdin().lock().read_line(&mut line).is_err() {
        return state;
    }
    let line = line.trim();

    let response = if line.eq_ignore_ascii_case("approve") {
        ApprovalResponse::Approve
    } else if let Some(raw) = line.strip_prefix("edit ") {
        match serde_json::from_str(raw) {
            Ok(params) => ApprovalResponse::Edit { params },
            Err(e) => {
                println!("{}: {e}; rejecting", "Bad edit payload".red());
                ApprovalResponse::Reject
            }
        }
    } else {
        ApprovalResponse::Reject
    };

    match driver.resume(state, response) {
        Ok((state, outcome)) => {
            report(&state, &outcome);
            state
        }
        Err(e) => {
            println!("{}: {e}", "Resume error".red());
            BrainState::new()
        }
    }
}

fn report(state: &BrainState, outcome: &TickOutcome) {
    println!(
        "  mode={} battery={:.0}% pos=({:.1}, {:.1}) -> {}",
        state.tasks.mode.to_string().bold(),
        state.robot.battery_pct,
        state.robot.pose.x,
        state.robot.pose.y,
        describe(outcome).cyan()
    );
    if let Some(line) = state.trace.log.last() {
        println!("  {}", line.dimmed());
    }
}

fn describe(outcome: &TickOutcome) -> String {
    match outcome {
        TickOutcome::Idle => "idle".to_string(),
        TickOutcome::SafetyStop => "safety stop".to_string(),
        TickOutcome::Charging => "heading to charger".to_string(),
        TickOutcome::ReactExited(reason) => format!("react exited: {reason}"),
        TickOutcome::AwaitingApproval(_) => "awaiting approval".to_string(),
    }
}

fn print_banner() {
    println!();
    println!("{}", r#"   ___               _           __"#.bold().cyan());
    println!("{}", r#"  / _ )_______ _____(_)__  ___  / /____ __ _"#.bold().cyan());
    println!("{}", r#" / _  / __/ _ `/ __/ / _ \(_-< / __/ -_)  ' \"#.bold().cyan());
    println!("{}", r#"/____/_/  \_,_/_/ /_/_//_/___/ \__/\__/_/_/_/"#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "Brainstem".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Mobile-robot decision core (simulated rig)");
    println!();
}
