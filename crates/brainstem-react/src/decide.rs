//! R2 – oracle decision with validated fallback.
//!
//! Assembles the prompt (decision guidelines, the `Decision` JSON schema,
//! the registry digest, the trailing conversation, and the fresh
//! observation), calls the oracle, and parses the reply.  Parsing is
//! forgiving about packaging and strict about the verdict: strict JSON
//! first, then the largest balanced `{...}` substring, and anything that
//! still fails - or carries an unknown `type` - becomes
//! `ASK_HUMAN / "malformed_decision"` so a confused oracle can never drive
//! the robot.

use brainstem_types::{BrainState, Decision, DecisionKind, Message, SkillOp};

use crate::oracle::DecisionOracle;

/// How many trailing messages are replayed to the oracle.
const HISTORY_WINDOW: usize = 10;

/// Fixed behavioural preamble injected into every system prompt.
pub const DECISION_GUIDELINES: &str = "\
You are the decision core of a mobile service robot.\n\
Reply with ONE JSON object matching the Decision schema, nothing else.\n\
Decision types: CONTINUE, REPLAN, RETRY, SWITCH_TASK, ASK_HUMAN, FINISH, ABORT.\n\
Use FINISH when the active goal is achieved, ABORT only when it is impossible.\n\
Prefer REPLAN over repeating an action that just failed.\n\
The reason field is shown to the user; keep it short and friendly.";

/// R2 node.  Writes `react.decision`, `messages`, trace; consumes the
/// pending user utterance once it has been handed to the oracle.
#[derive(Debug, Clone, Copy, Default)]
pub struct Decide;

impl Decide {
    pub fn new() -> Self {
        Self
    }

    pub fn run(&self, mut state: BrainState, oracle: &mut dyn DecisionOracle) -> BrainState {
        // The pending utterance joins the durable transcript exactly once;
        // clearing it keeps later iterations from replaying it as fresh
        // input.
        if !state.hci.user_utterance.is_empty() {
            state
                .messages
                .push(Message::user(state.hci.user_utterance.clone()));
            state.hci.user_utterance.clear();
        }

        let prompt = Self::prepare_messages(&state);
        let decision = match oracle.decide(&prompt) {
            Ok(raw) => {
                state.messages.push(Message::decision(raw.clone()));
                Self::parse_decision(&raw)
            }
            Err(e) => {
                state.trace(format!("[react_decide] oracle error: {e}"));
                Decision::with_reason(DecisionKind::AskHuman, "malformed_decision")
            }
        };

        state.trace(format!(
            "[react_decide] decision={} reason={:?}",
            decision.kind, decision.reason
        ));
        tracing::debug!(kind = %decision.kind, "oracle decision");

        state.react.decision = Some(decision);
        state
    }

    /// The full transcript handed to the oracle.
    pub fn prepare_messages(state: &BrainState) -> Vec<Message> {
        let mut messages = Vec::new();
        messages.push(Message::new(
            brainstem_types::Role::System,
            brainstem_types::MessageKind::Chat,
            Self::system_prompt(state),
        ));

        let start = state.messages.len().saturating_sub(HISTORY_WINDOW);
        messages.extend(state.messages[start..].iter().cloned());

        if !state.hci.user_utterance.is_empty() {
            messages.push(Message::user(state.hci.user_utterance.clone()));
        }
        messages
    }

    fn system_prompt(state: &BrainState) -> String {
        let schema = schemars::schema_for!(Decision);
        let schema_json =
            serde_json::to_string(&schema).unwrap_or_else(|_| "{}".to_string());
        format!(
            "{DECISION_GUIDELINES}\n\n## Decision JSON schema\n{schema_json}\n\n## {}",
            Self::registry_digest(state)
        )
    }

    fn registry_digest(state: &BrainState) -> String {
        if state.skills.registry.is_empty() {
            return "Available skills: none".to_string();
        }
        let mut lines = vec!["Available skills:".to_string()];
        for def in state.skills.registry.values() {
            lines.push(format!(
                "- {} (timeout {}s, required args: {})",
                def.name,
                def.timeout_s,
                def.args_schema
                    .get("required")
                    .map(|r| r.to_string())
                    .unwrap_or_else(|| "[]".to_string()),
            ));
        }
        lines.join("\n")
    }

    /// Parse raw oracle text into a `Decision` with validated fallback.
    pub fn parse_decision(raw: &str) -> Decision {
        let value = serde_json::from_str::<serde_json::Value>(raw).ok().or_else(|| {
            Self::largest_balanced_object(raw)
                .and_then(|s| serde_json::from_str::<serde_json::Value>(s).ok())
        });

        let Some(value) = value else {
            return Decision::with_reason(DecisionKind::AskHuman, "malformed_decision");
        };

        let kind = value
            .get("type")
            .and_then(|t| t.as_str())
            .and_then(|t| serde_json::from_value::<DecisionKind>(serde_json::json!(t)).ok());
        let Some(kind) = kind else {
            return Decision::with_reason(DecisionKind::AskHuman, "malformed_decision");
        };

        // Verdict is valid; remaining fields degrade field-by-field, with
        // reason and ops preserved verbatim whenever they are present.
        let reason = value
            .get("reason")
            .and_then(|r| r.as_str())
            .unwrap_or("")
            .to_string();
        let plan_patch = value
            .get("plan_patch")
            .filter(|p| !p.is_null())
            .cloned();
        let ops = value
            .get("ops")
            .and_then(|o| o.as_array())
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|entry| {
                        let skill = entry.get("skill")?.as_str()?.to_string();
                        let params = entry
                            .get("params")
                            .cloned()
                            .unwrap_or(serde_json::json!({}));
                        Some(SkillOp { skill, params })
                    })
                    .collect()
            })
            .unwrap_or_default();

        Decision {
            kind,
            reason,
            plan_patch,
            ops,
        }
    }

    /// The largest balanced `{...}` substring, brace-depth tracked.
    fn largest_balanced_object(text: &str) -> Option<&str> {
        let bytes = text.as_bytes();
        let mut best: Option<(usize, usize)> = None;
        let mut start = None;
        let mut depth = 0usize;
        let mut in_string = false;
        let mut escaped = false;

        for (i, &b) in bytes.iter().enumerate() {
            if in_string {
                if escaped {
                    escaped = false;
                } else if b == b'\\' {
                    escaped = true;
                } else if b == b'"' {
                    in_string = false;
                }
                continue;
            }
            match b {
                b'"' => in_string = true,
                b'{' => {
                    if depth == 0 {
                        start = Some(i);
                    }
                    depth += 1;
                }
                b'}' => {
                    if depth > 0 {
                        depth -= 1;
                        if depth == 0 {
                            if let Some(s) = start {
                                let len = i + 1 - s;
                                if best.map(|(bs, be)| be - bs < len).unwrap_or(true) {
                                    best = Some((s, i + 1));
                                }
                            }
                        }
                    }
                }
                _ => {}
            }
        }
        best.map(|(s, e)| &text[s..e])
    }
}
