//! K1 – HCI ingress: lexical intent recognition.
//!
//! Classifies the latest user utterance into exactly one interrupt kind.
//! Recognition is lexical only: case-insensitive, whitespace-trimmed keyword
//! and prefix matching, English and Chinese.  The original utterance is
//! always preserved verbatim; semantic understanding of anything richer is
//! the oracle's job, not this node's.

use brainstem_types::{BrainState, UserInterrupt};

const STOP_KEYWORDS: &[&str] = &["stop", "halt", "emergency", "停止", "急停", "紧急停止", "取消"];
const PAUSE_KEYWORDS: &[&str] = &["pause", "wait", "hold", "暂停", "等等"];
const GOAL_PREFIXES: &[&str] = &["go to ", "navigate to ", "head to ", "去", "导航到", "前往"];

/// K1 node.  Writes `hci`.
#[derive(Debug, Clone, Copy, Default)]
pub struct HciIngress;

impl HciIngress {
    pub fn new() -> Self {
        Self
    }

    /// Classify the utterance currently in `hci.user_utterance`.
    pub fn run(&self, mut state: BrainState) -> BrainState {
        let interrupt = Self::parse_intent(&state.hci.user_utterance);
        state.trace(format!(
            "[hci_ingress] intent={} utterance={:?}",
            interrupt.kind(),
            state.hci.user_utterance
        ));
        state.hci.user_interrupt = interrupt;
        state
    }

    /// Map an utterance to an interrupt kind.
    ///
    /// Priority: stop keywords, then pause keywords, then goal prefixes.
    /// Anything else (including empty input) is no interrupt.
    pub fn parse_intent(utterance: &str) -> UserInterrupt {
        let text = utterance.trim().to_lowercase();
        if text.is_empty() {
            return UserInterrupt::None;
        }

        if STOP_KEYWORDS.iter().any(|k| text.contains(k)) {
            return UserInterrupt::Stop;
        }
        if PAUSE_KEYWORDS.iter().any(|k| text.contains(k)) {
            return UserInterrupt::Pause;
        }
        for prefix in GOAL_PREFIXES {
            if let Some(rest) = text.find(prefix).map(|i| &text[i + prefix.len()..]) {
                let target = rest.trim();
                if !target.is_empty() {
                    return UserInterrupt::NewGoal {
                        goal_text: target.to_string(),
                    };
                }
            }
        }

        UserInterrupt::None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_utterance_is_none() {
        assert_eq!(HciIngress::parse_intent(""), UserInterrupt::None);
        assert_eq!(HciIngress::parse_intent("   "), UserInterrupt::None);
    }

    #[test]
    fn stop_keywords_recognised() {
        for u in ["stop", "STOP", "  Stop  ", "please stop now", "紧急停止", "急停"] {
            assert_eq!(HciIngress::parse_intent(u), UserInterrupt::Stop, "{u}");
        }
    }

    #[test]
    fn pause_keywords_recognised() {
        for u in ["pause", "Pause here", "暂停", "等等"] {
            assert_eq!(HciIngress::parse_intent(u), UserInterrupt::Pause, "{u}");
        }
    }

    #[test]
    fn goal_patterns_extract_target() {
        assert_eq!(
            HciIngress::parse_intent("go to kitchen"),
            UserInterrupt::NewGoal {
                goal_text: "kitchen".to_string()
            }
        );
        assert_eq!(
            HciIngress::parse_intent("Navigate to the bedroom"),
            UserInterrupt::NewGoal {
                goal_text: "the bedroom".to_string()
            }
        );
        assert_eq!(
            HciIngress::parse_intent("去厨房"),
            UserInterrupt::NewGoal {
                goal_text: "厨房".to_string()
            }
        );
    }

    #[test]
    fn stop_wins_over_goal_pattern() {
        // "stop" anywhere outranks a goal phrase in the same utterance.
        assert_eq!(
            HciIngress::parse_intent("stop, do not go to kitchen"),
            UserInterrupt::Stop
        );
    }

    #[test]
    fn unmatched_utterance_is_none() {
        assert_eq!(
            HciIngress::parse_intent("what a lovely day"),
            UserInterrupt::None
        );
    }

    #[test]
    fn goal_prefix_without_target_is_none() {
        assert_eq!(HciIngress::parse_intent("go to "), UserInterrupt::None);
    }

    #[test]
    fn run_preserves_utterance_verbatim() {
        let mut state = BrainState::new();
        state.hci.user_utterance = "  Go To Kitchen  ".to_string();
        let state = HciIngress::new().run(state);
        assert_eq!(state.hci.user_utterance, "  Go To Kitchen  ");
        assert_eq!(
            state.hci.user_interrupt,
            UserInterrupt::NewGoal {
                goal_text: "kitchen".to_string()
            }
        );
    }

    #[test]
    fn run_classifies_into_exactly_one_kind() {
        // Exhaustive classification: any utterance lands in one of the four.
        for u in ["", "stop", "pause", "go to kitchen", "hello there"] {
            let mut state = BrainState::new();
            state.hci.user_utterance = u.to_string();
            let state = HciIngress::new().run(state);
            let kind = state.hci.user_interrupt.kind();
            assert!(["NONE", "PAUSE", "STOP", "NEW_GOAL"].contains(&kind));
        }
    }

    #[test]
    fn run_appends_trace() {
        let mut state = BrainState::new();
        state.hci.user_utterance = "stop".to_string();
        let state = HciIngress::new().run(state);
        assert!(state.trace.log.iter().any(|l| l.contains("[hci_ingress]")));
    }
}
