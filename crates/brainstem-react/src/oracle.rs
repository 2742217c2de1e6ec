//! [`DecisionOracle`] – the language-model seam.
//!
//! The decide node hands the oracle a message transcript and gets raw text
//! back; all parsing and fallback happens in the core, never in the
//! adapter.  The shipped [`OpenAiCompatOracle`] talks to any server
//! exposing an OpenAI-compatible `/v1/chat/completions` endpoint, such as
//! [Ollama](https://ollama.com) or a vLLM deployment.
//!
//! # Example
//!
//! ```rust,no_run
//! use brainstem_react::oracle::{DecisionOracle, OpenAiCompatOracle};
//! use brainstem_types::Message;
//!
//! let mut oracle = OpenAiCompatOracle::new("http://localhost:11434", "qwen2.5");
//! // Requires a running model server; skipped in unit tests.
//! // let raw = oracle.decide(&[Message::user("go to kitchen")]).unwrap();
//! ```

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use brainstem_types::{Message, Role};

/// Errors that can arise from oracle operations.
#[derive(Error, Debug)]
pub enum OracleError {
    /// The HTTP request to the model server failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    /// The response from the model server had an unexpected shape.
    #[error("unexpected response format: {0}")]
    BadResponse(String),
}

/// Produces raw decision text from a message transcript.
pub trait DecisionOracle {
    fn decide(&mut self, messages: &[Message]) -> Result<String, OracleError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Wire shapes (OpenAI-compatible)
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct WireMessage<'a> {
    role: Role,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    stream: bool,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// OpenAiCompatOracle
// ─────────────────────────────────────────────────────────────────────────────

/// A synchronous client for an OpenAI-compatible chat-completions endpoint.
///
/// Construct once and reuse across ReAct iterations.
pub struct OpenAiCompatOracle {
    base_url: String,
    model: String,
    api_key: Option<String>,
    client: reqwest::blocking::Client,
}

impl OpenAiCompatOracle {
    /// Create a new oracle pointing at `base_url` (e.g.
    /// `"http://localhost:11434"`) and using `model`.
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            model: model.into(),
            api_key: None,
            client: reqwest::blocking::Client::new(),
        }
    }

    /// Attach a bearer token for hosted endpoints.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        let key = key.into();
        if !key.is_empty() {
            self.api_key = Some(key);
        }
        self
    }
}

impl DecisionOracle for OpenAiCompatOracle {
    fn decide(&mut self, messages: &[Message]) -> Result<String, OracleError> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = ChatRequest {
            model: &self.model,
            messages: messages
                .iter()
                .map(|m| WireMessage {
                    role: m.role,
                    content: &m.content,
                })
                .collect(),
            stream: false,
        };

        let mut request = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response: ChatResponse = request.send()?.error_for_status()?.json()?;

        response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| OracleError::BadResponse("empty choices array".into()))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ScriptedOracle
// ─────────────────────────────────────────────────────────────────────────────

/// A deterministic oracle for tests and offline bring-up: returns queued
/// responses in order, then a bare CONTINUE decision forever.
#[derive(Debug, Default)]
pub struct ScriptedOracle {
    responses: VecDeque<String>,
    pub calls: usize,
}

impl ScriptedOracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a raw response to be returned by the next `decide` call.
    pub fn push(&mut self, response: impl Into<String>) {
        self.responses.push_back(response.into());
    }

    pub fn with_responses<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            responses: responses.into_iter().map(Into::into).collect(),
            calls: 0,
        }
    }
}

impl DecisionOracle for ScriptedOracle {
    fn decide(&mut self, _messages: &[Message]) -> Result<String, OracleError> {
        self.calls += 1;
        Ok(self.responses.pop_front().unwrap_or_else(|| {
            r#"{"type": "CONTINUE", "reason": "plan in progress", "ops": []}"#.to_string()
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_message_serializes_lowercase_role() {
        let msg = WireMessage {
            role: Role::System,
            content: "hello",
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"system\""));
    }

    #[test]
    fn chat_request_shape() {
        let body = ChatRequest {
            model: "qwen2.5",
            messages: vec![WireMessage {
                role: Role::User,
                content: "go to kitchen",
            }],
            stream: false,
        };
        let json = serde_json::to_string(&body).unwrap();
        assert!(json.contains("\"model\":\"qwen2.5\""));
        assert!(json.contains("\"stream\":false"));
    }

    #[test]
    fn chat_response_parses() {
        let raw = r#"{"choices": [{"message": {"role": "assistant", "content": "{}"}}]}"#;
        let response: ChatResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(response.choices.len(), 1);
        assert_eq!(response.choices[0].message.content, "{}");
    }

    #[test]
    fn oracle_constructs_without_panic() {
        let _oracle = OpenAiCompatOracle::new("http://localhost:11434", "qwen2.5")
            .with_api_key("secret");
    }

    #[test]
    fn scripted_oracle_returns_in_order_then_continue() {
        let mut oracle =
            ScriptedOracle::with_responses([r#"{"type": "FINISH", "reason": "done"}"#]);
        let first = oracle.decide(&[]).unwrap();
        assert!(first.contains("FINISH"));
        let second = oracle.decide(&[]).unwrap();
        assert!(second.contains("CONTINUE"));
        assert_eq!(oracle.calls, 2);
    }
}
