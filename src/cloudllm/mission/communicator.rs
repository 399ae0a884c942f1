//! Agent Communicator (§4.5).
//!
//! The structured prompt/response protocol every scheduler phase talks through: per-agent
//! conversation histories bounded to a trailing window, plain-text `ask`, and a JSON pipeline
//! (`get_json`) that extracts a fenced or balanced JSON value from a response and retries
//! error-aware re-prompts up to `MAX_JSON_RETRIES` times.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::client_wrapper::{Message, Role};
use crate::cloudllm::mission::chat_client::ChatClientWrapper;
use crate::cloudllm::mission::cost::{cost_record, CostRecord};
use crate::cloudllm::mission::error::CommunicatorError;

/// One recorded `get_json` attempt, persisted into the caller-supplied retry log (§4.5).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct JsonAttempt {
    pub timestamp: DateTime<Utc>,
    pub agent: String,
    pub prompt: String,
    pub raw_response: String,
    pub extracted_snippet: Option<String>,
    pub parsed: Option<Value>,
    pub parse_error: Option<String>,
    pub cost: f64,
}

const JSON_INSTRUCTION: &str =
    "\n\nRespond with a single JSON value only. Do not include any prose, explanation, or \
     markdown fencing outside the JSON value itself.";

/// Extract a JSON value from free-form LLM output: try a fenced ```json``` block first,
/// then the first balanced `{...}` or `[...]` substring (§4.5).
pub fn extract_json(text: &str) -> Option<(String, Value)> {
    if let Some(start) = text.find("```json") {
        let after = &text[start + 7..];
        if let Some(end) = after.find("```") {
            let snippet = after[..end].trim().to_string();
            if let Ok(value) = serde_json::from_str::<Value>(&snippet) {
                return Some((snippet, value));
            }
        }
    }
    for (open, close) in [('{', '}'), ('[', ']')] {
        if let Some((snippet, value)) = extract_balanced(text, open, close) {
            return Some((snippet, value));
        }
    }
    None
}

fn extract_balanced(text: &str, open: char, close: char) -> Option<(String, Value)> {
    let bytes: Vec<char> = text.chars().collect();
    let start = bytes.iter().position(|&c| c == open)?;
    let mut depth = 0i32;
    for (offset, &c) in bytes[start..].iter().enumerate() {
        if c == open {
            depth += 1;
        } else if c == close {
            depth -= 1;
            if depth == 0 {
                let end = start + offset + 1;
                let snippet: String = bytes[start..end].iter().collect();
                if let Ok(value) = serde_json::from_str::<Value>(&snippet) {
                    return Some((snippet, value));
                }
                return None;
            }
        }
    }
    None
}

/// Per-agent conversation state plus the shared chat client, the Communicator's two
/// responsibilities per §4.5.
pub struct Communicator {
    chat: Arc<ChatClientWrapper>,
    model: String,
    history_limit: usize,
    max_json_retries: usize,
    histories: Mutex<HashMap<String, VecDeque<Message>>>,
    personas: Mutex<HashMap<String, String>>,
}

impl Communicator {
    pub fn new(chat: Arc<ChatClientWrapper>, model: impl Into<String>) -> Self {
        Self {
            chat,
            model: model.into(),
            history_limit: 20,
            max_json_retries: 2,
            histories: Mutex::new(HashMap::new()),
            personas: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_limits(mut self, history_limit: usize, max_json_retries: usize) -> Self {
        self.history_limit = history_limit;
        self.max_json_retries = max_json_retries;
        self
    }

    /// Register (or overwrite) an agent's standing system prompt, used by `ask` unless a
    /// call-specific `system_prompt` is supplied.
    pub async fn register_persona(&self, agent: impl Into<String>, system_prompt: impl Into<String>) {
        self.personas
            .lock()
            .await
            .insert(agent.into(), system_prompt.into());
    }

    pub async fn known_agents(&self) -> Vec<String> {
        self.personas.lock().await.keys().cloned().collect()
    }

    async fn push_history(&self, agent: &str, message: Message) {
        let mut histories = self.histories.lock().await;
        let entry = histories.entry(agent.to_string()).or_default();
        entry.push_back(message);
        while entry.len() > self.history_limit {
            entry.pop_front();
        }
    }

    /// `ask(agent, prompt, system_prompt?, expect_json?, include_history?) -> (content, cost)`.
    pub async fn ask(
        &self,
        agent: &str,
        prompt: &str,
        system_prompt: Option<&str>,
        expect_json: bool,
        include_history: bool,
    ) -> Result<(String, CostRecord), CommunicatorError> {
        let persona = match system_prompt {
            Some(s) => Some(s.to_string()),
            None => self.personas.lock().await.get(agent).cloned(),
        };

        let mut messages = Vec::new();
        if let Some(system_prompt) = &persona {
            messages.push(Message {
                role: Role::System,
                content: Arc::from(system_prompt.as_str()),
                tool_calls: vec![],
            });
        }
        if include_history {
            let histories = self.histories.lock().await;
            if let Some(history) = histories.get(agent) {
                messages.extend(history.iter().cloned());
            }
        }

        let final_prompt = if expect_json && !prompt.to_lowercase().contains("json") {
            format!("{prompt}{JSON_INSTRUCTION}")
        } else {
            prompt.to_string()
        };

        let user_message = Message {
            role: Role::User,
            content: Arc::from(final_prompt.as_str()),
            tool_calls: vec![],
        };
        messages.push(user_message.clone());

        let response = self.chat.complete(&messages).await?;
        if response.content.trim().is_empty() {
            return Err(CommunicatorError::EmptyResponse(agent.to_string()));
        }

        self.push_history(agent, user_message).await;
        self.push_history(
            agent,
            Message {
                role: Role::Assistant,
                content: Arc::from(response.content.as_str()),
                tool_calls: vec![],
            },
        )
        .await;

        let cost = cost_record(&response.usage, &self.model);
        Ok((response.content, cost))
    }

    /// `get_json(agent, prompt, error_msg, retry_log, retries=0) -> (parsed, cost)`. Every
    /// attempt (success or failure) is appended to `retry_log`; the returned cost is the sum
    /// across all attempts made.
    pub async fn get_json(
        &self,
        agent: &str,
        prompt: &str,
        error_msg: &str,
        retry_log: &mut Vec<JsonAttempt>,
    ) -> Result<(Value, f64), CommunicatorError> {
        let mut attempt_prompt = prompt.to_string();
        let mut total_cost = 0.0;

        for attempt in 0..=self.max_json_retries {
            let (raw, cost_record) = self
                .ask(agent, &attempt_prompt, None, true, false)
                .await?;
            total_cost += cost_record.cost;

            let extracted = extract_json(&raw);
            let (snippet, parsed, parse_error) = match &extracted {
                Some((snippet, value)) => (Some(snippet.clone()), Some(value.clone()), None),
                None => (None, None, Some("no parseable JSON found in response".to_string())),
            };

            retry_log.push(JsonAttempt {
                timestamp: Utc::now(),
                agent: agent.to_string(),
                prompt: attempt_prompt.clone(),
                raw_response: raw.clone(),
                extracted_snippet: snippet,
                parsed: parsed.clone(),
                parse_error: parse_error.clone(),
                cost: cost_record.cost,
            });

            if let Some(value) = parsed {
                return Ok((value, total_cost));
            }

            if attempt < self.max_json_retries {
                attempt_prompt = format!(
                    "{prompt}\n\n{error_msg}\n\nYour previous response could not be parsed as \
                     JSON: {}\n\nPlease try again.",
                    parse_error.unwrap_or_default()
                );
            }
        }

        Err(CommunicatorError::JsonParseFailed(
            agent.to_string(),
            self.max_json_retries + 1,
            error_msg.to_string(),
        ))
    }
}
