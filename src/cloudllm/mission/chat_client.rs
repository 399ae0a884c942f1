//! Chat Client Wrapper (§4.1).
//!
//! Wraps any [`ClientWrapper`](crate::client_wrapper::ClientWrapper) with a per-call timeout,
//! bounded exponential-backoff retries, and error categorization, so upstream flakiness never
//! directly leaks into the mission scheduler.

use crate::client_wrapper::{ClientWrapper, Message, TokenUsage};
use crate::cloudllm::mission::error::{ChatClientError, ChatErrorKind};
use log::{debug, warn};
use std::sync::Arc;
use std::time::Duration;

/// The text and usage accounting returned by a successful chat completion.
#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub content: String,
    pub usage: TokenUsage,
}

/// Per-wrapper retry/timeout policy. Defaults match §4.1.
#[derive(Debug, Clone)]
pub struct ChatClientPolicy {
    pub timeout: Duration,
    pub max_retries: usize,
    pub base_backoff: Duration,
}

impl Default for ChatClientPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            max_retries: 3,
            base_backoff: Duration::from_secs(1),
        }
    }
}

/// Categorizes an upstream error by inspecting its message, the way a thin HTTP wrapper
/// without structured status codes must (the provider client returns `Box<dyn Error>`).
fn classify(message: &str) -> ChatErrorKind {
    let lower = message.to_lowercase();
    if lower.contains("rate limit") || lower.contains("429") || lower.contains("too many requests")
    {
        ChatErrorKind::RateLimit
    } else if lower.contains("timeout") || lower.contains("timed out") {
        ChatErrorKind::Timeout
    } else if lower.contains("invalid") || lower.contains("400") || lower.contains("validation") {
        ChatErrorKind::Validation
    } else {
        ChatErrorKind::System
    }
}

fn to_chat_error(kind: ChatErrorKind, message: String) -> ChatClientError {
    match kind {
        ChatErrorKind::RateLimit => ChatClientError::RateLimit(message),
        ChatErrorKind::Timeout => ChatClientError::Timeout(Duration::from_secs(0)),
        ChatErrorKind::Validation => ChatClientError::Validation(message),
        ChatErrorKind::System => ChatClientError::System(message),
    }
}

/// A timeout + retry-with-backoff wrapper around a single [`ClientWrapper`].
pub struct ChatClientWrapper {
    client: Arc<dyn ClientWrapper>,
    policy: ChatClientPolicy,
}

impl ChatClientWrapper {
    pub fn new(client: Arc<dyn ClientWrapper>) -> Self {
        Self {
            client,
            policy: ChatClientPolicy::default(),
        }
    }

    pub fn with_policy(client: Arc<dyn ClientWrapper>, policy: ChatClientPolicy) -> Self {
        Self { client, policy }
    }

    /// Submit `messages` and return the response content plus usage counts, retrying
    /// transient failures with exponential backoff. Never retries a `Validation` error.
    pub async fn complete(&self, messages: &[Message]) -> Result<ChatResponse, ChatClientError> {
        let mut attempt = 0usize;
        loop {
            let call = self.client.send_message(messages, None);
            let outcome = tokio::time::timeout(self.policy.timeout, call).await;

            let err = match outcome {
                Ok(Ok(msg)) => {
                    let usage = self
                        .client
                        .get_last_usage()
                        .await
                        .unwrap_or(TokenUsage {
                            input_tokens: 0,
                            output_tokens: 0,
                            total_tokens: 0,
                        });
                    return Ok(ChatResponse {
                        content: msg.content.to_string(),
                        usage,
                    });
                }
                Ok(Err(e)) => {
                    let kind = classify(&e.to_string());
                    to_chat_error(kind, e.to_string())
                }
                Err(_elapsed) => ChatClientError::Timeout(self.policy.timeout),
            };

            if !err.is_retryable() || attempt >= self.policy.max_retries {
                warn!(target: "mission::chat_client", "giving up after {} attempt(s): {}", attempt + 1, err);
                return Err(err);
            }

            let backoff = self.policy.base_backoff * 2u32.pow(attempt as u32);
            debug!(target: "mission::chat_client", "retrying after {:?} (attempt {}): {}", backoff, attempt + 1, err);
            tokio::time::sleep(backoff).await;
            attempt += 1;
        }
    }
}
