//! Error taxonomy for the mission orchestration engine.
//!
//! Each component defines a narrow error enum for its own failure modes; all of them convert
//! (`#[from]`) into [`OrchestrationError`] at the scheduler boundary, matching this crate's
//! convention of typed error enums at component seams (see `tool_protocol::ToolError`,
//! `resource_protocol::ResourceError`).

use thiserror::Error;

/// Coarse classification of a Chat Client Wrapper failure, per §4.1.
///
/// `Validation` errors are never retried; the other three are retried with bounded
/// exponential backoff before being surfaced to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatErrorKind {
    RateLimit,
    Timeout,
    Validation,
    System,
}

#[derive(Debug, Error)]
pub enum ChatClientError {
    #[error("LLM call timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("LLM call rate-limited: {0}")]
    RateLimit(String),
    #[error("LLM call rejected as invalid: {0}")]
    Validation(String),
    #[error("LLM call failed: {0}")]
    System(String),
}

impl ChatClientError {
    pub fn kind(&self) -> ChatErrorKind {
        match self {
            ChatClientError::Timeout(_) => ChatErrorKind::Timeout,
            ChatClientError::RateLimit(_) => ChatErrorKind::RateLimit,
            ChatClientError::Validation(_) => ChatErrorKind::Validation,
            ChatClientError::System(_) => ChatErrorKind::System,
        }
    }

    pub fn is_retryable(&self) -> bool {
        !matches!(self, ChatClientError::Validation(_))
    }
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("agent '{0}' is reserved for C-Suite agents and cannot be registered directly")]
    ReservedCSuiteName(String),
    #[error("no agent named '{0}' in registry")]
    AgentNotFound(String),
    #[error("no tool named '{0}' in registry")]
    ToolNotFound(String),
    #[error("registry I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("registry JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("mission workspace is busy (locked by another process): {0}")]
    Busy(String),
    #[error("workspace I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("workspace JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("no such checkpoint: {0}")]
    CheckpointNotFound(String),
}

#[derive(Debug, Error)]
pub enum CommunicatorError {
    #[error("agent '{0}' produced an empty response")]
    EmptyResponse(String),
    #[error("agent '{0}' failed to produce parseable JSON after {1} attempt(s): {2}")]
    JsonParseFailed(String, usize, String),
    #[error("upstream chat error: {0}")]
    Chat(#[from] ChatClientError),
    #[error("no such agent: {0}")]
    UnknownAgent(String),
}

#[derive(Debug, Error)]
pub enum ReviewError {
    #[error(transparent)]
    Communicator(#[from] CommunicatorError),
}

#[derive(Debug, Error)]
pub enum AgentManagerError {
    #[error("no factory registered for endpoint '{0}'")]
    NoFactory(String),
    #[error(transparent)]
    Communicator(#[from] CommunicatorError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

#[derive(Debug, Error)]
pub enum AutoProvisionError {
    #[error("auto-provisioned proposal for '{0}' was rejected by consensus")]
    Rejected(String),
    #[error(transparent)]
    Communicator(#[from] CommunicatorError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Review(#[from] ReviewError),
}

#[derive(Debug, Error)]
pub enum MissionManagerError {
    #[error(transparent)]
    Workspace(#[from] WorkspaceError),
    #[error(transparent)]
    Memory(#[from] MemoryError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("vector memory engine error: {0}")]
    Engine(String),
}

#[derive(Debug, Error)]
pub enum CostError {
    #[error("unknown model '{0}', falling back to default pricing")]
    UnknownModel(String),
}

/// Unified mission-wide error, realising §7's taxonomy as a single Rust enum.
#[derive(Debug, Error)]
pub enum OrchestrationError {
    #[error(transparent)]
    Chat(#[from] ChatClientError),
    #[error(transparent)]
    Communicator(#[from] CommunicatorError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Workspace(#[from] WorkspaceError),
    #[error(transparent)]
    Review(#[from] ReviewError),
    #[error(transparent)]
    AgentManager(#[from] AgentManagerError),
    #[error(transparent)]
    AutoProvision(#[from] AutoProvisionError),
    #[error(transparent)]
    MissionManager(#[from] MissionManagerError),
    #[error(transparent)]
    Memory(#[from] MemoryError),
    #[error(transparent)]
    Cost(#[from] CostError),
    #[error("critical scheduler error: {0}")]
    Critical(String),
}
