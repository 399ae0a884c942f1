// src/cloudllm/mod.rs

pub mod agent;
pub mod client_wrapper;
pub mod clients;
pub mod config;
pub mod context_strategy;
pub mod council;
pub mod council_session;
pub mod event;
pub mod http_client_pool;
pub mod image_generation;
pub mod llm_session;
pub mod mcp_http_adapter;
pub mod mcp_server;
pub mod mcp_server_builder;
pub mod mcp_server_builder_utils;
pub mod mission;
pub mod multi_participant_session;
pub mod orchestration;
pub mod planner;
pub mod resource_protocol;
pub mod thought_chain;
pub mod tool_adapters;
pub mod tool_protocol;
pub mod tool_protocols;
pub mod tools;

// Let's explicitly export LLMSession so we don't have to access it via cloudllm::llm_session::LLMSession
// and instead as cloudllm::LLMSession
pub use agent::Agent;
pub use council_session::{CouncilRole, CouncilSession};
pub use llm_session::LLMSession;

/// Initialize the crate's `env_logger`-backed logging.
///
/// Verbosity is controlled by the `RUST_LOG` environment variable exactly as
/// `env_logger::init()` behaves everywhere else in this crate. Safe to call
/// more than once; subsequent calls are no-ops.
pub fn init_logger() {
    let _ = env_logger::try_init();
}
