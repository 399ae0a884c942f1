//! Mission-wide configuration.
//!
//! Mirrors the pattern in [`crate::cloudllm::config::CloudLLMConfig`]: a plain struct
//! constructed manually, no file-format parsing dependency. Environment variables and an
//! optional `.env` file (via `dotenvy`) are folded in once at CLI startup by
//! [`MissionConfig::from_env`].

use std::path::PathBuf;

/// Tunables for the mission orchestration engine (§10.3).
#[derive(Debug, Clone)]
pub struct MissionConfig {
    /// Root directory under which mission workspaces are created. Default `.launchonomy`.
    pub workspace_base_dir: PathBuf,
    /// Maximum number of cycles the scheduler will run before stopping (§4.10).
    pub max_iterations: usize,
    /// Bound on JSON parse retries in the Agent Communicator (§4.5).
    pub max_json_retries: usize,
    /// Per-call LLM timeout in seconds (§4.1).
    pub llm_timeout_secs: u64,
    /// Maximum retry attempts for transient LLM failures (§4.1).
    pub llm_max_retries: usize,
    /// Trailing conversation-history window size per agent (§4.5).
    pub conversation_history_limit: usize,
    /// Default chat model name, used when a caller doesn't specify one.
    pub openai_model: String,
    /// Tokens treated as an affirmative CFO response in the non-JSON fallback heuristic (§4.10).
    pub cfo_affirmative_tokens: Vec<String>,
    /// Revenue threshold that, combined with `min_successful_cycles_for_completion`, unlocks
    /// the completion-consensus poll (§4.10).
    pub completion_revenue_threshold: f64,
    /// Minimum successful cycles before completion consensus is polled (§4.10).
    pub min_successful_cycles_for_completion: u32,
    /// Cumulative failed-cycle count (since the loop began) that triggers `too_many_failures`
    /// termination (§4.10 rule 2) — never reset by an intervening success.
    pub max_failed_cycles: u32,
}

impl Default for MissionConfig {
    fn default() -> Self {
        Self {
            workspace_base_dir: PathBuf::from(".launchonomy"),
            max_iterations: 10,
            max_json_retries: 2,
            llm_timeout_secs: 60,
            llm_max_retries: 3,
            conversation_history_limit: 20,
            openai_model: "gpt-4o-mini".to_string(),
            cfo_affirmative_tokens: vec![
                "yes".to_string(),
                "approve".to_string(),
                "approved".to_string(),
                "agree".to_string(),
                "agreed".to_string(),
                "proceed".to_string(),
                "go ahead".to_string(),
                "sounds good".to_string(),
                "confirmed".to_string(),
            ],
            completion_revenue_threshold: 1000.0,
            min_successful_cycles_for_completion: 3,
            max_failed_cycles: 3,
        }
    }
}

impl MissionConfig {
    /// Load a `.env` file from the current working directory (if present) and fold in
    /// environment variables, per §6. Does not panic; an absent `.env` is not an error.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();

        let mut config = MissionConfig::default();
        if let Ok(model) = std::env::var("OPENAI_MODEL") {
            if !model.trim().is_empty() {
                config.openai_model = model;
            }
        }
        config
    }

    /// Required API key lookup. Per §6, a missing key is fatal at startup.
    pub fn require_openai_api_key() -> Result<String, String> {
        std::env::var("OPENAI_API_KEY").map_err(|_| {
            "OPENAI_API_KEY is not set. Add it to your environment or to a .env file in the \
             current directory."
                .to_string()
        })
    }

    /// Optional Google Analytics tracking id consumed by DeployAgent's reporting (§6).
    pub fn google_analytics_tracking_id() -> Option<String> {
        std::env::var("GOOGLE_ANALYTICS_TRACKING_ID").ok()
    }
}
