//! Registry (§4.4).
//!
//! Persistent names → (endpoint, spec, certification status) directory for non-ephemeral
//! agents and tools. C-Suite agents are deliberately excluded — they are owned by the Agent
//! Manager's in-memory map (§4.7) and never touch this file.
//!
//! Writes are serialized behind an in-process [`tokio::sync::Mutex`] and persisted with an
//! atomic write-to-temp-then-rename so a crash mid-save cannot corrupt the file the next
//! process loads, per §4.4 and §5.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::Mutex;

use crate::cloudllm::mission::error::RegistryError;

/// Suffix reserved for ephemeral C-Suite agent names (§4.4, §4.7). A registry entry whose
/// name ends with this suffix and has no `module`/`class` load path is rejected.
pub const CSUITE_NAME_SUFFIX: &str = "-Agent";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CertificationStatus {
    Pending,
    Built,
    Certified,
    Conditional,
}

/// How a registered agent or tool is reached (§3 "Agent record").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Endpoint {
    Internal,
    Webhook { url: String },
    Module { module: String, class: String },
}

impl Endpoint {
    /// The capability-factory lookup key used by the Agent Manager (§4.7, §9 "Dynamic spec →
    /// live object"): `module.class`, or `None` for endpoints with no static factory.
    pub fn factory_key(&self) -> Option<String> {
        match self {
            Endpoint::Module { module, class } => Some(format!("{module}.{class}")),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSpec {
    pub description: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub required_tools: Vec<String>,
    #[serde(default)]
    pub optional_tools: Vec<String>,
    #[serde(default)]
    pub config: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRecord {
    pub name: String,
    pub endpoint: Endpoint,
    pub certification: CertificationStatus,
    pub spec: AgentSpec,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    Webhook,
    Api,
    Local,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthKind {
    None,
    ApiKey,
    Bearer,
    OAuth2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ToolSource {
    AiGeneratedReal,
    FallbackStub,
    PreRegistered,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolRecord {
    pub name: String,
    pub kind: ToolKind,
    pub endpoint_url: String,
    pub method: String,
    pub auth: AuthKind,
    #[serde(default)]
    pub request_schema: Value,
    #[serde(default)]
    pub response_schema: Value,
    pub status: CertificationStatus,
    #[serde(default)]
    pub generated_code_path: Option<PathBuf>,
    pub source: ToolSource,
    #[serde(default)]
    pub requires_manual_setup: bool,
}

/// `{type: add_agent|add_tool, name, spec, endpoint?}` from §4.4 and §4.8's auto-provision
/// pipeline, handled as an insert-or-upsert.
#[derive(Debug, Clone)]
pub enum Proposal {
    AddAgent {
        name: String,
        spec: AgentSpec,
        endpoint: Endpoint,
    },
    AddTool {
        name: String,
        tool: ToolRecord,
    },
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RegistryFile {
    #[serde(default)]
    agents: HashMap<String, AgentRecord>,
    #[serde(default)]
    tools: HashMap<String, ToolRecord>,
}

/// The process-global agents/tools directory (§6 "Registry file").
pub struct Registry {
    path: PathBuf,
    state: Mutex<RegistryFile>,
}

impl Registry {
    /// Load (or create empty) the registry backed by the JSON file at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, RegistryError> {
        let path = path.into();
        let state = if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            if raw.trim().is_empty() {
                RegistryFile::default()
            } else {
                serde_json::from_str(&raw)?
            }
        } else {
            RegistryFile::default()
        };
        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    fn is_reserved_name(name: &str, endpoint: &Endpoint) -> bool {
        name.ends_with(CSUITE_NAME_SUFFIX) && !matches!(endpoint, Endpoint::Module { .. })
    }

    /// Atomic write-to-temp-then-rename so a crash mid-save never corrupts the file the next
    /// process loads (§4.4, §5).
    async fn persist(&self, state: &RegistryFile) -> Result<(), RegistryError> {
        let json = serde_json::to_string_pretty(state)?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp_path = self.path.with_extension("json.tmp");
        std::fs::write(&tmp_path, json)?;
        std::fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    pub async fn add_agent(
        &self,
        name: impl Into<String>,
        endpoint: Endpoint,
        spec: AgentSpec,
    ) -> Result<(), RegistryError> {
        let name = name.into();
        if Self::is_reserved_name(&name, &endpoint) {
            return Err(RegistryError::ReservedCSuiteName(name));
        }
        let mut state = self.state.lock().await;
        state.agents.insert(
            name.clone(),
            AgentRecord {
                name,
                endpoint,
                certification: CertificationStatus::Pending,
                spec,
            },
        );
        self.persist(&state).await
    }

    pub async fn add_tool(&self, tool: ToolRecord) -> Result<(), RegistryError> {
        let mut state = self.state.lock().await;
        state.tools.insert(tool.name.clone(), tool);
        self.persist(&state).await
    }

    pub async fn get_agent_spec(&self, name: &str) -> Result<AgentSpec, RegistryError> {
        let state = self.state.lock().await;
        state
            .agents
            .get(name)
            .map(|r| r.spec.clone())
            .ok_or_else(|| RegistryError::AgentNotFound(name.to_string()))
    }

    pub async fn get_agent(&self, name: &str) -> Option<AgentRecord> {
        self.state.lock().await.agents.get(name).cloned()
    }

    pub async fn get_tool_spec(&self, name: &str) -> Result<ToolRecord, RegistryError> {
        let state = self.state.lock().await;
        state
            .tools
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::ToolNotFound(name.to_string()))
    }

    pub async fn list_agent_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.state.lock().await.agents.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn list_tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.state.lock().await.tools.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn apply_proposal(&self, proposal: Proposal) -> Result<(), RegistryError> {
        match proposal {
            Proposal::AddAgent {
                name,
                spec,
                endpoint,
            } => self.add_agent(name, endpoint, spec).await,
            Proposal::AddTool { tool, .. } => self.add_tool(tool).await,
        }
    }

    pub async fn save(&self) -> Result<(), RegistryError> {
        let state = self.state.lock().await;
        self.persist(&state).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_spec() -> AgentSpec {
        AgentSpec {
            description: "scans niches".to_string(),
            capabilities: vec!["scan".to_string()],
            required_tools: vec![],
            optional_tools: vec![],
            config: Value::Null,
        }
    }

    #[tokio::test]
    async fn rejects_csuite_suffixed_name_without_module_endpoint() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Registry::open(dir.path().join("registry.json")).unwrap();
        let err = registry
            .add_agent("CEO-Agent", Endpoint::Internal, sample_spec())
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::ReservedCSuiteName(_)));
    }

    #[tokio::test]
    async fn allows_csuite_suffixed_name_with_module_endpoint() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Registry::open(dir.path().join("registry.json")).unwrap();
        registry
            .add_agent(
                "Retention-Agent",
                Endpoint::Module {
                    module: "launchonomy.agents".to_string(),
                    class: "RetentionAgent".to_string(),
                },
                sample_spec(),
            )
            .await
            .unwrap();
        assert_eq!(registry.list_agent_names().await, vec!["Retention-Agent"]);
    }

    #[tokio::test]
    async fn persists_and_reloads_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.json");
        {
            let registry = Registry::open(&path).unwrap();
            registry
                .add_agent("ScanAgent", Endpoint::Internal, sample_spec())
                .await
                .unwrap();
        }
        let reopened = Registry::open(&path).unwrap();
        assert_eq!(reopened.list_agent_names().await, vec!["ScanAgent"]);
    }

    #[tokio::test]
    async fn apply_proposal_upserts_tool() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Registry::open(dir.path().join("registry.json")).unwrap();
        let tool = ToolRecord {
            name: "EmailMarketingTool".to_string(),
            kind: ToolKind::Webhook,
            endpoint_url: "https://example.com/webhook".to_string(),
            method: "POST".to_string(),
            auth: AuthKind::ApiKey,
            request_schema: Value::Null,
            response_schema: Value::Null,
            status: CertificationStatus::Built,
            generated_code_path: None,
            source: ToolSource::AiGeneratedReal,
            requires_manual_setup: false,
        };
        registry
            .apply_proposal(Proposal::AddTool {
                name: "EmailMarketingTool".to_string(),
                tool,
            })
            .await
            .unwrap();
        assert_eq!(
            registry.list_tool_names().await,
            vec!["EmailMarketingTool"]
        );
        let spec = registry.get_tool_spec("EmailMarketingTool").await.unwrap();
        assert_eq!(spec.source, ToolSource::AiGeneratedReal);
    }

    #[tokio::test]
    async fn missing_agent_errors() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Registry::open(dir.path().join("registry.json")).unwrap();
        let err = registry.get_agent_spec("NoSuchAgent").await.unwrap_err();
        assert!(matches!(err, RegistryError::AgentNotFound(_)));
    }
}
