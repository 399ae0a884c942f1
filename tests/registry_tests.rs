//! Cross-module tests for the registry: persistence surviving a reload, and the registry →
//! agent manager pipeline that turns a registered `Module` endpoint into a live, executable
//! workflow agent via a matching factory.

use cloudllm::mission::agent_manager::{AgentManager, WorkflowInput, WorkflowOutput, WorkflowStatus};
use cloudllm::mission::communicator::Communicator;
use cloudllm::mission::chat_client::ChatClientWrapper;
use cloudllm::mission::registry::{AgentSpec, Endpoint, Proposal, Registry, ToolRecord, ToolKind, AuthKind, CertificationStatus, ToolSource};
use async_trait::async_trait;
use cloudllm::client_wrapper::{ClientWrapper, Message, Role, TokenUsage};
use serde_json::{json, Value};
use std::sync::Arc;

struct StaticClient;

#[async_trait]
impl ClientWrapper for StaticClient {
    async fn send_message(
        &self,
        _messages: &[Message],
        _tools: Option<Vec<cloudllm::client_wrapper::ToolDefinition>>,
    ) -> Result<Message, Box<dyn std::error::Error>> {
        Ok(Message {
            role: Role::Assistant,
            content: Arc::from("{}"),
            tool_calls: vec![],
        })
    }

    fn model_name(&self) -> &str {
        "static"
    }

    async fn get_last_usage(&self) -> Option<TokenUsage> {
        None
    }
}

fn communicator() -> Arc<Communicator> {
    let chat = Arc::new(ChatClientWrapper::new(Arc::new(StaticClient)));
    Arc::new(Communicator::new(chat, "gpt-4o-mini"))
}

struct StubNicheAgent;

#[async_trait]
impl cloudllm::mission::agent_manager::WorkflowAgent for StubNicheAgent {
    async fn execute(&self, input: WorkflowInput) -> WorkflowOutput {
        WorkflowOutput {
            status: WorkflowStatus::Success,
            data: json!({"scanned": input.task_description}),
            cost: 0.01,
            confidence: 0.8,
            tools_used: vec![],
            next_steps: vec![],
            error_message: None,
            human_task_description: None,
        }
    }
}

#[tokio::test]
async fn registered_agent_with_matching_factory_becomes_executable() {
    let dir = tempfile::tempdir().unwrap();
    let registry = Arc::new(Registry::open(dir.path().join("registry.json")).unwrap());
    registry
        .add_agent(
            "NicheScout-Agent",
            Endpoint::Module {
                module: "launchonomy.agents".to_string(),
                class: "NicheScout".to_string(),
            },
            AgentSpec {
                description: "scans for profitable niches".to_string(),
                capabilities: vec!["scan".to_string()],
                required_tools: vec![],
                optional_tools: vec![],
                config: Value::Null,
            },
        )
        .await
        .unwrap();

    let manager = AgentManager::new(registry.clone(), communicator());
    manager
        .register_factory(
            "launchonomy.agents.NicheScout",
            Arc::new(|| Box::new(StubNicheAgent) as Box<dyn cloudllm::mission::agent_manager::WorkflowAgent>),
        )
        .await;

    let summary = manager.load_registered().await;
    assert_eq!(summary.loaded, vec!["NicheScout-Agent".to_string()]);
    assert!(summary.skipped.is_empty());

    let output = manager
        .execute_workflow_agent(
            "NicheScout-Agent",
            WorkflowInput {
                task_description: "find a niche".to_string(),
                mission_context: Value::Null,
                cycle_context: Value::Null,
                extra: Default::default(),
            },
        )
        .await
        .unwrap();
    assert_eq!(output.status, WorkflowStatus::Success);
    assert_eq!(output.data["scanned"], "find a niche");
}

#[tokio::test]
async fn registered_agent_without_factory_is_skipped_not_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let registry = Arc::new(Registry::open(dir.path().join("registry.json")).unwrap());
    registry
        .add_agent(
            "Unresolvable-Agent",
            Endpoint::Module {
                module: "launchonomy.agents".to_string(),
                class: "Nonexistent".to_string(),
            },
            AgentSpec {
                description: "no factory registered for this one".to_string(),
                capabilities: vec![],
                required_tools: vec![],
                optional_tools: vec![],
                config: Value::Null,
            },
        )
        .await
        .unwrap();

    let manager = AgentManager::new(registry.clone(), communicator());
    let summary = manager.load_registered().await;
    assert!(summary.loaded.is_empty());
    assert_eq!(summary.skipped, vec!["Unresolvable-Agent".to_string()]);
    assert!(!manager.has_workflow_agent("Unresolvable-Agent").await);
}

#[tokio::test]
async fn survives_process_restart_with_agents_and_tools_intact() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("registry.json");
    {
        let registry = Registry::open(&path).unwrap();
        registry
            .apply_proposal(Proposal::AddAgent {
                name: "DeployAgent-Impl".to_string(),
                spec: AgentSpec {
                    description: "deploys a landing page".to_string(),
                    capabilities: vec!["deploy".to_string()],
                    required_tools: vec!["hosting".to_string()],
                    optional_tools: vec![],
                    config: Value::Null,
                },
                endpoint: Endpoint::Module {
                    module: "launchonomy.agents".to_string(),
                    class: "DeployAgent".to_string(),
                },
            })
            .await
            .unwrap();
        registry
            .apply_proposal(Proposal::AddTool {
                name: "HostingTool".to_string(),
                tool: ToolRecord {
                    name: "HostingTool".to_string(),
                    kind: ToolKind::Api,
                    endpoint_url: "https://hosting.example.com".to_string(),
                    method: "POST".to_string(),
                    auth: AuthKind::ApiKey,
                    request_schema: Value::Null,
                    response_schema: Value::Null,
                    status: CertificationStatus::Certified,
                    generated_code_path: None,
                    source: ToolSource::PreRegistered,
                    requires_manual_setup: false,
                },
            })
            .await
            .unwrap();
    }

    let reopened = Registry::open(&path).unwrap();
    assert_eq!(reopened.list_agent_names().await, vec!["DeployAgent-Impl".to_string()]);
    assert_eq!(reopened.list_tool_names().await, vec!["HostingTool".to_string()]);
    let spec = reopened.get_agent_spec("DeployAgent-Impl").await.unwrap();
    assert_eq!(spec.required_tools, vec!["hosting".to_string()]);
}
