//! End-to-end tests for the orchestration scheduler: a mission run through `run_mission`
//! against an in-memory scripted LLM client and a real temp-directory workspace, with no
//! network access.

use async_trait::async_trait;
use cloudllm::client_wrapper::{ClientWrapper, Message, Role, TokenUsage};
use cloudllm::mission::agent_manager::{AgentManager, EchoWorkflowAgent};
use cloudllm::mission::chat_client::ChatClientWrapper;
use cloudllm::mission::communicator::Communicator;
use cloudllm::mission::config::MissionConfig;
use cloudllm::mission::mission_manager::{Cycle, FinalStatus, MissionManager, StepRecord};
use cloudllm::mission::registry::Registry;
use cloudllm::mission::scheduler::run_mission;
use cloudllm::mission::workspace::list_workspaces;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Mutex as TokioMutex;

/// Read a persisted cycle log straight off disk, the way the workspace layer laid it out,
/// without needing a live `WorkspaceHandle` (which the scheduler doesn't expose).
fn read_cycle_log(base_dir: &std::path::Path, mission_id: &str, cycle_id: &str) -> Cycle {
    let configs = list_workspaces(base_dir, None).unwrap();
    let config = configs.into_iter().find(|c| c.mission_id == mission_id).unwrap();
    let path = base_dir.join(&config.dir_name).join("logs/cycles").join(format!("{cycle_id}.json"));
    let raw = std::fs::read_to_string(path).unwrap();
    serde_json::from_str(&raw).unwrap()
}

struct ScriptedClient {
    replies: TokioMutex<VecDeque<String>>,
}

#[async_trait]
impl ClientWrapper for ScriptedClient {
    async fn send_message(
        &self,
        _messages: &[Message],
        _tools: Option<Vec<cloudllm::client_wrapper::ToolDefinition>>,
    ) -> Result<Message, Box<dyn std::error::Error>> {
        let mut replies = self.replies.lock().await;
        let reply = replies.pop_front().unwrap_or_else(|| "{}".to_string());
        Ok(Message {
            role: Role::Assistant,
            content: Arc::from(reply.as_str()),
            tool_calls: vec![],
        })
    }

    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn get_last_usage(&self) -> Option<TokenUsage> {
        Some(TokenUsage {
            input_tokens: 5,
            output_tokens: 5,
            total_tokens: 10,
        })
    }
}

/// Build a fresh registry, agent manager, and communicator sharing one scripted reply queue,
/// rooted at `base_dir`.
fn harness(base_dir: &std::path::Path, replies: Vec<&str>) -> (Arc<Registry>, Arc<AgentManager>, Arc<Communicator>, MissionManager) {
    let client = Arc::new(ScriptedClient {
        replies: TokioMutex::new(replies.into_iter().map(String::from).collect()),
    });
    let chat = Arc::new(ChatClientWrapper::new(client));
    let communicator = Arc::new(Communicator::new(chat, "gpt-4o-mini"));
    let registry = Arc::new(Registry::open(base_dir.join("registry.json")).unwrap());
    let agent_manager = Arc::new(AgentManager::new(registry.clone(), communicator.clone()));
    let mission_manager = MissionManager::new(base_dir.to_path_buf());
    (registry, agent_manager, communicator, mission_manager)
}

fn test_config(base_dir: &std::path::Path, max_iterations: usize) -> MissionConfig {
    let mut config = MissionConfig::default();
    config.workspace_base_dir = base_dir.to_path_buf();
    config.max_iterations = max_iterations;
    config
}

#[tokio::test]
async fn cold_start_runs_one_cycle_then_stops_at_max_iterations() {
    let dir = tempfile::tempdir().unwrap();
    let (registry, agent_manager, communicator, mission_manager) = harness(dir.path(), vec!["{}"; 8]);
    let config = test_config(dir.path(), 1);

    let outcome = run_mission(
        registry,
        agent_manager,
        communicator,
        &mission_manager,
        &config,
        "Cold Start Mission",
        "Build a profitable newsletter",
        false,
    )
    .await
    .unwrap();

    assert_eq!(outcome.final_status, FinalStatus::MaxIterationsReached);
    assert_eq!(outcome.mission.cycle_ids.len(), 1);
    assert!(outcome.mission.invariant_holds());
}

#[tokio::test]
async fn resume_after_max_iterations_continues_the_same_mission() {
    let dir = tempfile::tempdir().unwrap();

    let (registry, agent_manager, communicator, mission_manager) = harness(dir.path(), vec!["{}"; 8]);
    let config = test_config(dir.path(), 1);
    let first = run_mission(
        registry,
        agent_manager,
        communicator,
        &mission_manager,
        &config,
        "Resumable Mission",
        "Build a profitable newsletter",
        false,
    )
    .await
    .unwrap();
    assert_eq!(first.final_status, FinalStatus::MaxIterationsReached);
    let mission_id = first.mission.mission_id.clone();

    let (registry, agent_manager, communicator, mission_manager) = harness(dir.path(), vec!["{}"; 8]);
    let config = test_config(dir.path(), 2);
    let second = run_mission(
        registry,
        agent_manager,
        communicator,
        &mission_manager,
        &config,
        "Resumable Mission",
        "Build a profitable newsletter",
        true,
    )
    .await
    .unwrap();

    assert_eq!(second.mission.mission_id, mission_id);
    assert_eq!(second.mission.cycle_ids.len(), 2);
}

#[tokio::test]
async fn cfo_decline_leaves_growth_agent_uninvoked() {
    let dir = tempfile::tempdir().unwrap();
    // Planning (3 calls) and review (2 calls) replies are irrelevant placeholders; the 6th
    // call is the CFO guardrail, scripted to decline.
    let replies = vec![
        "{}",
        "{}",
        "{}",
        "{}",
        "{}",
        r#"{"approved": false, "budget": 0, "reason": "cost ratio too high"}"#,
    ];
    let (registry, agent_manager, communicator, mission_manager) = harness(dir.path(), replies);

    // AnalyticsAgent reports revenue so the guardrail actually fires this cycle.
    agent_manager
        .install_workflow_agent(
            "AnalyticsAgent",
            Box::new(EchoWorkflowAgent {
                step_name: "AnalyticsAgent".to_string(),
                revenue: Some(100.0),
            }),
        )
        .await;

    let config = test_config(dir.path(), 1);
    let outcome = run_mission(
        registry,
        agent_manager,
        communicator,
        &mission_manager,
        &config,
        "Guardrail Mission",
        "Build a profitable newsletter",
        false,
    )
    .await
    .unwrap();

    let cycle_id = outcome.mission.cycle_ids.last().unwrap().clone();
    let cycle = read_cycle_log(dir.path(), &outcome.mission.mission_id, &cycle_id);
    assert!(matches!(cycle.steps.get("GrowthAgent"), Some(StepRecord::DeclinedByCfo { .. })));
    assert_eq!(outcome.mission.total_revenue, 100.0);
    // A CFO decline is not a step error: the cycle is otherwise clean and must still count
    // toward `completed_cycles`, not `failed_cycles`.
    assert_eq!(outcome.mission.completed_cycles, 1);
    assert_eq!(outcome.mission.failed_cycles, 0);
}

#[tokio::test]
async fn cfo_approval_runs_growth_agent() {
    let dir = tempfile::tempdir().unwrap();
    let replies = vec![
        "{}",
        "{}",
        "{}",
        "{}",
        "{}",
        r#"{"approved": true, "budget": 15, "reason": "healthy margins"}"#,
    ];
    let (registry, agent_manager, communicator, mission_manager) = harness(dir.path(), replies);

    agent_manager
        .install_workflow_agent(
            "AnalyticsAgent",
            Box::new(EchoWorkflowAgent {
                step_name: "AnalyticsAgent".to_string(),
                revenue: Some(250.0),
            }),
        )
        .await;

    let config = test_config(dir.path(), 1);
    let outcome = run_mission(
        registry,
        agent_manager,
        communicator,
        &mission_manager,
        &config,
        "Approved Growth Mission",
        "Build a profitable newsletter",
        false,
    )
    .await
    .unwrap();

    let cycle_id = outcome.mission.cycle_ids.last().unwrap().clone();
    let cycle = read_cycle_log(dir.path(), &outcome.mission.mission_id, &cycle_id);
    assert!(matches!(cycle.steps.get("GrowthAgent"), Some(StepRecord::Success { .. })));
}

/// Fails on odd calls, succeeds on even calls, so cycles alternate failed/succeeded instead
/// of failing consecutively.
struct AlternatingWorkflowAgent {
    calls: std::sync::atomic::AtomicU32,
}

#[async_trait]
impl cloudllm::mission::agent_manager::WorkflowAgent for AlternatingWorkflowAgent {
    async fn execute(
        &self,
        input: cloudllm::mission::agent_manager::WorkflowInput,
    ) -> cloudllm::mission::agent_manager::WorkflowOutput {
        use cloudllm::mission::agent_manager::{WorkflowOutput, WorkflowStatus};
        let n = self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        if n % 2 == 0 {
            WorkflowOutput {
                status: WorkflowStatus::Failure,
                data: serde_json::json!({}),
                cost: 0.0,
                confidence: 0.0,
                tools_used: vec![],
                next_steps: vec![],
                error_message: Some("scan failed".to_string()),
                human_task_description: None,
            }
        } else {
            WorkflowOutput {
                status: WorkflowStatus::Success,
                data: serde_json::json!({"step": "ScanAgent", "echoed_task": input.task_description}),
                cost: 0.0,
                confidence: 0.9,
                tools_used: vec![],
                next_steps: vec![],
                error_message: None,
                human_task_description: None,
            }
        }
    }
}

#[tokio::test]
async fn interleaved_failures_terminate_on_cumulative_count_not_consecutive() {
    let dir = tempfile::tempdir().unwrap();
    let (registry, agent_manager, communicator, mission_manager) = harness(dir.path(), vec!["{}"; 64]);

    agent_manager
        .install_workflow_agent(
            "ScanAgent",
            Box::new(AlternatingWorkflowAgent {
                calls: std::sync::atomic::AtomicU32::new(0),
            }),
        )
        .await;

    // Never reaches max_iterations; the cumulative failed-cycle count must be what stops it.
    let config = test_config(dir.path(), 20);
    let outcome = run_mission(
        registry,
        agent_manager,
        communicator,
        &mission_manager,
        &config,
        "Interleaved Failures Mission",
        "Build a profitable newsletter",
        false,
    )
    .await
    .unwrap();

    assert_eq!(outcome.final_status, FinalStatus::TooManyFailures);
    // Failures never ran consecutively (fail, succeed, fail, succeed, ...), so a
    // consecutive-failure counter would never have tripped; only the cumulative count does.
    assert!(outcome.mission.failed_cycles > config_max_failed_cycles());
}

fn config_max_failed_cycles() -> u32 {
    MissionConfig::default().max_failed_cycles
}
