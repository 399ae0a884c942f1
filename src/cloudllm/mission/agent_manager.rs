//! Agent Manager (§4.7).
//!
//! Owns the in-memory map of live agents: the nine ephemeral C-Suite agents (never persisted,
//! §3/§4.7), ad-hoc specialist agents created on demand, and the six fixed workflow-agent
//! instances resolved through a capability registry of factories rather than runtime
//! reflection (§9 "Dynamic spec → live object").

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::cloudllm::mission::communicator::Communicator;
use crate::cloudllm::mission::error::AgentManagerError;
use crate::cloudllm::mission::registry::{Endpoint, Registry};

/// The uniform input every workflow agent receives (§6 "Workflow agent contract").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowInput {
    pub task_description: String,
    pub mission_context: Value,
    pub cycle_context: Value,
    #[serde(default)]
    pub extra: HashMap<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Success,
    Failure,
    RequiresHuman,
    RequiresTools,
}

/// The uniform output every workflow agent returns (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowOutput {
    pub status: WorkflowStatus,
    pub data: Value,
    pub cost: f64,
    pub confidence: f64,
    #[serde(default)]
    pub tools_used: Vec<String>,
    #[serde(default)]
    pub next_steps: Vec<String>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub human_task_description: Option<String>,
}

impl WorkflowOutput {
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            status: WorkflowStatus::Failure,
            data: Value::Null,
            cost: 0.0,
            confidence: 0.0,
            tools_used: vec![],
            next_steps: vec![],
            error_message: Some(message.into()),
            human_task_description: None,
        }
    }
}

/// The uniform `execute(input) -> output` contract every pipeline capability-holder satisfies
/// (Scan, Deploy, Campaign, Analytics, Finance, Growth). Business logic for each is out of
/// scope (§1) — this crate treats them as black boxes behind this trait.
#[async_trait]
pub trait WorkflowAgent: Send + Sync {
    async fn execute(&self, input: WorkflowInput) -> WorkflowOutput;
}

/// A statically-registered constructor, keyed by a registry entry's `module.class` path
/// (§9). Replaces runtime reflection/dynamic import entirely.
pub type WorkflowAgentFactory = Arc<dyn Fn() -> Box<dyn WorkflowAgent> + Send + Sync>;

/// The fixed nine C-Suite roles (§3 "Glossary"), in the canonical bootstrap order.
pub const CSUITE_ROLES: [&str; 9] = [
    "CEO", "CRO", "CTO", "CPO", "CMO", "CDO", "CCO", "CFO", "CCSO",
];

/// The subset polled for strategic planning, review, and completion consensus (§4.10,
/// DESIGN.md open-question decision: unified across all three phases).
pub const STRATEGIC_CSUITE_ROLES: [&str; 4] = ["CEO", "CRO", "CTO", "CFO"];

fn csuite_persona(role: &str) -> &'static str {
    match role {
        "CEO" => "Chief Executive Officer. You set overall strategy, balance competing \
                  priorities across the business, and have final say on strategic focus.",
        "CRO" => "Chief Revenue Officer. You own customer acquisition, pricing, and revenue \
                  growth strategy.",
        "CTO" => "Chief Technology Officer. You own technical feasibility, build-vs-buy \
                  decisions, and engineering risk.",
        "CPO" => "Chief Product Officer. You own product-market fit, roadmap prioritization, \
                  and user experience.",
        "CMO" => "Chief Marketing Officer. You own brand, messaging, and campaign strategy.",
        "CDO" => "Chief Data Officer. You own analytics rigor, measurement, and data quality.",
        "CCO" => "Chief Compliance Officer. You own legal, regulatory, and ethical risk.",
        "CFO" => "Chief Financial Officer. You own budget discipline, unit economics, and the \
                  20%-of-revenue cost ceiling. You approve or decline any proposal to scale \
                  spend.",
        "CCSO" => "Chief Customer Success Officer. You own retention, satisfaction, and \
                   customer feedback loops.",
        _ => "Executive team member.",
    }
}

fn csuite_name(role: &str) -> String {
    format!("{role}-Agent")
}

fn operating_principles(mission_context: &str) -> String {
    format!(
        "Mission context:\n{mission_context}\n\n\
         Operating principles:\n\
         - Never approve spend that would push total cost above 20% of revenue generated so far.\n\
         - Always ground recommendations in the mission's stated objective.\n\
         - Governance: you operate without a human in the loop except on catastrophic failure; \
           act decisively within your domain."
    )
}

struct WorkflowSlot {
    factory_key: Option<String>,
    instance: Option<Box<dyn WorkflowAgent>>,
}

/// Outcome of [`AgentManager::load_registered`], mirroring the source's `loaded`/`failed_count`
/// accounting (§4.7) without propagating a hard error for an unmatched factory.
#[derive(Debug, Clone, Default)]
pub struct LoadSummary {
    pub loaded: Vec<String>,
    pub skipped: Vec<String>,
}

/// Outcome of [`AgentManager::create_specialized_agent`] (§4.7).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpecializationOutcome {
    Success,
    Fallback,
    Error,
}

pub struct AgentManager {
    registry: Arc<Registry>,
    communicator: Arc<Communicator>,
    factories: Mutex<HashMap<String, WorkflowAgentFactory>>,
    workflow_agents: Mutex<HashMap<String, WorkflowSlot>>,
    csuite_live: Mutex<bool>,
    name_counters: Mutex<HashMap<String, u32>>,
}

impl AgentManager {
    pub fn new(registry: Arc<Registry>, communicator: Arc<Communicator>) -> Self {
        Self {
            registry,
            communicator,
            factories: Mutex::new(HashMap::new()),
            workflow_agents: Mutex::new(HashMap::new()),
            csuite_live: Mutex::new(false),
            name_counters: Mutex::new(HashMap::new()),
        }
    }

    /// Register a statically-known constructor under the `module.class` key that registry
    /// entries reference (§9).
    pub async fn register_factory(&self, factory_key: impl Into<String>, factory: WorkflowAgentFactory) {
        self.factories.lock().await.insert(factory_key.into(), factory);
    }

    /// `load_registered()`: instantiate every registry agent whose endpoint has a matching
    /// factory; entries with no match are logged and skipped, not hard errors (§4.7, §9).
    pub async fn load_registered(&self) -> LoadSummary {
        let mut summary = LoadSummary::default();
        let factories = self.factories.lock().await;
        for name in self.registry.list_agent_names().await {
            let Some(record) = self.registry.get_agent(&name).await else {
                continue;
            };
            let Some(key) = record.endpoint.factory_key() else {
                continue;
            };
            if let Some(factory) = factories.get(&key) {
                let instance = factory();
                self.workflow_agents.lock().await.insert(
                    name.clone(),
                    WorkflowSlot {
                        factory_key: Some(key),
                        instance: Some(instance),
                    },
                );
                summary.loaded.push(name);
            } else {
                log::warn!(target: "mission::agent_manager", "no factory for '{name}' (key '{key}'), skipping");
                summary.skipped.push(name);
            }
        }
        summary
    }

    /// Directly register a live workflow-agent instance under `name` (used by the scheduler's
    /// fixed six-step pipeline bootstrap and by auto-provision's "Apply" step, §4.8).
    pub async fn install_workflow_agent(&self, name: impl Into<String>, instance: Box<dyn WorkflowAgent>) {
        self.workflow_agents.lock().await.insert(
            name.into(),
            WorkflowSlot {
                factory_key: None,
                instance: Some(instance),
            },
        );
    }

    pub async fn has_workflow_agent(&self, name: &str) -> bool {
        self.workflow_agents.lock().await.contains_key(name)
    }

    pub async fn execute_workflow_agent(
        &self,
        name: &str,
        input: WorkflowInput,
    ) -> Result<crate::cloudllm::mission::agent_manager::WorkflowOutput, AgentManagerError> {
        let agents = self.workflow_agents.lock().await;
        let slot = agents
            .get(name)
            .and_then(|s| s.instance.as_ref())
            .ok_or_else(|| AgentManagerError::NoFactory(name.to_string()))?;
        Ok(slot.execute(input).await)
    }

    async fn resolve_name_collision(&self, base: &str) -> String {
        let mut counters = self.name_counters.lock().await;
        let count = counters.entry(base.to_string()).or_insert(0);
        if *count == 0 {
            *count += 1;
            base.to_string()
        } else {
            let resolved = format!("{base}_{count}");
            *count += 1;
            resolved
        }
    }

    /// `create_agent(role_name, persona, primer) -> Agent`: registers a conversational
    /// persona under a collision-resolved name and returns it.
    pub async fn create_agent(&self, role_name: &str, persona: &str, primer: &str) -> String {
        let name = self.resolve_name_collision(role_name).await;
        let system_prompt = format!("You are {role_name}. {persona}\n\n{primer}");
        self.communicator.register_persona(&name, system_prompt).await;
        name
    }

    /// `bootstrap_c_suite(mission_context)`: idempotently creates the nine fixed C-Suite
    /// agents. A second call is a no-op (§4.7, §8 "Round-trip and idempotence laws").
    pub async fn bootstrap_c_suite(&self, mission_context: &str) -> Vec<String> {
        let mut live = self.csuite_live.lock().await;
        let names: Vec<String> = CSUITE_ROLES.iter().map(|r| csuite_name(r)).collect();
        if *live {
            return names;
        }
        let principles = operating_principles(mission_context);
        for role in CSUITE_ROLES {
            let name = csuite_name(role);
            let system_prompt =
                format!("You are {name}, the {role}. {}\n\n{principles}", csuite_persona(role));
            self.communicator.register_persona(&name, system_prompt).await;
        }
        *live = true;
        names
    }

    pub async fn is_csuite_bootstrapped(&self) -> bool {
        *self.csuite_live.lock().await
    }

    pub async fn live_csuite_names(&self) -> Vec<String> {
        if self.is_csuite_bootstrapped().await {
            CSUITE_ROLES.iter().map(|r| csuite_name(r)).collect()
        } else {
            Vec::new()
        }
    }

    /// The strategic subset of C-Suite names that are currently live, in canonical order
    /// (§4.10 Phase 1/3/Completion participant selection).
    pub async fn live_strategic_csuite_names(&self) -> Vec<String> {
        if !self.is_csuite_bootstrapped().await {
            return Vec::new();
        }
        STRATEGIC_CSUITE_ROLES.iter().map(|r| csuite_name(r)).collect()
    }

    /// `create_specialized_agent(decision, logs…) -> (agent, cost)`: asks the CEO (acting as
    /// "the orchestrator", per DESIGN.md) to design a spec for `decision`; on any failure to
    /// generate or load a role-specific primer, falls back to a generic primer and a
    /// `FallbackGenericSpecialist[_N]` name. Outcome is recorded into `log`.
    pub async fn create_specialized_agent(
        &self,
        decision: &Value,
        primer_templates: &HashMap<String, String>,
        log: &mut Vec<String>,
    ) -> (String, f64, SpecializationOutcome) {
        let orchestrator = csuite_name("CEO");
        let prompt = format!(
            "We need a new specialist agent for this decision:\n{}\n\n\
             Return a JSON object with keys `name` (short identifier-like string), `persona` \
             (one sentence), and `expertise` (one sentence).",
            decision
        );
        let mut json_log = Vec::new();
        let spec_result = self
            .communicator
            .get_json(
                &orchestrator,
                &prompt,
                "Reply with JSON: {\"name\": string, \"persona\": string, \"expertise\": string}.",
                &mut json_log,
            )
            .await;

        let (spec, cost) = match spec_result {
            Ok((value, cost)) => (value, cost),
            Err(e) => {
                log.push(format!("specialization failed to produce a spec: {e}"));
                let name = self.resolve_name_collision("FallbackGenericSpecialist").await;
                self.communicator
                    .register_persona(
                        &name,
                        "You are a generalist specialist with broad business expertise.",
                    )
                    .await;
                return (name, 0.0, SpecializationOutcome::Error);
            }
        };

        let chosen_name = spec
            .get("name")
            .and_then(|v| v.as_str())
            .unwrap_or("Specialist");
        let sanitized = sanitize_identifier(chosen_name);
        let persona = spec
            .get("persona")
            .and_then(|v| v.as_str())
            .unwrap_or("A domain specialist.");
        let expertise = spec
            .get("expertise")
            .and_then(|v| v.as_str())
            .unwrap_or("general business strategy");

        let primer_key = sanitized.to_lowercase();
        match primer_templates.get(&primer_key) {
            Some(primer) => {
                let name = self.create_agent(&sanitized, persona, primer).await;
                log.push(format!("specialized agent '{name}' created with role-specific primer"));
                (name, cost, SpecializationOutcome::Success)
            }
            None => {
                let name = self.resolve_name_collision("FallbackGenericSpecialist").await;
                let generic_primer = format!("Apply your expertise in {expertise} to this decision.");
                self.communicator
                    .register_persona(
                        &name,
                        format!("You are {sanitized}. {persona}\n\n{generic_primer}"),
                    )
                    .await;
                log.push(format!(
                    "no primer template for '{primer_key}'; fell back to generic specialist '{name}'"
                ));
                (name, cost, SpecializationOutcome::Fallback)
            }
        }
    }
}

#[async_trait]
impl WorkflowAgent for WorkflowSlot {
    async fn execute(&self, input: WorkflowInput) -> WorkflowOutput {
        match &self.instance {
            Some(agent) => agent.execute(input).await,
            None => WorkflowOutput::failure("agent instance missing"),
        }
    }
}

fn sanitize_identifier(raw: &str) -> String {
    let mut out: String = raw
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    while out.contains("__") {
        out = out.replace("__", "_");
    }
    let trimmed = out.trim_matches('_');
    if trimmed.is_empty() {
        "Specialist".to_string()
    } else {
        trimmed.to_string()
    }
}

/// A deterministic stand-in workflow agent for tests and development, echoing its input back
/// as successful output (the six pipeline agents' real business logic is out of scope, §1).
pub struct EchoWorkflowAgent {
    pub step_name: String,
    pub revenue: Option<f64>,
}

#[async_trait]
impl WorkflowAgent for EchoWorkflowAgent {
    async fn execute(&self, input: WorkflowInput) -> WorkflowOutput {
        let mut data = json!({
            "step": self.step_name,
            "echoed_task": input.task_description,
        });
        if let Some(revenue) = self.revenue {
            data["revenue"] = json!(revenue);
        }
        WorkflowOutput {
            status: WorkflowStatus::Success,
            data,
            cost: 0.0,
            confidence: 0.9,
            tools_used: vec![],
            next_steps: vec![],
            error_message: None,
            human_task_description: None,
        }
    }
}
