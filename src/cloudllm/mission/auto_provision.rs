//! Auto-Provision Pipeline (§4.8).
//!
//! When a workflow step needs a capability (agent or tool) the Registry doesn't have, this
//! module classifies the gap, drafts a spec (or, failing that, a deterministic fallback stub),
//! puts it to consensus, and — on acceptance — commits it to the [`Registry`] and, for agents,
//! installs a live instance into the [`AgentManager`].

use serde_json::{json, Value};

use crate::cloudllm::mission::agent_manager::{AgentManager, EchoWorkflowAgent};
use crate::cloudllm::mission::communicator::{Communicator, JsonAttempt};
use crate::cloudllm::mission::error::AutoProvisionError;
use crate::cloudllm::mission::registry::{
    AgentSpec, AuthKind, CertificationStatus, Endpoint, Proposal, Registry, ToolKind, ToolRecord,
    ToolSource,
};
use crate::cloudllm::mission::review::{self, ConsensusPredicate};

/// What's missing: an agent capable of performing a task, or a callable tool (§4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapabilityKind {
    Agent,
    Tool,
}

/// Lexicon of ordinary business-utility capabilities that skip peer review and go straight to
/// consensus at a lowered bar (§4.8 "Triviality classification"). Anything outside this list is
/// treated as non-trivial and reviewed at the normal majority bar regardless.
const TRIVIAL_TOOL_TOKENS: [&str; 17] = [
    "spreadsheet",
    "calendar",
    "email",
    "crm",
    "analytics",
    "payment",
    "webhook",
    "hosting",
    "domain",
    "market",
    "research",
    "campaign",
    "ads",
    "seo",
    "tracking",
    "metrics",
    "dashboard",
];

/// `classify_triviality(kind, capability_name, description) -> bool` (§4.8). A request is
/// trivial iff it is a *tool* request whose name or description matches a known
/// business-utility token; agent requests are conservative by default and are never classified
/// as trivial, per §4.8's "Agent requests are conservative by default (not trivial)."
pub fn classify_triviality(kind: CapabilityKind, name: &str, description: &str) -> bool {
    if kind != CapabilityKind::Tool {
        return false;
    }
    let haystack = format!("{name} {description}").to_lowercase();
    TRIVIAL_TOOL_TOKENS.iter().any(|token| haystack.contains(token))
}

/// Outcome of [`run`] (§4.8).
#[derive(Debug, Clone)]
pub struct ProvisionOutcome {
    pub name: String,
    pub kind: CapabilityKind,
    pub accepted: bool,
    pub cost: f64,
    pub source: ToolSource,
}

/// Default port for the placeholder local webhook a fallback stub points at (§4.8 step 2).
const FALLBACK_WEBHOOK_PORT: u16 = 5678;

/// Slugify a capability name for use in the fallback webhook placeholder URL: lowercase,
/// non-alphanumerics collapsed to a single `-`, leading/trailing `-` trimmed.
fn slug_for_url(name: &str) -> String {
    let mut slug: String = name
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    while slug.contains("--") {
        slug = slug.replace("--", "-");
    }
    slug.trim_matches('-').to_string()
}

fn fallback_tool_spec(name: &str, description: &str) -> ToolRecord {
    ToolRecord {
        name: name.to_string(),
        kind: ToolKind::Local,
        endpoint_url: format!(
            "http://localhost:{FALLBACK_WEBHOOK_PORT}/webhook-test/{}-placeholder",
            slug_for_url(name)
        ),
        method: "POST".to_string(),
        auth: AuthKind::None,
        request_schema: json!({"type": "object"}),
        response_schema: json!({"type": "object"}),
        status: CertificationStatus::Conditional,
        generated_code_path: None,
        source: ToolSource::FallbackStub,
        requires_manual_setup: true,
    }
}

fn fallback_agent_spec(description: &str) -> AgentSpec {
    AgentSpec {
        description: description.to_string(),
        capabilities: vec![],
        required_tools: vec![],
        optional_tools: vec![],
        config: Value::Null,
    }
}

/// `draft_tool_spec(name, description) -> (ToolRecord, cost)`: asks a "tool creation
/// specialist" persona for a spec, falling back to a stub on any failure (§4.8).
async fn draft_tool_spec(
    communicator: &Communicator,
    name: &str,
    description: &str,
    json_log: &mut Vec<JsonAttempt>,
) -> (ToolRecord, f64, ToolSource) {
    let persona = "ToolCreationSpecialist";
    communicator
        .register_persona(
            persona,
            "You are a tool creation specialist. You design minimal, webhook-based tool \
             integrations for a business automation system.",
        )
        .await;

    let prompt = format!(
        "We need a new tool named '{name}' that does the following: {description}\n\n\
         Return a JSON object with keys `endpoint_url` (string), `method` (HTTP verb string), \
         `auth` (one of \"none\", \"api_key\", \"bearer\", \"oauth2\"), and \
         `requires_manual_setup` (bool)."
    );
    let result = communicator
        .get_json(
            persona,
            &prompt,
            "Reply with JSON: {\"endpoint_url\": string, \"method\": string, \"auth\": string, \
             \"requires_manual_setup\": bool}.",
            json_log,
        )
        .await;

    match result {
        Ok((value, cost)) => {
            let auth = match value.get("auth").and_then(|v| v.as_str()).unwrap_or("none") {
                "api_key" => AuthKind::ApiKey,
                "bearer" => AuthKind::Bearer,
                "oauth2" => AuthKind::OAuth2,
                _ => AuthKind::None,
            };
            let tool = ToolRecord {
                name: name.to_string(),
                kind: ToolKind::Webhook,
                endpoint_url: value
                    .get("endpoint_url")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string(),
                method: value
                    .get("method")
                    .and_then(|v| v.as_str())
                    .unwrap_or("POST")
                    .to_string(),
                auth,
                request_schema: json!({"type": "object"}),
                response_schema: json!({"type": "object"}),
                status: CertificationStatus::Pending,
                generated_code_path: None,
                source: ToolSource::AiGeneratedReal,
                requires_manual_setup: value
                    .get("requires_manual_setup")
                    .and_then(|v| v.as_bool())
                    .unwrap_or(true),
            };
            (tool, cost, ToolSource::AiGeneratedReal)
        }
        Err(e) => {
            log::warn!(
                target: "mission::auto_provision",
                "tool spec generation for '{name}' failed, using fallback stub: {e}"
            );
            (fallback_tool_spec(name, description), 0.0, ToolSource::FallbackStub)
        }
    }
}

/// `draft_agent_spec(name, description) -> (AgentSpec, cost)`, mirroring `draft_tool_spec`.
async fn draft_agent_spec(
    communicator: &Communicator,
    name: &str,
    description: &str,
    json_log: &mut Vec<JsonAttempt>,
) -> (AgentSpec, f64) {
    let persona = "AgentCreationSpecialist";
    communicator
        .register_persona(
            persona,
            "You are an agent creation specialist. You design capability specs for new \
             business automation agents.",
        )
        .await;

    let prompt = format!(
        "We need a new agent named '{name}' with this responsibility: {description}\n\n\
         Return a JSON object with keys `capabilities` (array of short strings) and \
         `required_tools` (array of short strings, may be empty)."
    );
    let result = communicator
        .get_json(
            persona,
            &prompt,
            "Reply with JSON: {\"capabilities\": [string], \"required_tools\": [string]}.",
            json_log,
        )
        .await;

    match result {
        Ok((value, cost)) => {
            let capabilities = value
                .get("capabilities")
                .and_then(|v| v.as_array())
                .map(|a| a.iter().filter_map(|v| v.as_str().map(String::from)).collect())
                .unwrap_or_default();
            let required_tools = value
                .get("required_tools")
                .and_then(|v| v.as_array())
                .map(|a| a.iter().filter_map(|v| v.as_str().map(String::from)).collect())
                .unwrap_or_default();
            (
                AgentSpec {
                    description: description.to_string(),
                    capabilities,
                    required_tools,
                    optional_tools: vec![],
                    config: Value::Null,
                },
                cost,
            )
        }
        Err(e) => {
            log::warn!(
                target: "mission::auto_provision",
                "agent spec generation for '{name}' failed, using fallback spec: {e}"
            );
            (fallback_agent_spec(description), 0.0)
        }
    }
}

/// `auto_provision(kind, name, description, available_agents) -> ProvisionOutcome` (§4.8): the
/// full classify → draft → consensus → apply pipeline. Errors are reserved for infrastructure
/// failure (registry I/O); an unaccepted proposal is a normal `Ok` outcome with `accepted: false`.
pub async fn auto_provision(
    registry: &Registry,
    agent_manager: &AgentManager,
    communicator: &Communicator,
    kind: CapabilityKind,
    name: &str,
    description: &str,
    available_agents: &[String],
    json_log: &mut Vec<JsonAttempt>,
) -> Result<ProvisionOutcome, AutoProvisionError> {
    let trivial = classify_triviality(kind, name, description);
    let predicate = if trivial {
        ConsensusPredicate::Weighted(0.5)
    } else {
        ConsensusPredicate::Majority
    };

    let mut drafted_agent_spec: Option<AgentSpec> = None;
    let (proposal_description, cost, source) = match kind {
        CapabilityKind::Tool => {
            let (tool, cost, source) = draft_tool_spec(communicator, name, description, json_log).await;
            (
                review::describe_for_review(&json!({
                    "kind": "tool",
                    "name": tool.name,
                    "endpoint_url": tool.endpoint_url,
                    "method": tool.method,
                    "requires_manual_setup": tool.requires_manual_setup,
                    "source": tool.source,
                })),
                cost,
                Some((tool, source)),
            )
        }
        CapabilityKind::Agent => {
            let (spec, cost) = draft_agent_spec(communicator, name, description, json_log).await;
            drafted_agent_spec = Some(spec);
            (
                review::describe_for_review(&json!({
                    "kind": "agent",
                    "name": name,
                    "description": description,
                })),
                cost,
                None,
            )
        }
    };

    let (reviews, review_cost) =
        review::batch_peer_review(communicator, "AutoProvision", &proposal_description, available_agents, json_log, false)
            .await?;
    let approvals = reviews.iter().filter(|r| r.approved).count();
    let accepted = predicate.satisfied(approvals, reviews.len());
    let total_cost = cost + review_cost;

    if !accepted {
        return Ok(ProvisionOutcome {
            name: name.to_string(),
            kind,
            accepted: false,
            cost: total_cost,
            source: source.map(|(_, s)| s).unwrap_or(ToolSource::FallbackStub),
        });
    }

    match kind {
        CapabilityKind::Tool => {
            let (tool, tool_source) = source.expect("tool drafting always returns a source");
            registry
                .apply_proposal(Proposal::AddTool {
                    name: name.to_string(),
                    tool,
                })
                .await?;
            Ok(ProvisionOutcome {
                name: name.to_string(),
                kind,
                accepted: true,
                cost: total_cost,
                source: tool_source,
            })
        }
        CapabilityKind::Agent => {
            let spec = drafted_agent_spec.expect("agent drafting always produces a spec");
            registry
                .apply_proposal(Proposal::AddAgent {
                    name: name.to_string(),
                    spec,
                    endpoint: Endpoint::Internal,
                })
                .await?;
            agent_manager
                .install_workflow_agent(
                    name.to_string(),
                    Box::new(EchoWorkflowAgent {
                        step_name: name.to_string(),
                        revenue: None,
                    }),
                )
                .await;
            Ok(ProvisionOutcome {
                name: name.to_string(),
                kind,
                accepted: true,
                cost: total_cost,
                source: ToolSource::AiGeneratedReal,
            })
        }
    }
}
