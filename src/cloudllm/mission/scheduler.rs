//! Orchestration Scheduler (§4.10) — the core algorithm.
//!
//! Drives a single mission through up to `max_iterations` cycles, each a three-phase pipeline
//! (C-Suite planning → five-step workflow execution → C-Suite review) followed by the CFO
//! growth-approval guardrail — which is GrowthAgent's sole invocation point — and the
//! completion-consensus check. Modeled as one `tokio` task running a single-threaded
//! cooperative loop (§5): there is no parallelism across cycles or across workflow steps, only
//! suspension at explicit I/O points.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{json, Value};

use crate::cloudllm::mission::agent_manager::{AgentManager, WorkflowInput, WorkflowOutput, WorkflowStatus};
use crate::cloudllm::mission::auto_provision::{self, CapabilityKind};
use crate::cloudllm::mission::communicator::{Communicator, JsonAttempt};
use crate::cloudllm::mission::config::MissionConfig;
use crate::cloudllm::mission::cost::cycle_cost;
use crate::cloudllm::mission::error::OrchestrationError;
use crate::cloudllm::mission::memory_helper::MemoryHelper;
use crate::cloudllm::mission::mission_manager::{
    Cycle, CycleStatus, FinalStatus, Mission, MissionManager, MissionStatus, StepRecord,
};
use crate::cloudllm::mission::registry::Registry;
use crate::cloudllm::mission::review::{self, ConsensusPredicate};

/// The fixed six-step pipeline (§4.10 Phase 2). All six are bootstrapped as installable
/// workflow agents, but only the first five run unconditionally every cycle — GrowthAgent's
/// invocation is gated entirely by the CFO growth-approval guardrail below, since it is the
/// capability the guardrail exists to control.
pub const WORKFLOW_STEPS: [&str; 6] = [
    "ScanAgent",
    "DeployAgent",
    "CampaignAgent",
    "AnalyticsAgent",
    "FinanceAgent",
    "GrowthAgent",
];

/// The subset of `WORKFLOW_STEPS` executed unconditionally in Phase 2, in order. GrowthAgent
/// is deliberately excluded: it runs exactly once, iff the CFO guardrail approves it.
const UNCONDITIONAL_STEPS: [&str; 5] = ["ScanAgent", "DeployAgent", "CampaignAgent", "AnalyticsAgent", "FinanceAgent"];

fn next_cycle_id(iteration: u32) -> String {
    format!("{}_{iteration:04}", chrono::Utc::now().format("%Y%m%d%H%M%S%3f"))
}

/// Output of Phase 1, carried into Phase 2/3 as `csuite_guidance` (§4.10).
#[derive(Debug, Clone)]
pub struct PlanningOutcome {
    pub strategic_focus: String,
    pub budget_recommendation: f64,
    pub risks: Vec<String>,
    pub opportunities: Vec<String>,
    pub next_actions: Vec<String>,
}

impl PlanningOutcome {
    fn to_value(&self) -> Value {
        json!({
            "strategic_focus": self.strategic_focus,
            "budget_recommendation": self.budget_recommendation,
            "risks": self.risks,
            "opportunities": self.opportunities,
            "next_actions": self.next_actions,
        })
    }
}

/// Keyword-heuristic salvage of a non-JSON planning response (§4.10 Phase 1).
fn salvage_focus(raw: &str) -> String {
    let lower = raw.to_lowercase();
    if lower.contains("customer") {
        "customer_acquisition".to_string()
    } else if lower.contains("product") {
        "product_development".to_string()
    } else if lower.contains("marketing") {
        "marketing_optimization".to_string()
    } else if lower.contains("growth") {
        "growth_acceleration".to_string()
    } else {
        "general_strategy".to_string()
    }
}

fn next_actions_for_focus(focus: &str) -> Vec<String> {
    let actions: &[&str] = match focus {
        "customer_acquisition" => &["identify target segments", "launch acquisition campaign", "measure conversion"],
        "product_development" => &["scope next feature", "validate with early users", "ship iteration"],
        "marketing_optimization" => &["audit channel performance", "reallocate spend", "test new creative"],
        "growth_acceleration" => &["scale what's working", "remove onboarding friction", "expand to adjacent niche"],
        _ => &["reassess opportunity landscape", "stabilize current operations", "collect more signal"],
    };
    actions.iter().map(|s| s.to_string()).collect()
}

fn plurality_focus(foci: &[String]) -> String {
    let mut counts: Vec<(String, usize)> = Vec::new();
    for focus in foci {
        if let Some(entry) = counts.iter_mut().find(|(f, _)| f == focus) {
            entry.1 += 1;
        } else {
            counts.push((focus.clone(), 1));
        }
    }
    counts
        .into_iter()
        .max_by_key(|(_, count)| *count)
        .map(|(focus, _)| focus)
        .unwrap_or_else(|| "general_strategy".to_string())
}

/// Phase 1 — C-Suite Strategic Planning. Polls up to 3 of the live strategic C-Suite agents.
async fn plan_phase(
    communicator: &Communicator,
    agent_manager: &AgentManager,
    mission_context: &Value,
    json_log: &mut Vec<JsonAttempt>,
) -> (PlanningOutcome, f64) {
    let participants: Vec<String> = agent_manager
        .live_strategic_csuite_names()
        .await
        .into_iter()
        .take(3)
        .collect();

    let mut foci = Vec::new();
    let mut budgets = Vec::new();
    let mut risks = Vec::new();
    let mut opportunities = Vec::new();
    let mut total_cost = 0.0;

    for participant in &participants {
        let prompt = format!(
            "Mission context:\n{mission_context}\n\n\
             As {participant}, propose this cycle's strategic focus. Return a JSON object with \
             keys `focus` (string), `budget_recommendation` (number), `risks` (array of strings), \
             and `opportunities` (array of strings)."
        );
        let result = communicator
            .get_json(
                participant,
                &prompt,
                "Reply with JSON: {\"focus\": string, \"budget_recommendation\": number, \
                 \"risks\": [string], \"opportunities\": [string]}.",
                json_log,
            )
            .await;

        match result {
            Ok((value, cost)) => {
                total_cost += cost;
                let focus = value
                    .get("focus")
                    .and_then(|v| v.as_str())
                    .map(String::from)
                    .unwrap_or_else(|| salvage_focus(&review::describe_for_review(&value)));
                foci.push(focus);
                budgets.push(value.get("budget_recommendation").and_then(|v| v.as_f64()).unwrap_or(0.0));
                if let Some(array) = value.get("risks").and_then(|v| v.as_array()) {
                    risks.extend(array.iter().filter_map(|v| v.as_str().map(String::from)));
                }
                if let Some(array) = value.get("opportunities").and_then(|v| v.as_array()) {
                    opportunities.extend(array.iter().filter_map(|v| v.as_str().map(String::from)));
                }
            }
            Err(e) => {
                // The last raw response lives in json_log; salvage from it rather than discard.
                let raw = json_log
                    .iter()
                    .rev()
                    .find(|a| &a.agent == participant)
                    .map(|a| a.raw_response.clone())
                    .unwrap_or_default();
                log::warn!(target: "mission::scheduler", "planning call to '{participant}' failed ({e}), salvaging focus from raw text");
                foci.push(salvage_focus(&raw));
            }
        }
    }

    let strategic_focus = if foci.is_empty() {
        "general_strategy".to_string()
    } else {
        plurality_focus(&foci)
    };
    let budget_recommendation = if budgets.is_empty() {
        0.0
    } else {
        budgets.iter().sum::<f64>() / budgets.len() as f64
    };

    let outcome = PlanningOutcome {
        next_actions: next_actions_for_focus(&strategic_focus),
        strategic_focus,
        budget_recommendation,
        risks,
        opportunities,
    };
    (outcome, total_cost)
}

fn build_step_input(
    step: &str,
    mission_context: &Value,
    cycle_context: &Value,
    guidance: Option<&Value>,
    step_outputs: &HashMap<String, Value>,
) -> WorkflowInput {
    let mut extra = HashMap::new();
    if let Some(guidance) = guidance {
        extra.insert("csuite_guidance".to_string(), guidance.clone());
    }
    let task_description = match step {
        "DeployAgent" => {
            let opportunity = step_outputs
                .get("ScanAgent")
                .and_then(|v| v.get("top_opportunity").or_else(|| v.get("echoed_task")))
                .cloned()
                .unwrap_or(Value::Null);
            extra.insert("top_opportunity".to_string(), opportunity);
            "Deploy the selected opportunity.".to_string()
        }
        "CampaignAgent" => {
            let product = step_outputs.get("DeployAgent").cloned().unwrap_or(Value::Null);
            extra.insert("product_details".to_string(), product);
            "Run an acquisition campaign for the deployed product.".to_string()
        }
        "AnalyticsAgent" => {
            extra.insert("cycle_to_date".to_string(), json!(step_outputs));
            "Analyze performance across this cycle's steps so far.".to_string()
        }
        "FinanceAgent" => {
            "Review unit economics and spend discipline for this cycle.".to_string()
        }
        "GrowthAgent" => "Scale what is working within approved budget.".to_string(),
        _ => "Scan for a profitable opportunity matching the mission objective.".to_string(),
    };
    WorkflowInput {
        task_description,
        mission_context: mission_context.clone(),
        cycle_context: cycle_context.clone(),
        extra,
    }
}

/// Resolve and execute a single workflow step, auto-provisioning a missing agent on the fly.
async fn run_step(
    registry: &Registry,
    agent_manager: &AgentManager,
    communicator: &Communicator,
    step: &str,
    input: WorkflowInput,
    available_agents: &[String],
    json_log: &mut Vec<JsonAttempt>,
) -> StepRecord {
    if !agent_manager.has_workflow_agent(step).await {
        let outcome = auto_provision::auto_provision(
            registry,
            agent_manager,
            communicator,
            CapabilityKind::Agent,
            step,
            &format!("fixed pipeline step '{step}'"),
            available_agents,
            json_log,
        )
        .await;
        match outcome {
            Ok(outcome) if outcome.accepted => {}
            _ => {
                log::error!(target: "mission::scheduler", "could not resolve or auto-provision '{step}'");
                return StepRecord::SkippedMissingCapability {
                    timestamp: chrono::Utc::now(),
                };
            }
        }
    }

    let output: WorkflowOutput = match agent_manager.execute_workflow_agent(step, input).await {
        Ok(output) => output,
        Err(e) => {
            return StepRecord::Failure {
                error_message: e.to_string(),
                cost: 0.0,
                timestamp: chrono::Utc::now(),
            }
        }
    };

    let timestamp = chrono::Utc::now();
    match output.status {
        WorkflowStatus::Success => StepRecord::Success {
            data: output.data,
            cost: output.cost,
            confidence: output.confidence,
            tools_used: output.tools_used,
            timestamp,
        },
        WorkflowStatus::Failure => StepRecord::Failure {
            error_message: output.error_message.unwrap_or_else(|| "unknown failure".to_string()),
            cost: output.cost,
            timestamp,
        },
        WorkflowStatus::RequiresHuman => StepRecord::RequiresHuman {
            human_task_description: output.human_task_description,
            timestamp,
        },
        WorkflowStatus::RequiresTools => StepRecord::RequiresTools { timestamp },
    }
}

/// Phase 3 — C-Suite Review and Adjustment. Polls up to 2 strategic participants.
async fn review_phase(
    communicator: &Communicator,
    agent_manager: &AgentManager,
    cycle_summary: &Value,
    json_log: &mut Vec<JsonAttempt>,
) -> (Value, f64) {
    let participants: Vec<String> = agent_manager
        .live_strategic_csuite_names()
        .await
        .into_iter()
        .take(2)
        .collect();

    let mut assessments = Vec::new();
    let mut adjustments = Vec::new();
    let mut next_focus = None;
    let mut total_cost = 0.0;

    for participant in &participants {
        let prompt = format!(
            "Review this cycle's results:\n{cycle_summary}\n\n\
             Return a JSON object with keys `assessment` (string), `adjustments` (array of \
             strings), and `next_focus` (string)."
        );
        if let Ok((value, cost)) = communicator
            .get_json(
                participant,
                &prompt,
                "Reply with JSON: {\"assessment\": string, \"adjustments\": [string], \
                 \"next_focus\": string}.",
                json_log,
            )
            .await
        {
            total_cost += cost;
            if let Some(a) = value.get("assessment").and_then(|v| v.as_str()) {
                assessments.push(a.to_string());
            }
            if let Some(array) = value.get("adjustments").and_then(|v| v.as_array()) {
                adjustments.extend(array.iter().filter_map(|v| v.as_str().map(String::from)));
            }
            if let Some(f) = value.get("next_focus").and_then(|v| v.as_str()) {
                next_focus = Some(f.to_string());
            }
        }
    }

    (
        json!({
            "assessments": assessments,
            "adjustments": adjustments,
            "next_focus": next_focus,
        }),
        total_cost,
    )
}

/// CFO decision recorded into the cycle (§4.10 Guardrail).
#[derive(Debug, Clone)]
pub struct CfoDecision {
    pub approved: bool,
    pub budget: f64,
    pub reason: String,
    pub cost: f64,
}

/// Guardrail — CFO Growth Approval. Consults the CFO agent if present, else a heuristic.
async fn cfo_growth_approval(
    communicator: &Communicator,
    config: &MissionConfig,
    agent_manager: &AgentManager,
    revenue: f64,
    json_log: &mut Vec<JsonAttempt>,
) -> CfoDecision {
    let cfo_name = "CFO-Agent".to_string();
    if !agent_manager.live_strategic_csuite_names().await.contains(&cfo_name) {
        return heuristic_cfo_decision("", config, revenue);
    }

    let prompt = format!(
        "This cycle produced ${revenue:.2} in revenue. Should GrowthAgent be allowed to scale \
         spend? Return a JSON object with keys `approved` (bool), `budget` (number), and \
         `reason` (string)."
    );
    match communicator
        .get_json(
            &cfo_name,
            &prompt,
            "Reply with JSON: {\"approved\": bool, \"budget\": number, \"reason\": string}.",
            json_log,
        )
        .await
    {
        Ok((value, cost)) => CfoDecision {
            approved: value.get("approved").and_then(|v| v.as_bool()).unwrap_or(false),
            budget: value.get("budget").and_then(|v| v.as_f64()).unwrap_or(0.0),
            reason: value
                .get("reason")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            cost,
        },
        Err(_) => {
            let raw = json_log
                .iter()
                .rev()
                .find(|a| a.agent == cfo_name)
                .map(|a| a.raw_response.clone())
                .unwrap_or_default();
            heuristic_cfo_decision(&raw, config, revenue)
        }
    }
}

fn heuristic_cfo_decision(raw: &str, config: &MissionConfig, revenue: f64) -> CfoDecision {
    let lower = raw.to_lowercase();
    let approved = config.cfo_affirmative_tokens.iter().any(|t| lower.contains(t.as_str()));
    CfoDecision {
        approved,
        budget: (revenue * 0.15).min(100.0),
        reason: "heuristic fallback (CFO unavailable or non-JSON response)".to_string(),
        cost: 0.0,
    }
}

/// Completion Consensus (§4.10): unlocked only once `total_revenue >= threshold` and
/// `successful_cycles >= min_successful_cycles`, then unanimous across up to 3 participants.
async fn completion_consensus(
    communicator: &Communicator,
    agent_manager: &AgentManager,
    config: &MissionConfig,
    mission: &Mission,
    json_log: &mut Vec<JsonAttempt>,
) -> (bool, f64) {
    if mission.total_revenue < config.completion_revenue_threshold
        || mission.completed_cycles < config.min_successful_cycles_for_completion
    {
        return (false, 0.0);
    }

    let participants: Vec<String> = agent_manager
        .live_strategic_csuite_names()
        .await
        .into_iter()
        .take(3)
        .collect();

    let mut votes = Vec::new();
    let mut total_cost = 0.0;
    for participant in &participants {
        let prompt = format!(
            "Mission progress: revenue=${:.2}, successful_cycles={}. Is this mission's \
             objective complete? Return a JSON object with keys `mission_complete` (bool) and \
             `reasoning` (string).",
            mission.total_revenue, mission.completed_cycles
        );
        if let Ok((value, cost)) = communicator
            .get_json(
                participant,
                &prompt,
                "Reply with JSON: {\"mission_complete\": bool, \"reasoning\": string}.",
                json_log,
            )
            .await
        {
            total_cost += cost;
            votes.push(value.get("mission_complete").and_then(|v| v.as_bool()).unwrap_or(false));
        } else {
            votes.push(false);
        }
    }

    let approvals = votes.iter().filter(|v| **v).count();
    (ConsensusPredicate::Unanimous.satisfied(approvals, votes.len()) && !votes.is_empty(), total_cost)
}

/// Final outcome of [`run_mission`].
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub mission: Mission,
    pub final_status: FinalStatus,
}

/// `run_mission(name, objective, resume)` (§4.10): the scheduler's entry point. Drives cycles
/// until one of the four termination rules fires.
pub async fn run_mission(
    registry: Arc<Registry>,
    agent_manager: Arc<AgentManager>,
    communicator: Arc<Communicator>,
    mission_manager: &MissionManager,
    config: &MissionConfig,
    name: &str,
    objective: &str,
    resume: bool,
) -> Result<RunOutcome, OrchestrationError> {
    let (mut mission, workspace, mut memory) = mission_manager.create_or_load(name, objective, resume)?;
    agent_manager.bootstrap_c_suite(objective).await;

    for step in WORKFLOW_STEPS {
        if !agent_manager.has_workflow_agent(step).await {
            agent_manager
                .install_workflow_agent(
                    step,
                    Box::new(crate::cloudllm::mission::agent_manager::EchoWorkflowAgent {
                        step_name: step.to_string(),
                        revenue: None,
                    }),
                )
                .await;
        }
    }

    let mut last_planned_revenue: Option<f64> = None;
    let mut guidance: Option<PlanningOutcome> = None;

    let final_status = 'outer: loop {
        if mission.cycle_ids.len() as u32 >= config.max_iterations as u32 {
            break FinalStatus::MaxIterationsReached;
        }
        let iteration = mission.cycle_ids.len() as u32 + 1;

        let result: Result<bool, OrchestrationError> = async {
            let mission_context = mission_manager.get_mission_context_for_agents(&mission);
            let mut cycle = Cycle::start(next_cycle_id(iteration), mission.mission_id.as_str(), "pending");
            mission_manager.link_cycle_to_previous(&mission, workspace.as_ref(), &mut cycle)?;

            let needs_plan = guidance.is_none() || last_planned_revenue != Some(mission.total_revenue);
            if needs_plan {
                let (outcome, cost) = plan_phase(
                    &communicator,
                    &agent_manager,
                    &mission_context,
                    &mut cycle.logs.orchestrator_interactions,
                )
                .await;
                cycle.total_cost += cost;
                cycle.focus = outcome.strategic_focus.clone();
                last_planned_revenue = Some(mission.total_revenue);
                guidance = Some(outcome);
            } else if let Some(existing) = &guidance {
                cycle.focus = existing.strategic_focus.clone();
            }
            let guidance_value = guidance.as_ref().map(PlanningOutcome::to_value);

            let available_agents = agent_manager.live_csuite_names().await;
            let mut step_outputs: HashMap<String, Value> = HashMap::new();
            let mut any_step_ran = false;
            let mut cycle_successful = true;
            let cycle_context = json!({ "focus": cycle.focus, "sequence_number": cycle.sequence_number });

            for step in UNCONDITIONAL_STEPS {
                let input = build_step_input(
                    step,
                    &mission_context,
                    &cycle_context,
                    guidance_value.as_ref(),
                    &step_outputs,
                );
                let record = run_step(
                    &registry,
                    &agent_manager,
                    &communicator,
                    step,
                    input,
                    &available_agents,
                    &mut cycle.logs.specialist_interactions,
                )
                .await;
                cycle.logs.execution_attempts.push(format!("{step}: dispatched"));

                if let StepRecord::Success { data, .. } = &record {
                    step_outputs.insert(step.to_string(), data.clone());
                    any_step_ran = true;
                    cycle.agents_used.push(step.to_string());
                    if step == "AnalyticsAgent" {
                        if let Some(revenue) = data.get("revenue").and_then(|v| v.as_f64()) {
                            cycle.kpis.insert("revenue".to_string(), revenue);
                        }
                    }
                    let mut memory_helper = MemoryHelper::new(&mut memory, mission.mission_id.clone());
                    memory_helper.log_workflow_event(step, "step succeeded", &review::describe_for_review(data));
                } else {
                    any_step_ran = any_step_ran || !matches!(record, StepRecord::SkippedMissingCapability { .. });
                    cycle_successful = false;
                    let description = match &record {
                        StepRecord::Failure { error_message, .. } => error_message.clone(),
                        StepRecord::RequiresHuman { .. } => "requires human intervention".to_string(),
                        StepRecord::RequiresTools { .. } => "requires additional tools".to_string(),
                        StepRecord::SkippedMissingCapability { .. } => "missing capability, skipped".to_string(),
                        _ => String::new(),
                    };
                    let mut memory_helper = MemoryHelper::new(&mut memory, mission.mission_id.clone());
                    memory_helper.log_error_or_failure(step, &description, "workflow pipeline step");
                }
                cycle.record_step(step, record);
            }

            let revenue_this_cycle = cycle.kpis.get("revenue").copied().unwrap_or(0.0);
            mission.total_revenue += revenue_this_cycle;

            let mut review_cost = 0.0;
            if any_step_ran {
                let cycle_summary = json!({
                    "focus": cycle.focus,
                    "steps": cycle.steps,
                    "revenue_this_cycle": revenue_this_cycle,
                });
                let (review_value, cost) = review_phase(
                    &communicator,
                    &agent_manager,
                    &cycle_summary,
                    &mut cycle.logs.review_interactions,
                )
                .await;
                review_cost = cost;
                if let Some(next_focus) = review_value.get("next_focus").and_then(|v| v.as_str()) {
                    if let Some(g) = &mut guidance {
                        g.strategic_focus = next_focus.to_string();
                    }
                }
            }

            let mut direct_cost = 0.0;
            if revenue_this_cycle > 0.0 {
                let decision = cfo_growth_approval(
                    &communicator,
                    config,
                    &agent_manager,
                    revenue_this_cycle,
                    &mut cycle.logs.orchestrator_interactions,
                )
                .await;
                direct_cost += decision.cost;
                if decision.approved {
                    let growth_input = build_step_input(
                        "GrowthAgent",
                        &mission_context,
                        &cycle_context,
                        guidance_value.as_ref(),
                        &step_outputs,
                    );
                    let record = run_step(
                        &registry,
                        &agent_manager,
                        &communicator,
                        "GrowthAgent",
                        growth_input,
                        &available_agents,
                        &mut cycle.logs.orchestrator_interactions,
                    )
                    .await;
                    cycle.record_step("GrowthAgent", record);
                } else {
                    cycle.record_step(
                        "GrowthAgent",
                        StepRecord::DeclinedByCfo {
                            reason: decision.reason.clone(),
                            timestamp: chrono::Utc::now(),
                        },
                    );
                }
            }

            cycle.total_cost = cycle_cost(cycle.total_cost, 0.0, review_cost, direct_cost)
                + cycle.steps.values().map(|s| s.cost()).sum::<f64>();
            cycle.status = if cycle_successful { CycleStatus::Success } else { CycleStatus::Failed };
            cycle.duration_minutes = 0.0;

            mission_manager.save_cycle_log(workspace.as_ref(), &cycle);
            mission_manager.update_from_cycle(&mut mission, workspace.as_ref(), &cycle)?;

            let (complete, completion_cost) = completion_consensus(
                &communicator,
                &agent_manager,
                config,
                &mission,
                &mut cycle.logs.orchestrator_interactions,
            )
            .await;
            mission.total_cost += completion_cost;

            Ok(complete)
        }
        .await;

        match result {
            Ok(true) => break 'outer FinalStatus::SuccessCsuiteConsensus,
            Ok(false) => {
                if mission.failed_cycles > config.max_failed_cycles {
                    break 'outer FinalStatus::TooManyFailures;
                }
            }
            Err(e) => {
                log::error!(target: "mission::scheduler", "unhandled error in cycle {iteration}: {e}");
                mission.key_learnings.push(format!("critical error in cycle {iteration}: {e}"));
                break 'outer FinalStatus::CriticalError;
            }
        }

        tokio::time::sleep(std::time::Duration::from_secs(1)).await;
    };

    mission.status = match final_status {
        FinalStatus::SuccessCsuiteConsensus => MissionStatus::Completed,
        FinalStatus::CriticalError => MissionStatus::Failed,
        FinalStatus::TooManyFailures => MissionStatus::Failed,
        FinalStatus::MaxIterationsReached => MissionStatus::Paused,
        FinalStatus::StoppedByUser => MissionStatus::Paused,
    };
    mission.final_status = Some(final_status);

    if let Some(handle) = &workspace {
        match serde_json::to_value(&mission) {
            Ok(value) => {
                if let Err(e) = handle.save_mission_log(&value) {
                    log::error!(target: "mission::scheduler", "failed to persist final mission log: {e}");
                }
            }
            Err(e) => log::error!(target: "mission::scheduler", "failed to serialize final mission log: {e}"),
        }
    }

    Ok(RunOutcome { mission, final_status })
}
