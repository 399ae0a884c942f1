//! Mission Manager (§4.9) and the Mission/Cycle data model (§3).
//!
//! Owns the only mutation path for [`Mission`] and [`Cycle`] records. The scheduler reads
//! these structures freely but never writes them directly, per §3's "Ownership" rule.

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::cloudllm::mission::communicator::JsonAttempt;
use crate::cloudllm::mission::error::MissionManagerError;
use crate::cloudllm::mission::vector_memory::VectorMemoryStore;
use crate::cloudllm::mission::workspace::{AssetCategory, WorkspaceHandle, WorkspaceStatus};

/// §3 "Mission" status. Intentionally narrower than the termination vocabulary of §4.10/§7
/// (`success_csuite_consensus`, `too_many_failures`, …) — those are recorded separately as
/// [`FinalStatus`] once a mission actually terminates (DESIGN.md open-question decision).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissionStatus {
    Active,
    Paused,
    Completed,
    Failed,
    Archived,
}

/// The terminal reason recorded once a mission stops, per §4.10's four termination rules and
/// §7's "User cancellation" row. `Mission::status` moves to `Completed`/`Failed` at the same
/// time this is set; a mission with `final_status == None` is still running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinalStatus {
    SuccessCsuiteConsensus,
    TooManyFailures,
    MaxIterationsReached,
    CriticalError,
    StoppedByUser,
}

/// §3 "Cycle" status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleStatus {
    Started,
    Success,
    Failed,
}

/// One workflow-pipeline step's recorded outcome (§4.10 Phase 2), including the
/// orchestration-level dispositions that sit outside the agent's own `WorkflowOutput`
/// (a step the registry/auto-provision pipeline couldn't resolve, or one the CFO guardrail
/// declined to run).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepRecord {
    Success {
        data: Value,
        cost: f64,
        confidence: f64,
        tools_used: Vec<String>,
        timestamp: DateTime<Utc>,
    },
    Failure {
        error_message: String,
        cost: f64,
        timestamp: DateTime<Utc>,
    },
    RequiresHuman {
        human_task_description: Option<String>,
        timestamp: DateTime<Utc>,
    },
    RequiresTools {
        timestamp: DateTime<Utc>,
    },
    /// §4.10's CFO growth-approval guardrail declined to run this step.
    DeclinedByCfo {
        reason: String,
        timestamp: DateTime<Utc>,
    },
    /// §4.8's auto-provision pipeline could not resolve the capability this step needed.
    SkippedMissingCapability {
        timestamp: DateTime<Utc>,
    },
}

impl StepRecord {
    pub fn cost(&self) -> f64 {
        match self {
            StepRecord::Success { cost, .. } | StepRecord::Failure { cost, .. } => *cost,
            _ => 0.0,
        }
    }

    pub fn is_failure(&self) -> bool {
        !matches!(self, StepRecord::Success { .. })
    }
}

/// The six structured sub-logs a cycle accumulates (§3 "Cycle").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CycleLogs {
    #[serde(default)]
    pub agent_management: Vec<String>,
    #[serde(default)]
    pub orchestrator_interactions: Vec<JsonAttempt>,
    #[serde(default)]
    pub specialist_interactions: Vec<JsonAttempt>,
    #[serde(default)]
    pub review_interactions: Vec<JsonAttempt>,
    #[serde(default)]
    pub execution_attempts: Vec<String>,
    #[serde(default)]
    pub json_parse_attempts: Vec<JsonAttempt>,
}

/// §3 "Cycle".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cycle {
    pub cycle_id: String,
    pub mission_id: String,
    pub sequence_number: u32,
    pub previous_cycle_id: Option<String>,
    pub next_cycle_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub focus: String,
    pub status: CycleStatus,
    pub error_message: Option<String>,
    pub duration_minutes: f64,
    pub total_cost: f64,
    #[serde(default)]
    pub steps: HashMap<String, StepRecord>,
    #[serde(default)]
    pub kpis: HashMap<String, f64>,
    #[serde(default)]
    pub agents_used: Vec<String>,
    #[serde(default)]
    pub tools_used: Vec<String>,
    /// Short carried-forward context from up to 3 prior cycles (§4.9 `link_cycle_to_previous`).
    #[serde(default)]
    pub carried_context: Vec<String>,
    #[serde(default)]
    pub logs: CycleLogs,
}

impl Cycle {
    /// Begin a new, unlinked cycle. [`MissionManager::link_cycle_to_previous`] must be called
    /// before the cycle is run, per §3's "linking to prior cycle is atomic with creation".
    pub fn start(cycle_id: impl Into<String>, mission_id: impl Into<String>, focus: impl Into<String>) -> Self {
        Self {
            cycle_id: cycle_id.into(),
            mission_id: mission_id.into(),
            sequence_number: 0,
            previous_cycle_id: None,
            next_cycle_id: None,
            timestamp: Utc::now(),
            focus: focus.into(),
            status: CycleStatus::Started,
            error_message: None,
            duration_minutes: 0.0,
            total_cost: 0.0,
            steps: HashMap::new(),
            kpis: HashMap::new(),
            agents_used: Vec::new(),
            tools_used: Vec::new(),
            carried_context: Vec::new(),
            logs: CycleLogs::default(),
        }
    }

    pub fn record_step(&mut self, name: &str, record: StepRecord) {
        self.total_cost += record.cost();
        self.steps.insert(name.to_string(), record);
    }
}

/// A compact per-cycle summary attached to [`Mission::cycle_summaries`] (§4.9
/// `update_from_cycle`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleSummary {
    pub cycle_id: String,
    pub focus: String,
    pub status: CycleStatus,
    pub cost: f64,
    pub duration_minutes: f64,
    pub agents_used: Vec<String>,
    pub kpis: HashMap<String, f64>,
    pub timestamp: DateTime<Utc>,
}

/// §3 "Mission".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mission {
    pub mission_id: String,
    pub name: String,
    pub objective: String,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub status: MissionStatus,
    pub final_status: Option<FinalStatus>,
    pub total_cost: f64,
    pub total_elapsed_minutes: f64,
    pub completed_cycles: u32,
    pub failed_cycles: u32,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub total_revenue: f64,
    pub cycle_ids: Vec<String>,
    pub current_cycle_id: Option<String>,
    pub persistent_agents: Vec<String>,
    pub cycle_summaries: Vec<CycleSummary>,
    pub key_learnings: Vec<String>,
    pub workspace_path: Option<PathBuf>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Mission {
    /// §6 "Mission log JSON": resumable iff status is anything other than a terminal
    /// `Completed`/`Archived` state.
    pub fn is_resumable(&self) -> bool {
        matches!(self.status, MissionStatus::Active | MissionStatus::Paused | MissionStatus::Failed)
    }

    /// §8 invariant: `completed_cycles + failed_cycles == len(cycle_ids)`.
    pub fn invariant_holds(&self) -> bool {
        self.completed_cycles + self.failed_cycles == self.cycle_ids.len() as u32
            && self.total_decision_cycles() == self.cycle_summaries.len()
    }

    pub fn total_decision_cycles(&self) -> usize {
        self.cycle_summaries.len()
    }
}

/// §4.9 Mission Manager: create/resume missions, link cycles, checkpoint, surface context.
pub struct MissionManager {
    base_dir: PathBuf,
}

fn new_mission_id() -> String {
    Utc::now().format("%Y%m%d%H%M%S%3f").to_string()
}

fn fallback_memory_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(std::env::temp_dir)
        .join(".launchonomy")
        .join("memory")
}

impl MissionManager {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    fn new_mission(&self, name: &str, objective: &str) -> Result<(Mission, Option<WorkspaceHandle>, VectorMemoryStore), MissionManagerError> {
        let mission_id = new_mission_id();
        let now = Utc::now();

        let (workspace, memory) = match WorkspaceHandle::create_or_open(&self.base_dir, &mission_id, name) {
            Ok(handle) => {
                let memory_dir = handle.root().join("memory").join("chromadb");
                let memory = VectorMemoryStore::open(&memory_dir, &mission_id)?;
                (Some(handle), memory)
            }
            Err(e) => {
                log::error!(
                    target: "mission::mission_manager",
                    "workspace creation failed for mission '{mission_id}', continuing without one: {e}"
                );
                let memory = VectorMemoryStore::open(&fallback_memory_dir(), &mission_id)?;
                (None, memory)
            }
        };

        let mission = Mission {
            mission_id: mission_id.clone(),
            name: name.to_string(),
            objective: objective.to_string(),
            started_at: now,
            updated_at: now,
            status: MissionStatus::Active,
            final_status: None,
            total_cost: 0.0,
            total_elapsed_minutes: 0.0,
            completed_cycles: 0,
            failed_cycles: 0,
            total_input_tokens: 0,
            total_output_tokens: 0,
            total_revenue: 0.0,
            cycle_ids: Vec::new(),
            current_cycle_id: None,
            persistent_agents: Vec::new(),
            cycle_summaries: Vec::new(),
            key_learnings: Vec::new(),
            workspace_path: workspace.as_ref().map(|w| w.root().to_path_buf()),
            tags: Vec::new(),
        };

        if let Some(handle) = &workspace {
            handle.save_mission_log(&serde_json::to_value(&mission)?)?;
        }

        Ok((mission, workspace, memory))
    }

    fn find_resumable(
        &self,
        name: &str,
        objective: &str,
    ) -> Result<Option<(Mission, WorkspaceHandle, VectorMemoryStore)>, MissionManagerError> {
        let candidates = crate::cloudllm::mission::workspace::list_workspaces(&self.base_dir, None)?;
        for config in candidates {
            if !matches!(config.status, WorkspaceStatus::Active | WorkspaceStatus::Paused) {
                continue;
            }
            if config.mission_name.trim() != name.trim() {
                continue;
            }
            let handle = match WorkspaceHandle::create_or_open(&self.base_dir, &config.mission_id, &config.mission_name) {
                Ok(handle) => handle,
                Err(_) => continue, // busy (owned by another live process); try the next candidate
            };
            let mission: Mission = match handle.load_mission_log() {
                Ok(raw) => serde_json::from_value(raw)?,
                Err(_) => continue,
            };
            if mission.objective.trim() != objective.trim() || !mission.is_resumable() {
                continue;
            }
            let memory_dir = handle.root().join("memory").join("chromadb");
            let memory = VectorMemoryStore::open(&memory_dir, &mission.mission_id)?;
            return Ok(Some((mission, handle, memory)));
        }
        Ok(None)
    }

    /// `create_or_load(name, mission, resume=true) -> MissionLog` (§4.9).
    pub fn create_or_load(
        &self,
        name: &str,
        objective: &str,
        resume: bool,
    ) -> Result<(Mission, Option<WorkspaceHandle>, VectorMemoryStore), MissionManagerError> {
        if resume {
            if let Some((mission, handle, memory)) = self.find_resumable(name, objective)? {
                return Ok((mission, Some(handle), memory));
            }
        }
        self.new_mission(name, objective)
    }

    /// `link_cycle_to_previous(cycle) -> cycle` (§4.9): assigns sequence number and linkage,
    /// back-patches the previous cycle's on-disk record, and attaches carried-forward context.
    pub fn link_cycle_to_previous(
        &self,
        mission: &Mission,
        workspace: Option<&WorkspaceHandle>,
        cycle: &mut Cycle,
    ) -> Result<(), MissionManagerError> {
        cycle.sequence_number = mission.cycle_ids.len() as u32 + 1;
        cycle.previous_cycle_id = mission.current_cycle_id.clone();

        if let (Some(handle), Some(previous_id)) = (workspace, &mission.current_cycle_id) {
            if let Ok(raw) = handle.load_cycle_log(previous_id) {
                if let Ok(mut previous) = serde_json::from_value::<Cycle>(raw) {
                    previous.next_cycle_id = Some(cycle.cycle_id.clone());
                    handle.save_cycle_log(previous_id, &serde_json::to_value(&previous)?)?;
                }
            }
        }

        cycle.carried_context = mission
            .cycle_summaries
            .iter()
            .rev()
            .take(3)
            .map(|s| format!("[{}] {:?} cost={:.4}", s.focus, s.status, s.cost))
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();

        Ok(())
    }

    /// `save_cycle_log(cycle) -> bool` (§4.9): persists under `logs/cycles/<id>.json` and as a
    /// workspace asset. Best-effort — a write failure is logged, not propagated, per §7's
    /// "Mission log / workspace write failure" row.
    pub fn save_cycle_log(&self, workspace: Option<&WorkspaceHandle>, cycle: &Cycle) -> bool {
        let Some(handle) = workspace else {
            return false;
        };
        let value = match serde_json::to_value(cycle) {
            Ok(v) => v,
            Err(e) => {
                log::error!(target: "mission::mission_manager", "failed to serialize cycle {}: {e}", cycle.cycle_id);
                return false;
            }
        };
        let mut ok = handle.save_cycle_log(&cycle.cycle_id, &value).is_ok();
        ok &= handle
            .save_json_asset(&cycle.cycle_id, &value, AssetCategory::Data)
            .is_ok();
        ok
    }

    /// `update_from_cycle(cycle)` (§4.9): rolls up counters, appends a summary, extracts a
    /// key learning on success, updates persistent agents, and persists the mission log.
    pub fn update_from_cycle(
        &self,
        mission: &mut Mission,
        workspace: Option<&WorkspaceHandle>,
        cycle: &Cycle,
    ) -> Result<(), MissionManagerError> {
        mission.cycle_ids.push(cycle.cycle_id.clone());
        mission.current_cycle_id = Some(cycle.cycle_id.clone());
        mission.total_cost += cycle.total_cost;
        mission.total_elapsed_minutes += cycle.duration_minutes;
        mission.updated_at = Utc::now();

        match cycle.status {
            CycleStatus::Success => mission.completed_cycles += 1,
            CycleStatus::Failed | CycleStatus::Started => mission.failed_cycles += 1,
        }

        mission.cycle_summaries.push(CycleSummary {
            cycle_id: cycle.cycle_id.clone(),
            focus: cycle.focus.clone(),
            status: cycle.status,
            cost: cycle.total_cost,
            duration_minutes: cycle.duration_minutes,
            agents_used: cycle.agents_used.clone(),
            kpis: cycle.kpis.clone(),
            timestamp: cycle.timestamp,
        });

        if matches!(cycle.status, CycleStatus::Success) {
            let kpi_summary = cycle
                .kpis
                .iter()
                .map(|(k, v)| format!("{k}={v:.2}"))
                .collect::<Vec<_>>()
                .join(", ");
            mission
                .key_learnings
                .push(format!("Cycle focused on '{}' succeeded ({kpi_summary})", cycle.focus));
        }

        for agent in &cycle.agents_used {
            if !mission.persistent_agents.contains(agent) {
                mission.persistent_agents.push(agent.clone());
            }
        }

        if let Some(handle) = workspace {
            if let Err(e) = handle.save_mission_log(&serde_json::to_value(&*mission)?) {
                log::error!(target: "mission::mission_manager", "failed to persist mission log: {e}");
            }
            let _ = handle.save_mission_state(&serde_json::to_value(&*mission)?, None);
        }

        Ok(())
    }

    /// `get_mission_context_for_agents()` (§4.9).
    pub fn get_mission_context_for_agents(&self, mission: &Mission) -> Value {
        json!({
            "mission_id": mission.mission_id,
            "objective": mission.objective,
            "cycles_completed": mission.completed_cycles,
            "total_cost": mission.total_cost,
            "key_learnings": mission.key_learnings,
            "recent_summaries": mission.cycle_summaries.iter().rev().take(3).collect::<Vec<_>>(),
            "persistent_agents": mission.persistent_agents,
            "status": mission.status,
            "workspace_path": mission.workspace_path,
        })
    }
}
