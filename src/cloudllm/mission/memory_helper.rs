//! Memory Helper (§4.11).
//!
//! Typed wrappers over [`VectorMemoryStore::upsert`] that attach a category tag and structured
//! metadata. Every method is best-effort: a write failure never propagates as an error to
//! mission state, matching §4.11's "callers MUST NOT propagate memory-write errors".

use std::collections::HashMap;

use crate::cloudllm::mission::vector_memory::VectorMemoryStore;

/// The fixed memory categories from §3's "Memory item" data model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryCategory {
    WorkflowEvent,
    Learning,
    DecisionMaking,
    Performance,
    FailureLearning,
    SuccessPattern,
}

impl MemoryCategory {
    fn as_str(&self) -> &'static str {
        match self {
            MemoryCategory::WorkflowEvent => "workflow_event",
            MemoryCategory::Learning => "learning",
            MemoryCategory::DecisionMaking => "decision_making",
            MemoryCategory::Performance => "performance",
            MemoryCategory::FailureLearning => "failure_learning",
            MemoryCategory::SuccessPattern => "success_pattern",
        }
    }
}

/// Wraps a mission's [`VectorMemoryStore`] with typed logging helpers.
pub struct MemoryHelper<'a> {
    store: &'a mut VectorMemoryStore,
    mission_id: String,
}

impl<'a> MemoryHelper<'a> {
    pub fn new(store: &'a mut VectorMemoryStore, mission_id: impl Into<String>) -> Self {
        Self {
            store,
            mission_id: mission_id.into(),
        }
    }

    fn base_metadata(&self, category: MemoryCategory) -> HashMap<String, String> {
        let mut metadata = HashMap::new();
        metadata.insert("mission_id".to_string(), self.mission_id.clone());
        metadata.insert("category".to_string(), category.as_str().to_string());
        metadata
    }

    fn log(&mut self, category: MemoryCategory, content: String, extra: &[(&str, String)]) -> String {
        let mut metadata = self.base_metadata(category);
        for (key, value) in extra {
            metadata.insert((*key).to_string(), value.clone());
        }
        self.store.upsert(None, &content, "text/plain", metadata)
    }

    pub fn log_workflow_event(&mut self, step: &str, summary: &str, details: &str) -> String {
        self.log(
            MemoryCategory::WorkflowEvent,
            format!("[{step}] {summary}: {details}"),
            &[("step", step.to_string())],
        )
    }

    pub fn log_insight(&mut self, text: &str, source: &str, confidence: f64) -> String {
        self.log(
            MemoryCategory::Learning,
            text.to_string(),
            &[
                ("source", source.to_string()),
                ("confidence", confidence.to_string()),
            ],
        )
    }

    pub fn log_decision(&mut self, decision: &str, rationale: &str, agent: &str) -> String {
        self.log(
            MemoryCategory::DecisionMaking,
            format!("{decision} — {rationale}"),
            &[("agent", agent.to_string())],
        )
    }

    pub fn log_performance_metrics(&mut self, step: &str, metrics: &HashMap<String, f64>) -> String {
        let metrics_json = serde_json::to_string(metrics).unwrap_or_default();
        self.log(
            MemoryCategory::Performance,
            format!("[{step}] {metrics_json}"),
            &[("step", step.to_string())],
        )
    }

    pub fn log_error_or_failure(&mut self, step: &str, description: &str, context: &str) -> String {
        self.log(
            MemoryCategory::FailureLearning,
            format!("[{step}] {description}: {context}"),
            &[("step", step.to_string())],
        )
    }

    pub fn log_success_pattern(&mut self, step: &str, description: &str, key_factors: &[String]) -> String {
        let factors = key_factors.join(", ");
        self.log(
            MemoryCategory::SuccessPattern,
            format!("[{step}] {description} (factors: {factors})"),
            &[("step", step.to_string())],
        )
    }
}
