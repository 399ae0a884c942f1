//! Cost Calculator (§4.12).
//!
//! Stateless helpers that turn token usage and direct-cost line items into a strict three-level
//! aggregation: call → step → cycle → mission. The mission-level total is always reproducible
//! from the cycle list alone (§9 "Cost accounting").

use std::collections::HashMap;

use crate::client_wrapper::TokenUsage;

/// Per-million-token pricing, matching common provider pricing-table shapes.
#[derive(Debug, Clone, Copy)]
pub struct ModelPricing {
    pub input_per_million: f64,
    pub output_per_million: f64,
}

const DEFAULT_MODEL: &str = "gpt-4o-mini";

fn pricing_table() -> HashMap<&'static str, ModelPricing> {
    let mut table = HashMap::new();
    table.insert(
        "gpt-4o-mini",
        ModelPricing {
            input_per_million: 0.15,
            output_per_million: 0.60,
        },
    );
    table.insert(
        "gpt-4o",
        ModelPricing {
            input_per_million: 2.50,
            output_per_million: 10.00,
        },
    );
    table.insert(
        "gpt-4.1",
        ModelPricing {
            input_per_million: 2.00,
            output_per_million: 8.00,
        },
    );
    table.insert(
        "gpt-4.1-mini",
        ModelPricing {
            input_per_million: 0.40,
            output_per_million: 1.60,
        },
    );
    table
}

/// A single LLM call's cost (§3 "Cost record").
#[derive(Debug, Clone)]
pub struct CostRecord {
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub model: String,
    pub cost: f64,
}

/// `token_cost(input, output, model) → float` against the fixed pricing table, falling back
/// to the default cheap model (with a logged warning) for unrecognized model names.
pub fn token_cost(input_tokens: usize, output_tokens: usize, model: &str) -> f64 {
    let table = pricing_table();
    let pricing = table.get(model).copied().unwrap_or_else(|| {
        log::warn!(target: "mission::cost", "unknown model '{model}', falling back to {DEFAULT_MODEL} pricing");
        table[DEFAULT_MODEL]
    });
    let input_cost = (input_tokens as f64 / 1_000_000.0) * pricing.input_per_million;
    let output_cost = (output_tokens as f64 / 1_000_000.0) * pricing.output_per_million;
    input_cost + output_cost
}

pub fn cost_record(usage: &TokenUsage, model: &str) -> CostRecord {
    CostRecord {
        input_tokens: usage.input_tokens,
        output_tokens: usage.output_tokens,
        model: model.to_string(),
        cost: token_cost(usage.input_tokens, usage.output_tokens, model),
    }
}

/// A breakdown of a cycle's cost by contributing phase (§4.12).
#[derive(Debug, Clone, Default)]
pub struct CostBreakdown {
    pub planning: f64,
    pub workflow: f64,
    pub review: f64,
    pub other: f64,
}

impl CostBreakdown {
    pub fn total(&self) -> f64 {
        self.planning + self.workflow + self.review + self.other
    }
}

/// Sums a list of per-call costs (C-Suite planning calls, review calls, etc.)
pub fn sum_costs(records: &[CostRecord]) -> f64 {
    records.iter().map(|r| r.cost).sum()
}

/// `workflow_step_cost` — sums the direct cost an executed workflow step reported plus any
/// LLM-call costs incurred while resolving/auto-provisioning its tools.
pub fn workflow_step_cost(direct_cost: f64, call_costs: &[CostRecord]) -> f64 {
    direct_cost + sum_costs(call_costs)
}

pub fn csuite_planning_cost(call_costs: &[CostRecord]) -> f64 {
    sum_costs(call_costs)
}

pub fn csuite_review_cost(call_costs: &[CostRecord]) -> f64 {
    sum_costs(call_costs)
}

/// `cycle_cost` — planning + steps + review + direct (e.g. CFO approval call cost).
pub fn cycle_cost(planning: f64, steps: f64, review: f64, direct: f64) -> f64 {
    planning + steps + review + direct
}

/// `mission_cost` — sums over the cycle list. The mission total is reproducible from this
/// alone, matching §9's cost-accounting invariant.
pub fn mission_cost(cycle_costs: &[f64]) -> f64 {
    cycle_costs.iter().sum()
}

/// Produce the §4.12 cost breakdown for a single cycle.
pub fn cost_breakdown(planning: f64, workflow: f64, review: f64, other: f64) -> CostBreakdown {
    CostBreakdown {
        planning,
        workflow,
        review,
        other,
    }
}

// --- Third-party infrastructure cost estimation (§4.12, DeployAgent reporting only) ---

/// A named infrastructure service with a flat or usage-based estimate.
#[derive(Debug, Clone, Copy)]
pub struct ServiceCostEstimate {
    pub monthly_estimate: f64,
}

/// Estimate real-world infrastructure costs for a service category. These figures never feed
/// the scheduler's own cost accounting — they are informational for DeployAgent's reporting.
pub fn estimate_infrastructure_cost(service: &str) -> ServiceCostEstimate {
    let monthly_estimate = match service.to_lowercase().as_str() {
        "hosting" => 20.0,
        "domain" => 1.0, // amortized monthly from a ~$12/yr registration
        "email" => 15.0,
        "analytics" => 0.0,
        "monitoring" => 10.0,
        "cdn" => 5.0,
        "database" => 25.0,
        "payment_processing" => 0.0, // percentage-of-transaction, not flat
        _ => 10.0,
    };
    ServiceCostEstimate { monthly_estimate }
}
