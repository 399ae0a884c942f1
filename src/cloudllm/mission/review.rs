//! Review Manager (§4.6) and the shared consensus primitive from §9's "Consensus with
//! asymmetric rules" design note.
//!
//! Peer review uses [`ConsensusPredicate::Majority`]; the scheduler's C-Suite planning and
//! completion flows (§4.10) poll the same primitive with [`ConsensusPredicate::Unanimous`].
//! Both share one voting abstraction rather than ad-hoc threshold checks scattered across
//! the codebase.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::cloudllm::mission::communicator::{Communicator, JsonAttempt};
use crate::cloudllm::mission::error::ReviewError;

/// A pluggable acceptance rule over a vote multiset (§9).
#[derive(Debug, Clone, Copy)]
pub enum ConsensusPredicate {
    /// Strictly more than half of the polled votes must approve.
    Majority,
    /// Every polled vote must approve.
    Unanimous,
    /// At least `threshold` (in `[0.0, 1.0]`) of the polled votes must approve.
    Weighted(f64),
}

impl ConsensusPredicate {
    pub fn satisfied(&self, approvals: usize, total: usize) -> bool {
        if total == 0 {
            return true;
        }
        match self {
            ConsensusPredicate::Majority => approvals * 2 > total,
            ConsensusPredicate::Unanimous => approvals == total,
            ConsensusPredicate::Weighted(threshold) => {
                (approvals as f64) / (total as f64) >= *threshold
            }
        }
    }
}

/// One reviewer's vote (§4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Review {
    pub agent: String,
    pub approved: bool,
    pub feedback: String,
    pub estimated_confidence_if_approved: f64,
}

/// Names excluded from eligibility as reviewers for any subject (§4.6).
pub const ORCHESTRATOR_NAME: &str = "Orchestrator";
pub const RETROSPECTIVE_ANALYZER_NAME: &str = "RetrospectiveAnalyzer";

fn eligible_reviewers(subject_name: &str, available_agents: &[String]) -> Vec<String> {
    available_agents
        .iter()
        .filter(|name| {
            name.as_str() != subject_name
                && name.as_str() != ORCHESTRATOR_NAME
                && name.as_str() != RETROSPECTIVE_ANALYZER_NAME
        })
        .cloned()
        .collect()
}

/// `batch_peer_review(subject_name, content, available_agents, review_log, json_log, final?)
/// -> (reviews, total_cost)`. Reviewers are every agent in `available_agents` except the
/// subject, the orchestrator, and the retrospective analyzer. An empty reviewer set
/// auto-approves with a synthesized `System` review at zero cost.
pub async fn batch_peer_review(
    communicator: &Communicator,
    subject_name: &str,
    content: &str,
    available_agents: &[String],
    json_log: &mut Vec<JsonAttempt>,
    is_final: bool,
) -> Result<(Vec<Review>, f64), ReviewError> {
    let reviewers = eligible_reviewers(subject_name, available_agents);
    if reviewers.is_empty() {
        return Ok((
            vec![Review {
                agent: "System".to_string(),
                approved: true,
                feedback: "No eligible reviewers available; auto-approved.".to_string(),
                estimated_confidence_if_approved: 1.0,
            }],
            0.0,
        ));
    }

    let stage = if is_final { "final review" } else { "review" };
    let mut reviews = Vec::with_capacity(reviewers.len());
    let mut total_cost = 0.0;
    for reviewer in reviewers {
        let prompt = format!(
            "You are reviewing a {stage} of work produced by '{subject_name}':\n\n{content}\n\n\
             Return a JSON object with keys `approved` (bool), `feedback` (string), and \
             `estimated_confidence_if_approved` (a number between 0 and 1)."
        );
        let (value, cost) = communicator
            .get_json(
                &reviewer,
                &prompt,
                "Reply with a JSON object: {\"approved\": bool, \"feedback\": string, \
                 \"estimated_confidence_if_approved\": number}.",
                json_log,
            )
            .await?;
        total_cost += cost;
        reviews.push(Review {
            agent: reviewer,
            approved: value
                .get("approved")
                .and_then(|v| v.as_bool())
                .unwrap_or(false),
            feedback: value
                .get("feedback")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            estimated_confidence_if_approved: value
                .get("estimated_confidence_if_approved")
                .and_then(|v| v.as_f64())
                .unwrap_or(0.0),
        });
    }

    Ok((reviews, total_cost))
}

/// `check_consensus(reviews) -> bool`: strictly more than half approved (§4.6). The C-Suite
/// unanimity rules live at the scheduler level (§4.10), not here.
pub fn check_consensus(reviews: &[Review]) -> bool {
    let approvals = reviews.iter().filter(|r| r.approved).count();
    ConsensusPredicate::Majority.satisfied(approvals, reviews.len())
}

/// Serialize a proposal/content value for inclusion in a review prompt.
pub fn describe_for_review(value: &serde_json::Value) -> String {
    serde_json::to_string_pretty(&json!(value)).unwrap_or_else(|_| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloudllm::mission::chat_client::ChatClientWrapper;
    use crate::client_wrapper::{ClientWrapper, Message, Role, TokenUsage};
    use async_trait::async_trait;
    use std::error::Error;
    use std::sync::Arc;
    use tokio::sync::Mutex as TokioMutex;

    struct FixedClient {
        reply: String,
    }

    #[async_trait]
    impl ClientWrapper for FixedClient {
        async fn send_message(
            &self,
            _messages: &[Message],
            _tools: Option<Vec<crate::client_wrapper::ToolDefinition>>,
        ) -> Result<Message, Box<dyn Error>> {
            Ok(Message {
                role: Role::Assistant,
                content: Arc::from(self.reply.as_str()),
                tool_calls: vec![],
            })
        }

        fn model_name(&self) -> &str {
            "fixed"
        }

        async fn get_last_usage(&self) -> Option<TokenUsage> {
            Some(TokenUsage {
                input_tokens: 5,
                output_tokens: 5,
                total_tokens: 10,
            })
        }
    }

    fn communicator(reply: &str) -> Communicator {
        let client = Arc::new(FixedClient {
            reply: reply.to_string(),
        });
        Communicator::new(Arc::new(ChatClientWrapper::new(client)), "gpt-4o-mini")
    }

    #[tokio::test]
    async fn empty_reviewer_set_auto_approves_with_system_review() {
        let comm = communicator("{}");
        let available = vec!["ScanAgent".to_string()];
        let mut log = Vec::new();
        let (reviews, cost) = batch_peer_review(&comm, "ScanAgent", "findings", &available, &mut log, false)
            .await
            .unwrap();
        assert_eq!(reviews.len(), 1);
        assert_eq!(reviews[0].agent, "System");
        assert!(reviews[0].approved);
        assert_eq!(cost, 0.0);
    }

    #[tokio::test]
    async fn excludes_subject_orchestrator_and_retrospective_analyzer() {
        let comm = communicator(r#"{"approved": true, "feedback": "ok", "estimated_confidence_if_approved": 0.9}"#);
        let available = vec![
            "ScanAgent".to_string(),
            "DeployAgent".to_string(),
            ORCHESTRATOR_NAME.to_string(),
            RETROSPECTIVE_ANALYZER_NAME.to_string(),
        ];
        let mut log = Vec::new();
        let (reviews, _) = batch_peer_review(&comm, "ScanAgent", "findings", &available, &mut log, false)
            .await
            .unwrap();
        assert_eq!(reviews.len(), 1);
        assert_eq!(reviews[0].agent, "DeployAgent");
    }

    #[test]
    fn majority_requires_strictly_more_than_half() {
        let split = vec![
            Review {
                agent: "a".into(),
                approved: true,
                feedback: String::new(),
                estimated_confidence_if_approved: 1.0,
            },
            Review {
                agent: "b".into(),
                approved: false,
                feedback: String::new(),
                estimated_confidence_if_approved: 0.0,
            },
        ];
        assert!(!check_consensus(&split));

        let majority = vec![
            split[0].clone(),
            Review {
                agent: "c".into(),
                approved: true,
                feedback: String::new(),
                estimated_confidence_if_approved: 1.0,
            },
        ];
        assert!(check_consensus(&majority));
    }

    #[test]
    fn unanimous_predicate_requires_all_votes() {
        assert!(ConsensusPredicate::Unanimous.satisfied(3, 3));
        assert!(!ConsensusPredicate::Unanimous.satisfied(2, 3));
    }
}
