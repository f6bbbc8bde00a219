//! Downstream PPA (post-purchase adjustment) system integration.
//!
//! Publishing the final decision never blocks the workflow: callers log a
//! [`PpaError`] and complete the review anyway.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use crate::workflows::WorkflowRecord;

#[derive(Debug, Error)]
pub enum PpaError {
    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(String),

    #[error("PPA request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("PPA endpoint returned {status}: {body}")]
    Status { status: u16, body: String },
}

/// Body posted to the PPA endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PpaDecision {
    pub request_number: String,
    pub loan_number: String,
    pub loan_decision: Option<String>,
    pub loan_status: Option<String>,
    pub review_type: Option<String>,
}

impl From<&WorkflowRecord> for PpaDecision {
    fn from(record: &WorkflowRecord) -> Self {
        Self {
            request_number: record.request_number.clone(),
            loan_number: record.loan_number.clone(),
            loan_decision: record.loan_decision.clone(),
            loan_status: record.loan_status.map(|s| s.to_string()),
            review_type: record.review_type.map(|t| t.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PpaOutcome {
    Published { status: u16, response: serde_json::Value },
    Skipped { reason: String },
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PpaClient: Send + Sync {
    async fn publish_decision(&self, record: &WorkflowRecord) -> Result<PpaOutcome, PpaError>;
}

/// Client for deployments without a PPA system
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledPpaClient;

#[async_trait]
impl PpaClient for DisabledPpaClient {
    async fn publish_decision(&self, _record: &WorkflowRecord) -> Result<PpaOutcome, PpaError> {
        Ok(PpaOutcome::Skipped {
            reason: "PPA integration disabled".to_string(),
        })
    }
}

/// JSON-over-HTTP client; without an endpoint every publish is skipped
pub struct HttpPpaClient {
    http: reqwest::Client,
    endpoint: Option<String>,
}

impl HttpPpaClient {
    pub fn new(endpoint: Option<String>, timeout: Duration) -> Result<Self, PpaError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PpaError::ClientBuild(e.to_string()))?;
        let endpoint = endpoint.filter(|url| !url.trim().is_empty());
        Ok(Self { http, endpoint })
    }
}

#[async_trait]
impl PpaClient for HttpPpaClient {
    async fn publish_decision(&self, record: &WorkflowRecord) -> Result<PpaOutcome, PpaError> {
        let Some(endpoint) = &self.endpoint else {
            debug!("PPA endpoint not configured, skipping publish");
            return Ok(PpaOutcome::Skipped {
                reason: "PPA endpoint not configured".to_string(),
            });
        };

        let response = self
            .http
            .post(endpoint)
            .json(&PpaDecision::from(record))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PpaError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let text = response.text().await?;
        let response = serde_json::from_str(&text).unwrap_or(serde_json::Value::String(text));
        info!(
            request_number = %record.request_number,
            loan_number = %record.loan_number,
            status = status.as_u16(),
            "Published decision to PPA"
        );
        Ok(PpaOutcome::Published {
            status: status.as_u16(),
            response,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::{LoanStatus, ReviewType, WorkflowKey};
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn record() -> WorkflowRecord {
        let mut record = WorkflowRecord::new(WorkflowKey::new("REQ-1", "1234567890"), Some(ReviewType::Ldc), "System");
        record.loan_status = Some(LoanStatus::Approved);
        record.loan_decision = Some("Approved".to_string());
        record
    }

    #[tokio::test]
    async fn skips_without_endpoint() {
        let client = HttpPpaClient::new(Some("  ".to_string()), Duration::from_secs(1)).unwrap();
        let outcome = client.publish_decision(&record()).await.unwrap();
        assert!(matches!(outcome, PpaOutcome::Skipped { .. }));
    }

    #[tokio::test]
    async fn posts_decision_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ppa"))
            .and(body_json(json!({
                "requestNumber": "REQ-1",
                "loanNumber": "1234567890",
                "loanDecision": "Approved",
                "loanStatus": "Approved",
                "reviewType": "LDC"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"accepted": true})))
            .expect(1)
            .mount(&server)
            .await;

        let client = HttpPpaClient::new(Some(format!("{}/ppa", server.uri())), Duration::from_secs(5)).unwrap();
        let outcome = client.publish_decision(&record()).await.unwrap();
        assert_eq!(
            outcome,
            PpaOutcome::Published {
                status: 200,
                response: json!({"accepted": true})
            }
        );
    }

    #[tokio::test]
    async fn error_status_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .mount(&server)
            .await;

        let client = HttpPpaClient::new(Some(server.uri()), Duration::from_secs(5)).unwrap();
        match client.publish_decision(&record()).await {
            Err(PpaError::Status { status, body }) => {
                assert_eq!(status, 503);
                assert_eq!(body, "maintenance");
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }
}
