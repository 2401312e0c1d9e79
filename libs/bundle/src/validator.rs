//! External FHIR validation with ordered endpoint failover.
//!
//! Endpoints are tried in configured order; connection errors, HTTP 5xx,
//! and per-endpoint timeouts fall through to the next candidate. The first
//! endpoint returning a parseable OperationOutcome wins. When every
//! endpoint fails, validation degrades to the local structural check with
//! severities capped at `warning` — unreachable validators are an
//! availability problem, not a correctness failure.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use funke_fhir_common::{schema, IssueSeverity};

pub const LOCAL_FALLBACK_ENDPOINT: &str = "local-fallback";

const FHIR_JSON: &str = "application/fhir+json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutcomeIssue {
    pub severity: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub diagnostics: String,
}

/// The validation result handed back to callers. The authoritative flag is
/// `is_valid`; only fatal/error issues clear it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub is_valid: bool,
    pub issues: Vec<OutcomeIssue>,
    pub source_endpoint: String,
}

impl ValidationOutcome {
    fn from_issues(issues: Vec<OutcomeIssue>, source_endpoint: String) -> Self {
        let is_valid = !issues
            .iter()
            .any(|i| matches!(i.severity.as_str(), "fatal" | "error"));
        Self {
            is_valid,
            issues,
            source_endpoint,
        }
    }

    pub fn used_local_fallback(&self) -> bool {
        self.source_endpoint == LOCAL_FALLBACK_ENDPOINT
    }
}

#[derive(Debug, Clone)]
pub struct ValidatorConfig {
    /// Candidate base URLs, tried in order.
    pub endpoints: Vec<String>,
    /// Per-endpoint timeout.
    pub timeout: Duration,
    /// Budget for the whole validation attempt across endpoints.
    pub total_budget: Duration,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            endpoints: Vec::new(),
            timeout: Duration::from_secs(5),
            total_budget: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, thiserror::Error)]
enum EndpointError {
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("endpoint returned server error {0}")]
    ServerError(u16),
    #[error("endpoint timed out")]
    Timeout,
    #[error("response was not a parseable OperationOutcome")]
    Unparseable,
}

pub struct BundleValidator {
    client: reqwest::Client,
    config: ValidatorConfig,
}

impl BundleValidator {
    pub fn new(config: ValidatorConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    /// Validate a bundle, failing over across endpoints and degrading to
    /// the local structural check when all of them are unavailable.
    pub async fn validate(&self, bundle: &Value) -> ValidationOutcome {
        let deadline = Instant::now() + self.config.total_budget;

        for endpoint in &self.config.endpoints {
            let Some(remaining) = deadline.checked_duration_since(Instant::now()).filter(|d| !d.is_zero())
            else {
                tracing::warn!("validation budget exhausted before trying all endpoints");
                break;
            };
            let per_call = remaining.min(self.config.timeout);

            match self.try_endpoint(endpoint, bundle, per_call).await {
                Ok(issues) => {
                    tracing::debug!(%endpoint, "external validation succeeded");
                    return ValidationOutcome::from_issues(issues, endpoint.clone());
                }
                Err(e) => {
                    tracing::warn!(%endpoint, error = %e, "validator endpoint failed, trying next");
                }
            }
        }

        self.local_fallback(bundle)
    }

    async fn try_endpoint(
        &self,
        base: &str,
        bundle: &Value,
        timeout: Duration,
    ) -> Result<Vec<OutcomeIssue>, EndpointError> {
        let url = format!("{}/Bundle/$validate", base.trim_end_matches('/'));

        let response = tokio::time::timeout(
            timeout,
            self.client
                .post(&url)
                .header(reqwest::header::CONTENT_TYPE, FHIR_JSON)
                .json(bundle)
                .send(),
        )
        .await
        .map_err(|_| EndpointError::Timeout)?
        .map_err(|e| EndpointError::Connect(e.to_string()))?;

        let status = response.status();
        if status.is_server_error() {
            return Err(EndpointError::ServerError(status.as_u16()));
        }

        let body: Value = tokio::time::timeout(timeout, response.json())
            .await
            .map_err(|_| EndpointError::Timeout)?
            .map_err(|_| EndpointError::Unparseable)?;

        parse_operation_outcome(&body).ok_or(EndpointError::Unparseable)
    }

    fn local_fallback(&self, bundle: &Value) -> ValidationOutcome {
        tracing::warn!("all external validators unavailable, using local structural validation");
        let issues = schema::validate_bundle(bundle)
            .into_iter()
            .map(|issue| {
                let capped = issue.capped_at_warning();
                OutcomeIssue {
                    severity: capped.severity.as_str().to_string(),
                    code: capped.code.as_str().to_string(),
                    location: capped.location,
                    diagnostics: capped.diagnostics,
                }
            })
            .collect();
        ValidationOutcome::from_issues(issues, LOCAL_FALLBACK_ENDPOINT.to_string())
    }
}

/// Pull issues out of an OperationOutcome. Returns None when the body is
/// not an OperationOutcome at all.
fn parse_operation_outcome(body: &Value) -> Option<Vec<OutcomeIssue>> {
    if body.get("resourceType")?.as_str()? != "OperationOutcome" {
        return None;
    }
    let issues = body
        .get("issue")
        .and_then(|v| v.as_array())
        .map(|issues| {
            issues
                .iter()
                .filter_map(|issue| {
                    let severity = issue.get("severity")?.as_str()?;
                    // Normalize unknown severities the same way the issue
                    // model does
                    let severity = IssueSeverity::parse(severity).as_str().to_string();
                    Some(OutcomeIssue {
                        severity,
                        code: issue
                            .get("code")
                            .and_then(|v| v.as_str())
                            .unwrap_or("processing")
                            .to_string(),
                        location: issue
                            .get("location")
                            .and_then(|v| v.as_array())
                            .and_then(|a| a.first())
                            .and_then(|v| v.as_str())
                            .map(str::to_string),
                        diagnostics: issue
                            .get("diagnostics")
                            .and_then(|v| v.as_str())
                            .unwrap_or_default()
                            .to_string(),
                    })
                })
                .collect()
        })
        .unwrap_or_default();
    Some(issues)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn valid_bundle() -> Value {
        json!({
            "resourceType": "Bundle",
            "id": "bundle-1",
            "type": "transaction",
            "entry": [{
                "fullUrl": "urn:uuid:7c9e6679-7425-40de-944b-e07fc1f90ae7",
                "resource": {
                    "resourceType": "Patient",
                    "id": "patient-aaaa1111",
                },
            }],
        })
    }

    #[test]
    fn test_parse_operation_outcome() {
        let body = json!({
            "resourceType": "OperationOutcome",
            "issue": [
                { "severity": "error", "code": "required", "diagnostics": "missing subject",
                  "location": ["Bundle.entry[0]"] },
                { "severity": "warning", "code": "value", "diagnostics": "odd code" },
            ],
        });
        let issues = parse_operation_outcome(&body).unwrap();
        assert_eq!(issues.len(), 2);
        assert_eq!(issues[0].severity, "error");
        assert_eq!(issues[0].location.as_deref(), Some("Bundle.entry[0]"));
    }

    #[test]
    fn test_unparseable_body_is_rejected() {
        assert!(parse_operation_outcome(&json!({ "resourceType": "Patient" })).is_none());
        assert!(parse_operation_outcome(&json!("nope")).is_none());
    }

    #[test]
    fn test_outcome_validity_from_severities() {
        let failed = ValidationOutcome::from_issues(
            vec![OutcomeIssue {
                severity: "error".to_string(),
                code: "required".to_string(),
                location: None,
                diagnostics: "x".to_string(),
            }],
            "https://validator.example".to_string(),
        );
        assert!(!failed.is_valid);

        let passed = ValidationOutcome::from_issues(
            vec![OutcomeIssue {
                severity: "warning".to_string(),
                code: "value".to_string(),
                location: None,
                diagnostics: "x".to_string(),
            }],
            "https://validator.example".to_string(),
        );
        assert!(passed.is_valid);
    }

    #[tokio::test]
    async fn test_no_endpoints_uses_local_fallback() {
        let validator = BundleValidator::new(ValidatorConfig::default());
        let outcome = validator.validate(&valid_bundle()).await;
        assert!(outcome.used_local_fallback());
        assert!(outcome.is_valid);
    }

    #[tokio::test]
    async fn test_local_fallback_caps_severity_at_warning() {
        let validator = BundleValidator::new(ValidatorConfig::default());
        // Patient with an out-of-value-set gender: an error locally
        let bundle = json!({
            "resourceType": "Bundle",
            "type": "transaction",
            "entry": [{
                "fullUrl": "urn:uuid:7c9e6679-7425-40de-944b-e07fc1f90ae7",
                "resource": { "resourceType": "Patient", "id": "p", "gender": "bogus" },
            }],
        });
        let outcome = validator.validate(&bundle).await;
        assert!(outcome.used_local_fallback());
        assert!(outcome.is_valid);
        assert!(!outcome.issues.is_empty());
        assert!(outcome.issues.iter().all(|i| i.severity != "error" && i.severity != "fatal"));
    }

    #[tokio::test]
    async fn test_failover_to_second_endpoint() {
        use axum::{routing::post, Json, Router};

        // E2: a live in-process validator answering with a clean outcome
        let app = Router::new().route(
            "/Bundle/$validate",
            post(|| async {
                Json(json!({
                    "resourceType": "OperationOutcome",
                    "issue": [],
                }))
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        // E1: nothing listens on this port (bound then dropped)
        let dead = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let dead_addr = dead.local_addr().unwrap();
        drop(dead);

        let validator = BundleValidator::new(ValidatorConfig {
            endpoints: vec![
                format!("http://{}", dead_addr),
                format!("http://{}", addr),
            ],
            timeout: Duration::from_secs(2),
            total_budget: Duration::from_secs(6),
        });

        let outcome = validator.validate(&valid_bundle()).await;
        assert!(outcome.is_valid);
        assert_eq!(outcome.source_endpoint, format!("http://{}", addr));
    }
}
