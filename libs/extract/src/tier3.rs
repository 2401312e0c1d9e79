//! Tier 3 — LLM structured-output fallback
//!
//! Called only when the combined tier 1+2 result fails the sufficiency
//! gate and the escalation window has room. The model is constrained to a
//! JSON schema describing the extraction result; on success the structured
//! response replaces the prior tiers' output.
//!
//! Embedded medication fields (dosage, frequency, route) are additionally
//! surfaced as sibling entities. Downstream bucketing operates on entity
//! categories, not object nesting, so collapsing the object into one
//! entity would silently drop the dosage and frequency signal.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::entity::{Entity, EntityCategory, EntitySource};

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("LLM call timed out")]
    Timeout,
    #[error("LLM transport error: {0}")]
    Http(String),
    #[error("LLM response violated the extraction schema: {0}")]
    Schema(String),
    #[error("no LLM endpoint configured")]
    Disabled,
}

/// A medication object in the structured response. Dosage, frequency and
/// route ride along inside the object and are flattened by
/// [`flatten_extraction`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StructuredMedication {
    pub name: String,
    #[serde(default)]
    pub dosage: Option<String>,
    #[serde(default)]
    pub frequency: Option<String>,
    #[serde(default)]
    pub route: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
}

/// The schema-constrained response shape.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StructuredExtraction {
    #[serde(default)]
    pub medications: Vec<StructuredMedication>,
    #[serde(default)]
    pub conditions: Vec<String>,
    #[serde(default)]
    pub lab_tests: Vec<String>,
    #[serde(default)]
    pub procedures: Vec<String>,
    #[serde(default)]
    pub patients: Vec<String>,
    #[serde(default)]
    pub practitioners: Vec<String>,
    #[serde(default)]
    pub observations: Vec<String>,
    #[serde(default)]
    pub instructions: Vec<String>,
}

const DEFAULT_MEDICATION_CONFIDENCE: f64 = 0.85;
const LIST_CONFIDENCE: f64 = 0.8;

/// Flatten a structured response into the entity multi-set.
///
/// Every medication with a non-empty embedded `dosage`/`frequency`/`route`
/// yields one additional sibling entity per field, tagged
/// `tier3_llm_embedded` and carrying the medication's confidence.
pub fn flatten_extraction(extraction: &StructuredExtraction) -> Vec<Entity> {
    let mut entities = Vec::new();

    for med in &extraction.medications {
        if med.name.trim().is_empty() {
            continue;
        }
        let confidence = med
            .confidence
            .unwrap_or(DEFAULT_MEDICATION_CONFIDENCE)
            .clamp(0.0, 1.0);
        entities.push(Entity::new(
            med.name.trim(),
            EntityCategory::Medications,
            confidence,
            EntitySource::Tier3Llm,
        ));

        let embedded = [
            (med.dosage.as_deref(), EntityCategory::Dosages),
            (med.frequency.as_deref(), EntityCategory::Frequencies),
            (med.route.as_deref(), EntityCategory::Routes),
        ];
        for (field, category) in embedded {
            if let Some(value) = field {
                let trimmed = value.trim();
                if !trimmed.is_empty() {
                    entities.push(Entity::new(
                        trimmed,
                        category,
                        confidence,
                        EntitySource::Tier3LlmEmbedded,
                    ));
                }
            }
        }
    }

    let lists = [
        (&extraction.conditions, EntityCategory::Conditions),
        (&extraction.lab_tests, EntityCategory::LabTests),
        (&extraction.procedures, EntityCategory::Procedures),
        (&extraction.patients, EntityCategory::Patients),
        (&extraction.practitioners, EntityCategory::Practitioners),
        (&extraction.observations, EntityCategory::Observations),
        (&extraction.instructions, EntityCategory::Instructions),
    ];
    for (values, category) in lists {
        for value in values {
            let trimmed = value.trim();
            if !trimmed.is_empty() {
                entities.push(Entity::new(
                    trimmed,
                    category,
                    LIST_CONFIDENCE,
                    EntitySource::Tier3Llm,
                ));
            }
        }
    }

    entities
}

/// JSON schema handed to the model as the structured-output constraint.
pub fn extraction_schema() -> Value {
    let string_array = || json!({ "type": "array", "items": { "type": "string" } });
    json!({
        "type": "object",
        "properties": {
            "medications": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "name": { "type": "string" },
                        "dosage": { "type": ["string", "null"] },
                        "frequency": { "type": ["string", "null"] },
                        "route": { "type": ["string", "null"] },
                        "confidence": { "type": ["number", "null"] },
                    },
                    "required": ["name"],
                },
            },
            "conditions": string_array(),
            "lab_tests": string_array(),
            "procedures": string_array(),
            "patients": string_array(),
            "practitioners": string_array(),
            "observations": string_array(),
            "instructions": string_array(),
        },
        "required": ["medications"],
    })
}

/// The tier-3 backend. Implemented over HTTP in production and by scripted
/// stubs in tests.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn extract_structured(&self, text: &str) -> Result<StructuredExtraction, LlmError>;
}

/// OpenAI-style chat-completions client with a JSON-schema response format.
pub struct HttpLlmClient {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl HttpLlmClient {
    pub fn new(
        endpoint: String,
        model: String,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
            model,
            api_key,
            timeout,
        }
    }

    fn request_body(&self, text: &str) -> Value {
        json!({
            "model": self.model,
            "messages": [
                {
                    "role": "system",
                    "content": "You extract clinical entities from free-text orders. \
                                Respond with JSON matching the provided schema only.",
                },
                { "role": "user", "content": text },
            ],
            "response_format": {
                "type": "json_schema",
                "json_schema": {
                    "name": "clinical_extraction",
                    "schema": extraction_schema(),
                },
            },
            "temperature": 0.0,
        })
    }

    async fn call_once(&self, text: &str) -> Result<StructuredExtraction, LlmError> {
        let mut request = self
            .client
            .post(&self.endpoint)
            .json(&self.request_body(text));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = tokio::time::timeout(self.timeout, request.send())
            .await
            .map_err(|_| LlmError::Timeout)?
            .map_err(|e| LlmError::Http(e.to_string()))?;

        if !response.status().is_success() {
            return Err(LlmError::Http(format!(
                "LLM endpoint returned {}",
                response.status()
            )));
        }

        let body: Value = tokio::time::timeout(self.timeout, response.json())
            .await
            .map_err(|_| LlmError::Timeout)?
            .map_err(|e| LlmError::Http(e.to_string()))?;

        let content = body["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| LlmError::Schema("response carried no message content".to_string()))?;

        serde_json::from_str(content).map_err(|e| LlmError::Schema(e.to_string()))
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn extract_structured(&self, text: &str) -> Result<StructuredExtraction, LlmError> {
        match self.call_once(text).await {
            Ok(extraction) => Ok(extraction),
            // One retry on a schema violation only; transport errors and
            // timeouts are final.
            Err(LlmError::Schema(first)) => {
                tracing::debug!(error = %first, "structured response invalid, retrying once");
                self.call_once(text).await
            }
            Err(e) => Err(e),
        }
    }
}
