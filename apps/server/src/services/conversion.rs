//! Conversion orchestrator: one request, one thread of control.
//!
//! `convert` runs the full pipeline — extraction, entity bucketing,
//! factory invocation, bundle assembly, validation — and shapes the
//! response. A single resource failing its factory never aborts the
//! request; the failure is recorded and conversion continues.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{Days, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use uuid::Uuid;
use validator::Validate;

use funke_bundle::{assemble, summarize, BundleSummary, BundleValidator, OutcomeIssue};
use funke_extract::{Entity, EntityCategory, ExtractionResult, Extractor};
use funke_factory::{FactoryContext, FactoryRegistry, PatientAllergy};
use funke_fhir_common::ReferenceManager;
use funke_terminology::TerminologyIndex;

use crate::config::Config;
use crate::services::metrics;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ConvertRequest {
    #[validate(length(max = 50000, message = "order text exceeds the 50k character limit"))]
    pub text: String,
    #[serde(default)]
    pub patient_ref: Option<String>,
    /// Documented allergies for the medication safety cross-check.
    #[serde(default)]
    pub allergies: Vec<PatientAllergy>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationSection {
    pub status: String,
    pub issues: Vec<OutcomeIssue>,
    pub source_endpoint: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConvertResponse {
    pub request_id: String,
    pub fhir_bundle: Value,
    pub validation: ValidationSection,
    pub bundle_summary: BundleSummary,
    pub processing_time_ms: u64,
    pub diagnostics: Vec<String>,
}

pub struct ConversionService {
    config: Arc<Config>,
    extractor: Arc<Extractor>,
    registry: Arc<FactoryRegistry>,
    terminology: Arc<TerminologyIndex>,
    validator: Arc<BundleValidator>,
}

impl ConversionService {
    pub fn new(
        config: Arc<Config>,
        extractor: Arc<Extractor>,
        registry: Arc<FactoryRegistry>,
        terminology: Arc<TerminologyIndex>,
        validator: Arc<BundleValidator>,
    ) -> Self {
        Self {
            config,
            extractor,
            registry,
            terminology,
            validator,
        }
    }

    pub async fn convert(&self, request: ConvertRequest) -> ConvertResponse {
        let started = Instant::now();
        let request_id = Uuid::new_v4().to_string();
        metrics::CONVERT_REQUESTS.inc();

        if self.config.logging.log_clinical_text {
            tracing::debug!(request_id, text = %request.text, "convert request received");
        } else {
            tracing::info!(
                request_id,
                text_chars = request.text.len(),
                "convert request received"
            );
        }

        let extraction = self.extractor.extract(&request.text, &request_id).await;
        let tier_label = extraction.metrics.tier_reached.to_string();
        metrics::TIER_REACHED
            .with_label_values(&[tier_label.as_str()])
            .inc();
        tracing::info!(
            request_id,
            entities = extraction.entities.len(),
            tier_reached = extraction.metrics.tier_reached,
            weighted_confidence = extraction.metrics.weighted_confidence,
            "extraction complete"
        );

        let mut diagnostics = extraction.metrics.diagnostics.clone();
        let references = Arc::new(ReferenceManager::new());
        let ctx = FactoryContext::new(
            &request_id,
            references.clone(),
            self.terminology.clone(),
            self.config.feature_flags(),
        )
        .with_allergies(request.allergies.clone());

        let mut resources: HashMap<String, Vec<Value>> = HashMap::new();
        let patient_ref = self.build_resources(
            &request,
            &extraction,
            &ctx,
            &mut resources,
            &mut diagnostics,
        );

        let bundle = assemble(&resources, &references);
        let outcome = self.validator.validate(&bundle.json).await;

        let alerts = ctx.alerts();
        if !alerts.is_empty() {
            metrics::SAFETY_ALERTS.inc_by(alerts.len() as u64);
        }
        let alert_values = alerts
            .iter()
            .filter_map(|a| serde_json::to_value(a).ok())
            .collect();
        let summary = summarize(&bundle.json, alert_values);

        // A conversion without any patient anchor cannot produce a usable
        // order bundle, whatever the validator thinks of its shape.
        let status = if patient_ref.is_none() {
            "FAILED"
        } else if outcome.used_local_fallback() {
            "PENDING_LOCAL_ONLY"
        } else if outcome.is_valid {
            "PASSED"
        } else {
            "FAILED"
        };
        metrics::VALIDATION_OUTCOMES
            .with_label_values(&[status])
            .inc();

        let processing_time_ms = started.elapsed().as_millis() as u64;
        metrics::CONVERT_DURATION.observe(started.elapsed().as_secs_f64());
        tracing::info!(
            request_id,
            status,
            entries = summary.total_entries,
            processing_time_ms,
            "conversion complete"
        );

        ConvertResponse {
            request_id,
            fhir_bundle: bundle.json,
            validation: ValidationSection {
                status: status.to_string(),
                issues: outcome.issues,
                source_endpoint: outcome.source_endpoint,
            },
            bundle_summary: summary,
            processing_time_ms,
            diagnostics,
        }
    }

    /// Bucket entities into factory inputs and create the resources.
    /// Returns the bundle-internal patient reference, if one exists.
    fn build_resources(
        &self,
        request: &ConvertRequest,
        extraction: &ExtractionResult,
        ctx: &FactoryContext,
        resources: &mut HashMap<String, Vec<Value>>,
        diagnostics: &mut Vec<String>,
    ) -> Option<String> {
        let by_category = |category: EntityCategory| -> Vec<&Entity> {
            extraction
                .entities
                .iter()
                .filter(|e| e.category == category)
                .collect()
        };

        let mut create = |resource_type: &str, data: Map<String, Value>| -> Option<Value> {
            match self.registry.create(resource_type, &data, ctx) {
                Ok(resource) => {
                    resources
                        .entry(resource_type.to_string())
                        .or_default()
                        .push(resource.clone());
                    Some(resource)
                }
                Err(e) => {
                    tracing::warn!(
                        request_id = %ctx.request_id,
                        resource_type,
                        error = %e,
                        "factory failure, resource omitted"
                    );
                    diagnostics.push(format!("factory_error:{}: {}", resource_type, e));
                    None
                }
            }
        };

        // Exactly one Patient, synthesized from entities or patient_ref.
        // With neither anchor and nothing extracted, the bundle stays
        // empty and the conversion reports FAILED.
        let patients = by_category(EntityCategory::Patients);
        let mut patient_data = Map::new();
        if let Some(entity) = patients.first() {
            patient_data.insert("name".to_string(), json!(entity.text));
        } else if let Some(reference) = &request.patient_ref {
            patient_data.insert("mrn".to_string(), json!(reference));
        } else if extraction.entities.is_empty() {
            return None;
        }
        let patient_ref = create("Patient", patient_data)
            .and_then(|p| p["id"].as_str().map(|id| ctx.references.reference("Patient", id)))?;

        // Practitioners; the first becomes the requester
        let mut requester_ref = None;
        for practitioner in by_category(EntityCategory::Practitioners) {
            let mut data = Map::new();
            data.insert("name".to_string(), json!(practitioner.text));
            if let Some(resource) = create("Practitioner", data) {
                if requester_ref.is_none() {
                    requester_ref = resource
                        .get("id")
                        .and_then(|id| id.as_str())
                        .map(|id| ctx.references.reference("Practitioner", id));
                }
            }
        }

        // Medication orders: pair the i-th medication with the i-th
        // dosage/frequency/route sibling
        let medications = by_category(EntityCategory::Medications);
        let dosages = by_category(EntityCategory::Dosages);
        let frequencies = by_category(EntityCategory::Frequencies);
        let routes = by_category(EntityCategory::Routes);
        for (i, medication) in medications.iter().enumerate() {
            let mut data = Map::new();
            data.insert("medication".to_string(), json!(medication.text));
            data.insert("patient_ref".to_string(), json!(patient_ref));
            if let Some(dosage) = dosages.get(i) {
                data.insert("dosage".to_string(), json!(dosage.text));
            }
            if let Some(frequency) = frequencies.get(i) {
                data.insert("frequency".to_string(), json!(frequency.text));
            }
            if let Some(route) = routes.get(i) {
                data.insert("route".to_string(), json!(route.text));
            }
            if let Some(requester) = &requester_ref {
                data.insert("requester_ref".to_string(), json!(requester));
            }
            create("MedicationRequest", data);
        }

        // Lab orders
        let occurrence = occurrence_from_text(&request.text);
        for lab in by_category(EntityCategory::LabTests) {
            let mut data = Map::new();
            data.insert("test".to_string(), json!(lab.text));
            data.insert("patient_ref".to_string(), json!(patient_ref));
            if let Some(occurrence) = &occurrence {
                data.insert("occurrence".to_string(), json!(occurrence));
            }
            if let Some(requester) = &requester_ref {
                data.insert("requester_ref".to_string(), json!(requester));
            }
            create("ServiceRequest", data);
        }

        // Conditions: denied findings become refuted records; merely
        // hypothetical or family-history mentions produce nothing
        for condition in by_category(EntityCategory::Conditions) {
            if condition.context.hypothetical || condition.context.family_history {
                continue;
            }
            let mut data = Map::new();
            data.insert("condition".to_string(), json!(condition.text));
            data.insert("negated".to_string(), json!(condition.context.negated));
            data.insert("patient_ref".to_string(), json!(patient_ref));
            create("Condition", data);
        }

        for procedure in by_category(EntityCategory::Procedures) {
            let mut data = Map::new();
            data.insert("procedure".to_string(), json!(procedure.text));
            data.insert("patient_ref".to_string(), json!(patient_ref));
            create("Procedure", data);
        }

        for observation in by_category(EntityCategory::Observations) {
            let mut data = Map::new();
            data.insert("name".to_string(), json!(observation.text));
            data.insert("patient_ref".to_string(), json!(patient_ref));
            create("Observation", data);
        }

        for device in by_category(EntityCategory::Devices) {
            let mut data = Map::new();
            data.insert("device".to_string(), json!(device.text));
            data.insert("patient_ref".to_string(), json!(patient_ref));
            create("Device", data);
        }

        // Documented allergies ride along as AllergyIntolerance records
        for allergy in &request.allergies {
            let mut data = Map::new();
            data.insert("substance".to_string(), json!(allergy.substance));
            data.insert("criticality".to_string(), json!(allergy.criticality));
            data.insert("patient_ref".to_string(), json!(patient_ref));
            create("AllergyIntolerance", data);
        }

        Some(patient_ref)
    }
}

/// Occurrence heuristic for "tomorrow morning"-style order phrases:
/// next-day 09:00 UTC.
fn occurrence_from_text(text: &str) -> Option<String> {
    let lower = text.to_lowercase();
    if lower.contains("tomorrow") {
        let date = Utc::now().date_naive().checked_add_days(Days::new(1))?;
        return Some(format!("{}T09:00:00Z", date.format("%Y-%m-%d")));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_occurrence_heuristic() {
        let occurrence = occurrence_from_text("Order CBC tomorrow morning").unwrap();
        assert!(occurrence.ends_with("T09:00:00Z"));
        assert!(occurrence_from_text("Order CBC now").is_none());
    }
}
