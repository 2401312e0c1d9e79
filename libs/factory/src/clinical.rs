//! Clinical-domain factory: Observation, Condition, DiagnosticReport,
//! ServiceRequest, Procedure, AllergyIntolerance.

use serde_json::{json, Map, Value};

use funke_fhir_common::datatypes::{codeable_concept, quantity, reference_obj, text_concept};
use funke_terminology::CodeSystem;

use crate::{finalize, require_keys, str_field, FactoryContext, FactoryError, ResourceFactory};

const CONDITION_CLINICAL: &str = "http://terminology.hl7.org/CodeSystem/condition-clinical";
const CONDITION_VERIFICATION: &str =
    "http://terminology.hl7.org/CodeSystem/condition-ver-status";
const ALLERGY_CLINICAL: &str =
    "http://terminology.hl7.org/CodeSystem/allergyintolerance-clinical";
const ALLERGY_VERIFICATION: &str =
    "http://terminology.hl7.org/CodeSystem/allergyintolerance-verification";
const OBSERVATION_CATEGORY: &str = "http://terminology.hl7.org/CodeSystem/observation-category";

/// LOINC codes that identify vital-sign observations.
const VITAL_SIGN_LOINC: &[&str] = &[
    "85354-9", "8480-6", "8462-4", "8867-4", "9279-1", "8310-5", "2708-6", "29463-7", "8302-2",
    "39156-5",
];

const VITAL_KEYWORDS: &[&str] = &[
    "blood pressure",
    "heart rate",
    "pulse",
    "respiratory rate",
    "temperature",
    "oxygen saturation",
    "weight",
    "height",
    "bmi",
];

const LAB_KEYWORDS: &[&str] = &["panel", "count", "level", "culture", "titer", "trough"];

fn utc_now() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

fn category_concept(code: &str, display: &str) -> Value {
    codeable_concept(OBSERVATION_CATEGORY, code, display, None)
}

pub struct ClinicalFactory;

impl ResourceFactory for ClinicalFactory {
    fn supports(&self, resource_type: &str) -> bool {
        matches!(
            resource_type,
            "Observation"
                | "Condition"
                | "DiagnosticReport"
                | "ServiceRequest"
                | "Procedure"
                | "AllergyIntolerance"
        )
    }

    fn create(
        &self,
        resource_type: &str,
        data: &Map<String, Value>,
        ctx: &FactoryContext,
    ) -> Result<Value, FactoryError> {
        match resource_type {
            "Observation" => self.build_observation(data, ctx),
            "Condition" => self.build_condition(data, ctx),
            "DiagnosticReport" => self.build_diagnostic_report(data, ctx),
            "ServiceRequest" => self.build_service_request(data, ctx),
            "Procedure" => self.build_procedure(data, ctx),
            "AllergyIntolerance" => self.build_allergy(data, ctx),
            other => Err(FactoryError::UnsupportedType(other.to_string())),
        }
    }
}

impl ClinicalFactory {
    fn loinc_concept(&self, name: &str, ctx: &FactoryContext) -> (Value, Option<String>) {
        match ctx.terminology.best(CodeSystem::Loinc, name) {
            Some(m) if m.score >= 0.8 => (
                codeable_concept(CodeSystem::Loinc.uri(), &m.code, &m.display, Some(name)),
                Some(m.code),
            ),
            _ => (text_concept(name), None),
        }
    }

    fn snomed_concept(&self, name: &str, ctx: &FactoryContext) -> Value {
        match ctx.terminology.best(CodeSystem::Snomed, name) {
            Some(m) if m.score >= 0.8 => {
                codeable_concept(CodeSystem::Snomed.uri(), &m.code, &m.display, Some(name))
            }
            _ => text_concept(name),
        }
    }

    /// Auto-categorize from the LOINC binding or name keywords:
    /// vital-signs, laboratory, or survey.
    fn observation_category(&self, name: &str, loinc: Option<&str>) -> Value {
        if let Some(code) = loinc {
            if VITAL_SIGN_LOINC.contains(&code) {
                return category_concept("vital-signs", "Vital Signs");
            }
        }
        let lower = name.to_lowercase();
        if VITAL_KEYWORDS.iter().any(|k| lower.contains(k)) {
            return category_concept("vital-signs", "Vital Signs");
        }
        if loinc.is_some() || LAB_KEYWORDS.iter().any(|k| lower.contains(k)) {
            return category_concept("laboratory", "Laboratory");
        }
        category_concept("survey", "Survey")
    }

    fn build_observation(
        &self,
        data: &Map<String, Value>,
        ctx: &FactoryContext,
    ) -> Result<Value, FactoryError> {
        require_keys("Observation", data, &["name"])?;
        let name = str_field(data, &["name", "code"]).unwrap_or_default();
        let (code, loinc) = self.loinc_concept(name, ctx);

        let mut observation = Map::new();
        observation.insert("resourceType".to_string(), json!("Observation"));
        observation.insert(
            "id".to_string(),
            json!(ctx.references.mint_id("Observation")),
        );
        observation.insert(
            "status".to_string(),
            json!(str_field(data, &["status"]).unwrap_or("final")),
        );
        observation.insert(
            "category".to_string(),
            json!([self.observation_category(name, loinc.as_deref())]),
        );
        observation.insert("code".to_string(), code);
        if let Some(subject) = str_field(data, &["patient_ref", "subject"]) {
            observation.insert("subject".to_string(), reference_obj(subject));
        }
        observation.insert("effectiveDateTime".to_string(), json!(utc_now()));

        // Numeric values become a UCUM quantity; coded values a
        // CodeableConcept.
        match data.get("value") {
            Some(Value::Number(n)) => {
                let unit = str_field(data, &["unit"]).unwrap_or("1");
                let ucum = ctx
                    .terminology
                    .best(CodeSystem::Ucum, unit)
                    .map(|m| m.code)
                    .unwrap_or_else(|| unit.to_string());
                observation.insert(
                    "valueQuantity".to_string(),
                    quantity(n.as_f64().unwrap_or(0.0), &ucum),
                );
            }
            Some(Value::String(s)) if !s.trim().is_empty() => {
                observation.insert("valueCodeableConcept".to_string(), text_concept(s.trim()));
            }
            _ => {}
        }

        finalize("Observation", Value::Object(observation))
    }

    fn build_condition(
        &self,
        data: &Map<String, Value>,
        ctx: &FactoryContext,
    ) -> Result<Value, FactoryError> {
        require_keys("Condition", data, &["condition"])?;
        let name = str_field(data, &["condition", "name"]).unwrap_or_default();
        let negated = data
            .get("negated")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);

        let mut condition = Map::new();
        condition.insert("resourceType".to_string(), json!("Condition"));
        condition.insert("id".to_string(), json!(ctx.references.mint_id("Condition")));
        condition.insert(
            "clinicalStatus".to_string(),
            codeable_concept(CONDITION_CLINICAL, "active", "Active", None),
        );
        // Denied findings are recorded as refuted, never as positive
        let (ver_code, ver_display) = if negated {
            ("refuted", "Refuted")
        } else {
            ("confirmed", "Confirmed")
        };
        condition.insert(
            "verificationStatus".to_string(),
            codeable_concept(CONDITION_VERIFICATION, ver_code, ver_display, None),
        );
        condition.insert(
            "category".to_string(),
            json!([codeable_concept(
                "http://terminology.hl7.org/CodeSystem/condition-category",
                "problem-list-item",
                "Problem List Item",
                None,
            )]),
        );
        condition.insert("code".to_string(), self.snomed_concept(name, ctx));
        condition.insert(
            "subject".to_string(),
            reference_obj(str_field(data, &["patient_ref", "subject"]).unwrap_or("Patient/unknown")),
        );
        condition.insert("recordedDate".to_string(), json!(utc_now()));

        finalize("Condition", Value::Object(condition))
    }

    fn build_diagnostic_report(
        &self,
        data: &Map<String, Value>,
        ctx: &FactoryContext,
    ) -> Result<Value, FactoryError> {
        require_keys("DiagnosticReport", data, &["name"])?;
        let name = str_field(data, &["name", "code"]).unwrap_or_default();
        let (code, _) = self.loinc_concept(name, ctx);

        let mut report = Map::new();
        report.insert("resourceType".to_string(), json!("DiagnosticReport"));
        report.insert(
            "id".to_string(),
            json!(ctx.references.mint_id("DiagnosticReport")),
        );
        report.insert(
            "status".to_string(),
            json!(str_field(data, &["status"]).unwrap_or("final")),
        );
        report.insert("code".to_string(), code);
        if let Some(subject) = str_field(data, &["patient_ref", "subject"]) {
            report.insert("subject".to_string(), reference_obj(subject));
        }
        if let Some(Value::Array(results)) = data.get("result_refs") {
            report.insert(
                "result".to_string(),
                Value::Array(
                    results
                        .iter()
                        .filter_map(|r| r.as_str())
                        .map(reference_obj)
                        .collect(),
                ),
            );
        }
        report.insert("issued".to_string(), json!(utc_now()));
        finalize("DiagnosticReport", Value::Object(report))
    }

    fn build_service_request(
        &self,
        data: &Map<String, Value>,
        ctx: &FactoryContext,
    ) -> Result<Value, FactoryError> {
        require_keys("ServiceRequest", data, &["test"])?;
        let name = str_field(data, &["test", "name", "code"]).unwrap_or_default();
        let (code, _) = self.loinc_concept(name, ctx);

        let mut request = Map::new();
        request.insert("resourceType".to_string(), json!("ServiceRequest"));
        request.insert(
            "id".to_string(),
            json!(ctx.references.mint_id("ServiceRequest")),
        );
        request.insert(
            "status".to_string(),
            json!(str_field(data, &["status"]).unwrap_or("active")),
        );
        request.insert(
            "intent".to_string(),
            json!(str_field(data, &["intent"]).unwrap_or("order")),
        );
        request.insert("code".to_string(), code);
        request.insert(
            "subject".to_string(),
            reference_obj(str_field(data, &["patient_ref", "subject"]).unwrap_or("Patient/unknown")),
        );
        request.insert("authoredOn".to_string(), json!(utc_now()));
        if let Some(occurrence) = str_field(data, &["occurrence"]) {
            request.insert("occurrenceDateTime".to_string(), json!(occurrence));
        }
        if let Some(requester) = str_field(data, &["requester_ref"]) {
            request.insert("requester".to_string(), reference_obj(requester));
        }
        finalize("ServiceRequest", Value::Object(request))
    }

    fn build_procedure(
        &self,
        data: &Map<String, Value>,
        ctx: &FactoryContext,
    ) -> Result<Value, FactoryError> {
        require_keys("Procedure", data, &["procedure"])?;
        let name = str_field(data, &["procedure", "name"]).unwrap_or_default();

        let mut procedure = Map::new();
        procedure.insert("resourceType".to_string(), json!("Procedure"));
        procedure.insert("id".to_string(), json!(ctx.references.mint_id("Procedure")));
        // Ordered procedures have not happened yet
        procedure.insert(
            "status".to_string(),
            json!(str_field(data, &["status"]).unwrap_or("preparation")),
        );
        procedure.insert("code".to_string(), self.snomed_concept(name, ctx));
        procedure.insert(
            "subject".to_string(),
            reference_obj(str_field(data, &["patient_ref", "subject"]).unwrap_or("Patient/unknown")),
        );
        finalize("Procedure", Value::Object(procedure))
    }

    fn build_allergy(
        &self,
        data: &Map<String, Value>,
        ctx: &FactoryContext,
    ) -> Result<Value, FactoryError> {
        require_keys("AllergyIntolerance", data, &["substance"])?;
        let substance = str_field(data, &["substance"]).unwrap_or_default();

        // Substances are usually drugs; try RxNorm before SNOMED
        let code = match ctx.terminology.best(CodeSystem::RxNorm, substance) {
            Some(m) if m.score >= 0.8 => {
                codeable_concept(CodeSystem::RxNorm.uri(), &m.code, &m.display, Some(substance))
            }
            _ => self.snomed_concept(substance, ctx),
        };

        let mut allergy = Map::new();
        allergy.insert("resourceType".to_string(), json!("AllergyIntolerance"));
        allergy.insert(
            "id".to_string(),
            json!(ctx.references.mint_id("AllergyIntolerance")),
        );
        allergy.insert(
            "clinicalStatus".to_string(),
            codeable_concept(ALLERGY_CLINICAL, "active", "Active", None),
        );
        allergy.insert(
            "verificationStatus".to_string(),
            codeable_concept(
                ALLERGY_VERIFICATION,
                str_field(data, &["verification_status"]).unwrap_or("confirmed"),
                "Verification Status",
                None,
            ),
        );
        allergy.insert("code".to_string(), code);
        allergy.insert(
            "patient".to_string(),
            reference_obj(str_field(data, &["patient_ref", "patient"]).unwrap_or("Patient/unknown")),
        );
        if let Some(criticality) = str_field(data, &["criticality"]) {
            allergy.insert("criticality".to_string(), json!(criticality));
        }

        if let Some(Value::Array(reactions)) = data.get("reactions") {
            let manifestations: Vec<Value> = reactions
                .iter()
                .filter_map(|r| r.as_str())
                .map(|r| self.snomed_concept(r, ctx))
                .collect();
            if !manifestations.is_empty() {
                allergy.insert(
                    "reaction".to_string(),
                    json!([{ "manifestation": manifestations }]),
                );
            }
        }

        finalize("AllergyIntolerance", Value::Object(allergy))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FeatureFlags;
    use funke_fhir_common::ReferenceManager;
    use funke_terminology::TerminologyIndex;
    use std::sync::Arc;

    fn ctx() -> FactoryContext {
        FactoryContext::new(
            "req-test",
            Arc::new(ReferenceManager::new()),
            Arc::new(TerminologyIndex::new()),
            FeatureFlags::default(),
        )
    }

    fn create(resource_type: &str, data: Value) -> Result<Value, FactoryError> {
        ClinicalFactory.create(resource_type, data.as_object().unwrap(), &ctx())
    }

    #[test]
    fn test_vital_observation_categorized_with_quantity() {
        let resource = create(
            "Observation",
            json!({
                "name": "heart rate",
                "value": 72,
                "unit": "/min",
                "patient_ref": "Patient/p-1",
            }),
        )
        .unwrap();

        assert_eq!(resource["category"][0]["coding"][0]["code"], "vital-signs");
        assert_eq!(resource["code"]["coding"][0]["code"], "8867-4");
        assert_eq!(resource["valueQuantity"]["value"], 72.0);
        assert_eq!(
            resource["valueQuantity"]["system"],
            "http://unitsofmeasure.org"
        );
    }

    #[test]
    fn test_lab_observation_categorized_laboratory() {
        let resource = create(
            "Observation",
            json!({ "name": "hemoglobin a1c", "value": "pending" }),
        )
        .unwrap();
        assert_eq!(resource["category"][0]["coding"][0]["code"], "laboratory");
        assert_eq!(resource["valueCodeableConcept"]["text"], "pending");
    }

    #[test]
    fn test_unknown_observation_is_survey() {
        let resource = create(
            "Observation",
            json!({ "name": "mood self-assessment" }),
        )
        .unwrap();
        assert_eq!(resource["category"][0]["coding"][0]["code"], "survey");
        assert_eq!(resource["code"]["text"], "mood self-assessment");
    }

    #[test]
    fn test_negated_condition_is_refuted() {
        let resource = create(
            "Condition",
            json!({
                "condition": "chest pain",
                "negated": true,
                "patient_ref": "Patient/p-1",
            }),
        )
        .unwrap();
        assert_eq!(
            resource["verificationStatus"]["coding"][0]["code"],
            "refuted"
        );
        assert_eq!(resource["code"]["coding"][0]["code"], "29857009");
    }

    #[test]
    fn test_positive_condition_is_confirmed() {
        let resource = create(
            "Condition",
            json!({ "condition": "hypertension", "patient_ref": "Patient/p-1" }),
        )
        .unwrap();
        assert_eq!(
            resource["verificationStatus"]["coding"][0]["code"],
            "confirmed"
        );
    }

    #[test]
    fn test_service_request_codes_cbc() {
        let resource = create(
            "ServiceRequest",
            json!({
                "test": "CBC",
                "patient_ref": "Patient/p-1",
                "occurrence": "2026-08-02T09:00:00Z",
            }),
        )
        .unwrap();
        assert_eq!(resource["code"]["coding"][0]["code"], "58410-2");
        assert_eq!(resource["intent"], "order");
        assert_eq!(resource["occurrenceDateTime"], "2026-08-02T09:00:00Z");
    }

    #[test]
    fn test_allergy_with_reactions() {
        let resource = create(
            "AllergyIntolerance",
            json!({
                "substance": "penicillin v",
                "criticality": "high",
                "patient_ref": "Patient/p-1",
                "reactions": ["rash", "anaphylaxis"],
            }),
        )
        .unwrap();
        assert_eq!(resource["criticality"], "high");
        assert_eq!(
            resource["code"]["coding"][0]["system"],
            "http://www.nlm.nih.gov/research/umls/rxnorm"
        );
        let manifestations = resource["reaction"][0]["manifestation"].as_array().unwrap();
        assert_eq!(manifestations.len(), 2);
        assert_eq!(
            manifestations[1]["coding"][0]["code"],
            "39579001"
        );
    }

    #[test]
    fn test_procedure_defaults_to_preparation() {
        let resource = create(
            "Procedure",
            json!({ "procedure": "colonoscopy", "patient_ref": "Patient/p-1" }),
        )
        .unwrap();
        assert_eq!(resource["status"], "preparation");
        assert_eq!(resource["code"]["coding"][0]["code"], "73761001");
    }
}
