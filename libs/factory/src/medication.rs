//! Medication-family factory: MedicationRequest, MedicationAdministration,
//! Medication, MedicationDispense, MedicationStatement.
//!
//! Coding prefers RxNorm and falls back to a text-only CodeableConcept.
//! Dosage instructions are modeled explicitly (dose quantity, timing,
//! route). When the request context carries documented allergies, every
//! high-criticality active allergy is cross-checked against the ordered
//! medication's substance and RxNorm class; a match attaches a safety
//! alert to the request metadata and never fails the build.

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{json, Map, Value};

use funke_fhir_common::datatypes::{codeable_concept, quantity, reference_obj, text_concept};
use funke_terminology::{allergy_conflict, CodeSystem};

use crate::{
    finalize, require_keys, str_field, FactoryContext, FactoryError, ResourceFactory, SafetyAlert,
};

const SAFETY_TAG_SYSTEM: &str = "http://funke-health.org/fhir/tags/safety-alert";

lazy_static! {
    static ref DOSE: Regex =
        Regex::new(r"(?i)^\s*(\d+(?:\.\d+)?)\s*(mg|mcg|g|kg|ml|l|units?|iu|meq|tablets?|capsules?|puffs?|drops?)\s*$")
            .unwrap();
    static ref EVERY_N_HOURS: Regex = Regex::new(r"(?i)^every\s+(\d+)\s+hours?$").unwrap();
}

/// Structured timing derived from a frequency surface form.
struct TimingRepeat {
    frequency: u32,
    period: f64,
    period_unit: &'static str,
    when: Option<&'static str>,
    as_needed: bool,
}

fn parse_frequency(raw: &str) -> Option<TimingRepeat> {
    let norm = raw.trim().to_lowercase();
    let fixed = |frequency: u32, period: f64, period_unit: &'static str| TimingRepeat {
        frequency,
        period,
        period_unit,
        when: None,
        as_needed: false,
    };

    if let Some(caps) = EVERY_N_HOURS.captures(&norm) {
        let hours: f64 = caps[1].parse().ok()?;
        return Some(fixed(1, hours, "h"));
    }

    match norm.as_str() {
        "daily" | "once daily" | "every day" | "qd" => Some(fixed(1, 1.0, "d")),
        "twice daily" | "bid" => Some(fixed(2, 1.0, "d")),
        "three times daily" | "tid" => Some(fixed(3, 1.0, "d")),
        "four times daily" | "qid" => Some(fixed(4, 1.0, "d")),
        "every other day" => Some(fixed(1, 2.0, "d")),
        "weekly" => Some(fixed(1, 1.0, "wk")),
        "monthly" => Some(fixed(1, 1.0, "mo")),
        "nightly" | "at bedtime" => Some(TimingRepeat {
            frequency: 1,
            period: 1.0,
            period_unit: "d",
            when: Some("HS"),
            as_needed: false,
        }),
        "as needed" | "prn" => Some(TimingRepeat {
            frequency: 1,
            period: 1.0,
            period_unit: "d",
            when: None,
            as_needed: true,
        }),
        _ => None,
    }
}

/// Map a route surface form to its SNOMED route-of-administration coding.
fn route_concept(raw: &str) -> Value {
    let (code, display) = match raw.trim().to_lowercase().as_str() {
        "oral" | "po" | "by mouth" => ("26643006", "Oral route"),
        "intravenous" | "iv" => ("47625008", "Intravenous route"),
        "intramuscular" | "im" => ("78421000", "Intramuscular route"),
        "subcutaneous" => ("34206005", "Subcutaneous route"),
        "sublingual" => ("37839007", "Sublingual route"),
        "topical" => ("6064005", "Topical route"),
        "inhaled" => ("447694001", "Respiratory tract route"),
        "rectal" => ("37161004", "Rectal route"),
        "transdermal" => ("45890007", "Transdermal route"),
        _ => return text_concept(raw),
    };
    codeable_concept(CodeSystem::Snomed.uri(), code, display, Some(raw))
}

pub struct MedicationFamilyFactory;

impl ResourceFactory for MedicationFamilyFactory {
    fn supports(&self, resource_type: &str) -> bool {
        matches!(
            resource_type,
            "MedicationRequest"
                | "MedicationAdministration"
                | "Medication"
                | "MedicationDispense"
                | "MedicationStatement"
        )
    }

    fn create(
        &self,
        resource_type: &str,
        data: &Map<String, Value>,
        ctx: &FactoryContext,
    ) -> Result<Value, FactoryError> {
        match resource_type {
            "MedicationRequest" => self.build_request(data, ctx),
            "MedicationAdministration" => self.build_administration(data, ctx),
            "Medication" => self.build_medication(data, ctx),
            "MedicationDispense" => self.build_dispense(data, ctx),
            "MedicationStatement" => self.build_statement(data, ctx),
            other => Err(FactoryError::UnsupportedType(other.to_string())),
        }
    }
}

impl MedicationFamilyFactory {
    /// RxNorm-preferred medication coding with text fallback.
    fn medication_concept(&self, name: &str, ctx: &FactoryContext) -> Value {
        match ctx.terminology.best(CodeSystem::RxNorm, name) {
            Some(m) if m.score >= 0.8 => {
                codeable_concept(CodeSystem::RxNorm.uri(), &m.code, &m.display, Some(name))
            }
            _ => text_concept(name),
        }
    }

    fn dosage_instruction(&self, data: &Map<String, Value>) -> Option<Value> {
        let dosage = str_field(data, &["dosage", "dose"]);
        let frequency = str_field(data, &["frequency"]);
        let route = str_field(data, &["route"]);
        if dosage.is_none() && frequency.is_none() && route.is_none() {
            return None;
        }

        let text = [dosage, route, frequency]
            .iter()
            .flatten()
            .copied()
            .collect::<Vec<_>>()
            .join(" ");
        let mut instruction = Map::new();
        instruction.insert("text".to_string(), json!(text));

        if let Some(raw) = dosage {
            if let Some(caps) = DOSE.captures(raw) {
                let value: f64 = caps[1].parse().unwrap_or(0.0);
                let unit = caps[2].to_lowercase();
                instruction.insert(
                    "doseAndRate".to_string(),
                    json!([{ "doseQuantity": quantity(value, &unit) }]),
                );
            }
        }

        if let Some(raw) = frequency {
            if let Some(repeat) = parse_frequency(raw) {
                let mut timing_repeat = json!({
                    "frequency": repeat.frequency,
                    "period": repeat.period,
                    "periodUnit": repeat.period_unit,
                });
                if let Some(when) = repeat.when {
                    timing_repeat["when"] = json!([when]);
                }
                instruction.insert(
                    "timing".to_string(),
                    json!({ "repeat": timing_repeat, "code": { "text": raw } }),
                );
                if repeat.as_needed {
                    instruction.insert("asNeededBoolean".to_string(), json!(true));
                }
            } else {
                instruction.insert("timing".to_string(), json!({ "code": { "text": raw } }));
            }
        }

        if let Some(raw) = route {
            instruction.insert("route".to_string(), route_concept(raw));
        }

        Some(Value::Object(instruction))
    }

    /// High-criticality active allergies vs the ordered medication.
    /// Matches produce alerts; they never abort the build.
    fn cross_check_allergies(&self, medication: &str, ctx: &FactoryContext) -> Vec<Value> {
        let mut tags = Vec::new();
        for allergy in &ctx.allergies {
            if !allergy.active || allergy.criticality != "high" {
                continue;
            }
            if let Some(conflict) = allergy_conflict(&allergy.substance, medication) {
                let message = format!(
                    "{} conflicts with documented {} allergy ({})",
                    medication, allergy.substance, conflict.shared
                );
                tags.push(json!({
                    "system": SAFETY_TAG_SYSTEM,
                    "code": "medication-allergy",
                    "display": message,
                }));
                ctx.push_alert(SafetyAlert {
                    severity: "high".to_string(),
                    medication: medication.to_string(),
                    allergen: allergy.substance.clone(),
                    kind: conflict.kind,
                    message,
                });
            }
        }
        tags
    }

    fn build_request(
        &self,
        data: &Map<String, Value>,
        ctx: &FactoryContext,
    ) -> Result<Value, FactoryError> {
        require_keys("MedicationRequest", data, &["medication"])?;
        let name = str_field(data, &["medication"]).unwrap_or_default();

        let mut request = Map::new();
        request.insert("resourceType".to_string(), json!("MedicationRequest"));
        request.insert(
            "id".to_string(),
            json!(ctx.references.mint_id("MedicationRequest")),
        );
        request.insert(
            "status".to_string(),
            json!(str_field(data, &["status"]).unwrap_or("active")),
        );
        request.insert(
            "intent".to_string(),
            json!(str_field(data, &["intent"]).unwrap_or("order")),
        );
        request.insert(
            "medicationCodeableConcept".to_string(),
            self.medication_concept(name, ctx),
        );
        request.insert(
            "subject".to_string(),
            reference_obj(str_field(data, &["patient_ref", "subject"]).unwrap_or("Patient/unknown")),
        );
        request.insert(
            "authoredOn".to_string(),
            json!(chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)),
        );

        if let Some(requester) = str_field(data, &["requester_ref"]) {
            request.insert("requester".to_string(), reference_obj(requester));
        }

        if let Some(instruction) = self.dosage_instruction(data) {
            request.insert("dosageInstruction".to_string(), json!([instruction]));
        }

        let tags = self.cross_check_allergies(name, ctx);
        if !tags.is_empty() {
            request.insert("meta".to_string(), json!({ "tag": tags }));
        }

        finalize("MedicationRequest", Value::Object(request))
    }

    fn build_administration(
        &self,
        data: &Map<String, Value>,
        ctx: &FactoryContext,
    ) -> Result<Value, FactoryError> {
        require_keys("MedicationAdministration", data, &["medication"])?;
        let name = str_field(data, &["medication"]).unwrap_or_default();

        let mut admin = Map::new();
        admin.insert("resourceType".to_string(), json!("MedicationAdministration"));
        admin.insert(
            "id".to_string(),
            json!(ctx.references.mint_id("MedicationAdministration")),
        );
        admin.insert(
            "status".to_string(),
            json!(str_field(data, &["status"]).unwrap_or("completed")),
        );
        admin.insert(
            "medicationCodeableConcept".to_string(),
            self.medication_concept(name, ctx),
        );
        admin.insert(
            "subject".to_string(),
            reference_obj(str_field(data, &["patient_ref", "subject"]).unwrap_or("Patient/unknown")),
        );
        admin.insert(
            "effectiveDateTime".to_string(),
            json!(str_field(data, &["effective"]).map(str::to_string).unwrap_or_else(
                || chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
            )),
        );
        finalize("MedicationAdministration", Value::Object(admin))
    }

    fn build_medication(
        &self,
        data: &Map<String, Value>,
        ctx: &FactoryContext,
    ) -> Result<Value, FactoryError> {
        require_keys("Medication", data, &["medication"])?;
        let name = str_field(data, &["medication"]).unwrap_or_default();

        let mut medication = Map::new();
        medication.insert("resourceType".to_string(), json!("Medication"));
        medication.insert(
            "id".to_string(),
            json!(ctx.references.mint_id("Medication")),
        );
        medication.insert("code".to_string(), self.medication_concept(name, ctx));
        medication.insert("status".to_string(), json!("active"));
        finalize("Medication", Value::Object(medication))
    }

    fn build_dispense(
        &self,
        data: &Map<String, Value>,
        ctx: &FactoryContext,
    ) -> Result<Value, FactoryError> {
        require_keys("MedicationDispense", data, &["medication"])?;
        let name = str_field(data, &["medication"]).unwrap_or_default();

        let mut dispense = Map::new();
        dispense.insert("resourceType".to_string(), json!("MedicationDispense"));
        dispense.insert(
            "id".to_string(),
            json!(ctx.references.mint_id("MedicationDispense")),
        );
        dispense.insert(
            "status".to_string(),
            json!(str_field(data, &["status"]).unwrap_or("completed")),
        );
        dispense.insert(
            "medicationCodeableConcept".to_string(),
            self.medication_concept(name, ctx),
        );
        if let Some(subject) = str_field(data, &["patient_ref", "subject"]) {
            dispense.insert("subject".to_string(), reference_obj(subject));
        }
        if let Some(instruction) = self.dosage_instruction(data) {
            dispense.insert("dosageInstruction".to_string(), json!([instruction]));
        }
        finalize("MedicationDispense", Value::Object(dispense))
    }

    fn build_statement(
        &self,
        data: &Map<String, Value>,
        ctx: &FactoryContext,
    ) -> Result<Value, FactoryError> {
        require_keys("MedicationStatement", data, &["medication"])?;
        let name = str_field(data, &["medication"]).unwrap_or_default();

        let mut statement = Map::new();
        statement.insert("resourceType".to_string(), json!("MedicationStatement"));
        statement.insert(
            "id".to_string(),
            json!(ctx.references.mint_id("MedicationStatement")),
        );
        statement.insert(
            "status".to_string(),
            json!(str_field(data, &["status"]).unwrap_or("active")),
        );
        statement.insert(
            "medicationCodeableConcept".to_string(),
            self.medication_concept(name, ctx),
        );
        statement.insert(
            "subject".to_string(),
            reference_obj(str_field(data, &["patient_ref", "subject"]).unwrap_or("Patient/unknown")),
        );
        finalize("MedicationStatement", Value::Object(statement))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FeatureFlags, PatientAllergy};
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

    fn request(data: Value, ctx: &FactoryContext) -> Result<Value, FactoryError> {
        MedicationFamilyFactory.create("MedicationRequest", data.as_object().unwrap(), ctx)
    }

    #[test]
    fn test_full_medication_request() {
        let resource = request(
            json!({
                "medication": "amoxicillin",
                "dosage": "500 mg",
                "frequency": "twice daily",
                "route": "oral",
                "patient_ref": "Patient/patient-1f3a9c2d",
            }),
            &ctx(),
        )
        .unwrap();

        assert_eq!(resource["status"], "active");
        assert_eq!(resource["intent"], "order");
        assert_eq!(
            resource["medicationCodeableConcept"]["coding"][0]["code"],
            "723"
        );
        assert_eq!(
            resource["medicationCodeableConcept"]["coding"][0]["system"],
            "http://www.nlm.nih.gov/research/umls/rxnorm"
        );

        let instruction = &resource["dosageInstruction"][0];
        assert_eq!(instruction["doseAndRate"][0]["doseQuantity"]["value"], 500.0);
        assert_eq!(instruction["doseAndRate"][0]["doseQuantity"]["code"], "mg");
        assert_eq!(instruction["timing"]["repeat"]["frequency"], 2);
        assert_eq!(instruction["timing"]["repeat"]["periodUnit"], "d");
        assert_eq!(instruction["route"]["coding"][0]["code"], "26643006");
    }

    #[test]
    fn test_unknown_medication_falls_back_to_text() {
        let resource = request(
            json!({ "medication": "Zq-714 compound", "patient_ref": "Patient/p-1" }),
            &ctx(),
        )
        .unwrap();
        let concept = &resource["medicationCodeableConcept"];
        assert!(concept.get("coding").is_none());
        assert_eq!(concept["text"], "Zq-714 compound");
    }

    #[test]
    fn test_missing_medication_is_contract_violation() {
        let err = request(json!({ "patient_ref": "Patient/p-1" }), &ctx()).unwrap_err();
        assert!(matches!(err, FactoryError::MissingInput { key: "medication", .. }));
    }

    #[test]
    fn test_allergy_cross_check_alerts_without_failing() {
        let ctx = ctx().with_allergies(vec![PatientAllergy {
            substance: "Penicillin".to_string(),
            criticality: "high".to_string(),
            active: true,
        }]);

        let resource = request(
            json!({
                "medication": "Amoxicillin",
                "dosage": "875 mg",
                "frequency": "twice daily",
                "patient_ref": "Patient/p-1",
            }),
            &ctx,
        )
        .unwrap();

        // The request is created, with the alert riding on meta.tag
        assert_eq!(resource["resourceType"], "MedicationRequest");
        assert_eq!(resource["meta"]["tag"][0]["code"], "medication-allergy");
        assert!(resource["meta"].get("profile").is_none());

        let alerts = ctx.alerts();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].severity, "high");
        assert_eq!(alerts[0].allergen, "Penicillin");
    }

    #[test]
    fn test_low_criticality_allergy_is_ignored() {
        let ctx = ctx().with_allergies(vec![PatientAllergy {
            substance: "Penicillin".to_string(),
            criticality: "low".to_string(),
            active: true,
        }]);
        let resource = request(
            json!({ "medication": "Amoxicillin", "patient_ref": "Patient/p-1" }),
            &ctx,
        )
        .unwrap();
        assert!(resource.get("meta").is_none());
        assert!(ctx.alerts().is_empty());
    }

    #[test]
    fn test_as_needed_frequency() {
        let resource = request(
            json!({
                "medication": "ibuprofen",
                "dosage": "400 mg",
                "frequency": "as needed",
                "patient_ref": "Patient/p-1",
            }),
            &ctx(),
        )
        .unwrap();
        assert_eq!(resource["dosageInstruction"][0]["asNeededBoolean"], true);
    }

    #[test]
    fn test_every_n_hours_timing() {
        let resource = request(
            json!({
                "medication": "ceftriaxone",
                "frequency": "every 8 hours",
                "patient_ref": "Patient/p-1",
            }),
            &ctx(),
        )
        .unwrap();
        let repeat = &resource["dosageInstruction"][0]["timing"]["repeat"];
        assert_eq!(repeat["frequency"], 1);
        assert_eq!(repeat["period"], 8.0);
        assert_eq!(repeat["periodUnit"], "h");
    }

    #[test]
    fn test_statement_and_administration_build() {
        let data = json!({ "medication": "warfarin", "patient_ref": "Patient/p-1" });
        let statement = MedicationFamilyFactory
            .create("MedicationStatement", data.as_object().unwrap(), &ctx())
            .unwrap();
        assert_eq!(statement["status"], "active");

        let admin = MedicationFamilyFactory
            .create("MedicationAdministration", data.as_object().unwrap(), &ctx())
            .unwrap();
        assert_eq!(admin["status"], "completed");
        assert!(admin["effectiveDateTime"].as_str().is_some());
    }
}
