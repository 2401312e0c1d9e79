//! Supporting-resource factory: Organization, Location, Device,
//! DeviceUseStatement, Appointment, Coverage, Specimen, RelatedPerson,
//! Immunization, CommunicationRequest, RiskAssessment, ImagingStudy.

use serde_json::{json, Map, Value};
use uuid::Uuid;

use funke_fhir_common::datatypes::{codeable_concept, reference_obj, text_concept};
use funke_terminology::CodeSystem;

use crate::patient::parse_human_name;
use crate::{finalize, require_keys, str_field, FactoryContext, FactoryError, ResourceFactory};

fn utc_now() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

/// DICOM-style study instance UID under the UUID-derived `2.25` root.
fn dicom_study_uid() -> String {
    format!("2.25.{}", Uuid::new_v4().as_u128())
}

/// RelatedPerson identifiers arrive as a bare string, an object, or a
/// list of either; normalize all three to FHIR identifier form.
fn normalize_identifiers(raw: &Value) -> Vec<Value> {
    let one = |item: &Value| -> Option<Value> {
        match item {
            Value::String(s) if !s.trim().is_empty() => Some(json!({ "value": s.trim() })),
            Value::Object(obj) => {
                let mut identifier = Map::new();
                if let Some(system) = obj.get("system").and_then(|v| v.as_str()) {
                    identifier.insert("system".to_string(), json!(system));
                }
                if let Some(value) = obj.get("value").and_then(|v| v.as_str()) {
                    identifier.insert("value".to_string(), json!(value));
                }
                (!identifier.is_empty()).then_some(Value::Object(identifier))
            }
            _ => None,
        }
    };

    match raw {
        Value::Array(items) => items.iter().filter_map(one).collect(),
        other => one(other).into_iter().collect(),
    }
}

/// `communication` arrives as a list or a single object/string; normalize
/// to the FHIR list form.
fn normalize_communication(raw: &Value) -> Vec<Value> {
    let one = |item: &Value| -> Option<Value> {
        match item {
            Value::String(s) if !s.trim().is_empty() => {
                Some(json!({ "language": { "text": s.trim() } }))
            }
            Value::Object(_) => Some(item.clone()),
            _ => None,
        }
    };
    match raw {
        Value::Array(items) => items.iter().filter_map(one).collect(),
        other => one(other).into_iter().collect(),
    }
}

pub struct SupportFactory;

impl ResourceFactory for SupportFactory {
    fn supports(&self, resource_type: &str) -> bool {
        matches!(
            resource_type,
            "Organization"
                | "Location"
                | "Device"
                | "DeviceUseStatement"
                | "Appointment"
                | "Coverage"
                | "Specimen"
                | "RelatedPerson"
                | "Immunization"
                | "CommunicationRequest"
                | "RiskAssessment"
                | "ImagingStudy"
        )
    }

    fn create(
        &self,
        resource_type: &str,
        data: &Map<String, Value>,
        ctx: &FactoryContext,
    ) -> Result<Value, FactoryError> {
        match resource_type {
            "Organization" => self.build_organization(data, ctx),
            "Location" => self.build_location(data, ctx),
            "Device" => self.build_device(data, ctx),
            "DeviceUseStatement" => self.build_device_use(data, ctx),
            "Appointment" => self.build_appointment(data, ctx),
            "Coverage" => self.build_coverage(data, ctx),
            "Specimen" => self.build_specimen(data, ctx),
            "RelatedPerson" => self.build_related_person(data, ctx),
            "Immunization" => self.build_immunization(data, ctx),
            "CommunicationRequest" => self.build_communication_request(data, ctx),
            "RiskAssessment" => self.build_risk_assessment(data, ctx),
            "ImagingStudy" => self.build_imaging_study(data, ctx),
            other => Err(FactoryError::UnsupportedType(other.to_string())),
        }
    }
}

impl SupportFactory {
    fn build_organization(
        &self,
        data: &Map<String, Value>,
        ctx: &FactoryContext,
    ) -> Result<Value, FactoryError> {
        require_keys("Organization", data, &["name"])?;
        let mut org = Map::new();
        org.insert("resourceType".to_string(), json!("Organization"));
        org.insert("id".to_string(), json!(ctx.references.mint_id("Organization")));
        org.insert("name".to_string(), json!(str_field(data, &["name"]).unwrap_or_default()));
        org.insert("active".to_string(), json!(true));
        finalize("Organization", Value::Object(org))
    }

    fn build_location(
        &self,
        data: &Map<String, Value>,
        ctx: &FactoryContext,
    ) -> Result<Value, FactoryError> {
        require_keys("Location", data, &["name"])?;
        let mut location = Map::new();
        location.insert("resourceType".to_string(), json!("Location"));
        location.insert("id".to_string(), json!(ctx.references.mint_id("Location")));
        location.insert(
            "name".to_string(),
            json!(str_field(data, &["name"]).unwrap_or_default()),
        );
        location.insert(
            "status".to_string(),
            json!(str_field(data, &["status"]).unwrap_or("active")),
        );
        finalize("Location", Value::Object(location))
    }

    fn build_device(
        &self,
        data: &Map<String, Value>,
        ctx: &FactoryContext,
    ) -> Result<Value, FactoryError> {
        require_keys("Device", data, &["device"])?;
        let name = str_field(data, &["device", "name"]).unwrap_or_default();
        let mut device = Map::new();
        device.insert("resourceType".to_string(), json!("Device"));
        device.insert("id".to_string(), json!(ctx.references.mint_id("Device")));
        device.insert(
            "status".to_string(),
            json!(str_field(data, &["status"]).unwrap_or("active")),
        );
        device.insert("type".to_string(), text_concept(name));
        if let Some(patient) = str_field(data, &["patient_ref", "patient"]) {
            device.insert("patient".to_string(), reference_obj(patient));
        }
        finalize("Device", Value::Object(device))
    }

    fn build_device_use(
        &self,
        data: &Map<String, Value>,
        ctx: &FactoryContext,
    ) -> Result<Value, FactoryError> {
        require_keys("DeviceUseStatement", data, &["device_ref"])?;
        let mut statement = Map::new();
        statement.insert("resourceType".to_string(), json!("DeviceUseStatement"));
        statement.insert(
            "id".to_string(),
            json!(ctx.references.mint_id("DeviceUseStatement")),
        );
        statement.insert(
            "status".to_string(),
            json!(str_field(data, &["status"]).unwrap_or("active")),
        );
        statement.insert(
            "subject".to_string(),
            reference_obj(str_field(data, &["patient_ref", "subject"]).unwrap_or("Patient/unknown")),
        );
        statement.insert(
            "device".to_string(),
            reference_obj(str_field(data, &["device_ref"]).unwrap_or_default()),
        );
        finalize("DeviceUseStatement", Value::Object(statement))
    }

    fn build_appointment(
        &self,
        data: &Map<String, Value>,
        ctx: &FactoryContext,
    ) -> Result<Value, FactoryError> {
        require_keys("Appointment", data, &["patient_ref"])?;
        let mut appointment = Map::new();
        appointment.insert("resourceType".to_string(), json!("Appointment"));
        appointment.insert(
            "id".to_string(),
            json!(ctx.references.mint_id("Appointment")),
        );
        appointment.insert(
            "status".to_string(),
            json!(str_field(data, &["status"]).unwrap_or("booked")),
        );
        appointment.insert(
            "participant".to_string(),
            json!([{
                "actor": reference_obj(str_field(data, &["patient_ref"]).unwrap_or_default()),
                "status": "accepted",
            }]),
        );
        if let Some(start) = str_field(data, &["start"]) {
            appointment.insert("start".to_string(), json!(start));
        }
        if let Some(description) = str_field(data, &["description"]) {
            appointment.insert("description".to_string(), json!(description));
        }
        finalize("Appointment", Value::Object(appointment))
    }

    fn build_coverage(
        &self,
        data: &Map<String, Value>,
        ctx: &FactoryContext,
    ) -> Result<Value, FactoryError> {
        require_keys("Coverage", data, &["patient_ref", "payor"])?;
        let mut coverage = Map::new();
        coverage.insert("resourceType".to_string(), json!("Coverage"));
        coverage.insert("id".to_string(), json!(ctx.references.mint_id("Coverage")));
        coverage.insert(
            "status".to_string(),
            json!(str_field(data, &["status"]).unwrap_or("active")),
        );
        coverage.insert(
            "beneficiary".to_string(),
            reference_obj(str_field(data, &["patient_ref"]).unwrap_or_default()),
        );
        let payor = str_field(data, &["payor"]).unwrap_or_default();
        let payor_value = if payor.contains('/') {
            json!([reference_obj(payor)])
        } else {
            json!([{ "display": payor }])
        };
        coverage.insert("payor".to_string(), payor_value);
        finalize("Coverage", Value::Object(coverage))
    }

    fn build_specimen(
        &self,
        data: &Map<String, Value>,
        ctx: &FactoryContext,
    ) -> Result<Value, FactoryError> {
        require_keys("Specimen", data, &["specimen_type"])?;
        let mut specimen = Map::new();
        specimen.insert("resourceType".to_string(), json!("Specimen"));
        specimen.insert("id".to_string(), json!(ctx.references.mint_id("Specimen")));
        specimen.insert(
            "type".to_string(),
            text_concept(str_field(data, &["specimen_type"]).unwrap_or_default()),
        );
        if let Some(subject) = str_field(data, &["patient_ref", "subject"]) {
            specimen.insert("subject".to_string(), reference_obj(subject));
        }
        specimen.insert(
            "status".to_string(),
            json!(str_field(data, &["status"]).unwrap_or("available")),
        );
        finalize("Specimen", Value::Object(specimen))
    }

    fn build_related_person(
        &self,
        data: &Map<String, Value>,
        ctx: &FactoryContext,
    ) -> Result<Value, FactoryError> {
        require_keys("RelatedPerson", data, &["patient_ref"])?;
        let mut related = Map::new();
        related.insert("resourceType".to_string(), json!("RelatedPerson"));
        related.insert(
            "id".to_string(),
            json!(ctx.references.mint_id("RelatedPerson")),
        );
        related.insert(
            "patient".to_string(),
            reference_obj(str_field(data, &["patient_ref"]).unwrap_or_default()),
        );

        if let Some(name) = str_field(data, &["name"]) {
            related.insert("name".to_string(), json!([parse_human_name(name)]));
        }
        if let Some(relationship) = str_field(data, &["relationship"]) {
            related.insert("relationship".to_string(), json!([text_concept(relationship)]));
        }

        if let Some(raw) = data.get("identifier") {
            let identifiers = normalize_identifiers(raw);
            if !identifiers.is_empty() {
                related.insert("identifier".to_string(), Value::Array(identifiers));
            }
        }
        if let Some(raw) = data.get("communication") {
            let communication = normalize_communication(raw);
            if !communication.is_empty() {
                related.insert("communication".to_string(), Value::Array(communication));
            }
        }

        finalize("RelatedPerson", Value::Object(related))
    }

    fn build_immunization(
        &self,
        data: &Map<String, Value>,
        ctx: &FactoryContext,
    ) -> Result<Value, FactoryError> {
        require_keys("Immunization", data, &["vaccine"])?;
        let vaccine = str_field(data, &["vaccine"]).unwrap_or_default();

        let vaccine_code = match ctx.terminology.best(CodeSystem::Cvx, vaccine) {
            Some(m) if m.score >= 0.6 => {
                codeable_concept(CodeSystem::Cvx.uri(), &m.code, &m.display, Some(vaccine))
            }
            _ => text_concept(vaccine),
        };

        let mut immunization = Map::new();
        immunization.insert("resourceType".to_string(), json!("Immunization"));
        immunization.insert(
            "id".to_string(),
            json!(ctx.references.mint_id("Immunization")),
        );
        immunization.insert(
            "status".to_string(),
            json!(str_field(data, &["status"]).unwrap_or("completed")),
        );
        immunization.insert("vaccineCode".to_string(), vaccine_code);
        immunization.insert(
            "patient".to_string(),
            reference_obj(str_field(data, &["patient_ref", "patient"]).unwrap_or("Patient/unknown")),
        );
        immunization.insert(
            "occurrenceDateTime".to_string(),
            json!(str_field(data, &["occurrence"]).map(str::to_string).unwrap_or_else(utc_now)),
        );
        finalize("Immunization", Value::Object(immunization))
    }

    fn build_communication_request(
        &self,
        data: &Map<String, Value>,
        ctx: &FactoryContext,
    ) -> Result<Value, FactoryError> {
        require_keys("CommunicationRequest", data, &["message"])?;
        let mut request = Map::new();
        request.insert("resourceType".to_string(), json!("CommunicationRequest"));
        request.insert(
            "id".to_string(),
            json!(ctx.references.mint_id("CommunicationRequest")),
        );
        request.insert(
            "status".to_string(),
            json!(str_field(data, &["status"]).unwrap_or("active")),
        );
        request.insert(
            "payload".to_string(),
            json!([{ "contentString": str_field(data, &["message"]).unwrap_or_default() }]),
        );
        if let Some(subject) = str_field(data, &["patient_ref", "subject"]) {
            request.insert("subject".to_string(), reference_obj(subject));
        }
        finalize("CommunicationRequest", Value::Object(request))
    }

    fn build_risk_assessment(
        &self,
        data: &Map<String, Value>,
        ctx: &FactoryContext,
    ) -> Result<Value, FactoryError> {
        require_keys("RiskAssessment", data, &["risk"])?;
        let mut assessment = Map::new();
        assessment.insert("resourceType".to_string(), json!("RiskAssessment"));
        assessment.insert(
            "id".to_string(),
            json!(ctx.references.mint_id("RiskAssessment")),
        );
        assessment.insert(
            "status".to_string(),
            json!(str_field(data, &["status"]).unwrap_or("final")),
        );
        assessment.insert(
            "subject".to_string(),
            reference_obj(str_field(data, &["patient_ref", "subject"]).unwrap_or("Patient/unknown")),
        );
        assessment.insert(
            "prediction".to_string(),
            json!([{ "outcome": text_concept(str_field(data, &["risk"]).unwrap_or_default()) }]),
        );
        finalize("RiskAssessment", Value::Object(assessment))
    }

    fn build_imaging_study(
        &self,
        data: &Map<String, Value>,
        ctx: &FactoryContext,
    ) -> Result<Value, FactoryError> {
        let mut study = Map::new();
        study.insert("resourceType".to_string(), json!("ImagingStudy"));
        study.insert(
            "id".to_string(),
            json!(ctx.references.mint_id("ImagingStudy")),
        );
        study.insert(
            "status".to_string(),
            json!(str_field(data, &["status"]).unwrap_or("available")),
        );
        study.insert(
            "subject".to_string(),
            reference_obj(str_field(data, &["patient_ref", "subject"]).unwrap_or("Patient/unknown")),
        );
        study.insert(
            "identifier".to_string(),
            json!([{ "system": "urn:dicom:uid", "value": format!("urn:oid:{}", dicom_study_uid()) }]),
        );

        // Series and instance counts are computed from the nested input,
        // never trusted from it.
        let mut series_out = Vec::new();
        let mut instance_total = 0u64;
        if let Some(Value::Array(series_in)) = data.get("series") {
            for series in series_in {
                let Some(series_obj) = series.as_object() else {
                    continue;
                };
                let instances = series_obj
                    .get("instances")
                    .and_then(|v| v.as_array())
                    .map(|a| a.len() as u64)
                    .or_else(|| series_obj.get("instance_count").and_then(|v| v.as_u64()))
                    .unwrap_or(0);
                instance_total += instances;
                let mut out = Map::new();
                out.insert("uid".to_string(), json!(dicom_study_uid()));
                if let Some(modality) = series_obj.get("modality").and_then(|v| v.as_str()) {
                    out.insert(
                        "modality".to_string(),
                        json!({
                            "system": "http://dicom.nema.org/resources/ontology/DCM",
                            "code": modality,
                        }),
                    );
                }
                out.insert("numberOfInstances".to_string(), json!(instances));
                series_out.push(Value::Object(out));
            }
        }
        study.insert("numberOfSeries".to_string(), json!(series_out.len()));
        study.insert("numberOfInstances".to_string(), json!(instance_total));
        if !series_out.is_empty() {
            study.insert("series".to_string(), Value::Array(series_out));
        }

        finalize("ImagingStudy", Value::Object(study))
    }
}
