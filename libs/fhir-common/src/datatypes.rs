//! Constructors for the FHIR datatypes the resource factories emit.

use serde_json::{json, Value};

/// CodeableConcept with a single coding plus optional free text.
pub fn codeable_concept(system: &str, code: &str, display: &str, text: Option<&str>) -> Value {
    let mut cc = json!({
        "coding": [{
            "system": system,
            "code": code,
            "display": display,
        }],
    });
    if let Some(t) = text {
        cc["text"] = json!(t);
    }
    cc
}

/// Text-only CodeableConcept. The universally acceptable fallback when a
/// terminology lookup misses.
pub fn text_concept(text: &str) -> Value {
    json!({ "text": text })
}

/// Quantity with a UCUM unit.
pub fn quantity(value: f64, unit: &str) -> Value {
    json!({
        "value": value,
        "unit": unit,
        "system": "http://unitsofmeasure.org",
        "code": unit,
    })
}

/// Reference object in canonical `ResourceType/id` form.
pub fn reference_obj(reference: &str) -> Value {
    json!({ "reference": reference })
}

/// Identifier block with a v2-0203 type code (MR, SS, ...).
pub fn typed_identifier(type_code: &str, type_display: &str, system: &str, value: &str) -> Value {
    json!({
        "type": {
            "coding": [{
                "system": "http://terminology.hl7.org/CodeSystem/v2-0203",
                "code": type_code,
                "display": type_display,
            }],
        },
        "system": system,
        "value": value,
    })
}
