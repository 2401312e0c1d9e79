//! Person-domain factory: Patient, Practitioner, PractitionerRole, Person.
//!
//! Carries the normalization work the rest of the pipeline depends on:
//! name parsing in both comma and natural order, gender aliases, birth
//! dates in five formats, US phone formatting, and lowercased RFC-lite
//! email validation.

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{json, Map, Value};

use funke_fhir_common::datatypes::{reference_obj, typed_identifier};

use crate::{finalize, require_keys, str_field, FactoryContext, FactoryError, ResourceFactory};

const MRN_SYSTEM: &str = "http://hospital.example.org/identifiers/mrn";
const SSN_SYSTEM: &str = "http://hl7.org/fhir/sid/us-ssn";

lazy_static! {
    static ref EMAIL: Regex =
        Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$").unwrap();
    static ref ISO_DATE: Regex = Regex::new(r"^(\d{4})-(\d{1,2})-(\d{1,2})$").unwrap();
    static ref SLASH_YMD: Regex = Regex::new(r"^(\d{4})/(\d{1,2})/(\d{1,2})$").unwrap();
    static ref SLASH_DMY_OR_MDY: Regex = Regex::new(r"^(\d{1,2})/(\d{1,2})/(\d{4})$").unwrap();
    static ref DASH_MDY: Regex = Regex::new(r"^(\d{1,2})-(\d{1,2})-(\d{4})$").unwrap();
}

/// Parse "Last, First Middle" or "First [Middle] Last" into a HumanName.
pub(crate) fn parse_human_name(raw: &str) -> Value {
    let text = raw.trim();
    if let Some((family, given_part)) = text.split_once(',') {
        let given: Vec<&str> = given_part.split_whitespace().collect();
        return json!({
            "family": family.trim(),
            "given": given,
            "text": format!("{} {}", given.join(" "), family.trim()),
        });
    }

    let parts: Vec<&str> = text.split_whitespace().collect();
    match parts.len() {
        0 => json!({ "text": "" }),
        1 => json!({ "given": [parts[0]], "text": parts[0] }),
        n => json!({
            "family": parts[n - 1],
            "given": parts[..n - 1],
            "text": text,
        }),
    }
}

/// Normalize gender with `{m,f,u}` aliases. Unrecognized input is an
/// input-contract violation, not a silent default.
pub(crate) fn normalize_gender(raw: &str) -> Result<&'static str, String> {
    match raw.trim().to_lowercase().as_str() {
        "male" | "m" => Ok("male"),
        "female" | "f" => Ok("female"),
        "other" | "o" => Ok("other"),
        "unknown" | "u" => Ok("unknown"),
        other => Err(format!("unrecognized gender '{}'", other)),
    }
}

/// Parse a birth date from the supported formats to ISO `YYYY-MM-DD`.
/// The second tuple member flags an ambiguous `NN/NN/YYYY` parse (both
/// fields ≤ 12), which is resolved month-first.
pub(crate) fn parse_birth_date(raw: &str) -> Result<(String, bool), String> {
    let text = raw.trim();

    let build = |y: i32, m: u32, d: u32| -> Result<String, String> {
        chrono::NaiveDate::from_ymd_opt(y, m, d)
            .map(|date| date.format("%Y-%m-%d").to_string())
            .ok_or_else(|| format!("'{}' is not a calendar date", text))
    };

    if let Some(caps) = ISO_DATE.captures(text).or_else(|| SLASH_YMD.captures(text)) {
        let y: i32 = caps[1].parse().unwrap();
        let m: u32 = caps[2].parse().unwrap();
        let d: u32 = caps[3].parse().unwrap();
        return build(y, m, d).map(|iso| (iso, false));
    }

    if let Some(caps) = SLASH_DMY_OR_MDY.captures(text) {
        let a: u32 = caps[1].parse().unwrap();
        let b: u32 = caps[2].parse().unwrap();
        let y: i32 = caps[3].parse().unwrap();
        return if a > 12 {
            // First field cannot be a month: day-first
            build(y, b, a).map(|iso| (iso, false))
        } else if b > 12 {
            build(y, a, b).map(|iso| (iso, false))
        } else {
            // Both plausible: month-first, flagged ambiguous
            build(y, a, b).map(|iso| (iso, a != b))
        };
    }

    if let Some(caps) = DASH_MDY.captures(text) {
        let m: u32 = caps[1].parse().unwrap();
        let d: u32 = caps[2].parse().unwrap();
        let y: i32 = caps[3].parse().unwrap();
        return build(y, m, d).map(|iso| (iso, false));
    }

    Err(format!("unsupported date format '{}'", text))
}

/// US-centric phone formatting; anything else passes through untouched.
pub(crate) fn format_phone(raw: &str) -> String {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    match digits.len() {
        10 => format!("({}) {}-{}", &digits[..3], &digits[3..6], &digits[6..]),
        11 if digits.starts_with('1') => format!(
            "+1 ({}) {}-{}",
            &digits[1..4],
            &digits[4..7],
            &digits[7..]
        ),
        _ => raw.trim().to_string(),
    }
}

/// RFC-lite email check; valid addresses come back lowercased.
pub(crate) fn normalize_email(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if EMAIL.is_match(trimmed) {
        Some(trimmed.to_lowercase())
    } else {
        None
    }
}

fn string_values<'a>(data: &'a Map<String, Value>, keys: &[&str]) -> Vec<&'a str> {
    for key in keys {
        match data.get(*key) {
            Some(Value::String(s)) if !s.trim().is_empty() => return vec![s.as_str()],
            Some(Value::Array(items)) => {
                return items
                    .iter()
                    .filter_map(|v| v.as_str())
                    .filter(|s| !s.trim().is_empty())
                    .collect();
            }
            _ => continue,
        }
    }
    Vec::new()
}

fn address_value(value: &Value) -> Value {
    match value {
        Value::String(s) => json!({ "text": s }),
        Value::Object(_) => value.clone(),
        _ => json!({}),
    }
}

pub struct PersonFactory;

impl ResourceFactory for PersonFactory {
    fn supports(&self, resource_type: &str) -> bool {
        matches!(
            resource_type,
            "Patient" | "Practitioner" | "PractitionerRole" | "Person"
        )
    }

    fn create(
        &self,
        resource_type: &str,
        data: &Map<String, Value>,
        ctx: &FactoryContext,
    ) -> Result<Value, FactoryError> {
        match resource_type {
            "Patient" => self.build_patient(data, ctx),
            "Person" => self.build_person(data, ctx),
            "Practitioner" => self.build_practitioner(data, ctx),
            "PractitionerRole" => self.build_practitioner_role(data, ctx),
            other => Err(FactoryError::UnsupportedType(other.to_string())),
        }
    }
}

impl PersonFactory {
    fn build_patient(
        &self,
        data: &Map<String, Value>,
        ctx: &FactoryContext,
    ) -> Result<Value, FactoryError> {
        let mut patient = Map::new();
        patient.insert("resourceType".to_string(), json!("Patient"));
        patient.insert("id".to_string(), json!(ctx.references.mint_id("Patient")));

        let names = string_values(data, &["name", "names"]);
        if !names.is_empty() {
            patient.insert(
                "name".to_string(),
                Value::Array(names.iter().map(|n| parse_human_name(n)).collect()),
            );
        }

        if let Some(raw) = str_field(data, &["gender", "sex"]) {
            let gender = normalize_gender(raw).map_err(|reason| FactoryError::InvalidInput {
                resource_type: "Patient",
                key: "gender",
                reason,
            })?;
            patient.insert("gender".to_string(), json!(gender));
        }

        if let Some(raw) = str_field(data, &["birth_date", "birthDate", "dob"]) {
            let (iso, ambiguous) =
                parse_birth_date(raw).map_err(|reason| FactoryError::InvalidInput {
                    resource_type: "Patient",
                    key: "birth_date",
                    reason,
                })?;
            if ambiguous {
                tracing::warn!(
                    request_id = %ctx.request_id,
                    "date_ambiguous: birth date parsed month-first"
                );
            }
            patient.insert("birthDate".to_string(), json!(iso));
        }

        let mut telecom = Vec::new();
        for phone in string_values(data, &["phone", "phones"]) {
            telecom.push(json!({
                "system": "phone",
                "value": format_phone(phone),
                "use": "home",
            }));
        }
        for email in string_values(data, &["email", "emails"]) {
            match normalize_email(email) {
                Some(value) => telecom.push(json!({ "system": "email", "value": value })),
                None => tracing::debug!(
                    request_id = %ctx.request_id,
                    "dropping invalid email from patient telecom"
                ),
            }
        }
        if !telecom.is_empty() {
            patient.insert("telecom".to_string(), Value::Array(telecom));
        }

        let mut identifiers = Vec::new();
        if let Some(mrn) = str_field(data, &["mrn", "medical_record_number"]) {
            identifiers.push(typed_identifier("MR", "Medical record number", MRN_SYSTEM, mrn));
        }
        if let Some(ssn) = str_field(data, &["ssn", "social_security_number"]) {
            identifiers.push(typed_identifier("SS", "Social Security number", SSN_SYSTEM, ssn));
        }
        if !identifiers.is_empty() {
            patient.insert("identifier".to_string(), Value::Array(identifiers));
        }

        match data.get("address").or_else(|| data.get("addresses")) {
            Some(Value::Array(items)) => {
                patient.insert(
                    "address".to_string(),
                    Value::Array(items.iter().map(address_value).collect()),
                );
            }
            Some(single @ (Value::String(_) | Value::Object(_))) => {
                patient.insert("address".to_string(), json!([address_value(single)]));
            }
            _ => {}
        }

        if let Some(contacts) = self.build_contacts(data) {
            patient.insert("contact".to_string(), contacts);
        }

        finalize("Patient", Value::Object(patient))
    }

    fn build_contacts(&self, data: &Map<String, Value>) -> Option<Value> {
        let raw = data
            .get("emergency_contact")
            .or_else(|| data.get("contacts"))?;
        let items: Vec<&Value> = match raw {
            Value::Array(items) => items.iter().collect(),
            Value::Object(_) => vec![raw],
            _ => return None,
        };

        let contacts: Vec<Value> = items
            .iter()
            .filter_map(|item| {
                let obj = item.as_object()?;
                let mut contact = Map::new();
                if let Some(name) = obj.get("name").and_then(|v| v.as_str()) {
                    contact.insert("name".to_string(), parse_human_name(name));
                }
                if let Some(phone) = obj.get("phone").and_then(|v| v.as_str()) {
                    contact.insert(
                        "telecom".to_string(),
                        json!([{ "system": "phone", "value": format_phone(phone) }]),
                    );
                }
                if let Some(rel) = obj.get("relationship").and_then(|v| v.as_str()) {
                    contact.insert("relationship".to_string(), json!([{ "text": rel }]));
                }
                (!contact.is_empty()).then_some(Value::Object(contact))
            })
            .collect();

        (!contacts.is_empty()).then_some(Value::Array(contacts))
    }

    fn build_person(
        &self,
        data: &Map<String, Value>,
        ctx: &FactoryContext,
    ) -> Result<Value, FactoryError> {
        require_keys("Person", data, &["name"])?;
        let mut person = Map::new();
        person.insert("resourceType".to_string(), json!("Person"));
        person.insert("id".to_string(), json!(ctx.references.mint_id("Person")));
        let names = string_values(data, &["name", "names"]);
        person.insert(
            "name".to_string(),
            Value::Array(names.iter().map(|n| parse_human_name(n)).collect()),
        );
        // Person shares Patient's schema subset; no extra rules apply
        Ok(Value::Object(person))
    }

    fn build_practitioner(
        &self,
        data: &Map<String, Value>,
        ctx: &FactoryContext,
    ) -> Result<Value, FactoryError> {
        require_keys("Practitioner", data, &["name"])?;
        let raw = str_field(data, &["name"]).unwrap_or_default();
        let stripped = raw
            .trim_start_matches("Dr.")
            .trim_start_matches("Dr")
            .trim_start_matches("Doctor")
            .trim();

        let mut practitioner = Map::new();
        practitioner.insert("resourceType".to_string(), json!("Practitioner"));
        practitioner.insert(
            "id".to_string(),
            json!(ctx.references.mint_id("Practitioner")),
        );
        practitioner.insert(
            "name".to_string(),
            json!([{
                "prefix": ["Dr."],
                "text": format!("Dr. {}", stripped),
                "family": parse_human_name(stripped)["family"].as_str()
                    .unwrap_or(stripped),
            }]),
        );
        finalize("Practitioner", Value::Object(practitioner))
    }

    fn build_practitioner_role(
        &self,
        data: &Map<String, Value>,
        ctx: &FactoryContext,
    ) -> Result<Value, FactoryError> {
        require_keys("PractitionerRole", data, &["practitioner_ref"])?;
        let mut role = Map::new();
        role.insert("resourceType".to_string(), json!("PractitionerRole"));
        role.insert(
            "id".to_string(),
            json!(ctx.references.mint_id("PractitionerRole")),
        );
        role.insert(
            "practitioner".to_string(),
            reference_obj(str_field(data, &["practitioner_ref"]).unwrap_or_default()),
        );
        if let Some(specialty) = str_field(data, &["specialty", "role"]) {
            role.insert("code".to_string(), json!([{ "text": specialty }]));
        }
        if let Some(org) = str_field(data, &["organization_ref"]) {
            role.insert("organization".to_string(), reference_obj(org));
        }
        Ok(Value::Object(role))
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

    fn patient(data: Value) -> Result<Value, FactoryError> {
        let map = data.as_object().unwrap().clone();
        PersonFactory.create("Patient", &map, &ctx())
    }

    #[test]
    fn test_natural_order_name() {
        let name = parse_human_name("John Robert Doe");
        assert_eq!(name["family"], "Doe");
        assert_eq!(name["given"], json!(["John", "Robert"]));
    }

    #[test]
    fn test_comma_order_name() {
        let name = parse_human_name("Doe, John Robert");
        assert_eq!(name["family"], "Doe");
        assert_eq!(name["given"], json!(["John", "Robert"]));
        assert_eq!(name["text"], "John Robert Doe");
    }

    #[test]
    fn test_gender_aliases() {
        assert_eq!(normalize_gender("M").unwrap(), "male");
        assert_eq!(normalize_gender("f").unwrap(), "female");
        assert_eq!(normalize_gender("U").unwrap(), "unknown");
        assert!(normalize_gender("?").is_err());
    }

    #[test]
    fn test_birth_date_formats() {
        assert_eq!(
            parse_birth_date("1985-03-07").unwrap(),
            ("1985-03-07".to_string(), false)
        );
        assert_eq!(
            parse_birth_date("1985/03/07").unwrap(),
            ("1985-03-07".to_string(), false)
        );
        assert_eq!(
            parse_birth_date("03-07-1985").unwrap(),
            ("1985-03-07".to_string(), false)
        );
        // Day > 12 forces day-first
        assert_eq!(
            parse_birth_date("25/03/1985").unwrap(),
            ("1985-03-25".to_string(), false)
        );
        // Month > 12 in second place forces month-first
        assert_eq!(
            parse_birth_date("03/25/1985").unwrap(),
            ("1985-03-25".to_string(), false)
        );
        // Both plausible: month-first, flagged ambiguous
        assert_eq!(
            parse_birth_date("03/07/1985").unwrap(),
            ("1985-03-07".to_string(), true)
        );
        assert!(parse_birth_date("July 4 1985").is_err());
        assert!(parse_birth_date("02/30/1985").is_err());
    }

    #[test]
    fn test_phone_formats() {
        assert_eq!(format_phone("5551234567"), "(555) 123-4567");
        assert_eq!(format_phone("1-555-123-4567"), "+1 (555) 123-4567");
        assert_eq!(format_phone("+44 20 7946 0958"), "+44 20 7946 0958");
    }

    #[test]
    fn test_email_normalization() {
        assert_eq!(
            normalize_email(" Jane.Doe@Example.ORG ").as_deref(),
            Some("jane.doe@example.org")
        );
        assert!(normalize_email("not-an-email").is_none());
    }

    #[test]
    fn test_full_patient_build() {
        let resource = patient(json!({
            "name": "Doe, John",
            "gender": "m",
            "birth_date": "03/25/1985",
            "phone": "5551234567",
            "email": "John.Doe@example.org",
            "mrn": "MRN-0042",
            "ssn": "123-45-6789",
            "address": "12 Main St, Springfield",
        }))
        .unwrap();

        assert_eq!(resource["resourceType"], "Patient");
        assert!(resource["id"].as_str().unwrap().starts_with("patient-"));
        assert_eq!(resource["name"][0]["family"], "Doe");
        assert_eq!(resource["gender"], "male");
        assert_eq!(resource["birthDate"], "1985-03-25");
        assert_eq!(resource["telecom"][0]["value"], "(555) 123-4567");
        assert_eq!(resource["telecom"][1]["value"], "john.doe@example.org");
        assert_eq!(resource["identifier"][0]["type"]["coding"][0]["code"], "MR");
        assert_eq!(resource["identifier"][1]["type"]["coding"][0]["code"], "SS");
        assert_eq!(resource["address"][0]["text"], "12 Main St, Springfield");
    }

    #[test]
    fn test_placeholder_patient_is_valid() {
        let resource = patient(json!({})).unwrap();
        assert_eq!(resource["resourceType"], "Patient");
        assert!(resource["id"].as_str().is_some());
    }

    #[test]
    fn test_invalid_gender_is_rejected() {
        let err = patient(json!({ "gender": "yes" })).unwrap_err();
        assert!(matches!(
            err,
            FactoryError::InvalidInput { key: "gender", .. }
        ));
    }

    #[test]
    fn test_emergency_contacts() {
        let resource = patient(json!({
            "name": "Jane Smith",
            "emergency_contact": { "name": "Mark Smith", "phone": "5559876543", "relationship": "spouse" },
        }))
        .unwrap();
        assert_eq!(resource["contact"][0]["name"]["family"], "Smith");
        assert_eq!(
            resource["contact"][0]["telecom"][0]["value"],
            "(555) 987-6543"
        );
    }

    #[test]
    fn test_practitioner_strips_title() {
        let map = json!({ "name": "Dr. Garcia" });
        let resource = PersonFactory
            .create("Practitioner", map.as_object().unwrap(), &ctx())
            .unwrap();
        assert_eq!(resource["name"][0]["text"], "Dr. Garcia");
        assert_eq!(resource["name"][0]["family"], "Garcia");
    }
}
