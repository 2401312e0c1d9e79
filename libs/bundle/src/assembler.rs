//! Bundle assembly: dependency ordering, fullUrl minting, reference
//! rewriting.
//!
//! The reference graph is never materialized as objects. A single pre-pass
//! registers every resource's fullUrl with the request's
//! [`ReferenceManager`], then every resource is walked as JSON with
//! `reference` values resolved against that registry on the fly.

use std::collections::HashMap;

use chrono::Utc;
use serde_json::{json, Value};
use uuid::Uuid;

use funke_fhir_common::ReferenceManager;

/// Conservative dependency tiers: creators before referrers. This is a
/// super-set of the true reference DAG and sufficient for transaction
/// semantics.
const ORDERING_TIERS: &[&[&str]] = &[
    // (i) infrastructure
    &[
        "Organization",
        "Location",
        "Practitioner",
        "PractitionerRole",
        "Patient",
        "RelatedPerson",
        "Device",
    ],
    // (ii) requests
    &["MedicationRequest", "ServiceRequest", "CommunicationRequest"],
    // (iii) events & state
    &[
        "Encounter",
        "Procedure",
        "Observation",
        "DiagnosticReport",
        "Condition",
        "AllergyIntolerance",
        "Immunization",
        "MedicationAdministration",
        "MedicationStatement",
        "MedicationDispense",
        "Medication",
        "Specimen",
        "ImagingStudy",
    ],
    // (iv) cross-cutting
    &["Goal", "CarePlan", "CareTeam", "DeviceUseStatement", "RiskAssessment", "Coverage", "Appointment"],
];

/// The assembled transaction bundle plus a snapshot of the reference
/// registry used to build it (exposed for diagnostics and tests).
#[derive(Debug, Clone)]
pub struct Bundle {
    pub json: Value,
    pub full_url_map: HashMap<String, String>,
}

fn tier_of(resource_type: &str) -> usize {
    for (i, tier) in ORDERING_TIERS.iter().enumerate() {
        if tier.contains(&resource_type) {
            return i;
        }
    }
    ORDERING_TIERS.len()
}

/// Flatten the input mapping into dependency order: tier by tier, the
/// tier's configured type order, then input order within a type. Types
/// outside every tier sort alphabetically at the end.
fn order_resources(resources_by_type: &HashMap<String, Vec<Value>>) -> Vec<&Value> {
    let mut types: Vec<&String> = resources_by_type.keys().collect();
    types.sort_by(|a, b| {
        let (ta, tb) = (tier_of(a), tier_of(b));
        ta.cmp(&tb).then_with(|| {
            if ta < ORDERING_TIERS.len() {
                let tier = ORDERING_TIERS[ta];
                let pos = |t: &str| tier.iter().position(|x| *x == t).unwrap_or(usize::MAX);
                pos(a).cmp(&pos(b))
            } else {
                a.cmp(b)
            }
        })
    });

    types
        .into_iter()
        .flat_map(|t| resources_by_type[t].iter())
        .collect()
}

/// Recursive rewrite of every property named `reference` whose value is
/// registered as bundle-internal `ResourceType/id`. Absolute URLs and
/// unknown targets are left untouched; arrays and nested objects are
/// descended into.
fn rewrite_references(value: &mut Value, references: &ReferenceManager) {
    match value {
        Value::Object(map) => {
            for (key, child) in map.iter_mut() {
                if key == "reference" {
                    if let Some(target) = child.as_str() {
                        if let Some(full_url) = references.full_url_for(target) {
                            *child = Value::String(full_url);
                            continue;
                        }
                    }
                }
                rewrite_references(child, references);
            }
        }
        Value::Array(items) => {
            for item in items.iter_mut() {
                rewrite_references(item, references);
            }
        }
        _ => {}
    }
}

/// Assemble a transaction bundle from the factory layer's output. Minted
/// fullUrls are registered with the request's reference manager, which
/// then resolves every internal reference during the rewrite walk.
pub fn assemble(
    resources_by_type: &HashMap<String, Vec<Value>>,
    references: &ReferenceManager,
) -> Bundle {
    let ordered = order_resources(resources_by_type);

    // Pre-pass: mint one fullUrl per resource and register the mapping
    let full_urls: Vec<String> = ordered
        .iter()
        .map(|_| format!("urn:uuid:{}", Uuid::new_v4()))
        .collect();
    for (resource, full_url) in ordered.iter().zip(&full_urls) {
        let resource_type = resource
            .get("resourceType")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        let id = resource.get("id").and_then(|v| v.as_str()).unwrap_or_default();
        if !resource_type.is_empty() && !id.is_empty() {
            references.register_full_url(resource_type, id, full_url);
        }
    }

    let entries: Vec<Value> = ordered
        .iter()
        .zip(&full_urls)
        .map(|(resource, full_url)| {
            let mut rewritten = (*resource).clone();
            rewrite_references(&mut rewritten, references);
            json!({
                "fullUrl": full_url,
                "resource": rewritten,
            })
        })
        .collect();

    let bundle = json!({
        "resourceType": "Bundle",
        "id": format!("bundle-{}", Uuid::new_v4()),
        "type": "transaction",
        "timestamp": Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
        "entry": entries,
    });

    Bundle {
        json: bundle,
        full_url_map: references.full_url_map(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input() -> HashMap<String, Vec<Value>> {
        let mut map = HashMap::new();
        map.insert(
            "Patient".to_string(),
            vec![json!({
                "resourceType": "Patient",
                "id": "patient-aaaa1111",
                "name": [{ "family": "Doe" }],
            })],
        );
        map.insert(
            "MedicationRequest".to_string(),
            vec![json!({
                "resourceType": "MedicationRequest",
                "id": "medicationrequest-bbbb2222",
                "status": "active",
                "intent": "order",
                "subject": { "reference": "Patient/patient-aaaa1111" },
                "supportingInformation": [
                    { "reference": "Observation/observation-cccc3333" },
                    { "reference": "https://example.org/fhir/Patient/external" },
                ],
            })],
        );
        map.insert(
            "Observation".to_string(),
            vec![json!({
                "resourceType": "Observation",
                "id": "observation-cccc3333",
                "status": "final",
                "code": { "text": "BP" },
                "subject": { "reference": "Patient/patient-aaaa1111" },
            })],
        );
        map
    }

    fn entry_types(bundle: &Value) -> Vec<String> {
        bundle["entry"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["resource"]["resourceType"].as_str().unwrap().to_string())
            .collect()
    }

    #[test]
    fn test_dependency_ordering() {
        let bundle = assemble(&input(), &ReferenceManager::new());
        assert_eq!(
            entry_types(&bundle.json),
            vec!["Patient", "MedicationRequest", "Observation"]
        );
    }

    #[test]
    fn test_full_url_form() {
        let bundle = assemble(&input(), &ReferenceManager::new());
        for entry in bundle.json["entry"].as_array().unwrap() {
            let full_url = entry["fullUrl"].as_str().unwrap();
            assert!(full_url.starts_with("urn:uuid:"));
            let uuid = full_url.strip_prefix("urn:uuid:").unwrap();
            assert_eq!(uuid, uuid.to_lowercase());
            assert!(Uuid::parse_str(uuid).is_ok());
        }
    }

    #[test]
    fn test_references_rewritten_to_full_urls() {
        let references = ReferenceManager::new();
        let bundle = assemble(&input(), &references);
        let entries = bundle.json["entry"].as_array().unwrap();
        let patient_full_url = entries[0]["fullUrl"].as_str().unwrap();

        let request = &entries[1]["resource"];
        assert_eq!(request["subject"]["reference"], patient_full_url);

        // Nested array reference rewritten too
        let observation_full_url = entries[2]["fullUrl"].as_str().unwrap();
        assert_eq!(
            request["supportingInformation"][0]["reference"],
            observation_full_url
        );
        // External absolute URL untouched
        assert_eq!(
            request["supportingInformation"][1]["reference"],
            "https://example.org/fhir/Patient/external"
        );

        // The request's reference manager carries the registry afterwards
        assert_eq!(
            references.full_url_for("Patient/patient-aaaa1111").as_deref(),
            Some(patient_full_url)
        );
    }

    #[test]
    fn test_resource_ids_preserved() {
        let bundle = assemble(&input(), &ReferenceManager::new());
        let entries = bundle.json["entry"].as_array().unwrap();
        assert_eq!(entries[0]["resource"]["id"], "patient-aaaa1111");
        let ids: std::collections::HashSet<&str> = entries
            .iter()
            .map(|e| e["resource"]["id"].as_str().unwrap())
            .collect();
        assert_eq!(ids.len(), entries.len());
    }

    #[test]
    fn test_bundle_metadata() {
        let bundle = assemble(&input(), &ReferenceManager::new());
        assert_eq!(bundle.json["resourceType"], "Bundle");
        assert_eq!(bundle.json["type"], "transaction");
        assert!(bundle.json["id"].as_str().unwrap().starts_with("bundle-"));
        let timestamp = bundle.json["timestamp"].as_str().unwrap();
        assert!(timestamp.ends_with('Z'));
    }

    #[test]
    fn test_structural_isomorphism_across_runs() {
        fn strip_nondeterminism(bundle: &Value, full_url_map: &HashMap<String, String>) -> Value {
            let mut stripped = bundle.clone();
            stripped["id"] = json!("bundle");
            stripped["timestamp"] = json!("T");
            let reverse: HashMap<&String, &String> =
                full_url_map.iter().map(|(k, v)| (v, k)).collect();
            fn walk(value: &mut Value, reverse: &HashMap<&String, &String>) {
                match value {
                    Value::Object(map) => {
                        for (key, child) in map.iter_mut() {
                            if key == "fullUrl" || key == "reference" {
                                if let Some(s) = child.as_str() {
                                    if let Some(canonical) = reverse.get(&s.to_string()) {
                                        *child = json!(canonical);
                                    } else if s.starts_with("urn:uuid:") {
                                        *child = json!("urn");
                                    }
                                }
                            }
                            walk(child, reverse);
                        }
                    }
                    Value::Array(items) => items.iter_mut().for_each(|i| walk(i, reverse)),
                    _ => {}
                }
            }
            walk(&mut stripped, &reverse);
            stripped
        }

        let resources = input();
        let first = assemble(&resources, &ReferenceManager::new());
        let second = assemble(&resources, &ReferenceManager::new());
        assert_eq!(
            strip_nondeterminism(&first.json, &first.full_url_map),
            strip_nondeterminism(&second.json, &second.full_url_map)
        );
    }

    #[test]
    fn test_unlisted_type_appended_deterministically() {
        let mut resources = input();
        resources.insert(
            "Basic".to_string(),
            vec![json!({ "resourceType": "Basic", "id": "basic-1" })],
        );
        let bundle = assemble(&resources, &ReferenceManager::new());
        assert_eq!(entry_types(&bundle.json).last().map(String::as_str), Some("Basic"));
    }

    #[test]
    fn test_empty_input_yields_empty_bundle() {
        let bundle = assemble(&HashMap::new(), &ReferenceManager::new());
        assert_eq!(bundle.json["entry"].as_array().unwrap().len(), 0);
        assert_eq!(bundle.json["type"], "transaction");
    }

    #[test]
    fn test_reparse_is_fixpoint() {
        let bundle = assemble(&input(), &ReferenceManager::new());
        let serialized = serde_json::to_string(&bundle.json).unwrap();
        let reparsed: Value = serde_json::from_str(&serialized).unwrap();
        assert_eq!(reparsed, bundle.json);
        assert_eq!(serde_json::to_string(&reparsed).unwrap(), serialized);
    }
}
