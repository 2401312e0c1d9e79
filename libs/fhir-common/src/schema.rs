//! Local structural validation against a bounded rule table
//!
//! Validates a resource against the structural rules this pipeline relies
//! on: correct `resourceType`, required elements present, bounded value
//! sets, and reference string syntax. This is not a full profile
//! validator; external validation covers the rest, and when external
//! validation is unreachable these checks are the fallback.

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;

use crate::{IssueCode, IssueSeverity, ValidationIssue};

/// Required top-level elements and bounded value sets, per resource type.
struct ResourceRules {
    resource_type: &'static str,
    required: &'static [&'static str],
    /// (field, allowed values) — enforced only when the field is a string
    value_sets: &'static [(&'static str, &'static [&'static str])],
}

const MEDICATION_REQUEST_STATUS: &[&str] = &[
    "active",
    "on-hold",
    "cancelled",
    "completed",
    "entered-in-error",
    "stopped",
    "draft",
    "unknown",
];

const REQUEST_INTENT: &[&str] = &[
    "proposal",
    "plan",
    "directive",
    "order",
    "original-order",
    "reflex-order",
    "filler-order",
    "instance-order",
    "option",
];

const OBSERVATION_STATUS: &[&str] = &[
    "registered",
    "preliminary",
    "final",
    "amended",
    "corrected",
    "cancelled",
    "entered-in-error",
    "unknown",
];

const EVENT_STATUS: &[&str] = &[
    "preparation",
    "in-progress",
    "not-done",
    "on-hold",
    "stopped",
    "completed",
    "entered-in-error",
    "unknown",
];

const GOAL_LIFECYCLE_STATUS: &[&str] = &[
    "proposed",
    "planned",
    "accepted",
    "active",
    "on-hold",
    "completed",
    "cancelled",
    "entered-in-error",
    "rejected",
];

static RULES: &[ResourceRules] = &[
    ResourceRules {
        resource_type: "Patient",
        required: &[],
        value_sets: &[("gender", &["male", "female", "other", "unknown"])],
    },
    ResourceRules {
        resource_type: "Practitioner",
        required: &[],
        value_sets: &[("gender", &["male", "female", "other", "unknown"])],
    },
    ResourceRules {
        resource_type: "RelatedPerson",
        required: &["patient"],
        value_sets: &[("gender", &["male", "female", "other", "unknown"])],
    },
    ResourceRules {
        resource_type: "MedicationRequest",
        required: &["status", "intent", "subject"],
        value_sets: &[
            ("status", MEDICATION_REQUEST_STATUS),
            ("intent", REQUEST_INTENT),
        ],
    },
    ResourceRules {
        resource_type: "MedicationAdministration",
        required: &["status", "subject"],
        value_sets: &[(
            "status",
            &[
                "in-progress",
                "not-done",
                "on-hold",
                "completed",
                "entered-in-error",
                "stopped",
                "unknown",
            ],
        )],
    },
    ResourceRules {
        resource_type: "Medication",
        required: &[],
        value_sets: &[("status", &["active", "inactive", "entered-in-error"])],
    },
    ResourceRules {
        resource_type: "MedicationDispense",
        required: &["status"],
        value_sets: &[],
    },
    ResourceRules {
        resource_type: "MedicationStatement",
        required: &["status", "subject"],
        value_sets: &[],
    },
    ResourceRules {
        resource_type: "Observation",
        required: &["status", "code"],
        value_sets: &[("status", OBSERVATION_STATUS)],
    },
    ResourceRules {
        resource_type: "Condition",
        required: &["subject"],
        value_sets: &[],
    },
    ResourceRules {
        resource_type: "DiagnosticReport",
        required: &["status", "code"],
        value_sets: &[(
            "status",
            &[
                "registered",
                "partial",
                "preliminary",
                "final",
                "amended",
                "corrected",
                "appended",
                "cancelled",
                "entered-in-error",
                "unknown",
            ],
        )],
    },
    ResourceRules {
        resource_type: "ServiceRequest",
        required: &["status", "intent", "subject"],
        value_sets: &[
            (
                "status",
                &[
                    "draft",
                    "active",
                    "on-hold",
                    "revoked",
                    "completed",
                    "entered-in-error",
                    "unknown",
                ],
            ),
            ("intent", REQUEST_INTENT),
        ],
    },
    ResourceRules {
        resource_type: "Procedure",
        required: &["status", "subject"],
        value_sets: &[("status", EVENT_STATUS)],
    },
    ResourceRules {
        resource_type: "AllergyIntolerance",
        required: &["patient"],
        value_sets: &[("criticality", &["low", "high", "unable-to-assess"])],
    },
    ResourceRules {
        resource_type: "Encounter",
        required: &["status", "class"],
        value_sets: &[(
            "status",
            &[
                "planned",
                "arrived",
                "triaged",
                "in-progress",
                "onleave",
                "finished",
                "cancelled",
                "entered-in-error",
                "unknown",
            ],
        )],
    },
    ResourceRules {
        resource_type: "Goal",
        required: &["lifecycleStatus", "description", "subject"],
        value_sets: &[("lifecycleStatus", GOAL_LIFECYCLE_STATUS)],
    },
    ResourceRules {
        resource_type: "CareTeam",
        required: &[],
        value_sets: &[(
            "status",
            &["proposed", "active", "suspended", "inactive", "entered-in-error"],
        )],
    },
    ResourceRules {
        resource_type: "CarePlan",
        required: &["status", "intent", "subject"],
        value_sets: &[(
            "status",
            &[
                "draft",
                "active",
                "on-hold",
                "revoked",
                "completed",
                "entered-in-error",
                "unknown",
            ],
        )],
    },
    ResourceRules {
        resource_type: "Organization",
        required: &[],
        value_sets: &[],
    },
    ResourceRules {
        resource_type: "Location",
        required: &[],
        value_sets: &[(
            "status",
            &["active", "suspended", "inactive"],
        )],
    },
    ResourceRules {
        resource_type: "Device",
        required: &[],
        value_sets: &[(
            "status",
            &["active", "inactive", "entered-in-error", "unknown"],
        )],
    },
    ResourceRules {
        resource_type: "DeviceUseStatement",
        required: &["status", "subject", "device"],
        value_sets: &[(
            "status",
            &["active", "completed", "entered-in-error", "intended", "stopped", "on-hold"],
        )],
    },
    ResourceRules {
        resource_type: "Appointment",
        required: &["status", "participant"],
        value_sets: &[(
            "status",
            &[
                "proposed",
                "pending",
                "booked",
                "arrived",
                "fulfilled",
                "cancelled",
                "noshow",
                "entered-in-error",
                "checked-in",
                "waitlist",
            ],
        )],
    },
    ResourceRules {
        resource_type: "Coverage",
        required: &["status", "beneficiary", "payor"],
        value_sets: &[(
            "status",
            &["active", "cancelled", "draft", "entered-in-error"],
        )],
    },
    ResourceRules {
        resource_type: "Specimen",
        required: &[],
        value_sets: &[(
            "status",
            &["available", "unavailable", "unsatisfactory", "entered-in-error"],
        )],
    },
    ResourceRules {
        resource_type: "Immunization",
        required: &["status", "vaccineCode", "patient"],
        value_sets: &[("status", &["completed", "entered-in-error", "not-done"])],
    },
    ResourceRules {
        resource_type: "CommunicationRequest",
        required: &["status"],
        value_sets: &[(
            "status",
            &[
                "draft",
                "active",
                "on-hold",
                "revoked",
                "completed",
                "entered-in-error",
                "unknown",
            ],
        )],
    },
    ResourceRules {
        resource_type: "RiskAssessment",
        required: &["status", "subject"],
        value_sets: &[("status", OBSERVATION_STATUS)],
    },
    ResourceRules {
        resource_type: "ImagingStudy",
        required: &["status", "subject"],
        value_sets: &[(
            "status",
            &["registered", "available", "cancelled", "entered-in-error", "unknown"],
        )],
    },
    ResourceRules {
        resource_type: "Bundle",
        required: &["type"],
        value_sets: &[(
            "type",
            &[
                "document",
                "message",
                "transaction",
                "transaction-response",
                "batch",
                "batch-response",
                "history",
                "searchset",
                "collection",
            ],
        )],
    },
];

lazy_static! {
    /// `ResourceType/id` with a sensible id charset, `urn:uuid:...`, or an
    /// absolute http(s) URL.
    static ref LOCAL_REF: Regex =
        Regex::new(r"^[A-Z][A-Za-z]+/[A-Za-z0-9\-\.]{1,64}$").unwrap();
    static ref URN_UUID_REF: Regex = Regex::new(
        r"^urn:uuid:[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$"
    )
    .unwrap();
}

fn rules_for(resource_type: &str) -> Option<&'static ResourceRules> {
    RULES.iter().find(|r| r.resource_type == resource_type)
}

/// True when the string is a syntactically acceptable reference target.
pub fn is_valid_reference(reference: &str) -> bool {
    LOCAL_REF.is_match(reference)
        || URN_UUID_REF.is_match(reference)
        || reference.starts_with("http://")
        || reference.starts_with("https://")
}

/// Validate a single resource. Returns all issues found; an empty vec means
/// the resource passed every local check.
pub fn validate(resource_type: &str, resource: &Value) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    let Some(obj) = resource.as_object() else {
        issues.push(ValidationIssue::error(
            IssueCode::Structure,
            "Resource must be a JSON object".to_string(),
        ));
        return issues;
    };

    match obj.get("resourceType").and_then(|v| v.as_str()) {
        None => {
            issues.push(
                ValidationIssue::error(
                    IssueCode::Required,
                    "Resource must have a 'resourceType' field".to_string(),
                )
                .with_location(resource_type.to_string()),
            );
            return issues;
        }
        Some(rt) if rt != resource_type => {
            issues.push(
                ValidationIssue::error(
                    IssueCode::Invalid,
                    format!("resourceType is '{}' but '{}' was expected", rt, resource_type),
                )
                .with_location(format!("{}.resourceType", resource_type)),
            );
            return issues;
        }
        Some(_) => {}
    }

    let Some(rules) = rules_for(resource_type) else {
        issues.push(ValidationIssue::error(
            IssueCode::NotSupported,
            format!("Unknown resource type '{}'", resource_type),
        ));
        return issues;
    };

    for field in rules.required {
        let missing = match obj.get(*field) {
            None | Some(Value::Null) => true,
            Some(Value::Array(a)) => a.is_empty(),
            Some(Value::String(s)) => s.is_empty(),
            Some(_) => false,
        };
        if missing {
            issues.push(
                ValidationIssue::error(
                    IssueCode::Required,
                    format!("{}.{} is required", resource_type, field),
                )
                .with_location(format!("{}.{}", resource_type, field)),
            );
        }
    }

    for (field, allowed) in rules.value_sets {
        if let Some(value) = obj.get(*field).and_then(|v| v.as_str()) {
            if !allowed.contains(&value) {
                issues.push(
                    ValidationIssue::error(
                        IssueCode::Value,
                        format!(
                            "{}.{} value '{}' is not in the required value set",
                            resource_type, field, value
                        ),
                    )
                    .with_location(format!("{}.{}", resource_type, field)),
                );
            }
        }
    }

    check_references(resource, resource_type, &mut issues);

    issues
}

/// Recursive walk over the resource checking every `reference` property's
/// syntax. Arrays and nested objects are descended into.
fn check_references(value: &Value, path: &str, issues: &mut Vec<ValidationIssue>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let child_path = format!("{}.{}", path, key);
                if key == "reference" {
                    if let Some(s) = child.as_str() {
                        if !is_valid_reference(s) {
                            issues.push(
                                ValidationIssue::error(
                                    IssueCode::Invalid,
                                    format!("Malformed reference '{}'", s),
                                )
                                .with_location(child_path.clone()),
                            );
                        }
                    }
                }
                check_references(child, &child_path, issues);
            }
        }
        Value::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                check_references(item, &format!("{}[{}]", path, i), issues);
            }
        }
        _ => {}
    }
}

/// Validate every resource inside a bundle, prefixing issue locations with
/// the entry index. Used by the local fallback path.
pub fn validate_bundle(bundle: &Value) -> Vec<ValidationIssue> {
    let mut issues = validate("Bundle", bundle);

    if let Some(entries) = bundle.get("entry").and_then(|e| e.as_array()) {
        for (i, entry) in entries.iter().enumerate() {
            let Some(resource) = entry.get("resource") else {
                issues.push(
                    ValidationIssue::error(
                        IssueCode::Required,
                        "Bundle entry has no resource".to_string(),
                    )
                    .with_location(format!("Bundle.entry[{}]", i)),
                );
                continue;
            };
            let Some(rt) = resource.get("resourceType").and_then(|v| v.as_str()) else {
                issues.push(
                    ValidationIssue::error(
                        IssueCode::Required,
                        "Bundle entry resource has no resourceType".to_string(),
                    )
                    .with_location(format!("Bundle.entry[{}].resource", i)),
                );
                continue;
            };
            for issue in validate(rt, resource) {
                let location = match &issue.location {
                    Some(loc) => format!("Bundle.entry[{}].{}", i, loc),
                    None => format!("Bundle.entry[{}]", i),
                };
                issues.push(issue.with_location(location));
            }
        }
    }

    issues
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::IssueSeverity;
    use serde_json::json;

    #[test]
    fn test_missing_required_field() {
        let resource = json!({
            "resourceType": "MedicationRequest",
            "id": "medicationrequest-1",
            "status": "active",
            "intent": "order",
        });
        let issues = validate("MedicationRequest", &resource);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].code, IssueCode::Required);
        assert_eq!(
            issues[0].location.as_deref(),
            Some("MedicationRequest.subject")
        );
    }

    #[test]
    fn test_value_set_violation() {
        let resource = json!({
            "resourceType": "Patient",
            "id": "patient-1",
            "gender": "mostly-male",
        });
        let issues = validate("Patient", &resource);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].code, IssueCode::Value);
        assert_eq!(issues[0].severity, IssueSeverity::Error);
    }

    #[test]
    fn test_unknown_resource_type() {
        let resource = json!({ "resourceType": "Frobnicator" });
        let issues = validate("Frobnicator", &resource);
        assert!(issues
            .iter()
            .any(|i| i.code == IssueCode::NotSupported));
    }

    #[test]
    fn test_nested_reference_syntax() {
        let resource = json!({
            "resourceType": "Observation",
            "id": "observation-1",
            "status": "final",
            "code": {"text": "BP"},
            "subject": {"reference": "not a reference"},
        });
        let issues = validate("Observation", &resource);
        assert!(issues
            .iter()
            .any(|i| i.code == IssueCode::Invalid && i.diagnostics.contains("Malformed reference")));
    }

    #[test]
    fn test_valid_reference_forms() {
        assert!(is_valid_reference("Patient/patient-1f3a9c2d"));
        assert!(is_valid_reference(
            "urn:uuid:7c9e6679-7425-40de-944b-e07fc1f90ae7"
        ));
        assert!(is_valid_reference("https://example.org/fhir/Patient/1"));
        assert!(!is_valid_reference("patient 12"));
        assert!(!is_valid_reference("urn:uuid:NOT-A-UUID"));
    }

    #[test]
    fn test_clean_resource_passes() {
        let resource = json!({
            "resourceType": "MedicationRequest",
            "id": "medicationrequest-9a8b7c6d",
            "status": "active",
            "intent": "order",
            "subject": {"reference": "Patient/patient-1f3a9c2d"},
            "medicationCodeableConcept": {"text": "amoxicillin"},
        });
        assert!(validate("MedicationRequest", &resource).is_empty());
    }

    #[test]
    fn test_bundle_walk_prefixes_locations() {
        let bundle = json!({
            "resourceType": "Bundle",
            "type": "transaction",
            "entry": [
                {"resource": {"resourceType": "Patient", "gender": "nope"}},
            ],
        });
        let issues = validate_bundle(&bundle);
        assert_eq!(issues.len(), 1);
        assert!(issues[0]
            .location
            .as_deref()
            .unwrap()
            .starts_with("Bundle.entry[0]."));
    }
}
