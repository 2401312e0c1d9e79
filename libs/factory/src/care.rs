//! Care-coordination factory: Encounter, Goal, CareTeam, CarePlan.

use serde_json::{json, Map, Value};

use funke_fhir_common::datatypes::{codeable_concept, reference_obj, text_concept};

use crate::{finalize, require_keys, str_field, FactoryContext, FactoryError, ResourceFactory};

const GOAL_CATEGORY: &str = "http://terminology.hl7.org/CodeSystem/goal-category";
const ACT_CODE: &str = "http://terminology.hl7.org/CodeSystem/v3-ActCode";

/// Lifecycle-status aliases accepted on input.
fn normalize_lifecycle_status(raw: &str) -> &'static str {
    match raw.trim().to_lowercase().as_str() {
        "proposed" | "pending" => "proposed",
        "planned" => "planned",
        "accepted" => "accepted",
        "active" | "in-progress" | "in progress" => "active",
        "on-hold" | "on hold" => "on-hold",
        "completed" | "finished" | "done" => "completed",
        "cancelled" | "canceled" | "stopped" => "cancelled",
        "rejected" => "rejected",
        _ => "active",
    }
}

/// Infer a goal category from description keywords.
fn infer_goal_category(description: &str) -> Option<(&'static str, &'static str)> {
    let lower = description.to_lowercase();
    if ["diet", "nutrition", "weight", "meal"].iter().any(|k| lower.contains(k)) {
        Some(("dietary", "Dietary"))
    } else if ["fall", "safety", "injury"].iter().any(|k| lower.contains(k)) {
        Some(("safety", "Safety"))
    } else if ["smoking", "alcohol", "behavior", "behaviour", "adherence"]
        .iter()
        .any(|k| lower.contains(k))
    {
        Some(("behavioral", "Behavioral"))
    } else if ["wound", "dressing", "nursing"].iter().any(|k| lower.contains(k)) {
        Some(("nursing", "Nursing"))
    } else if ["exercise", "mobility", "ambulate", "physical therapy", "physiotherapy"]
        .iter()
        .any(|k| lower.contains(k))
    {
        Some(("physiotherapy", "Physiotherapy"))
    } else {
        None
    }
}

pub struct CareFactory;

impl ResourceFactory for CareFactory {
    fn supports(&self, resource_type: &str) -> bool {
        matches!(resource_type, "Encounter" | "Goal" | "CareTeam" | "CarePlan")
    }

    fn create(
        &self,
        resource_type: &str,
        data: &Map<String, Value>,
        ctx: &FactoryContext,
    ) -> Result<Value, FactoryError> {
        match resource_type {
            "Encounter" => self.build_encounter(data, ctx),
            "Goal" => self.build_goal(data, ctx),
            "CareTeam" => self.build_care_team(data, ctx),
            "CarePlan" => self.build_care_plan(data, ctx),
            other => Err(FactoryError::UnsupportedType(other.to_string())),
        }
    }
}

impl CareFactory {
    fn build_encounter(
        &self,
        data: &Map<String, Value>,
        ctx: &FactoryContext,
    ) -> Result<Value, FactoryError> {
        let mut encounter = Map::new();
        encounter.insert("resourceType".to_string(), json!("Encounter"));
        encounter.insert("id".to_string(), json!(ctx.references.mint_id("Encounter")));
        encounter.insert(
            "status".to_string(),
            json!(str_field(data, &["status"]).unwrap_or("in-progress")),
        );

        let (class_code, class_display) = match str_field(data, &["class"]) {
            Some("inpatient") | Some("IMP") => ("IMP", "inpatient encounter"),
            Some("emergency") | Some("EMER") => ("EMER", "emergency"),
            Some("virtual") | Some("VR") => ("VR", "virtual"),
            _ => ("AMB", "ambulatory"),
        };
        encounter.insert(
            "class".to_string(),
            json!({ "system": ACT_CODE, "code": class_code, "display": class_display }),
        );

        if let Some(subject) = str_field(data, &["patient_ref", "subject"]) {
            encounter.insert("subject".to_string(), reference_obj(subject));
        }
        if let Some(reason) = str_field(data, &["reason"]) {
            encounter.insert("reasonCode".to_string(), json!([text_concept(reason)]));
        }
        finalize("Encounter", Value::Object(encounter))
    }

    fn build_goal(
        &self,
        data: &Map<String, Value>,
        ctx: &FactoryContext,
    ) -> Result<Value, FactoryError> {
        require_keys("Goal", data, &["description"])?;
        let description = str_field(data, &["description"]).unwrap_or_default();

        let mut goal = Map::new();
        goal.insert("resourceType".to_string(), json!("Goal"));
        goal.insert("id".to_string(), json!(ctx.references.mint_id("Goal")));
        goal.insert(
            "lifecycleStatus".to_string(),
            json!(normalize_lifecycle_status(
                str_field(data, &["lifecycle_status", "status"]).unwrap_or("active")
            )),
        );
        goal.insert("description".to_string(), text_concept(description));
        goal.insert(
            "subject".to_string(),
            reference_obj(str_field(data, &["patient_ref", "subject"]).unwrap_or("Patient/unknown")),
        );

        if let Some((code, display)) = infer_goal_category(description) {
            goal.insert(
                "category".to_string(),
                json!([codeable_concept(GOAL_CATEGORY, code, display, None)]),
            );
        }

        if let Some(target) = self.build_target(data) {
            goal.insert("target".to_string(), json!([target]));
        }

        if let Some(Value::Array(addresses)) = data.get("addresses") {
            goal.insert(
                "addresses".to_string(),
                Value::Array(
                    addresses
                        .iter()
                        .filter_map(|a| a.as_str())
                        .map(reference_obj)
                        .collect(),
                ),
            );
        }

        finalize("Goal", Value::Object(goal))
    }

    /// Target as a quantity (`target_value` + `target_unit`) or a range
    /// (`target_low`/`target_high`), with an optional due date.
    fn build_target(&self, data: &Map<String, Value>) -> Option<Value> {
        let mut target = Map::new();
        let unit = str_field(data, &["target_unit"]).unwrap_or("1");

        if let Some(value) = data.get("target_value").and_then(|v| v.as_f64()) {
            target.insert(
                "detailQuantity".to_string(),
                json!({ "value": value, "unit": unit }),
            );
        } else {
            let low = data.get("target_low").and_then(|v| v.as_f64());
            let high = data.get("target_high").and_then(|v| v.as_f64());
            if low.is_some() || high.is_some() {
                let mut range = Map::new();
                if let Some(low) = low {
                    range.insert("low".to_string(), json!({ "value": low, "unit": unit }));
                }
                if let Some(high) = high {
                    range.insert("high".to_string(), json!({ "value": high, "unit": unit }));
                }
                target.insert("detailRange".to_string(), Value::Object(range));
            }
        }

        if let Some(due) = str_field(data, &["due_date", "due"]) {
            target.insert("dueDate".to_string(), json!(due));
        }

        (!target.is_empty()).then_some(Value::Object(target))
    }

    fn build_care_team(
        &self,
        data: &Map<String, Value>,
        ctx: &FactoryContext,
    ) -> Result<Value, FactoryError> {
        let mut team = Map::new();
        team.insert("resourceType".to_string(), json!("CareTeam"));
        team.insert("id".to_string(), json!(ctx.references.mint_id("CareTeam")));
        team.insert(
            "status".to_string(),
            json!(str_field(data, &["status"]).unwrap_or("active")),
        );
        if let Some(name) = str_field(data, &["name"]) {
            team.insert("name".to_string(), json!(name));
        }
        if let Some(subject) = str_field(data, &["patient_ref", "subject"]) {
            team.insert("subject".to_string(), reference_obj(subject));
        }
        if let Some(Value::Array(members)) = data.get("participant_refs") {
            team.insert(
                "participant".to_string(),
                Value::Array(
                    members
                        .iter()
                        .filter_map(|m| m.as_str())
                        .map(|m| json!({ "member": reference_obj(m) }))
                        .collect(),
                ),
            );
        }
        finalize("CareTeam", Value::Object(team))
    }

    fn build_care_plan(
        &self,
        data: &Map<String, Value>,
        ctx: &FactoryContext,
    ) -> Result<Value, FactoryError> {
        let mut plan = Map::new();
        plan.insert("resourceType".to_string(), json!("CarePlan"));
        plan.insert("id".to_string(), json!(ctx.references.mint_id("CarePlan")));
        plan.insert(
            "status".to_string(),
            json!(str_field(data, &["status"]).unwrap_or("active")),
        );
        plan.insert(
            "intent".to_string(),
            json!(str_field(data, &["intent"]).unwrap_or("plan")),
        );
        plan.insert(
            "subject".to_string(),
            reference_obj(str_field(data, &["patient_ref", "subject"]).unwrap_or("Patient/unknown")),
        );
        if let Some(title) = str_field(data, &["title", "description"]) {
            plan.insert("title".to_string(), json!(title));
        }
        if let Some(Value::Array(goals)) = data.get("goal_refs") {
            plan.insert(
                "goal".to_string(),
                Value::Array(
                    goals
                        .iter()
                        .filter_map(|g| g.as_str())
                        .map(reference_obj)
                        .collect(),
                ),
            );
        }
        if let Some(Value::Array(addresses)) = data.get("addresses") {
            plan.insert(
                "addresses".to_string(),
                Value::Array(
                    addresses
                        .iter()
                        .filter_map(|a| a.as_str())
                        .map(reference_obj)
                        .collect(),
                ),
            );
        }
        finalize("CarePlan", Value::Object(plan))
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
        CareFactory.create(resource_type, data.as_object().unwrap(), &ctx())
    }

    #[test]
    fn test_lifecycle_aliases() {
        assert_eq!(normalize_lifecycle_status("in-progress"), "active");
        assert_eq!(normalize_lifecycle_status("finished"), "completed");
        assert_eq!(normalize_lifecycle_status("done"), "completed");
        assert_eq!(normalize_lifecycle_status("stopped"), "cancelled");
        assert_eq!(normalize_lifecycle_status("pending"), "proposed");
    }

    #[test]
    fn test_goal_category_inference() {
        assert_eq!(infer_goal_category("reduce sodium in diet").unwrap().0, "dietary");
        assert_eq!(infer_goal_category("prevent falls at home").unwrap().0, "safety");
        assert_eq!(infer_goal_category("smoking cessation").unwrap().0, "behavioral");
        assert_eq!(infer_goal_category("wound care teaching").unwrap().0, "nursing");
        assert_eq!(
            infer_goal_category("ambulate 100 feet daily").unwrap().0,
            "physiotherapy"
        );
        assert!(infer_goal_category("improve wellbeing").is_none());
    }

    #[test]
    fn test_goal_with_range_target_and_due_date() {
        let resource = create(
            "Goal",
            json!({
                "description": "maintain blood glucose in range",
                "lifecycle_status": "in-progress",
                "patient_ref": "Patient/p-1",
                "target_low": 80.0,
                "target_high": 130.0,
                "target_unit": "mg/dL",
                "due_date": "2026-12-31",
            }),
        )
        .unwrap();

        assert_eq!(resource["lifecycleStatus"], "active");
        let target = &resource["target"][0];
        assert_eq!(target["detailRange"]["low"]["value"], 80.0);
        assert_eq!(target["detailRange"]["high"]["value"], 130.0);
        assert_eq!(target["dueDate"], "2026-12-31");
    }

    #[test]
    fn test_goal_addresses_linkage() {
        let resource = create(
            "Goal",
            json!({
                "description": "control hypertension",
                "patient_ref": "Patient/p-1",
                "addresses": ["Condition/condition-1a2b3c4d"],
            }),
        )
        .unwrap();
        assert_eq!(
            resource["addresses"][0]["reference"],
            "Condition/condition-1a2b3c4d"
        );
    }

    #[test]
    fn test_encounter_defaults_to_ambulatory() {
        let resource = create("Encounter", json!({ "patient_ref": "Patient/p-1" })).unwrap();
        assert_eq!(resource["status"], "in-progress");
        assert_eq!(resource["class"]["code"], "AMB");
    }

    #[test]
    fn test_care_plan_goal_linkage() {
        let resource = create(
            "CarePlan",
            json!({
                "patient_ref": "Patient/p-1",
                "goal_refs": ["Goal/goal-1a2b3c4d"],
            }),
        )
        .unwrap();
        assert_eq!(resource["status"], "active");
        assert_eq!(resource["intent"], "plan");
        assert_eq!(resource["goal"][0]["reference"], "Goal/goal-1a2b3c4d");
    }
}
