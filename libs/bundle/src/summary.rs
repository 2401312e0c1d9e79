//! Bundle summary diagnostics, populated even when validation fails.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleSummary {
    pub bundle_id: String,
    pub bundle_type: String,
    pub total_entries: usize,
    /// Count per resource type, stably ordered.
    pub resource_counts: BTreeMap<String, usize>,
    pub estimated_size_bytes: usize,
    pub timestamp: String,
    pub has_meta: bool,
    /// Medication–allergy alerts raised during factory work (JSON form of
    /// the factory layer's alert records).
    #[serde(default)]
    pub safety_alerts: Vec<Value>,
}

pub fn summarize(bundle: &Value, safety_alerts: Vec<Value>) -> BundleSummary {
    let entries = bundle
        .get("entry")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();

    let mut resource_counts: BTreeMap<String, usize> = BTreeMap::new();
    let mut has_meta = false;
    for entry in &entries {
        if let Some(rt) = entry
            .get("resource")
            .and_then(|r| r.get("resourceType"))
            .and_then(|v| v.as_str())
        {
            *resource_counts.entry(rt.to_string()).or_default() += 1;
        }
        if entry
            .get("resource")
            .and_then(|r| r.get("meta"))
            .is_some()
        {
            has_meta = true;
        }
    }

    BundleSummary {
        bundle_id: bundle
            .get("id")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string(),
        bundle_type: bundle
            .get("type")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string(),
        total_entries: entries.len(),
        resource_counts,
        estimated_size_bytes: serde_json::to_string(bundle).map(|s| s.len()).unwrap_or(0),
        timestamp: bundle
            .get("timestamp")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string(),
        has_meta,
        safety_alerts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_summary_counts_and_size() {
        let bundle = json!({
            "resourceType": "Bundle",
            "id": "bundle-xyz",
            "type": "transaction",
            "timestamp": "2026-08-01T12:00:00Z",
            "entry": [
                { "fullUrl": "urn:uuid:a", "resource": { "resourceType": "Patient", "id": "p" } },
                { "fullUrl": "urn:uuid:b", "resource": { "resourceType": "Observation", "id": "o1" } },
                { "fullUrl": "urn:uuid:c", "resource": { "resourceType": "Observation", "id": "o2" } },
            ],
        });

        let summary = summarize(&bundle, vec![]);
        assert_eq!(summary.bundle_id, "bundle-xyz");
        assert_eq!(summary.bundle_type, "transaction");
        assert_eq!(summary.total_entries, 3);
        assert_eq!(summary.resource_counts["Observation"], 2);
        assert_eq!(summary.resource_counts["Patient"], 1);
        assert!(summary.estimated_size_bytes > 0);
        assert!(!summary.has_meta);
    }

    #[test]
    fn test_summary_detects_meta_and_alerts() {
        let bundle = json!({
            "resourceType": "Bundle",
            "id": "bundle-abc",
            "type": "transaction",
            "entry": [
                { "fullUrl": "urn:uuid:a", "resource": {
                    "resourceType": "MedicationRequest",
                    "id": "m",
                    "meta": { "tag": [{ "code": "medication-allergy" }] },
                } },
            ],
        });
        let alerts = vec![json!({ "severity": "high", "medication": "amoxicillin" })];
        let summary = summarize(&bundle, alerts);
        assert!(summary.has_meta);
        assert_eq!(summary.safety_alerts.len(), 1);
    }

    #[test]
    fn test_empty_bundle_summary() {
        let summary = summarize(&json!({ "resourceType": "Bundle", "type": "transaction" }), vec![]);
        assert_eq!(summary.total_entries, 0);
        assert!(summary.resource_counts.is_empty());
    }
}
