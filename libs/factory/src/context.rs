//! Per-request factory context: id minting, terminology, documented
//! allergies, and the safety-alert sink.

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use funke_fhir_common::ReferenceManager;
use funke_terminology::{ConflictKind, TerminologyIndex};

use crate::FeatureFlags;

/// A documented allergy supplied with the conversion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientAllergy {
    pub substance: String,
    /// `low`, `high`, or `unable-to-assess`
    #[serde(default = "default_criticality")]
    pub criticality: String,
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_criticality() -> String {
    "low".to_string()
}

fn default_true() -> bool {
    true
}

/// A medication–allergy match. Informational: surfaced in bundle metadata,
/// never a hard failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyAlert {
    pub severity: String,
    pub medication: String,
    pub allergen: String,
    pub kind: ConflictKind,
    pub message: String,
}

/// Everything a factory needs for one request. Built by the orchestrator,
/// dropped when the response is shaped.
pub struct FactoryContext {
    pub request_id: String,
    pub references: Arc<ReferenceManager>,
    pub terminology: Arc<TerminologyIndex>,
    pub allergies: Vec<PatientAllergy>,
    pub flags: FeatureFlags,
    alerts: Mutex<Vec<SafetyAlert>>,
}

impl FactoryContext {
    pub fn new(
        request_id: impl Into<String>,
        references: Arc<ReferenceManager>,
        terminology: Arc<TerminologyIndex>,
        flags: FeatureFlags,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            references,
            terminology,
            allergies: Vec::new(),
            flags,
            alerts: Mutex::new(Vec::new()),
        }
    }

    pub fn with_allergies(mut self, allergies: Vec<PatientAllergy>) -> Self {
        self.allergies = allergies;
        self
    }

    pub fn push_alert(&self, alert: SafetyAlert) {
        tracing::warn!(
            request_id = %self.request_id,
            medication = %alert.medication,
            allergen = %alert.allergen,
            "medication-allergy safety alert"
        );
        self.alerts.lock().unwrap().push(alert);
    }

    /// Alerts accumulated so far (cloned; the sink keeps its contents).
    pub fn alerts(&self) -> Vec<SafetyAlert> {
        self.alerts.lock().unwrap().clone()
    }
}
