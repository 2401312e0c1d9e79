//! FHIR resource factory registry
//!
//! Maps extracted entities to FHIR R4 resources through per-domain
//! factories behind one interface: `supports` + `create`. Dispatch is a
//! tagged table (resource type → domain factory), not an inheritance
//! hierarchy; factories are lazily-instantiated process singletons.
//!
//! Every `create` runs the same template: validate the input contract,
//! mint an id, build the resource as a typed map, run local structural
//! validation, return. A factory never emits a partially-constructed
//! resource.

mod care;
mod clinical;
mod context;
mod medication;
mod patient;
mod support;

pub use context::{FactoryContext, PatientAllergy, SafetyAlert};

use std::sync::{Arc, OnceLock};

use serde_json::{Map, Value};

use funke_fhir_common::{schema, ValidationIssue};

#[derive(Debug, thiserror::Error)]
pub enum FactoryError {
    #[error("{resource_type} input is missing required key '{key}'")]
    MissingInput {
        resource_type: &'static str,
        key: &'static str,
    },
    #[error("{resource_type} input key '{key}' is invalid: {reason}")]
    InvalidInput {
        resource_type: &'static str,
        key: &'static str,
        reason: String,
    },
    #[error("no factory supports resource type '{0}'")]
    UnsupportedType(String),
    #[error("{resource_type} failed structural validation: {summary}")]
    SchemaInvalid {
        resource_type: String,
        summary: String,
        issues: Vec<ValidationIssue>,
    },
}

/// The one factory interface. `create` receives the raw input map and the
/// per-request context.
pub trait ResourceFactory: Send + Sync {
    fn supports(&self, resource_type: &str) -> bool;

    fn create(
        &self,
        resource_type: &str,
        data: &Map<String, Value>,
        ctx: &FactoryContext,
    ) -> Result<Value, FactoryError>;
}

/// Per-factory feature flags. Read once per request; an `false` flag routes
/// the request to the legacy implementation for that domain.
#[derive(Debug, Clone, Copy)]
pub struct FeatureFlags {
    pub use_new_patient_factory: bool,
    pub use_new_medication_factory: bool,
    pub use_new_clinical_factory: bool,
    pub use_new_care_factory: bool,
    pub use_new_support_factory: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            use_new_patient_factory: true,
            use_new_medication_factory: true,
            use_new_clinical_factory: true,
            use_new_care_factory: true,
            use_new_support_factory: true,
        }
    }
}

/// Clinical domain groups; each owns one factory singleton.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Domain {
    Person,
    Medication,
    Clinical,
    Care,
    Support,
}

impl Domain {
    fn for_resource_type(resource_type: &str) -> Option<Self> {
        match resource_type {
            "Patient" | "Practitioner" | "PractitionerRole" | "Person" => Some(Self::Person),
            "MedicationRequest" | "MedicationAdministration" | "Medication"
            | "MedicationDispense" | "MedicationStatement" => Some(Self::Medication),
            "Observation" | "Condition" | "DiagnosticReport" | "ServiceRequest" | "Procedure"
            | "AllergyIntolerance" => Some(Self::Clinical),
            "Encounter" | "Goal" | "CareTeam" | "CarePlan" => Some(Self::Care),
            "Organization" | "Location" | "Device" | "DeviceUseStatement" | "Appointment"
            | "Coverage" | "Specimen" | "RelatedPerson" | "Immunization"
            | "CommunicationRequest" | "RiskAssessment" | "ImagingStudy" => Some(Self::Support),
            _ => None,
        }
    }

    fn enabled(&self, flags: &FeatureFlags) -> bool {
        match self {
            Self::Person => flags.use_new_patient_factory,
            Self::Medication => flags.use_new_medication_factory,
            Self::Clinical => flags.use_new_clinical_factory,
            Self::Care => flags.use_new_care_factory,
            Self::Support => flags.use_new_support_factory,
        }
    }
}

/// Process-wide registry of lazily-instantiated factory singletons.
#[derive(Default)]
pub struct FactoryRegistry {
    person: OnceLock<Arc<dyn ResourceFactory>>,
    medication: OnceLock<Arc<dyn ResourceFactory>>,
    clinical: OnceLock<Arc<dyn ResourceFactory>>,
    care: OnceLock<Arc<dyn ResourceFactory>>,
    support: OnceLock<Arc<dyn ResourceFactory>>,
    legacy: OnceLock<Arc<dyn ResourceFactory>>,
}

impl FactoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve the factory for a resource type, honouring the per-request
    /// feature flags.
    pub fn get_factory(
        &self,
        resource_type: &str,
        flags: &FeatureFlags,
    ) -> Result<Arc<dyn ResourceFactory>, FactoryError> {
        let domain = Domain::for_resource_type(resource_type)
            .ok_or_else(|| FactoryError::UnsupportedType(resource_type.to_string()))?;

        if !domain.enabled(flags) {
            tracing::debug!(resource_type, "feature flag off, routing to legacy factory");
            return Ok(self
                .legacy
                .get_or_init(|| Arc::new(LegacyFactory))
                .clone());
        }

        let factory = match domain {
            Domain::Person => self
                .person
                .get_or_init(|| Arc::new(patient::PersonFactory)),
            Domain::Medication => self
                .medication
                .get_or_init(|| Arc::new(medication::MedicationFamilyFactory)),
            Domain::Clinical => self
                .clinical
                .get_or_init(|| Arc::new(clinical::ClinicalFactory)),
            Domain::Care => self.care.get_or_init(|| Arc::new(care::CareFactory)),
            Domain::Support => self
                .support
                .get_or_init(|| Arc::new(support::SupportFactory)),
        };
        Ok(factory.clone())
    }

    /// Convenience wrapper: resolve and create in one step.
    pub fn create(
        &self,
        resource_type: &str,
        data: &Map<String, Value>,
        ctx: &FactoryContext,
    ) -> Result<Value, FactoryError> {
        self.get_factory(resource_type, &ctx.flags)?
            .create(resource_type, data, ctx)
    }
}

/// The pre-registry implementation, kept behind the feature flags. Same
/// contract, minimal behaviour: it copies the input through with a minted
/// id and no domain normalization.
struct LegacyFactory;

impl ResourceFactory for LegacyFactory {
    fn supports(&self, resource_type: &str) -> bool {
        Domain::for_resource_type(resource_type).is_some()
    }

    fn create(
        &self,
        resource_type: &str,
        data: &Map<String, Value>,
        ctx: &FactoryContext,
    ) -> Result<Value, FactoryError> {
        let mut resource = Map::new();
        resource.insert("resourceType".to_string(), Value::String(resource_type.to_string()));
        resource.insert(
            "id".to_string(),
            Value::String(ctx.references.mint_id(resource_type)),
        );
        for (key, value) in data {
            // Passthrough of already-FHIR-shaped keys only
            if key.chars().next().is_some_and(|c| c.is_ascii_lowercase()) {
                resource.insert(key.clone(), value.clone());
            }
        }
        Ok(Value::Object(resource))
    }
}

// ---------------------------------------------------------------------------
// Shared template-method helpers used by every domain factory
// ---------------------------------------------------------------------------

/// Step 1 of the template: required input keys must be present and
/// non-empty.
pub(crate) fn require_keys(
    resource_type: &'static str,
    data: &Map<String, Value>,
    keys: &[&'static str],
) -> Result<(), FactoryError> {
    for key in keys {
        let present = match data.get(*key) {
            None | Some(Value::Null) => false,
            Some(Value::String(s)) => !s.trim().is_empty(),
            Some(Value::Array(a)) => !a.is_empty(),
            Some(_) => true,
        };
        if !present {
            return Err(FactoryError::MissingInput { resource_type, key });
        }
    }
    Ok(())
}

/// Final template step: local structural validation. Blocking issues turn
/// the build into an error so no partial resource escapes.
pub(crate) fn finalize(resource_type: &str, resource: Value) -> Result<Value, FactoryError> {
    let issues = schema::validate(resource_type, &resource);
    if issues.iter().any(|i| i.is_blocking()) {
        let summary = issues
            .iter()
            .filter(|i| i.is_blocking())
            .map(|i| i.diagnostics.clone())
            .collect::<Vec<_>>()
            .join("; ");
        return Err(FactoryError::SchemaInvalid {
            resource_type: resource_type.to_string(),
            summary,
            issues,
        });
    }
    Ok(resource)
}

/// Input accessor: string field under any of the given keys.
pub(crate) fn str_field<'a>(data: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .find_map(|k| data.get(*k))
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
}
