//! Transaction bundle assembly and validation
//!
//! [`assemble`] turns the factory layer's `{resource_type: [resources]}`
//! mapping into a FHIR R4 transaction bundle: dependency-tiered ordering,
//! `urn:uuid` fullUrl minting, recursive reference rewriting, and UTC
//! metadata. [`BundleValidator`] submits the bundle to external FHIR
//! validators with ordered failover and degrades to local structural
//! validation when every endpoint is unreachable.

mod assembler;
mod summary;
mod validator;

pub use assembler::{assemble, Bundle};
pub use summary::{summarize, BundleSummary};
pub use validator::{
    BundleValidator, OutcomeIssue, ValidationOutcome, ValidatorConfig, LOCAL_FALLBACK_ENDPOINT,
};
