//! Shared FHIR R4 services used across the conversion pipeline
//!
//! This crate carries the pieces every other layer leans on:
//!
//! - [`ValidationIssue`] / [`IssueSeverity`] / [`IssueCode`] — the issue
//!   model used by local structural checks and by validation outcomes
//! - [`schema`] — local structural validation against a bounded rule table
//!   (required fields, known value sets, reference syntax)
//! - [`ReferenceManager`] — id minting and the `ResourceType/id → fullUrl`
//!   registry consumed by bundle assembly
//! - [`datatypes`] — constructors for the common FHIR datatypes the
//!   factories emit (CodeableConcept, Quantity, Reference)

pub mod datatypes;
mod issue;
mod reference;
pub mod schema;

pub use issue::{IssueCode, IssueSeverity, ValidationIssue};
pub use reference::ReferenceManager;
