//! Conversion service library
//!
//! Wires the pipeline crates — extractor, factory registry, bundle
//! assembler/validator — behind an axum HTTP surface. The binary entry
//! point is `src/main.rs`; integration tests drive [`api::create_router`]
//! directly.

pub mod api;
pub mod config;
pub mod error;
pub mod logging;
pub mod services;
pub mod state;

pub use error::{Error, Result};
