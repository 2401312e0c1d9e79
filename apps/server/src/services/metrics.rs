//! Prometheus metrics for the conversion pipeline.

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_histogram, register_int_counter, CounterVec, Histogram,
    IntCounter, TextEncoder,
};

lazy_static! {
    pub static ref CONVERT_REQUESTS: IntCounter = register_int_counter!(
        "nlfhir_convert_requests_total",
        "Total conversion requests received"
    )
    .unwrap();
    pub static ref CONVERT_DURATION: Histogram = register_histogram!(
        "nlfhir_convert_duration_seconds",
        "End-to-end conversion latency",
        vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.0, 5.0]
    )
    .unwrap();
    pub static ref TIER_REACHED: CounterVec = register_counter_vec!(
        "nlfhir_extraction_tier_reached_total",
        "Highest extraction tier that contributed to a result",
        &["tier"]
    )
    .unwrap();
    pub static ref VALIDATION_OUTCOMES: CounterVec = register_counter_vec!(
        "nlfhir_validation_outcomes_total",
        "Validation outcomes by status",
        &["status"]
    )
    .unwrap();
    pub static ref SAFETY_ALERTS: IntCounter = register_int_counter!(
        "nlfhir_safety_alerts_total",
        "Medication-allergy safety alerts raised"
    )
    .unwrap();
}

/// Renders the process metrics in Prometheus text exposition format.
#[derive(Debug, Default)]
pub struct MetricsService;

impl MetricsService {
    pub fn new() -> Self {
        Self
    }

    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        encoder
            .encode_to_string(&prometheus::gather())
            .unwrap_or_default()
    }
}
