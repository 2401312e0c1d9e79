//! Application services

pub mod conversion;
pub mod metrics;

pub use conversion::{ConversionService, ConvertRequest, ConvertResponse};
pub use metrics::MetricsService;
