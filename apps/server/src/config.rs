//! Configuration management for the conversion service

use std::net::SocketAddr;
use std::time::Duration;

use serde::Deserialize;

use funke_bundle::ValidatorConfig;
use funke_extract::{ConfidenceCheck, ExtractorConfig, GateConfig};
use funke_factory::FeatureFlags;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub extractor: ExtractorSection,
    #[serde(default)]
    pub validator: ValidatorSection,
    #[serde(default)]
    pub factories: FactoriesConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
    /// Maximum request body size in bytes.
    #[serde(default = "default_max_request_body_size")]
    pub max_request_body_size: usize,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ExtractorSection {
    #[serde(default)]
    pub llm: LlmConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    /// Weighted-confidence gate for tier-3 escalation.
    #[serde(default = "default_escalation_threshold")]
    pub escalation_threshold: f64,
    /// `weighted_average`, `minimum`, or `simple_average`.
    #[serde(default = "default_confidence_check")]
    pub confidence_check: String,
    /// Minimum expected entities for clinically indicative text.
    #[serde(default = "default_min_entities")]
    pub min_entities: usize,
    #[serde(default = "default_llm_timeout_seconds")]
    pub timeout_seconds: f64,
    #[serde(default = "default_max_calls_per_window")]
    pub max_calls_per_window: usize,
    #[serde(default = "default_window_seconds")]
    pub window_seconds: u64,
    /// Chat-completions endpoint; tier 3 is disabled when unset.
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default)]
    pub api_key: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            escalation_threshold: default_escalation_threshold(),
            confidence_check: default_confidence_check(),
            min_entities: default_min_entities(),
            timeout_seconds: default_llm_timeout_seconds(),
            max_calls_per_window: default_max_calls_per_window(),
            window_seconds: default_window_seconds(),
            endpoint: None,
            model: default_llm_model(),
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ValidatorSection {
    /// Ordered list of external FHIR validator base URLs.
    #[serde(default)]
    pub endpoints: Vec<String>,
    #[serde(default = "default_validator_timeout")]
    pub timeout_seconds: u64,
    #[serde(default = "default_validator_budget")]
    pub total_budget_seconds: u64,
}

impl Default for ValidatorSection {
    fn default() -> Self {
        Self {
            endpoints: Vec::new(),
            timeout_seconds: default_validator_timeout(),
            total_budget_seconds: default_validator_budget(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FactoriesConfig {
    #[serde(default = "default_true")]
    pub use_new_patient_factory: bool,
    #[serde(default = "default_true")]
    pub use_new_medication_factory: bool,
    #[serde(default = "default_true")]
    pub use_new_clinical_factory: bool,
    #[serde(default = "default_true")]
    pub use_new_care_factory: bool,
    #[serde(default = "default_true")]
    pub use_new_support_factory: bool,
}

impl Default for FactoriesConfig {
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

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Use JSON formatting for logs (recommended for production)
    #[serde(default)]
    pub json: bool,

    /// Enable file logging in addition to console
    #[serde(default)]
    pub file_enabled: bool,

    #[serde(default = "default_log_directory")]
    pub file_directory: String,

    #[serde(default = "default_log_file_prefix")]
    pub file_prefix: String,

    /// Log rotation: daily, hourly, minutely, never
    #[serde(default = "default_log_rotation")]
    pub file_rotation: String,

    /// Debug flag: when false (the default) raw clinical text never
    /// reaches the logs — only counts and categories do.
    #[serde(default)]
    pub log_clinical_text: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            file_enabled: false,
            file_directory: default_log_directory(),
            file_prefix: default_log_file_prefix(),
            file_rotation: default_log_rotation(),
            log_clinical_text: false,
        }
    }
}

// Default values
fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_cors_origins() -> Vec<String> {
    vec!["http://localhost:3000".to_string()]
}

fn default_max_request_body_size() -> usize {
    1024 * 1024 // 1 MB of order text is already generous
}

fn default_escalation_threshold() -> f64 {
    0.85
}

fn default_confidence_check() -> String {
    "weighted_average".to_string()
}

fn default_min_entities() -> usize {
    3
}

fn default_llm_timeout_seconds() -> f64 {
    2.5
}

fn default_max_calls_per_window() -> usize {
    50
}

fn default_window_seconds() -> u64 {
    60
}

fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_validator_timeout() -> u64 {
    5
}

fn default_validator_budget() -> u64 {
    10
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_directory() -> String {
    "./logs".to_string()
}

fn default_log_file_prefix() -> String {
    "nlfhir-server".to_string()
}

fn default_log_rotation() -> String {
    "daily".to_string()
}

impl Config {
    /// Load configuration from defaults, an optional `config` file, and
    /// `NLFHIR__`-prefixed environment variables.
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .set_default("server.host", default_host())?
            .set_default("server.port", default_port())?
            .set_default(
                "server.max_request_body_size",
                default_max_request_body_size() as i64,
            )?
            .set_default(
                "extractor.llm.escalation_threshold",
                default_escalation_threshold(),
            )?
            .set_default("extractor.llm.confidence_check", default_confidence_check())?
            .set_default("extractor.llm.min_entities", default_min_entities() as i64)?
            .set_default(
                "extractor.llm.timeout_seconds",
                default_llm_timeout_seconds(),
            )?
            .set_default(
                "extractor.llm.max_calls_per_window",
                default_max_calls_per_window() as i64,
            )?
            .set_default("extractor.llm.window_seconds", default_window_seconds() as i64)?
            .set_default("extractor.llm.model", default_llm_model())?
            .set_default("validator.timeout_seconds", default_validator_timeout() as i64)?
            .set_default(
                "validator.total_budget_seconds",
                default_validator_budget() as i64,
            )?
            .set_default("factories.use_new_patient_factory", true)?
            .set_default("factories.use_new_medication_factory", true)?
            .set_default("factories.use_new_clinical_factory", true)?
            .set_default("factories.use_new_care_factory", true)?
            .set_default("factories.use_new_support_factory", true)?
            .set_default("logging.level", default_log_level())?
            .set_default("logging.json", false)?
            .set_default("logging.file_enabled", false)?
            .set_default("logging.file_directory", default_log_directory())?
            .set_default("logging.file_prefix", default_log_file_prefix())?
            .set_default("logging.file_rotation", default_log_rotation())?
            .set_default("logging.log_clinical_text", false)?
            .add_source(config::File::with_name("config").required(false))
            // NLFHIR__VALIDATOR__ENDPOINTS=https://a,https://b
            .add_source(
                config::Environment::with_prefix("NLFHIR")
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("validator.endpoints")
                    .with_list_parse_key("server.cors_origins")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }

    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        let addr = format!("{}:{}", self.server.host, self.server.port);
        Ok(addr.parse()?)
    }

    /// Validate configuration before startup.
    pub fn validate(&self) -> Result<(), String> {
        let llm = &self.extractor.llm;
        if !(0.0..=1.0).contains(&llm.escalation_threshold) {
            return Err("extractor.llm.escalation_threshold must be within [0, 1]".to_string());
        }
        if self.parse_confidence_check().is_none() {
            return Err(format!(
                "extractor.llm.confidence_check '{}' is not one of weighted_average, minimum, simple_average",
                llm.confidence_check
            ));
        }
        if llm.timeout_seconds <= 0.0 {
            return Err("extractor.llm.timeout_seconds must be > 0".to_string());
        }
        if llm.window_seconds == 0 {
            return Err("extractor.llm.window_seconds must be > 0".to_string());
        }
        if self.validator.timeout_seconds == 0 {
            return Err("validator.timeout_seconds must be > 0".to_string());
        }
        if self.validator.total_budget_seconds < self.validator.timeout_seconds {
            return Err(
                "validator.total_budget_seconds must be >= validator.timeout_seconds".to_string(),
            );
        }
        Ok(())
    }

    fn parse_confidence_check(&self) -> Option<ConfidenceCheck> {
        match self.extractor.llm.confidence_check.as_str() {
            "weighted_average" => Some(ConfidenceCheck::WeightedAverage),
            "minimum" => Some(ConfidenceCheck::Minimum),
            "simple_average" => Some(ConfidenceCheck::SimpleAverage),
            _ => None,
        }
    }

    pub fn extractor_config(&self) -> ExtractorConfig {
        let llm = &self.extractor.llm;
        ExtractorConfig {
            gate: GateConfig {
                threshold: llm.escalation_threshold,
                check: self
                    .parse_confidence_check()
                    .unwrap_or(ConfidenceCheck::WeightedAverage),
                min_entities: llm.min_entities,
            },
            max_llm_calls_per_window: llm.max_calls_per_window,
            llm_window: Duration::from_secs(llm.window_seconds),
        }
    }

    pub fn llm_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.extractor.llm.timeout_seconds)
    }

    pub fn validator_config(&self) -> ValidatorConfig {
        ValidatorConfig {
            endpoints: self.validator.endpoints.clone(),
            timeout: Duration::from_secs(self.validator.timeout_seconds),
            total_budget: Duration::from_secs(self.validator.total_budget_seconds),
        }
    }

    /// Feature flags are read once per request through this snapshot.
    pub fn feature_flags(&self) -> FeatureFlags {
        FeatureFlags {
            use_new_patient_factory: self.factories.use_new_patient_factory,
            use_new_medication_factory: self.factories.use_new_medication_factory,
            use_new_clinical_factory: self.factories.use_new_clinical_factory,
            use_new_care_factory: self.factories.use_new_care_factory,
            use_new_support_factory: self.factories.use_new_support_factory,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: default_host(),
                port: default_port(),
                cors_origins: default_cors_origins(),
                max_request_body_size: default_max_request_body_size(),
            },
            extractor: ExtractorSection::default(),
            validator: ValidatorSection::default(),
            factories: FactoriesConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.extractor.llm.escalation_threshold, 0.85);
        assert_eq!(config.extractor.llm.min_entities, 3);
        assert_eq!(config.validator.timeout_seconds, 5);
    }

    #[test]
    fn test_threshold_bounds_checked() {
        let mut config = Config::default();
        config.extractor.llm.escalation_threshold = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_confidence_check_enumerated() {
        let mut config = Config::default();
        config.extractor.llm.confidence_check = "vibes".to_string();
        assert!(config.validate().is_err());

        config.extractor.llm.confidence_check = "minimum".to_string();
        assert!(config.validate().is_ok());
        assert_eq!(
            config.extractor_config().gate.check,
            ConfidenceCheck::Minimum
        );
    }

    #[test]
    fn test_budget_must_cover_single_call() {
        let mut config = Config::default();
        config.validator.timeout_seconds = 10;
        config.validator.total_budget_seconds = 5;
        assert!(config.validate().is_err());
    }
}
