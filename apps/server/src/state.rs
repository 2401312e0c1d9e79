//! Shared application state

use std::sync::Arc;

use funke_bundle::BundleValidator;
use funke_extract::{Extractor, HttpLlmClient, LlmClient};
use funke_factory::FactoryRegistry;
use funke_terminology::TerminologyIndex;

use crate::config::Config;
use crate::services::{ConversionService, MetricsService};

/// Shared application state passed to all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub conversion: Arc<ConversionService>,
    pub validator: Arc<BundleValidator>,
    pub metrics: Arc<MetricsService>,
}

impl AppState {
    /// Initialize the application state. All shared pieces are built once
    /// here; per-request state lives in the conversion service.
    pub fn new(config: Config) -> Self {
        let config = Arc::new(config);
        let terminology = Arc::new(TerminologyIndex::new());

        let llm: Option<Arc<dyn LlmClient>> =
            config.extractor.llm.endpoint.as_ref().map(|endpoint| {
                tracing::info!(%endpoint, model = %config.extractor.llm.model, "tier-3 LLM enabled");
                Arc::new(HttpLlmClient::new(
                    endpoint.clone(),
                    config.extractor.llm.model.clone(),
                    config.extractor.llm.api_key.clone(),
                    config.llm_timeout(),
                )) as Arc<dyn LlmClient>
            });
        if llm.is_none() {
            tracing::info!("no LLM endpoint configured; extraction runs tiers 1-2 only");
        }

        let extractor = Arc::new(Extractor::new(
            terminology.clone(),
            llm,
            config.extractor_config(),
        ));
        let registry = Arc::new(FactoryRegistry::new());
        let validator = Arc::new(BundleValidator::new(config.validator_config()));

        let conversion = Arc::new(ConversionService::new(
            config.clone(),
            extractor,
            registry,
            terminology,
            validator.clone(),
        ));

        Self {
            config,
            conversion,
            validator,
            metrics: Arc::new(MetricsService::new()),
        }
    }
}
