//! Tiered clinical NLP extractor
//!
//! Turns free-text clinical orders into a typed, confidence-scored entity
//! set through a cooperative cascade of three tiers:
//!
//! 1. **Lexicon engine** — terminology matching, abbreviation expansion,
//!    clinical-context detection (≈ sub-millisecond)
//! 2. **Pattern hierarchy** — curated regex families that add what the
//!    lexicon missed
//! 3. **LLM structured fallback** — schema-constrained extraction, cost-
//!    bounded and hard-timeboxed
//!
//! Escalation between tiers is decided by the deterministic sufficiency
//! gate, never by exceptions: a tier that fails internally contributes
//! nothing and leaves a diagnostic.

mod abbrev;
mod budget;
mod entity;
pub mod gate;
mod tier1;
mod tier2;
mod tier3;

pub use budget::EscalationWindow;
pub use entity::{
    ContextFlags, Entity, EntityCategory, EntitySource, ExtractionMetrics, ExtractionResult,
    NormalizedCode,
};
pub use gate::{ConfidenceCheck, GateConfig};
pub use tier3::{
    extraction_schema, flatten_extraction, HttpLlmClient, LlmClient, LlmError,
    StructuredExtraction, StructuredMedication,
};

use std::sync::Arc;
use std::time::{Duration, Instant};

use funke_terminology::TerminologyIndex;

use tier1::LexiconTier;
use tier2::PatternTier;

/// Extractor tuning; every field maps to a configuration option.
#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    pub gate: GateConfig,
    /// Sliding-window LLM cost control.
    pub max_llm_calls_per_window: usize,
    pub llm_window: Duration,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            gate: GateConfig::default(),
            max_llm_calls_per_window: 50,
            llm_window: Duration::from_secs(60),
        }
    }
}

/// The extractor. One instance per process; `extract` is `&self` and safe
/// to call from concurrent requests.
pub struct Extractor {
    tier1: LexiconTier,
    tier2: PatternTier,
    llm: Option<Arc<dyn LlmClient>>,
    window: EscalationWindow,
    config: ExtractorConfig,
}

impl Extractor {
    pub fn new(
        index: Arc<TerminologyIndex>,
        llm: Option<Arc<dyn LlmClient>>,
        config: ExtractorConfig,
    ) -> Self {
        Self {
            tier1: LexiconTier::new(index),
            tier2: PatternTier::new(),
            window: EscalationWindow::new(config.max_llm_calls_per_window, config.llm_window),
            llm,
            config,
        }
    }

    /// Extract entities from `text`. Never fails outward: internal errors
    /// produce an empty result with a diagnostic flag.
    pub async fn extract(&self, text: &str, request_id: &str) -> ExtractionResult {
        let mut metrics = ExtractionMetrics::default();

        // Tier 1
        let t1 = Instant::now();
        let mut entities = self.tier1.extract(text);
        metrics.tier1_ms = t1.elapsed().as_millis() as u64;
        metrics.tier_reached = 1;

        let reasons = gate::evaluate(text, &entities, &self.config.gate);
        if reasons.is_empty() {
            return self.finish(entities, metrics);
        }
        record_reasons(&mut metrics, &reasons);

        // Tier 2
        let t2 = Instant::now();
        let added = self.tier2.extract(text, &entities);
        metrics.tier2_ms = Some(t2.elapsed().as_millis() as u64);
        metrics.tier_reached = 2;
        entities.extend(added);

        let reasons = gate::evaluate(text, &entities, &self.config.gate);
        if reasons.is_empty() {
            return self.finish(entities, metrics);
        }
        record_reasons(&mut metrics, &reasons);

        // Tier 3
        let Some(llm) = &self.llm else {
            metrics.diagnostics.push("llm_disabled".to_string());
            return self.finish(entities, metrics);
        };
        if !self.window.try_acquire() {
            tracing::warn!(request_id, "LLM escalation refused: window budget exhausted");
            metrics.diagnostics.push("llm_budget_exhausted".to_string());
            return self.finish(entities, metrics);
        }

        let t3 = Instant::now();
        match llm.extract_structured(text).await {
            Ok(extraction) => {
                metrics.tier3_ms = Some(t3.elapsed().as_millis() as u64);
                metrics.tier_reached = 3;
                // The structured response replaces, not unions, the prior
                // tiers' entities.
                entities = flatten_extraction(&extraction);
            }
            Err(e) => {
                metrics.tier3_ms = Some(t3.elapsed().as_millis() as u64);
                tracing::warn!(request_id, error = %e, "tier-3 extraction failed, keeping prior result");
                metrics.diagnostics.push(match e {
                    LlmError::Timeout => "llm_timeout".to_string(),
                    LlmError::Schema(_) => "llm_schema_invalid".to_string(),
                    LlmError::Http(_) => "llm_unavailable".to_string(),
                    LlmError::Disabled => "llm_disabled".to_string(),
                });
            }
        }

        self.finish(entities, metrics)
    }

    fn finish(&self, entities: Vec<Entity>, mut metrics: ExtractionMetrics) -> ExtractionResult {
        metrics.weighted_confidence = gate::weighted_confidence(&entities);
        ExtractionResult { entities, metrics }
    }
}

fn record_reasons(metrics: &mut ExtractionMetrics, reasons: &[gate::EscalationReason]) {
    metrics
        .escalation_reasons
        .extend(reasons.iter().map(|r| r.as_str().to_string()));
}
