use serde::{Deserialize, Serialize};

/// What kind of clinical fact an entity represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityCategory {
    Medications,
    Dosages,
    Frequencies,
    Routes,
    Conditions,
    LabTests,
    Procedures,
    Patients,
    Practitioners,
    Devices,
    Observations,
    Instructions,
}

impl EntityCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Medications => "medications",
            Self::Dosages => "dosages",
            Self::Frequencies => "frequencies",
            Self::Routes => "routes",
            Self::Conditions => "conditions",
            Self::LabTests => "lab_tests",
            Self::Procedures => "procedures",
            Self::Patients => "patients",
            Self::Practitioners => "practitioners",
            Self::Devices => "devices",
            Self::Observations => "observations",
            Self::Instructions => "instructions",
        }
    }

    /// Weight used by the weighted-confidence sufficiency rule.
    pub fn weight(&self) -> f64 {
        match self {
            Self::Medications | Self::Conditions => 3.0,
            Self::Dosages | Self::Frequencies => 2.0,
            _ => 1.0,
        }
    }

    /// Everything except free-text instructions counts as a medical
    /// category for the noise rule.
    pub fn is_medical(&self) -> bool {
        !matches!(self, Self::Instructions)
    }
}

/// Which tier produced an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntitySource {
    #[serde(rename = "tier1_medspacy")]
    Tier1Lexicon,
    #[serde(rename = "tier2_regex")]
    Tier2Regex,
    #[serde(rename = "tier3_llm")]
    Tier3Llm,
    #[serde(rename = "tier3_llm_embedded")]
    Tier3LlmEmbedded,
}

impl EntitySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tier1Lexicon => "tier1_medspacy",
            Self::Tier2Regex => "tier2_regex",
            Self::Tier3Llm => "tier3_llm",
            Self::Tier3LlmEmbedded => "tier3_llm_embedded",
        }
    }
}

/// Clinical-context modifiers detected around an entity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextFlags {
    #[serde(default)]
    pub negated: bool,
    #[serde(default)]
    pub hypothetical: bool,
    #[serde(default)]
    pub historical: bool,
    #[serde(default)]
    pub family_history: bool,
}

impl ContextFlags {
    pub fn any(&self) -> bool {
        self.negated || self.hypothetical || self.historical || self.family_history
    }
}

/// A code-system binding attached to an entity when the lexicon resolved
/// one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedCode {
    pub system: String,
    pub code: String,
    pub display: Option<String>,
}

/// A single extracted clinical fact. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub text: String,
    pub category: EntityCategory,
    pub confidence: f64,
    pub source: EntitySource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub normalized_code: Option<NormalizedCode>,
    #[serde(default)]
    pub context: ContextFlags,
}

impl Entity {
    pub fn new(
        text: impl Into<String>,
        category: EntityCategory,
        confidence: f64,
        source: EntitySource,
    ) -> Self {
        Self {
            text: text.into(),
            category,
            confidence: confidence.clamp(0.0, 1.0),
            source,
            normalized_code: None,
            context: ContextFlags::default(),
        }
    }

    pub fn with_code(mut self, system: &str, code: &str, display: Option<&str>) -> Self {
        self.normalized_code = Some(NormalizedCode {
            system: system.to_string(),
            code: code.to_string(),
            display: display.map(|d| d.to_string()),
        });
        self
    }

    /// Dedup key: category plus case-folded surface form.
    pub fn dedup_key(&self) -> (EntityCategory, String) {
        (self.category, self.text.to_lowercase())
    }
}

/// Per-request extraction metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionMetrics {
    /// Highest tier that contributed to the final result (1..=3).
    pub tier_reached: u8,
    pub tier1_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier2_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier3_ms: Option<u64>,
    /// Why each escalation happened, in order.
    pub escalation_reasons: Vec<String>,
    pub weighted_confidence: f64,
    /// Non-fatal processing notes (`llm_budget_exhausted`, ...).
    pub diagnostics: Vec<String>,
}

/// The extractor's output: an unordered multi-set of entities plus tier
/// metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub entities: Vec<Entity>,
    pub metrics: ExtractionMetrics,
}

impl ExtractionResult {
    /// Empty result carrying a diagnostic flag; the recovery value for any
    /// internal extractor failure.
    pub fn empty_with_diagnostic(diagnostic: &str) -> Self {
        Self {
            entities: Vec::new(),
            metrics: ExtractionMetrics {
                diagnostics: vec![diagnostic.to_string()],
                ..Default::default()
            },
        }
    }

    pub fn count_in(&self, category: EntityCategory) -> usize {
        self.entities
            .iter()
            .filter(|e| e.category == category)
            .count()
    }
}
