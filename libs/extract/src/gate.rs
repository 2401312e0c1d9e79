//! Deterministic sufficiency gate
//!
//! Decides whether a tier's combined output is good enough to stop, or the
//! cascade escalates. Escalation is driven by these rules only — never by
//! exceptions inside a tier.

use serde::{Deserialize, Serialize};

use crate::entity::{Entity, EntityCategory};

/// Tokens whose presence marks text as clinically indicative for rule 2.
const CLINICAL_INDICATORS: &[&str] = &[
    "mg", "mcg", "ml", "tablet", "capsule", "infusion", "injection", "po", "iv", "im", "dose",
    "daily", "bid", "tid", "qid", "prn", "start", "continue", "order", "discontinue",
    "administer", "stat", "refill",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceCheck {
    #[default]
    WeightedAverage,
    Minimum,
    SimpleAverage,
}

#[derive(Debug, Clone)]
pub struct GateConfig {
    /// Confidence threshold below which rule 4 escalates.
    pub threshold: f64,
    pub check: ConfidenceCheck,
    /// Minimum expected entity count for clinically indicative text.
    pub min_entities: usize,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            threshold: 0.85,
            check: ConfidenceCheck::WeightedAverage,
            min_entities: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscalationReason {
    NoEntities,
    TooFewEntities,
    MedicationWithoutDosageOrFrequency,
    LowConfidence,
    NoiseOnly,
}

impl EscalationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoEntities => "no_entities",
            Self::TooFewEntities => "too_few_entities",
            Self::MedicationWithoutDosageOrFrequency => "medication_without_dosage_or_frequency",
            Self::LowConfidence => "low_confidence",
            Self::NoiseOnly => "noise_only",
        }
    }
}

/// Weighted confidence: `sum(weight × confidence) / sum(weight)` with
/// medications/conditions ×3, dosages/frequencies ×2, others ×1.
pub fn weighted_confidence(entities: &[Entity]) -> f64 {
    if entities.is_empty() {
        return 0.0;
    }
    let (num, den) = entities.iter().fold((0.0, 0.0), |(num, den), e| {
        let w = e.category.weight();
        (num + w * e.confidence, den + w)
    });
    num / den
}

fn simple_average(entities: &[Entity]) -> f64 {
    if entities.is_empty() {
        return 0.0;
    }
    entities.iter().map(|e| e.confidence).sum::<f64>() / entities.len() as f64
}

fn minimum(entities: &[Entity]) -> f64 {
    entities
        .iter()
        .map(|e| e.confidence)
        .fold(f64::INFINITY, f64::min)
}

pub fn confidence_score(entities: &[Entity], check: ConfidenceCheck) -> f64 {
    if entities.is_empty() {
        return 0.0;
    }
    match check {
        ConfidenceCheck::WeightedAverage => weighted_confidence(entities),
        ConfidenceCheck::Minimum => minimum(entities),
        ConfidenceCheck::SimpleAverage => simple_average(entities),
    }
}

fn has_clinical_indicator(text: &str) -> bool {
    let lower = text.to_lowercase();
    let tokens: Vec<&str> = lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect();
    CLINICAL_INDICATORS.iter().any(|ind| tokens.contains(ind))
}

/// Naive sentence split on terminal punctuation and newlines. Shared with
/// the tier-1 context detector.
pub(crate) fn split_sentences(text: &str) -> Vec<&str> {
    text.split(|c| matches!(c, '.' | ';' | '\n'))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

/// Rule 3: some medication entity has neither a dosage nor a frequency
/// entity in its sentence.
fn medication_without_support(text: &str, entities: &[Entity]) -> bool {
    let medications: Vec<&Entity> = entities
        .iter()
        .filter(|e| e.category == EntityCategory::Medications)
        .collect();
    if medications.is_empty() {
        return false;
    }

    let support: Vec<String> = entities
        .iter()
        .filter(|e| {
            matches!(
                e.category,
                EntityCategory::Dosages | EntityCategory::Frequencies
            )
        })
        .map(|e| e.text.to_lowercase())
        .collect();

    let sentences = split_sentences(text);
    for med in medications {
        let med_lower = med.text.to_lowercase();
        let sentence = sentences
            .iter()
            .find(|s| s.to_lowercase().contains(&med_lower));
        let supported = match sentence {
            Some(s) => {
                let s_lower = s.to_lowercase();
                support.iter().any(|sup| s_lower.contains(sup))
            }
            // Medication came from a structured source without a surface
            // match (e.g. a normalized name); fall back to whole-text
            // support.
            None => !support.is_empty(),
        };
        if !supported {
            return true;
        }
    }
    false
}

/// Evaluate the gate. An empty vec means the result is sufficient;
/// otherwise the returned reasons trigger escalation to the next tier.
pub fn evaluate(text: &str, entities: &[Entity], config: &GateConfig) -> Vec<EscalationReason> {
    let mut reasons = Vec::new();

    if entities.is_empty() {
        reasons.push(EscalationReason::NoEntities);
        return reasons;
    }

    if entities.len() < config.min_entities && has_clinical_indicator(text) {
        reasons.push(EscalationReason::TooFewEntities);
    }

    if medication_without_support(text, entities) {
        reasons.push(EscalationReason::MedicationWithoutDosageOrFrequency);
    }

    if confidence_score(entities, config.check) < config.threshold {
        reasons.push(EscalationReason::LowConfidence);
    }

    let noise_only = entities.iter().all(|e| {
        e.category == EntityCategory::Instructions && e.confidence < 0.6
    }) && !entities.iter().any(|e| e.category.is_medical());
    if noise_only {
        reasons.push(EscalationReason::NoiseOnly);
    }

    reasons
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntitySource;

    fn entity(text: &str, category: EntityCategory, confidence: f64) -> Entity {
        Entity::new(text, category, confidence, EntitySource::Tier1Lexicon)
    }

    #[test]
    fn test_empty_escalates() {
        let reasons = evaluate("start amoxicillin", &[], &GateConfig::default());
        assert_eq!(reasons, vec![EscalationReason::NoEntities]);
    }

    #[test]
    fn test_weighted_confidence_math() {
        let entities = vec![
            entity("amoxicillin", EntityCategory::Medications, 0.9),
            entity("500 mg", EntityCategory::Dosages, 0.8),
            entity("oral", EntityCategory::Routes, 0.6),
        ];
        // (3*0.9 + 2*0.8 + 1*0.6) / 6 = 4.9 / 6
        let expected = 4.9 / 6.0;
        assert!((weighted_confidence(&entities) - expected).abs() < 1e-9);
    }

    #[test]
    fn test_sufficient_result_passes() {
        let entities = vec![
            entity("amoxicillin", EntityCategory::Medications, 0.92),
            entity("500 mg", EntityCategory::Dosages, 0.9),
            entity("twice daily", EntityCategory::Frequencies, 0.9),
        ];
        let reasons = evaluate(
            "Start amoxicillin 500 mg twice daily",
            &entities,
            &GateConfig::default(),
        );
        assert!(reasons.is_empty());
    }

    #[test]
    fn test_too_few_entities_needs_clinical_indicator() {
        let entities = vec![entity("amoxicillin", EntityCategory::Medications, 0.95)];

        // "start"/"mg" are indicators, so a 1-entity result escalates
        let clinical = evaluate(
            "start amoxicillin 500 mg twice daily",
            &entities,
            &GateConfig::default(),
        );
        assert!(clinical.contains(&EscalationReason::TooFewEntities));

        // Bland text: the count rule does not fire (others may)
        let bland = evaluate("amoxicillin was mentioned", &entities, &GateConfig::default());
        assert!(!bland.contains(&EscalationReason::TooFewEntities));
    }

    #[test]
    fn test_medication_without_dosage_in_sentence() {
        let entities = vec![
            entity("warfarin", EntityCategory::Medications, 0.95),
            entity("chest pain", EntityCategory::Conditions, 0.9),
            entity("oral", EntityCategory::Routes, 0.9),
        ];
        let reasons = evaluate(
            "Patient denies chest pain. Continue warfarin oral",
            &entities,
            &GateConfig::default(),
        );
        assert!(reasons.contains(&EscalationReason::MedicationWithoutDosageOrFrequency));
    }

    #[test]
    fn test_dosage_in_other_sentence_does_not_satisfy() {
        let entities = vec![
            entity("warfarin", EntityCategory::Medications, 0.95),
            entity("5 mg", EntityCategory::Dosages, 0.95),
            entity("daily", EntityCategory::Frequencies, 0.95),
        ];
        // Dosage lives in the warfarin sentence: fine
        let ok = evaluate(
            "Continue warfarin 5 mg daily",
            &entities,
            &GateConfig::default(),
        );
        assert!(!ok.contains(&EscalationReason::MedicationWithoutDosageOrFrequency));

        // Dosage in a different sentence: rule fires
        let split = evaluate(
            "Continue warfarin. Previous dose was 5 mg daily",
            &entities,
            &GateConfig::default(),
        );
        assert!(split.contains(&EscalationReason::MedicationWithoutDosageOrFrequency));
    }

    #[test]
    fn test_low_confidence_escalates() {
        let entities = vec![
            entity("amoxicillin", EntityCategory::Medications, 0.6),
            entity("500 mg", EntityCategory::Dosages, 0.6),
            entity("twice daily", EntityCategory::Frequencies, 0.6),
        ];
        let reasons = evaluate(
            "Start amoxicillin 500 mg twice daily",
            &entities,
            &GateConfig::default(),
        );
        assert!(reasons.contains(&EscalationReason::LowConfidence));
    }

    #[test]
    fn test_minimum_check_mode() {
        let entities = vec![
            entity("amoxicillin", EntityCategory::Medications, 0.95),
            entity("500 mg", EntityCategory::Dosages, 0.95),
            entity("note", EntityCategory::Instructions, 0.5),
        ];
        let config = GateConfig {
            check: ConfidenceCheck::Minimum,
            ..Default::default()
        };
        assert!(confidence_score(&entities, ConfidenceCheck::Minimum) < 0.85);
        let reasons = evaluate("start amoxicillin 500 mg", &entities, &config);
        assert!(reasons.contains(&EscalationReason::LowConfidence));
    }

    #[test]
    fn test_noise_only_escalates() {
        let entities = vec![
            entity("take with food", EntityCategory::Instructions, 0.5),
            entity("follow up", EntityCategory::Instructions, 0.4),
        ];
        let reasons = evaluate("take with food and follow up", &entities, &GateConfig::default());
        assert!(reasons.contains(&EscalationReason::NoiseOnly));
    }
}
