//! Tier 1 — lexicon-driven clinical NLP engine
//!
//! Combines a terminology-lexicon matcher (medications, conditions, lab
//! tests, procedures), keyword lexicons for devices and vital-sign
//! observations, abbreviation expansion, person-name recognition, and a
//! trigger-based clinical-context detector (negation, hypothetical,
//! historical, family history) scoped to the containing sentence.

use std::ops::Range;
use std::sync::Arc;

use lazy_static::lazy_static;
use regex::Regex;

use funke_terminology::{CodeSystem, TerminologyIndex};

use crate::abbrev;
use crate::entity::{Entity, EntityCategory, EntitySource};
use crate::gate::split_sentences;

/// Lab-order shorthand → LOINC lookup query.
static LAB_TERMS: &[(&str, &str)] = &[
    ("cbc", "CBC"),
    ("complete blood count", "CBC"),
    ("cmp", "Comprehensive metabolic panel"),
    ("comprehensive metabolic panel", "Comprehensive metabolic panel"),
    ("bmp", "Basic metabolic panel"),
    ("basic metabolic panel", "Basic metabolic panel"),
    ("hba1c", "Hemoglobin A1c"),
    ("a1c", "Hemoglobin A1c"),
    ("hemoglobin a1c", "Hemoglobin A1c"),
    ("tsh", "TSH"),
    ("lipid panel", "Lipid panel"),
    ("urinalysis", "Urinalysis"),
    ("troponin", "Troponin I"),
    ("bnp", "Natriuretic peptide B"),
    ("inr", "INR"),
    ("d dimer", "D-dimer"),
    ("blood culture", "Blood culture"),
    ("urine culture", "Urine culture"),
    ("vancomycin trough", "Vancomycin trough"),
];

static PROCEDURE_TERMS: &[(&str, &str)] = &[
    ("colonoscopy", "Colonoscopy"),
    ("appendectomy", "Appendectomy"),
    ("echocardiogram", "Echocardiography"),
    ("echocardiography", "Echocardiography"),
    ("electrocardiogram", "Electrocardiogram"),
    ("ekg", "Electrocardiogram"),
    ("ecg", "Electrocardiogram"),
    ("chest x ray", "Chest x-ray"),
    ("chest xray", "Chest x-ray"),
    ("dialysis", "Renal dialysis"),
];

static DEVICE_TERMS: &[&str] = &[
    "pacemaker",
    "insulin pump",
    "wheelchair",
    "walker",
    "catheter",
    "nebulizer",
    "cpap",
    "defibrillator",
    "glucometer",
];

static OBSERVATION_TERMS: &[(&str, &str)] = &[
    ("blood pressure", "Blood pressure panel"),
    ("heart rate", "Heart rate"),
    ("pulse", "Heart rate"),
    ("respiratory rate", "Respiratory rate"),
    ("temperature", "Body temperature"),
    ("oxygen saturation", "Oxygen saturation"),
    ("weight", "Body weight"),
    ("height", "Body height"),
    ("bmi", "Body mass index"),
];

static NEGATION_TRIGGERS: &[&str] = &[
    "denies",
    "denied",
    "no evidence of",
    "negative for",
    "without",
    "free of",
    "no ",
];

static HYPOTHETICAL_TRIGGERS: &[&str] = &["if ", "in case", "unless", "should the patient develop", "watch for", "monitor for"];

static HISTORICAL_TRIGGERS: &[&str] = &["history of", "h/o", "previously", "prior "];

static FAMILY_TRIGGERS: &[&str] = &["family history of", "family history", "mother had", "father had"];

lazy_static! {
    static ref DOSAGE: Regex = Regex::new(
        r"(?i)\b(\d+(?:\.\d+)?)\s*(mg|mcg|g|kg|ml|l|units?|iu|meq|tablets?|capsules?|puffs?|drops?)\b"
    )
    .unwrap();
    static ref FREQUENCY: Regex = Regex::new(
        r"(?i)\b(?:twice daily|once daily|three times daily|four times daily|every other day|every \d+ hours|at bedtime|as needed|with meals|every morning|every evening|daily|weekly|monthly|nightly)\b"
    )
    .unwrap();
    static ref INTERVAL: Regex = Regex::new(r"(?i)\bq(\d+)\s*h\b").unwrap();
    static ref ROUTE_WORD: Regex = Regex::new(
        r"(?i)\b(?:oral(?:ly)?|intravenous(?:ly)?|intramuscular(?:ly)?|subcutaneous(?:ly)?|sublingual|topical|inhaled|rectal|transdermal|by mouth)\b"
    )
    .unwrap();
    static ref PATIENT_NAME: Regex = Regex::new(
        r"\b(?:(?i:patient|pt)\.?|Mrs\.?|Ms\.?|Mr\.?)\s+([A-Z][a-z]+(?:\s+[A-Z][a-z]+){0,2})"
    )
    .unwrap();
    static ref PRACTITIONER_NAME: Regex =
        Regex::new(r"\b(?:Dr\.?|Doctor)\s+([A-Z][a-z]+(?:\s+[A-Z][a-z]+)?)").unwrap();
    static ref WORD: Regex = Regex::new(r"[A-Za-z0-9']+").unwrap();
}

struct Token {
    lower: String,
    span: Range<usize>,
}

/// An entity hit plus its byte position, used for sentence-scoped context
/// assignment before the positions are dropped.
struct Hit {
    entity: Entity,
    start: usize,
}

pub struct LexiconTier {
    index: Arc<TerminologyIndex>,
}

impl LexiconTier {
    pub fn new(index: Arc<TerminologyIndex>) -> Self {
        Self { index }
    }

    pub fn extract(&self, text: &str) -> Vec<Entity> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let tokens: Vec<Token> = WORD
            .find_iter(text)
            .map(|m| Token {
                lower: m.as_str().to_lowercase(),
                span: m.range(),
            })
            .collect();
        let mut covered = vec![false; tokens.len()];
        let mut hits: Vec<Hit> = Vec::new();

        // Person names first so name tokens never feed the lexicons
        self.scan_names(text, &tokens, &mut covered, &mut hits);

        // Longest-match lexicon scans, most specific category first
        self.scan_table(text, &tokens, &mut covered, &mut hits, LAB_TERMS, |q| {
            self.coded_entity(q, CodeSystem::Loinc, EntityCategory::LabTests, 0.9)
        });
        self.scan_table(text, &tokens, &mut covered, &mut hits, PROCEDURE_TERMS, |q| {
            self.coded_entity(q, CodeSystem::Snomed, EntityCategory::Procedures, 0.85)
        });
        self.scan_medications(text, &tokens, &mut covered, &mut hits);
        self.scan_devices(text, &tokens, &mut covered, &mut hits);
        self.scan_table(text, &tokens, &mut covered, &mut hits, OBSERVATION_TERMS, |q| {
            self.coded_entity(q, CodeSystem::Loinc, EntityCategory::Observations, 0.8)
        });
        self.scan_conditions(text, &tokens, &mut covered, &mut hits);

        // Abbreviations and pattern cues
        self.scan_abbreviations(&tokens, &covered, &mut hits);
        self.scan_patterns(text, &mut hits);

        // Context flags, scoped to the sentence containing each entity
        apply_context(text, &mut hits);

        dedup_hits(hits)
    }

    fn coded_entity(
        &self,
        query: &str,
        system: CodeSystem,
        category: EntityCategory,
        confidence: f64,
    ) -> Entity {
        let entity = Entity::new(query, category, confidence, EntitySource::Tier1Lexicon);
        match self.index.best(system, query) {
            Some(m) if m.score >= 0.8 => {
                entity.with_code(system.uri(), &m.code, Some(&m.display))
            }
            _ => entity,
        }
    }

    /// Generic longest-first scan over a `(surface, lookup-query)` table.
    fn scan_table(
        &self,
        text: &str,
        tokens: &[Token],
        covered: &mut [bool],
        hits: &mut Vec<Hit>,
        table: &[(&str, &str)],
        build: impl Fn(&str) -> Entity,
    ) {
        let max_n = table
            .iter()
            .map(|(surface, _)| surface.split(' ').count())
            .max()
            .unwrap_or(1);
        for n in (1..=max_n).rev() {
            for start in 0..tokens.len().saturating_sub(n - 1) {
                if covered[start..start + n].iter().any(|c| *c) {
                    continue;
                }
                let phrase = tokens[start..start + n]
                    .iter()
                    .map(|t| t.lower.as_str())
                    .collect::<Vec<_>>()
                    .join(" ");
                if let Some((_, query)) = table.iter().find(|(surface, _)| *surface == phrase) {
                    let span = tokens[start].span.start..tokens[start + n - 1].span.end;
                    let mut entity = build(query);
                    entity.text = text[span.clone()].to_string();
                    hits.push(Hit {
                        entity,
                        start: span.start,
                    });
                    covered[start..start + n].iter_mut().for_each(|c| *c = true);
                }
            }
        }
    }

    fn scan_medications(
        &self,
        text: &str,
        tokens: &[Token],
        covered: &mut [bool],
        hits: &mut Vec<Hit>,
    ) {
        for n in (1..=3).rev() {
            for start in 0..tokens.len().saturating_sub(n - 1) {
                if covered[start..start + n].iter().any(|c| *c) {
                    continue;
                }
                let phrase = tokens[start..start + n]
                    .iter()
                    .map(|t| t.lower.as_str())
                    .collect::<Vec<_>>()
                    .join(" ");
                let Some(m) = self.index.exact(CodeSystem::RxNorm, &phrase) else {
                    continue;
                };
                let span = tokens[start].span.start..tokens[start + n - 1].span.end;
                hits.push(Hit {
                    entity: Entity::new(
                        text[span.clone()].to_string(),
                        EntityCategory::Medications,
                        0.9,
                        EntitySource::Tier1Lexicon,
                    )
                    .with_code(CodeSystem::RxNorm.uri(), &m.code, Some(&m.display)),
                    start: span.start,
                });
                covered[start..start + n].iter_mut().for_each(|c| *c = true);
            }
        }
    }

    fn scan_conditions(
        &self,
        text: &str,
        tokens: &[Token],
        covered: &mut [bool],
        hits: &mut Vec<Hit>,
    ) {
        for n in (1..=4).rev() {
            for start in 0..tokens.len().saturating_sub(n - 1) {
                if covered[start..start + n].iter().any(|c| *c) {
                    continue;
                }
                let phrase = tokens[start..start + n]
                    .iter()
                    .map(|t| t.lower.as_str())
                    .collect::<Vec<_>>()
                    .join(" ");
                let Some(m) = self.index.exact(CodeSystem::Snomed, &phrase) else {
                    continue;
                };
                let span = tokens[start].span.start..tokens[start + n - 1].span.end;
                hits.push(Hit {
                    entity: Entity::new(
                        text[span.clone()].to_string(),
                        EntityCategory::Conditions,
                        0.85,
                        EntitySource::Tier1Lexicon,
                    )
                    .with_code(CodeSystem::Snomed.uri(), &m.code, Some(&m.display)),
                    start: span.start,
                });
                covered[start..start + n].iter_mut().for_each(|c| *c = true);
            }
        }
    }

    fn scan_devices(
        &self,
        text: &str,
        tokens: &[Token],
        covered: &mut [bool],
        hits: &mut Vec<Hit>,
    ) {
        for n in (1..=2).rev() {
            for start in 0..tokens.len().saturating_sub(n - 1) {
                if covered[start..start + n].iter().any(|c| *c) {
                    continue;
                }
                let phrase = tokens[start..start + n]
                    .iter()
                    .map(|t| t.lower.as_str())
                    .collect::<Vec<_>>()
                    .join(" ");
                if DEVICE_TERMS.contains(&phrase.as_str()) {
                    let span = tokens[start].span.start..tokens[start + n - 1].span.end;
                    hits.push(Hit {
                        entity: Entity::new(
                            text[span.clone()].to_string(),
                            EntityCategory::Devices,
                            0.8,
                            EntitySource::Tier1Lexicon,
                        ),
                        start: span.start,
                    });
                    covered[start..start + n].iter_mut().for_each(|c| *c = true);
                }
            }
        }
    }

    fn scan_names(
        &self,
        text: &str,
        tokens: &[Token],
        covered: &mut [bool],
        hits: &mut Vec<Hit>,
    ) {
        for caps in PATIENT_NAME.captures_iter(text) {
            let m = caps.get(1).unwrap();
            hits.push(Hit {
                entity: Entity::new(
                    m.as_str().to_string(),
                    EntityCategory::Patients,
                    0.85,
                    EntitySource::Tier1Lexicon,
                ),
                start: m.start(),
            });
            cover_span(tokens, covered, m.range());
        }
        for caps in PRACTITIONER_NAME.captures_iter(text) {
            let m = caps.get(1).unwrap();
            hits.push(Hit {
                entity: Entity::new(
                    m.as_str().to_string(),
                    EntityCategory::Practitioners,
                    0.85,
                    EntitySource::Tier1Lexicon,
                ),
                start: m.start(),
            });
            cover_span(tokens, covered, m.range());
        }
    }

    fn scan_abbreviations(&self, tokens: &[Token], covered: &[bool], hits: &mut Vec<Hit>) {
        for (i, token) in tokens.iter().enumerate() {
            if covered[i] {
                continue;
            }
            if let Some((expansion, category)) = abbrev::expand(&token.lower) {
                hits.push(Hit {
                    entity: Entity::new(
                        expansion,
                        category,
                        0.9,
                        EntitySource::Tier1Lexicon,
                    ),
                    start: token.span.start,
                });
            }
        }
    }

    fn scan_patterns(&self, text: &str, hits: &mut Vec<Hit>) {
        for caps in DOSAGE.captures_iter(text) {
            let value = caps.get(1).unwrap().as_str();
            let unit = caps.get(2).unwrap().as_str().to_lowercase();
            hits.push(Hit {
                entity: Entity::new(
                    format!("{} {}", value, unit),
                    EntityCategory::Dosages,
                    0.85,
                    EntitySource::Tier1Lexicon,
                ),
                start: caps.get(0).unwrap().start(),
            });
        }
        for m in FREQUENCY.find_iter(text) {
            hits.push(Hit {
                entity: Entity::new(
                    m.as_str().to_lowercase(),
                    EntityCategory::Frequencies,
                    0.85,
                    EntitySource::Tier1Lexicon,
                ),
                start: m.start(),
            });
        }
        for caps in INTERVAL.captures_iter(text) {
            let hours = caps.get(1).unwrap().as_str();
            hits.push(Hit {
                entity: Entity::new(
                    format!("every {} hours", hours),
                    EntityCategory::Frequencies,
                    0.9,
                    EntitySource::Tier1Lexicon,
                ),
                start: caps.get(0).unwrap().start(),
            });
        }
        for m in ROUTE_WORD.find_iter(text) {
            let word = m.as_str().to_lowercase();
            let canonical = match word.as_str() {
                "by mouth" | "orally" => "oral".to_string(),
                "intravenously" => "intravenous".to_string(),
                "intramuscularly" => "intramuscular".to_string(),
                "subcutaneously" => "subcutaneous".to_string(),
                other => other.to_string(),
            };
            hits.push(Hit {
                entity: Entity::new(
                    canonical,
                    EntityCategory::Routes,
                    0.9,
                    EntitySource::Tier1Lexicon,
                ),
                start: m.start(),
            });
        }
    }
}

fn cover_span(tokens: &[Token], covered: &mut [bool], span: Range<usize>) {
    for (i, token) in tokens.iter().enumerate() {
        if token.span.start >= span.start && token.span.end <= span.end {
            covered[i] = true;
        }
    }
}

/// Assign context flags: a trigger earlier in the same sentence flags every
/// entity after it.
fn apply_context(text: &str, hits: &mut [Hit]) {
    let mut offset = 0usize;
    for sentence in split_sentences(text) {
        // Locate the sentence in the original text to get absolute offsets
        let Some(rel) = text[offset..].find(sentence) else {
            continue;
        };
        let sent_start = offset + rel;
        let sent_end = sent_start + sentence.len();
        offset = sent_end;

        let sentence_lower = sentence.to_lowercase();
        let flags_at = |triggers: &[&str]| -> Option<usize> {
            triggers
                .iter()
                .filter_map(|t| sentence_lower.find(t))
                .min()
        };

        let negated_at = flags_at(NEGATION_TRIGGERS);
        let hypothetical_at = flags_at(HYPOTHETICAL_TRIGGERS);
        let historical_at = flags_at(HISTORICAL_TRIGGERS);
        let family_at = flags_at(FAMILY_TRIGGERS);

        for hit in hits.iter_mut() {
            if hit.start < sent_start || hit.start >= sent_end {
                continue;
            }
            let rel_pos = hit.start - sent_start;
            let mut context = hit.entity.context;
            if negated_at.is_some_and(|p| p < rel_pos) {
                context.negated = true;
            }
            if hypothetical_at.is_some_and(|p| p < rel_pos) {
                context.hypothetical = true;
            }
            if family_at.is_some_and(|p| p < rel_pos) {
                context.family_history = true;
            } else if historical_at.is_some_and(|p| p < rel_pos) {
                context.historical = true;
            }
            hit.entity.context = context;
        }
    }
}

fn dedup_hits(hits: Vec<Hit>) -> Vec<Entity> {
    let mut seen = std::collections::HashSet::new();
    let mut entities = Vec::new();
    for hit in hits {
        if seen.insert(hit.entity.dedup_key()) {
            entities.push(hit.entity);
        }
    }
    entities
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tier() -> LexiconTier {
        LexiconTier::new(Arc::new(TerminologyIndex::new()))
    }

    fn find<'a>(entities: &'a [Entity], category: EntityCategory) -> Vec<&'a Entity> {
        entities.iter().filter(|e| e.category == category).collect()
    }

    #[test]
    fn test_simple_medication_order() {
        let entities =
            tier().extract("Start patient John Doe on 500 mg amoxicillin twice daily");

        let meds = find(&entities, EntityCategory::Medications);
        assert_eq!(meds.len(), 1);
        assert_eq!(meds[0].text.to_lowercase(), "amoxicillin");
        assert_eq!(
            meds[0].normalized_code.as_ref().unwrap().code,
            "723"
        );

        let dosages = find(&entities, EntityCategory::Dosages);
        assert_eq!(dosages.len(), 1);
        assert_eq!(dosages[0].text, "500 mg");

        let freqs = find(&entities, EntityCategory::Frequencies);
        assert_eq!(freqs.len(), 1);
        assert_eq!(freqs[0].text, "twice daily");

        let patients = find(&entities, EntityCategory::Patients);
        assert_eq!(patients.len(), 1);
        assert_eq!(patients[0].text, "John Doe");
    }

    #[test]
    fn test_abbreviation_expansion() {
        let entities = tier().extract("Amoxicillin 875 mg PO BID");
        let freqs = find(&entities, EntityCategory::Frequencies);
        assert!(freqs.iter().any(|e| e.text == "twice daily"));
        let routes = find(&entities, EntityCategory::Routes);
        assert!(routes.iter().any(|e| e.text == "oral"));
    }

    #[test]
    fn test_interval_shorthand() {
        let entities = tier().extract("ceftriaxone 1 g IV q8h");
        let freqs = find(&entities, EntityCategory::Frequencies);
        assert!(freqs.iter().any(|e| e.text == "every 8 hours"));
    }

    #[test]
    fn test_negation_scoped_to_sentence() {
        let entities =
            tier().extract("Patient denies chest pain; continue warfarin 5 mg PO daily");

        let conditions = find(&entities, EntityCategory::Conditions);
        assert_eq!(conditions.len(), 1);
        assert!(conditions[0].context.negated);

        // The medication lives in the second sentence: unaffected
        let meds = find(&entities, EntityCategory::Medications);
        assert_eq!(meds.len(), 1);
        assert!(!meds[0].context.negated);
    }

    #[test]
    fn test_hypothetical_context() {
        let entities = tier().extract("If patient develops rash, stop the drug");
        let conditions = find(&entities, EntityCategory::Conditions);
        assert_eq!(conditions.len(), 1);
        assert!(conditions[0].context.hypothetical);
    }

    #[test]
    fn test_family_history_context() {
        let entities = tier().extract("Family history of hypertension");
        let conditions = find(&entities, EntityCategory::Conditions);
        assert_eq!(conditions.len(), 1);
        assert!(conditions[0].context.family_history);
    }

    #[test]
    fn test_lab_order_with_patient() {
        let entities = tier().extract("Order CBC for patient Jane Smith tomorrow morning");
        let labs = find(&entities, EntityCategory::LabTests);
        assert_eq!(labs.len(), 1);
        assert_eq!(labs[0].normalized_code.as_ref().unwrap().code, "58410-2");
        let patients = find(&entities, EntityCategory::Patients);
        assert_eq!(patients[0].text, "Jane Smith");
    }

    #[test]
    fn test_practitioner_name() {
        let entities = tier().extract("Dr. Garcia to follow up");
        let practitioners = find(&entities, EntityCategory::Practitioners);
        assert_eq!(practitioners.len(), 1);
        assert_eq!(practitioners[0].text, "Garcia");
    }

    #[test]
    fn test_confidence_bounds() {
        let entities =
            tier().extract("Start amoxicillin 500 mg PO BID for pneumonia, order CBC");
        assert!(!entities.is_empty());
        for e in &entities {
            assert!(e.confidence >= 0.5 && e.confidence <= 0.95, "{:?}", e);
        }
    }

    #[test]
    fn test_empty_text() {
        assert!(tier().extract("  ").is_empty());
    }
}
