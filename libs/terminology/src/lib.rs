//! Bounded in-memory terminology lookup
//!
//! The pipeline treats terminology as a narrow, synchronous, infallible
//! interface: [`TerminologyIndex::lookup`] over a locally-bundled corpus.
//! A miss returns an empty vec — never an error — because a text-only
//! CodeableConcept is always an acceptable fallback downstream.

mod data;
mod drug_class;

pub use drug_class::{allergy_conflict, classes_of, AllergyConflict, ConflictKind};

use serde::{Deserialize, Serialize};

/// The code systems this corpus covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CodeSystem {
    RxNorm,
    Loinc,
    Snomed,
    Icd10Cm,
    Cvx,
    Ucum,
}

impl CodeSystem {
    /// Canonical system URI used in emitted codings.
    pub fn uri(&self) -> &'static str {
        match self {
            Self::RxNorm => "http://www.nlm.nih.gov/research/umls/rxnorm",
            Self::Loinc => "http://loinc.org",
            Self::Snomed => "http://snomed.info/sct",
            Self::Icd10Cm => "http://hl7.org/fhir/sid/icd-10-cm",
            Self::Cvx => "http://hl7.org/fhir/sid/cvx",
            Self::Ucum => "http://unitsofmeasure.org",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "rxnorm" => Some(Self::RxNorm),
            "loinc" => Some(Self::Loinc),
            "snomed" | "snomed-ct" | "sct" => Some(Self::Snomed),
            "icd-10" | "icd10" | "icd-10-cm" => Some(Self::Icd10Cm),
            "cvx" => Some(Self::Cvx),
            "ucum" => Some(Self::Ucum),
            _ => None,
        }
    }
}

/// A scored lookup hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeMatch {
    pub code: String,
    pub display: String,
    pub score: f64,
}

/// Lowercase, collapse whitespace, strip punctuation. The normalization
/// applied to both corpus displays and queries before comparison.
pub fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last_was_space = true;
    for c in text.chars() {
        if c.is_alphanumeric() {
            out.extend(c.to_lowercase());
            last_was_space = false;
        } else if !last_was_space {
            out.push(' ');
            last_was_space = true;
        }
    }
    while out.ends_with(' ') {
        out.pop();
    }
    out
}

const MAX_MATCHES: usize = 5;

const ALL_SYSTEMS: [CodeSystem; 6] = [
    CodeSystem::RxNorm,
    CodeSystem::Loinc,
    CodeSystem::Snomed,
    CodeSystem::Icd10Cm,
    CodeSystem::Cvx,
    CodeSystem::Ucum,
];

/// Read-only concept index over the embedded corpus. Construct once per
/// process and share; lookups take `&self`.
///
/// A normalized-display hash index backs [`exact`](Self::exact), the hot
/// path for n-gram lexicon scans; the scored [`lookup`](Self::lookup)
/// scan serves fuzzy coder queries.
#[derive(Debug)]
pub struct TerminologyIndex {
    normalized: std::collections::HashMap<(CodeSystem, String), usize>,
}

impl TerminologyIndex {
    pub fn new() -> Self {
        let mut normalized = std::collections::HashMap::new();
        for system in ALL_SYSTEMS {
            for (i, (_, display)) in Self::corpus(system).iter().enumerate() {
                normalized.entry((system, normalize(display))).or_insert(i);
            }
        }
        Self { normalized }
    }

    fn corpus(system: CodeSystem) -> &'static [(&'static str, &'static str)] {
        match system {
            CodeSystem::RxNorm => data::RXNORM,
            CodeSystem::Loinc => data::LOINC,
            CodeSystem::Snomed => data::SNOMED,
            CodeSystem::Icd10Cm => data::ICD10CM,
            CodeSystem::Cvx => data::CVX,
            CodeSystem::Ucum => data::UCUM,
        }
    }

    /// O(1) normalized-equality lookup. Score 1.0 on a verbatim display
    /// match, 0.95 on a normalized one.
    pub fn exact(&self, system: CodeSystem, query: &str) -> Option<CodeMatch> {
        let trimmed = query.trim();
        if trimmed.is_empty() {
            return None;
        }
        let norm = normalize(trimmed);
        let idx = *self.normalized.get(&(system, norm))?;
        let (code, display) = Self::corpus(system)[idx];
        Some(CodeMatch {
            code: code.to_string(),
            display: display.to_string(),
            score: if display == trimmed { 1.0 } else { 0.95 },
        })
    }

    /// Scored lookup: exact display (1.0) > normalized match (0.95) >
    /// prefix (0.8) > query-tokens-subset-of-display (0.6). Results are
    /// sorted best-first and capped. Unknown queries return an empty vec.
    pub fn lookup(&self, system: CodeSystem, query: &str) -> Vec<CodeMatch> {
        let trimmed = query.trim();
        if trimmed.is_empty() {
            return Vec::new();
        }
        let norm_query = normalize(trimmed);
        if norm_query.is_empty() {
            return Vec::new();
        }
        let query_tokens: Vec<&str> = norm_query.split(' ').collect();

        let mut matches = Vec::new();
        for (code, display) in Self::corpus(system) {
            let score = if *display == trimmed || *code == trimmed {
                1.0
            } else {
                let norm_display = normalize(display);
                if norm_display == norm_query {
                    0.95
                } else if norm_display.starts_with(&norm_query) {
                    0.8
                } else {
                    let display_tokens: Vec<&str> = norm_display.split(' ').collect();
                    if query_tokens.iter().all(|t| display_tokens.contains(t)) {
                        0.6
                    } else {
                        continue;
                    }
                }
            };
            matches.push(CodeMatch {
                code: (*code).to_string(),
                display: (*display).to_string(),
                score,
            });
        }

        matches.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.display.len().cmp(&b.display.len()))
        });
        matches.truncate(MAX_MATCHES);
        matches
    }

    /// Best single hit for a query, if any.
    pub fn best(&self, system: CodeSystem, query: &str) -> Option<CodeMatch> {
        self.lookup(system, query).into_iter().next()
    }

    /// Membership test used by the extraction lexicon: does the query
    /// resolve to a concept with a confident score?
    pub fn contains(&self, system: CodeSystem, query: &str) -> bool {
        self.best(system, query).is_some_and(|m| m.score >= 0.8)
    }
}

impl Default for TerminologyIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_medication_lookup() {
        let index = TerminologyIndex::new();
        let best = index.best(CodeSystem::RxNorm, "amoxicillin").unwrap();
        assert_eq!(best.code, "723");
        assert!(best.score >= 0.95);
    }

    #[test]
    fn test_case_insensitive_lookup() {
        let index = TerminologyIndex::new();
        let best = index.best(CodeSystem::RxNorm, "Warfarin").unwrap();
        assert_eq!(best.code, "11289");
    }

    #[test]
    fn test_cbc_loinc() {
        let index = TerminologyIndex::new();
        let best = index.best(CodeSystem::Loinc, "CBC").unwrap();
        assert_eq!(best.code, "58410-2");
    }

    #[test]
    fn test_miss_returns_empty() {
        let index = TerminologyIndex::new();
        assert!(index
            .lookup(CodeSystem::RxNorm, "unobtainium extract")
            .is_empty());
        assert!(index.lookup(CodeSystem::Loinc, "").is_empty());
    }

    #[test]
    fn test_results_sorted_and_capped() {
        let index = TerminologyIndex::new();
        let matches = index.lookup(CodeSystem::Snomed, "pain");
        assert!(matches.len() <= 5);
        for pair in matches.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[test]
    fn test_sickle_cell_condition() {
        let index = TerminologyIndex::new();
        let best = index.best(CodeSystem::Snomed, "sickle cell disease").unwrap();
        assert_eq!(best.code, "417357006");
    }

    #[test]
    fn test_exact_matches_normalized_only() {
        let index = TerminologyIndex::new();
        let hit = index.exact(CodeSystem::RxNorm, "Warfarin").unwrap();
        assert_eq!(hit.code, "11289");
        assert_eq!(hit.score, 0.95);
        assert_eq!(
            index.exact(CodeSystem::RxNorm, "warfarin").unwrap().score,
            1.0
        );
        // Prefixes are not exact
        assert!(index.exact(CodeSystem::Loinc, "CBC").is_none());
    }

    #[test]
    fn test_system_parse_aliases() {
        assert_eq!(CodeSystem::parse("SNOMED-CT"), Some(CodeSystem::Snomed));
        assert_eq!(CodeSystem::parse("icd10"), Some(CodeSystem::Icd10Cm));
        assert_eq!(CodeSystem::parse("klingon"), None);
    }
}
