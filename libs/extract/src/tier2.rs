//! Tier 2 — hierarchical pattern matcher
//!
//! A curated hierarchy of regex families, tried in order of specificity:
//! abbreviation patterns, dosage-unit patterns, frequency patterns, route
//! patterns. Adds entities the earlier tiers missed; never overrides an
//! existing entity.

use std::collections::HashSet;

use lazy_static::lazy_static;
use regex::Regex;

use crate::abbrev;
use crate::entity::{Entity, EntityCategory, EntitySource};

lazy_static! {
    static ref ABBREV_TOKEN: Regex = Regex::new(r"(?i)\b[a-z]{2,4}\b").unwrap();
    static ref INTERVAL: Regex = Regex::new(r"(?i)\bq\s*(\d+)\s*(h|hr|hrs|hours?)\b").unwrap();
    static ref DOSAGE_UNIT: Regex = Regex::new(
        r"(?i)\b(\d+(?:[.,]\d+)?)\s*(mg|mcg|microgram(?:s)?|g|gram(?:s)?|kg|ml|milliliter(?:s)?|l|cc|units?|iu|meq|mmol|tablets?|tabs?|capsules?|caps?|puffs?|drops?|sprays?|patch(?:es)?)\b"
    )
    .unwrap();
    static ref FREQUENCY_PHRASE: Regex = Regex::new(
        r"(?ix)\b(?:
            twice[\s-]+(?:daily|a[\s-]+day|per[\s-]+day)
            | once[\s-]+(?:daily|a[\s-]+day|per[\s-]+day)
            | (?:three|four|\d+)[\s-]+times[\s-]+(?:daily|a[\s-]+day|per[\s-]+day)
            | every[\s-]+(?:other[\s-]+day|\d+[\s-]+(?:hours?|minutes?|days?|weeks?))
            | every[\s-]+(?:morning|evening|night)
            | at[\s-]+bedtime
            | as[\s-]+needed
            | with[\s-]+meals
            | before[\s-]+meals
            | after[\s-]+meals
            | daily | nightly | weekly | monthly
        )\b"
    )
    .unwrap();
    static ref ROUTE_PHRASE: Regex = Regex::new(
        r"(?i)\b(?:by\s+mouth|oral(?:ly)?|intravenous(?:ly)?|intramuscular(?:ly)?|subcutaneous(?:ly)?|sublingual(?:ly)?|topical(?:ly)?|inhaled|by\s+inhalation|per\s+rectum|rectal(?:ly)?|transdermal)\b"
    )
    .unwrap();
}

/// Canonical route surface for the many ways a route is written.
fn canonical_route(raw: &str) -> String {
    let squashed = raw.to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ");
    match squashed.as_str() {
        "by mouth" | "orally" | "oral" => "oral",
        "intravenously" | "intravenous" => "intravenous",
        "intramuscularly" | "intramuscular" => "intramuscular",
        "subcutaneously" | "subcutaneous" => "subcutaneous",
        "sublingually" | "sublingual" => "sublingual",
        "topically" | "topical" => "topical",
        "by inhalation" | "inhaled" => "inhaled",
        "per rectum" | "rectally" | "rectal" => "rectal",
        other => return other.to_string(),
    }
    .to_string()
}

fn normalize_frequency(raw: &str) -> String {
    raw.to_lowercase()
        .split(|c: char| c.is_whitespace() || c == '-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

pub struct PatternTier;

impl PatternTier {
    pub fn new() -> Self {
        Self
    }

    /// Run the pattern hierarchy over `text`, returning only entities not
    /// already present in `existing` (category + case-folded surface).
    pub fn extract(&self, text: &str, existing: &[Entity]) -> Vec<Entity> {
        let mut seen: HashSet<(EntityCategory, String)> =
            existing.iter().map(|e| e.dedup_key()).collect();
        let mut added = Vec::new();

        let mut push = |entity: Entity, seen: &mut HashSet<_>, added: &mut Vec<Entity>| {
            if seen.insert(entity.dedup_key()) {
                added.push(entity);
            }
        };

        // Family 1: abbreviations
        for m in ABBREV_TOKEN.find_iter(text) {
            if let Some((expansion, category)) = abbrev::expand(m.as_str()) {
                push(
                    Entity::new(expansion, category, 0.8, EntitySource::Tier2Regex),
                    &mut seen,
                    &mut added,
                );
            }
        }
        for caps in INTERVAL.captures_iter(text) {
            let hours = caps.get(1).unwrap().as_str();
            push(
                Entity::new(
                    format!("every {} hours", hours),
                    EntityCategory::Frequencies,
                    0.85,
                    EntitySource::Tier2Regex,
                ),
                &mut seen,
                &mut added,
            );
        }

        // Family 2: dosage units
        for caps in DOSAGE_UNIT.captures_iter(text) {
            let value = caps.get(1).unwrap().as_str().replace(',', ".");
            let unit = caps.get(2).unwrap().as_str().to_lowercase();
            push(
                Entity::new(
                    format!("{} {}", value, unit),
                    EntityCategory::Dosages,
                    0.8,
                    EntitySource::Tier2Regex,
                ),
                &mut seen,
                &mut added,
            );
        }

        // Family 3: frequencies
        for m in FREQUENCY_PHRASE.find_iter(text) {
            push(
                Entity::new(
                    normalize_frequency(m.as_str()),
                    EntityCategory::Frequencies,
                    0.8,
                    EntitySource::Tier2Regex,
                ),
                &mut seen,
                &mut added,
            );
        }

        // Family 4: routes
        for m in ROUTE_PHRASE.find_iter(text) {
            push(
                Entity::new(
                    canonical_route(m.as_str()),
                    EntityCategory::Routes,
                    0.85,
                    EntitySource::Tier2Regex,
                ),
                &mut seen,
                &mut added,
            );
        }

        added
    }
}

impl Default for PatternTier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dosage_variants() {
        let tier = PatternTier::new();
        let added = tier.extract("give 2 tablets then 0.5 ml", &[]);
        let dosages: Vec<_> = added
            .iter()
            .filter(|e| e.category == EntityCategory::Dosages)
            .collect();
        assert_eq!(dosages.len(), 2);
        assert_eq!(dosages[0].text, "2 tablets");
        assert_eq!(dosages[1].text, "0.5 ml");
    }

    #[test]
    fn test_hyphenated_frequency() {
        let tier = PatternTier::new();
        let added = tier.extract("take twice-daily with meals", &[]);
        let freqs: Vec<_> = added
            .iter()
            .filter(|e| e.category == EntityCategory::Frequencies)
            .map(|e| e.text.clone())
            .collect();
        assert!(freqs.contains(&"twice daily".to_string()));
        assert!(freqs.contains(&"with meals".to_string()));
    }

    #[test]
    fn test_route_phrases() {
        let tier = PatternTier::new();
        let added = tier.extract("administer by mouth or per rectum", &[]);
        let routes: Vec<_> = added
            .iter()
            .filter(|e| e.category == EntityCategory::Routes)
            .map(|e| e.text.clone())
            .collect();
        assert_eq!(routes, vec!["oral".to_string(), "rectal".to_string()]);
    }

    #[test]
    fn test_never_overrides_existing() {
        let tier = PatternTier::new();
        let existing = vec![Entity::new(
            "twice daily",
            EntityCategory::Frequencies,
            0.95,
            EntitySource::Tier1Lexicon,
        )];
        let added = tier.extract("amoxicillin twice daily", &existing);
        assert!(added
            .iter()
            .all(|e| e.dedup_key() != (EntityCategory::Frequencies, "twice daily".to_string())));
    }

    #[test]
    fn test_spaced_interval() {
        let tier = PatternTier::new();
        let added = tier.extract("morphine q 4 h", &[]);
        assert!(added
            .iter()
            .any(|e| e.category == EntityCategory::Frequencies && e.text == "every 4 hours"));
    }

    #[test]
    fn test_source_is_tier2() {
        let tier = PatternTier::new();
        let added = tier.extract("500 mg PO", &[]);
        assert!(!added.is_empty());
        assert!(added.iter().all(|e| e.source == EntitySource::Tier2Regex));
    }
}
