//! Clinical abbreviation expansion.
//!
//! Maps shorthand tokens to their expanded forms and the entity category
//! the expansion belongs to. `q8h`-style interval shorthand is handled by
//! regex in the pattern tiers, not here.

use crate::entity::EntityCategory;

/// `lowercased token → (expansion, category)`
pub static ABBREVIATIONS: phf::Map<&'static str, (&'static str, EntityCategory)> = phf::phf_map! {
    // Frequencies
    "bid" => ("twice daily", EntityCategory::Frequencies),
    "tid" => ("three times daily", EntityCategory::Frequencies),
    "qid" => ("four times daily", EntityCategory::Frequencies),
    "qd" => ("once daily", EntityCategory::Frequencies),
    "qod" => ("every other day", EntityCategory::Frequencies),
    "qhs" => ("at bedtime", EntityCategory::Frequencies),
    "hs" => ("at bedtime", EntityCategory::Frequencies),
    "prn" => ("as needed", EntityCategory::Frequencies),
    "ac" => ("before meals", EntityCategory::Frequencies),
    "pc" => ("after meals", EntityCategory::Frequencies),
    "qam" => ("every morning", EntityCategory::Frequencies),
    "qpm" => ("every evening", EntityCategory::Frequencies),
    // Routes
    "po" => ("oral", EntityCategory::Routes),
    "iv" => ("intravenous", EntityCategory::Routes),
    "im" => ("intramuscular", EntityCategory::Routes),
    "sc" => ("subcutaneous", EntityCategory::Routes),
    "sq" => ("subcutaneous", EntityCategory::Routes),
    "subq" => ("subcutaneous", EntityCategory::Routes),
    "sl" => ("sublingual", EntityCategory::Routes),
    "pr" => ("rectal", EntityCategory::Routes),
    "inh" => ("inhaled", EntityCategory::Routes),
    "td" => ("transdermal", EntityCategory::Routes),
};

/// Expand a single token if it is a known abbreviation.
pub fn expand(token: &str) -> Option<(&'static str, EntityCategory)> {
    ABBREVIATIONS.get(token.to_lowercase().as_str()).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frequency_abbreviations() {
        assert_eq!(
            expand("BID"),
            Some(("twice daily", EntityCategory::Frequencies))
        );
        assert_eq!(
            expand("qhs"),
            Some(("at bedtime", EntityCategory::Frequencies))
        );
    }

    #[test]
    fn test_route_abbreviations() {
        assert_eq!(expand("PO"), Some(("oral", EntityCategory::Routes)));
        assert_eq!(expand("iv"), Some(("intravenous", EntityCategory::Routes)));
    }

    #[test]
    fn test_unknown_token() {
        assert_eq!(expand("xyz"), None);
    }
}
