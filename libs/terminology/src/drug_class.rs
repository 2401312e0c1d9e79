//! Drug-class membership for the medication–allergy cross-check.
//!
//! The check is deliberately bounded: substance-level name match plus
//! membership in a small set of cross-reactive classes. It is not a
//! drug-interaction engine.

use phf::phf_map;
use serde::{Deserialize, Serialize};

use crate::normalize;

/// `normalized drug name → classes it belongs to`
static DRUG_CLASSES: phf::Map<&'static str, &'static [&'static str]> = phf_map! {
    "penicillin" => &["penicillins"],
    "penicillin v" => &["penicillins"],
    "penicillin g" => &["penicillins"],
    "amoxicillin" => &["penicillins"],
    "amoxicillin clavulanate" => &["penicillins"],
    "ampicillin" => &["penicillins"],
    "piperacillin" => &["penicillins"],
    "dicloxacillin" => &["penicillins"],
    "nafcillin" => &["penicillins"],
    "cephalexin" => &["cephalosporins"],
    "ceftriaxone" => &["cephalosporins"],
    "cefazolin" => &["cephalosporins"],
    "cefuroxime" => &["cephalosporins"],
    "cefepime" => &["cephalosporins"],
    "sulfamethoxazole" => &["sulfonamides"],
    "trimethoprim sulfamethoxazole" => &["sulfonamides"],
    "sulfasalazine" => &["sulfonamides"],
    "azithromycin" => &["macrolides"],
    "erythromycin" => &["macrolides"],
    "clarithromycin" => &["macrolides"],
    "ciprofloxacin" => &["fluoroquinolones"],
    "levofloxacin" => &["fluoroquinolones"],
    "moxifloxacin" => &["fluoroquinolones"],
    "aspirin" => &["nsaids", "salicylates"],
    "ibuprofen" => &["nsaids"],
    "naproxen" => &["nsaids"],
    "ketorolac" => &["nsaids"],
    "morphine" => &["opioids"],
    "oxycodone" => &["opioids"],
    "hydromorphone" => &["opioids"],
    "fentanyl" => &["opioids"],
    "codeine" => &["opioids"],
    "tramadol" => &["opioids"],
    "atorvastatin" => &["statins"],
    "simvastatin" => &["statins"],
    "rosuvastatin" => &["statins"],
    "heparin" => &["heparins"],
    "enoxaparin" => &["heparins"],
};

/// Class names an allergen string may itself denote ("penicillin allergy",
/// "allergic to sulfa drugs").
static ALLERGEN_CLASS_ALIASES: phf::Map<&'static str, &'static str> = phf_map! {
    "penicillins" => "penicillins",
    "cephalosporins" => "cephalosporins",
    "sulfa" => "sulfonamides",
    "sulfa drugs" => "sulfonamides",
    "sulfonamides" => "sulfonamides",
    "macrolides" => "macrolides",
    "fluoroquinolones" => "fluoroquinolones",
    "nsaids" => "nsaids",
    "opioids" => "opioids",
    "statins" => "statins",
};

/// Classes the given drug name belongs to. Empty for unknown drugs.
pub fn classes_of(name: &str) -> &'static [&'static str] {
    DRUG_CLASSES
        .get(normalize(name).as_str())
        .copied()
        .unwrap_or(&[])
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictKind {
    /// Allergen and medication are the same substance.
    SameSubstance,
    /// Medication shares a cross-reactive class with the allergen.
    SameClass,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllergyConflict {
    pub kind: ConflictKind,
    /// The shared class for [`ConflictKind::SameClass`], the substance
    /// name otherwise.
    pub shared: String,
}

/// Does ordering `medication` conflict with a documented `allergen`?
pub fn allergy_conflict(allergen: &str, medication: &str) -> Option<AllergyConflict> {
    let allergen_norm = normalize(allergen);
    let medication_norm = normalize(medication);
    if allergen_norm.is_empty() || medication_norm.is_empty() {
        return None;
    }

    if allergen_norm == medication_norm {
        return Some(AllergyConflict {
            kind: ConflictKind::SameSubstance,
            shared: medication_norm,
        });
    }

    let medication_classes = classes_of(medication);

    // Allergen given as a class name ("sulfa drugs")
    if let Some(class) = ALLERGEN_CLASS_ALIASES.get(allergen_norm.as_str()) {
        if medication_classes.contains(class) {
            return Some(AllergyConflict {
                kind: ConflictKind::SameClass,
                shared: (*class).to_string(),
            });
        }
    }

    // Allergen given as a substance ("penicillin") sharing a class
    for class in classes_of(allergen) {
        if medication_classes.contains(class) {
            return Some(AllergyConflict {
                kind: ConflictKind::SameClass,
                shared: (*class).to_string(),
            });
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_penicillin_amoxicillin_cross_class() {
        let conflict = allergy_conflict("Penicillin", "Amoxicillin").unwrap();
        assert_eq!(conflict.kind, ConflictKind::SameClass);
        assert_eq!(conflict.shared, "penicillins");
    }

    #[test]
    fn test_same_substance() {
        let conflict = allergy_conflict("warfarin", "Warfarin").unwrap();
        assert_eq!(conflict.kind, ConflictKind::SameSubstance);
    }

    #[test]
    fn test_class_alias_allergen() {
        let conflict = allergy_conflict("sulfa drugs", "sulfamethoxazole").unwrap();
        assert_eq!(conflict.kind, ConflictKind::SameClass);
        assert_eq!(conflict.shared, "sulfonamides");
    }

    #[test]
    fn test_no_conflict_across_unrelated_drugs() {
        assert!(allergy_conflict("penicillin", "warfarin").is_none());
        assert!(allergy_conflict("", "warfarin").is_none());
    }

    #[test]
    fn test_classes_of_unknown_is_empty() {
        assert!(classes_of("unobtainium").is_empty());
    }
}
