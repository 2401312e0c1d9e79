//! Embedded terminology corpus.
//!
//! A deliberately bounded slice of each code system: enough coverage for
//! common ambulatory orders. Entries are `(code, display)`; displays are
//! what lookup normalizes against.

/// RxNorm ingredient-level concepts.
pub(crate) static RXNORM: &[(&str, &str)] = &[
    ("161", "acetaminophen"),
    ("435", "albuterol"),
    ("596", "alprazolam"),
    ("17767", "amlodipine"),
    ("703", "amiodarone"),
    ("723", "amoxicillin"),
    ("19711", "amoxicillin / clavulanate"),
    ("733", "ampicillin"),
    ("1364430", "apixaban"),
    ("1191", "aspirin"),
    ("83367", "atorvastatin"),
    ("18631", "azithromycin"),
    ("19831", "budesonide"),
    ("20352", "carvedilol"),
    ("2231", "cephalexin"),
    ("2193", "ceftriaxone"),
    ("2551", "ciprofloxacin"),
    ("2582", "clindamycin"),
    ("32968", "clopidogrel"),
    ("2670", "codeine"),
    ("3407", "digoxin"),
    ("3443", "diltiazem"),
    ("3640", "doxycycline"),
    ("67108", "enoxaparin"),
    ("321988", "escitalopram"),
    ("4337", "fentanyl"),
    ("4493", "fluoxetine"),
    ("41126", "fluticasone"),
    ("4603", "furosemide"),
    ("25480", "gabapentin"),
    ("5224", "heparin"),
    ("5487", "hydrochlorothiazide"),
    ("3423", "hydromorphone"),
    ("5552", "hydroxyurea"),
    ("5640", "ibuprofen"),
    ("5856", "insulin"),
    ("10582", "levothyroxine"),
    ("29046", "lisinopril"),
    ("6470", "lorazepam"),
    ("52175", "losartan"),
    ("6809", "metformin"),
    ("6918", "metoprolol"),
    ("6922", "metronidazole"),
    ("88249", "montelukast"),
    ("7052", "morphine"),
    ("7258", "naproxen"),
    ("7646", "omeprazole"),
    ("26225", "ondansetron"),
    ("7804", "oxycodone"),
    ("40790", "pantoprazole"),
    ("7980", "penicillin v"),
    ("7984", "penicillin g"),
    ("8588", "piperacillin"),
    ("8640", "prednisone"),
    ("1114195", "rivaroxaban"),
    ("301542", "rosuvastatin"),
    ("36437", "sertraline"),
    ("36567", "simvastatin"),
    ("9997", "spironolactone"),
    ("10180", "sulfamethoxazole"),
    ("77492", "tamsulosin"),
    ("10689", "tramadol"),
    ("10829", "trimethoprim"),
    ("11124", "vancomycin"),
    ("11289", "warfarin"),
];

/// LOINC lab panels, common analytes, and vital signs.
pub(crate) static LOINC: &[(&str, &str)] = &[
    // Panels and common labs
    ("58410-2", "CBC panel - Blood by Automated count"),
    ("24323-8", "Comprehensive metabolic panel"),
    ("51990-0", "Basic metabolic panel"),
    ("57698-3", "Lipid panel with direct LDL"),
    ("4548-4", "Hemoglobin A1c"),
    ("3016-3", "TSH"),
    ("24356-8", "Urinalysis complete panel"),
    ("2339-0", "Glucose [Mass/volume] in Blood"),
    ("2160-0", "Creatinine [Mass/volume] in Serum or Plasma"),
    ("3094-0", "BUN"),
    ("2823-3", "Potassium [Moles/volume] in Serum or Plasma"),
    ("2951-2", "Sodium [Moles/volume] in Serum or Plasma"),
    ("718-7", "Hemoglobin [Mass/volume] in Blood"),
    ("777-3", "Platelets [#/volume] in Blood"),
    ("6690-2", "Leukocytes [#/volume] in Blood"),
    ("10839-9", "Troponin I"),
    ("30934-4", "Natriuretic peptide B"),
    ("5902-2", "Prothrombin time"),
    ("34714-6", "INR"),
    ("48065-7", "D-dimer"),
    ("1975-2", "Bilirubin total"),
    ("1742-6", "ALT"),
    ("1920-8", "AST"),
    ("2885-2", "Protein total"),
    ("17861-6", "Calcium total"),
    ("2532-0", "Lactate dehydrogenase"),
    ("4092-3", "Vancomycin trough"),
    ("600-7", "Blood culture"),
    ("630-4", "Urine culture"),
    // Vital signs
    ("85354-9", "Blood pressure panel"),
    ("8480-6", "Systolic blood pressure"),
    ("8462-4", "Diastolic blood pressure"),
    ("8867-4", "Heart rate"),
    ("9279-1", "Respiratory rate"),
    ("8310-5", "Body temperature"),
    ("2708-6", "Oxygen saturation in Arterial blood"),
    ("29463-7", "Body weight"),
    ("8302-2", "Body height"),
    ("39156-5", "Body mass index"),
];

/// SNOMED CT findings and procedures.
pub(crate) static SNOMED: &[(&str, &str)] = &[
    // Findings
    ("29857009", "Chest pain"),
    ("417357006", "Sickle cell disease"),
    ("38341003", "Hypertension"),
    ("44054006", "Diabetes mellitus type 2"),
    ("46635009", "Diabetes mellitus type 1"),
    ("195967001", "Asthma"),
    ("233604007", "Pneumonia"),
    ("13645005", "Chronic obstructive pulmonary disease"),
    ("49436004", "Atrial fibrillation"),
    ("84114007", "Heart failure"),
    ("55822004", "Hyperlipidemia"),
    ("35489007", "Depression"),
    ("48694002", "Anxiety"),
    ("37796009", "Migraine"),
    ("271807003", "Rash"),
    ("386661006", "Fever"),
    ("49727002", "Cough"),
    ("25064002", "Headache"),
    ("422587007", "Nausea"),
    ("267036007", "Shortness of breath"),
    ("68566005", "Urinary tract infection"),
    ("271737000", "Anemia"),
    ("40930008", "Hypothyroidism"),
    ("235595009", "Gastroesophageal reflux disease"),
    ("396275006", "Osteoarthritis"),
    ("230690007", "Stroke"),
    ("91175000", "Seizure"),
    ("76948002", "Severe pain"),
    ("57676002", "Joint pain"),
    ("62315008", "Diarrhea"),
    ("267064002", "Insomnia"),
    ("66857006", "Hemoptysis"),
    ("23924001", "Tight chest"),
    // Reaction manifestations
    ("39579001", "Anaphylaxis"),
    ("247472004", "Urticaria"),
    ("418290006", "Itching"),
    ("267037003", "Swelling"),
    // Procedures
    ("73761001", "Colonoscopy"),
    ("80146002", "Appendectomy"),
    ("40701008", "Echocardiography"),
    ("29303009", "Electrocardiogram"),
    ("399208008", "Chest x-ray"),
    ("71388002", "Procedure"),
    ("387713003", "Surgical procedure"),
    ("18946005", "Epidural anesthesia"),
    ("265764009", "Renal dialysis"),
    ("232717009", "Coronary artery bypass graft"),
];

/// ICD-10-CM heads for common diagnoses.
pub(crate) static ICD10CM: &[(&str, &str)] = &[
    ("I10", "Essential (primary) hypertension"),
    ("E11.9", "Type 2 diabetes mellitus without complications"),
    ("J45.909", "Unspecified asthma, uncomplicated"),
    ("J18.9", "Pneumonia, unspecified organism"),
    ("I48.91", "Unspecified atrial fibrillation"),
    ("I50.9", "Heart failure, unspecified"),
    ("E78.5", "Hyperlipidemia, unspecified"),
    ("F32.9", "Major depressive disorder, single episode, unspecified"),
    ("R07.9", "Chest pain, unspecified"),
    ("D57.1", "Sickle-cell disease without crisis"),
    ("N39.0", "Urinary tract infection, site not specified"),
    ("E03.9", "Hypothyroidism, unspecified"),
    ("K21.9", "Gastro-esophageal reflux disease without esophagitis"),
    ("G43.909", "Migraine, unspecified, not intractable"),
    ("R50.9", "Fever, unspecified"),
    ("R05", "Cough"),
    ("R51", "Headache"),
];

/// CVX vaccine codes.
pub(crate) static CVX: &[(&str, &str)] = &[
    ("141", "Influenza, seasonal, injectable"),
    ("03", "MMR"),
    ("21", "Varicella"),
    ("33", "Pneumococcal polysaccharide PPV23"),
    ("133", "Pneumococcal conjugate PCV 13"),
    ("115", "Tdap"),
    ("43", "Hep B, adult"),
    ("52", "Hep A, adult"),
    ("187", "Zoster recombinant"),
    ("208", "COVID-19, mRNA, BNT162b2"),
    ("207", "COVID-19, mRNA, mRNA-1273"),
];

/// UCUM unit codes with their common print symbols.
pub(crate) static UCUM: &[(&str, &str)] = &[
    ("mg", "mg"),
    ("g", "g"),
    ("ug", "mcg"),
    ("kg", "kg"),
    ("mL", "mL"),
    ("L", "L"),
    ("mg/dL", "mg/dL"),
    ("mmol/L", "mmol/L"),
    ("mm[Hg]", "mmHg"),
    ("%", "percent"),
    ("/min", "per minute"),
    ("Cel", "degrees Celsius"),
    ("[degF]", "degrees Fahrenheit"),
    ("U/L", "U/L"),
    ("[IU]", "international unit"),
];
