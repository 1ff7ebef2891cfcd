//! Fixed vocabularies used for indexing and filtering.

/// Imaging modality codes.
pub const MODALITY_CODES: &[&str] = &[
    "CT", "FL", "MR", "NM", "PET", "US", "XR", "DXA", "MG", "DX", "CR", "RF", "SC",
];

/// Radiology subspecialty codes.
pub const SUBSPECIALTY_CODES: &[&str] = &[
    "AB", "BR", "CA", "CH", "ER", "GI", "GU", "HN", "IR", "MI", "MK", "NR", "OB", "OI", "OT",
    "PD", "QI", "RS", "VI",
];

/// Use-case categories.
pub const USE_CATEGORIES: &[&str] = &[
    "Classification",
    "Detection",
    "Segmentation",
    "Foundation",
    "LLM",
    "Generative",
    "Other",
];

const LABELS: &[(&str, &str)] = &[
    ("AB", "Abdomen"),
    ("BQ", "Biomarkers"),
    ("BR", "Breast"),
    ("CA", "Cardiac Radiology"),
    ("CH", "Chest Radiology"),
    ("CT", "Computed Tomography"),
    ("DM", "Digital Mammography"),
    ("DX", "Digital Radiography"),
    ("DXA", "DEXA"),
    ("ED", "Education"),
    ("ER", "Emergency Radiology"),
    ("FL", "Fluoroscopy"),
    ("GI", "Gastrointestinal Radiology"),
    ("GU", "Genitourinary Radiology"),
    ("HN", "Head and Neck"),
    ("HP", "Health Policy"),
    ("IN", "Informatics"),
    ("IR", "Interventional"),
    ("LM", "Leadership & Management"),
    ("MG", "Mammography"),
    ("MI", "Molecular Imaging"),
    ("MK", "Musculoskeletal Radiology"),
    ("MR", "Magnetic Resonance Imaging"),
    ("NM", "Nuclear Medicine"),
    ("NR", "Neuroradiology"),
    ("OB", "Obstetric/Gynecologic Radiology"),
    ("OI", "Oncologic Imaging"),
    ("OT", "Other"),
    ("PD", "Pediatric Radiology"),
    ("PET", "Positron Emission Tomography"),
    ("PH", "Physics and Basic Science"),
    ("PR", "Professionalism"),
    ("QI", "Quantitative Imaging"),
    ("RF", "Fluoroscopy"),
    ("RO", "Radiation Oncology"),
    ("RS", "Research and Statistical Methods"),
    ("SC", "Secondary Capture"),
    ("SQ", "Quality Assurance"),
    ("US", "Ultrasound"),
    ("VA", "Vascular"),
    ("VI", "Vascular"),
    ("XR", "X-ray"),
];

pub fn is_modality(code: &str) -> bool {
    MODALITY_CODES.contains(&code)
}

pub fn is_subspecialty(code: &str) -> bool {
    SUBSPECIALTY_CODES.contains(&code)
}

pub fn is_use_category(value: &str) -> bool {
    USE_CATEGORIES.contains(&value)
}

/// Human-readable label for a code; unknown codes map to themselves.
pub fn label(code: &str) -> &str {
    LABELS
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, l)| *l)
        .unwrap_or(code)
}
