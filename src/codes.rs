// Fixed code tables shared by the primitive synthesizer, the generator's
// shape rules and the repair rules.

pub const LANGUAGES_VALUE_SET: &str = "http://hl7.org/fhir/ValueSet/languages";
pub const LANGUAGE_SYSTEM: &str = "urn:ietf:bcp:47";
/// Sentinel language for every language-bound code: English (US).
pub const DEFAULT_LANGUAGE: &str = "en-US";
pub const DEFAULT_LANGUAGE_DISPLAY: &str = "English (United States)";

pub const MIME_TYPES_VALUE_SET: &str = "http://hl7.org/fhir/ValueSet/mimetypes";

/// Registered MIME types sampled for mime-bound codes and attachments.
pub const MIME_TYPES: &[&str] = &[
    "application/fhir+json",
    "application/fhir+xml",
    "application/json",
    "application/pdf",
    "application/xml",
    "audio/mpeg",
    "image/gif",
    "image/jpeg",
    "image/png",
    "text/csv",
    "text/html",
    "text/plain",
    "video/mp4",
];

pub const UCUM_SYSTEM: &str = "http://unitsofmeasure.org";
pub const UCUM_UNITS: &[&str] = &[
    "mg", "g", "kg", "mL", "L", "cm", "m", "mmol/L", "mm[Hg]", "/min",
];
pub const DEFAULT_UNIT: &str = "mg";
pub const TIME_UNITS: &[&str] = &["s", "min", "h", "d", "wk", "mo", "a"];
pub const DEFAULT_TIME_UNIT: &str = "h";
pub const AGE_UNIT: &str = "a";
pub const PERCENT_UNIT: &str = "%";

pub const MARITAL_STATUS_SYSTEM: &str = "http://terminology.hl7.org/CodeSystem/v3-MaritalStatus";
pub const MARITAL_STATUS: &[(&str, &str)] = &[
    ("A", "Annulled"),
    ("D", "Divorced"),
    ("I", "Interlocutory"),
    ("L", "Legally Separated"),
    ("M", "Married"),
    ("P", "Polygamous"),
    ("S", "Never Married"),
    ("T", "Domestic partner"),
    ("U", "unmarried"),
    ("W", "Widowed"),
];

pub const LOINC_SYSTEM: &str = "http://loinc.org";
pub const BODY_WEIGHT: (&str, &str) = ("29463-7", "Body weight");

pub const PARTICIPATION_TYPE_SYSTEM: &str =
    "http://terminology.hl7.org/CodeSystem/v3-ParticipationType";
pub const ATTENDER: (&str, &str) = ("ATND", "attender");

/// Tag stamped on every generated resource's metadata envelope.
pub const SYNTHETIC_TAG_SYSTEM: &str = "http://terminology.hl7.org/CodeSystem/v3-ActReason";
pub const SYNTHETIC_TAG_CODE: &str = "HTEST";
pub const SYNTHETIC_TAG_DISPLAY: &str = "test health data";

pub const URI_IDENTIFIER_SYSTEM: &str = "urn:ietf:rfc:3986";
pub const DEFAULT_URI_NAMESPACE: &str = "http://synthetic.example.org/";

pub fn marital_status_display(code: &str) -> Option<&'static str> {
    MARITAL_STATUS
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, display)| *display)
}

pub fn is_ucum_unit(code: &str) -> bool {
    UCUM_UNITS.contains(&code)
}

pub fn is_time_unit(code: &str) -> bool {
    TIME_UNITS.contains(&code)
}

pub fn is_mime_type(code: &str) -> bool {
    MIME_TYPES.contains(&code)
}
