/// Option value the forms send when the subject is typed in by hand.
pub const OTHER_SUBJECT: &str = "Outro";

/// Free text is stored trimmed and upper-cased.
pub fn normalize(value: &str) -> String {
    value.trim().to_uppercase()
}

pub fn normalize_opt(value: Option<&str>) -> String {
    value.map(normalize).unwrap_or_default()
}

/// Picks the typed-in subject when the dropdown is on "Outro".
pub fn resolve_subject(assunto: Option<&str>, outro_assunto: Option<&str>) -> String {
    match assunto.map(str::trim) {
        Some(OTHER_SUBJECT) => normalize_opt(outro_assunto),
        other => normalize_opt(other),
    }
}

pub fn char_len(value: &str) -> usize {
    value.chars().count()
}
