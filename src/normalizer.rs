// Key normalization shared by region mapping lookups.

/// Trims and case-folds a geography code so `" Kerala"` and `"KERALA"` match.
pub fn normalize_key(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Trims a label; returns `None` when nothing is left.
pub fn clean_label(raw: &str) -> Option<&str> {
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}
