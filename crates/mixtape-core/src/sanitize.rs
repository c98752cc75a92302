//! Free-text to file-system-safe name conversion.

/// Maximum stem length produced for generated file names.
pub const MAX_STEM_LEN: usize = 255;

/// Sanitize free text for use as a file name stem.
///
/// Lower-cases the input, strips every character that is not alphanumeric or
/// whitespace, collapses whitespace runs to a single underscore, trims
/// leading/trailing separators, and truncates to `max_length` characters.
/// Never fails; empty input yields an empty string.
#[must_use]
pub fn sanitize(text: &str, max_length: usize) -> String {
    let kept: String = text
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();

    // split_whitespace drops leading/trailing runs, so no separate trim pass
    let joined = kept.split_whitespace().collect::<Vec<_>>().join("_");
    joined.chars().take(max_length).collect()
}

/// Sanitize `text`, substituting `fallback` when nothing survives.
#[must_use]
pub fn sanitize_or(text: &str, fallback: &str) -> String {
    let stem = sanitize(text, MAX_STEM_LEN);
    if stem.is_empty() {
        fallback.to_string()
    } else {
        stem
    }
}
