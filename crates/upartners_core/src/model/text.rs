//! Small text helpers shared by label and case models.

/// Splits a comma-separated value, trimming entries and dropping empties.
pub fn parse_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

/// Truncates `text` to at most `max_chars` characters.
///
/// When text is cut, the result ends with `...` and still fits `max_chars`.
/// Limits too small for the suffix get a plain cut.
pub fn truncate(text: &str, max_chars: usize) -> String {
    const SUFFIX: &str = "...";
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    if max_chars <= SUFFIX.len() {
        return text.chars().take(max_chars).collect();
    }
    let keep = max_chars.saturating_sub(SUFFIX.len());
    let mut out: String = text.chars().take(keep).collect();
    out.push_str(SUFFIX);
    out
}
