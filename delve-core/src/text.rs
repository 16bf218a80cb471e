//! Small text helpers shared by the digest, the LLM layer and the tool crate.

/// Collapse every run of whitespace into a single space and trim the ends.
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Longest prefix of `s` holding at most `max_chars` characters.
///
/// Never splits a UTF-8 sequence.
pub fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Number of characters (not bytes) in `s`.
pub fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Strip list markers such as `1.`, `2)`, `-`, `*` and surrounding quotes
/// or bold markers from a line of LLM output.
pub fn strip_list_marker(line: &str) -> &str {
    let trimmed = line.trim();
    let without_number = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .filter(|&pos| pos > 0)
        .and_then(|pos| {
            let rest = &trimmed[pos..];
            rest.strip_prefix('.')
                .or_else(|| rest.strip_prefix(')'))
                .or_else(|| rest.strip_prefix(':'))
        })
        .unwrap_or(trimmed);
    let without_bullet = without_number
        .trim_start()
        .strip_prefix(['-', '*', '•'])
        .unwrap_or(without_number);
    without_bullet
        .trim()
        .trim_matches('*')
        .trim_matches(|c| c == '"' || c == '\'' || c == '`')
        .trim()
}
