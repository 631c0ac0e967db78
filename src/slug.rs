//! Display-name to URL-safe slug normalization.

/// Normalizes an entity name into a lowercase, hyphen-separated ASCII slug.
///
/// Non-ASCII letters are transliterated first. Quote characters and commas
/// grouping digits (`1,000`) are removed without splitting the word. Every
/// other run of characters outside `[a-z0-9]` collapses into a single `-`,
/// and leading/trailing separators are dropped. Applying it to its own output
/// returns the same string.
pub fn slugify(value: &str) -> String {
    let transliterated: Vec<char> = deunicode::deunicode(value).chars().collect();
    let mut slug = String::with_capacity(transliterated.len());
    let mut pending_separator = false;
    for (index, &ch) in transliterated.iter().enumerate() {
        if is_quote(ch) || is_digit_group_comma(&transliterated, index) {
            continue;
        }
        if ch.is_ascii_alphanumeric() {
            if pending_separator && !slug.is_empty() {
                slug.push('-');
            }
            pending_separator = false;
            slug.push(ch.to_ascii_lowercase());
        } else {
            pending_separator = true;
        }
    }
    slug
}

fn is_quote(ch: char) -> bool {
    matches!(ch, '\'' | '"' | '\u{2018}' | '\u{2019}')
}

fn is_digit_group_comma(chars: &[char], index: usize) -> bool {
    chars[index] == ','
        && index > 0
        && chars[index - 1].is_ascii_digit()
        && chars.get(index + 1).is_some_and(char::is_ascii_digit)
}
