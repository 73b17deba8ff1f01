/*!
 * Placeholder validation for translated game strings.
 *
 * Game-mod string tables interpolate values through several placeholder
 * syntaxes; a translation that drops or invents one breaks the game UI:
 * - Curly placeholders: `{0}`, `{name}`
 * - printf-style: `%s`, `%d`
 * - Dollar-delimited variables: `$unit_name$`
 *
 * Also home to the fully-bracketed placeholder check: a source that is
 * nothing but `[SOMETHING]` (single brackets, no nesting) is a token
 * the game engine replaces wholesale and must never be translated,
 * unlike double-bracket markup such as `[[col:y]]`.
 */

use once_cell::sync::Lazy;
use regex::Regex;

/// Curly placeholders: {0}, {name}
static CURLY_PLACEHOLDER_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{[^{}]+\}").expect("Invalid curly placeholder regex"));

/// printf-style placeholders: %s, %d, %1$s
static PRINTF_PLACEHOLDER_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"%(?:\d+\$)?[sdif]").expect("Invalid printf placeholder regex"));

/// Dollar-delimited variables: $unit_name$
static DOLLAR_PLACEHOLDER_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$[A-Za-z_][A-Za-z0-9_]*\$").expect("Invalid dollar placeholder regex"));

/// A source text that is exactly one single-bracket token
static PLACEHOLDER_ONLY_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\[[^\[\]]+\]$").expect("Invalid placeholder-only regex"));

/// Whether the whole source text is a single engine placeholder such as
/// `[PLACEHOLDER]`. Double-bracket markup (`[[col:y]]`) does not match.
pub fn is_placeholder_only(text: &str) -> bool {
    PLACEHOLDER_ONLY_REGEX.is_match(text.trim())
}

/// Extract every placeholder occurrence in order
pub fn extract_placeholders(text: &str) -> Vec<String> {
    let mut found = Vec::new();
    for regex in [
        &*CURLY_PLACEHOLDER_REGEX,
        &*PRINTF_PLACEHOLDER_REGEX,
        &*DOLLAR_PLACEHOLDER_REGEX,
    ] {
        for m in regex.find_iter(text) {
            found.push(m.as_str().to_string());
        }
    }
    found
}

/// Placeholders present in one text but not the other, as
/// (missing_in_translation, invented_in_translation)
pub fn diff_placeholders(source: &str, translation: &str) -> (Vec<String>, Vec<String>) {
    let mut source_placeholders = extract_placeholders(source);
    let mut translated_placeholders = extract_placeholders(translation);

    let mut missing = Vec::new();
    for placeholder in source_placeholders.drain(..) {
        if let Some(pos) = translated_placeholders.iter().position(|p| *p == placeholder) {
            translated_placeholders.remove(pos);
        } else {
            missing.push(placeholder);
        }
    }

    (missing, translated_placeholders)
}
