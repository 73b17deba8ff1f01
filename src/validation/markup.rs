/*!
 * Double-bracket markup validation.
 *
 * Game string tables carry inline markup of the form
 * `[[col:yellow]]text[[/col]]` (also `[[b]]`, `[[img:path]]`, ...). A
 * translation must keep every tag, and paired tags must stay balanced.
 */

use once_cell::sync::Lazy;
use regex::Regex;

/// Any double-bracket tag: [[col:y]], [[/col]], [[b]]
static MARKUP_TAG_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[\[/?[^\[\]]+\]\]").expect("Invalid markup tag regex"));

/// Extract every markup tag in order
pub fn extract_tags(text: &str) -> Vec<String> {
    MARKUP_TAG_REGEX
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Tags present in the source but absent from the translation
pub fn missing_tags(source: &str, translation: &str) -> Vec<String> {
    let mut translated_tags = extract_tags(translation);
    let mut missing = Vec::new();

    for tag in extract_tags(source) {
        if let Some(pos) = translated_tags.iter().position(|t| *t == tag) {
            translated_tags.remove(pos);
        } else {
            missing.push(tag);
        }
    }

    missing
}

/// Whether the translation closes tags in a worse way than the source.
///
/// The source itself may use standalone tags, so balance is compared
/// relative to the source rather than demanded absolutely.
pub fn balance_degraded(source: &str, translation: &str) -> bool {
    unclosed_count(translation) > unclosed_count(source) || crossed(translation)
}

fn unclosed_count(text: &str) -> usize {
    let mut stack: Vec<String> = Vec::new();
    for tag in extract_tags(text) {
        let inner = &tag[2..tag.len() - 2];
        if let Some(name) = inner.strip_prefix('/') {
            if let Some(pos) = stack.iter().rposition(|t| t == name) {
                stack.remove(pos);
            }
        } else {
            let name = inner.split(':').next().unwrap_or(inner);
            stack.push(name.to_string());
        }
    }
    stack.len()
}

fn crossed(text: &str) -> bool {
    let mut stack: Vec<String> = Vec::new();
    for tag in extract_tags(text) {
        let inner = &tag[2..tag.len() - 2];
        if let Some(name) = inner.strip_prefix('/') {
            match stack.last() {
                Some(top) if top == name => {
                    stack.pop();
                }
                Some(_) => return stack.iter().any(|t| t == name),
                None => {}
            }
        } else {
            let name = inner.split(':').next().unwrap_or(inner);
            stack.push(name.to_string());
        }
    }
    false
}
