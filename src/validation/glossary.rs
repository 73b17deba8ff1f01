/*!
 * Glossary enforcement.
 *
 * When the translation context pins a term (e.g. "Shield Wall" ->
 * "Mur de boucliers"), a translation of a source containing that term
 * must contain the pinned target. Matching is case-insensitive on both
 * sides; the check is a warning, not an error, because inflected forms
 * are legitimate in many languages.
 */

use std::collections::HashMap;

/// One violated glossary term
#[derive(Debug, Clone, PartialEq)]
pub struct GlossaryViolation {
    /// Term as it appears in the glossary source column
    pub source_term: String,
    /// Required target term that was not found
    pub expected_target: String,
}

/// Find glossary terms present in the source whose pinned target is
/// absent from the translation
pub fn find_violations(
    source: &str,
    translation: &str,
    glossary_terms: &HashMap<String, String>,
) -> Vec<GlossaryViolation> {
    if glossary_terms.is_empty() {
        return Vec::new();
    }

    let source_lower = source.to_lowercase();
    let translation_lower = translation.to_lowercase();

    let mut violations: Vec<GlossaryViolation> = glossary_terms
        .iter()
        .filter(|(term, _)| source_lower.contains(&term.to_lowercase()))
        .filter(|(_, target)| !translation_lower.contains(&target.to_lowercase()))
        .map(|(term, target)| GlossaryViolation {
            source_term: term.clone(),
            expected_target: target.clone(),
        })
        .collect();

    // Deterministic order for serialized issues.
    violations.sort_by(|a, b| a.source_term.cmp(&b.source_term));
    violations
}
