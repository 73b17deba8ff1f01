/*!
 * Tests for translation validation rules
 */

use std::collections::HashMap;

use modtrans::validation::{
    IssueKind, IssueSeverity, ValidationConfig, ValidationService, is_placeholder_only,
};

fn glossary(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(s, t)| (s.to_string(), t.to_string()))
        .collect()
}

#[test]
fn test_placeholderOnly_engineTokens_shouldBeExcluded() {
    assert!(is_placeholder_only("[PLACEHOLDER]"));
    assert!(is_placeholder_only("[player_faction]"));
}

#[test]
fn test_placeholderOnly_markupAndProse_shouldBeTranslatable() {
    // Double-bracket markup is content, not an engine token.
    assert!(!is_placeholder_only("[[col:y]]text[[/col]]"));
    assert!(!is_placeholder_only("Defend the [settlement] walls"));
}

#[test]
fn test_validate_gameString_withAllSyntaxes_shouldPassWhenPreserved() {
    let service = ValidationService::new();
    let outcome = service.validate(
        "[[col:y]]{0} gold[[/col]] for $unit_name$",
        "[[col:y]]{0} or[[/col]] pour $unit_name$",
        &HashMap::new(),
    );

    assert!(outcome.is_clean(), "issues: {:?}", outcome.issues);
}

#[test]
fn test_validate_dollarVariableDropped_shouldBeError() {
    let service = ValidationService::new();
    let outcome = service.validate(
        "Recruit $unit_name$ now",
        "Recrutez maintenant",
        &HashMap::new(),
    );

    assert!(outcome.has_errors());
    assert!(outcome.issues.iter().any(|i| {
        i.kind == IssueKind::PlaceholderMismatch && i.message.contains("$unit_name$")
    }));
}

#[test]
fn test_validate_markupReordered_butPresent_shouldPass() {
    let service = ValidationService::new();
    let outcome = service.validate(
        "[[b]]Charge[[/b]] the [[col:r]]enemy[[/col]]",
        "Chargez l'[[col:r]]ennemi[[/col]] [[b]]maintenant[[/b]]",
        &HashMap::new(),
    );

    assert!(!outcome.has_errors(), "issues: {:?}", outcome.issues);
}

#[test]
fn test_validate_glossaryAndLength_shouldBothBeWarnings() {
    let service = ValidationService::with_config(ValidationConfig {
        length_ratio_max: 1.5,
        ..Default::default()
    });
    let terms = glossary(&[("Shield Wall", "Mur de boucliers")]);

    let outcome = service.validate(
        "Shield Wall",
        "Une formation defensive tres longue sans le terme attendu",
        &terms,
    );

    assert!(!outcome.has_errors());
    let kinds: Vec<IssueKind> = outcome.issues.iter().map(|i| i.kind).collect();
    assert!(kinds.contains(&IssueKind::GlossaryViolation));
    assert!(kinds.contains(&IssueKind::LengthRatio));
    assert!(
        outcome
            .issues
            .iter()
            .all(|i| i.severity == IssueSeverity::Warning)
    );
}

#[test]
fn test_validate_issuesSerialization_shouldBeStableJson() {
    let service = ValidationService::new();
    let outcome = service.validate("Pay {0}", "Payer", &HashMap::new());

    let json = outcome.to_json().unwrap();
    assert!(json.contains("placeholder_mismatch"));
    assert!(json.contains("error"));
}
