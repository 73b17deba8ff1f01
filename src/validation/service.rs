/*!
 * Validation service that orchestrates all validators.
 *
 * Runs the placeholder, markup, length-ratio, and glossary checks on
 * one produced translation and aggregates their findings. Issues are
 * serializable so the persistence layer can store them on the version
 * row.
 */

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::glossary;
use super::markup;
use super::placeholders;

/// Configuration for the validation service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Whether validation is enabled at all
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Whether to check placeholder preservation
    #[serde(default = "default_true")]
    pub placeholder_validation: bool,

    /// Whether to check double-bracket markup preservation
    #[serde(default = "default_true")]
    pub markup_validation: bool,

    /// Whether to check the length ratio
    #[serde(default = "default_true")]
    pub length_validation: bool,

    /// Whether to enforce glossary terms
    #[serde(default = "default_true")]
    pub glossary_validation: bool,

    /// Minimum acceptable translated/source length ratio
    #[serde(default = "default_min_ratio")]
    pub length_ratio_min: f64,

    /// Maximum acceptable translated/source length ratio
    #[serde(default = "default_max_ratio")]
    pub length_ratio_max: f64,
}

fn default_true() -> bool {
    true
}

fn default_min_ratio() -> f64 {
    0.3
}

fn default_max_ratio() -> f64 {
    3.0
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            placeholder_validation: true,
            markup_validation: true,
            length_validation: true,
            glossary_validation: true,
            length_ratio_min: default_min_ratio(),
            length_ratio_max: default_max_ratio(),
        }
    }
}

/// Severity of a validation issue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueSeverity {
    /// Translation usable but should be reviewed
    Warning,
    /// Translation is likely broken in-game
    Error,
}

/// Kind of validation issue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    /// Placeholder dropped or invented
    PlaceholderMismatch,
    /// Markup tag dropped or unbalanced
    MarkupMismatch,
    /// Translation suspiciously short or long
    LengthRatio,
    /// Pinned glossary target missing
    GlossaryViolation,
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IssueKind::PlaceholderMismatch => write!(f, "placeholder_mismatch"),
            IssueKind::MarkupMismatch => write!(f, "markup_mismatch"),
            IssueKind::LengthRatio => write!(f, "length_ratio"),
            IssueKind::GlossaryViolation => write!(f, "glossary_violation"),
        }
    }
}

/// One finding on a produced translation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationIssue {
    /// What went wrong
    pub kind: IssueKind,
    /// How bad it is
    pub severity: IssueSeverity,
    /// Human-readable description
    pub message: String,
}

/// Aggregated findings for one translation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationOutcome {
    /// All issues found, errors first
    pub issues: Vec<ValidationIssue>,
}

impl ValidationOutcome {
    /// No issues at all
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    /// Any error-severity issue
    pub fn has_errors(&self) -> bool {
        self.issues.iter().any(|i| i.severity == IssueSeverity::Error)
    }

    /// Serialize issues for storage on the version row
    pub fn to_json(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string(&self.issues)?)
    }
}

/// Runs every configured validator on one translation
#[derive(Debug, Clone, Default)]
pub struct ValidationService {
    config: ValidationConfig,
}

impl ValidationService {
    /// Create a service with default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a service with custom configuration
    pub fn with_config(config: ValidationConfig) -> Self {
        Self { config }
    }

    /// Validate one produced translation against its source
    pub fn validate(
        &self,
        source_text: &str,
        translated_text: &str,
        glossary_terms: &HashMap<String, String>,
    ) -> ValidationOutcome {
        let mut outcome = ValidationOutcome::default();
        if !self.config.enabled {
            return outcome;
        }

        if self.config.placeholder_validation {
            let (missing, invented) = placeholders::diff_placeholders(source_text, translated_text);
            for placeholder in missing {
                outcome.issues.push(ValidationIssue {
                    kind: IssueKind::PlaceholderMismatch,
                    severity: IssueSeverity::Error,
                    message: format!("Placeholder {} missing from translation", placeholder),
                });
            }
            for placeholder in invented {
                outcome.issues.push(ValidationIssue {
                    kind: IssueKind::PlaceholderMismatch,
                    severity: IssueSeverity::Error,
                    message: format!("Placeholder {} not present in source", placeholder),
                });
            }
        }

        if self.config.markup_validation {
            for tag in markup::missing_tags(source_text, translated_text) {
                outcome.issues.push(ValidationIssue {
                    kind: IssueKind::MarkupMismatch,
                    severity: IssueSeverity::Error,
                    message: format!("Markup tag {} missing from translation", tag),
                });
            }
            if markup::balance_degraded(source_text, translated_text) {
                outcome.issues.push(ValidationIssue {
                    kind: IssueKind::MarkupMismatch,
                    severity: IssueSeverity::Error,
                    message: "Markup tags are unbalanced in the translation".to_string(),
                });
            }
        }

        if self.config.length_validation {
            let source_len = source_text.chars().count();
            let translated_len = translated_text.chars().count();
            if source_len > 0 {
                let ratio = translated_len as f64 / source_len as f64;
                if ratio < self.config.length_ratio_min || ratio > self.config.length_ratio_max {
                    outcome.issues.push(ValidationIssue {
                        kind: IssueKind::LengthRatio,
                        severity: IssueSeverity::Warning,
                        message: format!(
                            "Length ratio {:.2} outside [{:.1}, {:.1}]",
                            ratio, self.config.length_ratio_min, self.config.length_ratio_max
                        ),
                    });
                }
            }
        }

        if self.config.glossary_validation {
            for violation in glossary::find_violations(source_text, translated_text, glossary_terms)
            {
                outcome.issues.push(ValidationIssue {
                    kind: IssueKind::GlossaryViolation,
                    severity: IssueSeverity::Warning,
                    message: format!(
                        "Glossary term '{}' should be translated as '{}'",
                        violation.source_term, violation.expected_target
                    ),
                });
            }
        }

        outcome
            .issues
            .sort_by_key(|i| matches!(i.severity, IssueSeverity::Warning));
        outcome
    }
}
