/*!
 * Validation for produced translations.
 *
 * This module provides quality assurance for translated game strings:
 * - Placeholder preservation ({0}, %s, $var$) and the
 *   fully-bracketed-placeholder exclusion check
 * - Double-bracket markup preservation ([[col:y]] ... [[/col]])
 * - Length-ratio sanity
 * - Glossary term enforcement
 *
 * # Architecture
 *
 * - `placeholders`: placeholder extraction and diffing
 * - `markup`: markup tag extraction and balance checks
 * - `glossary`: pinned-term enforcement
 * - `service`: orchestrates all validators
 */

pub mod glossary;
pub mod markup;
pub mod placeholders;
pub mod service;

// Re-export main types
pub use placeholders::is_placeholder_only;
pub use service::{
    IssueKind, IssueSeverity, ValidationConfig, ValidationIssue, ValidationOutcome,
    ValidationService,
};
