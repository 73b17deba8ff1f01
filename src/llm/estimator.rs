/*!
 * Token estimation for LLM translation requests.
 *
 * Purely functional. Tokenization is provider-approximated (chars / 4);
 * exact equivalence with any provider's tokenizer is a non-goal.
 */

use std::collections::BTreeMap;

use crate::domain::{TranslationContext, TranslationUnit};
use crate::services::PromptBundle;

/// Provider context-window ceiling assumed for batch sizing
const PROVIDER_TOKEN_CEILING: usize = 200_000;

/// Fraction of the ceiling reserved as safety margin
const SAFETY_MARGIN: f64 = 0.4;

/// Smallest response budget ever requested
const MIN_RESPONSE_TOKENS: u32 = 1_000;

/// Largest response budget ever requested
const MAX_RESPONSE_TOKENS: u32 = 80_000;

/// Per-unit JSON envelope overhead in tokens (braces, quoting, ids)
const JSON_OVERHEAD_TOKENS: usize = 35;

/// Units sampled when averaging per-unit cost
const SAMPLE_SIZE: usize = 10;

/// Batch-size ceiling when the context leaves sizing in auto mode
const MAX_AUTO_BATCH: usize = 1_000;

/// Approximate token count of a text (chars / 4, rounded up)
pub fn estimate_text_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

/// Response-size ceiling to request from the provider for a set of
/// texts: generous enough for the translations plus JSON overhead,
/// clamped to `[1000, 80000]`.
pub fn estimate_max_tokens(texts: &BTreeMap<String, String>) -> u32 {
    let total_chars: usize = texts.values().map(|t| t.chars().count()).sum();
    let by_chars = (total_chars as f64 / 4.0) * 1.3 + 500.0;
    let by_units = (texts.len() * 150 + 500) as f64;

    let estimate = by_chars.max(by_units) as u32;
    estimate.clamp(MIN_RESPONSE_TOKENS, MAX_RESPONSE_TOKENS)
}

/// How many units fit in one provider call.
///
/// Sums the fixed prompt context, samples up to ten units for the
/// average per-unit cost (key + source counted twice for the response +
/// JSON overhead), and divides the safe budget by it.
pub fn calculate_optimal_batch_size(
    prompt: &PromptBundle,
    units: &[TranslationUnit],
    context: &TranslationContext,
) -> usize {
    if units.is_empty() {
        return 1;
    }

    let mut fixed_tokens = estimate_text_tokens(&prompt.system_message);
    if let Some(ref game_context) = context.game_context {
        fixed_tokens += estimate_text_tokens(game_context);
    }
    if let Some(ref project_context) = prompt.project_context {
        fixed_tokens += estimate_text_tokens(project_context);
    }
    for (source, target) in &prompt.few_shot_examples {
        fixed_tokens += estimate_text_tokens(source) + estimate_text_tokens(target);
    }
    for (source, target) in &context.glossary_terms {
        fixed_tokens += estimate_text_tokens(source) + estimate_text_tokens(target);
    }

    let sample = &units[..units.len().min(SAMPLE_SIZE)];
    let sample_total: usize = sample
        .iter()
        .map(|u| {
            estimate_text_tokens(&u.key)
                + estimate_text_tokens(&u.source_text) * 2
                + JSON_OVERHEAD_TOKENS
        })
        .sum();
    let avg_per_unit = (sample_total / sample.len()).max(1);

    let safe_max = (PROVIDER_TOKEN_CEILING as f64 * (1.0 - SAFETY_MARGIN)) as usize;
    let available = safe_max.saturating_sub(fixed_tokens);
    let optimal = available / avg_per_unit;

    let upper = if context.units_per_batch == 0 {
        MAX_AUTO_BATCH
    } else {
        context.units_per_batch
    };

    optimal.clamp(1, upper)
}

/// Double a response budget after a parse failure, capped at the maximum
pub fn bump_max_tokens(current: u32) -> u32 {
    (current.saturating_mul(2)).min(MAX_RESPONSE_TOKENS)
}
