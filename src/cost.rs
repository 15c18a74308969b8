// Cost Accountant
// Converts per-model token counts into money using a static price table.
// Prices are USD per million tokens; no rounding until display.

use serde::{Deserialize, Serialize};

/// Price pair for one model, USD per million tokens
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelPrice {
    pub input: f64,
    pub output: f64,
}

/// Fallback for model ids absent from the table
pub const DEFAULT_PRICE: ModelPrice = ModelPrice {
    input: 1.0,
    output: 3.0,
};

/// Static price table, model id -> price pair
const PRICE_TABLE: &[(&str, ModelPrice)] = &[
    ("claude-3-opus", ModelPrice { input: 15.0, output: 75.0 }),
    ("claude-3-5-sonnet", ModelPrice { input: 3.0, output: 15.0 }),
    ("claude-3-5-haiku", ModelPrice { input: 0.8, output: 4.0 }),
    ("gpt-4o", ModelPrice { input: 2.5, output: 10.0 }),
    ("gpt-4o-mini", ModelPrice { input: 0.15, output: 0.6 }),
    ("gpt-4-turbo", ModelPrice { input: 10.0, output: 30.0 }),
    ("o1", ModelPrice { input: 15.0, output: 60.0 }),
    ("o1-mini", ModelPrice { input: 1.1, output: 4.4 }),
    ("gemini-1.5-pro", ModelPrice { input: 1.25, output: 5.0 }),
    ("gemini-1.5-flash", ModelPrice { input: 0.075, output: 0.3 }),
];

/// Look up a model's price pair, falling back to the default
pub fn price_for(model_id: &str) -> ModelPrice {
    PRICE_TABLE
        .iter()
        .find(|(id, _)| *id == model_id)
        .map(|(_, price)| *price)
        .unwrap_or(DEFAULT_PRICE)
}

/// Per-stage cost, recomputed from token counts and summed into the run
/// summary. A pure derived value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostBreakdown {
    pub model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub input_cost: f64,
    pub output_cost: f64,
    pub total_cost: f64,
}

impl CostBreakdown {
    /// Zero-cost breakdown for skipped and cached stages
    pub fn zero(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            input_tokens: 0,
            output_tokens: 0,
            input_cost: 0.0,
            output_cost: 0.0,
            total_cost: 0.0,
        }
    }
}

/// Compute the cost of one invocation
pub fn cost(model_id: &str, input_tokens: u64, output_tokens: u64) -> CostBreakdown {
    let price = price_for(model_id);
    let input_cost = input_tokens as f64 / 1e6 * price.input;
    let output_cost = output_tokens as f64 / 1e6 * price.output;

    CostBreakdown {
        model: model_id.to_string(),
        input_tokens,
        output_tokens,
        input_cost,
        output_cost,
        total_cost: input_cost + output_cost,
    }
}

/// Tier classifier patterns, checked in order: large before small,
/// both before defaulting to medium. Display/selection only.
const LARGE_PATTERNS: &[&str] = &["opus", "gpt-4", "o1", "ultra", "large"];
const SMALL_PATTERNS: &[&str] = &["haiku", "mini", "nano", "flash", "small", "tiny"];

/// Classify a model id into a coarse tier by substring matching
pub fn classify_tier(model_id: &str) -> crate::config::models::ModelTier {
    use crate::config::models::ModelTier;

    let id = model_id.to_lowercase();
    if LARGE_PATTERNS.iter().any(|p| id.contains(p)) {
        ModelTier::Large
    } else if SMALL_PATTERNS.iter().any(|p| id.contains(p)) {
        ModelTier::Small
    } else {
        ModelTier::Medium
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::models::ModelTier;

    #[test]
    fn test_known_model_round_trip() {
        // {input: 3.0, output: 15.0} per million
        let breakdown = cost("claude-3-5-sonnet", 1000, 500);
        assert_eq!(breakdown.input_cost, 0.003);
        assert_eq!(breakdown.output_cost, 0.0075);
        assert_eq!(breakdown.total_cost, 0.0105);
    }

    #[test]
    fn test_unknown_model_uses_default() {
        let breakdown = cost("mystery-model-v9", 1_000_000, 1_000_000);
        assert_eq!(breakdown.input_cost, 1.0);
        assert_eq!(breakdown.output_cost, 3.0);
        assert_eq!(breakdown.total_cost, 4.0);
    }

    #[test]
    fn test_zero_tokens_zero_cost() {
        let breakdown = cost("claude-3-opus", 0, 0);
        assert_eq!(breakdown.total_cost, 0.0);
    }

    #[test]
    fn test_tier_ordering() {
        assert_eq!(classify_tier("claude-3-opus"), ModelTier::Large);
        assert_eq!(classify_tier("claude-3-5-haiku"), ModelTier::Small);
        assert_eq!(classify_tier("claude-3-5-sonnet"), ModelTier::Medium);
        // Large patterns win over small: gpt-4o-mini matches "gpt-4" first
        assert_eq!(classify_tier("gpt-4o-mini"), ModelTier::Large);
        assert_eq!(classify_tier("unheard-of"), ModelTier::Medium);
    }
}
