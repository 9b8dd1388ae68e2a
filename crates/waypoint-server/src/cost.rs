//! Cost computation: `cost(model, usage, cost_multiplier) -> Usd`.
//!
//! Real pricing is out of scope here — this is the narrow interface the
//! Response Handler and the rate limiter's lease reconciliation are written
//! against, plus a small illustrative table so both can be exercised without
//! a live pricing feed.

use std::collections::HashMap;

use waypoint_core::WireFormat;

/// Token counts extracted from an upstream response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Computes the USD cost of one request. Implementations must be pure:
/// same inputs, same output, no I/O.
pub trait CostCalculator: Send + Sync {
    /// Returns the cost in USD for `usage` tokens of `model`, scaled by the
    /// serving provider's `cost_multiplier`.
    fn cost(&self, model: &str, usage: Usage, cost_multiplier: f64) -> f64;
}

/// Per-million-token input/output rates for one model family.
#[derive(Debug, Clone, Copy)]
struct Rate {
    input_per_million: f64,
    output_per_million: f64,
}

/// Illustrative rate table for the three reference model families.
///
/// Not a maintained price list: scaffolding so the cost interface has a
/// default implementation to unit-test against.
pub struct TableCostCalculator {
    rates: HashMap<&'static str, Rate>,
    default_rate: Rate,
}

impl Default for TableCostCalculator {
    fn default() -> Self {
        let mut rates = HashMap::new();
        rates.insert(
            "claude",
            Rate { input_per_million: 3.00, output_per_million: 15.00 },
        );
        rates.insert(
            "gpt",
            Rate { input_per_million: 2.50, output_per_million: 10.00 },
        );
        rates.insert(
            "gemini",
            Rate { input_per_million: 1.25, output_per_million: 5.00 },
        );
        Self {
            rates,
            default_rate: Rate { input_per_million: 1.00, output_per_million: 3.00 },
        }
    }
}

impl TableCostCalculator {
    fn rate_for(&self, model: &str) -> Rate {
        self.rates
            .iter()
            .find(|(family, _)| model.contains(*family))
            .map(|(_, rate)| *rate)
            .unwrap_or(self.default_rate)
    }
}

impl CostCalculator for TableCostCalculator {
    fn cost(&self, model: &str, usage: Usage, cost_multiplier: f64) -> f64 {
        let rate = self.rate_for(model);
        let input_cost = (usage.input_tokens as f64 / 1_000_000.0) * rate.input_per_million;
        let output_cost = (usage.output_tokens as f64 / 1_000_000.0) * rate.output_per_million;
        (input_cost + output_cost) * cost_multiplier
    }
}

/// Pull token usage out of a successful response body, per wire format.
/// Unknown shapes decode to zero usage rather than failing the request.
#[must_use]
pub fn extract_usage(wire_format: WireFormat, body: &[u8]) -> Usage {
    let Ok(root) = serde_json::from_slice::<serde_json::Value>(body) else {
        return Usage::default();
    };
    let as_u64 = |v: Option<&serde_json::Value>| v.and_then(serde_json::Value::as_u64).unwrap_or(0);

    match wire_format {
        WireFormat::Claude | WireFormat::Codex => {
            let usage = root.get("usage");
            Usage {
                input_tokens: as_u64(usage.and_then(|u| u.get("input_tokens"))),
                output_tokens: as_u64(usage.and_then(|u| u.get("output_tokens"))),
            }
        }
        WireFormat::Openai => {
            let usage = root.get("usage");
            Usage {
                input_tokens: as_u64(usage.and_then(|u| u.get("prompt_tokens"))),
                output_tokens: as_u64(usage.and_then(|u| u.get("completion_tokens"))),
            }
        }
        WireFormat::Gemini => {
            let usage = root.get("usageMetadata");
            Usage {
                input_tokens: as_u64(usage.and_then(|u| u.get("promptTokenCount"))),
                output_tokens: as_u64(usage.and_then(|u| u.get("candidatesTokenCount"))),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_claude_usage() {
        let body = serde_json::json!({ "usage": { "input_tokens": 10, "output_tokens": 20 } });
        let usage = extract_usage(WireFormat::Claude, body.to_string().as_bytes());
        assert_eq!(usage, Usage { input_tokens: 10, output_tokens: 20 });
    }

    #[test]
    fn extracts_openai_usage() {
        let body = serde_json::json!({ "usage": { "prompt_tokens": 5, "completion_tokens": 7 } });
        let usage = extract_usage(WireFormat::Openai, body.to_string().as_bytes());
        assert_eq!(usage, Usage { input_tokens: 5, output_tokens: 7 });
    }

    #[test]
    fn extracts_gemini_usage() {
        let body = serde_json::json!({ "usageMetadata": { "promptTokenCount": 3, "candidatesTokenCount": 4 } });
        let usage = extract_usage(WireFormat::Gemini, body.to_string().as_bytes());
        assert_eq!(usage, Usage { input_tokens: 3, output_tokens: 4 });
    }

    #[test]
    fn malformed_body_is_zero_usage() {
        let usage = extract_usage(WireFormat::Claude, b"not json");
        assert_eq!(usage, Usage::default());
    }

    #[test]
    fn known_family_uses_its_rate() {
        let calc = TableCostCalculator::default();
        let usage = Usage { input_tokens: 1_000_000, output_tokens: 1_000_000 };
        let cost = calc.cost("claude-3-5-sonnet", usage, 1.0);
        assert!((cost - 18.00).abs() < 1e-9);
    }

    #[test]
    fn unknown_model_falls_back_to_default_rate() {
        let calc = TableCostCalculator::default();
        let usage = Usage { input_tokens: 1_000_000, output_tokens: 0 };
        let cost = calc.cost("some-unlisted-model", usage, 1.0);
        assert!((cost - 1.00).abs() < 1e-9);
    }

    #[test]
    fn cost_multiplier_scales_linearly() {
        let calc = TableCostCalculator::default();
        let usage = Usage { input_tokens: 500_000, output_tokens: 0 };
        let base = calc.cost("gpt-4o", usage, 1.0);
        let scaled = calc.cost("gpt-4o", usage, 2.0);
        assert!((scaled - base * 2.0).abs() < 1e-9);
    }

    #[test]
    fn zero_usage_is_zero_cost() {
        let calc = TableCostCalculator::default();
        let cost = calc.cost("claude-3-opus", Usage::default(), 1.0);
        assert_eq!(cost, 0.0);
    }
}
