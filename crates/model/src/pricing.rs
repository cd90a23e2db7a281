//! Published price table and cost accounting.

use std::{
    collections::HashSet,
    sync::{LazyLock, Mutex},
};

/// USD per million tokens, split by token class.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Price {
    /// Input (prompt) tokens.
    pub input_per_million: f64,
    /// Output (completion) tokens.
    pub output_per_million: f64,
}

/// Published prices keyed by `(service, model)`. Dated model aliases fall
/// back to their prefix entry.
static PRICES: &[((&str, &str), Price)] = &[
    (
        ("openai", "gpt-4o"),
        Price {
            input_per_million: 2.50,
            output_per_million: 10.00,
        },
    ),
    (
        ("openai", "gpt-4o-mini"),
        Price {
            input_per_million: 0.15,
            output_per_million: 0.60,
        },
    ),
    (
        ("openai", "gpt-4.1"),
        Price {
            input_per_million: 2.00,
            output_per_million: 8.00,
        },
    ),
    (
        ("openai", "gpt-4.1-mini"),
        Price {
            input_per_million: 0.40,
            output_per_million: 1.60,
        },
    ),
    (
        ("anthropic", "claude-opus-4"),
        Price {
            input_per_million: 15.00,
            output_per_million: 75.00,
        },
    ),
    (
        ("anthropic", "claude-sonnet-4"),
        Price {
            input_per_million: 3.00,
            output_per_million: 15.00,
        },
    ),
    (
        ("anthropic", "claude-3-5-haiku"),
        Price {
            input_per_million: 0.80,
            output_per_million: 4.00,
        },
    ),
    (
        ("google", "gemini-2.5-pro"),
        Price {
            input_per_million: 1.25,
            output_per_million: 10.00,
        },
    ),
    (
        ("google", "gemini-2.5-flash"),
        Price {
            input_per_million: 0.30,
            output_per_million: 2.50,
        },
    ),
    (
        ("google", "gemini-2.0-flash"),
        Price {
            input_per_million: 0.10,
            output_per_million: 0.40,
        },
    ),
];

static WARNED: LazyLock<Mutex<HashSet<String>>> = LazyLock::new(|| Mutex::new(HashSet::new()));

/// The published price for a model, if known.
pub fn price(service: &str, model: &str) -> Option<Price> {
    PRICES
        .iter()
        .find(|((s, m), _)| *s == service && (*m == model || model.starts_with(&format!("{m}-"))))
        .map(|(_, price)| *price)
}

/// Cost in USD for one call. Unknown models cost zero and warn once per
/// model; the test provider is always free.
pub fn cost(service: &str, model: &str, input_tokens: u64, output_tokens: u64) -> f64 {
    if service == "test" {
        return 0.0;
    }

    let Some(price) = price(service, model) else {
        let key = format!("{service}/{model}");
        if let Ok(mut warned) = WARNED.lock()
            && warned.insert(key.clone())
        {
            log::warn!("No published price for {key}; reporting zero cost");
        }

        return 0.0;
    };

    (input_tokens as f64 / 1_000_000.0) * price.input_per_million
        + (output_tokens as f64 / 1_000_000.0) * price.output_per_million
}

#[cfg(test)]
mod tests {
    use super::{cost, price};

    #[test]
    fn dated_aliases_fall_back_to_prefix() {
        assert_eq!(price("anthropic", "claude-sonnet-4-20250514"), price("anthropic", "claude-sonnet-4"));
        assert!(price("openai", "gpt-4o").is_some());
        assert!(price("openai", "not-a-model").is_none());
    }

    #[test]
    fn cost_splits_token_classes() {
        // 1M input + 1M output of gpt-4o: 2.50 + 10.00.
        let usd = cost("openai", "gpt-4o", 1_000_000, 1_000_000);
        assert!((usd - 12.50).abs() < 1e-9);

        assert_eq!(cost("test", "canned", 1_000_000, 1_000_000), 0.0);
        assert_eq!(cost("openai", "unknown-model", 500, 500), 0.0);
    }
}
