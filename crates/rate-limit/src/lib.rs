//! Per-model token and request rate limiting.
//!
//! One token bucket and one request bucket exist per `(service, model)`
//! pair. Buckets refill continuously; refill is computed lazily from
//! elapsed time on each access, so an idle bucket costs nothing. Workers
//! `acquire` before every provider call and block until capacity is
//! available.

mod bucket;
mod error;

use std::sync::Arc;

pub use bucket::Bucket;
use config::LlmConfig;
use dashmap::DashMap;
pub use error::BucketError;

/// The token and request buckets gating one model.
pub struct ModelBuckets {
    /// Gate on estimated prompt + completion tokens.
    pub tokens: Bucket,
    /// Gate on request count.
    pub requests: Bucket,
}

impl ModelBuckets {
    fn from_limits(limits: config::TokenRateLimitsConfig) -> Self {
        // Providers publish per-minute limits; the full minute is the
        // burst and it refills across the minute.
        Self {
            tokens: Bucket::new(limits.tokens_per_minute as f64, limits.tokens_per_minute as f64 / 60.0),
            requests: Bucket::new(
                limits.requests_per_minute as f64,
                limits.requests_per_minute as f64 / 60.0,
            ),
        }
    }
}

/// Shared collection of per-model buckets, created on first use from the
/// configured limits.
pub struct BucketSet {
    buckets: DashMap<(String, String), Arc<ModelBuckets>>,
    llm: LlmConfig,
}

impl BucketSet {
    /// Bucket collection resolving limits from the LLM configuration.
    pub fn from_config(llm: LlmConfig) -> Self {
        Self {
            buckets: DashMap::new(),
            llm,
        }
    }

    /// The buckets for a model, created from configured limits on first
    /// access.
    pub fn for_model(&self, service: &str, model: &str) -> Arc<ModelBuckets> {
        if let Some(buckets) = self.buckets.get(&(service.to_string(), model.to_string())) {
            return buckets.clone();
        }

        let limits = self.llm.rate_limits_for(service, model);

        self.buckets
            .entry((service.to_string(), model.to_string()))
            .or_insert_with(|| {
                log::debug!(
                    "Creating buckets for {service}/{model}: {} tpm, {} rpm",
                    limits.tokens_per_minute,
                    limits.requests_per_minute
                );
                Arc::new(ModelBuckets::from_limits(limits))
            })
            .clone()
    }

    /// Replace a model's limits, e.g. from provider rate-limit response
    /// headers. Existing waiters see the new rate on their next refill.
    pub async fn update_limits(&self, service: &str, model: &str, tokens_per_minute: u64, requests_per_minute: u64) {
        let buckets = self.for_model(service, model);

        buckets
            .tokens
            .set_limits(tokens_per_minute as f64, tokens_per_minute as f64 / 60.0)
            .await;
        buckets
            .requests
            .set_limits(requests_per_minute as f64, requests_per_minute as f64 / 60.0)
            .await;

        log::debug!("Updated limits for {service}/{model}: {tokens_per_minute} tpm, {requests_per_minute} rpm");
    }

    /// Number of distinct models with live buckets.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    /// Whether any buckets exist yet.
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use config::LlmConfig;

    use super::BucketSet;

    #[test]
    fn buckets_are_shared_per_model() {
        let set = BucketSet::from_config(LlmConfig::default());

        let a = set.for_model("openai", "gpt-4o");
        let b = set.for_model("openai", "gpt-4o");
        let c = set.for_model("openai", "gpt-4.1");

        assert!(std::sync::Arc::ptr_eq(&a, &b));
        assert!(!std::sync::Arc::ptr_eq(&a, &c));
        assert_eq!(set.len(), 2);
    }

    #[tokio::test]
    async fn default_limits_apply() {
        let set = BucketSet::from_config(LlmConfig::default());
        let buckets = set.for_model("anthropic", "claude");

        // Default burst is the full per-minute allowance.
        assert_eq!(buckets.tokens.available().await as u64, 100_000);
        assert_eq!(buckets.requests.available().await as u64, 600);
    }
}
