use serde::Deserialize;

/// Token and request throughput limits for one model or provider.
///
/// Providers publish limits per minute; the bucket subsystem converts these
/// to per-second refill rates with the full minute as burst capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TokenRateLimitsConfig {
    /// Tokens per minute.
    pub tokens_per_minute: u64,

    /// Requests per minute.
    pub requests_per_minute: u64,
}

impl Default for TokenRateLimitsConfig {
    fn default() -> Self {
        // Conservative floor shared by the major providers' lowest tiers.
        Self {
            tokens_per_minute: 100_000,
            requests_per_minute: 600,
        }
    }
}
