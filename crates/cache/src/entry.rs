use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::FingerprintInput;

/// One cached provider call: the full call identity plus the raw output.
/// Immutable once written; the engine never evicts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// The cache key, derived from the other identity fields.
    pub fingerprint: String,
    /// Model identity string: `service/model_name`.
    pub model_identity: String,
    /// Sampling parameters as canonical JSON text.
    pub parameters_json: String,
    /// Rendered system prompt.
    pub system_prompt: String,
    /// Rendered user prompt.
    pub user_prompt: String,
    /// Iteration number the entry was produced under.
    pub iteration: u32,
    /// Raw provider payload, opaque to the cache.
    pub output_raw: Value,
    /// Wall-clock write time, milliseconds since the epoch.
    pub timestamp_unix_ms: i64,
}

impl CacheEntry {
    /// Build an entry from a call identity and its raw output, stamping
    /// the current time.
    pub fn from_call(input: &FingerprintInput<'_>, fingerprint: String, output_raw: Value) -> Self {
        Self {
            fingerprint,
            model_identity: input.model_identity.to_string(),
            parameters_json: crate::canonical_json(input.parameters),
            system_prompt: input.system_prompt.to_string(),
            user_prompt: input.user_prompt.to_string(),
            iteration: input.iteration,
            output_raw,
            timestamp_unix_ms: jiff::Timestamp::now().as_millisecond(),
        }
    }
}
