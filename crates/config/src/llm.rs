//! LLM provider configuration structures.

use std::collections::BTreeMap;

use indexmap::IndexMap;
use secrecy::SecretString;
use serde::Deserialize;

use crate::rate_limit::TokenRateLimitsConfig;

/// Configuration for an individual model within a provider.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct ModelConfig {
    /// Optional rename - the actual provider model name.
    /// If not specified, the model ID (map key) is used.
    pub rename: Option<String>,

    /// Rate limits for this model. Falls back to the provider limits, then
    /// to [`LlmConfig::default_rate_limits`].
    pub rate_limits: Option<TokenRateLimitsConfig>,
}

/// LLM configuration for the engine.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LlmConfig {
    /// Map of LLM provider configurations, keyed by inference service name.
    pub providers: IndexMap<String, LlmProviderConfig>,

    /// Limits applied to any model with no explicit configuration.
    pub default_rate_limits: TokenRateLimitsConfig,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            providers: IndexMap::new(),
            default_rate_limits: TokenRateLimitsConfig::default(),
        }
    }
}

impl LlmConfig {
    /// Whether there are any LLM providers configured.
    pub fn has_providers(&self) -> bool {
        !self.providers.is_empty()
    }

    /// Resolve the limits for a model of the named service.
    pub fn rate_limits_for(&self, service: &str, model: &str) -> TokenRateLimitsConfig {
        let Some(provider) = self.providers.get(service) else {
            return self.default_rate_limits;
        };

        provider
            .models()
            .get(model)
            .and_then(|m| m.rate_limits)
            .or_else(|| provider.rate_limits())
            .unwrap_or(self.default_rate_limits)
    }
}

/// Provider type enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderType {
    /// OpenAI provider.
    Openai,
    /// Anthropic provider.
    Anthropic,
    /// Google provider.
    Google,
    /// Deterministic in-process test provider.
    Test,
}

/// Configuration specific to API-based providers.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct ApiProviderConfig {
    /// API key for authentication. Falls back to the provider's
    /// conventional environment variable when absent.
    pub api_key: Option<SecretString>,

    /// Custom base URL for the provider API.
    pub base_url: Option<String>,

    /// Explicitly configured models for this provider.
    pub models: BTreeMap<String, ModelConfig>,

    /// Provider-level rate limits.
    pub rate_limits: Option<TokenRateLimitsConfig>,
}

/// Configuration for the deterministic test provider.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct TestProviderConfig {
    /// Canned replies cycled by a stable hash of the user prompt. A single
    /// entry makes every call return that entry.
    pub canned_responses: Vec<String>,
}

/// Complete LLM provider configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", deny_unknown_fields)]
pub enum LlmProviderConfig {
    /// OpenAI provider configuration.
    Openai(ApiProviderConfig),

    /// Anthropic provider configuration.
    Anthropic(ApiProviderConfig),

    /// Google provider configuration.
    Google(ApiProviderConfig),

    /// Test provider configuration.
    Test(TestProviderConfig),
}

impl LlmProviderConfig {
    /// Get the provider type for this configuration.
    pub fn provider_type(&self) -> ProviderType {
        match self {
            Self::Openai(_) => ProviderType::Openai,
            Self::Anthropic(_) => ProviderType::Anthropic,
            Self::Google(_) => ProviderType::Google,
            Self::Test(_) => ProviderType::Test,
        }
    }

    /// Per-model configuration table. Empty for the test provider.
    pub fn models(&self) -> &BTreeMap<String, ModelConfig> {
        static EMPTY: BTreeMap<String, ModelConfig> = BTreeMap::new();

        match self {
            Self::Openai(config) | Self::Anthropic(config) | Self::Google(config) => &config.models,
            Self::Test(_) => &EMPTY,
        }
    }

    /// Provider-level rate limits, if configured.
    pub fn rate_limits(&self) -> Option<TokenRateLimitsConfig> {
        match self {
            Self::Openai(config) | Self::Anthropic(config) | Self::Google(config) => config.rate_limits,
            Self::Test(_) => None,
        }
    }

    /// Configured API key, if any.
    pub fn api_key(&self) -> Option<&SecretString> {
        match self {
            Self::Openai(config) | Self::Anthropic(config) | Self::Google(config) => config.api_key.as_ref(),
            Self::Test(_) => None,
        }
    }

    /// Replace the API key. Used by the environment fallback in the loader.
    pub(crate) fn set_api_key(&mut self, key: SecretString) {
        match self {
            Self::Openai(config) | Self::Anthropic(config) | Self::Google(config) => config.api_key = Some(key),
            Self::Test(_) => {}
        }
    }
}
