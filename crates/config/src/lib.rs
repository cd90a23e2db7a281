//! Canvass configuration structures to map the canvass.toml configuration.

#![deny(missing_docs)]

mod cache;
mod execution;
mod llm;
mod loader;
mod rate_limit;

use std::path::Path;

pub use cache::{CacheBackendConfig, CacheConfig};
pub use execution::ExecutionConfig;
pub use llm::{ApiProviderConfig, LlmConfig, LlmProviderConfig, ModelConfig, ProviderType, TestProviderConfig};
pub use rate_limit::TokenRateLimitsConfig;
use serde::Deserialize;

/// Main configuration structure for the canvass engine.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Scheduler and pipeline execution settings.
    pub execution: ExecutionConfig,
    /// Response cache settings.
    pub cache: CacheConfig,
    /// LLM provider configuration settings.
    pub llm: LlmConfig,
}

impl Config {
    /// Load configuration from a file path.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
        loader::load(path)
    }

    /// Build a configuration from environment variables alone.
    ///
    /// Used by embedders that never touch a canvass.toml file. Provider API
    /// keys, cache path and concurrency are read from the environment the
    /// same way the file loader does.
    pub fn from_env() -> Config {
        let mut config = Config::default();
        loader::apply_env_overrides(&mut config);
        config
    }

    /// Validates that the configuration can run at least one job.
    pub fn validate(&self) -> anyhow::Result<()> {
        loader::validate_has_providers(self)
    }
}

#[cfg(test)]
mod tests {
    use crate::Config;

    #[test]
    fn defaults() {
        let config: Config = toml::from_str("").unwrap();

        assert_eq!(config.execution.concurrency, 25);
        assert_eq!(config.execution.max_retries, 5);
        assert_eq!(config.execution.max_repair_attempts, 2);
        assert!(!config.execution.stop_on_error);
        assert!(config.llm.providers.is_empty());
        assert!(!config.cache.fresh);
    }

    #[test]
    fn unknown_fields_rejected() {
        let error = toml::from_str::<Config>("[surveys]\nfoo = 1\n").unwrap_err();

        insta::assert_snapshot!(error.message(), @"unknown field `surveys`, expected one of `execution`, `cache`, `llm`");
    }
}
