//! The uniform provider call interface and the provider registry.

pub(crate) mod anthropic;
pub(crate) mod google;
pub(crate) mod openai;

use std::sync::Arc;

use async_trait::async_trait;
use config::{Config, LlmProviderConfig};
use serde_json::Value;

use crate::{
    ModelParameters,
    error::{LlmError, LlmResult},
    provider::{
        anthropic::AnthropicProvider, google::GoogleProvider, openai::OpenAIProvider, test::TestProvider,
    },
};

/// Reference to a binary input attached to a call. Only the content hash
/// participates in caching; providers that cannot consume files ignore
/// them.
#[derive(Debug, Clone, PartialEq)]
pub struct FileRef {
    /// SHA-256 of the file content, lowercase hex.
    pub sha256: String,
    /// Original path, for diagnostics.
    pub path: Option<std::path::PathBuf>,
}

/// One provider invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct CallRequest {
    /// Rendered system prompt.
    pub system_prompt: String,
    /// Rendered user prompt.
    pub user_prompt: String,
    /// Sampling parameters.
    pub parameters: ModelParameters,
    /// JSON schema for structured output, where the provider supports it.
    /// Otherwise documentation only — validation happens downstream.
    pub response_schema: Option<Value>,
    /// Attached binary inputs.
    pub files: Vec<FileRef>,
}

/// A materialized provider response. Serialization is part of the cache
/// contract: entries store the full response shape.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RawResponse {
    /// The full provider payload.
    pub raw: Value,
    /// The assistant text extracted from the payload.
    pub text: String,
    /// Prompt tokens billed.
    pub input_tokens: u64,
    /// Completion tokens billed.
    pub output_tokens: u64,
    /// Provider finish reason, if reported.
    pub finish_reason: Option<String>,
    /// The provider's own model identifier, for debugging.
    pub provider_model_id: Option<String>,
}

/// Uniform call interface over heterogeneous providers.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Service name this provider was configured under.
    fn name(&self) -> &str;

    /// Send one completion request for the given model and materialize
    /// the response. No streaming; retries happen in the caller.
    async fn call(&self, model: &str, request: &CallRequest) -> LlmResult<RawResponse>;
}

/// Live providers keyed by service name, built from configuration.
pub struct ProviderSet {
    providers: Vec<Arc<dyn Provider>>,
    test: Option<Arc<TestProvider>>,
}

impl ProviderSet {
    /// Instantiate every configured provider.
    pub fn from_config(config: &Config) -> LlmResult<Self> {
        log::debug!("Initializing {} providers", config.llm.providers.len());

        let mut providers: Vec<Arc<dyn Provider>> = Vec::with_capacity(config.llm.providers.len());
        let mut test = None;

        for (name, provider_config) in &config.llm.providers {
            log::debug!("Initializing provider: {name}");

            match provider_config {
                LlmProviderConfig::Openai(api_config) => {
                    providers.push(Arc::new(OpenAIProvider::new(name.clone(), api_config.clone())?));
                }
                LlmProviderConfig::Anthropic(api_config) => {
                    providers.push(Arc::new(AnthropicProvider::new(name.clone(), api_config.clone())?));
                }
                LlmProviderConfig::Google(api_config) => {
                    providers.push(Arc::new(GoogleProvider::new(name.clone(), api_config.clone())?));
                }
                LlmProviderConfig::Test(test_config) => {
                    let provider = Arc::new(TestProvider::new(name.clone(), test_config.clone()));
                    test = Some(provider.clone());
                    providers.push(provider);
                }
            }
        }

        if providers.is_empty() {
            return Err(LlmError::InternalError(Some(
                "No LLM providers configured.".to_string(),
            )));
        }

        Ok(Self { providers, test })
    }

    /// A set containing only the deterministic test provider. Used by
    /// tests and offline runs.
    pub fn test_only() -> Self {
        let provider = Arc::new(TestProvider::new(
            "test".to_string(),
            config::TestProviderConfig::default(),
        ));

        Self {
            test: Some(provider.clone()),
            providers: vec![provider],
        }
    }

    /// A set wrapping an explicitly built test provider, e.g. one with
    /// scripted replies.
    pub fn with_test_provider(provider: TestProvider) -> Self {
        let provider = Arc::new(provider);

        Self {
            test: Some(provider.clone()),
            providers: vec![provider],
        }
    }

    /// The provider configured under `service`.
    pub fn get(&self, service: &str) -> LlmResult<&dyn Provider> {
        for provider in &self.providers {
            if provider.name() == service {
                return Ok(provider.as_ref());
            }
        }

        Err(LlmError::ProviderNotFound(service.to_string()))
    }

    /// The test provider, when one is configured. Exposes its call
    /// counter for at-most-once assertions.
    pub fn test_provider(&self) -> Option<&Arc<TestProvider>> {
        self.test.as_ref()
    }

    /// Configured service names.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.providers.iter().map(|provider| provider.name())
    }
}
