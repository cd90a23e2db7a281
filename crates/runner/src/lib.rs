//! The execution core: invigilator, interview and scheduler.
//!
//! An [`Engine`] bundles the shared resources every interview draws on —
//! providers, the response cache, the per-model buckets, the retry policy
//! and the validation failure log. Jobs fan the population out across a
//! bounded worker pool and assemble results in canonical order; see
//! [`Engine::run`].

mod error;
mod interview;
mod invigilator;
pub mod prompt;
mod scheduler;

use std::sync::Arc;

use cache::Cache;
use config::Config;
pub use error::{RunnerError, RunnerResult};
use model::{ProviderSet, RetryPolicy};
use rate_limit::BucketSet;
pub use scheduler::{JobHandle, JobOutcome, JobSpec, JobStatus};
use validation::ValidationLog;

/// Shared execution resources for running jobs. Cheap to clone; all
/// clones share the same cache, buckets and failure log.
#[derive(Clone)]
pub struct Engine {
    shared: Arc<EngineInner>,
}

pub(crate) struct EngineInner {
    pub(crate) config: Config,
    pub(crate) providers: ProviderSet,
    pub(crate) cache: Cache,
    pub(crate) buckets: BucketSet,
    pub(crate) validation_log: ValidationLog,
    pub(crate) retry: RetryPolicy,
}

impl Engine {
    /// Build an engine from configuration: providers, cache backend,
    /// buckets and retry policy.
    pub async fn from_config(config: Config) -> RunnerResult<Self> {
        let providers = ProviderSet::from_config(&config)?;
        let cache = Cache::from_config(&config.cache).await?;

        Ok(Self::new(config, providers, cache))
    }

    /// Engine over explicit providers with an in-memory cache. The usual
    /// entry point for tests and embedders that construct providers
    /// themselves.
    pub fn with_providers(config: Config, providers: ProviderSet) -> Self {
        Self::new(config, providers, Cache::in_memory())
    }

    /// Full-control constructor over explicit providers and cache.
    pub fn new(config: Config, providers: ProviderSet, cache: Cache) -> Self {
        let buckets = BucketSet::from_config(config.llm.clone());
        let retry = RetryPolicy::from_config(&config.execution);

        Self {
            shared: Arc::new(EngineInner {
                config,
                providers,
                cache,
                buckets,
                validation_log: ValidationLog::new(),
                retry,
            }),
        }
    }

    /// Start a job. Returns immediately; the handle exposes
    /// `wait`/`status`/`cancel`.
    pub fn run(&self, spec: JobSpec) -> JobHandle {
        scheduler::run(self.clone(), spec)
    }

    /// The shared response cache.
    pub fn cache(&self) -> &Cache {
        &self.shared.cache
    }

    /// The configured providers.
    pub fn providers(&self) -> &ProviderSet {
        &self.shared.providers
    }

    /// The validation failure log, for offline analysis.
    pub fn validation_log(&self) -> &ValidationLog {
        &self.shared.validation_log
    }

    /// The engine configuration.
    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    pub(crate) fn inner(&self) -> &EngineInner {
        &self.shared
    }
}
