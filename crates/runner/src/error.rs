use thiserror::Error;

pub type RunnerResult<T> = std::result::Result<T, RunnerError>;

/// Job- and turn-level failures inside the runner.
#[derive(Debug, Error)]
pub enum RunnerError {
    /// A provider call failed beyond retry.
    #[error(transparent)]
    Provider(#[from] model::LlmError),

    /// The cache backend failed fatally (only possible at startup; runtime
    /// cache failures degrade to no-cache).
    #[error(transparent)]
    Cache(#[from] cache::CacheError),

    /// The survey failed construction-time validation.
    #[error(transparent)]
    Survey(#[from] survey::SurveyError),

    /// A prompt template failed to render.
    #[error(transparent)]
    Template(#[from] template::TemplateError),

    /// A rate bucket can never satisfy a request.
    #[error(transparent)]
    Bucket(#[from] rate_limit::BucketError),

    /// The job was cancelled cooperatively. Not a failure.
    #[error("Job cancelled")]
    Cancelled,

    /// A worker task panicked or was aborted.
    #[error("Worker failed: {0}")]
    Worker(String),
}
