use std::time::Duration;

use thiserror::Error;

pub type LlmResult<T> = std::result::Result<T, LlmError>;

/// Provider call errors.
#[derive(Debug, Error)]
pub enum LlmError {
    /// Provider not found in configuration.
    #[error("Provider '{0}' not found")]
    ProviderNotFound(String),

    /// Model not found at the provider.
    #[error("{0}")]
    ModelNotFound(String),

    /// Authentication failed (missing or invalid API key).
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Invalid request parameters.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Rate limit exceeded at the provider.
    #[error("Rate limit exceeded: {message}")]
    RateLimitExceeded {
        /// Provider-supplied message.
        message: String,
        /// Suggested wait before retrying, when the provider sent one.
        retry_after: Option<Duration>,
    },

    /// Insufficient quota or credits.
    #[error("Insufficient quota: {0}")]
    InsufficientQuota(String),

    /// The provider refused to answer on safety grounds.
    #[error("Content refused by provider: {0}")]
    ContentRefused(String),

    /// The provider payload could not be decoded.
    #[error("Malformed provider response: {0}")]
    MalformedResponse(String),

    /// Provider API returned an error status.
    #[error("Provider API error ({status}): {message}")]
    ProviderApiError {
        /// HTTP status code from the provider.
        status: u16,
        /// Provider-supplied message.
        message: String,
    },

    /// Network or connection error.
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// The call exceeded its timeout.
    #[error("Provider call timed out after {0:?}")]
    Timeout(Duration),

    /// Internal error. If Some(message), it came from a provider and can
    /// be shown; if None, details stay out of user-facing output.
    #[error("Internal error")]
    InternalError(Option<String>),
}

/// Coarse error taxonomy driving the propagation policy: auth aborts the
/// job, quota backs off, safety fails the turn, malformed enters repair,
/// other retries then fails the turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Auth,
    Quota,
    Safety,
    Malformed,
    Other,
}

impl LlmError {
    /// Which taxonomy class this error belongs to.
    pub fn classification(&self) -> ErrorClass {
        match self {
            Self::AuthenticationFailed(_) => ErrorClass::Auth,
            Self::InsufficientQuota(_) | Self::RateLimitExceeded { .. } => ErrorClass::Quota,
            Self::ContentRefused(_) => ErrorClass::Safety,
            Self::MalformedResponse(_) => ErrorClass::Malformed,
            Self::ProviderNotFound(_)
            | Self::ModelNotFound(_)
            | Self::InvalidRequest(_)
            | Self::ProviderApiError { .. }
            | Self::ConnectionError(_)
            | Self::Timeout(_)
            | Self::InternalError(_) => ErrorClass::Other,
        }
    }

    /// Whether a retry with backoff may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::RateLimitExceeded { .. } | Self::ConnectionError(_) | Self::Timeout(_) => true,
            Self::ProviderApiError { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Whether this error should cancel the whole job rather than just the
    /// current turn.
    pub fn is_fatal_for_job(&self) -> bool {
        matches!(self, Self::AuthenticationFailed(_))
    }
}
