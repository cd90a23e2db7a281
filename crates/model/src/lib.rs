//! Uniform model adapter: one call interface over heterogeneous
//! providers, with retry, cost accounting and token estimation.
//!
//! Providers materialize responses before returning; streaming is not part
//! of the contract. Transient failures (429, 5xx, connection resets) retry
//! with exponential backoff and full jitter; permanent failures surface
//! immediately with a taxonomy the runner's propagation policy keys on.

mod error;
mod http_client;
mod pricing;
pub mod provider;
mod retry;
mod tokens;
mod types;

pub use error::{ErrorClass, LlmError, LlmResult};
pub use pricing::{Price, cost, price};
pub use provider::{CallRequest, FileRef, Provider, ProviderSet, RawResponse};
pub use provider::test::{DEFAULT_CANNED_RESPONSES, TestProvider};
pub use retry::RetryPolicy;
pub use tokens::{estimate_request_tokens, estimate_tokens};
pub use types::{Model, ModelParameters};
