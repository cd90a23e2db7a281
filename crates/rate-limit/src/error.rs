use thiserror::Error;

/// Bucket acquisition failures. Fatal to the turn that hit them, never to
/// the job.
#[derive(Debug, Clone, Copy, Error, PartialEq)]
pub enum BucketError {
    /// The bucket cannot ever satisfy the request: no refill and not
    /// enough capacity left.
    #[error("Bucket with no refill cannot satisfy a request of {requested} (capacity {capacity})")]
    NoRefill {
        /// Tokens requested.
        requested: f64,
        /// Configured burst capacity.
        capacity: f64,
    },
}
