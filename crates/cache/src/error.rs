use std::path::PathBuf;

use thiserror::Error;

/// Cache backend failures.
///
/// Local-backend failures degrade to no-cache at the orchestration layer;
/// they are never fatal to a turn.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The cache file could not be opened or created.
    #[error("Failed to open cache file {path}: {source}")]
    Open {
        /// The offending path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Appending an entry to the cache file failed.
    #[error("Failed to append to cache file: {0}")]
    Append(#[from] std::io::Error),

    /// An entry could not be serialized or a stored line was malformed.
    #[error("Malformed cache entry: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The remote tier failed.
    #[error("Remote cache error: {0}")]
    Remote(String),
}
