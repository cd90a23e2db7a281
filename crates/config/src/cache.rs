use std::path::PathBuf;

use serde::Deserialize;

/// Response cache settings.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    /// Which backend stores cached responses.
    pub backend: CacheBackendConfig,

    /// Force a cache miss on lookup while still writing results back.
    pub fresh: bool,
}

/// Selects and parameterizes the cache backend.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(tag = "type", rename_all = "kebab-case", deny_unknown_fields)]
pub enum CacheBackendConfig {
    /// Process-local in-memory cache. The default; nothing survives the
    /// process.
    #[default]
    Memory,

    /// Append-only JSONL file replayed on open.
    File {
        /// Path of the cache log file. Created when missing.
        path: PathBuf,
    },

    /// Local file cache backed by a remote read-through tier.
    Tiered {
        /// Path of the local cache log file.
        path: PathBuf,
        /// Base URL of the remote cache service.
        remote_url: String,
    },
}

#[cfg(test)]
mod tests {
    use super::{CacheBackendConfig, CacheConfig};

    #[test]
    fn file_backend() {
        let config: CacheConfig = toml::from_str(
            r#"
            fresh = true

            [backend]
            type = "file"
            path = "/tmp/canvass-cache.jsonl"
            "#,
        )
        .unwrap();

        assert!(config.fresh);
        let CacheBackendConfig::File { path } = config.backend else {
            panic!("expected file backend");
        };
        assert_eq!(path.to_str(), Some("/tmp/canvass-cache.jsonl"));
    }
}
