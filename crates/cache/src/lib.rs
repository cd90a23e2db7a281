//! Content-addressed response cache with at-most-once execution.
//!
//! Every provider call is keyed by a fingerprint of its full identity
//! (model, parameters, prompts, iteration). `get_or_build` guarantees that
//! concurrent requests for the same fingerprint invoke the builder exactly
//! once; every other caller awaits and reads the stored entry. Local
//! backend failures degrade to no-cache — a broken cache file slows a job
//! down, it does not fail it.

mod backend;
mod entry;
mod error;
mod fingerprint;

use std::sync::Arc;

pub use backend::{CacheBackend, FileCache, MemoryCache, TieredCache};
use config::CacheBackendConfig;
use dashmap::DashMap;
pub use entry::CacheEntry;
pub use error::CacheError;
pub use fingerprint::{FingerprintInput, canonical_json, sha256_hex};
use serde_json::Value;

/// Result of a cache consultation.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheOutcome {
    /// The entry, freshly built or read back.
    pub entry: CacheEntry,
    /// Whether the entry was served without invoking the builder.
    pub hit: bool,
}

/// The shared response cache: a backend plus the in-flight table that
/// enforces at-most-one concurrent build per fingerprint.
pub struct Cache {
    backend: Arc<dyn CacheBackend>,
    in_flight: DashMap<String, Arc<tokio::sync::Mutex<()>>>,
    fresh: bool,
}

impl Cache {
    /// Cache over an explicit backend.
    pub fn new(backend: Arc<dyn CacheBackend>) -> Self {
        Self {
            backend,
            in_flight: DashMap::new(),
            fresh: false,
        }
    }

    /// In-memory cache, the default for tests and one-shot runs.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryCache::new()))
    }

    /// Build the backend selected by the configuration.
    ///
    /// The tiered backend's remote side is an external collaborator; from
    /// configuration alone it starts local-only and an embedder attaches
    /// the remote tier with [`Cache::with_remote`].
    pub async fn from_config(config: &config::CacheConfig) -> Result<Self, CacheError> {
        let backend: Arc<dyn CacheBackend> = match &config.backend {
            CacheBackendConfig::Memory => Arc::new(MemoryCache::new()),
            CacheBackendConfig::File { path } => Arc::new(FileCache::open(path.clone()).await?),
            CacheBackendConfig::Tiered { path, remote_url } => {
                log::warn!(
                    "Tiered cache configured for {remote_url}; running local-only until a remote backend is attached"
                );
                Arc::new(FileCache::open(path.clone()).await?)
            }
        };

        Ok(Self {
            backend,
            in_flight: DashMap::new(),
            fresh: config.fresh,
        })
    }

    /// Wrap the current backend with a remote read-through tier.
    pub fn with_remote(self, remote: Box<dyn CacheBackend>) -> Self {
        let local: Box<dyn CacheBackend> = Box::new(ArcBackend(self.backend));

        Self {
            backend: Arc::new(TieredCache::new(local, remote)),
            in_flight: DashMap::new(),
            fresh: self.fresh,
        }
    }

    /// Force cache misses on lookup while still writing entries back.
    pub fn with_fresh(mut self, fresh: bool) -> Self {
        self.fresh = fresh;
        self
    }

    /// Whether lookups are bypassed.
    pub fn is_fresh(&self) -> bool {
        self.fresh
    }

    /// Direct lookup by call identity.
    pub async fn lookup(&self, input: &FingerprintInput<'_>) -> Result<Option<CacheEntry>, CacheError> {
        self.backend.lookup(&input.fingerprint()).await
    }

    /// Look up the entry for `input`, building it at most once across all
    /// concurrent callers on a miss.
    ///
    /// With `fresh` set, lookup is bypassed and the build happens under
    /// the first unused iteration bump, so prior and fresh entries
    /// coexist.
    pub async fn get_or_build<E, F, Fut>(&self, input: &FingerprintInput<'_>, builder: F) -> Result<CacheOutcome, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value, E>>,
    {
        let mut input = input.clone();

        if self.fresh {
            input.iteration = self.first_free_iteration(&input).await;
        }

        let fingerprint = input.fingerprint();

        if !self.fresh
            && let Some(entry) = self.degraded_lookup(&fingerprint).await
        {
            return Ok(CacheOutcome { entry, hit: true });
        }

        // One build per fingerprint: every caller takes the same lock, the
        // first builds, the rest find the entry on re-check.
        let lock = self
            .in_flight
            .entry(fingerprint.clone())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone();

        let outcome = {
            let _guard = lock.lock().await;

            if let Some(entry) = self.degraded_lookup(&fingerprint).await {
                CacheOutcome { entry, hit: true }
            } else {
                let output = match builder().await {
                    Ok(output) => output,
                    Err(e) => {
                        drop(_guard);
                        self.in_flight.remove(&fingerprint);
                        return Err(e);
                    }
                };
                let entry = CacheEntry::from_call(&input, fingerprint.clone(), output);

                if let Err(e) = self.backend.insert(entry.clone()).await {
                    log::warn!("Cache insert failed, continuing uncached: {e}");
                }

                CacheOutcome { entry, hit: false }
            }
        };

        self.in_flight.remove(&fingerprint);

        Ok(outcome)
    }

    /// Number of stored entries.
    pub async fn len(&self) -> usize {
        self.backend.len().await.unwrap_or(0)
    }

    /// All stored entries.
    pub async fn entries(&self) -> Result<Vec<CacheEntry>, CacheError> {
        self.backend.entries().await
    }

    async fn degraded_lookup(&self, fingerprint: &str) -> Option<CacheEntry> {
        match self.backend.lookup(fingerprint).await {
            Ok(entry) => entry,
            Err(e) => {
                log::warn!("Cache lookup failed, treating as miss: {e}");
                None
            }
        }
    }

    async fn first_free_iteration(&self, input: &FingerprintInput<'_>) -> u32 {
        let mut probe = input.clone();

        loop {
            if self.degraded_lookup(&probe.fingerprint()).await.is_none() {
                return probe.iteration;
            }

            probe.iteration += 1;
        }
    }
}

/// Adapter so an `Arc<dyn CacheBackend>` can sit inside a tiered backend.
struct ArcBackend(Arc<dyn CacheBackend>);

#[async_trait::async_trait]
impl CacheBackend for ArcBackend {
    async fn lookup(&self, fingerprint: &str) -> Result<Option<CacheEntry>, CacheError> {
        self.0.lookup(fingerprint).await
    }

    async fn insert(&self, entry: CacheEntry) -> Result<(), CacheError> {
        self.0.insert(entry).await
    }

    async fn len(&self) -> Result<usize, CacheError> {
        self.0.len().await
    }

    async fn entries(&self) -> Result<Vec<CacheEntry>, CacheError> {
        self.0.entries().await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    use super::*;

    async fn must_not_build() -> Result<Value, CacheError> {
        panic!("builder must not run");
    }

    fn input<'a>(parameters: &'a Value, user_prompt: &'a str) -> FingerprintInput<'a> {
        FingerprintInput {
            model_identity: "test/canned",
            parameters,
            system_prompt: "s",
            user_prompt,
            iteration: 0,
            file_hashes: &[],
        }
    }

    #[tokio::test]
    async fn build_then_hit() {
        let cache = Cache::in_memory();
        let parameters = json!({});
        let key = input(&parameters, "hello");

        let first = cache
            .get_or_build(&key, || async { Ok::<_, CacheError>(json!("out")) })
            .await
            .unwrap();
        assert!(!first.hit);

        let second = cache.get_or_build(&key, || must_not_build()).await.unwrap();
        assert!(second.hit);
        assert_eq!(second.entry.output_raw, json!("out"));
    }

    #[tokio::test]
    async fn concurrent_builds_coalesce() {
        let cache = Arc::new(Cache::in_memory());
        let calls = Arc::new(AtomicUsize::new(0));
        let parameters = json!({ "temperature": 0.0 });

        let mut handles = Vec::new();

        for _ in 0..16 {
            let cache = cache.clone();
            let calls = calls.clone();
            let parameters = parameters.clone();

            handles.push(tokio::spawn(async move {
                let key = input(&parameters, "same prompt");

                cache
                    .get_or_build(&key, || async {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                        Ok::<_, CacheError>(json!("only once"))
                    })
                    .await
                    .unwrap()
            }));
        }

        let mut hits = 0;
        for handle in handles {
            let outcome = handle.await.unwrap();
            assert_eq!(outcome.entry.output_raw, json!("only once"));
            if outcome.hit {
                hits += 1;
            }
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(hits, 15);
    }

    #[tokio::test]
    async fn fresh_bypasses_lookup_and_keeps_both_versions() {
        let backend = Arc::new(MemoryCache::new());
        let parameters = json!({});

        let cache = Cache::new(backend.clone());
        let key = input(&parameters, "prompt");
        cache
            .get_or_build(&key, || async { Ok::<_, CacheError>(json!("v1")) })
            .await
            .unwrap();

        let fresh = Cache::new(backend.clone()).with_fresh(true);
        let outcome = fresh
            .get_or_build(&key, || async { Ok::<_, CacheError>(json!("v2")) })
            .await
            .unwrap();

        assert!(!outcome.hit);
        assert_eq!(outcome.entry.iteration, 1);
        assert_eq!(backend.len().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn file_cache_round_trips_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.jsonl");
        let parameters = json!({ "temperature": 0.7 });

        {
            let cache = Cache::new(Arc::new(FileCache::open(&path).await.unwrap()));
            cache
                .get_or_build(&input(&parameters, "persisted"), || async {
                    Ok::<_, CacheError>(json!({ "text": "stored" }))
                })
                .await
                .unwrap();
        }

        let reopened = Cache::new(Arc::new(FileCache::open(&path).await.unwrap()));
        let outcome = reopened
            .get_or_build(&input(&parameters, "persisted"), || must_not_build())
            .await
            .unwrap();

        assert!(outcome.hit);
        assert_eq!(outcome.entry.output_raw, json!({ "text": "stored" }));
    }

    #[tokio::test]
    async fn tiered_reads_through_and_writes_back() {
        let remote = Arc::new(MemoryCache::new());
        let parameters = json!({});

        // Seed the remote tier directly.
        let seeded = Cache::new(remote.clone());
        seeded
            .get_or_build(&input(&parameters, "remote prompt"), || async {
                Ok::<_, CacheError>(json!("from remote"))
            })
            .await
            .unwrap();

        let local = Arc::new(MemoryCache::new());
        let tiered = Cache::new(local.clone()).with_remote(Box::new(ArcBackend(remote)));

        let outcome = tiered
            .get_or_build(&input(&parameters, "remote prompt"), || must_not_build())
            .await
            .unwrap();

        assert!(outcome.hit);
        // The hit was written back into the local tier.
        assert_eq!(local.len().await.unwrap(), 1);
    }
}
