//! Cache storage backends.

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::io::AsyncWriteExt;

use crate::{CacheEntry, CacheError};

/// Storage contract every backend honors. `insert` is idempotent with
/// first-write-wins semantics: a second insert under the same fingerprint
/// is a no-op.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// The entry under `fingerprint`, if present.
    async fn lookup(&self, fingerprint: &str) -> Result<Option<CacheEntry>, CacheError>;

    /// Store an entry; no-op when the fingerprint already exists.
    async fn insert(&self, entry: CacheEntry) -> Result<(), CacheError>;

    /// Number of stored entries.
    async fn len(&self) -> Result<usize, CacheError>;

    /// All stored entries, in no particular order.
    async fn entries(&self) -> Result<Vec<CacheEntry>, CacheError>;
}

/// Process-local in-memory backend. The default; nothing survives the
/// process.
#[derive(Default)]
pub struct MemoryCache {
    entries: DashMap<String, CacheEntry>,
}

impl MemoryCache {
    /// Empty in-memory cache.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheBackend for MemoryCache {
    async fn lookup(&self, fingerprint: &str) -> Result<Option<CacheEntry>, CacheError> {
        Ok(self.entries.get(fingerprint).map(|entry| entry.value().clone()))
    }

    async fn insert(&self, entry: CacheEntry) -> Result<(), CacheError> {
        self.entries.entry(entry.fingerprint.clone()).or_insert(entry);
        Ok(())
    }

    async fn len(&self) -> Result<usize, CacheError> {
        Ok(self.entries.len())
    }

    async fn entries(&self) -> Result<Vec<CacheEntry>, CacheError> {
        Ok(self.entries.iter().map(|entry| entry.value().clone()).collect())
    }
}

/// Append-only JSONL file, replayed into memory on open. Reads are served
/// from the in-memory index; writes append one line per new entry.
pub struct FileCache {
    index: DashMap<String, CacheEntry>,
    file: tokio::sync::Mutex<tokio::fs::File>,
}

impl FileCache {
    /// Open or create the cache file at `path`, replaying existing rows.
    /// Unparseable lines are skipped with a warning — a torn final write
    /// must not make the whole cache unusable.
    pub async fn open(path: impl Into<std::path::PathBuf>) -> Result<Self, CacheError> {
        let path = path.into();

        let existing = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(source) => return Err(CacheError::Open { path, source }),
        };

        let index = DashMap::new();

        for (line_number, line) in existing.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }

            match serde_json::from_str::<CacheEntry>(line) {
                Ok(entry) => {
                    // First write wins on replay as well.
                    index.entry(entry.fingerprint.clone()).or_insert(entry);
                }
                Err(e) => {
                    log::warn!("Skipping malformed cache line {}: {e}", line_number + 1);
                }
            }
        }

        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|source| CacheError::Open { path, source })?;

        log::debug!("Opened file cache with {} entries", index.len());

        Ok(Self {
            index,
            file: tokio::sync::Mutex::new(file),
        })
    }
}

#[async_trait]
impl CacheBackend for FileCache {
    async fn lookup(&self, fingerprint: &str) -> Result<Option<CacheEntry>, CacheError> {
        Ok(self.index.get(fingerprint).map(|entry| entry.value().clone()))
    }

    async fn insert(&self, entry: CacheEntry) -> Result<(), CacheError> {
        use dashmap::mapref::entry::Entry;

        match self.index.entry(entry.fingerprint.clone()) {
            Entry::Occupied(_) => return Ok(()),
            Entry::Vacant(slot) => {
                slot.insert(entry.clone());
            }
        }

        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');

        let mut file = self.file.lock().await;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        Ok(())
    }

    async fn len(&self) -> Result<usize, CacheError> {
        Ok(self.index.len())
    }

    async fn entries(&self) -> Result<Vec<CacheEntry>, CacheError> {
        Ok(self.index.iter().map(|entry| entry.value().clone()).collect())
    }
}

/// Local backend with a remote read-through tier.
///
/// Lookups try local first, then the remote; remote hits are written back
/// locally. Remote failures degrade to local-only with a warning — only
/// the local tier is load-bearing.
pub struct TieredCache {
    local: Box<dyn CacheBackend>,
    remote: Box<dyn CacheBackend>,
}

impl TieredCache {
    /// Combine a local and a remote backend.
    pub fn new(local: Box<dyn CacheBackend>, remote: Box<dyn CacheBackend>) -> Self {
        Self { local, remote }
    }
}

#[async_trait]
impl CacheBackend for TieredCache {
    async fn lookup(&self, fingerprint: &str) -> Result<Option<CacheEntry>, CacheError> {
        if let Some(entry) = self.local.lookup(fingerprint).await? {
            return Ok(Some(entry));
        }

        match self.remote.lookup(fingerprint).await {
            Ok(Some(entry)) => {
                if let Err(e) = self.local.insert(entry.clone()).await {
                    log::warn!("Failed to write back remote cache hit: {e}");
                }
                Ok(Some(entry))
            }
            Ok(None) => Ok(None),
            Err(e) => {
                log::warn!("Remote cache lookup failed, continuing without it: {e}");
                Ok(None)
            }
        }
    }

    async fn insert(&self, entry: CacheEntry) -> Result<(), CacheError> {
        self.local.insert(entry.clone()).await?;

        if let Err(e) = self.remote.insert(entry).await {
            log::warn!("Remote cache insert failed: {e}");
        }

        Ok(())
    }

    async fn len(&self) -> Result<usize, CacheError> {
        self.local.len().await
    }

    async fn entries(&self) -> Result<Vec<CacheEntry>, CacheError> {
        self.local.entries().await
    }
}
