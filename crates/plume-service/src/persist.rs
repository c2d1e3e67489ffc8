use crate::cache::{CacheEntry, CacheMetrics, StatementCache};
use async_trait::async_trait;
use plume_syntax::{statement_hash, Diagnostic, Statement};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

/// Format marker for the on-disk cache. Any mismatch wipes the directory;
/// stale formats are never migrated.
pub const CACHE_FORMAT_VERSION: &str = "3";

const INDEX_FILE: &str = "cache-index.json";

/// Storage interface for cache persistence. The default implementation
/// writes UTF-8 JSON files under a `.cache` directory; hosts may inject
/// their own.
#[async_trait]
pub trait CacheStorage: Send + Sync {
    async fn read(&self, name: &str) -> io::Result<Option<String>>;
    async fn write(&self, name: &str, contents: &str) -> io::Result<()>;
    async fn remove(&self, name: &str) -> io::Result<()>;
    /// Deletes the whole cache directory (version mismatch recovery).
    async fn clear_all(&self) -> io::Result<()>;
}

/// Filesystem-backed storage under `<root>/.cache/`.
pub struct FsCacheStorage {
    root: PathBuf,
}

impl FsCacheStorage {
    pub fn new(root: impl Into<PathBuf>) -> FsCacheStorage {
        FsCacheStorage {
            root: root.into().join(".cache"),
        }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }
}

#[async_trait]
impl CacheStorage for FsCacheStorage {
    async fn read(&self, name: &str) -> io::Result<Option<String>> {
        match tokio::fs::read_to_string(self.path(name)).await {
            Ok(contents) => Ok(Some(contents)),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(error) => Err(error),
        }
    }

    async fn write(&self, name: &str, contents: &str) -> io::Result<()> {
        tokio::fs::create_dir_all(&self.root).await?;
        tokio::fs::write(self.path(name), contents).await
    }

    async fn remove(&self, name: &str) -> io::Result<()> {
        match tokio::fs::remove_file(self.path(name)).await {
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }

    async fn clear_all(&self) -> io::Result<()> {
        match tokio::fs::remove_dir_all(&self.root).await {
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheIndex {
    version: String,
    documents: Vec<IndexEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct IndexEntry {
    document_id: String,
    filename: String,
    timestamp: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct DocumentFile<K> {
    version: String,
    document_id: String,
    timestamp: u64,
    statements: Vec<PersistedEntry<K>>,
    metrics: CacheMetrics,
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedEntry<K> {
    statement: Statement<K>,
    is_valid: bool,
    access_count: u64,
    errors: Vec<Diagnostic>,
}

/// Deterministic per-document filename: `document-<safe_id>-<hash8>.json`.
pub fn document_filename(document_id: &str) -> String {
    let safe_id: String = document_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    let hash8 = &statement_hash(document_id)[..8];
    format!("document-{safe_id}-{hash8}.json")
}

fn unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Saves one document's cache partition and updates the index. Failures are
/// logged and swallowed; persistence is strictly best-effort.
pub async fn save_document<K: Clone + Serialize>(
    storage: &dyn CacheStorage,
    cache: &parking_lot::Mutex<StatementCache<K>>,
    document_id: &str,
) {
    let (statements, metrics) = {
        let cache = cache.lock();
        let statements: Vec<PersistedEntry<K>> = cache
            .entries(document_id)
            .into_iter()
            .map(|entry: &CacheEntry<K>| PersistedEntry {
                statement: entry.statement.clone(),
                is_valid: entry.is_valid,
                access_count: entry.access_count,
                errors: entry.errors.clone(),
            })
            .collect();
        (statements, cache.metrics())
    };

    let filename = document_filename(document_id);
    let file = DocumentFile {
        version: CACHE_FORMAT_VERSION.to_string(),
        document_id: document_id.to_string(),
        timestamp: unix_timestamp(),
        statements,
        metrics,
    };

    let contents = match serde_json::to_string(&file) {
        Ok(contents) => contents,
        Err(error) => {
            warn!(%error, document_id, "cache serialization failed");
            return;
        }
    };
    if let Err(error) = storage.write(&filename, &contents).await {
        warn!(%error, document_id, "cache persistence failed");
        return;
    }

    update_index(storage, document_id, &filename).await;
}

async fn update_index(storage: &dyn CacheStorage, document_id: &str, filename: &str) {
    let mut index = match read_index(storage).await {
        Some(index) => index,
        None => CacheIndex {
            version: CACHE_FORMAT_VERSION.to_string(),
            documents: Vec::new(),
        },
    };
    index.documents.retain(|entry| entry.document_id != document_id);
    index.documents.push(IndexEntry {
        document_id: document_id.to_string(),
        filename: filename.to_string(),
        timestamp: unix_timestamp(),
    });
    match serde_json::to_string(&index) {
        Ok(contents) => {
            if let Err(error) = storage.write(INDEX_FILE, &contents).await {
                warn!(%error, "cache index write failed");
            }
        }
        Err(error) => warn!(%error, "cache index serialization failed"),
    }
}

async fn read_index(storage: &dyn CacheStorage) -> Option<CacheIndex> {
    let contents = storage.read(INDEX_FILE).await.ok()??;
    serde_json::from_str(&contents).ok()
}

/// Restores one document's cache partition, wiping the whole cache
/// directory on a version mismatch. Restored entries are clean: they were
/// validated when they were saved.
pub async fn load_document<K: Clone + DeserializeOwned + Serialize>(
    storage: &dyn CacheStorage,
    cache: &parking_lot::Mutex<StatementCache<K>>,
    document_id: &str,
) {
    if let Some(index) = read_index(storage).await {
        if index.version != CACHE_FORMAT_VERSION {
            warn!(
                found = %index.version,
                expected = CACHE_FORMAT_VERSION,
                "cache format version mismatch; clearing cache directory"
            );
            if let Err(error) = storage.clear_all().await {
                warn!(%error, "cache directory cleanup failed");
            }
            return;
        }
    }

    let filename = document_filename(document_id);
    let contents = match storage.read(&filename).await {
        Ok(Some(contents)) => contents,
        Ok(None) => return,
        Err(error) => {
            warn!(%error, document_id, "cache load failed");
            return;
        }
    };
    let file: DocumentFile<K> = match serde_json::from_str(&contents) {
        Ok(file) => file,
        Err(error) => {
            warn!(%error, document_id, "cache file is corrupt; ignoring");
            return;
        }
    };
    if file.version != CACHE_FORMAT_VERSION {
        warn!(
            found = %file.version,
            expected = CACHE_FORMAT_VERSION,
            "cache format version mismatch; clearing cache directory"
        );
        if let Err(error) = storage.clear_all().await {
            warn!(%error, "cache directory cleanup failed");
        }
        return;
    }

    let count = file.statements.len();
    let mut cache = cache.lock();
    for persisted in file.statements {
        let hash = persisted.statement.hash.clone();
        cache.put(document_id, persisted.statement);
        cache.mark_clean(document_id, &hash, persisted.is_valid, persisted.errors);
    }
    debug!(document_id, count, "cache partition restored");
}
