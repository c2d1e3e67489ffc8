use indexmap::IndexMap;
use plume_syntax::{Diagnostic, Statement};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::time::Instant;
use tracing::warn;

/// One cached statement with its validation bookkeeping.
#[derive(Debug, Clone)]
pub struct CacheEntry<K> {
    pub statement: Statement<K>,
    pub is_valid: bool,
    pub is_dirty: bool,
    pub timestamp_created: Instant,
    pub timestamp_last_access: Instant,
    pub access_count: u64,
    pub byte_size: usize,
    pub errors: Vec<Diagnostic>,
}

/// Cache counters; `hits + misses` equals the number of `get` calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheMetrics {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    /// Dirty entries evicted because a single document exceeded the whole
    /// byte budget; tracked separately because dropping unvalidated work is
    /// worth noticing.
    pub dirty_evictions: u64,
}

impl CacheMetrics {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Debug)]
struct DocumentPartition<K> {
    entries: IndexMap<String, CacheEntry<K>>,
    bytes: usize,
}

impl<K> Default for DocumentPartition<K> {
    fn default() -> Self {
        DocumentPartition {
            entries: IndexMap::new(),
            bytes: 0,
        }
    }
}

/// Hash-keyed, byte-budgeted statement cache with access-weighted eviction.
///
/// Partitions are per document: each document has an independent dirty set
/// and an isolated byte budget, and entries are never shared across
/// documents. The eviction score blends access frequency with recency
/// (`access_weight_factor`, default 0.7, weights the former); dirty entries
/// are only evicted when a document alone exceeds the whole budget.
#[derive(Debug)]
pub struct StatementCache<K> {
    documents: HashMap<String, DocumentPartition<K>>,
    buffer_size: usize,
    access_weight_factor: f64,
    metrics: CacheMetrics,
}

impl<K: Clone> StatementCache<K> {
    pub fn new(buffer_size: usize, access_weight_factor: f64) -> StatementCache<K> {
        StatementCache {
            documents: HashMap::new(),
            buffer_size,
            access_weight_factor,
            metrics: CacheMetrics::default(),
        }
    }

    pub fn metrics(&self) -> CacheMetrics {
        self.metrics
    }

    /// Bytes currently charged to one document.
    pub fn document_bytes(&self, document_id: &str) -> usize {
        self.documents
            .get(document_id)
            .map(|partition| partition.bytes)
            .unwrap_or(0)
    }

    pub fn entry_count(&self, document_id: &str) -> usize {
        self.documents
            .get(document_id)
            .map(|partition| partition.entries.len())
            .unwrap_or(0)
    }

    /// Inserts or overwrites a statement, charging its bytes against the
    /// document's budget and evicting if needed.
    pub fn put(&mut self, document_id: &str, statement: Statement<K>) {
        let byte_size = statement.text.len();
        let hash = statement.hash.clone();
        let now = Instant::now();

        let partition = self.documents.entry(document_id.to_string()).or_default();
        if let Some(previous) = partition.entries.swap_remove(&hash) {
            partition.bytes -= previous.byte_size;
        }
        partition.bytes += byte_size;
        partition.entries.insert(
            hash,
            CacheEntry {
                statement,
                is_valid: false,
                is_dirty: true,
                timestamp_created: now,
                timestamp_last_access: now,
                access_count: 1,
                byte_size,
                errors: Vec::new(),
            },
        );

        self.evict_if_needed(document_id);
    }

    /// Looks up a statement by hash, bumping its access statistics.
    pub fn get(&mut self, document_id: &str, hash: &str) -> Option<&CacheEntry<K>> {
        let partition = self.documents.get_mut(document_id);
        match partition.and_then(|p| p.entries.get_mut(hash)) {
            Some(entry) => {
                entry.access_count += 1;
                entry.timestamp_last_access = Instant::now();
                self.metrics.hits += 1;
                Some(entry)
            }
            None => {
                self.metrics.misses += 1;
                None
            }
        }
    }

    /// Peeks without touching access statistics or hit counters.
    pub fn peek(&self, document_id: &str, hash: &str) -> Option<&CacheEntry<K>> {
        self.documents.get(document_id)?.entries.get(hash)
    }

    pub fn mark_dirty(&mut self, document_id: &str, hash: &str) {
        if let Some(entry) = self
            .documents
            .get_mut(document_id)
            .and_then(|p| p.entries.get_mut(hash))
        {
            entry.is_dirty = true;
        }
    }

    /// Stores a validation outcome. A valid entry's error list is cleared.
    pub fn mark_clean(
        &mut self,
        document_id: &str,
        hash: &str,
        is_valid: bool,
        errors: Vec<Diagnostic>,
    ) {
        if let Some(entry) = self
            .documents
            .get_mut(document_id)
            .and_then(|p| p.entries.get_mut(hash))
        {
            entry.is_dirty = false;
            entry.is_valid = is_valid;
            entry.errors = if is_valid { Vec::new() } else { errors };
        }
    }

    /// All dirty statements of one document, for validation queueing.
    pub fn dirty_statements(&self, document_id: &str) -> Vec<Statement<K>> {
        self.documents
            .get(document_id)
            .map(|partition| {
                partition
                    .entries
                    .values()
                    .filter(|entry| entry.is_dirty)
                    .map(|entry| entry.statement.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Drops every entry of one document.
    pub fn clear(&mut self, document_id: &str) {
        self.documents.remove(document_id);
    }

    /// All entries of one document, in insertion order.
    pub fn entries(&self, document_id: &str) -> Vec<&CacheEntry<K>> {
        self.documents
            .get(document_id)
            .map(|partition| partition.entries.values().collect())
            .unwrap_or_default()
    }

    fn evict_if_needed(&mut self, document_id: &str) {
        let factor = self.access_weight_factor;
        let buffer_size = self.buffer_size;
        let Some(partition) = self.documents.get_mut(document_id) else {
            return;
        };
        if partition.bytes <= buffer_size {
            return;
        }

        // Score clean entries; lowest go first. Recency is normalized
        // against the newest entry in the partition.
        let newest = partition
            .entries
            .values()
            .map(|e| e.timestamp_last_access)
            .max();
        let oldest = partition
            .entries
            .values()
            .map(|e| e.timestamp_last_access)
            .min();
        let span = match (newest, oldest) {
            (Some(newest), Some(oldest)) => (newest - oldest).as_secs_f64(),
            _ => 0.0,
        };

        let mut scored: Vec<(String, f64)> = partition
            .entries
            .iter()
            .filter(|(_, entry)| !entry.is_dirty)
            .map(|(hash, entry)| {
                let recency = match (newest, span > 0.0) {
                    (Some(newest), true) => {
                        1.0 - (newest - entry.timestamp_last_access).as_secs_f64() / span
                    }
                    _ => 1.0,
                };
                let score = factor * entry.access_count as f64 + (1.0 - factor) * recency;
                (hash.clone(), score)
            })
            .collect();
        scored.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));

        for (hash, _) in scored {
            if partition.bytes <= buffer_size {
                break;
            }
            if let Some(entry) = partition.entries.swap_remove(&hash) {
                partition.bytes -= entry.byte_size;
                self.metrics.evictions += 1;
            }
        }

        if partition.bytes <= buffer_size {
            return;
        }

        // Only dirty entries remain and the document alone exceeds the
        // budget: evict the oldest dirty entries, but account for it.
        let mut dirty: Vec<(String, Instant)> = partition
            .entries
            .iter()
            .map(|(hash, entry)| (hash.clone(), entry.timestamp_created))
            .collect();
        dirty.sort_by_key(|(_, created)| *created);
        for (hash, _) in dirty {
            if partition.bytes <= buffer_size {
                break;
            }
            if let Some(entry) = partition.entries.swap_remove(&hash) {
                partition.bytes -= entry.byte_size;
                self.metrics.evictions += 1;
                self.metrics.dirty_evictions += 1;
                warn!(
                    document_id,
                    hash = %entry.statement.hash,
                    "evicted a dirty statement; document exceeds the cache budget"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plume_syntax::docql;
    use pretty_assertions::assert_eq;

    fn statement(text: &str) -> Statement<docql::TokenKind> {
        let tokens = docql::lex(text);
        plume_syntax::split_docql(text, &tokens)
            .into_iter()
            .next()
            .unwrap()
    }

    fn cache(buffer: usize) -> StatementCache<docql::TokenKind> {
        StatementCache::new(buffer, 0.7)
    }

    #[tokio::test(start_paused = true)]
    async fn charged_bytes_track_live_entries() {
        let mut cache = cache(10_000);
        let a = statement("USE a;");
        let b = statement("USE bb;");
        cache.put("doc", a.clone());
        cache.put("doc", b.clone());
        assert_eq!(cache.document_bytes("doc"), a.text.len() + b.text.len());

        // Overwriting the same hash charges the bytes once.
        cache.put("doc", a.clone());
        assert_eq!(cache.document_bytes("doc"), a.text.len() + b.text.len());

        cache.clear("doc");
        assert_eq!(cache.document_bytes("doc"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn get_tracks_hits_and_misses() {
        let mut cache = cache(10_000);
        let a = statement("USE a;");
        cache.put("doc", a.clone());
        assert!(cache.get("doc", &a.hash).is_some());
        assert!(cache.get("doc", "missing").is_none());
        let metrics = cache.metrics();
        assert_eq!((metrics.hits, metrics.misses), (1, 1));
        assert!((metrics.hit_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[tokio::test(start_paused = true)]
    async fn mark_clean_clears_errors_when_valid() {
        let mut cache = cache(10_000);
        let a = statement("USE a;");
        cache.put("doc", a.clone());
        assert_eq!(cache.dirty_statements("doc").len(), 1);

        cache.mark_clean("doc", &a.hash, true, vec![]);
        assert!(cache.dirty_statements("doc").is_empty());
        let entry = cache.peek("doc", &a.hash).unwrap();
        assert!(entry.is_valid);
        assert!(entry.errors.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn access_weighted_eviction_keeps_frequent_entries() {
        let mut cache = cache(500);
        let frequent = statement("SELECT * FROM \"frequent_bundle_name\";");
        cache.put("doc", frequent.clone());
        cache.mark_clean("doc", &frequent.hash, true, vec![]);
        for _ in 0..10 {
            cache.get("doc", &frequent.hash);
        }

        for i in 0..10 {
            let one_shot =
                statement(&format!("SELECT * FROM \"one_shot_bundle_with_a_long_name_{i:02}\";"));
            let hash = one_shot.hash.clone();
            cache.put("doc", one_shot);
            cache.mark_clean("doc", &hash, true, vec![]);
        }

        assert!(
            cache.get("doc", &frequent.hash).is_some(),
            "frequently accessed entry must survive"
        );
        assert!(cache.metrics().evictions > 0);
        assert!(cache.document_bytes("doc") <= 500);
    }

    #[tokio::test(start_paused = true)]
    async fn dirty_entries_survive_normal_eviction() {
        let mut cache = cache(80);
        let dirty = statement("SELECT * FROM \"important_edit\";");
        cache.put("doc", dirty.clone());

        for i in 0..3 {
            let clean = statement(&format!("SELECT * FROM \"filler_{i}\";"));
            let hash = clean.hash.clone();
            cache.put("doc", clean);
            cache.mark_clean("doc", &hash, true, vec![]);
        }

        assert!(cache.peek("doc", &dirty.hash).is_some());
        assert_eq!(cache.metrics().dirty_evictions, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn oversized_document_evicts_oldest_dirty_with_accounting() {
        let mut cache = cache(60);
        let first = statement("SELECT * FROM \"the_first_dirty_statement\";");
        cache.put("doc", first.clone());
        tokio::time::advance(std::time::Duration::from_secs(1)).await;
        let second = statement("SELECT * FROM \"the_second_dirty_statement\";");
        cache.put("doc", second.clone());

        assert!(cache.metrics().dirty_evictions >= 1);
        assert!(cache.peek("doc", &first.hash).is_none(), "oldest goes first");
        assert!(cache.peek("doc", &second.hash).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn documents_are_isolated() {
        let mut cache = cache(10_000);
        let a = statement("USE a;");
        cache.put("doc1", a.clone());
        cache.put("doc2", a.clone());
        cache.mark_clean("doc1", &a.hash, true, vec![]);
        assert!(cache.dirty_statements("doc1").is_empty());
        assert_eq!(cache.dirty_statements("doc2").len(), 1);
    }
}
