use crate::context::SchemaContext;
use crate::schema::{Bundle, Field};
use crate::server::SchemaServer;
use lru::LruCache;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, warn};

/// How eagerly the expander warms its caches after a bundle load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PrefetchStrategy {
    /// Never prefetch.
    Conservative,
    /// Prefetch related bundles (via relationships) and fields if empty.
    #[default]
    Moderate,
    /// Additionally prefetch every other bundle in the same database.
    Aggressive,
}

#[derive(Debug, Clone)]
pub struct ExpanderConfig {
    pub cache_size: usize,
    pub cache_ttl: Duration,
    pub background_delay: Duration,
    /// Concurrent prefetch loads are bounded by this regardless of
    /// strategy; aggressive prefetching must not stampede the server.
    pub max_concurrent: usize,
    pub strategy: PrefetchStrategy,
}

impl Default for ExpanderConfig {
    fn default() -> Self {
        ExpanderConfig {
            cache_size: 50,
            cache_ttl: Duration::from_secs(300),
            background_delay: Duration::from_millis(500),
            max_concurrent: 3,
            strategy: PrefetchStrategy::default(),
        }
    }
}

/// Counters exposed to the host's status surface.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExpanderStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub bundle_entries: usize,
    pub field_entries: usize,
}

struct Slot<T> {
    value: T,
    inserted: Instant,
    access_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum PrefetchKind {
    Bundle,
    Fields,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct PrefetchRequest {
    database: String,
    bundle: String,
    kind: PrefetchKind,
    priority: u32,
}

/// Sits between the suggestion engine and the schema server: a TTL'd LRU
/// over bundle metadata and field lists, with strategy-driven background
/// prefetching.
///
/// Every server error is recoverable: the expander logs and returns
/// `None`/empty so the suggestion path is never blocked on the server.
pub struct ContextExpander {
    context: Arc<RwLock<SchemaContext>>,
    server: Arc<dyn SchemaServer>,
    config: ExpanderConfig,
    bundles: Mutex<LruCache<String, Slot<Bundle>>>,
    fields: Mutex<LruCache<String, Slot<Vec<Field>>>>,
    queue: Mutex<Vec<PrefetchRequest>>,
    drain_scheduled: AtomicBool,
    shutdown: AtomicBool,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl ContextExpander {
    pub fn new(
        context: Arc<RwLock<SchemaContext>>,
        server: Arc<dyn SchemaServer>,
        config: ExpanderConfig,
    ) -> ContextExpander {
        ContextExpander {
            context,
            server,
            config,
            bundles: Mutex::new(LruCache::unbounded()),
            fields: Mutex::new(LruCache::unbounded()),
            queue: Mutex::new(Vec::new()),
            drain_scheduled: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Stops background prefetching; in-flight drains finish their current
    /// batch and exit.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    pub fn stats(&self) -> ExpanderStats {
        ExpanderStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            bundle_entries: self.bundles.lock().len(),
            field_entries: self.fields.lock().len(),
        }
    }

    /// Resolves a bundle: expander cache, then schema context, then the
    /// server. Server loads are written back into the context and trigger
    /// prefetching per the configured strategy.
    pub async fn expand_bundle(self: &Arc<Self>, database: &str, bundle: &str) -> Option<Bundle> {
        let key = cache_key(database, bundle, false);

        if let Some(found) = get_slot(&self.bundles, &key, self.config.cache_ttl) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Some(found);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        if let Some(found) = self.context.read().get_bundle(database, bundle).cloned() {
            self.put_bundle(key, found.clone());
            return Some(found);
        }

        match self.server.get_bundle(database, bundle).await {
            Ok(definition) => {
                let loaded = definition.into_bundle(database);
                self.context.write().absorb_bundle(database, loaded.clone());
                self.put_bundle(key, loaded.clone());
                self.schedule_prefetch(database, &loaded);
                Some(loaded)
            }
            Err(error) => {
                warn!(%error, database, bundle, "bundle expansion failed");
                None
            }
        }
    }

    /// Resolves a bundle's field list with the same cache → context →
    /// server discipline.
    pub async fn expand_fields(self: &Arc<Self>, database: &str, bundle: &str) -> Vec<Field> {
        let key = cache_key(database, bundle, true);

        if let Some(found) = get_slot(&self.fields, &key, self.config.cache_ttl) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return found;
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        let from_context = self
            .context
            .read()
            .get_bundle(database, bundle)
            .filter(|b| !b.fields.is_empty())
            .map(|b| b.fields.values().cloned().collect::<Vec<_>>());
        if let Some(found) = from_context {
            self.put_fields(key, found.clone());
            return found;
        }

        match self.server.get_fields(database, bundle).await {
            Ok(fields) => {
                self.absorb_fields(database, bundle, &fields);
                self.put_fields(key, fields.clone());
                fields
            }
            Err(error) => {
                warn!(%error, database, bundle, "field expansion failed");
                Vec::new()
            }
        }
    }

    fn absorb_fields(&self, database: &str, bundle: &str, fields: &[Field]) {
        let mut context = self.context.write();
        let mut updated = match context.get_bundle(database, bundle) {
            Some(existing) => existing.clone(),
            None => Bundle {
                name: bundle.to_string(),
                database: database.to_string(),
                fields: Default::default(),
                relationships: Default::default(),
                indexes: Vec::new(),
            },
        };
        updated.fields = fields
            .iter()
            .cloned()
            .map(|field| (field.name.clone(), field))
            .collect();
        context.absorb_bundle(database, updated);
    }

    /// Queues prefetch work for a freshly loaded bundle.
    fn schedule_prefetch(self: &Arc<Self>, database: &str, loaded: &Bundle) {
        let mut requests = Vec::new();
        match self.config.strategy {
            PrefetchStrategy::Conservative => return,
            PrefetchStrategy::Moderate | PrefetchStrategy::Aggressive => {
                for relationship in loaded.relationships.values() {
                    if relationship.to_bundle != loaded.name {
                        requests.push(PrefetchRequest {
                            database: database.to_string(),
                            bundle: relationship.to_bundle.clone(),
                            kind: PrefetchKind::Bundle,
                            priority: 10,
                        });
                    }
                }
                if loaded.fields.is_empty() {
                    requests.push(PrefetchRequest {
                        database: database.to_string(),
                        bundle: loaded.name.clone(),
                        kind: PrefetchKind::Fields,
                        priority: 20,
                    });
                }
            }
        }
        if self.config.strategy == PrefetchStrategy::Aggressive {
            let context = self.context.read();
            for other in context.all_bundles(database) {
                if other.name != loaded.name {
                    requests.push(PrefetchRequest {
                        database: database.to_string(),
                        bundle: other.name.clone(),
                        kind: PrefetchKind::Bundle,
                        priority: 1,
                    });
                }
            }
        }

        if requests.is_empty() {
            return;
        }
        {
            let mut queue = self.queue.lock();
            for request in requests {
                if !queue.contains(&request) {
                    queue.push(request);
                }
            }
        }
        self.schedule_drain();
    }

    /// Arms the delayed drain task unless one is already pending.
    fn schedule_drain(self: &Arc<Self>) {
        if self.drain_scheduled.swap(true, Ordering::SeqCst) {
            return;
        }
        let this = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(this.config.background_delay).await;
            this.drain_scheduled.store(false, Ordering::SeqCst);
            this.drain_queue().await;
        });
    }

    /// Processes the queue highest-priority first, at most `max_concurrent`
    /// loads in flight at a time.
    async fn drain_queue(self: Arc<Self>) {
        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                return;
            }
            let batch: Vec<PrefetchRequest> = {
                let mut queue = self.queue.lock();
                queue.sort_by(|a, b| b.priority.cmp(&a.priority));
                let take = queue.len().min(self.config.max_concurrent);
                queue.drain(..take).collect()
            };
            if batch.is_empty() {
                return;
            }
            debug!(count = batch.len(), "prefetching schema entries");
            let mut tasks = JoinSet::new();
            for request in batch {
                let this = Arc::clone(&self);
                tasks.spawn(async move { this.process_prefetch(request).await });
            }
            while tasks.join_next().await.is_some() {}
        }
    }

    /// One prefetch load. Completion is committed atomically: the cache and
    /// context are only touched once the server call has succeeded. Errors
    /// are logged and dropped; prefetching is best-effort.
    async fn process_prefetch(self: Arc<Self>, request: PrefetchRequest) {
        match request.kind {
            PrefetchKind::Bundle => {
                let key = cache_key(&request.database, &request.bundle, false);
                if get_slot(&self.bundles, &key, self.config.cache_ttl).is_some() {
                    return;
                }
                match self.server.get_bundle(&request.database, &request.bundle).await {
                    Ok(definition) => {
                        let loaded = definition.into_bundle(&request.database);
                        self.context
                            .write()
                            .absorb_bundle(&request.database, loaded.clone());
                        self.put_bundle(key, loaded);
                    }
                    Err(error) => {
                        debug!(%error, bundle = %request.bundle, "prefetch skipped");
                    }
                }
            }
            PrefetchKind::Fields => {
                let key = cache_key(&request.database, &request.bundle, true);
                if get_slot(&self.fields, &key, self.config.cache_ttl).is_some() {
                    return;
                }
                match self.server.get_fields(&request.database, &request.bundle).await {
                    Ok(fields) => {
                        self.absorb_fields(&request.database, &request.bundle, &fields);
                        self.put_fields(key, fields);
                    }
                    Err(error) => {
                        debug!(%error, bundle = %request.bundle, "prefetch skipped");
                    }
                }
            }
        }
    }

    fn put_bundle(&self, key: String, value: Bundle) {
        put_slot(
            &self.bundles,
            key,
            value,
            self.config.cache_size,
            &self.evictions,
        );
    }

    fn put_fields(&self, key: String, value: Vec<Field>) {
        put_slot(
            &self.fields,
            key,
            value,
            self.config.cache_size,
            &self.evictions,
        );
    }
}

fn cache_key(database: &str, bundle: &str, fields: bool) -> String {
    if fields {
        format!("{database}:{bundle}:fields")
    } else {
        format!("{database}:{bundle}")
    }
}

fn get_slot<T: Clone>(
    cache: &Mutex<LruCache<String, Slot<T>>>,
    key: &str,
    ttl: Duration,
) -> Option<T> {
    let mut cache = cache.lock();
    let expired = match cache.get(key) {
        Some(slot) => slot.inserted.elapsed() > ttl,
        None => return None,
    };
    if expired {
        cache.pop(key);
        return None;
    }
    let slot = cache.get_mut(key)?;
    slot.access_count += 1;
    Some(slot.value.clone())
}

fn put_slot<T>(
    cache: &Mutex<LruCache<String, Slot<T>>>,
    key: String,
    value: T,
    cache_size: usize,
    evictions: &AtomicU64,
) {
    let mut cache = cache.lock();
    cache.put(
        key,
        Slot {
            value,
            inserted: Instant::now(),
            access_count: 0,
        },
    );
    if cache.len() <= cache_size {
        return;
    }
    // Over capacity: drop the 20% least-accessed, oldest entries.
    let mut candidates: Vec<(String, u64, Instant)> = cache
        .iter()
        .map(|(key, slot)| (key.clone(), slot.access_count, slot.inserted))
        .collect();
    candidates.sort_by(|a, b| a.1.cmp(&b.1).then(a.2.cmp(&b.2)));
    let drop_count = (cache.len() / 5).max(1);
    for (key, _, _) in candidates.into_iter().take(drop_count) {
        cache.pop(&key);
        evictions.fetch_add(1, Ordering::Relaxed);
    }
}
