use plume_context::PrefetchStrategy;
use std::time::Duration;

/// Service-wide tunables with their documented defaults.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Per-document statement cache byte budget.
    pub statement_cache_buffer_size: usize,
    /// Weight of access counts versus recency in the eviction score.
    pub access_weight_factor: f64,
    pub cache_persistence_interval: Duration,
    pub suggestion_prefetch: bool,
    pub suggestion_prefetch_delay: Duration,
    pub validation_debounce_delay: Duration,
    pub schema_staleness_threshold: Duration,
    pub expander_cache_size: usize,
    pub expander_cache_ttl: Duration,
    pub expander_background_delay: Duration,
    pub expander_max_concurrent: usize,
    pub prefetch_strategy: PrefetchStrategy,
    pub server_timeout: Duration,
    pub suggestion_memo_capacity: usize,
    pub suggestion_memo_ttl: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        ServiceConfig {
            statement_cache_buffer_size: 5 * 1024 * 1024,
            access_weight_factor: 0.7,
            cache_persistence_interval: Duration::from_secs(30),
            suggestion_prefetch: true,
            suggestion_prefetch_delay: Duration::from_millis(50),
            validation_debounce_delay: Duration::from_millis(1000),
            schema_staleness_threshold: Duration::from_secs(300),
            expander_cache_size: 50,
            expander_cache_ttl: Duration::from_secs(300),
            expander_background_delay: Duration::from_millis(500),
            expander_max_concurrent: 3,
            prefetch_strategy: PrefetchStrategy::default(),
            server_timeout: Duration::from_secs(30),
            suggestion_memo_capacity: 100,
            suggestion_memo_ttl: Duration::from_secs(60),
        }
    }
}

impl ServiceConfig {
    pub(crate) fn expander_config(&self) -> plume_context::ExpanderConfig {
        plume_context::ExpanderConfig {
            cache_size: self.expander_cache_size,
            cache_ttl: self.expander_cache_ttl,
            background_delay: self.expander_background_delay,
            max_concurrent: self.expander_max_concurrent,
            strategy: self.prefetch_strategy,
        }
    }
}
