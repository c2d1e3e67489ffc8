use super::Suggestion;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::time::Duration;
use tokio::time::Instant;

/// TTL'd LRU memoization of suggestion results, keyed by the request shape
/// (complete-token texts, cursor, partial word).
pub struct Memoizer {
    cache: Mutex<LruCache<String, (Instant, Vec<Suggestion>)>>,
    ttl: Duration,
}

impl Memoizer {
    pub fn new(capacity: usize, ttl: Duration) -> Memoizer {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Memoizer {
            cache: Mutex::new(LruCache::new(capacity)),
            ttl,
        }
    }

    pub fn get(&self, key: &str) -> Option<Vec<Suggestion>> {
        let mut cache = self.cache.lock();
        match cache.get(key) {
            Some((inserted, _)) if inserted.elapsed() > self.ttl => {
                cache.pop(key);
                None
            }
            Some((_, suggestions)) => Some(suggestions.clone()),
            None => None,
        }
    }

    pub fn put(&self, key: String, suggestions: Vec<Suggestion>) {
        self.cache.lock().put(key, (Instant::now(), suggestions));
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.cache.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::suggest::SuggestionKind;

    fn suggestion(label: &str) -> Suggestion {
        Suggestion {
            label: label.to_string(),
            kind: SuggestionKind::Keyword,
            detail: None,
            documentation: None,
            insert_text: label.to_string(),
            priority: 50,
            sort_text: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire() {
        let memo = Memoizer::new(10, Duration::from_secs(60));
        memo.put("key".to_string(), vec![suggestion("SELECT")]);
        assert!(memo.get("key").is_some());
        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(memo.get("key").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn capacity_is_bounded() {
        let memo = Memoizer::new(2, Duration::from_secs(60));
        memo.put("a".to_string(), vec![]);
        memo.put("b".to_string(), vec![]);
        memo.put("c".to_string(), vec![]);
        assert_eq!(memo.len(), 2);
        assert!(memo.get("a").is_none());
    }
}
