use std::collections::HashMap;

const MAX_TRACKED: usize = 200;
const TRIM_TO: usize = 100;

/// Per-process suggestion usage counters, owned by the service facade.
///
/// Memory is bounded: once more than 200 labels are tracked, the map is
/// trimmed back to the 100 most-used.
#[derive(Debug, Default)]
pub struct UsageTracker {
    counts: HashMap<String, u32>,
}

impl UsageTracker {
    pub fn new() -> UsageTracker {
        UsageTracker::default()
    }

    pub fn record(&mut self, label: &str) {
        *self.counts.entry(label.to_string()).or_insert(0) += 1;
        if self.counts.len() > MAX_TRACKED {
            self.trim();
        }
    }

    pub fn count(&self, label: &str) -> u32 {
        self.counts.get(label).copied().unwrap_or(0)
    }

    /// Ranking boost: two points per recorded use, capped at 20.
    pub fn boost(&self, label: &str) -> i32 {
        (self.count(label) as i32 * 2).min(20)
    }

    fn trim(&mut self) {
        let mut entries: Vec<(String, u32)> = self.counts.drain().collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        entries.truncate(TRIM_TO);
        self.counts = entries.into_iter().collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boost_is_capped() {
        let mut usage = UsageTracker::new();
        for _ in 0..50 {
            usage.record("users");
        }
        assert_eq!(usage.count("users"), 50);
        assert_eq!(usage.boost("users"), 20);
    }

    #[test]
    fn trims_to_the_most_used_labels() {
        let mut usage = UsageTracker::new();
        for i in 0..TRIM_TO {
            let label = format!("hot{i}");
            usage.record(&label);
            usage.record(&label);
        }
        for i in 0..=MAX_TRACKED - TRIM_TO {
            usage.record(&format!("cold{i}"));
        }
        assert!(usage.counts.len() <= TRIM_TO);
        assert_eq!(usage.count("hot0"), 2);
        assert_eq!(usage.count("cold0"), 0);
    }
}
