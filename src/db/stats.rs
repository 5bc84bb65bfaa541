//! Query and update counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters of statements issued and rows updated.
///
/// Sessions share one instance through an `Arc`; pass the same instance to
/// several sessions to aggregate their traffic.
#[derive(Debug, Default)]
pub struct QueryStats {
    queries: AtomicU64,
    updates: AtomicU64,
}

impl QueryStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_queries(&self, n: u64) {
        self.queries.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_updates(&self, n: u64) {
        self.updates.fetch_add(n, Ordering::Relaxed);
    }

    pub fn queries(&self) -> u64 {
        self.queries.load(Ordering::Relaxed)
    }

    pub fn updates(&self) -> u64 {
        self.updates.load(Ordering::Relaxed)
    }

    /// Return the query count and reset it to zero.
    pub fn take_queries(&self) -> u64 {
        self.queries.swap(0, Ordering::Relaxed)
    }

    /// Return the update count and reset it to zero.
    pub fn take_updates(&self) -> u64 {
        self.updates.swap(0, Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.queries.store(0, Ordering::Relaxed);
        self.updates.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_counters() {
        let stats = QueryStats::new();
        stats.add_queries(2);
        stats.add_updates(5);
        stats.add_queries(1);
        assert_eq!(stats.queries(), 3);
        assert_eq!(stats.updates(), 5);
    }

    #[test]
    fn test_take_resets() {
        let stats = QueryStats::new();
        stats.add_queries(4);
        stats.add_updates(7);
        assert_eq!(stats.take_queries(), 4);
        assert_eq!(stats.queries(), 0);
        assert_eq!(stats.updates(), 7);
        assert_eq!(stats.take_updates(), 7);
        assert_eq!(stats.take_updates(), 0);
    }

    #[test]
    fn test_reset() {
        let stats = QueryStats::new();
        stats.add_queries(1);
        stats.add_updates(1);
        stats.reset();
        assert_eq!((stats.queries(), stats.updates()), (0, 0));
    }

    #[tokio::test]
    async fn test_concurrent_increments() {
        let stats = Arc::new(QueryStats::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let stats = Arc::clone(&stats);
            handles.push(tokio::spawn(async move {
                for _ in 0..1000 {
                    stats.add_queries(1);
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(stats.queries(), 8000);
    }
}
