use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide short-polling counter.
///
/// Starts at 1; every call to [`Counter::next`] hands out the current value
/// and advances it, so each caller observes a distinct value.
#[derive(Debug)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    pub fn new() -> Self {
        Self {
            value: AtomicU64::new(1),
        }
    }

    /// Return the current value and advance by one
    pub fn next(&self) -> u64 {
        self.value.fetch_add(1, Ordering::Relaxed)
    }

    /// Value the next caller will receive
    pub fn peek(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

impl Default for Counter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn test_starts_at_one() {
        let counter = Counter::new();
        assert_eq!(counter.next(), 1);
        assert_eq!(counter.next(), 2);
        assert_eq!(counter.next(), 3);
        assert_eq!(counter.peek(), 4);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_callers_get_distinct_consecutive_values() {
        let counter = Arc::new(Counter::new());
        let tasks = 16;
        let per_task = 250;

        let handles: Vec<_> = (0..tasks)
            .map(|_| {
                let counter = counter.clone();
                tokio::spawn(async move { (0..per_task).map(|_| counter.next()).collect::<Vec<_>>() })
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for value in handle.await.unwrap() {
                assert!(seen.insert(value), "duplicate value {}", value);
            }
        }

        let total = (tasks * per_task) as u64;
        assert_eq!(seen.len() as u64, total);
        assert_eq!(seen, (1..=total).collect::<HashSet<_>>());
    }
}
