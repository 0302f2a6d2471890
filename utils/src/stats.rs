//! Per-operation call counters.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counts calls per named operation.
///
/// Operation names are fixed up front; recording an unknown name is a no-op.
pub struct CallCounter {
    names: Vec<&'static str>,
    counts: Vec<AtomicU64>,
}

impl CallCounter {
    pub fn new(names: &[&'static str]) -> Self {
        Self {
            names: names.to_vec(),
            counts: names.iter().map(|_| AtomicU64::new(0)).collect(),
        }
    }

    fn slot(&self, name: &str) -> Option<&AtomicU64> {
        let idx = self.names.iter().position(|n| *n == name)?;
        self.counts.get(idx)
    }

    pub fn record(&self, name: &str) {
        if let Some(count) = self.slot(name) {
            count.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn count(&self, name: &str) -> u64 {
        self.slot(name).map_or(0, |c| c.load(Ordering::Relaxed))
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().map(|c| c.load(Ordering::Relaxed)).sum()
    }

    /// Counts keyed by operation name, in name order.
    pub fn snapshot(&self) -> BTreeMap<&'static str, u64> {
        self.names
            .iter()
            .zip(&self.counts)
            .map(|(&name, c)| (name, c.load(Ordering::Relaxed)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn unknown_names_are_ignored() {
        let calls = CallCounter::new(&["broadcast"]);
        calls.record("deploy");
        assert_eq!(calls.count("deploy"), 0);
        assert_eq!(calls.total(), 0);
        assert_eq!(calls.snapshot().len(), 1);
    }

    #[test]
    fn concurrent_records_are_counted() {
        let calls = Arc::new(CallCounter::new(&["broadcast", "account"]));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let calls = Arc::clone(&calls);
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        calls.record("broadcast");
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        calls.record("account");
        assert_eq!(calls.count("broadcast"), 8000);
        assert_eq!(calls.total(), 8001);
        assert_eq!(calls.snapshot()["account"], 1);
    }
}
