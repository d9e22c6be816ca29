//! Running compaction statistics
//!
//! A dedicated synchronized counter object shared across compactor
//! instances. Observability only: it has no bearing on correctness and may
//! be reset at any time.

use std::sync::{Arc, Mutex, MutexGuard};

/// Aggregate statistics across every compaction recorded on a ledger.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LedgerStats {
    pub total_compactions: u64,
    pub total_bytes_saved: i64,
    /// Running mean of per-run compression rates
    pub average_compression_rate: f64,
}

/// Shared, thread-safe compaction ledger.
///
/// Cloning shares the underlying counters; construct one explicitly and
/// hand it to every compactor that should report into it.
#[derive(Debug, Clone, Default)]
pub struct CompactionLedger {
    inner: Arc<Mutex<LedgerStats>>,
}

impl CompactionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one compaction run.
    pub fn record(&self, original_size: usize, new_size: usize, compression_rate: f64) {
        let mut stats = self.lock();
        stats.total_compactions += 1;
        stats.total_bytes_saved += original_size as i64 - new_size as i64;
        let n = stats.total_compactions as f64;
        stats.average_compression_rate =
            (stats.average_compression_rate * (n - 1.0) + compression_rate) / n;
    }

    /// Snapshot of the current aggregate statistics.
    pub fn stats(&self) -> LedgerStats {
        self.lock().clone()
    }

    /// Reset all counters to zero.
    pub fn reset(&self) {
        *self.lock() = LedgerStats::default();
    }

    fn lock(&self) -> MutexGuard<'_, LedgerStats> {
        // Counters stay coherent through a panic on another thread, so a
        // poisoned lock is still usable and must not panic the compactor.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
