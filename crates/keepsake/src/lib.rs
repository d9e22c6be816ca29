//! Keepsake - bounded long-term memory store with multi-tier compaction
//!
//! Keeps a per-key (per-user) history of plans, progress records and
//! interaction patterns under a hard byte budget. Older entries are
//! summarized or folded into weekly trends instead of being discarded,
//! the newest entries are always kept verbatim, and repeated compaction
//! of already-compacted data is a no-op.

pub mod compactor;
pub mod config;
pub mod error;
pub mod record;
pub mod sizing;
pub mod store;

pub use compactor::{
    CompactionLedger, CompactionOutcome, CompactionReport, CompactionStatistics, Compactor,
    LedgerStats,
};
pub use config::{CompactionConfig, Config, StoreConfig};
pub use error::{KeepsakeError, Result};
pub use record::{
    CompactSnapshot, Document, MemoryRecord, PlanEntry, PlanSummary, ProgressEntry,
    ProgressMetrics, WeeklyTrend,
};
pub use store::{MemoryStore, MemoryUpdate, ProgressTrend, StoreStats, TrendRating};
