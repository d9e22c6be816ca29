//! Record types and projections
//!
//! Defines the canonical per-key memory record, its entry types, and the
//! read-only snapshot projection used for cheap external inspection.

pub mod snapshot;
pub mod types;

pub use snapshot::{CompactSnapshot, snapshot};
pub use types::{
    CompactionMetadata, CompletionRate, Difficulty, Document, EssentialMetadata, MemoryRecord,
    PlanEntry, PlanSummary, ProgressEntry, ProgressMetrics, WeeklyTrend,
};
