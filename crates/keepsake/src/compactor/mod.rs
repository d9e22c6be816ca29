//! Memory compaction pipeline
//!
//! The `Compactor` is a stateless transformation engine: given a record
//! copy and a byte budget, it runs an ordered pipeline of tier strategies
//! (plans, progress history, interaction patterns, metadata) followed by
//! progressive budget enforcement, and reports per-run statistics. Any
//! internal failure yields the original record unchanged plus an error
//! marker - partial reduction is never surfaced.

mod budget;
mod ledger;
mod metadata;
mod patterns;
mod plans;
mod progress;

pub use ledger::{CompactionLedger, LedgerStats};

use tracing::{debug, error, info};

use crate::config::CompactionConfig;
use crate::error::Result;
use crate::record::types::{Document, MemoryRecord, now_epoch};
use crate::sizing::serialized_size;

/// Per-run compaction statistics.
#[derive(Debug, Clone, Default)]
pub struct CompactionReport {
    pub original_size_bytes: usize,
    pub new_size_bytes: usize,
    /// `(original - new) / original`; 0.0 for an empty original
    pub compression_rate: f64,
    /// Plans summarized by tiering
    pub plans_summarized: u64,
    /// Plans force-summarized by budget enforcement
    pub plans_forced: u64,
    /// Progress entries folded into weekly trends
    pub progress_records_folded: u64,
    /// Progress entries dropped by aggressive truncation
    pub progress_records_truncated: u64,
    /// Interaction-pattern items dropped
    pub patterns_pruned: u64,
    /// Whole sections dropped by budget enforcement
    pub sections_dropped: u64,
    /// Still over budget after every reduction step - a condition, not an error
    pub budget_exceeded: bool,
    /// Set when the pipeline failed; the returned record is the original
    pub error: Option<String>,
}

/// A compacted record plus the report describing what happened.
#[derive(Debug, Clone)]
pub struct CompactionOutcome {
    pub record: MemoryRecord,
    pub report: CompactionReport,
}

/// Ledger aggregates combined with the compactor's configured targets.
#[derive(Debug, Clone, PartialEq)]
pub struct CompactionStatistics {
    pub total_compactions: u64,
    pub total_bytes_saved: i64,
    pub average_compression_rate: f64,
    /// Configured byte budget
    pub max_record_bytes: usize,
    /// Advisory target ratio from configuration
    pub target_compression_ratio: f64,
    /// Blend of average compression (70%) and normalized bytes saved (30%),
    /// on a 0..1 scale; 0.0 before any compaction has run
    pub efficiency_score: f64,
}

/// Stateless compaction engine.
///
/// Safe to share between threads; per-record work touches only the copy it
/// is given. The injected ledger is the single piece of synchronized state.
#[derive(Debug, Clone, Default)]
pub struct Compactor {
    config: CompactionConfig,
    ledger: CompactionLedger,
}

impl Compactor {
    /// Create a compactor with default configuration and a fresh ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a compactor with custom configuration and a fresh ledger.
    pub fn with_config(config: CompactionConfig) -> Self {
        Self {
            config,
            ledger: CompactionLedger::new(),
        }
    }

    /// Create a compactor reporting into a shared ledger.
    pub fn with_ledger(config: CompactionConfig, ledger: CompactionLedger) -> Self {
        Self { config, ledger }
    }

    pub fn config(&self) -> &CompactionConfig {
        &self.config
    }

    pub fn ledger(&self) -> &CompactionLedger {
        &self.ledger
    }

    /// Compact a record against the configured byte budget.
    pub fn compact(&self, record: &MemoryRecord) -> CompactionOutcome {
        self.compact_with_budget(record, self.config.max_record_bytes)
    }

    /// Compact a single plan document, independent of any record.
    ///
    /// Trims the weekly structure to its first four weeks (recording the
    /// rest in `compacted_weeks`) and collapses days with more than three
    /// tasks into a `task_summary`. A second pass is a no-op.
    pub fn compact_plan(&self, plan: &Document) -> Document {
        plans::compact_plan_document(plan)
    }

    /// Ledger aggregates plus the configured budget and target ratio.
    pub fn statistics(&self) -> CompactionStatistics {
        let stats = self.ledger.stats();
        let efficiency_score = if stats.total_compactions == 0 {
            0.0
        } else {
            let compression = stats.average_compression_rate * 100.0;
            let savings = (stats.total_bytes_saved as f64 / 10_000.0).min(100.0);
            (compression * 0.7 + savings * 0.3) / 100.0
        };
        CompactionStatistics {
            total_compactions: stats.total_compactions,
            total_bytes_saved: stats.total_bytes_saved,
            average_compression_rate: stats.average_compression_rate,
            max_record_bytes: self.config.max_record_bytes,
            target_compression_ratio: self.config.target_compression_ratio,
            efficiency_score,
        }
    }

    /// Compact a record against an explicit byte budget.
    ///
    /// Never panics and never returns a partially-reduced record: on any
    /// internal failure the outcome carries the original record and an
    /// error marker in the report.
    pub fn compact_with_budget(&self, record: &MemoryRecord, budget: usize) -> CompactionOutcome {
        let original_size = match serialized_size(record) {
            Ok(size) => size,
            Err(e) => return self.failed(record, 0, e.to_string()),
        };

        match self.run_pipeline(record, budget, original_size) {
            Ok(outcome) => {
                let report = &outcome.report;
                self.ledger.record(
                    report.original_size_bytes,
                    report.new_size_bytes,
                    report.compression_rate,
                );
                info!(
                    original = report.original_size_bytes,
                    new = report.new_size_bytes,
                    rate = report.compression_rate,
                    "record compacted"
                );
                outcome
            }
            Err(e) => {
                error!(error = %e, "compaction failed, returning original record");
                self.failed(record, original_size, e.to_string())
            }
        }
    }

    fn run_pipeline(
        &self,
        record: &MemoryRecord,
        budget: usize,
        original_size: usize,
    ) -> Result<CompactionOutcome> {
        let config = &self.config;
        let now = now_epoch();
        let mut working = record.clone();

        let plans_summarized = plans::tier_plans(&mut working, config, now);
        let progress_records_folded = progress::tier_progress(&mut working, config, now);
        let patterns_pruned = patterns::tier_patterns(&mut working);

        // Metadata consolidation only pays off once something else changed
        // or the record is over budget; otherwise it can grow a small record
        // and would break the under-budget no-op guarantee.
        let tiering_changed = plans_summarized + progress_records_folded + patterns_pruned > 0;
        if tiering_changed || serialized_size(&working)? > budget {
            metadata::consolidate_metadata(&mut working);
        } else {
            debug!("record within budget and no tier applied, skipping consolidation");
        }

        let enforcement = budget::enforce_budget(&mut working, config, budget)?;

        let mut report = CompactionReport {
            original_size_bytes: original_size,
            new_size_bytes: enforcement.final_size,
            compression_rate: 0.0,
            plans_summarized,
            plans_forced: enforcement.plans_forced,
            progress_records_folded,
            progress_records_truncated: enforcement.history_truncated,
            patterns_pruned,
            sections_dropped: enforcement.sections_dropped,
            budget_exceeded: enforcement.budget_exceeded,
            error: None,
        };

        // Monotonicity guard: a reduction that fails to shrink the record is
        // discarded wholesale, so new size never exceeds the original.
        if report.new_size_bytes > original_size {
            working = record.clone();
            report = CompactionReport {
                original_size_bytes: original_size,
                new_size_bytes: original_size,
                budget_exceeded: original_size > budget,
                ..Default::default()
            };
        }

        if original_size > 0 {
            report.compression_rate =
                (original_size as f64 - report.new_size_bytes as f64) / original_size as f64;
        }

        Ok(CompactionOutcome {
            record: working,
            report,
        })
    }

    fn failed(&self, record: &MemoryRecord, original_size: usize, message: String) -> CompactionOutcome {
        CompactionOutcome {
            record: record.clone(),
            report: CompactionReport {
                original_size_bytes: original_size,
                new_size_bytes: original_size,
                error: Some(message),
                ..Default::default()
            },
        }
    }
}
