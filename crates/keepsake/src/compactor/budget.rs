//! Progressive budget enforcement
//!
//! Runs after the tiering stages when the record still exceeds its byte
//! budget. Applies increasingly aggressive steps, re-measuring between
//! each, and stops as soon as the record fits. Exhausting every step while
//! still over budget is a reported condition, not an error.

use tracing::warn;

use crate::compactor::plans::summarize_in_place;
use crate::config::CompactionConfig;
use crate::error::Result;
use crate::record::types::MemoryRecord;
use crate::sizing::serialized_size;

/// What budget enforcement did to the record.
#[derive(Debug, Clone, Default)]
pub(crate) struct BudgetOutcome {
    /// Serialized size after enforcement
    pub final_size: usize,
    /// Still over budget after exhausting every step
    pub budget_exceeded: bool,
    /// Progress entries removed by the history truncation step
    pub history_truncated: u64,
    /// Plans force-summarized regardless of recency
    pub plans_forced: u64,
    /// Oversized sections dropped outright
    pub sections_dropped: u64,
}

/// Enforce the byte budget on an already-tiered record.
pub(crate) fn enforce_budget(
    record: &mut MemoryRecord,
    config: &CompactionConfig,
    budget: usize,
) -> Result<BudgetOutcome> {
    let mut outcome = BudgetOutcome::default();
    let mut size = serialized_size(record)?;
    if size <= budget {
        outcome.final_size = size;
        return Ok(outcome);
    }

    warn!(size, budget, "record over budget, applying aggressive compaction");

    // (a) truncate the progress history to its most recent entries
    if record.progress_history.len() > config.aggressive_history_kept {
        let excess = record.progress_history.len() - config.aggressive_history_kept;
        record.progress_history.drain(..excess);
        outcome.history_truncated = excess as u64;
        size = serialized_size(record)?;
        if size <= budget {
            outcome.final_size = size;
            return Ok(outcome);
        }
    }

    // (b) force-summarize every remaining full plan, newest included
    for plan in record.plans.iter_mut().filter(|p| !p.compacted) {
        summarize_in_place(plan);
        outcome.plans_forced += 1;
    }
    if outcome.plans_forced > 0 {
        size = serialized_size(record)?;
        if size <= budget {
            outcome.final_size = size;
            return Ok(outcome);
        }
    }

    // (c) drop whole sections whose serialized size exceeds the limit
    if serialized_size(&record.interaction_patterns)? > config.droppable_section_bytes {
        record.interaction_patterns.clear();
        outcome.sections_dropped += 1;
        size = serialized_size(record)?;
        if size <= budget {
            outcome.final_size = size;
            return Ok(outcome);
        }
    }
    if serialized_size(&record.progress_trends)? > config.droppable_section_bytes {
        record.progress_trends.clear();
        outcome.sections_dropped += 1;
        size = serialized_size(record)?;
        if size <= budget {
            outcome.final_size = size;
            return Ok(outcome);
        }
    }
    if let Some(meta) = &record.compaction_metadata {
        if serialized_size(meta)? > config.droppable_section_bytes {
            record.compaction_metadata = None;
            outcome.sections_dropped += 1;
            size = serialized_size(record)?;
        }
    }

    outcome.final_size = size;
    outcome.budget_exceeded = size > budget;
    if outcome.budget_exceeded {
        warn!(
            size,
            budget, "record still over budget after aggressive compaction"
        );
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::types::{Document, PlanEntry, ProgressEntry, ProgressMetrics, WeeklyTrend};
    use serde_json::json;

    fn bulky_plan(id: &str, created_at: i64) -> PlanEntry {
        let day = json!({"tasks": (0..10).map(|i| json!({
            "task": format!("a reasonably long task description number {i}"),
            "duration_minutes": 45
        })).collect::<Vec<_>>()});
        PlanEntry::new(
            id,
            created_at,
            json!({
                "metadata": {"plan_duration_weeks": 4},
                "weekly_structure": {"week_1": [day.clone(), day.clone(), day]}
            })
            .as_object()
            .unwrap()
            .clone(),
        )
    }

    fn oversized_record() -> MemoryRecord {
        let mut record = MemoryRecord::new();
        for i in 0..8 {
            record.plans.push(bulky_plan(&format!("plan_{i}"), i));
        }
        for i in 0..50 {
            record
                .progress_history
                .push(ProgressEntry::new(i, ProgressMetrics::default()));
        }
        record
    }

    #[test]
    fn test_under_budget_is_untouched() {
        let mut record = MemoryRecord::new();
        record
            .progress_history
            .push(ProgressEntry::new(1, ProgressMetrics::default()));
        let config = CompactionConfig::default();

        let outcome = enforce_budget(&mut record, &config, 10_000).unwrap();

        assert!(!outcome.budget_exceeded);
        assert_eq!(outcome.history_truncated, 0);
        assert_eq!(outcome.plans_forced, 0);
        assert_eq!(record.progress_history.len(), 1);
    }

    #[test]
    fn test_history_truncated_to_keep_count() {
        let mut record = oversized_record();
        let config = CompactionConfig::default();

        enforce_budget(&mut record, &config, 1).unwrap();

        assert_eq!(record.progress_history.len(), 5);
        // Most recent entries survive
        assert_eq!(record.progress_history[0].timestamp, 45);
        assert_eq!(record.progress_history[4].timestamp, 49);
    }

    #[test]
    fn test_all_plans_forced_to_summaries() {
        let mut record = oversized_record();
        let config = CompactionConfig::default();

        let outcome = enforce_budget(&mut record, &config, 1).unwrap();

        assert_eq!(outcome.plans_forced, 8);
        assert!(record.plans.iter().all(|p| p.compacted));
        assert!(record.plans.iter().all(|p| p.plan_data.is_none()));
        assert!(record.plans.iter().all(|p| p.summary.is_some()));
    }

    #[test]
    fn test_oversized_sections_dropped() {
        let mut record = MemoryRecord::new();
        record.interaction_patterns = json!({
            "noise": (0..200).map(|i| format!("entry number {i}")).collect::<Vec<_>>()
        })
        .as_object()
        .unwrap()
        .clone();
        for i in 0..60 {
            record
                .progress_trends
                .insert(format!("2023-W{i:02}"), WeeklyTrend::default());
        }
        let config = CompactionConfig::default();

        let outcome = enforce_budget(&mut record, &config, 1).unwrap();

        assert!(outcome.sections_dropped >= 2);
        assert!(record.interaction_patterns.is_empty());
        assert!(record.progress_trends.is_empty());
    }

    #[test]
    fn test_small_sections_survive_even_over_budget() {
        let mut record = MemoryRecord::new();
        record
            .interaction_patterns
            .insert("learning_style_preferences".to_string(), json!("visual"));
        // Padding to stay over any tiny budget without oversized sections
        record.profile.insert(
            "bio".to_string(),
            json!("a".repeat(500)),
        );
        let config = CompactionConfig::default();

        let outcome = enforce_budget(&mut record, &config, 10).unwrap();

        assert!(outcome.budget_exceeded);
        assert_eq!(outcome.sections_dropped, 0);
        assert!(!record.interaction_patterns.is_empty());
    }

    #[test]
    fn test_stops_early_once_under_budget() {
        let mut record = oversized_record();
        let config = CompactionConfig::default();
        // Generous budget: truncating the history should be enough
        let outcome = enforce_budget(&mut record, &config, 100_000).unwrap();

        assert_eq!(outcome.history_truncated, 45);
        assert_eq!(outcome.plans_forced, 0);
        assert!(record.plans.iter().all(|p| !p.compacted));
        assert!(!outcome.budget_exceeded);
    }

    #[test]
    fn test_exhausted_steps_report_exceeded_not_error() {
        let mut record = oversized_record();
        let config = CompactionConfig::default();

        let outcome = enforce_budget(&mut record, &config, 1).unwrap();

        assert!(outcome.budget_exceeded);
        assert!(outcome.final_size > 1);
    }

    #[test]
    fn test_oversized_record_still_serializes_smaller() {
        let mut record = oversized_record();
        let before = serialized_size(&record).unwrap();
        let config = CompactionConfig::default();

        let outcome = enforce_budget(&mut record, &config, 1).unwrap();

        assert!(outcome.final_size < before);
    }
}
