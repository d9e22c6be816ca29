//! Compact read-only snapshot of a memory record
//!
//! A much smaller projection for cheap external inspection: profile
//! summary, recent completion rate, and best-effort effective strategies
//! inferred from trends and the most recent plan. Never mutates the record
//! and never touches persistence.

use serde::Serialize;
use serde_json::Value;

use crate::error::Result;
use crate::record::types::{Document, MemoryRecord, now_epoch};
use crate::sizing::serialized_size;

/// Progress entries sampled for the recent completion rate.
const RECENT_WINDOW: usize = 5;
/// Trend weeks inspected for effective strategies.
const STRATEGY_WEEKS: usize = 3;
/// Average weekly completion rate treated as an effective strategy.
const STRATEGY_COMPLETION_THRESHOLD: f64 = 80.0;
/// Plan completion rate treated as strong adherence.
const ADHERENCE_THRESHOLD: f64 = 75.0;

/// Read-only projection of a record.
#[derive(Debug, Clone, Serialize)]
pub struct CompactSnapshot {
    pub snapshot_timestamp: i64,
    pub user_profile_summary: ProfileSummary,
    pub current_progress: CurrentProgress,
    pub learning_patterns: LearningPatterns,
    pub size_metrics: SizeMetrics,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProfileSummary {
    pub learning_goals: Value,
    pub preferred_difficulty: Value,
    pub total_learning_hours: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CurrentProgress {
    pub active_plan: bool,
    pub recent_completion_rate: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LearningPatterns {
    pub preferred_times: Document,
    pub effective_strategies: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SizeMetrics {
    pub original_size: usize,
    pub snapshot_size: usize,
    pub compression_ratio: f64,
}

/// Build a compact snapshot of `record`.
pub fn snapshot(record: &MemoryRecord) -> Result<CompactSnapshot> {
    let original_size = serialized_size(record)?;

    let mut result = CompactSnapshot {
        snapshot_timestamp: now_epoch(),
        user_profile_summary: ProfileSummary {
            learning_goals: record
                .profile
                .get("goals")
                .cloned()
                .unwrap_or_else(|| Value::String("Not specified".to_string())),
            preferred_difficulty: record
                .preferences
                .get("difficulty_level")
                .cloned()
                .unwrap_or_else(|| Value::String("medium".to_string())),
            total_learning_hours: record.total_learning_hours(),
        },
        current_progress: CurrentProgress {
            active_plan: !record.plans.is_empty(),
            recent_completion_rate: record.recent_completion_rate(RECENT_WINDOW),
        },
        learning_patterns: LearningPatterns {
            preferred_times: record
                .interaction_patterns
                .get("preferred_learning_times")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default(),
            effective_strategies: effective_strategies(record),
        },
        size_metrics: SizeMetrics {
            original_size,
            snapshot_size: 0,
            compression_ratio: 0.0,
        },
    };

    let snapshot_size = serialized_size(&result)?;
    result.size_metrics.snapshot_size = snapshot_size;
    if original_size > 0 {
        result.size_metrics.compression_ratio =
            (original_size as f64 - snapshot_size as f64) / original_size as f64;
    }

    Ok(result)
}

/// Infer up to three effective strategies: high-completion trend weeks
/// among the most recent, and strong adherence on the latest plan.
fn effective_strategies(record: &MemoryRecord) -> Vec<String> {
    let mut strategies = Vec::new();

    let recent_weeks: Vec<_> = record.progress_trends.iter().collect();
    let skip = recent_weeks.len().saturating_sub(STRATEGY_WEEKS);
    for (week, trend) in recent_weeks.into_iter().skip(skip) {
        if trend.average_completion_rate >= STRATEGY_COMPLETION_THRESHOLD {
            strategies.push(format!("Week {week}: high completion consistency"));
        }
    }

    let latest_plan = record.plans.iter().max_by_key(|p| p.created_at);
    if let Some(rate) = latest_plan.and_then(|p| p.completion_rate) {
        if rate >= ADHERENCE_THRESHOLD {
            strategies.push("Strong plan adherence".to_string());
        }
    }

    strategies.truncate(3);
    strategies
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::types::{PlanEntry, ProgressEntry, ProgressMetrics, WeeklyTrend};
    use serde_json::json;

    fn record_with_history() -> MemoryRecord {
        let mut record = MemoryRecord::new();
        record.profile.insert("goals".to_string(), json!("pass the exam"));
        record
            .preferences
            .insert("difficulty_level".to_string(), json!("hard"));
        for i in 0..8 {
            record.progress_history.push(ProgressEntry::new(
                1_700_000_000 + i,
                ProgressMetrics {
                    completion_rate: 10.0 * i as f64,
                    total_duration_minutes: 60.0,
                    ..Default::default()
                },
            ));
        }
        record
    }

    #[test]
    fn test_snapshot_profile_fields() {
        let record = record_with_history();
        let snap = snapshot(&record).unwrap();

        assert_eq!(snap.user_profile_summary.learning_goals, json!("pass the exam"));
        assert_eq!(snap.user_profile_summary.preferred_difficulty, json!("hard"));
        assert_eq!(snap.user_profile_summary.total_learning_hours, 8.0);
    }

    #[test]
    fn test_snapshot_defaults_for_empty_record() {
        let record = MemoryRecord::new();
        let snap = snapshot(&record).unwrap();

        assert_eq!(
            snap.user_profile_summary.learning_goals,
            json!("Not specified")
        );
        assert_eq!(snap.user_profile_summary.preferred_difficulty, json!("medium"));
        assert!(!snap.current_progress.active_plan);
        assert_eq!(snap.current_progress.recent_completion_rate, 0.0);
    }

    #[test]
    fn test_recent_completion_rate_uses_last_five() {
        let record = record_with_history();
        let snap = snapshot(&record).unwrap();
        // Last five rates: 30, 40, 50, 60, 70
        assert_eq!(snap.current_progress.recent_completion_rate, 50.0);
    }

    #[test]
    fn test_effective_strategies_from_trends_and_plan() {
        let mut record = MemoryRecord::new();
        record.progress_trends.insert(
            "2024-W01".to_string(),
            WeeklyTrend {
                average_completion_rate: 85.0,
                ..Default::default()
            },
        );
        record.progress_trends.insert(
            "2024-W02".to_string(),
            WeeklyTrend {
                average_completion_rate: 60.0,
                ..Default::default()
            },
        );
        let mut plan = PlanEntry::new("plan_1", 100, Default::default());
        plan.completion_rate = Some(90.0);
        record.plans.push(plan);

        let snap = snapshot(&record).unwrap();
        assert_eq!(
            snap.learning_patterns.effective_strategies,
            vec![
                "Week 2024-W01: high completion consistency".to_string(),
                "Strong plan adherence".to_string()
            ]
        );
    }

    #[test]
    fn test_snapshot_does_not_mutate_record() {
        let record = record_with_history();
        let before = serde_json::to_string(&record).unwrap();
        snapshot(&record).unwrap();
        let after = serde_json::to_string(&record).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn test_snapshot_is_smaller_than_large_record() {
        let mut record = record_with_history();
        for i in 0..30 {
            record.plans.push(PlanEntry::new(
                format!("plan_{i}"),
                i,
                json!({"weekly_structure": {"w": [{"tasks": [1, 2, 3, 4]}]}})
                    .as_object()
                    .unwrap()
                    .clone(),
            ));
        }
        let snap = snapshot(&record).unwrap();
        assert!(snap.size_metrics.snapshot_size < snap.size_metrics.original_size);
        assert!(snap.size_metrics.compression_ratio > 0.0);
    }
}
