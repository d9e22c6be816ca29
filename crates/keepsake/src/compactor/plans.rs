//! Plan tiering
//!
//! Splits the plan list into a verbatim "hot" set (the most recent plans)
//! and a summarized "cold" remainder. Summaries are derived from the plan's
//! nested data; already-summarized entries are never touched again, so the
//! stage is idempotent.

use serde_json::{Value, json};
use std::collections::HashSet;

use crate::config::CompactionConfig;
use crate::record::types::{
    CompletionRate, Difficulty, Document, MemoryRecord, PlanEntry, PlanSummary,
};

/// Weeks kept when trimming a plan document's weekly structure.
const PLAN_WEEKS_KEPT: usize = 4;
/// Task count above which a day's task list collapses into a summary.
const DAY_TASK_LIMIT: usize = 3;
/// Tasks carried into a day's `key_tasks`.
const KEY_TASKS_KEPT: usize = 2;
/// Character limit for key-task descriptions.
const TASK_TEXT_LIMIT: usize = 50;

/// Summarize every plan outside the protected recent set.
///
/// Returns the number of plans summarized in this pass. Skips entirely when
/// the list is at or below the tiering threshold.
pub(crate) fn tier_plans(record: &mut MemoryRecord, config: &CompactionConfig, now: i64) -> u64 {
    if record.plans.len() <= config.plan_tier_threshold {
        return 0;
    }

    let protected = protected_indices(&record.plans, config.recent_plans_kept);
    let mut summarized = 0u64;

    for (idx, plan) in record.plans.iter_mut().enumerate() {
        if protected.contains(&idx) || plan.compacted {
            continue;
        }
        summarize_in_place(plan);
        summarized += 1;
    }

    if summarized > 0 {
        let meta = record.compaction_metadata.get_or_insert_with(Default::default);
        meta.plans_compacted += summarized;
        meta.compaction_timestamp = now;
    }

    summarized
}

/// Indices of the `keep` most recent plans by `created_at`.
///
/// Ties resolve toward the later list position, so the protected set is
/// stable across repeated runs. Sequence order of `plans` is never changed.
fn protected_indices(plans: &[PlanEntry], keep: usize) -> HashSet<usize> {
    let mut by_age: Vec<(usize, i64)> = plans
        .iter()
        .enumerate()
        .map(|(idx, plan)| (idx, plan.created_at))
        .collect();
    by_age.sort_by(|a, b| b.1.cmp(&a.1).then(b.0.cmp(&a.0)));
    by_age.into_iter().take(keep).map(|(idx, _)| idx).collect()
}

/// Replace a plan's full data with its derived summary.
///
/// Upholds the invariant that `compacted == true` means `plan_data` is
/// absent and `summary` present.
pub(crate) fn summarize_in_place(plan: &mut PlanEntry) {
    let summary = summarize_plan(plan);
    plan.summary = Some(summary);
    plan.plan_data = None;
    plan.compacted = true;
}

/// Derive the fixed-shape summary for a plan.
pub(crate) fn summarize_plan(plan: &PlanEntry) -> PlanSummary {
    static EMPTY: std::sync::LazyLock<Document> = std::sync::LazyLock::new(Document::new);
    let plan_data = plan.plan_data.as_ref().unwrap_or(&EMPTY);

    let duration_weeks = plan_data
        .get("metadata")
        .and_then(Value::as_object)
        .and_then(|meta| meta.get("plan_duration_weeks"))
        .and_then(Value::as_u64)
        .unwrap_or(0);

    let weekly_structure = plan_data.get("weekly_structure").and_then(Value::as_object);

    PlanSummary {
        duration_weeks,
        total_tasks: count_total_tasks(weekly_structure),
        completion_rate: plan
            .completion_rate
            .map(CompletionRate::Percent)
            .unwrap_or_else(CompletionRate::unknown),
        key_objectives: extract_key_objectives(plan_data),
        difficulty_level: estimate_difficulty(weekly_structure),
    }
}

/// Count tasks across a plan's weekly structure.
///
/// Two shapes are supported: a week as an ordered day list (tasks counted
/// directly) and a week as an object with `daily_tasks` (estimated as
/// `daily_task_count * 7`).
fn count_total_tasks(weekly_structure: Option<&Document>) -> u64 {
    let Some(weeks) = weekly_structure else {
        return 0;
    };

    let mut total = 0u64;
    for week in weeks.values() {
        match week {
            Value::Array(days) => {
                for day in days {
                    if let Some(tasks) = day.get("tasks").and_then(Value::as_array) {
                        total += tasks.len() as u64;
                    }
                }
            }
            Value::Object(week) => {
                if let Some(daily) = week.get("daily_tasks").and_then(Value::as_array) {
                    total += daily.len() as u64 * 7;
                }
            }
            _ => {}
        }
    }
    total
}

/// Extract up to 5 deduplicated key objectives from success criteria
/// (first 3 weekly goals) and milestones (first 2).
fn extract_key_objectives(plan_data: &Document) -> Vec<String> {
    let mut objectives: Vec<String> = Vec::new();

    if let Some(goals) = plan_data
        .get("success_criteria")
        .and_then(Value::as_object)
        .and_then(|criteria| criteria.get("weekly_goals"))
        .and_then(Value::as_array)
    {
        objectives.extend(
            goals
                .iter()
                .take(3)
                .filter_map(Value::as_str)
                .map(str::to_string),
        );
    }

    if let Some(milestones) = plan_data.get("milestones").and_then(Value::as_array) {
        objectives.extend(
            milestones
                .iter()
                .take(2)
                .filter_map(|m| m.get("milestone"))
                .filter_map(Value::as_str)
                .map(str::to_string),
        );
    }

    let mut seen = HashSet::new();
    objectives
        .into_iter()
        .filter(|obj| !obj.is_empty() && seen.insert(obj.clone()))
        .take(5)
        .collect()
}

/// Compact a single plan document for storage or transport.
///
/// The weekly structure keeps only its first weeks (insertion order, with a
/// `compacted_weeks` count recording the rest) and busy days trade their
/// full task list for a `task_summary`. Days already summarized and
/// structures already small pass through, so a second pass is a no-op.
pub(crate) fn compact_plan_document(plan: &Document) -> Document {
    let mut compacted = plan.clone();

    let weeks_dropped = match compacted.get_mut("weekly_structure") {
        Some(Value::Object(weeks)) if weeks.len() > PLAN_WEEKS_KEPT => {
            let dropped = weeks.len() - PLAN_WEEKS_KEPT;
            let trimmed: Document = weeks
                .iter()
                .take(PLAN_WEEKS_KEPT)
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            *weeks = trimmed;
            dropped
        }
        _ => 0,
    };
    if weeks_dropped > 0 {
        compacted.insert(
            "compacted_weeks".to_string(),
            Value::from(weeks_dropped as u64),
        );
    }

    if let Some(Value::Object(weeks)) = compacted.get_mut("weekly_structure") {
        for week in weeks.values_mut() {
            let Value::Array(days) = week else { continue };
            for day in days {
                if let Value::Object(day) = day {
                    summarize_day(day);
                }
            }
        }
    }

    compacted
}

/// Replace a day's task list with a fixed-shape summary when it holds more
/// tasks than the per-day limit.
fn summarize_day(day: &mut Document) {
    let Some(Value::Array(tasks)) = day.get("tasks") else {
        return;
    };
    if tasks.len() <= DAY_TASK_LIMIT {
        return;
    }

    let total_duration: f64 = tasks
        .iter()
        .map(|task| {
            task.get("duration_minutes")
                .and_then(Value::as_f64)
                .unwrap_or(0.0)
        })
        .sum();
    let key_tasks: Vec<Value> = tasks
        .iter()
        .take(KEY_TASKS_KEPT)
        .map(|task| {
            let text = task.get("task").and_then(Value::as_str).unwrap_or("");
            let text = if text.chars().count() > TASK_TEXT_LIMIT {
                let head: String = text.chars().take(TASK_TEXT_LIMIT).collect();
                format!("{head}...")
            } else {
                text.to_string()
            };
            json!({
                "task": text,
                "duration_minutes": task
                    .get("duration_minutes")
                    .cloned()
                    .unwrap_or(Value::from(0)),
                "priority": task
                    .get("priority")
                    .cloned()
                    .unwrap_or_else(|| Value::String("medium".to_string())),
            })
        })
        .collect();

    day.insert(
        "task_summary".to_string(),
        json!({
            "total_tasks": tasks.len(),
            "total_duration": total_duration,
            "key_tasks": key_tasks,
        }),
    );
    day.remove("tasks");
}

/// Bucket average daily task count into a difficulty level.
fn estimate_difficulty(weekly_structure: Option<&Document>) -> Difficulty {
    let total_weeks = weekly_structure.map_or(0, |weeks| weeks.len());
    if total_weeks == 0 {
        return Difficulty::Unknown;
    }

    let total_tasks = count_total_tasks(weekly_structure);
    let avg_daily_tasks = total_tasks as f64 / (total_weeks as f64 * 7.0);

    if avg_daily_tasks > 5.0 {
        Difficulty::High
    } else if avg_daily_tasks > 2.0 {
        Difficulty::Medium
    } else {
        Difficulty::Low
    }
}
