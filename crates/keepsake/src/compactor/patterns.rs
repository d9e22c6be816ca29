//! Interaction-pattern tiering
//!
//! Rebuilds `interaction_patterns` around the significant sub-keys: the
//! preferred-time histogram is trimmed to its top entries, raw completion
//! patterns become a fixed three-field summary, learning style preferences
//! pass through. Everything else is dropped - this stage is lossy by design.

use serde_json::Value;

use crate::record::types::{Document, MemoryRecord};

/// Histogram entries kept by the top-k trim.
const TOP_TIMES_KEPT: usize = 3;

/// The three fields carried into the completion summary.
const COMPLETION_SUMMARY_FIELDS: [&str; 3] = [
    "average_daily_completion",
    "best_performing_day",
    "consistency_score",
];

/// Reduce `interaction_patterns` to its significant sub-keys.
///
/// Returns the number of dropped items (histogram entries plus unknown
/// sub-keys). Running it on already-reduced patterns is a no-op: a trimmed
/// histogram stays as-is and an existing `completion_summary` is carried
/// through unchanged.
pub(crate) fn tier_patterns(record: &mut MemoryRecord) -> u64 {
    if record.interaction_patterns.is_empty() {
        return 0;
    }

    let patterns = &record.interaction_patterns;
    let mut significant = Document::new();
    let mut dropped = 0u64;

    if let Some(times) = patterns.get("preferred_learning_times") {
        let (trimmed, pruned) = trim_histogram(times);
        significant.insert("preferred_learning_times".to_string(), trimmed);
        dropped += pruned;
    }

    if let Some(Value::Object(raw)) = patterns.get("task_completion_patterns") {
        significant.insert(
            "completion_summary".to_string(),
            Value::Object(completion_summary(raw)),
        );
    } else if let Some(summary) = patterns.get("completion_summary") {
        // Already reduced by an earlier pass.
        significant.insert("completion_summary".to_string(), summary.clone());
    }

    if let Some(style) = patterns.get("learning_style_preferences") {
        significant.insert("learning_style_preferences".to_string(), style.clone());
    }

    let known = [
        "preferred_learning_times",
        "task_completion_patterns",
        "completion_summary",
        "learning_style_preferences",
    ];
    dropped += patterns.keys().filter(|k| !known.contains(&k.as_str())).count() as u64;

    record.interaction_patterns = significant;
    dropped
}

/// Keep the top-k histogram entries by frequency.
///
/// The stable sort over the insertion-ordered map resolves frequency ties
/// in favor of first-seen keys. Non-histogram values pass through.
fn trim_histogram(times: &Value) -> (Value, u64) {
    let Value::Object(histogram) = times else {
        return (times.clone(), 0);
    };
    if histogram.len() <= TOP_TIMES_KEPT {
        return (times.clone(), 0);
    }

    let mut entries: Vec<(&String, &Value)> = histogram.iter().collect();
    entries.sort_by(|a, b| {
        let freq_a = a.1.as_f64().unwrap_or(0.0);
        let freq_b = b.1.as_f64().unwrap_or(0.0);
        freq_b.partial_cmp(&freq_a).unwrap_or(std::cmp::Ordering::Equal)
    });

    let pruned = (entries.len() - TOP_TIMES_KEPT) as u64;
    let top: Document = entries
        .into_iter()
        .take(TOP_TIMES_KEPT)
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    (Value::Object(top), pruned)
}

/// Fixed-shape summary replacing raw task completion patterns.
fn completion_summary(raw: &Document) -> Document {
    COMPLETION_SUMMARY_FIELDS
        .iter()
        .map(|field| {
            (
                field.to_string(),
                raw.get(*field).cloned().unwrap_or(Value::Null),
            )
        })
        .collect()
}
