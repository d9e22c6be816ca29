//! Metadata consolidation
//!
//! Replaces the raw top-level timestamps with a single `essential_metadata`
//! block that also carries derived totals: learning hours from the current
//! progress history and a condensed preferences summary.

use serde_json::Value;

use crate::record::types::{Document, EssentialMetadata, MemoryRecord};

/// Formats kept in the condensed preferences summary.
const TOP_FORMATS_KEPT: usize = 3;

/// Consolidate record metadata into `essential_metadata`.
///
/// Timestamps captured by an earlier pass survive: when the raw top-level
/// fields are already gone, the previous block's values are retained.
pub(crate) fn consolidate_metadata(record: &mut MemoryRecord) {
    let previous = record.essential_metadata.take().unwrap_or_default();

    let essential = EssentialMetadata {
        created_at: record.created_at.take().or(previous.created_at),
        last_accessed: record.last_accessed.take().or(previous.last_accessed),
        last_updated: record.last_updated.take().or(previous.last_updated),
        total_learning_hours: record.total_learning_hours(),
        preferences_summary: summarize_preferences(&record.preferences),
    };

    record.essential_metadata = Some(essential);
}

/// Condense preferences to the handful of fields worth keeping:
/// top formats, difficulty level, learning style, daily study hours.
/// Only fields actually present are copied.
fn summarize_preferences(preferences: &Document) -> Document {
    let mut summary = Document::new();

    if let Some(Value::Array(formats)) = preferences.get("preferred_formats") {
        summary.insert(
            "preferred_formats".to_string(),
            Value::Array(formats.iter().take(TOP_FORMATS_KEPT).cloned().collect()),
        );
    }

    for field in ["difficulty_level", "learning_style", "daily_study_hours"] {
        if let Some(value) = preferences.get(field) {
            summary.insert(field.to_string(), value.clone());
        }
    }

    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::types::{ProgressEntry, ProgressMetrics};
    use serde_json::json;

    fn doc(value: serde_json::Value) -> Document {
        value.as_object().expect("object literal").clone()
    }

    fn record_with_minutes(minutes: &[f64]) -> MemoryRecord {
        let mut record = MemoryRecord::new();
        for (i, m) in minutes.iter().enumerate() {
            record.progress_history.push(ProgressEntry::new(
                1_700_000_000 + i as i64,
                ProgressMetrics {
                    total_duration_minutes: *m,
                    ..Default::default()
                },
            ));
        }
        record
    }

    #[test]
    fn test_timestamps_move_into_essential_block() {
        let mut record = MemoryRecord::new();
        record.last_updated = Some(1_700_000_999);
        let created = record.created_at;

        consolidate_metadata(&mut record);

        assert!(record.created_at.is_none());
        assert!(record.last_accessed.is_none());
        assert!(record.last_updated.is_none());
        let essential = record.essential_metadata.as_ref().unwrap();
        assert_eq!(essential.created_at, created);
        assert_eq!(essential.last_updated, Some(1_700_000_999));
    }

    #[test]
    fn test_learning_hours_rounded_to_two_decimals() {
        let mut record = record_with_minutes(&[30.0, 45.0, 10.0]);
        consolidate_metadata(&mut record);
        let essential = record.essential_metadata.as_ref().unwrap();
        // 85 minutes -> 1.4166... -> 1.42
        assert_eq!(essential.total_learning_hours, 1.42);
    }

    #[test]
    fn test_preferences_summary_only_copies_present_fields() {
        let mut record = MemoryRecord::new();
        record.preferences = doc(json!({
            "preferred_formats": ["video", "text", "audio", "podcast"],
            "difficulty_level": "medium",
            "irrelevant": true
        }));

        consolidate_metadata(&mut record);

        let summary = &record.essential_metadata.as_ref().unwrap().preferences_summary;
        assert_eq!(
            summary.get("preferred_formats"),
            Some(&json!(["video", "text", "audio"]))
        );
        assert_eq!(summary.get("difficulty_level"), Some(&json!("medium")));
        assert!(!summary.contains_key("learning_style"));
        assert!(!summary.contains_key("irrelevant"));
    }

    #[test]
    fn test_second_pass_retains_captured_timestamps() {
        let mut record = MemoryRecord::new();
        let created = record.created_at;

        consolidate_metadata(&mut record);
        consolidate_metadata(&mut record);

        let essential = record.essential_metadata.as_ref().unwrap();
        assert_eq!(essential.created_at, created);
        assert!(record.created_at.is_none());
    }
}
