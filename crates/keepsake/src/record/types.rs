//! Core record types for the keepsake store
//!
//! A `MemoryRecord` is the root entity kept per user key. Plans and
//! progress entries are ordered sequences where insertion order is
//! chronological; profile, preferences and interaction patterns are
//! schema-light documents that tolerate unknown sub-fields.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Ordered string-keyed document for opaque nested structures.
///
/// Insertion order is preserved (serde_json `preserve_order`), which makes
/// first-seen tie-breaks and persisted output deterministic.
pub type Document = serde_json::Map<String, Value>;

/// Current time as epoch seconds.
pub(crate) fn now_epoch() -> i64 {
    Utc::now().timestamp()
}

/// Round to two decimal places.
pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// The per-key memory record owned by the store.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MemoryRecord {
    /// Arbitrary preference/profile data, opaque to the core
    #[serde(default)]
    pub profile: Document,
    /// Plans in insertion (chronological) order
    #[serde(default)]
    pub plans: Vec<PlanEntry>,
    /// Progress entries in insertion (chronological) order, append-only
    #[serde(default)]
    pub progress_history: Vec<ProgressEntry>,
    /// User preferences, opaque to the core
    #[serde(default)]
    pub preferences: Document,
    /// Behavioral aggregates; two well-known sub-keys get special
    /// compaction treatment, the rest passes through until tiering
    #[serde(default)]
    pub interaction_patterns: Document,
    /// ISO year-week → aggregated trend, produced by progress tiering
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub progress_trends: BTreeMap<String, WeeklyTrend>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_accessed: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<i64>,
    /// Condensed metadata produced by the consolidation stage; once set,
    /// the raw top-level timestamps above are absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub essential_metadata: Option<EssentialMetadata>,
    /// Bookkeeping written by the compactor
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compaction_metadata: Option<CompactionMetadata>,
}

impl MemoryRecord {
    /// Create an empty record stamped with the current time.
    pub fn new() -> Self {
        let now = now_epoch();
        Self {
            created_at: Some(now),
            last_accessed: Some(now),
            ..Default::default()
        }
    }

    /// Stamp the last-accessed time.
    pub fn mark_accessed(&mut self) {
        self.last_accessed = Some(now_epoch());
    }

    /// Stamp the last-updated time.
    pub fn mark_updated(&mut self) {
        self.last_updated = Some(now_epoch());
    }

    /// Total learning hours across the current progress history,
    /// rounded to two decimals.
    pub fn total_learning_hours(&self) -> f64 {
        let minutes: f64 = self
            .progress_history
            .iter()
            .map(|entry| entry.metrics.total_duration_minutes)
            .sum();
        round2(minutes / 60.0)
    }

    /// Mean completion rate over the last `window` progress entries,
    /// 0.0 when the history is empty.
    pub fn recent_completion_rate(&self, window: usize) -> f64 {
        let recent: Vec<f64> = self
            .progress_history
            .iter()
            .rev()
            .take(window)
            .map(|entry| entry.metrics.completion_rate)
            .collect();
        if recent.is_empty() {
            return 0.0;
        }
        recent.iter().sum::<f64>() / recent.len() as f64
    }
}

/// A single plan held in a record.
///
/// Invariant: once `compacted` is true, `plan_data` is absent and `summary`
/// is present. An entry is never summarized twice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanEntry {
    /// Unique within the owning record (`plan_{epoch}` pattern)
    pub plan_id: String,
    /// Epoch seconds
    pub created_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_type: Option<String>,
    /// Full nested plan structure: metadata, weekly structure, milestones,
    /// success criteria. Absent once the entry has been summarized.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_data: Option<Document>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<PlanSummary>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub compacted: bool,
    /// Observed completion rate for this plan, if a producer recorded one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_rate: Option<f64>,
}

impl PlanEntry {
    /// Create a full (un-summarized) plan entry.
    pub fn new(plan_id: impl Into<String>, created_at: i64, plan_data: Document) -> Self {
        Self {
            plan_id: plan_id.into(),
            created_at,
            plan_type: None,
            plan_data: Some(plan_data),
            summary: None,
            compacted: false,
            completion_rate: None,
        }
    }
}

/// Derived summary replacing `plan_data` on older plans.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlanSummary {
    pub duration_weeks: u64,
    pub total_tasks: u64,
    pub completion_rate: CompletionRate,
    /// At most 5, deduplicated
    pub key_objectives: Vec<String>,
    pub difficulty_level: Difficulty,
}

/// A completion rate that may simply be unrecorded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum CompletionRate {
    Percent(f64),
    Unknown(String),
}

impl CompletionRate {
    pub fn unknown() -> Self {
        Self::Unknown("unknown".to_string())
    }
}

/// Plan difficulty bucketed from average daily task count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Low,
    Medium,
    High,
    Unknown,
}

/// A single progress entry. Append-only and never mutated in place;
/// compaction keeps it verbatim or folds it into a weekly trend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_id: Option<String>,
    /// Epoch seconds
    pub timestamp: i64,
    #[serde(default)]
    pub metrics: ProgressMetrics,
    /// Unknown sub-fields pass through untouched
    #[serde(flatten)]
    pub extra: Document,
}

impl ProgressEntry {
    pub fn new(timestamp: i64, metrics: ProgressMetrics) -> Self {
        Self {
            record_id: None,
            timestamp,
            metrics,
            extra: Document::new(),
        }
    }
}

/// Metrics carried by a progress entry.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ProgressMetrics {
    #[serde(default)]
    pub completion_rate: f64,
    #[serde(default)]
    pub efficiency_score: f64,
    #[serde(default)]
    pub total_duration_minutes: f64,
    #[serde(default)]
    pub total_tasks: u64,
    #[serde(default)]
    pub completed_tasks: u64,
}

/// Weekly statistical aggregate replacing raw progress entries.
///
/// The raw task sums are persisted alongside the averages so later folds
/// merge additively instead of recomputing from entries that no longer
/// exist. `records_aggregated` never decreases.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct WeeklyTrend {
    pub average_completion_rate: f64,
    pub average_efficiency_score: f64,
    pub overall_completion_rate: f64,
    pub records_aggregated: u64,
    pub total_tasks: u64,
    pub completed_tasks: u64,
}

impl WeeklyTrend {
    /// Fold one entry's metrics into this trend.
    ///
    /// Averages merge by weighted mean over `records_aggregated`; task
    /// counts sum; the overall completion rate is re-derived from the sums.
    pub fn fold(&mut self, metrics: &ProgressMetrics) {
        let n = self.records_aggregated as f64;
        self.average_completion_rate =
            round2((self.average_completion_rate * n + metrics.completion_rate) / (n + 1.0));
        self.average_efficiency_score =
            round2((self.average_efficiency_score * n + metrics.efficiency_score) / (n + 1.0));
        self.records_aggregated += 1;
        self.total_tasks += metrics.total_tasks;
        self.completed_tasks += metrics.completed_tasks;
        self.overall_completion_rate = if self.total_tasks > 0 {
            round2(self.completed_tasks as f64 / self.total_tasks as f64 * 100.0)
        } else {
            0.0
        };
    }
}

/// Condensed metadata block replacing the raw top-level timestamps.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct EssentialMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_accessed: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<i64>,
    pub total_learning_hours: f64,
    #[serde(default)]
    pub preferences_summary: Document,
}

/// Compaction bookkeeping attached to a record.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct CompactionMetadata {
    #[serde(default)]
    pub plans_compacted: u64,
    #[serde(default)]
    pub progress_records_compacted: u64,
    /// Epoch seconds of the last compaction that touched this record
    pub compaction_timestamp: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_record_defaults() {
        let record = MemoryRecord::new();
        assert!(record.profile.is_empty());
        assert!(record.plans.is_empty());
        assert!(record.progress_history.is_empty());
        assert!(record.progress_trends.is_empty());
        assert!(record.created_at.is_some());
        assert!(record.last_accessed.is_some());
        assert!(record.last_updated.is_none());
        assert!(record.essential_metadata.is_none());
    }

    #[test]
    fn test_record_serialization_roundtrip() {
        let mut record = MemoryRecord::new();
        record
            .profile
            .insert("goals".to_string(), json!("learn rust"));
        record.plans.push(PlanEntry::new(
            "plan_1700000000",
            1_700_000_000,
            Document::new(),
        ));
        record.progress_history.push(ProgressEntry::new(
            1_700_000_100,
            ProgressMetrics {
                completion_rate: 80.0,
                efficiency_score: 0.9,
                total_duration_minutes: 120.0,
                total_tasks: 10,
                completed_tasks: 8,
            },
        ));

        let json = serde_json::to_string(&record).expect("serialize");
        let back: MemoryRecord = serde_json::from_str(&json).expect("deserialize");

        assert_eq!(back.plans.len(), 1);
        assert_eq!(back.plans[0].plan_id, "plan_1700000000");
        assert_eq!(back.progress_history[0].metrics.completed_tasks, 8);
        assert_eq!(back.profile.get("goals"), Some(&json!("learn rust")));
    }

    #[test]
    fn test_compacted_flag_absent_when_false() {
        let entry = PlanEntry::new("plan_1", 1, Document::new());
        let json = serde_json::to_string(&entry).unwrap();
        assert!(!json.contains("compacted"));
        assert!(!json.contains("summary"));
    }

    #[test]
    fn test_progress_entry_extra_fields_pass_through() {
        let raw = json!({
            "timestamp": 1_700_000_000,
            "metrics": {"completion_rate": 50.0},
            "mood": "focused",
            "notes": ["late start"]
        });
        let entry: ProgressEntry = serde_json::from_value(raw).unwrap();
        assert_eq!(entry.extra.get("mood"), Some(&json!("focused")));

        let back = serde_json::to_value(&entry).unwrap();
        assert_eq!(back.get("mood"), Some(&json!("focused")));
        assert_eq!(back.get("notes"), Some(&json!(["late start"])));
    }

    #[test]
    fn test_completion_rate_untagged_forms() {
        let known: CompletionRate = serde_json::from_value(json!(82.5)).unwrap();
        assert_eq!(known, CompletionRate::Percent(82.5));

        let unknown: CompletionRate = serde_json::from_value(json!("unknown")).unwrap();
        assert_eq!(unknown, CompletionRate::unknown());
    }

    #[test]
    fn test_weekly_trend_fold_accumulates() {
        let mut trend = WeeklyTrend::default();
        trend.fold(&ProgressMetrics {
            completion_rate: 80.0,
            efficiency_score: 0.8,
            total_tasks: 10,
            completed_tasks: 8,
            ..Default::default()
        });
        trend.fold(&ProgressMetrics {
            completion_rate: 60.0,
            efficiency_score: 0.6,
            total_tasks: 10,
            completed_tasks: 4,
            ..Default::default()
        });

        assert_eq!(trend.records_aggregated, 2);
        assert_eq!(trend.average_completion_rate, 70.0);
        assert_eq!(trend.average_efficiency_score, 0.7);
        assert_eq!(trend.total_tasks, 20);
        assert_eq!(trend.completed_tasks, 12);
        assert_eq!(trend.overall_completion_rate, 60.0);
    }

    #[test]
    fn test_weekly_trend_fold_is_monotonic() {
        let mut trend = WeeklyTrend::default();
        for _ in 0..5 {
            let before = trend.records_aggregated;
            trend.fold(&ProgressMetrics::default());
            assert!(trend.records_aggregated > before);
        }
    }

    #[test]
    fn test_difficulty_serializes_lowercase() {
        assert_eq!(serde_json::to_value(Difficulty::High).unwrap(), json!("high"));
        assert_eq!(serde_json::to_value(Difficulty::Low).unwrap(), json!("low"));
    }
}
