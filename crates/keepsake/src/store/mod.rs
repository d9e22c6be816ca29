//! Per-key memory store with write-through persistence
//!
//! Owns the canonical key→record map. Every mutating call rewrites the
//! whole map to a single JSON blob via write-temp-then-rename, so a crash
//! never leaves a truncated file. Persistence failures are logged and do
//! not roll back in-memory state: the store is eventually-persistent, not
//! transactional.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, error, info};

use crate::compactor::{CompactionReport, Compactor};
use crate::config::StoreConfig;
use crate::error::Result;
use crate::record::types::{Document, MemoryRecord, PlanEntry, ProgressEntry, ProgressMetrics, now_epoch};

type RecordMap = BTreeMap<String, MemoryRecord>;

/// Typed partial update merged into a record by [`MemoryStore::update`].
///
/// Sequence fields are appended then truncated to the retention cap
/// keeping the most recent entries; mapping fields are shallow-merged
/// key-by-key.
#[derive(Debug, Clone, Default)]
pub struct MemoryUpdate {
    pub profile: Option<Document>,
    pub preferences: Option<Document>,
    pub interaction_patterns: Option<Document>,
    pub plans: Vec<PlanEntry>,
    pub progress_history: Vec<ProgressEntry>,
}

impl MemoryUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn profile(mut self, profile: Document) -> Self {
        self.profile = Some(profile);
        self
    }

    pub fn preferences(mut self, preferences: Document) -> Self {
        self.preferences = Some(preferences);
        self
    }

    pub fn interaction_patterns(mut self, patterns: Document) -> Self {
        self.interaction_patterns = Some(patterns);
        self
    }

    pub fn plan(mut self, plan: PlanEntry) -> Self {
        self.plans.push(plan);
        self
    }

    pub fn progress(mut self, entry: ProgressEntry) -> Self {
        self.progress_history.push(entry);
        self
    }
}

/// Aggregate statistics about the whole store.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StoreStats {
    pub total_users: usize,
    pub total_plans: usize,
    pub total_progress_records: usize,
    pub file_size_bytes: u64,
}

/// Classification of a windowed progress trend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendRating {
    Excellent,
    Good,
    Moderate,
    NeedsImprovement,
    NoData,
}

/// Windowed completion trend computed by [`MemoryStore::progress_trend`].
#[derive(Debug, Clone, Serialize)]
pub struct ProgressTrend {
    pub rating: TrendRating,
    pub completion_rate: f64,
    pub total_tasks: u64,
    pub completed_tasks: u64,
    pub analysis_period_days: i64,
}

/// Per-key durable record store.
///
/// All mutating operations serialize behind one coarse lock; the
/// write-through persistence already forces full-map serialization, so
/// finer locking would buy nothing.
#[derive(Debug)]
pub struct MemoryStore {
    data_path: PathBuf,
    plan_retention: usize,
    progress_retention: usize,
    records: Mutex<RecordMap>,
}

impl MemoryStore {
    /// Open a store, loading any existing blob from disk.
    ///
    /// A missing file starts fresh; an unreadable or corrupt file is
    /// logged and also starts fresh rather than failing the process.
    pub fn open(config: &StoreConfig) -> Self {
        let records = load_records(&config.data_path);
        info!(
            path = %config.data_path.display(),
            users = records.len(),
            "memory store opened"
        );
        Self {
            data_path: config.data_path.clone(),
            plan_retention: config.plan_retention,
            progress_retention: config.progress_retention,
            records: Mutex::new(records),
        }
    }

    /// Get the record for `key`, creating an empty default on first access.
    ///
    /// Stamps `last_accessed` and returns a clone; the caller never sees
    /// the live record.
    pub fn get(&self, key: &str) -> MemoryRecord {
        let mut records = self.lock();
        let record = records
            .entry(key.to_string())
            .or_insert_with(MemoryRecord::new);
        record.mark_accessed();
        record.clone()
    }

    /// Merge a partial update into the record for `key`.
    pub fn update(&self, key: &str, update: MemoryUpdate) {
        let mut records = self.lock();
        let record = records
            .entry(key.to_string())
            .or_insert_with(MemoryRecord::new);

        if let Some(profile) = update.profile {
            merge_document(&mut record.profile, profile);
        }
        if let Some(preferences) = update.preferences {
            merge_document(&mut record.preferences, preferences);
        }
        if let Some(patterns) = update.interaction_patterns {
            merge_document(&mut record.interaction_patterns, patterns);
        }

        record.plans.extend(update.plans);
        truncate_front(&mut record.plans, self.plan_retention);
        record.progress_history.extend(update.progress_history);
        truncate_front(&mut record.progress_history, self.progress_retention);

        record.mark_updated();
        self.persist(&records);
        debug!(key, "record updated");
    }

    /// Append a new plan, stamping a generated id and timestamp.
    /// Returns the generated plan id.
    pub fn append_plan(
        &self,
        key: &str,
        plan_data: Document,
        plan_type: Option<&str>,
    ) -> String {
        let now = now_epoch();
        let mut records = self.lock();
        let record = records
            .entry(key.to_string())
            .or_insert_with(MemoryRecord::new);

        let plan_id = unique_id("plan", now, |candidate| {
            record.plans.iter().any(|p| p.plan_id == candidate)
        });
        let mut plan = PlanEntry::new(plan_id.clone(), now, plan_data);
        plan.plan_type = plan_type.map(str::to_string);
        record.plans.push(plan);
        truncate_front(&mut record.plans, self.plan_retention);

        record.mark_updated();
        self.persist(&records);
        info!(key, plan_id, "plan appended");
        plan_id
    }

    /// Append a new progress entry, stamping a generated record id and
    /// timestamp. Returns the generated record id.
    pub fn append_progress(&self, key: &str, metrics: ProgressMetrics) -> String {
        let now = now_epoch();
        let mut records = self.lock();
        let record = records
            .entry(key.to_string())
            .or_insert_with(MemoryRecord::new);

        let record_id = unique_id("progress", now, |candidate| {
            record
                .progress_history
                .iter()
                .any(|e| e.record_id.as_deref() == Some(candidate))
        });
        let mut entry = ProgressEntry::new(now, metrics);
        entry.record_id = Some(record_id.clone());
        record.progress_history.push(entry);
        truncate_front(&mut record.progress_history, self.progress_retention);

        record.mark_updated();
        self.persist(&records);
        debug!(key, record_id, "progress entry appended");
        record_id
    }

    /// Retention-only reduction: trim plans and progress history to their
    /// most recent entries by timestamp. Cheap and always safe, independent
    /// of the byte-budget pipeline.
    pub fn compact(&self, key: &str, max_plans: usize, max_progress: usize) {
        let mut records = self.lock();
        let record = records
            .entry(key.to_string())
            .or_insert_with(MemoryRecord::new);

        if record.plans.len() > max_plans {
            record.plans.sort_by_key(|p| p.created_at);
            let excess = record.plans.len() - max_plans;
            record.plans.drain(..excess);
        }
        if record.progress_history.len() > max_progress {
            record.progress_history.sort_by_key(|e| e.timestamp);
            let excess = record.progress_history.len() - max_progress;
            record.progress_history.drain(..excess);
        }

        self.persist(&records);
        info!(key, max_plans, max_progress, "record trimmed to retention caps");
    }

    /// Run the compactor over the record for `key` and store the result.
    ///
    /// The compactor works on a copy; the stored record is replaced only
    /// when the pipeline succeeded. Returns the compaction report either way.
    pub fn apply_compaction(&self, key: &str, compactor: &Compactor) -> CompactionReport {
        let mut records = self.lock();
        let record = records
            .entry(key.to_string())
            .or_insert_with(MemoryRecord::new);

        let outcome = compactor.compact(record);
        if outcome.report.error.is_none() {
            *record = outcome.record;
            self.persist(&records);
        }
        outcome.report
    }

    /// Remove the record for `key` entirely. No-op on a missing key.
    pub fn delete(&self, key: &str) {
        let mut records = self.lock();
        if records.remove(key).is_some() {
            self.persist(&records);
            info!(key, "record deleted");
        }
    }

    /// All keys currently held.
    pub fn users(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    /// Aggregate statistics over every record plus the on-disk blob size.
    pub fn stats(&self) -> StoreStats {
        let records = self.lock();
        StoreStats {
            total_users: records.len(),
            total_plans: records.values().map(|r| r.plans.len()).sum(),
            total_progress_records: records
                .values()
                .map(|r| r.progress_history.len())
                .sum(),
            file_size_bytes: fs::metadata(&self.data_path).map(|m| m.len()).unwrap_or(0),
        }
    }

    /// The most recent plans for `key`, newest first.
    pub fn recent_plans(&self, key: &str, limit: usize) -> Vec<PlanEntry> {
        let mut records = self.lock();
        let record = records
            .entry(key.to_string())
            .or_insert_with(MemoryRecord::new);
        let mut plans = record.plans.clone();
        plans.sort_by_key(|p| std::cmp::Reverse(p.created_at));
        plans.truncate(limit);
        plans
    }

    /// Completion trend over the last `days` days of progress history.
    pub fn progress_trend(&self, key: &str, days: i64) -> ProgressTrend {
        let cutoff = now_epoch() - days * 24 * 60 * 60;
        let mut records = self.lock();
        let record = records
            .entry(key.to_string())
            .or_insert_with(MemoryRecord::new);

        let window: Vec<&ProgressEntry> = record
            .progress_history
            .iter()
            .filter(|e| e.timestamp > cutoff)
            .collect();
        if window.is_empty() {
            return ProgressTrend {
                rating: TrendRating::NoData,
                completion_rate: 0.0,
                total_tasks: 0,
                completed_tasks: 0,
                analysis_period_days: days,
            };
        }

        let total_tasks: u64 = window.iter().map(|e| e.metrics.total_tasks).sum();
        let completed_tasks: u64 = window.iter().map(|e| e.metrics.completed_tasks).sum();
        let completion_rate = if total_tasks > 0 {
            completed_tasks as f64 / total_tasks as f64 * 100.0
        } else {
            0.0
        };

        let rating = if completion_rate >= 80.0 {
            TrendRating::Excellent
        } else if completion_rate >= 60.0 {
            TrendRating::Good
        } else if completion_rate >= 40.0 {
            TrendRating::Moderate
        } else {
            TrendRating::NeedsImprovement
        };

        ProgressTrend {
            rating,
            completion_rate,
            total_tasks,
            completed_tasks,
            analysis_period_days: days,
        }
    }

    fn lock(&self) -> MutexGuard<'_, RecordMap> {
        // A panic mid-mutation leaves the map intact, so a poisoned lock
        // is still usable.
        self.records.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Write-through: serialize the full map after every mutation.
    /// Failures are logged; in-memory state stays authoritative.
    fn persist(&self, records: &RecordMap) {
        if let Err(e) = persist_atomic(&self.data_path, records) {
            error!(
                path = %self.data_path.display(),
                error = %e,
                "failed to persist memory store"
            );
        }
    }
}

/// Shallow merge: incoming keys overwrite, untouched keys survive.
fn merge_document(target: &mut Document, incoming: Document) {
    for (key, value) in incoming {
        target.insert(key, value);
    }
}

/// Drop entries from the front so at most `cap` (the most recent) remain.
fn truncate_front<T>(items: &mut Vec<T>, cap: usize) {
    let excess = items.len().saturating_sub(cap);
    if excess > 0 {
        items.drain(..excess);
    }
}

/// Generate a `{prefix}_{epoch}` id, suffixed on collision so ids stay
/// unique within a record even for same-second appends.
fn unique_id(prefix: &str, epoch: i64, taken: impl Fn(&str) -> bool) -> String {
    let base = format!("{prefix}_{epoch}");
    if !taken(&base) {
        return base;
    }
    let mut n = 2;
    loop {
        let candidate = format!("{base}_{n}");
        if !taken(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

fn load_records(path: &Path) -> RecordMap {
    match fs::read(path) {
        Ok(bytes) => match serde_json::from_slice(&bytes) {
            Ok(records) => records,
            Err(e) => {
                error!(path = %path.display(), error = %e, "corrupt memory store, starting fresh");
                RecordMap::new()
            }
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "no existing memory store, starting fresh");
            RecordMap::new()
        }
        Err(e) => {
            error!(path = %path.display(), error = %e, "failed to read memory store, starting fresh");
            RecordMap::new()
        }
    }
}

/// Write the blob to a temp file in the same directory, then atomically
/// rename over the target so readers never observe a partial write.
fn persist_atomic(path: &Path, records: &RecordMap) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let bytes = serde_json::to_vec_pretty(records)?;
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, &bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}
