//! Progress tiering
//!
//! Keeps progress entries inside the recency window verbatim and folds
//! everything older into per-ISO-week trends. Folding is additive: a trend
//! that already exists absorbs new entries by weighted average, and entries
//! removed from the history are never read again.

use chrono::{DateTime, Datelike, Utc};

use crate::config::CompactionConfig;
use crate::record::types::MemoryRecord;

const SECS_PER_DAY: i64 = 24 * 60 * 60;

/// Fold entries older than the recency window into `progress_trends`.
///
/// Returns the number of entries folded. Skips entirely when the history
/// is at or below the tiering threshold.
pub(crate) fn tier_progress(record: &mut MemoryRecord, config: &CompactionConfig, now: i64) -> u64 {
    if record.progress_history.len() <= config.progress_tier_threshold {
        return 0;
    }

    let cutoff = now - config.recency_window_days * SECS_PER_DAY;
    let mut folded = 0u64;
    let mut kept = Vec::with_capacity(record.progress_history.len());

    for entry in record.progress_history.drain(..) {
        if entry.timestamp > cutoff {
            kept.push(entry);
            continue;
        }
        let key = week_key(entry.timestamp);
        record
            .progress_trends
            .entry(key)
            .or_default()
            .fold(&entry.metrics);
        folded += 1;
    }
    record.progress_history = kept;

    if folded > 0 {
        let meta = record.compaction_metadata.get_or_insert_with(Default::default);
        meta.progress_records_compacted += folded;
        meta.compaction_timestamp = now;
    }

    folded
}

/// ISO year-week bucket key (`YYYY-Www`) for an epoch-second timestamp.
pub(crate) fn week_key(timestamp: i64) -> String {
    let datetime =
        DateTime::<Utc>::from_timestamp(timestamp, 0).unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
    let iso = datetime.iso_week();
    format!("{}-W{:02}", iso.year(), iso.week())
}
