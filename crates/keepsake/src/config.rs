//! Configuration for the keepsake store and compactor

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::{KeepsakeError, Result};

/// Main configuration structure for keepsake
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Store configuration (persistence path, retention caps)
    #[serde(default)]
    pub store: StoreConfig,
    /// Compaction pipeline configuration
    #[serde(default)]
    pub compaction: CompactionConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// Missing sections and fields fall back to their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        toml::from_str(&contents).map_err(|e| KeepsakeError::Config(e.to_string()))
    }
}

/// Memory store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Path of the persisted key→record JSON blob
    #[serde(default = "default_data_path")]
    pub data_path: PathBuf,
    /// Maximum number of plans retained per record on append (most recent kept)
    #[serde(default = "default_plan_retention")]
    pub plan_retention: usize,
    /// Maximum number of progress entries retained per record on append
    #[serde(default = "default_progress_retention")]
    pub progress_retention: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_path: default_data_path(),
            plan_retention: default_plan_retention(),
            progress_retention: default_progress_retention(),
        }
    }
}

fn default_data_path() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("keepsake"))
        .unwrap_or_else(|| PathBuf::from(".keepsake"))
        .join("memory_store.json")
}

fn default_plan_retention() -> usize {
    20
}

fn default_progress_retention() -> usize {
    20
}

/// Compaction pipeline configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CompactionConfig {
    /// Maximum serialized record size in bytes (the budget)
    #[serde(default = "default_max_record_bytes")]
    pub max_record_bytes: usize,
    /// Target compression ratio - advisory only, never a hard constraint
    #[serde(default = "default_target_compression_ratio")]
    pub target_compression_ratio: f64,
    /// Plan count above which plan tiering kicks in
    #[serde(default = "default_plan_tier_threshold")]
    pub plan_tier_threshold: usize,
    /// Number of most recent plans always kept verbatim
    #[serde(default = "default_recent_plans_kept")]
    pub recent_plans_kept: usize,
    /// Progress entry count above which progress tiering kicks in
    #[serde(default = "default_progress_tier_threshold")]
    pub progress_tier_threshold: usize,
    /// Recency window in days - entries inside it are kept verbatim
    #[serde(default = "default_recency_window_days")]
    pub recency_window_days: i64,
    /// Progress entries kept when budget enforcement truncates the history
    #[serde(default = "default_aggressive_history_kept")]
    pub aggressive_history_kept: usize,
    /// Serialized size above which a droppable section may be discarded
    #[serde(default = "default_droppable_section_bytes")]
    pub droppable_section_bytes: usize,
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            max_record_bytes: default_max_record_bytes(),
            target_compression_ratio: default_target_compression_ratio(),
            plan_tier_threshold: default_plan_tier_threshold(),
            recent_plans_kept: default_recent_plans_kept(),
            progress_tier_threshold: default_progress_tier_threshold(),
            recency_window_days: default_recency_window_days(),
            aggressive_history_kept: default_aggressive_history_kept(),
            droppable_section_bytes: default_droppable_section_bytes(),
        }
    }
}

fn default_max_record_bytes() -> usize {
    10_000
}

fn default_target_compression_ratio() -> f64 {
    0.6
}

fn default_plan_tier_threshold() -> usize {
    5
}

fn default_recent_plans_kept() -> usize {
    3
}

fn default_progress_tier_threshold() -> usize {
    10
}

fn default_recency_window_days() -> i64 {
    7
}

fn default_aggressive_history_kept() -> usize {
    5
}

fn default_droppable_section_bytes() -> usize {
    1000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.store.plan_retention, 20);
        assert_eq!(config.store.progress_retention, 20);
        assert_eq!(config.compaction.max_record_bytes, 10_000);
        assert_eq!(config.compaction.target_compression_ratio, 0.6);
        assert_eq!(config.compaction.plan_tier_threshold, 5);
        assert_eq!(config.compaction.recent_plans_kept, 3);
        assert_eq!(config.compaction.progress_tier_threshold, 10);
        assert_eq!(config.compaction.recency_window_days, 7);
        assert_eq!(config.compaction.aggressive_history_kept, 5);
        assert_eq!(config.compaction.droppable_section_bytes, 1000);
    }

    #[test]
    fn test_toml_deserialization() {
        let toml_str = r#"
[store]
data_path = "/tmp/keepsake/memory.json"
plan_retention = 50
progress_retention = 100

[compaction]
max_record_bytes = 20000
target_compression_ratio = 0.5
recent_plans_kept = 5
recency_window_days = 14
"#;

        let config: Config = toml::from_str(toml_str).expect("Failed to parse TOML");

        assert_eq!(
            config.store.data_path,
            PathBuf::from("/tmp/keepsake/memory.json")
        );
        assert_eq!(config.store.plan_retention, 50);
        assert_eq!(config.store.progress_retention, 100);
        assert_eq!(config.compaction.max_record_bytes, 20_000);
        assert_eq!(config.compaction.target_compression_ratio, 0.5);
        assert_eq!(config.compaction.recent_plans_kept, 5);
        assert_eq!(config.compaction.recency_window_days, 14);
        // Unspecified fields keep their defaults
        assert_eq!(config.compaction.plan_tier_threshold, 5);
        assert_eq!(config.compaction.droppable_section_bytes, 1000);
    }

    #[test]
    fn test_toml_partial_deserialization() {
        let toml_str = r#"
[compaction]
max_record_bytes = 4096
"#;

        let config: Config = toml::from_str(toml_str).expect("Failed to parse partial TOML");

        assert_eq!(config.compaction.max_record_bytes, 4096);
        assert_eq!(config.store.plan_retention, 20);
    }

    #[test]
    fn test_load_missing_file_is_error() {
        let result = Config::load("/nonexistent/keepsake.toml");
        assert!(result.is_err());
    }
}
