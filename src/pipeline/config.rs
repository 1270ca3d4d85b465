use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, PipelineResult, Severity};
use crate::export::ExportOptions;
use crate::ingestion::unified::DEFAULT_PREVIEW_ROWS;
use crate::ingestion::ReadOptions;
use crate::processing::{AggregationOptions, MergeOptions};

/// Everything a run needs to know, as one immutable value.
///
/// Every field has a default, so a JSON document only needs the parts it changes:
///
/// ```rust
/// use tabmerge::pipeline::PipelineConfig;
///
/// let cfg = PipelineConfig::from_json_str(r#"{
///     "read": { "chunk_size": 1000 },
///     "aggregation": { "group_keys": ["id"] },
///     "export": { "delimiter": "pipe", "encoding": "windows-1252" }
/// }"#).unwrap();
/// assert_eq!(cfg.read.chunk_size, 1000);
/// assert_eq!(cfg.preview_rows, 20);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// How the main source is read.
    pub read: ReadOptions,
    /// How the reference source is read.
    pub reference_read: ReadOptions,
    /// Join keys and kind; only used when a reference source is supplied.
    pub merge: MergeOptions,
    /// `None` exports merged chunks as they are read.
    pub aggregation: Option<AggregationOptions>,
    /// Output delimiter and encoding.
    pub export: ExportOptions,
    /// Rows returned by [`super::preview`].
    pub preview_rows: usize,
    /// Failures at or above this severity are also reported through `on_alert`.
    pub alert_at_or_above: Severity,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            read: ReadOptions::default(),
            reference_read: ReadOptions::default(),
            merge: MergeOptions::default(),
            aggregation: None,
            export: ExportOptions::default(),
            preview_rows: DEFAULT_PREVIEW_ROWS,
            alert_at_or_above: Severity::Critical,
        }
    }
}

impl PipelineConfig {
    /// Parse a JSON configuration document.
    pub fn from_json_str(json: &str) -> PipelineResult<Self> {
        let cfg: Self = serde_json::from_str(json)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Read and parse a JSON configuration file.
    pub fn from_json_path(path: impl AsRef<Path>) -> PipelineResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Structural checks that do not need the data.
    ///
    /// Column names are checked later against the actual schemas.
    pub fn validate(&self) -> PipelineResult<()> {
        for (name, read) in [("read", &self.read), ("reference_read", &self.reference_read)] {
            if read.chunk_size == 0 {
                return Err(PipelineError::InvalidConfig {
                    message: format!("{name}.chunk_size must be > 0"),
                });
            }
        }
        if let Some(agg) = &self.aggregation {
            if agg.group_keys.is_empty() {
                return Err(PipelineError::InvalidConfig {
                    message: "aggregation.group_keys must not be empty".to_string(),
                });
            }
        }
        Ok(())
    }
}
