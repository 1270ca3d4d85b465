use thiserror::Error;

/// Convenience result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Severity classification used for observer callbacks and alerting thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub enum Severity {
    /// Informational event.
    Info,
    /// Warning-level event (non-fatal, the run continues).
    Warning,
    /// Error-level event (the run failed).
    Error,
    /// Critical error (typically I/O or other infrastructure failures).
    Critical,
}

/// Error type returned by ingestion, merge, aggregation, export and the pipeline driver.
///
/// Only fatal conditions are modelled here. Degraded format detection, skipped merges,
/// dropped numeric values and characters lost on re-encoding are reported as
/// [`crate::pipeline::PipelineEvent`]s instead.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Underlying I/O error (e.g. file not found, permission denied).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "excel")]
    /// Excel ingestion error (feature-gated behind `excel`).
    #[error("excel error: {0}")]
    Excel(#[from] calamine::Error),

    /// CSV reading/writing error that was not absorbed by the fallback ladder.
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    /// A configuration document could not be parsed.
    #[error("config error: {0}")]
    Config(#[from] serde_json::Error),

    /// A chunk's header differs from the first chunk, or a source has no usable header.
    #[error("schema mismatch: {message}")]
    SchemaMismatch { message: String },

    /// Every parsing strategy of the fallback ladder was rejected.
    #[error(
        "could not parse input after {attempts} attempts (last: {last_error}); \
         try selecting the delimiter explicitly"
    )]
    IngestionExhausted { attempts: usize, last_error: String },

    /// A configured column name does not exist in the table it refers to.
    #[error("unknown column '{column}' in {context}")]
    UnknownColumn { column: String, context: String },

    /// The configuration is structurally invalid (e.g. zero chunk size).
    #[error("invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// The run was cancelled cooperatively at a chunk boundary.
    #[error("run cancelled after {chunks_done} chunk(s)")]
    Cancelled { chunks_done: usize },
}

impl PipelineError {
    /// Severity of this failure, used to decide whether observers are alerted.
    pub fn severity(&self) -> Severity {
        match self {
            PipelineError::Io(_) => Severity::Critical,
            PipelineError::Csv(err) => match err.kind() {
                csv::ErrorKind::Io(_) => Severity::Critical,
                _ => Severity::Error,
            },
            #[cfg(feature = "excel")]
            PipelineError::Excel(_) => Severity::Error,
            PipelineError::Cancelled { .. } => Severity::Warning,
            _ => Severity::Error,
        }
    }

    pub(crate) fn unknown_column(column: &str, context: &str) -> Self {
        PipelineError::UnknownColumn {
            column: column.to_owned(),
            context: context.to_owned(),
        }
    }
}
