use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::error::{PipelineError, Severity};
use crate::ingestion::{FormatDescriptor, ParseStrategy};

/// Events emitted while a pipeline runs.
///
/// Non-fatal conditions (degraded detection, skipped merges, dropped numeric values, characters
/// lost on export) are only ever reported here; they never abort a run.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    RunStarted { source: String },
    FormatDetected { source: String, format: FormatDescriptor },
    FormatDetectionDegraded { source: String, reason: String },
    StrategyRejected { source: String, strategy: ParseStrategy, reason: String },
    StrategyAccepted { source: String, strategy: ParseStrategy },
    ReferenceLoaded { rows: usize, distinct_keys: usize },
    /// The join key lists differ in length (or are empty); chunks pass through unmerged.
    MergeSkipped { left_keys: usize, right_keys: usize },
    ChunkRead { index: usize, rows: usize },
    ChunkProcessed { index: usize, rows_so_far: u64 },
    AggregationFinished { input_rows: usize, groups: usize },
    NumericValuesSkipped { count: usize },
    EncodingReencodeLoss { replaced_chars: usize },
    RunFinished {
        elapsed: Duration,
        metrics: PipelineMetricsSnapshot,
    },
}

impl PipelineEvent {
    /// Severity of the event itself (not of a failure).
    pub fn severity(&self) -> Severity {
        match self {
            PipelineEvent::FormatDetectionDegraded { .. }
            | PipelineEvent::MergeSkipped { .. }
            | PipelineEvent::NumericValuesSkipped { .. }
            | PipelineEvent::EncodingReencodeLoss { .. } => Severity::Warning,
            _ => Severity::Info,
        }
    }
}

/// Observer hook for pipeline events and failures.
///
/// Implementors can record metrics, logs, or trigger alerts.
pub trait PipelineObserver: Send + Sync {
    /// Called for every progress or diagnostic event.
    fn on_event(&self, _event: &PipelineEvent) {}

    /// Called when a run fails.
    fn on_failure(&self, _severity: Severity, _error: &PipelineError) {}

    /// Called when a failure meets the configured alert threshold.
    ///
    /// Default behavior forwards to [`Self::on_failure`].
    fn on_alert(&self, severity: Severity, error: &PipelineError) {
        self.on_failure(severity, error)
    }
}

/// An observer that fans out callbacks to a list of observers.
#[derive(Default)]
pub struct CompositeObserver {
    observers: Vec<Arc<dyn PipelineObserver>>,
}

impl CompositeObserver {
    /// Create a new composite observer from a list of observers.
    pub fn new(observers: Vec<Arc<dyn PipelineObserver>>) -> Self {
        Self { observers }
    }
}

impl fmt::Debug for CompositeObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeObserver")
            .field("observers_len", &self.observers.len())
            .finish()
    }
}

impl PipelineObserver for CompositeObserver {
    fn on_event(&self, event: &PipelineEvent) {
        for o in &self.observers {
            o.on_event(event);
        }
    }

    fn on_failure(&self, severity: Severity, error: &PipelineError) {
        for o in &self.observers {
            o.on_failure(severity, error);
        }
    }

    fn on_alert(&self, severity: Severity, error: &PipelineError) {
        for o in &self.observers {
            o.on_alert(severity, error);
        }
    }
}

/// Logs pipeline events to stderr.
#[derive(Debug, Default)]
pub struct StdErrObserver;

impl PipelineObserver for StdErrObserver {
    fn on_event(&self, event: &PipelineEvent) {
        eprintln!("[pipeline][{:?}] {event:?}", event.severity());
    }

    fn on_failure(&self, severity: Severity, error: &PipelineError) {
        eprintln!("[pipeline][{severity:?}] err={error}");
    }

    fn on_alert(&self, severity: Severity, error: &PipelineError) {
        eprintln!("[ALERT][pipeline][{severity:?}] err={error}");
    }
}

/// Appends pipeline events to a local log file.
#[derive(Debug)]
pub struct FileObserver {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileObserver {
    /// Create a file observer that appends events to `path`.
    ///
    /// Writes are best-effort; failures to open/write the log file are ignored.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    fn append_line(&self, line: &str) {
        let _guard = self.lock.lock().ok();
        if let Ok(mut f) = OpenOptions::new().create(true).append(true).open(&self.path) {
            let _ = writeln!(f, "{line}");
        }
    }
}

impl PipelineObserver for FileObserver {
    fn on_event(&self, event: &PipelineEvent) {
        self.append_line(&format!("{} event severity={:?} {event:?}", unix_ts(), event.severity()));
    }

    fn on_failure(&self, severity: Severity, error: &PipelineError) {
        self.append_line(&format!("{} fail severity={severity:?} err={error}", unix_ts()));
    }

    fn on_alert(&self, severity: Severity, error: &PipelineError) {
        self.append_line(&format!("{} ALERT severity={severity:?} err={error}", unix_ts()));
    }
}

fn unix_ts() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Real-time progress counters for a pipeline run.
///
/// The driver updates these counters as it goes; callers holding the `Arc` can snapshot them
/// at any time, e.g. from a UI thread polling for progress.
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    run_id: AtomicU64,
    elapsed_ns: AtomicU64,

    rows_read: AtomicU64,
    rows_dropped: AtomicU64,
    chunks: AtomicU64,
    rows_written: AtomicU64,
    merges_skipped: AtomicU64,
    numeric_values_skipped: AtomicU64,
    chars_replaced: AtomicU64,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin_run(&self) {
        let _ = self.run_id.fetch_add(1, Ordering::SeqCst);
        self.elapsed_ns.store(0, Ordering::SeqCst);
        self.rows_read.store(0, Ordering::SeqCst);
        self.rows_dropped.store(0, Ordering::SeqCst);
        self.chunks.store(0, Ordering::SeqCst);
        self.rows_written.store(0, Ordering::SeqCst);
        self.merges_skipped.store(0, Ordering::SeqCst);
        self.numeric_values_skipped.store(0, Ordering::SeqCst);
        self.chars_replaced.store(0, Ordering::SeqCst);
    }

    pub fn end_run(&self, elapsed: Duration) {
        self.elapsed_ns
            .store(elapsed.as_nanos().min(u64::MAX as u128) as u64, Ordering::SeqCst);
    }

    pub fn on_chunk_read(&self, rows: usize) {
        let _ = self.chunks.fetch_add(1, Ordering::SeqCst);
        let _ = self.rows_read.fetch_add(rows as u64, Ordering::SeqCst);
    }

    pub fn on_rows_dropped(&self, rows: u64) {
        let _ = self.rows_dropped.fetch_add(rows, Ordering::SeqCst);
    }

    pub fn on_rows_written(&self, rows: usize) {
        let _ = self.rows_written.fetch_add(rows as u64, Ordering::SeqCst);
    }

    pub fn on_merge_skipped(&self) {
        let _ = self.merges_skipped.fetch_add(1, Ordering::SeqCst);
    }

    pub fn on_numeric_values_skipped(&self, count: usize) {
        let _ = self.numeric_values_skipped.fetch_add(count as u64, Ordering::SeqCst);
    }

    pub fn on_chars_replaced(&self, count: usize) {
        let _ = self.chars_replaced.fetch_add(count as u64, Ordering::SeqCst);
    }

    /// Rows read so far in the current run.
    pub fn rows_read(&self) -> u64 {
        self.rows_read.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> PipelineMetricsSnapshot {
        let elapsed_ns = self.elapsed_ns.load(Ordering::SeqCst);
        let elapsed = if elapsed_ns > 0 {
            Some(Duration::from_nanos(elapsed_ns))
        } else {
            None
        };

        PipelineMetricsSnapshot {
            run_id: self.run_id.load(Ordering::SeqCst),
            elapsed,
            rows_read: self.rows_read.load(Ordering::SeqCst),
            rows_dropped: self.rows_dropped.load(Ordering::SeqCst),
            chunks: self.chunks.load(Ordering::SeqCst),
            rows_written: self.rows_written.load(Ordering::SeqCst),
            merges_skipped: self.merges_skipped.load(Ordering::SeqCst),
            numeric_values_skipped: self.numeric_values_skipped.load(Ordering::SeqCst),
            chars_replaced: self.chars_replaced.load(Ordering::SeqCst),
        }
    }
}

/// Immutable snapshot of [`PipelineMetrics`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineMetricsSnapshot {
    pub run_id: u64,
    pub elapsed: Option<Duration>,
    pub rows_read: u64,
    pub rows_dropped: u64,
    pub chunks: u64,
    pub rows_written: u64,
    pub merges_skipped: u64,
    pub numeric_values_skipped: u64,
    pub chars_replaced: u64,
}

impl fmt::Display for PipelineMetricsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "run_id={}, rows_read={}, rows_dropped={}, chunks={}, rows_written={}, merges_skipped={}, \
             numeric_values_skipped={}, chars_replaced={}, elapsed={:?}",
            self.run_id,
            self.rows_read,
            self.rows_dropped,
            self.chunks,
            self.rows_written,
            self.merges_skipped,
            self.numeric_values_skipped,
            self.chars_replaced,
            self.elapsed
        )
    }
}
