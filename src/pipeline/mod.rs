//! Pipeline driver: ingest → merge → aggregate → export in one linear pass.
//!
//! This module sits "above" [`crate::ingestion`], [`crate::processing`] and [`crate::export`]
//! and provides:
//!
//! - [`run_pipeline`], the single entry point for a run
//! - [`PipelineConfig`], one immutable configuration value (JSON-loadable)
//! - real-time progress counters ([`PipelineMetrics`]) and observer hooks for monitoring
//! - cooperative cancellation at chunk boundaries ([`CancellationToken`])
//!
//! Runs are single-threaded. Chunks are merged and written strictly in read order; the
//! reference table is loaded once and only read afterwards.

mod cancel;
mod config;
mod observer;

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use crate::error::PipelineResult;
use crate::export::DelimitedWriter;
use crate::ingestion::{self, open_source, ChunkStream, FormatDescriptor, Preview, SourceInput};
use crate::processing::{aggregate, aggregate_with_report, ReferenceIndex};
use crate::types::Table;

pub use cancel::CancellationToken;
pub use config::PipelineConfig;
pub use observer::{
    CompositeObserver, FileObserver, PipelineEvent, PipelineMetrics, PipelineMetricsSnapshot, PipelineObserver,
    StdErrObserver,
};

/// Runtime attachments of a run: observer, cancellation and live metrics.
#[derive(Clone, Default)]
pub struct RunContext {
    /// Optional observer for logging/alerts.
    pub observer: Option<Arc<dyn PipelineObserver>>,
    /// Checked at every chunk boundary and before aggregation.
    pub cancel: CancellationToken,
    /// Counters updated during the run.
    pub metrics: Arc<PipelineMetrics>,
}

impl fmt::Debug for RunContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunContext")
            .field("observer_set", &self.observer.is_some())
            .field("cancel", &self.cancel)
            .field("metrics", &self.metrics.snapshot())
            .finish()
    }
}

impl RunContext {
    /// Attach an observer for pipeline events.
    pub fn with_observer(mut self, observer: Arc<dyn PipelineObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Use `token` for cancellation.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    fn emit(&self, event: PipelineEvent) {
        if let Some(obs) = &self.observer {
            obs.on_event(&event);
        }
    }
}

/// Result of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOutput {
    /// Detected format of the main source (`None` for spreadsheets).
    pub format: Option<FormatDescriptor>,
    /// Encoded output.
    pub bytes: Vec<u8>,
    /// Data rows in `bytes`.
    pub rows_written: usize,
    /// Chunks read from the main source.
    pub chunks: usize,
    /// Final counters.
    pub metrics: PipelineMetricsSnapshot,
}

/// Run one pipeline over `main`, optionally merged against `reference`.
///
/// Without aggregation every merged chunk is exported as soon as it is read (header once);
/// with aggregation merged chunks are accumulated and reduced in one final pass.
///
/// When an observer is attached, progress and diagnostics go to `on_event`; a failure goes to
/// `on_failure` and, at or above `config.alert_at_or_above`, to `on_alert`.
///
/// # Examples
///
/// ```rust
/// use tabmerge::pipeline::{run_pipeline, PipelineConfig, RunContext};
/// use tabmerge::processing::{AggregationOptions, ColumnPolicy, ConcatOrder, ConcatSeparator, ConcatStyle};
/// use tabmerge::ingestion::{SourceInput, TextEncoding};
///
/// # fn main() -> Result<(), tabmerge::PipelineError> {
/// let mut cfg = PipelineConfig::default();
/// cfg.export.encoding = TextEncoding::Utf8;
/// cfg.aggregation = Some(AggregationOptions {
///     group_keys: vec!["id".into()],
///     policies: [("val".to_string(), ColumnPolicy::ConcatDedup)].into_iter().collect(),
///     concat: Some(ConcatStyle { order: ConcatOrder::FirstSeen, separator: ConcatSeparator::Pipe }),
///     ..Default::default()
/// });
///
/// let main = SourceInput::new("data.csv", b"id;val\n1;x\n1;y\n2;z\n");
/// let out = run_pipeline(main, None, &cfg, &RunContext::default())?;
/// assert_eq!(String::from_utf8(out.bytes).unwrap(), "id;val\n1;x|y\n2;z\n");
/// # Ok(())
/// # }
/// ```
pub fn run_pipeline(
    main: SourceInput<'_>,
    reference: Option<SourceInput<'_>>,
    config: &PipelineConfig,
    ctx: &RunContext,
) -> PipelineResult<PipelineOutput> {
    let result = run(main, reference, config, ctx);

    if let (Err(e), Some(obs)) = (&result, ctx.observer.as_ref()) {
        let sev = e.severity();
        obs.on_failure(sev, e);
        if sev >= config.alert_at_or_above {
            obs.on_alert(sev, e);
        }
    }

    result
}

/// Bounded preview of `source` using `config.read` and `config.preview_rows`.
pub fn preview(source: &SourceInput<'_>, config: &PipelineConfig) -> PipelineResult<Preview> {
    ingestion::preview(source, &config.read, config.preview_rows)
}

fn run(
    main: SourceInput<'_>,
    reference: Option<SourceInput<'_>>,
    config: &PipelineConfig,
    ctx: &RunContext,
) -> PipelineResult<PipelineOutput> {
    let start = Instant::now();
    let metrics = &ctx.metrics;
    metrics.begin_run();
    ctx.emit(PipelineEvent::RunStarted {
        source: main.filename.to_string(),
    });
    config.validate()?;

    let mut stream = open_source(&main, &config.read)?;
    report_opened(ctx, main.filename, &stream);
    let format = stream.detection().map(|d| d.format);
    let schema = stream.schema().clone();

    let skip_merge = reference.is_some() && !config.merge.keys_compatible();
    if skip_merge {
        ctx.emit(PipelineEvent::MergeSkipped {
            left_keys: config.merge.left_keys.len(),
            right_keys: config.merge.right_keys.len(),
        });
    }
    let reference_table = match reference {
        Some(src) if !skip_merge => Some(load_reference(&src, config, ctx)?),
        _ => None,
    };
    let index = match &reference_table {
        Some(table) => {
            let index = ReferenceIndex::build(table, &config.merge)?;
            if let Some(ix) = &index {
                ctx.emit(PipelineEvent::ReferenceLoaded {
                    rows: table.row_count(),
                    distinct_keys: ix.distinct_keys(),
                });
            }
            index
        }
        None => None,
    };
    let output_schema = match &index {
        Some(ix) => ix.output_schema(&schema)?,
        None => schema.clone(),
    };
    if let Some(agg) = &config.aggregation {
        // Surface unknown columns before reading the whole source.
        aggregate(&Table::empty(output_schema.clone()), agg)?;
    }

    let mut writer = DelimitedWriter::new(config.export);
    let mut accumulated: Option<Table> = None;
    let mut chunks = 0usize;
    let mut dropped_seen = 0u64;

    loop {
        ctx.cancel.check(chunks)?;
        let Some(chunk) = stream.next() else { break };
        let chunk = chunk?;
        schema.ensure_matches(&chunk.schema)?;

        let index_no = chunks;
        chunks += 1;
        metrics.on_chunk_read(chunk.row_count());
        let dropped = stream.rows_dropped();
        metrics.on_rows_dropped(dropped - dropped_seen);
        dropped_seen = dropped;
        ctx.emit(PipelineEvent::ChunkRead {
            index: index_no,
            rows: chunk.row_count(),
        });

        let merged = match &index {
            Some(ix) => ix.join(&chunk)?,
            None => {
                if skip_merge {
                    metrics.on_merge_skipped();
                }
                chunk
            }
        };

        if config.aggregation.is_some() {
            accumulated = Some(match accumulated.take() {
                Some(mut acc) => {
                    acc.append(merged)?;
                    acc
                }
                None => merged,
            });
        } else {
            writer.write_table(&merged)?;
            metrics.on_rows_written(merged.row_count());
        }

        ctx.emit(PipelineEvent::ChunkProcessed {
            index: index_no,
            rows_so_far: metrics.rows_read(),
        });
    }

    if let Some(agg) = &config.aggregation {
        ctx.cancel.check(chunks)?;
        let table = accumulated.unwrap_or_else(|| Table::empty(output_schema.clone()));
        let report = aggregate_with_report(&table, agg)?;
        if report.numeric_values_skipped > 0 {
            metrics.on_numeric_values_skipped(report.numeric_values_skipped);
            ctx.emit(PipelineEvent::NumericValuesSkipped {
                count: report.numeric_values_skipped,
            });
        }
        ctx.emit(PipelineEvent::AggregationFinished {
            input_rows: table.row_count(),
            groups: report.table.row_count(),
        });
        writer.write_table(&report.table)?;
        metrics.on_rows_written(report.table.row_count());
    } else {
        writer.write_header(&output_schema)?;
    }

    let out = writer.finish();
    if out.replaced_chars > 0 {
        metrics.on_chars_replaced(out.replaced_chars);
        ctx.emit(PipelineEvent::EncodingReencodeLoss {
            replaced_chars: out.replaced_chars,
        });
    }

    let elapsed = start.elapsed();
    metrics.end_run(elapsed);
    let snapshot = metrics.snapshot();
    ctx.emit(PipelineEvent::RunFinished {
        elapsed,
        metrics: snapshot.clone(),
    });

    Ok(PipelineOutput {
        format,
        bytes: out.bytes,
        rows_written: out.rows,
        chunks,
        metrics: snapshot,
    })
}

/// Read the whole reference source into memory.
fn load_reference(source: &SourceInput<'_>, config: &PipelineConfig, ctx: &RunContext) -> PipelineResult<Table> {
    let stream = open_source(source, &config.reference_read)?;
    report_opened(ctx, source.filename, &stream);
    let mut table = Table::empty(stream.schema().clone());
    for chunk in stream {
        table.append(chunk?)?;
    }
    Ok(table)
}

fn report_opened(ctx: &RunContext, source: &str, stream: &ChunkStream<'_>) {
    if ctx.observer.is_none() {
        return;
    }
    if let Some(detection) = stream.detection() {
        ctx.emit(PipelineEvent::FormatDetected {
            source: source.to_string(),
            format: detection.format,
        });
        if let Some(reason) = &detection.degraded {
            ctx.emit(PipelineEvent::FormatDetectionDegraded {
                source: source.to_string(),
                reason: reason.clone(),
            });
        }
    }
    for attempt in stream.attempts() {
        let event = match &attempt.outcome {
            Ok(()) => PipelineEvent::StrategyAccepted {
                source: source.to_string(),
                strategy: attempt.strategy,
            },
            Err(reason) => PipelineEvent::StrategyRejected {
                source: source.to_string(),
                strategy: attempt.strategy,
                reason: reason.clone(),
            },
        };
        ctx.emit(event);
    }
}
