//! Batch export: preconditions, sequential and parallel runs, summaries.

mod error;
mod job;

pub use error::BatchError;
pub use job::{BatchJob, SUPPORTED_EXTENSIONS, enumerate_inputs, is_supported_image};

use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc::Sender;
use tempfile::NamedTempFile;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::export::{ExportError, ExportErrorKind, ExportedFile, Exporter, OutputNamer};
use crate::metadata::MetadataResolver;
use crate::watermark::{FontCatalog, FontResolutionError, WatermarkAssets};

/// Outcome for one source, tagged with its position in the job.
#[derive(Debug)]
pub struct PerFileResult {
    pub index: usize,
    pub source: PathBuf,
    pub outcome: Result<ExportedFile, ExportError>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedFile {
    pub source: PathBuf,
    pub kind: ExportErrorKind,
    pub reason: String,
}

/// Totals for a finished or cancelled run.
///
/// `succeeded.len() + failed.len() + not_processed == total` always holds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: Vec<ExportedFile>,
    pub failed: Vec<FailedFile>,
    pub not_processed: usize,
    pub cancelled: bool,
}

impl BatchSummary {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            not_processed: total,
            ..Self::default()
        }
    }

    pub fn record(&mut self, result: &PerFileResult) {
        self.push(summarize(result));
    }

    fn push(&mut self, entry: Result<ExportedFile, FailedFile>) {
        match entry {
            Ok(file) => self.succeeded.push(file),
            Err(failed) => self.failed.push(failed),
        }
        self.not_processed = self.not_processed.saturating_sub(1);
    }

    pub fn processed(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }
}

fn summarize(result: &PerFileResult) -> Result<ExportedFile, FailedFile> {
    match &result.outcome {
        Ok(file) => Ok(file.clone()),
        Err(e) => Err(FailedFile {
            source: result.source.clone(),
            kind: e.kind(),
            reason: e.to_string(),
        }),
    }
}

/// A batch whose preconditions have all been checked.
pub struct BatchOrchestrator {
    job: BatchJob,
    exporter: Exporter,
    font_warning: Option<FontResolutionError>,
    cancel: CancellationToken,
}

impl BatchOrchestrator {
    /// Check every precondition once, before any file is read: the job has
    /// sources, the output directory can be written, and the watermark
    /// assets load.
    pub fn prepare(
        job: BatchJob,
        catalog: &FontCatalog,
        preferred: &[String],
        metadata: Arc<dyn MetadataResolver>,
    ) -> Result<Self, BatchError> {
        check_job(&job)?;
        let assets = WatermarkAssets::load(&job.template().watermark, catalog, preferred)
            .inspect_err(|e| error!("{}", e))?;
        Self::build(job, Arc::new(assets), metadata)
    }

    /// Like [`prepare`](Self::prepare) with assets the caller already
    /// loaded, typically the ones a preview is using.
    pub fn with_assets(
        job: BatchJob,
        assets: Arc<WatermarkAssets>,
        metadata: Arc<dyn MetadataResolver>,
    ) -> Result<Self, BatchError> {
        check_job(&job)?;
        Self::build(job, assets, metadata)
    }

    fn build(
        job: BatchJob,
        assets: Arc<WatermarkAssets>,
        metadata: Arc<dyn MetadataResolver>,
    ) -> Result<Self, BatchError> {
        let font_warning = assets.font_warning().cloned();
        if let Some(warning) = &font_warning {
            warn!("{}", warning);
        }
        let namer = OutputNamer::new(job.output_dir(), job.sources(), job.overwrite());
        // Shared names go to the earlier file, not the first worker to finish
        let template = job.template();
        namer.reserve(job.sources(), &template.rename, template.format);
        let exporter = Exporter::new(
            Arc::clone(job.template()),
            assets,
            metadata,
            Arc::new(namer),
            job.output_dir(),
        );
        info!(
            "Batch ready: {} files -> {:?}",
            job.len(),
            job.output_dir()
        );
        Ok(Self {
            job,
            exporter,
            font_warning,
            cancel: CancellationToken::new(),
        })
    }

    /// Use `token` to stop the run from another thread.
    pub fn with_cancellation(self, cancel: CancellationToken) -> Self {
        Self { cancel, ..self }
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn job(&self) -> &BatchJob {
        &self.job
    }

    /// Set when the requested font was missing and another one is used.
    pub fn font_warning(&self) -> Option<&FontResolutionError> {
        self.font_warning.as_ref()
    }

    fn process(&self, index: usize, source: &Path) -> PerFileResult {
        let outcome = self.exporter.export(source);
        if let Err(e) = &outcome {
            warn!("Failed to export {:?}: {}", source, e);
        }
        PerFileResult {
            index,
            source: source.to_path_buf(),
            outcome,
        }
    }

    /// Process files one at a time on the calling thread, in job order.
    /// Consumes the orchestrator so a batch runs at most once.
    pub fn run(self) -> BatchRun {
        BatchRun {
            orchestrator: self,
            next: 0,
        }
    }

    /// Process files on a local pool of `min(workers, cores)` threads.
    ///
    /// Each result is sent through `progress` as soon as it is ready, in
    /// completion order. Files not started when the token is cancelled are
    /// counted as not processed.
    pub fn run_parallel(
        self,
        workers: usize,
        progress: Option<Sender<PerFileResult>>,
    ) -> BatchSummary {
        let threads = effective_workers(workers);
        let total = self.job.len();
        info!("Exporting {} files with {} workers", total, threads);

        let work = || -> Vec<Option<Result<ExportedFile, FailedFile>>> {
            self.job
                .sources()
                .par_iter()
                .enumerate()
                .map(|(index, source)| {
                    if self.cancel.is_cancelled() {
                        return None;
                    }
                    let result = self.process(index, source);
                    let entry = summarize(&result);
                    if let Some(tx) = &progress {
                        // A closed receiver only loses progress reports
                        let _ = tx.send(result);
                    }
                    Some(entry)
                })
                .collect()
        };

        let entries = match rayon::ThreadPoolBuilder::new().num_threads(threads).build() {
            Ok(pool) => pool.install(work),
            Err(e) => {
                warn!("Could not start worker pool ({}), exporting on one thread", e);
                work()
            }
        };

        let mut summary = BatchSummary::new(total);
        for entry in entries.into_iter().flatten() {
            summary.push(entry);
        }
        summary.cancelled = self.cancel.is_cancelled();
        log_summary(&summary);
        summary
    }
}

/// Lazy sequential run. Yields nothing further once cancelled.
pub struct BatchRun {
    orchestrator: BatchOrchestrator,
    next: usize,
}

impl BatchRun {
    pub fn remaining(&self) -> usize {
        self.orchestrator.job.len().saturating_sub(self.next)
    }

    pub fn is_cancelled(&self) -> bool {
        self.orchestrator.cancel.is_cancelled()
    }
}

impl Iterator for BatchRun {
    type Item = PerFileResult;

    fn next(&mut self) -> Option<Self::Item> {
        if self.is_cancelled() {
            return None;
        }
        let source = self.orchestrator.job.sources().get(self.next)?.clone();
        let index = self.next;
        self.next += 1;
        Some(self.orchestrator.process(index, &source))
    }
}

/// Requested workers capped at the available cores, at least one.
pub fn effective_workers(requested: usize) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    requested.clamp(1, cores)
}

fn check_job(job: &BatchJob) -> Result<(), BatchError> {
    if job.is_empty() {
        error!("No supported images to export");
        return Err(BatchError::EmptyJob);
    }
    check_output_dir(job.output_dir())
}

/// Create the output directory and prove it accepts a file.
fn check_output_dir(dir: &Path) -> Result<(), BatchError> {
    let fail = |source: std::io::Error| {
        error!("Output directory {:?} is unusable: {}", dir, source);
        BatchError::OutputDirectory {
            path: dir.to_path_buf(),
            source,
        }
    };
    std::fs::create_dir_all(dir).map_err(fail)?;
    NamedTempFile::new_in(dir).map_err(fail)?;
    info!("Output directory {:?} is writable", dir);
    Ok(())
}

fn log_summary(summary: &BatchSummary) {
    info!(
        "Batch finished: {} exported, {} failed, {} not processed",
        summary.succeeded.len(),
        summary.failed.len(),
        summary.not_processed
    );
    for failed in &summary.failed {
        warn!("  {:?}: {}", failed.source, failed.reason);
    }
    if summary.cancelled {
        warn!("Batch was cancelled");
    }
}
