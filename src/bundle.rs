//! Bundle entry points: read the CSV, render every URL, merge or keep.
//!
//! [`run_bundle`] drives the whole run. Per-URL failures never abort it;
//! only the fatal conditions listed on [`BundleError`] do.

use crate::config::{BundleConfig, OutputMode};
use crate::error::BundleError;
use crate::output::{BundleOutput, BundleStats, UrlResult, UrlStatus};
use crate::pipeline::merge::{self, Scratch};
use crate::pipeline::naming::OutputNamer;
use crate::pipeline::render::{self, Renderer};
use crate::pipeline::url_list::{self, UrlEntry};
use crate::progress::EtaTracker;
use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// One unit of work: a URL and the file its renderer writes.
#[derive(Debug)]
struct Job {
    entry: UrlEntry,
    output: PathBuf,
}

/// Render every URL in the configured CSV.
///
/// # Returns
/// `Ok(BundleOutput)` when at least one URL rendered, even if others failed
/// or the run was cancelled part-way (check `output.stats`).
///
/// # Errors
/// Validation errors are returned before any renderer starts. After the pool
/// has run, the only errors are [`BundleError::MergeFailed`] and, when nothing
/// rendered, [`BundleError::AllUrlsFailed`] or [`BundleError::Cancelled`].
/// Scratch files are removed before any of these is returned.
pub async fn run_bundle(config: &BundleConfig) -> Result<BundleOutput, BundleError> {
    let total_start = Instant::now();

    // ── Step 1: Validate everything up front ─────────────────────────────
    config.validate()?;
    if !config.csv_path.is_file() {
        return Err(BundleError::CsvNotFound {
            path: config.csv_path.clone(),
        });
    }
    let program = render::resolve_renderer(&config.renderer_path)?;
    validate_output(&config.mode)?;

    let entries = url_list::read_urls(&config.csv_path, &config.csv)?;
    if entries.is_empty() {
        return Err(BundleError::NoUrls {
            path: config.csv_path.clone(),
        });
    }
    let total = entries.len();
    info!("Found {} URLs.", total);

    // ── Step 2: Plan output paths ────────────────────────────────────────
    let scratch = match &config.mode {
        OutputMode::Merged { .. } => Some(Scratch::create(config.temp_dir.as_deref())?),
        OutputMode::Separate { .. } => None,
    };
    let mut namer = match (&config.mode, &scratch) {
        (OutputMode::Separate { output_dir, naming }, _) => OutputNamer::new(output_dir, *naming),
        (OutputMode::Merged { .. }, Some(scratch)) => OutputNamer::scratch(scratch.path()),
        (OutputMode::Merged { .. }, None) => {
            return Err(BundleError::Internal("scratch directory missing".into()))
        }
    };
    let jobs: Vec<Job> = entries
        .into_iter()
        .map(|entry| Job {
            output: namer.path_for(&entry),
            entry,
        })
        .collect();

    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_start(total);
    }

    // ── Step 3: Render through the worker pool ───────────────────────────
    let renderer = Renderer::new(
        program,
        &config.render,
        Duration::from_secs(config.render_timeout_secs),
    );
    let workers = config.effective_workers(total);
    debug!(
        "Rendering {} URLs with {} workers via {}",
        total,
        workers,
        renderer.program().display()
    );

    let render_start = Instant::now();
    let mut results = run_pool(&renderer, jobs, workers, config).await;
    let render_duration_ms = render_start.elapsed().as_millis() as u64;

    // Completion order is arbitrary; everything downstream goes by index.
    results.sort_by_key(|r| r.index);

    let cancelled = config.cancel_flag.is_cancelled();
    if cancelled {
        warn!("Conversion cancelled by user.");
    }

    let rendered = results.iter().filter(|r| r.is_rendered()).count();
    let failed = results.iter().filter(|r| r.error().is_some()).count();
    let skipped = total - rendered - failed;

    // ── Step 4: Merge and clean up ───────────────────────────────────────
    let mut merged_pdf = None;
    let mut merged_pages = None;
    let mut merge_duration_ms = 0;

    if let (OutputMode::Merged { output_pdf }, Some(scratch)) = (&config.mode, scratch) {
        let inputs: Vec<PathBuf> = results
            .iter()
            .filter(|r| r.is_rendered())
            .map(|r| r.output_path.clone())
            .collect();

        let merge_result = if inputs.is_empty() {
            None
        } else {
            if let Some(ref cb) = config.progress_callback {
                cb.on_merge_start(inputs.len());
            }
            info!("Merging {} PDFs into {}", inputs.len(), output_pdf.display());
            let merge_start = Instant::now();
            let result = merge::merge_pdfs(inputs, output_pdf.clone()).await;
            merge_duration_ms = merge_start.elapsed().as_millis() as u64;
            Some(result)
        };

        // Every planned path, so stragglers from a cancelled run go too.
        let removed = scratch.cleanup(results.iter().map(|r| r.output_path.as_path()));
        debug!("Removed {} temporary files", removed);

        match merge_result {
            Some(Ok(pages)) => {
                info!("Merged PDF saved as {}", output_pdf.display());
                merged_pdf = Some(output_pdf.clone());
                merged_pages = pages;
            }
            Some(Err(e)) => return Err(e),
            None => {}
        }
    }

    // ── Step 5: Outcome ──────────────────────────────────────────────────
    if rendered == 0 {
        if cancelled {
            return Err(BundleError::Cancelled {
                completed: failed,
                total,
            });
        }
        let first_error = results
            .iter()
            .find_map(UrlResult::error)
            .map(ToString::to_string)
            .unwrap_or_else(|| "Unknown error".to_string());
        return Err(BundleError::AllUrlsFailed { total, first_error });
    }

    let stats = BundleStats {
        total_urls: total,
        rendered,
        failed,
        cancelled: skipped,
        total_duration_ms: total_start.elapsed().as_millis() as u64,
        render_duration_ms,
        merge_duration_ms,
    };

    info!(
        "All conversions completed: {}/{} rendered, {} failed, {} skipped, {}ms",
        rendered, total, failed, skipped, stats.total_duration_ms
    );

    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_complete(total, rendered);
    }

    Ok(BundleOutput {
        results,
        merged_pdf,
        merged_pages,
        cancelled,
        stats,
    })
}

/// Synchronous wrapper around [`run_bundle`].
///
/// Creates a temporary tokio runtime internally.
pub fn run_bundle_sync(config: &BundleConfig) -> Result<BundleOutput, BundleError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| BundleError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(run_bundle(config))
}

/// Read the URL list without rendering anything.
///
/// Needs neither a renderer nor a valid output location.
pub fn inspect(config: &BundleConfig) -> Result<Vec<UrlEntry>, BundleError> {
    url_list::read_urls(&config.csv_path, &config.csv)
}

// ── Internal helpers ─────────────────────────────────────────────────────

/// Separate mode needs an existing directory; merged mode needs the output
/// file's parent to exist.
fn validate_output(mode: &OutputMode) -> Result<(), BundleError> {
    let dir: &Path = match mode {
        OutputMode::Separate { output_dir, .. } => output_dir,
        OutputMode::Merged { output_pdf } if output_pdf.is_dir() => {
            return Err(BundleError::InvalidOutputDir {
                path: output_pdf.clone(),
            });
        }
        OutputMode::Merged { output_pdf } => match output_pdf.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => return Ok(()),
        },
    };
    if dir.is_dir() {
        Ok(())
    } else {
        Err(BundleError::InvalidOutputDir {
            path: dir.to_path_buf(),
        })
    }
}

/// Run every job with at most `workers` renderers in flight, reporting
/// progress every `poll_interval_ms` until the last job finishes.
async fn run_pool(
    renderer: &Renderer,
    jobs: Vec<Job>,
    workers: usize,
    config: &BundleConfig,
) -> Vec<UrlResult> {
    let total = jobs.len();
    let tracker = EtaTracker::new(total);
    let counter = AtomicUsize::new(0);
    let completed = &counter;

    let pending = stream::iter(jobs.into_iter().map(move |job| async move {
        let result = render_job(renderer, job, total, config).await;
        completed.fetch_add(1, Ordering::SeqCst);
        result
    }))
    .buffer_unordered(workers);
    tokio::pin!(pending);

    let mut ticker = tokio::time::interval(Duration::from_millis(config.poll_interval_ms));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut results = Vec::with_capacity(total);
    loop {
        tokio::select! {
            next = pending.next() => match next {
                Some(result) => results.push(result),
                None => break,
            },
            _ = ticker.tick() => {
                if let Some(ref cb) = config.progress_callback {
                    cb.on_progress(&tracker.snapshot(completed.load(Ordering::SeqCst)));
                }
            }
        }
    }

    if let Some(ref cb) = config.progress_callback {
        cb.on_progress(&tracker.snapshot(results.len()));
    }

    results
}

/// Render one URL, or skip it if cancellation was requested before it started.
async fn render_job(renderer: &Renderer, job: Job, total: usize, config: &BundleConfig) -> UrlResult {
    let Job { entry, output } = job;
    let cb = config.progress_callback.as_ref();

    if config.cancel_flag.is_cancelled() {
        debug!("#{} skipped after cancellation: {}", entry.index, entry.url);
        if let Some(cb) = cb {
            cb.on_url_skipped(entry.index, total, &entry.url);
        }
        return UrlResult {
            index: entry.index,
            url: entry.url,
            output_path: output,
            status: UrlStatus::Cancelled,
            duration_ms: 0,
        };
    }

    if let Some(cb) = cb {
        cb.on_url_start(entry.index, total, &entry.url);
    }
    info!("Processing {} ...", entry.url);

    let start = Instant::now();
    let status = match renderer.render(&entry, &output).await {
        Ok(()) => {
            info!("Saved PDF for {} as {}", entry.url, output.display());
            if let Some(cb) = cb {
                cb.on_url_complete(entry.index, total, &entry.url);
            }
            UrlStatus::Rendered
        }
        Err(error) => {
            warn!("Failed to convert {}: {}", entry.url, error);
            if let Some(cb) = cb {
                cb.on_url_error(entry.index, total, &entry.url, &error.to_string());
            }
            UrlStatus::Failed { error }
        }
    };

    UrlResult {
        index: entry.index,
        url: entry.url,
        output_path: output,
        status,
        duration_ms: start.elapsed().as_millis() as u64,
    }
}
