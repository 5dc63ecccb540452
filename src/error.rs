//! Error types for the webpage2pdf-bundle library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`BundleError`] — **Fatal**: the run cannot proceed at all (missing CSV,
//!   renderer not found, bad output directory) or produced nothing usable.
//!   Returned as `Err(BundleError)` from [`crate::bundle::run_bundle`].
//!
//! * [`UrlError`] — **Non-fatal**: a single URL failed to render but every
//!   other URL is unaffected. Stored inside [`crate::output::UrlResult`] so
//!   callers can inspect partial success.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the webpage2pdf-bundle library.
///
/// Per-URL failures use [`UrlError`] and are recorded in
/// [`crate::output::UrlResult`] rather than propagated here.
#[derive(Debug, Error)]
pub enum BundleError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The CSV file does not exist or is not a regular file.
    #[error("CSV file not found: '{path}'\nPlease select a valid CSV file.")]
    CsvNotFound { path: PathBuf },

    /// The CSV file exists but could not be read or parsed.
    #[error("Error reading CSV file '{path}': {detail}")]
    CsvRead { path: PathBuf, detail: String },

    /// The CSV file was readable but yielded no URLs.
    #[error("No URLs found in CSV file '{path}'")]
    NoUrls { path: PathBuf },

    // ── Renderer errors ───────────────────────────────────────────────────
    /// The renderer executable could not be located.
    #[error(
        "Renderer executable not found: '{path}'\n\
Install wkhtmltopdf or pass its location with --renderer <PATH>."
    )]
    RendererNotFound { path: PathBuf },

    // ── Output errors ─────────────────────────────────────────────────────
    /// The output directory does not exist or is not a directory.
    #[error("Output directory is invalid: '{path}'")]
    InvalidOutputDir { path: PathBuf },

    /// Could not create the temporary working directory or write an output.
    #[error("Failed to write '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Merging the rendered PDFs into one document failed.
    #[error("Error merging PDFs into '{output}': {detail}")]
    MergeFailed { output: PathBuf, detail: String },

    // ── Batch outcome errors ──────────────────────────────────────────────
    /// Every URL failed; nothing was produced.
    #[error("All {total} URLs failed to convert.\nFirst error: {first_error}")]
    AllUrlsFailed { total: usize, first_error: String },

    /// The run was cancelled before any URL was converted.
    #[error("Conversion cancelled after {completed}/{total} URLs; no PDF was produced")]
    Cancelled { completed: usize, total: usize },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single URL.
///
/// The batch continues with the remaining URLs. Nothing is retried.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UrlError {
    /// The renderer process could not be started.
    #[error("#{index} {url}: could not start renderer: {detail}")]
    SpawnFailed {
        index: usize,
        url: String,
        detail: String,
    },

    /// The renderer exited unsuccessfully.
    #[error("#{index} {url}: renderer exited with {}: {stderr}", exit_label(*code))]
    RendererFailed {
        index: usize,
        url: String,
        code: Option<i32>,
        stderr: String,
    },

    /// The renderer did not finish within the per-URL timeout and was killed.
    #[error("#{index} {url}: renderer timed out after {secs}s")]
    Timeout { index: usize, url: String, secs: u64 },

    /// The renderer reported success but wrote no file.
    #[error("#{index} {url}: renderer produced no output at '{}'", path.display())]
    MissingOutput {
        index: usize,
        url: String,
        path: PathBuf,
    },
}

impl UrlError {
    /// 1-based index of the URL this error belongs to.
    pub fn index(&self) -> usize {
        match self {
            UrlError::SpawnFailed { index, .. }
            | UrlError::RendererFailed { index, .. }
            | UrlError::Timeout { index, .. }
            | UrlError::MissingOutput { index, .. } => *index,
        }
    }
}

fn exit_label(code: Option<i32>) -> String {
    match code {
        Some(c) => format!("exit code {c}"),
        None => "a signal".to_string(),
    }
}
