//! # webpage2pdf-bundle
//!
//! Turn a CSV list of web page URLs into PDFs: one merged document in CSV
//! order, or one file per URL.
//!
//! Pages are rendered by an external wkhtmltopdf-compatible binary, one
//! process per URL, with a bounded number running at once. A failed URL is
//! logged and skipped; the rest of the batch carries on.
//!
//! ## Pipeline Overview
//!
//! ```text
//! CSV
//!  │
//!  ├─ 1. Read    pick one URL per row (header skip, column index)
//!  ├─ 2. Plan    a unique output path per URL, before anything runs
//!  ├─ 3. Render  ≤ N renderer processes at once, progress + ETA ticks
//!  ├─ 4. Merge   lopdf join in row order (merged mode, spawn_blocking)
//!  └─ 5. Clean   scratch files and directory removed, success or not
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use webpage2pdf_bundle::{run_bundle, BundleConfig, OutputMode};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = BundleConfig::builder()
//!         .csv_path("urls.csv")
//!         .renderer_path("wkhtmltopdf")
//!         .mode(OutputMode::merged("bundle.pdf"))
//!         .build()?;
//!     let output = run_bundle(&config).await?;
//!     eprintln!(
//!         "{}/{} pages rendered",
//!         output.stats.rendered, output.stats.total_urls
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `webpage2pdf` binary (clap + indicatif + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! webpage2pdf-bundle = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod bundle;
pub mod cancel;
pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use bundle::{inspect, run_bundle, run_bundle_sync};
pub use cancel::CancelFlag;
pub use config::{
    BundleConfig, BundleConfigBuilder, CsvOptions, Margins, NamingScheme, Orientation, OutputMode,
    PageSize, RenderOptions,
};
pub use error::{BundleError, UrlError};
pub use output::{BundleOutput, BundleStats, UrlResult, UrlStatus};
pub use pipeline::url_list::UrlEntry;
pub use progress::{
    BundleProgressCallback, EtaTracker, NoopProgressCallback, ProgressCallback, ProgressSnapshot,
};
