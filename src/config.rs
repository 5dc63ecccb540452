//! Configuration types for a bundle run.
//!
//! All run behaviour is controlled through [`BundleConfig`], built via its
//! [`BundleConfigBuilder`]. Defaults match the classic desktop tool: A4
//! portrait pages with 10 mm margins, four concurrent renderer processes,
//! a 500 ms progress poll, and a single merged output file.

use crate::cancel::CancelFlag;
use crate::error::BundleError;
use crate::pipeline::render::default_renderer_path;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Configuration for one CSV-to-PDF bundle run.
///
/// # Example
/// ```rust
/// use webpage2pdf_bundle::{BundleConfig, OutputMode};
///
/// let config = BundleConfig::builder()
///     .csv_path("urls.csv")
///     .renderer_path("/usr/bin/wkhtmltopdf")
///     .mode(OutputMode::merged("bundle.pdf"))
///     .max_workers(8)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct BundleConfig {
    /// CSV file holding the URLs.
    pub csv_path: PathBuf,

    /// How URLs are picked out of the CSV.
    pub csv: CsvOptions,

    /// Renderer executable (wkhtmltopdf or compatible). A bare program name
    /// is looked up on `PATH`.
    pub renderer_path: PathBuf,

    /// Page layout passed to the renderer for every URL.
    pub render: RenderOptions,

    /// One merged PDF, or one PDF per URL.
    pub mode: OutputMode,

    /// Maximum number of renderer processes running at once. Default: 4.
    ///
    /// Never exceeds the number of URLs in the CSV.
    pub max_workers: usize,

    /// Interval between progress/ETA reports, in milliseconds. Default: 500.
    pub poll_interval_ms: u64,

    /// Per-URL renderer timeout in seconds. Default: 120.
    ///
    /// A renderer that exceeds it is killed and the URL counts as failed.
    pub render_timeout_secs: u64,

    /// Parent directory for the merged-mode scratch directory.
    /// Defaults to the system temp directory.
    pub temp_dir: Option<PathBuf>,

    /// Optional progress callback.
    pub progress_callback: Option<ProgressCallback>,

    /// Flag polled by workers before they start; set it to stop the run.
    pub cancel_flag: CancelFlag,
}

impl Default for BundleConfig {
    fn default() -> Self {
        Self {
            csv_path: PathBuf::new(),
            csv: CsvOptions::default(),
            renderer_path: default_renderer_path(),
            render: RenderOptions::default(),
            mode: OutputMode::default(),
            max_workers: 4,
            poll_interval_ms: 500,
            render_timeout_secs: 120,
            temp_dir: None,
            progress_callback: None,
            cancel_flag: CancelFlag::new(),
        }
    }
}

impl fmt::Debug for BundleConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BundleConfig")
            .field("csv_path", &self.csv_path)
            .field("csv", &self.csv)
            .field("renderer_path", &self.renderer_path)
            .field("render", &self.render)
            .field("mode", &self.mode)
            .field("max_workers", &self.max_workers)
            .field("poll_interval_ms", &self.poll_interval_ms)
            .field("render_timeout_secs", &self.render_timeout_secs)
            .field("temp_dir", &self.temp_dir)
            .field(
                "progress_callback",
                &self
                    .progress_callback
                    .as_ref()
                    .map(|_| "<dyn BundleProgressCallback>"),
            )
            .field("cancelled", &self.cancel_flag.is_cancelled())
            .finish()
    }
}

impl BundleConfig {
    /// Create a new builder for `BundleConfig`.
    pub fn builder() -> BundleConfigBuilder {
        BundleConfigBuilder {
            config: Self::default(),
        }
    }

    /// Worker count actually used for `total` URLs.
    pub fn effective_workers(&self, total: usize) -> usize {
        self.max_workers.min(total).max(1)
    }
}

/// Builder for [`BundleConfig`].
#[derive(Debug)]
pub struct BundleConfigBuilder {
    config: BundleConfig,
}

impl BundleConfigBuilder {
    pub fn csv_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.csv_path = path.into();
        self
    }

    pub fn csv_options(mut self, options: CsvOptions) -> Self {
        self.config.csv = options;
        self
    }

    pub fn has_header(mut self, v: bool) -> Self {
        self.config.csv.has_header = v;
        self
    }

    pub fn column(mut self, column: usize) -> Self {
        self.config.csv.column = column;
        self
    }

    pub fn renderer_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.renderer_path = path.into();
        self
    }

    pub fn render_options(mut self, options: RenderOptions) -> Self {
        self.config.render = options;
        self
    }

    pub fn page_size(mut self, size: PageSize) -> Self {
        self.config.render.page_size = size;
        self
    }

    pub fn orientation(mut self, orientation: Orientation) -> Self {
        self.config.render.orientation = orientation;
        self
    }

    pub fn margins(mut self, margins: Margins) -> Self {
        self.config.render.margins = margins;
        self
    }

    pub fn mode(mut self, mode: OutputMode) -> Self {
        self.config.mode = mode;
        self
    }

    pub fn max_workers(mut self, n: usize) -> Self {
        self.config.max_workers = n.max(1);
        self
    }

    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.poll_interval_ms = ms.max(10);
        self
    }

    pub fn render_timeout_secs(mut self, secs: u64) -> Self {
        self.config.render_timeout_secs = secs;
        self
    }

    pub fn temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.temp_dir = Some(dir.into());
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    pub fn cancel_flag(mut self, flag: CancelFlag) -> Self {
        self.config.cancel_flag = flag;
        self
    }

    /// Build the configuration, validating constraints.
    ///
    /// Only static values are checked here; file-system checks happen at the
    /// start of [`crate::bundle::run_bundle`].
    pub fn build(self) -> Result<BundleConfig, BundleError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl BundleConfig {
    /// Check the static constraints [`BundleConfigBuilder::build`] enforces.
    ///
    /// Called again by [`crate::bundle::run_bundle`] since every field is public.
    pub fn validate(&self) -> Result<(), BundleError> {
        if self.csv_path.as_os_str().is_empty() {
            return Err(BundleError::InvalidConfig("CSV path is required".into()));
        }
        if self.renderer_path.as_os_str().is_empty() {
            return Err(BundleError::InvalidConfig(
                "Renderer path is required".into(),
            ));
        }
        if self.max_workers == 0 {
            return Err(BundleError::InvalidConfig("Workers must be ≥ 1".into()));
        }
        if self.render_timeout_secs == 0 {
            return Err(BundleError::InvalidConfig(
                "Render timeout must be ≥ 1 second".into(),
            ));
        }
        self.render.margins.validate()?;
        if let OutputMode::Merged { output_pdf } = &self.mode {
            if output_pdf.as_os_str().is_empty() {
                return Err(BundleError::InvalidConfig(
                    "Merged output path is required".into(),
                ));
            }
        }
        Ok(())
    }
}

// ── CSV ──────────────────────────────────────────────────────────────────

/// How URLs are read from the CSV file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CsvOptions {
    /// Skip the first record. Default: false.
    pub has_header: bool,
    /// 0-based field index holding the URL. Default: 0.
    pub column: usize,
    /// Field delimiter. Default: `,`.
    pub delimiter: u8,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            has_header: false,
            column: 0,
            delimiter: b',',
        }
    }
}

// ── Output ───────────────────────────────────────────────────────────────

/// Where rendered PDFs end up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputMode {
    /// Render into a scratch directory, then merge into `output_pdf`
    /// in CSV order.
    Merged { output_pdf: PathBuf },
    /// Write one PDF per URL into `output_dir`.
    Separate {
        output_dir: PathBuf,
        naming: NamingScheme,
    },
}

impl OutputMode {
    pub fn merged(output_pdf: impl Into<PathBuf>) -> Self {
        OutputMode::Merged {
            output_pdf: output_pdf.into(),
        }
    }

    pub fn separate(output_dir: impl Into<PathBuf>, naming: NamingScheme) -> Self {
        OutputMode::Separate {
            output_dir: output_dir.into(),
            naming,
        }
    }

    pub fn is_merged(&self) -> bool {
        matches!(self, OutputMode::Merged { .. })
    }
}

impl Default for OutputMode {
    fn default() -> Self {
        OutputMode::merged("merged_output.pdf")
    }
}

/// File naming used in [`OutputMode::Separate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NamingScheme {
    /// `page_{index}_{timestamp}.pdf` (default).
    #[default]
    Sequential,
    /// `{host}.pdf`, with `_{index}` appended on collision.
    Domain,
}

// ── Render options ───────────────────────────────────────────────────────

/// Page layout handed to the renderer.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RenderOptions {
    pub page_size: PageSize,
    pub orientation: Orientation,
    pub margins: Margins,
}

/// Paper sizes understood by wkhtmltopdf's `--page-size`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PageSize {
    A3,
    #[default]
    A4,
    A5,
    Letter,
    Legal,
    Tabloid,
}

impl PageSize {
    pub fn as_str(&self) -> &'static str {
        match self {
            PageSize::A3 => "A3",
            PageSize::A4 => "A4",
            PageSize::A5 => "A5",
            PageSize::Letter => "Letter",
            PageSize::Legal => "Legal",
            PageSize::Tabloid => "Tabloid",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Orientation {
    #[default]
    Portrait,
    Landscape,
}

impl Orientation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Orientation::Portrait => "Portrait",
            Orientation::Landscape => "Landscape",
        }
    }
}

/// Page margins in millimetres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Margins {
    pub top: f32,
    pub bottom: f32,
    pub left: f32,
    pub right: f32,
}

impl Margins {
    /// The same margin on all four sides.
    pub fn uniform(mm: f32) -> Self {
        Self {
            top: mm,
            bottom: mm,
            left: mm,
            right: mm,
        }
    }

    fn validate(&self) -> Result<(), BundleError> {
        for (side, value) in [
            ("top", self.top),
            ("bottom", self.bottom),
            ("left", self.left),
            ("right", self.right),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(BundleError::InvalidConfig(format!(
                    "Margin {side} must be a non-negative number of millimetres, got {value}"
                )));
            }
        }
        Ok(())
    }
}

impl Default for Margins {
    fn default() -> Self {
        Self::uniform(10.0)
    }
}
