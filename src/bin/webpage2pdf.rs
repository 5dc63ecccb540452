//! CLI binary for webpage2pdf-bundle.
//!
//! A thin shim over the library crate that maps CLI flags to `BundleConfig`,
//! wires Ctrl-C to the cancellation flag, and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{warn, Event, Subscriber};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};
use webpage2pdf_bundle::{
    inspect, run_bundle, BundleConfig, BundleOutput, BundleProgressCallback, CancelFlag,
    CsvOptions, Margins, NamingScheme, Orientation, OutputMode, PageSize, ProgressCallback,
    ProgressSnapshot,
};

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const SPINNER: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a live bar plus one log line per URL.
/// URLs finish out of order, so lines carry the row index.
struct CliProgressCallback {
    /// The single progress bar anchored at the bottom of the terminal.
    bar: ProgressBar,
    /// Per-URL wall-clock start times, keyed by row index.
    start_times: Mutex<HashMap<usize, Instant>>,
    /// Count of URLs that failed.
    errors: AtomicUsize,
}

impl CliProgressCallback {
    /// Spinner until `on_batch_start` tells us how many URLs there are.
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(SPINNER);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Reading CSV…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            errors: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} URLs  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(SPINNER);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Converting");
        self.bar.set_message("ETA Calculating...");
    }

    fn elapsed_label(&self, index: usize) -> String {
        let elapsed_ms = self
            .start_times
            .lock()
            .unwrap()
            .remove(&index)
            .map(|t| t.elapsed().as_millis())
            .unwrap_or(0);
        dim(&format!("{:.1}s", elapsed_ms as f64 / 1000.0))
    }

    /// Drop the bar without a summary; used when the run returns an error.
    fn abandon(&self) {
        self.bar.finish_and_clear();
    }
}

impl BundleProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total: usize) {
        self.activate_bar(total);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Found {total} URLs."))
        ));
    }

    fn on_url_start(&self, index: usize, _total: usize, _url: &str) {
        self.start_times
            .lock()
            .unwrap()
            .insert(index, Instant::now());
    }

    fn on_url_complete(&self, index: usize, total: usize, url: &str) {
        let elapsed = self.elapsed_label(index);
        self.bar.println(format!(
            "  {} #{:>3}/{:<3}  {}  {}",
            green("✓"),
            index,
            total,
            url,
            elapsed,
        ));
        self.bar.inc(1);
    }

    fn on_url_error(&self, index: usize, total: usize, url: &str, error: &str) {
        let elapsed = self.elapsed_label(index);
        self.errors.fetch_add(1, Ordering::SeqCst);

        let msg = if error.chars().count() > 80 {
            let cut: String = error.chars().take(79).collect();
            format!("{cut}\u{2026}")
        } else {
            error.to_string()
        };

        self.bar.println(format!(
            "  {} #{:>3}/{:<3}  {}  {}  {}",
            red("✗"),
            index,
            total,
            url,
            red(&msg),
            elapsed,
        ));
        self.bar.inc(1);
    }

    fn on_url_skipped(&self, index: usize, total: usize, url: &str) {
        self.bar.println(format!(
            "  {} #{:>3}/{:<3}  {}",
            dim("–"),
            index,
            total,
            dim(&format!("{url} (cancelled)")),
        ));
        self.bar.inc(1);
    }

    fn on_progress(&self, snapshot: &ProgressSnapshot) {
        self.bar.set_message(format!("ETA {}", snapshot.eta_label()));
    }

    fn on_merge_start(&self, inputs: usize) {
        self.bar.set_prefix("Merging");
        self.bar.set_message(format!("{inputs} PDFs…"));
    }

    fn on_batch_complete(&self, total: usize, rendered: usize) {
        let failed = self.errors.load(Ordering::SeqCst);
        self.bar.finish_and_clear();

        if rendered == total {
            eprintln!(
                "{} {} URLs converted successfully",
                green("✔"),
                bold(&rendered.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} URLs converted  ({} failed)",
                cyan("⚠"),
                bold(&rendered.to_string()),
                total,
                red(&failed.to_string()),
            );
        }
    }
}

// ── Log file format ──────────────────────────────────────────────────────────

/// `YYYY-MM-DD HH:MM:SS - LEVEL - message`, one event per line.
struct LogLineFormat;

impl<S, N> FormatEvent<S, N> for LogLineFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        write!(
            writer,
            "{} - {} - ",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
            event.metadata().level()
        )?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Merge every URL in urls.csv into merged_output.pdf
  webpage2pdf urls.csv

  # Merge into a named file, 8 renderers at once
  webpage2pdf urls.csv -o bundle.pdf -j 8

  # One PDF per URL, named after the host
  webpage2pdf urls.csv --mode separate --output-dir pdfs --naming domain

  # CSV with a header row, URLs in the second column
  webpage2pdf sites.csv --header --column 1

  # Landscape Letter pages with narrow margins
  webpage2pdf urls.csv --page-size letter --orientation landscape \
      --margin-left 5 --margin-right 5

  # Show which URLs would be converted
  webpage2pdf --list urls.csv

  # Machine-readable result
  webpage2pdf --json urls.csv > result.json

RENDERER:
  Any wkhtmltopdf-compatible binary. Default location:
    Linux/macOS  /usr/local/bin/wkhtmltopdf (falls back to wkhtmltopdf on PATH)
    Windows      C:\Program Files\wkhtmltopdf\bin\wkhtmltopdf.exe

CANCELLING:
  Ctrl-C stops URLs that have not started yet. Renderers already running are
  allowed to finish, and whatever finished is still merged. Press Ctrl-C a
  second time to exit immediately. That hard exit does not stop renderers
  already running and leaves the scratch directory (webpage2pdf-* under
  --temp-dir or the system temp dir) behind for you to delete.

ENVIRONMENT VARIABLES:
  Every flag reads WEBPAGE2PDF_<FLAG> (e.g. WEBPAGE2PDF_JOBS=8).
  RUST_LOG overrides the terminal log filter.
"#;

/// Convert a CSV list of web pages to PDF and bundle them.
#[derive(Parser, Debug)]
#[command(
    name = "webpage2pdf",
    version,
    about = "Convert a CSV list of web pages to PDFs and merge them into one document",
    long_about = "Reads URLs from a CSV file, renders each page to PDF with wkhtmltopdf (or a \
compatible renderer) using a bounded pool of concurrent processes, and either merges the \
results in CSV order or keeps one PDF per URL.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// CSV file with one URL per row.
    csv: PathBuf,

    /// Renderer executable (default: platform wkhtmltopdf location).
    #[arg(long, env = "WEBPAGE2PDF_RENDERER")]
    renderer: Option<PathBuf>,

    /// Output mode: one merged PDF, or one PDF per URL.
    #[arg(long, env = "WEBPAGE2PDF_MODE", value_enum, default_value = "merged")]
    mode: ModeArg,

    /// Merged PDF path (merged mode).
    #[arg(
        short,
        long,
        env = "WEBPAGE2PDF_OUTPUT",
        default_value = "merged_output.pdf"
    )]
    output: PathBuf,

    /// Directory for per-URL PDFs (separate mode). Must exist.
    #[arg(long, env = "WEBPAGE2PDF_OUTPUT_DIR", default_value = ".")]
    output_dir: PathBuf,

    /// File naming in separate mode.
    #[arg(
        long,
        env = "WEBPAGE2PDF_NAMING",
        value_enum,
        default_value = "sequential"
    )]
    naming: NamingArg,

    /// Paper size.
    #[arg(
        long,
        env = "WEBPAGE2PDF_PAGE_SIZE",
        value_enum,
        ignore_case = true,
        default_value = "a4"
    )]
    page_size: PageSizeArg,

    /// Page orientation.
    #[arg(
        long,
        env = "WEBPAGE2PDF_ORIENTATION",
        value_enum,
        ignore_case = true,
        default_value = "portrait"
    )]
    orientation: OrientationArg,

    /// Top margin in millimetres.
    #[arg(long, env = "WEBPAGE2PDF_MARGIN_TOP", default_value_t = 10.0)]
    margin_top: f32,

    /// Bottom margin in millimetres.
    #[arg(long, env = "WEBPAGE2PDF_MARGIN_BOTTOM", default_value_t = 10.0)]
    margin_bottom: f32,

    /// Left margin in millimetres.
    #[arg(long, env = "WEBPAGE2PDF_MARGIN_LEFT", default_value_t = 10.0)]
    margin_left: f32,

    /// Right margin in millimetres.
    #[arg(long, env = "WEBPAGE2PDF_MARGIN_RIGHT", default_value_t = 10.0)]
    margin_right: f32,

    /// The first CSV row is a header, not a URL.
    #[arg(long, env = "WEBPAGE2PDF_HEADER")]
    header: bool,

    /// 0-based CSV column holding the URL.
    #[arg(long, env = "WEBPAGE2PDF_COLUMN", default_value_t = 0)]
    column: usize,

    /// CSV field delimiter (single ASCII character).
    #[arg(long, env = "WEBPAGE2PDF_DELIMITER", default_value_t = ',')]
    delimiter: char,

    /// Maximum number of renderer processes at once.
    #[arg(short, long, env = "WEBPAGE2PDF_JOBS", default_value_t = 4)]
    jobs: usize,

    /// Per-URL renderer timeout in seconds.
    #[arg(long, env = "WEBPAGE2PDF_TIMEOUT", default_value_t = 120)]
    timeout: u64,

    /// Progress/ETA refresh interval in milliseconds.
    #[arg(long, env = "WEBPAGE2PDF_POLL_INTERVAL_MS", default_value_t = 500)]
    poll_interval_ms: u64,

    /// Parent directory for merged-mode scratch files.
    #[arg(long, env = "WEBPAGE2PDF_TEMP_DIR")]
    temp_dir: Option<PathBuf>,

    /// Append-only run log.
    #[arg(
        long,
        env = "WEBPAGE2PDF_LOG_FILE",
        default_value = "conversion.log",
        conflicts_with = "no_log_file"
    )]
    log_file: PathBuf,

    /// Do not write the run log.
    #[arg(long, env = "WEBPAGE2PDF_NO_LOG_FILE")]
    no_log_file: bool,

    /// Output structured JSON (BundleOutput) on stdout.
    #[arg(long, env = "WEBPAGE2PDF_JSON")]
    json: bool,

    /// Print the URLs that would be converted, then exit.
    #[arg(long)]
    list: bool,

    /// Disable progress bar.
    #[arg(long, env = "WEBPAGE2PDF_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "WEBPAGE2PDF_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "WEBPAGE2PDF_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum ModeArg {
    Merged,
    Separate,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum NamingArg {
    Sequential,
    Domain,
}

impl From<NamingArg> for NamingScheme {
    fn from(v: NamingArg) -> Self {
        match v {
            NamingArg::Sequential => NamingScheme::Sequential,
            NamingArg::Domain => NamingScheme::Domain,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum PageSizeArg {
    A3,
    A4,
    A5,
    Letter,
    Legal,
    Tabloid,
}

impl From<PageSizeArg> for PageSize {
    fn from(v: PageSizeArg) -> Self {
        match v {
            PageSizeArg::A3 => PageSize::A3,
            PageSizeArg::A4 => PageSize::A4,
            PageSizeArg::A5 => PageSize::A5,
            PageSizeArg::Letter => PageSize::Letter,
            PageSizeArg::Legal => PageSize::Legal,
            PageSizeArg::Tabloid => PageSize::Tabloid,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum OrientationArg {
    Portrait,
    Landscape,
}

impl From<OrientationArg> for Orientation {
    fn from(v: OrientationArg) -> Self {
        match v {
            OrientationArg::Portrait => Orientation::Portrait,
            OrientationArg::Landscape => Orientation::Landscape,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // The progress bar owns the terminal while it is visible, so library
    // INFO lines only go to stderr without it.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.list;
    init_logging(&cli, show_progress)?;

    let cancel = CancelFlag::new();
    let progress = if show_progress {
        Some(CliProgressCallback::new_dynamic())
    } else {
        None
    };
    let config = build_config(
        &cli,
        progress.clone().map(|cb| cb as ProgressCallback),
        cancel.clone(),
    )?;

    // ── List-only mode ───────────────────────────────────────────────────
    if cli.list {
        let entries = inspect(&config).context("Failed to read URL list")?;
        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&entries).context("Failed to serialise URL list")?
            );
        } else {
            for entry in &entries {
                println!(
                    "{:>4}  {}  {}",
                    entry.index,
                    dim(&format!("line {:<4}", entry.line)),
                    entry.url
                );
            }
            if !cli.quiet {
                eprintln!("{} URLs", entries.len());
            }
        }
        return Ok(());
    }

    spawn_ctrl_c_handler(cancel, scratch_base(&cli));

    // ── Run ──────────────────────────────────────────────────────────────
    let output = match run_bundle(&config).await {
        Ok(output) => output,
        Err(e) => {
            if let Some(ref cb) = progress {
                cb.abandon();
            }
            return Err(e).context("Conversion failed");
        }
    };

    if cli.json {
        let json = serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
        println!("{json}");
    } else if !cli.quiet {
        print_summary(&output, show_progress);
    }

    Ok(())
}

/// Terminal layer filtered by `RUST_LOG` or the verbosity flags, plus the
/// append-only log file at INFO.
fn init_logging(cli: &Cli, show_progress: bool) -> Result<()> {
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stderr)
        .with_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)));

    let file_layer = if cli.no_log_file {
        None
    } else {
        let file: File = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&cli.log_file)
            .with_context(|| format!("Failed to open log file {:?}", cli.log_file))?;
        Some(
            tracing_subscriber::fmt::layer()
                .event_format(LogLineFormat)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .with_filter(LevelFilter::INFO),
        )
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .init();
    Ok(())
}

/// First Ctrl-C requests cancellation; a second one exits immediately.
fn spawn_ctrl_c_handler(cancel: CancelFlag, scratch_base: PathBuf) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        cancel.cancel();
        warn!("Cancellation requested; waiting for running renderers to finish");
        eprintln!(
            "{} Cancelling… running renderers will finish (Ctrl-C again to exit now)",
            cyan("⚠")
        );
        if tokio::signal::ctrl_c().await.is_ok() {
            let notice = hard_exit_notice(&scratch_base);
            warn!("{notice}");
            eprintln!("{} {notice}", red("✗"));
            std::process::exit(130);
        }
    });
}

/// Where merged-mode scratch directories are created.
fn scratch_base(cli: &Cli) -> PathBuf {
    cli.temp_dir.clone().unwrap_or_else(std::env::temp_dir)
}

/// Exiting skips scratch cleanup, so say what is left behind.
fn hard_exit_notice(scratch_base: &Path) -> String {
    format!(
        "Exiting now; running renderers are not stopped and temporary files \
         may remain in {}",
        scratch_base.join("webpage2pdf-*").display()
    )
}

/// Map CLI args to `BundleConfig`.
fn build_config(
    cli: &Cli,
    progress: Option<ProgressCallback>,
    cancel: CancelFlag,
) -> Result<BundleConfig> {
    if !cli.delimiter.is_ascii() {
        anyhow::bail!(
            "CSV delimiter must be a single ASCII character, got {:?}",
            cli.delimiter
        );
    }

    let mode = match cli.mode {
        ModeArg::Merged => OutputMode::merged(&cli.output),
        ModeArg::Separate => OutputMode::separate(&cli.output_dir, cli.naming.into()),
    };

    let mut builder = BundleConfig::builder()
        .csv_path(&cli.csv)
        .csv_options(CsvOptions {
            has_header: cli.header,
            column: cli.column,
            delimiter: cli.delimiter as u8,
        })
        .page_size(cli.page_size.into())
        .orientation(cli.orientation.into())
        .margins(Margins {
            top: cli.margin_top,
            bottom: cli.margin_bottom,
            left: cli.margin_left,
            right: cli.margin_right,
        })
        .mode(mode)
        .max_workers(cli.jobs)
        .render_timeout_secs(cli.timeout)
        .poll_interval_ms(cli.poll_interval_ms)
        .cancel_flag(cancel);

    if let Some(ref renderer) = cli.renderer {
        builder = builder.renderer_path(renderer);
    }
    if let Some(ref dir) = cli.temp_dir {
        builder = builder.temp_dir(dir);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

fn print_summary(output: &BundleOutput, show_progress: bool) {
    let stats = &output.stats;

    // Without the bar nobody has listed the failures yet.
    if !show_progress {
        eprintln!(
            "Converted {}/{} URLs in {}ms",
            stats.rendered, stats.total_urls, stats.total_duration_ms
        );
        for error in output.failures() {
            eprintln!("  {} {}", red("✗"), error);
        }
    }

    if output.cancelled {
        eprintln!(
            "{} Cancelled: {} URLs were never started",
            cyan("⚠"),
            stats.cancelled
        );
    }

    match output.merged_pdf {
        Some(ref path) => {
            let pages = output
                .merged_pages
                .map(|p| format!("  {p} pages"))
                .unwrap_or_default();
            eprintln!(
                "{}  {} PDFs merged{}  →  {}",
                if stats.failed == 0 && !output.cancelled {
                    green("✔")
                } else {
                    cyan("⚠")
                },
                stats.rendered,
                pages,
                bold(&path.display().to_string()),
            );
        }
        None => {
            for path in output.rendered_paths() {
                eprintln!("  {}", dim(&path.display().to_string()));
            }
            eprintln!(
                "{}  {} PDFs written",
                if stats.failed == 0 && !output.cancelled {
                    green("✔")
                } else {
                    cyan("⚠")
                },
                stats.rendered,
            );
        }
    }
}
