//! End-to-end tests for webpage2pdf-bundle.
//!
//! A shell script stands in for wkhtmltopdf: it takes the same arguments,
//! records every URL it is asked to render, and copies a prepared PDF whose
//! MediaBox width identifies the URL. Unix only.

#![cfg(unix)]

use lopdf::{dictionary, Document, Object, Stream};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use webpage2pdf_bundle::{
    run_bundle, BundleConfig, BundleConfigBuilder, BundleError, BundleProgressCallback,
    CancelFlag, NamingScheme, OutputMode, ProgressSnapshot, UrlError, UrlStatus,
};

// ── Test helpers ─────────────────────────────────────────────────────────────

/// Fixture names and the MediaBox width each one carries.
const FIXTURES: &[(&str, i64)] = &[
    ("p1", 101),
    ("p2", 102),
    ("p3", 103),
    ("slow1", 201),
    ("hang", 999),
];

struct Workspace {
    root: tempfile::TempDir,
}

/// Library logs go to the test output; filter with `RUST_LOG`.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

impl Workspace {
    fn new() -> Self {
        init_tracing();
        let ws = Self {
            root: tempfile::tempdir().unwrap(),
        };
        std::fs::create_dir(ws.fixtures()).unwrap();
        std::fs::create_dir(ws.scratch_base()).unwrap();
        std::fs::create_dir(ws.out_dir()).unwrap();
        for (name, width) in FIXTURES {
            write_pdf(&ws.fixtures().join(format!("{name}.pdf")), *width);
        }
        ws.write_renderer();
        ws
    }

    fn path(&self) -> &Path {
        self.root.path()
    }

    fn fixtures(&self) -> PathBuf {
        self.path().join("fixtures")
    }

    fn scratch_base(&self) -> PathBuf {
        self.path().join("scratch")
    }

    fn out_dir(&self) -> PathBuf {
        self.path().join("out")
    }

    fn calls_file(&self) -> PathBuf {
        self.path().join("calls.txt")
    }

    fn renderer(&self) -> PathBuf {
        self.path().join("fake-wkhtmltopdf")
    }

    fn write_renderer(&self) {
        let script = format!(
            r#"#!/bin/sh
while [ "$#" -gt 2 ]; do shift; done
url="$1"
out="$2"
echo "$url" >> "{calls}"
case "$url" in
  *fail*) echo "simulated failure for $url" >&2; exit 1 ;;
esac
name=$(basename "$url")
case "$name" in
  slow*) sleep 0.4 ;;
  hang*) sleep 5 ;;
  garbage*) echo "not a pdf" > "$out"; exit 0 ;;
esac
cp "{fixtures}/$name.pdf" "$out"
"#,
            calls = self.calls_file().display(),
            fixtures = self.fixtures().display(),
        );
        let path = self.renderer();
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    fn write_csv(&self, body: &str) -> PathBuf {
        let path = self.path().join("urls.csv");
        std::fs::write(&path, body).unwrap();
        path
    }

    fn builder(&self, csv_body: &str) -> BundleConfigBuilder {
        BundleConfig::builder()
            .csv_path(self.write_csv(csv_body))
            .renderer_path(self.renderer())
            .temp_dir(self.scratch_base())
            .poll_interval_ms(20)
            .mode(OutputMode::merged(self.merged_pdf()))
    }

    fn merged_pdf(&self) -> PathBuf {
        self.path().join("merged.pdf")
    }

    /// URLs the fake renderer was invoked with, sorted.
    fn calls(&self) -> Vec<String> {
        let mut calls: Vec<String> = std::fs::read_to_string(self.calls_file())
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect();
        calls.sort();
        calls
    }

    fn scratch_is_empty(&self) -> bool {
        std::fs::read_dir(self.scratch_base()).unwrap().next().is_none()
    }
}

fn write_pdf(path: &Path, width: i64) {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let content_id = doc.add_object(Stream::new(dictionary! {}, b"q Q".to_vec()));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
        "MediaBox" => vec![
            Object::Integer(0),
            Object::Integer(0),
            Object::Integer(width),
            Object::Integer(842),
        ],
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![Object::Reference(page_id)],
            "Count" => 1,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.save(path).unwrap();
}

fn page_widths(path: &Path) -> Vec<i64> {
    let doc = Document::load(path).unwrap();
    doc.get_pages()
        .into_values()
        .map(|id| {
            let page = doc.get_dictionary(id).unwrap();
            page.get(b"MediaBox").unwrap().as_array().unwrap()[2]
                .as_i64()
                .unwrap()
        })
        .collect()
}

#[derive(Default)]
struct CountingCallback {
    batch_total: AtomicUsize,
    starts: AtomicUsize,
    completes: AtomicUsize,
    errors: AtomicUsize,
    ticks: AtomicUsize,
    merges: AtomicUsize,
    finished: AtomicUsize,
}

impl BundleProgressCallback for CountingCallback {
    fn on_batch_start(&self, total: usize) {
        self.batch_total.store(total, Ordering::SeqCst);
    }
    fn on_url_start(&self, _index: usize, _total: usize, _url: &str) {
        self.starts.fetch_add(1, Ordering::SeqCst);
    }
    fn on_url_complete(&self, _index: usize, _total: usize, _url: &str) {
        self.completes.fetch_add(1, Ordering::SeqCst);
    }
    fn on_url_error(&self, _index: usize, _total: usize, _url: &str, _error: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);
    }
    fn on_progress(&self, _snapshot: &ProgressSnapshot) {
        self.ticks.fetch_add(1, Ordering::SeqCst);
    }
    fn on_merge_start(&self, _inputs: usize) {
        self.merges.fetch_add(1, Ordering::SeqCst);
    }
    fn on_batch_complete(&self, _total: usize, rendered: usize) {
        self.finished.store(rendered, Ordering::SeqCst);
    }
}

/// Requests cancellation as soon as the first URL finishes.
struct CancelAfterFirst {
    flag: CancelFlag,
}

impl BundleProgressCallback for CancelAfterFirst {
    fn on_url_complete(&self, _index: usize, _total: usize, _url: &str) {
        self.flag.cancel();
    }
}

// ── Merged mode ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn merged_pages_follow_csv_order_not_completion_order() {
    let ws = Workspace::new();
    let cb = Arc::new(CountingCallback::default());
    // slow1 finishes last but is row 1.
    let config = ws
        .builder("https://site.example/slow1\nhttps://site.example/p2\nhttps://site.example/p3\n")
        .max_workers(3)
        .progress_callback(cb.clone())
        .build()
        .unwrap();

    let output = run_bundle(&config).await.unwrap();

    assert_eq!(page_widths(&ws.merged_pdf()), vec![201, 102, 103]);
    assert_eq!(output.merged_pdf.as_deref(), Some(ws.merged_pdf().as_path()));
    assert_eq!(output.merged_pages, Some(3));
    assert_eq!(output.stats.rendered, 3);
    assert!(!output.cancelled);
    assert_eq!(
        output.results.iter().map(|r| r.index).collect::<Vec<_>>(),
        vec![1, 2, 3]
    );
    assert!(ws.scratch_is_empty(), "scratch files left behind");

    assert_eq!(cb.batch_total.load(Ordering::SeqCst), 3);
    assert_eq!(cb.starts.load(Ordering::SeqCst), 3);
    assert_eq!(cb.completes.load(Ordering::SeqCst), 3);
    assert_eq!(cb.merges.load(Ordering::SeqCst), 1);
    assert_eq!(cb.finished.load(Ordering::SeqCst), 3);
    assert!(cb.ticks.load(Ordering::SeqCst) >= 1);
}

#[tokio::test]
async fn failed_url_does_not_abort_the_batch() {
    let ws = Workspace::new();
    let cb = Arc::new(CountingCallback::default());
    let config = ws
        .builder("https://site.example/p1\nhttps://site.example/fail\nhttps://site.example/p3\n")
        .max_workers(2)
        .progress_callback(cb.clone())
        .build()
        .unwrap();

    let output = run_bundle(&config).await.unwrap();

    assert_eq!(page_widths(&ws.merged_pdf()), vec![101, 103]);
    assert_eq!(output.stats.rendered, 2);
    assert_eq!(output.stats.failed, 1);
    assert_eq!(ws.calls().len(), 3);
    assert_eq!(cb.errors.load(Ordering::SeqCst), 1);

    match output.results[1].error() {
        Some(UrlError::RendererFailed { index, code, stderr, .. }) => {
            assert_eq!(*index, 2);
            assert_eq!(*code, Some(1));
            assert!(stderr.contains("simulated failure"), "stderr: {stderr}");
        }
        other => panic!("expected RendererFailed, got {other:?}"),
    }
    assert!(ws.scratch_is_empty());
}

#[tokio::test]
async fn single_success_is_copied_to_output() {
    let ws = Workspace::new();
    let config = ws
        .builder("https://site.example/p2\nhttps://site.example/fail\n")
        .build()
        .unwrap();

    let output = run_bundle(&config).await.unwrap();

    assert_eq!(output.merged_pages, None);
    assert_eq!(
        std::fs::read(ws.merged_pdf()).unwrap(),
        std::fs::read(ws.fixtures().join("p2.pdf")).unwrap()
    );
}

#[tokio::test]
async fn all_failures_produce_no_output() {
    let ws = Workspace::new();
    let config = ws
        .builder("https://site.example/fail1\nhttps://site.example/fail2\n")
        .build()
        .unwrap();

    let err = run_bundle(&config).await.unwrap_err();

    match err {
        BundleError::AllUrlsFailed { total, first_error } => {
            assert_eq!(total, 2);
            assert!(first_error.contains("#1"), "first error: {first_error}");
        }
        other => panic!("expected AllUrlsFailed, got {other}"),
    }
    assert!(!ws.merged_pdf().exists());
    assert!(ws.scratch_is_empty());
}

#[tokio::test]
async fn renderer_past_timeout_is_killed_and_recorded() {
    let ws = Workspace::new();
    let config = ws
        .builder("https://site.example/p1\nhttps://site.example/hang\n")
        .render_timeout_secs(1)
        .build()
        .unwrap();

    let output = run_bundle(&config).await.unwrap();

    assert!(matches!(
        output.results[1].error(),
        Some(UrlError::Timeout { index: 2, secs: 1, .. })
    ));
    assert_eq!(page_widths(&ws.merged_pdf()), vec![101]);
    assert!(ws.scratch_is_empty());
}

#[tokio::test]
async fn unreadable_renderer_output_is_merge_failed_and_scratch_removed() {
    let ws = Workspace::new();
    let config = ws
        .builder("https://site.example/garbage1\nhttps://site.example/garbage2\n")
        .build()
        .unwrap();

    let err = run_bundle(&config).await.unwrap_err();

    assert!(matches!(err, BundleError::MergeFailed { .. }), "got: {err}");
    assert_eq!(ws.calls().len(), 2);
    assert!(!ws.merged_pdf().exists());
    assert!(ws.scratch_is_empty());
}

// ── Cancellation ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn cancelled_before_start_runs_no_renderer() {
    let ws = Workspace::new();
    let flag = CancelFlag::new();
    flag.cancel();
    let config = ws
        .builder("https://site.example/p1\nhttps://site.example/p2\n")
        .cancel_flag(flag)
        .build()
        .unwrap();

    let err = run_bundle(&config).await.unwrap_err();

    assert!(
        matches!(err, BundleError::Cancelled { completed: 0, total: 2 }),
        "got: {err}"
    );
    assert!(ws.calls().is_empty());
    assert!(!ws.merged_pdf().exists());
    assert!(ws.scratch_is_empty());
}

#[tokio::test]
async fn cancelling_mid_run_skips_unstarted_urls_and_merges_the_rest() {
    let ws = Workspace::new();
    let flag = CancelFlag::new();
    let config = ws
        .builder("https://site.example/p1\nhttps://site.example/p2\nhttps://site.example/p3\n")
        .max_workers(1)
        .cancel_flag(flag.clone())
        .progress_callback(Arc::new(CancelAfterFirst { flag }))
        .build()
        .unwrap();

    let output = run_bundle(&config).await.unwrap();

    assert!(output.cancelled);
    assert_eq!(output.stats.rendered, 1);
    assert_eq!(output.stats.cancelled, 2);
    assert_eq!(ws.calls(), vec!["https://site.example/p1"]);
    assert!(matches!(output.results[2].status, UrlStatus::Cancelled));
    assert_eq!(page_widths(&ws.merged_pdf()), vec![101]);
    assert!(ws.scratch_is_empty());
}

// ── Separate mode ────────────────────────────────────────────────────────────

#[tokio::test]
async fn separate_mode_domain_names_deduplicate() {
    let ws = Workspace::new();
    let config = ws
        .builder("https://a.example/p1\nhttps://www.a.example/p2\nhttps://b.example/p3\n")
        .mode(OutputMode::separate(ws.out_dir(), NamingScheme::Domain))
        .build()
        .unwrap();

    let output = run_bundle(&config).await.unwrap();

    let names: Vec<String> = output
        .rendered_paths()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["a.example.pdf", "a.example_2.pdf", "b.example.pdf"]);
    assert_eq!(page_widths(&ws.out_dir().join("a.example_2.pdf")), vec![102]);
    assert!(output.merged_pdf.is_none());
    assert!(!ws.merged_pdf().exists());
}

#[tokio::test]
async fn separate_mode_sequential_names_carry_row_index() {
    let ws = Workspace::new();
    let config = ws
        .builder("https://site.example/p1\nhttps://site.example/p2\n")
        .mode(OutputMode::separate(ws.out_dir(), NamingScheme::Sequential))
        .build()
        .unwrap();

    let output = run_bundle(&config).await.unwrap();

    let names: Vec<String> = output
        .rendered_paths()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names.len(), 2);
    assert!(names[0].starts_with("page_1_") && names[0].ends_with(".pdf"));
    assert!(names[1].starts_with("page_2_") && names[1].ends_with(".pdf"));
    assert_eq!(std::fs::read_dir(ws.out_dir()).unwrap().count(), 2);
}

// ── CSV handling & validation ────────────────────────────────────────────────

#[tokio::test]
async fn header_and_column_select_one_call_per_row() {
    let ws = Workspace::new();
    let config = ws
        .builder("name,url\nOne,https://site.example/p1\n\nTwo,https://site.example/p2\n")
        .has_header(true)
        .column(1)
        .build()
        .unwrap();

    let output = run_bundle(&config).await.unwrap();

    assert_eq!(
        ws.calls(),
        vec!["https://site.example/p1", "https://site.example/p2"]
    );
    assert_eq!(output.stats.total_urls, 2);
}

#[tokio::test]
async fn validation_failure_starts_no_renderer() {
    let ws = Workspace::new();
    let config = ws
        .builder("https://site.example/p1\n")
        .mode(OutputMode::separate(
            ws.path().join("does-not-exist"),
            NamingScheme::Sequential,
        ))
        .build()
        .unwrap();

    let err = run_bundle(&config).await.unwrap_err();

    assert!(matches!(err, BundleError::InvalidOutputDir { .. }), "got: {err}");
    assert!(ws.calls().is_empty());
}

#[tokio::test]
async fn merged_output_pointing_at_directory_starts_no_renderer() {
    let ws = Workspace::new();
    let config = ws
        .builder("https://site.example/p1\nhttps://site.example/p2\n")
        .mode(OutputMode::merged(ws.out_dir()))
        .build()
        .unwrap();

    let err = run_bundle(&config).await.unwrap_err();

    assert!(matches!(err, BundleError::InvalidOutputDir { .. }), "got: {err}");
    assert!(ws.calls().is_empty());
}
