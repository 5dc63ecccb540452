//! Page rendering: one external renderer process per URL.
//!
//! The renderer is any wkhtmltopdf-compatible binary. It is launched with a
//! fixed set of layout flags followed by the URL and the output path:
//!
//! ```text
//! wkhtmltopdf --quiet --page-size A4 --orientation Portrait \
//!     --margin-top 10mm --margin-bottom 10mm --margin-left 10mm --margin-right 10mm \
//!     <url> <output.pdf>
//! ```
//!
//! The process is awaited through `tokio::process` so a worker occupies no
//! runtime thread while the page loads. Processes that outlive the per-URL
//! timeout are killed.

use crate::config::RenderOptions;
use crate::error::{BundleError, UrlError};
use crate::pipeline::url_list::UrlEntry;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

/// Longest stderr excerpt kept in a [`UrlError::RendererFailed`].
const MAX_STDERR_CHARS: usize = 500;

/// Platform default install location of wkhtmltopdf.
pub fn default_renderer_path() -> PathBuf {
    if cfg!(windows) {
        PathBuf::from(r"C:\Program Files\wkhtmltopdf\bin\wkhtmltopdf.exe")
    } else {
        PathBuf::from("/usr/local/bin/wkhtmltopdf")
    }
}

/// Resolve the configured renderer to an executable file.
///
/// An existing file is accepted as-is. A bare program name (no directory
/// component) is searched on `PATH`, which also lets the platform default
/// fall back to a `wkhtmltopdf` installed elsewhere.
pub fn resolve_renderer(configured: &Path) -> Result<PathBuf, BundleError> {
    if configured.is_file() {
        return Ok(configured.to_path_buf());
    }

    let is_bare_name = configured.components().count() == 1;
    let lookup_name = if is_bare_name {
        Some(configured.as_os_str().to_owned())
    } else if configured == default_renderer_path() {
        configured.file_name().map(|n| n.to_owned())
    } else {
        None
    };

    if let Some(name) = lookup_name {
        if let Some(found) = find_on_path(&name) {
            debug!("Resolved renderer {:?} → {}", name, found.display());
            return Ok(found);
        }
    }

    Err(BundleError::RendererNotFound {
        path: configured.to_path_buf(),
    })
}

fn find_on_path(name: &OsString) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
}

/// Command-line flags for the given layout, excluding URL and output path.
pub fn layout_args(options: &RenderOptions) -> Vec<String> {
    let m = &options.margins;
    vec![
        "--quiet".to_string(),
        "--page-size".to_string(),
        options.page_size.as_str().to_string(),
        "--orientation".to_string(),
        options.orientation.as_str().to_string(),
        "--margin-top".to_string(),
        format!("{}mm", m.top),
        "--margin-bottom".to_string(),
        format!("{}mm", m.bottom),
        "--margin-left".to_string(),
        format!("{}mm", m.left),
        "--margin-right".to_string(),
        format!("{}mm", m.right),
    ]
}

/// A resolved renderer plus the options shared by every URL of a run.
#[derive(Debug, Clone)]
pub struct Renderer {
    program: PathBuf,
    args: Vec<String>,
    timeout: Duration,
}

impl Renderer {
    pub fn new(program: PathBuf, options: &RenderOptions, timeout: Duration) -> Self {
        Self {
            program,
            args: layout_args(options),
            timeout,
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Render `entry.url` into `output`.
    ///
    /// Never panics and never propagates a fatal error: every failure is a
    /// [`UrlError`] for the caller to record.
    pub async fn render(&self, entry: &UrlEntry, output: &Path) -> Result<(), UrlError> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .arg(&entry.url)
            .arg(output)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(
            "#{} spawning {} for {}",
            entry.index,
            self.program.display(),
            entry.url
        );

        let child = command.spawn().map_err(|e| UrlError::SpawnFailed {
            index: entry.index,
            url: entry.url.clone(),
            detail: e.to_string(),
        })?;

        // Dropping the wait future on timeout drops the child, which kills it.
        let finished = tokio::time::timeout(self.timeout, child.wait_with_output()).await;

        let result = match finished {
            Err(_) => {
                warn!(
                    "#{} renderer exceeded {}s, killed",
                    entry.index,
                    self.timeout.as_secs()
                );
                return Err(UrlError::Timeout {
                    index: entry.index,
                    url: entry.url.clone(),
                    secs: self.timeout.as_secs(),
                });
            }
            Ok(Err(e)) => {
                return Err(UrlError::SpawnFailed {
                    index: entry.index,
                    url: entry.url.clone(),
                    detail: e.to_string(),
                })
            }
            Ok(Ok(result)) => result,
        };

        if !result.status.success() {
            return Err(UrlError::RendererFailed {
                index: entry.index,
                url: entry.url.clone(),
                code: result.status.code(),
                stderr: stderr_excerpt(&result.stderr),
            });
        }

        if !output.is_file() {
            return Err(UrlError::MissingOutput {
                index: entry.index,
                url: entry.url.clone(),
                path: output.to_path_buf(),
            });
        }

        Ok(())
    }
}

fn stderr_excerpt(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim();
    if text.chars().count() > MAX_STDERR_CHARS {
        let cut: String = text.chars().take(MAX_STDERR_CHARS).collect();
        format!("{cut}\u{2026}")
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Margins, Orientation, PageSize};

    #[test]
    fn layout_args_follow_options() {
        let options = RenderOptions {
            page_size: PageSize::Letter,
            orientation: Orientation::Landscape,
            margins: Margins {
                top: 5.0,
                bottom: 7.5,
                left: 0.0,
                right: 12.0,
            },
        };
        assert_eq!(
            layout_args(&options),
            vec![
                "--quiet",
                "--page-size",
                "Letter",
                "--orientation",
                "Landscape",
                "--margin-top",
                "5mm",
                "--margin-bottom",
                "7.5mm",
                "--margin-left",
                "0mm",
                "--margin-right",
                "12mm",
            ]
        );
    }

    #[test]
    fn missing_renderer_is_reported() {
        let err = resolve_renderer(Path::new("/no/such/dir/wkhtmltopdf")).unwrap_err();
        assert!(matches!(err, BundleError::RendererNotFound { .. }));
    }

    #[test]
    fn existing_file_resolves_to_itself() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let resolved = resolve_renderer(file.path()).unwrap();
        assert_eq!(resolved, file.path());
    }

    #[cfg(unix)]
    #[test]
    fn bare_name_is_searched_on_path() {
        // `sh` is present on every Unix PATH.
        let resolved = resolve_renderer(Path::new("sh")).unwrap();
        assert!(resolved.is_absolute());
        assert!(resolved.ends_with("sh"));
    }

    #[test]
    fn stderr_is_trimmed_and_truncated() {
        assert_eq!(stderr_excerpt(b"  oops\n"), "oops");
        let long = "x".repeat(MAX_STDERR_CHARS + 10);
        let excerpt = stderr_excerpt(long.as_bytes());
        assert_eq!(excerpt.chars().count(), MAX_STDERR_CHARS + 1);
        assert!(excerpt.ends_with('\u{2026}'));
    }

    #[cfg(unix)]
    #[test]
    fn failing_renderer_maps_to_renderer_failed() {
        let renderer = Renderer::new(
            PathBuf::from("false"),
            &RenderOptions::default(),
            Duration::from_secs(5),
        );
        let entry = UrlEntry {
            index: 1,
            line: 1,
            url: "https://a.example".into(),
        };
        let dir = tempfile::tempdir().unwrap();
        let err = tokio_test::block_on(renderer.render(&entry, &dir.path().join("out.pdf")))
            .unwrap_err();
        assert!(
            matches!(err, UrlError::RendererFailed { code: Some(1), .. }),
            "got: {err:?}"
        );
    }

    #[cfg(unix)]
    #[test]
    fn successful_exit_without_file_is_missing_output() {
        let renderer = Renderer::new(
            PathBuf::from("true"),
            &RenderOptions::default(),
            Duration::from_secs(5),
        );
        let entry = UrlEntry {
            index: 2,
            line: 2,
            url: "https://a.example".into(),
        };
        let dir = tempfile::tempdir().unwrap();
        let err = tokio_test::block_on(renderer.render(&entry, &dir.path().join("out.pdf")))
            .unwrap_err();
        assert!(matches!(err, UrlError::MissingOutput { index: 2, .. }));
    }

    #[test]
    fn unknown_program_is_spawn_failure() {
        let renderer = Renderer::new(
            PathBuf::from("/no/such/renderer-binary"),
            &RenderOptions::default(),
            Duration::from_secs(5),
        );
        let entry = UrlEntry {
            index: 3,
            line: 3,
            url: "https://a.example".into(),
        };
        let err = tokio_test::block_on(renderer.render(&entry, Path::new("out.pdf"))).unwrap_err();
        assert!(matches!(err, UrlError::SpawnFailed { index: 3, .. }));
    }
}
