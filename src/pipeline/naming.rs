//! Output path planning: one unique file path per URL index.
//!
//! Paths are planned up front, before any renderer runs, so two workers can
//! never be told to write the same file.

use crate::config::NamingScheme;
use crate::pipeline::url_list::UrlEntry;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use url::Url;

static RE_UNSAFE_FILENAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^A-Za-z0-9._-]+").unwrap());

/// Hands out output paths for a single run.
#[derive(Debug)]
pub struct OutputNamer {
    dir: PathBuf,
    scheme: NamingScheme,
    timestamp: String,
    taken: HashSet<String>,
    check_disk: bool,
}

impl OutputNamer {
    /// Namer for separate mode. Names already present in `dir` count as
    /// collisions so earlier runs are never overwritten.
    pub fn new(dir: impl Into<PathBuf>, scheme: NamingScheme) -> Self {
        Self::with_timestamp(dir, scheme, run_timestamp())
    }

    /// Same as [`OutputNamer::new`] with a fixed timestamp.
    pub fn with_timestamp(
        dir: impl Into<PathBuf>,
        scheme: NamingScheme,
        timestamp: impl Into<String>,
    ) -> Self {
        Self {
            dir: dir.into(),
            scheme,
            timestamp: timestamp.into(),
            taken: HashSet::new(),
            check_disk: true,
        }
    }

    /// Namer for merged-mode scratch files: `page_{index}.pdf`.
    pub fn scratch(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            scheme: NamingScheme::Sequential,
            timestamp: String::new(),
            taken: HashSet::new(),
            check_disk: false,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Plan the output path for `entry`.
    pub fn path_for(&mut self, entry: &UrlEntry) -> PathBuf {
        let stem = match self.scheme {
            NamingScheme::Sequential if self.timestamp.is_empty() => {
                format!("page_{}", entry.index)
            }
            NamingScheme::Sequential => format!("page_{}_{}", entry.index, self.timestamp),
            NamingScheme::Domain => {
                domain_stem(&entry.url).unwrap_or_else(|| format!("page_{}", entry.index))
            }
        };

        let name = self.claim(&stem, entry.index);
        self.dir.join(name)
    }

    /// Reserve a file name built from `stem`, appending the entry index (and
    /// then a counter) until it is unique.
    fn claim(&mut self, stem: &str, index: usize) -> String {
        let mut candidate = format!("{stem}.pdf");
        if self.is_taken(&candidate) {
            candidate = format!("{stem}_{index}.pdf");
            let mut counter = 2;
            while self.is_taken(&candidate) {
                candidate = format!("{stem}_{index}_{counter}.pdf");
                counter += 1;
            }
        }
        self.taken.insert(candidate.clone());
        candidate
    }

    fn is_taken(&self, name: &str) -> bool {
        self.taken.contains(name) || (self.check_disk && self.dir.join(name).exists())
    }
}

/// Timestamp shared by every sequential name of one run.
pub fn run_timestamp() -> String {
    chrono::Local::now().format("%Y%m%d-%H%M%S").to_string()
}

/// File stem derived from a URL's host: `www.` dropped, unsafe characters
/// replaced by `_`. Scheme-less input such as `example.com/page` is read as
/// `http://example.com/page`.
pub fn domain_stem(raw: &str) -> Option<String> {
    let parsed = Url::parse(raw)
        .ok()
        .filter(|u| u.has_host())
        .or_else(|| Url::parse(&format!("http://{raw}")).ok())?;
    let host = parsed.host_str()?;
    let host = host.strip_prefix("www.").unwrap_or(host);
    let stem = RE_UNSAFE_FILENAME.replace_all(host, "_");
    let stem = stem.trim_matches(|c| c == '.' || c == '_');
    if stem.is_empty() {
        None
    } else {
        Some(stem.to_string())
    }
}
