//! CSV reading: turn a CSV file into the ordered list of URLs to render.
//!
//! The list order is the contract the rest of the pipeline relies on: the
//! 1-based `index` assigned here decides output names in sequential mode and
//! page order in the merged document.

use crate::config::CsvOptions;
use crate::error::BundleError;
use serde::Serialize;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{debug, warn};

/// One URL picked from the CSV.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UrlEntry {
    /// 1-based position among accepted URLs.
    pub index: usize,
    /// 1-based line of the CSV file the URL came from.
    pub line: usize,
    pub url: String,
}

/// Read the URL list from a CSV file on disk.
pub fn read_urls(path: &Path, options: &CsvOptions) -> Result<Vec<UrlEntry>, BundleError> {
    if !path.is_file() {
        return Err(BundleError::CsvNotFound {
            path: path.to_path_buf(),
        });
    }
    let file = File::open(path).map_err(|e| BundleError::CsvRead {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })?;
    let entries = parse_urls(file, options).map_err(|detail| BundleError::CsvRead {
        path: path.to_path_buf(),
        detail,
    })?;
    debug!("Read {} URLs from {}", entries.len(), path.display());
    Ok(entries)
}

/// Parse URLs from any CSV byte stream.
///
/// Blank records are skipped silently; records without the configured
/// column, or with an empty value there, are skipped with a warning.
pub fn parse_urls<R: Read>(reader: R, options: &CsvOptions) -> Result<Vec<UrlEntry>, String> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(options.has_header)
        .delimiter(options.delimiter)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut entries = Vec::new();

    for record in csv_reader.records() {
        let record = record.map_err(|e| e.to_string())?;
        let line = record
            .position()
            .map(|p| p.line() as usize)
            .unwrap_or(entries.len() + 1);

        if record.iter().all(|field| field.is_empty()) {
            continue;
        }

        let value = match record.get(options.column) {
            Some(v) => v.trim_start_matches('\u{feff}').trim(),
            None => {
                warn!(
                    "Skipping CSV line {}: no column {} ({} fields)",
                    line,
                    options.column,
                    record.len()
                );
                continue;
            }
        };

        if value.is_empty() {
            warn!(
                "Skipping CSV line {}: column {} is empty",
                line, options.column
            );
            continue;
        }

        entries.push(UrlEntry {
            index: entries.len() + 1,
            line,
            url: value.to_string(),
        });
    }

    Ok(entries)
}
