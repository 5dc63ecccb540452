//! Pipeline stages for turning a URL list into PDFs.
//!
//! Each submodule implements one step and is testable on its own.
//!
//! ## Data Flow
//!
//! ```text
//! url_list ──▶ naming ──▶ render ──▶ merge
//!   (CSV)     (paths)   (renderer)  (lopdf)
//! ```
//!
//! 1. [`url_list`] — read the CSV and number the URLs
//! 2. [`naming`]   — plan a unique output path per URL before any work starts
//! 3. [`render`]   — run one external renderer process per URL
//! 4. [`merge`]    — join the rendered pages in URL order, then clean up

pub mod merge;
pub mod naming;
pub mod render;
pub mod url_list;
