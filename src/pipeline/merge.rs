//! PDF merging and scratch-file cleanup.
//!
//! Page order in the merged document is the order of the input slice, which
//! the caller builds from URL indices, never from completion order.
//!
//! ## How documents are joined
//!
//! Each input is loaded with `lopdf`, its object ids are shifted past the
//! ids already in use, and its leaf pages are moved under the first
//! document's page-tree root. Attributes a page inherits from intermediate
//! tree nodes (`Resources`, `MediaBox`, `CropBox`, `Rotate`) are copied onto
//! the page first, because those nodes are discarded. Outlines are dropped.
//!
//! lopdf parsing is CPU-bound, so [`merge_pdfs`] runs in `spawn_blocking`.

use crate::error::BundleError;
use lopdf::{Dictionary, Document, Object, ObjectId};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info, warn};

/// Page attributes that may live on an ancestor `Pages` node.
const INHERITABLE_ATTRIBUTES: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// Upper bound on page-tree depth when walking `Parent` links.
const MAX_TREE_DEPTH: usize = 64;

/// Merge `inputs`, in order, into `output`.
///
/// A single input is copied byte-for-byte. Returns the page count of the
/// merged document, or `None` when the input was copied.
pub async fn merge_pdfs(inputs: Vec<PathBuf>, output: PathBuf) -> Result<Option<usize>, BundleError> {
    tokio::task::spawn_blocking(move || merge_pdfs_blocking(&inputs, &output))
        .await
        .map_err(|e| BundleError::Internal(format!("Merge task panicked: {}", e)))?
}

/// Blocking implementation of [`merge_pdfs`].
pub fn merge_pdfs_blocking(inputs: &[PathBuf], output: &Path) -> Result<Option<usize>, BundleError> {
    let fail = |detail: String| BundleError::MergeFailed {
        output: output.to_path_buf(),
        detail,
    };

    if inputs.is_empty() {
        return Err(fail("no PDFs to merge".into()));
    }

    let tmp_path = staging_path(output);

    let pages = if inputs.len() == 1 {
        std::fs::copy(&inputs[0], &tmp_path)
            .map_err(|e| fail(format!("copying {}: {}", inputs[0].display(), e)))?;
        None
    } else {
        let mut documents = Vec::with_capacity(inputs.len());
        for path in inputs {
            let doc = Document::load(path)
                .map_err(|e| fail(format!("loading {}: {}", path.display(), e)))?;
            debug!("Loaded {} ({} pages)", path.display(), doc.get_pages().len());
            documents.push(doc);
        }

        let mut merged = merge_documents(documents).map_err(fail)?;
        let page_count = merged.get_pages().len();
        merged
            .save(&tmp_path)
            .map_err(|e| fail(format!("writing {}: {}", tmp_path.display(), e)))?;
        Some(page_count)
    };

    std::fs::rename(&tmp_path, output).map_err(|e| {
        let _ = std::fs::remove_file(&tmp_path);
        BundleError::OutputWriteFailed {
            path: output.to_path_buf(),
            source: e,
        }
    })?;

    info!("Merged {} PDFs into {}", inputs.len(), output.display());
    Ok(pages)
}

/// Sibling path the merged file is written to before being renamed into place.
fn staging_path(output: &Path) -> PathBuf {
    let mut name = output
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    output.with_file_name(name)
}

/// Join already-loaded documents into one, pages in input order.
pub fn merge_documents(documents: Vec<Document>) -> Result<Document, String> {
    let mut max_id = 1;
    let mut pages: Vec<(ObjectId, Dictionary)> = Vec::new();
    let mut objects: BTreeMap<ObjectId, Object> = BTreeMap::new();

    for mut doc in documents {
        doc.renumber_objects_with(max_id);
        max_id = doc.max_id + 1;

        for page_id in doc.get_pages().into_values() {
            pages.push((page_id, page_with_inherited_attributes(&doc, page_id)?));
        }
        objects.extend(doc.objects);
    }

    if pages.is_empty() {
        return Err("input documents contain no pages".into());
    }

    let mut document = Document::with_version("1.5");
    let mut catalog: Option<(ObjectId, Dictionary)> = None;
    let mut root_pages: Option<(ObjectId, Dictionary)> = None;

    for (id, object) in objects {
        let kind = type_name(&object).map(<[u8]>::to_vec);
        match kind.as_deref() {
            Some(b"Catalog") => {
                if catalog.is_none() {
                    catalog = object.as_dict().ok().map(|d| (id, d.clone()));
                }
            }
            Some(b"Pages") => {
                if root_pages.is_none() {
                    root_pages = object.as_dict().ok().map(|d| (id, d.clone()));
                }
            }
            // Pages are re-inserted below with their new parent.
            Some(b"Page") | Some(b"Outlines") | Some(b"Outline") => {}
            _ => {
                document.objects.insert(id, object);
            }
        }
    }

    let (catalog_id, mut catalog_dict) = catalog.ok_or("no document catalog found")?;
    let (pages_id, mut pages_dict) = root_pages.ok_or("no page tree found")?;

    let kids: Vec<Object> = pages.iter().map(|(id, _)| Object::Reference(*id)).collect();
    for (page_id, mut page) in pages {
        page.set("Parent", Object::Reference(pages_id));
        document.objects.insert(page_id, Object::Dictionary(page));
    }

    pages_dict.remove(b"Parent");
    pages_dict.set("Count", Object::Integer(kids.len() as i64));
    pages_dict.set("Kids", Object::Array(kids));
    document
        .objects
        .insert(pages_id, Object::Dictionary(pages_dict));

    catalog_dict.set("Pages", Object::Reference(pages_id));
    catalog_dict.remove(b"Outlines");
    document
        .objects
        .insert(catalog_id, Object::Dictionary(catalog_dict));

    document.trailer.set("Root", Object::Reference(catalog_id));
    document.max_id = document.objects.len() as u32;
    document.renumber_objects();
    document.compress();

    Ok(document)
}

fn type_name(object: &Object) -> Option<&[u8]> {
    object.as_dict().ok()?.get(b"Type").ok()?.as_name().ok()
}

/// Copy of the page dictionary with inheritable attributes resolved from
/// its ancestors.
fn page_with_inherited_attributes(doc: &Document, page_id: ObjectId) -> Result<Dictionary, String> {
    let mut page = doc
        .get_dictionary(page_id)
        .map_err(|e| format!("page {:?}: {}", page_id, e))?
        .clone();

    let mut parent = page.get(b"Parent").and_then(Object::as_reference).ok();
    let mut depth = 0;
    while let Some(parent_id) = parent {
        if depth >= MAX_TREE_DEPTH {
            break;
        }
        let Ok(node) = doc.get_dictionary(parent_id) else {
            break;
        };
        for key in INHERITABLE_ATTRIBUTES {
            if !page.has(key) {
                if let Ok(value) = node.get(key) {
                    page.set(key.to_vec(), value.clone());
                }
            }
        }
        parent = node.get(b"Parent").and_then(Object::as_reference).ok();
        depth += 1;
    }

    Ok(page)
}

/// Scratch directory holding merged-mode per-URL files.
#[derive(Debug)]
pub struct Scratch {
    dir: TempDir,
}

impl Scratch {
    /// Create a fresh scratch directory under `base` (system temp if `None`).
    pub fn create(base: Option<&Path>) -> Result<Self, BundleError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("webpage2pdf-");
        let dir = match base {
            Some(base) => builder.tempdir_in(base),
            None => builder.tempdir(),
        }
        .map_err(|e| BundleError::OutputWriteFailed {
            path: base.map(Path::to_path_buf).unwrap_or_else(std::env::temp_dir),
            source: e,
        })?;
        debug!("Scratch directory: {}", dir.path().display());
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Best-effort removal of the per-URL files, then the directory itself.
    ///
    /// Failures are logged and otherwise ignored; returns how many files
    /// were removed.
    pub fn cleanup<'a>(self, files: impl IntoIterator<Item = &'a Path>) -> usize {
        let mut removed = 0;
        for file in files {
            match std::fs::remove_file(file) {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!("Could not remove {}: {}", file.display(), e),
            }
        }
        let dir = self.dir.path().to_path_buf();
        if let Err(e) = self.dir.close() {
            warn!("Could not remove scratch directory {}: {}", dir.display(), e);
        }
        removed
    }
}
