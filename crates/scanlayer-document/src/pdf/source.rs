// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Source document inspection — page count and page geometry of the scanned
// PDF, read with `lopdf`.  The source is never modified here.

use std::path::Path;

use lopdf::{Dictionary, Document, Object, ObjectId};
use scanlayer_core::error::ScanlayerError;
use tracing::{debug, info, instrument};

/// Page attributes a page may inherit from its ancestors in the page tree.
pub(crate) const INHERITABLE_KEYS: [&[u8]; 4] = [b"MediaBox", b"CropBox", b"Resources", b"Rotate"];

/// Guards against malformed page trees whose /Parent chain loops.
const MAX_TREE_DEPTH: usize = 64;

/// A rectangle in PDF user space (points).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageBox {
    pub llx: f32,
    pub lly: f32,
    pub urx: f32,
    pub ury: f32,
}

impl PageBox {
    /// US Letter, used when a page carries no usable /CropBox or /MediaBox.
    pub const LETTER: PageBox = PageBox {
        llx: 0.0,
        lly: 0.0,
        urx: 612.0,
        ury: 792.0,
    };

    pub fn width(&self) -> f32 {
        (self.urx - self.llx).abs()
    }

    pub fn height(&self) -> f32 {
        (self.ury - self.lly).abs()
    }

    /// Parse a four-number array, following an indirect reference if needed.
    pub(crate) fn from_object(doc: &Document, object: &Object) -> Option<Self> {
        let resolved = resolve(doc, object)?;
        let Object::Array(values) = resolved else {
            return None;
        };
        if values.len() != 4 {
            return None;
        }
        let mut numbers = [0f32; 4];
        for (slot, value) in numbers.iter_mut().zip(values) {
            *slot = number(resolve(doc, value)?)?;
        }
        let [llx, lly, urx, ury] = numbers;
        Some(Self { llx, lly, urx, ury })
    }

    pub(crate) fn to_object(self) -> Object {
        Object::Array(vec![
            Object::Real(self.llx),
            Object::Real(self.lly),
            Object::Real(self.urx),
            Object::Real(self.ury),
        ])
    }
}

/// Read-only view of the PDF being made searchable.
pub struct SourceDocument {
    /// The underlying lopdf document.
    document: Document,
    /// Source path, if opened from a file (useful for diagnostics).
    source_path: Option<String>,
}

impl SourceDocument {
    /// Open a PDF from the filesystem.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ScanlayerError> {
        let path_ref = path.as_ref();
        let document = Document::load(path_ref).map_err(|err| {
            ScanlayerError::PdfError(format!("failed to open {}: {}", path_ref.display(), err))
        })?;

        info!(pages = document.get_pages().len(), "source PDF loaded");

        Ok(Self {
            document,
            source_path: Some(path_ref.display().to_string()),
        })
    }

    /// Load a source document from raw bytes already in memory.
    #[instrument(skip_all, fields(bytes_len = data.len()))]
    pub fn from_bytes(data: &[u8]) -> Result<Self, ScanlayerError> {
        let document = Document::load_mem(data).map_err(|err| {
            ScanlayerError::PdfError(format!("failed to load PDF from memory: {}", err))
        })?;

        debug!(pages = document.get_pages().len(), "source PDF loaded from bytes");

        Ok(Self {
            document,
            source_path: None,
        })
    }

    /// Number of pages in the document.
    pub fn page_count(&self) -> usize {
        self.document.get_pages().len()
    }

    /// Return the source path if the document was created via [`SourceDocument::open`].
    pub fn source_path(&self) -> Option<&str> {
        self.source_path.as_deref()
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    /// The visible area of a 1-based page: its /CropBox, else its /MediaBox,
    /// each inherited from the page tree if the page itself does not set
    /// one.  Falls back to US Letter.
    pub fn page_box(&self, page_number: u32) -> Result<PageBox, ScanlayerError> {
        let page_id = self.page_id(page_number)?;
        let lookup = |key: &[u8]| {
            inherited_attribute(&self.document, page_id, key)
                .and_then(|obj| PageBox::from_object(&self.document, obj))
        };
        let page_box = lookup(b"CropBox").or_else(|| lookup(b"MediaBox")).unwrap_or_else(|| {
            debug!(page_number, "page has no usable /CropBox or /MediaBox, assuming Letter");
            PageBox::LETTER
        });
        Ok(page_box)
    }

    fn page_id(&self, page_number: u32) -> Result<ObjectId, ScanlayerError> {
        let pages = self.document.get_pages();
        pages.get(&page_number).copied().ok_or_else(|| {
            ScanlayerError::PdfError(format!(
                "page {} out of range (document has {} pages)",
                page_number,
                pages.len()
            ))
        })
    }
}

/// Look up `key` on a page dictionary, walking up /Parent links until found.
pub(crate) fn inherited_attribute<'a>(
    doc: &'a Document,
    page_id: ObjectId,
    key: &[u8],
) -> Option<&'a Object> {
    let mut current: &Dictionary = doc.get_dictionary(page_id).ok()?;
    for _ in 0..MAX_TREE_DEPTH {
        if let Ok(value) = current.get(key) {
            return Some(value);
        }
        let parent = current.get(b"Parent").ok()?.as_reference().ok()?;
        current = doc.get_dictionary(parent).ok()?;
    }
    None
}

/// Follow indirect references until a direct object is reached.
pub(crate) fn resolve<'a>(doc: &'a Document, object: &'a Object) -> Option<&'a Object> {
    let mut current = object;
    for _ in 0..MAX_TREE_DEPTH {
        match current {
            Object::Reference(id) => current = doc.get_object(*id).ok()?,
            other => return Some(other),
        }
    }
    None
}

fn number(object: &Object) -> Option<f32> {
    match object {
        Object::Integer(value) => Some(*value as f32),
        Object::Real(value) => Some(*value as f32),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use lopdf::dictionary;

    use super::*;
    use crate::pdf::overlay::OverlayBuilder;

    fn integers(values: &[i64]) -> Vec<Object> {
        values.iter().map(|v| Object::Integer(*v)).collect()
    }

    /// A two-page document whose pages inherit their /MediaBox from /Pages.
    fn inherited_box_pdf() -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let first = doc.add_object(dictionary! { "Type" => "Page", "Parent" => pages_id });
        let second = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => integers(&[0, 0, 300, 400]),
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![Object::Reference(first), Object::Reference(second)],
                "Count" => Object::Integer(2),
                "MediaBox" => integers(&[0, 0, 595, 842]),
            }),
        );
        let catalog = doc.add_object(dictionary! { "Type" => "Catalog", "Pages" => pages_id });
        doc.trailer.set("Root", catalog);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).expect("save");
        bytes
    }

    #[test]
    fn page_box_is_inherited_from_page_tree() {
        let source = SourceDocument::from_bytes(&inherited_box_pdf()).expect("load");
        assert_eq!(source.page_count(), 2);

        let first = source.page_box(1).expect("page 1");
        assert_eq!((first.width(), first.height()), (595.0, 842.0));

        let second = source.page_box(2).expect("page 2");
        assert_eq!((second.width(), second.height()), (300.0, 400.0));
    }

    #[test]
    fn crop_box_takes_precedence_over_media_box() {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let cropped = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => integers(&[0, 0, 612, 792]),
            "CropBox" => integers(&[36, 36, 576, 756]),
        });
        let inherits_crop = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => integers(&[0, 0, 612, 792]),
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![Object::Reference(cropped), Object::Reference(inherits_crop)],
                "Count" => Object::Integer(2),
                "CropBox" => integers(&[0, 0, 500, 700]),
            }),
        );
        let catalog = doc.add_object(dictionary! { "Type" => "Catalog", "Pages" => pages_id });
        doc.trailer.set("Root", catalog);
        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).expect("save");

        let source = SourceDocument::from_bytes(&bytes).expect("load");
        let first = source.page_box(1).expect("page 1");
        assert_eq!((first.llx, first.lly), (36.0, 36.0));
        assert_eq!((first.width(), first.height()), (540.0, 720.0));

        let second = source.page_box(2).expect("page 2");
        assert_eq!((second.width(), second.height()), (500.0, 700.0));
    }

    #[test]
    fn out_of_range_page_is_an_error() {
        let source = SourceDocument::from_bytes(&inherited_box_pdf()).expect("load");
        assert!(source.page_box(0).is_err());
        assert!(source.page_box(3).is_err());
    }

    #[test]
    fn garbage_bytes_are_rejected() {
        let err = SourceDocument::from_bytes(b"not a pdf").err().expect("should fail");
        assert!(matches!(err, ScanlayerError::PdfError(_)));
    }

    #[test]
    fn open_records_source_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("scan.pdf");
        let mut builder = OverlayBuilder::new();
        builder.push_placeholder(PageBox::LETTER);
        builder.save(&path).expect("save");

        let source = SourceDocument::open(&path).expect("open");
        assert_eq!(source.page_count(), 1);
        assert_eq!(source.source_path(), Some(path.display().to_string().as_str()));
    }
}
