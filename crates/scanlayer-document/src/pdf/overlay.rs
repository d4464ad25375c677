// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Overlay construction — a document with exactly one page per source page.
//
// Recognized pages contribute the text-only PDF fragment emitted by the
// recognition engine; every other page gets an empty placeholder sized like
// the source page.  The merge tool then stamps overlay page N onto source
// page N, so alignment must never drift.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use lopdf::{Dictionary, Document, Object, ObjectId, Stream, dictionary};
use scanlayer_core::error::ScanlayerError;
use tracing::{debug, info, instrument, warn};

use super::source::{INHERITABLE_KEYS, PageBox, SourceDocument, inherited_attribute};

/// Incrementally builds the page-aligned overlay document.
pub struct OverlayBuilder {
    document: Document,
    /// Object id reserved for the /Pages node; written in [`finish`](Self::finish).
    pages_id: ObjectId,
    kids: Vec<Object>,
}

impl Default for OverlayBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl OverlayBuilder {
    pub fn new() -> Self {
        let mut document = Document::with_version("1.5");
        let pages_id = document.new_object_id();
        Self {
            document,
            pages_id,
            kids: Vec::new(),
        }
    }

    /// Number of pages appended so far.
    pub fn page_count(&self) -> usize {
        self.kids.len()
    }

    /// Append an empty page with the given /MediaBox.
    pub fn push_placeholder(&mut self, media_box: PageBox) {
        let page = dictionary! {
            "Type" => "Page",
            "Parent" => self.pages_id,
            "MediaBox" => media_box.to_object(),
            "Resources" => Dictionary::new(),
        };
        let page_id = self.document.add_object(page);
        self.kids.push(Object::Reference(page_id));
    }

    /// Append the first page of `fragment`, copying every object it references.
    ///
    /// Attributes the fragment page inherits from its own page tree are
    /// materialised on the copy so it stands alone in the overlay.
    pub fn push_fragment(&mut self, fragment: &Document) -> Result<(), ScanlayerError> {
        let page_id = fragment
            .get_pages()
            .values()
            .next()
            .copied()
            .ok_or_else(|| ScanlayerError::PdfError("fragment has no pages".to_string()))?;

        let page_dict = fragment.get_dictionary(page_id).map_err(|err| {
            ScanlayerError::PdfError(format!("cannot read fragment page {:?}: {}", page_id, err))
        })?;

        let mut memo = HashMap::new();
        let mut cloned = Dictionary::new();
        for (key, value) in page_dict.iter() {
            if key.as_slice() == b"Parent" {
                continue;
            }
            let value = deep_clone_object(fragment, &mut self.document, value, &mut memo)?;
            cloned.set(key.clone(), value);
        }
        for key in INHERITABLE_KEYS {
            if cloned.has(key) {
                continue;
            }
            if let Some(value) = inherited_attribute(fragment, page_id, key) {
                let value = deep_clone_object(fragment, &mut self.document, value, &mut memo)?;
                cloned.set(key.to_vec(), value);
            }
        }
        cloned.set("Parent", Object::Reference(self.pages_id));

        let new_id = self.document.add_object(cloned);
        self.kids.push(Object::Reference(new_id));
        debug!(page = self.kids.len(), objects = memo.len(), "fragment page copied");
        Ok(())
    }

    /// Load a fragment PDF from disk and append its first page.
    pub fn push_fragment_file(&mut self, path: &Path) -> Result<(), ScanlayerError> {
        let fragment = Document::load(path).map_err(|err| {
            ScanlayerError::PdfError(format!("failed to open fragment {}: {}", path.display(), err))
        })?;
        self.push_fragment(&fragment)
    }

    /// Write the page tree and catalog, returning the finished document.
    pub fn finish(mut self) -> Document {
        let count = self.kids.len() as i64;
        self.document.objects.insert(
            self.pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => self.kids,
                "Count" => Object::Integer(count),
            }),
        );
        let catalog_id = self.document.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => self.pages_id,
        });
        self.document.trailer.set("Root", catalog_id);
        self.document
    }

    /// Finish and serialise to bytes.
    pub fn to_bytes(self) -> Result<Vec<u8>, ScanlayerError> {
        let mut document = self.finish();
        let mut output = Vec::new();
        document.save_to(&mut output).map_err(|err| {
            ScanlayerError::PdfError(format!("failed to serialise overlay: {}", err))
        })?;
        Ok(output)
    }

    /// Finish and write to `path`.
    pub fn save(self, path: &Path) -> Result<(), ScanlayerError> {
        let mut document = self.finish();
        document.save(path).map_err(|err| {
            ScanlayerError::PdfError(format!("failed to write {}: {}", path.display(), err))
        })?;
        Ok(())
    }
}

/// Build the overlay for `source`: fragment pages where recognition
/// succeeded, placeholders elsewhere.
///
/// A fragment that cannot be read degrades to a placeholder so the remaining
/// pages stay aligned.
#[instrument(skip_all, fields(source_pages = source.page_count(), fragments = fragments.len()))]
pub fn build_overlay(
    source: &SourceDocument,
    fragments: &BTreeMap<u32, PathBuf>,
) -> Result<OverlayBuilder, ScanlayerError> {
    let mut builder = OverlayBuilder::new();

    for page_number in 1..=source.page_count() as u32 {
        let page_box = source.page_box(page_number)?;
        match fragments.get(&page_number) {
            Some(path) => {
                if let Err(err) = builder.push_fragment_file(path) {
                    warn!(page_number, %err, "unusable text fragment, inserting placeholder");
                    builder.push_placeholder(page_box);
                }
            }
            None => builder.push_placeholder(page_box),
        }
    }

    for page_number in fragments.keys() {
        if *page_number as usize > source.page_count() {
            warn!(page_number, "fragment for a page the source does not have, ignored");
        }
    }

    info!(pages = builder.page_count(), "overlay assembled");
    Ok(builder)
}

/// Deep-clone a lopdf object from `source` into `target`.
///
/// References are followed and copied once each (`memo` maps source ids to
/// target ids); /Parent keys are skipped because the caller re-links pages.
fn deep_clone_object(
    source: &Document,
    target: &mut Document,
    object: &Object,
    memo: &mut HashMap<ObjectId, ObjectId>,
) -> Result<Object, ScanlayerError> {
    match object {
        Object::Dictionary(dict) => Ok(Object::Dictionary(clone_dictionary(
            source, target, dict, memo,
        )?)),
        Object::Array(arr) => {
            let mut new_arr = Vec::with_capacity(arr.len());
            for item in arr {
                new_arr.push(deep_clone_object(source, target, item, memo)?);
            }
            Ok(Object::Array(new_arr))
        }
        Object::Reference(ref_id) => {
            if let Some(existing) = memo.get(ref_id) {
                return Ok(Object::Reference(*existing));
            }
            match source.get_object(*ref_id) {
                Ok(referenced) => {
                    // Reserve the id first so cycles resolve to the same object.
                    let new_id = target.new_object_id();
                    memo.insert(*ref_id, new_id);
                    let cloned = deep_clone_object(source, target, referenced, memo)?;
                    target.objects.insert(new_id, cloned);
                    Ok(Object::Reference(new_id))
                }
                Err(err) => {
                    warn!(?ref_id, %err, "cannot resolve reference, using Null");
                    Ok(Object::Null)
                }
            }
        }
        Object::Stream(stream) => {
            let dict = clone_dictionary(source, target, &stream.dict, memo)?;
            Ok(Object::Stream(Stream::new(dict, stream.content.clone())))
        }
        other => Ok(other.clone()),
    }
}

fn clone_dictionary(
    source: &Document,
    target: &mut Document,
    dict: &Dictionary,
    memo: &mut HashMap<ObjectId, ObjectId>,
) -> Result<Dictionary, ScanlayerError> {
    let mut new_dict = Dictionary::new();
    for (key, value) in dict.iter() {
        if key.as_slice() == b"Parent" {
            continue;
        }
        let cloned_value = deep_clone_object(source, target, value, memo)?;
        new_dict.set(key.clone(), cloned_value);
    }
    Ok(new_dict)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A single-page text-only fragment similar to what tesseract emits.
    fn fragment_pdf(width: i64, height: i64) -> Document {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let content = Stream::new(
            Dictionary::new(),
            b"BT 3 Tr /F1 12 Tf 72 700 Td (hello) Tj ET".to_vec(),
        );
        let content_id = doc.add_object(content);
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![Object::Reference(page_id)],
                "Count" => Object::Integer(1),
                "MediaBox" => vec![
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Integer(width),
                    Object::Integer(height),
                ],
                "Resources" => dictionary! {
                    "Font" => dictionary! { "F1" => font_id },
                },
            }),
        );
        let catalog = doc.add_object(dictionary! { "Type" => "Catalog", "Pages" => pages_id });
        doc.trailer.set("Root", catalog);
        doc
    }

    fn source_with_pages(count: usize) -> SourceDocument {
        let mut builder = OverlayBuilder::new();
        for _ in 0..count {
            builder.push_placeholder(PageBox::LETTER);
        }
        SourceDocument::from_bytes(&builder.to_bytes().expect("bytes")).expect("load")
    }

    #[test]
    fn placeholder_pages_round_trip_through_lopdf() {
        let mut builder = OverlayBuilder::new();
        builder.push_placeholder(PageBox::LETTER);
        builder.push_placeholder(PageBox {
            llx: 0.0,
            lly: 0.0,
            urx: 200.0,
            ury: 100.0,
        });
        assert_eq!(builder.page_count(), 2);

        let bytes = builder.to_bytes().expect("serialise");
        let reloaded = SourceDocument::from_bytes(&bytes).expect("reload");
        assert_eq!(reloaded.page_count(), 2);
        assert_eq!(reloaded.page_box(2).expect("box").width(), 200.0);
    }

    #[test]
    fn fragment_page_keeps_inherited_resources() {
        let mut builder = OverlayBuilder::new();
        builder
            .push_fragment(&fragment_pdf(1240, 1754))
            .expect("push fragment");
        let document = builder.finish();

        let pages = document.get_pages();
        assert_eq!(pages.len(), 1);
        let page = document.get_dictionary(pages[&1]).expect("page dict");
        assert!(page.has(b"MediaBox"));
        assert!(page.has(b"Resources"));
        assert!(page.has(b"Contents"));
    }

    /// Collects formatted log output for assertions.
    #[derive(Clone, Default)]
    struct CapturedLog(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLog {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if let Ok(mut inner) = self.0.lock() {
                inner.extend_from_slice(buf);
            }
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn fragment_copy_logs_once_per_page() {
        let log = CapturedLog::default();
        let writer = log.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            let mut builder = OverlayBuilder::new();
            for _ in 0..3 {
                builder
                    .push_fragment(&fragment_pdf(612, 792))
                    .expect("push fragment");
            }
        });

        let output = String::from_utf8(log.0.lock().expect("log").clone()).expect("utf8");
        assert_eq!(output.matches("fragment page copied").count(), 3, "{output}");
        assert_eq!(output.lines().count(), 3, "{output}");
    }

    #[test]
    fn overlay_is_page_aligned_with_source() {
        let dir = tempfile::tempdir().expect("tempdir");
        let fragment_path = dir.path().join("p0002.pdf");
        let mut fragment = fragment_pdf(612, 792);
        fragment.save(&fragment_path).expect("save fragment");

        let source = source_with_pages(3);
        let fragments = BTreeMap::from([(2u32, fragment_path)]);
        let overlay = build_overlay(&source, &fragments).expect("overlay").finish();

        let pages = overlay.get_pages();
        assert_eq!(pages.len(), 3);
        let second = overlay.get_dictionary(pages[&2]).expect("page 2");
        assert!(second.has(b"Contents"), "page 2 carries the fragment");
        let first = overlay.get_dictionary(pages[&1]).expect("page 1");
        assert!(!first.has(b"Contents"), "page 1 is a placeholder");
    }

    #[test]
    fn unreadable_fragment_degrades_to_placeholder() {
        let dir = tempfile::tempdir().expect("tempdir");
        let broken = dir.path().join("broken.pdf");
        std::fs::write(&broken, b"%PDF-1.5 truncated").expect("write");

        let source = source_with_pages(2);
        let fragments = BTreeMap::from([(1u32, broken)]);
        let overlay = build_overlay(&source, &fragments).expect("overlay");
        assert_eq!(overlay.page_count(), 2);
    }
}
