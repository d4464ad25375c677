// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Word index persistence.
//
// Two formats are written next to the working copy:
//
// * v1: a single `<working copy>.index.json` holding every recognized page.
// * v2: a `<working copy>.ocr/` directory with `manifest.json` plus one
//   `page-NNNN.json` per recognized page.
//
// Every file goes to a temporary file in its destination directory first and
// is renamed into place, so readers never observe a partial index.  For v2
// the page files land before the manifest that references them.

use std::collections::{BTreeMap, BTreeSet};
use std::ffi::OsString;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use scanlayer_core::error::{Result, ScanlayerError};
use scanlayer_core::types::{PageRecognition, Word};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info, instrument, warn};

pub const MANIFEST_FILE: &str = "manifest.json";

/// Flat single-file index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexV1 {
    pub version: u32,
    pub page_count: u32,
    pub pages: Vec<IndexV1Page>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexV1Page {
    pub page_number: u32,
    pub words: Vec<Word>,
    pub text: String,
    pub page_width: u32,
    pub page_height: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub version: u32,
    pub created_at: String,
    pub source: ManifestSource,
    pub page_count: u32,
    pub page_box: String,
    pub ocr: ManifestOcr,
    pub pages: BTreeMap<u32, ManifestPage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestSource {
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestOcr {
    pub engine: String,
    pub languages: Vec<String>,
    pub render_dpi: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestPage {
    /// Relative to the index directory.
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageFile {
    pub page_number: u32,
    /// Always 0: recognized coordinates are not transformed for rotated pages.
    pub rotation: u32,
    pub render: RenderInfo,
    pub text: String,
    pub words: Vec<Word>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderInfo {
    pub dpi: u32,
    pub image_px: ImagePx,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImagePx {
    pub w: u32,
    pub h: u32,
}

/// `<working copy>.index.json`
pub fn v1_path(working_copy: &Path) -> PathBuf {
    with_suffix(working_copy, ".index.json")
}

/// `<working copy>.ocr`
pub fn v2_dir(working_copy: &Path) -> PathBuf {
    with_suffix(working_copy, ".ocr")
}

pub fn page_file_name(page_number: u32) -> String {
    format!("page-{page_number:04}.json")
}

/// Everything needed to write both index formats for one job.
#[derive(Debug, Clone)]
pub struct IndexWriter {
    pub working_copy: PathBuf,
    /// Pages in the source document, recognized or not.
    pub page_count: u32,
    pub dpi: u32,
    pub engine: String,
    pub languages: Vec<String>,
    /// Successful pages, ascending by page number.
    pub pages: Vec<PageRecognition>,
}

impl IndexWriter {
    /// Write both formats.  Failures are logged and never propagate; the
    /// return value says whether both were written.
    pub fn write_all(&self) -> bool {
        let v1 = match self.write_v1() {
            Ok(path) => {
                info!(path = %path.display(), "v1 index written");
                true
            }
            Err(err) => {
                warn!(%err, "v1 index write failed");
                false
            }
        };
        let v2 = match self.write_v2(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)) {
            Ok(path) => {
                info!(path = %path.display(), "v2 index written");
                true
            }
            Err(err) => {
                warn!(%err, "v2 index write failed");
                false
            }
        };
        v1 && v2
    }

    pub fn v1(&self) -> IndexV1 {
        IndexV1 {
            version: 1,
            page_count: self.page_count,
            pages: self
                .pages
                .iter()
                .map(|page| IndexV1Page {
                    page_number: page.page_number,
                    words: page.words.clone(),
                    text: page.text.clone(),
                    page_width: page.image_width,
                    page_height: page.image_height,
                })
                .collect(),
        }
    }

    #[instrument(skip_all, fields(pages = self.pages.len()))]
    pub fn write_v1(&self) -> Result<PathBuf> {
        let path = v1_path(&self.working_copy);
        write_json_atomic(&path, &self.v1())?;
        Ok(path)
    }

    pub fn page_file(&self, page: &PageRecognition) -> PageFile {
        PageFile {
            page_number: page.page_number,
            rotation: 0,
            render: RenderInfo {
                dpi: self.dpi,
                image_px: ImagePx {
                    w: page.image_width,
                    h: page.image_height,
                },
            },
            text: page.text.clone(),
            words: page.words.clone(),
        }
    }

    pub fn manifest(&self, created_at: String) -> Manifest {
        Manifest {
            version: 2,
            created_at,
            source: ManifestSource {
                path: self.working_copy.display().to_string(),
            },
            page_count: self.page_count,
            page_box: "crop".to_string(),
            ocr: ManifestOcr {
                engine: self.engine.clone(),
                languages: self.languages.clone(),
                render_dpi: self.dpi,
            },
            pages: self
                .pages
                .iter()
                .map(|page| {
                    let entry = ManifestPage {
                        path: page_file_name(page.page_number),
                    };
                    (page.page_number, entry)
                })
                .collect(),
        }
    }

    /// Write the v2 directory, stamping the manifest with `created_at`.
    #[instrument(skip_all, fields(pages = self.pages.len()))]
    pub fn write_v2(&self, created_at: String) -> Result<PathBuf> {
        let dir = v2_dir(&self.working_copy);
        std::fs::create_dir_all(&dir)?;

        let mut written = BTreeSet::new();
        for page in &self.pages {
            let name = page_file_name(page.page_number);
            write_json_atomic(&dir.join(&name), &self.page_file(page))?;
            written.insert(OsString::from(name));
        }
        write_json_atomic(&dir.join(MANIFEST_FILE), &self.manifest(created_at))?;
        remove_stale_pages(&dir, &written);
        Ok(dir)
    }
}

/// Serialize `value` to a sibling temp file, flush it to disk, then rename
/// it over `path`.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut file = NamedTempFile::new_in(parent)?;
    serde_json::to_writer_pretty(&mut file, value)?;
    file.write_all(b"\n")?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|e| ScanlayerError::Io(e.error))?;
    debug!(path = %path.display(), "index file persisted");
    Ok(())
}

/// Drop page files left by an earlier run for pages that no longer have
/// results.
fn remove_stale_pages(dir: &Path, keep: &BTreeSet<OsString>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let name = entry.file_name();
        let is_page_file = name
            .to_str()
            .is_some_and(|n| n.starts_with("page-") && n.ends_with(".json"));
        if is_page_file && !keep.contains(&name) {
            match std::fs::remove_file(entry.path()) {
                Ok(()) => debug!(file = ?name, "removed stale page file"),
                Err(err) => warn!(file = ?name, %err, "failed to remove stale page file"),
            }
        }
    }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}
