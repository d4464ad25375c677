// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Test doubles: a scripted `CommandRunner` that imitates pdftoppm, tesseract,
// qpdf and pdfimages closely enough for the pipeline to run end to end.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use image::{GrayImage, Luma};
use scanlayer_core::error::{Result, ScanlayerError};
use scanlayer_document::{OverlayBuilder, PageBox};

use crate::command::{CommandOutput, CommandRunner, ToolInvocation, ToolRole};

#[derive(Clone, Default)]
enum InspectorScript {
    #[default]
    Empty,
    Listing(String),
    Fails,
}

/// Imitates the external tools by writing the files they would produce.
#[derive(Clone)]
pub(crate) struct ScriptedRunner {
    inspector: InspectorScript,
    failing_raster_pages: HashSet<u32>,
    failing_recognition_pages: HashSet<u32>,
    merge_exit: i32,
    raster_size: (u32, u32),
    recognition_delay: Option<Duration>,
    calls: Arc<Mutex<Vec<ToolInvocation>>>,
}

impl Default for ScriptedRunner {
    fn default() -> Self {
        Self {
            inspector: InspectorScript::Empty,
            failing_raster_pages: HashSet::new(),
            failing_recognition_pages: HashSet::new(),
            merge_exit: 0,
            raster_size: (100, 140),
            recognition_delay: None,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl ScriptedRunner {
    pub fn inspector_listing(mut self, listing: &str) -> Self {
        self.inspector = InspectorScript::Listing(listing.to_string());
        self
    }

    pub fn inspector_fails(mut self) -> Self {
        self.inspector = InspectorScript::Fails;
        self
    }

    pub fn fail_raster(mut self, page: u32) -> Self {
        self.failing_raster_pages.insert(page);
        self
    }

    pub fn fail_recognition(mut self, page: u32) -> Self {
        self.failing_recognition_pages.insert(page);
        self
    }

    pub fn merge_exit(mut self, code: i32) -> Self {
        self.merge_exit = code;
        self
    }

    pub fn raster_size(mut self, width: u32, height: u32) -> Self {
        self.raster_size = (width, height);
        self
    }

    pub fn slow_recognition(mut self, delay: Duration) -> Self {
        self.recognition_delay = Some(delay);
        self
    }

    /// Every invocation seen so far.
    pub fn calls(&self) -> Vec<ToolInvocation> {
        self.calls.lock().expect("calls lock poisoned").clone()
    }

    pub fn calls_for(&self, role: ToolRole) -> Vec<ToolInvocation> {
        self.calls().into_iter().filter(|c| c.role == role).collect()
    }

    fn rasterize(&self, inv: &ToolInvocation) -> Result<CommandOutput> {
        let page: u32 = arg_text(inv.arg_after("-f")).parse().unwrap_or(0);
        if self.failing_raster_pages.contains(&page) {
            return Ok(CommandOutput::exited(99, format!("Syntax Error: cannot render page {page}")));
        }
        let base = PathBuf::from(inv.args.last().expect("output base"));
        let (w, h) = self.raster_size;
        GrayImage::from_pixel(w, h, Luma([255u8]))
            .save(with_extension(&base, "png"))
            .map_err(|e| ScanlayerError::ImageError(e.to_string()))?;
        Ok(CommandOutput::success())
    }

    async fn recognize(&self, inv: &ToolInvocation) -> Result<CommandOutput> {
        if let Some(delay) = self.recognition_delay {
            tokio::time::sleep(delay).await;
        }
        let image = PathBuf::from(&inv.args[0]);
        let page = page_from_image_name(&image);
        if self.failing_recognition_pages.contains(&page) {
            return Ok(CommandOutput::exited(1, "Error during processing."));
        }
        let out_base = PathBuf::from(&inv.args[1]);
        std::fs::write(with_extension(&out_base, "tsv"), sample_tsv(page))?;

        let mut fragment = OverlayBuilder::new();
        fragment.push_placeholder(PageBox::LETTER);
        fragment.save(&with_extension(&out_base, "pdf"))?;
        Ok(CommandOutput::success())
    }

    fn merge(&self, inv: &ToolInvocation) -> Result<CommandOutput> {
        let source = PathBuf::from(&inv.args[0]);
        let output = PathBuf::from(inv.args.last().expect("output path"));
        std::fs::copy(source, output)?;
        Ok(CommandOutput::exited(self.merge_exit, "WARNING: recovered"))
    }

    fn inspect(&self) -> Result<CommandOutput> {
        match &self.inspector {
            InspectorScript::Empty => Ok(CommandOutput::success()),
            InspectorScript::Listing(listing) => Ok(CommandOutput {
                code: Some(0),
                stdout: listing.clone(),
                stderr: String::new(),
            }),
            InspectorScript::Fails => Err(ScanlayerError::ToolSpawn {
                tool: "pdfimages".into(),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            }),
        }
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, invocation: &ToolInvocation) -> Result<CommandOutput> {
        self.calls
            .lock()
            .expect("calls lock poisoned")
            .push(invocation.clone());
        match invocation.role {
            ToolRole::Rasterizer => self.rasterize(invocation),
            ToolRole::Recognizer => self.recognize(invocation).await,
            ToolRole::Merger => self.merge(invocation),
            ToolRole::Inspector => self.inspect(),
        }
    }
}

/// Word report for `page`: "Page <n>" on line one, "scanned" on line two,
/// plus a low-confidence row that must be dropped.
pub(crate) fn sample_tsv(page: u32) -> String {
    format!(
        "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext\n\
         1\t1\t0\t0\t0\t0\t0\t0\t100\t140\t-1\t\n\
         4\t1\t1\t1\t1\t0\t10\t10\t45\t12\t-1\t\n\
         5\t1\t1\t1\t1\t1\t10\t10\t30\t12\t96.5\tPage\n\
         5\t1\t1\t1\t1\t2\t45\t10\t10\t12\t95.1\t{page}\n\
         5\t1\t1\t1\t2\t1\t10\t30\t40\t12\t91.0\tscanned\n\
         5\t1\t1\t1\t2\t2\t55\t30\t5\t12\t-1\t~\n"
    )
}

/// A minimal `pages`-page PDF, every page US Letter.
pub(crate) fn blank_pdf(pages: usize) -> Vec<u8> {
    let mut builder = OverlayBuilder::new();
    for _ in 0..pages {
        builder.push_placeholder(PageBox::LETTER);
    }
    builder.to_bytes().expect("serialise blank pdf")
}

fn arg_text(arg: Option<&Path>) -> String {
    arg.map(|p| p.to_string_lossy().into_owned()).unwrap_or_default()
}

fn with_extension(base: &Path, ext: &str) -> PathBuf {
    let mut name = base.as_os_str().to_owned();
    name.push(".");
    name.push(ext);
    PathBuf::from(name)
}

/// `p0002_r300.png` → 2
fn page_from_image_name(image: &Path) -> u32 {
    image
        .file_stem()
        .and_then(|s| s.to_str())
        .and_then(|s| s.strip_prefix('p'))
        .and_then(|s| s.split('_').next())
        .and_then(|s| s.parse().ok())
        .unwrap_or(0)
}
