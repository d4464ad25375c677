// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Per-page recognition: rasterize one page, run the recognition engine on the
// image, parse its word report.

pub mod tsv;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use scanlayer_core::error::{Result, ScanlayerError};
use scanlayer_core::types::{PageRecognition, PageRequest};
use scanlayer_core::OcrConfig;
use scanlayer_document::image_dimensions;
use tracing::{debug, instrument};

use crate::command::{CommandRunner, ToolInvocation, ToolRole};
use crate::temp::TempRegistry;

pub use tsv::{ParsedReport, parse_tsv};

/// Runs the rasterizer and recognition engine for single pages of one source
/// document.  Cheap to share between workers.
#[derive(Clone)]
pub struct PageRecognizer {
    runner: Arc<dyn CommandRunner>,
    config: Arc<OcrConfig>,
    source: PathBuf,
    dpi: u32,
    threads: usize,
}

impl PageRecognizer {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        config: Arc<OcrConfig>,
        source: PathBuf,
        dpi: u32,
        threads: usize,
    ) -> Self {
        Self {
            runner,
            config,
            source,
            dpi,
            threads: threads.max(1),
        }
    }

    pub fn dpi(&self) -> u32 {
        self.dpi
    }

    /// Languages for `request`, falling back to the configured default.
    pub fn languages(&self, request: &PageRequest) -> String {
        if request.languages.is_empty() {
            self.config.default_languages.join("+")
        } else {
            request.languages.join("+")
        }
    }

    #[instrument(skip_all, fields(page = request.page_number, dpi = self.dpi))]
    pub async fn recognize(&self, request: &PageRequest, temp: &TempRegistry) -> Result<PageRecognition> {
        let page = request.page_number;
        let image = self.rasterize(page, temp).await?;

        let (image_width, image_height) = image_dimensions(&image)?;

        let ocr_base = temp.root().join(format!("p{page:04}_ocr"));
        let report_path = temp.file(&format!("p{page:04}_ocr.tsv"));
        let fragment_path = temp.file(&format!("p{page:04}_ocr.pdf"));
        let invocation = ToolInvocation::new(ToolRole::Recognizer, &self.config.tools.recognizer)
            .arg(&image)
            .arg(&ocr_base)
            .arg("-l")
            .arg(self.languages(request))
            .args(["-c", "textonly_pdf=1", "pdf", "tsv"])
            .env("OMP_THREAD_LIMIT", self.threads.to_string())
            .timeout(self.config.tool_timeout());
        let tool = invocation.tool_name();
        self.runner.run(&invocation).await?.require_success(&tool, &[])?;

        let report = tokio::fs::read_to_string(&report_path).await.map_err(|err| {
            ScanlayerError::Page {
                page,
                reason: format!("word report unreadable: {err}"),
            }
        })?;
        if !fragment_path.exists() {
            return Err(ScanlayerError::Page {
                page,
                reason: "recognition produced no text fragment".into(),
            });
        }
        let ParsedReport { words, text } = parse_tsv(&report, self.config.min_word_confidence)?;
        debug!(words = words.len(), image_width, image_height, "page recognized");

        Ok(PageRecognition {
            page_number: page,
            words,
            text,
            image_width,
            image_height,
            fragment_path,
        })
    }

    /// Render exactly one page to `p<NNNN>_r<dpi>.png`.
    async fn rasterize(&self, page: u32, temp: &TempRegistry) -> Result<PathBuf> {
        let stem = format!("p{page:04}_r{}", self.dpi);
        let base = temp.root().join(&stem);
        let image = temp.file(&format!("{stem}.png"));
        let page_arg = page.to_string();

        let invocation = ToolInvocation::new(ToolRole::Rasterizer, &self.config.tools.rasterizer)
            .args(["-png", "-r"])
            .arg(self.dpi.to_string())
            .args(["-f", page_arg.as_str(), "-l", page_arg.as_str(), "-singlefile"])
            .arg(&self.source)
            .arg(&base)
            .timeout(self.config.tool_timeout());
        let tool = invocation.tool_name();
        self.runner.run(&invocation).await?.require_success(&tool, &[])?;

        ensure_exists(&image, page, "rasterizer produced no image")?;
        Ok(image)
    }
}

fn ensure_exists(path: &Path, page: u32, reason: &str) -> Result<()> {
    if path.exists() {
        Ok(())
    } else {
        Err(ScanlayerError::Page {
            page,
            reason: reason.to_string(),
        })
    }
}
