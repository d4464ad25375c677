// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Pipeline configuration.
//
// Resolved once at startup: defaults, then an optional JSON file, then
// `SCANLAYER_*` environment variables.  Overrides are validated here so the
// rest of the pipeline never re-reads the environment.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Result, ScanlayerError};

/// Exit code qpdf uses for "succeeded with warnings".
pub const QPDF_WARNING_EXIT_CODE: i32 = 3;

/// Words whose engine confidence is below this are dropped.  Tesseract
/// reports `-1` for rows it has no confidence for.
pub const DEFAULT_MIN_WORD_CONFIDENCE: f32 = 0.0;

/// Results larger than this are handed back as a file path.
pub const DEFAULT_INLINE_RESULT_LIMIT: u64 = 32 * 1024 * 1024;

/// Default wall-clock limit for every external tool invocation.
pub const DEFAULT_TOOL_TIMEOUT_SECS: u64 = 300;

/// Binaries for each external tool role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolPaths {
    /// Rasterizer (poppler `pdftoppm`).
    pub rasterizer: PathBuf,
    /// Recognition engine (`tesseract`).
    pub recognizer: PathBuf,
    /// Overlay merge tool (`qpdf`).
    pub merger: PathBuf,
    /// Embedded-image introspection (poppler `pdfimages`).
    pub inspector: PathBuf,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            rasterizer: PathBuf::from("pdftoppm"),
            recognizer: PathBuf::from("tesseract"),
            merger: PathBuf::from("qpdf"),
            inspector: PathBuf::from("pdfimages"),
        }
    }
}

/// Settings for the OCR pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    /// Operator cap on parallel page workers.
    pub max_concurrency: Option<usize>,
    /// Operator override for recognition threads per worker.
    pub threads_per_worker: Option<usize>,
    pub tools: ToolPaths,
    /// Per-invocation timeout in seconds; `None` disables it.
    pub tool_timeout_secs: Option<u64>,
    pub min_word_confidence: f32,
    pub inline_result_limit: u64,
    /// Used for pages that request no languages.
    pub default_languages: Vec<String>,
    /// Parent directory for per-job working directories.
    pub temp_root: PathBuf,
    /// Non-zero merge exit code that still counts as success.
    pub merge_warning_code: i32,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            max_concurrency: None,
            threads_per_worker: None,
            tools: ToolPaths::default(),
            tool_timeout_secs: Some(DEFAULT_TOOL_TIMEOUT_SECS),
            min_word_confidence: DEFAULT_MIN_WORD_CONFIDENCE,
            inline_result_limit: DEFAULT_INLINE_RESULT_LIMIT,
            default_languages: vec!["eng".to_string()],
            temp_root: std::env::temp_dir(),
            merge_warning_code: QPDF_WARNING_EXIT_CODE,
        }
    }
}

impl OcrConfig {
    /// Resolve the configuration from defaults, an optional JSON file, and
    /// the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        config.validate();
        Ok(config)
    }

    /// Read a JSON config file; missing keys keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path).map_err(|e| {
            ScanlayerError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        let config = serde_json::from_str(&data).map_err(|e| {
            ScanlayerError::Config(format!("cannot parse {}: {e}", path.display()))
        })?;
        debug!(path = %path.display(), "configuration file loaded");
        Ok(config)
    }

    /// Apply `SCANLAYER_*` overrides using the given variable lookup.
    ///
    /// Unparsable values are ignored with a warning.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(raw) = lookup("SCANLAYER_MAX_CONCURRENCY") {
            self.max_concurrency = parse_count("SCANLAYER_MAX_CONCURRENCY", &raw);
        }
        if let Some(raw) = lookup("SCANLAYER_THREADS_PER_WORKER") {
            self.threads_per_worker = parse_count("SCANLAYER_THREADS_PER_WORKER", &raw);
        }
        if let Some(raw) = lookup("SCANLAYER_TIMEOUT_SECS") {
            match raw.trim().parse::<u64>() {
                Ok(0) => self.tool_timeout_secs = None,
                Ok(secs) => self.tool_timeout_secs = Some(secs),
                Err(_) => warn!(value = %raw, "ignoring invalid SCANLAYER_TIMEOUT_SECS"),
            }
        }
        if let Some(raw) = lookup("SCANLAYER_MIN_CONFIDENCE") {
            match raw.trim().parse::<f32>() {
                Ok(conf) if conf.is_finite() => self.min_word_confidence = conf,
                _ => warn!(value = %raw, "ignoring invalid SCANLAYER_MIN_CONFIDENCE"),
            }
        }
        if let Some(raw) = lookup("SCANLAYER_TEMP_DIR") {
            self.temp_root = PathBuf::from(raw);
        }

        let tools = [
            ("SCANLAYER_PDFTOPPM", &mut self.tools.rasterizer),
            ("SCANLAYER_TESSERACT", &mut self.tools.recognizer),
            ("SCANLAYER_QPDF", &mut self.tools.merger),
            ("SCANLAYER_PDFIMAGES", &mut self.tools.inspector),
        ];
        for (key, slot) in tools {
            if let Some(raw) = lookup(key).filter(|raw| !raw.trim().is_empty()) {
                *slot = PathBuf::from(raw.trim());
            }
        }
    }

    /// Clamp out-of-range values loaded from a file.
    pub fn validate(&mut self) {
        if self.max_concurrency == Some(0) {
            warn!("max_concurrency must be positive; using the CPU-based default");
            self.max_concurrency = None;
        }
        if self.threads_per_worker == Some(0) {
            warn!("threads_per_worker must be positive; using the CPU-based default");
            self.threads_per_worker = None;
        }
        if self.tool_timeout_secs == Some(0) {
            self.tool_timeout_secs = None;
        }
        if self.default_languages.is_empty() {
            self.default_languages = vec!["eng".to_string()];
        }
    }

    /// Wall-clock limit applied to each external tool invocation.
    pub fn tool_timeout(&self) -> Option<Duration> {
        self.tool_timeout_secs.map(Duration::from_secs)
    }
}

fn parse_count(key: &str, raw: &str) -> Option<usize> {
    match raw.trim().parse::<i64>() {
        Ok(n) if n > 0 => Some(n as usize),
        _ => {
            warn!(key, value = %raw, "ignoring non-positive concurrency override");
            None
        }
    }
}
