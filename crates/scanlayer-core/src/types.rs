// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the Scanlayer OCR pipeline.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for an OCR job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle states of a job run inside its execution context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobPhase {
    /// Persisting the input document and probing it.
    Initializing,
    /// Pages are being rasterized and recognized in parallel.
    Recognizing,
    /// Building the overlay and merging it onto the source.
    Assembling,
    /// Persisting the v1/v2 word indexes.
    IndexWriting,
    /// Terminal: a searchable document was produced.
    Complete,
    /// Terminal: the job could not produce a document.
    Failed,
}

impl JobPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }
}

/// One page to recognize.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageRequest {
    /// 1-based page number, unique within a job.
    pub page_number: u32,
    /// Recognition language codes in priority order (e.g. `["eng", "deu"]`).
    #[serde(default)]
    pub languages: Vec<String>,
}

impl PageRequest {
    pub fn new(page_number: u32, languages: &[&str]) -> Self {
        Self {
            page_number,
            languages: languages.iter().map(|l| l.to_string()).collect(),
        }
    }
}

/// Everything the execution context needs to run a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartJob {
    pub document_bytes: Vec<u8>,
    pub pages: Vec<PageRequest>,
    /// When set, indexes are written next to this path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_copy_path: Option<PathBuf>,
    /// Explicit rasterization resolution; wins over detection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub render_dpi: Option<u32>,
}

/// A recognized word with its bounding box in image pixels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Word {
    pub text: String,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Output of recognizing a single page.
#[derive(Debug, Clone, PartialEq)]
pub struct PageRecognition {
    pub page_number: u32,
    pub words: Vec<Word>,
    /// Lines joined with `\n`, words within a line joined with a space.
    pub text: String,
    pub image_width: u32,
    pub image_height: u32,
    /// Text-only single-page PDF produced by the recognition engine.
    pub fragment_path: PathBuf,
}

/// Worker sizing computed once per job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConcurrencyPlan {
    pub worker_count: usize,
    pub threads_per_worker: usize,
}

/// A page that was dropped from the job, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageError {
    pub page_number: u32,
    pub message: String,
}

impl std::fmt::Display for PageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "page {}: {}", self.page_number, self.message)
    }
}

/// Where the finished searchable document lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum JobOutput {
    /// Small documents are returned inline.
    Bytes(Vec<u8>),
    /// Large documents stay on disk at a retained path owned by the caller.
    Path(PathBuf),
}

/// Terminal result of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<JobOutput>,
    /// Pages that were not recognized.
    #[serde(default)]
    pub errors: Vec<PageError>,
    /// Single top-level failure, present only when `success` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobOutcome {
    pub fn succeeded(output: JobOutput, errors: Vec<PageError>) -> Self {
        Self {
            success: true,
            output: Some(output),
            errors,
            error: None,
        }
    }

    pub fn failed(error: impl std::fmt::Display, errors: Vec<PageError>) -> Self {
        Self {
            success: false,
            output: None,
            errors,
            error: Some(error.to_string()),
        }
    }
}

/// Severity of a diagnostic line forwarded to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        };
        f.write_str(label)
    }
}
