// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Scanlayer.

use std::time::Duration;

use thiserror::Error;

/// Maximum number of characters of captured tool output kept in an error.
pub const MAX_CAPTURED_OUTPUT: usize = 2000;

/// Top-level error type for all Scanlayer operations.
#[derive(Debug, Error)]
pub enum ScanlayerError {
    // -- External tools --
    #[error("{tool} exited with {}: {output}", describe_exit(.code))]
    Tool {
        tool: String,
        /// `None` when the process was terminated by a signal.
        code: Option<i32>,
        /// Captured stderr (or stdout when stderr was empty), truncated.
        output: String,
    },

    #[error("{tool} timed out after {}s", .after.as_secs())]
    TimedOut { tool: String, after: Duration },

    #[error("failed to launch {tool}: {source}")]
    ToolSpawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    // -- Job-level failures --
    #[error("input persisted {written} of {expected} bytes")]
    ByteCountMismatch { expected: u64, written: u64 },

    #[error("no page produced usable recognition output")]
    NoUsablePages,

    #[error("merge failed: {0}")]
    Merge(String),

    #[error("execution context terminated unexpectedly: {0}")]
    ContextCrashed(String),

    // -- Page-level failures --
    #[error("page {page} {reason}")]
    Page { page: u32, reason: String },

    #[error("recognition output could not be parsed: {0}")]
    Parse(String),

    // -- Document errors --
    #[error("PDF operation failed: {0}")]
    PdfError(String),

    #[error("image processing failed: {0}")]
    ImageError(String),

    // -- Configuration --
    #[error("invalid configuration: {0}")]
    Config(String),

    // -- Storage / persistence --
    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ScanlayerError {
    /// Build a normalised tool failure, truncating the captured output.
    pub fn tool(tool: impl Into<String>, code: Option<i32>, output: &str) -> Self {
        Self::Tool {
            tool: tool.into(),
            code,
            output: truncate_output(output),
        }
    }

    /// Whether this error came from an invocation exceeding its time limit.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::TimedOut { .. })
    }
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("code {code}"),
        None => "signal".to_string(),
    }
}

/// Trim captured process output down to [`MAX_CAPTURED_OUTPUT`] characters.
pub fn truncate_output(output: &str) -> String {
    let trimmed = output.trim();
    if trimmed.chars().count() <= MAX_CAPTURED_OUTPUT {
        return trimmed.to_string();
    }
    let mut truncated: String = trimmed.chars().take(MAX_CAPTURED_OUTPUT).collect();
    truncated.push_str("…");
    truncated
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, ScanlayerError>;
