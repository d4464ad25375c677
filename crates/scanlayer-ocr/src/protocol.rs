// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Messages between the job manager and a job's execution context.
//
// Both directions are typed enums that serialize to the JSON wire shape
// `{"type": "...", "jobId": ..., ...}` so they can cross a process boundary
// unchanged if execution contexts are ever moved out of process.

use scanlayer_core::types::{JobId, JobOutcome, LogLevel, StartJob};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

/// Inbound: manager → execution context.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum ContextCommand {
    Start { job_id: JobId, data: StartJob },
}

/// Outbound: execution context → manager → caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum JobEvent {
    Progress {
        job_id: JobId,
        current_page: u32,
        processed_count: u32,
        total_pages: u32,
    },
    Complete {
        job_id: JobId,
        #[serde(flatten)]
        outcome: JobOutcome,
    },
    Log {
        job_id: JobId,
        level: LogLevel,
        message: String,
    },
}

impl JobEvent {
    pub fn job_id(&self) -> JobId {
        match self {
            Self::Progress { job_id, .. } | Self::Complete { job_id, .. } | Self::Log { job_id, .. } => {
                *job_id
            }
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete { .. })
    }
}

/// Sending half of a job's event stream, bound to one job id.
#[derive(Debug, Clone)]
pub struct EventSink {
    job_id: JobId,
    tx: mpsc::UnboundedSender<JobEvent>,
}

impl EventSink {
    pub fn new(job_id: JobId, tx: mpsc::UnboundedSender<JobEvent>) -> Self {
        Self { job_id, tx }
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    pub fn progress(&self, current_page: u32, processed_count: u32, total_pages: u32) {
        self.emit(JobEvent::Progress {
            job_id: self.job_id,
            current_page,
            processed_count,
            total_pages,
        });
    }

    pub fn log(&self, level: LogLevel, message: impl Into<String>) {
        self.emit(JobEvent::Log {
            job_id: self.job_id,
            level,
            message: message.into(),
        });
    }

    pub fn complete(&self, outcome: JobOutcome) {
        self.emit(JobEvent::Complete {
            job_id: self.job_id,
            outcome,
        });
    }

    fn emit(&self, event: JobEvent) {
        if self.tx.send(event).is_err() {
            debug!(job_id = %self.job_id, "event receiver gone, dropping event");
        }
    }
}
