// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Scanlayer OCR — turns a scanned PDF into a searchable one in the background.
//
// The `JobManager` accepts requests and runs each job in its own supervised
// execution context.  Inside it the `PipelineDriver` fans pages out over a
// pull-based worker pool (rasterize, recognize, parse), assembles the
// text-only fragments into an overlay merged onto the source, and persists
// the word indexes.  External tools are reached only through `CommandRunner`.

pub mod assemble;
pub mod command;
pub mod dpi;
pub mod index;
pub mod jobs;
pub mod pages;
pub mod pipeline;
pub mod protocol;
pub mod recognition;
pub mod scheduler;
pub mod temp;

#[cfg(test)]
pub(crate) mod testing;

pub use command::{CommandOutput, CommandRunner, SystemRunner, ToolInvocation, ToolRole};
pub use jobs::{JobManager, JobRegistry};
pub use pipeline::{FileInputStore, InputStore, PipelineDriver};
pub use protocol::{ContextCommand, EventSink, JobEvent};
