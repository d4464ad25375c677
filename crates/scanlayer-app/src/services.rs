// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Service layer for the command line: resolves configuration once, owns the
// job manager, and turns a parsed `ocr` invocation into a job.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use scanlayer_core::OcrConfig;
use scanlayer_core::error::{Result, ScanlayerError};
use scanlayer_core::types::{JobOutcome, JobOutput, LogLevel, PageRequest, StartJob};
use scanlayer_document::SourceDocument;
use scanlayer_ocr::pages::{all_pages, parse_page_selection};
use scanlayer_ocr::{CommandRunner, JobEvent, JobManager, JobRegistry, PipelineDriver, SystemRunner, ToolRole};
use serde_json::json;
use tracing::{debug, error, info, warn};

use crate::cli::OcrArgs;

/// Environment variable naming the JSON configuration file.
pub const CONFIG_ENV: &str = "SCANLAYER_CONFIG";

pub struct AppServices {
    config: Arc<OcrConfig>,
    runner: Arc<SystemRunner>,
    manager: JobManager,
}

/// Result of probing one external tool.
#[derive(Debug, Clone)]
pub struct ToolStatus {
    pub role: ToolRole,
    pub program: PathBuf,
    pub available: bool,
}

impl AppServices {
    /// Resolve configuration and start the job manager.  Call once, inside
    /// the runtime.
    pub fn init() -> Result<Self> {
        let config_path = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
        let config = Arc::new(OcrConfig::load(config_path.as_deref())?);
        debug!(?config, "configuration resolved");

        let runner = Arc::new(SystemRunner);
        let driver = PipelineDriver::new(runner.clone(), Arc::clone(&config));
        let manager = JobManager::new(driver, JobRegistry::new());
        info!("services initialised");
        Ok(Self {
            config,
            runner,
            manager,
        })
    }

    /// Probe every configured external tool.
    pub async fn doctor(&self) -> Vec<ToolStatus> {
        let tools = &self.config.tools;
        let roles = [
            (ToolRole::Rasterizer, &tools.rasterizer),
            (ToolRole::Recognizer, &tools.recognizer),
            (ToolRole::Merger, &tools.merger),
            (ToolRole::Inspector, &tools.inspector),
        ];
        let mut statuses = Vec::with_capacity(roles.len());
        for (role, program) in roles {
            let available = self.runner.probe(role, program).await;
            statuses.push(ToolStatus {
                role,
                program: program.clone(),
                available,
            });
        }
        statuses
    }

    /// Run one OCR job to completion, writing the searchable document to the
    /// requested output.  Returns `None` if the user interrupted the job.
    pub async fn run_ocr(&self, args: &OcrArgs) -> Result<Option<JobOutcome>> {
        let document_bytes = tokio::fs::read(&args.input).await?;
        let page_count = SourceDocument::from_bytes(&document_bytes)?.page_count() as u32;
        let pages = requested_pages(args, page_count, &self.config.default_languages)?;
        info!(input = %args.input.display(), page_count, requested = pages.len(), "submitting job");

        let request = StartJob {
            document_bytes,
            pages,
            working_copy_path: args.working_copy.clone(),
            render_dpi: args.dpi,
        };
        let (job_id, mut events) = self.manager.start_with_events(request);

        let outcome = loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(JobEvent::Complete { outcome, .. }) => break outcome,
                    Some(event) => report(&event, args.json),
                    None => {
                        return Err(ScanlayerError::ContextCrashed(
                            "event stream closed before completion".into(),
                        ));
                    }
                },
                _ = tokio::signal::ctrl_c() => {
                    warn!(%job_id, "interrupted, cancelling job");
                    self.manager.cancel(job_id);
                    return Ok(None);
                }
            }
        };

        if let Some(output) = &outcome.output {
            let target = args.output_path();
            write_output(output, &target).await?;
            info!(output = %target.display(), "searchable document written");
        }
        report_outcome(&outcome, args);
        Ok(Some(outcome))
    }
}

/// Page requests for the invocation: the `--pages` selection or every page,
/// each with the `--lang` languages (empty means the configured default).
pub fn requested_pages(args: &OcrArgs, page_count: u32, defaults: &[String]) -> Result<Vec<PageRequest>> {
    let languages = if args.languages.is_empty() {
        defaults.to_vec()
    } else {
        args.languages.clone()
    };
    match &args.pages {
        Some(expr) => {
            let selected = parse_page_selection(expr, page_count)?;
            if selected.is_empty() {
                return Err(ScanlayerError::Config(format!(
                    "page selection {expr:?} matches none of {page_count} pages"
                )));
            }
            Ok(selected
                .into_iter()
                .map(|page_number| PageRequest {
                    page_number,
                    languages: languages.clone(),
                })
                .collect())
        }
        None => Ok(all_pages(page_count, &languages)),
    }
}

async fn write_output(output: &JobOutput, target: &Path) -> Result<()> {
    match output {
        JobOutput::Bytes(bytes) => tokio::fs::write(target, bytes).await?,
        JobOutput::Path(retained) => {
            tokio::fs::copy(retained, target).await?;
            if let Err(err) = tokio::fs::remove_file(retained).await {
                warn!(path = %retained.display(), %err, "could not remove retained result");
            }
            if let Some(job_dir) = retained.parent() {
                let _ = tokio::fs::remove_dir(job_dir).await;
            }
        }
    }
    Ok(())
}

fn report(event: &JobEvent, json: bool) {
    if json {
        match serde_json::to_string(event) {
            Ok(line) => println!("{line}"),
            Err(err) => warn!(%err, "event not serialisable"),
        }
        return;
    }
    match event {
        JobEvent::Progress {
            current_page,
            processed_count,
            total_pages,
            ..
        } => info!(current_page, "{processed_count}/{total_pages} pages"),
        JobEvent::Log { level, message, .. } => match level {
            LogLevel::Debug => debug!("{message}"),
            LogLevel::Info => info!("{message}"),
            LogLevel::Warn => warn!("{message}"),
            LogLevel::Error => error!("{message}"),
        },
        JobEvent::Complete { .. } => {}
    }
}

fn report_outcome(outcome: &JobOutcome, args: &OcrArgs) {
    if args.json {
        let summary = json!({
            "type": "complete",
            "success": outcome.success,
            "output": outcome.output.as_ref().map(|_| args.output_path()),
            "errors": outcome.errors,
            "error": outcome.error,
        });
        println!("{summary}");
        return;
    }
    for page_error in &outcome.errors {
        warn!("{page_error}");
    }
    if let Some(err) = &outcome.error {
        error!("job failed: {err}");
    }
}
