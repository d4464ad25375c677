// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Worker pipeline driver: one OCR job from input bytes to searchable document.
//
//   Initializing → Recognizing → Assembling → IndexWriting → Complete
//        └──────────────┴─────────────┴──────────────────────→ Failed
//
// Page failures are collected and reported alongside the result; only a
// byte-count mismatch, an unreadable source, zero usable pages, or a merge
// failure fail the job.  Index writing never changes the outcome.  The job's
// temp registry is dropped on every exit path, which removes its files.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use scanlayer_core::OcrConfig;
use scanlayer_core::error::{Result, ScanlayerError};
use scanlayer_core::types::{
    JobOutcome, JobOutput, JobPhase, LogLevel, PageError, PageRecognition, PageRequest, StartJob,
};
use scanlayer_document::SourceDocument;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument, warn};

use crate::assemble::assemble;
use crate::command::CommandRunner;
use crate::dpi::{detect_dpi, resolve_dpi};
use crate::index::IndexWriter;
use crate::pages::all_pages;
use crate::protocol::EventSink;
use crate::recognition::PageRecognizer;
use crate::scheduler::{self, WorkerPool};
use crate::temp::TempRegistry;

/// Persists a job's input document before any tool reads it.
#[async_trait]
pub trait InputStore: Send + Sync {
    /// Write `bytes` to `path` and return how many bytes actually landed.
    async fn persist(&self, path: &Path, bytes: &[u8]) -> Result<u64>;
}

/// [`InputStore`] writing straight to the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileInputStore;

#[async_trait]
impl InputStore for FileInputStore {
    async fn persist(&self, path: &Path, bytes: &[u8]) -> Result<u64> {
        let mut file = tokio::fs::File::create(path).await?;
        file.write_all(bytes).await?;
        file.sync_all().await?;
        Ok(tokio::fs::metadata(path).await?.len())
    }
}

/// Runs jobs.  One driver can serve any number of jobs concurrently.
#[derive(Clone)]
pub struct PipelineDriver {
    runner: Arc<dyn CommandRunner>,
    config: Arc<OcrConfig>,
    input_store: Arc<dyn InputStore>,
    cpu_count: usize,
}

impl PipelineDriver {
    pub fn new(runner: Arc<dyn CommandRunner>, config: Arc<OcrConfig>) -> Self {
        Self {
            runner,
            config,
            input_store: Arc::new(FileInputStore),
            cpu_count: scheduler::cpu_count(),
        }
    }

    pub fn with_input_store(mut self, store: Arc<dyn InputStore>) -> Self {
        self.input_store = store;
        self
    }

    /// Plan concurrency as if the machine had `cpus` CPUs.
    pub fn with_cpu_count(mut self, cpus: usize) -> Self {
        self.cpu_count = cpus.max(1);
        self
    }

    pub fn config(&self) -> &OcrConfig {
        &self.config
    }

    /// Run one job to its terminal state.  Progress and log events go to
    /// `events`; the returned outcome is for the caller to publish.
    #[instrument(skip_all, fields(job_id = %events.job_id(), requested = job.pages.len()))]
    pub async fn run(&self, job: StartJob, events: &EventSink) -> JobOutcome {
        let mut page_errors = Vec::new();
        let result = match TempRegistry::create(&self.config.temp_root, events.job_id()) {
            Ok(temp) => self.execute(job, Arc::new(temp), events, &mut page_errors).await,
            Err(err) => Err(err),
        };
        page_errors.sort_by_key(|e: &PageError| e.page_number);

        match result {
            Ok(output) => {
                enter(JobPhase::Complete);
                JobOutcome::succeeded(output, page_errors)
            }
            Err(err) => {
                enter(JobPhase::Failed);
                warn!(%err, page_errors = page_errors.len(), "job failed");
                JobOutcome::failed(err, page_errors)
            }
        }
    }

    async fn execute(
        &self,
        job: StartJob,
        temp: Arc<TempRegistry>,
        events: &EventSink,
        page_errors: &mut Vec<PageError>,
    ) -> Result<JobOutput> {
        enter(JobPhase::Initializing);
        let input = temp.file("input.pdf");
        let expected = job.document_bytes.len() as u64;
        let written = self.input_store.persist(&input, &job.document_bytes).await?;
        if written != expected {
            return Err(ScanlayerError::ByteCountMismatch { expected, written });
        }
        drop(job.document_bytes);

        let page_count = count_pages(&input).await?;
        let requests = self.validate_requests(job.pages, page_count, page_errors);
        if requests.is_empty() {
            return Err(ScanlayerError::NoUsablePages);
        }

        let explicit = job.render_dpi.filter(|dpi| *dpi > 0);
        let detected = match explicit {
            Some(_) => None,
            None => detect_dpi(self.runner.as_ref(), &self.config, &input).await,
        };
        let dpi = resolve_dpi(explicit, detected);
        let plan = scheduler::plan(
            requests.len(),
            self.cpu_count,
            self.config.max_concurrency,
            self.config.threads_per_worker,
        );
        info!(
            pages = requests.len(),
            page_count,
            dpi,
            workers = plan.worker_count,
            threads = plan.threads_per_worker,
            "job planned"
        );
        events.log(
            LogLevel::Info,
            format!(
                "recognizing {} of {page_count} pages at {dpi} dpi with {} workers",
                requests.len(),
                plan.worker_count
            ),
        );

        enter(JobPhase::Recognizing);
        let recognizer = Arc::new(PageRecognizer::new(
            Arc::clone(&self.runner),
            Arc::clone(&self.config),
            input.clone(),
            dpi,
            plan.threads_per_worker,
        ));
        let mut results = recognize_pages(
            &requests,
            plan.worker_count,
            recognizer,
            Arc::clone(&temp),
            events,
            page_errors,
        )
        .await;
        if results.is_empty() {
            return Err(ScanlayerError::NoUsablePages);
        }
        results.sort_by_key(|r| r.page_number);

        enter(JobPhase::Assembling);
        let fragments: BTreeMap<u32, _> = results
            .iter()
            .map(|r| (r.page_number, r.fragment_path.clone()))
            .collect();
        let merged = assemble(self.runner.as_ref(), &self.config, &input, fragments, &temp).await?;

        if let Some(working_copy) = job.working_copy_path {
            enter(JobPhase::IndexWriting);
            let writer = IndexWriter {
                working_copy,
                page_count,
                dpi,
                engine: self.engine_name(),
                languages: self.effective_languages(&requests),
                pages: results,
            };
            let written = tokio::task::spawn_blocking(move || writer.write_all()).await;
            if !matches!(written, Ok(true)) {
                events.log(LogLevel::Warn, "word index could not be written completely");
            }
        } else {
            debug!("no working copy path, skipping index");
        }

        self.deliver(&merged, &temp).await
    }

    /// Drop requests for pages the document does not have and duplicates.
    /// An empty request list means every page.
    fn validate_requests(
        &self,
        requested: Vec<PageRequest>,
        page_count: u32,
        page_errors: &mut Vec<PageError>,
    ) -> Vec<PageRequest> {
        if requested.is_empty() {
            return all_pages(page_count, &self.config.default_languages);
        }
        let mut seen = HashSet::new();
        let mut valid = Vec::with_capacity(requested.len());
        for request in requested {
            if request.page_number == 0 || request.page_number > page_count {
                page_errors.push(PageError {
                    page_number: request.page_number,
                    message: format!("outside the document ({page_count} pages)"),
                });
            } else if seen.insert(request.page_number) {
                valid.push(request);
            } else {
                debug!(page_number = request.page_number, "duplicate page request ignored");
            }
        }
        valid
    }

    /// Inline bytes, or the retained file when above the inline limit.
    async fn deliver(&self, merged: &Path, temp: &TempRegistry) -> Result<JobOutput> {
        let size = tokio::fs::metadata(merged).await?.len();
        if size > self.config.inline_result_limit {
            temp.retain(merged);
            info!(size, path = %merged.display(), "result exceeds inline limit, retained on disk");
            return Ok(JobOutput::Path(merged.to_path_buf()));
        }
        Ok(JobOutput::Bytes(tokio::fs::read(merged).await?))
    }

    fn engine_name(&self) -> String {
        self.config
            .tools
            .recognizer
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "tesseract".to_string())
    }

    /// Languages used across the job, in first-seen order.
    fn effective_languages(&self, requests: &[PageRequest]) -> Vec<String> {
        let mut languages: Vec<String> = Vec::new();
        for request in requests {
            let page_languages = if request.languages.is_empty() {
                &self.config.default_languages
            } else {
                &request.languages
            };
            for language in page_languages {
                if !languages.contains(language) {
                    languages.push(language.clone());
                }
            }
        }
        languages
    }
}

/// Fan the requests out over the worker pool and collect results,
/// emitting one progress event before the first page and one after each.
async fn recognize_pages(
    requests: &[PageRequest],
    workers: usize,
    recognizer: Arc<PageRecognizer>,
    temp: Arc<TempRegistry>,
    events: &EventSink,
    page_errors: &mut Vec<PageError>,
) -> Vec<PageRecognition> {
    let total = requests.len() as u32;
    // `current_page` follows input order, so the indicator only moves forward
    // even though pages finish out of order.
    let positional = |processed: u32| requests[processed.saturating_sub(1) as usize].page_number;
    events.progress(requests[0].page_number, 0, total);

    let mut pool = WorkerPool::spawn(requests.to_vec(), workers, move |request: PageRequest| {
        let recognizer = Arc::clone(&recognizer);
        let temp = Arc::clone(&temp);
        async move {
            let outcome = recognizer.recognize(&request, &temp).await;
            (request.page_number, outcome)
        }
    });

    let mut results = Vec::with_capacity(requests.len());
    let mut finished = HashSet::new();
    let mut processed = 0u32;
    while let Some((page_number, outcome)) = pool.next().await {
        finished.insert(page_number);
        match outcome {
            Ok(recognition) => results.push(recognition),
            Err(err) => {
                warn!(page_number, %err, "page failed");
                events.log(LogLevel::Warn, format!("page {page_number}: {err}"));
                page_errors.push(PageError {
                    page_number,
                    message: err.to_string(),
                });
            }
        }
        processed += 1;
        events.progress(positional(processed), processed, total);
    }

    // A worker that died mid-page never reports back.
    for request in requests {
        if !finished.contains(&request.page_number) {
            warn!(page_number = request.page_number, "page never completed");
            page_errors.push(PageError {
                page_number: request.page_number,
                message: "recognition did not complete".into(),
            });
            processed += 1;
            events.progress(positional(processed), processed, total);
        }
    }
    results
}

fn enter(phase: JobPhase) {
    debug!(?phase, terminal = phase.is_terminal(), "job phase");
}

async fn count_pages(path: &Path) -> Result<u32> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || SourceDocument::open(&path).map(|doc| doc.page_count() as u32))
        .await
        .map_err(|err| ScanlayerError::PdfError(format!("page count aborted: {err}")))?
}
