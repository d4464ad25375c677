// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Job manager.
//
// Each job runs in its own execution context: a tokio task that receives one
// `ContextCommand::Start`, drives the pipeline, and reports through the shared
// event channel.  A supervisor task awaits every context; a context that
// panics or exits without completing is reported to the caller as a single
// job failure.  One dispatcher task republishes every event to the caller
// that started the job and forgets the job once its completion goes out.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use scanlayer_core::error::ScanlayerError;
use scanlayer_core::types::{JobId, JobOutcome, StartJob};
use tokio::sync::mpsc;
use tokio::task::{AbortHandle, JoinError, JoinHandle};
use tracing::{debug, error, info, instrument, warn};

use crate::pipeline::PipelineDriver;
use crate::protocol::{ContextCommand, EventSink, JobEvent};

struct JobEntry {
    context: AbortHandle,
    subscriber: mpsc::UnboundedSender<JobEvent>,
}

/// Running jobs keyed by id.  Cheap to clone; clones share the same map.
#[derive(Clone, Default)]
pub struct JobRegistry {
    jobs: Arc<Mutex<HashMap<JobId, JobEntry>>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ids of every job that has not completed or been cancelled.
    pub fn active(&self) -> Vec<JobId> {
        self.lock().keys().copied().collect()
    }

    pub fn contains(&self, job_id: JobId) -> bool {
        self.lock().contains_key(&job_id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn insert(&self, job_id: JobId, entry: JobEntry) {
        self.lock().insert(job_id, entry);
    }

    fn remove(&self, job_id: JobId) -> Option<JobEntry> {
        self.lock().remove(&job_id)
    }

    fn subscriber(&self, job_id: JobId) -> Option<mpsc::UnboundedSender<JobEvent>> {
        self.lock().get(&job_id).map(|entry| entry.subscriber.clone())
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<JobId, JobEntry>> {
        self.jobs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Starts, tracks, and cancels OCR jobs.  Must be created inside a tokio
/// runtime.
pub struct JobManager {
    driver: PipelineDriver,
    registry: JobRegistry,
    events: mpsc::UnboundedSender<JobEvent>,
    dispatcher: JoinHandle<()>,
}

impl JobManager {
    pub fn new(driver: PipelineDriver, registry: JobRegistry) -> Self {
        let (events, inbox) = mpsc::unbounded_channel();
        let dispatcher = tokio::spawn(dispatch(registry.clone(), inbox));
        Self {
            driver,
            registry,
            events,
            dispatcher,
        }
    }

    /// Start a job in a fresh execution context and return its id at once.
    /// Every event of the job, ending with exactly one `Complete`, is sent to
    /// `subscriber`.
    #[instrument(skip_all, fields(pages = request.pages.len()))]
    pub fn start(&self, request: StartJob, subscriber: mpsc::UnboundedSender<JobEvent>) -> JobId {
        let job_id = JobId::new();
        let (commands, inbox) = mpsc::unbounded_channel();

        let context = tokio::spawn(run_context(self.driver.clone(), inbox, self.events.clone()));
        self.registry.insert(
            job_id,
            JobEntry {
                context: context.abort_handle(),
                subscriber,
            },
        );
        tokio::spawn(supervise(job_id, context, self.events.clone()));

        if commands.send(ContextCommand::Start { job_id, data: request }).is_err() {
            warn!(%job_id, "execution context gone before start");
        }
        info!(%job_id, "job started");
        job_id
    }

    /// Convenience wrapper around [`start`](Self::start) that creates the
    /// subscriber channel.
    pub fn start_with_events(&self, request: StartJob) -> (JobId, mpsc::UnboundedReceiver<JobEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (self.start(request, tx), rx)
    }

    /// Terminate a job immediately.  No further events are delivered for it.
    /// Unknown or already finished jobs are ignored.
    pub fn cancel(&self, job_id: JobId) {
        match self.registry.remove(job_id) {
            Some(entry) => {
                entry.context.abort();
                info!(%job_id, "job cancelled");
            }
            None => debug!(%job_id, "cancel for unknown or finished job ignored"),
        }
    }

    pub fn is_running(&self, job_id: JobId) -> bool {
        self.registry.contains(job_id)
    }

    pub fn active_jobs(&self) -> Vec<JobId> {
        self.registry.active()
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }
}

impl Drop for JobManager {
    fn drop(&mut self) {
        for job_id in self.registry.active() {
            self.cancel(job_id);
        }
        self.dispatcher.abort();
    }
}

/// Body of one execution context.  Returns whether the job completed through
/// the protocol.
async fn run_context(
    driver: PipelineDriver,
    mut inbox: mpsc::UnboundedReceiver<ContextCommand>,
    events: mpsc::UnboundedSender<JobEvent>,
) -> bool {
    match inbox.recv().await {
        Some(ContextCommand::Start { job_id, data }) => {
            let sink = EventSink::new(job_id, events);
            let outcome = driver.run(data, &sink).await;
            sink.complete(outcome);
            true
        }
        None => false,
    }
}

/// Turn an abnormal context exit into one aggregate failure.
async fn supervise(
    job_id: JobId,
    context: JoinHandle<bool>,
    events: mpsc::UnboundedSender<JobEvent>,
) {
    let reason = match context.await {
        Ok(true) => return,
        Ok(false) => "exited without completing the job".to_string(),
        Err(err) if err.is_cancelled() => {
            debug!(%job_id, "execution context aborted");
            return;
        }
        Err(err) => panic_message(err),
    };

    let failure = ScanlayerError::ContextCrashed(reason);
    error!(%job_id, %failure, "execution context failed");
    let event = JobEvent::Complete {
        job_id,
        outcome: JobOutcome::failed(failure, Vec::new()),
    };
    if events.send(event).is_err() {
        debug!(%job_id, "dispatcher gone, crash report dropped");
    }
}

fn panic_message(err: JoinError) -> String {
    match err.try_into_panic() {
        Ok(payload) => {
            if let Some(msg) = payload.downcast_ref::<&str>() {
                format!("panicked: {msg}")
            } else if let Some(msg) = payload.downcast_ref::<String>() {
                format!("panicked: {msg}")
            } else {
                "panicked".to_string()
            }
        }
        Err(err) => err.to_string(),
    }
}

async fn dispatch(registry: JobRegistry, mut inbox: mpsc::UnboundedReceiver<JobEvent>) {
    while let Some(event) = inbox.recv().await {
        let job_id = event.job_id();
        let subscriber = if event.is_complete() {
            registry.remove(job_id).map(|entry| entry.subscriber)
        } else {
            registry.subscriber(job_id)
        };
        match subscriber {
            Some(subscriber) => {
                if subscriber.send(event).is_err() {
                    debug!(%job_id, "caller stopped listening");
                }
            }
            None => debug!(%job_id, "event for unknown or cancelled job dropped"),
        }
    }
}
