//! Off-thread execution of field jobs.
//!
//! A [`FieldWorker`] owns one dedicated thread. Requests go in over a
//! command channel; progress, results, and errors come back over an event
//! channel, each tagged with the [`JobId`] it belongs to. Callers that keep
//! replacing their request use a [`JobTracker`] to drop events from jobs
//! they have already superseded.

use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::backend::ComputeBackend;
use crate::cancel::{CancelToken, Cancellation};
use crate::job::run_field_job;
use crate::request::{FieldRequest, FieldResult};

/// Identifies one submitted job. `nonce` distinguishes generators, so ids
/// from two sessions never collide even though both count from 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId {
    pub sequence: u64,
    pub nonce: u64,
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job-{}-{:08x}", self.sequence, self.nonce as u32)
    }
}

/// Hands out strictly increasing [`JobId`]s.
#[derive(Debug, Clone)]
pub struct JobIdGenerator {
    next: u64,
    nonce: u64,
}

impl JobIdGenerator {
    pub fn new() -> Self {
        Self {
            next: 1,
            nonce: Uuid::new_v4().as_u128() as u64,
        }
    }

    pub fn next_id(&mut self) -> JobId {
        let id = JobId { sequence: self.next, nonce: self.nonce };
        self.next += 1;
        id
    }
}

impl Default for JobIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Errors from talking to a worker.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Field worker is no longer running")]
    Disconnected,

    #[error("{0} is already queued")]
    DuplicateJob(JobId),

    #[error("Timed out waiting for worker events")]
    Timeout,

    #[error("Failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Command sent to the worker thread.
#[derive(Debug)]
pub enum WorkerCommand {
    Start {
        job_id: JobId,
        request: Box<FieldRequest>,
        token: CancelToken,
    },
    Shutdown,
}

/// Event emitted by the worker thread.
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    /// Fraction of the job completed, in `(0, 1]`.
    Progress { job_id: JobId, fraction: f64 },
    Result { job_id: JobId, result: FieldResult },
    Error { job_id: JobId, message: String },
}

impl WorkerEvent {
    pub fn job_id(&self) -> JobId {
        match self {
            WorkerEvent::Progress { job_id, .. }
            | WorkerEvent::Result { job_id, .. }
            | WorkerEvent::Error { job_id, .. } => *job_id,
        }
    }

    /// Result and Error end a job; Progress does not.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, WorkerEvent::Progress { .. })
    }
}

/// Handle to a worker thread running field jobs one at a time, in order.
///
/// Dropping the handle cancels everything still pending and joins the
/// thread.
pub struct FieldWorker {
    commands: Sender<WorkerCommand>,
    events: Receiver<WorkerEvent>,
    pending: HashMap<JobId, CancelToken>,
    handle: Option<JoinHandle<()>>,
    name: String,
}

impl FieldWorker {
    /// Spawn a worker on the crate's default backend.
    pub fn spawn() -> Result<Self, TransportError> {
        Self::spawn_with_backend("phasefield-worker", crate::default_backend())
    }

    pub fn spawn_with_backend(
        name: &str,
        backend: Arc<dyn ComputeBackend>,
    ) -> Result<Self, TransportError> {
        let (command_tx, command_rx) = channel::unbounded();
        let (event_tx, event_rx) = channel::unbounded();
        let thread_name = name.to_string();

        log::info!(
            "[Worker:{}] Starting on {}",
            thread_name,
            backend.device_info().name
        );
        let handle = thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || worker_loop(&thread_name, command_rx, event_tx, backend))?;

        Ok(Self {
            commands: command_tx,
            events: event_rx,
            pending: HashMap::new(),
            handle: Some(handle),
            name: name.to_string(),
        })
    }

    /// Queue a job. Jobs run in submission order.
    pub fn start(&mut self, job_id: JobId, request: FieldRequest) -> Result<(), TransportError> {
        if self.pending.contains_key(&job_id) {
            return Err(TransportError::DuplicateJob(job_id));
        }
        let token = CancelToken::new();
        self.commands
            .send(WorkerCommand::Start {
                job_id,
                request: Box::new(request),
                token: token.clone(),
            })
            .map_err(|_| TransportError::Disconnected)?;
        self.pending.insert(job_id, token);
        Ok(())
    }

    /// Cancel a queued or running job.
    ///
    /// Returns `true` if the job will emit no `Result` or `Error`. Returns
    /// `false` for unknown ids and for jobs whose terminal event is already
    /// on its way.
    pub fn cancel(&mut self, job_id: JobId) -> bool {
        match self.pending.remove(&job_id) {
            Some(token) => {
                let cancelled = token.cancel();
                log::debug!("[Worker:{}] Cancel {}: {}", self.name, job_id, cancelled);
                cancelled
            }
            None => false,
        }
    }

    /// Cancel whatever `tracker` last issued, then submit `request` as the
    /// tracker's new latest job.
    pub fn supersede(
        &mut self,
        tracker: &mut JobTracker,
        request: FieldRequest,
    ) -> Result<JobId, TransportError> {
        if let Some(previous) = tracker.latest() {
            self.cancel(previous);
        }
        let job_id = tracker.next_job();
        self.start(job_id, request)?;
        Ok(job_id)
    }

    /// Number of jobs submitted whose terminal event has not been received.
    pub fn pending_jobs(&self) -> usize {
        self.pending.len()
    }

    pub fn try_recv(&mut self) -> Result<Option<WorkerEvent>, TransportError> {
        match self.events.try_recv() {
            Ok(event) => Ok(Some(self.settle(event))),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(TransportError::Disconnected),
        }
    }

    pub fn recv_timeout(&mut self, timeout: Duration) -> Result<WorkerEvent, TransportError> {
        match self.events.recv_timeout(timeout) {
            Ok(event) => Ok(self.settle(event)),
            Err(RecvTimeoutError::Timeout) => Err(TransportError::Timeout),
            Err(RecvTimeoutError::Disconnected) => Err(TransportError::Disconnected),
        }
    }

    fn settle(&mut self, event: WorkerEvent) -> WorkerEvent {
        if event.is_terminal() {
            self.pending.remove(&event.job_id());
        }
        event
    }

    /// Cancel pending jobs, stop the thread, and wait for it.
    pub fn shutdown(&mut self) {
        for token in self.pending.values() {
            token.cancel();
        }
        self.pending.clear();
        let _ = self.commands.send(WorkerCommand::Shutdown);
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.join() {
                log::error!("[Worker:{}] Join error: {:?}", self.name, e);
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().map_or(false, |h| !h.is_finished())
    }
}

impl Drop for FieldWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(
    name: &str,
    commands: Receiver<WorkerCommand>,
    events: Sender<WorkerEvent>,
    backend: Arc<dyn ComputeBackend>,
) {
    while let Ok(command) = commands.recv() {
        match command {
            WorkerCommand::Start { job_id, request, token } => {
                run_one(name, job_id, &request, &token, backend.as_ref(), &events);
            }
            WorkerCommand::Shutdown => break,
        }
    }
    log::info!("[Worker:{}] Stopped", name);
}

fn run_one(
    name: &str,
    job_id: JobId,
    request: &FieldRequest,
    token: &CancelToken,
    backend: &dyn ComputeBackend,
    events: &Sender<WorkerEvent>,
) {
    if token.is_cancelled() {
        log::debug!("[Worker:{}] Skipping cancelled {}", name, job_id);
        return;
    }

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        let mut progress = |fraction: f64| {
            if !token.is_cancelled() {
                let _ = events.send(WorkerEvent::Progress { job_id, fraction });
            }
        };
        run_field_job(request, backend, token, &mut progress)
    }));

    let event = match outcome {
        Ok(Ok(Some(result))) => WorkerEvent::Result { job_id, result },
        Ok(Ok(None)) => {
            log::debug!("[Worker:{}] {} cancelled mid-run", name, job_id);
            return;
        }
        Ok(Err(e)) => {
            log::warn!("[Worker:{}] {} failed: {}", name, job_id, e);
            WorkerEvent::Error { job_id, message: e.to_string() }
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            log::error!("[Worker:{}] {} panicked: {}", name, job_id, message);
            WorkerEvent::Error { job_id, message: format!("internal error: {}", message) }
        }
    };

    if token.claim_delivery() {
        if events.send(event).is_err() {
            log::debug!("[Worker:{}] Event channel closed", name);
        }
    } else {
        log::debug!("[Worker:{}] Dropping outcome of cancelled {}", name, job_id);
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Remembers the most recently issued job so stale events can be ignored.
#[derive(Debug, Default)]
pub struct JobTracker {
    generator: JobIdGenerator,
    latest: Option<JobId>,
}

impl JobTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a new id and make it the latest.
    pub fn next_job(&mut self) -> JobId {
        let id = self.generator.next_id();
        self.latest = Some(id);
        id
    }

    pub fn latest(&self) -> Option<JobId> {
        self.latest
    }

    pub fn is_current(&self, job_id: JobId) -> bool {
        self.latest == Some(job_id)
    }

    /// Pass through events of the latest job; drop everything else.
    pub fn accept(&self, event: WorkerEvent) -> Option<WorkerEvent> {
        if self.is_current(event.job_id()) {
            Some(event)
        } else {
            log::trace!("Discarding stale event for {}", event.job_id());
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_increase_and_share_nonce() {
        let mut gen = JobIdGenerator::new();
        let a = gen.next_id();
        let b = gen.next_id();
        assert_eq!(a.sequence + 1, b.sequence);
        assert_eq!(a.nonce, b.nonce);
        assert_ne!(a, b);
    }

    #[test]
    fn test_tracker_keeps_only_latest() {
        let mut tracker = JobTracker::new();
        assert!(tracker.latest().is_none());
        let first = tracker.next_job();
        let second = tracker.next_job();
        assert!(!tracker.is_current(first));
        assert!(tracker.is_current(second));

        let stale = WorkerEvent::Progress { job_id: first, fraction: 0.5 };
        let fresh = WorkerEvent::Progress { job_id: second, fraction: 0.5 };
        assert!(tracker.accept(stale).is_none());
        assert!(tracker.accept(fresh).is_some());
    }

    #[test]
    fn test_terminal_events() {
        let id = JobIdGenerator::new().next_id();
        assert!(!WorkerEvent::Progress { job_id: id, fraction: 1.0 }.is_terminal());
        assert!(WorkerEvent::Error { job_id: id, message: String::new() }.is_terminal());
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn std::any::Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
    }
}
