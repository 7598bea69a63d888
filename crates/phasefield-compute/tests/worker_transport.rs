//! Integration tests for the worker thread and its job protocol.

use std::sync::Arc;
use std::time::Duration;

use crossbeam::channel::{self, Receiver, Sender};

use phasefield_compute::{
    BackendType, ComputeBackend, ComputeError, DeviceInfo, FieldRequest, FieldWorker,
    JobIdGenerator, JobTracker, SerialBackend, TransportError, WorkerEvent,
};
use phasefield_core::{ArrayUnit, Medium};

const WAIT: Duration = Duration::from_secs(10);
const QUIET: Duration = Duration::from_millis(300);

/// Blocks inside the first row until the test drops the release sender.
struct GateBackend {
    started: Sender<()>,
    release: Receiver<()>,
}

impl ComputeBackend for GateBackend {
    fn device_info(&self) -> DeviceInfo {
        DeviceInfo {
            name: "Gate".into(),
            backend_type: BackendType::Serial,
            compute_units: Some(1),
        }
    }

    fn fill_row(
        &self,
        row: &mut [f64],
        sample_fn: &(dyn Fn(usize) -> f64 + Send + Sync),
    ) -> Result<(), ComputeError> {
        let _ = self.started.try_send(());
        let _ = self.release.recv();
        SerialBackend.fill_row(row, sample_fn)
    }
}

fn gated_worker() -> (FieldWorker, Receiver<()>, Sender<()>) {
    let (started_tx, started_rx) = channel::bounded(1);
    let (release_tx, release_rx) = channel::unbounded();
    let backend = GateBackend { started: started_tx, release: release_rx };
    let worker = FieldWorker::spawn_with_backend("gated", Arc::new(backend)).unwrap();
    (worker, started_rx, release_tx)
}

fn request() -> FieldRequest {
    FieldRequest::from_units([&ArrayUnit::new("a")], Medium::Air).with_resolution(16)
}

/// Everything the worker emits until it goes quiet.
fn drain(worker: &mut FieldWorker) -> Vec<WorkerEvent> {
    let mut events = Vec::new();
    loop {
        match worker.recv_timeout(QUIET) {
            Ok(event) => events.push(event),
            Err(TransportError::Timeout) => return events,
            Err(e) => panic!("worker failed: {e}"),
        }
    }
}

#[test]
fn test_job_reports_progress_then_result() {
    let mut worker = FieldWorker::spawn().unwrap();
    let id = JobIdGenerator::new().next_id();
    worker.start(id, request()).unwrap();
    assert_eq!(worker.pending_jobs(), 1);

    let mut last_progress = 0.0;
    loop {
        match worker.recv_timeout(WAIT).unwrap() {
            WorkerEvent::Progress { job_id, fraction } => {
                assert_eq!(job_id, id);
                assert!(fraction > last_progress);
                last_progress = fraction;
            }
            WorkerEvent::Result { job_id, result } => {
                assert_eq!(job_id, id);
                assert_eq!(result.heatmap.len(), 256);
                break;
            }
            WorkerEvent::Error { message, .. } => panic!("unexpected error: {message}"),
        }
    }
    assert_eq!(last_progress, 1.0);
    assert_eq!(worker.pending_jobs(), 0);
}

#[test]
fn test_cancel_before_result_suppresses_result() {
    let (mut worker, started, release) = gated_worker();
    let id = JobIdGenerator::new().next_id();
    worker.start(id, request()).unwrap();
    started.recv_timeout(WAIT).unwrap();

    assert!(worker.cancel(id));
    drop(release);

    let events = drain(&mut worker);
    assert!(events.iter().all(|e| !e.is_terminal()), "{events:?}");
    assert_eq!(worker.pending_jobs(), 0);
    // Cancelling twice is a no-op.
    assert!(!worker.cancel(id));
}

#[test]
fn test_cancelled_queued_job_never_runs() {
    let (mut worker, started, release) = gated_worker();
    let mut ids = JobIdGenerator::new();
    let running = ids.next_id();
    let queued = ids.next_id();
    worker.start(running, request()).unwrap();
    worker.start(queued, request()).unwrap();
    started.recv_timeout(WAIT).unwrap();

    assert!(worker.cancel(queued));
    drop(release);

    let events = drain(&mut worker);
    assert!(events.iter().all(|e| e.job_id() == running));
    assert!(events
        .iter()
        .any(|e| matches!(e, WorkerEvent::Result { job_id, .. } if *job_id == running)));
}

#[test]
fn test_tracker_filters_superseded_jobs() {
    let (mut worker, started, release) = gated_worker();
    let mut tracker = JobTracker::new();

    let first = worker.supersede(&mut tracker, request()).unwrap();
    started.recv_timeout(WAIT).unwrap();
    let second = worker.supersede(&mut tracker, request().with_resolution(8)).unwrap();
    assert_ne!(first, second);
    drop(release);

    let accepted: Vec<WorkerEvent> = drain(&mut worker)
        .into_iter()
        .filter_map(|e| tracker.accept(e))
        .collect();
    assert!(!accepted.is_empty());
    assert!(accepted.iter().all(|e| e.job_id() == second));
    match accepted.last() {
        Some(WorkerEvent::Result { result, .. }) => assert_eq!(result.width, 8),
        other => panic!("expected a result, got {other:?}"),
    }
}

#[test]
fn test_errors_are_events_and_worker_survives() {
    let mut worker = FieldWorker::spawn().unwrap();
    let mut ids = JobIdGenerator::new();
    let bad = ids.next_id();
    let good = ids.next_id();
    worker.start(bad, request().with_resolution(1)).unwrap();
    worker.start(good, request()).unwrap();

    let events = drain(&mut worker);
    assert!(events.iter().any(|e| matches!(
        e,
        WorkerEvent::Error { job_id, message } if *job_id == bad && message.contains("resolution")
    )));
    assert!(events
        .iter()
        .any(|e| matches!(e, WorkerEvent::Result { job_id, .. } if *job_id == good)));
    assert!(worker.is_running());
}

#[test]
fn test_duplicate_job_rejected() {
    let (mut worker, started, release) = gated_worker();
    let id = JobIdGenerator::new().next_id();
    worker.start(id, request()).unwrap();
    started.recv_timeout(WAIT).unwrap();
    assert!(matches!(
        worker.start(id, request()),
        Err(TransportError::DuplicateJob(dup)) if dup == id
    ));
    drop(release);
}

#[test]
fn test_shutdown_joins_thread() {
    let (mut worker, started, release) = gated_worker();
    worker.start(JobIdGenerator::new().next_id(), request()).unwrap();
    started.recv_timeout(WAIT).unwrap();
    drop(release);
    worker.shutdown();
    assert!(!worker.is_running());
    assert_eq!(worker.pending_jobs(), 0);
}
