//! # phasefield compute
//!
//! Multi-array field synthesis and the worker thread that runs it off the
//! caller's thread. Row evaluation goes through a
//! [`ComputeBackend`](backend::ComputeBackend) so the job itself stays
//! independent of how samples are spread over hardware.
//!
//! ## Available backends
//!
//! | Backend | Feature flag | Status |
//! |---------|-------------|--------|
//! | Serial | always | Implemented |
//! | CPU (Rayon) | `cpu` (default) | Implemented |

use std::sync::Arc;

pub mod backend;
pub mod cancel;
pub mod job;
pub mod request;
pub mod transport;

#[cfg(feature = "cpu")]
pub mod cpu;

pub use backend::{BackendType, ComputeBackend, ComputeError, DeviceInfo, SerialBackend};
pub use cancel::{CancelToken, Cancellation, NeverCancel};
pub use job::{run_field_job, FieldError};
pub use request::{FieldRequest, FieldResult, RenderMode, Steering, WidebandMode};
pub use transport::{
    FieldWorker, JobId, JobIdGenerator, JobTracker, TransportError, WorkerCommand, WorkerEvent,
};

#[cfg(feature = "cpu")]
pub use cpu::CpuBackend;

/// The fastest backend compiled in.
pub fn default_backend() -> Arc<dyn ComputeBackend> {
    #[cfg(feature = "cpu")]
    {
        Arc::new(CpuBackend::new())
    }
    #[cfg(not(feature = "cpu"))]
    {
        Arc::new(SerialBackend)
    }
}
