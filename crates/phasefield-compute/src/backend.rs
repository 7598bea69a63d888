//! Compute backend trait and device abstraction.
//!
//! The [`ComputeBackend`] trait abstracts over how one row of an output grid
//! is evaluated, so that the field job stays independent of the execution
//! strategy (serial, or data-parallel across the row).

use thiserror::Error;

/// Errors originating from compute backends.
#[derive(Debug, Error)]
pub enum ComputeError {
    #[error("Backend not available: {0}")]
    Unavailable(String),

    #[error("Device error: {0}")]
    DeviceError(String),
}

/// Describes the capabilities of a compute backend.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub name: String,
    pub backend_type: BackendType,
    pub compute_units: Option<usize>,
}

/// The type of compute backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendType {
    Serial,
    Cpu,
}

/// Abstraction over compute backends.
///
/// The field job evaluates its grid one row at a time so that cancellation
/// can be observed between rows; backends decide how the samples of a single
/// row are spread over hardware.
pub trait ComputeBackend: Send + Sync {
    /// Return information about the device.
    fn device_info(&self) -> DeviceInfo;

    /// Fill every sample of `row` with `sample_fn(column)`.
    ///
    /// Each column is independent, so implementations may evaluate them in
    /// any order or concurrently.
    fn fill_row(
        &self,
        row: &mut [f64],
        sample_fn: &(dyn Fn(usize) -> f64 + Send + Sync),
    ) -> Result<(), ComputeError>;
}

/// Single-threaded backend. Always available.
#[derive(Debug, Default, Clone, Copy)]
pub struct SerialBackend;

impl ComputeBackend for SerialBackend {
    fn device_info(&self) -> DeviceInfo {
        DeviceInfo {
            name: "Serial".into(),
            backend_type: BackendType::Serial,
            compute_units: Some(1),
        }
    }

    fn fill_row(
        &self,
        row: &mut [f64],
        sample_fn: &(dyn Fn(usize) -> f64 + Send + Sync),
    ) -> Result<(), ComputeError> {
        for (col, v) in row.iter_mut().enumerate() {
            *v = sample_fn(col);
        }
        Ok(())
    }
}
