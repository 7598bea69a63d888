//! CPU compute backend using Rayon for shared-memory parallelism.

use rayon::prelude::*;

use crate::backend::{BackendType, ComputeBackend, ComputeError, DeviceInfo};

/// CPU backend that parallelises the columns of each row via Rayon.
pub struct CpuBackend {
    num_threads: usize,
}

impl CpuBackend {
    /// Create a new CPU backend using all available threads.
    pub fn new() -> Self {
        Self {
            num_threads: rayon::current_num_threads(),
        }
    }
}

impl Default for CpuBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ComputeBackend for CpuBackend {
    fn device_info(&self) -> DeviceInfo {
        DeviceInfo {
            name: format!("CPU ({} threads)", self.num_threads),
            backend_type: BackendType::Cpu,
            compute_units: Some(self.num_threads),
        }
    }

    fn fill_row(
        &self,
        row: &mut [f64],
        sample_fn: &(dyn Fn(usize) -> f64 + Send + Sync),
    ) -> Result<(), ComputeError> {
        row.par_iter_mut()
            .enumerate()
            .for_each(|(col, v)| *v = sample_fn(col));
        Ok(())
    }
}
