//! The multi-array field job.
//!
//! A job turns a [`FieldRequest`] into a normalised `resolution × resolution`
//! heatmap. Columns span scan angles from −90° to 90°; each enabled unit
//! contributes one point radiator per carrier frequency, phased as a plane
//! wave arriving from the column's angle. The work is split into rows and
//! the cancellation hook is polled before each one.

use std::time::Instant;

use num_complex::Complex64;
use thiserror::Error;

use phasefield_core::steering::{
    array_phase_difference, clamp_steering_deg, plane_wave_phase, uniform_array_factor,
    wavenumber,
};
use phasefield_core::{ArrayUnit, ArrayUnitConfig, Bounds};

use crate::backend::{ComputeBackend, ComputeError};
use crate::cancel::Cancellation;
use crate::request::{
    FieldRequest, FieldResult, RenderMode, WidebandMode, MAX_RESOLUTION, MIN_RESOLUTION,
};

/// Samples below this are treated as silence when normalising.
pub const NORMALIZE_FLOOR: f64 = 1e-6;

/// Element count of the reference array drawn when no unit is enabled.
pub const PLACEHOLDER_ELEMENTS: usize = 8;

/// Number of progress reports per job, not counting the final one.
const PROGRESS_STEPS: usize = 20;

/// Errors from a field job. Every variant is reported to the caller; none
/// is fatal to the worker that ran the job.
#[derive(Debug, Error)]
pub enum FieldError {
    #[error("Grid resolution {0} is outside [{}, {}]", MIN_RESOLUTION, MAX_RESOLUTION)]
    InvalidResolution(usize),

    #[error("Invalid grid bounds: {0:?}")]
    InvalidBounds(Bounds),

    #[error("Render mode {mode:?} needs at least one enabled unit")]
    NoActiveUnits { mode: RenderMode },

    #[error("Non-finite field sample at index {index}")]
    NonFiniteSample { index: usize },

    #[error(transparent)]
    Backend(#[from] ComputeError),
}

/// All radiators sharing one carrier frequency.
#[derive(Debug)]
struct CarrierGroup {
    frequency: f64,
    k: f64,
    positions: Vec<[f64; 2]>,
}

fn carrier_groups(units: &[ArrayUnit], speed_of_sound: f64) -> Vec<CarrierGroup> {
    let mut groups: Vec<CarrierGroup> = Vec::new();
    for unit in units {
        let position = unit.position().as_array();
        for frequency in unit.carrier_frequencies() {
            match groups.iter_mut().find(|g| g.frequency == frequency) {
                Some(group) => group.positions.push(position),
                None => groups.push(CarrierGroup {
                    frequency,
                    k: wavenumber(frequency, speed_of_sound),
                    positions: vec![position],
                }),
            }
        }
    }
    groups
}

fn coherent_sum(group: &CarrierGroup, theta: f64) -> Complex64 {
    group
        .positions
        .iter()
        .map(|p| Complex64::from_polar(1.0, plane_wave_phase(group.k, *p, theta)))
        .sum()
}

/// $|\sum|^2 / M^2$ over every radiator of every carrier.
fn aggregated_power(groups: &[CarrierGroup], theta: f64) -> f64 {
    let count: usize = groups.iter().map(|g| g.positions.len()).sum();
    if count == 0 {
        return 0.0;
    }
    let sum: Complex64 = groups.iter().map(|g| coherent_sum(g, theta)).sum();
    sum.norm_sqr() / (count * count) as f64
}

/// Mean over carriers of the raw $|\sum_g|^2$. A carrier shared by many
/// radiators outweighs one driven by a single radiator.
fn per_carrier_power(groups: &[CarrierGroup], theta: f64) -> f64 {
    if groups.is_empty() {
        return 0.0;
    }
    let total: f64 = groups.iter().map(|g| coherent_sum(g, theta).norm_sqr()).sum();
    total / groups.len() as f64
}

/// Scan angle (radians) of column `col` in a `width`-column grid.
pub fn column_angle(col: usize, width: usize) -> f64 {
    let t = if width > 1 { col as f64 / (width - 1) as f64 } else { 0.5 };
    (-90.0 + 180.0 * t).to_radians()
}

/// Splat radius as a fraction of grid width, from bandwidth in Hz.
pub fn splat_radius_fraction(bandwidth_hz: f64) -> f64 {
    let power = if bandwidth_hz.is_finite() { bandwidth_hz / 1000.0 } else { 0.0 };
    (power * 0.01).clamp(0.01, 0.2)
}

/// Emits roughly every 5% of `total` steps, and always on the last one.
struct ProgressReporter<'a> {
    total: usize,
    stride: usize,
    sink: &'a mut dyn FnMut(f64),
}

impl<'a> ProgressReporter<'a> {
    fn new(total: usize, sink: &'a mut dyn FnMut(f64)) -> Self {
        Self { total, stride: (total / PROGRESS_STEPS).max(1), sink }
    }

    fn step_done(&mut self, index: usize) {
        let done = index + 1;
        if done == self.total || done % self.stride == 0 {
            (self.sink)(done as f64 / self.total as f64);
        }
    }
}

/// Run one field job to completion.
///
/// Returns `Ok(None)` when `cancel` fired before the grid was complete; the
/// partial grid is discarded. `progress` receives fractions in `(0, 1]`, the
/// last one being exactly `1.0`.
pub fn run_field_job(
    request: &FieldRequest,
    backend: &dyn ComputeBackend,
    cancel: &dyn Cancellation,
    progress: &mut dyn FnMut(f64),
) -> Result<Option<FieldResult>, FieldError> {
    request.validate()?;
    let start = Instant::now();

    let speed = request.medium.speed_of_sound();
    let configs: Vec<ArrayUnitConfig> = request.active_units().cloned().collect();
    let units: Vec<ArrayUnit> = configs
        .iter()
        .map(|c| ArrayUnit::from_config(c, speed))
        .collect();

    let width = request.resolution;
    let height = request.resolution;
    log::debug!(
        "Field job: {} active unit(s), {}x{} grid, {:?}/{:?} on {}",
        units.len(),
        width,
        height,
        request.render_mode,
        request.wideband_mode,
        backend.device_info().name
    );

    let mut reporter = ProgressReporter::new(height, progress);
    let grid = match request.render_mode {
        RenderMode::ArrayGeometry => {
            if units.is_empty() {
                return Err(FieldError::NoActiveUnits { mode: request.render_mode });
            }
            splat_geometry(&units, &request.bounds, width, height, cancel, &mut reporter)
        }
        RenderMode::Interference | RenderMode::BeamSlice if units.is_empty() => {
            let theta = request.steering.theta;
            placeholder_field(theta, width, height, backend, cancel, &mut reporter)?
        }
        RenderMode::Interference | RenderMode::BeamSlice => {
            let groups = carrier_groups(&units, speed);
            let mode = request.wideband_mode;
            interference_field(&groups, mode, width, height, backend, cancel, &mut reporter)?
        }
    };

    let Some(grid) = grid else {
        log::debug!("Field job cancelled");
        return Ok(None);
    };

    let heatmap = normalize(&grid)?;
    let beam_slice = match request.render_mode {
        RenderMode::BeamSlice => Some(heatmap[..width].to_vec()),
        _ => None,
    };
    let geometry = match request.render_mode {
        RenderMode::ArrayGeometry => Some(configs),
        _ => None,
    };

    let compute_time_ms = start.elapsed().as_secs_f64() * 1000.0;
    log::info!("Field job finished in {:.2} ms", compute_time_ms);

    Ok(Some(FieldResult {
        heatmap,
        width,
        height,
        beam_slice,
        geometry,
        compute_time_ms,
    }))
}

fn interference_field(
    groups: &[CarrierGroup],
    mode: WidebandMode,
    width: usize,
    height: usize,
    backend: &dyn ComputeBackend,
    cancel: &dyn Cancellation,
    reporter: &mut ProgressReporter<'_>,
) -> Result<Option<Vec<f64>>, FieldError> {
    let angles: Vec<f64> = (0..width).map(|c| column_angle(c, width)).collect();
    let sample = |col: usize| match mode {
        WidebandMode::Aggregated => aggregated_power(groups, angles[col]),
        WidebandMode::PerCarrier => per_carrier_power(groups, angles[col]),
    };
    fill_rows(width, height, backend, cancel, reporter, &sample)
}

/// AF² of an 8-element half-wavelength array steered to `steering_deg`.
fn placeholder_field(
    steering_deg: f64,
    width: usize,
    height: usize,
    backend: &dyn ComputeBackend,
    cancel: &dyn Cancellation,
    reporter: &mut ProgressReporter<'_>,
) -> Result<Option<Vec<f64>>, FieldError> {
    let theta0 = clamp_steering_deg(steering_deg).to_radians();
    // k·d = π for d = λ/2.
    let kd = std::f64::consts::PI;
    let sample = |col: usize| {
        let psi = array_phase_difference(kd, 1.0, column_angle(col, width), theta0);
        uniform_array_factor(psi, PLACEHOLDER_ELEMENTS).powi(2)
    };
    fill_rows(width, height, backend, cancel, reporter, &sample)
}

fn fill_rows(
    width: usize,
    height: usize,
    backend: &dyn ComputeBackend,
    cancel: &dyn Cancellation,
    reporter: &mut ProgressReporter<'_>,
    sample: &(dyn Fn(usize) -> f64 + Send + Sync),
) -> Result<Option<Vec<f64>>, FieldError> {
    let mut grid = vec![0.0; width * height];
    for (row_idx, row) in grid.chunks_mut(width).enumerate() {
        if cancel.is_cancelled() {
            return Ok(None);
        }
        backend.fill_row(row, sample)?;
        reporter.step_done(row_idx);
    }
    Ok(Some(grid))
}

/// Linear-falloff disc per unit, combined by pixel-wise maximum.
fn splat_geometry(
    units: &[ArrayUnit],
    bounds: &Bounds,
    width: usize,
    height: usize,
    cancel: &dyn Cancellation,
    reporter: &mut ProgressReporter<'_>,
) -> Option<Vec<f64>> {
    let mut grid = vec![0.0; width * height];
    let total = units.len();
    let mut rows_reported = 0;

    for (i, unit) in units.iter().enumerate() {
        if cancel.is_cancelled() {
            return None;
        }
        let p = unit.position();
        let cx = (p.x - bounds.min_x) / bounds.width() * (width - 1) as f64;
        let cy = (p.y - bounds.min_y) / bounds.height() * (height - 1) as f64;
        let radius = (splat_radius_fraction(unit.bandwidth()) * width as f64).max(1.0);

        let x0 = (cx - radius).floor().max(0.0) as usize;
        let y0 = (cy - radius).floor().max(0.0) as usize;
        let x1 = (cx + radius).ceil().min((width - 1) as f64);
        let y1 = (cy + radius).ceil().min((height - 1) as f64);
        if x1 < 0.0 || y1 < 0.0 {
            continue;
        }
        for y in y0..=(y1 as usize) {
            for x in x0..=(x1 as usize) {
                let d = (x as f64 - cx).hypot(y as f64 - cy);
                if d <= radius {
                    let v = 1.0 - d / radius;
                    let cell = &mut grid[y * width + x];
                    if v > *cell {
                        *cell = v;
                    }
                }
            }
        }
        // Per-unit work mapped onto row-based progress.
        let rows_done = ((i + 1) * height) / total;
        if rows_done > rows_reported {
            reporter.step_done(rows_done - 1);
            rows_reported = rows_done;
        }
    }
    Some(grid)
}

/// Scale by the running maximum (at least [`NORMALIZE_FLOOR`]) and clamp
/// to `[0, 1]`.
pub fn normalize(grid: &[f64]) -> Result<Vec<f32>, FieldError> {
    if let Some(index) = grid.iter().position(|v| !v.is_finite()) {
        return Err(FieldError::NonFiniteSample { index });
    }
    let max = grid.iter().fold(NORMALIZE_FLOOR, |m, &v| m.max(v));
    Ok(grid.iter().map(|&v| (v / max).clamp(0.0, 1.0) as f32).collect())
}
