//! Field simulation requests and results.
//!
//! A [`FieldRequest`] is a self-contained snapshot: it holds plain
//! [`ArrayUnitConfig`] copies, never references into the caller's live
//! collection, so a job in flight is unaffected by later edits.

use serde::{Deserialize, Serialize};

use phasefield_core::{ArrayUnit, ArrayUnitConfig, Bounds, Medium};

use crate::job::FieldError;

/// Smallest accepted grid side length.
pub const MIN_RESOLUTION: usize = 2;
/// Largest accepted grid side length.
pub const MAX_RESOLUTION: usize = 2048;
pub const DEFAULT_RESOLUTION: usize = 128;

/// What the output grid depicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RenderMode {
    /// Delay-and-sum angular interference field.
    #[default]
    Interference,
    /// Interference field plus its 1-D angular profile.
    BeamSlice,
    /// Sensor layout splats; not a physical field.
    ArrayGeometry,
}

impl RenderMode {
    /// Whether the mode has nothing meaningful to draw without units.
    pub fn requires_units(&self) -> bool {
        matches!(self, RenderMode::ArrayGeometry)
    }
}

/// How carriers of different frequencies are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WidebandMode {
    /// Coherent sum over every carrier and unit, then one squared magnitude.
    #[default]
    Aggregated,
    /// Raw squared magnitude per carrier frequency, averaged across
    /// carriers. Carriers shared by more radiators weigh more.
    PerCarrier,
}

/// Commanded beam direction (degrees).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Steering {
    /// Azimuth from broadside.
    pub theta: f64,
    /// Elevation. Carried for 3-D consumers; the planar job ignores it.
    pub phi: f64,
}

/// Everything a field job needs, by value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldRequest {
    pub units: Vec<ArrayUnitConfig>,
    #[serde(default)]
    pub medium: Medium,
    #[serde(default)]
    pub steering: Steering,
    #[serde(default)]
    pub render_mode: RenderMode,
    #[serde(default)]
    pub wideband_mode: WidebandMode,
    /// Grid side length in samples.
    #[serde(default = "default_resolution")]
    pub resolution: usize,
    #[serde(default)]
    pub bounds: Bounds,
}

fn default_resolution() -> usize {
    DEFAULT_RESOLUTION
}

impl FieldRequest {
    /// Snapshot a live unit collection.
    pub fn from_units<'a>(
        units: impl IntoIterator<Item = &'a ArrayUnit>,
        medium: Medium,
    ) -> Self {
        Self {
            units: units.into_iter().map(ArrayUnit::to_config).collect(),
            medium,
            steering: Steering::default(),
            render_mode: RenderMode::default(),
            wideband_mode: WidebandMode::default(),
            resolution: DEFAULT_RESOLUTION,
            bounds: Bounds::default(),
        }
    }

    pub fn with_render_mode(mut self, mode: RenderMode) -> Self {
        self.render_mode = mode;
        self
    }

    pub fn with_wideband_mode(mut self, mode: WidebandMode) -> Self {
        self.wideband_mode = mode;
        self
    }

    pub fn with_resolution(mut self, resolution: usize) -> Self {
        self.resolution = resolution;
        self
    }

    pub fn with_bounds(mut self, bounds: Bounds) -> Self {
        self.bounds = bounds;
        self
    }

    pub fn with_steering(mut self, theta_deg: f64) -> Self {
        self.steering.theta = theta_deg;
        self
    }

    /// Units that take part in synthesis.
    pub fn active_units(&self) -> impl Iterator<Item = &ArrayUnitConfig> {
        self.units.iter().filter(|u| u.enabled)
    }

    /// Structural checks that do not depend on the units' physics.
    pub fn validate(&self) -> Result<(), FieldError> {
        if !(MIN_RESOLUTION..=MAX_RESOLUTION).contains(&self.resolution) {
            return Err(FieldError::InvalidResolution(self.resolution));
        }
        if !self.bounds.is_valid() {
            return Err(FieldError::InvalidBounds(self.bounds));
        }
        if self.render_mode.requires_units() && self.active_units().next().is_none() {
            return Err(FieldError::NoActiveUnits { mode: self.render_mode });
        }
        Ok(())
    }
}

/// Normalised output of a field job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldResult {
    /// Row-major intensity in `[0, 1]`, `height` rows of `width` samples.
    pub heatmap: Vec<f32>,
    pub width: usize,
    pub height: usize,
    /// Angular profile (one row), for [`RenderMode::BeamSlice`].
    pub beam_slice: Option<Vec<f32>>,
    /// Echo of the active units, for [`RenderMode::ArrayGeometry`].
    pub geometry: Option<Vec<ArrayUnitConfig>>,
    pub compute_time_ms: f64,
}

impl FieldResult {
    /// Sample at column `x`, row `y`.
    pub fn at(&self, x: usize, y: usize) -> Option<f32> {
        if x >= self.width {
            return None;
        }
        self.heatmap.get(y * self.width + x).copied()
    }

    pub fn row(&self, y: usize) -> Option<&[f32]> {
        let start = y.checked_mul(self.width)?;
        self.heatmap.get(start..start + self.width)
    }
}
