//! Core types shared across the phasefield crates.
//!
//! Plain data only: geometry primitives, per-element records, pattern samples,
//! and the serialisable configuration of an array unit.

use serde::{Deserialize, Serialize};

/// A point in the 2-D world frame (metres).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point2 {
    pub x: f64,
    pub y: f64,
}

impl Point2 {
    pub const ORIGIN: Point2 = Point2 { x: 0.0, y: 0.0 };

    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: &Point2) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    pub fn as_array(&self) -> [f64; 2] {
        [self.x, self.y]
    }
}

/// Axis-aligned world-space rectangle (metres).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
}

impl Default for Bounds {
    /// A 2 m × 2 m square centred on the origin.
    fn default() -> Self {
        Self {
            min_x: -1.0,
            max_x: 1.0,
            min_y: -1.0,
            max_y: 1.0,
        }
    }
}

impl Bounds {
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// Finite on every edge and strictly positive in both extents.
    pub fn is_valid(&self) -> bool {
        [self.min_x, self.max_x, self.min_y, self.max_y]
            .iter()
            .all(|v| v.is_finite())
            && self.width() > 0.0
            && self.height() > 0.0
    }

    /// World coordinate of grid sample `(ix, iy)` on an `nx × ny` lattice
    /// spanning the rectangle edge to edge.
    pub fn sample_point(&self, ix: usize, iy: usize, nx: usize, ny: usize) -> Point2 {
        let fx = if nx > 1 { ix as f64 / (nx - 1) as f64 } else { 0.5 };
        let fy = if ny > 1 { iy as f64 / (ny - 1) as f64 } else { 0.5 };
        Point2::new(
            self.min_x + fx * self.width(),
            self.min_y + fy * self.height(),
        )
    }
}

/// Element layout of an array unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArrayGeometry {
    /// Elements along the local x axis, centred on the unit position.
    #[default]
    Linear,
    /// Elements on a circular arc whose midpoint is the unit position.
    Curved,
}

/// One element of an array unit, in world coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ElementPosition {
    pub index: usize,
    pub position: Point2,
    /// Steering phase applied to this element (radians).
    pub phase_offset: f64,
    pub amplitude: f64,
}

/// One sample of a beam-pattern sweep.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BeamSample {
    /// Observation angle from broadside (degrees).
    pub angle: f64,
    /// Array factor in `[0, 1]`.
    pub magnitude: f64,
    /// Array factor in dB, floored at the sweep's `min_db`.
    pub db: f64,
}

/// Intensity $|E|^2$ sampled on a regular grid, row-major (`ny` rows of `nx`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntensityMap {
    pub intensity: Vec<f64>,
    pub nx: usize,
    pub ny: usize,
    pub bounds: Bounds,
}

/// Serialisable snapshot of an [`ArrayUnit`](crate::array_unit::ArrayUnit).
///
/// Every field has a default so that partial configs (e.g. from a scene file)
/// deserialise; `ArrayUnit::from_config` repairs whatever is out of range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArrayUnitConfig {
    pub id: String,
    pub name: String,
    pub position: Point2,
    pub element_count: usize,
    /// Element spacing (m).
    pub pitch: f64,
    pub geometry: ArrayGeometry,
    /// Arc radius (m); `0` derives the radius from the aperture.
    pub curvature_radius: f64,
    /// Carrier frequency (Hz).
    pub frequency: f64,
    /// Commanded steering angle (degrees from broadside).
    pub steering_angle: f64,
    /// Per-element weights; must have `element_count` entries.
    pub amplitudes: Vec<f64>,
    pub enabled: bool,
    /// Spread of the carrier set around `frequency` (Hz).
    pub bandwidth: f64,
    /// Number of carriers spread across `bandwidth`.
    pub carrier_count: usize,
}

impl Default for ArrayUnitConfig {
    fn default() -> Self {
        use crate::array_unit::{DEFAULT_ELEMENT_COUNT, DEFAULT_FREQUENCY_HZ};
        use crate::medium::SPEED_AIR;

        Self {
            id: String::new(),
            name: String::from("Array"),
            position: Point2::ORIGIN,
            element_count: DEFAULT_ELEMENT_COUNT,
            pitch: SPEED_AIR / DEFAULT_FREQUENCY_HZ / 2.0,
            geometry: ArrayGeometry::Linear,
            curvature_radius: 0.0,
            frequency: DEFAULT_FREQUENCY_HZ,
            steering_angle: 0.0,
            amplitudes: vec![1.0; DEFAULT_ELEMENT_COUNT],
            enabled: true,
            bandwidth: 0.0,
            carrier_count: 1,
        }
    }
}
