//! The single-array math engine.
//!
//! An [`ArrayUnit`] owns the configuration of one phased array and derives
//! everything else from it: wavelength, element coordinates, steering phases,
//! array factor, and the field it radiates.
//!
//! # Caching
//!
//! Derived data is cached against version counters rather than nullable
//! slots. Every mutator bumps the counter(s) its field feeds into:
//!
//! | Counter    | Bumped by                                             | Feeds          |
//! |------------|-------------------------------------------------------|----------------|
//! | `geometry` | position, element count, pitch, layout, curvature     | coordinates    |
//! | `phase`    | steering angle, frequency, speed of sound, pitch, count | phase offsets |
//! | `weights`  | amplitudes, element count                             | element list   |
//!
//! A reader compares the counters its cache entry was built at with the
//! current ones, so a stale entry is never observable after a setter returns.
//! Steering and frequency changes leave the coordinate cache untouched.

use std::cell::RefCell;
use std::sync::Arc;

use num_complex::Complex64;
use uuid::Uuid;

use crate::fields::{self, DEFAULT_MIN_DB};
use crate::layout::{self, element_coordinates};
use crate::medium::{Medium, MIN_SPEED, SPEED_AIR};
use crate::steering;
use crate::types::{
    ArrayGeometry, ArrayUnitConfig, BeamSample, Bounds, ElementPosition, IntensityMap, Point2,
};

pub const MIN_ELEMENTS: usize = 2;
pub const MAX_ELEMENTS: usize = 256;
/// Smallest element spacing (m).
pub const MIN_PITCH: f64 = 0.001;
/// Lowest carrier frequency (Hz).
pub const MIN_FREQUENCY_HZ: f64 = 100.0;
/// Highest carrier frequency (Hz).
pub const MAX_FREQUENCY_HZ: f64 = 1e9;
/// Largest position coordinate magnitude (m).
pub const MAX_COORDINATE_M: f64 = 1e6;
pub const MAX_CARRIERS: usize = 16;

pub const DEFAULT_ELEMENT_COUNT: usize = 8;
pub const DEFAULT_FREQUENCY_HZ: f64 = 10_000.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Epochs {
    geometry: u64,
    phase: u64,
    weights: u64,
}

#[derive(Debug, Clone)]
struct CoordinateCache {
    geometry: u64,
    points: Arc<[Point2]>,
}

#[derive(Debug, Clone)]
struct PhaseCache {
    phase: u64,
    offsets: Arc<[f64]>,
}

#[derive(Debug, Clone)]
struct ElementCache {
    epochs: Epochs,
    elements: Arc<[ElementPosition]>,
}

#[derive(Debug, Clone, Default)]
struct DerivedCache {
    coordinates: Option<CoordinateCache>,
    phases: Option<PhaseCache>,
    elements: Option<ElementCache>,
}

/// One phased array.
#[derive(Debug)]
pub struct ArrayUnit {
    id: String,
    name: String,
    position: Point2,
    element_count: usize,
    pitch: f64,
    geometry: ArrayGeometry,
    curvature_radius: f64,
    frequency: f64,
    steering_angle: f64,
    amplitudes: Vec<f64>,
    enabled: bool,
    bandwidth: f64,
    carrier_count: usize,
    speed_of_sound: f64,
    epochs: Epochs,
    cache: RefCell<DerivedCache>,
}

impl Default for ArrayUnit {
    fn default() -> Self {
        Self::new("Array")
    }
}

fn generate_id() -> String {
    format!("unit-{}", Uuid::new_v4().simple())
}

impl ArrayUnit {
    /// A unit with a fresh id: 8 elements at λ/2 spacing for a 10 kHz carrier
    /// in air, unsteered, at the origin.
    pub fn new(name: impl Into<String>) -> Self {
        let defaults = ArrayUnitConfig::default();
        Self {
            id: generate_id(),
            name: name.into(),
            position: defaults.position,
            element_count: defaults.element_count,
            pitch: defaults.pitch,
            geometry: defaults.geometry,
            curvature_radius: defaults.curvature_radius,
            frequency: defaults.frequency,
            steering_angle: defaults.steering_angle,
            amplitudes: defaults.amplitudes,
            enabled: defaults.enabled,
            bandwidth: defaults.bandwidth,
            carrier_count: defaults.carrier_count,
            speed_of_sound: SPEED_AIR,
            epochs: Epochs::default(),
            cache: RefCell::new(DerivedCache::default()),
        }
    }

    /// Rebuild a unit from a config, repairing out-of-range fields through the
    /// regular setters. An empty id is replaced by a generated one.
    pub fn from_config(config: &ArrayUnitConfig, speed_of_sound: f64) -> Self {
        let mut unit = Self::new(config.name.clone());
        if !config.id.is_empty() {
            unit.id = config.id.clone();
        }
        unit.set_speed_of_sound(speed_of_sound);
        unit.set_position(config.position);
        unit.set_element_count(config.element_count);
        unit.set_pitch(config.pitch);
        unit.set_geometry(config.geometry);
        unit.set_curvature_radius(config.curvature_radius);
        unit.set_frequency(config.frequency);
        unit.set_steering_angle(config.steering_angle);
        unit.set_amplitudes(config.amplitudes.clone());
        unit.set_enabled(config.enabled);
        unit.set_bandwidth(config.bandwidth);
        unit.set_carrier_count(config.carrier_count);
        unit
    }

    /// Structural snapshot of the configuration (no caches, no medium).
    pub fn to_config(&self) -> ArrayUnitConfig {
        ArrayUnitConfig {
            id: self.id.clone(),
            name: self.name.clone(),
            position: self.position,
            element_count: self.element_count,
            pitch: self.pitch,
            geometry: self.geometry,
            curvature_radius: self.curvature_radius,
            frequency: self.frequency,
            steering_angle: self.steering_angle,
            amplitudes: self.amplitudes.clone(),
            enabled: self.enabled,
            bandwidth: self.bandwidth,
            carrier_count: self.carrier_count,
        }
    }

    // ───────────────────────── accessors ─────────────────────────

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn position(&self) -> Point2 {
        self.position
    }

    pub fn element_count(&self) -> usize {
        self.element_count
    }

    pub fn pitch(&self) -> f64 {
        self.pitch
    }

    pub fn geometry(&self) -> ArrayGeometry {
        self.geometry
    }

    pub fn curvature_radius(&self) -> f64 {
        self.curvature_radius
    }

    pub fn frequency(&self) -> f64 {
        self.frequency
    }

    pub fn steering_angle(&self) -> f64 {
        self.steering_angle
    }

    pub fn amplitudes(&self) -> &[f64] {
        &self.amplitudes
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn bandwidth(&self) -> f64 {
        self.bandwidth
    }

    pub fn carrier_count(&self) -> usize {
        self.carrier_count
    }

    pub fn speed_of_sound(&self) -> f64 {
        self.speed_of_sound
    }

    /// λ = c / f (m).
    pub fn wavelength(&self) -> f64 {
        steering::wavelength(self.speed_of_sound, self.frequency)
    }

    /// k = 2π / λ (rad/m).
    pub fn wave_number(&self) -> f64 {
        steering::wavenumber_from_wavelength(self.wavelength())
    }

    /// (N − 1) · d (m).
    pub fn aperture(&self) -> f64 {
        layout::aperture(self.element_count, self.pitch)
    }

    pub fn pitch_lambda_ratio(&self) -> f64 {
        self.pitch / self.wavelength()
    }

    /// Carrier frequencies spread evenly across the unit's bandwidth.
    pub fn carrier_frequencies(&self) -> Vec<f64> {
        carrier_frequencies(self.frequency, self.bandwidth, self.carrier_count)
    }

    // ───────────────────────── mutators ─────────────────────────

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Non-finite positions are ignored; coordinates are clamped to
    /// `±MAX_COORDINATE_M`.
    pub fn set_position(&mut self, position: Point2) {
        if !(position.x.is_finite() && position.y.is_finite()) {
            return;
        }
        let position = Point2::new(
            position.x.clamp(-MAX_COORDINATE_M, MAX_COORDINATE_M),
            position.y.clamp(-MAX_COORDINATE_M, MAX_COORDINATE_M),
        );
        if position == self.position {
            return;
        }
        self.position = position;
        self.epochs.geometry += 1;
    }

    /// Clamped to `[2, 256]`. A count change resets the weights to all ones.
    pub fn set_element_count(&mut self, count: usize) {
        let count = count.clamp(MIN_ELEMENTS, MAX_ELEMENTS);
        if count == self.element_count {
            return;
        }
        self.element_count = count;
        self.amplitudes = vec![1.0; count];
        self.epochs.geometry += 1;
        self.epochs.phase += 1;
        self.epochs.weights += 1;
    }

    /// Clamped to at least 1 mm.
    pub fn set_pitch(&mut self, pitch: f64) {
        let pitch = if pitch.is_finite() { pitch.max(MIN_PITCH) } else { MIN_PITCH };
        if pitch == self.pitch {
            return;
        }
        self.pitch = pitch;
        self.epochs.geometry += 1;
        self.epochs.phase += 1;
    }

    pub fn set_geometry(&mut self, geometry: ArrayGeometry) {
        if geometry == self.geometry {
            return;
        }
        self.geometry = geometry;
        self.epochs.geometry += 1;
    }

    /// Negative or non-finite radii fall back to `0` (derived from aperture).
    pub fn set_curvature_radius(&mut self, radius: f64) {
        let radius = if radius.is_finite() { radius.max(0.0) } else { 0.0 };
        if radius == self.curvature_radius {
            return;
        }
        self.curvature_radius = radius;
        self.epochs.geometry += 1;
    }

    /// Clamped to `[100 Hz, 1 GHz]`; non-finite values fall back to 100 Hz.
    pub fn set_frequency(&mut self, frequency: f64) {
        let frequency = if frequency.is_finite() {
            frequency.clamp(MIN_FREQUENCY_HZ, MAX_FREQUENCY_HZ)
        } else {
            MIN_FREQUENCY_HZ
        };
        if frequency == self.frequency {
            return;
        }
        self.frequency = frequency;
        self.epochs.phase += 1;
    }

    /// Clamped to `[-90°, 90°]`. Re-commanding the current angle keeps the
    /// cached phase offsets.
    pub fn set_steering_angle(&mut self, angle_deg: f64) {
        let angle = steering::clamp_steering_deg(angle_deg);
        if angle == self.steering_angle {
            return;
        }
        self.steering_angle = angle;
        self.epochs.phase += 1;
    }

    /// Replaces the per-element weights. A vector of the wrong length, or one
    /// holding a non-finite weight, is repaired to all ones.
    pub fn set_amplitudes(&mut self, amplitudes: Vec<f64>) {
        let valid = amplitudes.len() == self.element_count
            && amplitudes.iter().all(|a| a.is_finite());
        self.amplitudes = if valid {
            amplitudes
        } else {
            log::debug!(
                "unit {}: repairing {} amplitudes to {} ones",
                self.id,
                amplitudes.len(),
                self.element_count
            );
            vec![1.0; self.element_count]
        };
        self.epochs.weights += 1;
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Negative or non-finite bandwidths become `0`.
    pub fn set_bandwidth(&mut self, bandwidth: f64) {
        self.bandwidth = if bandwidth.is_finite() { bandwidth.max(0.0) } else { 0.0 };
    }

    /// Clamped to `[1, 16]`.
    pub fn set_carrier_count(&mut self, count: usize) {
        self.carrier_count = count.clamp(1, MAX_CARRIERS);
    }

    pub fn set_speed_of_sound(&mut self, speed: f64) {
        let speed = if speed.is_finite() { speed.max(MIN_SPEED) } else { SPEED_AIR };
        if speed == self.speed_of_sound {
            return;
        }
        self.speed_of_sound = speed;
        self.epochs.phase += 1;
    }

    pub fn set_medium(&mut self, medium: Medium) {
        self.set_speed_of_sound(medium.speed_of_sound());
    }

    // ───────────────────────── derived data ─────────────────────────

    fn coordinates(&self) -> Arc<[Point2]> {
        let mut cache = self.cache.borrow_mut();
        if let Some(c) = &cache.coordinates {
            if c.geometry == self.epochs.geometry {
                return Arc::clone(&c.points);
            }
        }
        log::debug!("unit {}: recomputing element coordinates", self.id);
        let points: Arc<[Point2]> = element_coordinates(
            self.geometry,
            self.position,
            self.element_count,
            self.pitch,
            self.curvature_radius,
        )
        .into();
        cache.coordinates = Some(CoordinateCache {
            geometry: self.epochs.geometry,
            points: Arc::clone(&points),
        });
        points
    }

    /// Steering phase of every element, $\varphi_n = -k d n \sin\theta_0$.
    ///
    /// Element 0 is the phase reference and is always exactly `0`.
    pub fn compute_phase_offsets(&self) -> Arc<[f64]> {
        let mut cache = self.cache.borrow_mut();
        if let Some(c) = &cache.phases {
            if c.phase == self.epochs.phase {
                return Arc::clone(&c.offsets);
            }
        }
        log::debug!(
            "unit {}: recomputing phase offsets for {:.2}°",
            self.id,
            self.steering_angle
        );
        let k = self.wave_number();
        let theta0 = self.steering_angle.to_radians();
        let offsets: Arc<[f64]> = (0..self.element_count)
            .map(|n| steering::progressive_phase(k, self.pitch, n, theta0))
            .collect();
        cache.phases = Some(PhaseCache {
            phase: self.epochs.phase,
            offsets: Arc::clone(&offsets),
        });
        offsets
    }

    /// Elements in index order with world coordinates, steering phase, and
    /// weight. Returns the same allocation until a relevant mutator runs.
    pub fn element_positions(&self) -> Arc<[ElementPosition]> {
        if let Some(c) = &self.cache.borrow().elements {
            if c.epochs == self.epochs {
                return Arc::clone(&c.elements);
            }
        }
        let points = self.coordinates();
        let phases = self.compute_phase_offsets();
        let elements: Arc<[ElementPosition]> = points
            .iter()
            .zip(phases.iter())
            .zip(self.amplitudes.iter())
            .enumerate()
            .map(|(index, ((&position, &phase_offset), &amplitude))| ElementPosition {
                index,
                position,
                phase_offset,
                amplitude,
            })
            .collect();
        self.cache.borrow_mut().elements = Some(ElementCache {
            epochs: self.epochs,
            elements: Arc::clone(&elements),
        });
        elements
    }

    /// Normalised array factor at `theta_deg`, in `[0, 1]`.
    ///
    /// Exactly `1.0` at the commanded steering angle.
    pub fn compute_array_factor(&self, theta_deg: f64) -> f64 {
        let psi = steering::array_phase_difference(
            self.wave_number(),
            self.pitch,
            theta_deg.to_radians(),
            self.steering_angle.to_radians(),
        );
        steering::uniform_array_factor(psi, self.element_count)
    }

    /// Array factor in dB, never below `min_db`.
    pub fn compute_array_factor_db(&self, theta_deg: f64, min_db: f64) -> f64 {
        fields::magnitude_to_db(self.compute_array_factor(theta_deg), min_db)
    }

    /// Full −180°..180° sweep at `step_deg` (361 samples at 1°), floored at
    /// −40 dB. Recomputed on every call.
    pub fn generate_beam_pattern(&self, step_deg: f64) -> Vec<BeamSample> {
        fields::sweep_beam_pattern(step_deg, DEFAULT_MIN_DB, |a| self.compute_array_factor(a))
    }

    /// Coherent field radiated by all elements at world point `(x, y)`.
    pub fn compute_field_at(&self, x: f64, y: f64) -> Complex64 {
        let elements = self.element_positions();
        fields::field_at_point(&Point2::new(x, y), &elements, self.wave_number())
    }

    /// $|E|^2$ at `(x, y)`.
    pub fn compute_intensity_at(&self, x: f64, y: f64) -> f64 {
        self.compute_field_at(x, y).norm_sqr()
    }

    /// Near-field intensity of this unit alone on an `nx × ny` grid.
    pub fn intensity_map(&self, bounds: &Bounds, nx: usize, ny: usize) -> IntensityMap {
        let elements = self.element_positions();
        fields::compute_intensity_map(&elements, self.wave_number(), bounds, nx, ny)
    }

    /// 0.1° sweep over the front half-space. A linear array's pattern is
    /// mirrored behind it, so the rear copy of the main lobe is left out.
    fn front_pattern(&self) -> Vec<BeamSample> {
        self.generate_beam_pattern(0.1)
            .into_iter()
            .filter(|s| s.angle.abs() <= 90.0 + 1e-9)
            .collect()
    }

    /// Direction of the pattern maximum in front of the array.
    pub fn main_lobe_angle(&self) -> f64 {
        fields::main_lobe_angle(&self.front_pattern()).unwrap_or(self.steering_angle)
    }

    /// −3 dB width of the main lobe (degrees).
    pub fn half_power_beamwidth(&self) -> f64 {
        fields::half_power_beamwidth(&self.front_pattern()).unwrap_or(0.0)
    }

    /// Whether a grating lobe enters visible space at the current steering,
    /// i.e. $d/\lambda \ge 1 / (1 + |\sin\theta_0|)$.
    pub fn has_grating_lobes(&self) -> bool {
        let limit = 1.0 / (1.0 + self.steering_angle.to_radians().sin().abs());
        self.pitch_lambda_ratio() >= limit
    }
}

/// `count` frequencies spread evenly over `[f − B/2, f + B/2]`, each within
/// `[100 Hz, 1 GHz]`. A single carrier, or zero bandwidth, yields just `f`.
pub fn carrier_frequencies(frequency: f64, bandwidth: f64, count: usize) -> Vec<f64> {
    let count = count.clamp(1, MAX_CARRIERS);
    if count == 1 || bandwidth <= 0.0 {
        return vec![frequency];
    }
    let lo = frequency - bandwidth / 2.0;
    let step = bandwidth / (count - 1) as f64;
    (0..count)
        .map(|i| (lo + i as f64 * step).clamp(MIN_FREQUENCY_HZ, MAX_FREQUENCY_HZ))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_defaults_are_half_wavelength() {
        let unit = ArrayUnit::new("a");
        assert_eq!(unit.element_count(), 8);
        assert_eq!(unit.amplitudes().len(), 8);
        assert_abs_diff_eq!(unit.pitch_lambda_ratio(), 0.5, epsilon = 1e-12);
        assert!(unit.id().starts_with("unit-"));
    }

    #[test]
    fn test_ids_are_unique() {
        let a = ArrayUnit::new("a");
        let b = ArrayUnit::new("b");
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_setters_clamp() {
        let mut unit = ArrayUnit::default();
        unit.set_element_count(1);
        assert_eq!(unit.element_count(), 2);
        unit.set_element_count(1000);
        assert_eq!(unit.element_count(), 256);
        assert_eq!(unit.amplitudes().len(), 256);
        unit.set_pitch(0.0);
        assert_eq!(unit.pitch(), MIN_PITCH);
        unit.set_frequency(5.0);
        assert_eq!(unit.frequency(), MIN_FREQUENCY_HZ);
        unit.set_frequency(f64::INFINITY);
        assert_eq!(unit.frequency(), MIN_FREQUENCY_HZ);
        unit.set_frequency(f64::MAX);
        assert_eq!(unit.frequency(), MAX_FREQUENCY_HZ);
        assert!(unit.wavelength() > 0.0);
        unit.set_position(Point2::new(1e300, -f64::MAX));
        assert_eq!(unit.position(), Point2::new(MAX_COORDINATE_M, -MAX_COORDINATE_M));
        unit.set_position(Point2::new(f64::NAN, 0.0));
        assert_eq!(unit.position(), Point2::new(MAX_COORDINATE_M, -MAX_COORDINATE_M));
        unit.set_steering_angle(135.0);
        assert_eq!(unit.steering_angle(), 90.0);
        unit.set_carrier_count(0);
        assert_eq!(unit.carrier_count(), 1);
        unit.set_curvature_radius(-2.0);
        assert_eq!(unit.curvature_radius(), 0.0);
    }

    #[test]
    fn test_amplitude_mismatch_is_repaired() {
        let mut unit = ArrayUnit::default();
        unit.set_amplitudes(vec![0.5; 3]);
        assert_eq!(unit.amplitudes(), &[1.0; 8][..]);
        unit.set_amplitudes(vec![0.25; 8]);
        assert_eq!(unit.amplitudes(), &[0.25; 8][..]);
        let mut bad = vec![1.0; 8];
        bad[2] = f64::NAN;
        unit.set_amplitudes(bad);
        assert!(unit.amplitudes().iter().all(|&a| a == 1.0));
    }

    #[test]
    fn test_coordinate_cache_survives_steering_change() {
        let mut unit = ArrayUnit::default();
        let before = unit.coordinates();
        unit.set_steering_angle(20.0);
        unit.set_frequency(12_000.0);
        assert!(Arc::ptr_eq(&before, &unit.coordinates()));
        unit.set_pitch(0.02);
        assert!(!Arc::ptr_eq(&before, &unit.coordinates()));
    }

    #[test]
    fn test_same_steering_keeps_phase_cache() {
        let mut unit = ArrayUnit::default();
        unit.set_steering_angle(15.0);
        let first = unit.compute_phase_offsets();
        unit.set_steering_angle(15.0);
        assert!(Arc::ptr_eq(&first, &unit.compute_phase_offsets()));
    }

    #[test]
    fn test_carrier_frequencies() {
        assert_eq!(carrier_frequencies(10_000.0, 0.0, 4), vec![10_000.0]);
        assert_eq!(carrier_frequencies(10_000.0, 2_000.0, 1), vec![10_000.0]);
        assert_eq!(
            carrier_frequencies(10_000.0, 2_000.0, 3),
            vec![9_000.0, 10_000.0, 11_000.0]
        );
        assert_eq!(carrier_frequencies(150.0, 400.0, 2), vec![100.0, 350.0]);
        let top = carrier_frequencies(MAX_FREQUENCY_HZ, 1e6, 3);
        assert_eq!(*top.last().unwrap(), MAX_FREQUENCY_HZ);
    }

    #[test]
    fn test_grating_lobe_threshold() {
        let mut unit = ArrayUnit::default();
        assert!(!unit.has_grating_lobes());
        unit.set_steering_angle(60.0);
        // d/λ = 0.5 ≥ 1/(1 + sin 60°) ≈ 0.536 is false.
        assert!(!unit.has_grating_lobes());
        unit.set_pitch(unit.wavelength());
        assert!(unit.has_grating_lobes());
    }
}
