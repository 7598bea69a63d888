//! Field and pattern evaluation for a single array.
//!
//! The complex field at an observation point is the coherent sum over
//! elements of
//!
//! $$
//! E(\mathbf{r}) = \sum_{n} a_n \exp\bigl(j (k |\mathbf{r} - \mathbf{r}_n| + \varphi_n)\bigr)
//! $$
//!
//! and beam patterns are sweeps of the normalised array factor.

use num_complex::Complex64;

use crate::types::{BeamSample, Bounds, ElementPosition, IntensityMap, Point2};

/// Default floor for dB patterns.
pub const DEFAULT_MIN_DB: f64 = -40.0;

/// Finest sweep step (degrees); caps a full sweep at 36 001 samples.
pub const MIN_SWEEP_STEP_DEG: f64 = 0.01;

/// Complex field at `point` radiated by `elements` at wavenumber `k`.
pub fn field_at_point(point: &Point2, elements: &[ElementPosition], k: f64) -> Complex64 {
    elements
        .iter()
        .map(|el| {
            let phase = k * point.distance_to(&el.position) + el.phase_offset;
            Complex64::from_polar(el.amplitude, phase)
        })
        .sum()
}

/// Intensity $|E|^2$ on an `nx × ny` grid spanning `bounds`.
pub fn compute_intensity_map(
    elements: &[ElementPosition],
    k: f64,
    bounds: &Bounds,
    nx: usize,
    ny: usize,
) -> IntensityMap {
    let mut intensity = Vec::with_capacity(nx * ny);
    for iy in 0..ny {
        for ix in 0..nx {
            let p = bounds.sample_point(ix, iy, nx, ny);
            intensity.push(field_at_point(&p, elements, k).norm_sqr());
        }
    }
    IntensityMap { intensity, nx, ny, bounds: *bounds }
}

/// Convert a linear array factor to dB, floored at `min_db`.
pub fn magnitude_to_db(magnitude: f64, min_db: f64) -> f64 {
    if magnitude <= 0.0 || !magnitude.is_finite() {
        return min_db;
    }
    (20.0 * magnitude.log10()).max(min_db)
}

/// Angles swept from −180° to 180° inclusive at `step_deg`.
///
/// A non-positive or non-finite step falls back to 1°; positive steps finer
/// than [`MIN_SWEEP_STEP_DEG`] are raised to it.
pub fn sweep_angles(step_deg: f64) -> Vec<f64> {
    let step = if step_deg.is_finite() && step_deg > 0.0 {
        step_deg.max(MIN_SWEEP_STEP_DEG)
    } else {
        1.0
    };
    // Tolerance keeps steps that divide 360 exactly from losing the last sample.
    let count = ((360.0 / step) + 1e-9).floor() as usize + 1;
    (0..count).map(|i| -180.0 + i as f64 * step).collect()
}

/// Evaluate `array_factor` over a full sweep.
pub fn sweep_beam_pattern(
    step_deg: f64,
    min_db: f64,
    array_factor: impl Fn(f64) -> f64,
) -> Vec<BeamSample> {
    sweep_angles(step_deg)
        .into_iter()
        .map(|angle| {
            let magnitude = array_factor(angle);
            BeamSample { angle, magnitude, db: magnitude_to_db(magnitude, min_db) }
        })
        .collect()
}

/// Angle of the strongest sample. Ties resolve to the first occurrence.
pub fn main_lobe_angle(pattern: &[BeamSample]) -> Option<f64> {
    pattern
        .iter()
        .fold(None::<&BeamSample>, |best, s| match best {
            Some(b) if b.magnitude >= s.magnitude => Some(b),
            _ => Some(s),
        })
        .map(|s| s.angle)
}

/// Width (degrees) of the region around the main lobe that stays within
/// −3 dB of its peak. The main lobe is the first maximum, as in
/// [`main_lobe_angle`]. Returns `None` for an empty pattern.
pub fn half_power_beamwidth(pattern: &[BeamSample]) -> Option<f64> {
    let (peak_idx, peak) = pattern
        .iter()
        .enumerate()
        .fold(None::<(usize, &BeamSample)>, |best, (i, s)| match best {
            Some((_, b)) if b.magnitude >= s.magnitude => best,
            _ => Some((i, s)),
        })?;
    let threshold = peak.magnitude / std::f64::consts::SQRT_2;

    let mut lo = peak_idx;
    while lo > 0 && pattern[lo - 1].magnitude >= threshold {
        lo -= 1;
    }
    let mut hi = peak_idx;
    while hi + 1 < pattern.len() && pattern[hi + 1].magnitude >= threshold {
        hi += 1;
    }
    Some(pattern[hi].angle - pattern[lo].angle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn element(index: usize, x: f64, y: f64) -> ElementPosition {
        ElementPosition { index, position: Point2::new(x, y), phase_offset: 0.0, amplitude: 1.0 }
    }

    #[test]
    fn test_field_of_single_element_has_unit_intensity() {
        let els = [element(0, 0.0, 0.0)];
        let e = field_at_point(&Point2::new(0.3, 0.4), &els, 100.0);
        assert_abs_diff_eq!(e.norm_sqr(), 1.0, epsilon = 1e-12);
        // Phase is k·r = 100 · 0.5.
        assert_abs_diff_eq!(e.re, 50.0_f64.cos(), epsilon = 1e-9);
        assert_abs_diff_eq!(e.im, 50.0_f64.sin(), epsilon = 1e-9);
    }

    #[test]
    fn test_in_phase_elements_add_coherently() {
        let els = [element(0, -0.1, 0.0), element(1, 0.1, 0.0)];
        // Equidistant point on the perpendicular bisector.
        let e = field_at_point(&Point2::new(0.0, 1.0), &els, 183.0);
        assert_abs_diff_eq!(e.norm_sqr(), 4.0, epsilon = 1e-9);
    }

    #[test]
    fn test_magnitude_to_db_floor() {
        assert_eq!(magnitude_to_db(0.0, -40.0), -40.0);
        assert_eq!(magnitude_to_db(-1.0, -60.0), -60.0);
        assert_eq!(magnitude_to_db(1e-9, -40.0), -40.0);
        assert_abs_diff_eq!(magnitude_to_db(1.0, -40.0), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_sweep_angles_default_step() {
        let a = sweep_angles(1.0);
        assert_eq!(a.len(), 361);
        assert_eq!(a[0], -180.0);
        assert_eq!(a[360], 180.0);
        assert_eq!(sweep_angles(0.0).len(), 361);
        assert_eq!(sweep_angles(0.5).len(), 721);
        assert_eq!(sweep_angles(7.0).len(), 52);
    }

    #[test]
    fn test_sweep_step_has_a_floor() {
        let a = sweep_angles(1e-9);
        assert_eq!(a.len(), 36_001);
        assert_eq!(a[0], -180.0);
        assert_abs_diff_eq!(a[36_000], 180.0, epsilon = 1e-9);
        assert_eq!(sweep_angles(f64::MIN_POSITIVE).len(), 36_001);
    }

    #[test]
    fn test_intensity_map_dimensions() {
        let els = [element(0, 0.0, 0.0)];
        let map = compute_intensity_map(&els, 50.0, &Bounds::default(), 5, 3);
        assert_eq!(map.intensity.len(), 15);
        assert!(map.intensity.iter().all(|v| (v - 1.0).abs() < 1e-12));
    }

    #[test]
    fn test_beamwidth_of_triangle() {
        let pattern: Vec<BeamSample> = sweep_angles(1.0)
            .into_iter()
            .map(|angle| {
                let magnitude = (1.0 - angle.abs() / 10.0).max(0.0);
                BeamSample { angle, magnitude, db: magnitude_to_db(magnitude, -40.0) }
            })
            .collect();
        assert_eq!(main_lobe_angle(&pattern), Some(0.0));
        // 1 - |a|/10 >= 0.7071 for |a| <= 2.93 → samples -2..=2.
        assert_eq!(half_power_beamwidth(&pattern), Some(4.0));
    }
}
