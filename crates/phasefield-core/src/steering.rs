//! Steering-vector and wavenumber helpers shared by every propagation model.
//!
//! Both the single-array engine ([`crate::array_unit`]) and the multi-array
//! field job in `phasefield-compute` derive their phases from these functions,
//! so the two paths cannot drift apart.
//!
//! Angles are measured from broadside (the local +y axis of a linear array)
//! for array-factor work, and from the world +x axis for plane-wave phases.

use std::f64::consts::PI;

/// Largest magnitude a steering angle may take (degrees). Past endfire the
/// progressive phase of a linear array simply aliases.
pub const MAX_STEERING_DEG: f64 = 90.0;

/// Threshold below which `sin(ψ/2)` is treated as the removable singularity of
/// the array factor.
pub const SINGULARITY_EPS: f64 = 1e-10;

/// Wavelength (m) of a carrier at `frequency_hz` in a medium with the given
/// propagation speed (m/s).
pub fn wavelength(speed_of_sound: f64, frequency_hz: f64) -> f64 {
    speed_of_sound / frequency_hz
}

/// Wavenumber $k = 2\pi f / c$ (rad/m).
pub fn wavenumber(frequency_hz: f64, speed_of_sound: f64) -> f64 {
    2.0 * PI * frequency_hz / speed_of_sound
}

/// Wavenumber $k = 2\pi / \lambda$ (rad/m).
pub fn wavenumber_from_wavelength(wavelength_m: f64) -> f64 {
    2.0 * PI / wavelength_m
}

/// Clamp a steering angle into `[-90°, 90°]`. Non-finite input steers to broadside.
pub fn clamp_steering_deg(angle_deg: f64) -> f64 {
    if angle_deg.is_finite() {
        angle_deg.clamp(-MAX_STEERING_DEG, MAX_STEERING_DEG)
    } else {
        0.0
    }
}

/// Wrap an angle into `(-180°, 180°]`.
pub fn wrap_angle_deg(angle_deg: f64) -> f64 {
    let mut a = angle_deg % 360.0;
    if a <= -180.0 {
        a += 360.0;
    } else if a > 180.0 {
        a -= 360.0;
    }
    a
}

/// Unit direction vector for an angle measured from the +x axis (radians).
pub fn direction(theta_rad: f64) -> [f64; 2] {
    [theta_rad.cos(), theta_rad.sin()]
}

/// Normalise a 2-D vector. A zero-length vector maps to +x.
pub fn normalize_direction(v: [f64; 2]) -> [f64; 2] {
    let len = v[0].hypot(v[1]);
    if len < f64::EPSILON || !len.is_finite() {
        [1.0, 0.0]
    } else {
        [v[0] / len, v[1] / len]
    }
}

/// Progressive phase of element `n` for a linear array steered to `theta0_rad`:
/// $\varphi_n = -k d n \sin\theta_0$.
pub fn progressive_phase(k: f64, pitch: f64, n: usize, theta0_rad: f64) -> f64 {
    if n == 0 {
        // Reference element; keeps the result an exact zero instead of -0.0.
        return 0.0;
    }
    -k * pitch * n as f64 * theta0_rad.sin()
}

/// Phase of a plane wave travelling along `theta_rad` as seen at `position`:
/// $k (x \cos\theta + y \sin\theta)$.
pub fn plane_wave_phase(k: f64, position: [f64; 2], theta_rad: f64) -> f64 {
    let [ux, uy] = direction(theta_rad);
    k * (position[0] * ux + position[1] * uy)
}

/// Inter-element phase difference $\psi = k d (\sin\theta - \sin\theta_0)$.
pub fn array_phase_difference(k: f64, pitch: f64, theta_rad: f64, theta0_rad: f64) -> f64 {
    k * pitch * (theta_rad.sin() - theta0_rad.sin())
}

/// Normalised array factor of an `n`-element uniform linear array,
/// $|\sin(N\psi/2) / (N \sin(\psi/2))|$, in `[0, 1]`.
///
/// The main lobe (and any grating lobe) sits on the removable singularity of
/// the expression and evaluates to exactly `1.0`.
pub fn uniform_array_factor(psi: f64, n: usize) -> f64 {
    let n = n.max(1) as f64;
    let half = psi / 2.0;
    let denom = n * half.sin();
    if half.abs() < SINGULARITY_EPS || half.sin().abs() < SINGULARITY_EPS {
        return 1.0;
    }
    let af = ((n * half).sin() / denom).abs();
    if af.is_finite() {
        af.min(1.0)
    } else {
        1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_wavenumber_matches_wavelength_form() {
        let lambda = wavelength(343.0, 10_000.0);
        assert_abs_diff_eq!(lambda, 0.0343, epsilon = 1e-12);
        assert_abs_diff_eq!(
            wavenumber(10_000.0, 343.0),
            wavenumber_from_wavelength(lambda),
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_clamp_and_wrap() {
        assert_eq!(clamp_steering_deg(120.0), 90.0);
        assert_eq!(clamp_steering_deg(-95.0), -90.0);
        assert_eq!(clamp_steering_deg(f64::NAN), 0.0);
        assert_abs_diff_eq!(wrap_angle_deg(190.0), -170.0, epsilon = 1e-12);
        assert_abs_diff_eq!(wrap_angle_deg(-180.0), 180.0, epsilon = 1e-12);
        assert_abs_diff_eq!(wrap_angle_deg(540.0), 180.0, epsilon = 1e-12);
    }

    #[test]
    fn test_normalize_direction_handles_zero() {
        assert_eq!(normalize_direction([0.0, 0.0]), [1.0, 0.0]);
        let d = normalize_direction([3.0, 4.0]);
        assert_abs_diff_eq!(d[0], 0.6, epsilon = 1e-12);
        assert_abs_diff_eq!(d[1], 0.8, epsilon = 1e-12);
    }

    #[test]
    fn test_reference_element_has_zero_phase() {
        assert_eq!(progressive_phase(183.0, 0.0172, 0, 0.7), 0.0);
        assert!(progressive_phase(183.0, 0.0172, 3, 0.7) < 0.0);
    }

    #[test]
    fn test_array_factor_singularity_and_bounds() {
        assert_eq!(uniform_array_factor(0.0, 8), 1.0);
        assert_eq!(uniform_array_factor(1e-12, 8), 1.0);
        // Grating lobe at ψ = 2π is also a removable singularity.
        assert_eq!(uniform_array_factor(2.0 * PI, 8), 1.0);
        for i in 1..200 {
            let af = uniform_array_factor(i as f64 * 0.05, 16);
            assert!((0.0..=1.0).contains(&af));
        }
    }

    #[test]
    fn test_plane_wave_phase_at_origin_is_zero() {
        assert_eq!(plane_wave_phase(500.0, [0.0, 0.0], 1.2), 0.0);
    }
}
