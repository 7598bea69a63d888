//! Element placement for linear and curved arrays.
//!
//! Pure geometry: given the unit position, pitch, and element count, produce
//! world coordinates. Phases and weights are attached by the caller.

use std::f64::consts::PI;

use crate::types::{ArrayGeometry, Point2};

/// Aperture (m) spanned by `n` elements at the given pitch.
pub fn aperture(n: usize, pitch: f64) -> f64 {
    n.saturating_sub(1) as f64 * pitch
}

/// Description of the arc used by a curved array.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Arc {
    pub centre: Point2,
    pub radius: f64,
    /// Angle of element 0 (radians from +x).
    pub start: f64,
    /// Total angular span covered by the elements (radians).
    pub span: f64,
}

impl Arc {
    /// Arc for a curved array whose midpoint sits at `position`.
    ///
    /// `curvature_radius <= 0` uses half the aperture as radius. The span is
    /// limited to `2π·(N−1)/N` so the first and last elements never coincide.
    pub fn for_array(position: Point2, n: usize, pitch: f64, curvature_radius: f64) -> Self {
        let ap = aperture(n, pitch);
        let radius = if curvature_radius > 0.0 {
            curvature_radius
        } else {
            ap / 2.0
        };
        let max_span = 2.0 * PI * (n.saturating_sub(1)) as f64 / n.max(1) as f64;
        let span = if radius > 0.0 { (ap / radius).min(max_span) } else { 0.0 };
        // Opening upward: the arc midpoint is the lowest point, at angle -π/2.
        let start = -span / 2.0 - PI / 2.0;
        let centre = Point2::new(position.x, position.y + radius);
        Self { centre, radius, start, span }
    }

    pub fn angle_of(&self, i: usize, n: usize) -> f64 {
        if n <= 1 {
            return self.start + self.span / 2.0;
        }
        self.start + (i as f64 / (n - 1) as f64) * self.span
    }
}

/// World coordinates of the `n` elements of an array.
pub fn element_coordinates(
    geometry: ArrayGeometry,
    position: Point2,
    n: usize,
    pitch: f64,
    curvature_radius: f64,
) -> Vec<Point2> {
    match geometry {
        ArrayGeometry::Linear => {
            let half = (n.saturating_sub(1)) as f64 / 2.0;
            (0..n)
                .map(|i| Point2::new(position.x + (i as f64 - half) * pitch, position.y))
                .collect()
        }
        ArrayGeometry::Curved => {
            let arc = Arc::for_array(position, n, pitch, curvature_radius);
            (0..n)
                .map(|i| {
                    let a = arc.angle_of(i, n);
                    Point2::new(
                        arc.centre.x + arc.radius * a.cos(),
                        arc.centre.y + arc.radius * a.sin(),
                    )
                })
                .collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_linear_layout_is_centred() {
        let pts = element_coordinates(ArrayGeometry::Linear, Point2::new(1.0, 2.0), 4, 0.1, 0.0);
        assert_eq!(pts.len(), 4);
        assert_abs_diff_eq!(pts[0].x, 0.85, epsilon = 1e-12);
        assert_abs_diff_eq!(pts[3].x, 1.15, epsilon = 1e-12);
        assert!(pts.iter().all(|p| p.y == 2.0));
    }

    #[test]
    fn test_derived_radius_is_half_aperture() {
        let arc = Arc::for_array(Point2::ORIGIN, 9, 0.05, 0.0);
        assert_abs_diff_eq!(arc.radius, 0.2, epsilon = 1e-12);
        assert_abs_diff_eq!(arc.span, 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(arc.centre.y, 0.2, epsilon = 1e-12);
    }

    #[test]
    fn test_arc_midpoint_is_unit_position() {
        let pos = Point2::new(0.3, -0.4);
        let pts = element_coordinates(ArrayGeometry::Curved, pos, 5, 0.02, 0.5);
        assert_abs_diff_eq!(pts[2].x, pos.x, epsilon = 1e-12);
        assert_abs_diff_eq!(pts[2].y, pos.y, epsilon = 1e-12);
    }

    #[test]
    fn test_tight_radius_limits_span() {
        let arc = Arc::for_array(Point2::ORIGIN, 4, 1.0, 0.01);
        assert_abs_diff_eq!(arc.span, 2.0 * PI * 3.0 / 4.0, epsilon = 1e-12);
    }
}
