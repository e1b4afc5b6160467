//! Spherical caps: bounding regions on the unit sphere
//!
//! A page of the map covers a lon/lat rectangle. Its cap is a unit normal
//! plus a half-angle such that every direction of the rectangle lies within
//! `angle` of `normal`. Thickened to a radius range, the cap bounds the page's
//! surface geometry for culling and LOD distance estimates.

use std::f64::consts::{FRAC_PI_2, PI};

use crate::core::types::DVec3;

/// Samples per axis when fitting a cap to a lon/lat rectangle
const CAP_SAMPLES: usize = 9;

/// Unit direction for a longitude/latitude pair (radians)
///
/// Longitude 0, latitude 0 maps to +Z; latitude +π/2 maps to +Y.
///
/// # Examples
/// ```
/// use planetile::math::direction_from_lon_lat;
///
/// let up = direction_from_lon_lat(0.0, std::f64::consts::FRAC_PI_2);
/// assert!((up.y - 1.0).abs() < 1e-12);
/// ```
pub fn direction_from_lon_lat(lon: f64, lat: f64) -> DVec3 {
    let (sin_lat, cos_lat) = lat.sin_cos();
    let (sin_lon, cos_lon) = lon.sin_cos();
    DVec3::new(cos_lat * sin_lon, sin_lat, cos_lat * cos_lon)
}

/// Bounding cap on the unit sphere
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Cap {
    /// Unit center direction
    pub normal: DVec3,
    /// Half-angle in radians, in [0, π]
    pub angle: f64,
}

impl Cap {
    /// A cap covering the whole sphere
    pub const FULL: Cap = Cap {
        normal: DVec3::Y,
        angle: PI,
    };

    pub fn new(normal: DVec3, angle: f64) -> Self {
        Self {
            normal: normal.normalize(),
            angle: angle.clamp(0.0, PI),
        }
    }

    /// Fit a conservative cap to a lon/lat rectangle (radians)
    pub fn from_lon_lat_rect(lon0: f64, lon1: f64, lat0: f64, lat1: f64) -> Self {
        let steps = (CAP_SAMPLES - 1) as f64;
        let mut samples = Vec::with_capacity(CAP_SAMPLES * CAP_SAMPLES);
        for i in 0..CAP_SAMPLES {
            let lat = lat0 + (lat1 - lat0) * i as f64 / steps;
            for j in 0..CAP_SAMPLES {
                let lon = lon0 + (lon1 - lon0) * j as f64 / steps;
                samples.push(direction_from_lon_lat(lon, lat));
            }
        }

        // Any point of the rectangle is within one grid step of a sample.
        let margin = (lon1 - lon0).abs().max((lat1 - lat0).abs()) / steps;

        let sum: DVec3 = samples.iter().copied().sum();
        let normal = if sum.length_squared() > 1e-12 {
            sum.normalize()
        } else {
            direction_from_lon_lat((lon0 + lon1) * 0.5, (lat0 + lat1) * 0.5)
        };

        let widest = samples
            .iter()
            .map(|s| s.dot(normal).clamp(-1.0, 1.0).acos())
            .fold(0.0, f64::max);

        Self {
            normal,
            angle: (widest + margin).min(PI),
        }
    }

    /// Check whether a direction (need not be unit length) lies inside the cap
    pub fn contains_direction(&self, dir: DVec3) -> bool {
        let dir = dir.normalize_or_zero();
        if dir == DVec3::ZERO {
            return false;
        }
        dir.dot(self.normal).clamp(-1.0, 1.0).acos() <= self.angle
    }

    /// Angular distance from a direction to the nearest point of the cap
    fn angular_gap(&self, dir: DVec3) -> f64 {
        let phi = dir.dot(self.normal).clamp(-1.0, 1.0).acos();
        (phi - self.angle).max(0.0)
    }

    /// Distance from `eye` to the nearest point of the cap thickened to [r0, r1]
    pub fn nearest_distance(&self, eye: DVec3, r0: f64, r1: f64) -> f64 {
        let e = eye.length();
        if e < 1e-9 {
            return r0;
        }
        let gap = self.angular_gap(eye / e);
        let cos_gap = gap.cos();
        let r = (e * cos_gap).clamp(r0, r1);
        (e * e + r * r - 2.0 * e * r * cos_gap).max(0.0).sqrt()
    }

    /// Whether any part of the thickened cap can rise above the horizon
    ///
    /// From an eye at distance `e`, the `r0` sphere hides everything beyond
    /// `acos(r0 / e)` from the eye direction; points at height `r1` stay in
    /// view for a further `acos(r0 / r1)`. An eye below `r0` skips the test.
    pub fn above_horizon(&self, eye: DVec3, r0: f64, r1: f64) -> bool {
        let e = eye.length();
        if e <= r0 {
            return true;
        }
        let reach = (r0 / e).clamp(-1.0, 1.0).acos() + (r0 / r1).clamp(-1.0, 1.0).acos();
        self.angular_gap(eye / e) <= reach
    }

    /// Projected angular footprint seen from `eye`, with the distance used
    ///
    /// Returns `(footprint, distance)`; the footprint is π when the eye is
    /// inside the thickened cap.
    pub fn footprint(&self, eye: DVec3, r0: f64, r1: f64) -> (f64, f64) {
        let distance = self.nearest_distance(eye, r0, r1);
        let half_size = r1 * self.angle.min(FRAC_PI_2).sin();
        let footprint = 2.0 * half_size.atan2(distance);
        (footprint, distance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_sphere_rect() {
        let cap = Cap::from_lon_lat_rect(-PI, PI, FRAC_PI_2, -FRAC_PI_2);
        assert!((cap.angle - PI).abs() < 1e-9);
        assert!(cap.contains_direction(DVec3::new(0.3, -0.9, 0.1)));
    }

    #[test]
    fn test_rect_contains_its_corners() {
        let (lon0, lon1, lat0, lat1) = (0.2, 0.6, 0.4, 0.1);
        let cap = Cap::from_lon_lat_rect(lon0, lon1, lat0, lat1);

        for &(lon, lat) in &[(lon0, lat0), (lon1, lat0), (lon0, lat1), (lon1, lat1), (0.4, 0.25)] {
            assert!(cap.contains_direction(direction_from_lon_lat(lon, lat)));
        }
        assert!(!cap.contains_direction(direction_from_lon_lat(PI, 0.0)));
        assert!(cap.angle < 0.6);
    }

    #[test]
    fn test_nearest_distance_above_cap() {
        let cap = Cap::new(DVec3::Z, 0.1);
        let eye = DVec3::new(0.0, 0.0, 150.0);
        let d = cap.nearest_distance(eye, 90.0, 100.0);
        assert!((d - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_nearest_distance_inside_shell() {
        let cap = Cap::new(DVec3::Z, 0.1);
        let eye = DVec3::new(0.0, 0.0, 95.0);
        assert!(cap.nearest_distance(eye, 90.0, 100.0) < 1e-9);
        let (footprint, _) = cap.footprint(eye, 90.0, 100.0);
        assert!((footprint - PI).abs() < 1e-9);
    }

    #[test]
    fn test_horizon() {
        let eye = DVec3::new(0.0, 0.0, 1100.0);
        assert!(Cap::new(DVec3::Z, 0.05).above_horizon(eye, 1000.0, 1000.0));
        assert!(!Cap::new(-DVec3::Z, 0.3).above_horizon(eye, 1000.0, 1000.0));
        // Tall terrain just past the horizon is still visible.
        let beyond = Cap::new(DVec3::new(0.5f64.sin(), 0.0, 0.5f64.cos()), 0.01);
        assert!(!beyond.above_horizon(eye, 1000.0, 1000.0));
        assert!(beyond.above_horizon(eye, 1000.0, 1050.0));
        assert!(Cap::FULL.above_horizon(eye, 1000.0, 1000.0));
    }

    #[test]
    fn test_footprint_shrinks_with_distance() {
        let cap = Cap::new(DVec3::X, 0.05);
        let (near, d_near) = cap.footprint(DVec3::new(120.0, 0.0, 0.0), 100.0, 100.0);
        let (far, d_far) = cap.footprint(DVec3::new(400.0, 0.0, 0.0), 100.0, 100.0);
        assert!(d_near < d_far);
        assert!(near > far);
    }
}
