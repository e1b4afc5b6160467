//! View frustum for culling

use crate::core::types::{DMat4, DVec3, DVec4};
use super::cap::Cap;

/// A plane defined by normal and distance from origin
#[derive(Clone, Copy, Debug)]
pub struct Plane {
    pub normal: DVec3,
    pub distance: f64,
}

impl Plane {
    pub fn new(normal: DVec3, distance: f64) -> Self {
        Self { normal, distance }
    }

    /// Signed distance from point to plane (positive = in front)
    pub fn distance_to_point(&self, point: DVec3) -> f64 {
        self.normal.dot(point) + self.distance
    }

    /// Largest signed distance reached by a cap thickened to [r0, r1]
    ///
    /// The direction of the cap closest to the plane normal lies at angle
    /// `max(0, θ - α)` from it, where θ is the normal-to-cap-center angle.
    fn max_distance_to_cap(&self, cap: &Cap, r0: f64, r1: f64) -> f64 {
        let theta = self.normal.dot(cap.normal).clamp(-1.0, 1.0).acos();
        let best = (theta - cap.angle).max(0.0).cos();
        let reach = if best >= 0.0 { r1 * best } else { r0 * best };
        reach + self.distance
    }
}

/// View frustum with 6 planes (Near, Far, Left, Right, Top, Bottom)
#[derive(Clone, Copy, Debug)]
pub struct Frustum {
    pub planes: [Plane; 6],
}

impl Frustum {
    /// Extract frustum planes from view-projection matrix
    pub fn from_view_projection(vp: &DMat4) -> Self {
        let m = vp.to_cols_array_2d();

        // Left: row3 + row0
        let left = Self::normalize_plane(DVec4::new(
            m[0][3] + m[0][0],
            m[1][3] + m[1][0],
            m[2][3] + m[2][0],
            m[3][3] + m[3][0],
        ));

        // Right: row3 - row0
        let right = Self::normalize_plane(DVec4::new(
            m[0][3] - m[0][0],
            m[1][3] - m[1][0],
            m[2][3] - m[2][0],
            m[3][3] - m[3][0],
        ));

        // Bottom: row3 + row1
        let bottom = Self::normalize_plane(DVec4::new(
            m[0][3] + m[0][1],
            m[1][3] + m[1][1],
            m[2][3] + m[2][1],
            m[3][3] + m[3][1],
        ));

        // Top: row3 - row1
        let top = Self::normalize_plane(DVec4::new(
            m[0][3] - m[0][1],
            m[1][3] - m[1][1],
            m[2][3] - m[2][1],
            m[3][3] - m[3][1],
        ));

        // Near: row2 (zero-to-one depth range)
        let near = Self::normalize_plane(DVec4::new(
            m[0][2],
            m[1][2],
            m[2][2],
            m[3][2],
        ));

        // Far: row3 - row2
        let far = Self::normalize_plane(DVec4::new(
            m[0][3] - m[0][2],
            m[1][3] - m[1][2],
            m[2][3] - m[2][2],
            m[3][3] - m[3][2],
        ));

        Self {
            planes: [near, far, left, right, top, bottom],
        }
    }

    fn normalize_plane(plane: DVec4) -> Plane {
        let normal = DVec3::new(plane.x, plane.y, plane.z);
        let len = normal.length();
        Plane {
            normal: normal / len,
            distance: plane.w / len,
        }
    }

    /// Check if point is inside frustum
    pub fn contains_point(&self, point: DVec3) -> bool {
        self.planes
            .iter()
            .all(|plane| plane.distance_to_point(point) >= 0.0)
    }

    /// Check if a cap thickened to radii [r0, r1] intersects the frustum
    ///
    /// Conservative: may report an intersection for caps just outside a
    /// frustum corner, never misses a visible cap.
    pub fn intersects_cap(&self, cap: &Cap, r0: f64, r1: f64) -> bool {
        self.planes
            .iter()
            .all(|plane| plane.max_distance_to_cap(cap, r0, r1) >= 0.0)
    }
}
