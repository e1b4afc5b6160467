//! Mathematical utilities for culling on the sphere

pub mod cap;
pub mod frustum;

pub use cap::{Cap, direction_from_lon_lat};
pub use frustum::{Plane, Frustum};
