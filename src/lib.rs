//! Planetile - An out-of-core texture page cache for planet-scale LOD rendering

pub mod core;
pub mod math;
pub mod pages;
pub mod streaming;
