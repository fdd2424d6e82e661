//! Coordinate transformation algorithms.

pub mod geoloc;
pub mod transform;
