//! Spatial reference handling and the coordinate reprojection service.

mod srs;
mod transform;

pub use srs::{SpatialRef, SrsKind};
pub use transform::{CoordTransform, Reproject};

#[cfg(test)]
mod tests;
