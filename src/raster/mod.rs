//! In-memory raster bands.

mod buffer;
mod rasterband;

pub use buffer::Buffer;
pub use rasterband::{RasterBand, ResampleAlg};
