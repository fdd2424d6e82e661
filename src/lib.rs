#![crate_name = "geoloc"]
#![crate_type = "lib"]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Geolocation array transformer.
//!
//! Maps the pixel/line space of a raster to georeferenced coordinates using
//! geolocation arrays: two coarse grids holding the X (longitude) and Y
//! (latitude) of a regularly strided subset of the raster pixels, as found in
//! satellite swath products. The forward direction interpolates the grids,
//! the inverse direction searches them through a backmap raster or a
//! quadtree of grid cells, built once on first use.
//!
//! ## Use
//!
//! ```
//! # fn main() -> geoloc::errors::Result<()> {
//! use geoloc::alg::transform::Transformer;
//! use geoloc::cpl::CslStringList;
//! use geoloc::metadata::{Metadata, GEOLOCATION_DOMAIN};
//! use geoloc::raster::{Buffer, RasterBand};
//! use geoloc::vsi::register_mem_dataset;
//! use geoloc::Dataset;
//!
//! let lon = RasterBand::new(Buffer::new((5, 1), vec![2.0, 2.5, 3.0, 3.5, 4.0]));
//! let lat = RasterBand::new(Buffer::new((4, 1), vec![46.0, 45.5, 45.0, 44.5]));
//! register_mem_dataset("/vsimem/use_lon", Dataset::from_bands("", vec![lon])?)?;
//! register_mem_dataset("/vsimem/use_lat", Dataset::from_bands("", vec![lat])?)?;
//!
//! let mut swath = Dataset::new("swath", (10, 8));
//! swath.set_metadata_domain(
//!     GEOLOCATION_DOMAIN,
//!     CslStringList::from(&[
//!         ("X_DATASET", "/vsimem/use_lon"),
//!         ("X_BAND", "1"),
//!         ("Y_DATASET", "/vsimem/use_lat"),
//!         ("Y_BAND", "1"),
//!         ("PIXEL_OFFSET", "0"),
//!         ("PIXEL_STEP", "2"),
//!         ("LINE_OFFSET", "0"),
//!         ("LINE_STEP", "2"),
//!         ("SRS", "EPSG:4326"),
//!     ]),
//! );
//!
//! let transformer = Transformer::new(Some(&swath), None, &CslStringList::new())?;
//! let (lon, lat, _) = transformer.transform_point(false, 4.0, 2.0).unwrap();
//! assert_eq!((lon, lat), (3.0, 45.5));
//! let (pixel, line, _) = transformer.transform_point(true, lon, lat).unwrap();
//! assert!((pixel - 4.0).abs() < 1e-6 && (line - 2.0).abs() < 1e-6);
//! # Ok(())
//! # }
//! ```
//!
//! The inverse method and the backmap storage are selected with
//! configuration options, see [`config`] and [`alg::geoloc`].

pub mod alg;
pub mod config;
pub mod cpl;
pub mod dataset;
pub mod errors;
mod geo_transform;
pub mod metadata;
pub mod raster;
pub mod spatial_ref;
pub mod vsi;

pub use alg::geoloc::GeolocTransformer;
pub use alg::transform::Transformer;
pub use cpl::CslStringList;
pub use dataset::{Dataset, DatasetResolver};
pub use geo_transform::{GeoTransform, GeoTransformEx};
pub use metadata::Metadata;

#[cfg(test)]
pub(crate) mod test_utils;
