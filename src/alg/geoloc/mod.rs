//! Geolocation array transformer
//!
//! Georeferencing of a raster through two auxiliary arrays holding, for a
//! regularly strided subset of its pixels, the X (longitude) and Y
//! (latitude) coordinates. The arrays are described by the `GEOLOCATION`
//! metadata domain of the raster:
//!
//! | Key | Meaning |
//! |---|---|
//! | `X_DATASET`, `X_BAND` | dataset and band of the X array |
//! | `Y_DATASET`, `Y_BAND` | dataset and band of the Y array |
//! | `PIXEL_OFFSET`, `PIXEL_STEP` | raster column of the first array column, and columns per array column |
//! | `LINE_OFFSET`, `LINE_STEP` | same for rows |
//! | `SRS` | optional CRS of the coordinates |
//! | `GEOREFERENCING_CONVENTION` | `TOP_LEFT_CORNER` (default) or `PIXEL_CENTER` |
//! | `SWAP_XY` | optional, Y array first |
//!
//! The forward direction (pixel/line to georeferenced) interpolates the
//! arrays. The inverse direction is answered by an [`InverseSolver`] built on
//! first use: a closed form inverse when the arrays are affine, otherwise a
//! [`Backmap`] or a [`CellQuadtree`] depending on `GDAL_GEOLOC_INVERSE_METHOD`.
//!
//! ```
//! # fn main() -> geoloc::errors::Result<()> {
//! use geoloc::alg::geoloc::GeolocTransformer;
//! use geoloc::cpl::CslStringList;
//! use geoloc::raster::{Buffer, RasterBand};
//! use geoloc::vsi::register_mem_dataset;
//! use geoloc::Dataset;
//!
//! let lon = RasterBand::new(Buffer::new((4, 1), vec![10.0, 11.0, 12.0, 13.0]));
//! let lat = RasterBand::new(Buffer::new((3, 1), vec![50.0, 49.0, 48.0]));
//! register_mem_dataset("/vsimem/doc_lon", Dataset::from_bands("", vec![lon])?)?;
//! register_mem_dataset("/vsimem/doc_lat", Dataset::from_bands("", vec![lat])?)?;
//!
//! let metadata = CslStringList::from(&[
//!     ("X_DATASET", "/vsimem/doc_lon"),
//!     ("X_BAND", "1"),
//!     ("Y_DATASET", "/vsimem/doc_lat"),
//!     ("Y_BAND", "1"),
//!     ("PIXEL_OFFSET", "0"),
//!     ("PIXEL_STEP", "1"),
//!     ("LINE_OFFSET", "0"),
//!     ("LINE_STEP", "1"),
//! ]);
//! let transformer = GeolocTransformer::new(None, &metadata, false, &CslStringList::new())?;
//! assert_eq!(transformer.transform_point(false, 1.0, 2.0), Some((11.0, 48.0)));
//! let (pixel, line) = transformer.transform_point(true, 11.5, 48.5).unwrap();
//! assert!((pixel - 1.5).abs() < 1e-9 && (line - 1.5).abs() < 1e-9);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use crate::config::{self, CPLE_APP_DEFINED};
use crate::cpl::CslStringList;
use crate::dataset::{Dataset, DatasetResolver};
use crate::errors::{CplErrType, GeolocError, Result};
use crate::vsi::MemResolver;

mod affine;
mod backmap;
mod bounds;
mod fill;
mod grid;
mod info;
mod quad;
mod quadtree;
mod sampler;
mod solver;
mod storage;

#[cfg(test)]
mod tests;

pub use affine::AffineInverse;
pub use backmap::{Backmap, BackmapOptions, DEFAULT_OVERSAMPLE_FACTOR};
pub use bounds::BoundsIndex;
pub use grid::GeolocGrid;
pub use info::{GeolocationInfo, GeorefConvention};
pub use quad::Quad;
pub use quadtree::CellQuadtree;
pub use sampler::ForwardSampler;
pub use solver::{InverseMethod, InverseSolver, InverseStrategy, SolverConfig, SolverPhase};
pub use storage::{BackmapCell, BackmapStorage, HeapStorage, ScratchFileStorage, TEMP_DATASET_NODE_THRESHOLD};

/// Transformer between the pixel/line space of a raster and the coordinates
/// given by its geolocation arrays.
#[derive(Debug)]
pub struct GeolocTransformer {
    info: GeolocationInfo,
    grid: GeolocGrid,
    bounds: BoundsIndex,
    solver: InverseSolver,
    reversed: bool,
}

impl GeolocTransformer {
    /// Creates a transformer from a `GEOLOCATION` metadata list, opening the
    /// arrays from the `/vsimem/` registry.
    ///
    /// # Arguments
    ///
    /// * `base` - The dataset the metadata belongs to. Used when `X_DATASET`
    ///   or `Y_DATASET` are absent or name it.
    /// * `metadata` - The `GEOLOCATION` key/value list.
    /// * `reversed` - Set it to `true` to swap the forward and inverse directions.
    /// * `options` - Transformer options, e.g. `GEOLOC_INVERSE_METHOD=QUADTREE`.
    ///
    /// Failures are also reported to the error handler installed with
    /// [`crate::config::set_error_handler`].
    pub fn new(
        base: Option<&Dataset>,
        metadata: &CslStringList,
        reversed: bool,
        options: &CslStringList,
    ) -> Result<Self> {
        Self::with_resolver(base, metadata, reversed, None, options, &MemResolver)
    }

    /// Same as [`GeolocTransformer::new`] with the arrays opened by
    /// `resolver`. `source_dataset` is the name relative dataset names
    /// (`X_DATASET_RELATIVE_TO_SOURCE=YES`) are resolved against.
    pub fn with_resolver(
        base: Option<&Dataset>,
        metadata: &CslStringList,
        reversed: bool,
        source_dataset: Option<&str>,
        options: &CslStringList,
        resolver: &dyn DatasetResolver,
    ) -> Result<Self> {
        Self::create(base, metadata, reversed, source_dataset, options, resolver).inspect_err(|e| {
            config::report_error(CplErrType::Failure, CPLE_APP_DEFINED, &e.to_string())
        })
    }

    fn create(
        base: Option<&Dataset>,
        metadata: &CslStringList,
        reversed: bool,
        source_dataset: Option<&str>,
        options: &CslStringList,
        resolver: &dyn DatasetResolver,
    ) -> Result<Self> {
        let mut info = GeolocationInfo::from_metadata(metadata)?;
        if let Some(base) = base {
            info.default_datasets_to(base.description())?;
        }

        let x_name = info
            .resolved_dataset_name(true, source_dataset)
            .ok_or_else(|| GeolocError::invalid_metadata("X_DATASET", "missing geolocation field"))?;
        let y_name = info
            .resolved_dataset_name(false, source_dataset)
            .ok_or_else(|| GeolocError::invalid_metadata("Y_DATASET", "missing geolocation field"))?;

        let opened_x: Arc<Dataset>;
        let x_dataset = match base.filter(|b| b.description() == x_name) {
            Some(base) => base,
            None => {
                opened_x = resolver.open_shared(&x_name)?;
                &*opened_x
            }
        };
        let opened_y: Arc<Dataset>;
        let y_dataset = match base.filter(|b| b.description() == y_name) {
            Some(base) => base,
            None => {
                opened_y = resolver.open_shared(&y_name)?;
                &*opened_y
            }
        };

        let grid = GeolocGrid::build(&info, x_dataset, y_dataset)?;
        let bounds = BoundsIndex::compute(&grid);
        tracing::debug!(
            width = grid.width(),
            height = grid.height(),
            normalize_longitude = grid.normalizes_longitude(),
            "geolocation arrays loaded"
        );
        let solver = InverseSolver::new(grid.clone(), bounds.clone(), SolverConfig::from_options(options));

        Ok(GeolocTransformer {
            info,
            grid,
            bounds,
            solver,
            reversed,
        })
    }

    /// Builds the inverse solver now instead of on the first inverse query.
    pub fn build_inverse(&self) -> Result<()> {
        self.solver.build().map(|_| ())
    }

    pub fn info(&self) -> &GeolocationInfo {
        &self.info
    }

    pub fn grid(&self) -> &GeolocGrid {
        &self.grid
    }

    pub fn bounds(&self) -> &BoundsIndex {
        &self.bounds
    }

    pub fn solver(&self) -> &InverseSolver {
        &self.solver
    }

    pub fn solver_phase(&self) -> SolverPhase {
        self.solver.phase()
    }

    pub fn is_reversed(&self) -> bool {
        self.reversed
    }

    /// CRS of the georeferenced coordinates, as declared by `SRS`.
    pub fn srs(&self) -> Option<&str> {
        self.info.srs.as_deref()
    }

    /// The effective `GEOLOCATION` metadata, with the dataset names filled
    /// in. Together with [`GeolocTransformer::is_reversed`] it is enough to
    /// recreate the transformer.
    pub fn geolocation_info(&self) -> &CslStringList {
        self.info.metadata()
    }

    /// Transform a 2D point.
    ///
    /// # Arguments
    ///
    /// * `dst_to_src` - `false` maps pixel/line to georeferenced
    ///   coordinates, `true` the opposite (the reverse when the transformer
    ///   is reversed).
    /// * `x` - The pixel or X coordinate.
    /// * `y` - The line or Y coordinate.
    ///
    /// Returns `None` when the point cannot be transformed.
    pub fn transform_point(&self, dst_to_src: bool, x: f64, y: f64) -> Option<(f64, f64)> {
        if dst_to_src != self.reversed {
            let (x, y) = if self.grid.swap_xy() { (y, x) } else { (x, y) };
            if !self.bounds.contains(x, y) {
                return None;
            }
            self.solver.locate(x, y)
        } else {
            let (gx, gy) = ForwardSampler::new(&self.grid).evaluate(x, y)?;
            Some(if self.grid.swap_xy() { (gy, gx) } else { (gx, gy) })
        }
    }

    /// Transform points in place. Points that cannot be transformed are set
    /// to infinity and flagged `false` in the returned vector.
    ///
    /// # Panics
    ///
    /// Panics if `x` and `y` differ in length.
    pub fn transform_coords(&self, dst_to_src: bool, x: &mut [f64], y: &mut [f64]) -> Vec<bool> {
        assert_eq!(x.len(), y.len(), "coordinate slices must have the same length");
        x.iter_mut()
            .zip(y.iter_mut())
            .map(|(x, y)| match self.transform_point(dst_to_src, *x, *y) {
                Some((tx, ty)) => {
                    (*x, *y) = (tx, ty);
                    true
                }
                None => {
                    (*x, *y) = (f64::INFINITY, f64::INFINITY);
                    false
                }
            })
            .collect()
    }

    /// Transformer for the same arrays addressed from a raster whose size
    /// is the one of this transformer's raster divided by
    /// `ratio_x` x `ratio_y`.
    pub fn create_similar(&self, ratio_x: f64, ratio_y: f64) -> Result<Self> {
        let info = self.info.rescaled(ratio_x, ratio_y)?;
        let grid = self.grid.with_addressing(&info);
        let solver = InverseSolver::new(grid.clone(), self.bounds.clone(), self.solver.config().clone());
        Ok(GeolocTransformer {
            info,
            grid,
            bounds: self.bounds.clone(),
            solver,
            reversed: self.reversed,
        })
    }
}
