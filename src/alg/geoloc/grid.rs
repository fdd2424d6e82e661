use std::sync::Arc;

use ndarray::Array2;

use crate::alg::geoloc::info::{GeolocationInfo, GeorefConvention};
use crate::dataset::Dataset;
use crate::errors::{GeolocError, Result};
use crate::raster::RasterBand;
use crate::spatial_ref::SpatialRef;

/// The coarse geolocation arrays and their addressing in full resolution
/// pixel/line space.
///
/// Node values are immutable once loaded and shared between grids derived
/// with [`GeolocGrid::with_addressing`].
#[derive(Debug, Clone)]
pub struct GeolocGrid {
    nodes: Arc<Array2<Option<(f64, f64)>>>,
    pixel_offset: f64,
    pixel_step: f64,
    line_offset: f64,
    line_step: f64,
    convention: GeorefConvention,
    srs: Option<String>,
    swap_xy: bool,
    normalize_longitude: bool,
}

impl GeolocGrid {
    /// Builds the grid from the X and Y datasets referenced by `info`.
    pub fn build(info: &GeolocationInfo, x_dataset: &Dataset, y_dataset: &Dataset) -> Result<Self> {
        let x_band = x_dataset.rasterband(info.x_band)?;
        let y_band = y_dataset.rasterband(info.y_band)?;
        Self::from_bands(info, x_band, y_band)
    }

    /// Builds the grid from two bands.
    ///
    /// When both bands are a single row high the grid is regular: the X band
    /// holds the coordinate of every column and the Y band the coordinate of
    /// every row.
    pub fn from_bands(info: &GeolocationInfo, x_band: &RasterBand, y_band: &RasterBand) -> Result<Self> {
        let (x_cols, x_rows) = x_band.size();
        let (y_cols, y_rows) = y_band.size();

        if x_rows == 1 || y_rows == 1 {
            if x_rows != 1 || y_rows != 1 {
                return Err(GeolocError::invalid_metadata(
                    "Y_BAND",
                    "X_BAND and Y_BAND should have both a height of 1",
                ));
            }
            let xs = x_band.buffer().row(0);
            let ys = y_band.buffer().row(0);
            let x = Array2::from_shape_fn((y_cols, x_cols), |(_, i)| xs[i]);
            let y = Array2::from_shape_fn((y_cols, x_cols), |(j, _)| ys[j]);
            return Self::from_arrays(info, x, y, x_band.no_data_value());
        }

        let x = x_band.read_band().to_array()?;
        let y = y_band.read_band().to_array()?;
        Self::from_arrays(info, x, y, x_band.no_data_value())
    }

    /// Builds the grid from `(rows, cols)` arrays. Nodes whose X value equals
    /// `no_data_x`, or with a non finite coordinate, are invalid.
    pub fn from_arrays(
        info: &GeolocationInfo,
        x: Array2<f64>,
        y: Array2<f64>,
        no_data_x: Option<f64>,
    ) -> Result<Self> {
        if x.dim() != y.dim() {
            return Err(GeolocError::invalid_metadata(
                "Y_BAND",
                format!(
                    "X_BAND and Y_BAND do not have the same dimensions: {:?} vs {:?}",
                    x.dim(),
                    y.dim()
                ),
            ));
        }
        if x.is_empty() {
            return Err(GeolocError::invalid_metadata("X_BAND", "empty geolocation array"));
        }

        let nodes = ndarray::Zip::from(&x).and(&y).map_collect(|&gx, &gy| {
            let invalid = !gx.is_finite() || !gy.is_finite() || no_data_x == Some(gx);
            (!invalid).then_some((gx, gy))
        });

        let mut grid = GeolocGrid {
            nodes: Arc::new(nodes),
            pixel_offset: info.pixel_offset,
            pixel_step: info.pixel_step,
            line_offset: info.line_offset,
            line_step: info.line_step,
            convention: info.convention,
            srs: info.srs.clone(),
            swap_xy: info.swap_xy,
            normalize_longitude: false,
        };
        grid.normalize_longitude = grid.detect_geographic_range();
        Ok(grid)
    }

    /// Same node arrays, addressed as described by `info`.
    pub fn with_addressing(&self, info: &GeolocationInfo) -> Self {
        GeolocGrid {
            nodes: Arc::clone(&self.nodes),
            pixel_offset: info.pixel_offset,
            pixel_step: info.pixel_step,
            line_offset: info.line_offset,
            line_step: info.line_step,
            convention: info.convention,
            srs: info.srs.clone(),
            swap_xy: info.swap_xy,
            normalize_longitude: self.normalize_longitude,
        }
    }

    /// Geographic SRS with all longitudes within [-180, 180].
    fn detect_geographic_range(&self) -> bool {
        if self.swap_xy {
            return false;
        }
        let geographic = self
            .srs
            .as_deref()
            .and_then(|srs| SpatialRef::from_definition(srs).ok())
            .is_some_and(|srs| srs.is_geographic());
        geographic
            && self
                .valid_nodes()
                .all(|(_, _, x, _)| (-180.0..=180.0).contains(&x))
    }

    pub fn width(&self) -> usize {
        self.nodes.ncols()
    }

    pub fn height(&self) -> usize {
        self.nodes.nrows()
    }

    pub fn convention(&self) -> GeorefConvention {
        self.convention
    }

    pub fn srs(&self) -> Option<&str> {
        self.srs.as_deref()
    }

    pub fn swap_xy(&self) -> bool {
        self.swap_xy
    }

    /// Whether longitudes are unwrapped inside cells and renormalized to
    /// [-180, 180].
    pub fn normalizes_longitude(&self) -> bool {
        self.normalize_longitude
    }

    /// Node at column `ix`, row `iy`; `None` when invalid or out of range.
    pub fn node(&self, ix: usize, iy: usize) -> Option<(f64, f64)> {
        self.nodes.get((iy, ix)).copied().flatten()
    }

    /// `(ix, iy, x, y)` of every valid node, row by row.
    pub fn valid_nodes(&self) -> impl Iterator<Item = (usize, usize, f64, f64)> + '_ {
        self.nodes
            .indexed_iter()
            .filter_map(|((iy, ix), node)| node.map(|(x, y)| (ix, iy, x, y)))
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Full resolution pixel/line to fractional grid index.
    pub fn full_res_to_grid_index(&self, px: f64, py: f64) -> (f64, f64) {
        let shift = self.convention.offset();
        (
            (px - self.pixel_offset) / self.pixel_step - shift,
            (py - self.line_offset) / self.line_step - shift,
        )
    }

    /// Fractional grid index to full resolution pixel/line.
    pub fn grid_index_to_full_res(&self, gx: f64, gy: f64) -> (f64, f64) {
        let shift = self.convention.offset();
        (
            (gx + shift) * self.pixel_step + self.pixel_offset,
            (gy + shift) * self.line_step + self.line_offset,
        )
    }

    /// Brings `x` next to `ref_x` when the two sit on both sides of the
    /// antimeridian.
    pub fn shift_geo_x(&self, ref_x: f64, x: f64) -> f64 {
        if !self.normalize_longitude {
            return x;
        }
        if ref_x > 90.0 && x < -90.0 {
            x + 360.0
        } else if ref_x < -90.0 && x > 90.0 {
            x - 360.0
        } else {
            x
        }
    }

    /// Renormalizes a longitude to [-180, 180].
    pub fn unshift_geo_x(&self, x: f64) -> f64 {
        if !self.normalize_longitude {
            x
        } else if x > 180.0 {
            x - 360.0
        } else if x < -180.0 {
            x + 360.0
        } else {
            x
        }
    }

    /// Bilinear interpolation of the four nodes around `(gx, gy)`.
    ///
    /// Fails outside `[0, width-1] x [0, height-1]` or when one of the
    /// nodes with a non-zero weight is invalid.
    pub fn sample_bilinear(&self, gx: f64, gy: f64) -> Option<(f64, f64)> {
        let max_x = (self.width() - 1) as f64;
        let max_y = (self.height() - 1) as f64;
        if !(gx >= 0.0 && gy >= 0.0 && gx <= max_x && gy <= max_y) {
            return None;
        }
        let ix = (gx.floor() as usize).min(self.width().saturating_sub(2));
        let iy = (gy.floor() as usize).min(self.height().saturating_sub(2));
        let fx = gx - ix as f64;
        let fy = gy - iy as f64;

        let (x00, y00) = self.node(ix, iy)?;
        let corner = |dx: usize, dy: usize, weight: f64| -> Option<(f64, f64)> {
            if weight == 0.0 {
                return Some((x00, y00));
            }
            self.node(ix + dx, iy + dy)
        };
        let (x10, y10) = corner(1, 0, fx)?;
        let (x01, y01) = corner(0, 1, fy)?;
        let (x11, y11) = corner(1, 1, fx * fy)?;

        let x10 = self.shift_geo_x(x00, x10);
        let x01 = self.shift_geo_x(x00, x01);
        let x11 = self.shift_geo_x(x00, x11);

        let x = (1.0 - fy) * (x00 + fx * (x10 - x00)) + fy * (x01 + fx * (x11 - x01));
        let y = (1.0 - fy) * (y00 + fx * (y10 - y00)) + fy * (y01 + fx * (y11 - y01));
        Some((self.unshift_geo_x(x), y))
    }
}
