//! Inverse lookup through a backmap: a raster in georeferenced space whose
//! cells hold the full resolution pixel/line mapping to them.

use crate::alg::geoloc::bounds::BoundsIndex;
use crate::alg::geoloc::fill::{fill_line_gaps, fill_nodata};
use crate::alg::geoloc::grid::GeolocGrid;
use crate::alg::geoloc::sampler::ForwardSampler;
use crate::alg::geoloc::storage::{BackmapStorage, HeapStorage, ScratchFileStorage};
use crate::errors::{GeolocError, Result};
use crate::geo_transform::GeoTransform;

pub const DEFAULT_OVERSAMPLE_FACTOR: f64 = 1.3;

const FILL_MAX_SEARCH_DIST: f64 = 3.0;
const FILL_SMOOTHING_ITERATIONS: usize = 1;
const LINE_FILL_MAX_DIFFERENCE: f32 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackmapOptions {
    /// Backmap cells per geolocation node, in [0.1, 2].
    pub oversample_factor: f64,
    /// Keep the cells in a scratch file instead of memory.
    pub use_temp_dataset: bool,
}

impl Default for BackmapOptions {
    fn default() -> Self {
        BackmapOptions {
            oversample_factor: DEFAULT_OVERSAMPLE_FACTOR,
            use_temp_dataset: false,
        }
    }
}

pub struct Backmap {
    storage: Box<dyn BackmapStorage>,
    geo_transform: GeoTransform,
    width: usize,
    height: usize,
}

impl std::fmt::Debug for Backmap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backmap")
            .field("geo_transform", &self.geo_transform)
            .field("width", &self.width)
            .field("height", &self.height)
            .finish()
    }
}

struct Splatter<'a> {
    grid: &'a GeolocGrid,
    cells: &'a mut dyn BackmapStorage,
    pixel_size: (f64, f64),
}

impl Splatter<'_> {
    /// Adds a weighted contribution of the grid position `(gx, gy)` unless
    /// the averaged value of the cell would land on a node too far away from
    /// the contributing one.
    fn update(&mut self, bx: usize, by: usize, gx: f64, gy: f64, weight: f64) -> Result<()> {
        let grid = self.grid;
        let (px, py) = grid.grid_index_to_full_res(gx, gy);
        let [sum_x, sum_y, sum_w] = self.cells.get(bx, by)?;
        let updated = [
            sum_x + (weight * px) as f32,
            sum_y + (weight * py) as f32,
            sum_w + weight as f32,
        ];
        if !(updated[2] > 0.0) {
            return Ok(());
        }

        let avg_x = (updated[0] / updated[2]) as f64;
        let avg_y = (updated[1] / updated[2]) as f64;
        let (avg_gx, avg_gy) = grid.full_res_to_grid_index(avg_x, avg_y);
        let avg_ix = (avg_gx.max(0.0) as usize).min(grid.width() - 1);
        let avg_iy = (avg_gy.max(0.0) as usize).min(grid.height() - 1);
        let Some((avg_node_x, avg_node_y)) = grid.node(avg_ix, avg_iy) else {
            return Ok(());
        };

        let at_edge = gx < 0.0
            || gy < 0.0
            || gx as usize >= grid.width() - 1
            || gy as usize >= grid.height() - 1;
        let accepted = at_edge
            || grid.node(gx as usize, gy as usize).is_some_and(|(node_x, node_y)| {
                (avg_node_x - node_x).abs() <= 2.0 * self.pixel_size.0
                    && (avg_node_y - node_y).abs() <= 2.0 * self.pixel_size.1
            });
        if accepted {
            self.cells.set(bx, by, updated)?;
        }
        Ok(())
    }
}

impl Backmap {
    /// Rasterizes the forward mapping of `grid` over its `bounds`.
    pub fn build(grid: &GeolocGrid, bounds: &BoundsIndex, options: &BackmapOptions) -> Result<Self> {
        tracing::debug!("starting backmap generation");
        let envelope = bounds
            .envelope()
            .ok_or_else(|| GeolocError::InvalidBackmap("no valid geolocation node".to_string()))?;

        let target_pixels = grid.node_count() as f64 * options.oversample_factor;
        let square = (envelope.width() * envelope.height() / target_pixels).sqrt();
        if !(square > 0.0) || !square.is_finite() {
            return Err(GeolocError::InvalidBackmap(
                "Invalid pixel size for backmap".to_string(),
            ));
        }

        let min_x = envelope.min().x - square / 2.0;
        let max_x = envelope.max().x + square / 2.0;
        let min_y = envelope.min().y - square / 2.0;
        let max_y = envelope.max().y + square / 2.0;
        let cols = ((max_x - min_x) / square).ceil();
        let rows = ((max_y - min_y) / square).ceil();
        if !(cols > 0.0 && cols + 1.0 < i32::MAX as f64) || !(rows > 0.0 && rows + 1.0 < i32::MAX as f64) {
            return Err(GeolocError::InvalidBackmap(format!(
                "Int overflow : {cols} x {rows}"
            )));
        }
        let (cols, rows) = (cols as usize, rows as usize);
        let pixel_size = ((max_x - min_x) / cols as f64, (max_y - min_y) / rows as f64);
        // extra row and column for the right and bottom edges of top-left
        // corner grids
        let (width, height) = (cols + 1, rows + 1);
        let geo_transform = [min_x, pixel_size.0, 0.0, max_y, 0.0, -pixel_size.1];
        tracing::debug!(width, height, ?geo_transform, "backmap size");

        let mut storage: Box<dyn BackmapStorage> = if options.use_temp_dataset {
            Box::new(ScratchFileStorage::new(width, height)?)
        } else {
            Box::new(HeapStorage::new(width, height))
        };
        let mut splatter = Splatter {
            grid,
            cells: storage.as_mut(),
            pixel_size,
        };
        let sampler = ForwardSampler::new(grid);

        let step = 1.0 / options.oversample_factor;
        let steps_x = ((grid.width() as f64 + 3.0 * step) / step).floor() as usize;
        let steps_y = ((grid.height() as f64 + 3.0 * step) / step).floor() as usize;

        for ky in 0..=steps_y {
            let gy = -step + ky as f64 * step;
            for kx in 0..=steps_x {
                let gx = -step + kx as f64 * step;
                let Some((geo_x, geo_y)) = sampler.pos_to_xy(gx, gy) else {
                    continue;
                };

                let fbx = (geo_x - min_x) / pixel_size.0;
                let fby = (max_y - geo_y) / pixel_size.1;
                let ibx = fbx.floor() as isize;
                let iby = fby.floor() as isize;

                if ibx >= 0 && iby >= 0 && (ibx as usize) < width && (iby as usize) < height {
                    let (bx, by) = (ibx as usize, iby as usize);
                    let node_x = min_x + bx as f64 * pixel_size.0;
                    let node_y = max_y - by as f64 * pixel_size.1;
                    if let Some((cgx, cgy)) = Self::exact_position(&sampler, gx, gy, node_x, node_y) {
                        let (px, py) = grid.grid_index_to_full_res(cgx, cgy);
                        splatter.cells.set(bx, by, [px as f32, py as f32, 1.0])?;
                        continue;
                    }
                }

                if ibx < -1 || iby < -1 || ibx > width as isize || iby > height as isize {
                    continue;
                }
                let frac_x = fbx - ibx as f64;
                let frac_y = fby - iby as f64;
                let corners = [
                    (ibx, iby, (1.0 - frac_x) * (1.0 - frac_y)),
                    (ibx + 1, iby, frac_x * (1.0 - frac_y)),
                    (ibx + 1, iby + 1, frac_x * frac_y),
                    (ibx, iby + 1, (1.0 - frac_x) * frac_y),
                ];
                for (cx, cy, weight) in corners {
                    if cx < 0 || cy < 0 || cx as usize >= width || cy as usize >= height {
                        continue;
                    }
                    let (cx, cy) = (cx as usize, cy as usize);
                    if splatter.cells.get(cx, cy)?[2] != 1.0 {
                        splatter.update(cx, cy, gx, gy, weight)?;
                    }
                }
            }
        }

        // normalize the accumulated sums
        for by in 0..height {
            for bx in 0..width {
                let [sum_x, sum_y, weight] = storage.get(bx, by)?;
                if weight > 0.0 && weight != 1.0 {
                    storage.set(bx, by, [sum_x / weight, sum_y / weight, 1.0])?;
                }
            }
        }
        let filled = fill_nodata(storage.as_mut(), FILL_MAX_SEARCH_DIST, FILL_SMOOTHING_ITERATIONS)?;
        fill_line_gaps(storage.as_mut(), LINE_FILL_MAX_DIFFERENCE)?;
        storage.flush()?;
        tracing::debug!(filled, "ending backmap generation");

        Ok(Backmap {
            storage,
            geo_transform,
            width,
            height,
        })
    }

    /// Grid index of the backmap node `(node_x, node_y)` when it falls in
    /// one of the cells around the traversal position `(gx, gy)`.
    fn exact_position(
        sampler: &ForwardSampler,
        gx: f64,
        gy: f64,
        node_x: f64,
        node_y: f64,
    ) -> Option<(f64, f64)> {
        let grid = sampler.grid();
        let mut candidates = vec![node_x];
        if grid.normalizes_longitude() && node_x.abs() >= 180.0 {
            candidates.push(if node_x >= 180.0 { node_x - 360.0 } else { node_x + 360.0 });
        }
        for x in candidates {
            for sx in [-1.0, 0.0] {
                for sy in [-1.0, 0.0] {
                    let (i, j) = (gx.floor() + sx, gy.floor() + sy);
                    if let Some(found) = sampler.locate_in_cell(i, j, x, node_y) {
                        return Some(found);
                    }
                }
            }
        }
        None
    }

    pub fn geo_transform(&self) -> &GeoTransform {
        &self.geo_transform
    }

    /// `(width, height)` in cells.
    pub fn size(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    /// Stored value of a cell.
    pub fn cell(&self, x: usize, y: usize) -> Result<Option<[f32; 2]>> {
        self.storage.value(x, y)
    }

    /// Interpolated full resolution pixel/line of `(x, y)` read from the
    /// backmap alone.
    pub fn approximate(&self, x: f64, y: f64) -> Result<Option<(f64, f64)>> {
        let gt = &self.geo_transform;
        let bx = (x - gt[0]) / gt[1];
        let by = (y - gt[3]) / gt[5];
        if !(bx >= 0.0 && by >= 0.0 && bx + 1.0 < self.width as f64 && by + 1.0 < self.height as f64) {
            return Ok(None);
        }
        let (ix, iy) = (bx as usize, by as usize);
        let (fx, fy) = (bx - ix as f64, by - iy as f64);

        let Some(v00) = self.storage.value(ix, iy)? else {
            return Ok(None);
        };
        let v10 = self.storage.value(ix + 1, iy)?;
        let v01 = self.storage.value(ix, iy + 1)?;
        let v11 = self.storage.value(ix + 1, iy + 1)?;
        let lerp = |a: f32, b: f32, t: f64| a as f64 + t * (b as f64 - a as f64);

        let value = match (v10, v01, v11) {
            (Some(v10), Some(v01), Some(v11)) => {
                let interp = |k: usize| {
                    (1.0 - fy) * lerp(v00[k], v10[k], fx) + fy * lerp(v01[k], v11[k], fx)
                };
                (interp(0), interp(1))
            }
            (Some(v10), _, _) => (lerp(v00[0], v10[0], fx), lerp(v00[1], v10[1], fx)),
            (None, Some(v01), _) => (lerp(v00[0], v01[0], fy), lerp(v00[1], v01[1], fy)),
            _ => (v00[0] as f64, v00[1] as f64),
        };
        Ok(Some(value))
    }
}

#[cfg(test)]
mod tests {
    use ndarray::Array2;

    use super::*;
    use crate::alg::geoloc::info::GeolocationInfo;
    use crate::assert_near;
    use crate::cpl::CslStringList;

    fn grid(step: f64) -> GeolocGrid {
        let info = GeolocationInfo::from_metadata(&CslStringList::from(&[
            ("X_BAND", "1"),
            ("Y_BAND", "1"),
            ("PIXEL_OFFSET", "0"),
            ("PIXEL_STEP", "2"),
            ("LINE_OFFSET", "0"),
            ("LINE_STEP", "2"),
        ]))
        .unwrap();
        let x = Array2::from_shape_fn((8, 10), |(_, i)| -80.0 + step * i as f64);
        let y = Array2::from_shape_fn((8, 10), |(j, _)| 50.0 - step * j as f64);
        GeolocGrid::from_arrays(&info, x, y, None).unwrap()
    }

    fn build(grid: &GeolocGrid, use_temp_dataset: bool) -> Backmap {
        let bounds = BoundsIndex::compute(grid);
        let options = BackmapOptions {
            use_temp_dataset,
            ..Default::default()
        };
        Backmap::build(grid, &bounds, &options).unwrap()
    }

    #[test]
    fn approximates_affine_grid() {
        let grid = grid(0.5);
        let backmap = build(&grid, false);
        let (w, h) = backmap.size();
        assert!(w > 10 && h > 8);

        for (px, py) in [(3.0, 5.0), (10.5, 7.25), (17.0, 13.0)] {
            let x = -80.0 + 0.5 * px / 2.0;
            let y = 50.0 - 0.5 * py / 2.0;
            let (ax, ay) = backmap.approximate(x, y).unwrap().unwrap();
            assert_near!(ax, px, epsilon = 0.05);
            assert_near!(ay, py, epsilon = 0.05);
        }
        assert_eq!(backmap.approximate(-100.0, 45.0).unwrap(), None);
    }

    #[test]
    fn temp_dataset_is_equivalent() {
        let grid = grid(0.25);
        let in_memory = build(&grid, false);
        let on_disk = build(&grid, true);
        assert_eq!(in_memory.size(), on_disk.size());
        assert_eq!(in_memory.geo_transform(), on_disk.geo_transform());
        let (w, h) = in_memory.size();
        for y in 0..h {
            for x in 0..w {
                assert_eq!(in_memory.cell(x, y).unwrap(), on_disk.cell(x, y).unwrap());
            }
        }
    }

    #[test]
    fn degenerate_grid() {
        let info = GeolocationInfo::from_metadata(&CslStringList::from(&[
            ("X_BAND", "1"),
            ("Y_BAND", "1"),
            ("PIXEL_OFFSET", "0"),
            ("PIXEL_STEP", "1"),
            ("LINE_OFFSET", "0"),
            ("LINE_STEP", "1"),
        ]))
        .unwrap();
        let x = Array2::from_elem((3, 3), 5.0);
        let y = Array2::from_shape_fn((3, 3), |(j, _)| j as f64);
        let grid = GeolocGrid::from_arrays(&info, x, y, None).unwrap();
        let bounds = BoundsIndex::compute(&grid);
        assert!(matches!(
            Backmap::build(&grid, &bounds, &BackmapOptions::default()),
            Err(GeolocError::InvalidBackmap(_))
        ));
    }
}
