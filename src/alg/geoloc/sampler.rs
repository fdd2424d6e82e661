use crate::alg::geoloc::grid::GeolocGrid;
use crate::alg::geoloc::quad::Quad;

/// Forward evaluation of a [`GeolocGrid`]: grid index or full resolution
/// pixel/line to georeferenced coordinates.
///
/// Unlike [`GeolocGrid::sample_bilinear`] the sampler extends the grid
/// indefinitely beyond its borders using the closest complete grid square.
#[derive(Debug, Clone, Copy)]
pub struct ForwardSampler<'a> {
    grid: &'a GeolocGrid,
}

impl<'a> ForwardSampler<'a> {
    pub fn new(grid: &'a GeolocGrid) -> Self {
        ForwardSampler { grid }
    }

    pub fn grid(&self) -> &'a GeolocGrid {
        self.grid
    }

    /// Evaluates the full resolution position `(px, py)`.
    pub fn evaluate(&self, px: f64, py: f64) -> Option<(f64, f64)> {
        let (gx, gy) = self.grid.full_res_to_grid_index(px, py);
        self.pos_to_xy(gx, gy)
    }

    /// Evaluates the fractional grid index `(gx, gy)`.
    ///
    /// Fails when the node anchoring the interpolation is invalid.
    pub fn pos_to_xy(&self, gx: f64, gy: f64) -> Option<(f64, f64)> {
        if !gx.is_finite() || !gy.is_finite() {
            return None;
        }
        let grid = self.grid;
        let (w, h) = (grid.width(), grid.height());
        let mut ix = (gx.max(0.0) as usize).min(w - 1);
        let mut iy = (gy.max(0.0) as usize).min(h - 1);

        for attempt in 0..2 {
            let (x00, y00) = grid.node(ix, iy)?;
            let can_retry = attempt == 0;
            let fx = gx - ix as f64;
            let fy = gy - iy as f64;
            let right = (ix + 1 < w).then(|| grid.node(ix + 1, iy)).flatten();
            let below = (iy + 1 < h).then(|| grid.node(ix, iy + 1)).flatten();
            let diagonal = (ix + 1 < w && iy + 1 < h)
                .then(|| grid.node(ix + 1, iy + 1))
                .flatten();

            if let (Some((x10, y10)), Some((x01, y01)), Some((x11, y11))) = (right, below, diagonal) {
                let x10 = grid.shift_geo_x(x00, x10);
                let x01 = grid.shift_geo_x(x00, x01);
                let x11 = grid.shift_geo_x(x00, x11);
                let x = (1.0 - fy) * (x00 + fx * (x10 - x00)) + fy * (x01 + fx * (x11 - x01));
                let y = (1.0 - fy) * (y00 + fx * (y10 - y00)) + fy * (y01 + fx * (y11 - y01));
                return Some((grid.unshift_geo_x(x), y));
            }

            let last_col = ix == w - 1 && ix >= 1;
            let last_row = iy == h - 1 && iy >= 1;
            if can_retry && last_col && iy + 1 < h {
                ix -= 1;
                continue;
            }
            if can_retry && last_row && ix + 1 < w {
                iy -= 1;
                continue;
            }
            if can_retry && last_col && last_row {
                ix -= 1;
                iy -= 1;
                continue;
            }

            if let Some((x10, y10)) = right {
                let x = x00 + fx * (grid.shift_geo_x(x00, x10) - x00);
                let y = y00 + fx * (y10 - y00);
                return Some((grid.unshift_geo_x(x), y));
            }
            if let Some((x01, y01)) = below {
                let x = x00 + fy * (grid.shift_geo_x(x00, x01) - x00);
                let y = y00 + fy * (y01 - y00);
                return Some((grid.unshift_geo_x(x), y));
            }
            return Some((x00, y00));
        }
        None
    }

    /// Georeferenced quadrilateral of the cell whose top-left corner is the
    /// grid index `(i, j)`; `i` and `j` may be -1 or the last node index.
    /// Longitudes are unwrapped next to the first corner, as
    /// [`ForwardSampler::pos_to_xy`] does inside a cell.
    pub fn cell(&self, i: f64, j: f64) -> Option<Quad> {
        let first = self.pos_to_xy(i, j)?;
        let unwrap = |(x, y): (f64, f64)| (self.grid.shift_geo_x(first.0, x), y);
        Some(Quad::new(
            first,
            unwrap(self.pos_to_xy(i, j + 1.0)?),
            unwrap(self.pos_to_xy(i + 1.0, j)?),
            unwrap(self.pos_to_xy(i + 1.0, j + 1.0)?),
        ))
    }

    /// Forward mapping of the grid index `(gx, gy)` minus `(x, y)`, with
    /// longitude differences taken modulo 360 on geographic grids.
    pub fn residual(&self, gx: f64, gy: f64, x: f64, y: f64) -> Option<(f64, f64)> {
        let (fx, fy) = self.pos_to_xy(gx, gy)?;
        let mut dx = fx - x;
        if self.grid.normalizes_longitude() {
            dx = (dx + 180.0).rem_euclid(360.0) - 180.0;
        }
        Some((dx, fy - y))
    }

    /// Fractional grid index of `(x, y)` inside `quad`, the cell `(i, j)`
    /// or its wrapped copy. The position must map back to `(x, y)`.
    pub fn solve_in_quad(&self, quad: &Quad, i: f64, j: f64, x: f64, y: f64) -> Option<(f64, f64)> {
        if !quad.contains(x, y) {
            return None;
        }
        let (t, s) = quad.inverse_bilinear(x, y);
        let (gx, gy) = (i + t, j + s);
        let tolerance = quad.residual_tolerance(x, y);
        let (dx, dy) = self.residual(gx, gy, x, y)?;
        (dx.abs() <= tolerance && dy.abs() <= tolerance).then_some((gx, gy))
    }

    /// Locates `(x, y)` inside the cell `(i, j)` and returns its fractional
    /// grid index. Cells running past the antimeridian are tried on both
    /// sides of it.
    pub fn locate_in_cell(&self, i: f64, j: f64, x: f64, y: f64) -> Option<(f64, f64)> {
        let quad = self.cell(i, j)?;
        let wrapped = if self.grid.normalizes_longitude() {
            quad.wrapped()
        } else {
            None
        };
        std::iter::once(quad)
            .chain(wrapped)
            .find_map(|quad| self.solve_in_quad(&quad, i, j, x, y))
    }
}
