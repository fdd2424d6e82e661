//! Grid cells as quadrilaterals in georeferenced space.

/// Corners of a grid cell. Following the node order used throughout the
/// solvers, corner 0 is `(i, j)`, 1 is `(i, j+1)`, 2 is `(i+1, j)` and 3 is
/// `(i+1, j+1)`; the ring is 0, 2, 3, 1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quad {
    pub x: [f64; 4],
    pub y: [f64; 4],
}

const RING: [usize; 5] = [0, 2, 3, 1, 0];

impl Quad {
    pub fn new(c0: (f64, f64), c1: (f64, f64), c2: (f64, f64), c3: (f64, f64)) -> Self {
        Quad {
            x: [c0.0, c1.0, c2.0, c3.0],
            y: [c0.1, c1.1, c2.1, c3.1],
        }
    }

    /// Copy of a cell whose unwrapped longitudes run past ±180, moved by a
    /// full turn back towards [-180, 180].
    pub fn wrapped(&self) -> Option<Self> {
        let [min_x, _, max_x, _] = self.bbox();
        if max_x > 180.0 {
            Some(self.translated(-360.0))
        } else if min_x < -180.0 {
            Some(self.translated(360.0))
        } else {
            None
        }
    }

    pub fn translated(&self, dx: f64) -> Self {
        let mut quad = *self;
        for x in quad.x.iter_mut() {
            *x += dx;
        }
        quad
    }

    /// `[min_x, min_y, max_x, max_y]`
    pub fn bbox(&self) -> [f64; 4] {
        let fold = |v: &[f64; 4], f: fn(f64, f64) -> f64| v[1..].iter().fold(v[0], |a, b| f(a, *b));
        [
            fold(&self.x, f64::min),
            fold(&self.y, f64::min),
            fold(&self.x, f64::max),
            fold(&self.y, f64::max),
        ]
    }

    /// Largest forward residual accepted for a point located in this cell.
    pub fn residual_tolerance(&self, x: f64, y: f64) -> f64 {
        let [min_x, min_y, max_x, max_y] = self.bbox();
        1e-6 * (max_x - min_x).max(max_y - min_y) + 1e-9 * x.abs().max(y.abs()).max(1.0)
    }

    /// Point in the ring or on its boundary.
    pub fn contains(&self, x: f64, y: f64) -> bool {
        let mut inside = false;
        for w in RING.windows(2) {
            let (ax, ay) = (self.x[w[0]], self.y[w[0]]);
            let (bx, by) = (self.x[w[1]], self.y[w[1]]);
            if on_segment(ax, ay, bx, by, x, y) {
                return true;
            }
            if (ay > y) != (by > y) {
                let cross_x = ax + (y - ay) * (bx - ax) / (by - ay);
                if x < cross_x {
                    inside = !inside;
                }
            }
        }
        inside
    }

    /// Exact inverse of the bilinear interpolation over this cell.
    ///
    /// Returns `(t, s)`, the fractional offsets along the `i` and `j` axes of
    /// the point `(x, y)`, which must lie inside the cell.
    pub fn inverse_bilinear(&self, x: f64, y: f64) -> (f64, f64) {
        let [x0, x1, x2, x3] = self.x;
        let [y0, y1, y2, y3] = self.y;

        let a = (x0 - x) * (y0 - y2) - (y0 - y) * (x0 - x2);
        let b = (((x0 - x) * (y1 - y3) - (y0 - y) * (x1 - x3))
            + ((x1 - x) * (y0 - y2) - (y1 - y) * (x0 - x2)))
            / 2.0;
        let c = (x1 - x) * (y1 - y3) - (y1 - y) * (x1 - x3);
        let denom = a - 2.0 * b + c;

        let t_for = |s: f64| {
            let denom_x = (1.0 - s) * (x0 - x2) + s * (x1 - x3);
            let denom_y = (1.0 - s) * (y0 - y2) + s * (y1 - y3);
            if denom_x.abs() >= denom_y.abs() {
                ((1.0 - s) * (x0 - x) + s * (x1 - x)) / denom_x
            } else {
                ((1.0 - s) * (y0 - y) + s * (y1 - y)) / denom_y
            }
        };

        let scale = a.abs().max(b.abs()).max(c.abs());
        if denom.abs() <= 1e-12 * scale {
            // parallelogram: the quadratic degenerates to a linear equation
            let s = if (a - c).abs() < f64::MIN_POSITIVE {
                0.0
            } else {
                a / (a - c)
            };
            return (t_for(s), s);
        }

        // roots of denom * s^2 - 2 * (a - b) * s + a = 0, in the form that
        // avoids cancellation
        let sqrt_term = (b * b - a * c).max(0.0).sqrt();
        let q = (a - b) + (a - b).signum() * sqrt_term;
        let s1 = q / denom;
        let s2 = if q != 0.0 { a / q } else { s1 };
        let in_cell = |v: f64| (-1e-9..=1.0 + 1e-9).contains(&v);
        let (t1, t2) = (t_for(s1), t_for(s2));
        let s = if in_cell(s1) && in_cell(t1) {
            s1
        } else if in_cell(s2) && in_cell(t2) {
            s2
        } else if !(0.0..=1.0).contains(&s1) {
            s2
        } else {
            s1
        };
        let t = if s == s1 { t1 } else { t2 };
        (t, s)
    }
}

fn on_segment(ax: f64, ay: f64, bx: f64, by: f64, px: f64, py: f64) -> bool {
    let (dx, dy) = (bx - ax, by - ay);
    let len2 = dx * dx + dy * dy;
    if len2 == 0.0 {
        return ax == px && ay == py;
    }
    let cross = dx * (py - ay) - dy * (px - ax);
    if cross.abs() > 1e-10 * len2 {
        return false;
    }
    let dot = (px - ax) * dx + (py - ay) * dy;
    dot >= -1e-10 * len2 && dot <= len2 * (1.0 + 1e-10)
}
