use crate::alg::geoloc::grid::GeolocGrid;
use crate::alg::geoloc::info::GeorefConvention;
use crate::geo_transform::{GeoTransform, GeoTransformEx};

/// Closed form inverse for geolocation arrays that encode a single affine
/// map from grid index to georeferenced coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct AffineInverse {
    forward: GeoTransform,
    inverse: GeoTransform,
    domain: [f64; 4],
}

/// Tolerance, in grid index units, on the domain of the affine inverse.
const DOMAIN_EPSILON: f64 = 1e-6;

impl AffineInverse {
    /// Fits the map on three corner nodes and keeps it when every node agrees
    /// with it. Returns `None` whenever the grid is not exactly affine.
    pub fn detect(grid: &GeolocGrid) -> Option<Self> {
        let (w, h) = (grid.width(), grid.height());
        if w < 2 || h < 2 || grid.valid_nodes().count() != w * h {
            return None;
        }

        let (x00, y00) = grid.node(0, 0)?;
        let (x10, y10) = grid.node(w - 1, 0)?;
        let (x01, y01) = grid.node(0, h - 1)?;
        let (span_x, span_y) = ((w - 1) as f64, (h - 1) as f64);
        let forward: GeoTransform = [
            x00,
            (x10 - x00) / span_x,
            (x01 - x00) / span_y,
            y00,
            (y10 - y00) / span_x,
            (y01 - y00) / span_y,
        ];

        let cell_size = forward[1]
            .hypot(forward[4])
            .max(forward[2].hypot(forward[5]));
        let tolerance = 1e-9 * cell_size;
        let exact = grid.valid_nodes().all(|(ix, iy, x, y)| {
            let (px, py) = forward.apply(ix as f64, iy as f64);
            (px - x).abs() <= tolerance && (py - y).abs() <= tolerance
        });
        if !exact {
            return None;
        }

        let domain = match grid.convention() {
            GeorefConvention::TopLeftCorner => [0.0, 0.0, w as f64, h as f64],
            GeorefConvention::PixelCenter => [-0.5, -0.5, w as f64 - 0.5, h as f64 - 0.5],
        };
        if grid.normalizes_longitude() {
            let corners = [
                (domain[0], domain[1]),
                (domain[2], domain[1]),
                (domain[0], domain[3]),
                (domain[2], domain[3]),
            ];
            let in_range = corners
                .iter()
                .all(|&(gx, gy)| (-180.0..=180.0).contains(&forward.apply(gx, gy).0));
            if !in_range {
                return None;
            }
        }

        let inverse = forward.invert().ok()?;
        tracing::debug!(?forward, "geolocation arrays are affine");
        Some(AffineInverse {
            forward,
            inverse,
            domain,
        })
    }

    /// Grid index to georeferenced transform.
    pub fn geo_transform(&self) -> &GeoTransform {
        &self.forward
    }

    /// Fractional grid index of `(x, y)`, or `None` outside the area covered
    /// by the grid.
    pub fn locate(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        let (gx, gy) = self.inverse.apply(x, y);
        let [min_x, min_y, max_x, max_y] = self.domain;
        let inside = gx >= min_x - DOMAIN_EPSILON
            && gx <= max_x + DOMAIN_EPSILON
            && gy >= min_y - DOMAIN_EPSILON
            && gy <= max_y + DOMAIN_EPSILON;
        inside.then_some((gx, gy))
    }
}
