use geo_types::{coord, Rect};

use crate::alg::geoloc::grid::GeolocGrid;
use crate::alg::geoloc::info::GeorefConvention;
use crate::alg::geoloc::sampler::ForwardSampler;

/// The georeferenced envelope actually covered by a [`GeolocGrid`].
#[derive(Debug, Clone, PartialEq)]
pub struct BoundsIndex {
    envelope: Option<Rect<f64>>,
    unwrapped: Option<Rect<f64>>,
    wraps_longitude: bool,
}

fn envelope_of(points: impl Iterator<Item = (f64, f64)>) -> Option<Rect<f64>> {
    points.fold(None, |acc: Option<Rect<f64>>, (x, y)| {
        Some(match acc {
            None => Rect::new(coord! { x: x, y: y }, coord! { x: x, y: y }),
            Some(r) => Rect::new(
                coord! { x: r.min().x.min(x), y: r.min().y.min(y) },
                coord! { x: r.max().x.max(x), y: r.max().y.max(y) },
            ),
        })
    })
}

fn unwrap_longitude(x: f64) -> f64 {
    if x < 0.0 {
        x + 360.0
    } else {
        x
    }
}

/// Grid indexes along a pixel-center edge: half a cell before the first
/// node, every node, half a cell after the last one.
fn half_cell_edge(nodes: usize) -> impl Iterator<Item = f64> {
    std::iter::once(-0.5)
        .chain((0..nodes).map(|k| k as f64))
        .chain(std::iter::once(nodes as f64 - 0.5))
}

fn contains(rect: &Rect<f64>, x: f64, y: f64) -> bool {
    let eps_x = 1e-9 * rect.width().max(f64::MIN_POSITIVE);
    let eps_y = 1e-9 * rect.height().max(f64::MIN_POSITIVE);
    x >= rect.min().x - eps_x
        && x <= rect.max().x + eps_x
        && y >= rect.min().y - eps_y
        && y <= rect.max().y + eps_y
}

impl BoundsIndex {
    /// Scans the valid nodes plus the edges of the area the grid covers
    /// (the virtual last row and column for top-left corner grids, half a
    /// cell around pixel-center grids).
    ///
    /// A geographic grid that does not wrap but has cells interpolating
    /// across the antimeridian, e.g. around a pole, covers all longitudes.
    pub fn compute(grid: &GeolocGrid) -> Self {
        let points = Self::covered_points(grid);
        let mut envelope = envelope_of(points.iter().copied());

        let wraps_longitude = envelope.is_some_and(|raw| {
            let unwrapped = envelope_of(points.iter().map(|&(x, y)| (unwrap_longitude(x), y)));
            let narrower = unwrapped.is_some_and(|u| u.width() < raw.width());
            raw.width() > 180.0 && narrower && Self::has_seam_jump(grid)
        });
        if !wraps_longitude && grid.normalizes_longitude() && Self::has_wrapped_cell(grid) {
            envelope = envelope.map(|e| {
                Rect::new(
                    coord! { x: -180.0, y: e.min().y },
                    coord! { x: 180.0, y: e.max().y },
                )
            });
        }
        let unwrapped = if wraps_longitude {
            envelope_of(points.iter().map(|&(x, y)| (unwrap_longitude(x), y)))
        } else {
            envelope
        };

        tracing::debug!(?envelope, wraps_longitude, "geolocation bounds computed");
        BoundsIndex {
            envelope,
            unwrapped,
            wraps_longitude,
        }
    }

    fn covered_points(grid: &GeolocGrid) -> Vec<(f64, f64)> {
        let sampler = ForwardSampler::new(grid);
        let (w, h) = (grid.width(), grid.height());
        let mut points: Vec<(f64, f64)> = grid.valid_nodes().map(|(_, _, x, y)| (x, y)).collect();

        let mut edge = |gx: f64, gy: f64| {
            if let Some((x, y)) = sampler.pos_to_xy(gx, gy) {
                let x = if grid.normalizes_longitude() {
                    x.clamp(-180.0, 180.0)
                } else {
                    x
                };
                points.push((x, y));
            }
        };

        match grid.convention() {
            GeorefConvention::TopLeftCorner => {
                for ix in 0..=w {
                    edge(ix as f64, h as f64);
                }
                for iy in 0..=h {
                    edge(w as f64, iy as f64);
                }
            }
            GeorefConvention::PixelCenter => {
                for gx in half_cell_edge(w) {
                    edge(gx, -0.5);
                    edge(gx, h as f64 - 0.5);
                }
                for gy in half_cell_edge(h) {
                    edge(-0.5, gy);
                    edge(w as f64 - 0.5, gy);
                }
            }
        }
        points
    }

    /// A cell whose longitudes, unwrapped like the forward mapping does, run
    /// past ±180.
    fn has_wrapped_cell(grid: &GeolocGrid) -> bool {
        let sampler = ForwardSampler::new(grid);
        let (w, h) = (grid.width(), grid.height());
        (0..h.saturating_sub(1)).any(|j| {
            (0..w.saturating_sub(1)).any(|i| {
                sampler
                    .cell(i as f64, j as f64)
                    .is_some_and(|quad| quad.wrapped().is_some())
            })
        })
    }

    /// Neighbouring nodes more than 180 degrees apart.
    fn has_seam_jump(grid: &GeolocGrid) -> bool {
        grid.valid_nodes().any(|(ix, iy, x, _)| {
            [(ix + 1, iy), (ix, iy + 1)]
                .into_iter()
                .filter_map(|(nx, ny)| grid.node(nx, ny))
                .any(|(nx, _)| (nx - x).abs() > 180.0)
        })
    }

    /// `None` when the grid has no valid node.
    pub fn envelope(&self) -> Option<Rect<f64>> {
        self.envelope
    }

    /// Envelope with negative longitudes shifted by +360 when the grid
    /// crosses the antimeridian; the plain envelope otherwise.
    pub fn unwrapped_envelope(&self) -> Option<Rect<f64>> {
        self.unwrapped
    }

    pub fn wraps_longitude(&self) -> bool {
        self.wraps_longitude
    }

    pub fn is_empty(&self) -> bool {
        self.envelope.is_none()
    }

    /// Closed containment test against the covered envelope.
    pub fn contains(&self, x: f64, y: f64) -> bool {
        if !x.is_finite() || !y.is_finite() {
            return false;
        }
        match (self.wraps_longitude, &self.unwrapped, &self.envelope) {
            (true, Some(unwrapped), _) => contains(unwrapped, unwrap_longitude(x), y),
            (false, _, Some(envelope)) => contains(envelope, x, y),
            _ => false,
        }
    }
}
