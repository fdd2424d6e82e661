use std::f64::consts::FRAC_PI_4;

use crate::errors::{GeolocError, Result};
use crate::spatial_ref::{SpatialRef, SrsKind};

const EARTH_RADIUS: f64 = 6378137.0;

/// A coordinate reprojection service between two reference systems.
///
/// Implementations transform in place and report a failure for the whole
/// batch; callers needing per-point status transform one point at a time.
pub trait Reproject: Send + Sync {
    /// Transform coordinates in place. `z` may be empty.
    fn transform_coords(&self, x: &mut [f64], y: &mut [f64], z: &mut [f64]) -> Result<()>;

    /// Transform a single point, `None` when it cannot be reprojected.
    fn transform_point(&self, x: f64, y: f64, z: f64) -> Option<(f64, f64, f64)> {
        let (mut xs, mut ys, mut zs) = ([x], [y], [z]);
        self.transform_coords(&mut xs, &mut ys, &mut zs).ok()?;
        Some((xs[0], ys[0], zs[0]))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    Identity,
    GeographicToWebMercator,
    WebMercatorToGeographic,
}

#[derive(Debug, Clone)]
/// Defines a coordinate transformation from one [`SpatialRef`] to another.
///
/// Supported pairs are identical systems and WGS 84 to and from the
/// spherical Web Mercator projection.
pub struct CoordTransform {
    operation: Operation,
    from: String,
    to: String,
}

impl CoordTransform {
    /// Constructs a new transformation from `source` to `target`.
    pub fn new(source: &SpatialRef, target: &SpatialRef) -> Result<CoordTransform> {
        let operation = if source.is_same(target) {
            Operation::Identity
        } else {
            match (source.kind(), target.kind()) {
                (SrsKind::Geographic, SrsKind::WebMercator) => Operation::GeographicToWebMercator,
                (SrsKind::WebMercator, SrsKind::Geographic) => Operation::WebMercatorToGeographic,
                _ => {
                    return Err(GeolocError::UnsupportedTransform {
                        from: source.to_string(),
                        to: target.to_string(),
                    })
                }
            }
        };
        Ok(CoordTransform {
            operation,
            from: source.to_string(),
            to: target.to_string(),
        })
    }

    pub fn is_identity(&self) -> bool {
        self.operation == Operation::Identity
    }

    /// Transform bounding box `[xmin, ymin, xmax, ymax]`, densifying the edges
    /// with `densify_pts` points each.
    pub fn transform_bounds(&self, bounds: &[f64; 4], densify_pts: usize) -> Result<[f64; 4]> {
        let steps = densify_pts.max(1) + 1;
        let mut xs = Vec::with_capacity(4 * steps);
        let mut ys = Vec::with_capacity(4 * steps);
        for i in 0..=steps {
            let t = i as f64 / steps as f64;
            let x = bounds[0] + t * (bounds[2] - bounds[0]);
            let y = bounds[1] + t * (bounds[3] - bounds[1]);
            xs.extend_from_slice(&[x, x, bounds[0], bounds[2]]);
            ys.extend_from_slice(&[bounds[1], bounds[3], y, y]);
        }
        self.transform_coords(&mut xs, &mut ys, &mut [])?;

        let mut out = [f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY];
        for (x, y) in xs.iter().zip(&ys) {
            out[0] = out[0].min(*x);
            out[1] = out[1].min(*y);
            out[2] = out[2].max(*x);
            out[3] = out[3].max(*y);
        }
        Ok(out)
    }

    fn out_of_range(&self, x: f64, y: f64) -> GeolocError {
        GeolocError::InvalidCoordinateRange {
            from: self.from.clone(),
            to: self.to.clone(),
            msg: Some(format!("point ({x}, {y}) is outside of the projection domain")),
        }
    }
}

impl Reproject for CoordTransform {
    /// Transform coordinates in place.
    ///
    /// # Arguments
    /// * `x` - slice of x coordinates
    /// * `y` - slice of y coordinates (must match x in length)
    /// * `z` - slice of z coordinates, or an empty slice to ignore
    fn transform_coords(&self, x: &mut [f64], y: &mut [f64], z: &mut [f64]) -> Result<()> {
        let nb_coords = x.len();
        assert_eq!(
            nb_coords,
            y.len(),
            "transform coordinate slices have different lengths: {} != {}",
            nb_coords,
            y.len()
        );
        if !z.is_empty() {
            assert_eq!(
                nb_coords,
                z.len(),
                "transform coordinate slices have different lengths: {} != {}",
                nb_coords,
                z.len()
            );
        }

        match self.operation {
            Operation::Identity => Ok(()),
            Operation::GeographicToWebMercator => {
                for (x, y) in x.iter_mut().zip(y.iter_mut()) {
                    if !x.is_finite() || !y.is_finite() || y.abs() >= 90.0 {
                        return Err(self.out_of_range(*x, *y));
                    }
                    let lat = y.to_radians();
                    *x = EARTH_RADIUS * x.to_radians();
                    *y = EARTH_RADIUS * (FRAC_PI_4 + lat / 2.0).tan().ln();
                }
                Ok(())
            }
            Operation::WebMercatorToGeographic => {
                for (x, y) in x.iter_mut().zip(y.iter_mut()) {
                    if !x.is_finite() || !y.is_finite() {
                        return Err(self.out_of_range(*x, *y));
                    }
                    *x = (*x / EARTH_RADIUS).to_degrees();
                    *y = (2.0 * (*y / EARTH_RADIUS).exp().atan() - 2.0 * FRAC_PI_4).to_degrees();
                }
                Ok(())
            }
        }
    }
}
