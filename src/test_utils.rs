use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::cpl::CslStringList;
use crate::raster::{Buffer, RasterBand};
use crate::vsi::{register_mem_dataset, unlink_mem_dataset};
use crate::Dataset;

/// Size of the raster georeferenced by the fixture arrays.
pub(crate) const RASTER_SIZE: usize = 20;

/// X and Y geolocation arrays registered as `/vsimem/` datasets.
///
/// The datasets are unlinked when the value is dropped.
pub(crate) struct MemArrays {
    pub x_name: String,
    pub y_name: String,
}

impl MemArrays {
    pub(crate) fn register(prefix: &str, x: RasterBand, y: RasterBand) -> Self {
        let x_name = format!("/vsimem/{prefix}_x");
        let y_name = format!("/vsimem/{prefix}_y");
        register_mem_dataset(&x_name, Dataset::from_bands("", vec![x]).unwrap()).unwrap();
        register_mem_dataset(&y_name, Dataset::from_bands("", vec![y]).unwrap()).unwrap();
        MemArrays { x_name, y_name }
    }

    /// `GEOLOCATION` metadata addressing the arrays with a `step` stride.
    pub(crate) fn metadata(&self, step: usize, convention: &str) -> CslStringList {
        let step = step.to_string();
        CslStringList::from(&[
            ("X_DATASET", self.x_name.as_str()),
            ("X_BAND", "1"),
            ("Y_DATASET", self.y_name.as_str()),
            ("Y_BAND", "1"),
            ("PIXEL_OFFSET", "0"),
            ("PIXEL_STEP", step.as_str()),
            ("LINE_OFFSET", "0"),
            ("LINE_STEP", step.as_str()),
            ("GEOREFERENCING_CONVENTION", convention),
        ])
    }
}

impl Drop for MemArrays {
    fn drop(&mut self) {
        unlink_mem_dataset(&self.x_name).expect("unable to remove in-memory dataset");
        unlink_mem_dataset(&self.y_name).expect("unable to remove in-memory dataset");
    }
}

pub(crate) fn band(cols: usize, rows: usize, f: impl Fn(usize, usize) -> f64) -> RasterBand {
    let data = (0..rows)
        .flat_map(|j| (0..cols).map(move |i| (i, j)))
        .map(|(i, j)| f(i, j))
        .collect();
    RasterBand::new(Buffer::new((cols, rows), data))
}

pub(crate) fn convention_shift(convention: &str) -> f64 {
    if convention == "PIXEL_CENTER" {
        0.5
    } else {
        0.0
    }
}

/// Regular arrays for a [`RASTER_SIZE`] square raster where
/// `lon = -80 + pixel` and `lat = 50 - line`.
pub(crate) fn affine_arrays(prefix: &str, step: usize, convention: &str) -> MemArrays {
    let n = RASTER_SIZE / step;
    let shift = convention_shift(convention);
    let s = step as f64;
    MemArrays::register(
        prefix,
        band(n, 1, |i, _| -80.0 + s * (i as f64 + shift)),
        band(n, 1, |i, _| 50.0 - s * (i as f64 + shift)),
    )
}

/// The affine arrays of [`affine_arrays`] with uniform noise in
/// `[-0.25, 0.25]` added to every node.
pub(crate) fn noisy_arrays(prefix: &str, step: usize, convention: &str, seed: u64) -> MemArrays {
    let n = RASTER_SIZE / step;
    let shift = convention_shift(convention);
    let s = step as f64;
    let mut rng = StdRng::seed_from_u64(seed);
    let mut noise: Vec<f64> = (0..2 * n * n).map(|_| rng.random_range(-0.25..=0.25)).collect();
    let y_noise = noise.split_off(n * n);
    MemArrays::register(
        prefix,
        band(n, n, |i, j| -80.0 + s * (i as f64 + shift) + noise[j * n + i]),
        band(n, n, |i, j| 50.0 - s * (j as f64 + shift) + y_noise[j * n + i]),
    )
}

/// 12 x 6 arrays with 2.5 degrees cells, from 170 degrees east across
/// the antimeridian.
pub(crate) fn antimeridian_arrays(prefix: &str) -> MemArrays {
    let lon = |i: usize| {
        let v = 170.0 + 2.5 * i as f64;
        if v > 180.0 {
            v - 360.0
        } else {
            v
        }
    };
    MemArrays::register(
        prefix,
        band(12, 6, |i, _| lon(i)),
        band(12, 6, |_, j| 20.0 - 2.5 * j as f64),
    )
}

/// Width and height of the [`polar_arrays`] grid.
pub(crate) const POLAR_SIZE: usize = 40;

/// Node `(i, j)` of a grid centered on the north pole, which falls between
/// the four middle nodes: the longitude is the polar angle and the latitude
/// drops by half a degree per cell away from the pole.
pub(crate) fn polar_node(i: usize, j: usize) -> (f64, f64) {
    let center = (POLAR_SIZE as f64 - 1.0) / 2.0;
    let (dx, dy) = (i as f64 - center, j as f64 - center);
    (dy.atan2(dx).to_degrees(), 90.0 - 0.5 * dx.hypot(dy))
}

/// [`polar_node`] arrays; the antimeridian runs from the left edge to the pole.
pub(crate) fn polar_arrays(prefix: &str) -> MemArrays {
    MemArrays::register(
        prefix,
        band(POLAR_SIZE, POLAR_SIZE, |i, j| polar_node(i, j).0),
        band(POLAR_SIZE, POLAR_SIZE, |i, j| polar_node(i, j).1),
    )
}

pub(crate) fn options(pairs: &[(&str, &str)]) -> CslStringList {
    let mut list = CslStringList::new();
    for (k, v) in pairs {
        list.set_name_value(k, v).unwrap();
    }
    list
}

/// Assert numerical difference between two expressions is less than
/// 64-bit machine epsilon or a specified epsilon.
///
/// # Examples:
/// ```rust, no_run
/// use geoloc::assert_near;
/// use std::f64::consts::{PI, E};
/// assert_near!(PI / E, 1.1557273497909217);
/// // with specified epsilon
/// assert_near!(PI / E, 1.15572734, epsilon = 1e-8);
/// ```
#[macro_export]
macro_rules! assert_near {
    ($left:expr, $right:expr) => {
        assert_near!($left, $right, epsilon = f64::EPSILON)
    };
    ($left:expr, $right:expr, epsilon = $ep:expr) => {
        assert!(
            ($left - $right).abs() < $ep,
            "|{} - {}| = {} is greater than epsilon {:.4e}",
            $left,
            $right,
            ($left - $right).abs(),
            $ep
        )
    };
    ($left:expr, $right:expr, epsilon = $ep:expr, field = $field:expr) => {
        assert!(
            ($left - $right).abs() < $ep,
            "field {}: |{} - {}| = {} is greater than epsilon {:.4e}",
            $field,
            $left,
            $right,
            ($left - $right).abs(),
            $ep
        )
    };
}
