use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};

use once_cell::sync::OnceCell;

use crate::alg::geoloc::affine::AffineInverse;
use crate::alg::geoloc::backmap::{Backmap, BackmapOptions, DEFAULT_OVERSAMPLE_FACTOR};
use crate::alg::geoloc::bounds::BoundsIndex;
use crate::alg::geoloc::grid::GeolocGrid;
use crate::alg::geoloc::quadtree::CellQuadtree;
use crate::alg::geoloc::sampler::ForwardSampler;
use crate::alg::geoloc::storage::TEMP_DATASET_NODE_THRESHOLD;
use crate::config::{self, CPLE_APP_DEFINED};
use crate::cpl::CslStringList;
use crate::errors::{CplErrType, GeolocError, Result};

/// Inverse method selected with `GEOLOC_INVERSE_METHOD`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InverseMethod {
    #[default]
    Backmap,
    Quadtree,
}

impl FromStr for InverseMethod {
    type Err = GeolocError;

    fn from_str(s: &str) -> Result<Self> {
        if s.eq_ignore_ascii_case("BACKMAP") {
            Ok(InverseMethod::Backmap)
        } else if s.eq_ignore_ascii_case("QUADTREE") {
            Ok(InverseMethod::Quadtree)
        } else {
            Err(GeolocError::BadArgument(format!(
                "Unknown value for GEOLOC_INVERSE_METHOD: {s}"
            )))
        }
    }
}

impl Display for InverseMethod {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            InverseMethod::Backmap => f.write_str("BACKMAP"),
            InverseMethod::Quadtree => f.write_str("QUADTREE"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverPhase {
    Unbuilt,
    Building,
    Ready,
    Failed,
}

impl SolverPhase {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => SolverPhase::Unbuilt,
            1 => SolverPhase::Building,
            2 => SolverPhase::Ready,
            _ => SolverPhase::Failed,
        }
    }
}

/// Settings of an [`InverseSolver`].
#[derive(Debug, Clone, PartialEq)]
pub struct SolverConfig {
    pub method: InverseMethod,
    /// Short-circuit exactly affine grids.
    pub detect_affine: bool,
    pub oversample_factor: f64,
    /// `None` lets the grid size decide.
    pub use_temp_datasets: Option<bool>,
    /// Refine backmap results against the grid cells.
    pub max_accuracy: bool,
}

impl Default for SolverConfig {
    fn default() -> Self {
        SolverConfig {
            method: InverseMethod::Backmap,
            detect_affine: true,
            oversample_factor: DEFAULT_OVERSAMPLE_FACTOR,
            use_temp_datasets: None,
            max_accuracy: true,
        }
    }
}

/// Transformer option `key`, else the `GDAL_` prefixed configuration option.
fn lookup(options: &CslStringList, key: &str) -> Option<String> {
    options.fetch_name_value(key).or_else(|| {
        let value = config::get_config_option(&format!("GDAL_{key}"), "");
        (!value.is_empty()).then_some(value)
    })
}

impl SolverConfig {
    /// Reads the settings from transformer `options` and the configuration.
    pub fn from_options(options: &CslStringList) -> Self {
        let mut cfg = SolverConfig::default();

        if let Some(method) = lookup(options, "GEOLOC_INVERSE_METHOD") {
            cfg.method = method.parse().unwrap_or_else(|e| {
                tracing::warn!("{e}, using BACKMAP");
                InverseMethod::Backmap
            });
        }
        if let Some(value) = lookup(options, "GEOLOC_DETECT_AFFINE") {
            cfg.detect_affine = config::test_bool(&value);
        }
        if let Some(value) = lookup(options, "GEOLOC_BACKMAP_OVERSAMPLE_FACTOR") {
            match value.trim().parse::<f64>() {
                Ok(factor) if (0.1..=2.0).contains(&factor) => cfg.oversample_factor = factor,
                Ok(factor) if factor.is_finite() => {
                    tracing::warn!(factor, "GEOLOC_BACKMAP_OVERSAMPLE_FACTOR out of [0.1, 2], clamped");
                    cfg.oversample_factor = factor.clamp(0.1, 2.0);
                }
                _ => tracing::warn!(%value, "invalid GEOLOC_BACKMAP_OVERSAMPLE_FACTOR ignored"),
            }
        }
        if let Some(value) = lookup(options, "GEOLOC_USE_TEMP_DATASETS") {
            cfg.use_temp_datasets = Some(config::test_bool(&value));
        }
        if let Some(value) = lookup(options, "GEOLOC_USE_MAX_ACCURACY") {
            cfg.max_accuracy = config::test_bool(&value);
        }
        cfg
    }
}

/// The structure answering inverse queries once built.
#[derive(Debug)]
pub enum InverseStrategy {
    Affine(AffineInverse),
    Backmap(Backmap),
    Quadtree(CellQuadtree),
}

impl InverseStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            InverseStrategy::Affine(_) => "AFFINE",
            InverseStrategy::Backmap(_) => "BACKMAP",
            InverseStrategy::Quadtree(_) => "QUADTREE",
        }
    }
}

/// `(dx, dy)` of the cells at Chebyshev distance `radius`, walked around
/// the ring starting from the bottom left corner.
pub(crate) fn spiral_offsets(radius: i64) -> impl Iterator<Item = (i64, i64)> {
    let r = radius;
    let count = if r == 0 { 1 } else { 8 * r };
    (0..count).map(move |k| {
        if r == 0 {
            return (0, 0);
        }
        let sx = if k < 2 * r {
            -r + k
        } else if k < 4 * r {
            r
        } else if k < 6 * r {
            r - (k - 4 * r)
        } else {
            -r
        };
        let sy = if k < 2 * r {
            r
        } else if k < 4 * r {
            r - (k - 2 * r)
        } else if k < 6 * r {
            -r
        } else {
            -r + (k - 6 * r)
        };
        (sx, sy)
    })
}

const NEWTON_MAX_ITERATIONS: usize = 10;

/// Geographic (inverse) lookup for a [`GeolocGrid`].
///
/// The strategy is built once, on the first query or on [`InverseSolver::build`];
/// concurrent first callers wait for that single build.
#[derive(Debug)]
pub struct InverseSolver {
    grid: GeolocGrid,
    bounds: BoundsIndex,
    config: SolverConfig,
    phase: AtomicU8,
    strategy: OnceCell<std::result::Result<InverseStrategy, String>>,
}

impl InverseSolver {
    pub fn new(grid: GeolocGrid, bounds: BoundsIndex, config: SolverConfig) -> Self {
        InverseSolver {
            grid,
            bounds,
            config,
            phase: AtomicU8::new(SolverPhase::Unbuilt as u8),
            strategy: OnceCell::new(),
        }
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    pub fn phase(&self) -> SolverPhase {
        SolverPhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    /// Builds the strategy if needed and returns it.
    pub fn build(&self) -> Result<&InverseStrategy> {
        let built = self.strategy.get_or_init(|| {
            self.phase.store(SolverPhase::Building as u8, Ordering::Release);
            match self.build_strategy() {
                Ok(strategy) => {
                    tracing::debug!(strategy = strategy.name(), "inverse solver ready");
                    self.phase.store(SolverPhase::Ready as u8, Ordering::Release);
                    Ok(strategy)
                }
                Err(e) => {
                    let msg = e.to_string();
                    config::report_error(CplErrType::Failure, CPLE_APP_DEFINED, &msg);
                    self.phase.store(SolverPhase::Failed as u8, Ordering::Release);
                    Err(msg)
                }
            }
        });
        built
            .as_ref()
            .map_err(|msg| GeolocError::SolverFailed(msg.clone()))
    }

    fn build_strategy(&self) -> Result<InverseStrategy> {
        if self.config.detect_affine {
            if let Some(affine) = AffineInverse::detect(&self.grid) {
                return Ok(InverseStrategy::Affine(affine));
            }
        }
        match self.config.method {
            InverseMethod::Quadtree => Ok(InverseStrategy::Quadtree(CellQuadtree::build(&self.grid)?)),
            InverseMethod::Backmap => {
                let options = BackmapOptions {
                    oversample_factor: self.config.oversample_factor,
                    use_temp_dataset: self
                        .config
                        .use_temp_datasets
                        .unwrap_or(self.grid.node_count() > TEMP_DATASET_NODE_THRESHOLD),
                };
                Ok(InverseStrategy::Backmap(Backmap::build(&self.grid, &self.bounds, &options)?))
            }
        }
    }

    /// Full resolution pixel/line mapping to `(x, y)`, or `None` when no
    /// position of the grid maps to it.
    pub fn locate(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        if !x.is_finite() || !y.is_finite() {
            return None;
        }
        let strategy = self.build().ok()?;
        let grid = &self.grid;
        match strategy {
            InverseStrategy::Affine(affine) => affine
                .locate(x, y)
                .map(|(gx, gy)| grid.grid_index_to_full_res(gx, gy)),
            InverseStrategy::Quadtree(tree) => tree
                .locate(x, y)
                .map(|(gx, gy)| grid.grid_index_to_full_res(gx, gy)),
            InverseStrategy::Backmap(backmap) => {
                let approx = match backmap.approximate(x, y) {
                    Ok(approx) => approx?,
                    Err(e) => {
                        tracing::warn!("backmap read failed: {e}");
                        return None;
                    }
                };
                if !self.config.max_accuracy {
                    return Some(approx);
                }
                let (gx, gy) = grid.full_res_to_grid_index(approx.0, approx.1);
                self.spiral_search(gx, gy, x, y)
                    .or_else(|| self.newton(gx, gy, x, y))
                    .map(|(gx, gy)| grid.grid_index_to_full_res(gx, gy))
            }
        }
    }

    /// Looks for the cell containing `(x, y)` around the grid index `(gx, gy)`.
    fn spiral_search(&self, gx: f64, gy: f64, x: f64, y: f64) -> Option<(f64, f64)> {
        let grid = &self.grid;
        let sampler = ForwardSampler::new(grid);
        let radius = match y.abs() {
            lat if grid.normalizes_longitude() && lat >= 85.0 => 5,
            lat if grid.normalizes_longitude() && lat >= 75.0 => 3,
            lat if grid.normalizes_longitude() && lat >= 65.0 => 2,
            _ => 1,
        };
        let (w, h) = (grid.width() as i64, grid.height() as i64);
        let (base_x, base_y) = (gx.floor() as i64, gy.floor() as i64);

        (0..=radius)
            .flat_map(spiral_offsets)
            .map(|(sx, sy)| (base_x + sx, base_y + sy))
            .filter(|&(ix, iy)| (-1..w).contains(&ix) && (-1..h).contains(&iy))
            .find_map(|(ix, iy)| sampler.locate_in_cell(ix as f64, iy as f64, x, y))
    }

    /// Newton iterations on the forward mapping, from the grid index
    /// `(gx, gy)`.
    fn newton(&self, mut gx: f64, mut gy: f64, x: f64, y: f64) -> Option<(f64, f64)> {
        let sampler = ForwardSampler::new(&self.grid);
        let tolerance = 1e-9 * x.abs().max(y.abs()).max(1.0);
        let residual = |gx: f64, gy: f64| sampler.residual(gx, gy, x, y);
        const H: f64 = 1e-3;

        for _ in 0..NEWTON_MAX_ITERATIONS {
            let (rx, ry) = residual(gx, gy)?;
            if rx.abs() <= tolerance && ry.abs() <= tolerance {
                return Some((gx, gy));
            }
            let (ax, ay) = residual(gx + H, gy)?;
            let (bx, by) = residual(gx, gy + H)?;
            let (j11, j21) = ((ax - rx) / H, (ay - ry) / H);
            let (j12, j22) = ((bx - rx) / H, (by - ry) / H);
            let det = j11 * j22 - j12 * j21;
            if det == 0.0 || !det.is_finite() {
                return None;
            }
            gx -= (j22 * rx - j12 * ry) / det;
            gy -= (j11 * ry - j21 * rx) / det;
        }
        let (rx, ry) = residual(gx, gy)?;
        (rx.abs() <= tolerance && ry.abs() <= tolerance).then_some((gx, gy))
    }
}
