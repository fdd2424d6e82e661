use crate::errors::{GeolocError, Result};
use crate::raster::Buffer;

/// Resampling algorithm used when reading a band at fractional positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResampleAlg {
    NearestNeighbour,
    Bilinear,
    Cubic,
    CubicSpline,
    Lanczos,
    Average,
    Mode,
}

impl ResampleAlg {
    pub fn name(&self) -> &'static str {
        match self {
            ResampleAlg::NearestNeighbour => "NearestNeighbour",
            ResampleAlg::Bilinear => "Bilinear",
            ResampleAlg::Cubic => "Cubic",
            ResampleAlg::CubicSpline => "CubicSpline",
            ResampleAlg::Lanczos => "Lanczos",
            ResampleAlg::Average => "Average",
            ResampleAlg::Mode => "Mode",
        }
    }
}

/// An in-memory raster band of `f64` samples.
#[derive(Debug, Clone)]
pub struct RasterBand {
    buffer: Buffer<f64>,
    no_data: Option<f64>,
    description: String,
}

impl RasterBand {
    pub fn new(buffer: Buffer<f64>) -> Self {
        RasterBand {
            buffer,
            no_data: None,
            description: String::new(),
        }
    }

    pub fn with_no_data(mut self, no_data: f64) -> Self {
        self.no_data = Some(no_data);
        self
    }

    pub fn x_size(&self) -> usize {
        self.buffer.width()
    }

    pub fn y_size(&self) -> usize {
        self.buffer.height()
    }

    /// `(cols, rows)`
    pub fn size(&self) -> (usize, usize) {
        self.buffer.size
    }

    pub fn no_data_value(&self) -> Option<f64> {
        self.no_data
    }

    pub fn set_no_data_value(&mut self, no_data: Option<f64>) {
        self.no_data = no_data;
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn set_description(&mut self, description: &str) {
        self.description = description.to_string();
    }

    pub fn buffer(&self) -> &Buffer<f64> {
        &self.buffer
    }

    /// Copy of the whole band.
    pub fn read_band(&self) -> Buffer<f64> {
        self.buffer.clone()
    }

    fn is_no_data(&self, value: f64) -> bool {
        value.is_nan() || self.no_data == Some(value)
    }

    /// Reads the band at the fractional pixel position `(px, py)`, where
    /// `(0.5, 0.5)` is the center of the top-left pixel.
    ///
    /// Returns `Ok(None)` outside the raster or on no-data samples.
    pub fn interpolate_at_point(&self, px: f64, py: f64, alg: ResampleAlg) -> Result<Option<f64>> {
        let (cols, rows) = self.size();
        if cols == 0 || rows == 0 {
            return Ok(None);
        }
        if !(px >= 0.0 && py >= 0.0 && px <= cols as f64 && py <= rows as f64) {
            return Ok(None);
        }
        match alg {
            ResampleAlg::NearestNeighbour => {
                let x = (px.floor() as usize).min(cols - 1);
                let y = (py.floor() as usize).min(rows - 1);
                Ok(self.buffer.get(x, y).filter(|v| !self.is_no_data(*v)))
            }
            ResampleAlg::Bilinear => {
                // Sample centers sit at half-integer positions; clamp to the
                // outermost centers so that edge pixels read their own value.
                let fx = (px - 0.5).clamp(0.0, (cols - 1) as f64);
                let fy = (py - 0.5).clamp(0.0, (rows - 1) as f64);
                let x0 = fx.floor() as usize;
                let y0 = fy.floor() as usize;
                let x1 = (x0 + 1).min(cols - 1);
                let y1 = (y0 + 1).min(rows - 1);
                let dx = fx - x0 as f64;
                let dy = fy - y0 as f64;

                let mut sum = 0.0;
                let mut weight = 0.0;
                for (x, y, w) in [
                    (x0, y0, (1.0 - dx) * (1.0 - dy)),
                    (x1, y0, dx * (1.0 - dy)),
                    (x0, y1, (1.0 - dx) * dy),
                    (x1, y1, dx * dy),
                ] {
                    if w == 0.0 {
                        continue;
                    }
                    match self.buffer.get(x, y) {
                        Some(v) if !self.is_no_data(v) => {
                            sum += w * v;
                            weight += w;
                        }
                        _ => return Ok(None),
                    }
                }
                if weight == 0.0 {
                    Ok(self
                        .buffer
                        .get(x0, y0)
                        .filter(|v| !self.is_no_data(*v)))
                } else {
                    Ok(Some(sum / weight))
                }
            }
            other => Err(GeolocError::UnsupportedInterpolation(format!(
                "{} interpolation is not supported, use NearestNeighbour or Bilinear",
                other.name()
            ))),
        }
    }
}
