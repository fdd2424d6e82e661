use std::path::Path;

use crate::config::test_bool;
use crate::cpl::CslStringList;
use crate::errors::{GeolocError, Result};

/// Where a grid node's coordinate is sampled within the pixel it represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GeorefConvention {
    #[default]
    TopLeftCorner,
    PixelCenter,
}

impl GeorefConvention {
    /// Shift, in grid cells, applied between full resolution and grid space.
    pub fn offset(&self) -> f64 {
        match self {
            GeorefConvention::TopLeftCorner => 0.0,
            GeorefConvention::PixelCenter => 0.5,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GeorefConvention::TopLeftCorner => "TOP_LEFT_CORNER",
            GeorefConvention::PixelCenter => "PIXEL_CENTER",
        }
    }
}

const REQUIRED_KEYS: [&str; 6] = [
    "PIXEL_OFFSET",
    "LINE_OFFSET",
    "PIXEL_STEP",
    "LINE_STEP",
    "X_BAND",
    "Y_BAND",
];

/// Parsed content of a `GEOLOCATION` metadata domain.
///
/// The original key/value list is kept so that it can be handed back
/// verbatim (plus the dataset names filled in from the base dataset).
#[derive(Debug, Clone)]
pub struct GeolocationInfo {
    pub x_dataset: Option<String>,
    pub x_band: usize,
    pub y_dataset: Option<String>,
    pub y_band: usize,
    pub pixel_offset: f64,
    pub line_offset: f64,
    pub pixel_step: f64,
    pub line_step: f64,
    pub convention: GeorefConvention,
    pub srs: Option<String>,
    pub swap_xy: bool,
    pub x_dataset_relative_to_source: bool,
    pub y_dataset_relative_to_source: bool,
    metadata: CslStringList,
}

fn parse_number(metadata: &CslStringList, key: &str) -> Result<f64> {
    let value = metadata
        .fetch_name_value(key)
        .ok_or_else(|| GeolocError::invalid_metadata(key, "missing geolocation field"))?;
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| GeolocError::invalid_metadata(key, format!("'{value}' is not a number")))
}

fn parse_band(metadata: &CslStringList, key: &str) -> Result<usize> {
    let value = metadata
        .fetch_name_value(key)
        .ok_or_else(|| GeolocError::invalid_metadata(key, "missing geolocation field"))?;
    let band = value.trim().parse::<i64>().map_err(|_| {
        GeolocError::invalid_metadata(key, format!("'{value}' is not a band number"))
    })?;
    Ok(band.max(1) as usize)
}

impl GeolocationInfo {
    /// Parses a `GEOLOCATION` metadata list.
    ///
    /// All of `PIXEL_OFFSET`, `LINE_OFFSET`, `PIXEL_STEP`, `LINE_STEP`,
    /// `X_BAND` and `Y_BAND` are required.
    pub fn from_metadata(metadata: &CslStringList) -> Result<Self> {
        if let Some(key) = REQUIRED_KEYS
            .iter()
            .find(|key| metadata.fetch_name_value(key).is_none())
        {
            return Err(GeolocError::invalid_metadata(
                key,
                "missing some geolocation fields",
            ));
        }

        let pixel_step = parse_number(metadata, "PIXEL_STEP")?;
        let line_step = parse_number(metadata, "LINE_STEP")?;
        for (key, step) in [("PIXEL_STEP", pixel_step), ("LINE_STEP", line_step)] {
            if step == 0.0 {
                return Err(GeolocError::invalid_metadata(key, "step must not be zero"));
            }
        }

        let convention = match metadata.fetch_name_value("GEOREFERENCING_CONVENTION") {
            None => GeorefConvention::TopLeftCorner,
            Some(v) if v.eq_ignore_ascii_case("TOP_LEFT_CORNER") => GeorefConvention::TopLeftCorner,
            Some(v) if v.eq_ignore_ascii_case("PIXEL_CENTER") => GeorefConvention::PixelCenter,
            Some(v) => {
                return Err(GeolocError::invalid_metadata(
                    "GEOREFERENCING_CONVENTION",
                    format!("'{v}' is neither TOP_LEFT_CORNER nor PIXEL_CENTER"),
                ))
            }
        };

        let flag = |key: &str| {
            metadata
                .fetch_name_value(key)
                .map(|v| test_bool(&v))
                .unwrap_or(false)
        };

        Ok(GeolocationInfo {
            x_dataset: metadata.fetch_name_value("X_DATASET"),
            x_band: parse_band(metadata, "X_BAND")?,
            y_dataset: metadata.fetch_name_value("Y_DATASET"),
            y_band: parse_band(metadata, "Y_BAND")?,
            pixel_offset: parse_number(metadata, "PIXEL_OFFSET")?,
            line_offset: parse_number(metadata, "LINE_OFFSET")?,
            pixel_step,
            line_step,
            convention,
            srs: metadata
                .fetch_name_value("SRS")
                .filter(|srs| !srs.trim().is_empty()),
            swap_xy: flag("SWAP_XY"),
            x_dataset_relative_to_source: flag("X_DATASET_RELATIVE_TO_SOURCE"),
            y_dataset_relative_to_source: flag("Y_DATASET_RELATIVE_TO_SOURCE"),
            metadata: metadata.clone(),
        })
    }

    /// The metadata list this description was parsed from, updated with any
    /// dataset name resolved since.
    pub fn metadata(&self) -> &CslStringList {
        &self.metadata
    }

    /// Records `name` as the X dataset when none was declared.
    pub(crate) fn default_datasets_to(&mut self, name: &str) -> Result<()> {
        if self.x_dataset.is_none() {
            self.x_dataset = Some(name.to_string());
            self.metadata.set_name_value("X_DATASET", name)?;
        }
        if self.y_dataset.is_none() {
            self.y_dataset = Some(name.to_string());
            self.metadata.set_name_value("Y_DATASET", name)?;
        }
        Ok(())
    }

    /// Dataset name to open for the X (`is_x`) or Y array, honouring the
    /// `*_DATASET_RELATIVE_TO_SOURCE` flags.
    pub(crate) fn resolved_dataset_name(&self, is_x: bool, source: Option<&str>) -> Option<String> {
        let (name, relative) = if is_x {
            (self.x_dataset.as_deref()?, self.x_dataset_relative_to_source)
        } else {
            (self.y_dataset.as_deref()?, self.y_dataset_relative_to_source)
        };
        match (relative, source) {
            (true, Some(source)) => {
                let dir = Path::new(source).parent().unwrap_or_else(|| Path::new(""));
                Some(dir.join(name).to_string_lossy().into_owned())
            }
            _ => Some(name.to_string()),
        }
    }

    /// Description of the same arrays addressed from a raster rescaled by
    /// `ratio_x` x `ratio_y`.
    pub fn rescaled(&self, ratio_x: f64, ratio_y: f64) -> Result<Self> {
        if ratio_x == 1.0 && ratio_y == 1.0 {
            return Ok(self.clone());
        }
        if !(ratio_x.is_finite() && ratio_y.is_finite()) || ratio_x == 0.0 || ratio_y == 0.0 {
            return Err(GeolocError::BadArgument(format!(
                "invalid rescaling ratio {ratio_x} x {ratio_y}"
            )));
        }
        let mut metadata = self.metadata.clone();
        let mut rescale = |key: &str, value: f64| metadata.set_name_value(key, &format!("{value}"));
        rescale("PIXEL_OFFSET", self.pixel_offset * ratio_x)?;
        rescale("LINE_OFFSET", self.line_offset * ratio_y)?;
        rescale("PIXEL_STEP", self.pixel_step / ratio_x)?;
        rescale("LINE_STEP", self.line_step / ratio_y)?;

        let mut rescaled = GeolocationInfo::from_metadata(&metadata)?;
        rescaled.x_dataset = self.x_dataset.clone();
        rescaled.y_dataset = self.y_dataset.clone();
        Ok(rescaled)
    }
}
