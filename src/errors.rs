use std::num::{ParseFloatError, ParseIntError};

use thiserror::Error;

/// Severity classes reported to the host error handler.
///
/// See [`crate::config::set_error_handler`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CplErrType {
    None,
    Debug,
    Warning,
    Failure,
    Fatal,
}

#[derive(Debug, Error)]
pub enum GeolocError {
    #[error("Invalid geolocation metadata '{key}': {msg}")]
    InvalidMetadata { key: String, msg: String },
    #[error("Bad argument: {0}")]
    BadArgument(String),
    #[error("Dataset '{0}' could not be opened")]
    DatasetNotFound(String),
    #[error("Dataset '{dataset}' has no band {band}")]
    BandNotFound { dataset: String, band: usize },
    #[error("Backmap could not be generated: {0}")]
    InvalidBackmap(String),
    #[error("Unsupported interpolation method: {0}")]
    UnsupportedInterpolation(String),
    #[error("No coordinate transformation available from '{from}' to '{to}'")]
    UnsupportedTransform { from: String, to: String },
    #[error(
        "Unable to transform coordinates from '{from}' to '{to}'{}",
        msg.as_ref().map(|m| format!(": {m}")).unwrap_or_default()
    )]
    InvalidCoordinateRange {
        from: String,
        to: String,
        msg: Option<String>,
    },
    #[error("Inverse solver unavailable: {0}")]
    SolverFailed(String),
    #[error("Array shape mismatch: {0}")]
    ShapeError(#[from] ndarray::ShapeError),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error(transparent)]
    ParseFloatError(#[from] ParseFloatError),
    #[error(transparent)]
    ParseIntError(#[from] ParseIntError),
}

impl GeolocError {
    pub(crate) fn invalid_metadata(key: &str, msg: impl Into<String>) -> Self {
        GeolocError::InvalidMetadata {
            key: key.to_string(),
            msg: msg.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, GeolocError>;
