use std::sync::Arc;

use crate::alg::geoloc::GeolocTransformer;
use crate::config::{self, CPLE_ILLEGAL_ARG};
use crate::cpl::CslStringList;
use crate::errors::{CplErrType, GeolocError, Result};
use crate::metadata::{Metadata, GEOLOCATION_DOMAIN};
use crate::spatial_ref::{CoordTransform, Reproject, SpatialRef};
use crate::{Dataset, GeoTransform, GeoTransformEx};

/// How the pixel/line space of one side of a [`Transformer`] is georeferenced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeorefMethod {
    /// The dataset geotransform.
    GeoTransform,
    /// The dataset `GEOLOCATION` metadata.
    GeolocArray,
    /// Pixel/line coordinates are used as is.
    NoGeoTransform,
}

impl GeorefMethod {
    fn parse(key: &str, value: &str) -> Result<Self> {
        if value.eq_ignore_ascii_case("GEOTRANSFORM") {
            Ok(GeorefMethod::GeoTransform)
        } else if value.eq_ignore_ascii_case("GEOLOC_ARRAY") {
            Ok(GeorefMethod::GeolocArray)
        } else if value.eq_ignore_ascii_case("NO_GEOTRANSFORM") {
            Ok(GeorefMethod::NoGeoTransform)
        } else {
            Err(GeolocError::BadArgument(format!("Unknown value for {key}: {value}")))
        }
    }
}

/// Pixel/line to georeferenced mapping of one side.
#[derive(Debug)]
enum Georef {
    GeoTransform {
        forward: GeoTransform,
        inverse: GeoTransform,
    },
    Geoloc(GeolocTransformer),
    Identity,
}

impl Georef {
    fn to_georef(&self, px: f64, py: f64) -> Option<(f64, f64)> {
        match self {
            Georef::GeoTransform { forward, .. } => Some(forward.apply(px, py)),
            Georef::Geoloc(geoloc) => geoloc.transform_point(false, px, py),
            Georef::Identity => Some((px, py)),
        }
    }

    fn to_pixel(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        match self {
            Georef::GeoTransform { inverse, .. } => Some(inverse.apply(x, y)),
            Georef::Geoloc(geoloc) => geoloc.transform_point(true, x, y),
            Georef::Identity => Some((x, y)),
        }
    }
}

/// One end of the transformation chain.
#[derive(Debug)]
struct Side {
    georef: Georef,
    srs: Option<SpatialRef>,
}

impl Side {
    fn open(dataset: Option<&Dataset>, options: &CslStringList, prefix: &str) -> Result<Self> {
        let method_key = format!("{prefix}_METHOD");
        let method = options
            .fetch_name_value(&method_key)
            .map(|value| GeorefMethod::parse(&method_key, &value))
            .transpose()?;
        let srs = options
            .fetch_name_value(&format!("{prefix}_SRS"))
            .map(|definition| SpatialRef::from_definition(&definition))
            .transpose()?;

        let Some(dataset) = dataset else {
            return Ok(Side {
                georef: Georef::Identity,
                srs,
            });
        };

        let geolocation = dataset.metadata_domain(GEOLOCATION_DOMAIN);
        let method = method.unwrap_or(match (dataset.geo_transform(), geolocation) {
            (Some(_), _) => GeorefMethod::GeoTransform,
            (None, Some(_)) => GeorefMethod::GeolocArray,
            (None, None) => GeorefMethod::NoGeoTransform,
        });

        let georef = match method {
            GeorefMethod::GeoTransform => {
                let forward = dataset.geo_transform().ok_or_else(|| {
                    GeolocError::BadArgument(format!(
                        "{method_key}=GEOTRANSFORM but dataset '{}' has no geotransform",
                        dataset.description()
                    ))
                })?;
                Georef::GeoTransform {
                    forward,
                    inverse: forward.invert()?,
                }
            }
            GeorefMethod::GeolocArray => {
                let metadata = geolocation.ok_or_else(|| {
                    GeolocError::BadArgument(format!(
                        "{method_key}=GEOLOC_ARRAY but dataset '{}' has no GEOLOCATION metadata",
                        dataset.description()
                    ))
                })?;
                Georef::Geoloc(GeolocTransformer::new(Some(dataset), metadata, false, options)?)
            }
            GeorefMethod::NoGeoTransform => Georef::Identity,
        };

        let srs = match (srs, &georef) {
            (Some(srs), _) => Some(srs),
            (None, Georef::Geoloc(geoloc)) => match geoloc.srs() {
                Some(definition) => Some(SpatialRef::from_definition(definition)?),
                None => dataset.spatial_ref().cloned(),
            },
            (None, Georef::GeoTransform { .. }) => dataset.spatial_ref().cloned(),
            (None, Georef::Identity) => None,
        };
        Ok(Side { georef, srs })
    }

    fn georef_name(&self) -> &'static str {
        match self.georef {
            Georef::GeoTransform { .. } => "GEOTRANSFORM",
            Georef::Geoloc(_) => "GEOLOC_ARRAY",
            Georef::Identity => "NO_GEOTRANSFORM",
        }
    }
}

/// Transformer between the pixel/line spaces of a source and a destination
/// dataset, through their georeferencing and an optional reprojection.
///
/// Either side may be georeferenced by a geotransform or by geolocation
/// arrays. Without a destination dataset, the destination coordinates are
/// georeferenced coordinates.
pub struct Transformer {
    src: Side,
    dst: Side,
    reproject: Option<(Arc<dyn Reproject>, Arc<dyn Reproject>)>,
}

impl std::fmt::Debug for Transformer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transformer")
            .field("src", &self.src)
            .field("dst", &self.dst)
            .field("reproject", &self.reproject.is_some())
            .finish()
    }
}

impl Transformer {
    /// Constructs a `Transformer` between two datasets.
    ///
    /// # Arguments
    ///
    /// * `src` - The source dataset, `None` for raw pixel/line coordinates.
    /// * `dst` - The destination dataset, `None` to output georeferenced
    ///   coordinates.
    /// * `options` - `SRC_METHOD`, `DST_METHOD`, `SRC_SRS`, `DST_SRS` and the
    ///   `GEOLOC_*` options of [`GeolocTransformer`].
    ///
    /// When both sides have a CRS and they differ, a [`CoordTransform`] is
    /// used between them.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use geoloc::alg::transform::Transformer;
    /// use geoloc::cpl::CslStringList;
    /// use geoloc::vsi::open_mem_dataset;
    ///
    /// # fn main() -> geoloc::errors::Result<()> {
    /// let swath = open_mem_dataset("/vsimem/swath")?;
    /// let transformer = Transformer::new(Some(&*swath), None, &CslStringList::new())?;
    /// let (lon, lat, _) = transformer.transform_point(false, 10.5, 20.5).unwrap();
    /// println!("{lon} {lat}");
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(src: Option<&Dataset>, dst: Option<&Dataset>, options: &CslStringList) -> Result<Self> {
        let (src, dst) = Self::open_sides(src, dst, options)?;
        let reproject = match (&src.srs, &dst.srs) {
            (Some(from), Some(to)) if !from.is_same(to) => {
                let forward = CoordTransform::new(from, to).inspect_err(report)?;
                let inverse = CoordTransform::new(to, from).inspect_err(report)?;
                Some((
                    Arc::new(forward) as Arc<dyn Reproject>,
                    Arc::new(inverse) as Arc<dyn Reproject>,
                ))
            }
            _ => None,
        };
        Ok(Transformer { src, dst, reproject })
    }

    /// Same as [`Transformer::new`] with a caller provided reprojection
    /// service.
    ///
    /// # Arguments
    ///
    /// * `forward` - Reprojects source CRS coordinates to the destination CRS.
    /// * `inverse` - Reprojects destination CRS coordinates to the source CRS.
    pub fn with_reprojection(
        src: Option<&Dataset>,
        dst: Option<&Dataset>,
        options: &CslStringList,
        forward: Arc<dyn Reproject>,
        inverse: Arc<dyn Reproject>,
    ) -> Result<Self> {
        let (src, dst) = Self::open_sides(src, dst, options)?;
        Ok(Transformer {
            src,
            dst,
            reproject: Some((forward, inverse)),
        })
    }

    fn open_sides(src: Option<&Dataset>, dst: Option<&Dataset>, options: &CslStringList) -> Result<(Side, Side)> {
        let src = Side::open(src, options, "SRC").inspect_err(report_non_geoloc)?;
        let dst = Side::open(dst, options, "DST").inspect_err(report_non_geoloc)?;
        tracing::debug!(src = ?src.georef_name(), dst = ?dst.georef_name(), "transformer created");
        Ok((src, dst))
    }

    /// The geolocation transformer of the source dataset, if it uses one.
    pub fn src_geoloc(&self) -> Option<&GeolocTransformer> {
        match &self.src.georef {
            Georef::Geoloc(geoloc) => Some(geoloc),
            _ => None,
        }
    }

    /// The geolocation transformer of the destination dataset, if it uses one.
    pub fn dst_geoloc(&self) -> Option<&GeolocTransformer> {
        match &self.dst.georef {
            Georef::Geoloc(geoloc) => Some(geoloc),
            _ => None,
        }
    }

    pub fn src_srs(&self) -> Option<&SpatialRef> {
        self.src.srs.as_ref()
    }

    pub fn dst_srs(&self) -> Option<&SpatialRef> {
        self.dst.srs.as_ref()
    }

    /// Transform a 2D point.
    ///
    /// # Arguments
    ///
    /// * `dst_to_src` - `false` maps source pixel/line to destination
    ///   pixel/line, `true` the opposite.
    /// * `x` - The x coordinate (pixel or easting).
    /// * `y` - The y coordinate (line or northing).
    ///
    /// Returns `(x, y, z)`, `z` is the height carried through the
    /// reprojection (0 for 2D points), or `None` when any step of the chain
    /// fails.
    pub fn transform_point(&self, dst_to_src: bool, x: f64, y: f64) -> Option<(f64, f64, f64)> {
        self.transform_xyz(dst_to_src, x, y, 0.0)
    }

    fn transform_xyz(&self, dst_to_src: bool, x: f64, y: f64, z: f64) -> Option<(f64, f64, f64)> {
        let (from, to) = if dst_to_src {
            (&self.dst, &self.src)
        } else {
            (&self.src, &self.dst)
        };
        let (gx, gy) = from.georef.to_georef(x, y)?;
        let (gx, gy, z) = match &self.reproject {
            Some((forward, inverse)) => {
                let reproject = if dst_to_src { inverse } else { forward };
                reproject.transform_point(gx, gy, z)?
            }
            None => (gx, gy, z),
        };
        let (px, py) = to.georef.to_pixel(gx, gy)?;
        Some((px, py, z))
    }

    /// Transform points in place.
    ///
    /// # Arguments
    ///
    /// * `dst_to_src` - Direction, as in [`Transformer::transform_point`].
    /// * `x` - slice of x coordinates
    /// * `y` - slice of y coordinates (must match x in length)
    /// * `z` - slice of z coordinates, or an empty slice to ignore
    ///
    /// Points that cannot be transformed are set to infinity and flagged
    /// `false` in the returned vector.
    pub fn transform_coords(&self, dst_to_src: bool, x: &mut [f64], y: &mut [f64], z: &mut [f64]) -> Vec<bool> {
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

        (0..nb_coords)
            .map(|i| {
                let zi = z.get(i).copied().unwrap_or(0.0);
                match self.transform_xyz(dst_to_src, x[i], y[i], zi) {
                    Some((tx, ty, tz)) => {
                        (x[i], y[i]) = (tx, ty);
                        if let Some(z) = z.get_mut(i) {
                            *z = tz;
                        }
                        true
                    }
                    None => {
                        (x[i], y[i]) = (f64::INFINITY, f64::INFINITY);
                        false
                    }
                }
            })
            .collect()
    }
}

fn report(e: &GeolocError) {
    config::report_error(CplErrType::Failure, CPLE_ILLEGAL_ARG, &e.to_string());
}

/// Geolocation failures are reported by [`GeolocTransformer`] itself.
fn report_non_geoloc(e: &GeolocError) {
    if !matches!(
        e,
        GeolocError::InvalidMetadata { .. } | GeolocError::DatasetNotFound(_) | GeolocError::BandNotFound { .. }
    ) {
        report(e);
    }
}
