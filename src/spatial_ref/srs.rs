use std::fmt::{Display, Formatter};

use crate::errors::{GeolocError, Result};

const WGS84_WKT: &str = "GEOGCS[\"WGS 84\",DATUM[\"WGS_1984\",SPHEROID[\"WGS 84\",6378137,298.257223563,AUTHORITY[\"EPSG\",\"7030\"]],AUTHORITY[\"EPSG\",\"6326\"]],PRIMEM[\"Greenwich\",0,AUTHORITY[\"EPSG\",\"8901\"]],UNIT[\"degree\",0.0174532925199433,AUTHORITY[\"EPSG\",\"9122\"]],AXIS[\"Longitude\",EAST],AXIS[\"Latitude\",NORTH],AUTHORITY[\"EPSG\",\"4326\"]]";

const WEB_MERCATOR_WKT: &str = "PROJCS[\"WGS 84 / Pseudo-Mercator\",GEOGCS[\"WGS 84\",DATUM[\"WGS_1984\",SPHEROID[\"WGS 84\",6378137,298.257223563]],PRIMEM[\"Greenwich\",0],UNIT[\"degree\",0.0174532925199433]],PROJECTION[\"Mercator_1SP\"],PARAMETER[\"central_meridian\",0],PARAMETER[\"scale_factor\",1],PARAMETER[\"false_easting\",0],PARAMETER[\"false_northing\",0],UNIT[\"metre\",1],AXIS[\"Easting\",EAST],AXIS[\"Northing\",NORTH],EXTENSION[\"PROJ4\",\"+proj=merc +a=6378137 +b=6378137 +lat_ts=0 +lon_0=0 +x_0=0 +y_0=0 +k=1 +units=m +nadgrids=@null +wktext +no_defs\"],AUTHORITY[\"EPSG\",\"3857\"]]";

const GEOGRAPHIC_CODES: &[u32] = &[4326, 4269, 4258, 4230, 4283, 4171, 4617, 4674];
const WEB_MERCATOR_CODES: &[u32] = &[3857, 3785, 900913, 102100];

/// Broad classification of a coordinate reference system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SrsKind {
    /// Longitude/latitude in degrees.
    Geographic,
    /// Spherical ("pseudo") Mercator in metres.
    WebMercator,
    /// Anything else; only identity transformations are available.
    Other,
}

/// A coordinate reference system, kept as its textual definition.
///
/// Axis order is always the traditional GIS order: x is longitude/easting.
#[derive(Debug, Clone)]
pub struct SpatialRef {
    definition: String,
    kind: SrsKind,
}

impl SpatialRef {
    /// Parses `EPSG:n`, `OGC:CRS84`, WKT (1 or 2) and PROJ strings.
    pub fn from_definition(definition: &str) -> Result<SpatialRef> {
        let definition = definition.trim();
        if definition.is_empty() {
            return Err(GeolocError::BadArgument(
                "empty spatial reference definition".to_string(),
            ));
        }
        let upper = definition.to_ascii_uppercase();

        let kind = if let Some(code) = parse_epsg_code(&upper) {
            kind_from_epsg(code)
        } else if matches!(upper.as_str(), "OGC:CRS84" | "CRS:84" | "WGS84" | "WGS 84") {
            SrsKind::Geographic
        } else if upper.contains("+PROJ=") {
            kind_from_proj(&upper)
        } else if upper.contains('[') {
            kind_from_wkt(&upper)?
        } else {
            return Err(GeolocError::BadArgument(format!(
                "unrecognized spatial reference definition: '{definition}'"
            )));
        };

        Ok(SpatialRef {
            definition: definition.to_string(),
            kind,
        })
    }

    pub fn from_wkt(wkt: &str) -> Result<SpatialRef> {
        if !wkt.contains('[') {
            return Err(GeolocError::BadArgument(format!("not a WKT string: '{wkt}'")));
        }
        Self::from_definition(wkt)
    }

    pub fn from_epsg(epsg_code: u32) -> Result<SpatialRef> {
        Self::from_definition(&format!("EPSG:{epsg_code}"))
    }

    pub fn from_proj4(proj4_string: &str) -> Result<SpatialRef> {
        Self::from_definition(proj4_string)
    }

    /// WGS 84 longitude/latitude.
    pub fn wgs84() -> SpatialRef {
        SpatialRef {
            definition: WGS84_WKT.to_string(),
            kind: SrsKind::Geographic,
        }
    }

    pub fn kind(&self) -> SrsKind {
        self.kind
    }

    pub fn is_geographic(&self) -> bool {
        self.kind == SrsKind::Geographic
    }

    pub fn definition(&self) -> &str {
        &self.definition
    }

    /// WKT representation; well-known systems declared by code get their full WKT.
    pub fn to_wkt(&self) -> String {
        if self.definition.contains('[') {
            return self.definition.clone();
        }
        match (self.kind, self.auth_code()) {
            (SrsKind::Geographic, Some(4326) | None) => WGS84_WKT.to_string(),
            (SrsKind::WebMercator, _) => WEB_MERCATOR_WKT.to_string(),
            _ => self.definition.clone(),
        }
    }

    /// Authority code of the definition, e.g. `4326` for `EPSG:4326`.
    pub fn auth_code(&self) -> Option<u32> {
        let upper = self.definition.to_ascii_uppercase();
        parse_epsg_code(&upper).or_else(|| last_wkt_epsg_code(&upper))
    }

    /// `AUTHORITY:CODE` string, when known.
    pub fn authority(&self) -> Option<String> {
        self.auth_code().map(|code| format!("EPSG:{code}"))
    }

    /// Whether both references designate the same system.
    pub fn is_same(&self, other: &SpatialRef) -> bool {
        if self.kind != other.kind {
            return false;
        }
        match self.kind {
            SrsKind::WebMercator => true,
            SrsKind::Geographic => match (self.auth_code(), other.auth_code()) {
                (Some(a), Some(b)) => a == b,
                _ => true,
            },
            SrsKind::Other => match (self.auth_code(), other.auth_code()) {
                (Some(a), Some(b)) => a == b,
                _ => normalized(&self.definition) == normalized(&other.definition),
            },
        }
    }
}

impl PartialEq for SpatialRef {
    fn eq(&self, other: &Self) -> bool {
        self.is_same(other)
    }
}

impl Display for SpatialRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.authority() {
            Some(authority) => f.write_str(&authority),
            None => f.write_str(&self.definition),
        }
    }
}

fn normalized(definition: &str) -> String {
    definition
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_uppercase()
}

fn parse_epsg_code(upper: &str) -> Option<u32> {
    upper
        .strip_prefix("EPSG:")
        .and_then(|code| code.trim().parse().ok())
}

fn kind_from_epsg(code: u32) -> SrsKind {
    if GEOGRAPHIC_CODES.contains(&code) {
        SrsKind::Geographic
    } else if WEB_MERCATOR_CODES.contains(&code) {
        SrsKind::WebMercator
    } else {
        SrsKind::Other
    }
}

fn kind_from_proj(upper: &str) -> SrsKind {
    if upper.contains("+PROJ=LONGLAT") || upper.contains("+PROJ=LATLONG") {
        SrsKind::Geographic
    } else if upper.contains("+PROJ=MERC")
        && upper.contains("+A=6378137")
        && upper.contains("+B=6378137")
    {
        SrsKind::WebMercator
    } else {
        SrsKind::Other
    }
}

fn kind_from_wkt(upper: &str) -> Result<SrsKind> {
    let root = upper
        .split('[')
        .next()
        .map(str::trim)
        .unwrap_or_default();
    match root {
        "GEOGCS" | "GEOGCRS" | "GEOGRAPHICCRS" => Ok(SrsKind::Geographic),
        // A GEODCRS with an ellipsoidal coordinate system is geographic; a
        // cartesian one is geocentric.
        "GEODCRS" | "GEODETICCRS" => Ok(if upper.contains("CS[ELLIPSOIDAL") {
            SrsKind::Geographic
        } else {
            SrsKind::Other
        }),
        "PROJCS" | "PROJCRS" | "PROJECTEDCRS" => {
            let code = last_wkt_epsg_code(upper);
            if code.is_some_and(|c| WEB_MERCATOR_CODES.contains(&c))
                || upper.contains("PSEUDO-MERCATOR")
                || upper.contains("MERCATOR_AUXILIARY_SPHERE")
                || upper.contains("POPULAR VISUALISATION")
            {
                Ok(SrsKind::WebMercator)
            } else {
                Ok(SrsKind::Other)
            }
        }
        "COMPD_CS" | "COMPOUNDCRS" | "LOCAL_CS" | "ENGCRS" | "GEOCCS" | "VERT_CS" | "VERTCRS" => {
            Ok(SrsKind::Other)
        }
        _ => Err(GeolocError::BadArgument(format!(
            "unrecognized WKT root node: '{root}'"
        ))),
    }
}

/// The EPSG code of the outermost node is the last one in the string.
fn last_wkt_epsg_code(upper: &str) -> Option<u32> {
    let candidates = [("AUTHORITY[\"EPSG\",", '"'), ("ID[\"EPSG\",", ']')];
    candidates
        .iter()
        .filter_map(|(pattern, _)| upper.rfind(pattern).map(|pos| (pos, pattern.len())))
        .max_by_key(|(pos, _)| *pos)
        .and_then(|(pos, len)| {
            let rest = &upper[pos + len..];
            let digits: String = rest
                .trim_start_matches('"')
                .chars()
                .take_while(|c| c.is_ascii_digit())
                .collect();
            digits.parse().ok()
        })
}
