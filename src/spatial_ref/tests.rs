use super::{CoordTransform, Reproject, SpatialRef, SrsKind};
use crate::assert_near;
use crate::errors::GeolocError;

#[test]
fn from_epsg_classifies_kind() {
    assert_eq!(SpatialRef::from_epsg(4326).unwrap().kind(), SrsKind::Geographic);
    assert_eq!(SpatialRef::from_epsg(3857).unwrap().kind(), SrsKind::WebMercator);
    assert_eq!(SpatialRef::from_epsg(32631).unwrap().kind(), SrsKind::Other);
}

#[test]
fn from_wkt_reads_root_and_authority() {
    let spatial_ref = SpatialRef::from_wkt("GEOGCS[\"WGS 84\",DATUM[\"WGS_1984\",SPHEROID[\"WGS 84\",6378137,298.257223563,AUTHORITY[\"EPSG\",7030]],AUTHORITY[\"EPSG\",6326]],PRIMEM[\"Greenwich\",0,AUTHORITY[\"EPSG\",8901]],UNIT[\"degree\",0.0174532925199433,AUTHORITY[\"EPSG\",9122]],AUTHORITY[\"EPSG\",4326]]").unwrap();
    assert!(spatial_ref.is_geographic());
    assert_eq!(spatial_ref.authority().as_deref(), Some("EPSG:4326"));

    let wkt2 = "GEOGCRS[\"WGS 84\",DATUM[\"World Geodetic System 1984\",ELLIPSOID[\"WGS 84\",6378137,298.257223563]],CS[ellipsoidal,2],ID[\"EPSG\",4326]]";
    let spatial_ref = SpatialRef::from_wkt(wkt2).unwrap();
    assert!(spatial_ref.is_geographic());
    assert_eq!(spatial_ref.auth_code(), Some(4326));
}

#[test]
fn from_proj4_classifies_kind() {
    let geographic = SpatialRef::from_proj4("+proj=longlat +datum=WGS84 +no_defs").unwrap();
    assert!(geographic.is_geographic());
    let mercator =
        SpatialRef::from_proj4("+proj=merc +a=6378137 +b=6378137 +lat_ts=0 +lon_0=0 +units=m")
            .unwrap();
    assert_eq!(mercator.kind(), SrsKind::WebMercator);
    let laea = SpatialRef::from_proj4("+proj=laea +lat_0=52 +lon_0=10 +ellps=GRS80").unwrap();
    assert_eq!(laea.kind(), SrsKind::Other);
}

#[test]
fn invalid_definitions() {
    assert!(matches!(
        SpatialRef::from_definition(""),
        Err(GeolocError::BadArgument(_))
    ));
    assert!(SpatialRef::from_definition("not a crs").is_err());
    assert!(SpatialRef::from_wkt("EPSG:4326").is_err());
}

#[test]
fn to_wkt_expands_known_codes() {
    let wkt = SpatialRef::from_epsg(4326).unwrap().to_wkt();
    assert!(wkt.starts_with("GEOGCS[\"WGS 84\""));
    let reparsed = SpatialRef::from_wkt(&wkt).unwrap();
    assert_eq!(reparsed, SpatialRef::from_epsg(4326).unwrap());
}

#[test]
fn comparison() {
    let spatial_ref1 = SpatialRef::wgs84();
    let spatial_ref2 = SpatialRef::from_epsg(4326).unwrap();
    let spatial_ref3 = SpatialRef::from_epsg(3025).unwrap();
    let spatial_ref4 = SpatialRef::from_proj4("+proj=longlat +datum=WGS84 +no_defs ").unwrap();

    assert_eq!(spatial_ref1, spatial_ref2);
    assert_ne!(spatial_ref2, spatial_ref3);
    assert_eq!(spatial_ref4, spatial_ref2);
}

#[test]
fn identity_transform() {
    let wgs84 = SpatialRef::from_epsg(4326).unwrap();
    let transform = CoordTransform::new(&wgs84, &SpatialRef::wgs84()).unwrap();
    assert!(transform.is_identity());
    let mut xs = [23.43, 23.50];
    let mut ys = [37.58, 37.70];
    transform.transform_coords(&mut xs, &mut ys, &mut []).unwrap();
    assert_eq!(xs, [23.43, 23.50]);
    assert_eq!(ys, [37.58, 37.70]);
}

#[test]
fn web_mercator_round_trip() {
    let wgs84 = SpatialRef::from_epsg(4326).unwrap();
    let mercator = SpatialRef::from_epsg(3857).unwrap();
    let forward = CoordTransform::new(&wgs84, &mercator).unwrap();
    let backward = CoordTransform::new(&mercator, &wgs84).unwrap();

    let (x, y, _) = forward.transform_point(180.0, 0.0, 0.0).unwrap();
    assert_near!(x, 20037508.342789244, epsilon = 1e-6);
    assert_near!(y, 0.0, epsilon = 1e-6);

    let (x, y, _) = forward.transform_point(-8.0, 45.0, 0.0).unwrap();
    let (lon, lat, _) = backward.transform_point(x, y, 0.0).unwrap();
    assert_near!(lon, -8.0, epsilon = 1e-9);
    assert_near!(lat, 45.0, epsilon = 1e-9);
}

#[test]
fn transform_bounds() {
    let wgs84 = SpatialRef::from_epsg(4326).unwrap();
    let mercator = SpatialRef::from_epsg(3857).unwrap();
    let transform = CoordTransform::new(&wgs84, &mercator).unwrap();
    let out = transform.transform_bounds(&[-10.0, -10.0, 10.0, 10.0], 21).unwrap();
    assert_near!(out[0], -out[2], epsilon = 1e-6);
    assert_near!(out[1], -out[3], epsilon = 1e-6);
    assert!(out[2] > 1_000_000.0);
}

#[test]
fn failing_transform() {
    let wgs84 = SpatialRef::from_epsg(4326).unwrap();
    let mercator = SpatialRef::from_epsg(3857).unwrap();
    let transform = CoordTransform::new(&wgs84, &mercator).unwrap();
    let mut x = [1.0];
    let mut y = [90.0];
    let r = transform.transform_coords(&mut x, &mut y, &mut []);
    match r {
        Err(GeolocError::InvalidCoordinateRange { from, to, msg }) => {
            assert_eq!(from, "EPSG:4326");
            assert_eq!(to, "EPSG:3857");
            assert!(msg.is_some());
        }
        other => panic!("unexpected result: {other:?}"),
    }
    assert!(transform.transform_point(1.0, 90.0, 0.0).is_none());
}

#[test]
fn unsupported_transform() {
    let wgs84 = SpatialRef::from_epsg(4326).unwrap();
    let utm = SpatialRef::from_epsg(32631).unwrap();
    assert!(matches!(
        CoordTransform::new(&wgs84, &utm),
        Err(GeolocError::UnsupportedTransform { .. })
    ));
}
