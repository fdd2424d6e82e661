use crate::alg::geoloc::{GeolocTransformer, InverseMethod, SolverPhase};
use crate::assert_near;
use crate::cpl::CslStringList;
use crate::errors::GeolocError;
use crate::metadata::{Metadata, GEOLOCATION_DOMAIN};
use crate::test_utils::{
    affine_arrays, antimeridian_arrays, band, noisy_arrays, options, polar_arrays, MemArrays,
    POLAR_SIZE, RASTER_SIZE,
};
use crate::Dataset;

const CONVENTIONS: [&str; 2] = ["TOP_LEFT_CORNER", "PIXEL_CENTER"];
const METHODS: [&str; 2] = ["BACKMAP", "QUADTREE"];

/// Points of the raster with their expected coordinates on the affine
/// fixture arrays.
fn affine_points() -> Vec<(f64, f64, f64, f64)> {
    let n = RASTER_SIZE as f64;
    vec![
        (10.0, 10.0, -70.0, 40.0),
        (1.23, 2.34, -78.77, 47.66),
        (0.0, 0.0, -80.0, 50.0),
        (n, 0.0, -60.0, 50.0),
        (0.0, n, -80.0, 30.0),
        (n, n, -60.0, 30.0),
    ]
}

fn round_trip(transformer: &GeolocTransformer, px: f64, py: f64) -> (f64, f64) {
    let (x, y) = transformer
        .transform_point(false, px, py)
        .unwrap_or_else(|| panic!("forward transform of ({px}, {py}) failed"));
    transformer
        .transform_point(true, x, y)
        .unwrap_or_else(|| panic!("inverse transform of ({x}, {y}) failed"))
}

#[test]
fn affine_transformation() {
    for step in [1, 2] {
        for convention in CONVENTIONS {
            for method in METHODS {
                for detect_affine in ["YES", "NO"] {
                    let arrays = affine_arrays(
                        &format!("geoloc_affine_{step}_{convention}_{method}_{detect_affine}"),
                        step,
                        convention,
                    );
                    let transformer = GeolocTransformer::new(
                        None,
                        &arrays.metadata(step, convention),
                        false,
                        &options(&[
                            ("GEOLOC_INVERSE_METHOD", method),
                            ("GEOLOC_DETECT_AFFINE", detect_affine),
                        ]),
                    )
                    .unwrap();

                    for (px, py, x, y) in affine_points() {
                        let (fx, fy) = transformer.transform_point(false, px, py).unwrap();
                        if px.fract() == 0.0 && py.fract() == 0.0 {
                            assert_eq!((fx, fy), (x, y));
                        } else {
                            assert_near!(fx, x, epsilon = 1e-9);
                            assert_near!(fy, y, epsilon = 1e-9);
                        }
                        let (rx, ry) = round_trip(&transformer, px, py);
                        assert_near!(rx, px, epsilon = 1e-6);
                        assert_near!(ry, py, epsilon = 1e-6);
                    }
                }
            }
        }
    }
}

#[test]
fn affine_transformation_with_noise() {
    for step in [1, 2] {
        for method in METHODS {
            let convention = "TOP_LEFT_CORNER";
            let arrays = noisy_arrays(&format!("geoloc_noise_{step}_{method}"), step, convention, 42);
            let transformer = GeolocTransformer::new(
                None,
                &arrays.metadata(step, convention),
                false,
                &options(&[("GEOLOC_INVERSE_METHOD", method)]),
            )
            .unwrap();
            for (px, py, _, _) in affine_points() {
                let (rx, ry) = round_trip(&transformer, px, py);
                assert_near!(rx, px, epsilon = 1e-6);
                assert_near!(ry, py, epsilon = 1e-6);
            }
        }
    }
}

#[test]
fn noisy_pixel_center_interior() {
    let arrays = noisy_arrays("geoloc_noise_center", 1, "PIXEL_CENTER", 7);
    let transformer = GeolocTransformer::new(
        None,
        &arrays.metadata(1, "PIXEL_CENTER"),
        false,
        &CslStringList::new(),
    )
    .unwrap();
    for (px, py) in [(10.0, 10.0), (1.23, 2.34), (18.5, 3.75)] {
        let (rx, ry) = round_trip(&transformer, px, py);
        assert_near!(rx, px, epsilon = 1e-6);
        assert_near!(ry, py, epsilon = 1e-6);
    }
}

#[test]
fn out_of_bounds_is_rejected() {
    let arrays = affine_arrays("geoloc_out_of_bounds", 1, "TOP_LEFT_CORNER");
    for method in METHODS {
        let transformer = GeolocTransformer::new(
            None,
            &arrays.metadata(1, "TOP_LEFT_CORNER"),
            false,
            &options(&[("GEOLOC_INVERSE_METHOD", method)]),
        )
        .unwrap();
        assert_eq!(transformer.transform_point(true, 0.0, 0.0), None);
        assert_eq!(transformer.transform_point(true, -59.0, 40.0), None);
        assert_eq!(transformer.transform_point(true, f64::NAN, 40.0), None);
    }
}

#[test]
fn lazy_inverse_build() {
    let arrays = affine_arrays("geoloc_lazy", 2, "TOP_LEFT_CORNER");
    let transformer = GeolocTransformer::new(
        None,
        &arrays.metadata(2, "TOP_LEFT_CORNER"),
        false,
        &CslStringList::new(),
    )
    .unwrap();
    assert_eq!(transformer.solver_phase(), SolverPhase::Unbuilt);
    transformer.transform_point(false, 3.0, 3.0).unwrap();
    assert_eq!(transformer.solver_phase(), SolverPhase::Unbuilt);
    transformer.transform_point(true, -75.0, 45.0).unwrap();
    assert_eq!(transformer.solver_phase(), SolverPhase::Ready);

    let eager = GeolocTransformer::new(
        None,
        &arrays.metadata(2, "TOP_LEFT_CORNER"),
        false,
        &CslStringList::new(),
    )
    .unwrap();
    eager.build_inverse().unwrap();
    assert_eq!(eager.solver_phase(), SolverPhase::Ready);
}

#[test]
fn temp_datasets_give_identical_results() {
    let arrays = noisy_arrays("geoloc_temp_datasets", 1, "TOP_LEFT_CORNER", 3);
    let build = |use_temp: &str| {
        GeolocTransformer::new(
            None,
            &arrays.metadata(1, "TOP_LEFT_CORNER"),
            false,
            &options(&[
                ("GEOLOC_USE_TEMP_DATASETS", use_temp),
                ("GEOLOC_USE_MAX_ACCURACY", "NO"),
            ]),
        )
        .unwrap()
    };
    let on_disk = build("YES");
    let in_memory = build("NO");
    for (x, y) in [(-70.3, 40.2), (-79.1, 48.8), (-61.0, 31.5), (-65.55, 44.4)] {
        assert_eq!(on_disk.transform_point(true, x, y), in_memory.transform_point(true, x, y));
    }
}

#[test]
fn antimeridian_round_trip() {
    let arrays = antimeridian_arrays("geoloc_antimeridian");
    let mut metadata = arrays.metadata(1, "TOP_LEFT_CORNER");
    metadata.set_name_value("SRS", "EPSG:4326").unwrap();
    for method in METHODS {
        let transformer = GeolocTransformer::new(
            None,
            &metadata,
            false,
            &options(&[("GEOLOC_INVERSE_METHOD", method), ("GEOLOC_DETECT_AFFINE", "NO")]),
        )
        .unwrap();
        assert!(transformer.grid().normalizes_longitude());
        assert!(transformer.bounds().wraps_longitude());

        let (x, _) = transformer.transform_point(false, 4.5, 1.5).unwrap();
        assert_near!(x, -178.75, epsilon = 1e-9);

        for (px, py) in [(4.5, 1.5), (3.25, 2.0), (7.75, 4.5), (1.0, 1.0)] {
            let (rx, ry) = round_trip(&transformer, px, py);
            assert_near!(rx, px, epsilon = 1e-6);
            assert_near!(ry, py, epsilon = 1e-6);
        }
        assert_eq!(transformer.transform_point(true, 0.0, 15.0), None);
    }
}

fn polar_transformer(arrays: &MemArrays, pairs: &[(&str, &str)]) -> GeolocTransformer {
    let mut metadata = arrays.metadata(1, "TOP_LEFT_CORNER");
    metadata.set_name_value("SRS", "EPSG:4326").unwrap();
    GeolocTransformer::new(None, &metadata, false, &options(pairs)).unwrap()
}

/// Longitude difference folded into [-180, 180).
fn lon_diff(a: f64, b: f64) -> f64 {
    (a - b + 180.0).rem_euclid(360.0) - 180.0
}

#[test]
fn polar_grid_round_trip() {
    let arrays = polar_arrays("geoloc_polar");
    let center = (POLAR_SIZE as f64 - 1.0) / 2.0;
    let positions: Vec<f64> = (0..26).map(|k| 0.25 + 1.5 * k as f64).collect();
    for method in METHODS {
        let transformer = polar_transformer(
            &arrays,
            &[("GEOLOC_INVERSE_METHOD", method), ("GEOLOC_DETECT_AFFINE", "NO")],
        );
        assert!(transformer.grid().normalizes_longitude());
        assert!(!transformer.bounds().wraps_longitude());

        for &py in &positions {
            for &px in &positions {
                let (x, y) = transformer.transform_point(false, px, py).unwrap();
                assert!(transformer.bounds().contains(x, y), "({x}, {y}) from ({px}, {py})");

                let in_ring = (8.0..=center).contains(&(px - center).hypot(py - center));
                let Some((rx, ry)) = transformer.transform_point(true, x, y) else {
                    assert!(!in_ring, "no inverse for ({px}, {py})");
                    continue;
                };
                // whatever is returned maps back onto the query
                let (fx, fy) = transformer.transform_point(false, rx, ry).unwrap();
                assert_near!(lon_diff(fx, x), 0.0, epsilon = 1e-3);
                assert_near!(fy, y, epsilon = 1e-3);

                if in_ring {
                    assert_near!(rx, px, epsilon = 1e-5);
                    assert_near!(ry, py, epsilon = 1e-5);
                }
            }
        }

        // next to the seam, west of the pole
        let (x, y) = transformer.transform_point(false, 0.25, 19.25).unwrap();
        assert!(x < -179.0);
        let (rx, ry) = transformer.transform_point(true, x, y).unwrap();
        assert_near!(rx, 0.25, epsilon = 1e-5);
        assert_near!(ry, 19.25, epsilon = 1e-5);

        // close to the pole: either no answer or a consistent one
        if let Some((rx, ry)) = transformer.transform_point(true, -13.455, 89.638) {
            let (fx, fy) = transformer.transform_point(false, rx, ry).unwrap();
            assert_near!(lon_diff(fx, -13.455), 0.0, epsilon = 1e-3);
            assert_near!(fy, 89.638, epsilon = 1e-3);
        }
        assert_eq!(transformer.transform_point(true, 0.0, 70.0), None);
    }
}

#[test]
fn polar_grid_temp_datasets_give_identical_results() {
    let arrays = polar_arrays("geoloc_polar_temp");
    let build = |use_temp: &str| {
        polar_transformer(
            &arrays,
            &[("GEOLOC_USE_TEMP_DATASETS", use_temp), ("GEOLOC_DETECT_AFFINE", "NO")],
        )
    };
    let on_disk = build("YES");
    let in_memory = build("NO");
    let mut queries = vec![(-13.455, 89.638), (179.9, 82.0), (-179.9, 82.0), (45.0, 85.0)];
    for (px, py) in [(0.25, 19.25), (3.5, 30.5), (25.75, 2.25), (37.5, 20.0)] {
        queries.push(in_memory.transform_point(false, px, py).unwrap());
    }
    for (x, y) in queries {
        assert_eq!(on_disk.transform_point(true, x, y), in_memory.transform_point(true, x, y));
    }
}

#[test]
fn pixel_center_inverse_stays_in_raster() {
    let arrays = affine_arrays("geoloc_center_edges", 1, "PIXEL_CENTER");
    for method in METHODS {
        let transformer = GeolocTransformer::new(
            None,
            &arrays.metadata(1, "PIXEL_CENTER"),
            false,
            &options(&[("GEOLOC_INVERSE_METHOD", method), ("GEOLOC_DETECT_AFFINE", "NO")]),
        )
        .unwrap();
        let env = transformer.bounds().envelope().unwrap();
        assert_eq!((env.min().x, env.max().x), (-80.0, -60.0));
        assert_eq!((env.min().y, env.max().y), (30.0, 50.0));

        // the raster ends at -60 degrees
        assert_eq!(transformer.transform_point(true, -59.9, 40.0), None);
        assert_eq!(transformer.transform_point(true, -70.0, 29.9), None);
        let (px, py) = transformer.transform_point(true, -60.1, 40.0).unwrap();
        assert_near!(px, 19.9, epsilon = 1e-6);
        assert_near!(py, 10.0, epsilon = 1e-6);
    }
}

#[test]
fn swap_xy_and_reversed() {
    let arrays = affine_arrays("geoloc_swap", 1, "TOP_LEFT_CORNER");
    let mut metadata = arrays.metadata(1, "TOP_LEFT_CORNER");
    metadata.set_name_value("SWAP_XY", "YES").unwrap();
    let swapped = GeolocTransformer::new(None, &metadata, false, &CslStringList::new()).unwrap();
    let (a, b) = swapped.transform_point(false, 2.0, 3.0).unwrap();
    assert_near!(a, 47.0, epsilon = 1e-9);
    assert_near!(b, -78.0, epsilon = 1e-9);
    let (px, py) = swapped.transform_point(true, a, b).unwrap();
    assert_near!(px, 2.0, epsilon = 1e-6);
    assert_near!(py, 3.0, epsilon = 1e-6);

    let reversed = GeolocTransformer::new(
        None,
        &arrays.metadata(1, "TOP_LEFT_CORNER"),
        true,
        &CslStringList::new(),
    )
    .unwrap();
    assert!(reversed.is_reversed());
    let (px, py) = reversed.transform_point(false, -78.0, 47.0).unwrap();
    assert_near!(px, 2.0, epsilon = 1e-6);
    assert_near!(py, 3.0, epsilon = 1e-6);
    let (x, y) = reversed.transform_point(true, 2.0, 3.0).unwrap();
    assert_near!(x, -78.0, epsilon = 1e-9);
    assert_near!(y, 47.0, epsilon = 1e-9);
}

#[test]
fn create_similar_rescales_addressing() {
    let arrays = affine_arrays("geoloc_similar", 1, "TOP_LEFT_CORNER");
    let transformer = GeolocTransformer::new(
        None,
        &arrays.metadata(1, "TOP_LEFT_CORNER"),
        false,
        &CslStringList::new(),
    )
    .unwrap();
    let half = transformer.create_similar(2.0, 2.0).unwrap();
    assert_eq!(half.info().pixel_step, 0.5);
    assert_eq!(half.geolocation_info().fetch_name_value("LINE_STEP").as_deref(), Some("0.5"));

    let (x, y) = half.transform_point(false, 5.0, 5.0).unwrap();
    let (ox, oy) = transformer.transform_point(false, 10.0, 10.0).unwrap();
    assert_near!(x, ox, epsilon = 1e-9);
    assert_near!(y, oy, epsilon = 1e-9);
    let (px, py) = half.transform_point(true, -70.0, 40.0).unwrap();
    assert_near!(px, 5.0, epsilon = 1e-6);
    assert_near!(py, 5.0, epsilon = 1e-6);
}

#[test]
fn arrays_from_base_dataset() {
    let n = 6;
    let mut base = Dataset::from_bands(
        "in_memory_base",
        vec![
            band(n, n, |i, _| 100.0 + i as f64),
            band(n, n, |_, j| -10.0 - j as f64),
        ],
    )
    .unwrap();
    let metadata = CslStringList::from(&[
        ("X_BAND", "1"),
        ("Y_BAND", "2"),
        ("PIXEL_OFFSET", "0"),
        ("PIXEL_STEP", "1"),
        ("LINE_OFFSET", "0"),
        ("LINE_STEP", "1"),
    ]);
    base.set_metadata_domain(GEOLOCATION_DOMAIN, metadata.clone());

    let transformer = GeolocTransformer::new(Some(&base), &metadata, false, &CslStringList::new()).unwrap();
    let info = transformer.geolocation_info();
    assert_eq!(info.fetch_name_value("X_DATASET").as_deref(), Some("in_memory_base"));
    assert_eq!(info.fetch_name_value("Y_DATASET").as_deref(), Some("in_memory_base"));

    let (x, y) = transformer.transform_point(false, 2.5, 1.0).unwrap();
    assert_near!(x, 102.5, epsilon = 1e-9);
    assert_near!(y, -11.0, epsilon = 1e-9);
}

#[test]
fn invalid_metadata() {
    let err = GeolocTransformer::new(
        None,
        &CslStringList::from(&[("invalid", "content")]),
        false,
        &CslStringList::new(),
    )
    .unwrap_err();
    assert!(matches!(err, GeolocError::InvalidMetadata { .. }));

    let arrays = affine_arrays("geoloc_invalid", 1, "TOP_LEFT_CORNER");
    let mut metadata = arrays.metadata(1, "TOP_LEFT_CORNER");
    metadata.set_name_value("Y_DATASET", "/vsimem/does_not_exist").unwrap();
    let err = GeolocTransformer::new(None, &metadata, false, &CslStringList::new()).unwrap_err();
    assert!(matches!(err, GeolocError::DatasetNotFound(_)));

    // only one of the bands is a single row
    let mismatched = MemArrays::register(
        "geoloc_invalid_shape",
        band(20, 1, |i, _| i as f64),
        band(20, 20, |_, j| j as f64),
    );
    let err = GeolocTransformer::new(
        None,
        &mismatched.metadata(1, "TOP_LEFT_CORNER"),
        false,
        &CslStringList::new(),
    )
    .unwrap_err();
    assert!(matches!(err, GeolocError::InvalidMetadata { .. }));
}

#[test]
fn invalid_nodes_fail_locally() {
    let x = band(8, 8, |i, j| if (i, j) == (3, 3) { -999.0 } else { 10.0 + i as f64 })
        .with_no_data(-999.0);
    let arrays = MemArrays::register("geoloc_nodata", x, band(8, 8, |_, j| 5.0 - j as f64));
    let transformer = GeolocTransformer::new(
        None,
        &arrays.metadata(1, "TOP_LEFT_CORNER"),
        false,
        &options(&[("GEOLOC_INVERSE_METHOD", InverseMethod::Quadtree.to_string().as_str())]),
    )
    .unwrap();
    assert_eq!(transformer.transform_point(false, 3.5, 3.5), None);
    assert!(transformer.transform_point(false, 5.5, 5.5).is_some());
    let (px, py) = transformer.transform_point(true, 16.0, -1.0).unwrap();
    assert_near!(px, 6.0, epsilon = 1e-9);
    assert_near!(py, 6.0, epsilon = 1e-9);
}

#[test]
fn batch_transform_marks_failures() {
    let arrays = affine_arrays("geoloc_batch", 1, "TOP_LEFT_CORNER");
    let transformer = GeolocTransformer::new(
        None,
        &arrays.metadata(1, "TOP_LEFT_CORNER"),
        false,
        &CslStringList::new(),
    )
    .unwrap();
    let mut x = [-70.0, 10.0, -79.0];
    let mut y = [40.0, 10.0, 49.0];
    let success = transformer.transform_coords(true, &mut x, &mut y);
    assert_eq!(success, vec![true, false, true]);
    assert_near!(x[0], 10.0, epsilon = 1e-6);
    assert_eq!(x[1], f64::INFINITY);
    assert_eq!(y[1], f64::INFINITY);
    assert_near!(y[2], 1.0, epsilon = 1e-6);
}
