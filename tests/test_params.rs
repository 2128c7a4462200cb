mod common;

use common::*;
use lightbox_trace::config::*;

/// Boundary values pass; one step beyond either end fails. Float steps
/// are sized to the range they probe.
macro_rules! assert_range {
    ($field:ident, $range:expr, $unit:expr) => {{
        let range = $range;
        let cases = [
            (range.min, true),
            (range.max, true),
            (range.min - $unit, false),
            (range.max + $unit, false),
        ];
        for (value, accepted) in cases {
            let params = ProcessingParameters {
                $field: value,
                ..ProcessingParameters::default()
            };
            assert_eq!(
                params.validate().is_ok(),
                accepted,
                "{} = {:?}",
                stringify!($field),
                value
            );
        }
    }};
}

#[test]
fn test_defaults_validate() {
    assert!(ProcessingParameters::default().validate().is_ok());
    assert!(test_params().validate().is_ok());
}

#[test]
fn test_integer_ranges() {
    assert_range!(target_width_px, TARGET_SIZE_PX, 1);
    assert_range!(target_height_px, TARGET_SIZE_PX, 1);
    assert_range!(clahe_tile_size, CLAHE_TILE_SIZE, 1);
    assert_range!(adaptive_block_radius, ADAPTIVE_BLOCK_RADIUS, 1);
    assert_range!(adaptive_c, ADAPTIVE_C, 1);
    assert_range!(manual_threshold, MANUAL_THRESHOLD, 1);
    assert_range!(threshold_offset, THRESHOLD_OFFSET, 1);
    assert_range!(morph_kernel_size, MORPH_KERNEL_SIZE, 1);
    assert_range!(corner_win_size, CORNER_WIN_SIZE, 1);
}

#[test]
fn test_float_ranges() {
    assert_range!(physical_width_mm, PHYSICAL_SIZE_MM, 1.0);
    assert_range!(physical_height_mm, PHYSICAL_SIZE_MM, 1.0);
    assert_range!(clahe_clip_limit, CLAHE_CLIP_LIMIT, 0.1);
    assert_range!(contour_merge_distance_mm, CONTOUR_MERGE_DISTANCE_MM, 1.0);
    assert_range!(min_contour_area, MIN_CONTOUR_AREA, 1.0);
    assert_range!(min_solidity, MIN_SOLIDITY, 0.01);
    assert_range!(max_aspect_ratio, MAX_ASPECT_RATIO, 1.0);
    assert_range!(polygon_epsilon_factor, POLYGON_EPSILON_FACTOR, 0.001);
    assert_range!(min_perimeter, MIN_PERIMETER, 1.0);
    assert_range!(dilation_amount_mm, DILATION_AMOUNT_MM, 0.1);
    assert_range!(smoothing_amount_mm, SMOOTHING_AMOUNT_MM, 0.01);
}

#[test]
fn test_large_kernel_must_be_odd() {
    assert_range!(large_kernel_size, LARGE_KERNEL_SIZE, 2);
    let even = ProcessingParameters {
        large_kernel_size: 16,
        ..ProcessingParameters::default()
    };
    assert!(even.validate().is_err());
}

#[test]
fn test_canny_thresholds() {
    let with = |low: f64, high: f64| ProcessingParameters {
        canny_low: low,
        canny_high: high,
        ..ProcessingParameters::default()
    };

    assert!(with(CANNY_LOW.min, CANNY_HIGH.max).validate().is_ok());
    assert!(with(CANNY_LOW.max, CANNY_HIGH.max).validate().is_ok());
    assert!(with(CANNY_LOW.min - 1.0, CANNY_HIGH.max).validate().is_err());
    assert!(with(CANNY_LOW.max + 1.0, CANNY_HIGH.max).validate().is_err());

    assert!(with(CANNY_LOW.min, CANNY_HIGH.min).validate().is_ok());
    assert!(with(CANNY_LOW.min, CANNY_HIGH.min - 1.0).validate().is_err());
    assert!(with(CANNY_LOW.min, CANNY_HIGH.max + 1.0).validate().is_err());

    // low must stay strictly below high
    assert!(with(100.0, 100.0).validate().is_err());

    for aperture in CANNY_APERTURES {
        let params = ProcessingParameters {
            canny_aperture: aperture,
            ..ProcessingParameters::default()
        };
        assert!(params.validate().is_ok());
    }
    let params = ProcessingParameters {
        canny_aperture: 4,
        ..ProcessingParameters::default()
    };
    assert!(params.validate().is_err());
}

#[test]
fn test_chroma_band_order() {
    let params = ProcessingParameters {
        lab_a_min: 150,
        lab_a_max: 140,
        ..ProcessingParameters::default()
    };
    let err = params.validate().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
}

#[test]
fn test_json_round_trip_through_file() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    let path = dir.path().join("params.json");

    let params = ProcessingParameters {
        dilation_amount_mm: 1.5,
        enable_smoothing: true,
        smoothing_mode: SmoothingMode::Morphological,
        ..test_params()
    };
    params.save(&path)?;
    assert_eq!(ProcessingParameters::load(&path)?, params);

    let missing = ProcessingParameters::load(&dir.path().join("absent.json")).unwrap_err();
    assert_eq!(missing.kind(), ErrorKind::InvalidInput);
    Ok(())
}
