mod common;

use common::*;
use image::GrayImage;
use lightbox_trace::detection::corners::{
    detect_corners, hough_line_corners, order_corners, CornerStrategy,
};
use lightbox_trace::detection::preprocessing;
use lightbox_trace::{CornerSet, Point2D};

fn skewed_quad() -> [Point2D; 4] {
    [
        Point2D::new(120.0, 80.0),
        Point2D::new(910.0, 130.0),
        Point2D::new(880.0, 900.0),
        Point2D::new(90.0, 860.0),
    ]
}

fn lightbox_truth() -> [Point2D; 4] {
    let lo = LIGHTBOX_MIN as f64;
    let hi = (LIGHTBOX_MAX - 1) as f64;
    [
        Point2D::new(lo, lo),
        Point2D::new(hi, lo),
        Point2D::new(hi, hi),
        Point2D::new(lo, hi),
    ]
}

fn boundary_normalized(params: &ProcessingParameters) -> GrayImage {
    let gray = preprocessing::to_grayscale(&synthetic_lightbox_image());
    preprocessing::normalize_for_boundary(&gray, params.clahe_clip_limit, params.clahe_tile_size)
}

fn permutations(n: usize) -> Vec<Vec<usize>> {
    if n == 0 {
        return vec![vec![]];
    }
    let mut result = Vec::new();
    for perm in permutations(n - 1) {
        for pos in 0..=perm.len() {
            let mut next = perm.clone();
            next.insert(pos, n - 1);
            result.push(next);
        }
    }
    result
}

#[test]
fn test_order_corners_every_permutation() {
    let quad = skewed_quad();
    let expected = CornerSet::from_array(quad);

    let perms = permutations(4);
    assert_eq!(perms.len(), 24);
    for perm in perms {
        let shuffled: Vec<Point2D> = perm.iter().map(|&i| quad[i]).collect();
        assert_eq!(order_corners(&shuffled), Some(expected), "permutation {:?}", perm);
    }
}

#[test]
fn test_order_corners_rejects_wrong_count() {
    let quad = skewed_quad();
    assert_eq!(order_corners(&quad[..3]), None);
}

#[test]
fn test_synthetic_lightbox_corners() -> anyhow::Result<()> {
    init_logging();
    let mut pipeline = StagedPipeline::new(test_params())?;
    let output = pipeline.run_to_stage(&synthetic_lightbox_image(), PipelineStage::LightboxCropped)?;

    let corners = output.corners.expect("corners after cropping");
    let lo = LIGHTBOX_MIN as f64;
    let hi = (LIGHTBOX_MAX - 1) as f64;
    let truth = [(lo, lo), (hi, lo), (hi, hi), (lo, hi)];
    for (found, (x, y)) in corners.to_array().iter().zip(truth) {
        let error = found.distance(&Point2D::new(x, y));
        assert!(error < 3.0, "corner {:?} is {:.2} px from ({}, {})", found, error, x, y);
    }

    assert_eq!(output.polygon, corners.to_polygon());
    assert_eq!(output.image.width(), 1000);
    assert_eq!(output.image.height(), 1000);
    Ok(())
}

#[test]
fn test_all_black_has_no_boundary() -> anyhow::Result<()> {
    init_logging();
    let mut pipeline = StagedPipeline::new(test_params())?;
    let err = pipeline.run(&uniform_image(0)).unwrap_err();
    assert!(matches!(err, TraceError::NoBoundaryFound), "got {err}");
    Ok(())
}

#[test]
fn test_all_white_has_no_boundary() -> anyhow::Result<()> {
    init_logging();
    let mut pipeline = StagedPipeline::new(test_params())?;
    let err = pipeline.run(&uniform_image(255)).unwrap_err();
    assert!(matches!(err, TraceError::NoBoundaryFound), "got {err}");
    Ok(())
}

#[test]
fn test_hough_lines_find_the_lightbox() {
    init_logging();
    let params = test_params();
    let normalized = boundary_normalized(&params);

    let raw = hough_line_corners(&normalized, &params).expect("four line intersections");
    let corners = order_corners(&raw).expect("distinct corners");
    for (found, truth) in corners.to_array().iter().zip(lightbox_truth()) {
        let error = found.distance(&truth);
        assert!(error < 2.0, "corner {:?} is {:.2} px from {:?}", found, error, truth);
    }
}

#[test]
fn test_empty_mask_falls_back_to_hough_lines() -> anyhow::Result<()> {
    init_logging();
    let params = test_params();
    let normalized = boundary_normalized(&params);
    let empty_mask = GrayImage::new(CANVAS, CANVAS);

    let detection = detect_corners(&empty_mask, &normalized, &params)?;
    assert_eq!(detection.strategy, CornerStrategy::HoughLines);
    for (found, truth) in detection.corners.to_array().iter().zip(lightbox_truth()) {
        let error = found.distance(&truth);
        assert!(error < 3.0, "corner {:?} is {:.2} px from {:?}", found, error, truth);
    }
    Ok(())
}
