mod common;

use common::*;
use lightbox_trace::outline::smoothing::{smooth_curvature, smooth_morphological};
use lightbox_trace::outline::{smooth_polygon, validate_contour};
use lightbox_trace::{PixelScale, Point2D, Polygon, SmoothingMode};
use std::f64::consts::PI;

fn noisy_circle() -> Polygon {
    let points = (0..360)
        .map(|i| {
            let theta = i as f64 * PI / 180.0;
            let r = 100.0 + 1.5 * (7.0 * theta).sin() + 0.8 * (23.0 * theta).cos();
            Point2D::new(200.0 + r * theta.cos(), 200.0 + r * theta.sin())
        })
        .collect();
    Polygon::new(points)
}

fn square(side: f64) -> Polygon {
    Polygon::new(vec![
        Point2D::new(20.0, 20.0),
        Point2D::new(20.0 + side, 20.0),
        Point2D::new(20.0 + side, 20.0 + side),
        Point2D::new(20.0, 20.0 + side),
    ])
}

fn ten_px_per_mm() -> PixelScale {
    PixelScale::from_dimensions(1000, 1000, 100.0, 100.0)
}

#[test]
fn test_simplification_is_idempotent() {
    let circle = noisy_circle();
    for epsilon in [0.5, 2.0, 5.0] {
        let once = circle.simplify(epsilon);
        let twice = once.simplify(epsilon);
        assert!(once.len() < circle.len());
        assert_eq!(once, twice, "epsilon {epsilon}");
    }
}

#[test]
fn test_smoothing_leaves_straight_runs_untouched() {
    let a = Point2D::new(0.0, 0.0);
    let shallow = Point2D::new(100.0, -8.0);
    let polygon = Polygon::new(vec![
        a,
        shallow,
        Point2D::new(200.0, 0.0),
        Point2D::new(200.0, 100.0),
        Point2D::new(0.0, 100.0),
    ]);

    let smoothed = smooth_curvature(&polygon, 1.0);
    assert_eq!(smoothed.len(), 5);
    assert!(smoothed.points.contains(&shallow), "shallow vertex moved");
    assert!(!smoothed.points.contains(&a), "sharp corner not smoothed");
}

#[test]
fn test_curvature_smoothing_pulls_corners_inward() {
    let jagged = Polygon::new(
        (0..40)
            .map(|i| {
                let theta = i as f64 * 2.0 * PI / 40.0;
                let r = if i % 2 == 0 { 100.0 } else { 85.0 };
                Point2D::new(150.0 + r * theta.cos(), 150.0 + r * theta.sin())
            })
            .collect(),
    );
    let smoothed = smooth_polygon(&jagged, 1.0, SmoothingMode::CurvatureBased, &ten_px_per_mm());
    assert!(smoothed.is_valid());

    let centre = Point2D::new(150.0, 150.0);
    let max_radius = |p: &Polygon| p.points.iter().map(|q| q.distance(&centre)).fold(0.0, f64::max);
    assert!(max_radius(&smoothed) < max_radius(&jagged));
}

#[test]
fn test_morphological_smoothing_keeps_shape() {
    let polygon = square(100.0);
    let smoothed = smooth_morphological(&polygon, 5.0).expect("smoothed outline");
    let error = (smoothed.area() - polygon.area()).abs() / polygon.area();
    assert!(error < 0.03, "area {} vs {}", smoothed.area(), polygon.area());

    let via_mode = smooth_polygon(&polygon, 0.5, SmoothingMode::Morphological, &ten_px_per_mm());
    assert_eq!(via_mode, smoothed);
}

#[test]
fn test_validation_report() {
    let params = ProcessingParameters::default();
    let report = validate_contour(&square(100.0), &params).unwrap();
    assert_eq!(report.perimeter, 400.0);
    assert_eq!(report.area, 10000.0);

    let err = validate_contour(&square(20.0), &params).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ValidationFailed);
}
