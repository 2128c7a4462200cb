//! Lightbox corner detection.
//!
//! Strategies are tried in a fixed order until one produces a quadrilateral
//! that survives validation:
//!
//! 1. [`CornerStrategy::ContourPolygon`] simplifies the outer boundary of the
//!    cleaned lightbox mask down to four vertices.
//! 2. [`CornerStrategy::HoughLines`] intersects the outermost horizontal and
//!    vertical lines found in the edge map of the normalized luminance.
//!
//! The winning quad is ordered, optionally refined to sub-pixel accuracy and
//! checked against the image once more before it is returned.

use crate::config::ProcessingParameters;
use crate::detection::preprocessing;
use crate::error::{Result, TraceError};
use crate::geometry;
use crate::models::{CornerSet, Point2D};
use image::GrayImage;
use image::imageops::crop_imm;
use imageproc::gradients::{horizontal_sobel, vertical_sobel};
use imageproc::hough::{detect_lines, LineDetectionOptions, PolarLine};

/// Minimum share of the image the lightbox must cover
pub const MIN_AREA_RATIO: f64 = 0.10;
/// Beyond this the "lightbox" is just the frame itself
pub const MAX_AREA_RATIO: f64 = 0.97;

const MAX_APPROX_ATTEMPTS: usize = 10;
const INITIAL_EPSILON_FACTOR: f64 = 0.02;
const MIN_EPSILON_FACTOR: f64 = 0.005;

const SUBPIX_MAX_ITERATIONS: usize = 30;
const SUBPIX_EPSILON: f64 = 0.01;

/// A way of locating the four lightbox corners
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CornerStrategy {
    ContourPolygon,
    HoughLines,
}

impl CornerStrategy {
    /// Order in which strategies are attempted
    pub const FALLBACK_ORDER: [CornerStrategy; 2] =
        [CornerStrategy::ContourPolygon, CornerStrategy::HoughLines];

    pub fn name(&self) -> &'static str {
        match self {
            CornerStrategy::ContourPolygon => "contour polygon",
            CornerStrategy::HoughLines => "hough lines",
        }
    }

    /// Four unordered corner candidates, or `None` if this strategy failed
    pub fn detect(
        &self,
        mask: &GrayImage,
        normalized: &GrayImage,
        params: &ProcessingParameters,
    ) -> Option<[Point2D; 4]> {
        match self {
            CornerStrategy::ContourPolygon => contour_polygon_corners(mask, params),
            CornerStrategy::HoughLines => hough_line_corners(normalized, params),
        }
    }
}

/// Outcome of a successful corner search
#[derive(Debug, Clone, PartialEq)]
pub struct CornerDetection {
    pub corners: CornerSet,
    pub strategy: CornerStrategy,
    pub refined: bool,
}

/// Run every strategy in order; `NoBoundaryFound` once all are exhausted.
pub fn detect_corners(
    mask: &GrayImage,
    normalized: &GrayImage,
    params: &ProcessingParameters,
) -> Result<CornerDetection> {
    let (width, height) = mask.dimensions();

    for strategy in CornerStrategy::FALLBACK_ORDER {
        let Some(raw) = strategy.detect(mask, normalized, params) else {
            log::debug!("Corner strategy '{}' found no quadrilateral", strategy.name());
            continue;
        };
        let Some(mut corners) = order_corners(&raw) else {
            log::debug!("Corner strategy '{}' produced ambiguous corners", strategy.name());
            continue;
        };

        let mut refined = false;
        if params.enable_subpixel_refinement {
            let (result, count) = refine_corners(normalized, &corners, params.corner_win_size);
            corners = result;
            refined = count > 0;
            if count < 4 {
                log::warn!("Sub-pixel refinement kept {} of 4 corners unrefined", 4 - count);
            }
        }

        match validate_corners(&corners, width, height, params) {
            Ok(()) => {
                log::info!("Lightbox corners found with {} strategy", strategy.name());
                return Ok(CornerDetection {
                    corners,
                    strategy,
                    refined,
                });
            }
            Err(reason) => {
                log::debug!("Corner strategy '{}' rejected: {}", strategy.name(), reason);
            }
        }
    }

    Err(TraceError::NoBoundaryFound)
}

/// Simplify the largest mask boundary until exactly four vertices remain.
pub fn contour_polygon_corners(mask: &GrayImage, params: &ProcessingParameters) -> Option<[Point2D; 4]> {
    let contour = geometry::largest_external_contour(mask)?;
    let perimeter = contour.perimeter();
    if perimeter <= 0.0 {
        return None;
    }

    let mut factor = INITIAL_EPSILON_FACTOR;
    let mut quad = None;
    for attempt in 0..MAX_APPROX_ATTEMPTS {
        let approx = contour.simplify(factor * perimeter);
        log::debug!(
            "Boundary approximation attempt {}: epsilon factor {:.3} -> {} vertices",
            attempt + 1,
            factor,
            approx.len()
        );
        match approx.len() {
            4 => {
                quad = Some(approx);
                break;
            }
            n if n > 4 => factor += 0.01,
            _ => {
                factor -= 0.005;
                if factor <= MIN_EPSILON_FACTOR {
                    break;
                }
            }
        }
    }
    let quad = quad?;

    let image_area = mask.width() as f64 * mask.height() as f64;
    let area = contour.area();
    if area < MIN_AREA_RATIO * image_area {
        log::debug!("Boundary covers only {:.1}% of the image", 100.0 * area / image_area);
        return None;
    }

    let hull_area = contour.convex_hull().area();
    let solidity = if hull_area > 0.0 { area / hull_area } else { 0.0 };
    if solidity < params.min_solidity {
        log::debug!("Boundary solidity {:.2} below {:.2}", solidity, params.min_solidity);
        return None;
    }

    let points: [Point2D; 4] = [quad.points[0], quad.points[1], quad.points[2], quad.points[3]];
    let aspect = order_corners(&points)?.aspect_ratio();
    if aspect > params.max_aspect_ratio {
        log::debug!("Boundary aspect ratio {:.1} above {:.1}", aspect, params.max_aspect_ratio);
        return None;
    }

    Some(points)
}

/// Intersect the outermost near-horizontal and near-vertical Hough lines.
pub fn hough_line_corners(normalized: &GrayImage, params: &ProcessingParameters) -> Option<[Point2D; 4]> {
    let (width, height) = normalized.dimensions();
    let edges = preprocessing::detect_edges(
        normalized,
        params.canny_low,
        params.canny_high,
        params.canny_aperture,
    );

    let options = LineDetectionOptions {
        vote_threshold: (width.min(height) / 4).max(20),
        suppression_radius: 8,
    };
    let lines = detect_lines(&edges, options);

    let mut horizontal = Vec::new();
    let mut vertical = Vec::new();
    for line in &lines {
        let angle = line.angle_in_degrees;
        if angle <= 20 || angle >= 160 {
            vertical.push(*line);
        } else if (70..=110).contains(&angle) {
            horizontal.push(*line);
        }
    }
    log::debug!(
        "Hough: {} lines ({} horizontal, {} vertical)",
        lines.len(),
        horizontal.len(),
        vertical.len()
    );
    if horizontal.len() < 2 || vertical.len() < 2 {
        return None;
    }

    let cx = width as f64 / 2.0;
    let cy = height as f64 / 2.0;
    // Position of each line where it crosses the image's centre row/column
    let y_at_center = |l: &PolarLine| {
        let (s, c) = (l.angle_in_degrees as f64).to_radians().sin_cos();
        (l.r as f64 - cx * c) / s
    };
    let x_at_center = |l: &PolarLine| {
        let (s, c) = (l.angle_in_degrees as f64).to_radians().sin_cos();
        (l.r as f64 - cy * s) / c
    };

    let top = horizontal.iter().min_by(|a, b| y_at_center(*a).total_cmp(&y_at_center(*b)))?;
    let bottom = horizontal.iter().max_by(|a, b| y_at_center(*a).total_cmp(&y_at_center(*b)))?;
    let left = vertical.iter().min_by(|a, b| x_at_center(*a).total_cmp(&x_at_center(*b)))?;
    let right = vertical.iter().max_by(|a, b| x_at_center(*a).total_cmp(&x_at_center(*b)))?;

    Some([
        intersect(top, left)?,
        intersect(top, right)?,
        intersect(bottom, right)?,
        intersect(bottom, left)?,
    ])
}

/// Intersection of two polar lines; `None` for (near-)parallel lines
pub fn intersect(a: &PolarLine, b: &PolarLine) -> Option<Point2D> {
    let (s1, c1) = (a.angle_in_degrees as f64).to_radians().sin_cos();
    let (s2, c2) = (b.angle_in_degrees as f64).to_radians().sin_cos();
    let det = c1 * s2 - s1 * c2;
    if det.abs() < 1e-6 {
        return None;
    }
    let (r1, r2) = (a.r as f64, b.r as f64);
    Some(Point2D::new((r1 * s2 - s1 * r2) / det, (c1 * r2 - r1 * c2) / det))
}

/// Canonical TL, TR, BR, BL order from the coordinate sum and difference.
///
/// Returns `None` unless given four points whose extremes are four distinct
/// vertices.
pub fn order_corners(points: &[Point2D]) -> Option<CornerSet> {
    if points.len() != 4 {
        return None;
    }
    let by = |key: fn(&Point2D) -> f64, max: bool| -> usize {
        let mut best = 0;
        for i in 1..4 {
            let better = if max {
                key(&points[i]) > key(&points[best])
            } else {
                key(&points[i]) < key(&points[best])
            };
            if better {
                best = i;
            }
        }
        best
    };

    let tl = by(|p| p.x + p.y, false);
    let br = by(|p| p.x + p.y, true);
    let tr = by(|p| p.y - p.x, false);
    let bl = by(|p| p.y - p.x, true);

    let mut seen = [false; 4];
    for i in [tl, tr, br, bl] {
        if seen[i] {
            return None;
        }
        seen[i] = true;
    }

    Some(CornerSet::from_array([points[tl], points[tr], points[br], points[bl]]))
}

/// Refine every corner; returns the corners and how many were refined.
pub fn refine_corners(gray: &GrayImage, corners: &CornerSet, win: u32) -> (CornerSet, usize) {
    let mut refined = corners.to_array();
    let mut count = 0;
    for corner in refined.iter_mut() {
        if let Some(better) = refine_corner_subpixel(gray, *corner, win) {
            *corner = better;
            count += 1;
        }
    }
    (CornerSet::from_array(refined), count)
}

/// Iterative gradient-orthogonality refinement of a single corner.
///
/// Every pixel `p` near a true corner `q` either sits in a flat region
/// (zero gradient) or on an edge through `q` (gradient orthogonal to
/// `p - q`). Solving the weighted least-squares system
/// `sum(g g^T) q = sum(g g^T p)` over the window gives the next estimate.
///
/// Returns `None` when the window is flat or the estimate wanders off.
pub fn refine_corner_subpixel(gray: &GrayImage, corner: Point2D, win: u32) -> Option<Point2D> {
    let (width, height) = gray.dimensions();
    let win = win as i64;
    let margin = 2 * win + 2;

    let x0 = (corner.x.round() as i64 - margin).clamp(0, width as i64 - 1);
    let y0 = (corner.y.round() as i64 - margin).clamp(0, height as i64 - 1);
    let x1 = (corner.x.round() as i64 + margin + 1).clamp(0, width as i64);
    let y1 = (corner.y.round() as i64 + margin + 1).clamp(0, height as i64);
    if x1 - x0 < 3 || y1 - y0 < 3 {
        return None;
    }

    let patch = crop_imm(gray, x0 as u32, y0 as u32, (x1 - x0) as u32, (y1 - y0) as u32).to_image();
    let gx = horizontal_sobel(&patch);
    let gy = vertical_sobel(&patch);
    let (pw, ph) = (patch.width() as i64, patch.height() as i64);

    let start = Point2D::new(corner.x - x0 as f64, corner.y - y0 as f64);
    let mut current = start;
    let sigma = (win as f64).max(1.0);

    for _ in 0..SUBPIX_MAX_ITERATIONS {
        let (mut a11, mut a12, mut a22, mut b1, mut b2) = (0.0, 0.0, 0.0, 0.0, 0.0);
        let cx = current.x.round() as i64;
        let cy = current.y.round() as i64;
        for py in (cy - win).max(1)..=(cy + win).min(ph - 2) {
            for px in (cx - win).max(1)..=(cx + win).min(pw - 2) {
                let dx = px as f64 - current.x;
                let dy = py as f64 - current.y;
                let weight = (-(dx * dx + dy * dy) / (2.0 * sigma * sigma)).exp();
                let g_x = gx.get_pixel(px as u32, py as u32)[0] as f64;
                let g_y = gy.get_pixel(px as u32, py as u32)[0] as f64;
                let gxx = weight * g_x * g_x;
                let gxy = weight * g_x * g_y;
                let gyy = weight * g_y * g_y;
                a11 += gxx;
                a12 += gxy;
                a22 += gyy;
                b1 += gxx * px as f64 + gxy * py as f64;
                b2 += gxy * px as f64 + gyy * py as f64;
            }
        }

        let det = a11 * a22 - a12 * a12;
        if det.abs() < 1e-6 * (a11 + a22).max(1.0).powi(2) {
            return None;
        }
        let next = Point2D::new((a22 * b1 - a12 * b2) / det, (a11 * b2 - a12 * b1) / det);
        let shift = next.distance(&current);
        current = next;
        if shift < SUBPIX_EPSILON {
            break;
        }
        if current.distance(&start) > win as f64 {
            return None;
        }
    }

    if current.distance(&start) > win as f64 {
        return None;
    }
    let refined = Point2D::new(current.x + x0 as f64, current.y + y0 as f64);
    if refined.x < 0.0 || refined.y < 0.0 || refined.x > (width - 1) as f64 || refined.y > (height - 1) as f64 {
        return None;
    }
    Some(refined)
}

/// Last line of defence before the corners drive the warp
pub fn validate_corners(
    corners: &CornerSet,
    width: u32,
    height: u32,
    params: &ProcessingParameters,
) -> std::result::Result<(), String> {
    let max_x = width as f64 - 0.5;
    let max_y = height as f64 - 0.5;
    for p in corners.to_array() {
        if p.x < -0.5 || p.y < -0.5 || p.x > max_x || p.y > max_y {
            return Err(format!("corner ({:.1}, {:.1}) outside the image", p.x, p.y));
        }
    }

    let image_area = width as f64 * height as f64;
    let ratio = corners.area() / image_area;
    if ratio < MIN_AREA_RATIO {
        return Err(format!("quad covers {:.1}% of the image", ratio * 100.0));
    }
    if ratio > MAX_AREA_RATIO {
        return Err(format!("quad covers {:.1}% of the image (frame, not lightbox)", ratio * 100.0));
    }

    let aspect = corners.aspect_ratio();
    if aspect > params.max_aspect_ratio {
        return Err(format!("aspect ratio {:.1} above {:.1}", aspect, params.max_aspect_ratio));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn intersect_axis_lines() {
        let vertical = PolarLine { r: 10.0, angle_in_degrees: 0 };
        let horizontal = PolarLine { r: 20.0, angle_in_degrees: 90 };
        let p = intersect(&vertical, &horizontal).unwrap();
        assert!((p.x - 10.0).abs() < 1e-6);
        assert!((p.y - 20.0).abs() < 1e-6);
    }

    #[test]
    fn parallel_lines_do_not_intersect() {
        let a = PolarLine { r: 10.0, angle_in_degrees: 90 };
        let b = PolarLine { r: 50.0, angle_in_degrees: 90 };
        assert!(intersect(&a, &b).is_none());
    }

    #[test]
    fn degenerate_input_is_not_ordered() {
        let p = Point2D::new(1.0, 1.0);
        assert!(order_corners(&[p, p, p, p]).is_none());
        assert!(order_corners(&[p, p, p]).is_none());
    }

    #[test]
    fn subpixel_refinement_converges_to_a_step_corner() {
        let gray = GrayImage::from_fn(80, 80, |x, y| {
            Luma([if x >= 30 && y >= 30 { 255 } else { 0 }])
        });
        let refined = refine_corner_subpixel(&gray, Point2D::new(32.0, 33.0), 5).unwrap();
        assert!((refined.x - 29.5).abs() < 1.0, "x = {}", refined.x);
        assert!((refined.y - 29.5).abs() < 1.0, "y = {}", refined.y);
    }

    #[test]
    fn flat_window_is_not_refined() {
        let gray = GrayImage::from_pixel(50, 50, Luma([128]));
        assert!(refine_corner_subpixel(&gray, Point2D::new(25.0, 25.0), 5).is_none());
    }

    #[test]
    fn frame_sized_quad_is_rejected() {
        let corners = CornerSet::from_array([
            Point2D::new(0.0, 0.0),
            Point2D::new(199.0, 0.0),
            Point2D::new(199.0, 199.0),
            Point2D::new(0.0, 199.0),
        ]);
        assert!(validate_corners(&corners, 200, 200, &ProcessingParameters::default()).is_err());
    }
}
