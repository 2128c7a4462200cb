use crate::config::SmoothingMode;
use crate::detection::morphology::{close_disc, open_disc};
use crate::models::{PixelScale, Point2D, Polygon};

/// Vertices with an interior angle at or above this are left alone
const SHARP_ANGLE_DEG: f64 = 150.0;
const MAX_WINDOW: usize = 5;

/// Smooth the outline by `amount_mm`, falling back to the input if the
/// chosen algorithm degenerates.
pub fn smooth_polygon(
    polygon: &Polygon,
    amount_mm: f64,
    mode: SmoothingMode,
    scale: &PixelScale,
) -> Polygon {
    let amount_px = scale.mm_to_px(amount_mm);
    let smoothed = match mode {
        SmoothingMode::CurvatureBased => Some(smooth_curvature(polygon, amount_px)),
        SmoothingMode::Morphological => smooth_morphological(polygon, amount_px),
    };

    match smoothed {
        Some(result) if result.is_valid() => {
            log::info!(
                "Smoothed contour ({:?}, {:.2} mm = {:.1} px): {} -> {} vertices",
                mode,
                amount_mm,
                amount_px,
                polygon.len(),
                result.len()
            );
            result
        }
        _ => {
            log::warn!("Smoothing degenerated the contour, keeping the original outline");
            polygon.clone()
        }
    }
}

/// Interior angle at `p`, in degrees (180 for a straight run)
pub fn vertex_angle(prev: &Point2D, p: &Point2D, next: &Point2D) -> f64 {
    let (ax, ay) = (prev.x - p.x, prev.y - p.y);
    let (bx, by) = (next.x - p.x, next.y - p.y);
    let la = ax.hypot(ay);
    let lb = bx.hypot(by);
    if la < 1e-9 || lb < 1e-9 {
        return 180.0;
    }
    ((ax * bx + ay * by) / (la * lb)).clamp(-1.0, 1.0).acos().to_degrees()
}

/// Curvature-aware smoothing.
///
/// Simplify at a tolerance proportional to the amount, pull each sharp
/// vertex towards a distance-weighted average of its neighbours (sharper
/// vertices are pulled harder), then simplify gently once more.
pub fn smooth_curvature(polygon: &Polygon, amount_px: f64) -> Polygon {
    let tolerance = (0.3 * amount_px).max(0.5);
    let simplified = polygon.simplify(tolerance);
    let points = &simplified.points;
    let n = points.len();
    if n < 3 {
        return simplified;
    }

    let mean_edge = simplified.perimeter() / n as f64;
    let window = if mean_edge > 0.0 {
        ((amount_px / mean_edge).round() as usize).clamp(1, MAX_WINDOW)
    } else {
        1
    };
    let window = window.min((n - 1) / 2).max(1);

    let mut smoothed = points.clone();
    let mut moved = 0;
    for i in 0..n {
        let p = points[i];
        let prev = points[(i + n - 1) % n];
        let next = points[(i + 1) % n];
        let angle = vertex_angle(&prev, &p, &next);
        if angle >= SHARP_ANGLE_DEG {
            continue;
        }

        let sharpness = (SHARP_ANGLE_DEG - angle) / SHARP_ANGLE_DEG;
        let blend = sharpness * sharpness;

        let (mut sx, mut sy, mut total) = (p.x, p.y, 1.0);
        for k in 1..=window {
            for q in [points[(i + k) % n], points[(i + n - k) % n]] {
                let w = 1.0 / (1.0 + p.distance(&q));
                sx += w * q.x;
                sy += w * q.y;
                total += w;
            }
        }
        let avg = Point2D::new(sx / total, sy / total);
        smoothed[i] = Point2D::new(
            p.x * (1.0 - blend) + avg.x * blend,
            p.y * (1.0 - blend) + avg.y * blend,
        );
        moved += 1;
    }
    log::debug!("Curvature smoothing moved {} of {} vertices (window {})", moved, n, window);

    Polygon::new(smoothed).simplify(tolerance * 0.5)
}

/// Legacy smoothing: close then open the rasterized outline.
pub fn smooth_morphological(polygon: &Polygon, amount_px: f64) -> Option<Polygon> {
    let radius = amount_px.round().max(1.0);
    let pad = radius as u32 + 2;
    super::retrace(polygon, pad, |mask| open_disc(&close_disc(mask, radius), radius))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn straight_run_has_180_degree_angle() {
        let a = Point2D::new(0.0, 0.0);
        let b = Point2D::new(5.0, 0.0);
        let c = Point2D::new(10.0, 0.0);
        assert!((vertex_angle(&a, &b, &c) - 180.0).abs() < 1e-9);
        let d = Point2D::new(5.0, 5.0);
        assert!((vertex_angle(&a, &b, &d) - 90.0).abs() < 1e-9);
    }

    #[test]
    fn morphological_radius_beyond_u8_range_rounds_corners() {
        let square = Polygon::new(vec![
            Point2D::new(0.0, 0.0),
            Point2D::new(700.0, 0.0),
            Point2D::new(700.0, 700.0),
            Point2D::new(0.0, 700.0),
        ]);
        let smoothed = smooth_morphological(&square, 260.0).unwrap();
        // Opening cuts (4 - pi) r^2 off the corners
        let expected = square.area() - (4.0 - std::f64::consts::PI) * 260.0 * 260.0;
        let error = (smoothed.area() - expected).abs() / expected;
        assert!(error < 0.02, "area {} vs expected {}", smoothed.area(), expected);
    }
}
