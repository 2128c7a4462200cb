//! Polygon math on `f64` pixel coordinates and the raster/contour bridge.
//!
//! Contours come out of `imageproc::contours::find_contours` as integer
//! boundary pixels; everything downstream (simplification, smoothing,
//! warping, export) works on [`Point2D`] so sub-pixel positions survive.

use crate::models::{Bounds, Point2D, Polygon};
use image::{GrayImage, Luma};
use imageproc::contours::{find_contours, BorderType};
use imageproc::drawing::draw_polygon_mut;
use imageproc::point::Point;

/// Shoelace area, positive for clockwise winding in image coordinates
pub fn signed_area(points: &[Point2D]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let mut sum = 0.0;
    for (i, p) in points.iter().enumerate() {
        let q = &points[(i + 1) % points.len()];
        sum += p.x * q.y - q.x * p.y;
    }
    sum / 2.0
}

pub fn closed_perimeter(points: &[Point2D]) -> f64 {
    if points.len() < 2 {
        return 0.0;
    }
    points
        .iter()
        .enumerate()
        .map(|(i, p)| p.distance(&points[(i + 1) % points.len()]))
        .sum()
}

/// Area centroid; falls back to the vertex mean for degenerate polygons
pub fn centroid(points: &[Point2D]) -> Option<Point2D> {
    if points.is_empty() {
        return None;
    }
    let area = signed_area(points);
    if area.abs() < 1e-9 {
        let n = points.len() as f64;
        let (sx, sy) = points.iter().fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
        return Some(Point2D::new(sx / n, sy / n));
    }
    let mut cx = 0.0;
    let mut cy = 0.0;
    for (i, p) in points.iter().enumerate() {
        let q = &points[(i + 1) % points.len()];
        let cross = p.x * q.y - q.x * p.y;
        cx += (p.x + q.x) * cross;
        cy += (p.y + q.y) * cross;
    }
    Some(Point2D::new(cx / (6.0 * area), cy / (6.0 * area)))
}

pub fn bounds(points: &[Point2D]) -> Option<Bounds> {
    let first = points.first()?;
    let mut b = Bounds {
        min_x: first.x,
        min_y: first.y,
        max_x: first.x,
        max_y: first.y,
    };
    for p in &points[1..] {
        b.min_x = b.min_x.min(p.x);
        b.min_y = b.min_y.min(p.y);
        b.max_x = b.max_x.max(p.x);
        b.max_y = b.max_y.max(p.y);
    }
    Some(b)
}

/// Distance from `p` to the segment `a`-`b`
pub fn segment_distance(p: &Point2D, a: &Point2D, b: &Point2D) -> f64 {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    let len_sq = dx * dx + dy * dy;
    if len_sq < 1e-12 {
        return p.distance(a);
    }
    let t = (((p.x - a.x) * dx + (p.y - a.y) * dy) / len_sq).clamp(0.0, 1.0);
    p.distance(&Point2D::new(a.x + t * dx, a.y + t * dy))
}

/// Douglas-Peucker simplification of a closed ring.
///
/// The ring is split at vertex 0 and the vertex farthest from it; both
/// halves are reduced independently. Both split vertices always survive, so
/// simplifying the output again with the same `epsilon` returns it unchanged.
pub fn simplify_closed(points: &[Point2D], epsilon: f64) -> Vec<Point2D> {
    let n = points.len();
    if n < 4 || epsilon <= 0.0 {
        return points.to_vec();
    }

    let origin = points[0];
    let mut far = 0;
    let mut far_dist = 0.0;
    for (i, p) in points.iter().enumerate().skip(1) {
        let d = origin.distance(p);
        if d > far_dist {
            far_dist = d;
            far = i;
        }
    }
    if far == 0 {
        return vec![origin];
    }

    let mut keep = vec![false; n];
    keep[0] = true;
    keep[far] = true;

    let first_half: Vec<usize> = (0..=far).collect();
    let second_half: Vec<usize> = (far..n).chain(std::iter::once(0)).collect();
    mark_chain(points, &first_half, epsilon, &mut keep);
    mark_chain(points, &second_half, epsilon, &mut keep);

    points
        .iter()
        .zip(keep)
        .filter_map(|(p, k)| k.then_some(*p))
        .collect()
}

fn mark_chain(points: &[Point2D], chain: &[usize], epsilon: f64, keep: &mut [bool]) {
    if chain.len() < 3 {
        return;
    }
    let mut stack = vec![(0usize, chain.len() - 1)];
    while let Some((start, end)) = stack.pop() {
        if end <= start + 1 {
            continue;
        }
        let a = &points[chain[start]];
        let b = &points[chain[end]];
        let mut max_dist = 0.0;
        let mut index = start;
        for (offset, &i) in chain[start + 1..end].iter().enumerate() {
            let d = segment_distance(&points[i], a, b);
            if d > max_dist {
                max_dist = d;
                index = start + 1 + offset;
            }
        }
        if max_dist > epsilon {
            keep[chain[index]] = true;
            stack.push((start, index));
            stack.push((index, end));
        }
    }
}

/// Convex hull (Andrew's monotone chain), collinear points dropped
pub fn convex_hull(points: &[Point2D]) -> Vec<Point2D> {
    let mut sorted = points.to_vec();
    sorted.sort_by(|a, b| a.x.total_cmp(&b.x).then(a.y.total_cmp(&b.y)));
    sorted.dedup();
    if sorted.len() < 3 {
        return sorted;
    }

    fn cross(o: &Point2D, a: &Point2D, b: &Point2D) -> f64 {
        (a.x - o.x) * (b.y - o.y) - (a.y - o.y) * (b.x - o.x)
    }

    let mut lower: Vec<Point2D> = Vec::new();
    for p in &sorted {
        while lower.len() >= 2 && cross(&lower[lower.len() - 2], &lower[lower.len() - 1], p) <= 0.0 {
            lower.pop();
        }
        lower.push(*p);
    }
    let mut upper: Vec<Point2D> = Vec::new();
    for p in sorted.iter().rev() {
        while upper.len() >= 2 && cross(&upper[upper.len() - 2], &upper[upper.len() - 1], p) <= 0.0 {
            upper.pop();
        }
        upper.push(*p);
    }
    lower.pop();
    upper.pop();
    lower.extend(upper);
    lower
}

/// Fill `polygon` (shifted by `offset`) into a fresh `width`x`height` mask
pub fn rasterize(polygon: &Polygon, width: u32, height: u32, offset: (f64, f64)) -> GrayImage {
    let mut mask = GrayImage::new(width, height);
    let mut pixels: Vec<Point<i32>> = polygon
        .points
        .iter()
        .map(|p| p.translate(offset.0, offset.1).to_pixel())
        .collect();
    pixels.dedup();
    // draw_polygon_mut rejects an explicitly closed ring
    while pixels.len() > 1 && pixels.first() == pixels.last() {
        pixels.pop();
    }
    if pixels.len() < 3 {
        return mask;
    }
    draw_polygon_mut(&mut mask, &pixels, Luma([255u8]));
    mask
}

/// Outer borders of top-level foreground regions
pub fn external_contours(mask: &GrayImage) -> Vec<Polygon> {
    find_contours::<i32>(mask)
        .into_iter()
        .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
        .map(|c| Polygon::new(c.points.into_iter().map(Point2D::from).collect()))
        .collect()
}

/// The external contour enclosing the most area
pub fn largest_external_contour(mask: &GrayImage) -> Option<Polygon> {
    external_contours(mask)
        .into_iter()
        .max_by(|a, b| a.area().total_cmp(&b.area()).then(a.len().cmp(&b.len())))
}
