use crate::geometry;
use imageproc::point::Point;
use serde::{Deserialize, Serialize};

/// A point in pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point2D {
    pub x: f64,
    pub y: f64,
}

impl Point2D {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point2D) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    pub fn translate(&self, dx: f64, dy: f64) -> Point2D {
        Point2D::new(self.x + dx, self.y + dy)
    }

    /// Nearest integer pixel, as used by imageproc drawing routines
    pub fn to_pixel(&self) -> Point<i32> {
        Point::new(self.x.round() as i32, self.y.round() as i32)
    }
}

impl From<Point<i32>> for Point2D {
    fn from(p: Point<i32>) -> Self {
        Point2D::new(p.x as f64, p.y as f64)
    }
}

/// Axis-aligned bounds of a point set
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Bounds {
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }
}

/// Closed polygon in pixel space. The last vertex connects back to the first.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Polygon {
    pub points: Vec<Point2D>,
}

impl Polygon {
    pub fn new(points: Vec<Point2D>) -> Self {
        Self { points }
    }

    pub fn empty() -> Self {
        Self { points: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// At least three vertices
    pub fn is_valid(&self) -> bool {
        self.points.len() >= 3
    }

    pub fn area(&self) -> f64 {
        geometry::signed_area(&self.points).abs()
    }

    pub fn perimeter(&self) -> f64 {
        geometry::closed_perimeter(&self.points)
    }

    pub fn centroid(&self) -> Option<Point2D> {
        geometry::centroid(&self.points)
    }

    pub fn bounds(&self) -> Option<Bounds> {
        geometry::bounds(&self.points)
    }

    /// Distance between the last and first vertex
    pub fn closure_gap(&self) -> f64 {
        match (self.points.first(), self.points.last()) {
            (Some(first), Some(last)) => first.distance(last),
            _ => 0.0,
        }
    }

    pub fn simplify(&self, epsilon: f64) -> Polygon {
        Polygon::new(geometry::simplify_closed(&self.points, epsilon))
    }

    pub fn convex_hull(&self) -> Polygon {
        Polygon::new(geometry::convex_hull(&self.points))
    }

    pub fn translate(&self, dx: f64, dy: f64) -> Polygon {
        Polygon::new(self.points.iter().map(|p| p.translate(dx, dy)).collect())
    }
}

/// The four lightbox corners, always in top-left, top-right, bottom-right,
/// bottom-left order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CornerSet {
    pub top_left: Point2D,
    pub top_right: Point2D,
    pub bottom_right: Point2D,
    pub bottom_left: Point2D,
}

impl CornerSet {
    pub fn to_array(&self) -> [Point2D; 4] {
        [self.top_left, self.top_right, self.bottom_right, self.bottom_left]
    }

    pub fn from_array(points: [Point2D; 4]) -> Self {
        Self {
            top_left: points[0],
            top_right: points[1],
            bottom_right: points[2],
            bottom_left: points[3],
        }
    }

    pub fn to_polygon(&self) -> Polygon {
        Polygon::new(self.to_array().to_vec())
    }

    pub fn area(&self) -> f64 {
        geometry::signed_area(&self.to_array()).abs()
    }

    /// Long side over short side, averaging opposite edges
    pub fn aspect_ratio(&self) -> f64 {
        let width = (self.top_left.distance(&self.top_right)
            + self.bottom_left.distance(&self.bottom_right))
            / 2.0;
        let height = (self.top_left.distance(&self.bottom_left)
            + self.top_right.distance(&self.bottom_right))
            / 2.0;
        let short = width.min(height);
        if short <= f64::EPSILON {
            return f64::INFINITY;
        }
        width.max(height) / short
    }
}

/// Pixels per millimeter along each axis of the rectified image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PixelScale {
    pub x: f64,
    pub y: f64,
}

impl PixelScale {
    pub fn from_dimensions(width_px: u32, height_px: u32, width_mm: f64, height_mm: f64) -> Self {
        Self {
            x: width_px as f64 / width_mm,
            y: height_px as f64 / height_mm,
        }
    }

    /// Scalar scale for isotropic conversions
    pub fn average(&self) -> f64 {
        (self.x + self.y) / 2.0
    }

    pub fn mm_to_px(&self, mm: f64) -> f64 {
        mm * self.average()
    }
}

/// Checkpoints of the tracing pipeline, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PipelineStage {
    Loaded,
    LightboxCropped,
    Normalized,
    BoundaryDetected,
    ObjectDetected,
    Smoothed,
    Dilated,
    Final,
}

impl PipelineStage {
    pub const COUNT: usize = 8;

    pub fn all() -> [PipelineStage; Self::COUNT] {
        use PipelineStage::*;
        [Loaded, LightboxCropped, Normalized, BoundaryDetected, ObjectDetected, Smoothed, Dilated, Final]
    }

    pub fn ordinal(&self) -> usize {
        *self as usize
    }

    pub fn from_ordinal(ordinal: usize) -> Option<PipelineStage> {
        Self::all().get(ordinal).copied()
    }

    pub fn name(&self) -> &'static str {
        match self {
            PipelineStage::Loaded => "Loaded",
            PipelineStage::LightboxCropped => "Lightbox Cropped",
            PipelineStage::Normalized => "Normalized",
            PipelineStage::BoundaryDetected => "Boundary Detected",
            PipelineStage::ObjectDetected => "Object Detected",
            PipelineStage::Smoothed => "Smoothed",
            PipelineStage::Dilated => "Dilated",
            PipelineStage::Final => "Final",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            PipelineStage::Loaded => "Image loaded and converted to grayscale",
            PipelineStage::LightboxCropped => "Perspective corrected to the lightbox area",
            PipelineStage::Normalized => "Lighting normalized with local contrast enhancement",
            PipelineStage::BoundaryDetected => "Object region separated from the lightbox",
            PipelineStage::ObjectDetected => "Object contour found in the rectified image",
            PipelineStage::Smoothed => "Contour after optional smoothing",
            PipelineStage::Dilated => "Contour after optional tolerance dilation",
            PipelineStage::Final => "Final validated contour",
        }
    }

    /// Parse a stage from its ordinal or a loose form of its name
    /// ("object-detected", "ObjectDetected", "4").
    pub fn parse(value: &str) -> Option<PipelineStage> {
        if let Ok(ordinal) = value.trim().parse::<usize>() {
            return Self::from_ordinal(ordinal);
        }
        let wanted: String = value
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_lowercase())
            .collect();
        Self::all().into_iter().find(|stage| {
            let name: String = stage
                .name()
                .chars()
                .filter(|c| c.is_ascii_alphanumeric())
                .map(|c| c.to_ascii_lowercase())
                .collect();
            name == wanted
        })
    }
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_ordinals_round_trip() {
        for (i, stage) in PipelineStage::all().iter().enumerate() {
            assert_eq!(stage.ordinal(), i);
            assert_eq!(PipelineStage::from_ordinal(i), Some(*stage));
        }
        assert_eq!(PipelineStage::from_ordinal(8), None);
    }

    #[test]
    fn stage_parse_accepts_names_and_ordinals() {
        assert_eq!(PipelineStage::parse("object-detected"), Some(PipelineStage::ObjectDetected));
        assert_eq!(PipelineStage::parse("LightboxCropped"), Some(PipelineStage::LightboxCropped));
        assert_eq!(PipelineStage::parse("7"), Some(PipelineStage::Final));
        assert_eq!(PipelineStage::parse("bogus"), None);
    }

    #[test]
    fn scale_is_per_axis() {
        let scale = PixelScale::from_dimensions(3240, 1620, 162.0, 162.0);
        assert_eq!(scale.x, 20.0);
        assert_eq!(scale.y, 10.0);
        assert_eq!(scale.average(), 15.0);
        assert_eq!(scale.mm_to_px(2.0), 30.0);
    }

    #[test]
    fn corner_aspect_ratio() {
        let corners = CornerSet::from_array([
            Point2D::new(0.0, 0.0),
            Point2D::new(200.0, 0.0),
            Point2D::new(200.0, 100.0),
            Point2D::new(0.0, 100.0),
        ]);
        assert_eq!(corners.aspect_ratio(), 2.0);
        assert_eq!(corners.area(), 20000.0);
    }
}
