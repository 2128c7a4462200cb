//! Post-processing of the traced object outline: smoothing for printability,
//! tolerance dilation, and final validation.

pub mod dilation;
pub mod smoothing;
pub mod validation;

pub use dilation::dilate_polygon;
pub use smoothing::smooth_polygon;
pub use validation::{validate_contour, ValidationReport};

use crate::geometry;
use crate::models::Polygon;
use image::GrayImage;

/// Tolerance used when re-tracing a rasterized outline; removes staircase
/// vertices without moving the boundary.
const RETRACE_EPSILON_PX: f64 = 0.5;

/// Rasterize `polygon` with `pad` pixels of margin, apply `op` to the mask
/// and trace the largest resulting boundary back into the original frame.
pub(crate) fn retrace<F>(polygon: &Polygon, pad: u32, op: F) -> Option<Polygon>
where
    F: FnOnce(&GrayImage) -> GrayImage,
{
    let bounds = polygon.bounds()?;
    let pad_f = pad as f64;
    let width = bounds.width().ceil() as u32 + 2 * pad + 1;
    let height = bounds.height().ceil() as u32 + 2 * pad + 1;
    let offset = (pad_f - bounds.min_x.floor(), pad_f - bounds.min_y.floor());

    let mask = geometry::rasterize(polygon, width, height, offset);
    let processed = op(&mask);
    let traced = geometry::largest_external_contour(&processed)?;
    let result = traced
        .simplify(RETRACE_EPSILON_PX)
        .translate(-offset.0, -offset.1);
    result.is_valid().then_some(result)
}
