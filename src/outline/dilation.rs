use crate::detection::morphology::dilate_disc;
use crate::models::{PixelScale, Polygon};

/// Grow the outline uniformly by `amount_mm` (manufacturing tolerance).
///
/// A no-op for non-positive amounts. If the dilated mask yields no usable
/// boundary the original outline is returned unchanged.
pub fn dilate_polygon(polygon: &Polygon, amount_mm: f64, scale: &PixelScale) -> Polygon {
    if amount_mm <= 0.0 {
        return polygon.clone();
    }

    let radius = scale.mm_to_px(amount_mm).round().max(1.0);
    let pad = radius as u32 + 2;

    match super::retrace(polygon, pad, |mask| dilate_disc(mask, radius)) {
        Some(dilated) => {
            log::info!(
                "Dilated contour by {:.2} mm ({:.0} px): {} -> {} vertices",
                amount_mm,
                radius,
                polygon.len(),
                dilated.len()
            );
            dilated
        }
        None => {
            log::warn!("Dilation produced no contour, keeping the original outline");
            polygon.clone()
        }
    }
}
