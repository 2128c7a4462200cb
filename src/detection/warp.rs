use crate::error::{Result, TraceError};
use crate::models::{CornerSet, PixelScale, Point2D};
use image::{DynamicImage, Rgb, RgbImage};
use imageproc::geometric_transformations::{warp_into, Interpolation, Projection};

/// Rectified lightbox image together with its physical scale
pub struct Rectified {
    pub image: RgbImage,
    pub scale: PixelScale,
}

/// Map the lightbox quad onto a `target_width` x `target_height` rectangle.
pub fn warp_to_rectangle(
    img: &DynamicImage,
    corners: &[Point2D],
    target_width: u32,
    target_height: u32,
    physical_width_mm: f64,
    physical_height_mm: f64,
) -> Result<Rectified> {
    if corners.len() != 4 {
        return Err(TraceError::invalid(format!(
            "perspective warp needs exactly 4 corners, got {}",
            corners.len()
        )));
    }
    if target_width == 0 || target_height == 0 {
        return Err(TraceError::invalid("target size must be positive"));
    }
    if !(physical_width_mm > 0.0 && physical_height_mm > 0.0) {
        return Err(TraceError::invalid("physical lightbox size must be positive"));
    }

    let w = (target_width - 1) as f32;
    let h = (target_height - 1) as f32;
    let from = [
        (corners[0].x as f32, corners[0].y as f32),
        (corners[1].x as f32, corners[1].y as f32),
        (corners[2].x as f32, corners[2].y as f32),
        (corners[3].x as f32, corners[3].y as f32),
    ];
    let to = [(0.0, 0.0), (w, 0.0), (w, h), (0.0, h)];

    let projection = Projection::from_control_points(from, to).ok_or(TraceError::NoBoundaryFound)?;

    let source = img.to_rgb8();
    let mut rectified = RgbImage::new(target_width, target_height);
    warp_into(
        &source,
        &projection,
        Interpolation::Bilinear,
        Rgb([255, 255, 255]),
        &mut rectified,
    );

    let scale = PixelScale::from_dimensions(
        target_width,
        target_height,
        physical_width_mm,
        physical_height_mm,
    );
    log::debug!(
        "Rectified to {}x{} px, {:.3} x {:.3} px/mm",
        target_width,
        target_height,
        scale.x,
        scale.y
    );

    Ok(Rectified {
        image: rectified,
        scale,
    })
}

/// Warp using an ordered corner set
pub fn warp_lightbox(
    img: &DynamicImage,
    corners: &CornerSet,
    target_width: u32,
    target_height: u32,
    physical_width_mm: f64,
    physical_height_mm: f64,
) -> Result<Rectified> {
    warp_to_rectangle(
        img,
        &corners.to_array(),
        target_width,
        target_height,
        physical_width_mm,
        physical_height_mm,
    )
}
