use image::{DynamicImage, ImageBuffer, Rgb, RgbImage};
use lightbox_trace::ProcessingParameters;
use tempfile::NamedTempFile;

pub const CANVAS: u32 = 1000;
/// Lightbox square spans `LIGHTBOX_MIN..LIGHTBOX_MAX` on both axes
pub const LIGHTBOX_MIN: u32 = 100;
pub const LIGHTBOX_MAX: u32 = 900;
/// Dark object square, centred on the lightbox
pub const OBJECT_MIN: u32 = 400;
pub const OBJECT_MAX: u32 = 600;

const BACKGROUND: Rgb<u8> = Rgb([20, 20, 20]);
const LIGHTBOX: Rgb<u8> = Rgb([245, 245, 245]);
const OBJECT: Rgb<u8> = Rgb([40, 40, 40]);

/// Dark canvas with a bright lightbox and a dark square object on it
pub fn synthetic_lightbox() -> RgbImage {
    let lightbox = LIGHTBOX_MIN..LIGHTBOX_MAX;
    let object = OBJECT_MIN..OBJECT_MAX;
    ImageBuffer::from_fn(CANVAS, CANVAS, |x, y| {
        if object.contains(&x) && object.contains(&y) {
            OBJECT
        } else if lightbox.contains(&x) && lightbox.contains(&y) {
            LIGHTBOX
        } else {
            BACKGROUND
        }
    })
}

pub fn synthetic_lightbox_image() -> DynamicImage {
    DynamicImage::ImageRgb8(synthetic_lightbox())
}

pub fn uniform_image(value: u8) -> DynamicImage {
    DynamicImage::ImageRgb8(ImageBuffer::from_fn(400, 400, |_, _| Rgb([value, value, value])))
}

/// Parameters sized for the synthetic fixture: a 1000 px square frame over
/// 160 mm of lightbox
pub fn test_params() -> ProcessingParameters {
    ProcessingParameters {
        target_width_px: 1000,
        target_height_px: 1000,
        physical_width_mm: 160.0,
        physical_height_mm: 160.0,
        ..ProcessingParameters::default()
    }
}

/// Saves the synthetic lightbox as a PNG temp file
pub fn create_test_image() -> NamedTempFile {
    let file = tempfile::Builder::new()
        .suffix(".png")
        .tempfile()
        .expect("Failed to create temp image file");
    synthetic_lightbox()
        .save_with_format(file.path(), image::ImageFormat::Png)
        .expect("Failed to save test image");
    file
}
