use crate::config::ProcessingParameters;
use crate::detection::preprocessing::{self, LabPlanes, Polarity};
use image::{DynamicImage, GrayImage, Luma};

/// Bright, achromatic pixels: lightbox candidates under good lighting
pub fn neutral_bright_mask(lab: &LabPlanes, params: &ProcessingParameters) -> GrayImage {
    GrayImage::from_fn(lab.l.width(), lab.l.height(), |x, y| {
        let l = lab.l.get_pixel(x, y)[0];
        let a = lab.a.get_pixel(x, y)[0];
        let b = lab.b.get_pixel(x, y)[0];
        let on = l > params.lab_l_threshold
            && (params.lab_a_min..=params.lab_a_max).contains(&a)
            && (params.lab_b_min..=params.lab_b_max).contains(&b);
        Luma([if on { 255 } else { 0 }])
    })
}

/// Locally bright pixels in the normalized luminance, restricted to pixels
/// that are not truly dark in the raw luminance.
pub fn shadow_recovery_mask(
    normalized: &GrayImage,
    raw_luminance: &GrayImage,
    params: &ProcessingParameters,
) -> GrayImage {
    let mut mask = preprocessing::adaptive_threshold(
        normalized,
        params.adaptive_block_radius,
        params.adaptive_c,
        Polarity::Bright,
    );
    for (x, y, px) in mask.enumerate_pixels_mut() {
        if raw_luminance.get_pixel(x, y)[0] < params.adaptive_min_luminance {
            px[0] = 0;
        }
    }
    mask
}

/// Binary mask of the lightbox region. Never fails; a scene without a
/// lightbox just produces an empty or noisy mask.
pub fn build_paper_mask(
    img: &DynamicImage,
    normalized: &GrayImage,
    params: &ProcessingParameters,
) -> GrayImage {
    let lab = preprocessing::to_lab(img);
    let mut mask = neutral_bright_mask(&lab, params);
    let recovered = shadow_recovery_mask(normalized, &lab.l, params);

    let mut added = 0usize;
    for (dst, src) in mask.pixels_mut().zip(recovered.pixels()) {
        if src[0] > 0 && dst[0] == 0 {
            dst[0] = 255;
            added += 1;
        }
    }
    log::debug!("Paper mask: adaptive pass recovered {} pixels", added);

    mask
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn colored_paper_is_rejected() {
        let img = RgbImage::from_fn(120, 120, |x, _| {
            if x < 60 { Rgb([250, 250, 250]) } else { Rgb([250, 180, 40]) }
        });
        let img = DynamicImage::ImageRgb8(img);
        let lab = preprocessing::to_lab(&img);
        let mask = neutral_bright_mask(&lab, &ProcessingParameters::default());
        assert_eq!(mask.get_pixel(10, 50)[0], 255);
        assert_eq!(mask.get_pixel(100, 50)[0], 0);
    }

    #[test]
    fn dark_background_is_never_recovered() {
        let img = RgbImage::from_fn(150, 150, |x, y| {
            if (30..120).contains(&x) && (30..120).contains(&y) {
                Rgb([255, 255, 255])
            } else {
                Rgb([12, 12, 12])
            }
        });
        let img = DynamicImage::ImageRgb8(img);
        let params = ProcessingParameters::default();
        let normalized = preprocessing::normalize_for_boundary(&img.to_luma8(), 2.0, 8);
        let mask = build_paper_mask(&img, &normalized, &params);
        assert_eq!(mask.get_pixel(5, 5)[0], 0);
        assert_eq!(mask.get_pixel(75, 75)[0], 255);
    }
}
