use crate::error::{Result, TraceError, MIN_IMAGE_SIZE};
use image::imageops::{resize, FilterType};
use image::{DynamicImage, GrayImage, ImageReader, Luma};
use imageproc::edges::canny;
use imageproc::filter::{box_filter, gaussian_blur_f32};
use std::path::Path;

/// Load and decode an image file, rejecting anything below the minimum size.
pub fn load_image(path: &Path) -> Result<DynamicImage> {
    if path.as_os_str().is_empty() {
        return Err(TraceError::invalid("image path is empty"));
    }

    let img = ImageReader::open(path)
        .and_then(|reader| reader.with_guessed_format())
        .map_err(|e| TraceError::ImageLoad(format!("{}: {e}", path.display())))?
        .decode()
        .map_err(|e| TraceError::ImageLoad(format!("{}: {e}", path.display())))?;

    check_image_size(&img)?;
    Ok(img)
}

pub fn check_image_size(img: &DynamicImage) -> Result<()> {
    if img.width() < MIN_IMAGE_SIZE || img.height() < MIN_IMAGE_SIZE {
        return Err(TraceError::ImageTooSmall {
            width: img.width(),
            height: img.height(),
        });
    }
    Ok(())
}

/// Whether the file decodes as an image at all
pub fn is_valid_image_file(path: &Path) -> bool {
    ImageReader::open(path)
        .and_then(|reader| reader.with_guessed_format())
        .ok()
        .and_then(|reader| reader.decode().ok())
        .is_some()
}

/// Rough wall-clock estimate in seconds, scaled from a 1080p baseline
pub fn estimate_processing_time(width: u32, height: u32) -> f64 {
    let pixels = width as f64 * height as f64;
    let pixel_factor = pixels / (1920.0 * 1080.0);
    2.0 * (0.5 + 0.5 * pixel_factor)
}

/// Convert image to grayscale
pub fn to_grayscale(img: &DynamicImage) -> GrayImage {
    img.to_luma8()
}

/// Contrast-limited adaptive histogram equalization.
///
/// The image is split into a `tiles` x `tiles` grid. Each tile gets a
/// histogram clipped at `clip_limit` times the uniform bin height, with the
/// clipped excess spread over all bins, and every pixel is mapped through a
/// bilinear blend of the four nearest tile lookup tables.
pub fn clahe(gray: &GrayImage, clip_limit: f64, tiles: u32) -> GrayImage {
    let (width, height) = gray.dimensions();
    if width == 0 || height == 0 {
        return gray.clone();
    }
    let tiles_x = tiles.clamp(1, width);
    let tiles_y = tiles.clamp(1, height);
    let tile_w = width.div_ceil(tiles_x);
    let tile_h = height.div_ceil(tiles_y);

    let mut luts = vec![[0u8; 256]; (tiles_x * tiles_y) as usize];
    for ty in 0..tiles_y {
        for tx in 0..tiles_x {
            let x0 = tx * tile_w;
            let y0 = ty * tile_h;
            let x1 = (x0 + tile_w).min(width);
            let y1 = (y0 + tile_h).min(height);
            let lut = &mut luts[(ty * tiles_x + tx) as usize];
            if x0 >= x1 || y0 >= y1 {
                for (i, v) in lut.iter_mut().enumerate() {
                    *v = i as u8;
                }
                continue;
            }

            let mut hist = [0u32; 256];
            for y in y0..y1 {
                for x in x0..x1 {
                    hist[gray.get_pixel(x, y)[0] as usize] += 1;
                }
            }
            let count = (x1 - x0) * (y1 - y0);
            let clip = ((clip_limit * count as f64 / 256.0) as u32).max(1);

            let mut excess = 0u32;
            for bin in hist.iter_mut() {
                if *bin > clip {
                    excess += *bin - clip;
                    *bin = clip;
                }
            }
            let per_bin = excess / 256;
            let remainder = excess % 256;
            for (i, bin) in hist.iter_mut().enumerate() {
                *bin += per_bin + u32::from((i as u32) < remainder);
            }

            let mut cdf = 0u64;
            for (i, bin) in hist.iter().enumerate() {
                cdf += *bin as u64;
                lut[i] = ((cdf * 255) / count as u64).min(255) as u8;
            }
        }
    }

    // Tile centres sit at (t + 0.5) * tile size
    let blend_axis = |pos: u32, tile: u32, count: u32| -> (usize, usize, f64) {
        let g = (pos as f64 + 0.5) / tile as f64 - 0.5;
        let lo = g.floor().clamp(0.0, (count - 1) as f64) as usize;
        let hi = (lo + 1).min(count as usize - 1);
        let frac = (g - lo as f64).clamp(0.0, 1.0);
        (lo, hi, frac)
    };

    GrayImage::from_fn(width, height, |x, y| {
        let v = gray.get_pixel(x, y)[0] as usize;
        let (x0, x1, fx) = blend_axis(x, tile_w, tiles_x);
        let (y0, y1, fy) = blend_axis(y, tile_h, tiles_y);
        let row = tiles_x as usize;
        let tl = luts[y0 * row + x0][v] as f64;
        let tr = luts[y0 * row + x1][v] as f64;
        let bl = luts[y1 * row + x0][v] as f64;
        let br = luts[y1 * row + x1][v] as f64;
        let top = tl + (tr - tl) * fx;
        let bottom = bl + (br - bl) * fx;
        Luma([(top + (bottom - top) * fy).round().clamp(0.0, 255.0) as u8])
    })
}

/// Divide by a heavily blurred copy to flatten large-scale lighting gradients.
///
/// Bright regions saturate at 255 regardless of their absolute level, while
/// edges narrower than the blur survive.
pub fn division_normalize(gray: &GrayImage) -> GrayImage {
    let (width, height) = gray.dimensions();
    let longest = width.max(height).max(1);
    let sigma = longest as f32 / 16.0;

    // Blur a small copy; the background estimate is low-frequency anyway
    let factor = (256.0 / longest as f32).min(1.0);
    let small_w = ((width as f32 * factor).round() as u32).max(1);
    let small_h = ((height as f32 * factor).round() as u32).max(1);
    let small = resize(gray, small_w, small_h, FilterType::Triangle);
    let blurred_small = gaussian_blur_f32(&small, (sigma * factor).max(0.5));
    let background = resize(&blurred_small, width, height, FilterType::Triangle);

    GrayImage::from_fn(width, height, |x, y| {
        let value = gray.get_pixel(x, y)[0] as u32;
        let base = (background.get_pixel(x, y)[0] as u32).max(1);
        Luma([((value * 255) / base).min(255) as u8])
    })
}

/// Local contrast enhancement used on the rectified image
pub fn normalize_lighting(gray: &GrayImage, clip_limit: f64, tiles: u32) -> GrayImage {
    clahe(gray, clip_limit, tiles)
}

/// Local contrast enhancement plus gradient flattening, for boundary search
pub fn normalize_for_boundary(gray: &GrayImage, clip_limit: f64, tiles: u32) -> GrayImage {
    division_normalize(&clahe(gray, clip_limit, tiles))
}

/// Which side of the local mean counts as foreground
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polarity {
    Bright,
    Dark,
}

/// Local-mean threshold over a `(2r+1)` square window.
///
/// `Bright` keeps pixels above `mean - c`; `Dark` keeps pixels below
/// `mean - c`.
pub fn adaptive_threshold(gray: &GrayImage, radius: u32, c: i32, polarity: Polarity) -> GrayImage {
    let mean = box_filter(gray, radius, radius);
    GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        let value = gray.get_pixel(x, y)[0] as i32;
        let cutoff = mean.get_pixel(x, y)[0] as i32 - c;
        let on = match polarity {
            Polarity::Bright => value > cutoff,
            Polarity::Dark => value < cutoff,
        };
        Luma([if on { 255 } else { 0 }])
    })
}

/// Canny edges. Larger apertures add Gaussian pre-smoothing on top of the
/// detector's own.
pub fn detect_edges(gray: &GrayImage, low: f64, high: f64, aperture: u32) -> GrayImage {
    let smoothed = match aperture {
        5 => gaussian_blur_f32(gray, 1.0),
        7 => gaussian_blur_f32(gray, 2.0),
        _ => gray.clone(),
    };
    canny(&smoothed, low as f32, high as f32)
}

/// 8-bit CIE Lab planes: L scaled to 0-255, a and b offset by 128.
pub struct LabPlanes {
    pub l: GrayImage,
    pub a: GrayImage,
    pub b: GrayImage,
}

pub fn to_lab(img: &DynamicImage) -> LabPlanes {
    let rgb = img.to_rgb8();
    let (width, height) = rgb.dimensions();

    let mut linear = [0f32; 256];
    for (i, v) in linear.iter_mut().enumerate() {
        let c = i as f32 / 255.0;
        *v = if c <= 0.04045 {
            c / 12.92
        } else {
            ((c + 0.055) / 1.055).powf(2.4)
        };
    }

    fn f(t: f32) -> f32 {
        if t > 0.008856 {
            t.cbrt()
        } else {
            7.787 * t + 16.0 / 116.0
        }
    }

    let mut l_plane = GrayImage::new(width, height);
    let mut a_plane = GrayImage::new(width, height);
    let mut b_plane = GrayImage::new(width, height);

    for (x, y, px) in rgb.enumerate_pixels() {
        let r = linear[px[0] as usize];
        let g = linear[px[1] as usize];
        let b = linear[px[2] as usize];

        // D65 white point
        let xn = (0.412453 * r + 0.357580 * g + 0.180423 * b) / 0.950456;
        let yn = 0.212671 * r + 0.715160 * g + 0.072169 * b;
        let zn = (0.019334 * r + 0.119193 * g + 0.950227 * b) / 1.088754;

        let fy = f(yn);
        let l = if yn > 0.008856 { 116.0 * fy - 16.0 } else { 903.3 * yn };
        let a = 500.0 * (f(xn) - fy) + 128.0;
        let bb = 200.0 * (fy - f(zn)) + 128.0;

        l_plane.put_pixel(x, y, Luma([(l * 255.0 / 100.0).round().clamp(0.0, 255.0) as u8]));
        a_plane.put_pixel(x, y, Luma([a.round().clamp(0.0, 255.0) as u8]));
        b_plane.put_pixel(x, y, Luma([bb.round().clamp(0.0, 255.0) as u8]));
    }

    LabPlanes {
        l: l_plane,
        a: a_plane,
        b: b_plane,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn lab_of_neutral_colors_is_achromatic() {
        let img = RgbImage::from_fn(4, 1, |x, _| {
            let v = [0u8, 60, 180, 255][x as usize];
            Rgb([v, v, v])
        });
        let lab = to_lab(&DynamicImage::ImageRgb8(img));
        for x in 0..4 {
            let a = lab.a.get_pixel(x, 0)[0] as i32;
            let b = lab.b.get_pixel(x, 0)[0] as i32;
            assert!((a - 128).abs() <= 1, "a = {a}");
            assert!((b - 128).abs() <= 1, "b = {b}");
        }
        assert_eq!(lab.l.get_pixel(3, 0)[0], 255);
        assert_eq!(lab.l.get_pixel(0, 0)[0], 0);
    }

    #[test]
    fn lab_of_saturated_red_is_chromatic() {
        let img = RgbImage::from_pixel(1, 1, Rgb([255, 0, 0]));
        let lab = to_lab(&DynamicImage::ImageRgb8(img));
        assert!(lab.a.get_pixel(0, 0)[0] > 180);
    }

    #[test]
    fn clahe_keeps_uniform_image_nearly_unchanged() {
        let gray = GrayImage::from_pixel(512, 512, Luma([200]));
        let out = clahe(&gray, 2.0, 8);
        let v = out.get_pixel(100, 300)[0] as i32;
        assert!((v - 200).abs() <= 5, "got {v}");
    }

    #[test]
    fn clahe_preserves_ordering_across_an_edge() {
        let gray = GrayImage::from_fn(64, 64, |x, _| Luma([if x < 32 { 40 } else { 220 }]));
        let out = clahe(&gray, 2.0, 4);
        assert!(out.get_pixel(5, 30)[0] < out.get_pixel(60, 30)[0]);
    }

    #[test]
    fn division_normalize_flattens_a_gradient() {
        let gray = GrayImage::from_fn(200, 200, |x, _| Luma([(120 + x / 2) as u8]));
        let out = division_normalize(&gray);
        let left = out.get_pixel(20, 100)[0] as i32;
        let right = out.get_pixel(180, 100)[0] as i32;
        assert!((left - right).abs() < 40, "left {left} right {right}");
    }

    #[test]
    fn adaptive_threshold_polarity() {
        let gray = GrayImage::from_fn(60, 60, |x, y| {
            Luma([if (25..35).contains(&x) && (25..35).contains(&y) { 20 } else { 230 }])
        });
        let dark = adaptive_threshold(&gray, 10, 5, Polarity::Dark);
        assert_eq!(dark.get_pixel(26, 26)[0], 255);
        assert_eq!(dark.get_pixel(2, 2)[0], 0);
    }

    #[test]
    fn processing_time_scales_with_pixels() {
        assert!((estimate_processing_time(1920, 1080) - 2.0).abs() < 1e-9);
        assert!(estimate_processing_time(4000, 3000) > 2.0);
    }
}
