use image::{GrayImage, ImageBuffer, Luma};
use imageproc::distance_transform::{euclidean_squared_distance_transform, Norm};
use imageproc::morphology::{close, open};
use imageproc::region_labelling::{connected_components, Connectivity};

pub type LabelImage = ImageBuffer<Luma<u32>, Vec<u32>>;

/// Pixel statistics of one connected region
#[derive(Debug, Clone, PartialEq)]
pub struct Component {
    pub label: u32,
    pub area: u32,
    pub min_x: u32,
    pub min_y: u32,
    pub max_x: u32,
    pub max_y: u32,
    sum_x: u64,
    sum_y: u64,
}

impl Component {
    pub fn centroid(&self) -> (f64, f64) {
        (
            self.sum_x as f64 / self.area as f64,
            self.sum_y as f64 / self.area as f64,
        )
    }

    pub fn touches_border(&self, width: u32, height: u32) -> bool {
        self.min_x == 0 || self.min_y == 0 || self.max_x + 1 >= width || self.max_y + 1 >= height
    }

    /// Gap between bounding boxes; 0 when they overlap
    pub fn gap_to(&self, other: &Component) -> f64 {
        let dx = (other.min_x as i64 - self.max_x as i64)
            .max(self.min_x as i64 - other.max_x as i64)
            .max(0) as f64;
        let dy = (other.min_y as i64 - self.max_y as i64)
            .max(self.min_y as i64 - other.max_y as i64)
            .max(0) as f64;
        dx.hypot(dy)
    }

    /// Grow this box to also cover `other`
    pub fn absorb(&mut self, other: &Component) {
        self.area += other.area;
        self.min_x = self.min_x.min(other.min_x);
        self.min_y = self.min_y.min(other.min_y);
        self.max_x = self.max_x.max(other.max_x);
        self.max_y = self.max_y.max(other.max_y);
        self.sum_x += other.sum_x;
        self.sum_y += other.sum_y;
    }
}

/// Label 8-connected foreground regions and gather their statistics
pub fn label_components(mask: &GrayImage) -> (LabelImage, Vec<Component>) {
    let labeled = connected_components(mask, Connectivity::Eight, Luma([0u8]));

    let mut components: Vec<Option<Component>> = Vec::new();
    for (x, y, label) in labeled.enumerate_pixels() {
        let label_val = label[0];
        if label_val == 0 {
            continue; // Skip background
        }
        let idx = label_val as usize;
        if components.len() <= idx {
            components.resize(idx + 1, None);
        }
        match &mut components[idx] {
            Some(c) => {
                c.area += 1;
                c.min_x = c.min_x.min(x);
                c.min_y = c.min_y.min(y);
                c.max_x = c.max_x.max(x);
                c.max_y = c.max_y.max(y);
                c.sum_x += x as u64;
                c.sum_y += y as u64;
            }
            slot => {
                *slot = Some(Component {
                    label: label_val,
                    area: 1,
                    min_x: x,
                    min_y: y,
                    max_x: x,
                    max_y: y,
                    sum_x: x as u64,
                    sum_y: y as u64,
                })
            }
        }
    }

    (labeled, components.into_iter().flatten().collect())
}

/// Binary mask of the pixels carrying any of `labels`
pub fn mask_from_labels(labeled: &LabelImage, labels: &[u32]) -> GrayImage {
    let selected = label_lookup(labels);
    GrayImage::from_fn(labeled.width(), labeled.height(), |x, y| {
        let label = labeled.get_pixel(x, y)[0] as usize;
        Luma([if selected.get(label).copied().unwrap_or(false) { 255 } else { 0 }])
    })
}

fn label_lookup(labels: &[u32]) -> Vec<bool> {
    let len = labels.iter().max().map_or(0, |&m| m as usize + 1);
    let mut lookup = vec![false; len];
    for &label in labels {
        if label != 0 {
            lookup[label as usize] = true;
        }
    }
    lookup
}

/// Keep only the largest region; all-zero when the mask is empty.
pub fn keep_largest_component(mask: &GrayImage) -> GrayImage {
    let (labeled, components) = label_components(mask);
    match components.iter().max_by_key(|c| c.area) {
        Some(largest) => mask_from_labels(&labeled, &[largest.label]),
        None => GrayImage::new(mask.width(), mask.height()),
    }
}

/// Turn enclosed background pockets into foreground
pub fn fill_holes(mask: &GrayImage) -> GrayImage {
    let (width, height) = mask.dimensions();
    let inverted = GrayImage::from_fn(width, height, |x, y| {
        Luma([if mask.get_pixel(x, y)[0] > 0 { 0 } else { 255 }])
    });
    let (labeled, pockets) = label_components(&inverted);
    let holes: Vec<u32> = pockets
        .iter()
        .filter(|c| !c.touches_border(width, height))
        .map(|c| c.label)
        .collect();

    let mut filled = mask.clone();
    if holes.is_empty() {
        return filled;
    }
    let is_hole = label_lookup(&holes);
    for (x, y, px) in filled.enumerate_pixels_mut() {
        let label = labeled.get_pixel(x, y)[0] as usize;
        if is_hole.get(label).copied().unwrap_or(false) {
            px[0] = 255;
        }
    }
    filled
}

/// Radius of a square/diamond structuring element with odd side `size`
pub fn kernel_radius(size: u32) -> u8 {
    (size / 2).clamp(1, u8::MAX as u32) as u8
}

/// Close, open, fill holes and keep the largest region of the lightbox mask.
pub fn clean_paper_mask(mask: &GrayImage, large_kernel_size: u32) -> GrayImage {
    let radius = kernel_radius(large_kernel_size);
    let closed = close(mask, Norm::LInf, radius);
    let opened = open(&closed, Norm::LInf, radius);
    keep_largest_component(&fill_holes(&opened))
}

/// Dilate by a Euclidean disc of `radius` pixels.
///
/// Works from the squared distance transform, so the radius is not limited
/// to the `u8` range of `imageproc::morphology`.
pub fn dilate_disc(mask: &GrayImage, radius: f64) -> GrayImage {
    if !mask.pixels().any(|p| p[0] > 0) {
        return mask.clone();
    }
    let distance = euclidean_squared_distance_transform(mask);
    let limit = radius * radius;
    GrayImage::from_fn(mask.width(), mask.height(), |x, y| {
        Luma([if distance.get_pixel(x, y)[0] <= limit { 255 } else { 0 }])
    })
}

/// Erode by a Euclidean disc of `radius` pixels. Pixels outside the image
/// count as foreground.
pub fn erode_disc(mask: &GrayImage, radius: f64) -> GrayImage {
    let background = GrayImage::from_fn(mask.width(), mask.height(), |x, y| {
        Luma([if mask.get_pixel(x, y)[0] > 0 { 0 } else { 255 }])
    });
    if !background.pixels().any(|p| p[0] > 0) {
        return mask.clone();
    }
    let distance = euclidean_squared_distance_transform(&background);
    let limit = radius * radius;
    GrayImage::from_fn(mask.width(), mask.height(), |x, y| {
        Luma([if distance.get_pixel(x, y)[0] > limit { 255 } else { 0 }])
    })
}

pub fn close_disc(mask: &GrayImage, radius: f64) -> GrayImage {
    erode_disc(&dilate_disc(mask, radius), radius)
}

pub fn open_disc(mask: &GrayImage, radius: f64) -> GrayImage {
    dilate_disc(&erode_disc(mask, radius), radius)
}

/// Blank a band of `margin` pixels along every edge
pub fn clear_border(mask: &mut GrayImage, margin: u32) {
    let (width, height) = mask.dimensions();
    for (x, y, px) in mask.enumerate_pixels_mut() {
        if x < margin || y < margin || x + margin >= width || y + margin >= height {
            px[0] = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blocks() -> GrayImage {
        GrayImage::from_fn(100, 100, |x, y| {
            let big = (10..60).contains(&x) && (10..60).contains(&y);
            let small = (80..90).contains(&x) && (80..90).contains(&y);
            Luma([if big || small { 255 } else { 0 }])
        })
    }

    #[test]
    fn largest_component_wins() {
        let kept = keep_largest_component(&blocks());
        assert_eq!(kept.get_pixel(30, 30)[0], 255);
        assert_eq!(kept.get_pixel(85, 85)[0], 0);
    }

    #[test]
    fn empty_mask_stays_empty() {
        let kept = keep_largest_component(&GrayImage::new(20, 20));
        assert!(kept.pixels().all(|p| p[0] == 0));
    }

    #[test]
    fn holes_are_filled_but_outside_is_not() {
        let mut mask = blocks();
        for y in 30..40 {
            for x in 30..40 {
                mask.put_pixel(x, y, Luma([0]));
            }
        }
        let filled = fill_holes(&mask);
        assert_eq!(filled.get_pixel(35, 35)[0], 255);
        assert_eq!(filled.get_pixel(70, 70)[0], 0);
    }

    #[test]
    fn disc_operations_match_the_radius() {
        let mut dot = GrayImage::new(41, 41);
        dot.put_pixel(20, 20, Luma([255]));
        let grown = dilate_disc(&dot, 10.0);
        assert_eq!(grown.get_pixel(30, 20)[0], 255);
        assert_eq!(grown.get_pixel(27, 27)[0], 255);
        assert_eq!(grown.get_pixel(28, 28)[0], 0);
        assert_eq!(grown.get_pixel(31, 20)[0], 0);

        let shrunk = erode_disc(&grown, 10.0);
        assert_eq!(shrunk.get_pixel(20, 20)[0], 255);
        assert_eq!(shrunk.get_pixel(25, 20)[0], 0);
    }

    #[test]
    fn disc_dilation_is_not_limited_to_u8_radii() {
        let mut mask = GrayImage::new(700, 20);
        mask.put_pixel(10, 10, Luma([255]));
        let grown = dilate_disc(&mask, 600.0);
        assert_eq!(grown.get_pixel(610, 10)[0], 255);
        assert_eq!(grown.get_pixel(611, 10)[0], 0);
    }

    #[test]
    fn disc_closing_fills_a_narrow_gap_only() {
        let mask = GrayImage::from_fn(80, 40, |x, y| {
            let left = (10..35).contains(&x) && (10..30).contains(&y);
            let right = (39..70).contains(&x) && (10..30).contains(&y);
            Luma([if left || right { 255 } else { 0 }])
        });
        let closed = close_disc(&mask, 3.0);
        assert_eq!(closed.get_pixel(37, 20)[0], 255);
        assert_eq!(closed.get_pixel(5, 5)[0], 0);
        assert_eq!(open_disc(&mask, 3.0).get_pixel(20, 20)[0], 255);
    }

    #[test]
    fn component_statistics() {
        let (_, mut comps) = label_components(&blocks());
        comps.sort_by_key(|c| c.area);
        assert_eq!(comps.len(), 2);
        assert_eq!(comps[0].area, 100);
        assert_eq!(comps[1].area, 2500);
        let (cx, cy) = comps[1].centroid();
        assert!((cx - 34.5).abs() < 1e-9 && (cy - 34.5).abs() < 1e-9);
        assert!(comps[0].gap_to(&comps[1]) > 25.0);
    }
}
