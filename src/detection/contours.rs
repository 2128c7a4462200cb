use crate::config::ProcessingParameters;
use crate::detection::morphology::{self, Component, LabelImage};
use crate::detection::preprocessing::{self, Polarity};
use crate::error::{Result, TraceError};
use crate::geometry;
use crate::models::{PixelScale, Polygon};
use image::{GrayImage, Luma};
use imageproc::contrast::{otsu_level, threshold, ThresholdType};
use imageproc::distance_transform::Norm;
use imageproc::drawing::draw_filled_circle_mut;
use imageproc::morphology::{close, open};

/// Share of the perimeter used as simplification tolerance per unit of
/// `polygon_epsilon_factor`
const OBJECT_EPSILON_SCALE: f64 = 0.1;

/// Brush radius of the links drawn between merged components
const BRIDGE_RADIUS_PX: i32 = 2;

/// How the rectified image is binarized. The object is darker than the
/// lightbox, so every policy marks dark pixels as foreground.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThresholdPolicy {
    /// Darker than the local mean by more than `c`
    Adaptive { radius: u32, c: i32 },
    /// Fixed global cut-off
    Manual(u8),
    /// Otsu's level shifted by `offset`
    Otsu { offset: i32 },
}

impl ThresholdPolicy {
    /// Adaptive if requested, else manual if set, else Otsu.
    pub fn from_params(params: &ProcessingParameters) -> Self {
        if params.use_adaptive_threshold {
            ThresholdPolicy::Adaptive {
                radius: params.adaptive_block_radius,
                c: params.adaptive_c,
            }
        } else if params.manual_threshold > 0 {
            ThresholdPolicy::Manual(params.manual_threshold.clamp(0, 255) as u8)
        } else {
            ThresholdPolicy::Otsu {
                offset: params.threshold_offset,
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ThresholdPolicy::Adaptive { .. } => "adaptive",
            ThresholdPolicy::Manual(_) => "manual",
            ThresholdPolicy::Otsu { .. } => "otsu",
        }
    }

    /// Foreground mask plus the global level used, if any
    pub fn apply(&self, gray: &GrayImage) -> (GrayImage, Option<u8>) {
        match *self {
            ThresholdPolicy::Adaptive { radius, c } => (
                preprocessing::adaptive_threshold(gray, radius, c, Polarity::Dark),
                None,
            ),
            ThresholdPolicy::Manual(level) => (
                threshold(gray, level, ThresholdType::BinaryInverted),
                Some(level),
            ),
            ThresholdPolicy::Otsu { offset } => {
                let level = (otsu_level(gray) as i32 + offset).clamp(0, 255) as u8;
                (threshold(gray, level, ThresholdType::BinaryInverted), Some(level))
            }
        }
    }
}

/// How connected components become the object silhouette
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ComponentSelection {
    /// Best component plus every qualifying component within `max_gap_px`
    MergeNearby { max_gap_px: f64 },
    /// Highest-scoring component only
    SingleBest,
}

impl ComponentSelection {
    pub fn from_params(params: &ProcessingParameters, scale: &PixelScale) -> Self {
        if params.merge_nearby_contours {
            ComponentSelection::MergeNearby {
                max_gap_px: scale.mm_to_px(params.contour_merge_distance_mm),
            }
        } else {
            ComponentSelection::SingleBest
        }
    }
}

/// Result of object extraction
#[derive(Debug, Clone)]
pub struct ObjectExtraction {
    pub mask: GrayImage,
    pub polygon: Polygon,
    pub components_used: usize,
}

/// Width of the band along the rectified edge that belongs to the lightbox rim
pub fn rim_margin(width: u32, height: u32) -> u32 {
    ((width.min(height) as f64 * 0.005).round() as u32).max(2)
}

/// Threshold the rectified image and clean the result into an object mask.
pub fn binarize_object(gray: &GrayImage, params: &ProcessingParameters) -> (GrayImage, ThresholdPolicy, Option<u8>) {
    let policy = ThresholdPolicy::from_params(params);
    let (mut mask, level) = policy.apply(gray);
    match level {
        Some(level) => log::debug!("Object threshold: {} at level {}", policy.name(), level),
        None => log::debug!("Object threshold: {}", policy.name()),
    }

    morphology::clear_border(&mut mask, rim_margin(gray.width(), gray.height()));

    if params.disable_morphology {
        return (mask, policy, level);
    }
    (clean_object_mask(&mask, params.morph_kernel_size), policy, level)
}

/// Close twice, fill enclosed holes, open once.
pub fn clean_object_mask(mask: &GrayImage, kernel_size: u32) -> GrayImage {
    let radius = morphology::kernel_radius(kernel_size);
    let closed = close(&close(mask, Norm::L1, radius), Norm::L1, radius);
    let filled = morphology::fill_holes(&closed);
    open(&filled, Norm::L1, radius)
}

/// Area discounted by distance from the image centre
pub fn score_component(component: &Component, width: u32, height: u32) -> f64 {
    let (cx, cy) = component.centroid();
    let half_w = width as f64 / 2.0;
    let half_h = height as f64 / 2.0;
    let distance = (cx - half_w).hypot(cy - half_h);
    let normalized = distance / half_w.hypot(half_h);
    component.area as f64 * (1.0 - normalized).max(0.0)
}

/// Pick the object component(s) and return their mask.
pub fn select_object(
    mask: &GrayImage,
    selection: ComponentSelection,
    min_area: f64,
) -> Result<(GrayImage, usize)> {
    let (width, height) = mask.dimensions();
    let (labeled, components) = morphology::label_components(mask);

    let mut qualifying: Vec<Component> = components
        .into_iter()
        .filter(|c| c.area as f64 >= min_area)
        .collect();
    if qualifying.is_empty() {
        return Err(TraceError::NoObjectFound(format!(
            "no region of at least {min_area:.0} px after thresholding"
        )));
    }

    let best_index = qualifying
        .iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| {
            score_component(a, width, height).total_cmp(&score_component(b, width, height))
        })
        .map(|(i, _)| i)
        .unwrap_or(0);
    let best = qualifying.swap_remove(best_index);
    log::debug!(
        "Best object component: {} px at {:?} ({} other candidates)",
        best.area,
        best.centroid(),
        qualifying.len()
    );

    match selection {
        ComponentSelection::SingleBest => Ok((morphology::mask_from_labels(&labeled, &[best.label]), 1)),
        ComponentSelection::MergeNearby { max_gap_px } => {
            let mut union = best.clone();
            let mut labels = vec![best.label];
            loop {
                let mut grew = false;
                qualifying.retain(|c| {
                    if union.gap_to(c) <= max_gap_px {
                        union.absorb(c);
                        labels.push(c.label);
                        grew = true;
                        false
                    } else {
                        true
                    }
                });
                if !grew {
                    break;
                }
            }

            let mut merged = morphology::mask_from_labels(&labeled, &labels);
            if labels.len() == 1 {
                return Ok((merged, 1));
            }

            // Link each absorbed component to what is already connected,
            // leaving the components themselves untouched
            let boundaries = label_boundaries(&labeled, &labels);
            let mut reached = boundaries[0].clone();
            for boundary in &boundaries[1..] {
                if let Some((from, to)) = nearest_pair(&reached, boundary) {
                    draw_bridge(&mut merged, from, to);
                }
                reached.extend_from_slice(boundary);
            }
            log::info!("Merged {} nearby components into one silhouette", labels.len());
            Ok((merged, labels.len()))
        }
    }
}

/// Pixels of each listed label with a 4-neighbour outside that label
fn label_boundaries(labeled: &LabelImage, labels: &[u32]) -> Vec<Vec<(i32, i32)>> {
    let (width, height) = labeled.dimensions();
    let mut boundaries = vec![Vec::new(); labels.len()];
    for (x, y, px) in labeled.enumerate_pixels() {
        let label = px[0];
        let Some(slot) = labels.iter().position(|&l| l == label) else {
            continue;
        };
        let same = |nx: i64, ny: i64| {
            nx >= 0
                && ny >= 0
                && nx < width as i64
                && ny < height as i64
                && labeled.get_pixel(nx as u32, ny as u32)[0] == label
        };
        let (xi, yi) = (x as i64, y as i64);
        let interior = same(xi - 1, yi) && same(xi + 1, yi) && same(xi, yi - 1) && same(xi, yi + 1);
        if !interior {
            boundaries[slot].push((x as i32, y as i32));
        }
    }
    boundaries
}

fn nearest_pair(a: &[(i32, i32)], b: &[(i32, i32)]) -> Option<((i32, i32), (i32, i32))> {
    let mut best: Option<(i64, (i32, i32), (i32, i32))> = None;
    for &p in a {
        for &q in b {
            let dx = (p.0 - q.0) as i64;
            let dy = (p.1 - q.1) as i64;
            let d = dx * dx + dy * dy;
            if best.is_none_or(|(closest, _, _)| d < closest) {
                best = Some((d, p, q));
            }
        }
    }
    best.map(|(_, p, q)| (p, q))
}

/// Stamp a round brush along the segment `from`-`to`
fn draw_bridge(mask: &mut GrayImage, from: (i32, i32), to: (i32, i32)) {
    let (dx, dy) = ((to.0 - from.0) as f64, (to.1 - from.1) as f64);
    let steps = dx.abs().max(dy.abs()).ceil().max(1.0) as i32;
    for i in 0..=steps {
        let t = i as f64 / steps as f64;
        let centre = (
            from.0 + (t * dx).round() as i32,
            from.1 + (t * dy).round() as i32,
        );
        draw_filled_circle_mut(mask, centre, BRIDGE_RADIUS_PX, Luma([255u8]));
    }
}

/// Trace and simplify the silhouette boundary.
pub fn trace_object(selected: &GrayImage, params: &ProcessingParameters) -> Result<Polygon> {
    let contour = geometry::largest_external_contour(selected)
        .ok_or_else(|| TraceError::NoObjectFound("selected region has no boundary".to_string()))?;

    let epsilon = params.polygon_epsilon_factor * OBJECT_EPSILON_SCALE * contour.perimeter();
    let mut polygon = contour.simplify(epsilon);
    log::debug!(
        "Object boundary: {} -> {} vertices (epsilon {:.2} px)",
        contour.len(),
        polygon.len(),
        epsilon
    );

    if params.force_convex {
        polygon = polygon.convex_hull();
    }
    if !polygon.is_valid() {
        return Err(TraceError::NoObjectFound(format!(
            "object boundary collapsed to {} vertices",
            polygon.len()
        )));
    }
    Ok(polygon)
}

/// Object mask selection and boundary tracing on an already binarized mask
pub fn extract_object_contour(
    cleaned: &GrayImage,
    params: &ProcessingParameters,
    scale: &PixelScale,
) -> Result<ObjectExtraction> {
    let selection = ComponentSelection::from_params(params, scale);
    let (mask, components_used) = select_object(cleaned, selection, params.min_contour_area)?;
    let polygon = trace_object(&mask, params)?;
    Ok(ObjectExtraction {
        mask,
        polygon,
        components_used,
    })
}
