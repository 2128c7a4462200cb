use crate::debug;
use crate::detection::{contours, corners, morphology, paper, preprocessing, warp};
use crate::error::Result;
use crate::models::PipelineStage;
use crate::outline;
use crate::pipeline::{require, MetadataValue, PipelineContext, PipelineData, PipelineStep};
use image::DynamicImage;

/// Find the lightbox in the source image and rectify it
pub struct LightboxCropStep;

impl PipelineStep for LightboxCropStep {
    fn process(&self, mut data: PipelineData, context: &PipelineContext) -> Result<PipelineData> {
        let params = &context.params;
        let source = data.original.clone();

        let gray = preprocessing::to_grayscale(&source);
        let normalized =
            preprocessing::normalize_for_boundary(&gray, params.clahe_clip_limit, params.clahe_tile_size);
        let raw_mask = paper::build_paper_mask(&source, &normalized, params);
        let mask = morphology::clean_paper_mask(&raw_mask, params.large_kernel_size);

        data.push_debug(context, "boundary_normalized", || DynamicImage::ImageLuma8(normalized.clone()));
        data.push_debug(context, "paper_mask", || DynamicImage::ImageLuma8(raw_mask.clone()));
        data.push_debug(context, "paper_mask_clean", || DynamicImage::ImageLuma8(mask.clone()));

        let detection = corners::detect_corners(&mask, &normalized, params)?;
        let quad = detection.corners;
        data.push_debug(context, "lightbox_corners", || {
            DynamicImage::ImageRgb8(debug::overlay_corners(&source.to_rgb8(), &quad.to_array()))
        });

        let rectified = warp::warp_lightbox(
            &source,
            &quad,
            params.target_width_px,
            params.target_height_px,
            params.physical_width_mm,
            params.physical_height_mm,
        )?;
        data.push_debug(context, "rectified", || DynamicImage::ImageRgb8(rectified.image.clone()));

        if context.verbose {
            log::info!(
                "Lightbox corners ({}): {:?}",
                detection.strategy.name(),
                quad.to_array()
            );
        }
        data.set_metadata(
            "corner_strategy",
            MetadataValue::String(detection.strategy.name().to_string()),
        );
        data.set_metadata("corners_refined", MetadataValue::Bool(detection.refined));

        data.image = DynamicImage::ImageRgb8(rectified.image.clone());
        data.rectified = Some(rectified.image);
        data.scale = Some(rectified.scale);
        data.corners = Some(quad);
        data.polygon = quad.to_polygon();
        Ok(data)
    }

    fn name(&self) -> &str {
        "Lightbox Crop"
    }

    fn stage(&self) -> PipelineStage {
        PipelineStage::LightboxCropped
    }
}

/// Even out the illumination of the rectified lightbox
pub struct NormalizeStep;

impl PipelineStep for NormalizeStep {
    fn process(&self, mut data: PipelineData, context: &PipelineContext) -> Result<PipelineData> {
        let params = &context.params;
        let rectified = require(data.rectified.as_ref(), "rectified image", self.stage())?;

        let gray = DynamicImage::ImageRgb8(rectified.clone()).to_luma8();
        let normalized = preprocessing::normalize_lighting(&gray, params.clahe_clip_limit, params.clahe_tile_size);
        data.push_debug(context, "normalized", || DynamicImage::ImageLuma8(normalized.clone()));

        data.image = DynamicImage::ImageLuma8(normalized.clone());
        data.normalized = Some(normalized);
        Ok(data)
    }

    fn name(&self) -> &str {
        "Lighting Normalization"
    }

    fn stage(&self) -> PipelineStage {
        PipelineStage::Normalized
    }
}

/// Separate the object from the lightbox
pub struct ObjectMaskStep;

impl PipelineStep for ObjectMaskStep {
    fn process(&self, mut data: PipelineData, context: &PipelineContext) -> Result<PipelineData> {
        let normalized = require(data.normalized.as_ref(), "normalized image", self.stage())?;

        let (mask, policy, level) = contours::binarize_object(normalized, &context.params);
        data.push_debug(context, "object_mask", || DynamicImage::ImageLuma8(mask.clone()));

        data.set_metadata("threshold_policy", MetadataValue::String(policy.name().to_string()));
        if let Some(level) = level {
            data.set_metadata("threshold_level", MetadataValue::Int(level as i64));
        }
        data.image = DynamicImage::ImageLuma8(mask.clone());
        data.object_mask = Some(mask);
        Ok(data)
    }

    fn name(&self) -> &str {
        "Object Mask"
    }

    fn stage(&self) -> PipelineStage {
        PipelineStage::BoundaryDetected
    }
}

/// Trace the object outline
pub struct ObjectContourStep;

impl PipelineStep for ObjectContourStep {
    fn process(&self, mut data: PipelineData, context: &PipelineContext) -> Result<PipelineData> {
        let stage = self.stage();
        let mask = require(data.object_mask.as_ref(), "object mask", stage)?;
        let scale = require(data.scale, "pixel scale", stage)?;
        let normalized = require(data.normalized.clone(), "normalized image", stage)?;

        let extraction = contours::extract_object_contour(mask, &context.params, &scale)?;
        let polygon = extraction.polygon;
        data.push_debug(context, "selected_object", || DynamicImage::ImageLuma8(extraction.mask.clone()));
        data.push_debug(context, "object_outline", || {
            DynamicImage::ImageRgb8(debug::overlay_polygon(&normalized, &polygon))
        });

        if context.verbose {
            log::info!(
                "Object contour: {} vertices, area {:.0} px, perimeter {:.0} px",
                polygon.len(),
                polygon.area(),
                polygon.perimeter()
            );
        }
        data.set_metadata("components_used", MetadataValue::Int(extraction.components_used as i64));
        data.set_metadata("object_area_px", MetadataValue::Float(polygon.area()));

        data.image = DynamicImage::ImageLuma8(normalized);
        data.polygon = polygon;
        Ok(data)
    }

    fn name(&self) -> &str {
        "Object Contour"
    }

    fn stage(&self) -> PipelineStage {
        PipelineStage::ObjectDetected
    }
}

/// Optional smoothing for printability
pub struct SmoothStep;

impl PipelineStep for SmoothStep {
    fn process(&self, mut data: PipelineData, context: &PipelineContext) -> Result<PipelineData> {
        let params = &context.params;
        if !params.enable_smoothing {
            log::debug!("Smoothing disabled");
            return Ok(data);
        }

        let scale = require(data.scale, "pixel scale", self.stage())?;
        data.polygon = outline::smooth_polygon(
            &data.polygon,
            params.smoothing_amount_mm,
            params.smoothing_mode,
            &scale,
        );
        if context.debug {
            if let DynamicImage::ImageLuma8(background) = &data.image {
                let overlay = debug::overlay_polygon(background, &data.polygon);
                data.push_debug(context, "smoothed", || DynamicImage::ImageRgb8(overlay));
            }
        }
        Ok(data)
    }

    fn name(&self) -> &str {
        "Smoothing"
    }

    fn stage(&self) -> PipelineStage {
        PipelineStage::Smoothed
    }
}

/// Grow the outline by the manufacturing tolerance
pub struct DilateStep;

impl PipelineStep for DilateStep {
    fn process(&self, mut data: PipelineData, context: &PipelineContext) -> Result<PipelineData> {
        let amount = context.params.dilation_amount_mm;
        if amount <= 0.0 {
            log::debug!("No dilation requested");
            return Ok(data);
        }

        let scale = require(data.scale, "pixel scale", self.stage())?;
        data.polygon = outline::dilate_polygon(&data.polygon, amount, &scale);
        if context.debug {
            if let DynamicImage::ImageLuma8(background) = &data.image {
                let overlay = debug::overlay_polygon(background, &data.polygon);
                data.push_debug(context, "dilated", || DynamicImage::ImageRgb8(overlay));
            }
        }
        Ok(data)
    }

    fn name(&self) -> &str {
        "Dilation"
    }

    fn stage(&self) -> PipelineStage {
        PipelineStage::Dilated
    }
}

/// Final sanity checks on the outline
pub struct ValidateStep;

impl PipelineStep for ValidateStep {
    fn process(&self, mut data: PipelineData, context: &PipelineContext) -> Result<PipelineData> {
        let report = outline::validate_contour(&data.polygon, &context.params)?;
        if context.verbose {
            log::info!(
                "Final contour: {} vertices, perimeter {:.1} px, area {:.1} px, {} warning(s)",
                data.polygon.len(),
                report.perimeter,
                report.area,
                report.warnings.len()
            );
        }
        data.set_metadata("perimeter_px", MetadataValue::Float(report.perimeter));
        data.validation = Some(report);
        Ok(data)
    }

    fn name(&self) -> &str {
        "Validation"
    }

    fn stage(&self) -> PipelineStage {
        PipelineStage::Final
    }
}
