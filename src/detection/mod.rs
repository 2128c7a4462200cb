pub mod contours;
pub mod corners;
pub mod morphology;
pub mod paper;
pub mod preprocessing;
pub mod steps;
pub mod warp;

use crate::pipeline::PipelineStep;
use std::sync::Arc;

/// The standard step list, one step per stage transition
pub fn build_standard_steps() -> Vec<Arc<dyn PipelineStep>> {
    use crate::detection::steps::*;

    vec![
        Arc::new(LightboxCropStep),
        Arc::new(NormalizeStep),
        Arc::new(ObjectMaskStep),
        Arc::new(ObjectContourStep),
        Arc::new(SmoothStep),
        Arc::new(DilateStep),
        Arc::new(ValidateStep),
    ]
}
