use crate::config::ProcessingParameters;
use crate::error::{Result, TraceError};
use crate::models::Polygon;

/// Closing edges longer than this are suspicious
pub const CLOSURE_GAP_WARN_PX: f64 = 5.0;

/// Measurements of an accepted outline
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationReport {
    pub perimeter: f64,
    pub area: f64,
    pub closure_gap: f64,
    pub warnings: Vec<String>,
}

/// Reject degenerate outlines; collect non-fatal warnings.
///
/// Self-intersection is not checked.
pub fn validate_contour(polygon: &Polygon, params: &ProcessingParameters) -> Result<ValidationReport> {
    if !polygon.is_valid() {
        return Err(TraceError::ValidationFailed(format!(
            "contour has {} vertices, at least 3 required",
            polygon.len()
        )));
    }

    let perimeter = polygon.perimeter();
    if perimeter < params.min_perimeter {
        return Err(TraceError::ValidationFailed(format!(
            "perimeter {:.1} px is below the minimum of {:.1} px",
            perimeter, params.min_perimeter
        )));
    }

    let mut warnings = Vec::new();
    let closure_gap = polygon.closure_gap();
    if params.validate_closed_contour && closure_gap > CLOSURE_GAP_WARN_PX {
        // Only suspicious when it dwarfs every traced edge
        let longest_other = polygon
            .points
            .windows(2)
            .map(|w| w[0].distance(&w[1]))
            .fold(0.0, f64::max);
        if closure_gap > 2.0 * longest_other {
            let msg = format!(
                "contour may not be properly closed: {:.1} px between last and first vertex",
                closure_gap
            );
            log::warn!("{}", msg);
            warnings.push(msg);
        }
    }

    Ok(ValidationReport {
        perimeter,
        area: polygon.area(),
        closure_gap,
        warnings,
    })
}
