//! Processing parameters and their accepted ranges.

use crate::error::{Result, TraceError};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::path::Path;

/// Contour smoothing algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SmoothingMode {
    /// Rasterize, close, open, re-trace. Uniform and coarse.
    Morphological,
    /// Round only the sharp vertices, leave straight runs alone.
    #[default]
    CurvatureBased,
}

/// Inclusive range a parameter must fall in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamRange<T> {
    pub min: T,
    pub max: T,
}

impl<T: PartialOrd + Copy + Display> ParamRange<T> {
    pub const fn new(min: T, max: T) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: T) -> bool {
        value >= self.min && value <= self.max
    }

    fn check(&self, name: &str, value: T) -> Result<()> {
        if self.contains(value) {
            Ok(())
        } else {
            Err(TraceError::invalid(format!(
                "{name} = {value} is outside the accepted range [{}, {}]",
                self.min, self.max
            )))
        }
    }
}

pub const TARGET_SIZE_PX: ParamRange<u32> = ParamRange::new(500, 8000);
pub const PHYSICAL_SIZE_MM: ParamRange<f64> = ParamRange::new(10.0, 500.0);
pub const CANNY_LOW: ParamRange<f64> = ParamRange::new(10.0, 200.0);
pub const CANNY_HIGH: ParamRange<f64> = ParamRange::new(50.0, 400.0);
pub const CANNY_APERTURES: [u32; 3] = [3, 5, 7];
pub const CLAHE_CLIP_LIMIT: ParamRange<f64> = ParamRange::new(0.5, 8.0);
pub const CLAHE_TILE_SIZE: ParamRange<u32> = ParamRange::new(4, 16);
pub const LARGE_KERNEL_SIZE: ParamRange<u32> = ParamRange::new(3, 51);
pub const ADAPTIVE_BLOCK_RADIUS: ParamRange<u32> = ParamRange::new(1, 200);
pub const ADAPTIVE_C: ParamRange<i32> = ParamRange::new(0, 50);
pub const MANUAL_THRESHOLD: ParamRange<i32> = ParamRange::new(0, 255);
pub const THRESHOLD_OFFSET: ParamRange<i32> = ParamRange::new(-50, 50);
pub const MORPH_KERNEL_SIZE: ParamRange<u32> = ParamRange::new(3, 15);
pub const CONTOUR_MERGE_DISTANCE_MM: ParamRange<f64> = ParamRange::new(1.0, 20.0);
pub const MIN_CONTOUR_AREA: ParamRange<f64> = ParamRange::new(100.0, 10000.0);
pub const MIN_SOLIDITY: ParamRange<f64> = ParamRange::new(0.1, 1.0);
pub const MAX_ASPECT_RATIO: ParamRange<f64> = ParamRange::new(2.0, 30.0);
pub const POLYGON_EPSILON_FACTOR: ParamRange<f64> = ParamRange::new(0.001, 0.02);
pub const CORNER_WIN_SIZE: ParamRange<u32> = ParamRange::new(3, 15);
pub const MIN_PERIMETER: ParamRange<f64> = ParamRange::new(50.0, 2000.0);
pub const DILATION_AMOUNT_MM: ParamRange<f64> = ParamRange::new(0.0, 10.0);
pub const SMOOTHING_AMOUNT_MM: ParamRange<f64> = ParamRange::new(0.1, 2.0);

/// Everything that tunes a tracing run. Immutable for the duration of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingParameters {
    // Rectified output
    pub target_width_px: u32,
    pub target_height_px: u32,
    pub physical_width_mm: f64,
    pub physical_height_mm: f64,

    // Edge detection for the line-based corner fallback
    pub canny_low: f64,
    pub canny_high: f64,
    pub canny_aperture: u32,

    // Lighting normalization
    pub clahe_clip_limit: f64,
    pub clahe_tile_size: u32,

    // Lightbox mask
    pub lab_l_threshold: u8,
    pub lab_a_min: u8,
    pub lab_a_max: u8,
    pub lab_b_min: u8,
    pub lab_b_max: u8,
    pub large_kernel_size: u32,
    pub adaptive_block_radius: u32,
    pub adaptive_c: i32,
    pub adaptive_min_luminance: u8,

    // Object thresholding
    pub use_adaptive_threshold: bool,
    /// 0 selects the automatic threshold
    pub manual_threshold: i32,
    pub threshold_offset: i32,

    // Object cleanup
    pub disable_morphology: bool,
    pub morph_kernel_size: u32,
    pub merge_nearby_contours: bool,
    pub contour_merge_distance_mm: f64,

    // Contour filtering
    pub min_contour_area: f64,
    pub min_solidity: f64,
    pub max_aspect_ratio: f64,
    pub polygon_epsilon_factor: f64,
    pub force_convex: bool,

    // Corner refinement
    pub enable_subpixel_refinement: bool,
    pub corner_win_size: u32,

    // Validation
    pub validate_closed_contour: bool,
    pub min_perimeter: f64,

    // Manufacturing
    pub dilation_amount_mm: f64,
    pub enable_smoothing: bool,
    pub smoothing_amount_mm: f64,
    pub smoothing_mode: SmoothingMode,

    pub enable_debug_output: bool,
}

impl Default for ProcessingParameters {
    fn default() -> Self {
        Self {
            target_width_px: 3240,
            target_height_px: 3240,
            physical_width_mm: 162.0,
            physical_height_mm: 162.0,
            canny_low: 50.0,
            canny_high: 150.0,
            canny_aperture: 3,
            clahe_clip_limit: 2.0,
            clahe_tile_size: 8,
            lab_l_threshold: 150,
            lab_a_min: 110,
            lab_a_max: 145,
            lab_b_min: 110,
            lab_b_max: 145,
            large_kernel_size: 15,
            adaptive_block_radius: 25,
            adaptive_c: 5,
            adaptive_min_luminance: 75,
            use_adaptive_threshold: false,
            manual_threshold: 0,
            threshold_offset: 0,
            disable_morphology: false,
            morph_kernel_size: 5,
            merge_nearby_contours: true,
            contour_merge_distance_mm: 5.0,
            min_contour_area: 500.0,
            min_solidity: 0.3,
            max_aspect_ratio: 20.0,
            polygon_epsilon_factor: 0.005,
            force_convex: false,
            enable_subpixel_refinement: true,
            corner_win_size: 5,
            validate_closed_contour: true,
            min_perimeter: 100.0,
            dilation_amount_mm: 0.0,
            enable_smoothing: false,
            smoothing_amount_mm: 0.2,
            smoothing_mode: SmoothingMode::CurvatureBased,
            enable_debug_output: false,
        }
    }
}

impl ProcessingParameters {
    /// Reject the whole parameter set if any field is out of range.
    pub fn validate(&self) -> Result<()> {
        TARGET_SIZE_PX.check("target_width_px", self.target_width_px)?;
        TARGET_SIZE_PX.check("target_height_px", self.target_height_px)?;
        PHYSICAL_SIZE_MM.check("physical_width_mm", self.physical_width_mm)?;
        PHYSICAL_SIZE_MM.check("physical_height_mm", self.physical_height_mm)?;

        CANNY_LOW.check("canny_low", self.canny_low)?;
        CANNY_HIGH.check("canny_high", self.canny_high)?;
        if self.canny_low >= self.canny_high {
            return Err(TraceError::invalid(format!(
                "canny_low ({}) must be below canny_high ({})",
                self.canny_low, self.canny_high
            )));
        }
        if !CANNY_APERTURES.contains(&self.canny_aperture) {
            return Err(TraceError::invalid(format!(
                "canny_aperture = {} must be one of 3, 5 or 7",
                self.canny_aperture
            )));
        }

        CLAHE_CLIP_LIMIT.check("clahe_clip_limit", self.clahe_clip_limit)?;
        CLAHE_TILE_SIZE.check("clahe_tile_size", self.clahe_tile_size)?;

        if self.lab_a_min > self.lab_a_max || self.lab_b_min > self.lab_b_max {
            return Err(TraceError::invalid("neutral chroma band has min above max"));
        }
        LARGE_KERNEL_SIZE.check("large_kernel_size", self.large_kernel_size)?;
        if self.large_kernel_size % 2 == 0 {
            return Err(TraceError::invalid(format!(
                "large_kernel_size = {} must be odd",
                self.large_kernel_size
            )));
        }
        ADAPTIVE_BLOCK_RADIUS.check("adaptive_block_radius", self.adaptive_block_radius)?;
        ADAPTIVE_C.check("adaptive_c", self.adaptive_c)?;

        MANUAL_THRESHOLD.check("manual_threshold", self.manual_threshold)?;
        THRESHOLD_OFFSET.check("threshold_offset", self.threshold_offset)?;
        MORPH_KERNEL_SIZE.check("morph_kernel_size", self.morph_kernel_size)?;
        CONTOUR_MERGE_DISTANCE_MM.check("contour_merge_distance_mm", self.contour_merge_distance_mm)?;

        MIN_CONTOUR_AREA.check("min_contour_area", self.min_contour_area)?;
        MIN_SOLIDITY.check("min_solidity", self.min_solidity)?;
        MAX_ASPECT_RATIO.check("max_aspect_ratio", self.max_aspect_ratio)?;
        POLYGON_EPSILON_FACTOR.check("polygon_epsilon_factor", self.polygon_epsilon_factor)?;
        CORNER_WIN_SIZE.check("corner_win_size", self.corner_win_size)?;
        MIN_PERIMETER.check("min_perimeter", self.min_perimeter)?;
        DILATION_AMOUNT_MM.check("dilation_amount_mm", self.dilation_amount_mm)?;
        SMOOTHING_AMOUNT_MM.check("smoothing_amount_mm", self.smoothing_amount_mm)?;

        Ok(())
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| TraceError::invalid(format!("malformed parameters: {e}")))
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| TraceError::invalid(format!("cannot serialize parameters: {e}")))
    }

    /// Load a (possibly partial) JSON parameter file; missing fields keep
    /// their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            TraceError::invalid(format!("cannot read parameters {}: {e}", path.display()))
        })?;
        Self::from_json(&text)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_json()?).map_err(|e| {
            TraceError::invalid(format!("cannot write parameters {}: {e}", path.display()))
        })
    }
}
