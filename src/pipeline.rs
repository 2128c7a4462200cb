use crate::config::ProcessingParameters;
use crate::debug::{DebugArtifact, DebugSink, DirectorySink};
use crate::detection::{self, preprocessing};
use crate::error::{ErrorKind, Result, TraceError};
use crate::models::{CornerSet, PipelineStage, PixelScale, Polygon};
use crate::outline::ValidationReport;
use image::{DynamicImage, GrayImage, RgbImage};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Metadata value types
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataValue {
    Bool(bool),
    Float(f64),
    String(String),
    Int(i64),
}

/// Data that flows through the pipeline.
///
/// Owned by a single run; each step consumes it and hands back the next
/// stage's state.
#[derive(Clone)]
pub struct PipelineData {
    /// Raster representing the current stage
    pub image: DynamicImage,

    /// The image the run started from (shared via Arc)
    pub original: Arc<DynamicImage>,

    /// Last stage completed
    pub stage: PipelineStage,

    /// Lightbox corners in source coordinates
    pub corners: Option<CornerSet>,

    /// Pixels per mm of the rectified frame
    pub scale: Option<PixelScale>,

    /// Rectified color image
    pub rectified: Option<RgbImage>,

    /// Lighting-normalized rectified grayscale
    pub normalized: Option<GrayImage>,

    /// Cleaned object mask
    pub object_mask: Option<GrayImage>,

    /// Current outline (lightbox quad until the object is found)
    pub polygon: Polygon,

    pub validation: Option<ValidationReport>,

    /// Metadata for tracking decisions (e.g. "corner_strategy", "threshold_level")
    pub metadata: HashMap<String, MetadataValue>,

    /// Debug images collected so far, flushed once at the end of the run
    pub artifacts: Vec<DebugArtifact>,
}

impl PipelineData {
    /// Create PipelineData for a freshly loaded image
    pub fn from_image(image: DynamicImage) -> Self {
        let gray = preprocessing::to_grayscale(&image);
        Self {
            image: DynamicImage::ImageLuma8(gray),
            original: Arc::new(image),
            stage: PipelineStage::Loaded,
            corners: None,
            scale: None,
            rectified: None,
            normalized: None,
            object_mask: None,
            polygon: Polygon::empty(),
            validation: None,
            metadata: HashMap::new(),
            artifacts: Vec::new(),
        }
    }

    /// Add metadata
    pub fn set_metadata(&mut self, key: impl Into<String>, value: MetadataValue) {
        self.metadata.insert(key.into(), value);
    }

    /// Get metadata as bool
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.metadata.get(key) {
            Some(MetadataValue::Bool(v)) => Some(*v),
            _ => None,
        }
    }

    /// Get metadata as float
    pub fn get_float(&self, key: &str) -> Option<f64> {
        match self.metadata.get(key) {
            Some(MetadataValue::Float(v)) => Some(*v),
            _ => None,
        }
    }

    /// Get metadata as int
    pub fn get_int(&self, key: &str) -> Option<i64> {
        match self.metadata.get(key) {
            Some(MetadataValue::Int(v)) => Some(*v),
            _ => None,
        }
    }

    /// Get metadata as string
    pub fn get_string(&self, key: &str) -> Option<&str> {
        match self.metadata.get(key) {
            Some(MetadataValue::String(v)) => Some(v.as_str()),
            _ => None,
        }
    }

    /// Record a debug image if diagnostics are on. The closure is only
    /// evaluated when needed.
    pub fn push_debug<F>(&mut self, context: &PipelineContext, name: &str, image: F)
    where
        F: FnOnce() -> DynamicImage,
    {
        if context.debug {
            self.artifacts.push(DebugArtifact::new(name, image()));
        }
    }

    /// Snapshot of the externally visible state
    pub fn to_output(&self) -> StageOutput {
        StageOutput {
            stage: self.stage,
            image: self.image.clone(),
            polygon: self.polygon.clone(),
            scale: self.scale,
            corners: self.corners,
            metadata: self.metadata.clone(),
            artifacts: self.artifacts.clone(),
        }
    }
}

/// Take a field a previous step must have filled in
pub(crate) fn require<T>(value: Option<T>, what: &str, stage: PipelineStage) -> Result<T> {
    value.ok_or_else(|| TraceError::invalid(format!("{what} is missing before stage '{stage}'")))
}

/// What a caller sees of a stage
#[derive(Debug, Clone, PartialEq)]
pub struct StageOutput {
    pub stage: PipelineStage,
    pub image: DynamicImage,
    pub polygon: Polygon,
    pub scale: Option<PixelScale>,
    pub corners: Option<CornerSet>,
    pub metadata: HashMap<String, MetadataValue>,
    /// Empty when a debug sink received the artifacts
    pub artifacts: Vec<DebugArtifact>,
}

/// Result of a complete run
#[derive(Debug, Clone)]
pub struct TraceOutcome {
    /// Final outline in rectified pixel coordinates
    pub polygon: Polygon,
    pub scale: PixelScale,
    pub report: ValidationReport,
    pub corners: CornerSet,
    /// Rectified frame size in pixels
    pub frame_width: u32,
    pub frame_height: u32,
    pub metadata: HashMap<String, MetadataValue>,
    pub artifacts: Vec<DebugArtifact>,
}

/// Context available to all pipeline steps
#[derive(Clone, Debug)]
pub struct PipelineContext {
    pub verbose: bool,
    /// Collect debug artifacts
    pub debug: bool,
    pub params: ProcessingParameters,
}

/// Trait that all pipeline steps must implement
pub trait PipelineStep: Send + Sync {
    /// Advance the run by one stage
    fn process(&self, data: PipelineData, context: &PipelineContext) -> Result<PipelineData>;

    /// Human-readable name for this step (used in verbose output)
    fn name(&self) -> &str;

    /// The stage reached once this step succeeds
    fn stage(&self) -> PipelineStage;
}

/// Receives `(fraction, label)` after every completed stage
pub trait ProgressSink {
    fn report(&mut self, fraction: f64, label: &str);
}

impl<F: FnMut(f64, &str)> ProgressSink for F {
    fn report(&mut self, fraction: f64, label: &str) {
        self(fraction, label)
    }
}

/// Receives fatal errors before they are returned
pub trait ErrorSink {
    fn report(&mut self, kind: ErrorKind, message: &str);
}

impl<F: FnMut(ErrorKind, &str)> ErrorSink for F {
    fn report(&mut self, kind: ErrorKind, message: &str) {
        self(kind, message)
    }
}

/// Staged lightbox tracing pipeline
pub struct StagedPipeline {
    steps: Vec<Arc<dyn PipelineStep>>,
    context: PipelineContext,
    progress: Option<Box<dyn ProgressSink>>,
    errors: Option<Box<dyn ErrorSink>>,
    debug_sink: Option<Box<dyn DebugSink>>,
}

impl StagedPipeline {
    /// Validate `params` and build the standard step list
    pub fn new(params: ProcessingParameters) -> Result<Self> {
        params.validate()?;
        let debug = params.enable_debug_output;
        Ok(Self {
            steps: detection::build_standard_steps(),
            context: PipelineContext {
                verbose: false,
                debug,
                params,
            },
            progress: None,
            errors: None,
            debug_sink: None,
        })
    }

    /// Enable verbose output
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.context.verbose = verbose;
        self
    }

    pub fn with_progress(mut self, sink: impl ProgressSink + 'static) -> Self {
        self.progress = Some(Box::new(sink));
        self
    }

    pub fn with_error_sink(mut self, sink: impl ErrorSink + 'static) -> Self {
        self.errors = Some(Box::new(sink));
        self
    }

    /// Collect debug artifacts and hand them to `sink` at the end of each run
    pub fn with_debug_sink(mut self, sink: impl DebugSink + 'static) -> Self {
        self.debug_sink = Some(Box::new(sink));
        self.context.debug = true;
        self
    }

    /// Enable debug mode with output directory.
    /// The directory must be empty or non-existent
    pub fn with_debug_dir(self, output_dir: PathBuf) -> Result<Self> {
        let sink = DirectorySink::new(output_dir)?.with_verbose(self.context.verbose);
        Ok(self.with_debug_sink(sink))
    }

    pub fn params(&self) -> &ProcessingParameters {
        &self.context.params
    }

    /// Names of the steps in execution order
    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    /// Run the pipeline but stop once `target` is reached
    pub fn run_to_stage(&mut self, input: &DynamicImage, target: PipelineStage) -> Result<StageOutput> {
        let (data, _) = self.execute(input, target, false)?;
        let mut output = data.to_output();
        if self.debug_sink.is_some() {
            output.artifacts.clear();
        }
        Ok(output)
    }

    /// Run every stage and return the validated outline
    pub fn run(&mut self, input: &DynamicImage) -> Result<TraceOutcome> {
        let (data, _) = self.execute(input, PipelineStage::Final, false)?;
        let stage = PipelineStage::Final;
        let scale = require(data.scale, "pixel scale", stage)?;
        let corners = require(data.corners, "lightbox corners", stage)?;
        let report = require(data.validation, "validation report", stage)?;
        let (frame_width, frame_height) = (data.image.width(), data.image.height());
        let artifacts = if self.debug_sink.is_some() {
            Vec::new()
        } else {
            data.artifacts
        };

        Ok(TraceOutcome {
            polygon: data.polygon,
            scale,
            report,
            corners,
            frame_width,
            frame_height,
            metadata: data.metadata,
            artifacts,
        })
    }

    /// Run to `target`, keeping the output of every stage reached
    pub fn run_with_snapshots(
        &mut self,
        input: &DynamicImage,
        target: PipelineStage,
    ) -> Result<Vec<StageOutput>> {
        let (_, mut snapshots) = self.execute(input, target, true)?;
        if self.debug_sink.is_some() {
            for snapshot in &mut snapshots {
                snapshot.artifacts.clear();
            }
        }
        Ok(snapshots)
    }

    fn execute(
        &mut self,
        input: &DynamicImage,
        target: PipelineStage,
        keep_snapshots: bool,
    ) -> Result<(PipelineData, Vec<StageOutput>)> {
        if let Err(e) = preprocessing::check_image_size(input) {
            self.report_error(&e);
            return Err(e);
        }

        let mut data = PipelineData::from_image(input.clone());
        let original = data.original.clone();
        data.push_debug(&self.context, "input", || original.as_ref().clone());

        let mut snapshots = Vec::new();
        self.report_progress(PipelineStage::Loaded);
        if keep_snapshots {
            snapshots.push(data.to_output());
        }

        let steps = self.steps.clone();
        for step in &steps {
            let stage = step.stage();
            if stage > target {
                break;
            }
            if self.context.verbose {
                log::info!("Running step: {} -> {}", step.name(), stage);
            } else {
                log::debug!("Running step: {} -> {}", step.name(), stage);
            }

            match step.process(data, &self.context) {
                Ok(next) => data = next,
                Err(e) => {
                    // Artifacts of the failed run are lost with `data`
                    self.report_error(&e);
                    return Err(e);
                }
            }
            data.stage = stage;

            self.report_progress(stage);
            if keep_snapshots {
                snapshots.push(data.to_output());
            }
        }

        if let Some(sink) = self.debug_sink.as_mut() {
            let count = data.artifacts.len();
            if let Err(e) = sink.flush(std::mem::take(&mut data.artifacts)) {
                self.report_error(&e);
                return Err(e);
            }
            log::debug!("Flushed {} debug artifacts", count);
        }

        Ok((data, snapshots))
    }

    fn report_progress(&mut self, stage: PipelineStage) {
        let fraction = (stage.ordinal() + 1) as f64 / PipelineStage::COUNT as f64;
        if let Some(progress) = self.progress.as_mut() {
            progress.report(fraction, stage.name());
        }
    }

    fn report_error(&mut self, error: &TraceError) {
        log::error!("{} ({})", error, error.kind());
        if let Some(errors) = self.errors.as_mut() {
            errors.report(error.kind(), &error.to_string());
        }
    }
}
