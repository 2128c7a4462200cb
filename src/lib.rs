pub mod config;
pub mod debug;
pub mod detection;
pub mod error;
pub mod export;
pub mod geometry;
pub mod models;
pub mod outline;
pub mod pipeline;

pub use config::{ProcessingParameters, SmoothingMode};
pub use debug::{DebugArtifact, DebugSink, DirectorySink, MemorySink};
pub use error::{ErrorKind, Result, TraceError};
pub use models::{CornerSet, PipelineStage, PixelScale, Point2D, Polygon};
pub use outline::ValidationReport;
pub use pipeline::{
    ErrorSink, MetadataValue, PipelineContext, PipelineData, PipelineStep, ProgressSink,
    StageOutput, StagedPipeline, TraceOutcome,
};
