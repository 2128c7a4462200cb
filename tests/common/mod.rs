mod fixtures;
pub use fixtures::*;

// Re-export commonly used types from lightbox_trace for tests
pub use lightbox_trace::{
    ErrorKind, PipelineStage, ProcessingParameters, StagedPipeline, TraceError,
};

/// Route library logging to the test harness
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
