use std::fmt;
use thiserror::Error;

/// Result alias used throughout the library.
pub type Result<T> = std::result::Result<T, TraceError>;

/// Minimum accepted input size (both dimensions), in pixels.
pub const MIN_IMAGE_SIZE: u32 = 100;

/// Errors that abort a tracing run.
#[derive(Error, Debug)]
pub enum TraceError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("failed to load image: {0}")]
    ImageLoad(String),

    #[error("image too small: {width}x{height} (minimum 100x100 pixels required)")]
    ImageTooSmall { width: u32, height: u32 },

    #[error("could not detect the lightbox boundary - ensure all four edges are visible")]
    NoBoundaryFound,

    #[error("no object found: {0}")]
    NoObjectFound(String),

    #[error("contour failed validation: {0}")]
    ValidationFailed(String),

    #[error("failed to write debug output: {0}")]
    DebugOutput(String),
}

/// Coarse classification of a [`TraceError`], handed to error sinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidInput,
    ImageLoad,
    ImageTooSmall,
    NoBoundaryFound,
    NoObjectFound,
    ValidationFailed,
    DebugOutput,
}

impl TraceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TraceError::InvalidInput(_) => ErrorKind::InvalidInput,
            TraceError::ImageLoad(_) => ErrorKind::ImageLoad,
            TraceError::ImageTooSmall { .. } => ErrorKind::ImageTooSmall,
            TraceError::NoBoundaryFound => ErrorKind::NoBoundaryFound,
            TraceError::NoObjectFound(_) => ErrorKind::NoObjectFound,
            TraceError::ValidationFailed(_) => ErrorKind::ValidationFailed,
            TraceError::DebugOutput(_) => ErrorKind::DebugOutput,
        }
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        TraceError::InvalidInput(msg.into())
    }
}

impl ErrorKind {
    /// Stable snake_case identifier, suitable for logs and exit messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::ImageLoad => "image_load_failed",
            ErrorKind::ImageTooSmall => "image_too_small",
            ErrorKind::NoBoundaryFound => "no_boundary_found",
            ErrorKind::NoObjectFound => "no_object_found",
            ErrorKind::ValidationFailed => "validation_failed",
            ErrorKind::DebugOutput => "debug_output_failed",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
