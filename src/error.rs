//! Error types for model loading and per-request inference.

use std::path::PathBuf;

use thiserror::Error;

/// Startup failure while bringing the classifier up. Always fatal.
#[derive(Debug, Error)]
pub enum ModelLoadError {
    /// Model file does not exist or is not a regular file
    #[error("model file not found: {}", .0.display())]
    Missing(PathBuf),

    /// Runtime could not parse the model file
    #[error("model file {} is corrupt or unreadable: {reason}", .path.display())]
    Corrupt {
        /// Offending file
        path: PathBuf,
        /// Runtime message
        reason: String,
    },

    /// ONNX Runtime itself failed (environment, execution provider)
    #[error("onnx runtime error: {0}")]
    Runtime(String),

    /// Model inputs/outputs do not look like an image classifier
    #[error("unexpected model architecture: {0}")]
    Architecture(String),

    /// Classification head width differs from the configured class names
    #[error("classification head has {actual} outputs but {expected} class names are configured")]
    ClassCountMismatch {
        /// Number of configured class names
        expected: usize,
        /// Width of the model output
        actual: usize,
    },
}

/// The uploaded bytes are not a usable image.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("empty image payload")]
    Empty,

    #[error("invalid image: {0}")]
    Image(#[from] image::ImageError),

    #[error("image data is truncated ({0:?} stream has no end marker)")]
    Truncated(image::ImageFormat),

    #[error("image has zero width or height ({width}x{height})")]
    ZeroSized { width: u32, height: u32 },
}

/// Failure inside the forward pass or tensor handling.
#[derive(Debug, Error)]
#[error("inference failed: {0}")]
pub struct InferenceError(pub String);

impl From<ort::Error> for InferenceError {
    fn from(e: ort::Error) -> Self {
        InferenceError(e.to_string())
    }
}

impl From<ndarray::ShapeError> for InferenceError {
    fn from(e: ndarray::ShapeError) -> Self {
        InferenceError(format!("unexpected tensor shape: {e}"))
    }
}

/// Anything that can go wrong for a single prediction.
#[derive(Debug, Error)]
pub enum PredictError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Inference(#[from] InferenceError),
}

impl PredictError {
    /// Whether the caller sent bad input, as opposed to a server fault.
    pub fn is_client_error(&self) -> bool {
        matches!(self, PredictError::Decode(_))
    }
}

/// Problems with a class labels file.
#[derive(Debug, Error)]
pub enum LabelError {
    #[error("failed to read labels file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("labels file {} contains no class names", .0.display())]
    Empty(PathBuf),

    #[error("duplicate class name {0:?}")]
    Duplicate(String),
}
