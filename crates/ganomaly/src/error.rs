use std::path::PathBuf;

/// Errors raised by training, evaluation, and checkpoint I/O.
#[derive(Debug, thiserror::Error)]
pub enum GanomalyError {
    /// Incoming batch does not match the configured input geometry.
    #[error("Shape mismatch: expected {expected}, got {actual}")]
    ShapeMismatch { expected: String, actual: String },

    /// A requested checkpoint file does not exist.
    #[error("Weights not found: {}", .0.display())]
    WeightsNotFound(PathBuf),

    /// Option values that cannot describe a runnable model.
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// A data stream produced no batches.
    #[error("Data stream '{0}' is empty")]
    EmptyStream(String),

    /// ROC metrics need both normal and abnormal samples.
    #[error("ROC needs both classes, got only label {0}")]
    SingleClassLabels(i64),

    /// An operation was called before the step that produces its inputs.
    #[error("Not ready: {0}")]
    NotReady(&'static str),

    /// Malformed dataset contents.
    #[error("Data error: {0}")]
    Data(String),

    /// Tensor data could not be read back to the host.
    #[error("Tensor read error: {0}")]
    TensorRead(String),

    /// Failure saving or loading network weights.
    #[error("Recorder error: {0}")]
    Recorder(#[from] burn::record::RecorderError),

    /// Failure decoding or encoding an image file.
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// JSON (de)serialization of checkpoint metadata or options.
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Filesystem error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl GanomalyError {
    pub(crate) fn shape(expected: impl std::fmt::Debug, actual: impl std::fmt::Debug) -> Self {
        GanomalyError::ShapeMismatch {
            expected: format!("{expected:?}"),
            actual: format!("{actual:?}"),
        }
    }
}

pub type Result<T> = std::result::Result<T, GanomalyError>;
