use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by implementations of the GPU contract. All of these indicate a
/// configuration defect and are propagated to the caller.
#[derive(Debug, Error)]
pub enum GpuError {
    #[error("framebuffer has no attachments")]
    NoAttachments,
    #[error("framebuffer dimensions must be nonzero (got {width}x{height})")]
    ZeroSize { width: u32, height: u32 },
    #[error("too many color attachments: {count} requested, at most {max} supported")]
    TooManyAttachments { count: usize, max: usize },
    #[error("color attachment {index} out of range (framebuffer has {count})")]
    AttachmentOutOfRange { index: usize, count: usize },
    #[error("shader not found: {0}")]
    ShaderNotFound(String),
    #[error("shader `{name}` failed to compile: {message}")]
    ShaderCompile { name: String, message: String },
    #[error("shader `{shader}` requires define `{define}`")]
    MissingDefine { shader: String, define: String },
    #[error("texture data has {actual} floats, expected {expected}")]
    TextureSize { expected: usize, actual: usize },
    #[error("program has no binding named `{0}`")]
    UnknownBinding(String),
    #[error("texture `{0}` is read by the program but was never bound")]
    UnboundTexture(String),
    #[error("texture is bound as input while being rendered to")]
    FeedbackLoop,
    #[error("device error: {0}")]
    Device(String),
}

#[derive(Debug, Error)]
pub enum SerializationError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Image(#[from] image::ImageError),
    #[error("{path}:{line}: {message}")]
    Format {
        path: PathBuf,
        line: usize,
        message: String,
    },
    #[error("weight image {path} is {actual:?}, expected {expected:?}")]
    Dimensions {
        path: PathBuf,
        expected: (u32, u32),
        actual: (u32, u32),
    },
}

#[derive(Debug, Error)]
pub enum FitError {
    #[error(transparent)]
    Gpu(#[from] GpuError),
    #[error(transparent)]
    Serialization(#[from] SerializationError),
    #[error("input weights must be set before executing the fit")]
    MissingInputWeights,
    #[error("invalid basis: {0}")]
    InvalidBasis(String),
}
