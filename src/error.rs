use std::path::PathBuf;

use crate::core::capture::BufferKind;

/// Configuration loading and validation failures
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read configuration file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Configuration validation error: {0}")]
    Validation(String),
}

/// Framebuffer readback did not match what the capture step expected
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("{kind} buffer is {actual_width}x{actual_height}, expected {expected_width}x{expected_height}")]
    SizeMismatch {
        kind: BufferKind,
        expected_width: u32,
        expected_height: u32,
        actual_width: u32,
        actual_height: u32,
    },

    #[error("{kind} buffer has {actual} channels, expected {expected}")]
    ChannelMismatch {
        kind: BufferKind,
        expected: usize,
        actual: usize,
    },

    #[error("{kind} buffer holds {actual} values, expected {expected}")]
    Truncated {
        kind: BufferKind,
        expected: usize,
        actual: usize,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("Sender name must not be empty")]
    EmptySenderName,

    #[error("Sender name '{0}' must be a single file name without path separators")]
    InvalidSenderName(String),

    #[error("Channel '{0}' was already released")]
    Released(String),

    #[error("Texture is {actual} values, expected {expected} for {width}x{height}")]
    TextureSize {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },

    #[error("Shared frame I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Domain dimensions must be non-zero, got {0:?}")]
    EmptyDomain([u32; 3]),

    #[error("Field '{field}' has {actual} cells, domain needs {expected}")]
    ShapeMismatch {
        field: String,
        expected: usize,
        actual: usize,
    },

    #[error("Dataset has no field named '{0}'")]
    UnknownField(String),

    #[error("Dataset has no fields")]
    NoFields,
}

#[derive(Debug, thiserror::Error)]
pub enum PromptError {
    #[error("Input ended before a valid {0} was entered")]
    Eof(&'static str),

    #[error("Terminal I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Umbrella error for the capture-and-publish pipeline
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Publish(#[from] PublishError),

    #[error(transparent)]
    Dataset(#[from] DatasetError),

    #[error(transparent)]
    Prompt(#[from] PromptError),

    #[error("Snapshot failed: {0}")]
    Snapshot(#[from] image::ImageError),

    #[error("GPU error: {0}")]
    Gpu(String),
}

impl BridgeError {
    pub fn gpu(message: impl Into<String>) -> Self {
        BridgeError::Gpu(message.into())
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
