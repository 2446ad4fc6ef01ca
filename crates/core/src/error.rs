//! Error types for the qslice extraction pipeline.

use thiserror::Error;

/// Primary error type for extraction operations.
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("PDF not found: {0}")]
    PdfNotFound(std::path::PathBuf),

    #[error("document has no pages")]
    EmptyDocument,

    #[error("page index out of range: {index} (page count {count})")]
    PageOutOfRange { index: usize, count: usize },

    #[error("invalid clip region: {0}")]
    InvalidClip(String),

    #[error("invalid region geometry: {0}")]
    InvalidRect(String),

    #[error("invalid marks: {0}")]
    InvalidMarks(String),

    #[error("no content found for question span")]
    EmptyComposite,

    #[error("unsupported schema version: {found} (expected {expected})")]
    SchemaVersionMismatch { found: u32, expected: u32 },

    #[error("malformed cache file {path}: {msg}")]
    MalformedCache { path: std::path::PathBuf, msg: String },

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("render error: {0}")]
    RenderError(String),

    #[error("write queue error: {0}")]
    WriteQueue(String),
}

/// Convenience Result type alias for ExtractError.
pub type Result<T> = std::result::Result<T, ExtractError>;
