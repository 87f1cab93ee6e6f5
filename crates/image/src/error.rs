//! Error types for the memimage crate.

use thiserror::Error;

/// Result type alias for image operations.
pub type Result<T> = std::result::Result<T, ImageError>;

/// Errors that can occur during image operations.
///
/// Environmental problems (undecodable bytes, unreadable sources, unknown
/// transforms) are not represented here; those degrade to empty results.
#[derive(Debug, Error)]
pub enum ImageError {
    /// A raster operation was called on a bitmap without a decoded raster
    #[error("Invalid state: {0}")]
    InvalidState(&'static str),

    /// Unknown format identifier
    #[error("Unknown image format: {0}")]
    UnknownFormat(String),

    /// Configuration could not be read or parsed
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Image processing error
    #[error("Image processing error: {0}")]
    ProcessingError(#[from] image::ImageError),
}
