//! Memory-backed image storage.
//!
//! This crate provides:
//! - Format detection from magic bytes
//! - A decoded bitmap handle with scratch-file encoding
//! - Images stored as blobs in a record rather than as files
//! - Base64 and data-URI conversion
//! - Formatted (resized, cropped, padded) variants via named transforms

#![warn(missing_docs)]

mod bitmap;
mod blob;
mod config;
mod detect;
mod error;
mod formatted;
pub mod markup;
mod memory;
mod source;
mod transform;

pub use bitmap::{Bitmap, DEFAULT_QUALITY};
pub use blob::{decode_base64_lenient, encode_base64, Blob};
pub use config::{ConfigSchema, ImageConfig};
pub use detect::{FormatRegistry, ImageFormat, Signature, STANDARD_SIGNATURES};
pub use error::{ImageError, Result};
pub use formatted::{FormattedImageGenerator, DEFAULT_MEMO_BYTES};
pub use memory::{
    BeforeWrite, Dimension, DimensionMode, ImageRecord, MemoryImage, PendingUpload,
    DIMENSIONS_NOT_INITIALIZED, PARENT_SENTINEL,
};
pub use source::{is_url, read_file, read_resource, FileImage, ImageSource};
pub use transform::{TransformFn, TransformRegistry};
