//! Memory-backed image entity.
//!
//! A [`MemoryImage`] keeps its encoded bytes in a record field instead of a
//! file. It knows how to ingest bytes from raw data, base64 text, files, URLs
//! and other images, and how to derive resized/cropped variants as new
//! entities.
//!
//! # Example
//! ```
//! use memimage::{MemoryImage, ImageFormat};
//!
//! let mut image = MemoryImage::new();
//! image.set_content(b"GIF89a\x01\x00\x01\x00".to_vec(), None);
//!
//! assert!(image.exists());
//! assert_eq!(image.determine_format(), ImageFormat::Gif);
//! assert!(image.filename().ends_with(".gif"));
//! ```

use crate::bitmap::Bitmap;
use crate::blob::{decode_base64_lenient, Blob};
use crate::config::ImageConfig;
use crate::detect::ImageFormat;
use crate::error::Result;
use crate::formatted::FormattedImageGenerator;
use crate::markup;
use crate::source::{read_file, read_resource, ImageSource};
use image::GenericImageView;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

/// Parent reference of images whose bytes do not live in the file tree.
pub const PARENT_SENTINEL: i64 = -1;

/// Returned by text-mode dimension queries when content cannot be decoded.
pub const DIMENSIONS_NOT_INITIALIZED: &str = "image not initialized";

/// Length of the random part of generated filenames.
const SUFFIX_LEN: usize = 7;

/// A physical upload attached by the persistence layer, consumed before save.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingUpload {
    /// Upload name as submitted
    pub name: String,
    /// Where the uploaded file was placed
    pub path: PathBuf,
}

impl PendingUpload {
    /// Upload `name` stored at `path`.
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }
}

/// Fields persisted for one image row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRecord {
    /// Encoded image bytes
    pub content: Option<Blob>,
    /// Filename with extension
    pub filename: String,
    /// Display title
    pub title: String,
    /// Parent folder, or [`PARENT_SENTINEL`]
    pub parent_id: i64,
}

/// Which dimension a [`MemoryImage::dimensions`] query asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DimensionMode {
    /// `"<width>x<height>"`
    Text,
    /// Width in pixels (index 0)
    Width,
    /// Height in pixels (index 1)
    Height,
}

impl DimensionMode {
    /// Mode for a numeric index: 0 is width, 1 is height.
    pub fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(DimensionMode::Width),
            1 => Some(DimensionMode::Height),
            _ => None,
        }
    }
}

impl FromStr for DimensionMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "string" | "text" => Ok(DimensionMode::Text),
            "0" | "width" => Ok(DimensionMode::Width),
            "1" | "height" => Ok(DimensionMode::Height),
            other => Err(format!("unknown dimension mode: {other}")),
        }
    }
}

/// Result of a dimension query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dimension {
    /// Text form, either `"<width>x<height>"` or [`DIMENSIONS_NOT_INITIALIZED`]
    Text(String),
    /// A single dimension in pixels
    Pixels(u32),
}

impl Dimension {
    /// Pixel count, `None` for the text form.
    pub fn pixels(&self) -> Option<u32> {
        match self {
            Dimension::Pixels(px) => Some(*px),
            Dimension::Text(_) => None,
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dimension::Text(text) => f.write_str(text),
            Dimension::Pixels(px) => write!(f, "{px}"),
        }
    }
}

/// Pre-save callback run by the persistence layer.
pub trait BeforeWrite {
    /// Bring the record into its storable state.
    fn on_before_write(&mut self);
}

/// An image whose bytes live in the record itself.
///
/// Not synchronised: share across threads only behind external locking.
#[derive(Debug, Clone)]
pub struct MemoryImage {
    content: Option<Blob>,
    filename: String,
    title: String,
    parent_id: i64,
    pending_upload: Option<PendingUpload>,
    config: Arc<ImageConfig>,
}

impl MemoryImage {
    /// Empty image with default configuration.
    pub fn new() -> Self {
        Self::with_config(Arc::new(ImageConfig::default()))
    }

    /// Empty image sharing `config`.
    pub fn with_config(config: Arc<ImageConfig>) -> Self {
        Self {
            content: None,
            filename: String::new(),
            title: String::new(),
            parent_id: PARENT_SENTINEL,
            pending_upload: None,
            config,
        }
    }

    /// Rebuild from persisted fields.
    pub fn from_record(record: ImageRecord, config: Arc<ImageConfig>) -> Self {
        Self {
            content: record.content,
            filename: record.filename,
            title: record.title,
            parent_id: record.parent_id,
            pending_upload: None,
            config,
        }
    }

    /// Fields to persist.
    pub fn record(&self) -> ImageRecord {
        ImageRecord {
            content: self.content.clone(),
            filename: self.filename.clone(),
            title: self.title.clone(),
            parent_id: self.parent_id,
        }
    }

    /// Shared configuration.
    pub fn config(&self) -> &Arc<ImageConfig> {
        &self.config
    }

    /// Stored bytes.
    pub fn content(&self) -> Option<&[u8]> {
        self.content.as_ref().map(Blob::as_bytes)
    }

    /// Filename, empty when none has been computed yet.
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Replace the filename. An empty name is regenerated on the next ingestion.
    pub fn set_filename(&mut self, filename: impl Into<String>) {
        self.filename = filename.into();
    }

    /// Display title.
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Set the display title.
    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = title.into();
    }

    /// Parent folder reference.
    pub fn parent_id(&self) -> i64 {
        self.parent_id
    }

    /// Upload waiting to be consumed by [`BeforeWrite::on_before_write`].
    pub fn pending_upload(&self) -> Option<&PendingUpload> {
        self.pending_upload.as_ref()
    }

    /// Attach a physical upload placed under folder `parent_id`.
    ///
    /// Existing content stays until the pre-save hook replaces it.
    pub fn attach_upload(&mut self, parent_id: i64, upload: PendingUpload) {
        self.parent_id = parent_id;
        self.pending_upload = Some(upload);
    }

    /// True when content is present and non-empty.
    pub fn exists(&self) -> bool {
        self.content.as_ref().is_some_and(|c| !c.is_empty())
    }

    /// Store `data` as the image content.
    ///
    /// The filename becomes `filename` when given. Otherwise an existing
    /// filename is kept, and a missing one is generated with the extension
    /// of the detected format.
    pub fn set_content(&mut self, data: Vec<u8>, filename: Option<&str>) {
        self.ingest(Some(data), filename);
    }

    /// Decode base64 `text` and store the result.
    ///
    /// Malformed input never fails; see [`decode_base64_lenient`].
    pub fn set_base64(&mut self, text: &str, filename: Option<&str>) {
        self.set_content(decode_base64_lenient(text), filename);
    }

    /// Content as base64, `None` without content.
    pub fn base64(&self) -> Option<String> {
        self.content.as_ref().map(Blob::base64)
    }

    /// Copy the content of another image.
    ///
    /// A source that does not exist leaves this image without content.
    pub fn copy_from(&mut self, source: &dyn ImageSource, filename: Option<&str>) -> &mut Self {
        let data = if source.exists() { source.read_bytes() } else { None };
        self.ingest(data, filename);
        self
    }

    /// Read content from a filesystem path or http(s) URL.
    ///
    /// A read failure leaves this image without content.
    pub fn copy_from_path(&mut self, locator: &str, filename: Option<&str>) -> &mut Self {
        let data = read_resource(locator);
        self.ingest(data, filename);
        self
    }

    /// Read content from the file at `path`, whatever its name looks like.
    ///
    /// A read failure leaves this image without content.
    pub fn copy_from_file(&mut self, path: &Path, filename: Option<&str>) -> &mut Self {
        let data = read_file(path);
        self.ingest(data, filename);
        self
    }

    /// Write the content verbatim to `path`.
    pub fn save_to_path(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, self.content().unwrap_or_default())?;
        Ok(())
    }

    /// Format detected from the current content.
    pub fn determine_format(&self) -> ImageFormat {
        self.config.registry.detect(self.content().unwrap_or_default())
    }

    /// Derive a new image by applying `transform`.
    ///
    /// The source is left untouched; the result is a fresh entity carrying
    /// the source title. `None` when there is no content or nothing could be
    /// generated.
    pub fn formatted_image(
        &self,
        generator: &FormattedImageGenerator,
        transform: &str,
        arg1: Option<u32>,
        arg2: Option<u32>,
    ) -> Option<MemoryImage> {
        if !self.exists() {
            return None;
        }

        let data = generator.generate(self, transform, arg1, arg2)?;
        if data.is_empty() {
            return None;
        }

        let mut derived = MemoryImage::with_config(Arc::clone(&self.config));
        derived.set_content(data, None);
        derived.title = self.title.clone();
        Some(derived)
    }

    /// Content as a `data:` URI, `None` without content.
    pub fn embedded_url(&self) -> Option<String> {
        if !self.exists() {
            return None;
        }
        self.content()
            .map(|data| markup::data_uri(self.determine_format(), data))
    }

    /// `<img>` tag embedding the content, `None` without content.
    pub fn tag(&self) -> Option<String> {
        let src = self.embedded_url()?;
        Some(markup::img_tag(&src, &markup::alt_text(&self.title, &self.filename)))
    }

    /// Query the decoded dimensions.
    ///
    /// Undecodable content yields [`DIMENSIONS_NOT_INITIALIZED`] in text mode
    /// and `None` otherwise.
    pub fn dimensions(&self, mode: DimensionMode) -> Option<Dimension> {
        let bitmap = Bitmap::from_bytes(self.content().unwrap_or_default(), self.determine_format());

        let Some((width, height)) = bitmap.raster().ok().map(GenericImageView::dimensions) else {
            return match mode {
                DimensionMode::Text => Some(Dimension::Text(DIMENSIONS_NOT_INITIALIZED.to_string())),
                _ => None,
            };
        };

        Some(match mode {
            DimensionMode::Text => Dimension::Text(format!("{width}x{height}")),
            DimensionMode::Width => Dimension::Pixels(width),
            DimensionMode::Height => Dimension::Pixels(height),
        })
    }

    /// Single entry point for every content change.
    fn ingest(&mut self, data: Option<Vec<u8>>, filename: Option<&str>) {
        let filename = match (filename, &data) {
            (Some(name), _) => Some(name.to_string()),
            (None, Some(bytes)) if self.filename.is_empty() => {
                Some(generate_filename(self.config.registry.detect(bytes)))
            }
            _ => None,
        };

        self.content = data.map(Blob::new);
        self.parent_id = PARENT_SENTINEL;
        if let Some(filename) = filename {
            self.filename = filename;
        }
    }
}

impl Default for MemoryImage {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageSource for MemoryImage {
    fn exists(&self) -> bool {
        MemoryImage::exists(self)
    }

    fn locator(&self) -> Option<String> {
        None
    }

    fn read_bytes(&self) -> Option<Vec<u8>> {
        self.content().map(<[u8]>::to_vec)
    }
}

impl BeforeWrite for MemoryImage {
    /// Consume an attached physical upload, then mark the record as not
    /// filesystem-backed. A no-op for records already at the sentinel.
    fn on_before_write(&mut self) {
        if self.parent_id != PARENT_SENTINEL {
            if let Some(upload) = self.pending_upload.take().filter(|u| !u.name.is_empty()) {
                self.filename.clear();
                self.copy_from_file(&upload.path, None);

                if self.exists() {
                    tracing::info!(
                        upload = %upload.name,
                        bytes = self.content().map_or(0, <[u8]>::len),
                        filename = %self.filename,
                        "Ingested uploaded image"
                    );
                    if self.config.remove_uploaded_files {
                        remove_upload(&upload.path);
                    }
                } else {
                    tracing::warn!(
                        upload = %upload.name,
                        path = %upload.path.display(),
                        "Uploaded image could not be read"
                    );
                }
            }
        }

        self.parent_id = PARENT_SENTINEL;
    }
}

fn remove_upload(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        tracing::warn!(path = %path.display(), error = %e, "Failed to remove uploaded image");
    }
}

/// `image-<timestamp>-<7 lowercase letters>.<ext>`
fn generate_filename(format: ImageFormat) -> String {
    format!(
        "image-{}-{}.{}",
        chrono::Utc::now().timestamp(),
        random_suffix(),
        format.extension()
    )
}

fn random_suffix() -> String {
    let mut bits = Uuid::new_v4().as_u128();
    (0..SUFFIX_LEN)
        .map(|_| {
            let letter = (b'a' + (bits % 26) as u8) as char;
            bits /= 26;
            letter
        })
        .collect()
}
