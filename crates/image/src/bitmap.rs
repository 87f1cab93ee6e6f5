//! Decoded raster handle with scratch-file encoding.

use crate::detect::ImageFormat;
use crate::error::{ImageError, Result};
use image::{DynamicImage, GenericImageView, ImageOutputFormat};
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// Default JPEG encode quality.
pub const DEFAULT_QUALITY: u8 = 75;

/// Prefix of scratch files created while encoding.
const SCRATCH_PREFIX: &str = "mgd";

/// One image's decoded raster.
///
/// Construction never fails: bytes that cannot be decoded produce a handle
/// without a raster, which callers must check with [`Bitmap::has_raster`]
/// before asking for dimensions or encoding.
#[derive(Clone)]
pub struct Bitmap {
    raster: Option<DynamicImage>,
    format: Option<ImageFormat>,
    quality: u8,
    scratch_dir: Option<PathBuf>,
}

impl Bitmap {
    /// Decode `data`, to be re-encoded later as `format`.
    pub fn from_bytes(data: &[u8], format: ImageFormat) -> Self {
        if data.is_empty() {
            return Self::empty();
        }

        let raster = match image::load_from_memory(data) {
            Ok(raster) => Some(raster),
            Err(e) => {
                tracing::debug!(error = %e, bytes = data.len(), "Could not decode image data");
                None
            }
        };

        Self {
            raster,
            format: Some(format),
            quality: DEFAULT_QUALITY,
            scratch_dir: None,
        }
    }

    /// Wrap an existing raster.
    pub fn from_raster(raster: DynamicImage, format: ImageFormat) -> Self {
        Self {
            raster: Some(raster),
            format: Some(format),
            quality: DEFAULT_QUALITY,
            scratch_dir: None,
        }
    }

    /// Handle with neither raster nor format.
    pub fn empty() -> Self {
        Self {
            raster: None,
            format: None,
            quality: DEFAULT_QUALITY,
            scratch_dir: None,
        }
    }

    /// Builder: set encode quality.
    pub fn with_quality(mut self, quality: u8) -> Self {
        self.set_quality(quality);
        self
    }

    /// Builder: create encode scratch files in `dir` instead of the
    /// system temp directory.
    pub fn with_scratch_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.scratch_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Set encode quality, clamped to 1-100. Only JPEG uses it.
    pub fn set_quality(&mut self, quality: u8) {
        self.quality = quality.clamp(1, 100);
    }

    /// Encode quality.
    pub fn quality(&self) -> u8 {
        self.quality
    }

    /// Target format, if the handle was created from data.
    pub fn format(&self) -> Option<ImageFormat> {
        self.format
    }

    /// Whether a raster was decoded.
    pub fn has_raster(&self) -> bool {
        self.raster.is_some()
    }

    /// Borrow the raster.
    pub fn raster(&self) -> Result<&DynamicImage> {
        self.raster
            .as_ref()
            .ok_or(ImageError::InvalidState("bitmap has no raster"))
    }

    /// Raster width in pixels.
    pub fn width(&self) -> Result<u32> {
        Ok(self.raster()?.dimensions().0)
    }

    /// Raster height in pixels.
    pub fn height(&self) -> Result<u32> {
        Ok(self.raster()?.dimensions().1)
    }

    /// Replace the raster with `f(raster)`, keeping format and quality.
    ///
    /// Returns `None` when there is no raster to transform.
    pub fn map_raster(self, f: impl FnOnce(DynamicImage) -> DynamicImage) -> Option<Self> {
        let Bitmap { raster, format, quality, scratch_dir } = self;
        raster.map(|r| Bitmap {
            raster: Some(f(r)),
            format,
            quality,
            scratch_dir,
        })
    }

    /// Encode the raster in its target format.
    ///
    /// The encoder writes to a private scratch file which is removed when
    /// this call returns, on success and on failure alike.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let raster = self.raster()?;
        let mut builder = tempfile::Builder::new();
        builder.prefix(SCRATCH_PREFIX);
        let mut scratch = match &self.scratch_dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };

        {
            let file = scratch.as_file_mut();
            match self.format.unwrap_or(ImageFormat::Jpg) {
                ImageFormat::Gif => DynamicImage::ImageRgba8(raster.to_rgba8())
                    .write_to(file, ImageOutputFormat::Gif)?,
                ImageFormat::Png => raster.write_to(file, ImageOutputFormat::Png)?,
                ImageFormat::Jpg => DynamicImage::ImageRgb8(raster.to_rgb8())
                    .write_to(file, ImageOutputFormat::Jpeg(self.quality))?,
            }
        }

        let file = scratch.as_file_mut();
        file.seek(SeekFrom::Start(0))?;
        let mut data = Vec::new();
        file.read_to_end(&mut data)?;
        Ok(data)
    }
}

impl std::fmt::Debug for Bitmap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bitmap")
            .field("dimensions", &self.raster.as_ref().map(|r| r.dimensions()))
            .field("format", &self.format)
            .field("quality", &self.quality)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use std::io::Cursor;

    /// Encode a solid-colour test image.
    pub(crate) fn sample_image(width: u32, height: u32, format: ImageOutputFormat) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([200, 40, 40])));
        let mut buffer = Cursor::new(Vec::new());
        let img = match format {
            ImageOutputFormat::Gif => DynamicImage::ImageRgba8(img.to_rgba8()),
            _ => img,
        };
        img.write_to(&mut buffer, format).unwrap();
        buffer.into_inner()
    }

    fn entries(dir: &Path) -> usize {
        std::fs::read_dir(dir).unwrap().count()
    }

    #[test]
    fn test_decode_png() {
        let data = sample_image(100, 50, ImageOutputFormat::Png);
        let bitmap = Bitmap::from_bytes(&data, ImageFormat::Png);
        assert!(bitmap.has_raster());
        assert_eq!(bitmap.width().unwrap(), 100);
        assert_eq!(bitmap.height().unwrap(), 50);
    }

    #[test]
    fn test_corrupt_bytes_have_no_raster() {
        let bitmap = Bitmap::from_bytes(&[0xFF, 0xD8, 0xFF, 0x00, 0x01], ImageFormat::Jpg);
        assert!(!bitmap.has_raster());
        assert_eq!(bitmap.format(), Some(ImageFormat::Jpg));
    }

    #[test]
    fn test_empty_bytes_have_no_raster() {
        let bitmap = Bitmap::from_bytes(&[], ImageFormat::Png);
        assert!(!bitmap.has_raster());
        assert!(bitmap.format().is_none());
    }

    #[test]
    fn test_no_raster_is_invalid_state() {
        let bitmap = Bitmap::empty();
        assert!(matches!(bitmap.width(), Err(ImageError::InvalidState(_))));
        assert!(matches!(bitmap.height(), Err(ImageError::InvalidState(_))));
        assert!(matches!(bitmap.encode(), Err(ImageError::InvalidState(_))));
    }

    #[test]
    fn test_encode_each_format() {
        let data = sample_image(8, 6, ImageOutputFormat::Png);
        for format in [ImageFormat::Jpg, ImageFormat::Png, ImageFormat::Gif] {
            let encoded = Bitmap::from_bytes(&data, format).encode().unwrap();
            let reloaded = Bitmap::from_bytes(&encoded, format);
            assert!(reloaded.has_raster(), "{format} did not re-decode");
            assert_eq!(reloaded.width().unwrap(), 8);
            assert_eq!(
                crate::FormatRegistry::default().detect(&encoded),
                format,
                "{format} encoded with wrong signature"
            );
        }
    }

    #[test]
    fn test_quality_changes_jpeg_output() {
        let data = sample_image(64, 64, ImageOutputFormat::Png);
        let low = Bitmap::from_bytes(&data, ImageFormat::Jpg).with_quality(5).encode().unwrap();
        let high = Bitmap::from_bytes(&data, ImageFormat::Jpg).with_quality(100).encode().unwrap();
        assert_ne!(low, high);
    }

    #[test]
    fn test_quality_is_clamped() {
        assert_eq!(Bitmap::empty().with_quality(0).quality(), 1);
        assert_eq!(Bitmap::empty().with_quality(255).quality(), 100);
    }

    #[test]
    fn test_encode_leaves_no_scratch_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let data = sample_image(4, 4, ImageOutputFormat::Png);
        let bitmap = Bitmap::from_bytes(&data, ImageFormat::Png).with_scratch_dir(dir.path());

        for _ in 0..3 {
            bitmap.encode().unwrap();
        }
        assert_eq!(entries(dir.path()), 0);
    }

    #[test]
    fn test_failed_scratch_creation_is_io_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let data = sample_image(4, 4, ImageOutputFormat::Png);
        let bitmap = Bitmap::from_bytes(&data, ImageFormat::Png)
            .with_scratch_dir(dir.path().join("missing"));

        assert!(matches!(bitmap.encode(), Err(ImageError::IoError(_))));
        assert_eq!(entries(dir.path()), 0);
    }

    #[test]
    fn test_failed_encode_removes_scratch_file() {
        let dir = tempfile::TempDir::new().unwrap();
        // GIF frames are limited to 65535 pixels per side
        let raster = DynamicImage::ImageRgb8(RgbImage::new(70_000, 1));
        let bitmap = Bitmap::from_raster(raster, ImageFormat::Gif).with_scratch_dir(dir.path());

        assert!(bitmap.encode().is_err());
        assert_eq!(entries(dir.path()), 0);
    }

    #[test]
    fn test_map_raster() {
        let data = sample_image(10, 10, ImageOutputFormat::Png);
        let bitmap = Bitmap::from_bytes(&data, ImageFormat::Png).with_quality(40);
        let mapped = bitmap.map_raster(|r| r.crop_imm(0, 0, 5, 3)).unwrap();
        assert_eq!(mapped.width().unwrap(), 5);
        assert_eq!(mapped.height().unwrap(), 3);
        assert_eq!(mapped.quality(), 40);

        assert!(Bitmap::empty().map_raster(|r| r).is_none());
    }
}
