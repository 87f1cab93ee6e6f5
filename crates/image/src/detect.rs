//! Image format detection from magic bytes.

use crate::ImageError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Image formats that can be stored and re-encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    /// JPEG image
    Jpg,
    /// PNG image
    Png,
    /// GIF image
    Gif,
}

impl ImageFormat {
    /// Format identifier, also used as file extension and MIME subtype.
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageFormat::Jpg => "jpg",
            ImageFormat::Png => "png",
            ImageFormat::Gif => "gif",
        }
    }

    /// File extension for generated filenames.
    pub fn extension(&self) -> &'static str {
        self.as_str()
    }

    /// MIME type used in embedded data URIs.
    ///
    /// The subtype is the format identifier itself, so JPEG yields
    /// `image/jpg` rather than `image/jpeg`.
    pub fn mime_type(&self) -> String {
        format!("image/{}", self.as_str())
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImageFormat {
    type Err = ImageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Ok(ImageFormat::Jpg),
            "png" => Ok(ImageFormat::Png),
            "gif" => Ok(ImageFormat::Gif),
            other => Err(ImageError::UnknownFormat(other.to_string())),
        }
    }
}

/// A magic-byte prefix identifying one format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signature {
    /// Format the prefix identifies
    pub format: ImageFormat,
    /// Leading bytes of an encoded file
    pub magic: &'static [u8],
}

/// Standard signatures, in detection order.
///
/// See <http://www.garykessler.net/library/file_sigs.html>.
pub const STANDARD_SIGNATURES: &[Signature] = &[
    Signature { format: ImageFormat::Jpg, magic: &[0xFF, 0xD8, 0xFF] },
    Signature { format: ImageFormat::Png, magic: &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A] },
    Signature { format: ImageFormat::Gif, magic: &[0x47, 0x49, 0x46] },
];

/// Ordered table of signatures plus the fallback format.
///
/// Detection walks the table front to back and the first matching prefix
/// wins, so a more specific signature must be listed before any shorter
/// signature it overlaps with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatRegistry {
    signatures: Vec<Signature>,
    default_format: ImageFormat,
}

impl FormatRegistry {
    /// Registry over the standard jpg/png/gif signatures.
    pub fn new(default_format: ImageFormat) -> Self {
        Self::with_signatures(STANDARD_SIGNATURES.to_vec(), default_format)
    }

    /// Registry over a custom ordered signature table.
    pub fn with_signatures(signatures: Vec<Signature>, default_format: ImageFormat) -> Self {
        Self {
            signatures,
            default_format,
        }
    }

    /// Format returned when no signature matches.
    pub fn default_format(&self) -> ImageFormat {
        self.default_format
    }

    /// Signatures in detection order.
    pub fn signatures(&self) -> &[Signature] {
        &self.signatures
    }

    /// Detect image format from magic bytes.
    ///
    /// Never fails: data that matches no signature, including empty data,
    /// yields the default format.
    ///
    /// # Example
    /// ```
    /// use memimage::{FormatRegistry, ImageFormat};
    ///
    /// let registry = FormatRegistry::default();
    ///
    /// let png_data = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
    /// assert_eq!(registry.detect(&png_data), ImageFormat::Png);
    ///
    /// assert_eq!(registry.detect(b"not an image"), ImageFormat::Jpg);
    /// ```
    pub fn detect(&self, data: &[u8]) -> ImageFormat {
        self.signatures
            .iter()
            .find(|sig| !data.is_empty() && data.starts_with(sig.magic))
            .map(|sig| sig.format)
            .unwrap_or(self.default_format)
    }
}

impl Default for FormatRegistry {
    fn default() -> Self {
        Self::new(ImageFormat::Jpg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_detect_jpeg() {
        let data = [0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, 0x4A, 0x46, 0x49, 0x46];
        assert_eq!(FormatRegistry::default().detect(&data), ImageFormat::Jpg);
    }

    #[test]
    fn test_detect_png() {
        let data = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00];
        assert_eq!(FormatRegistry::default().detect(&data), ImageFormat::Png);
    }

    #[test]
    fn test_detect_gif_short_header() {
        let data = [0x47, 0x49, 0x46, 0x01, 0x02];
        assert_eq!(FormatRegistry::default().detect(&data), ImageFormat::Gif);
    }

    #[test]
    fn test_empty_falls_back_to_default() {
        let registry = FormatRegistry::new(ImageFormat::Png);
        assert_eq!(registry.detect(&[]), ImageFormat::Png);
    }

    #[test]
    fn test_truncated_signature_is_not_a_match() {
        // First half of the PNG signature only
        let data = [0x89, 0x50, 0x4E, 0x47];
        assert_eq!(FormatRegistry::new(ImageFormat::Gif).detect(&data), ImageFormat::Gif);
    }

    #[test]
    fn test_first_matching_signature_wins() {
        let registry = FormatRegistry::with_signatures(
            vec![
                Signature { format: ImageFormat::Png, magic: b"GIF8" },
                Signature { format: ImageFormat::Gif, magic: b"GIF" },
            ],
            ImageFormat::Jpg,
        );
        assert_eq!(registry.detect(b"GIF89a"), ImageFormat::Png);
        assert_eq!(registry.detect(b"GIF7"), ImageFormat::Gif);
    }

    #[test]
    fn test_format_strings() {
        assert_eq!(ImageFormat::Jpg.mime_type(), "image/jpg");
        assert_eq!(ImageFormat::Png.to_string(), "png");
        assert_eq!("JPEG".parse::<ImageFormat>().unwrap(), ImageFormat::Jpg);
        assert!("webp".parse::<ImageFormat>().is_err());
    }

    proptest! {
        #[test]
        fn prop_signature_prefix_always_detected(tail in proptest::collection::vec(any::<u8>(), 0..64)) {
            let registry = FormatRegistry::default();
            for sig in STANDARD_SIGNATURES {
                let mut data = sig.magic.to_vec();
                data.extend_from_slice(&tail);
                prop_assert_eq!(registry.detect(&data), sig.format);
            }
        }

        #[test]
        fn prop_unmatched_bytes_yield_default(data in proptest::collection::vec(any::<u8>(), 0..64)) {
            let registry = FormatRegistry::new(ImageFormat::Gif);
            let matched = STANDARD_SIGNATURES.iter().any(|sig| data.starts_with(sig.magic));
            prop_assume!(!matched);
            prop_assert_eq!(registry.detect(&data), ImageFormat::Gif);
        }
    }
}
