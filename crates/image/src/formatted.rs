//! Formatted-image generation.
//!
//! Turns a memory-backed image plus a transform name into the encoded bytes
//! of the derived image. The entity wraps those bytes in a fresh instance.

use crate::bitmap::Bitmap;
use crate::detect::ImageFormat;
use crate::memory::MemoryImage;
use crate::transform::TransformRegistry;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock};

/// Default memo budget: 64MB of encoded output.
pub const DEFAULT_MEMO_BYTES: usize = 64 * 1024 * 1024;

/// Everything that decides the generated bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct MemoKey {
    content_hash: String,
    format: ImageFormat,
    quality: u8,
    transform: String,
    arg1: Option<u32>,
    arg2: Option<u32>,
}

/// Bounded memo, oldest entries evicted first.
#[derive(Debug, Default)]
struct Memo {
    entries: HashMap<MemoKey, Arc<Vec<u8>>>,
    order: VecDeque<MemoKey>,
    size_bytes: usize,
    /// 0 = unlimited
    max_size_bytes: usize,
}

impl Memo {
    fn with_capacity_bytes(max_size_bytes: usize) -> Self {
        Self {
            max_size_bytes,
            ..Self::default()
        }
    }

    fn insert(&mut self, key: MemoKey, data: Arc<Vec<u8>>) {
        if self.max_size_bytes > 0 && data.len() > self.max_size_bytes {
            return;
        }

        if let Some(previous) = self.entries.insert(key.clone(), Arc::clone(&data)) {
            self.size_bytes -= previous.len();
            self.order.retain(|k| k != &key);
        }
        self.size_bytes += data.len();
        self.order.push_back(key);

        while self.max_size_bytes > 0 && self.size_bytes > self.max_size_bytes {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            if let Some(evicted) = self.entries.remove(&oldest) {
                self.size_bytes -= evicted.len();
            }
        }
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
        self.size_bytes = 0;
    }
}

/// Generates formatted images by dispatching to a [`TransformRegistry`].
///
/// Optionally memoises results keyed by content hash, output format, JPEG
/// quality, transform and arguments, so repeated requests for the same
/// derivative skip decode and encode. The memo holds at most the configured
/// number of bytes and drops its oldest entries first.
#[derive(Debug, Default)]
pub struct FormattedImageGenerator {
    transforms: TransformRegistry,
    memo: Option<RwLock<Memo>>,
}

impl FormattedImageGenerator {
    /// Generator over the given transforms, without memoisation.
    pub fn new(transforms: TransformRegistry) -> Self {
        Self {
            transforms,
            memo: None,
        }
    }

    /// Builder: memoise generated bytes, keeping at most `max_size_bytes`
    /// of output (0 = unlimited). See [`DEFAULT_MEMO_BYTES`].
    pub fn with_memo(mut self, max_size_bytes: usize) -> Self {
        self.memo = Some(RwLock::new(Memo::with_capacity_bytes(max_size_bytes)));
        self
    }

    /// Transforms this generator dispatches to.
    pub fn transforms(&self) -> &TransformRegistry {
        &self.transforms
    }

    /// Number of memoised results.
    pub fn memo_len(&self) -> usize {
        self.memo
            .as_ref()
            .and_then(|memo| memo.read().ok().map(|m| m.entries.len()))
            .unwrap_or(0)
    }

    /// Total bytes of memoised output.
    pub fn memo_size_bytes(&self) -> usize {
        self.memo
            .as_ref()
            .and_then(|memo| memo.read().ok().map(|m| m.size_bytes))
            .unwrap_or(0)
    }

    /// Drop all memoised results.
    pub fn clear_memo(&self) {
        if let Some(mut memo) = self.memo.as_ref().and_then(|m| m.write().ok()) {
            memo.clear();
        }
    }

    /// Produce the bytes of `image` transformed by `transform`.
    ///
    /// Returns `None` when the image has no decodable content, when no
    /// transform is registered under that name (logged as a warning), when
    /// the transform rejects its arguments, or when encoding fails.
    pub fn generate(
        &self,
        image: &MemoryImage,
        transform: &str,
        arg1: Option<u32>,
        arg2: Option<u32>,
    ) -> Option<Vec<u8>> {
        let content = image.content()?;
        let format = image.determine_format();
        let quality = image.config().jpeg_quality;

        let key = self.memo.as_ref().map(|_| MemoKey {
            content_hash: hex::encode(Sha256::digest(content)),
            format,
            quality,
            transform: transform.to_ascii_lowercase(),
            arg1,
            arg2,
        });
        if let Some(hit) = key.as_ref().and_then(|k| self.lookup(k)) {
            tracing::debug!(transform, "Formatted image served from memo");
            return Some(hit.as_ref().clone());
        }

        let bitmap = Bitmap::from_bytes(content, format).with_quality(quality);
        if !bitmap.has_raster() {
            return None;
        }

        let Some(apply) = self.transforms.get(transform) else {
            tracing::warn!(
                transform,
                available = ?self.transforms.names(),
                "Image transform function not found"
            );
            return None;
        };

        let data = match apply(bitmap, arg1, arg2)?.encode() {
            Ok(data) => data,
            Err(e) => {
                tracing::warn!(transform, error = %e, "Failed to encode formatted image");
                return None;
            }
        };

        if let Some(key) = key {
            self.store(key, &data);
        }
        Some(data)
    }

    fn lookup(&self, key: &MemoKey) -> Option<Arc<Vec<u8>>> {
        let memo = self.memo.as_ref()?.read().ok()?;
        memo.entries.get(key).cloned()
    }

    fn store(&self, key: MemoKey, data: &[u8]) {
        if let Some(mut memo) = self.memo.as_ref().and_then(|m| m.write().ok()) {
            memo.insert(key, Arc::new(data.to_vec()));
        }
    }
}
