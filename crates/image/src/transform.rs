//! Named raster transforms used to derive formatted images.
//!
//! A transform takes ownership of a [`Bitmap`] plus up to two numeric
//! arguments and returns the transformed bitmap, or `None` when the
//! arguments make no sense for it. Names are matched case-insensitively.

use crate::bitmap::Bitmap;
use image::imageops::{self, FilterType};
use image::{DynamicImage, GenericImageView, Rgba, RgbaImage};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Signature shared by all transforms.
pub type TransformFn = dyn Fn(Bitmap, Option<u32>, Option<u32>) -> Option<Bitmap> + Send + Sync;

/// Resampling filter used by the built-in transforms.
const FILTER: FilterType = FilterType::Lanczos3;

/// Background of padded images.
const PAD_COLOR: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// Closed set of transforms the generator may dispatch to.
#[derive(Clone, Default)]
pub struct TransformRegistry {
    transforms: HashMap<String, Arc<TransformFn>>,
}

impl TransformRegistry {
    /// Registry with no transforms.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in transforms:
    ///
    /// | name        | arguments       | effect                                   |
    /// |-------------|-----------------|------------------------------------------|
    /// | `resize`    | width, height   | stretch to exactly width x height        |
    /// | `width`     | width           | scale to width, keep aspect ratio        |
    /// | `height`    | height          | scale to height, keep aspect ratio       |
    /// | `fit`       | width, height   | scale to fit inside the box              |
    /// | `crop`      | width, height   | fill the box, crop overflow from centre  |
    /// | `pad`       | width, height   | fit inside the box, pad with white       |
    /// | `greyscale` | none            | convert to greyscale                     |
    pub fn with_defaults() -> Self {
        Self::new()
            .with("resize", resize)
            .with("width", set_width)
            .with("height", set_height)
            .with("fit", fit)
            .with("crop", crop)
            .with("pad", pad)
            .with("greyscale", greyscale)
    }

    /// Register (or replace) a transform.
    pub fn register<F>(&mut self, name: &str, transform: F) -> &mut Self
    where
        F: Fn(Bitmap, Option<u32>, Option<u32>) -> Option<Bitmap> + Send + Sync + 'static,
    {
        self.transforms.insert(name.to_ascii_lowercase(), Arc::new(transform));
        self
    }

    /// Builder form of [`TransformRegistry::register`].
    pub fn with<F>(mut self, name: &str, transform: F) -> Self
    where
        F: Fn(Bitmap, Option<u32>, Option<u32>) -> Option<Bitmap> + Send + Sync + 'static,
    {
        self.register(name, transform);
        self
    }

    /// Look up a transform by name.
    pub fn get(&self, name: &str) -> Option<&TransformFn> {
        self.transforms.get(&name.to_ascii_lowercase()).map(|t| t.as_ref())
    }

    /// Whether a transform is registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.transforms.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for TransformRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransformRegistry")
            .field("transforms", &self.names())
            .finish()
    }
}

/// Both arguments, each non-zero.
fn box_args(arg1: Option<u32>, arg2: Option<u32>) -> Option<(u32, u32)> {
    match (arg1, arg2) {
        (Some(w), Some(h)) if w > 0 && h > 0 => Some((w, h)),
        _ => None,
    }
}

/// Scale `other` by `target / current`, never below one pixel.
fn scale_other(current: u32, other: u32, target: u32) -> u32 {
    let ratio = target as f64 / current as f64;
    ((other as f64 * ratio).round() as u32).max(1)
}

fn resize(bitmap: Bitmap, arg1: Option<u32>, arg2: Option<u32>) -> Option<Bitmap> {
    let (width, height) = box_args(arg1, arg2)?;
    bitmap.map_raster(|r| r.resize_exact(width, height, FILTER))
}

fn set_width(bitmap: Bitmap, arg1: Option<u32>, _: Option<u32>) -> Option<Bitmap> {
    let width = arg1.filter(|w| *w > 0)?;
    bitmap.map_raster(|r| {
        let (current_width, current_height) = r.dimensions();
        if current_width == width {
            return r;
        }
        let height = scale_other(current_width, current_height, width);
        r.resize_exact(width, height, FILTER)
    })
}

fn set_height(bitmap: Bitmap, arg1: Option<u32>, _: Option<u32>) -> Option<Bitmap> {
    let height = arg1.filter(|h| *h > 0)?;
    bitmap.map_raster(|r| {
        let (current_width, current_height) = r.dimensions();
        if current_height == height {
            return r;
        }
        let width = scale_other(current_height, current_width, height);
        r.resize_exact(width, height, FILTER)
    })
}

fn fit(bitmap: Bitmap, arg1: Option<u32>, arg2: Option<u32>) -> Option<Bitmap> {
    let (width, height) = box_args(arg1, arg2)?;
    bitmap.map_raster(|r| r.resize(width, height, FILTER))
}

fn crop(bitmap: Bitmap, arg1: Option<u32>, arg2: Option<u32>) -> Option<Bitmap> {
    let (width, height) = box_args(arg1, arg2)?;
    bitmap.map_raster(|r| r.resize_to_fill(width, height, FILTER))
}

fn pad(bitmap: Bitmap, arg1: Option<u32>, arg2: Option<u32>) -> Option<Bitmap> {
    let (width, height) = box_args(arg1, arg2)?;
    bitmap.map_raster(|r| {
        let fitted = r.resize(width, height, FILTER);
        let (fitted_width, fitted_height) = fitted.dimensions();
        let mut canvas = RgbaImage::from_pixel(width, height, PAD_COLOR);
        let x = i64::from((width - fitted_width) / 2);
        let y = i64::from((height - fitted_height) / 2);
        imageops::overlay(&mut canvas, &fitted.to_rgba8(), x, y);
        DynamicImage::ImageRgba8(canvas)
    })
}

fn greyscale(bitmap: Bitmap, _: Option<u32>, _: Option<u32>) -> Option<Bitmap> {
    bitmap.map_raster(|r| r.grayscale())
}
