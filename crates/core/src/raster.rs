//! Decoded raster images

use image::{DynamicImage, GenericImageView, RgbaImage};
use sha2::{Digest, Sha256};

/// An in-memory bitmap together with the identifier it was loaded from
#[derive(Debug, Clone)]
pub struct RasterImage {
    origin: String,
    image: DynamicImage,
}

impl RasterImage {
    pub fn new(origin: impl Into<String>, image: DynamicImage) -> Self {
        Self {
            origin: origin.into(),
            image,
        }
    }

    /// Path or identifier the raster was retrieved from
    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn image(&self) -> &DynamicImage {
        &self.image
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    pub fn to_rgba8(&self) -> RgbaImage {
        self.image.to_rgba8()
    }

    /// SHA-256 of the RGBA8 pixel buffer, prefixed with the dimensions
    pub fn digest(&self) -> String {
        let (width, height) = self.dimensions();
        let mut hasher = Sha256::new();
        hasher.update(width.to_be_bytes());
        hasher.update(height.to_be_bytes());
        hasher.update(self.to_rgba8().as_raw());
        hex::encode(hasher.finalize())
    }
}
