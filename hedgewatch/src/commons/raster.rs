use std::io::Cursor;
use std::path::Path;

use image::{DynamicImage, ImageFormat, RgbImage, RgbaImage};

use crate::commons::basic_functions::encode_base64;
use crate::error::RenderError;

/// Decoded pixel grid held by one component at a time
///
/// Components receive their own copy; nothing hands out mutable access to a
/// shared buffer.
#[derive(Debug, Clone)]
pub struct RasterImage {
    image: DynamicImage,
}

impl RasterImage {
    /// Decode any supported encoding (JPEG tiles, PNG fixtures)
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, image::ImageError> {
        Ok(RasterImage {
            image: image::load_from_memory(bytes)?,
        })
    }

    pub fn from_rgb(image: RgbImage) -> Self {
        RasterImage {
            image: DynamicImage::ImageRgb8(image),
        }
    }

    pub fn from_rgba(image: RgbaImage) -> Self {
        RasterImage {
            image: DynamicImage::ImageRgba8(image),
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn has_alpha(&self) -> bool {
        self.image.color().has_alpha()
    }

    /// Opaque RGB copy; an alpha channel is dropped and the existing RGB values kept
    pub fn to_opaque_rgb(&self) -> RgbImage {
        self.image.to_rgb8()
    }
}

/// Self-contained PNG produced by the renderer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    bytes: Vec<u8>,
}

impl EncodedImage {
    pub fn encode_png(image: &RgbImage) -> Result<Self, RenderError> {
        let mut buffer = Cursor::new(Vec::new());
        image.write_to(&mut buffer, ImageFormat::Png)?;
        Ok(EncodedImage {
            bytes: buffer.into_inner(),
        })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn to_base64(&self) -> String {
        encode_base64(&self.bytes)
    }

    /// Persist the encoded image to disk
    pub fn write_to(&self, path: &Path) -> Result<(), RenderError> {
        std::fs::write(path, &self.bytes)?;
        Ok(())
    }

    pub fn decode(&self) -> Result<RasterImage, image::ImageError> {
        RasterImage::from_bytes(&self.bytes)
    }
}
