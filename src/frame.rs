//! Decoded frame container.
//!
//! - `Frame`: one RGB image sampled at a whole-second offset of the video.
//!
//! Frames are transient: the sampler produces one, the detector reads it, the
//! annotator draws on it through `&mut`, and the writer persists it. Nothing
//! keeps a frame past the iteration that produced it.

use anyhow::{anyhow, Result};
use image::{Rgb, RgbImage};

/// A decoded RGB frame tagged with its 0-based second index.
pub struct Frame {
    image: RgbImage,
    second: u64,
}

impl Frame {
    /// Wrap an already decoded image.
    pub fn new(image: RgbImage, second: u64) -> Self {
        Self { image, second }
    }

    /// Build a frame from tightly packed RGB24 bytes.
    pub fn from_rgb(pixels: Vec<u8>, width: u32, height: u32, second: u64) -> Result<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(3))
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        if pixels.len() != expected {
            return Err(anyhow!(
                "expected {} RGB bytes for {}x{} frame, received {}",
                expected,
                width,
                height,
                pixels.len()
            ));
        }
        let image = RgbImage::from_raw(width, height, pixels)
            .ok_or_else(|| anyhow!("failed to build {}x{} RGB image", width, height))?;
        Ok(Self { image, second })
    }

    /// Solid-colour frame; handy for tests and the synthetic source.
    pub fn filled(width: u32, height: u32, second: u64, color: [u8; 3]) -> Self {
        Self {
            image: RgbImage::from_pixel(width, height, Rgb(color)),
            second,
        }
    }

    pub fn second(&self) -> u64 {
        self.second
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Packed RGB24 pixel data, row-major.
    pub fn pixels(&self) -> &[u8] {
        self.image.as_raw()
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    /// Exclusive access for in-place annotation.
    pub fn image_mut(&mut self) -> &mut RgbImage {
        &mut self.image
    }

    /// Key used for both the image file stem and the metadata entry.
    pub fn key(&self) -> String {
        frame_key(self.second)
    }
}

/// `frame_<second>`.
pub fn frame_key(second: u64) -> String {
    format!("frame_{}", second)
}
