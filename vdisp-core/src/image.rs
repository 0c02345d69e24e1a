//! Framebuffer-sized images for blitting.
//!
//! Images are `height × width × channels`, row-major, channels
//! interleaved. Masks zero out every channel of the pixels they exclude.

use crate::error::{DisplayError, Result};
use crate::mask::Mask;

pub const IMAGE_COLOR_BLACK: u8 = 0;
pub const IMAGE_COLOR_WHITE: u8 = 255;

/// Channel count used when the caller does not pick one.
pub const DEFAULT_CHANNELS: usize = 3;

// ── Image ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct Image<T> {
    width: u32,
    height: u32,
    channels: usize,
    data: Vec<T>,
}

impl<T: Copy + Default> Image<T> {
    /// Image with every sample set to `color`.
    pub fn filled(width: u32, height: u32, channels: usize, color: T) -> Self {
        Self {
            width,
            height,
            channels,
            data: vec![color; width as usize * height as usize * channels],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    /// Samples of the pixel at `(x, y)`.
    ///
    /// # Panics
    ///
    /// Panics if `(x, y)` is out of bounds.
    pub fn pixel(&self, x: u32, y: u32) -> &[T] {
        let offset = (y as usize * self.width as usize + x as usize) * self.channels;
        &self.data[offset..offset + self.channels]
    }

    /// Zero every channel of pixels where `mask` is `false`.
    pub fn apply_mask(&mut self, mask: &Mask) -> Result<()> {
        if mask.width() != self.width || mask.height() != self.height {
            return Err(DisplayError::ShapeMismatch {
                image_width: self.width,
                image_height: self.height,
                mask_width: mask.width(),
                mask_height: mask.height(),
            });
        }
        if self.channels == 0 {
            return Ok(());
        }
        for (pixel, &keep) in self.data.chunks_exact_mut(self.channels).zip(mask.as_slice()) {
            if !keep {
                pixel.fill(T::default());
            }
        }
        Ok(())
    }
}

/// Build a `width × height` image filled with `color`, optionally masked.
pub fn new_image<T: Copy + Default>(
    width: u32,
    height: u32,
    color: T,
    mask: Option<&Mask>,
    channels: Option<usize>,
) -> Result<Image<T>> {
    let mut image = Image::filled(width, height, channels.unwrap_or(DEFAULT_CHANNELS), color);
    if let Some(mask) = mask {
        image.apply_mask(mask)?;
    }
    Ok(image)
}

// ── Encoding ─────────────────────────────────────────────────────

impl Image<u8> {
    /// Encode as binary PGM (1 channel) or PPM (3 channels).
    ///
    /// Returns the blit format tag and the encoded bytes.
    pub fn to_netpbm(&self) -> Result<(&'static str, Vec<u8>)> {
        let (magic, format) = match self.channels {
            1 => ("P5", ".pgm"),
            3 => ("P6", ".ppm"),
            n => return Err(DisplayError::UnsupportedChannels(n)),
        };
        let header = format!("{magic}\n{} {}\n255\n", self.width, self.height);
        let mut out = Vec::with_capacity(header.len() + self.data.len());
        out.extend_from_slice(header.as_bytes());
        out.extend_from_slice(&self.data);
        Ok((format, out))
    }
}

/// Grayscale rendering of a mask: 255 inside, 0 outside.
pub fn mask_image(mask: &Mask) -> Image<u8> {
    let mut image = Image::filled(mask.width(), mask.height(), 1, IMAGE_COLOR_WHITE);
    // Shapes match by construction.
    let _ = image.apply_mask(mask);
    image
}

// ── Tests ────────────────────────────────────────────────────────
