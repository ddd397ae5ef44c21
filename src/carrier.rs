// Copyright (c) 2026 Forge Labs
// SPDX-License-Identifier: GPL-3.0-only
// https://github.com/forge-labs/forge-core

//! Carrier image handling.
//!
//! [`PixelGrid`] is the flat 8-bit sample view the scramble and stego stages
//! operate on. Decoding preserves the source pixel format exactly so that
//! permuting samples and re-encoding is byte-exact; images in formats with
//! more than 8 bits per channel must be normalized first (see
//! [`normalize_to_png`]).

use std::io::Cursor;

use image::{DynamicImage, ImageBuffer, ImageFormat};

use crate::error::{ForgeError, Result};

/// 8-bit pixel formats a carrier may use after normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    L8,
    La8,
    Rgb8,
    Rgba8,
}

impl PixelFormat {
    /// Samples per pixel.
    pub fn channels(self) -> usize {
        match self {
            Self::L8 => 1,
            Self::La8 => 2,
            Self::Rgb8 => 3,
            Self::Rgba8 => 4,
        }
    }
}

/// A decoded carrier: dimensions, pixel format, and the flattened sample
/// array in row-major order.
#[derive(Debug, Clone)]
pub struct PixelGrid {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub samples: Vec<u8>,
}

impl PixelGrid {
    /// Total number of 8-bit samples (width * height * channels).
    pub fn element_count(&self) -> usize {
        self.samples.len()
    }

    /// Decode image bytes into a flat 8-bit sample grid.
    ///
    /// # Errors
    /// [`ForgeError::ImageDecode`] if the bytes are not a decodable image or
    /// use a pixel format with more than 8 bits per channel.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let img = image::load_from_memory(bytes)
            .map_err(|e| ForgeError::ImageDecode(e.to_string()))?;
        let (width, height) = (img.width(), img.height());
        let (format, samples) = match img {
            DynamicImage::ImageLuma8(buf) => (PixelFormat::L8, buf.into_raw()),
            DynamicImage::ImageLumaA8(buf) => (PixelFormat::La8, buf.into_raw()),
            DynamicImage::ImageRgb8(buf) => (PixelFormat::Rgb8, buf.into_raw()),
            DynamicImage::ImageRgba8(buf) => (PixelFormat::Rgba8, buf.into_raw()),
            other => {
                return Err(ForgeError::ImageDecode(format!(
                    "unsupported pixel format {:?}; normalize the carrier first",
                    other.color()
                )))
            }
        };
        Ok(Self { width, height, format, samples })
    }

    /// Re-encode the grid to a PNG in its original pixel format.
    pub fn encode_png(&self) -> Result<Vec<u8>> {
        let expected = self.width as usize * self.height as usize * self.format.channels();
        if self.samples.len() != expected {
            return Err(ForgeError::ImageDecode(format!(
                "sample buffer length {} does not match {}x{} {:?}",
                self.samples.len(),
                self.width,
                self.height,
                self.format
            )));
        }
        let img = match self.format {
            PixelFormat::L8 => DynamicImage::ImageLuma8(
                ImageBuffer::from_raw(self.width, self.height, self.samples.clone())
                    .ok_or_else(|| ForgeError::ImageDecode("sample buffer too short".into()))?,
            ),
            PixelFormat::La8 => DynamicImage::ImageLumaA8(
                ImageBuffer::from_raw(self.width, self.height, self.samples.clone())
                    .ok_or_else(|| ForgeError::ImageDecode("sample buffer too short".into()))?,
            ),
            PixelFormat::Rgb8 => DynamicImage::ImageRgb8(
                ImageBuffer::from_raw(self.width, self.height, self.samples.clone())
                    .ok_or_else(|| ForgeError::ImageDecode("sample buffer too short".into()))?,
            ),
            PixelFormat::Rgba8 => DynamicImage::ImageRgba8(
                ImageBuffer::from_raw(self.width, self.height, self.samples.clone())
                    .ok_or_else(|| ForgeError::ImageDecode("sample buffer too short".into()))?,
            ),
        };
        encode_dynamic_png(&img)
    }
}

/// Normalize arbitrary image bytes to an 8-bit PNG.
///
/// 8-bit sources keep their pixel format; anything deeper is converted to
/// RGBA8. Every carrier passes through here before the scramble stage so the
/// pipeline only ever sees formats [`PixelGrid::decode`] accepts.
pub fn normalize_to_png(bytes: &[u8]) -> Result<Vec<u8>> {
    let img = image::load_from_memory(bytes)
        .map_err(|e| ForgeError::ImageDecode(e.to_string()))?;
    let img = match img {
        keep @ (DynamicImage::ImageLuma8(_)
        | DynamicImage::ImageLumaA8(_)
        | DynamicImage::ImageRgb8(_)
        | DynamicImage::ImageRgba8(_)) => keep,
        deep => DynamicImage::ImageRgba8(deep.to_rgba8()),
    };
    encode_dynamic_png(&img)
}

/// Pack arbitrary bytes into the pixel payload of a grayscale PNG.
///
/// The artifact written by the seal stage is an image whose pixels are the
/// AEAD ciphertext. Trailing padding is zero; the true length travels out of
/// band in the seal metadata.
pub fn pack_bytes_as_png(data: &[u8]) -> Result<Vec<u8>> {
    let len = data.len().max(1);
    let width = (len as f64).sqrt().ceil() as u32;
    let height = (len as u32).div_ceil(width);
    let mut samples = vec![0u8; (width * height) as usize];
    samples[..data.len()].copy_from_slice(data);
    let grid = PixelGrid { width, height, format: PixelFormat::L8, samples };
    grid.encode_png()
}

/// Recover the byte payload packed by [`pack_bytes_as_png`].
///
/// # Errors
/// [`ForgeError::ImageDecode`] if the image does not decode or holds fewer
/// than `len` samples.
pub fn unpack_bytes_from_png(bytes: &[u8], len: usize) -> Result<Vec<u8>> {
    let grid = PixelGrid::decode(bytes)?;
    if grid.samples.len() < len {
        return Err(ForgeError::ImageDecode(format!(
            "artifact holds {} samples, {} expected",
            grid.samples.len(),
            len
        )));
    }
    Ok(grid.samples[..len].to_vec())
}

fn encode_dynamic_png(img: &DynamicImage) -> Result<Vec<u8>> {
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png)
        .map_err(|e| ForgeError::ImageDecode(e.to_string()))?;
    Ok(out.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rgb_png(width: u32, height: u32) -> Vec<u8> {
        let samples: Vec<u8> = (0..width * height * 3).map(|i| (i % 251) as u8).collect();
        let grid = PixelGrid { width, height, format: PixelFormat::Rgb8, samples };
        grid.encode_png().unwrap()
    }

    #[test]
    fn decode_encode_roundtrip() {
        let png = rgb_png(16, 9);
        let grid = PixelGrid::decode(&png).unwrap();
        assert_eq!(grid.width, 16);
        assert_eq!(grid.height, 9);
        assert_eq!(grid.format, PixelFormat::Rgb8);
        let reencoded = grid.encode_png().unwrap();
        let again = PixelGrid::decode(&reencoded).unwrap();
        assert_eq!(again.samples, grid.samples);
    }

    #[test]
    fn garbage_is_rejected() {
        let result = PixelGrid::decode(b"definitely not an image");
        assert!(matches!(result, Err(ForgeError::ImageDecode(_))));
    }

    #[test]
    fn normalize_keeps_eight_bit_format() {
        let png = rgb_png(8, 8);
        let normalized = normalize_to_png(&png).unwrap();
        let grid = PixelGrid::decode(&normalized).unwrap();
        assert_eq!(grid.format, PixelFormat::Rgb8);
    }

    #[test]
    fn pack_unpack_roundtrip() {
        let data: Vec<u8> = (0..1000).map(|i| (i % 256) as u8).collect();
        let png = pack_bytes_as_png(&data).unwrap();
        let back = unpack_bytes_from_png(&png, data.len()).unwrap();
        assert_eq!(back, data);
    }

    #[test]
    fn pack_empty_payload() {
        let png = pack_bytes_as_png(&[]).unwrap();
        let back = unpack_bytes_from_png(&png, 0).unwrap();
        assert!(back.is_empty());
    }

    #[test]
    fn unpack_too_short_fails() {
        let png = pack_bytes_as_png(&[1, 2, 3]).unwrap();
        assert!(unpack_bytes_from_png(&png, 100_000).is_err());
    }
}
