//! Frame ownership.
//!
//! A `Frame` owns one RGB pixel buffer (height x width x 3, row-major, RGB order).
//! Frames are not `Clone`: the processor takes a frame by value, draws
//! on the same buffer, and hands ownership back. There is never a second live
//! reference to a frame's pixels.

use anyhow::{anyhow, Result};
use image::RgbImage;

/// One decoded video frame.
pub struct Frame {
    image: RgbImage,
    /// Position of this frame in its source sequence (1-based).
    pub index: u64,
}

// NOT Clone: see module docs.

impl Frame {
    /// Wrap a packed RGB24 buffer. Fails if the length does not match the dimensions.
    pub fn from_rgb(pixels: Vec<u8>, width: u32, height: u32, index: u64) -> Result<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(3))
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        if pixels.len() != expected {
            return Err(anyhow!(
                "expected {} RGB bytes for {}x{}, received {}",
                expected,
                width,
                height,
                pixels.len()
            ));
        }
        let image = RgbImage::from_raw(width, height, pixels)
            .ok_or_else(|| anyhow!("RGB buffer does not fit {}x{}", width, height))?;
        Ok(Self { image, index })
    }

    pub fn from_image(image: RgbImage, index: u64) -> Self {
        Self { image, index }
    }

    /// Solid-colour frame, mostly useful for synthetic sources and tests.
    pub fn filled(width: u32, height: u32, rgb: [u8; 3], index: u64) -> Self {
        Self {
            image: RgbImage::from_pixel(width, height, image::Rgb(rgb)),
            index,
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    /// Mutable access for in-place annotation.
    pub(crate) fn image_mut(&mut self) -> &mut RgbImage {
        &mut self.image
    }

    /// Packed RGB bytes.
    pub fn as_rgb(&self) -> &[u8] {
        self.image.as_raw()
    }

    pub fn into_image(self) -> RgbImage {
        self.image
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("index", &self.index)
            .field("width", &self.width())
            .field("height", &self.height())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_mismatched_buffer_length() {
        let err = Frame::from_rgb(vec![0u8; 10], 2, 2, 1).unwrap_err();
        assert!(err.to_string().contains("expected 12 RGB bytes"));
    }

    #[test]
    fn wraps_packed_rgb() -> Result<()> {
        let pixels: Vec<u8> = (0..12).collect();
        let frame = Frame::from_rgb(pixels.clone(), 2, 2, 7)?;
        assert_eq!(frame.width(), 2);
        assert_eq!(frame.height(), 2);
        assert_eq!(frame.index, 7);
        assert_eq!(frame.as_rgb(), pixels.as_slice());
        assert_eq!(frame.into_image().get_pixel(1, 0).0, [3, 4, 5]);
        Ok(())
    }
}
