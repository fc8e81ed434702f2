//! Camera frames and the camera peripheral contract.

use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, ImageEncoder};
use scout_types::ScoutError;

use crate::device::Peripheral;

/// One RGB pixel.
pub type Rgb = [u8; 3];

/// A raw RGB24 frame returned by a camera driver.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraFrame {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Row-major RGB24 pixel data (`width * height * 3` bytes).
    pub data: Vec<u8>,
}

impl CameraFrame {
    /// A black frame of the given size.
    pub fn blank(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0u8; width as usize * height as usize * 3],
        }
    }

    /// `true` when `data` holds exactly one RGB triple per pixel.
    pub fn is_well_formed(&self) -> bool {
        self.data.len() == self.width as usize * self.height as usize * 3
    }

    pub fn contains(&self, x: i64, y: i64) -> bool {
        x >= 0 && y >= 0 && x < i64::from(self.width) && y < i64::from(self.height)
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgb> {
        let idx = self.index(x, y)?;
        Some([self.data[idx], self.data[idx + 1], self.data[idx + 2]])
    }

    /// Set a pixel; coordinates outside the frame are ignored.
    pub fn set_pixel(&mut self, x: i64, y: i64, color: Rgb) {
        if !self.contains(x, y) {
            return;
        }
        if let Some(idx) = self.index(x as u32, y as u32) {
            self.data[idx..idx + 3].copy_from_slice(&color);
        }
    }

    /// Encode the frame as a baseline JPEG.
    ///
    /// # Errors
    ///
    /// Returns [`ScoutError::Storage`] for a malformed buffer or an encoder
    /// failure.
    pub fn to_jpeg(&self, quality: u8) -> Result<Vec<u8>, ScoutError> {
        if !self.is_well_formed() {
            return Err(ScoutError::Storage(format!(
                "frame buffer holds {} bytes, expected {}x{}x3",
                self.data.len(),
                self.width,
                self.height
            )));
        }
        let mut buffer = Vec::new();
        JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100))
            .write_image(&self.data, self.width, self.height, ExtendedColorType::Rgb8)
            .map_err(|e| ScoutError::Storage(format!("JPEG encode failed: {e}")))?;
        Ok(buffer)
    }

    fn index(&self, x: u32, y: u32) -> Option<usize> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = (y as usize * self.width as usize + x as usize) * 3;
        (idx + 3 <= self.data.len()).then_some(idx)
    }
}

/// A camera is any peripheral whose sample is a [`CameraFrame`].
pub trait Camera: Peripheral<Sample = CameraFrame> {}

impl<T: Peripheral<Sample = CameraFrame>> Camera for T {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_frame_is_well_formed() {
        let frame = CameraFrame::blank(4, 3);
        assert!(frame.is_well_formed());
        assert_eq!(frame.data.len(), 36);
        assert_eq!(frame.pixel(3, 2), Some([0, 0, 0]));
        assert_eq!(frame.pixel(4, 0), None);
    }

    #[test]
    fn set_pixel_ignores_out_of_bounds() {
        let mut frame = CameraFrame::blank(2, 2);
        frame.set_pixel(1, 1, [255, 0, 0]);
        frame.set_pixel(-1, 0, [255, 0, 0]);
        frame.set_pixel(2, 0, [255, 0, 0]);
        assert_eq!(frame.pixel(1, 1), Some([255, 0, 0]));
        assert_eq!(frame.data.iter().filter(|b| **b == 255).count(), 1);
    }

    #[test]
    fn to_jpeg_produces_jfif_stream() {
        let jpeg = CameraFrame::blank(16, 16).to_jpeg(90).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn truncated_buffer_is_not_well_formed() {
        let frame = CameraFrame {
            width: 2,
            height: 2,
            data: vec![0u8; 5],
        };
        assert!(!frame.is_well_formed());
        assert_eq!(frame.pixel(1, 1), None);
        assert!(matches!(frame.to_jpeg(80), Err(ScoutError::Storage(_))));
    }
}
