//! CPU pixel surface
//!
//! Tightly packed BGRA8 storage. The CPU render path copies every processed
//! frame into one of these, and consumers read pixels from it directly or
//! upload it as a texture.

use crate::engine::{FrameView, PixelFormat};
use crate::utils::error::{PlayerError, Result};

/// Bytes per BGRA pixel
pub const BYTES_PER_PIXEL: usize = PixelFormat::Bgra8.bytes_per_pixel();

/// Owned BGRA8 image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Surface {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl Surface {
    /// Allocate a transparent black surface
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0; width as usize * height as usize * BYTES_PER_PIXEL],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Bytes per row (rows are unpadded)
    pub fn stride(&self) -> usize {
        self.width as usize * BYTES_PER_PIXEL
    }

    /// Raw BGRA bytes
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// BGRA value at (x, y)
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = y as usize * self.stride() + x as usize * BYTES_PER_PIXEL;
        let px = &self.data[offset..offset + BYTES_PER_PIXEL];
        Some([px[0], px[1], px[2], px[3]])
    }

    /// Copy a frame of identical size, dropping any source row padding
    pub fn copy_from(&mut self, frame: FrameView<'_>) -> Result<()> {
        if (frame.width, frame.height) != self.size() {
            return Err(PlayerError::InvalidInput(format!(
                "Frame is {}x{}, surface is {}x{}",
                frame.width, frame.height, self.width, self.height
            )));
        }
        let row_bytes = self.stride();
        if row_bytes == 0 || self.height == 0 {
            return Ok(());
        }
        if frame.stride < row_bytes || frame.data.len() < frame.stride * (frame.height as usize).saturating_sub(1) + row_bytes {
            return Err(PlayerError::InvalidInput("Frame buffer too small for its size".to_string()));
        }

        if frame.stride == row_bytes {
            let len = self.data.len();
            self.data.copy_from_slice(&frame.data[..len]);
        } else {
            for (y, dst) in self.data.chunks_exact_mut(row_bytes).enumerate() {
                dst.copy_from_slice(frame.row(y as u32));
            }
        }
        Ok(())
    }

    /// Pixels reordered to RGBA8
    pub fn to_rgba8(&self) -> Vec<u8> {
        let pixels: &[[u8; 4]] = bytemuck::cast_slice(&self.data);
        pixels
            .iter()
            .flat_map(|&[b, g, r, a]| [r, g, b, a])
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_surface_is_zeroed() {
        let surface = Surface::new(3, 2);
        assert_eq!(surface.size(), (3, 2));
        assert_eq!(surface.stride(), 12);
        assert!(surface.data().iter().all(|&b| b == 0));
        assert_eq!(surface.pixel(3, 0), None);
    }

    #[test]
    fn test_copy_from_padded_rows() {
        let stride = 2 * 4 + 4;
        let mut data = vec![0xEEu8; stride * 2];
        data[0..4].copy_from_slice(&[1, 2, 3, 4]);
        data[stride + 4..stride + 8].copy_from_slice(&[5, 6, 7, 8]);

        let mut surface = Surface::new(2, 2);
        surface
            .copy_from(FrameView { width: 2, height: 2, stride, data: &data })
            .unwrap();

        assert_eq!(surface.pixel(0, 0), Some([1, 2, 3, 4]));
        assert_eq!(surface.pixel(1, 1), Some([5, 6, 7, 8]));
        // Row 1 starts at the source stride, not right after row 0's pixels
        assert_eq!(surface.pixel(0, 1), Some([0xEE; 4]));
        assert_eq!(surface.data().len(), 16);
    }

    #[test]
    fn test_copy_from_packed_rows() {
        let data: Vec<u8> = (0..16).collect();
        let mut surface = Surface::new(2, 2);
        surface
            .copy_from(FrameView { width: 2, height: 2, stride: 8, data: &data })
            .unwrap();
        assert_eq!(surface.data(), &data[..]);
        assert_eq!(surface.pixel(1, 1), Some([12, 13, 14, 15]));
    }

    #[test]
    fn test_copy_rejects_size_mismatch() {
        let data = vec![0u8; 64];
        let mut surface = Surface::new(2, 2);
        let result = surface.copy_from(FrameView { width: 4, height: 4, stride: 16, data: &data });
        assert!(result.is_err());
    }

    #[test]
    fn test_to_rgba8_swaps_channels() {
        let data = [10u8, 20, 30, 40];
        let mut surface = Surface::new(1, 1);
        surface
            .copy_from(FrameView { width: 1, height: 1, stride: 4, data: &data })
            .unwrap();
        assert_eq!(surface.to_rgba8(), vec![30, 20, 10, 40]);
    }
}
