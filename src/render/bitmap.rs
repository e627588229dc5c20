//! CPU bitmap render path
//!
//! The engine transfers each frame into a row-aligned bitmap. The bitmap is
//! locked for reading just long enough to copy it into an independently owned
//! [`Surface`], so nothing outside this module ever aliases the transfer
//! buffer. Leases hand out the surface snapshot and upload it to a texture
//! only when asked.

use super::surface::{Surface, BYTES_PER_PIXEL};
use super::FrameLease;
use crate::engine::{FrameView, MediaEngine, VideoFrameTarget};
use crate::utils::error::{PlayerError, Result};
use log::{debug, warn};
use std::sync::Arc;

/// Row alignment of the transfer bitmap, in bytes
const ROW_ALIGNMENT: u32 = 64;

fn align_up(value: u32, alignment: u32) -> u32 {
    (value + alignment - 1) & !(alignment - 1)
}

/// Engine transfer target
pub struct Bitmap {
    width: u32,
    height: u32,
    stride: usize,
    data: Vec<u8>,
    locked: bool,
}

impl Bitmap {
    pub fn new(width: u32, height: u32) -> Self {
        let stride = align_up(width * BYTES_PER_PIXEL as u32, ROW_ALIGNMENT) as usize;
        Self {
            width,
            height,
            stride,
            data: vec![0; stride * height as usize],
            locked: false,
        }
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Lock the pixels read-only until the guard drops
    pub fn lock_read(&mut self) -> BitmapReadLock<'_> {
        self.locked = true;
        BitmapReadLock { bitmap: self }
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }
}

impl VideoFrameTarget for Bitmap {
    fn target_size(&self) -> (u32, u32) {
        self.size()
    }

    fn write_frame(&mut self, frame: FrameView<'_>) -> Result<()> {
        if self.locked {
            return Err(PlayerError::Sync("Bitmap is locked for reading".to_string()));
        }
        if (frame.width, frame.height) != self.size() {
            return Err(PlayerError::Renderer(format!(
                "Frame is {}x{}, bitmap is {}x{}",
                frame.width, frame.height, self.width, self.height
            )));
        }

        let row_bytes = self.width as usize * BYTES_PER_PIXEL;
        for y in 0..self.height {
            let start = y as usize * self.stride;
            self.data[start..start + row_bytes].copy_from_slice(frame.row(y));
        }
        Ok(())
    }
}

/// Read access to a locked bitmap
pub struct BitmapReadLock<'a> {
    bitmap: &'a mut Bitmap,
}

impl BitmapReadLock<'_> {
    pub fn view(&self) -> FrameView<'_> {
        FrameView {
            width: self.bitmap.width,
            height: self.bitmap.height,
            stride: self.bitmap.stride,
            data: &self.bitmap.data,
        }
    }
}

impl Drop for BitmapReadLock<'_> {
    fn drop(&mut self) {
        self.bitmap.locked = false;
    }
}

/// Snapshot of the last processed frame
pub struct BitmapLease {
    surface: Arc<Surface>,
}

impl BitmapLease {
    pub fn surface(&self) -> &Surface {
        &self.surface
    }

    pub fn size(&self) -> (u32, u32) {
        self.surface.size()
    }

    /// Upload the snapshot into a new sampled texture
    pub fn to_texture(&self, device: &wgpu::Device, queue: &wgpu::Queue) -> wgpu::Texture {
        let (width, height) = self.surface.size();
        let extent = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("frameplayer frame texture"),
            size: extent,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Bgra8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            self.surface.data(),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(self.surface.stride() as u32),
                rows_per_image: Some(height),
            },
            extent,
        );
        texture
    }
}

/// Render path copying frames through CPU memory
#[derive(Default)]
pub struct BitmapPath {
    bitmap: Option<Bitmap>,
    surface: Option<Arc<Surface>>,
}

impl BitmapPath {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn initialize_render_target(&mut self, size: (u32, u32)) -> bool {
        if let (Some(bitmap), Some(_)) = (&self.bitmap, &self.surface) {
            if bitmap.size() == size {
                return true;
            }
        }

        if size.0 == 0 || size.1 == 0 {
            self.bitmap = None;
            self.surface = None;
            return false;
        }

        debug!("Allocating {}x{} frame bitmap", size.0, size.1);
        self.bitmap = Some(Bitmap::new(size.0, size.1));
        self.surface = Some(Arc::new(Surface::new(size.0, size.1)));
        true
    }

    pub fn process_frame(&mut self, engine: &dyn MediaEngine) -> bool {
        let (Some(bitmap), Some(surface)) = (self.bitmap.as_mut(), self.surface.as_mut()) else {
            return false;
        };

        if let Err(e) = engine.transfer_video_frame(bitmap) {
            warn!("Failed to transfer frame to bitmap: {}", e);
            return false;
        }

        let lock = bitmap.lock_read();
        // Copy-on-write: a surface still held by a lease keeps its old pixels
        match Arc::make_mut(surface).copy_from(lock.view()) {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to copy bitmap to surface: {}", e);
                false
            }
        }
    }

    pub fn frame_lease(&self) -> FrameLease {
        match &self.surface {
            Some(surface) => FrameLease::Bitmap(BitmapLease {
                surface: Arc::clone(surface),
            }),
            None => FrameLease::Empty,
        }
    }

    pub fn surface(&self) -> Option<Arc<Surface>> {
        self.surface.clone()
    }

    pub fn size(&self) -> Option<(u32, u32)> {
        self.bitmap.as_ref().map(Bitmap::size)
    }

    /// Address of the transfer buffer, for identity checks
    pub(crate) fn bitmap_ptr(&self) -> Option<*const u8> {
        self.bitmap.as_ref().map(|b| b.data.as_ptr())
    }
}
