//! GPU shared-texture render path
//!
//! The engine writes each frame straight into a BGRA texture on the shared
//! interop device, and consumers sample that same texture. Both sides touch
//! the same memory, so access is serialized with a lock flag: a frame lease
//! holds the lock for its lifetime, and a frame that arrives while a lease is
//! outstanding is skipped.

use super::interop::InteropContext;
use super::FrameLease;
use crate::engine::{EngineAttributes, FrameView, MediaEngine, VideoFrameTarget};
use crate::utils::error::{PlayerError, Result};
use log::{debug, trace, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Texture format shared with the engine output
pub const SHARED_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Bgra8Unorm;

/// Exclusive access flag shared by the engine writer and the consumer
#[derive(Debug, Default)]
pub struct AccessLock {
    locked: AtomicBool,
}

impl AccessLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the lock; false if someone else holds it
    pub fn try_lock(&self) -> bool {
        self.locked
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn unlock(&self) {
        self.locked.store(false, Ordering::Release);
    }

    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Acquire)
    }

    /// Take the lock for the lifetime of the returned guard
    pub fn acquire(self: &Arc<Self>) -> Option<AccessGuard> {
        if self.try_lock() {
            Some(AccessGuard {
                lock: Arc::clone(self),
            })
        } else {
            None
        }
    }
}

/// Held [`AccessLock`]; releases it on drop
#[derive(Debug)]
pub struct AccessGuard {
    lock: Arc<AccessLock>,
}

impl Drop for AccessGuard {
    fn drop(&mut self) {
        self.lock.unlock();
    }
}

/// Frame texture plus its cross-user lock
pub struct SharedTexture {
    texture: wgpu::Texture,
    size: (u32, u32),
    access: Arc<AccessLock>,
}

impl SharedTexture {
    fn create(device: &wgpu::Device, (width, height): (u32, u32)) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("frameplayer shared texture"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: SHARED_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_DST
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });

        Self {
            texture,
            size: (width, height),
            access: Arc::new(AccessLock::new()),
        }
    }

    pub fn access(&self) -> &Arc<AccessLock> {
        &self.access
    }

    pub fn texture(&self) -> &wgpu::Texture {
        &self.texture
    }

    pub fn size(&self) -> (u32, u32) {
        self.size
    }

    fn write(&self, queue: &wgpu::Queue, frame: FrameView<'_>) -> Result<()> {
        if (frame.width, frame.height) != self.size {
            return Err(PlayerError::Renderer(format!(
                "Frame is {}x{}, shared texture is {}x{}",
                frame.width, frame.height, self.size.0, self.size.1
            )));
        }

        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            frame.data,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(frame.stride as u32),
                rows_per_image: Some(frame.height),
            },
            wgpu::Extent3d {
                width: frame.width,
                height: frame.height,
                depth_or_array_layers: 1,
            },
        );
        Ok(())
    }
}

/// Transfer target writing into a locked shared texture
struct TextureWriter<'a> {
    texture: &'a SharedTexture,
    queue: &'a wgpu::Queue,
}

impl VideoFrameTarget for TextureWriter<'_> {
    fn target_size(&self) -> (u32, u32) {
        self.texture.size()
    }

    fn write_frame(&mut self, frame: FrameView<'_>) -> Result<()> {
        self.texture.write(self.queue, frame)
    }
}

/// Locked access to the shared texture; unlocks on drop
pub struct SharedTextureLease {
    texture: Arc<SharedTexture>,
    _guard: AccessGuard,
}

impl SharedTextureLease {
    pub fn texture(&self) -> &wgpu::Texture {
        self.texture.texture()
    }

    pub fn size(&self) -> (u32, u32) {
        self.texture.size()
    }
}

/// Render path backed by the shared interop device
pub struct SharedTexturePath {
    // Declared before the context: the texture must go first
    texture: Option<Arc<SharedTexture>>,
    context: Arc<InteropContext>,
}

impl SharedTexturePath {
    pub fn new(context: Arc<InteropContext>) -> Self {
        Self {
            texture: None,
            context,
        }
    }

    /// Hand the shared device to the engine about to be created
    pub fn initialize(&mut self, attributes: &mut EngineAttributes) -> bool {
        attributes.shared_device = Some(Arc::clone(&self.context));
        true
    }

    pub fn initialize_render_target(&mut self, size: (u32, u32)) -> bool {
        if let Some(texture) = &self.texture {
            if texture.size() == size {
                return true;
            }
        }

        if size.0 == 0 || size.1 == 0 {
            self.texture = None;
            return false;
        }

        debug!("Allocating {}x{} shared texture", size.0, size.1);
        self.texture = Some(Arc::new(SharedTexture::create(self.context.device(), size)));
        true
    }

    pub fn process_frame(&mut self, engine: &dyn MediaEngine) -> bool {
        let Some(texture) = &self.texture else {
            return false;
        };

        let Some(_guard) = texture.access().acquire() else {
            trace!("Shared texture is leased, skipping frame");
            return false;
        };

        let mut writer = TextureWriter {
            texture,
            queue: self.context.queue(),
        };
        match engine.transfer_video_frame(&mut writer) {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to transfer frame to shared texture: {}", e);
                false
            }
        }
    }

    pub fn frame_lease(&self) -> FrameLease {
        match &self.texture {
            Some(texture) => match texture.access().acquire() {
                Some(guard) => FrameLease::Shared(SharedTextureLease {
                    texture: Arc::clone(texture),
                    _guard: guard,
                }),
                None => {
                    warn!("Shared texture already leased");
                    FrameLease::Empty
                }
            },
            None => FrameLease::Empty,
        }
    }

    pub fn size(&self) -> Option<(u32, u32)> {
        self.texture.as_ref().map(|t| t.size())
    }

    pub fn context(&self) -> &Arc<InteropContext> {
        &self.context
    }

    /// Identity of the current backing texture
    pub(crate) fn target(&self) -> Option<&Arc<SharedTexture>> {
        self.texture.as_ref()
    }
}

impl Drop for SharedTexturePath {
    fn drop(&mut self) {
        self.texture.take();
    }
}
