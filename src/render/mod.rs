//! Render paths and frame leases
//!
//! A player converts engine frames into something a consumer can draw through
//! exactly one of two render paths, chosen when the player is built:
//!
//! - [`SharedTexturePath`]: the engine writes into a GPU texture on the
//!   process-wide [`InteropContext`]; leases lock that texture
//! - [`BitmapPath`]: the engine writes into a CPU bitmap that is copied into a
//!   [`Surface`]; leases carry the surface and upload it on demand

pub mod bitmap;
pub mod interop;
pub mod shared;
pub mod surface;

pub use bitmap::{BitmapLease, BitmapPath};
pub use interop::InteropContext;
pub use shared::{SharedTextureLease, SharedTexturePath};
pub use surface::Surface;

use crate::engine::{EngineAttributes, MediaEngine};
use log::{info, warn};
use std::ops::Deref;
use std::sync::Arc;

/// The render path a player was built with
pub enum RenderPath {
    Shared(SharedTexturePath),
    Bitmap(BitmapPath),
}

impl RenderPath {
    /// Pick the path for a player
    ///
    /// Hardware acceleration needs the interop context; without one the
    /// player falls back to the bitmap path.
    pub fn for_format(hardware_accelerated: bool) -> Self {
        if !hardware_accelerated {
            return RenderPath::Bitmap(BitmapPath::new());
        }

        match InteropContext::acquire() {
            Some(context) => {
                info!("Using shared texture render path on {}", context.adapter_name());
                RenderPath::Shared(SharedTexturePath::new(context))
            }
            None => {
                warn!("Hardware acceleration requested but unavailable, using bitmap path");
                RenderPath::Bitmap(BitmapPath::new())
            }
        }
    }

    /// One-time setup before the engine is created
    pub fn initialize(&mut self, attributes: &mut EngineAttributes) -> bool {
        match self {
            RenderPath::Shared(path) => path.initialize(attributes),
            RenderPath::Bitmap(_) => true,
        }
    }

    /// Size the backing storage; a no-op when the size is unchanged
    pub fn initialize_render_target(&mut self, size: (u32, u32)) -> bool {
        match self {
            RenderPath::Shared(path) => path.initialize_render_target(size),
            RenderPath::Bitmap(path) => path.initialize_render_target(size),
        }
    }

    /// Pull the engine's current frame into the backing storage
    pub fn process_frame(&mut self, engine: &dyn MediaEngine) -> bool {
        match self {
            RenderPath::Shared(path) => path.process_frame(engine),
            RenderPath::Bitmap(path) => path.process_frame(engine),
        }
    }

    pub fn frame_lease(&self) -> FrameLease {
        match self {
            RenderPath::Shared(path) => path.frame_lease(),
            RenderPath::Bitmap(path) => path.frame_lease(),
        }
    }

    /// CPU pixels of the last frame; `None` on the shared texture path
    pub fn surface(&self) -> Option<Arc<Surface>> {
        match self {
            RenderPath::Shared(_) => None,
            RenderPath::Bitmap(path) => path.surface(),
        }
    }

    /// Current render target size
    pub fn size(&self) -> Option<(u32, u32)> {
        match self {
            RenderPath::Shared(path) => path.size(),
            RenderPath::Bitmap(path) => path.size(),
        }
    }

    pub fn is_hardware_accelerated(&self) -> bool {
        matches!(self, RenderPath::Shared(_))
    }
}

/// Scoped access to one processed frame
///
/// Drop it before the next tick: a shared texture lease blocks frame delivery
/// while it is held.
pub enum FrameLease {
    Shared(SharedTextureLease),
    Bitmap(BitmapLease),
    /// No frame is available
    Empty,
}

impl FrameLease {
    pub fn is_valid(&self) -> bool {
        !matches!(self, FrameLease::Empty)
    }

    pub fn size(&self) -> Option<(u32, u32)> {
        match self {
            FrameLease::Shared(lease) => Some(lease.size()),
            FrameLease::Bitmap(lease) => Some(lease.size()),
            FrameLease::Empty => None,
        }
    }

    /// The leased GPU texture, without uploading anything
    pub fn texture(&self) -> Option<&wgpu::Texture> {
        match self {
            FrameLease::Shared(lease) => Some(lease.texture()),
            _ => None,
        }
    }

    /// The leased CPU pixels
    pub fn surface(&self) -> Option<&Surface> {
        match self {
            FrameLease::Bitmap(lease) => Some(lease.surface()),
            _ => None,
        }
    }

    /// A texture holding the frame, uploading CPU pixels if needed
    pub fn to_texture(&self, device: &wgpu::Device, queue: &wgpu::Queue) -> Option<LeasedTexture<'_>> {
        match self {
            FrameLease::Shared(lease) => Some(LeasedTexture::Shared(lease.texture())),
            FrameLease::Bitmap(lease) => Some(LeasedTexture::Uploaded(lease.to_texture(device, queue))),
            FrameLease::Empty => None,
        }
    }
}

/// Texture produced by [`FrameLease::to_texture`]
pub enum LeasedTexture<'a> {
    /// The locked shared texture itself
    Shared(&'a wgpu::Texture),
    /// A fresh upload of the CPU snapshot
    Uploaded(wgpu::Texture),
}

impl Deref for LeasedTexture<'_> {
    type Target = wgpu::Texture;

    fn deref(&self) -> &wgpu::Texture {
        match self {
            LeasedTexture::Shared(texture) => *texture,
            LeasedTexture::Uploaded(texture) => texture,
        }
    }
}
