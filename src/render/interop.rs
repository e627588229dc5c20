//! Process-wide GPU interop context
//!
//! One wgpu device is shared by every hardware-accelerated player in the
//! process: engines upload decoded frames through it and consumers sample
//! the resulting textures with it. The context is created on first use and
//! held weakly by the process slot, so it lives exactly as long as at least
//! one player keeps an `Arc` to it.

use log::{debug, error, info, warn};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};

struct Slot {
    live: Weak<InteropContext>,
    /// Creation failed once; later acquisitions return `None` without retrying
    failed: bool,
}

static SLOT: Lazy<Mutex<Slot>> = Lazy::new(|| {
    Mutex::new(Slot {
        live: Weak::new(),
        failed: false,
    })
});

/// Shared GPU device and queue
pub struct InteropContext {
    _instance: wgpu::Instance,
    adapter: wgpu::Adapter,
    device: wgpu::Device,
    queue: wgpu::Queue,
}

impl InteropContext {
    /// Current context, creating it if no player holds one
    ///
    /// Returns `None` when no usable adapter exists. The failure is logged the
    /// first time only.
    pub fn acquire() -> Option<Arc<Self>> {
        let mut slot = SLOT.lock();
        if let Some(context) = slot.live.upgrade() {
            return Some(context);
        }
        if slot.failed {
            return None;
        }

        match pollster::block_on(Self::create()) {
            Ok(context) => {
                let context = Arc::new(context);
                slot.live = Arc::downgrade(&context);
                Some(context)
            }
            Err(message) => {
                error!("GPU interop unavailable: {}", message);
                slot.failed = true;
                None
            }
        }
    }

    /// Whether a context currently exists in this process
    pub fn is_alive() -> bool {
        SLOT.lock().live.strong_count() > 0
    }

    async fn create() -> std::result::Result<Self, String> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = match instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
        {
            Ok(adapter) => adapter,
            Err(e) => {
                warn!("No hardware GPU adapter ({}), trying the software fallback", e);
                instance
                    .request_adapter(&wgpu::RequestAdapterOptions {
                        power_preference: wgpu::PowerPreference::LowPower,
                        compatible_surface: None,
                        force_fallback_adapter: true,
                    })
                    .await
                    .map_err(|e| format!("Failed to find suitable GPU adapter: {}", e))?
            }
        };

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("frameplayer interop device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::downlevel_defaults(),
                ..Default::default()
            })
            .await
            .map_err(|e| format!("Failed to create device: {}", e))?;

        let info = adapter.get_info();
        info!("GPU interop context created on {} ({:?})", info.name, info.backend);

        Ok(Self {
            _instance: instance,
            adapter,
            device,
            queue,
        })
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Adapter name for diagnostics
    pub fn adapter_name(&self) -> String {
        self.adapter.get_info().name
    }
}

impl Drop for InteropContext {
    fn drop(&mut self) {
        debug!("GPU interop context released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_shares_one_context() {
        // Machines without even a software adapter cannot create a context
        let Some(first) = InteropContext::acquire() else {
            return;
        };
        let second = InteropContext::acquire().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(InteropContext::is_alive());
        drop(second);
        assert!(InteropContext::is_alive());
    }
}
