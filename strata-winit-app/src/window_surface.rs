use std::ffi::c_char;
use std::sync::atomic::{AtomicBool, Ordering};

use ash::vk;
use parking_lot::Mutex;
use strata_gfx::swapchain::surface::RawWindowTarget;
use strata_gfx::{GfxResult, SurfaceProvider};

/// winit 窗口对应的 surface provider
///
/// 尺寸由事件循环在 `Resized` 时写入，控制线程在每次 tick 时读取。
pub struct WindowSurface {
    target: RawWindowTarget,
    size: Mutex<vk::Extent2D>,
    closing: AtomicBool,
}

impl WindowSurface {
    pub fn new(target: RawWindowTarget, width: u32, height: u32) -> Self {
        Self {
            target,
            size: Mutex::new(vk::Extent2D { width, height }),
            closing: AtomicBool::new(false),
        }
    }

    pub fn resize(&self, width: u32, height: u32) {
        *self.size.lock() = vk::Extent2D { width, height };
    }

    pub fn close(&self) {
        self.closing.store(true, Ordering::Release);
    }
}

impl SurfaceProvider for WindowSurface {
    fn required_instance_extensions(&self) -> GfxResult<&'static [*const c_char]> {
        self.target.required_extensions()
    }

    fn create_surface(&self, entry: &ash::Entry, instance: &ash::Instance) -> GfxResult<vk::SurfaceKHR> {
        self.target.create_surface(entry, instance)
    }

    fn drawable_size(&self) -> vk::Extent2D {
        *self.size.lock()
    }

    fn is_closing(&self) -> bool {
        self.closing.load(Ordering::Acquire)
    }
}
