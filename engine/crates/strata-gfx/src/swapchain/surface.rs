use std::ffi::c_char;

use ash::vk;
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};

use crate::error::{GfxError, GfxResult};

/// 窗口的原始句柄，可以跨线程发送
///
/// 窗口句柄只在创建 surface 时使用，调用方需要保证窗口比 surface 活得更久
#[derive(Clone, Copy)]
pub struct RawWindowTarget {
    display: RawDisplayHandle,
    window: RawWindowHandle,
}

unsafe impl Send for RawWindowTarget {}
unsafe impl Sync for RawWindowTarget {}

impl RawWindowTarget {
    pub fn new(display: RawDisplayHandle, window: RawWindowHandle) -> Self {
        Self { display, window }
    }

    /// 创建该窗口的 surface 所需的 instance extensions
    pub fn required_extensions(&self) -> GfxResult<&'static [*const c_char]> {
        ash_window::enumerate_required_extensions(self.display)
            .map_err(|e| GfxError::Surface(format!("unsupported display handle: {e:?}")))
    }

    pub fn create_surface(&self, entry: &ash::Entry, instance: &ash::Instance) -> GfxResult<vk::SurfaceKHR> {
        unsafe { ash_window::create_surface(entry, instance, self.display, self.window, None) }
            .map_err(|e| GfxError::Surface(format!("failed to create window surface: {e:?}")))
    }
}
