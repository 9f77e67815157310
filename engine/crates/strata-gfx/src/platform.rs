use std::ffi::c_char;
use std::sync::Arc;

use ash::vk;

use crate::backend::GfxBackend;
use crate::error::GfxResult;
use crate::foundation::physical_device::GpuPreference;

/// 窗口（或其他可呈现目标）的提供者
pub trait SurfaceProvider: Send + Sync {
    /// 创建 surface 所需的 instance extensions
    fn required_instance_extensions(&self) -> GfxResult<&'static [*const c_char]>;

    fn create_surface(&self, entry: &ash::Entry, instance: &ash::Instance) -> GfxResult<vk::SurfaceKHR>;

    /// 当前可绘制区域的像素尺寸
    fn drawable_size(&self) -> vk::Extent2D;

    /// 最小化时可绘制区域为 0
    fn is_minimized(&self) -> bool {
        let size = self.drawable_size();
        size.width == 0 || size.height == 0
    }

    fn is_closing(&self) -> bool;
}

#[derive(Debug, Clone)]
pub struct InstanceDesc {
    pub app_name: String,
    /// 开启 validation layer 与 debug messenger
    pub debug: bool,
}

#[derive(Debug, Clone)]
pub struct DeviceDesc {
    pub preference: GpuPreference,
    /// 为 Vulkan 对象设置 debug name
    pub debug_names: bool,
}

/// Context / Instance / Device 三个 Level 对应的 GPU 对象
///
/// Frame 与 Swapchain 两个 Level 只通过 [`GfxBackend`] 操作设备。
pub trait GfxPlatform: Send + 'static {
    type Backend: GfxBackend;

    /// Context：加载 Vulkan
    fn load(&mut self) -> GfxResult<()>;
    fn unload(&mut self);

    /// Instance：instance、debug messenger 与 surface
    fn create_instance(&mut self, desc: &InstanceDesc) -> GfxResult<()>;
    fn destroy_instance(&mut self);

    /// Device：选择物理设备并创建逻辑设备
    fn create_device(&mut self, desc: &DeviceDesc) -> GfxResult<Arc<Self::Backend>>;

    /// 调用方需要保证已经没有其他对 `device` 的引用
    fn destroy_device(&mut self, device: Arc<Self::Backend>) -> GfxResult<()>;
}
