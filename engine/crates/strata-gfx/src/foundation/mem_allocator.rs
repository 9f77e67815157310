use std::ops::Deref;

use ash::vk;

use crate::error::{GfxResult, VkResultExt};

/// vma 分配器
///
/// vma 内部自行加锁，可以在渲染线程与控制线程之间共享
pub struct GfxAllocator {
    inner: vk_mem::Allocator,
}

unsafe impl Send for GfxAllocator {}
unsafe impl Sync for GfxAllocator {}

impl GfxAllocator {
    /// vma 需要引用 Instance 以及 Device，调用方需要保证它们比分配器活得更久
    pub fn new(instance: &ash::Instance, pdevice: vk::PhysicalDevice, device: &ash::Device) -> GfxResult<Self> {
        let mut vma_ci = vk_mem::AllocatorCreateInfo::new(instance, device, pdevice);
        vma_ci.vulkan_api_version = vk::API_VERSION_1_3;

        let inner = unsafe { vk_mem::Allocator::new(vma_ci) }.vk_context("create vma allocator")?;
        Ok(Self { inner })
    }
}

impl Deref for GfxAllocator {
    type Target = vk_mem::Allocator;
    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

/// 离屏附件的内存，与 image 一起销毁
pub(crate) struct AttachmentMemory {
    pub(crate) image: vk::Image,
    pub(crate) allocation: vk_mem::Allocation,
}

unsafe impl Send for AttachmentMemory {}
