use std::fmt;

use ash::vk;

use crate::error::GfxResult;

/// 逻辑设备的唯一标识
///
/// 每次 Device Level 重建都会得到新的 id，用于判断旧的 swapchain 是否还属于当前设备。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceId(pub u64);

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "device#{}", self.0)
    }
}

/// 每次重建 swapchain 时实时查询，不在 Device 重建之间缓存
#[derive(Debug, Clone, Default)]
pub struct SurfaceSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SwapchainDesc {
    pub format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub image_count: u32,
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    Acquired { index: u32, suboptimal: bool },
    OutOfDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentOutcome {
    Presented { suboptimal: bool },
    OutOfDate,
}

/// 一帧的提交：等待 image available，signal render complete 与 slot 的 fence
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameSubmit {
    pub cmd: vk::CommandBuffer,
    pub wait_semaphore: vk::Semaphore,
    pub wait_stage: vk::PipelineStageFlags,
    pub signal_semaphore: vk::Semaphore,
    pub fence: vk::Fence,
}

#[derive(Debug, Clone)]
pub struct AttachmentDesc {
    pub name: String,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
}

/// 由设备分配内存的离屏颜色附件
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GfxAttachment {
    pub id: u64,
    pub image: vk::Image,
    pub view: vk::ImageView,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
}

/// render pass 的用途
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderPassTarget {
    /// 输出到 swapchain image，结束时转换为 PRESENT_SRC
    Present,
    /// 输出到离屏附件，结束时转换为 SHADER_READ_ONLY，供父节点采样
    Offscreen,
}

#[derive(Debug, Clone, Copy)]
pub struct RenderPassDesc {
    pub format: vk::Format,
    pub target: RenderPassTarget,
}

impl RenderPassDesc {
    #[inline]
    pub fn final_layout(&self) -> vk::ImageLayout {
        match self.target {
            RenderPassTarget::Present => vk::ImageLayout::PRESENT_SRC_KHR,
            RenderPassTarget::Offscreen => vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FramebufferDesc {
    pub render_pass: vk::RenderPass,
    pub view: vk::ImageView,
    pub extent: vk::Extent2D,
}

/// 录制 `vkCmdBeginRenderPass` 所需的全部信息
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderPassBegin {
    pub render_pass: vk::RenderPass,
    pub framebuffer: vk::Framebuffer,
    pub extent: vk::Extent2D,
    pub clear_color: [f32; 4],
}

/// 渲染循环、交换链、帧资源以及 render graph 使用的全部 GPU 操作
///
/// 实现需要可以跨线程共享：渲染线程与控制线程会同时持有同一个后端。
/// 所有需要外部同步的 Vulkan 对象（queue、command pool）由实现内部加锁。
pub trait GfxBackend: Send + Sync + 'static {
    fn device_id(&self) -> DeviceId;

    // sync
    fn create_fence(&self, signaled: bool, name: &str) -> GfxResult<vk::Fence>;
    fn destroy_fence(&self, fence: vk::Fence);
    /// 超时返回 [`crate::GfxError::Timeout`]
    fn wait_fence(&self, fence: vk::Fence, timeout_ns: u64) -> GfxResult<()>;
    fn reset_fence(&self, fence: vk::Fence) -> GfxResult<()>;
    fn create_semaphore(&self, name: &str) -> GfxResult<vk::Semaphore>;
    fn destroy_semaphore(&self, semaphore: vk::Semaphore);

    // commands
    fn allocate_command_buffer(&self, name: &str) -> GfxResult<vk::CommandBuffer>;
    fn free_command_buffer(&self, cmd: vk::CommandBuffer);
    /// 重置并以 ONE_TIME_SUBMIT 开始录制
    fn begin_command_buffer(&self, cmd: vk::CommandBuffer) -> GfxResult<()>;
    fn end_command_buffer(&self, cmd: vk::CommandBuffer) -> GfxResult<()>;
    fn submit(&self, submit: &FrameSubmit) -> GfxResult<()>;
    fn wait_idle(&self) -> GfxResult<()>;

    // surface & swapchain
    fn surface_support(&self) -> GfxResult<SurfaceSupport>;
    fn create_swapchain(&self, desc: &SwapchainDesc, old: vk::SwapchainKHR) -> GfxResult<vk::SwapchainKHR>;
    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR);
    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> GfxResult<Vec<vk::Image>>;
    fn create_image_view(&self, image: vk::Image, format: vk::Format, name: &str) -> GfxResult<vk::ImageView>;
    fn destroy_image_view(&self, view: vk::ImageView);
    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        signal: vk::Semaphore,
        timeout_ns: u64,
    ) -> GfxResult<AcquireOutcome>;
    fn present(&self, swapchain: vk::SwapchainKHR, image_index: u32, wait: vk::Semaphore)
    -> GfxResult<PresentOutcome>;

    // attachments & passes
    fn create_color_attachment(&self, desc: &AttachmentDesc) -> GfxResult<GfxAttachment>;
    fn destroy_color_attachment(&self, attachment: GfxAttachment);
    /// 在短生命周期的 command buffer 上执行布局转换，并同步等待完成
    fn transition_image_layout(
        &self,
        image: vk::Image,
        old_layout: vk::ImageLayout,
        new_layout: vk::ImageLayout,
    ) -> GfxResult<()>;
    fn create_render_pass(&self, desc: &RenderPassDesc) -> GfxResult<vk::RenderPass>;
    fn destroy_render_pass(&self, render_pass: vk::RenderPass);
    fn create_framebuffer(&self, desc: &FramebufferDesc) -> GfxResult<vk::Framebuffer>;
    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer);
    fn cmd_begin_render_pass(&self, cmd: vk::CommandBuffer, begin: &RenderPassBegin);
    fn cmd_end_render_pass(&self, cmd: vk::CommandBuffer);

    // shaders
    /// `code` 为 SPIR-V
    fn create_shader_module(&self, code: &[u32], name: &str) -> GfxResult<vk::ShaderModule>;
    fn destroy_shader_module(&self, module: vk::ShaderModule);
}
