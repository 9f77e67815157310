use std::collections::HashMap;
use std::ffi::CString;
use std::mem::ManuallyDrop;
use std::sync::atomic::{AtomicU64, Ordering};

use ash::vk;
use parking_lot::Mutex;
use vk_mem::Alloc;

use crate::backend::{
    AcquireOutcome, AttachmentDesc, DeviceId, FrameSubmit, FramebufferDesc, GfxAttachment, GfxBackend,
    PresentOutcome, RenderPassBegin, RenderPassDesc, RenderPassTarget, SurfaceSupport, SwapchainDesc,
};
use crate::commands::barrier::{LayoutTransition, color_subresource_range};
use crate::commands::submit_info::GfxSubmitInfo;
use crate::error::{GfxError, GfxResult, VkResultExt};
use crate::foundation::features::{FeatureChain, REQUIRED_FEATURES};
use crate::foundation::instance::GfxInstance;
use crate::foundation::mem_allocator::{AttachmentMemory, GfxAllocator};
use crate::foundation::physical_device::GfxPhysicalDevice;
use crate::platform::DeviceDesc;

static NEXT_DEVICE_ID: AtomicU64 = AtomicU64::new(1);

/// 一次性命令的等待上限
const ONE_TIME_SUBMIT_TIMEOUT_NS: u64 = 5_000_000_000;

/// Vulkan 逻辑设备封装
///
/// 持有 queue、command pool 与 vma 分配器。queue 与 command pool 需要外部同步，因此放在锁里；
/// 渲染线程与控制线程通过 `Arc<GfxDevice>` 共享同一个设备。
pub struct GfxDevice {
    id: DeviceId,
    pdevice: GfxPhysicalDevice,

    pub(crate) device: ash::Device,
    pub(crate) swapchain_pf: ash::khr::swapchain::Device,
    /// 只有 debug mode 且开启了 debug name 时存在
    debug_utils: Option<ash::ext::debug_utils::Device>,

    surface_pf: ash::khr::surface::Instance,
    surface: vk::SurfaceKHR,

    queue: Mutex<vk::Queue>,
    /// 每帧的 command buffer，可以单独 reset
    frame_pool: Mutex<vk::CommandPool>,
    /// 一次性命令
    transient_pool: Mutex<vk::CommandPool>,

    allocator: ManuallyDrop<GfxAllocator>,
    attachments: Mutex<HashMap<u64, AttachmentMemory>>,
    next_attachment_id: AtomicU64,

    destroyed: bool,
}

// new & init
impl GfxDevice {
    pub fn new(instance: &GfxInstance, desc: &DeviceDesc) -> GfxResult<Self> {
        let _span = tracy_client::span!("GfxDevice::new");

        let pdevice =
            GfxPhysicalDevice::select(&instance.ash_instance, &instance.surface_pf, instance.surface, &desc.preference)?;

        let priorities = [1.0_f32];
        let queue_ci = vk::DeviceQueueCreateInfo::default()
            .queue_family_index(pdevice.queue_family_index())
            .queue_priorities(&priorities);

        // device 所需的所有 features
        let requested = FeatureChain::from_features(REQUIRED_FEATURES);
        let mut vk12 = requested.vk12;
        let mut features2 = FeatureChain::device_create_features(requested.core, &mut vk12);
        log::info!("device features: {:?}", requested);

        let device_exts = [ash::khr::swapchain::NAME.as_ptr()];
        let device_ci = vk::DeviceCreateInfo::default()
            .queue_create_infos(std::slice::from_ref(&queue_ci))
            .enabled_extension_names(&device_exts)
            .push_next(&mut features2);

        let device = unsafe { instance.ash_instance.create_device(pdevice.handle(), &device_ci, None) }
            .vk_context("create device")?;

        match Self::init_with_device(instance, desc, pdevice, device.clone()) {
            Ok(gfx_device) => Ok(gfx_device),
            Err(e) => {
                unsafe { device.destroy_device(None) };
                Err(e)
            }
        }
    }

    fn init_with_device(
        instance: &GfxInstance,
        desc: &DeviceDesc,
        pdevice: GfxPhysicalDevice,
        device: ash::Device,
    ) -> GfxResult<Self> {
        let queue_family_index = pdevice.queue_family_index();
        let queue = unsafe { device.get_device_queue(queue_family_index, 0) };

        let frame_pool = unsafe {
            device.create_command_pool(
                &vk::CommandPoolCreateInfo::default()
                    .queue_family_index(queue_family_index)
                    .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER),
                None,
            )
        }
        .vk_context("create frame command pool")?;

        let transient_pool = match unsafe {
            device.create_command_pool(
                &vk::CommandPoolCreateInfo::default()
                    .queue_family_index(queue_family_index)
                    .flags(vk::CommandPoolCreateFlags::TRANSIENT),
                None,
            )
        }
        .vk_context("create transient command pool")
        {
            Ok(pool) => pool,
            Err(e) => {
                unsafe { device.destroy_command_pool(frame_pool, None) };
                return Err(e);
            }
        };

        let allocator = match GfxAllocator::new(&instance.ash_instance, pdevice.handle(), &device) {
            Ok(allocator) => allocator,
            Err(e) => {
                unsafe {
                    device.destroy_command_pool(transient_pool, None);
                    device.destroy_command_pool(frame_pool, None);
                }
                return Err(e);
            }
        };

        let debug_utils = (instance.is_debug() && desc.debug_names)
            .then(|| ash::ext::debug_utils::Device::new(&instance.ash_instance, &device));
        let swapchain_pf = ash::khr::swapchain::Device::new(&instance.ash_instance, &device);

        let id = DeviceId(NEXT_DEVICE_ID.fetch_add(1, Ordering::Relaxed));
        log::info!("{} created on gpu {}", id, pdevice.name());

        let gfx_device = Self {
            id,
            pdevice,
            device,
            swapchain_pf,
            debug_utils,
            surface_pf: instance.surface_pf.clone(),
            surface: instance.surface,
            queue: Mutex::new(queue),
            frame_pool: Mutex::new(frame_pool),
            transient_pool: Mutex::new(transient_pool),
            allocator: ManuallyDrop::new(allocator),
            attachments: Mutex::new(HashMap::new()),
            next_attachment_id: AtomicU64::new(1),
            destroyed: false,
        };
        gfx_device.set_debug_name(queue, "main-queue");
        gfx_device.set_debug_name(frame_pool, "frame-pool");
        gfx_device.set_debug_name(transient_pool, "transient-pool");
        Ok(gfx_device)
    }
}

// getters
impl GfxDevice {
    #[inline]
    pub fn ash_device(&self) -> &ash::Device {
        &self.device
    }

    #[inline]
    pub fn physical_device(&self) -> &GfxPhysicalDevice {
        &self.pdevice
    }
}

// tools
impl GfxDevice {
    /// 只有开启 debug name 时生效
    pub fn set_debug_name<T: vk::Handle>(&self, handle: T, name: &str) {
        let Some(debug_utils) = &self.debug_utils else {
            return;
        };
        let Ok(name) = CString::new(name) else {
            return;
        };
        let name_info = vk::DebugUtilsObjectNameInfoEXT::default().object_handle(handle).object_name(&name);
        if let Err(e) = unsafe { debug_utils.set_debug_utils_object_name(&name_info) } {
            log::debug!("failed to set debug name {:?}: {:?}", name, e);
        }
    }

    /// 在临时 command buffer 上录制并同步等待执行完成
    pub fn one_time_exec(&self, name: &str, record: impl FnOnce(vk::CommandBuffer)) -> GfxResult<()> {
        let pool = self.transient_pool.lock();
        let cmd = unsafe {
            self.device.allocate_command_buffers(
                &vk::CommandBufferAllocateInfo::default()
                    .command_pool(*pool)
                    .level(vk::CommandBufferLevel::PRIMARY)
                    .command_buffer_count(1),
            )
        }
        .vk_context("allocate one-time command buffer")?[0];
        self.set_debug_name(cmd, name);

        let result = (|| {
            unsafe {
                self.device
                    .begin_command_buffer(
                        cmd,
                        &vk::CommandBufferBeginInfo::default().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT),
                    )
                    .vk_context("begin one-time command buffer")?;
            }
            record(cmd);
            unsafe { self.device.end_command_buffer(cmd) }.vk_context("end one-time command buffer")?;

            let fence = unsafe { self.device.create_fence(&vk::FenceCreateInfo::default(), None) }
                .vk_context("create one-time fence")?;
            let submit = GfxSubmitInfo::new(std::slice::from_ref(&cmd));
            let submitted = {
                let queue = self.queue.lock();
                unsafe { self.device.queue_submit(*queue, std::slice::from_ref(&submit.submit_info()), fence) }
                    .vk_context("submit one-time command buffer")
            };
            let waited = submitted.and_then(|_| self.wait_fence(fence, ONE_TIME_SUBMIT_TIMEOUT_NS));
            unsafe { self.device.destroy_fence(fence, None) };
            waited
        })();

        unsafe { self.device.free_command_buffers(*pool, std::slice::from_ref(&cmd)) };
        result
    }
}

impl GfxBackend for GfxDevice {
    #[inline]
    fn device_id(&self) -> DeviceId {
        self.id
    }

    fn create_fence(&self, signaled: bool, name: &str) -> GfxResult<vk::Fence> {
        let flags = if signaled { vk::FenceCreateFlags::SIGNALED } else { vk::FenceCreateFlags::empty() };
        let fence = unsafe { self.device.create_fence(&vk::FenceCreateInfo::default().flags(flags), None) }
            .vk_context("create fence")?;
        self.set_debug_name(fence, name);
        Ok(fence)
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        unsafe { self.device.destroy_fence(fence, None) }
    }

    fn wait_fence(&self, fence: vk::Fence, timeout_ns: u64) -> GfxResult<()> {
        match unsafe { self.device.wait_for_fences(std::slice::from_ref(&fence), true, timeout_ns) } {
            Ok(()) => Ok(()),
            Err(vk::Result::TIMEOUT) => Err(GfxError::Timeout {
                context: "wait for fence".to_string(),
                timeout_ns,
            }),
            Err(e) => Err(GfxError::vulkan("wait for fence", e)),
        }
    }

    fn reset_fence(&self, fence: vk::Fence) -> GfxResult<()> {
        unsafe { self.device.reset_fences(std::slice::from_ref(&fence)) }.vk_context("reset fence")
    }

    fn create_semaphore(&self, name: &str) -> GfxResult<vk::Semaphore> {
        let semaphore = unsafe { self.device.create_semaphore(&vk::SemaphoreCreateInfo::default(), None) }
            .vk_context("create semaphore")?;
        self.set_debug_name(semaphore, name);
        Ok(semaphore)
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        unsafe { self.device.destroy_semaphore(semaphore, None) }
    }

    fn allocate_command_buffer(&self, name: &str) -> GfxResult<vk::CommandBuffer> {
        let pool = self.frame_pool.lock();
        let cmd = unsafe {
            self.device.allocate_command_buffers(
                &vk::CommandBufferAllocateInfo::default()
                    .command_pool(*pool)
                    .level(vk::CommandBufferLevel::PRIMARY)
                    .command_buffer_count(1),
            )
        }
        .vk_context("allocate command buffer")?[0];
        self.set_debug_name(cmd, name);
        Ok(cmd)
    }

    fn free_command_buffer(&self, cmd: vk::CommandBuffer) {
        let pool = self.frame_pool.lock();
        unsafe { self.device.free_command_buffers(*pool, std::slice::from_ref(&cmd)) }
    }

    fn begin_command_buffer(&self, cmd: vk::CommandBuffer) -> GfxResult<()> {
        let _pool = self.frame_pool.lock();
        unsafe {
            self.device
                .reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())
                .vk_context("reset command buffer")?;
            self.device
                .begin_command_buffer(
                    cmd,
                    &vk::CommandBufferBeginInfo::default().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT),
                )
                .vk_context("begin command buffer")
        }
    }

    fn end_command_buffer(&self, cmd: vk::CommandBuffer) -> GfxResult<()> {
        let _pool = self.frame_pool.lock();
        unsafe { self.device.end_command_buffer(cmd) }.vk_context("end command buffer")
    }

    fn submit(&self, submit: &FrameSubmit) -> GfxResult<()> {
        let info = GfxSubmitInfo::from_frame(submit);
        let queue = self.queue.lock();
        unsafe { self.device.queue_submit(*queue, std::slice::from_ref(&info.submit_info()), submit.fence) }
            .vk_context("queue submit")
    }

    fn wait_idle(&self) -> GfxResult<()> {
        // 需要对所有 queue 外部同步
        let _queue = self.queue.lock();
        unsafe { self.device.device_wait_idle() }.vk_context("device wait idle")
    }

    fn surface_support(&self) -> GfxResult<SurfaceSupport> {
        let pdevice = self.pdevice.handle();
        unsafe {
            Ok(SurfaceSupport {
                capabilities: self
                    .surface_pf
                    .get_physical_device_surface_capabilities(pdevice, self.surface)
                    .vk_context("query surface capabilities")?,
                formats: self
                    .surface_pf
                    .get_physical_device_surface_formats(pdevice, self.surface)
                    .vk_context("query surface formats")?,
                present_modes: self
                    .surface_pf
                    .get_physical_device_surface_present_modes(pdevice, self.surface)
                    .vk_context("query surface present modes")?,
            })
        }
    }

    fn create_swapchain(&self, desc: &SwapchainDesc, old: vk::SwapchainKHR) -> GfxResult<vk::SwapchainKHR> {
        let _span = tracy_client::span!("GfxDevice::create_swapchain");

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(self.surface)
            .min_image_count(desc.image_count)
            .image_format(desc.format.format)
            .image_color_space(desc.format.color_space)
            .image_extent(desc.extent)
            .image_array_layers(1)
            // TRANSFER_DST 用于 Nsight 分析
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST)
            .pre_transform(desc.pre_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(desc.present_mode)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .clipped(true)
            .old_swapchain(old);

        let swapchain =
            unsafe { self.swapchain_pf.create_swapchain(&create_info, None) }.vk_context("create swapchain")?;
        self.set_debug_name(swapchain, "main");
        Ok(swapchain)
    }

    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        unsafe { self.swapchain_pf.destroy_swapchain(swapchain, None) }
    }

    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> GfxResult<Vec<vk::Image>> {
        unsafe { self.swapchain_pf.get_swapchain_images(swapchain) }.vk_context("get swapchain images")
    }

    fn create_image_view(&self, image: vk::Image, format: vk::Format, name: &str) -> GfxResult<vk::ImageView> {
        let view_ci = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .subresource_range(color_subresource_range());
        let view = unsafe { self.device.create_image_view(&view_ci, None) }.vk_context("create image view")?;
        self.set_debug_name(view, name);
        Ok(view)
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        unsafe { self.device.destroy_image_view(view, None) }
    }

    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        signal: vk::Semaphore,
        timeout_ns: u64,
    ) -> GfxResult<AcquireOutcome> {
        let result = unsafe { self.swapchain_pf.acquire_next_image(swapchain, timeout_ns, signal, vk::Fence::null()) };
        match result {
            Ok((index, suboptimal)) => Ok(AcquireOutcome::Acquired { index, suboptimal }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireOutcome::OutOfDate),
            Err(vk::Result::TIMEOUT | vk::Result::NOT_READY) => Err(GfxError::Timeout {
                context: "acquire next swapchain image".to_string(),
                timeout_ns,
            }),
            Err(e) => Err(GfxError::vulkan("acquire next swapchain image", e)),
        }
    }

    fn present(
        &self,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> GfxResult<PresentOutcome> {
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(std::slice::from_ref(&wait))
            .image_indices(std::slice::from_ref(&image_index))
            .swapchains(std::slice::from_ref(&swapchain));

        let queue = self.queue.lock();
        match unsafe { self.swapchain_pf.queue_present(*queue, &present_info) } {
            Ok(suboptimal) => Ok(PresentOutcome::Presented { suboptimal }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentOutcome::OutOfDate),
            Err(e) => Err(GfxError::vulkan("present swapchain image", e)),
        }
    }

    fn create_color_attachment(&self, desc: &AttachmentDesc) -> GfxResult<GfxAttachment> {
        let image_ci = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(desc.format)
            .extent(vk::Extent3D {
                width: desc.extent.width,
                height: desc.extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(
                vk::ImageUsageFlags::COLOR_ATTACHMENT
                    | vk::ImageUsageFlags::SAMPLED
                    | vk::ImageUsageFlags::TRANSFER_SRC,
            )
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);
        let alloc_ci = vk_mem::AllocationCreateInfo {
            usage: vk_mem::MemoryUsage::AutoPreferDevice,
            ..Default::default()
        };

        let (image, mut allocation) = unsafe { self.allocator.create_image(&image_ci, &alloc_ci) }
            .vk_context("create attachment image")?;
        self.set_debug_name(image, &desc.name);

        let view = match self.create_image_view(image, desc.format, &desc.name) {
            Ok(view) => view,
            Err(e) => {
                unsafe { self.allocator.destroy_image(image, &mut allocation) };
                return Err(e);
            }
        };

        let id = self.next_attachment_id.fetch_add(1, Ordering::Relaxed);
        self.attachments.lock().insert(id, AttachmentMemory { image, allocation });

        Ok(GfxAttachment {
            id,
            image,
            view,
            format: desc.format,
            extent: desc.extent,
        })
    }

    fn destroy_color_attachment(&self, attachment: GfxAttachment) {
        self.destroy_image_view(attachment.view);
        match self.attachments.lock().remove(&attachment.id) {
            Some(mut memory) => unsafe { self.allocator.destroy_image(memory.image, &mut memory.allocation) },
            None => log::warn!("attachment #{} is not owned by {}", attachment.id, self.id),
        }
    }

    fn transition_image_layout(
        &self,
        image: vk::Image,
        old_layout: vk::ImageLayout,
        new_layout: vk::ImageLayout,
    ) -> GfxResult<()> {
        let transition = LayoutTransition::between(old_layout, new_layout);
        let barrier = transition.image_barrier(image, old_layout, new_layout);
        self.one_time_exec("layout-transition", |cmd| unsafe {
            self.device.cmd_pipeline_barrier(
                cmd,
                transition.src_stage,
                transition.dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                std::slice::from_ref(&barrier),
            );
        })
    }

    fn create_render_pass(&self, desc: &RenderPassDesc) -> GfxResult<vk::RenderPass> {
        let attachment = vk::AttachmentDescription::default()
            .format(desc.format)
            .samples(vk::SampleCountFlags::TYPE_1)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(desc.final_layout());
        let color_ref = vk::AttachmentReference::default()
            .attachment(0)
            .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
        let subpass = vk::SubpassDescription::default()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(std::slice::from_ref(&color_ref));

        let mut dependencies = vec![
            vk::SubpassDependency::default()
                .src_subpass(vk::SUBPASS_EXTERNAL)
                .dst_subpass(0)
                .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
                .dst_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
                .dst_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE),
        ];
        if desc.target == RenderPassTarget::Offscreen {
            // 子节点的输出在父节点采样之前完成写入
            dependencies.push(
                vk::SubpassDependency::default()
                    .src_subpass(0)
                    .dst_subpass(vk::SUBPASS_EXTERNAL)
                    .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
                    .dst_stage_mask(vk::PipelineStageFlags::FRAGMENT_SHADER)
                    .src_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE)
                    .dst_access_mask(vk::AccessFlags::SHADER_READ),
            );
        }

        let render_pass_ci = vk::RenderPassCreateInfo::default()
            .attachments(std::slice::from_ref(&attachment))
            .subpasses(std::slice::from_ref(&subpass))
            .dependencies(&dependencies);
        unsafe { self.device.create_render_pass(&render_pass_ci, None) }.vk_context("create render pass")
    }

    fn destroy_render_pass(&self, render_pass: vk::RenderPass) {
        unsafe { self.device.destroy_render_pass(render_pass, None) }
    }

    fn create_framebuffer(&self, desc: &FramebufferDesc) -> GfxResult<vk::Framebuffer> {
        let framebuffer_ci = vk::FramebufferCreateInfo::default()
            .render_pass(desc.render_pass)
            .attachments(std::slice::from_ref(&desc.view))
            .width(desc.extent.width)
            .height(desc.extent.height)
            .layers(1);
        unsafe { self.device.create_framebuffer(&framebuffer_ci, None) }.vk_context("create framebuffer")
    }

    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer) {
        unsafe { self.device.destroy_framebuffer(framebuffer, None) }
    }

    fn cmd_begin_render_pass(&self, cmd: vk::CommandBuffer, begin: &RenderPassBegin) {
        let clear_value = vk::ClearValue {
            color: vk::ClearColorValue {
                float32: begin.clear_color,
            },
        };
        let begin_info = vk::RenderPassBeginInfo::default()
            .render_pass(begin.render_pass)
            .framebuffer(begin.framebuffer)
            .render_area(vk::Rect2D {
                offset: vk::Offset2D::default(),
                extent: begin.extent,
            })
            .clear_values(std::slice::from_ref(&clear_value));
        unsafe { self.device.cmd_begin_render_pass(cmd, &begin_info, vk::SubpassContents::INLINE) }
    }

    fn cmd_end_render_pass(&self, cmd: vk::CommandBuffer) {
        unsafe { self.device.cmd_end_render_pass(cmd) }
    }

    fn create_shader_module(&self, code: &[u32], name: &str) -> GfxResult<vk::ShaderModule> {
        let module_ci = vk::ShaderModuleCreateInfo::default().code(code);
        let module = unsafe { self.device.create_shader_module(&module_ci, None) }.vk_context("create shader module")?;
        self.set_debug_name(module, name);
        Ok(module)
    }

    fn destroy_shader_module(&self, module: vk::ShaderModule) {
        unsafe { self.device.destroy_shader_module(module, None) }
    }
}

// destroy
impl GfxDevice {
    pub fn destroy(mut self) {
        log::info!("destroying {}", self.id);
        if let Err(e) = self.wait_idle() {
            log::error!("wait idle before destroying {} failed: {}", self.id, e);
        }

        let leaked = std::mem::take(&mut *self.attachments.lock());
        if !leaked.is_empty() {
            log::warn!("{} attachment(s) were not released before destroying {}", leaked.len(), self.id);
        }
        for (_, mut memory) in leaked {
            unsafe { self.allocator.destroy_image(memory.image, &mut memory.allocation) };
        }

        unsafe {
            self.device.destroy_command_pool(*self.transient_pool.get_mut(), None);
            self.device.destroy_command_pool(*self.frame_pool.get_mut(), None);
            // 分配器需要在 device 之前销毁
            ManuallyDrop::drop(&mut self.allocator);
            self.device.destroy_device(None);
        }
        self.destroyed = true;
    }
}

impl Drop for GfxDevice {
    fn drop(&mut self) {
        if !self.destroyed {
            log::error!("{} dropped without destroy", self.id);
        }
    }
}
