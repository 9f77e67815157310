//! 不依赖 GPU 的后端
//!
//! handle 通过 `vk::Handle::from_raw` 伪造；fence 使用 Condvar 建模，
//! submit 默认不会 signal fence，测试需要显式调用 [`MockBackend::signal_fence`]
//! 或开启 [`MockBackend::set_auto_signal`]。

use std::collections::{HashMap, VecDeque};
use std::ffi::c_char;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use ash::vk;
use ash::vk::Handle;
use parking_lot::{Condvar, Mutex};

use crate::backend::{
    AcquireOutcome, AttachmentDesc, DeviceId, FrameSubmit, FramebufferDesc, GfxAttachment, GfxBackend,
    PresentOutcome, RenderPassBegin, RenderPassDesc, SurfaceSupport, SwapchainDesc,
};
use crate::error::{GfxError, GfxResult};
use crate::platform::{DeviceDesc, GfxPlatform, InstanceDesc, SurfaceProvider};

static NEXT_MOCK_DEVICE_ID: AtomicU64 = AtomicU64::new(1000);

/// 被记录下来的 GPU 操作
#[derive(Debug, Clone, PartialEq)]
pub enum MockOp {
    WaitFence(vk::Fence),
    ResetFence(vk::Fence),
    BeginCommandBuffer(vk::CommandBuffer),
    EndCommandBuffer(vk::CommandBuffer),
    Submit(FrameSubmit),
    WaitIdle,
    CreateSwapchain { swapchain: vk::SwapchainKHR, old: vk::SwapchainKHR, desc: SwapchainDesc },
    DestroySwapchain(vk::SwapchainKHR),
    Acquire(AcquireOutcome),
    Present { image_index: u32, outcome: PresentOutcome },
    CreateAttachment(GfxAttachment),
    DestroyAttachment(GfxAttachment),
    Transition { image: vk::Image, old: vk::ImageLayout, new: vk::ImageLayout },
    BeginRenderPass(RenderPassBegin),
    EndRenderPass(vk::CommandBuffer),
}

struct MockState {
    fences: HashMap<vk::Fence, bool>,
    ops: Vec<MockOp>,
    acquire_script: VecDeque<AcquireOutcome>,
    present_script: VecDeque<PresentOutcome>,
    swapchains: HashMap<vk::SwapchainKHR, u32>,
    next_image: HashMap<vk::SwapchainKHR, u32>,
    support: SurfaceSupport,
    /// 每类对象的 创建数 - 销毁数
    live: HashMap<&'static str, i64>,
    auto_signal: bool,
}

pub struct MockBackend {
    id: DeviceId,
    state: Mutex<MockState>,
    fence_signaled: Condvar,
    next_handle: AtomicU64,
}

// new & init
impl MockBackend {
    pub fn new() -> Self {
        Self::with_id(DeviceId(NEXT_MOCK_DEVICE_ID.fetch_add(1, Ordering::Relaxed)))
    }

    pub fn with_id(id: DeviceId) -> Self {
        Self {
            id,
            state: Mutex::new(MockState {
                fences: HashMap::new(),
                ops: Vec::new(),
                acquire_script: VecDeque::new(),
                present_script: VecDeque::new(),
                swapchains: HashMap::new(),
                next_image: HashMap::new(),
                support: Self::default_support(),
                live: HashMap::new(),
                auto_signal: false,
            }),
            fence_signaled: Condvar::new(),
            next_handle: AtomicU64::new(1),
        }
    }

    /// extent 不固定（0xFFFFFFFF），3 张图像，支持 FIFO 与 MAILBOX
    pub fn default_support() -> SurfaceSupport {
        SurfaceSupport {
            capabilities: vk::SurfaceCapabilitiesKHR {
                min_image_count: 2,
                max_image_count: 0,
                current_extent: vk::Extent2D {
                    width: u32::MAX,
                    height: u32::MAX,
                },
                min_image_extent: vk::Extent2D { width: 1, height: 1 },
                max_image_extent: vk::Extent2D {
                    width: 4096,
                    height: 4096,
                },
                current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
                ..Default::default()
            },
            formats: vec![vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            }],
            present_modes: vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX],
        }
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

// scripting
impl MockBackend {
    /// 之后的 acquire 按顺序返回这些结果，用完后恢复正常
    pub fn script_acquire(&self, outcomes: impl IntoIterator<Item = AcquireOutcome>) {
        self.state.lock().acquire_script.extend(outcomes);
    }

    pub fn script_present(&self, outcomes: impl IntoIterator<Item = PresentOutcome>) {
        self.state.lock().present_script.extend(outcomes);
    }

    pub fn set_surface_support(&self, support: SurfaceSupport) {
        self.state.lock().support = support;
    }

    /// submit 时立即 signal fence，相当于 GPU 瞬间完成
    pub fn set_auto_signal(&self, auto_signal: bool) {
        self.state.lock().auto_signal = auto_signal;
    }

    /// 模拟 GPU 完成了 `fence` 对应的工作
    pub fn signal_fence(&self, fence: vk::Fence) {
        let mut state = self.state.lock();
        if let Some(signaled) = state.fences.get_mut(&fence) {
            *signaled = true;
        }
        self.fence_signaled.notify_all();
    }
}

// inspection
impl MockBackend {
    pub fn ops(&self) -> Vec<MockOp> {
        self.state.lock().ops.clone()
    }

    pub fn count_ops(&self, pred: impl Fn(&MockOp) -> bool) -> usize {
        self.state.lock().ops.iter().filter(|op| pred(op)).count()
    }

    pub fn clear_ops(&self) {
        self.state.lock().ops.clear();
    }

    /// 按提交顺序返回 fence
    pub fn submitted_fences(&self) -> Vec<vk::Fence> {
        self.state
            .lock()
            .ops
            .iter()
            .filter_map(|op| match op {
                MockOp::Submit(submit) => Some(submit.fence),
                _ => None,
            })
            .collect()
    }

    pub fn is_fence_signaled(&self, fence: vk::Fence) -> bool {
        self.state.lock().fences.get(&fence).copied().unwrap_or(false)
    }

    /// 某类对象当前存活的数量
    pub fn live(&self, kind: &str) -> i64 {
        self.state.lock().live.get(kind).copied().unwrap_or(0)
    }

    /// 全部对象都已销毁
    pub fn all_released(&self) -> bool {
        self.state.lock().live.values().all(|count| *count == 0)
    }

    pub fn live_summary(&self) -> Vec<(&'static str, i64)> {
        let mut summary: Vec<_> =
            self.state.lock().live.iter().filter(|(_, count)| **count != 0).map(|(k, v)| (*k, *v)).collect();
        summary.sort();
        summary
    }
}

// tools
impl MockBackend {
    fn handle<T: Handle>(&self) -> T {
        T::from_raw(self.next_handle.fetch_add(1, Ordering::Relaxed))
    }

    fn created(state: &mut MockState, kind: &'static str) {
        *state.live.entry(kind).or_default() += 1;
    }

    fn destroyed(state: &mut MockState, kind: &'static str) {
        *state.live.entry(kind).or_default() -= 1;
    }
}

impl GfxBackend for MockBackend {
    fn device_id(&self) -> DeviceId {
        self.id
    }

    fn create_fence(&self, signaled: bool, _name: &str) -> GfxResult<vk::Fence> {
        let fence = self.handle();
        let mut state = self.state.lock();
        state.fences.insert(fence, signaled);
        Self::created(&mut state, "fence");
        Ok(fence)
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        let mut state = self.state.lock();
        state.fences.remove(&fence);
        Self::destroyed(&mut state, "fence");
    }

    fn wait_fence(&self, fence: vk::Fence, timeout_ns: u64) -> GfxResult<()> {
        let mut state = self.state.lock();
        state.ops.push(MockOp::WaitFence(fence));
        let timeout = Duration::from_nanos(timeout_ns);
        loop {
            match state.fences.get(&fence) {
                None => return Err(GfxError::vulkan("wait for fence", vk::Result::ERROR_UNKNOWN)),
                Some(true) => return Ok(()),
                Some(false) => {
                    if self.fence_signaled.wait_for(&mut state, timeout).timed_out() {
                        return Err(GfxError::Timeout {
                            context: "wait for fence".to_string(),
                            timeout_ns,
                        });
                    }
                }
            }
        }
    }

    fn reset_fence(&self, fence: vk::Fence) -> GfxResult<()> {
        let mut state = self.state.lock();
        state.ops.push(MockOp::ResetFence(fence));
        match state.fences.get_mut(&fence) {
            Some(signaled) => {
                *signaled = false;
                Ok(())
            }
            None => Err(GfxError::vulkan("reset fence", vk::Result::ERROR_UNKNOWN)),
        }
    }

    fn create_semaphore(&self, _name: &str) -> GfxResult<vk::Semaphore> {
        Self::created(&mut self.state.lock(), "semaphore");
        Ok(self.handle())
    }

    fn destroy_semaphore(&self, _semaphore: vk::Semaphore) {
        Self::destroyed(&mut self.state.lock(), "semaphore");
    }

    fn allocate_command_buffer(&self, _name: &str) -> GfxResult<vk::CommandBuffer> {
        Self::created(&mut self.state.lock(), "command_buffer");
        Ok(self.handle())
    }

    fn free_command_buffer(&self, _cmd: vk::CommandBuffer) {
        Self::destroyed(&mut self.state.lock(), "command_buffer");
    }

    fn begin_command_buffer(&self, cmd: vk::CommandBuffer) -> GfxResult<()> {
        self.state.lock().ops.push(MockOp::BeginCommandBuffer(cmd));
        Ok(())
    }

    fn end_command_buffer(&self, cmd: vk::CommandBuffer) -> GfxResult<()> {
        self.state.lock().ops.push(MockOp::EndCommandBuffer(cmd));
        Ok(())
    }

    fn submit(&self, submit: &FrameSubmit) -> GfxResult<()> {
        let mut state = self.state.lock();
        state.ops.push(MockOp::Submit(*submit));
        if state.auto_signal {
            if let Some(signaled) = state.fences.get_mut(&submit.fence) {
                *signaled = true;
            }
            self.fence_signaled.notify_all();
        }
        Ok(())
    }

    fn wait_idle(&self) -> GfxResult<()> {
        let mut state = self.state.lock();
        state.ops.push(MockOp::WaitIdle);
        // 空闲意味着所有提交都已完成
        for signaled in state.fences.values_mut() {
            *signaled = true;
        }
        self.fence_signaled.notify_all();
        Ok(())
    }

    fn surface_support(&self) -> GfxResult<SurfaceSupport> {
        Ok(self.state.lock().support.clone())
    }

    fn create_swapchain(&self, desc: &SwapchainDesc, old: vk::SwapchainKHR) -> GfxResult<vk::SwapchainKHR> {
        let swapchain = self.handle();
        let mut state = self.state.lock();
        state.swapchains.insert(swapchain, desc.image_count);
        state.ops.push(MockOp::CreateSwapchain {
            swapchain,
            old,
            desc: *desc,
        });
        Self::created(&mut state, "swapchain");
        Ok(swapchain)
    }

    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        let mut state = self.state.lock();
        state.swapchains.remove(&swapchain);
        state.ops.push(MockOp::DestroySwapchain(swapchain));
        Self::destroyed(&mut state, "swapchain");
    }

    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> GfxResult<Vec<vk::Image>> {
        let count = self.state.lock().swapchains.get(&swapchain).copied().unwrap_or(0);
        Ok((0..count).map(|_| self.handle()).collect())
    }

    fn create_image_view(&self, _image: vk::Image, _format: vk::Format, _name: &str) -> GfxResult<vk::ImageView> {
        Self::created(&mut self.state.lock(), "image_view");
        Ok(self.handle())
    }

    fn destroy_image_view(&self, _view: vk::ImageView) {
        Self::destroyed(&mut self.state.lock(), "image_view");
    }

    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        _signal: vk::Semaphore,
        _timeout_ns: u64,
    ) -> GfxResult<AcquireOutcome> {
        let mut state = self.state.lock();
        let outcome = match state.acquire_script.pop_front() {
            Some(outcome) => outcome,
            None => {
                let count = state.swapchains.get(&swapchain).copied().unwrap_or(0);
                if count == 0 {
                    return Err(GfxError::vulkan("acquire next swapchain image", vk::Result::ERROR_SURFACE_LOST_KHR));
                }
                let cursor = state.next_image.entry(swapchain).or_default();
                let index = *cursor % count;
                *cursor = cursor.wrapping_add(1);
                AcquireOutcome::Acquired {
                    index,
                    suboptimal: false,
                }
            }
        };
        state.ops.push(MockOp::Acquire(outcome));
        Ok(outcome)
    }

    fn present(
        &self,
        _swapchain: vk::SwapchainKHR,
        image_index: u32,
        _wait: vk::Semaphore,
    ) -> GfxResult<PresentOutcome> {
        let mut state = self.state.lock();
        let outcome = state.present_script.pop_front().unwrap_or(PresentOutcome::Presented { suboptimal: false });
        state.ops.push(MockOp::Present { image_index, outcome });
        Ok(outcome)
    }

    fn create_color_attachment(&self, desc: &AttachmentDesc) -> GfxResult<GfxAttachment> {
        let attachment = GfxAttachment {
            id: self.next_handle.fetch_add(1, Ordering::Relaxed),
            image: self.handle(),
            view: self.handle(),
            format: desc.format,
            extent: desc.extent,
        };
        let mut state = self.state.lock();
        state.ops.push(MockOp::CreateAttachment(attachment));
        Self::created(&mut state, "attachment");
        Ok(attachment)
    }

    fn destroy_color_attachment(&self, attachment: GfxAttachment) {
        let mut state = self.state.lock();
        state.ops.push(MockOp::DestroyAttachment(attachment));
        Self::destroyed(&mut state, "attachment");
    }

    fn transition_image_layout(
        &self,
        image: vk::Image,
        old_layout: vk::ImageLayout,
        new_layout: vk::ImageLayout,
    ) -> GfxResult<()> {
        self.state.lock().ops.push(MockOp::Transition {
            image,
            old: old_layout,
            new: new_layout,
        });
        Ok(())
    }

    fn create_render_pass(&self, _desc: &RenderPassDesc) -> GfxResult<vk::RenderPass> {
        Self::created(&mut self.state.lock(), "render_pass");
        Ok(self.handle())
    }

    fn destroy_render_pass(&self, _render_pass: vk::RenderPass) {
        Self::destroyed(&mut self.state.lock(), "render_pass");
    }

    fn create_framebuffer(&self, _desc: &FramebufferDesc) -> GfxResult<vk::Framebuffer> {
        Self::created(&mut self.state.lock(), "framebuffer");
        Ok(self.handle())
    }

    fn destroy_framebuffer(&self, _framebuffer: vk::Framebuffer) {
        Self::destroyed(&mut self.state.lock(), "framebuffer");
    }

    fn cmd_begin_render_pass(&self, _cmd: vk::CommandBuffer, begin: &RenderPassBegin) {
        self.state.lock().ops.push(MockOp::BeginRenderPass(*begin));
    }

    fn cmd_end_render_pass(&self, cmd: vk::CommandBuffer) {
        self.state.lock().ops.push(MockOp::EndRenderPass(cmd));
    }

    fn create_shader_module(&self, code: &[u32], _name: &str) -> GfxResult<vk::ShaderModule> {
        if code.is_empty() {
            return Err(GfxError::vulkan("create shader module", vk::Result::ERROR_INVALID_SHADER_NV));
        }
        Self::created(&mut self.state.lock(), "shader_module");
        Ok(self.handle())
    }

    fn destroy_shader_module(&self, _module: vk::ShaderModule) {
        Self::destroyed(&mut self.state.lock(), "shader_module");
    }
}

/// 只记录调用的 surface provider
pub struct MockSurface {
    size: Mutex<vk::Extent2D>,
    closing: Mutex<bool>,
}

impl MockSurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            size: Mutex::new(vk::Extent2D { width, height }),
            closing: Mutex::new(false),
        }
    }

    pub fn resize(&self, width: u32, height: u32) {
        *self.size.lock() = vk::Extent2D { width, height };
    }

    pub fn close(&self) {
        *self.closing.lock() = true;
    }
}

impl SurfaceProvider for MockSurface {
    fn required_instance_extensions(&self) -> GfxResult<&'static [*const c_char]> {
        Ok(&[])
    }

    fn create_surface(&self, _entry: &ash::Entry, _instance: &ash::Instance) -> GfxResult<vk::SurfaceKHR> {
        Ok(vk::SurfaceKHR::from_raw(1))
    }

    fn drawable_size(&self) -> vk::Extent2D {
        *self.size.lock()
    }

    fn is_closing(&self) -> bool {
        *self.closing.lock()
    }
}

#[derive(Default)]
struct MockPlatformState {
    journal: Vec<String>,
    devices: Vec<Weak<MockBackend>>,
    device_error: Option<Vec<String>>,
    auto_signal: bool,
    loaded: bool,
    instance: bool,
}

/// 记录 Context / Instance / Device 调用的平台，clone 之后共享同一份状态
#[derive(Clone, Default)]
pub struct MockPlatform {
    state: Arc<Mutex<MockPlatformState>>,
}

impl MockPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// 之后的 create_device 返回 NoSuitableDevice
    pub fn fail_devices(&self, reasons: Vec<String>) {
        self.state.lock().device_error = Some(reasons);
    }

    /// 之后创建的设备在 submit 时立即 signal fence
    pub fn auto_signal_devices(&self, auto_signal: bool) {
        self.state.lock().auto_signal = auto_signal;
    }

    pub fn journal(&self) -> Vec<String> {
        self.state.lock().journal.clone()
    }

    pub fn clear_journal(&self) {
        self.state.lock().journal.clear();
    }

    /// 最近一次创建且仍然存活的设备
    pub fn current_device(&self) -> Option<Arc<MockBackend>> {
        self.state.lock().devices.last().and_then(Weak::upgrade)
    }

    pub fn device_count(&self) -> usize {
        self.state.lock().devices.len()
    }
}

impl GfxPlatform for MockPlatform {
    type Backend = MockBackend;

    fn load(&mut self) -> GfxResult<()> {
        let mut state = self.state.lock();
        state.loaded = true;
        state.journal.push("load".to_string());
        Ok(())
    }

    fn unload(&mut self) {
        let mut state = self.state.lock();
        state.loaded = false;
        state.journal.push("unload".to_string());
    }

    fn create_instance(&mut self, desc: &InstanceDesc) -> GfxResult<()> {
        let mut state = self.state.lock();
        if !state.loaded {
            return Err(GfxError::Loader("vulkan is not loaded".to_string()));
        }
        state.instance = true;
        state.journal.push(format!("create_instance(app={}, debug={})", desc.app_name, desc.debug));
        Ok(())
    }

    fn destroy_instance(&mut self) {
        let mut state = self.state.lock();
        state.instance = false;
        state.journal.push("destroy_instance".to_string());
    }

    fn create_device(&mut self, desc: &DeviceDesc) -> GfxResult<Arc<MockBackend>> {
        let mut state = self.state.lock();
        if !state.instance {
            return Err(GfxError::Loader("instance is not created".to_string()));
        }
        if let Some(reasons) = state.device_error.clone() {
            return Err(GfxError::NoSuitableDevice { reasons });
        }
        let device = Arc::new(MockBackend::new());
        device.set_auto_signal(state.auto_signal);
        state.devices.push(Arc::downgrade(&device));
        state.journal.push(format!("create_device(gpu={})", desc.preference));
        Ok(device)
    }

    fn destroy_device(&mut self, device: Arc<MockBackend>) -> GfxResult<()> {
        let mut state = self.state.lock();
        state.journal.push("destroy_device".to_string());
        if Arc::strong_count(&device) != 1 {
            return Err(GfxError::InUse(format!(
                "{} ({} other reference(s))",
                device.device_id(),
                Arc::strong_count(&device) - 1
            )));
        }
        if !device.all_released() {
            return Err(GfxError::InUse(format!("{} objects {:?}", device.device_id(), device.live_summary())));
        }
        Ok(())
    }
}
