use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::Context as _;
use ash::vk;
use parking_lot::Mutex;
use strata_gfx::platform::{DeviceDesc, InstanceDesc};
use strata_gfx::{GfxBackend, GfxError, GfxPlatform};
use strata_lifecycle::{Level, LevelOwner};
use strata_render_graph::{CompileTarget, RenderGraph};

use crate::frame_resources::FrameResources;
use crate::options::RenderOptions;
use crate::render_loop::{DEFAULT_GPU_TIMEOUT, FrameCallbacks, FrameDriver, FrameStats, LoopState, RenderLoop};
use crate::swapchain_manager::{SwapchainManager, SwapchainState};

/// 拥有每个 Level 的 GPU 对象
///
/// Context / Instance / Device 由 [`GfxPlatform`] 创建；Frame 与 Swapchain 的对象由
/// [`crate::renderer::Renderer`] 注册的钩子创建，这里只提供对应的操作。
pub struct RenderContext<P: GfxPlatform> {
    platform: P,
    options: RenderOptions,

    device: Option<Arc<P::Backend>>,
    frames: Option<Arc<FrameResources>>,
    swapchain: SwapchainManager,
    graph: Arc<Mutex<RenderGraph>>,

    render_loop: RenderLoop,
    callbacks: Arc<FrameCallbacks>,
    stats: Arc<FrameStats>,
    /// 渲染线程发现 out of date 时置位
    recreate_request: Arc<AtomicBool>,
    gpu_timeout: Duration,
    /// 渲染线程在停止时返回的错误，由控制线程取走
    loop_failure: Option<anyhow::Error>,
}

// new & init
impl<P: GfxPlatform> RenderContext<P> {
    pub fn new(platform: P, options: RenderOptions, graph: RenderGraph) -> Self {
        Self {
            platform,
            options,
            device: None,
            frames: None,
            swapchain: SwapchainManager::new(),
            graph: Arc::new(Mutex::new(graph)),
            render_loop: RenderLoop::new(),
            callbacks: Arc::new(FrameCallbacks::default()),
            stats: Arc::new(FrameStats::default()),
            recreate_request: Arc::new(AtomicBool::new(false)),
            gpu_timeout: DEFAULT_GPU_TIMEOUT,
            loop_failure: None,
        }
    }
}

// getters
impl<P: GfxPlatform> RenderContext<P> {
    #[inline]
    pub fn platform(&self) -> &P {
        &self.platform
    }

    #[inline]
    pub fn options(&self) -> &RenderOptions {
        &self.options
    }

    #[inline]
    pub fn device(&self) -> Option<&Arc<P::Backend>> {
        self.device.as_ref()
    }

    #[inline]
    pub fn frames(&self) -> Option<&Arc<FrameResources>> {
        self.frames.as_ref()
    }

    #[inline]
    pub fn swapchain(&self) -> Option<&SwapchainState> {
        self.swapchain.current()
    }

    #[inline]
    pub fn graph(&self) -> &Arc<Mutex<RenderGraph>> {
        &self.graph
    }

    #[inline]
    pub fn callbacks(&self) -> &Arc<FrameCallbacks> {
        &self.callbacks
    }

    #[inline]
    pub fn stats(&self) -> &Arc<FrameStats> {
        &self.stats
    }

    #[inline]
    pub fn loop_state(&self) -> LoopState {
        self.render_loop.state()
    }
}

// update
impl<P: GfxPlatform> RenderContext<P> {
    pub fn set_gpu_timeout(&mut self, timeout: Duration) {
        self.gpu_timeout = timeout;
    }

    /// 取走渲染线程的重建请求
    pub fn take_recreate_request(&self) -> bool {
        self.recreate_request.swap(false, Ordering::AcqRel)
    }

    /// 渲染线程因为错误自行退出时，回收线程并取走错误
    pub fn take_loop_failure(&mut self) -> Option<anyhow::Error> {
        if self.render_loop.has_exited() {
            if let Err(e) = self.render_loop.stop() {
                self.loop_failure = Some(e);
            }
        }
        self.loop_failure.take()
    }

    /// 停止渲染线程；错误保留到下一次 [`Self::take_loop_failure`]
    pub fn stop_render_loop(&mut self) {
        if let Err(e) = self.render_loop.stop() {
            log::error!("render loop ended with error: {e:#}");
            self.loop_failure = Some(e);
        }
    }

    /// Frame：创建帧资源 ring
    pub(crate) fn create_frames(&mut self) -> anyhow::Result<()> {
        let device = self.device.as_ref().context("frame resources need a device")?;
        let frames = FrameResources::new(device.as_ref(), self.options.frame_overlap())?;
        self.frames = Some(Arc::new(frames));
        Ok(())
    }

    pub(crate) fn dispose_frames(&mut self) -> anyhow::Result<()> {
        let Some(frames) = self.frames.take() else {
            return Ok(());
        };
        let device = self.device.as_ref().context("frame resources outlived their device")?;
        let frames = Arc::try_unwrap(frames).map_err(|_| GfxError::InUse("frame resources".to_string()))?;
        frames.destroy(device.as_ref());
        Ok(())
    }

    /// Swapchain：创建 swapchain，编译 render graph，启动渲染线程
    ///
    /// 可绘制区域为 0 时什么都不做，渲染线程保持停止。
    pub(crate) fn create_presentation(&mut self) -> anyhow::Result<()> {
        let device = self.device.clone().context("swapchain needs a device")?;
        let frames = self.frames.clone().context("swapchain needs frame resources")?;

        let window_extent = vk::Extent2D::from(self.options.window_size.value());
        let present_mode = self.options.present_mode.value().to_vk();
        let Some(state) = self.swapchain.create(device.as_ref(), window_extent, present_mode)? else {
            return Ok(());
        };
        let swapchain = state.handle;
        self.graph.lock().compile(
            device.as_ref(),
            &CompileTarget {
                format: state.format.format,
                extent: state.extent,
                views: &state.views,
            },
        )?;

        let driver = FrameDriver::new(
            device,
            frames,
            swapchain,
            self.graph.clone(),
            self.callbacks.clone(),
            self.stats.clone(),
            self.recreate_request.clone(),
        )
        .with_gpu_timeout(self.gpu_timeout);
        self.render_loop.start(driver, self.options.max_fps.value())
    }

    /// 停止渲染线程，等待 GPU 空闲，然后释放 render graph 与 swapchain
    pub(crate) fn dispose_presentation(&mut self) -> anyhow::Result<()> {
        self.stop_render_loop();
        let Some(device) = self.device.as_ref() else {
            return Ok(());
        };
        device.wait_idle()?;
        self.graph.lock().release(device.as_ref());
        self.swapchain.dispose(device.as_ref());
        Ok(())
    }

    /// Device 销毁之前释放保留的旧 swapchain
    pub(crate) fn release_retired_swapchain(&mut self) {
        if let Some(device) = self.device.as_ref() {
            self.swapchain.release_retired(device.as_ref());
        }
    }
}

impl<P: GfxPlatform> LevelOwner for RenderContext<P> {
    fn create_level(&mut self, level: Level) -> anyhow::Result<()> {
        match level {
            Level::Context => self.platform.load()?,
            Level::Instance => self.platform.create_instance(&InstanceDesc {
                app_name: self.options.app_name.value(),
                debug: self.options.debug_mode.value(),
            })?,
            Level::Device => {
                let device = self.platform.create_device(&DeviceDesc {
                    preference: self.options.gpu.value(),
                    debug_names: self.options.debug_mode.value(),
                })?;
                self.device = Some(device);
            }
            Level::Frame | Level::Swapchain | Level::None => {
                log::debug!("{level} objects are created by level hooks");
            }
        }
        Ok(())
    }

    fn dispose_level(&mut self, level: Level) -> anyhow::Result<()> {
        match level {
            Level::Context => self.platform.unload(),
            Level::Instance => self.platform.destroy_instance(),
            Level::Device => {
                if let Some(device) = self.device.take() {
                    self.platform.destroy_device(device)?;
                }
            }
            Level::Frame | Level::Swapchain | Level::None => {
                log::debug!("{level} objects are disposed by level hooks");
            }
        }
        Ok(())
    }
}
