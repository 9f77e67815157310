use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use ash::vk;
use itertools::Itertools;
use strata_crate_tools::config::OptionSeed;
use strata_gfx::{GfxPlatform, SurfaceProvider};
use strata_lifecycle::{ExecuteOnce, Level, LevelEvents, LevelLazy, LevelSequencer, OptionStore, ReCreator};
use strata_render_graph::RenderGraph;

use crate::frame_resources::DeferredAction;
use crate::options::{RenderOptions, WindowExtent};
use crate::render_context::RenderContext;
use crate::render_loop::{FrameCallback, FrameStatsSnapshot, LoopState};
use crate::shader::{ShaderLibrary, ShaderSource};
use crate::swapchain_manager::SwapchainState;

/// 根节点的名字
pub const ROOT_NODE_NAME: &str = "ui";

/// 控制线程使用的渲染器入口
///
/// 持有 Level 状态机与渲染上下文。所有 Level 的创建、销毁与重建都在调用
/// [`Renderer::tick`] 的线程上进行；渲染线程只在 Swapchain Level 存活期间运行。
pub struct Renderer<P: GfxPlatform> {
    sequencer: LevelSequencer<RenderContext<P>>,
    context: RenderContext<P>,
    surface: Arc<dyn SurfaceProvider>,
    options: RenderOptions,

    shaders: LevelLazy<ShaderLibrary>,
    shader_source: Option<Arc<dyn ShaderSource>>,
}

// new & init
impl<P: GfxPlatform> Renderer<P> {
    /// 注册 option 与各个 Level 的钩子，不创建任何 GPU 对象
    pub fn new(platform: P, surface: Arc<dyn SurfaceProvider>) -> anyhow::Result<Self> {
        let store = Arc::new(OptionStore::new());
        let options = RenderOptions::register(&store)?;
        let mut sequencer = LevelSequencer::new(store);
        let context = RenderContext::new(platform, options.clone(), RenderGraph::new(ROOT_NODE_NAME));

        Self::register_hooks(sequencer.events_mut())?;
        let shaders = LevelLazy::bind(
            &mut sequencer,
            Level::Device,
            "shader-library",
            |ctx: &mut RenderContext<P>, library: ShaderLibrary| {
                match ctx.device() {
                    Some(device) => library.destroy(device.as_ref()),
                    None => log::warn!("shader library outlived its device"),
                }
                Ok(())
            },
        )?;

        Ok(Self {
            sequencer,
            context,
            surface,
            options,
            shaders,
            shader_source: None,
        })
    }

    /// Frame 与 Swapchain 的对象都通过钩子创建
    ///
    /// swapchain、render graph 与渲染线程放在同一个钩子里，创建和销毁的先后顺序才是确定的。
    fn register_hooks(events: &mut LevelEvents<RenderContext<P>>) -> anyhow::Result<()> {
        ReCreator::subscribe(
            events,
            Level::Frame,
            "frame-resources",
            |ctx: &mut RenderContext<P>| ctx.create_frames(),
            |ctx: &mut RenderContext<P>| ctx.dispose_frames(),
        )?;
        ReCreator::subscribe(
            events,
            Level::Swapchain,
            "presentation",
            |ctx: &mut RenderContext<P>| ctx.create_presentation(),
            |ctx: &mut RenderContext<P>| ctx.dispose_presentation(),
        )?;
        events.before_dispose(Level::Device, "retired-swapchain", |ctx: &mut RenderContext<P>| {
            ctx.release_retired_swapchain();
            Ok(())
        })?;
        Ok(())
    }

    /// 在 `init` 之前写入 option 的初始值
    ///
    /// return: 写入的 option 数量
    pub fn apply_seed(&self, seed: &OptionSeed) -> anyhow::Result<usize> {
        let store = self.sequencer.options();
        seed.apply(|name, value| store.set_by_name(name, value))
    }

    /// 以 surface 当前的尺寸作为窗口尺寸，自底向上创建所有 Level
    pub fn init(&mut self) -> anyhow::Result<()> {
        self.poll_surface();
        self.sequencer.init(&mut self.context)?;
        log::info!("renderer initialized\n{}", self.describe_options());
        Ok(())
    }
}

// getters
impl<P: GfxPlatform> Renderer<P> {
    #[inline]
    pub fn options(&self) -> &RenderOptions {
        &self.options
    }

    #[inline]
    pub fn option_store(&self) -> &Arc<OptionStore> {
        self.sequencer.options()
    }

    #[inline]
    pub fn context(&self) -> &RenderContext<P> {
        &self.context
    }

    #[inline]
    pub fn is_live(&self, level: Level) -> bool {
        self.sequencer.is_live(level)
    }

    #[inline]
    pub fn swapchain(&self) -> Option<&SwapchainState> {
        self.context.swapchain()
    }

    #[inline]
    pub fn loop_state(&self) -> LoopState {
        self.context.loop_state()
    }

    #[inline]
    pub fn stats(&self) -> FrameStatsSnapshot {
        self.context.stats().snapshot()
    }

    /// 一次性动作队列，可以 clone 到其他线程
    #[inline]
    pub fn once(&self) -> ExecuteOnce<RenderContext<P>> {
        self.sequencer.once()
    }

    /// 每个 option 一行：名字、Level、已提交值与待提交值
    pub fn describe_options(&self) -> String {
        self.sequencer
            .options()
            .describe()
            .iter()
            .map(|desc| {
                let pending = if desc.pending == desc.committed { String::new() } else { format!(" -> {}", desc.pending) };
                format!("  {:<24} [{}] {}{}", desc.name, desc.level, desc.committed, pending)
            })
            .join("\n")
    }
}

// update
impl<P: GfxPlatform> Renderer<P> {
    /// 每次事件循环调用一次
    ///
    /// 1. 渲染线程的错误直接返回
    /// 2. surface 正在关闭时停止渲染线程，不再重建任何 Level
    /// 3. surface 的尺寸写入 `window_size`
    /// 4. 渲染线程发现的 out of date 转换为 Swapchain 重建
    /// 5. 应用所有变化
    ///
    /// return: 本次重建的边界
    pub fn tick(&mut self) -> anyhow::Result<Option<Level>> {
        if let Some(e) = self.context.take_loop_failure() {
            return Err(e.context("render thread failed"));
        }
        if self.surface.is_closing() {
            if self.context.loop_state() == LoopState::Running {
                log::info!("surface is closing, render loop stopped");
                self.context.stop_render_loop();
            }
            return Ok(None);
        }
        self.poll_surface();
        if self.context.take_recreate_request() && self.sequencer.is_live(Level::Swapchain) {
            self.sequencer.schedule_recreate(Level::Swapchain);
        }
        self.apply_state_changes()
    }

    pub fn apply_state_changes(&mut self) -> anyhow::Result<Option<Level>> {
        let boundary = self.sequencer.apply_state_changes(&mut self.context)?;
        if let Some(level) = boundary {
            log::info!("levels recreated from {level}");
        }
        Ok(boundary)
    }

    /// 请求在下一次 `tick` 时至少从 `level` 开始重建
    pub fn schedule_recreate(&mut self, level: Level) {
        self.sequencer.schedule_recreate(level);
    }

    fn poll_surface(&self) {
        let drawable = WindowExtent::from(self.surface.drawable_size());
        if drawable != self.options.window_size.pending() {
            self.options.window_size.set(drawable);
        }
    }

    /// 修改 render graph
    ///
    /// 渲染线程先停止；修改完成后如果 Swapchain 存活，立即从 Swapchain 重建（重新编译并启动渲染线程）。
    pub fn edit_graph<R>(&mut self, edit: impl FnOnce(&mut RenderGraph) -> R) -> anyhow::Result<R> {
        self.context.stop_render_loop();
        let result = edit(&mut self.context.graph().lock());
        if self.sequencer.is_live(Level::Swapchain) {
            self.sequencer.recreate_levels(Level::Swapchain, &mut self.context)?;
        }
        Ok(result)
    }

    pub fn set_frame_callbacks(&self, on_start: Option<FrameCallback>, on_end: Option<FrameCallback>) {
        let callbacks = self.context.callbacks();
        callbacks.set_on_start(on_start);
        callbacks.set_on_end(on_end);
    }

    /// 在 `slot` 的下一次帧开始时执行一次
    pub fn schedule_frame_start(&self, slot: usize, action: impl FnOnce() + Send + 'static) -> anyhow::Result<()> {
        let frames = self.context.frames().context("frame resources are not created")?;
        frames
            .queues()
            .push_frame_start(slot, Box::new(action) as DeferredAction)
            .map_err(|_| anyhow::anyhow!("frame slot {slot} is out of range (overlap {})", frames.len()))
    }

    /// 在 `slot` 的下一次帧结束时执行一次
    pub fn schedule_frame_end(&self, slot: usize, action: impl FnOnce() + Send + 'static) -> anyhow::Result<()> {
        let frames = self.context.frames().context("frame resources are not created")?;
        frames
            .queues()
            .push_frame_end(slot, Box::new(action) as DeferredAction)
            .map_err(|_| anyhow::anyhow!("frame slot {slot} is out of range (overlap {})", frames.len()))
    }

    /// 挂接一对 create/dispose；`level` 已经存活时立即执行一次 create
    pub fn attach_hook(
        &mut self,
        level: Level,
        name: &str,
        create: impl FnMut(&mut RenderContext<P>) -> anyhow::Result<()> + Send + 'static,
        dispose: impl FnMut(&mut RenderContext<P>) -> anyhow::Result<()> + Send + 'static,
    ) -> anyhow::Result<ReCreator> {
        ReCreator::attach(&mut self.sequencer, &mut self.context, level, name, create, dispose)
    }

    pub fn detach_hook(&mut self, hook: ReCreator) {
        hook.detach(self.sequencer.events_mut());
    }

    pub fn set_gpu_timeout(&mut self, timeout: Duration) {
        self.context.set_gpu_timeout(timeout);
    }
}

// shaders
impl<P: GfxPlatform> Renderer<P> {
    pub fn set_shader_source(&mut self, source: Arc<dyn ShaderSource>) {
        self.shader_source = Some(source);
    }

    /// 第一次访问时创建 shader library，随 Device 一起销毁
    pub fn shader(&self, name: &str) -> anyhow::Result<vk::ShaderModule> {
        let (device, source) = self.shader_env()?;
        let tolerate = self.options.tolerate_shader_errors.value();
        let mut library = self.shaders.get_or_try_init(|| Ok(ShaderLibrary::new()))?;
        Ok(library.get_or_load(device.as_ref(), source.as_ref(), name, tolerate)?)
    }

    /// 重新编译；失败时的行为见 [`ShaderLibrary::reload`]
    pub fn reload_shader(&self, name: &str) -> anyhow::Result<vk::ShaderModule> {
        let (device, source) = self.shader_env()?;
        let tolerate = self.options.tolerate_shader_errors.value();
        let mut library = self.shaders.get_or_try_init(|| Ok(ShaderLibrary::new()))?;
        Ok(library.reload(device.as_ref(), source.as_ref(), name, tolerate)?)
    }

    fn shader_env(&self) -> anyhow::Result<(&Arc<P::Backend>, &Arc<dyn ShaderSource>)> {
        let device = self.context.device().context("shaders need a device")?;
        let source = self.shader_source.as_ref().context("no shader source is set")?;
        Ok((device, source))
    }
}

// destroy
impl<P: GfxPlatform> Renderer<P> {
    /// 自顶向下销毁所有 Level
    pub fn shutdown(&mut self) -> anyhow::Result<()> {
        if !self.sequencer.is_live(Level::Context) {
            return Ok(());
        }
        self.sequencer.dispose(&mut self.context)
    }
}

impl<P: GfxPlatform> Drop for Renderer<P> {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            log::error!("renderer shutdown failed: {e:#}");
        }
    }
}
