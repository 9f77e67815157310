use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context as _;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use strata_crate_tools::config::OptionSeed;
use strata_crate_tools::init_log::init_log;
use strata_gfx::foundation::vulkan_platform::VulkanPlatform;
use strata_gfx::swapchain::surface::RawWindowTarget;
use strata_renderer::{RenderOptions, Renderer, SpirvDirectory};
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowId};

use crate::window_surface::WindowSurface;

/// 控制线程检查 option 与 surface 变化的间隔
const TICK_INTERVAL: Duration = Duration::from_millis(16);

/// `STRATA_SHADER_DIR` 指向存放 `.spv` 的目录
const SHADER_DIR_ENV: &str = "STRATA_SHADER_DIR";

pub struct WinitApp {
    seed: Option<OptionSeed>,

    window: Option<Window>,
    surface: Option<Arc<WindowSurface>>,
    renderer: Option<Renderer<VulkanPlatform>>,

    /// 导致事件循环退出的错误
    failure: Option<anyhow::Error>,
}

// 总的 main 函数
impl WinitApp {
    /// 整个程序的入口
    pub fn run(seed: Option<OptionSeed>) -> anyhow::Result<()> {
        init_log();
        let _tracy = tracy_client::Client::start();

        let event_loop = EventLoop::new().context("failed to create the event loop")?;
        let mut app = Self {
            seed,
            window: None,
            surface: None,
            renderer: None,
            failure: None,
        };
        event_loop.run_app(&mut app).context("event loop failed")?;

        log::info!("end run.");
        app.destroy()
    }
}

// new & init
impl WinitApp {
    /// 在 window 创建之后创建渲染器并初始化所有 Level
    fn init_after_window(&mut self, event_loop: &ActiveEventLoop) -> anyhow::Result<()> {
        let size = RenderOptions::DEFAULT_WINDOW_SIZE;
        let window_attr = Window::default_attributes()
            .with_title("Strata")
            .with_inner_size(winit::dpi::PhysicalSize::new(size.width, size.height));
        let window = event_loop.create_window(window_attr).context("failed to create the window")?;

        let target = RawWindowTarget::new(window.display_handle()?.as_raw(), window.window_handle()?.as_raw());
        let inner = window.inner_size();
        let surface = Arc::new(WindowSurface::new(target, inner.width, inner.height));

        let mut renderer = Renderer::new(VulkanPlatform::new(surface.clone()), surface.clone())?;
        if let Some(seed) = self.seed.as_ref() {
            renderer.apply_seed(seed)?;
        }
        if let Ok(dir) = std::env::var(SHADER_DIR_ENV) {
            log::info!("loading shaders from {dir}");
            renderer.set_shader_source(Arc::new(SpirvDirectory::new(dir)));
        }
        // 窗口先交给 self，渲染器初始化失败时也会按正确的顺序销毁
        self.window = Some(window);
        self.surface = Some(surface);
        renderer.init()?;
        self.renderer = Some(renderer);
        Ok(())
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, error: anyhow::Error) {
        log::error!("{error:#}");
        self.failure = Some(error);
        event_loop.exit();
    }
}

// destroy
impl WinitApp {
    /// 渲染器必须在窗口之前销毁
    fn shutdown_renderer(&mut self) -> anyhow::Result<()> {
        match self.renderer.take() {
            Some(mut renderer) => renderer.shutdown(),
            None => Ok(()),
        }
    }

    fn destroy(mut self) -> anyhow::Result<()> {
        let shutdown = self.shutdown_renderer();
        self.surface = None;
        self.window = None;
        match self.failure.take() {
            Some(failure) => Err(failure),
            None => shutdown,
        }
    }
}

// 各种 winit 的事件处理
impl ApplicationHandler for WinitApp {
    // 建议在这里创建 window 和 Renderer
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        log::info!("winit event: resumed");

        if let Err(e) = self.init_after_window(event_loop) {
            self.fail(event_loop, e.context("failed to initialize the renderer"));
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                if let Some(surface) = self.surface.as_ref() {
                    surface.close();
                }
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if let Some(surface) = self.surface.as_ref() {
                    surface.resize(size.width, size.height);
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if let Some(renderer) = self.renderer.as_mut() {
            if let Err(e) = renderer.tick() {
                self.fail(event_loop, e);
                return;
            }
        }
        event_loop.set_control_flow(ControlFlow::WaitUntil(Instant::now() + TICK_INTERVAL));
    }

    fn suspended(&mut self, _event_loop: &ActiveEventLoop) {
        log::warn!("winit event: suspended");
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        log::info!("loop exiting");
        if let Err(e) = self.shutdown_renderer() {
            log::error!("renderer shutdown failed: {e:#}");
        }
    }
}
