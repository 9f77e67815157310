use std::fmt;
use std::str::FromStr;

use ash::vk;
use strata_gfx::foundation::physical_device::GpuPreference;
use strata_lifecycle::{GfxOption, Level, OptionError, OptionStore};

/// frame overlap 的取值范围
pub const MAX_FRAME_OVERLAP: u32 = 8;

/// 窗口尺寸，字符串形式为 `WxH`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowExtent {
    pub width: u32,
    pub height: u32,
}

impl WindowExtent {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    #[inline]
    pub fn is_zero(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl From<vk::Extent2D> for WindowExtent {
    fn from(extent: vk::Extent2D) -> Self {
        Self::new(extent.width, extent.height)
    }
}

impl From<WindowExtent> for vk::Extent2D {
    fn from(extent: WindowExtent) -> Self {
        vk::Extent2D {
            width: extent.width,
            height: extent.height,
        }
    }
}

impl FromStr for WindowExtent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (width, height) =
            s.trim().split_once(['x', 'X']).ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{s}'"))?;
        let width = width.trim().parse::<u32>().map_err(|e| format!("bad width '{width}': {e}"))?;
        let height = height.trim().parse::<u32>().map_err(|e| format!("bad height '{height}': {e}"))?;
        Ok(Self::new(width, height))
    }
}

impl fmt::Display for WindowExtent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PresentModeOption {
    #[default]
    Fifo,
    FifoRelaxed,
    Mailbox,
    Immediate,
}

impl PresentModeOption {
    pub fn to_vk(self) -> vk::PresentModeKHR {
        match self {
            Self::Fifo => vk::PresentModeKHR::FIFO,
            Self::FifoRelaxed => vk::PresentModeKHR::FIFO_RELAXED,
            Self::Mailbox => vk::PresentModeKHR::MAILBOX,
            Self::Immediate => vk::PresentModeKHR::IMMEDIATE,
        }
    }
}

impl FromStr for PresentModeOption {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fifo" | "vsync" => Ok(Self::Fifo),
            "fifo_relaxed" => Ok(Self::FifoRelaxed),
            "mailbox" => Ok(Self::Mailbox),
            "immediate" => Ok(Self::Immediate),
            other => Err(format!("unknown present mode '{other}', expected fifo/fifo_relaxed/mailbox/immediate")),
        }
    }
}

impl fmt::Display for PresentModeOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Fifo => "fifo",
            Self::FifoRelaxed => "fifo_relaxed",
            Self::Mailbox => "mailbox",
            Self::Immediate => "immediate",
        })
    }
}

/// 渲染器注册的全部 option
///
/// 句柄可以 clone 到任意线程；修改只写入 pending，由下一次 `apply_state_changes` 生效。
#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub app_name: GfxOption<String>,
    pub debug_mode: GfxOption<bool>,
    pub gpu: GfxOption<GpuPreference>,
    pub tolerate_shader_errors: GfxOption<bool>,
    pub frame_overlap: GfxOption<u32>,
    pub window_size: GfxOption<WindowExtent>,
    pub present_mode: GfxOption<PresentModeOption>,
    /// 0 表示不限制
    pub max_fps: GfxOption<u32>,
}

impl RenderOptions {
    pub const DEFAULT_WINDOW_SIZE: WindowExtent = WindowExtent::new(1280, 720);

    pub fn register(store: &OptionStore) -> Result<Self, OptionError> {
        Ok(Self {
            app_name: store.register("app_name", Level::Context, "strata".to_string(), true)?,
            debug_mode: store.register("debug_mode", Level::Instance, false, false)?,
            gpu: store.register("gpu", Level::Device, GpuPreference::Auto, false)?,
            tolerate_shader_errors: store.register("tolerate_shader_errors", Level::Device, true, false)?,
            frame_overlap: store.register("frame_overlap", Level::Frame, 2u32, false)?,
            window_size: store.register("window_size", Level::Swapchain, Self::DEFAULT_WINDOW_SIZE, false)?,
            present_mode: store.register("present_mode", Level::Swapchain, PresentModeOption::Fifo, false)?,
            max_fps: store.register("max_fps", Level::Swapchain, 0u32, false)?,
        })
    }
}

// getters
impl RenderOptions {
    /// 已提交的 frame overlap，限制在 `1..=MAX_FRAME_OVERLAP`
    pub fn frame_overlap(&self) -> usize {
        let overlap = self.frame_overlap.value();
        let clamped = overlap.clamp(1, MAX_FRAME_OVERLAP);
        if clamped != overlap {
            log::warn!("frame_overlap {overlap} is out of range, using {clamped}");
        }
        clamped as usize
    }
}
