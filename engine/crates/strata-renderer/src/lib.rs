//! Strata 的渲染器
//!
//! [`Renderer`] 持有 Level 状态机与 [`RenderContext`]，在控制线程上负责创建、销毁与级联重建；
//! Swapchain Level 存活期间由 [`render_loop::RenderLoop`] 在独立的渲染线程上绘制。
//!
//! 每一帧的步骤：
//! 1. 等待当前 ring slot 的 fence
//! 2. acquire swapchain image（out of date 时丢弃该帧并请求重建）
//! 3. 帧开始回调与延迟动作
//! 4. 录制 render graph 并提交
//! 5. present
//! 6. 帧结束回调与延迟动作，帧序号加一

pub mod frame_counter;
pub mod frame_resources;
pub mod options;
pub mod render_context;
pub mod render_loop;
pub mod renderer;
pub mod shader;
pub mod swapchain_manager;

pub use frame_resources::{DeferredAction, DeferredQueues, FrameResources, FrameSlot};
pub use options::{PresentModeOption, RenderOptions, WindowExtent};
pub use render_context::RenderContext;
pub use render_loop::{FrameCallback, FrameInfo, FrameStatsSnapshot, LoopState};
pub use renderer::Renderer;
pub use shader::{ShaderLibrary, ShaderSource, SpirvDirectory};
pub use swapchain_manager::{SwapchainManager, SwapchainState};
