//! Strata 的 GFX 层
//!
//! - [`backend::GfxBackend`]：渲染循环、交换链、帧资源与 render graph 使用的全部 GPU 操作
//! - [`platform::GfxPlatform`]：Context / Instance / Device 三个 Level 的创建与销毁
//! - [`foundation`]：基于 ash 的实现（instance、debug messenger、物理设备选择、逻辑设备）
//! - [`swapchain`]：surface 格式、present mode、extent 的选择
//!
//! 开启 `mock` feature 后提供 [`mock::MockBackend`]，用于在没有 GPU 的环境中测试。

pub mod backend;
pub mod commands;
pub mod error;
pub mod foundation;
pub mod platform;
pub mod swapchain;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use backend::GfxBackend;
pub use error::{GfxError, GfxResult, VkResultExt};
pub use platform::{GfxPlatform, SurfaceProvider};
