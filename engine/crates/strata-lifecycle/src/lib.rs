//! Strata 的生命周期层
//!
//! GPU 对象之间存在严格的依赖层级（Context → Instance → Device → Frame → Swapchain），
//! 配置变化时需要按正确的顺序销毁并重建。本 crate 不依赖任何图形 API：
//!
//! - [`level`]：层级与事件阶段
//! - [`option`]：两阶段（pending/committed）的具名配置项
//! - [`sequencer`]：Level 状态机与级联重建
//! - [`events`]：每个 (Level, Phase) 上有序的监听者列表
//! - [`hooks`]：ReCreator / LevelLazy / ExecuteOnce

pub mod events;
pub mod hooks;
pub mod level;
pub mod option;
pub mod sequencer;

pub use events::{LevelEvents, LevelListener, ListenerId};
pub use hooks::{ExecuteOnce, LevelLazy, OnceAction, ReCreator};
pub use level::{Level, LevelPhase};
pub use option::{AnyOption, GfxOption, OptionDescription, OptionError, OptionStore, OptionValue};
pub use sequencer::{LevelOwner, LevelSequencer};
