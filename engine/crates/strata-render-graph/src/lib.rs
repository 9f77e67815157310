//! 合成树（render graph）
//!
//! 每个节点是一个 render pass：根节点是 UI 节点，输出到 swapchain image；
//! 其他节点输出到各自的离屏附件，父节点在自己的 pass 中采样子节点的输出。
//! 录制时总是先录制子节点，再录制父节点。
//!
//! 修改树结构只能在渲染线程停止时进行；修改后需要重新 [`RenderGraph::compile`]。

pub mod compile;
pub mod error;
pub mod graph;
pub mod node;

pub use compile::{CompileTarget, CompiledGraph, OFFSCREEN_FORMAT};
pub use error::{GraphError, GraphResult};
pub use graph::RenderGraph;
pub use node::{NodeKey, NodeKind, NodeRecordContext, NodeRecorder, RenderNode};
