use ash::vk;
use itertools::Itertools;
use slotmap::SecondaryMap;
use strata_gfx::GfxBackend;
use strata_gfx::backend::{
    AttachmentDesc, FramebufferDesc, GfxAttachment, RenderPassBegin, RenderPassDesc, RenderPassTarget,
};

use crate::error::{GraphError, GraphResult};
use crate::graph::RenderGraph;
use crate::node::{NodeKey, NodeRecordContext};

/// 离屏附件的格式
pub const OFFSCREEN_FORMAT: vk::Format = vk::Format::R8G8B8A8_UNORM;

/// 编译所需的 swapchain 信息
#[derive(Debug, Clone, Copy)]
pub struct CompileTarget<'a> {
    pub format: vk::Format,
    pub extent: vk::Extent2D,
    /// 每个 swapchain image 的 view，按 image index 排列
    pub views: &'a [vk::ImageView],
}

/// 非根节点的离屏输出
#[derive(Debug, Clone, Copy)]
struct NodeOutput {
    attachment: GfxAttachment,
    framebuffer: vk::Framebuffer,
    begin: RenderPassBegin,
}

/// 编译结果：render pass、离屏附件以及每个 swapchain image 的 begin 描述
#[derive(Debug)]
pub struct CompiledGraph {
    extent: vk::Extent2D,
    root_pass: vk::RenderPass,
    offscreen_pass: vk::RenderPass,
    outputs: SecondaryMap<NodeKey, NodeOutput>,
    /// 根节点的 begin 描述，按 swapchain image index 排列
    root_targets: Vec<RenderPassBegin>,
    order: Vec<NodeKey>,
}

impl CompiledGraph {
    fn empty(extent: vk::Extent2D) -> Self {
        Self {
            extent,
            root_pass: vk::RenderPass::null(),
            offscreen_pass: vk::RenderPass::null(),
            outputs: SecondaryMap::new(),
            root_targets: Vec::new(),
            order: Vec::new(),
        }
    }

    fn destroy(self, backend: &dyn GfxBackend) {
        for begin in &self.root_targets {
            backend.destroy_framebuffer(begin.framebuffer);
        }
        for (_, output) in self.outputs {
            backend.destroy_framebuffer(output.framebuffer);
            backend.destroy_color_attachment(output.attachment);
        }
        if self.offscreen_pass != vk::RenderPass::null() {
            backend.destroy_render_pass(self.offscreen_pass);
        }
        if self.root_pass != vk::RenderPass::null() {
            backend.destroy_render_pass(self.root_pass);
        }
    }
}

// getters
impl CompiledGraph {
    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// 等于编译时 swapchain image 的数量
    #[inline]
    pub fn descriptor_count(&self) -> usize {
        self.root_targets.len()
    }

    #[inline]
    pub fn root_target(&self, image_index: u32) -> Option<&RenderPassBegin> {
        self.root_targets.get(image_index as usize)
    }

    #[inline]
    pub fn output(&self, key: NodeKey) -> Option<&GfxAttachment> {
        self.outputs.get(key).map(|output| &output.attachment)
    }

    /// 录制顺序：子节点在前，根节点最后
    #[inline]
    pub fn order(&self) -> &[NodeKey] {
        &self.order
    }
}

// compile & record
impl RenderGraph {
    /// 为当前的树与 swapchain 创建 render pass、离屏附件与 framebuffer
    ///
    /// 之前的编译结果会先被释放。返回生成的 begin 描述数量（每个 swapchain image 一个）。
    /// 中途失败时已经创建的对象会被释放。
    pub fn compile(&mut self, backend: &dyn GfxBackend, target: &CompileTarget<'_>) -> GraphResult<usize> {
        self.release(backend);

        let mut compiled = CompiledGraph::empty(target.extent);
        match self.build(backend, target, &mut compiled) {
            Ok(()) => {
                let count = compiled.descriptor_count();
                log::info!(
                    "render graph compiled: {} node(s) [{}], {} swapchain target(s), extent {}x{}",
                    compiled.order.len(),
                    compiled.order.iter().map(|key| self.nodes[*key].name.as_str()).join(" -> "),
                    count,
                    target.extent.width,
                    target.extent.height
                );
                self.compiled = Some(compiled);
                self.dirty = false;
                Ok(count)
            }
            Err(e) => {
                compiled.destroy(backend);
                Err(e)
            }
        }
    }

    fn build(
        &self,
        backend: &dyn GfxBackend,
        target: &CompileTarget<'_>,
        compiled: &mut CompiledGraph,
    ) -> GraphResult<()> {
        compiled.order = self.post_order();
        compiled.root_pass = backend.create_render_pass(&RenderPassDesc {
            format: target.format,
            target: RenderPassTarget::Present,
        })?;

        let offscreen_nodes = compiled.order.iter().copied().filter(|key| *key != self.root).collect_vec();
        if !offscreen_nodes.is_empty() {
            compiled.offscreen_pass = backend.create_render_pass(&RenderPassDesc {
                format: OFFSCREEN_FORMAT,
                target: RenderPassTarget::Offscreen,
            })?;
        }

        for key in offscreen_nodes {
            let node = &self.nodes[key];
            let attachment = backend.create_color_attachment(&AttachmentDesc {
                name: format!("graph-{}", node.name),
                format: OFFSCREEN_FORMAT,
                extent: target.extent,
            })?;
            let framebuffer = match Self::prepare_attachment(backend, compiled, &attachment) {
                Ok(framebuffer) => framebuffer,
                Err(e) => {
                    backend.destroy_color_attachment(attachment);
                    return Err(e);
                }
            };
            compiled.outputs.insert(
                key,
                NodeOutput {
                    attachment,
                    framebuffer,
                    begin: RenderPassBegin {
                        render_pass: compiled.offscreen_pass,
                        framebuffer,
                        extent: target.extent,
                        clear_color: node.clear_color,
                    },
                },
            );
        }

        let root_clear = self.nodes[self.root].clear_color;
        for view in target.views {
            let framebuffer = backend.create_framebuffer(&FramebufferDesc {
                render_pass: compiled.root_pass,
                view: *view,
                extent: target.extent,
            })?;
            compiled.root_targets.push(RenderPassBegin {
                render_pass: compiled.root_pass,
                framebuffer,
                extent: target.extent,
                clear_color: root_clear,
            });
        }
        Ok(())
    }

    /// 新附件的布局转换在短生命周期的 command buffer 上同步完成
    fn prepare_attachment(
        backend: &dyn GfxBackend,
        compiled: &CompiledGraph,
        attachment: &GfxAttachment,
    ) -> GraphResult<vk::Framebuffer> {
        backend.transition_image_layout(
            attachment.image,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        )?;
        let framebuffer = backend.create_framebuffer(&FramebufferDesc {
            render_pass: compiled.offscreen_pass,
            view: attachment.view,
            extent: attachment.extent,
        })?;
        Ok(framebuffer)
    }

    /// 释放编译结果，调用前 GPU 不能再使用这些对象
    pub fn release(&mut self, backend: &dyn GfxBackend) {
        if let Some(compiled) = self.compiled.take() {
            compiled.destroy(backend);
            self.dirty = true;
        }
    }

    /// 将整棵树录制到 `cmd` 中，`cmd` 需要处于录制状态
    ///
    /// 每个节点一个 render pass，子节点先于父节点；根节点输出到 `image_index` 对应的 swapchain image。
    pub fn record(&mut self, backend: &dyn GfxBackend, cmd: vk::CommandBuffer, image_index: u32) -> GraphResult<()> {
        let compiled = match &self.compiled {
            Some(compiled) if !self.dirty => compiled,
            _ => return Err(GraphError::NotCompiled),
        };
        let root_begin = *compiled.root_target(image_index).ok_or(GraphError::ImageOutOfRange {
            index: image_index,
            count: compiled.descriptor_count(),
        })?;

        let mut inputs = Vec::new();
        for key in &compiled.order {
            let begin = if *key == self.root {
                root_begin
            } else {
                compiled.outputs[*key].begin
            };
            let node = &mut self.nodes[*key];

            inputs.clear();
            inputs.extend(node.children.iter().filter_map(|child| compiled.output(*child)).copied());

            backend.cmd_begin_render_pass(cmd, &begin);
            if let Some(recorder) = node.recorder.as_mut() {
                recorder(&NodeRecordContext {
                    cmd,
                    extent: begin.extent,
                    node_name: &node.name,
                    inputs: &inputs,
                });
            }
            backend.cmd_end_render_pass(cmd);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use ash::vk::Handle;
    use strata_gfx::mock::{MockBackend, MockOp};

    use super::*;
    use crate::node::NodeKind;

    const EXTENT: vk::Extent2D = vk::Extent2D {
        width: 640,
        height: 480,
    };

    fn views(count: u64) -> Vec<vk::ImageView> {
        (1..=count).map(|i| vk::ImageView::from_raw(0x1000 + i)).collect()
    }

    fn compile(graph: &mut RenderGraph, backend: &MockBackend, views: &[vk::ImageView]) -> usize {
        graph
            .compile(
                backend,
                &CompileTarget {
                    format: vk::Format::B8G8R8A8_SRGB,
                    extent: EXTENT,
                    views,
                },
            )
            .unwrap()
    }

    #[test]
    fn one_descriptor_per_swapchain_image() {
        let backend = MockBackend::new();
        let mut graph = RenderGraph::new("ui");
        graph.add_child(graph.root(), "scene", NodeKind::Scene).unwrap();

        let views = views(3);
        assert_eq!(compile(&mut graph, &backend, &views), 3);
        assert!(!graph.is_dirty());

        let compiled = graph.compiled().unwrap();
        let framebuffers = (0..3).map(|i| compiled.root_target(i).unwrap().framebuffer).collect_vec();
        assert!(framebuffers.iter().all_unique());
        assert!(compiled.root_target(3).is_none());

        // 2 个 render pass，3 个 swapchain framebuffer + 1 个离屏 framebuffer
        assert_eq!(backend.live("render_pass"), 2);
        assert_eq!(backend.live("framebuffer"), 4);
        assert_eq!(backend.live("attachment"), 1);
    }

    #[test]
    fn offscreen_attachments_are_transitioned_on_creation() {
        let backend = MockBackend::new();
        let mut graph = RenderGraph::new("ui");
        let scene = graph.add_child(graph.root(), "scene", NodeKind::Scene).unwrap();
        compile(&mut graph, &backend, &views(2));

        let image = graph.compiled().unwrap().output(scene).unwrap().image;
        let transitions = backend.count_ops(|op| {
            matches!(op, MockOp::Transition { image: i, old, new }
                if *i == image
                    && *old == vk::ImageLayout::UNDEFINED
                    && *new == vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
        });
        assert_eq!(transitions, 1);
        assert!(graph.compiled().unwrap().output(graph.root()).is_none());
    }

    #[test]
    fn children_are_recorded_before_parents() {
        let backend = MockBackend::new();
        let mut graph = RenderGraph::new("ui");
        let root = graph.root();
        let scene = graph.add_child(root, "scene", NodeKind::Scene).unwrap();
        let shadow = graph.add_child(scene, "shadow", NodeKind::Scene).unwrap();

        let recorded = Arc::new(Mutex::new(Vec::new()));
        for key in [root, scene, shadow] {
            let recorded = recorded.clone();
            graph
                .set_recorder(
                    key,
                    Box::new(move |ctx: &NodeRecordContext<'_>| {
                        recorded.lock().unwrap().push((ctx.node_name.to_string(), ctx.inputs.len()));
                    }),
                )
                .unwrap();
        }

        let views = views(2);
        compile(&mut graph, &backend, &views);
        backend.clear_ops();

        let cmd = vk::CommandBuffer::from_raw(0x77);
        graph.record(&backend, cmd, 1).unwrap();

        assert_eq!(
            *recorded.lock().unwrap(),
            vec![("shadow".to_string(), 0), ("scene".to_string(), 1), ("ui".to_string(), 1)]
        );

        let begins = backend
            .ops()
            .into_iter()
            .filter_map(|op| match op {
                MockOp::BeginRenderPass(begin) => Some(begin),
                _ => None,
            })
            .collect_vec();
        assert_eq!(begins.len(), 3);
        assert_eq!(begins[2], *graph.compiled().unwrap().root_target(1).unwrap());
        assert_eq!(backend.count_ops(|op| matches!(op, MockOp::EndRenderPass(c) if *c == cmd)), 3);
    }

    #[test]
    fn record_requires_fresh_compile() {
        let backend = MockBackend::new();
        let mut graph = RenderGraph::new("ui");
        let cmd = vk::CommandBuffer::from_raw(0x77);
        assert!(matches!(graph.record(&backend, cmd, 0), Err(GraphError::NotCompiled)));

        compile(&mut graph, &backend, &views(2));
        assert!(matches!(
            graph.record(&backend, cmd, 2),
            Err(GraphError::ImageOutOfRange { index: 2, count: 2 })
        ));

        graph.add_child(graph.root(), "late", NodeKind::Scene).unwrap();
        assert!(matches!(graph.record(&backend, cmd, 0), Err(GraphError::NotCompiled)));
    }

    #[test]
    fn deep_tree_compiles() {
        let backend = MockBackend::new();
        let mut graph = RenderGraph::new("ui");
        let mut parent = graph.root();
        for i in 0..2_000 {
            parent = graph.add_child(parent, &format!("n{i}"), NodeKind::Scene).unwrap();
        }
        assert_eq!(compile(&mut graph, &backend, &views(3)), 3);
        assert_eq!(backend.live("attachment"), 2_000);
        graph.record(&backend, vk::CommandBuffer::from_raw(1), 0).unwrap();
    }

    #[test]
    fn recompile_and_release_free_everything() {
        let backend = MockBackend::new();
        let mut graph = RenderGraph::new("ui");
        graph.add_child(graph.root(), "scene", NodeKind::Scene).unwrap();

        compile(&mut graph, &backend, &views(3));
        compile(&mut graph, &backend, &views(2));
        assert_eq!(backend.live("framebuffer"), 3);
        assert_eq!(backend.live("attachment"), 1);

        graph.release(&backend);
        assert!(graph.compiled().is_none());
        assert!(graph.is_dirty());
        assert!(backend.all_released(), "{:?}", backend.live_summary());
    }
}
