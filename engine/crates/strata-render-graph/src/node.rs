use std::fmt;

use ash::vk;
use strata_gfx::backend::GfxAttachment;

slotmap::new_key_type! {
    pub struct NodeKey;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// 界面节点，根节点总是 UI 节点
    Ui,
    /// 离屏的场景节点
    Scene,
}

/// 录制节点的 pass 时可以使用的信息
pub struct NodeRecordContext<'a> {
    pub cmd: vk::CommandBuffer,
    pub extent: vk::Extent2D,
    pub node_name: &'a str,
    /// 子节点的输出，已经处于 SHADER_READ_ONLY 布局
    pub inputs: &'a [GfxAttachment],
}

/// 在节点的 render pass 内部录制命令
pub type NodeRecorder = Box<dyn FnMut(&NodeRecordContext<'_>) + Send>;

pub struct RenderNode {
    pub(crate) name: String,
    pub(crate) kind: NodeKind,
    /// 非拥有的反向引用
    pub(crate) parent: Option<NodeKey>,
    /// 按插入顺序排列
    pub(crate) children: Vec<NodeKey>,
    pub(crate) clear_color: [f32; 4],
    pub(crate) recorder: Option<NodeRecorder>,
}

impl RenderNode {
    pub(crate) fn new(name: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            name: name.into(),
            kind,
            parent: None,
            children: Vec::new(),
            clear_color: [0.0, 0.0, 0.0, 1.0],
            recorder: None,
        }
    }
}

// getters
impl RenderNode {
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    #[inline]
    pub fn parent(&self) -> Option<NodeKey> {
        self.parent
    }

    #[inline]
    pub fn children(&self) -> &[NodeKey] {
        &self.children
    }

    #[inline]
    pub fn clear_color(&self) -> [f32; 4] {
        self.clear_color
    }
}

impl fmt::Debug for RenderNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderNode")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("parent", &self.parent)
            .field("children", &self.children)
            .field("has_recorder", &self.recorder.is_some())
            .finish()
    }
}
