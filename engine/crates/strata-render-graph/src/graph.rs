use slotmap::SlotMap;

use crate::compile::CompiledGraph;
use crate::error::{GraphError, GraphResult};
use crate::node::{NodeKey, NodeKind, NodeRecorder, RenderNode};

/// 合成树
///
/// 节点存放在 slotmap 中，父子关系通过 key 描述：
/// 子节点列表是拥有关系（删除父节点会删除整棵子树），parent 只是反向引用。
pub struct RenderGraph {
    pub(crate) nodes: SlotMap<NodeKey, RenderNode>,
    pub(crate) root: NodeKey,

    pub(crate) compiled: Option<CompiledGraph>,
    /// 编译之后树结构是否发生过变化
    pub(crate) dirty: bool,
}

// new & init
impl RenderGraph {
    pub fn new(root_name: &str) -> Self {
        let mut nodes = SlotMap::with_key();
        let root = nodes.insert(RenderNode::new(root_name, NodeKind::Ui));
        Self {
            nodes,
            root,
            compiled: None,
            dirty: true,
        }
    }
}

// getters
impl RenderGraph {
    #[inline]
    pub fn root(&self) -> NodeKey {
        self.root
    }

    #[inline]
    pub fn node(&self, key: NodeKey) -> Option<&RenderNode> {
        self.nodes.get(key)
    }

    /// 包含尚未挂到树上的节点
    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// 树结构变化后需要重新编译
    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    #[inline]
    pub fn compiled(&self) -> Option<&CompiledGraph> {
        self.compiled.as_ref()
    }

    /// 后序遍历：子节点在父节点之前，兄弟节点按插入顺序，根节点最后
    ///
    /// 使用显式栈，树的深度不受调用栈限制
    pub fn post_order(&self) -> Vec<NodeKey> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![(self.root, false)];
        while let Some((key, expanded)) = stack.pop() {
            if expanded {
                order.push(key);
                continue;
            }
            stack.push((key, true));
            if let Some(node) = self.nodes.get(key) {
                stack.extend(node.children.iter().rev().map(|child| (*child, false)));
            }
        }
        order
    }

    /// `ancestor` 是否为 `key` 自身或其祖先
    pub fn is_ancestor_or_self(&self, ancestor: NodeKey, key: NodeKey) -> bool {
        let mut cursor = Some(key);
        while let Some(current) = cursor {
            if current == ancestor {
                return true;
            }
            cursor = self.nodes.get(current).and_then(|node| node.parent);
        }
        false
    }

    pub fn find(&self, name: &str) -> Option<NodeKey> {
        self.nodes.iter().find(|(_, node)| node.name == name).map(|(key, _)| key)
    }
}

// update
impl RenderGraph {
    /// 创建一个节点并挂到 `parent` 下
    pub fn add_child(&mut self, parent: NodeKey, name: &str, kind: NodeKind) -> GraphResult<NodeKey> {
        if !self.nodes.contains_key(parent) {
            return Err(GraphError::UnknownNode(parent));
        }
        let child = self.nodes.insert(RenderNode::new(name, kind));
        self.link(parent, child);
        Ok(child)
    }

    /// 创建一个尚未挂到树上的节点
    pub fn create_node(&mut self, name: &str, kind: NodeKind) -> NodeKey {
        self.nodes.insert(RenderNode::new(name, kind))
    }

    /// 将没有父节点的 `child` 挂到 `parent` 下
    pub fn attach(&mut self, parent: NodeKey, child: NodeKey) -> GraphResult<()> {
        if child == self.root {
            return Err(GraphError::RootIsFixed);
        }
        let child_node = self.nodes.get(child).ok_or(GraphError::UnknownNode(child))?;
        if !self.nodes.contains_key(parent) {
            return Err(GraphError::UnknownNode(parent));
        }
        if child_node.parent.is_some() {
            return Err(GraphError::AlreadyAttached(child_node.name.clone()));
        }
        if self.is_ancestor_or_self(child, parent) {
            return Err(GraphError::WouldCycle {
                parent: self.nodes[parent].name.clone(),
                child: child_node.name.clone(),
            });
        }
        self.link(parent, child);
        Ok(())
    }

    /// 从父节点上摘下，子树保留
    pub fn detach(&mut self, key: NodeKey) -> GraphResult<()> {
        if key == self.root {
            return Err(GraphError::RootIsFixed);
        }
        let parent = self.nodes.get_mut(key).ok_or(GraphError::UnknownNode(key))?.parent.take();
        if let Some(parent) = parent {
            self.nodes[parent].children.retain(|child| *child != key);
            self.dirty = true;
        }
        Ok(())
    }

    /// 删除节点及其整棵子树
    pub fn remove(&mut self, key: NodeKey) -> GraphResult<()> {
        self.detach(key)?;
        let mut stack = vec![key];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes.remove(current) {
                stack.extend(node.children);
            }
        }
        self.dirty = true;
        Ok(())
    }

    pub fn set_recorder(&mut self, key: NodeKey, recorder: NodeRecorder) -> GraphResult<()> {
        self.nodes.get_mut(key).ok_or(GraphError::UnknownNode(key))?.recorder = Some(recorder);
        Ok(())
    }

    pub fn set_clear_color(&mut self, key: NodeKey, color: [f32; 4]) -> GraphResult<()> {
        self.nodes.get_mut(key).ok_or(GraphError::UnknownNode(key))?.clear_color = color;
        self.dirty = true;
        Ok(())
    }

    fn link(&mut self, parent: NodeKey, child: NodeKey) {
        self.nodes[child].parent = Some(parent);
        self.nodes[parent].children.push(child);
        self.dirty = true;
    }
}
