use strata_gfx::GfxError;

use crate::node::NodeKey;

#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("node {0:?} does not exist")]
    UnknownNode(NodeKey),

    /// child 是 parent 自身或其祖先
    #[error("attaching `{child}` under `{parent}` would create a cycle")]
    WouldCycle { parent: String, child: String },

    #[error("node `{0}` already has a parent")]
    AlreadyAttached(String),

    #[error("the root node can not be a child or be removed")]
    RootIsFixed,

    #[error("render graph is not compiled for the current tree")]
    NotCompiled,

    #[error("swapchain image {index} is out of range ({count} compiled)")]
    ImageOutOfRange { index: u32, count: usize },

    #[error(transparent)]
    Gfx(#[from] GfxError),
}

pub type GraphResult<T> = Result<T, GraphError>;
