use foundation::ids::LayerId;
use hydration::lookup::BoxFuture;
use layers::layer::LayerAttributes;

use crate::gesture::{DragInfo, SelectInfo};
use crate::node::TreeNode;

pub type DispatchFuture<'a, T> = BoxFuture<'a, Result<T, DispatchError>>;

/// Failure reported by a dispatch callback.
#[derive(Debug)]
pub struct DispatchError {
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl DispatchError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

impl std::fmt::Display for DispatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for DispatchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as _)
    }
}

/// Callbacks the tree forwards node operations to, typically a persistence
/// backend. Every callback defaults to a successful no-op.
pub trait NodeDispatch {
    /// A new node was requested under `parent`. May return the persisted id
    /// the backend assigned to it.
    fn add_node(
        &self,
        _attributes: LayerAttributes,
        _parent: Option<LayerId>,
    ) -> DispatchFuture<'_, Option<LayerId>> {
        Box::pin(async { Ok::<_, DispatchError>(None) })
    }

    fn remove_node(&self, _node: TreeNode) -> DispatchFuture<'_, ()> {
        Box::pin(async { Ok::<_, DispatchError>(()) })
    }

    fn edit_node(&self, _key: String, _attributes: LayerAttributes) -> DispatchFuture<'_, ()> {
        Box::pin(async { Ok::<_, DispatchError>(()) })
    }

    fn drag_node(&self, _info: DragInfo) -> DispatchFuture<'_, ()> {
        Box::pin(async { Ok::<_, DispatchError>(()) })
    }

    fn select_node(&self, _keys: &[String], _info: &SelectInfo) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopDispatch;

impl NodeDispatch for NoopDispatch {}
