use foundation::ids::LayerId;
use layers::hierarchy::MoveError;
use layers::layer::NodeHandle;

use crate::dispatch::DispatchError;

#[derive(Debug)]
pub enum TreeError {
    /// The dispatch callback failed; the hierarchy was left unchanged.
    Dispatch(DispatchError),
    /// A gesture referenced a key that is not in the tree.
    UnknownNode(String),
    InvalidMove(MoveError),
}

impl std::fmt::Display for TreeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TreeError::Dispatch(e) => write!(f, "dispatch failed: {e}"),
            TreeError::UnknownNode(key) => write!(f, "no tree node with key {key}"),
            TreeError::InvalidMove(e) => write!(f, "invalid move: {e}"),
        }
    }
}

impl std::error::Error for TreeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TreeError::Dispatch(e) => Some(e),
            TreeError::InvalidMove(e) => Some(e),
            TreeError::UnknownNode(_) => None,
        }
    }
}

impl From<DispatchError> for TreeError {
    fn from(e: DispatchError) -> Self {
        TreeError::Dispatch(e)
    }
}

impl From<MoveError> for TreeError {
    fn from(e: MoveError) -> Self {
        TreeError::InvalidMove(e)
    }
}

/// Hydration failure forwarded to the error channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HydrationFailure {
    pub node: NodeHandle,
    pub key: Option<String>,
    pub rendering_layer: LayerId,
    pub message: String,
}

impl std::fmt::Display for HydrationFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "rendering parameters for layer {} unavailable: {}",
            self.rendering_layer, self.message
        )
    }
}
