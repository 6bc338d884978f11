use std::collections::BTreeMap;

use layers::hierarchy::Hierarchy;
use layers::layer::NodeHandle;
use layers::walker::key_of;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Serializable projection of a hierarchy entity for the tree presentation.
///
/// Never edited in place; the adapter regenerates the whole list from the
/// hierarchy after every change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeNode {
    pub key: String,
    pub title: String,
    /// Key of the containing group; `None` directly under the root.
    pub parent: Option<String>,
    pub is_leaf: bool,
    pub expanded: bool,
    pub children: Vec<TreeNode>,
    pub properties: BTreeMap<String, Value>,
}

impl TreeNode {
    /// Pre-order iterator over this node and its descendants.
    pub fn walk(&self) -> impl Iterator<Item = &TreeNode> {
        let mut stack = vec![self];
        std::iter::from_fn(move || {
            let node = stack.pop()?;
            stack.extend(node.children.iter().rev());
            Some(node)
        })
    }
}

/// Derives the tree list: one node per child of the root, nested.
pub fn derive_tree_nodes(hierarchy: &Hierarchy) -> Vec<TreeNode> {
    hierarchy
        .children(hierarchy.root())
        .iter()
        .filter_map(|child| tree_node(hierarchy, *child))
        .collect()
}

/// Projection of a single entity and its subtree.
pub fn tree_node(hierarchy: &Hierarchy, handle: NodeHandle) -> Option<TreeNode> {
    let entity = hierarchy.entity(handle)?;
    let parent = hierarchy
        .parent(handle)
        .filter(|p| *p != hierarchy.root())
        .and_then(|p| key_of(hierarchy, p));
    Some(TreeNode {
        key: key_of(hierarchy, handle)?,
        title: entity.title.clone(),
        parent,
        is_leaf: !entity.is_group(),
        expanded: entity.is_group(),
        children: hierarchy
            .children(handle)
            .iter()
            .filter_map(|child| tree_node(hierarchy, *child))
            .collect(),
        properties: entity.attributes(),
    })
}
