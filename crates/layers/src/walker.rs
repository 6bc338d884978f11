//! Pure lookups over a [`Hierarchy`].
//!
//! Everything here takes `&Hierarchy`, so a walk can never observe a
//! half-applied mutation.

use foundation::ids::LayerId;
use tracing::warn;

use crate::hierarchy::Hierarchy;
use crate::layer::{LayerEntity, NodeHandle};

/// Depth-first pre-order listing of `root` and everything below it.
///
/// Groups come before their children; siblings keep declaration order.
pub fn flatten(hierarchy: &Hierarchy, root: NodeHandle) -> Vec<NodeHandle> {
    let mut out = Vec::new();
    if !hierarchy.contains(root) {
        return out;
    }
    let mut stack = vec![root];
    while let Some(handle) = stack.pop() {
        out.push(handle);
        stack.extend(hierarchy.children(handle).iter().rev().copied());
    }
    out
}

/// All entities below `node`, in pre-order, excluding `node` itself.
pub fn descendants(hierarchy: &Hierarchy, node: NodeHandle) -> Vec<NodeHandle> {
    let mut all = flatten(hierarchy, node);
    if !all.is_empty() {
        all.remove(0);
    }
    all
}

/// First entity in pre-order whose persisted id matches.
pub fn find_by_id(hierarchy: &Hierarchy, root: NodeHandle, id: &LayerId) -> Option<NodeHandle> {
    flatten(hierarchy, root)
        .into_iter()
        .find(|h| has_id(hierarchy.entity(*h), id))
}

pub fn find_group_by_name(
    hierarchy: &Hierarchy,
    root: NodeHandle,
    name: &str,
) -> Option<NodeHandle> {
    flatten(hierarchy, root).into_iter().find(|h| {
        hierarchy
            .entity(*h)
            .is_some_and(|e| e.is_group() && e.name.as_deref() == Some(name))
    })
}

/// Group that "add to `id`" should target.
///
/// A group resolves to itself, a leaf to its parent group (following
/// `parent_id` while it points at further leaves). Anything that does not
/// resolve falls back to `root`.
pub fn find_group_by_id(hierarchy: &Hierarchy, root: NodeHandle, id: &LayerId) -> NodeHandle {
    let all = flatten(hierarchy, root);
    let find = |id: &LayerId| {
        all.iter()
            .copied()
            .find(|h| has_id(hierarchy.entity(*h), id))
    };

    let Some(mut current) = find(id) else {
        return root;
    };
    // Bounded by the entity count so malformed parent ids cannot loop.
    for _ in 0..all.len() {
        let Some(entity) = hierarchy.entity(current) else {
            return root;
        };
        if entity.is_group() {
            return current;
        }
        let Some(parent) = entity.parent_id.as_ref().and_then(|p| find(p)) else {
            return root;
        };
        current = parent;
    }
    root
}

/// Resolves a tree-node key: a local handle key (`~index.generation`) or a
/// persisted id.
pub fn find_by_key(hierarchy: &Hierarchy, root: NodeHandle, key: &str) -> Option<NodeHandle> {
    if let Some(handle) = NodeHandle::parse_local_key(key) {
        let mut cursor = Some(handle).filter(|h| hierarchy.contains(*h));
        while let Some(current) = cursor {
            if current == root {
                return Some(handle);
            }
            cursor = hierarchy.parent(current);
        }
        return None;
    }
    find_by_id(hierarchy, root, &LayerId::new(key))
}

/// Tree-node key of an entity: its persisted id, or its local handle key.
pub fn key_of(hierarchy: &Hierarchy, handle: NodeHandle) -> Option<String> {
    let entity = hierarchy.entity(handle)?;
    Some(match &entity.layer_id {
        Some(id) => id.to_string(),
        None => handle.local_key(),
    })
}

/// Appends `layer` to the group named `group_name`; a miss is logged and
/// leaves the hierarchy untouched.
pub fn add_layer_to_group_by_name(
    hierarchy: &mut Hierarchy,
    group_name: &str,
    layer: LayerEntity,
) -> Option<NodeHandle> {
    let root = hierarchy.root();
    let Some(group) = find_group_by_name(hierarchy, root, group_name) else {
        warn!(group_name, "no layer group with this name in the hierarchy");
        return None;
    };
    Some(hierarchy.insert(group, layer))
}

/// Appends `layer` to the group resolved by [`find_group_by_id`].
pub fn add_layer_to_group_by_id(
    hierarchy: &mut Hierarchy,
    id: &LayerId,
    layer: LayerEntity,
) -> NodeHandle {
    let root = hierarchy.root();
    let group = find_group_by_id(hierarchy, root, id);
    hierarchy.insert(group, layer)
}

fn has_id(entity: Option<&LayerEntity>, id: &LayerId) -> bool {
    entity.is_some_and(|e| e.layer_id.as_ref() == Some(id))
}
