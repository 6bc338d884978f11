use foundation::handles::Handle;
use foundation::ids::{HierarchyId, LayerId};
use runtime::event_bus::{EventBus, SubscriptionId};
use tracing::debug;

use crate::layer::{LayerAttributes, LayerEntity, NodeHandle};
use crate::raster::{RenderingParams, RenderingSource};

pub const DEFAULT_ROOT_NAME: &str = "layer-tree-root";

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Inserted,
    Removed,
    Moved,
    Visibility,
    Attributes,
    /// Attributes changed and the leaf's rendering source was reset.
    SourceReset,
    /// A persisted id was assigned.
    Identified,
    Hydrated,
}

impl ChangeKind {
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            ChangeKind::Inserted | ChangeKind::Removed | ChangeKind::Moved
        )
    }

    /// Changes after which leaves may newly need hydration.
    pub fn needs_scan(&self) -> bool {
        self.is_structural() || *self == ChangeKind::SourceReset
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct HierarchyChange {
    pub kind: ChangeKind,
    pub node: NodeHandle,
    pub revision: u64,
}

/// Owned copy of a removed subtree.
#[derive(Debug, Clone, PartialEq)]
pub struct DetachedLayer {
    pub entity: LayerEntity,
    pub children: Vec<DetachedLayer>,
}

impl DetachedLayer {
    /// Number of entities in the subtree, including its top.
    pub fn len(&self) -> usize {
        1 + self.children.iter().map(DetachedLayer::len).sum::<usize>()
    }
}

/// A removed subtree together with the place it was removed from.
#[derive(Debug, Clone, PartialEq)]
pub struct Detached {
    pub parent: NodeHandle,
    pub index: usize,
    pub layer: DetachedLayer,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MoveError {
    UnknownNode,
    MoveRoot,
    TargetIsLeaf,
    IntoOwnSubtree,
}

impl std::fmt::Display for MoveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MoveError::UnknownNode => write!(f, "node is not part of the hierarchy"),
            MoveError::MoveRoot => write!(f, "the hierarchy root cannot be moved"),
            MoveError::TargetIsLeaf => write!(f, "cannot move a node into a leaf layer"),
            MoveError::IntoOwnSubtree => write!(f, "cannot move a group into its own subtree"),
        }
    }
}

impl std::error::Error for MoveError {}

#[derive(Debug)]
struct Node {
    entity: LayerEntity,
    parent: Option<NodeHandle>,
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    node: Option<Node>,
}

/// Rooted layer hierarchy backed by a generational arena.
///
/// Invariants:
/// - The root is a group and is never removed.
/// - Every other entity has exactly one structural parent, which lists it
///   exactly once among its children.
/// - A child's `parent_id` equals its parent's `layer_id`.
/// - A handle to a removed entity never resolves again.
///
/// Every mutation emits a [`HierarchyChange`] to subscribers after it has
/// been applied.
#[derive(Debug)]
pub struct Hierarchy {
    id: HierarchyId,
    slots: Vec<Slot>,
    free: Vec<u32>,
    root: NodeHandle,
    len: usize,
    revision: u64,
    events: EventBus<HierarchyChange>,
}

impl Default for Hierarchy {
    fn default() -> Self {
        Self::new(DEFAULT_ROOT_NAME)
    }
}

impl Hierarchy {
    pub fn new(root_name: impl Into<String>) -> Self {
        let root_name = root_name.into();
        let mut hierarchy = Self {
            id: HierarchyId::next(),
            slots: Vec::new(),
            free: Vec::new(),
            root: NodeHandle(Handle::new(0, 0)),
            len: 0,
            revision: 0,
            events: EventBus::new(),
        };
        let root = LayerEntity::group(root_name.clone()).with_name(root_name);
        hierarchy.root = hierarchy.alloc(root, None);
        hierarchy
    }

    pub fn id(&self) -> HierarchyId {
        self.id
    }

    pub fn root(&self) -> NodeHandle {
        self.root
    }

    /// Number of entities, including the root.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.children(self.root).is_empty()
    }

    /// Incremented on every mutation.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn contains(&self, handle: NodeHandle) -> bool {
        self.node(handle).is_some()
    }

    pub fn entity(&self, handle: NodeHandle) -> Option<&LayerEntity> {
        self.node(handle).map(|n| &n.entity)
    }

    pub fn parent(&self, handle: NodeHandle) -> Option<NodeHandle> {
        self.node(handle).and_then(|n| n.parent)
    }

    pub fn children(&self, handle: NodeHandle) -> &[NodeHandle] {
        self.node(handle)
            .map(|n| n.entity.children())
            .unwrap_or(&[])
    }

    pub fn position_in_parent(&self, handle: NodeHandle) -> Option<usize> {
        let parent = self.parent(handle)?;
        self.children(parent).iter().position(|c| *c == handle)
    }

    pub fn subscribe(
        &mut self,
        listener: impl FnMut(&HierarchyChange) + Send + 'static,
    ) -> SubscriptionId {
        self.events.subscribe(listener)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }

    pub fn listener_count(&self) -> usize {
        self.events.listener_count()
    }

    pub fn is_subscribed(&self, id: SubscriptionId) -> bool {
        self.events.is_subscribed(id)
    }

    /// Appends `entity` under `parent`.
    ///
    /// A leaf `parent` degrades to its own parent group, an unknown one to the
    /// root.
    pub fn insert(&mut self, parent: NodeHandle, entity: LayerEntity) -> NodeHandle {
        self.insert_at(parent, usize::MAX, entity)
    }

    /// Inserts `entity` at `index` among `parent`'s children (clamped).
    pub fn insert_at(
        &mut self,
        parent: NodeHandle,
        index: usize,
        mut entity: LayerEntity,
    ) -> NodeHandle {
        let group = self.resolve_group(parent);
        if let Some(children) = entity.children_mut() {
            children.clear();
        }
        entity.parent_id = self.entity(group).and_then(|g| g.layer_id.clone());

        let handle = self.alloc(entity, Some(group));
        if let Some(children) = self.node_mut(group).and_then(|n| n.entity.children_mut()) {
            let at = index.min(children.len());
            children.insert(at, handle);
        }
        self.notify(ChangeKind::Inserted, handle);
        handle
    }

    /// Re-inserts a detached subtree; returns the handle of its new top.
    pub fn insert_detached(
        &mut self,
        parent: NodeHandle,
        index: usize,
        layer: DetachedLayer,
    ) -> NodeHandle {
        let DetachedLayer { entity, children } = layer;
        let top = self.insert_at(parent, index, entity);
        for child in children {
            self.insert_detached(top, usize::MAX, child);
        }
        top
    }

    /// Puts a removed subtree back where it was removed from.
    pub fn restore(&mut self, detached: Detached) -> NodeHandle {
        self.insert_detached(detached.parent, detached.index, detached.layer)
    }

    /// Removes `handle` and its whole subtree.
    ///
    /// Returns `None` for the root and for unknown handles.
    pub fn remove(&mut self, handle: NodeHandle) -> Option<Detached> {
        if handle == self.root {
            return None;
        }
        let parent = self.parent(handle)?;
        let index = self.position_in_parent(handle)?;
        if let Some(children) = self.node_mut(parent).and_then(|n| n.entity.children_mut()) {
            children.remove(index);
        }
        let layer = self.release_subtree(handle)?;
        self.notify(ChangeKind::Removed, handle);
        Some(Detached {
            parent,
            index,
            layer,
        })
    }

    /// Moves `handle` under `new_parent` at `index`.
    ///
    /// `index` addresses the new parent's child list with `handle` already
    /// taken out of it; it is clamped to the list length.
    pub fn move_node(
        &mut self,
        handle: NodeHandle,
        new_parent: NodeHandle,
        index: usize,
    ) -> Result<(), MoveError> {
        let old_parent = self.check_move(handle, new_parent)?;
        let new_parent_id = self.entity(new_parent).and_then(|e| e.layer_id.clone());

        if let Some(children) = self
            .node_mut(old_parent)
            .and_then(|n| n.entity.children_mut())
        {
            children.retain(|c| *c != handle);
        }
        if let Some(children) = self
            .node_mut(new_parent)
            .and_then(|n| n.entity.children_mut())
        {
            let at = index.min(children.len());
            children.insert(at, handle);
        }
        if let Some(node) = self.node_mut(handle) {
            node.parent = Some(new_parent);
            node.entity.parent_id = new_parent_id;
        }
        self.notify(ChangeKind::Moved, handle);
        Ok(())
    }

    /// Validates a move without performing it; returns the current parent.
    pub fn check_move(
        &self,
        handle: NodeHandle,
        new_parent: NodeHandle,
    ) -> Result<NodeHandle, MoveError> {
        if handle == self.root {
            return Err(MoveError::MoveRoot);
        }
        let old_parent = self.parent(handle).ok_or(MoveError::UnknownNode)?;
        let target = self.entity(new_parent).ok_or(MoveError::UnknownNode)?;
        if !target.is_group() {
            return Err(MoveError::TargetIsLeaf);
        }
        let mut cursor = Some(new_parent);
        while let Some(current) = cursor {
            if current == handle {
                return Err(MoveError::IntoOwnSubtree);
            }
            cursor = self.parent(current);
        }
        Ok(old_parent)
    }

    /// Sets one entity's own visibility; no cascading.
    ///
    /// Returns `false` if the handle does not resolve. Listeners are only
    /// notified when the value actually changes.
    pub fn set_visible(&mut self, handle: NodeHandle, visible: bool) -> bool {
        let Some(node) = self.node_mut(handle) else {
            return false;
        };
        if node.entity.visible == visible {
            return true;
        }
        node.entity.visible = visible;
        self.notify(ChangeKind::Visibility, handle);
        true
    }

    /// Applies edited attributes.
    ///
    /// Changing a leaf's rendering layer resets its source so the next scan
    /// hydrates it again.
    pub fn update_attributes(&mut self, handle: NodeHandle, attributes: &LayerAttributes) -> bool {
        let Some(node) = self.node_mut(handle) else {
            return false;
        };
        let entity = &mut node.entity;
        entity.title = attributes.title.clone();
        entity.name = attributes.name.clone();
        entity.properties = attributes.properties.clone();

        let mut source_reset = false;
        if let Some(leaf) = entity.as_leaf_mut() {
            leaf.style = attributes.style.clone();
            if leaf.rendering_layer != attributes.rendering_layer {
                leaf.rendering_layer = attributes.rendering_layer.clone();
                leaf.source.clear();
                source_reset = true;
            }
        }

        let kind = if source_reset {
            ChangeKind::SourceReset
        } else {
            ChangeKind::Attributes
        };
        self.notify(kind, handle);
        true
    }

    /// Records the persisted id of an entity and rewrites its children's
    /// `parent_id` accordingly.
    pub fn assign_layer_id(&mut self, handle: NodeHandle, id: LayerId) -> bool {
        let Some(node) = self.node_mut(handle) else {
            return false;
        };
        node.entity.layer_id = Some(id.clone());
        let children = node.entity.children().to_vec();
        for child in children {
            if let Some(child) = self.node_mut(child) {
                child.entity.parent_id = Some(id.clone());
            }
        }
        self.notify(ChangeKind::Identified, handle);
        true
    }

    /// Writes hydrated parameters onto a live leaf's source.
    ///
    /// Returns `false` (and writes nothing) if the handle no longer resolves to
    /// a leaf.
    pub fn apply_rendering_params(&mut self, handle: NodeHandle, params: RenderingParams) -> bool {
        let Some(leaf) = self.node_mut(handle).and_then(|n| n.entity.as_leaf_mut()) else {
            return false;
        };
        leaf.source.apply(params);
        self.notify(ChangeKind::Hydrated, handle);
        true
    }

    /// Replaces a leaf's rendering source wholesale.
    ///
    /// An unresolved replacement is reported as [`ChangeKind::SourceReset`] so
    /// the leaf gets scanned again.
    pub fn replace_source(&mut self, handle: NodeHandle, source: RenderingSource) -> bool {
        let Some(leaf) = self.node_mut(handle).and_then(|n| n.entity.as_leaf_mut()) else {
            return false;
        };
        let kind = if source.is_resolved() {
            ChangeKind::Hydrated
        } else {
            ChangeKind::SourceReset
        };
        leaf.source = source;
        self.notify(kind, handle);
        true
    }

    fn resolve_group(&self, target: NodeHandle) -> NodeHandle {
        match self.entity(target) {
            Some(entity) if entity.is_group() => target,
            Some(_) => self.parent(target).unwrap_or(self.root),
            None => self.root,
        }
    }

    fn notify(&mut self, kind: ChangeKind, node: NodeHandle) {
        self.revision += 1;
        let change = HierarchyChange {
            kind,
            node,
            revision: self.revision,
        };
        debug!(?kind, node = %node.0, revision = self.revision, "hierarchy changed");
        self.events.emit(&change);
    }

    fn node(&self, handle: NodeHandle) -> Option<&Node> {
        self.slots
            .get(handle.index() as usize)
            .filter(|slot| slot.generation == handle.0.generation())
            .and_then(|slot| slot.node.as_ref())
    }

    fn node_mut(&mut self, handle: NodeHandle) -> Option<&mut Node> {
        self.slots
            .get_mut(handle.index() as usize)
            .filter(|slot| slot.generation == handle.0.generation())
            .and_then(|slot| slot.node.as_mut())
    }

    fn alloc(&mut self, entity: LayerEntity, parent: Option<NodeHandle>) -> NodeHandle {
        self.len += 1;
        let node = Node { entity, parent };
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.node = Some(node);
            return NodeHandle(Handle::new(index, slot.generation));
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            node: Some(node),
        });
        NodeHandle(Handle::new(index, 0))
    }

    fn release(&mut self, handle: NodeHandle) -> Option<Node> {
        let slot = self
            .slots
            .get_mut(handle.index() as usize)
            .filter(|slot| slot.generation == handle.0.generation())?;
        let node = slot.node.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index());
        self.len -= 1;
        Some(node)
    }

    fn release_subtree(&mut self, handle: NodeHandle) -> Option<DetachedLayer> {
        let mut node = self.release(handle)?;
        let children = node
            .entity
            .children_mut()
            .map(std::mem::take)
            .unwrap_or_default();
        let children = children
            .into_iter()
            .filter_map(|child| self.release_subtree(child))
            .collect();
        Some(DetachedLayer {
            entity: node.entity,
            children,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{ChangeKind, Hierarchy, MoveError};
    use crate::layer::{LayerAttributes, LayerEntity, LeafLayer};
    use crate::raster::{ImageFormat, RenderingParams, RenderingSource, WmsVersion};
    use foundation::ids::LayerId;
    use std::sync::{Arc, Mutex};

    fn leaf(title: &str) -> LayerEntity {
        LayerEntity::leaf(title, LeafLayer::default())
    }

    #[test]
    fn insert_sets_parent_id_from_group() {
        let mut h = Hierarchy::default();
        let root = h.root();
        let group = h.insert(root, LayerEntity::group("A").with_id(1));
        let x = h.insert(group, leaf("X"));

        assert_eq!(h.len(), 3);
        assert_eq!(h.parent(x), Some(group));
        assert_eq!(h.entity(x).unwrap().parent_id, Some(LayerId::from(1)));
        assert_eq!(h.entity(group).unwrap().parent_id, None);
    }

    #[test]
    fn insert_under_leaf_degrades_to_its_group() {
        let mut h = Hierarchy::default();
        let group = h.insert(h.root(), LayerEntity::group("A"));
        let x = h.insert(group, leaf("X"));
        let y = h.insert(x, leaf("Y"));

        assert_eq!(h.parent(y), Some(group));
        assert_eq!(h.children(group), &[x, y]);
    }

    #[test]
    fn removed_handles_never_resolve_again() {
        let mut h = Hierarchy::default();
        let group = h.insert(h.root(), LayerEntity::group("A"));
        let x = h.insert(group, leaf("X"));

        let detached = h.remove(group).expect("removed");
        assert_eq!(detached.layer.len(), 2);
        assert_eq!(detached.index, 0);
        assert!(!h.contains(group));
        assert!(!h.contains(x));
        assert_eq!(h.len(), 1);

        // Slot reuse must not revive the old handle.
        let z = h.insert(h.root(), leaf("Z"));
        assert!(h.contains(z));
        assert!(!h.contains(x));
        assert!(!h.contains(group));
    }

    #[test]
    fn root_cannot_be_removed_or_moved() {
        let mut h = Hierarchy::default();
        let root = h.root();
        assert!(h.remove(root).is_none());
        assert_eq!(h.move_node(root, root, 0), Err(MoveError::MoveRoot));
    }

    #[test]
    fn restore_puts_subtree_back_in_place() {
        let mut h = Hierarchy::default();
        let root = h.root();
        let a = h.insert(root, leaf("a"));
        let b = h.insert(root, LayerEntity::group("b"));
        h.insert(b, leaf("b1"));
        let c = h.insert(root, leaf("c"));

        let detached = h.remove(b).expect("removed");
        assert_eq!(h.children(root), &[a, c]);

        let restored = h.restore(detached);
        assert_eq!(h.children(root), &[a, restored, c]);
        assert_eq!(h.children(restored).len(), 1);
        assert_eq!(h.entity(restored).unwrap().title, "b");
    }

    #[test]
    fn move_rejects_cycles_and_leaf_targets() {
        let mut h = Hierarchy::default();
        let a = h.insert(h.root(), LayerEntity::group("A"));
        let b = h.insert(a, LayerEntity::group("B"));
        let x = h.insert(b, leaf("X"));

        assert_eq!(h.move_node(a, b, 0), Err(MoveError::IntoOwnSubtree));
        assert_eq!(h.move_node(a, a, 0), Err(MoveError::IntoOwnSubtree));
        assert_eq!(h.move_node(b, x, 0), Err(MoveError::TargetIsLeaf));
    }

    #[test]
    fn move_reparents_and_rewrites_parent_id() {
        let mut h = Hierarchy::default();
        let root = h.root();
        let a = h.insert(root, LayerEntity::group("A").with_id("a"));
        let b = h.insert(root, LayerEntity::group("B").with_id("b"));
        let x = h.insert(a, leaf("X"));

        h.move_node(x, b, 0).expect("move");
        assert!(h.children(a).is_empty());
        assert_eq!(h.children(b), &[x]);
        assert_eq!(h.parent(x), Some(b));
        assert_eq!(h.entity(x).unwrap().parent_id, Some(LayerId::from("b")));

        h.move_node(b, root, 0).expect("reorder");
        assert_eq!(h.children(root), &[b, a]);
    }

    #[test]
    fn listeners_observe_each_mutation() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut h = Hierarchy::default();
        let sink = Arc::clone(&seen);
        let sub = h.subscribe(move |change| sink.lock().unwrap().push(change.kind));

        let x = h.insert(h.root(), leaf("X"));
        h.set_visible(x, false);
        h.set_visible(x, false);
        h.assign_layer_id(x, LayerId::from(7));
        h.remove(x);

        assert!(h.unsubscribe(sub));
        h.insert(h.root(), leaf("Y"));

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                ChangeKind::Inserted,
                ChangeKind::Visibility,
                ChangeKind::Identified,
                ChangeKind::Removed,
            ]
        );
        assert_eq!(h.revision(), 5);
    }

    #[test]
    fn assign_layer_id_updates_children() {
        let mut h = Hierarchy::default();
        let g = h.insert(h.root(), LayerEntity::group("G"));
        let x = h.insert(g, leaf("X"));
        assert_eq!(h.entity(x).unwrap().parent_id, None);

        h.assign_layer_id(g, LayerId::from(30));
        assert_eq!(h.entity(x).unwrap().parent_id, Some(LayerId::from(30)));
    }

    #[test]
    fn editing_rendering_layer_resets_source() {
        let mut h = Hierarchy::default();
        let x = h.insert(
            h.root(),
            LayerAttributes::new("X").with_rendering_layer(1).to_entity(),
        );
        assert!(h.apply_rendering_params(
            x,
            RenderingParams {
                url: "https://x/wms".into(),
                layer_name: "x".into(),
                version: WmsVersion::V1_3_0,
                format: ImageFormat::Png,
                server_type: None,
            }
        ));
        assert!(h.entity(x).unwrap().as_leaf().unwrap().source.is_resolved());

        let kinds = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&kinds);
        h.subscribe(move |c| sink.lock().unwrap().push(c.kind));

        h.update_attributes(x, &LayerAttributes::new("X2").with_rendering_layer(1));
        h.update_attributes(x, &LayerAttributes::new("X3").with_rendering_layer(2));

        let leaf = h.entity(x).unwrap().as_leaf().unwrap();
        assert!(leaf.needs_hydration());
        assert_eq!(
            *kinds.lock().unwrap(),
            vec![ChangeKind::Attributes, ChangeKind::SourceReset]
        );
    }

    #[test]
    fn rendering_params_only_apply_to_leaves() {
        let mut h = Hierarchy::default();
        let g = h.insert(h.root(), LayerEntity::group("G"));
        let params = RenderingParams {
            url: "u".into(),
            layer_name: "l".into(),
            version: WmsVersion::V1_3_0,
            format: ImageFormat::Png,
            server_type: None,
        };
        assert!(!h.apply_rendering_params(g, params));
    }

    #[test]
    fn check_move_leaves_hierarchy_untouched() {
        let mut h = Hierarchy::default();
        let a = h.insert(h.root(), LayerEntity::group("A"));
        let x = h.insert(a, leaf("X"));
        let before = h.revision();

        assert_eq!(h.check_move(x, h.root()), Ok(a));
        assert_eq!(h.check_move(h.root(), a), Err(MoveError::MoveRoot));
        assert_eq!(h.revision(), before);
        assert_eq!(h.parent(x), Some(a));
    }

    #[test]
    fn replace_source_reports_reset_or_hydration() {
        let mut h = Hierarchy::default();
        let x = h.insert(
            h.root(),
            LayerAttributes::new("X").with_rendering_layer(1).to_entity(),
        );
        let kinds = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&kinds);
        h.subscribe(move |c| sink.lock().unwrap().push(c.kind));

        let resolved = RenderingSource::from_params(RenderingParams {
            url: "https://x/wms".into(),
            layer_name: "x".into(),
            version: WmsVersion::V1_1_1,
            format: ImageFormat::Jpeg,
            server_type: None,
        });
        assert!(h.replace_source(x, resolved.clone()));
        assert_eq!(h.entity(x).unwrap().as_leaf().unwrap().source, resolved);
        assert!(h.replace_source(x, RenderingSource::unresolved()));
        assert!(!h.replace_source(h.root(), RenderingSource::unresolved()));

        assert_eq!(
            *kinds.lock().unwrap(),
            vec![ChangeKind::Hydrated, ChangeKind::SourceReset]
        );
    }
}
