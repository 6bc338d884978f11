use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use hydration::lookup::RenderingParamsLookup;
use hydration::pipeline::{HydrationOutcome, Hydrator};
use layers::hierarchy::{Hierarchy, HierarchyChange};
use layers::layer::{LayerAttributes, NodeHandle};
use layers::visibility::set_layer_visibility;
use layers::walker::{find_by_key, key_of};
use parking_lot::Mutex;
use runtime::event_bus::SubscriptionId;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::dispatch::NodeDispatch;
use crate::error::{HydrationFailure, TreeError};
use crate::gesture::{CheckEvent, DragInfo, DropPosition, SelectEvent};
use crate::node::{TreeNode, derive_tree_nodes, tree_node};
use crate::options::LayerTreeOptions;
use crate::surface::RenderingSurface;

/// Changes observed by the hierarchy subscription since the last refresh.
#[derive(Debug, Default, Clone, Copy)]
struct PendingChanges {
    dirty: bool,
    rescan: bool,
}

/// A mounted layer tree.
///
/// Owns the hierarchy while mounted, keeps it attached to the rendering
/// surface, derives the tree list from it and relays gestures. The tree list
/// is only ever rebuilt in response to change notifications from the
/// hierarchy; structural changes additionally start a hydration scan.
///
/// Dropping the tree performs the same cleanup as [`LayerTree::unmount`].
pub struct LayerTree<'s, S: RenderingSurface, D: NodeDispatch> {
    surface: &'s mut S,
    hierarchy: Hierarchy,
    options: LayerTreeOptions,
    dispatch: D,
    hydrator: Hydrator,
    tree: Vec<TreeNode>,
    pending: Arc<Mutex<PendingChanges>>,
    subscription: Option<SubscriptionId>,
    errors: Option<mpsc::UnboundedSender<HydrationFailure>>,
}

impl<'s, S: RenderingSurface, D: NodeDispatch> LayerTree<'s, S, D> {
    /// Attaches `hierarchy` (or a fresh one named after `options.root_name`)
    /// to `surface`, derives the tree list and starts hydrating.
    pub fn mount(
        surface: &'s mut S,
        hierarchy: Option<Hierarchy>,
        options: LayerTreeOptions,
        dispatch: D,
        lookup: Arc<dyn RenderingParamsLookup>,
    ) -> Self {
        let hierarchy = hierarchy.unwrap_or_else(|| Hierarchy::new(options.root_name.clone()));
        let mut tree = Self {
            surface,
            hierarchy,
            options,
            dispatch,
            hydrator: Hydrator::new(lookup),
            tree: Vec::new(),
            pending: Arc::default(),
            subscription: None,
            errors: None,
        };
        tree.attach();
        tree
    }

    pub fn tree_data(&self) -> &[TreeNode] {
        &self.tree
    }

    pub fn hierarchy(&self) -> &Hierarchy {
        &self.hierarchy
    }

    /// Mutable access to the hierarchy; the tree list is refreshed when the
    /// guard is dropped.
    ///
    /// If the tree's own change listener was unsubscribed through the guard,
    /// it is registered again on drop and the tree list is fully rebuilt.
    pub fn hierarchy_mut(&mut self) -> HierarchyMut<'_, 's, S, D> {
        HierarchyMut { tree: self }
    }

    pub fn options(&self) -> &LayerTreeOptions {
        &self.options
    }

    pub fn surface(&self) -> &S {
        &*self.surface
    }

    pub fn dispatch(&self) -> &D {
        &self.dispatch
    }

    pub fn hydrator(&self) -> &Hydrator {
        &self.hydrator
    }

    /// Channel receiving every hydration failure from now on. A previously
    /// returned receiver stops getting failures.
    pub fn hydration_errors(&mut self) -> mpsc::UnboundedReceiver<HydrationFailure> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.errors = Some(tx);
        rx
    }

    /// Applies a checkbox toggle through the visibility cascade.
    ///
    /// Returns `false` when the key does not resolve; that is not an error.
    pub fn on_check(&mut self, event: &CheckEvent) -> bool {
        let key = &event.info.node.key;
        let Ok(target) = self.resolve(key) else {
            debug!(%key, "check on unknown tree node ignored");
            return false;
        };
        let changed = set_layer_visibility(&mut self.hierarchy, target, event.info.checked);
        self.refresh();
        changed
    }

    pub fn on_select(&self, event: &SelectEvent) {
        self.dispatch.select_node(&event.selected_keys, &event.info);
    }

    /// Adds a node under `parent_key` (the root when `None`).
    ///
    /// A leaf parent resolves to its own group; an unknown key falls back to
    /// the root. An id returned by the dispatch callback becomes the node's
    /// persisted id.
    pub async fn add_node(
        &mut self,
        attributes: LayerAttributes,
        parent_key: Option<&str>,
    ) -> Result<NodeHandle, TreeError> {
        let root = self.hierarchy.root();
        let parent = parent_key
            .and_then(|key| {
                let found = find_by_key(&self.hierarchy, root, key);
                if found.is_none() {
                    debug!(%key, "unknown parent key, adding to root");
                }
                found
            })
            .unwrap_or(root);
        let group = match self.hierarchy.entity(parent) {
            Some(entity) if entity.is_group() => parent,
            _ => self.hierarchy.parent(parent).unwrap_or(root),
        };
        let parent_id = self.hierarchy.entity(group).and_then(|e| e.layer_id.clone());

        let handle = if self.options.async_tree {
            let assigned = self.dispatch.add_node(attributes.clone(), parent_id).await?;
            let mut entity = attributes.to_entity();
            entity.layer_id = assigned;
            self.hierarchy.insert(group, entity)
        } else {
            let handle = self.hierarchy.insert(group, attributes.to_entity());
            match self.dispatch.add_node(attributes, parent_id).await {
                Ok(Some(id)) => {
                    self.hierarchy.assign_layer_id(handle, id);
                }
                Ok(None) => {}
                Err(e) => {
                    self.hierarchy.remove(handle);
                    self.refresh();
                    return Err(e.into());
                }
            }
            handle
        };
        self.refresh();
        Ok(handle)
    }

    /// Removes a node together with its subtree.
    ///
    /// A failed dispatch in optimistic mode puts the subtree back in place;
    /// entities without a persisted id come back under new local keys.
    pub async fn remove_node(&mut self, key: &str) -> Result<(), TreeError> {
        let handle = self.resolve(key)?;
        let node = tree_node(&self.hierarchy, handle)
            .ok_or_else(|| TreeError::UnknownNode(key.to_string()))?;

        if self.options.async_tree {
            self.dispatch.remove_node(node).await?;
            self.hierarchy.remove(handle);
        } else {
            let detached = self.hierarchy.remove(handle);
            if let Err(e) = self.dispatch.remove_node(node).await {
                if let Some(detached) = detached {
                    self.hierarchy.restore(detached);
                }
                self.refresh();
                return Err(e.into());
            }
        }
        self.refresh();
        Ok(())
    }

    pub async fn edit_node(
        &mut self,
        key: &str,
        attributes: LayerAttributes,
    ) -> Result<(), TreeError> {
        let handle = self.resolve(key)?;
        let entity = self
            .hierarchy
            .entity(handle)
            .ok_or_else(|| TreeError::UnknownNode(key.to_string()))?;
        let previous = LayerAttributes::from_entity(entity);
        let previous_source = entity.as_leaf().map(|leaf| leaf.source.clone());
        let resets_source = previous.rendering_layer != attributes.rendering_layer;

        if self.options.async_tree {
            self.dispatch
                .edit_node(key.to_string(), attributes.clone())
                .await?;
            self.hierarchy.update_attributes(handle, &attributes);
        } else {
            self.hierarchy.update_attributes(handle, &attributes);
            if let Err(e) = self.dispatch.edit_node(key.to_string(), attributes).await {
                self.hierarchy.update_attributes(handle, &previous);
                if resets_source && let Some(source) = previous_source {
                    self.hierarchy.replace_source(handle, source);
                }
                self.refresh();
                return Err(e.into());
            }
        }
        self.refresh();
        Ok(())
    }

    /// Moves the dragged node next to, or into, the drop target.
    pub async fn drag_node(&mut self, info: DragInfo) -> Result<(), TreeError> {
        let dragged = self.resolve(&info.drag_key)?;
        let target = self.resolve(&info.drop_key)?;
        let (parent, index) = self.drop_location(dragged, target, &info)?;
        let old_parent = self.hierarchy.check_move(dragged, parent)?;
        let old_index = self.hierarchy.position_in_parent(dragged).unwrap_or(0);

        if self.options.async_tree {
            self.dispatch.drag_node(info).await?;
            self.hierarchy.move_node(dragged, parent, index)?;
        } else {
            self.hierarchy.move_node(dragged, parent, index)?;
            if let Err(e) = self.dispatch.drag_node(info).await {
                if let Err(revert) = self.hierarchy.move_node(dragged, old_parent, old_index) {
                    warn!(%revert, "could not move dragged node back");
                }
                self.refresh();
                return Err(e.into());
            }
        }
        self.refresh();
        Ok(())
    }

    /// Waits for the next hydration fetch to settle and applies it.
    ///
    /// Returns `None` when nothing is in flight.
    pub async fn next_hydration(&mut self) -> Option<HydrationOutcome> {
        let outcome = self.hydrator.hydrate_next(&mut self.hierarchy).await?;
        if let HydrationOutcome::Failed {
            node,
            rendering_layer,
            error,
        } = &outcome
        {
            self.report(HydrationFailure {
                node: *node,
                key: key_of(&self.hierarchy, *node),
                rendering_layer: rendering_layer.clone(),
                message: error.to_string(),
            });
        }
        self.refresh();
        Some(outcome)
    }

    /// Drives hydration until nothing is in flight.
    pub async fn hydrate_all(&mut self) -> Vec<HydrationOutcome> {
        let mut outcomes = Vec::new();
        while let Some(outcome) = self.next_hydration().await {
            outcomes.push(outcome);
        }
        outcomes
    }

    /// Unmounts the current hierarchy and mounts `hierarchy` in its place.
    ///
    /// Hydration results still pending for the old hierarchy are dropped.
    pub fn replace_hierarchy(&mut self, hierarchy: Hierarchy) -> Hierarchy {
        self.detach();
        let old = std::mem::replace(&mut self.hierarchy, hierarchy);
        self.attach();
        old
    }

    /// Detaches from the surface and hands the hierarchy back.
    pub fn unmount(mut self) -> Hierarchy {
        self.detach();
        std::mem::take(&mut self.hierarchy)
    }

    fn attach(&mut self) {
        self.surface.attach(self.hierarchy.id());
        self.subscribe();
        *self.pending.lock() = PendingChanges::default();
        self.tree = derive_tree_nodes(&self.hierarchy);
        let started = self.hydrator.scan_and_start(&self.hierarchy);
        debug!(
            hierarchy = self.hierarchy.id().get(),
            entities = self.hierarchy.len(),
            started,
            "layer tree mounted"
        );
    }

    fn subscribe(&mut self) {
        let pending = Arc::clone(&self.pending);
        self.subscription = Some(self.hierarchy.subscribe(move |change: &HierarchyChange| {
            let mut pending = pending.lock();
            pending.dirty = true;
            pending.rescan |= change.kind.needs_scan();
        }));
    }

    /// Re-registers the change listener if it was removed from outside.
    /// Changes made while it was missing went unseen, so everything is
    /// marked for rebuild.
    fn ensure_subscribed(&mut self) {
        let Some(id) = self.subscription else {
            return;
        };
        if self.hierarchy.is_subscribed(id) {
            return;
        }
        warn!(hierarchy = self.hierarchy.id().get(), "layer tree listener was removed, subscribing again");
        self.subscribe();
        *self.pending.lock() = PendingChanges {
            dirty: true,
            rescan: true,
        };
    }

    fn detach(&mut self) {
        let Some(subscription) = self.subscription.take() else {
            return;
        };
        self.hierarchy.unsubscribe(subscription);
        self.hydrator.cancel_all();
        self.surface.detach(self.hierarchy.id());
        debug!(hierarchy = self.hierarchy.id().get(), "layer tree unmounted");
    }

    fn refresh(&mut self) {
        let pending = std::mem::take(&mut *self.pending.lock());
        if pending.rescan {
            let started = self.hydrator.scan_and_start(&self.hierarchy);
            if started > 0 {
                debug!(started, "hydration rescan");
            }
        }
        if pending.dirty {
            self.tree = derive_tree_nodes(&self.hierarchy);
        }
    }

    fn report(&self, failure: HydrationFailure) {
        if let Some(tx) = &self.errors
            && tx.send(failure).is_err()
        {
            debug!("hydration error receiver dropped");
        }
    }

    /// Resolves a tree key. The root is not part of the tree list, so its key
    /// never resolves.
    fn resolve(&self, key: &str) -> Result<NodeHandle, TreeError> {
        let root = self.hierarchy.root();
        find_by_key(&self.hierarchy, root, key)
            .filter(|handle| *handle != root)
            .ok_or_else(|| TreeError::UnknownNode(key.to_string()))
    }

    /// Parent group and child index a drop lands on; the index addresses the
    /// child list with the dragged node taken out.
    fn drop_location(
        &self,
        dragged: NodeHandle,
        target: NodeHandle,
        info: &DragInfo,
    ) -> Result<(NodeHandle, usize), TreeError> {
        if info.position == DropPosition::Inside {
            return Ok((target, 0));
        }
        let parent = self
            .hierarchy
            .parent(target)
            .ok_or_else(|| TreeError::UnknownNode(info.drop_key.clone()))?;
        if dragged == target {
            return Ok((parent, self.hierarchy.position_in_parent(dragged).unwrap_or(0)));
        }
        let index = self
            .hierarchy
            .children(parent)
            .iter()
            .filter(|c| **c != dragged)
            .position(|c| *c == target)
            .unwrap_or(0);
        Ok(match info.position {
            DropPosition::After => (parent, index + 1),
            _ => (parent, index),
        })
    }
}

impl<S: RenderingSurface, D: NodeDispatch> Drop for LayerTree<'_, S, D> {
    fn drop(&mut self) {
        self.detach();
    }
}

/// Mutable hierarchy access handed out by [`LayerTree::hierarchy_mut`].
pub struct HierarchyMut<'a, 's, S: RenderingSurface, D: NodeDispatch> {
    tree: &'a mut LayerTree<'s, S, D>,
}

impl<S: RenderingSurface, D: NodeDispatch> Deref for HierarchyMut<'_, '_, S, D> {
    type Target = Hierarchy;

    fn deref(&self) -> &Hierarchy {
        &self.tree.hierarchy
    }
}

impl<S: RenderingSurface, D: NodeDispatch> DerefMut for HierarchyMut<'_, '_, S, D> {
    fn deref_mut(&mut self) -> &mut Hierarchy {
        &mut self.tree.hierarchy
    }
}

impl<S: RenderingSurface, D: NodeDispatch> Drop for HierarchyMut<'_, '_, S, D> {
    fn drop(&mut self) {
        self.tree.ensure_subscribed();
        self.tree.refresh();
    }
}
