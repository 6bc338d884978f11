use foundation::ids::LayerId;

use crate::hierarchy::Hierarchy;
use crate::layer::NodeHandle;
use crate::walker;

/// Applies a visibility toggle with the tree cascade rules.
///
/// - Group: the group and every descendant take `visible`, regardless of
///   their previous state.
/// - Leaf: only the leaf changes; making it visible also makes every
///   ancestor group visible. Hiding a leaf never hides its ancestors.
///
/// Returns `false` (and changes nothing) when `target` is not in the
/// hierarchy.
pub fn set_layer_visibility(hierarchy: &mut Hierarchy, target: NodeHandle, visible: bool) -> bool {
    let Some(entity) = hierarchy.entity(target) else {
        return false;
    };

    if entity.is_group() {
        hierarchy.set_visible(target, visible);
        for handle in walker::descendants(hierarchy, target) {
            hierarchy.set_visible(handle, visible);
        }
    } else {
        hierarchy.set_visible(target, visible);
        if visible {
            set_parent_groups_visible(hierarchy, target);
        }
    }
    true
}

pub fn set_visibility_by_id(hierarchy: &mut Hierarchy, id: &LayerId, visible: bool) -> bool {
    let root = hierarchy.root();
    match walker::find_by_id(hierarchy, root, id) {
        Some(target) => set_layer_visibility(hierarchy, target, visible),
        None => false,
    }
}

/// Makes every group containing `target` visible, up to and including the
/// root.
///
/// Each step searches from the root for the group whose immediate children
/// hold the current mark, then continues with that group as the new mark.
pub fn set_parent_groups_visible(hierarchy: &mut Hierarchy, target: NodeHandle) {
    let root = hierarchy.root();
    let mut mark = target;
    // The tree depth bounds the climb; the entity count bounds the depth.
    for _ in 0..hierarchy.len() {
        let Some(container) = find_container(hierarchy, root, mark) else {
            return;
        };
        hierarchy.set_visible(container, true);
        if container == root {
            return;
        }
        mark = container;
    }
}

fn find_container(hierarchy: &Hierarchy, group: NodeHandle, mark: NodeHandle) -> Option<NodeHandle> {
    let children = hierarchy.children(group);
    if children.contains(&mark) {
        return Some(group);
    }
    children
        .iter()
        .filter(|c| hierarchy.entity(**c).is_some_and(|e| e.is_group()))
        .find_map(|c| find_container(hierarchy, *c, mark))
}

#[cfg(test)]
mod tests {
    use super::{set_layer_visibility, set_visibility_by_id};
    use crate::hierarchy::Hierarchy;
    use crate::layer::{LayerEntity, LeafLayer, NodeHandle};
    use crate::walker::flatten;
    use foundation::ids::LayerId;

    fn visible(h: &Hierarchy, n: NodeHandle) -> bool {
        h.entity(n).expect("entity").visible
    }

    fn leaf(title: &str) -> LayerEntity {
        LayerEntity::leaf(title, LeafLayer::default())
    }

    #[test]
    fn scenario_leaf_then_group_toggle() {
        // R ⊃ A(visible) ⊃ { X(hidden), Y(visible) }
        let mut h = Hierarchy::default();
        let r = h.root();
        let a = h.insert(r, LayerEntity::group("A"));
        let x = h.insert(a, leaf("X").with_visible(false));
        let y = h.insert(a, leaf("Y"));

        assert!(set_layer_visibility(&mut h, x, true));
        assert!(visible(&h, x));
        assert!(visible(&h, a));
        assert!(visible(&h, r));
        assert_eq!(flatten(&h, r), vec![r, a, x, y]);

        assert!(set_layer_visibility(&mut h, a, false));
        assert!(!visible(&h, a));
        assert!(!visible(&h, x));
        assert!(!visible(&h, y));
        assert!(visible(&h, r));
    }

    #[test]
    fn downward_cascade_overrides_descendants() {
        let mut h = Hierarchy::default();
        let g = h.insert(h.root(), LayerEntity::group("G").with_visible(false));
        let inner = h.insert(g, LayerEntity::group("inner").with_visible(false));
        let a = h.insert(inner, leaf("a").with_visible(false));
        let b = h.insert(g, leaf("b"));

        set_layer_visibility(&mut h, g, true);
        for n in [g, inner, a, b] {
            assert!(visible(&h, n));
        }

        set_layer_visibility(&mut h, g, false);
        for n in [g, inner, a, b] {
            assert!(!visible(&h, n));
        }
    }

    #[test]
    fn upward_cascade_reaches_every_ancestor() {
        let mut h = Hierarchy::default();
        let r = h.root();
        h.set_visible(r, false);
        let g1 = h.insert(r, LayerEntity::group("g1").with_visible(false));
        let g2 = h.insert(g1, LayerEntity::group("g2").with_visible(false));
        let g3 = h.insert(g2, LayerEntity::group("g3").with_visible(false));
        let sibling = h.insert(g1, LayerEntity::group("sibling").with_visible(false));
        let l = h.insert(g3, leaf("l").with_visible(false));

        set_layer_visibility(&mut h, l, true);
        for n in [l, g3, g2, g1, r] {
            assert!(visible(&h, n));
        }
        assert!(!visible(&h, sibling));
    }

    #[test]
    fn hiding_leaf_keeps_ancestors() {
        let mut h = Hierarchy::default();
        let g = h.insert(h.root(), LayerEntity::group("g"));
        let l = h.insert(g, leaf("l"));

        set_layer_visibility(&mut h, l, false);
        assert!(!visible(&h, l));
        assert!(visible(&h, g));
        assert!(visible(&h, h.root()));
    }

    #[test]
    fn unknown_target_is_noop() {
        let mut h = Hierarchy::default();
        let l = h.insert(h.root(), leaf("l"));
        h.remove(l);
        let before = h.revision();

        assert!(!set_layer_visibility(&mut h, l, false));
        assert!(!set_visibility_by_id(&mut h, &LayerId::from(5), true));
        assert_eq!(h.revision(), before);
    }

    #[test]
    fn toggle_by_persisted_id() {
        let mut h = Hierarchy::default();
        let g = h.insert(h.root(), LayerEntity::group("g").with_visible(false));
        let l = h.insert(g, leaf("l").with_id(8).with_visible(false));

        assert!(set_visibility_by_id(&mut h, &LayerId::from("8"), true));
        assert!(visible(&h, l));
        assert!(visible(&h, g));
    }
}
