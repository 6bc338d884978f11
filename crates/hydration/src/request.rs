use foundation::ids::LayerId;
use layers::hierarchy::Hierarchy;
use layers::layer::NodeHandle;
use layers::walker;
use runtime::generation::Generation;

/// One fetch to perform: which leaf, what to look up, and the generation
/// the fetch was started under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HydrationRequest {
    pub node: NodeHandle,
    pub rendering_layer: LayerId,
    pub generation: Generation,
}

/// Leaves that reference a rendering layer but have no resolved source URL,
/// in hierarchy pre-order.
pub fn scan(hierarchy: &Hierarchy, generation: Generation) -> Vec<HydrationRequest> {
    walker::flatten(hierarchy, hierarchy.root())
        .into_iter()
        .filter_map(|node| {
            let leaf = hierarchy.entity(node)?.as_leaf()?;
            if !leaf.needs_hydration() {
                return None;
            }
            Some(HydrationRequest {
                node,
                rendering_layer: leaf.rendering_layer.clone()?,
                generation,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::scan;
    use foundation::ids::LayerId;
    use layers::layer::{LayerAttributes, LayerEntity, LeafLayer};
    use layers::hierarchy::Hierarchy;
    use runtime::generation::Generation;

    #[test]
    fn scan_selects_unresolved_leaves_with_reference() {
        let mut h = Hierarchy::default();
        let g = h.insert(h.root(), LayerEntity::group("g"));
        let a = h.insert(g, LayerAttributes::new("a").with_rendering_layer(1).to_entity());
        h.insert(g, LayerEntity::leaf("no-ref", LeafLayer::default()));
        let b = h.insert(h.root(), LayerAttributes::new("b").with_rendering_layer(2).to_entity());

        let got = scan(&h, Generation(3));
        assert_eq!(got.len(), 2);
        assert_eq!(got[0].node, a);
        assert_eq!(got[0].rendering_layer, LayerId::from(1));
        assert_eq!(got[1].node, b);
        assert!(got.iter().all(|r| r.generation == Generation(3)));
    }
}
