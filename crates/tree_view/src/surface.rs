use std::collections::BTreeSet;

use foundation::ids::HierarchyId;

/// Map-rendering surface a hierarchy is drawn on.
///
/// Both calls are idempotent.
pub trait RenderingSurface {
    fn attach(&mut self, hierarchy: HierarchyId);
    fn detach(&mut self, hierarchy: HierarchyId);
}

/// In-process surface that tracks which hierarchies are attached.
#[derive(Debug, Default, Clone)]
pub struct MapSurface {
    attached: BTreeSet<HierarchyId>,
    attaches: u64,
    detaches: u64,
}

impl MapSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_attached(&self, hierarchy: HierarchyId) -> bool {
        self.attached.contains(&hierarchy)
    }

    pub fn attached(&self) -> impl Iterator<Item = HierarchyId> + '_ {
        self.attached.iter().copied()
    }

    /// Number of attach calls that changed the surface.
    pub fn attaches(&self) -> u64 {
        self.attaches
    }

    pub fn detaches(&self) -> u64 {
        self.detaches
    }
}

impl RenderingSurface for MapSurface {
    fn attach(&mut self, hierarchy: HierarchyId) {
        if self.attached.insert(hierarchy) {
            self.attaches += 1;
        }
    }

    fn detach(&mut self, hierarchy: HierarchyId) {
        if self.attached.remove(&hierarchy) {
            self.detaches += 1;
        }
    }
}
