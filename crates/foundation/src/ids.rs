use std::sync::atomic::{AtomicU64, Ordering};

/// Identifier assigned by the backing store to a persisted layer or group.
///
/// The store hands out both numeric and string ids; they are compared by
/// their string form so `LayerId::from(12)` equals `LayerId::from("12")`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LayerId(String);

impl LayerId {
    pub fn new(id: impl Into<String>) -> Self {
        LayerId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for LayerId {
    fn from(value: &str) -> Self {
        LayerId::new(value)
    }
}

impl From<String> for LayerId {
    fn from(value: String) -> Self {
        LayerId(value)
    }
}

impl From<u64> for LayerId {
    fn from(value: u64) -> Self {
        LayerId(value.to_string())
    }
}

impl std::fmt::Display for LayerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Process-unique identity of one layer hierarchy.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HierarchyId(u64);

static NEXT_HIERARCHY_ID: AtomicU64 = AtomicU64::new(1);

impl HierarchyId {
    pub fn next() -> Self {
        HierarchyId(NEXT_HIERARCHY_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}
