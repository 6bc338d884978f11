use layers::hierarchy::DEFAULT_ROOT_NAME;
use serde::{Deserialize, Serialize};

/// Mount-time options of a [`crate::LayerTree`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LayerTreeOptions {
    /// Wait for each dispatch callback before touching the hierarchy.
    pub async_tree: bool,
    /// Name of the root group created when no hierarchy is supplied.
    pub root_name: String,
}

impl Default for LayerTreeOptions {
    fn default() -> Self {
        Self {
            async_tree: false,
            root_name: DEFAULT_ROOT_NAME.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::LayerTreeOptions;

    #[test]
    fn missing_fields_take_defaults() {
        let opts: LayerTreeOptions = serde_json::from_str(r#"{"asyncTree": true}"#).unwrap();
        assert!(opts.async_tree);
        assert_eq!(opts.root_name, "layer-tree-root");

        let opts: LayerTreeOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(opts, LayerTreeOptions::default());
    }
}
