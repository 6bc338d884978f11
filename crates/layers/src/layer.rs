use std::collections::BTreeMap;

use foundation::bounds::Aabb2;
use foundation::handles::Handle;
use foundation::ids::LayerId;
use serde_json::{Value, json};

use crate::raster::RenderingSource;
use crate::symbology::LayerStyle;

/// Per-instance handle of an entity inside a [`crate::Hierarchy`].
///
/// Assigned when the entity enters the hierarchy and independent of the
/// persisted [`LayerId`], which groups often do not have before first save.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeHandle(pub Handle);

impl NodeHandle {
    pub fn index(&self) -> u32 {
        self.0.index()
    }

    /// Key used for entities that have no persisted id yet: `~<index>.<generation>`.
    pub fn local_key(&self) -> String {
        format!("~{}", self.0)
    }

    pub fn parse_local_key(key: &str) -> Option<Self> {
        let rest = key.strip_prefix('~')?;
        let (index, generation) = rest.split_once('.')?;
        Some(NodeHandle(Handle::new(
            index.parse().ok()?,
            generation.parse().ok()?,
        )))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LayerGroup {
    pub(crate) children: Vec<NodeHandle>,
}

impl LayerGroup {
    pub fn children(&self) -> &[NodeHandle] {
        &self.children
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LeafLayer {
    pub source: RenderingSource,
    pub style: LayerStyle,
    /// Persisted rendering layer this leaf draws; used to hydrate `source`.
    pub rendering_layer: Option<LayerId>,
}

impl LeafLayer {
    /// True when the source is unresolved but can be looked up.
    pub fn needs_hydration(&self) -> bool {
        !self.source.is_resolved() && self.rendering_layer.is_some()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LayerKind {
    Group(LayerGroup),
    Leaf(LeafLayer),
}

/// A node of the rendering hierarchy.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerEntity {
    pub layer_id: Option<LayerId>,
    pub title: String,
    pub name: Option<String>,
    pub visible: bool,
    pub parent_id: Option<LayerId>,
    pub extent: Option<Aabb2>,
    pub properties: BTreeMap<String, String>,
    pub(crate) kind: LayerKind,
}

impl LayerEntity {
    pub fn group(title: impl Into<String>) -> Self {
        Self::with_kind(title, LayerKind::Group(LayerGroup::default()))
    }

    pub fn leaf(title: impl Into<String>, leaf: LeafLayer) -> Self {
        Self::with_kind(title, LayerKind::Leaf(leaf))
    }

    fn with_kind(title: impl Into<String>, kind: LayerKind) -> Self {
        Self {
            layer_id: None,
            title: title.into(),
            name: None,
            visible: true,
            parent_id: None,
            extent: None,
            properties: BTreeMap::new(),
            kind,
        }
    }

    pub fn with_id(mut self, id: impl Into<LayerId>) -> Self {
        self.layer_id = Some(id.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_visible(mut self, visible: bool) -> Self {
        self.visible = visible;
        self
    }

    pub fn kind(&self) -> &LayerKind {
        &self.kind
    }

    pub fn is_group(&self) -> bool {
        matches!(self.kind, LayerKind::Group(_))
    }

    pub fn as_leaf(&self) -> Option<&LeafLayer> {
        match &self.kind {
            LayerKind::Leaf(leaf) => Some(leaf),
            LayerKind::Group(_) => None,
        }
    }

    pub(crate) fn as_leaf_mut(&mut self) -> Option<&mut LeafLayer> {
        match &mut self.kind {
            LayerKind::Leaf(leaf) => Some(leaf),
            LayerKind::Group(_) => None,
        }
    }

    pub fn children(&self) -> &[NodeHandle] {
        match &self.kind {
            LayerKind::Group(group) => group.children(),
            LayerKind::Leaf(_) => &[],
        }
    }

    pub(crate) fn children_mut(&mut self) -> Option<&mut Vec<NodeHandle>> {
        match &mut self.kind {
            LayerKind::Group(group) => Some(&mut group.children),
            LayerKind::Leaf(_) => None,
        }
    }

    /// Opaque attribute map handed to the presentation layer.
    ///
    /// Free-form `properties` are merged last and never override the typed
    /// attributes.
    pub fn attributes(&self) -> BTreeMap<String, Value> {
        let mut out: BTreeMap<String, Value> = self
            .properties
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();

        out.insert("title".into(), json!(self.title));
        out.insert("visible".into(), json!(self.visible));
        out.insert("isGroup".into(), json!(self.is_group()));
        if let Some(id) = &self.layer_id {
            out.insert("layerId".into(), json!(id.as_str()));
        }
        if let Some(name) = &self.name {
            out.insert("name".into(), json!(name));
        }
        if let Some(parent) = &self.parent_id {
            out.insert("parent".into(), json!(parent.as_str()));
        }
        if let Some(extent) = self.extent {
            out.insert("extent".into(), json!(extent.to_array()));
        }

        if let LayerKind::Leaf(leaf) = &self.kind {
            if let Some(rendering_layer) = &leaf.rendering_layer {
                out.insert("renderingLayer".into(), json!(rendering_layer.as_str()));
            }
            if let Some(url) = &leaf.source.url {
                out.insert("url".into(), json!(url));
            }
            if let Some(layers) = &leaf.source.layer_name {
                out.insert("layers".into(), json!(layers));
            }
            out.insert("version".into(), json!(leaf.source.version.as_str()));
            out.insert("format".into(), json!(leaf.source.format.as_str()));
            if let Some(server_type) = leaf.source.server_type {
                out.insert("serverType".into(), json!(server_type.as_str()));
            }
            if let Some(style) = &leaf.style.style {
                out.insert("style".into(), json!(style));
            }
            if let Some(min) = leaf.style.scale_min {
                out.insert("scaleMin".into(), json!(min));
            }
            if let Some(max) = leaf.style.scale_max {
                out.insert("scaleMax".into(), json!(max));
            }
            if let Some(legend) = &leaf.style.legend_url {
                out.insert("legendUrl".into(), json!(legend));
            }
        }

        out
    }
}

/// Editable attributes of a node, as produced by the node attribute form.
///
/// A node added with a rendering layer becomes a leaf; without one it becomes
/// a group (folder).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LayerAttributes {
    pub title: String,
    pub name: Option<String>,
    pub rendering_layer: Option<LayerId>,
    pub style: LayerStyle,
    pub properties: BTreeMap<String, String>,
}

impl LayerAttributes {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn with_rendering_layer(mut self, id: impl Into<LayerId>) -> Self {
        self.rendering_layer = Some(id.into());
        self
    }

    pub fn is_group(&self) -> bool {
        self.rendering_layer.is_none()
    }

    pub fn to_entity(&self) -> LayerEntity {
        let mut entity = if self.is_group() {
            LayerEntity::group(self.title.clone())
        } else {
            LayerEntity::leaf(
                self.title.clone(),
                LeafLayer {
                    source: RenderingSource::unresolved(),
                    style: self.style.clone(),
                    rendering_layer: self.rendering_layer.clone(),
                },
            )
        };
        entity.name = self.name.clone();
        entity.properties = self.properties.clone();
        entity
    }

    pub fn from_entity(entity: &LayerEntity) -> Self {
        let (rendering_layer, style) = match entity.as_leaf() {
            Some(leaf) => (leaf.rendering_layer.clone(), leaf.style.clone()),
            None => (None, LayerStyle::default()),
        };
        Self {
            title: entity.title.clone(),
            name: entity.name.clone(),
            rendering_layer,
            style,
            properties: entity.properties.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{LayerAttributes, LayerEntity, LeafLayer, NodeHandle};
    use crate::raster::{RenderingParams, RenderingSource, ServerType, WmsVersion, ImageFormat};
    use foundation::handles::Handle;
    use foundation::ids::LayerId;
    use serde_json::json;

    #[test]
    fn local_keys_round_trip_through_parse() {
        let h = NodeHandle(Handle::new(4, 1));
        assert_eq!(h.local_key(), "~4.1");
        assert_eq!(NodeHandle::parse_local_key("~4.1"), Some(h));
        assert_eq!(NodeHandle::parse_local_key("4.1"), None);
        assert_eq!(NodeHandle::parse_local_key("~x.1"), None);
    }

    #[test]
    fn needs_hydration_requires_reference_and_missing_url() {
        let mut leaf = LeafLayer::default();
        assert!(!leaf.needs_hydration());

        leaf.rendering_layer = Some(LayerId::from(9));
        assert!(leaf.needs_hydration());

        leaf.source = RenderingSource::from_params(RenderingParams {
            url: "https://x/wms".into(),
            layer_name: "a".into(),
            version: WmsVersion::V1_3_0,
            format: ImageFormat::Png,
            server_type: Some(ServerType::Mapserver),
        });
        assert!(!leaf.needs_hydration());
    }

    #[test]
    fn attributes_expose_typed_fields_over_free_form_ones() {
        let mut entity = LayerEntity::leaf(
            "Roads",
            LeafLayer {
                rendering_layer: Some(LayerId::from(3)),
                ..LeafLayer::default()
            },
        )
        .with_id(12)
        .with_name("roads");
        entity
            .properties
            .insert("title".into(), "shadowed".into());
        entity.properties.insert("owner".into(), "gis".into());

        let attrs = entity.attributes();
        assert_eq!(attrs["title"], json!("Roads"));
        assert_eq!(attrs["layerId"], json!("12"));
        assert_eq!(attrs["renderingLayer"], json!("3"));
        assert_eq!(attrs["owner"], json!("gis"));
        assert_eq!(attrs["isGroup"], json!(false));
        assert!(!attrs.contains_key("url"));
    }

    #[test]
    fn attributes_decide_group_or_leaf() {
        let folder = LayerAttributes::new("Folder").to_entity();
        assert!(folder.is_group());

        let leaf = LayerAttributes::new("Layer")
            .with_rendering_layer(5)
            .to_entity();
        assert!(!leaf.is_group());
        assert!(leaf.as_leaf().is_some_and(|l| l.needs_hydration()));

        let back = LayerAttributes::from_entity(&leaf);
        assert_eq!(back.rendering_layer, Some(LayerId::from(5)));
    }
}
