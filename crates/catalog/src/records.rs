//! Persisted map-context layer records and the loader that turns them into a
//! layer hierarchy.
//!
//! Records are nested-set (MPTT) rows: within one `tree_id`, sorting by `lft`
//! yields a pre-order walk, so every parent is seen before its children.

use std::collections::BTreeMap;

use foundation::ids::LayerId;
use layers::hierarchy::Hierarchy;
use layers::layer::{LayerEntity, LeafLayer, NodeHandle};
use layers::raster::RenderingSource;
use layers::symbology::LayerStyle;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, warn};

use crate::CatalogError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceIdentifier {
    #[serde(rename = "type")]
    pub kind: String,
    pub id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    #[serde(default)]
    pub data: Option<ResourceIdentifier>,
}

impl Relationship {
    pub fn id(&self) -> Option<LayerId> {
        self.data.as_ref().map(|d| LayerId::new(d.id.clone()))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MapContextLayerAttributes {
    #[serde(default)]
    pub name: Option<String>,
    pub title: String,
    #[serde(default, deserialize_with = "de_opt_scale")]
    pub layer_scale_min: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_scale")]
    pub layer_scale_max: Option<f64>,
    #[serde(default)]
    pub preview_image: Option<String>,
    #[serde(default)]
    pub lft: u32,
    #[serde(default)]
    pub rght: u32,
    #[serde(default)]
    pub tree_id: u32,
    #[serde(default)]
    pub level: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapContextLayerRelationships {
    #[serde(default)]
    pub parent: Relationship,
    #[serde(default)]
    pub map_context: Relationship,
    #[serde(default)]
    pub dataset_metadata: Relationship,
    #[serde(default)]
    pub rendering_layer: Relationship,
    #[serde(default)]
    pub layer_style: Relationship,
    #[serde(default)]
    pub selection_layer: Relationship,
}

/// One node of a persisted map context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapContextLayerRecord {
    #[serde(rename = "type", default)]
    pub kind: String,
    pub id: String,
    pub attributes: MapContextLayerAttributes,
    #[serde(default)]
    pub relationships: MapContextLayerRelationships,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapContextDocument {
    pub data: Vec<MapContextLayerRecord>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawScale {
    Number(f64),
    Text(String),
}

// The API serializes decimals as strings; accept both spellings.
fn de_opt_scale<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<RawScale>::deserialize(deserializer)? {
        Some(RawScale::Number(n)) => Some(n),
        Some(RawScale::Text(s)) => s.trim().parse().ok(),
        None => None,
    })
}

impl MapContextLayerRecord {
    pub fn layer_id(&self) -> LayerId {
        LayerId::new(self.id.clone())
    }

    /// Nested-set rows with `rght - lft > 1` have descendants.
    pub fn has_children(&self) -> bool {
        self.attributes.rght > self.attributes.lft + 1
    }

    /// Folders are records with children or without anything to render.
    pub fn is_group(&self) -> bool {
        self.has_children() || self.relationships.rendering_layer.data.is_none()
    }

    pub fn to_entity(&self) -> LayerEntity {
        let mut entity = if self.is_group() {
            LayerEntity::group(self.attributes.title.clone())
        } else {
            LayerEntity::leaf(
                self.attributes.title.clone(),
                LeafLayer {
                    source: RenderingSource::unresolved(),
                    style: LayerStyle::new(
                        self.relationships.layer_style.id().map(|id| id.to_string()),
                        self.attributes.layer_scale_min,
                        self.attributes.layer_scale_max,
                    ),
                    rendering_layer: self.relationships.rendering_layer.id(),
                },
            )
        };
        entity.layer_id = Some(self.layer_id());
        entity.name = self.attributes.name.clone();
        if let Some(preview) = &self.attributes.preview_image {
            entity
                .properties
                .insert("previewImage".to_string(), preview.clone());
        }
        if let Some(map_context) = self.relationships.map_context.id() {
            entity
                .properties
                .insert("mapContext".to_string(), map_context.to_string());
        }
        if let Some(dataset) = self.relationships.dataset_metadata.id() {
            entity
                .properties
                .insert("datasetMetadata".to_string(), dataset.to_string());
        }
        entity
    }
}

/// Parses either a JSON:API document (`{"data": [...]}`) or a bare array.
pub fn parse_records(raw: &str) -> Result<Vec<MapContextLayerRecord>, CatalogError> {
    if let Ok(doc) = serde_json::from_str::<MapContextDocument>(raw) {
        return Ok(doc.data);
    }
    serde_json::from_str(raw).map_err(|e| CatalogError::Corrupt(e.to_string()))
}

/// Builds a hierarchy from persisted records.
///
/// Records are placed in nested-set order; a record whose parent is unknown
/// (or not yet placed) is attached to the root. Leaves start unresolved and
/// are hydrated later.
pub fn load_hierarchy(records: &[MapContextLayerRecord], root_name: &str) -> Hierarchy {
    let mut ordered: Vec<&MapContextLayerRecord> = records.iter().collect();
    ordered.sort_by(|a, b| {
        (a.attributes.tree_id, a.attributes.lft)
            .cmp(&(b.attributes.tree_id, b.attributes.lft))
            .then_with(|| a.id.cmp(&b.id))
    });

    let mut hierarchy = Hierarchy::new(root_name);
    let root = hierarchy.root();
    let mut placed: BTreeMap<LayerId, NodeHandle> = BTreeMap::new();

    for record in ordered {
        let parent = match record.relationships.parent.id() {
            Some(parent_id) => match placed.get(&parent_id) {
                Some(handle) => *handle,
                None => {
                    warn!(record = %record.id, parent = %parent_id, "parent record not found, attaching to root");
                    root
                }
            },
            None => root,
        };
        let handle = hierarchy.insert(parent, record.to_entity());
        placed.insert(record.layer_id(), handle);
    }

    debug!(records = records.len(), entities = hierarchy.len(), "hierarchy loaded");
    hierarchy
}

#[cfg(test)]
mod tests {
    use super::{MapContextLayerRecord, load_hierarchy, parse_records};
    use foundation::ids::LayerId;
    use layers::walker::flatten;
    use pretty_assertions::assert_eq;

    const DOC: &str = r#"{
        "data": [
            {
                "type": "MapContextLayer", "id": "12",
                "attributes": {"title": "Roads", "lft": 3, "rght": 4, "tree_id": 1, "level": 2,
                               "layer_scale_min": "1000", "layer_scale_max": 50000},
                "relationships": {
                    "parent": {"data": {"type": "MapContextLayer", "id": "11"}},
                    "rendering_layer": {"data": {"type": "Layer", "id": "55"}},
                    "layer_style": {"data": {"type": "Style", "id": "s1"}}
                }
            },
            {
                "type": "MapContextLayer", "id": "10",
                "attributes": {"title": "Context root", "name": "root", "lft": 1, "rght": 8, "tree_id": 1, "level": 0},
                "relationships": {"parent": {"data": null}, "map_context": {"data": {"type": "MapContext", "id": "3"}}}
            },
            {
                "type": "MapContextLayer", "id": "11",
                "attributes": {"title": "Transport", "lft": 2, "rght": 5, "tree_id": 1, "level": 1},
                "relationships": {"parent": {"data": {"type": "MapContextLayer", "id": "10"}}}
            },
            {
                "type": "MapContextLayer", "id": "13",
                "attributes": {"title": "Rivers", "lft": 6, "rght": 7, "tree_id": 1, "level": 1},
                "relationships": {
                    "parent": {"data": {"type": "MapContextLayer", "id": "10"}},
                    "rendering_layer": {"data": {"type": "Layer", "id": "56"}}
                }
            }
        ]
    }"#;

    #[test]
    fn parses_document_and_bare_array() {
        let records = parse_records(DOC).expect("records");
        assert_eq!(records.len(), 4);

        let bare = serde_json::to_string(&records).unwrap();
        let again = parse_records(&bare).expect("bare array");
        assert_eq!(again, records);

        assert!(parse_records("[{]").is_err());
    }

    #[test]
    fn builds_hierarchy_in_nested_set_order() {
        let records = parse_records(DOC).expect("records");
        let h = load_hierarchy(&records, "layer-tree-root");

        let titles: Vec<String> = flatten(&h, h.root())
            .into_iter()
            .map(|n| h.entity(n).unwrap().title.clone())
            .collect();
        assert_eq!(
            titles,
            vec!["layer-tree-root", "Context root", "Transport", "Roads", "Rivers"]
        );

        let nodes = flatten(&h, h.root());
        let roads = h.entity(nodes[3]).unwrap();
        assert_eq!(roads.parent_id, Some(LayerId::from(11)));
        let leaf = roads.as_leaf().expect("leaf");
        assert_eq!(leaf.rendering_layer, Some(LayerId::from(55)));
        assert_eq!(leaf.style.scale_min, Some(1000.0));
        assert_eq!(leaf.style.scale_max, Some(50000.0));
        assert_eq!(leaf.style.style.as_deref(), Some("s1"));
        assert!(leaf.needs_hydration());

        let context_root = h.entity(nodes[1]).unwrap();
        assert!(context_root.is_group());
        assert_eq!(context_root.properties.get("mapContext").map(String::as_str), Some("3"));
    }

    #[test]
    fn orphan_records_attach_to_root() {
        let raw = r#"[{"id": "5", "attributes": {"title": "Orphan", "lft": 1, "rght": 2},
                       "relationships": {"parent": {"data": {"type": "MapContextLayer", "id": "404"}},
                                         "rendering_layer": {"data": {"type": "Layer", "id": "1"}}}}]"#;
        let records: Vec<MapContextLayerRecord> = serde_json::from_str(raw).unwrap();
        let h = load_hierarchy(&records, "root");
        let orphan = h.children(h.root())[0];
        assert_eq!(h.entity(orphan).unwrap().title, "Orphan");
        assert_eq!(h.entity(orphan).unwrap().parent_id, None);
    }
}
