use std::collections::BTreeMap;

use foundation::bounds::Aabb2;
use foundation::ids::LayerId;
use serde::{Deserialize, Deserializer};

use crate::layer::{LayerEntity, LeafLayer};
use crate::raster::{ImageFormat, RenderingSource, ServerType, WmsVersion};
use crate::symbology::LayerStyle;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigKind {
    Group,
    #[default]
    Leaf,
}

/// Configuration record for creating a layer entity.
///
/// Nothing is validated here: a leaf without `url` is accepted and simply
/// stays unresolved until hydrated.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerConfig {
    #[serde(default)]
    pub kind: ConfigKind,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub version: WmsVersion,
    #[serde(default)]
    pub format: ImageFormat,
    #[serde(default)]
    pub layers: Option<String>,
    #[serde(default = "default_visible")]
    pub visible: bool,
    #[serde(default)]
    pub server_type: Option<ServerType>,
    #[serde(default, deserialize_with = "de_opt_layer_id")]
    pub layer_id: Option<LayerId>,
    #[serde(default, deserialize_with = "de_opt_layer_id")]
    pub rendering_layer: Option<LayerId>,
    #[serde(default)]
    pub legend_url: Option<String>,
    pub title: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub extent: Option<Vec<f64>>,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

fn default_visible() -> bool {
    true
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Number(u64),
    Text(String),
}

/// Accepts ids written either as JSON numbers or strings.
pub fn de_opt_layer_id<'de, D>(deserializer: D) -> Result<Option<LayerId>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<RawId>::deserialize(deserializer)?;
    Ok(raw.map(|r| match r {
        RawId::Number(n) => LayerId::from(n),
        RawId::Text(s) => LayerId::from(s),
    }))
}

impl LayerConfig {
    pub fn leaf(title: impl Into<String>) -> Self {
        Self {
            kind: ConfigKind::Leaf,
            url: None,
            version: WmsVersion::default(),
            format: ImageFormat::default(),
            layers: None,
            visible: true,
            server_type: None,
            layer_id: None,
            rendering_layer: None,
            legend_url: None,
            title: title.into(),
            name: None,
            extent: None,
            properties: BTreeMap::new(),
        }
    }

    pub fn group(title: impl Into<String>) -> Self {
        Self {
            kind: ConfigKind::Group,
            ..Self::leaf(title)
        }
    }
}

impl LayerEntity {
    pub fn from_config(config: LayerConfig) -> Self {
        let mut entity = match config.kind {
            ConfigKind::Group => LayerEntity::group(config.title),
            ConfigKind::Leaf => LayerEntity::leaf(
                config.title,
                LeafLayer {
                    source: RenderingSource {
                        url: config.url,
                        layer_name: config.layers,
                        version: config.version,
                        format: config.format,
                        server_type: config.server_type,
                        transparent: true,
                    },
                    style: LayerStyle {
                        legend_url: config.legend_url,
                        ..LayerStyle::default()
                    },
                    rendering_layer: config.rendering_layer,
                },
            ),
        };
        entity.layer_id = config.layer_id;
        entity.name = config.name;
        entity.visible = config.visible;
        entity.extent = config.extent.as_deref().and_then(Aabb2::from_slice);
        entity.properties = config.properties;
        entity
    }
}

#[cfg(test)]
mod tests {
    use super::{ConfigKind, LayerConfig};
    use crate::layer::LayerEntity;
    use crate::raster::{ServerType, WmsVersion};
    use foundation::ids::LayerId;

    #[test]
    fn leaf_config_builds_source() {
        let raw = r#"{
            "url": "https://maps.example.org/wms",
            "version": "1.1.1",
            "format": "image/jpeg",
            "layers": "roads",
            "serverType": "GEOSERVER",
            "layerId": 42,
            "legendUrl": "https://maps.example.org/legend.png",
            "title": "Roads",
            "extent": [5.0, 47.0, 15.0, 55.0],
            "properties": {"owner": "gis"}
        }"#;
        let config: LayerConfig = serde_json::from_str(raw).expect("json");
        assert_eq!(config.kind, ConfigKind::Leaf);
        assert!(config.visible);

        let entity = LayerEntity::from_config(config);
        assert_eq!(entity.layer_id, Some(LayerId::from(42)));
        let leaf = entity.as_leaf().expect("leaf");
        assert_eq!(leaf.source.version, WmsVersion::V1_1_1);
        assert_eq!(leaf.source.server_type, Some(ServerType::Geoserver));
        assert_eq!(
            leaf.style.legend_url.as_deref(),
            Some("https://maps.example.org/legend.png")
        );
        assert_eq!(entity.extent.map(|e| e.to_array()), Some([5.0, 47.0, 15.0, 55.0]));
    }

    #[test]
    fn malformed_leaf_is_accepted_unresolved() {
        let entity = LayerEntity::from_config(LayerConfig::leaf("broken"));
        let leaf = entity.as_leaf().expect("leaf");
        assert!(!leaf.source.is_resolved());
        assert!(!leaf.needs_hydration());
    }

    #[test]
    fn group_config_builds_group() {
        let raw = r#"{"kind": "group", "title": "Base maps", "layerId": "g1", "visible": false}"#;
        let config: LayerConfig = serde_json::from_str(raw).expect("json");
        let entity = LayerEntity::from_config(config);
        assert!(entity.is_group());
        assert!(!entity.visible);
        assert_eq!(entity.layer_id, Some(LayerId::from("g1")));
    }
}
