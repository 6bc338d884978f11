use serde::{Deserialize, Serialize};

/// WMS server flavour; some servers need vendor-specific request tweaks.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ServerType {
    Esri,
    Geoserver,
    Mapserver,
    Qgis,
}

impl ServerType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            ServerType::Esri => "ESRI",
            ServerType::Geoserver => "GEOSERVER",
            ServerType::Mapserver => "MAPSERVER",
            ServerType::Qgis => "QGIS",
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum WmsVersion {
    #[serde(rename = "1.1.0")]
    V1_1_0,
    #[serde(rename = "1.1.1")]
    V1_1_1,
    #[default]
    #[serde(rename = "1.3.0")]
    V1_3_0,
}

impl WmsVersion {
    pub const fn as_str(&self) -> &'static str {
        match self {
            WmsVersion::V1_1_0 => "1.1.0",
            WmsVersion::V1_1_1 => "1.1.1",
            WmsVersion::V1_3_0 => "1.3.0",
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ImageFormat {
    #[default]
    #[serde(rename = "image/png")]
    Png,
    #[serde(rename = "image/jpeg")]
    Jpeg,
}

impl ImageFormat {
    pub const fn as_str(&self) -> &'static str {
        match self {
            ImageFormat::Png => "image/png",
            ImageFormat::Jpeg => "image/jpeg",
        }
    }
}

/// Parameters resolved for a leaf by the rendering-layer lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderingParams {
    pub url: String,
    pub layer_name: String,
    #[serde(default)]
    pub version: WmsVersion,
    #[serde(default)]
    pub format: ImageFormat,
    pub server_type: Option<ServerType>,
}

/// Image-WMS source descriptor of a leaf layer.
///
/// A source without `url` is unresolved: it cannot be rendered until its
/// parameters are hydrated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderingSource {
    pub url: Option<String>,
    pub layer_name: Option<String>,
    pub version: WmsVersion,
    pub format: ImageFormat,
    pub server_type: Option<ServerType>,
    pub transparent: bool,
}

impl Default for RenderingSource {
    fn default() -> Self {
        Self {
            url: None,
            layer_name: None,
            version: WmsVersion::default(),
            format: ImageFormat::default(),
            server_type: None,
            transparent: true,
        }
    }
}

impl RenderingSource {
    pub fn unresolved() -> Self {
        Self::default()
    }

    pub fn from_params(params: RenderingParams) -> Self {
        let mut source = Self::default();
        source.apply(params);
        source
    }

    pub fn is_resolved(&self) -> bool {
        self.url.is_some()
    }

    pub fn apply(&mut self, params: RenderingParams) {
        self.url = Some(params.url);
        self.layer_name = Some(params.layer_name);
        self.version = params.version;
        self.format = params.format;
        self.server_type = params.server_type;
    }

    /// Resets the source to unresolved, keeping format and transparency.
    pub fn clear(&mut self) {
        self.url = None;
        self.layer_name = None;
        self.server_type = None;
    }

    /// GetMap parameters in WMS key spelling.
    pub fn wms_params(&self) -> Vec<(&'static str, String)> {
        let mut out = Vec::with_capacity(4);
        if let Some(layers) = &self.layer_name {
            out.push(("LAYERS", layers.clone()));
        }
        out.push(("VERSION", self.version.as_str().to_string()));
        out.push(("FORMAT", self.format.as_str().to_string()));
        out.push(("TRANSPARENT", self.transparent.to_string()));
        out
    }
}
