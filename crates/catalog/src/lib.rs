use std::collections::BTreeMap;

use foundation::ids::LayerId;
use hydration::lookup::{BoxFuture, LookupError, RenderingParamsLookup};
use layers::raster::RenderingParams;
use serde::{Deserialize, Serialize};

pub mod records;

pub use records::*;

/// Persisted rendering layer of a registered WMS service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderingLayerRecord {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    pub wms_params: RenderingParams,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogSnapshot {
    pub entries: BTreeMap<String, RenderingLayerRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    NotFound(String),
    Corrupt(String),
    Io(String),
}

impl std::fmt::Display for CatalogError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CatalogError::NotFound(id) => write!(f, "rendering layer {id} not found"),
            CatalogError::Corrupt(msg) => write!(f, "catalog data corrupt: {msg}"),
            CatalogError::Io(msg) => write!(f, "catalog storage error: {msg}"),
        }
    }
}

impl std::error::Error for CatalogError {}

/// Resource-repository contract for rendering layers.
pub trait CatalogStore {
    fn list(&self) -> Result<Vec<RenderingLayerRecord>, CatalogError>;
    fn get(&self, id: &str) -> Result<Option<RenderingLayerRecord>, CatalogError>;
    fn upsert(&mut self, record: RenderingLayerRecord) -> Result<(), CatalogError>;
    fn delete(&mut self, id: &str) -> Result<bool, CatalogError>;
}

#[derive(Debug, Default, Clone)]
pub struct InMemoryCatalogStore {
    snapshot: CatalogSnapshot,
}

impl InMemoryCatalogStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a JSON array of rendering-layer records.
    pub fn from_json(raw: &str) -> Result<Self, CatalogError> {
        let records: Vec<RenderingLayerRecord> =
            serde_json::from_str(raw).map_err(|e| CatalogError::Corrupt(e.to_string()))?;
        let mut store = Self::new();
        for record in records {
            store.upsert(record)?;
        }
        Ok(store)
    }

    pub fn len(&self) -> usize {
        self.snapshot.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot.entries.is_empty()
    }
}

impl CatalogStore for InMemoryCatalogStore {
    fn list(&self) -> Result<Vec<RenderingLayerRecord>, CatalogError> {
        Ok(self.snapshot.entries.values().cloned().collect())
    }

    fn get(&self, id: &str) -> Result<Option<RenderingLayerRecord>, CatalogError> {
        Ok(self.snapshot.entries.get(id).cloned())
    }

    fn upsert(&mut self, record: RenderingLayerRecord) -> Result<(), CatalogError> {
        self.snapshot.entries.insert(record.id.clone(), record);
        Ok(())
    }

    fn delete(&mut self, id: &str) -> Result<bool, CatalogError> {
        Ok(self.snapshot.entries.remove(id).is_some())
    }
}

impl RenderingParamsLookup for InMemoryCatalogStore {
    fn fetch(
        &self,
        rendering_layer: &LayerId,
    ) -> BoxFuture<'static, Result<RenderingParams, LookupError>> {
        let result = match self.get(rendering_layer.as_str()) {
            Ok(Some(record)) => Ok(record.wms_params),
            Ok(None) => Err(LookupError::with_source(
                "rendering layer lookup failed",
                CatalogError::NotFound(rendering_layer.to_string()),
            )),
            Err(e) => Err(LookupError::with_source("rendering layer lookup failed", e)),
        };
        Box::pin(async move { result })
    }
}
