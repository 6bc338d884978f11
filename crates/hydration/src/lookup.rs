use std::future::Future;
use std::pin::Pin;

use foundation::ids::LayerId;
use layers::raster::RenderingParams;

/// Type alias for a boxed future that can be sent between threads.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Opaque failure reported by a rendering-parameter lookup.
#[derive(Debug)]
pub struct LookupError {
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl std::fmt::Display for LookupError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for LookupError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as _)
    }
}

impl LookupError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

/// Remote lookup resolving a persisted rendering layer to WMS parameters.
///
/// The returned future must not borrow `self`: it stays in flight while the
/// hierarchy keeps changing and may be dropped at any point.
pub trait RenderingParamsLookup: Send + Sync {
    fn fetch(&self, rendering_layer: &LayerId)
    -> BoxFuture<'static, Result<RenderingParams, LookupError>>;
}

/// Lookup used when none is configured; every fetch fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableLookup;

impl RenderingParamsLookup for UnavailableLookup {
    fn fetch(
        &self,
        rendering_layer: &LayerId,
    ) -> BoxFuture<'static, Result<RenderingParams, LookupError>> {
        let message = format!("no rendering-parameter lookup configured (layer {rendering_layer})");
        Box::pin(async move { Err::<RenderingParams, _>(LookupError::new(message)) })
    }
}
