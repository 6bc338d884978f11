use std::collections::BTreeMap;
use std::sync::Arc;

use foundation::ids::LayerId;
use futures_util::stream::{FuturesUnordered, StreamExt};
use layers::hierarchy::Hierarchy;
use layers::layer::NodeHandle;
use layers::raster::RenderingParams;
use runtime::generation::{Generation, GenerationCounter};
use tracing::{debug, warn};

use crate::lookup::{BoxFuture, LookupError, RenderingParamsLookup};
use crate::request::{HydrationRequest, scan};
use crate::state::HydrationState;

/// A fetch that has finished, successfully or not, but is not applied yet.
#[derive(Debug)]
pub struct Settled {
    pub request: HydrationRequest,
    pub result: Result<RenderingParams, LookupError>,
}

#[derive(Debug)]
pub enum HydrationOutcome {
    Applied {
        node: NodeHandle,
    },
    Failed {
        node: NodeHandle,
        rendering_layer: LayerId,
        error: LookupError,
    },
    /// The result arrived for a leaf that was removed, re-pointed at another
    /// rendering layer, or belongs to a cancelled generation.
    Discarded {
        node: NodeHandle,
    },
}

#[derive(Debug, Clone)]
struct Tracked {
    state: HydrationState,
    rendering_layer: LayerId,
}

/// Resolves missing rendering parameters of leaf layers.
///
/// Fetches for distinct leaves run concurrently and settle in any order.
/// In-flight futures own their request data and never borrow the hierarchy,
/// so the hierarchy stays mutable while they are pending. Results only reach
/// the hierarchy through [`Hydrator::apply`], which drops anything stale.
pub struct Hydrator {
    lookup: Arc<dyn RenderingParamsLookup>,
    generations: GenerationCounter,
    in_flight: FuturesUnordered<BoxFuture<'static, Settled>>,
    tracked: BTreeMap<NodeHandle, Tracked>,
}

impl std::fmt::Debug for Hydrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hydrator")
            .field("generation", &self.generations.current())
            .field("in_flight", &self.in_flight.len())
            .field("tracked", &self.tracked.len())
            .finish()
    }
}

impl Hydrator {
    pub fn new(lookup: Arc<dyn RenderingParamsLookup>) -> Self {
        Self {
            lookup,
            generations: GenerationCounter::new(),
            in_flight: FuturesUnordered::new(),
            tracked: BTreeMap::new(),
        }
    }

    pub fn generation(&self) -> Generation {
        self.generations.current()
    }

    /// Number of fetches still in flight.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn state(&self, node: NodeHandle) -> Option<HydrationState> {
        self.tracked.get(&node).map(|t| t.state)
    }

    /// Requests for leaves that need hydration and have no fetch in flight
    /// for their current rendering layer.
    pub fn scan(&self, hierarchy: &Hierarchy) -> Vec<HydrationRequest> {
        scan(hierarchy, self.generation())
            .into_iter()
            .filter(|r| {
                !self.tracked.get(&r.node).is_some_and(|t| {
                    t.state == HydrationState::Pending && t.rendering_layer == r.rendering_layer
                })
            })
            .collect()
    }

    /// Issues one fetch per request. Returns the number of fetches started.
    pub fn start(&mut self, requests: Vec<HydrationRequest>) -> usize {
        let mut started = 0;
        for request in requests {
            if !self.generations.is_current(request.generation) {
                continue;
            }
            self.tracked.insert(
                request.node,
                Tracked {
                    state: HydrationState::Pending,
                    rendering_layer: request.rendering_layer.clone(),
                },
            );
            debug!(node = %request.node.0, layer = %request.rendering_layer, "hydration fetch started");
            let fetch = self.lookup.fetch(&request.rendering_layer);
            self.in_flight.push(Box::pin(async move {
                Settled {
                    result: fetch.await,
                    request,
                }
            }));
            started += 1;
        }
        started
    }

    /// Scans `hierarchy` and starts fetches for everything found.
    pub fn scan_and_start(&mut self, hierarchy: &Hierarchy) -> usize {
        self.tracked.retain(|node, _| hierarchy.contains(*node));
        let requests = self.scan(hierarchy);
        self.start(requests)
    }

    /// Waits for the next fetch to settle, in completion order.
    ///
    /// Returns `None` when nothing is in flight.
    pub async fn next_settled(&mut self) -> Option<Settled> {
        self.in_flight.next().await
    }

    /// Applies a settled fetch to the hierarchy, guarding against stale writes.
    pub fn apply(&mut self, hierarchy: &mut Hierarchy, settled: Settled) -> HydrationOutcome {
        let Settled { request, result } = settled;
        let node = request.node;

        if !self.generations.is_current(request.generation) {
            debug!(node = %node.0, "dropping hydration result from a cancelled generation");
            return HydrationOutcome::Discarded { node };
        }

        let current_ref = hierarchy
            .entity(node)
            .and_then(|e| e.as_leaf())
            .map(|leaf| leaf.rendering_layer.clone());
        let Some(current_ref) = current_ref else {
            debug!(node = %node.0, "dropping hydration result for a removed layer");
            self.tracked.remove(&node);
            return HydrationOutcome::Discarded { node };
        };
        if current_ref.as_ref() != Some(&request.rendering_layer) {
            debug!(node = %node.0, "dropping hydration result for a re-pointed layer");
            if self
                .tracked
                .get(&node)
                .is_some_and(|t| t.rendering_layer == request.rendering_layer)
            {
                self.tracked.remove(&node);
            }
            return HydrationOutcome::Discarded { node };
        }

        let state = match &result {
            Ok(_) => HydrationState::Resolved,
            Err(_) => HydrationState::Failed,
        };
        self.tracked.insert(
            node,
            Tracked {
                state,
                rendering_layer: request.rendering_layer.clone(),
            },
        );

        match result {
            Ok(params) => {
                hierarchy.apply_rendering_params(node, params);
                HydrationOutcome::Applied { node }
            }
            Err(error) => {
                warn!(
                    node = %node.0,
                    layer = %request.rendering_layer,
                    %error,
                    "failed to fetch rendering parameters"
                );
                HydrationOutcome::Failed {
                    node,
                    rendering_layer: request.rendering_layer,
                    error,
                }
            }
        }
    }

    /// Waits for the next fetch and applies it.
    pub async fn hydrate_next(&mut self, hierarchy: &mut Hierarchy) -> Option<HydrationOutcome> {
        let settled = self.next_settled().await?;
        Some(self.apply(hierarchy, settled))
    }

    /// Drops every in-flight fetch and invalidates results already settled
    /// but not applied.
    pub fn cancel_all(&mut self) -> Generation {
        let dropped = self.in_flight.len();
        self.in_flight = FuturesUnordered::new();
        self.tracked.clear();
        let generation = self.generations.bump();
        debug!(dropped, generation = generation.0, "hydration cancelled");
        generation
    }
}
