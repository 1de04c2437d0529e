//! Process-scoped shared state — component handles every in-flight task
//! reads, plus the root shutdown token (spec.md §9 "global state ... is
//! process-scoped state with explicit init/shutdown").
//!
//! Grounded on `PlatformContext` in the teacher's `src/platform/context.rs`:
//! same `Arc<SharedState>` + cloneable-handle shape, generalized from
//! agent/audit/rate-limit handles to the crawler's resource cache, router,
//! upstream executor, and concurrency gate.

use std::sync::Arc;

use crawler_resources::ResourceCacheClient;
use crawler_upstream::{ProviderRouter, UpstreamRequestExecutor};
use tokio_util::sync::CancellationToken;

use crate::gate::ConcurrencyGate;
use crate::platform::config::WorkerConfig;

#[derive(Clone)]
pub struct WorkerContext {
    shared: Arc<SharedState>,
    shutdown: CancellationToken,
}

struct SharedState {
    config: WorkerConfig,
    resources: Arc<dyn ResourceCacheClient>,
    router: Arc<ProviderRouter>,
    upstream: Arc<UpstreamRequestExecutor>,
    gate: Arc<ConcurrencyGate>,
}

impl WorkerContext {
    pub(crate) fn new(
        config: WorkerConfig,
        resources: Arc<dyn ResourceCacheClient>,
        router: Arc<ProviderRouter>,
        upstream: Arc<UpstreamRequestExecutor>,
        gate: Arc<ConcurrencyGate>,
        shutdown: CancellationToken,
    ) -> Self {
        let shared = SharedState {
            config,
            resources,
            router,
            upstream,
            gate,
        };

        Self {
            shared: Arc::new(shared),
            shutdown,
        }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.shared.config
    }

    pub fn resources(&self) -> Arc<dyn ResourceCacheClient> {
        Arc::clone(&self.shared.resources)
    }

    pub fn router(&self) -> Arc<ProviderRouter> {
        Arc::clone(&self.shared.router)
    }

    pub fn upstream(&self) -> Arc<UpstreamRequestExecutor> {
        Arc::clone(&self.shared.upstream)
    }

    pub fn gate(&self) -> Arc<ConcurrencyGate> {
        Arc::clone(&self.shared.gate)
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }
}
