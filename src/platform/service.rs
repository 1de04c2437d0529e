//! Generic "named background task" registration, unchanged in shape from
//! the teacher's `src/platform/service.rs` — a service is just a spawner
//! closure keyed by name, independent of what domain object it wraps.

use std::sync::Arc;

use anyhow::Result;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::platform::context::WorkerContext;

pub type ServiceSpawner =
    Arc<dyn Fn(WorkerContext, CancellationToken) -> JoinHandle<Result<()>> + Send + Sync + 'static>;

pub struct ServiceRegistration {
    name: String,
    spawner: ServiceSpawner,
}

impl ServiceRegistration {
    pub fn new<N: Into<String>>(name: N, spawner: ServiceSpawner) -> Self {
        Self {
            name: name.into(),
            spawner,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn spawn(&self, context: WorkerContext, token: CancellationToken) -> JoinHandle<Result<()>> {
        (self.spawner)(context, token)
    }
}
