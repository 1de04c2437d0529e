//! Health introspection — deliberately thin per the non-goal on an
//! admin/metrics HTTP surface (spec.md §1). Rather than the teacher's
//! `telemetry_service` axum endpoint (`src/platform/telemetry.rs`), this
//! keeps a `HealthSnapshot` the supervisor refreshes on every dispatch and
//! exposes for whatever channel deployment wires up to poll it; no server
//! is started from inside this crate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::task::WorkerDescriptor;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSnapshot {
    #[serde(flatten)]
    pub descriptor: WorkerDescriptor,
    pub started_at: DateTime<Utc>,
    pub snapshot_at: DateTime<Utc>,
}

impl HealthSnapshot {
    pub fn new(descriptor: WorkerDescriptor, started_at: DateTime<Utc>) -> Self {
        Self {
            descriptor,
            started_at,
            snapshot_at: Utc::now(),
        }
    }

    pub fn uptime_seconds(&self) -> i64 {
        (self.snapshot_at - self.started_at).num_seconds().max(0)
    }
}
