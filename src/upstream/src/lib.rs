//! Upstream Request Executor (component B) and Provider Router (component C)
//! of the crawler worker core (spec.md §4.B, §4.C).

pub mod client;
pub mod error;
pub mod providers;
pub mod router;
pub mod types;
pub mod validators;

pub use client::UpstreamRequestExecutor;
pub use error::UpstreamError;
pub use router::{ProviderRouter, ProviderRouterConfig};
pub use types::{
    records_count, Endpoint, HttpMethod, Market, RequestSpec, RouteRequest, TaskType,
    ValidatedEnvelope,
};
pub use validators::ResponseValidator;
