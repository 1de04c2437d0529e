pub mod config;
pub mod context;
pub mod runtime;
pub mod service;
pub mod telemetry;

pub use config::WorkerConfig;
pub use context::WorkerContext;
pub use runtime::WorkerPlatform;
pub use service::ServiceRegistration;
pub use telemetry::HealthSnapshot;
