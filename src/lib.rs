//! Priority-tiered crawl worker.
//!
//! Pulls tasks off Redis Streams queues (one per priority tier), resolves
//! cookies/proxies, routes each task to the right upstream market adapter,
//! and acks on completion. See `platform::WorkerPlatform` for the process
//! entry point wired together in `src/bin/worker.rs`.

pub mod consumer;
pub mod error;
pub mod executor;
pub mod gate;
pub mod platform;
pub mod supervisor;
pub mod task;

pub use platform::WorkerPlatform;
