//! Resource Cache Client — component A of the crawler worker core.
//!
//! Read-only, read-through access to cookies and proxy lists held in the
//! broker's keyspace (spec.md §4.A, §6). Never authoritative: the cache
//! client does not discover or validate cookies, it only reads a shared
//! cache populated by another service.

pub mod client;
pub mod error;
pub mod types;

pub use client::{FakeResourceCacheClient, RedisResourceCacheClient, ResourceCacheClient};
pub use error::ResourceError;
pub use types::{CookieRecord, Market, ProxyList};
