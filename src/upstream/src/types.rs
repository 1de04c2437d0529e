//! Shared request/response vocabulary between the router (component C) and
//! the request executor (component B).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use crawler_resources::Market;

/// Mirrors spec.md §3's `task_type` enum exactly, including the wire strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskType {
    #[serde(rename = "1m_realtime")]
    OneMRealtime,
    #[serde(rename = "5m_realtime")]
    FiveMRealtime,
    #[serde(rename = "15m_realtime")]
    FifteenMRealtime,
    #[serde(rename = "15m_backfill")]
    FifteenMBackfill,
    #[serde(rename = "1d_backfill")]
    OneDBackfill,
    #[serde(rename = "us_1m_realtime")]
    UsOneMRealtime,
    #[serde(rename = "hk_1m_realtime")]
    HkOneMRealtime,
}

impl TaskType {
    pub fn is_backfill(&self) -> bool {
        matches!(self, TaskType::FifteenMBackfill | TaskType::OneDBackfill)
    }

    pub fn market(&self) -> Market {
        match self {
            TaskType::UsOneMRealtime => Market::Us,
            TaskType::HkOneMRealtime => Market::Hk,
            _ => Market::Cn,
        }
    }
}

/// Mirrors spec.md §3's `endpoint` tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Endpoint {
    Kline,
    Quote,
    BatchQuote,
    Minute,
    Detail,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

impl HttpMethod {
    pub fn parse(raw: &str) -> Self {
        if raw.eq_ignore_ascii_case("POST") {
            HttpMethod::Post
        } else {
            HttpMethod::Get
        }
    }
}

/// The fields the router (component C) needs out of a `Task` to pick a
/// provider adapter and build its request. Kept separate from the broker's
/// full `Task` envelope (owned by the root crate) so this crate never has to
/// depend back on it.
#[derive(Debug, Clone)]
pub struct RouteRequest {
    pub market: Market,
    pub task_type: TaskType,
    pub endpoint: Option<Endpoint>,
    pub symbol: String,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub period: Option<String>,
    pub count: Option<u32>,
    pub method_override: Option<HttpMethod>,
    pub headers_override: HashMap<String, String>,
    pub body_override: Option<Value>,
}

/// Fully-built HTTP request, ready for the executor to fire.
#[derive(Debug, Clone)]
pub struct RequestSpec {
    pub url: String,
    pub method: HttpMethod,
    pub query: Vec<(String, String)>,
    pub headers: HashMap<String, String>,
    pub body: Option<Value>,
}

/// Result of validating a 2xx JSON body against a provider's envelope
/// contract (spec.md §4.B).
#[derive(Debug, Clone)]
pub struct ValidatedEnvelope {
    pub data: Option<Value>,
    pub records_count: u64,
}

/// Computes `records_count` by the precedence in spec.md §4.B: `data.item`,
/// then `data.list`, then `data.items`, else 1 if `data` is a non-empty
/// object, else 0.
pub fn records_count(data: &Option<Value>) -> u64 {
    let Some(data) = data else {
        return 0;
    };
    if let Some(arr) = data.get("item").and_then(Value::as_array) {
        return arr.len() as u64;
    }
    if let Some(arr) = data.get("list").and_then(Value::as_array) {
        return arr.len() as u64;
    }
    if let Some(arr) = data.get("items").and_then(Value::as_array) {
        return arr.len() as u64;
    }
    match data {
        Value::Object(map) if !map.is_empty() => 1,
        _ => 0,
    }
}
