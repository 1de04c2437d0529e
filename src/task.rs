//! Data model — spec.md §3. `Task` is the unit of work pulled from the
//! broker; `TaskResult` is what the executor hands back; `WorkerDescriptor`
//! tracks one process's lifecycle.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use crawler_upstream::{Endpoint, Market, TaskType};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ErrorKind;

/// The hard cap on a request's deadline regardless of caller hint
/// (spec.md §3 invariants, §4.E step 5).
pub const MAX_REQUEST_TIMEOUT_SECS: u64 = 45;

/// CN endpoints that must carry a resolvable cookie (spec.md §3 invariants).
const CN_COOKIE_REQUIRED_ENDPOINTS: &[Endpoint] = &[
    Endpoint::Kline,
    Endpoint::Quote,
    Endpoint::BatchQuote,
    Endpoint::Minute,
    Endpoint::Detail,
];

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TaskPayload {
    pub cookie_id: Option<String>,
    pub proxy: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub period: Option<String>,
    pub count: Option<u32>,
    pub method: Option<String>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    pub body: Option<Value>,
    /// Forward-compatible fields the core does not understand yet
    /// (spec.md §9 — "a single loose `extras` map").
    #[serde(flatten)]
    pub extras: serde_json::Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub task_id: String,
    pub task_type: TaskType,
    pub market: Market,
    pub symbol: String,
    pub endpoint: Option<Endpoint>,
    #[serde(default)]
    pub payload: TaskPayload,
    pub enqueued_at: DateTime<Utc>,
    #[serde(default = "default_attempt")]
    pub attempt: u32,
    pub timeout_s: u64,
}

fn default_attempt() -> u32 {
    1
}

impl Task {
    /// `min(task.timeout_s, 45s)`, never larger (spec.md §3, §4.E step 5).
    pub fn effective_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_s.min(MAX_REQUEST_TIMEOUT_SECS))
    }

    /// A CN task against one of the primary endpoints must carry a
    /// resolvable cookie (spec.md §3 invariants).
    pub fn requires_cookie(&self) -> bool {
        if self.market != Market::Cn {
            return false;
        }
        match self.endpoint {
            Some(endpoint) => CN_COOKIE_REQUIRED_ENDPOINTS.contains(&endpoint),
            // No explicit endpoint means task_type drives the default
            // endpoint (kline), which is itself cookie-gated.
            None => matches!(
                self.task_type,
                TaskType::OneMRealtime
                    | TaskType::FiveMRealtime
                    | TaskType::FifteenMRealtime
                    | TaskType::FifteenMBackfill
                    | TaskType::OneDBackfill
            ),
        }
    }

    pub fn is_valid(&self) -> bool {
        !self.task_id.trim().is_empty() && !self.symbol.trim().is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: String,
    pub success: bool,
    pub data: Option<Value>,
    pub records_count: u64,
    pub error_kind: Option<ErrorKind>,
    pub error_detail: Option<String>,
    pub status_code: Option<u16>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub worker_id: String,
    pub used_proxy: bool,
    pub used_cookie_id: Option<String>,
}

impl TaskResult {
    pub fn is_terminal(&self) -> bool {
        self.success || self.error_kind.map(|k| k.is_terminal()).unwrap_or(true)
    }
}

/// Canonical priority tiers (spec.md §6). The source material's naming
/// oscillates between `NORMAL` and `MEDIUM` for the lowest tier; `NORMAL` is
/// treated as canonical per spec.md §9.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Tier {
    Critical,
    High,
    Normal,
}

impl Tier {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_uppercase().as_str() {
            "CRITICAL" => Some(Tier::Critical),
            "HIGH" => Some(Tier::High),
            "NORMAL" | "MEDIUM" => Some(Tier::Normal),
            _ => None,
        }
    }

    pub fn consumer_group(&self) -> String {
        format!("crawler_{}", self.as_str())
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Critical => "critical",
            Tier::High => "high",
            Tier::Normal => "normal",
        }
    }

    /// Subscribed queues in priority order (spec.md §6).
    pub fn queues(&self) -> Vec<String> {
        match self {
            Tier::Critical => vec![
                "crawler_backfill_critical".to_string(),
                "crawler_realtime_critical".to_string(),
            ],
            Tier::High => vec![
                "crawler_backfill_high".to_string(),
                "crawler_realtime_high".to_string(),
                "crawler_backfill_normal".to_string(),
            ],
            Tier::Normal => vec![
                "crawler_backfill_normal".to_string(),
                "crawler_realtime_normal".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    Starting,
    Running,
    Draining,
    Stopped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerDescriptor {
    pub worker_id: String,
    pub tier: Tier,
    pub subscribed_queues: Vec<String>,
    pub max_concurrent: usize,
    pub status: WorkerStatus,
    pub in_flight_count: usize,
    pub processed_total: u64,
    pub failed_total: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normal_and_medium_both_parse_to_normal_tier() {
        assert_eq!(Tier::parse("NORMAL"), Some(Tier::Normal));
        assert_eq!(Tier::parse("MEDIUM"), Some(Tier::Normal));
        assert_eq!(Tier::parse("normal"), Some(Tier::Normal));
    }

    #[test]
    fn effective_timeout_clamps_to_45s() {
        let task = sample_task(120);
        assert_eq!(task.effective_timeout(), Duration::from_secs(45));
        let task = sample_task(10);
        assert_eq!(task.effective_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn cn_kline_endpoint_requires_cookie() {
        let task = sample_task(10);
        assert!(task.requires_cookie());
    }

    fn sample_task(timeout_s: u64) -> Task {
        Task {
            task_id: "t1".to_string(),
            task_type: TaskType::OneMRealtime,
            market: Market::Cn,
            symbol: "SH600000".to_string(),
            endpoint: Some(Endpoint::Kline),
            payload: TaskPayload::default(),
            enqueued_at: Utc::now(),
            attempt: 1,
            timeout_s,
        }
    }
}
