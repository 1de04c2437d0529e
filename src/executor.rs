//! Task Executor — component E. Pure request-scoped struct holding only
//! `Arc` handles to the shared resource cache client, upstream executor,
//! router, and concurrency gate (spec.md §4.E, §9). Safe to invoke
//! concurrently from many in-flight tasks since it carries no per-call
//! mutable state of its own.
//!
//! Grounded on `src/layer4/src/executor.rs::execute_task_with_agent` in the
//! teacher repo: same "resolve inputs, acquire a scoped permit, issue one
//! unit of work under a deadline, always release" shape, generalized from
//! agent invocation to upstream HTTP fetch.

use std::sync::Arc;

use chrono::Utc;
use crawler_upstream::{ProviderRouter, RouteRequest, UpstreamError, UpstreamRequestExecutor};
use serde_json::Value;
use tracing::{instrument, warn};

use crate::error::ErrorKind;
use crate::gate::ConcurrencyGate;
use crate::task::{Task, TaskResult};

/// Everything the executor needs to run one task, wired once at worker
/// startup and shared via `Arc` across every concurrently in-flight task
/// (spec.md §9 — "no lazy singletons inside the request path").
pub struct TaskExecutor {
    resources: Arc<dyn crawler_resources::ResourceCacheClient>,
    router: Arc<ProviderRouter>,
    upstream: Arc<UpstreamRequestExecutor>,
    gate: Arc<ConcurrencyGate>,
    worker_id: String,
    /// `ENABLE_COOKIE_INJECTION` — when false, the CN-must-have-cookie
    /// invariant is lifted entirely (spec.md §6).
    enable_cookie_injection: bool,
    /// `ENABLE_PROXY_INJECTION` — when false, proxy lookup is skipped and
    /// every task runs under `S_noproxy` unless it carries an explicit
    /// `payload.proxy` (spec.md §6).
    enable_proxy_injection: bool,
}

impl TaskExecutor {
    pub fn new(
        resources: Arc<dyn crawler_resources::ResourceCacheClient>,
        router: Arc<ProviderRouter>,
        upstream: Arc<UpstreamRequestExecutor>,
        gate: Arc<ConcurrencyGate>,
        worker_id: impl Into<String>,
    ) -> Self {
        Self {
            resources,
            router,
            upstream,
            gate,
            worker_id: worker_id.into(),
            enable_cookie_injection: true,
            enable_proxy_injection: true,
        }
    }

    pub fn with_injection_flags(mut self, enable_cookie_injection: bool, enable_proxy_injection: bool) -> Self {
        self.enable_cookie_injection = enable_cookie_injection;
        self.enable_proxy_injection = enable_proxy_injection;
        self
    }

    /// Runs one task to completion per the contract in spec.md §4.E,
    /// returning a `TaskResult` rather than a `Result` — every failure mode
    /// the spec names is a tagged outcome, not a panic path.
    #[instrument(skip_all, fields(task_id = %task.task_id, task_type = ?task.task_type, market = %task.market))]
    pub async fn execute(&self, task: &Task) -> TaskResult {
        let started_at = Utc::now();

        if !task.is_valid() {
            return self.terminal(task, started_at, ErrorKind::InvalidTask, "invalid task", None, false, None);
        }

        let cookie = if self.enable_cookie_injection && task.requires_cookie() {
            let cookie_id = match &task.payload.cookie_id {
                Some(id) => id,
                None => {
                    return self.terminal(
                        task,
                        started_at,
                        ErrorKind::MissingCookie,
                        "no cookie_id supplied",
                        None,
                        false,
                        None,
                    );
                }
            };
            match self.resources.get_cookie(task.market, cookie_id).await {
                Ok(Some(text)) => Some((cookie_id.clone(), text)),
                Ok(None) => {
                    return self.terminal(
                        task,
                        started_at,
                        ErrorKind::MissingCookie,
                        "cookie not found in cache",
                        None,
                        false,
                        Some(cookie_id.clone()),
                    );
                }
                Err(err) => {
                    warn!(error = %err, "resource cache error resolving cookie");
                    return self.terminal(
                        task,
                        started_at,
                        ErrorKind::InternalError,
                        &err.to_string(),
                        None,
                        false,
                        Some(cookie_id.clone()),
                    );
                }
            }
        } else {
            None
        };

        let proxy = match &task.payload.proxy {
            Some(explicit) => Some(explicit.clone()),
            None if self.enable_proxy_injection => self
                .resources
                .get_random_proxy(task.market)
                .await
                .unwrap_or_else(|err| {
                    warn!(error = %err, "resource cache error resolving proxy, proceeding without one");
                    None
                }),
            None => None,
        };
        let used_proxy = proxy.is_some();

        let _permit = self.gate.acquire(used_proxy).await;

        let route_req = build_route_request(task);
        let (spec, validator) = match self.router.route(route_req) {
            Ok(pair) => pair,
            Err(UpstreamError::UnsupportedTask { .. }) => {
                return self.terminal(
                    task,
                    started_at,
                    ErrorKind::UnsupportedTask,
                    "no provider adapter for this (market, task_type, endpoint)",
                    None,
                    used_proxy,
                    cookie.map(|(id, _)| id),
                );
            }
            Err(other) => {
                return self.terminal(
                    task,
                    started_at,
                    ErrorKind::InternalError,
                    &other.to_string(),
                    None,
                    used_proxy,
                    cookie.map(|(id, _)| id),
                );
            }
        };

        let cookie_text = cookie.as_ref().map(|(_, text)| text.clone());
        let cookie_id = cookie.map(|(id, _)| id);

        let outcome = self
            .upstream
            .execute(&spec, cookie_text.as_deref(), proxy.as_deref(), task.effective_timeout(), validator)
            .await;

        let envelope = match outcome {
            Ok(envelope) => envelope,
            Err(err) => {
                if matches!(err, UpstreamError::Proxy(_)) {
                    self.resources.invalidate_proxy(task.market).await;
                }
                let (kind, detail, status) = classify(&err);
                return self.terminal(task, started_at, kind, &detail, status, used_proxy, cookie_id);
            }
        };

        let (data, records_count) = if task.task_type.is_backfill() {
            filter_backfill(envelope.data, &task.payload.start_date, &task.payload.end_date)
        } else {
            (envelope.data, envelope.records_count)
        };

        TaskResult {
            task_id: task.task_id.clone(),
            success: true,
            data,
            records_count,
            error_kind: None,
            error_detail: None,
            status_code: None,
            started_at,
            finished_at: Utc::now(),
            worker_id: self.worker_id.clone(),
            used_proxy,
            used_cookie_id: cookie_id,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn terminal(
        &self,
        task: &Task,
        started_at: chrono::DateTime<Utc>,
        kind: ErrorKind,
        detail: &str,
        status_code: Option<u16>,
        used_proxy: bool,
        used_cookie_id: Option<String>,
    ) -> TaskResult {
        TaskResult {
            task_id: task.task_id.clone(),
            success: false,
            data: None,
            records_count: 0,
            error_kind: Some(kind),
            error_detail: Some(detail.to_string()),
            status_code,
            started_at,
            finished_at: Utc::now(),
            worker_id: self.worker_id.clone(),
            used_proxy,
            used_cookie_id,
        }
    }
}

fn build_route_request(task: &Task) -> RouteRequest {
    RouteRequest {
        market: task.market,
        task_type: task.task_type,
        endpoint: task.endpoint,
        symbol: task.symbol.clone(),
        start_date: task.payload.start_date.clone(),
        end_date: task.payload.end_date.clone(),
        period: task.payload.period.clone(),
        count: task.payload.count,
        method_override: task.payload.method.as_deref().map(crawler_upstream::HttpMethod::parse),
        headers_override: task.payload.headers.clone(),
        body_override: task.payload.body.clone(),
    }
}

/// Maps an `UpstreamError` onto the root crate's `ErrorKind` taxonomy
/// (spec.md §7).
fn classify(err: &UpstreamError) -> (ErrorKind, String, Option<u16>) {
    match err {
        UpstreamError::UnsupportedTask { .. } => {
            (ErrorKind::UnsupportedTask, err.to_string(), None)
        }
        UpstreamError::Timeout(_) => (ErrorKind::Timeout, err.to_string(), None),
        UpstreamError::HttpStatus(code) => {
            let kind = if *code >= 500 { ErrorKind::Http5xx } else { ErrorKind::Http4xx };
            (kind, err.to_string(), Some(*code))
        }
        UpstreamError::Provider { description, .. } => {
            (ErrorKind::ProviderError, description.clone(), None)
        }
        UpstreamError::Network(_) => (ErrorKind::NetworkError, err.to_string(), None),
        UpstreamError::Proxy(_) => (ErrorKind::ProxyError, err.to_string(), None),
        UpstreamError::Decode(_) => (ErrorKind::InternalError, err.to_string(), None),
    }
}

/// Post-filters K-line `data.item` bars to `[start, end]` inclusive by their
/// `date` field, recomputing `records_count` to the filtered length
/// (spec.md §4.E step 6, R2).
fn filter_backfill(
    data: Option<Value>,
    start: &Option<String>,
    end: &Option<String>,
) -> (Option<Value>, u64) {
    let (Some(start), Some(end)) = (start, end) else {
        let count = crawler_upstream::records_count(&data);
        return (data, count);
    };

    let Some(mut data) = data else {
        return (None, 0);
    };

    let Some(items) = data.get_mut("item").and_then(Value::as_array_mut) else {
        let count = crawler_upstream::records_count(&Some(data.clone()));
        return (Some(data), count);
    };

    items.retain(|bar| {
        bar.get("date")
            .and_then(Value::as_str)
            .map(|date| date >= start.as_str() && date <= end.as_str())
            .unwrap_or(false)
    });
    let filtered_count = items.len() as u64;

    (Some(data), filtered_count)
}
