//! Cross-module coverage for the pieces that only show their behavior once
//! the consumer, executor, and supervisor run together: priority ordering
//! across tiers at the dispatch level, and a full SIGTERM-style drain with
//! several tasks genuinely in flight at once (spec.md §8 scenarios 1 and 6).

use std::sync::Arc;
use std::time::Duration;

use crawler_core::consumer::{FakeBroker, StreamConsumer};
use crawler_core::executor::TaskExecutor;
use crawler_core::gate::ConcurrencyGate;
use crawler_core::supervisor::{exit_code, SupervisorConfig, WorkerSupervisor};
use crawler_core::task::Tier;
use crawler_resources::{FakeResourceCacheClient, Market};
use crawler_upstream::{ProviderRouter, ProviderRouterConfig, UpstreamRequestExecutor};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn build(server_uri: &str, tier: Tier, max_concurrent: usize) -> (Arc<WorkerSupervisor>, Arc<FakeBroker>) {
    let broker = Arc::new(FakeBroker::default());
    let consumer = Arc::new(StreamConsumer::new(broker.clone(), tier, "worker-1"));

    let resources = Arc::new(FakeResourceCacheClient::default());
    resources.set_cookie(Market::Cn, "c1", "cookietext").await;

    let router = Arc::new(ProviderRouter::new(ProviderRouterConfig {
        cn_base_url: server_uri.to_string(),
        us_base_url: server_uri.to_string(),
        hk_base_url: server_uri.to_string(),
    }));
    let upstream = Arc::new(UpstreamRequestExecutor::new(reqwest::Client::new()));
    let gate = Arc::new(ConcurrencyGate::default());
    let executor = Arc::new(TaskExecutor::new(resources, router, upstream, gate, "worker-1"));

    let config = SupervisorConfig {
        worker_id: "worker-1".to_string(),
        tier,
        max_concurrent_tasks: max_concurrent,
        graceful_shutdown_timeout: Duration::from_secs(5),
    };

    (Arc::new(WorkerSupervisor::new(config, consumer, executor)), broker)
}

fn task_body(task_id: &str) -> String {
    serde_json::to_string(&json!({
        "task_id": task_id,
        "task_type": "1m_realtime",
        "market": "CN",
        "symbol": "SH600000",
        "endpoint": "kline",
        "payload": {"cookie_id": "c1", "period": "1m", "count": 10},
        "enqueued_at": chrono::Utc::now().to_rfc3339(),
        "attempt": 1,
        "timeout_s": 10
    }))
    .unwrap()
}

/// High-tier workers read `crawler_backfill_high` ahead of
/// `crawler_realtime_high` ahead of the shared `crawler_backfill_normal`
/// spillover queue (spec.md §6's priority table, P6).
#[tokio::test]
async fn high_tier_drains_its_own_backfill_queue_before_the_shared_normal_one() {
    let broker = Arc::new(FakeBroker::default());
    broker.push("crawler_backfill_normal", "spillover", "{}").await;
    broker.push("crawler_realtime_high", "realtime", "{}").await;
    broker.push("crawler_backfill_high", "own-backfill", "{}").await;

    let consumer = StreamConsumer::new(broker, Tier::High, "worker-1");
    consumer.init().await.unwrap();
    let messages = consumer.poll_once().await.unwrap();

    let order: Vec<&str> = messages.iter().map(|m| m.task_id.as_str()).collect();
    assert_eq!(order, vec!["own-backfill", "realtime", "spillover"]);
}

/// Seven tasks with a slow upstream, a SIGTERM-style cancel shortly after
/// they start, and a drain timeout long enough for all of them to finish —
/// the supervisor should wait for every in-flight task rather than cutting
/// them off, and exit 0 (spec.md §8 scenario 6, B3).
#[tokio::test]
async fn graceful_shutdown_waits_for_all_in_flight_tasks_then_exits_zero() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v5/stock/chart/kline.json"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_millis(150))
                .set_body_json(json!({
                    "error_code": 0,
                    "data": {"item": [{"date": "2024-01-01"}]}
                })),
        )
        .mount(&server)
        .await;

    let (supervisor, broker) = build(&server.uri(), Tier::Normal, 10).await;
    for i in 0..7 {
        broker
            .push("crawler_realtime_normal", &format!("t{i}"), &task_body(&format!("t{i}")))
            .await;
    }

    let shutdown = CancellationToken::new();
    let shutdown_clone = shutdown.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown_clone.cancel();
    });

    let exit = supervisor.run(shutdown).await;
    assert_eq!(exit, exit_code::CLEAN_SHUTDOWN);
    assert_eq!(broker.pending_count().await, 0);

    let descriptor = supervisor.descriptor().read().await;
    assert_eq!(descriptor.processed_total, 7);
    assert_eq!(descriptor.in_flight_count, 0);
}

/// A drain timeout too short for the in-flight work to finish forces a
/// cancel and reports it honestly via the non-zero exit code (spec.md §4.G,
/// §6 exit code table).
#[tokio::test]
async fn drain_timeout_shorter_than_in_flight_work_forces_cancel() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v5/stock/chart/kline.json"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)).set_body_json(json!({
            "error_code": 0,
            "data": {"item": []}
        })))
        .mount(&server)
        .await;

    let broker = Arc::new(FakeBroker::default());
    let consumer = Arc::new(StreamConsumer::new(broker.clone(), Tier::Normal, "worker-1"));
    let resources = Arc::new(FakeResourceCacheClient::default());
    resources.set_cookie(Market::Cn, "c1", "cookietext").await;
    let router = Arc::new(ProviderRouter::new(ProviderRouterConfig {
        cn_base_url: server.uri(),
        us_base_url: server.uri(),
        hk_base_url: server.uri(),
    }));
    let upstream = Arc::new(UpstreamRequestExecutor::new(reqwest::Client::new()));
    let gate = Arc::new(ConcurrencyGate::default());
    let executor = Arc::new(TaskExecutor::new(resources, router, upstream, gate, "worker-1"));

    let config = SupervisorConfig {
        worker_id: "worker-1".to_string(),
        tier: Tier::Normal,
        max_concurrent_tasks: 5,
        graceful_shutdown_timeout: Duration::from_millis(100),
    };
    let supervisor = Arc::new(WorkerSupervisor::new(config, consumer, executor));

    broker.push("crawler_realtime_normal", "slow", &task_body("slow")).await;

    let shutdown = CancellationToken::new();
    let shutdown_clone = shutdown.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        shutdown_clone.cancel();
    });

    let exit = supervisor.run(shutdown).await;
    assert_eq!(exit, exit_code::FORCED_CANCEL);
}
