//! Worker Supervisor — component G. Owns the per-process pool of in-flight
//! task slots, the consume-dispatch-ack loop, and graceful shutdown on
//! `SIGINT`/`SIGTERM` (spec.md §4.G).
//!
//! Grounded on the `CancellationToken` child-token propagation and
//! `ServiceRegistration` spawn idiom in the teacher's
//! `src/platform/runtime.rs`/`service.rs`, here driving a single
//! long-running service (the task pool) instead of a set of independently
//! registered ones — this process has exactly one thing to supervise.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::consumer::StreamConsumer;
use crate::executor::TaskExecutor;
use crate::task::{Task, Tier, WorkerDescriptor, WorkerStatus};

const DEFAULT_GRACEFUL_SHUTDOWN_TIMEOUT_SECS: u64 = 120;

/// Exit codes per spec.md §6.
pub mod exit_code {
    pub const CLEAN_SHUTDOWN: i32 = 0;
    pub const FORCED_CANCEL: i32 = 1;
    pub const STARTUP_FAILURE: i32 = 2;
}

pub struct SupervisorConfig {
    pub worker_id: String,
    pub tier: Tier,
    pub max_concurrent_tasks: usize,
    pub graceful_shutdown_timeout: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            worker_id: "worker-0".to_string(),
            tier: Tier::Normal,
            max_concurrent_tasks: 10,
            graceful_shutdown_timeout: Duration::from_secs(DEFAULT_GRACEFUL_SHUTDOWN_TIMEOUT_SECS),
        }
    }
}

/// Drives the read → dispatch → ack loop for one worker process. Holds no
/// state the request path needs directly; task execution is delegated to
/// [`TaskExecutor`], message flow to [`StreamConsumer`].
pub struct WorkerSupervisor {
    config: SupervisorConfig,
    consumer: Arc<StreamConsumer>,
    executor: Arc<TaskExecutor>,
    slots: Arc<Semaphore>,
    descriptor: Arc<RwLock<WorkerDescriptor>>,
    processed_total: Arc<AtomicU64>,
    failed_total: Arc<AtomicU64>,
    in_flight: Arc<AtomicUsize>,
    handles: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl WorkerSupervisor {
    pub fn new(config: SupervisorConfig, consumer: Arc<StreamConsumer>, executor: Arc<TaskExecutor>) -> Self {
        let descriptor = WorkerDescriptor {
            worker_id: config.worker_id.clone(),
            tier: config.tier,
            subscribed_queues: config.tier.queues(),
            max_concurrent: config.max_concurrent_tasks,
            status: WorkerStatus::Starting,
            in_flight_count: 0,
            processed_total: 0,
            failed_total: 0,
        };
        let slots = Arc::new(Semaphore::new(config.max_concurrent_tasks));
        Self {
            config,
            consumer,
            executor,
            slots,
            descriptor: Arc::new(RwLock::new(descriptor)),
            processed_total: Arc::new(AtomicU64::new(0)),
            failed_total: Arc::new(AtomicU64::new(0)),
            in_flight: Arc::new(AtomicUsize::new(0)),
            handles: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn descriptor(&self) -> Arc<RwLock<WorkerDescriptor>> {
        Arc::clone(&self.descriptor)
    }

    /// Runs until `shutdown` is cancelled (by a caller-driven signal handler
    /// or a test), then drains and returns the process exit code.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) -> i32 {
        if let Err(err) = self.consumer.init().await {
            error!(error = %err, "failed to initialize consumer groups");
            return exit_code::STARTUP_FAILURE;
        }

        match self.consumer.recover_pending().await {
            Ok(recovered) => {
                for message in recovered {
                    self.dispatch(message).await;
                }
            }
            Err(err) => {
                warn!(error = %err, "pending-entries recovery failed, continuing without it");
            }
        }

        self.set_status(WorkerStatus::Running).await;
        info!(worker_id = %self.config.worker_id, tier = ?self.config.tier, "worker running");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                poll = self.consumer.poll_once() => {
                    match poll {
                        Ok(messages) => {
                            for message in messages {
                                if shutdown.is_cancelled() {
                                    break;
                                }
                                self.dispatch(message).await;
                            }
                        }
                        Err(err) => {
                            warn!(error = %err, "broker read failed, retrying next cycle");
                        }
                    }
                }
            }
        }

        self.drain().await
    }

    /// Spawns one task unit: acquires a pool slot (blocking if the pool is
    /// saturated), decodes the message body, executes it, and acks/no-acks
    /// per the executor's outcome.
    async fn dispatch(&self, message: crate::consumer::BrokerMessage) {
        let permit = match Arc::clone(&self.slots).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => return, // semaphore closed during shutdown race
        };

        self.in_flight.fetch_add(1, Ordering::SeqCst);
        self.sync_descriptor().await;

        let consumer = Arc::clone(&self.consumer);
        let executor = Arc::clone(&self.executor);
        let processed_total = Arc::clone(&self.processed_total);
        let failed_total = Arc::clone(&self.failed_total);
        let in_flight = Arc::clone(&self.in_flight);
        let descriptor = Arc::clone(&self.descriptor);

        let handle = tokio::spawn(async move {
            let _permit = permit;
            let task: Result<Task, _> = serde_json::from_str(&message.body);
            match task {
                Ok(task) => {
                    let result = executor.execute(&task).await;
                    if result.success {
                        processed_total.fetch_add(1, Ordering::SeqCst);
                    } else {
                        failed_total.fetch_add(1, Ordering::SeqCst);
                    }
                    if result.is_terminal() {
                        consumer.ack(&message).await;
                    }
                }
                Err(err) => {
                    warn!(error = %err, task_id = %message.task_id, "undecodable task body, acking to avoid poison-message loop");
                    failed_total.fetch_add(1, Ordering::SeqCst);
                    consumer.ack(&message).await;
                }
            }
            in_flight.fetch_sub(1, Ordering::SeqCst);
            let mut guard = descriptor.write().await;
            guard.in_flight_count = in_flight.load(Ordering::SeqCst);
            guard.processed_total = processed_total.load(Ordering::SeqCst);
            guard.failed_total = failed_total.load(Ordering::SeqCst);
        });

        let mut handles = self.handles.lock().await;
        handles.retain(|h| !h.is_finished());
        handles.push(handle);
    }

    /// Stops accepting new work (the caller's read loop has already exited),
    /// waits up to `graceful_shutdown_timeout` for in-flight tasks to
    /// finish, and force-cancels any stragglers (spec.md §4.G).
    async fn drain(&self) -> i32 {
        self.set_status(WorkerStatus::Draining).await;
        info!(
            timeout_s = self.config.graceful_shutdown_timeout.as_secs(),
            in_flight = self.in_flight.load(Ordering::SeqCst),
            "entering drain"
        );

        let all_idle = Arc::clone(&self.slots)
            .acquire_many_owned(self.config.max_concurrent_tasks as u32);

        let exit = match tokio::time::timeout(self.config.graceful_shutdown_timeout, all_idle).await {
            Ok(Ok(_permit)) => {
                info!("drain completed cleanly");
                exit_code::CLEAN_SHUTDOWN
            }
            _ => {
                warn!("drain deadline expired, cancelling remaining tasks");
                let mut handles = self.handles.lock().await;
                for handle in handles.drain(..) {
                    if !handle.is_finished() {
                        handle.abort();
                    }
                }
                exit_code::FORCED_CANCEL
            }
        };

        self.set_status(WorkerStatus::Stopped).await;
        exit
    }

    async fn set_status(&self, status: WorkerStatus) {
        let mut guard = self.descriptor.write().await;
        guard.status = status;
    }

    async fn sync_descriptor(&self) {
        let mut guard = self.descriptor.write().await;
        guard.in_flight_count = self.in_flight.load(Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consumer::FakeBroker;
    use crate::executor::TaskExecutor;
    use crate::gate::ConcurrencyGate;
    use crawler_resources::FakeResourceCacheClient;
    use crawler_upstream::{ProviderRouter, ProviderRouterConfig, UpstreamRequestExecutor};
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn build_supervisor(server_uri: &str, max_concurrent: usize) -> (Arc<WorkerSupervisor>, Arc<FakeBroker>) {
        let broker = Arc::new(FakeBroker::default());
        let consumer = Arc::new(StreamConsumer::new(broker.clone(), Tier::Normal, "worker-1"));

        let resources = Arc::new(FakeResourceCacheClient::default());
        resources.set_cookie(crawler_upstream::Market::Cn, "c1", "cookietext").await;

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
            tier: Tier::Normal,
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

    #[tokio::test]
    async fn clean_shutdown_drains_in_flight_tasks_and_exits_zero() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v5/stock/chart/kline.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "error_code": 0,
                "data": {"item": [{"date": "2024-01-01"}]}
            })))
            .mount(&server)
            .await;

        let (supervisor, broker) = build_supervisor(&server.uri(), 10).await;
        broker.push("crawler_realtime_normal", "t1", &task_body("t1")).await;

        let shutdown = CancellationToken::new();
        let shutdown_clone = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            shutdown_clone.cancel();
        });

        let exit = supervisor.run(shutdown).await;
        assert_eq!(exit, exit_code::CLEAN_SHUTDOWN);
        assert_eq!(broker.pending_count().await, 0);
    }

    #[tokio::test]
    async fn undecodable_body_is_acked_to_avoid_poison_loop() {
        let server = MockServer::start().await;
        let (supervisor, broker) = build_supervisor(&server.uri(), 5).await;
        broker.push("crawler_realtime_normal", "bad", "not json").await;

        let shutdown = CancellationToken::new();
        let shutdown_clone = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            shutdown_clone.cancel();
        });

        supervisor.run(shutdown).await;
        assert_eq!(broker.pending_count().await, 0);
    }
}
