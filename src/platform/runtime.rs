//! Process bootstrap and shutdown — builds every shared handle once, spawns
//! the Worker Supervisor as the platform's one registered service, and
//! waits for either a drain to finish or an OS shutdown signal.
//!
//! Grounded on `Platform`/`PlatformRuntime` in the teacher's
//! `src/platform/runtime.rs`: same "build context, register services,
//! spawn with child tokens, await on shutdown" shape. This worker has a
//! single core service (the task pool) rather than the teacher's
//! telemetry+orchestration set, so `WorkerPlatform::run` returns the
//! supervisor's own exit code instead of a uniform `Ok(())`.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use crawler_resources::RedisResourceCacheClient;
use crawler_upstream::{ProviderRouter, ProviderRouterConfig, UpstreamRequestExecutor};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::consumer::{RedisBrokerConnection, StreamConsumer};
use crate::executor::TaskExecutor;
use crate::gate::ConcurrencyGate;
use crate::platform::config::WorkerConfig;
use crate::platform::context::WorkerContext;
use crate::platform::service::ServiceRegistration;
use crate::supervisor::{exit_code, SupervisorConfig, WorkerSupervisor};

pub struct WorkerPlatform {
    config: WorkerConfig,
    services: Vec<ServiceRegistration>,
}

impl WorkerPlatform {
    pub fn new(config: WorkerConfig) -> Self {
        Self {
            config,
            services: Vec::new(),
        }
    }

    pub fn register_service(&mut self, service: ServiceRegistration) {
        self.services.push(service);
    }

    /// Connects to the broker/cache, wires components A–G, and runs the
    /// worker to completion, returning the process exit code per spec.md §6.
    pub async fn run(self) -> i32 {
        initialize_logging(&self.config);

        let (context, broker) = match self.build_shared_state().await {
            Ok(pair) => pair,
            Err(err) => {
                error!(error = %err, "startup failed");
                return exit_code::STARTUP_FAILURE;
            }
        };

        let root_token = CancellationToken::new();

        let mut ambient_tasks = Vec::new();
        for service in &self.services {
            let handle = service.spawn(context.clone(), root_token.child_token());
            ambient_tasks.push((service.name().to_string(), handle));
        }

        let consumer = Arc::new(StreamConsumer::new(
            Arc::new(broker),
            context.config().tier,
            context.config().worker_id.clone(),
        ));
        let executor = Arc::new(
            TaskExecutor::new(
                context.resources(),
                context.router(),
                context.upstream(),
                context.gate(),
                context.config().worker_id.clone(),
            )
            .with_injection_flags(
                context.config().enable_cookie_injection,
                context.config().enable_proxy_injection,
            ),
        );
        let supervisor = Arc::new(WorkerSupervisor::new(
            SupervisorConfig {
                worker_id: context.config().worker_id.clone(),
                tier: context.config().tier,
                max_concurrent_tasks: context.config().max_concurrent_tasks,
                graceful_shutdown_timeout: Duration::from_secs(
                    context.config().graceful_shutdown_timeout_secs,
                ),
            },
            consumer,
            executor,
        ));

        let supervisor_token = root_token.child_token();
        let supervisor_handle = tokio::spawn({
            let supervisor = Arc::clone(&supervisor);
            async move { supervisor.run(supervisor_token).await }
        });

        info!(worker_id = %context.config().worker_id, tier = ?context.config().tier, "worker platform started");

        wait_for_shutdown_signal().await;
        info!("shutdown signal received, draining");
        root_token.cancel();

        let exit = match supervisor_handle.await {
            Ok(code) => code,
            Err(err) => {
                error!(error = %err, "supervisor task panicked during drain");
                exit_code::FORCED_CANCEL
            }
        };

        for (name, handle) in ambient_tasks {
            handle.abort();
            info!(service = %name, "ambient service stopped");
        }

        exit
    }

    async fn build_shared_state(&self) -> Result<(WorkerContext, RedisBrokerConnection)> {
        let resources = RedisResourceCacheClient::connect(
            &self.config.dragonfly_host,
            self.config.dragonfly_port,
            self.config.dragonfly_db,
        )
        .await
        .context("failed to connect resource cache client")?;

        let broker = RedisBrokerConnection::connect(
            &self.config.dragonfly_host,
            self.config.dragonfly_port,
            self.config.dragonfly_db,
        )
        .await
        .context("failed to connect broker")?;

        let router = ProviderRouter::new(ProviderRouterConfig {
            cn_base_url: self.config.cn_provider_base_url.clone(),
            us_base_url: self.config.us_provider_base_url.clone(),
            hk_base_url: self.config.hk_provider_base_url.clone(),
        });

        let upstream = UpstreamRequestExecutor::new(
            reqwest::Client::builder()
                .build()
                .context("failed to build HTTP client")?,
        );

        let gate = ConcurrencyGate::default();
        let shutdown = CancellationToken::new();

        let context = WorkerContext::new(
            self.config.clone(),
            Arc::new(resources),
            Arc::new(router),
            Arc::new(upstream),
            Arc::new(gate),
            shutdown,
        );

        Ok((context, broker))
    }
}

fn initialize_logging(config: &WorkerConfig) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(config.log_level.clone())
        .try_init();
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigint = signal(SignalKind::interrupt()).expect("failed to register SIGINT handler");
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to register SIGTERM handler");
        tokio::select! {
            _ = sigint.recv() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
