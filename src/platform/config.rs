//! Worker configuration loaded from environment variables (spec.md §6).
//! Mirrors the teacher's `AppConfig::from_env()`/`validate()` pattern in
//! `src/utils/config.rs` — plain `std::env::var` reads with hardcoded
//! defaults, not a generic config-file layer, since this worker has no
//! config file of its own.

use std::env;

use crate::task::{Tier, MAX_REQUEST_TIMEOUT_SECS};

const DEFAULT_GRACEFUL_SHUTDOWN_TIMEOUT_SECS: u64 = 120;
const DEFAULT_MAX_CONCURRENT_TASKS: usize = 10;
const DEFAULT_DRAGONFLY_HOST: &str = "localhost";
const DEFAULT_DRAGONFLY_PORT: u16 = 6379;
const DEFAULT_DRAGONFLY_DB: i64 = 0;

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub worker_id: String,
    pub tier: Tier,
    pub max_concurrent_tasks: usize,
    pub task_timeout_seconds: u64,
    pub graceful_shutdown_timeout_secs: u64,
    pub dragonfly_host: String,
    pub dragonfly_port: u16,
    pub dragonfly_db: i64,
    pub enable_proxy_injection: bool,
    pub enable_cookie_injection: bool,
    pub cn_provider_base_url: String,
    pub us_provider_base_url: String,
    pub hk_provider_base_url: String,
    pub log_level: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_id: "worker-0".to_string(),
            tier: Tier::Normal,
            max_concurrent_tasks: DEFAULT_MAX_CONCURRENT_TASKS,
            task_timeout_seconds: MAX_REQUEST_TIMEOUT_SECS,
            graceful_shutdown_timeout_secs: DEFAULT_GRACEFUL_SHUTDOWN_TIMEOUT_SECS,
            dragonfly_host: DEFAULT_DRAGONFLY_HOST.to_string(),
            dragonfly_port: DEFAULT_DRAGONFLY_PORT,
            dragonfly_db: DEFAULT_DRAGONFLY_DB,
            enable_proxy_injection: true,
            enable_cookie_injection: true,
            cn_provider_base_url: "https://cn-data-provider.example.com".to_string(),
            us_provider_base_url: "https://us-data-provider.example.com".to_string(),
            hk_provider_base_url: "https://hk-data-provider.example.com".to_string(),
            log_level: "info".to_string(),
        }
    }
}

impl WorkerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            worker_id: env::var("WORKER_ID").unwrap_or(defaults.worker_id),
            tier: env::var("PRIORITY_LEVEL")
                .ok()
                .and_then(|raw| Tier::parse(&raw))
                .unwrap_or(defaults.tier),
            max_concurrent_tasks: env::var("MAX_CONCURRENT_TASKS")
                .ok()
                .and_then(|raw| raw.parse().ok())
                .unwrap_or(defaults.max_concurrent_tasks),
            task_timeout_seconds: env::var("TASK_TIMEOUT_SECONDS")
                .ok()
                .and_then(|raw| raw.parse().ok())
                .unwrap_or(defaults.task_timeout_seconds),
            graceful_shutdown_timeout_secs: env::var("GRACEFUL_SHUTDOWN_TIMEOUT")
                .ok()
                .and_then(|raw| raw.parse().ok())
                .unwrap_or(defaults.graceful_shutdown_timeout_secs),
            dragonfly_host: env::var("DRAGONFLY_HOST").unwrap_or(defaults.dragonfly_host),
            dragonfly_port: env::var("DRAGONFLY_PORT")
                .ok()
                .and_then(|raw| raw.parse().ok())
                .unwrap_or(defaults.dragonfly_port),
            dragonfly_db: env::var("DRAGONFLY_DB")
                .ok()
                .and_then(|raw| raw.parse().ok())
                .unwrap_or(defaults.dragonfly_db),
            enable_proxy_injection: env::var("ENABLE_PROXY_INJECTION")
                .ok()
                .and_then(|raw| parse_bool(&raw))
                .unwrap_or(defaults.enable_proxy_injection),
            enable_cookie_injection: env::var("ENABLE_COOKIE_INJECTION")
                .ok()
                .and_then(|raw| parse_bool(&raw))
                .unwrap_or(defaults.enable_cookie_injection),
            cn_provider_base_url: env::var("CN_PROVIDER_BASE_URL").unwrap_or(defaults.cn_provider_base_url),
            us_provider_base_url: env::var("US_PROVIDER_BASE_URL").unwrap_or(defaults.us_provider_base_url),
            hk_provider_base_url: env::var("HK_PROVIDER_BASE_URL").unwrap_or(defaults.hk_provider_base_url),
            log_level: env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
        }
    }

    /// Clamps and rejects per spec.md §6: `TASK_TIMEOUT_SECONDS` hard-capped
    /// at 45 for the request stage, `WORKER_ID` must be non-empty.
    pub fn validate(&mut self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.worker_id.trim().is_empty() {
            errors.push("WORKER_ID must be set and non-empty".to_string());
        }
        if self.max_concurrent_tasks == 0 {
            errors.push("MAX_CONCURRENT_TASKS must be greater than 0".to_string());
        }
        if self.task_timeout_seconds > MAX_REQUEST_TIMEOUT_SECS {
            self.task_timeout_seconds = MAX_REQUEST_TIMEOUT_SECS;
        }
        if self.graceful_shutdown_timeout_secs == 0 {
            errors.push("GRACEFUL_SHUTDOWN_TIMEOUT must be greater than 0".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_clamps_oversized_timeout_to_45() {
        let mut config = WorkerConfig {
            task_timeout_seconds: 120,
            ..WorkerConfig::default()
        };
        config.validate().unwrap();
        assert_eq!(config.task_timeout_seconds, 45);
    }

    #[test]
    fn validate_rejects_empty_worker_id() {
        let mut config = WorkerConfig {
            worker_id: "  ".to_string(),
            ..WorkerConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
