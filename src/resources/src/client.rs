//! Resource Cache Client (spec.md §4.A) — read-through access to cookies and
//! proxy lists living in the broker's keyspace, with short-TTL memoization.
//!
//! Grounded on `src/layer2/src/resource_coordinator.rs` in the teacher repo:
//! same `Arc<RwLock<HashMap<_, _>>>` cache-of-last-known-good shape, same
//! "refresh on miss, invalidate on error" discipline, generalized from
//! planning resources to cookies/proxies.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use rand::seq::SliceRandom;
use redis::aio::ConnectionManager;
use tokio::sync::RwLock;
use tracing::warn;

use crate::error::ResourceError;
use crate::types::{CookieRecord, Market, ProxyList};

const PROXY_MEMO_TTL: Duration = Duration::from_secs(5);
const COOKIE_MEMO_TTL: Duration = Duration::from_secs(60);

/// Contract the rest of the core depends on. A trait so the executor can be
/// tested against an in-memory fake without a live broker (spec.md §8).
#[async_trait]
pub trait ResourceCacheClient: Send + Sync {
    /// Resolves a cookie's text by id. `Ok(None)` on cache miss — never an
    /// error; spec.md §4.A says both lookups "return `none` on miss without
    /// raising".
    async fn get_cookie(
        &self,
        market: Market,
        cookie_id: &str,
    ) -> Result<Option<String>, ResourceError>;

    /// Picks a fresh random proxy URL for the market, or `None` if the active
    /// list is empty or unset.
    async fn get_random_proxy(&self, market: Market) -> Result<Option<String>, ResourceError>;

    /// Drops any memoized proxy list for `market`, forcing the next
    /// `get_random_proxy` call to re-fetch. Called by the task executor when
    /// a request through a resolved proxy fails (spec.md §7 — `proxy_error`
    /// disposition "no-ack; proxy list cache invalidated").
    async fn invalidate_proxy(&self, market: Market);
}

struct CachedProxies {
    list: ProxyList,
    cached_at: Instant,
}

struct CachedCookie {
    record: CookieRecord,
    cached_at: Instant,
}

/// Redis(-protocol)-backed implementation. One instance per worker process,
/// constructed during platform startup and shared via `Arc`.
pub struct RedisResourceCacheClient {
    conn: ConnectionManager,
    proxy_memo: RwLock<HashMap<Market, CachedProxies>>,
    cookie_memo: RwLock<HashMap<(Market, String), CachedCookie>>,
}

impl RedisResourceCacheClient {
    pub async fn connect(host: &str, port: u16, db: i64) -> Result<Self, ResourceError> {
        let url = format!("redis://{host}:{port}/{db}");
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self {
            conn,
            proxy_memo: RwLock::new(HashMap::new()),
            cookie_memo: RwLock::new(HashMap::new()),
        })
    }

    pub fn from_connection_manager(conn: ConnectionManager) -> Self {
        Self {
            conn,
            proxy_memo: RwLock::new(HashMap::new()),
            cookie_memo: RwLock::new(HashMap::new()),
        }
    }

    async fn fetch_proxy_list(&self, market: Market) -> Result<ProxyList, ResourceError> {
        let key = format!("proxy:{market}:active_proxies");
        let mut conn = self.conn.clone();
        let raw: Option<String> = redis::cmd("GET").arg(&key).query_async(&mut conn).await?;
        match raw {
            Some(body) => serde_json::from_str(&body)
                .map_err(|source| ResourceError::Malformed { key, source }),
            None => Ok(ProxyList::default()),
        }
    }

    async fn fetch_cookie(
        &self,
        market: Market,
        cookie_id: &str,
    ) -> Result<Option<CookieRecord>, ResourceError> {
        let key = format!("cookie:{market}:{cookie_id}");
        let mut conn = self.conn.clone();
        let raw: Option<String> = redis::cmd("GET").arg(&key).query_async(&mut conn).await?;
        match raw {
            Some(body) => {
                let record: CookieRecord = serde_json::from_str(&body)
                    .map_err(|source| ResourceError::Malformed { key, source })?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl ResourceCacheClient for RedisResourceCacheClient {
    async fn get_cookie(
        &self,
        market: Market,
        cookie_id: &str,
    ) -> Result<Option<String>, ResourceError> {
        let now = Utc::now();
        {
            let memo = self.cookie_memo.read().await;
            if let Some(cached) = memo.get(&(market, cookie_id.to_string())) {
                let fresh = cached.cached_at.elapsed() < COOKIE_MEMO_TTL
                    && cached.record.expires_at > now;
                if fresh {
                    return Ok(Some(cached.record.cookie_text.clone()));
                }
            }
        }

        match self.fetch_cookie(market, cookie_id).await {
            Ok(Some(record)) => {
                let text = record.cookie_text.clone();
                let mut memo = self.cookie_memo.write().await;
                memo.insert(
                    (market, cookie_id.to_string()),
                    CachedCookie {
                        record,
                        cached_at: Instant::now(),
                    },
                );
                Ok(Some(text))
            }
            Ok(None) => {
                let mut memo = self.cookie_memo.write().await;
                memo.remove(&(market, cookie_id.to_string()));
                Ok(None)
            }
            Err(err) => {
                let mut memo = self.cookie_memo.write().await;
                memo.remove(&(market, cookie_id.to_string()));
                warn!(%market, cookie_id, error = %err, "cookie cache invalidated after fetch error");
                Err(err)
            }
        }
    }

    async fn get_random_proxy(&self, market: Market) -> Result<Option<String>, ResourceError> {
        {
            let memo = self.proxy_memo.read().await;
            if let Some(cached) = memo.get(&market) {
                if cached.cached_at.elapsed() < PROXY_MEMO_TTL {
                    return Ok(pick_random(&cached.list.proxies));
                }
            }
        }

        match self.fetch_proxy_list(market).await {
            Ok(list) => {
                let picked = pick_random(&list.proxies);
                let mut memo = self.proxy_memo.write().await;
                memo.insert(
                    market,
                    CachedProxies {
                        list,
                        cached_at: Instant::now(),
                    },
                );
                Ok(picked)
            }
            Err(err) => {
                let mut memo = self.proxy_memo.write().await;
                memo.remove(&market);
                warn!(%market, error = %err, "proxy cache invalidated after fetch error");
                Err(err)
            }
        }
    }

    async fn invalidate_proxy(&self, market: Market) {
        let mut memo = self.proxy_memo.write().await;
        memo.remove(&market);
    }
}

fn pick_random(proxies: &[String]) -> Option<String> {
    proxies.choose(&mut rand::thread_rng()).cloned()
}

/// In-memory fake for tests that never touches a broker. Lives here (rather
/// than behind `#[cfg(test)]`) because the root crate's test suite needs it
/// too, the same cross-crate sharing the teacher gives its own hand-rolled
/// test doubles.
pub struct FakeResourceCacheClient {
    pub cookies: RwLock<HashMap<(Market, String), CookieRecord>>,
    pub proxies: RwLock<HashMap<Market, Vec<String>>>,
}

impl Default for FakeResourceCacheClient {
    fn default() -> Self {
        Self {
            cookies: RwLock::new(HashMap::new()),
            proxies: RwLock::new(HashMap::new()),
        }
    }
}

impl FakeResourceCacheClient {
    pub async fn set_cookie(&self, market: Market, cookie_id: &str, text: &str) {
        let mut cookies = self.cookies.write().await;
        cookies.insert(
            (market, cookie_id.to_string()),
            CookieRecord {
                cookie_text: text.to_string(),
                expires_at: Utc::now() + chrono::Duration::hours(1),
            },
        );
    }

    pub async fn set_proxies(&self, market: Market, proxies: Vec<String>) {
        let mut all = self.proxies.write().await;
        all.insert(market, proxies);
    }
}

#[async_trait]
impl ResourceCacheClient for FakeResourceCacheClient {
    async fn get_cookie(
        &self,
        market: Market,
        cookie_id: &str,
    ) -> Result<Option<String>, ResourceError> {
        let cookies = self.cookies.read().await;
        Ok(cookies
            .get(&(market, cookie_id.to_string()))
            .map(|r| r.cookie_text.clone()))
    }

    async fn get_random_proxy(&self, market: Market) -> Result<Option<String>, ResourceError> {
        let proxies = self.proxies.read().await;
        Ok(proxies.get(&market).and_then(|list| pick_random(list)))
    }

    async fn invalidate_proxy(&self, market: Market) {
        let mut proxies = self.proxies.write().await;
        proxies.remove(&market);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fake_returns_none_on_miss() {
        let client = FakeResourceCacheClient::default();
        assert_eq!(client.get_cookie(Market::Cn, "nope").await.unwrap(), None);
        assert_eq!(client.get_random_proxy(Market::Cn).await.unwrap(), None);
    }

    #[tokio::test]
    async fn fake_returns_set_cookie() {
        let client = FakeResourceCacheClient::default();
        client.set_cookie(Market::Cn, "c1", "cookietext").await;
        assert_eq!(
            client.get_cookie(Market::Cn, "c1").await.unwrap(),
            Some("cookietext".to_string())
        );
    }

    #[tokio::test]
    async fn fake_picks_from_proxy_list() {
        let client = FakeResourceCacheClient::default();
        client
            .set_proxies(Market::Us, vec!["http://p1:8080".to_string()])
            .await;
        assert_eq!(
            client.get_random_proxy(Market::Us).await.unwrap(),
            Some("http://p1:8080".to_string())
        );
    }
}
