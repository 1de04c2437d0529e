//! Upstream Request Executor — component B. Issues one HTTP request and
//! returns a validated envelope, enforcing header injection, proxy routing,
//! and the hard deadline (spec.md §4.B).
//!
//! Grounded on the timeout-wrapped single-shot request pattern in the
//! teacher's `src/layer4/src/executor.rs::execute_task_with_agent`
//! (`tokio::time::timeout` around one unit of work, mapped to a typed
//! timeout error on expiry).

use std::collections::HashMap;
use std::time::Duration;

use rand::seq::SliceRandom;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::UpstreamError;
use crate::types::{HttpMethod, RequestSpec, ValidatedEnvelope};
use crate::validators::ResponseValidator;

/// Rotating pool of realistic desktop User-Agent strings (spec.md §4.B).
const USER_AGENT_POOL: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:125.0) Gecko/20100101 Firefox/125.0",
];

fn random_user_agent() -> &'static str {
    USER_AGENT_POOL
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(USER_AGENT_POOL[0])
}

/// Shared, process-wide HTTP client plus the per-request execution logic.
/// Constructed once at worker startup (spec.md §9 — "no lazy singletons
/// inside the request path").
pub struct UpstreamRequestExecutor {
    direct_client: reqwest::Client,
    /// Per-proxy-URL client cache, so a proxy picked repeatedly out of the
    /// active list (spec.md §4.A) doesn't pay a fresh connector/TLS setup on
    /// every single task that happens to draw it.
    proxy_clients: RwLock<HashMap<String, reqwest::Client>>,
}

impl UpstreamRequestExecutor {
    pub fn new(direct_client: reqwest::Client) -> Self {
        Self {
            direct_client,
            proxy_clients: RwLock::new(HashMap::new()),
        }
    }

    /// Issues `spec` with the given cookie/proxy injected, enforcing
    /// `deadline`, and validates the response through `validator`.
    pub async fn execute(
        &self,
        spec: &RequestSpec,
        cookie: Option<&str>,
        proxy: Option<&str>,
        deadline: Duration,
        validator: &dyn ResponseValidator,
    ) -> Result<ValidatedEnvelope, UpstreamError> {
        let client = self.client_for(proxy).await?;
        let request = self.build_request(&client, spec, cookie);

        let response = tokio::time::timeout(deadline, request.send())
            .await
            .map_err(|_| UpstreamError::Timeout(deadline))?
            .map_err(|err| {
                if proxy.is_some() && (err.is_connect() || err.is_request()) {
                    UpstreamError::Proxy(err.to_string())
                } else {
                    UpstreamError::from_reqwest(err)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(UpstreamError::HttpStatus(status.as_u16()));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|err| UpstreamError::Decode(err.to_string()))?;

        debug!(status = status.as_u16(), "upstream response received");
        validator.validate(body)
    }

    async fn client_for(&self, proxy: Option<&str>) -> Result<reqwest::Client, UpstreamError> {
        let Some(url) = proxy else {
            return Ok(self.direct_client.clone());
        };

        {
            let cached = self.proxy_clients.read().await;
            if let Some(client) = cached.get(url) {
                return Ok(client.clone());
            }
        }

        let proxy_config =
            reqwest::Proxy::all(url).map_err(|err| UpstreamError::Proxy(err.to_string()))?;
        let client = reqwest::Client::builder()
            .proxy(proxy_config)
            .build()
            .map_err(|err| UpstreamError::Proxy(err.to_string()))?;

        self.proxy_clients
            .write()
            .await
            .insert(url.to_string(), client.clone());
        Ok(client)
    }

    fn build_request(
        &self,
        client: &reqwest::Client,
        spec: &RequestSpec,
        cookie: Option<&str>,
    ) -> reqwest::RequestBuilder {
        let mut builder = match spec.method {
            HttpMethod::Get => client.get(&spec.url),
            HttpMethod::Post => client.post(&spec.url),
        };

        builder = builder
            .query(&spec.query)
            .header("User-Agent", random_user_agent())
            .header("Accept", "application/json, text/plain, */*")
            .header("Accept-Language", "zh-CN,zh;q=0.9,en;q=0.8")
            .header("X-Requested-With", "XMLHttpRequest");

        for (key, value) in &spec.headers {
            builder = builder.header(key.as_str(), value.as_str());
        }

        if let Some(cookie) = cookie {
            builder = builder.header("Cookie", cookie);
        }

        if let Some(body) = &spec.body {
            builder = builder.json(body);
        }

        builder
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validators::CnEnvelopeValidator;
    use std::collections::HashMap;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn spec(url: String) -> RequestSpec {
        RequestSpec {
            url,
            method: HttpMethod::Get,
            query: vec![("symbol".to_string(), "SH600000".to_string())],
            headers: HashMap::new(),
            body: None,
        }
    }

    #[tokio::test]
    async fn successful_response_is_validated() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v5/stock/chart/kline.json"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"error_code": 0, "data": {"item": [1,2,3]}})),
            )
            .mount(&server)
            .await;

        let executor = UpstreamRequestExecutor::new(reqwest::Client::new());
        let envelope = executor
            .execute(
                &spec(format!("{}/v5/stock/chart/kline.json", server.uri())),
                Some("cookietext"),
                None,
                Duration::from_secs(5),
                &CnEnvelopeValidator,
            )
            .await
            .unwrap();

        assert_eq!(envelope.records_count, 3);
    }

    #[tokio::test]
    async fn timeout_is_reported_as_timeout_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/slow"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(200)))
            .mount(&server)
            .await;

        let executor = UpstreamRequestExecutor::new(reqwest::Client::new());
        let err = executor
            .execute(
                &spec(format!("{}/slow", server.uri())),
                None,
                None,
                Duration::from_millis(20),
                &CnEnvelopeValidator,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, UpstreamError::Timeout(_)));
    }

    #[tokio::test]
    async fn non_2xx_status_is_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/broken"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let executor = UpstreamRequestExecutor::new(reqwest::Client::new());
        let err = executor
            .execute(
                &spec(format!("{}/broken", server.uri())),
                None,
                None,
                Duration::from_secs(5),
                &CnEnvelopeValidator,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, UpstreamError::HttpStatus(500)));
    }
}
