//! Primary CN equity data provider (spec.md §6). Endpoints are query-string
//! `GET`s returning the `{error_code, error_description?, data?}` envelope.

use std::collections::HashMap;

use crate::error::UpstreamError;
use crate::providers::ProviderAdapter;
use crate::types::{Endpoint, HttpMethod, RequestSpec, RouteRequest};
use crate::validators::{CnEnvelopeValidator, ResponseValidator};

pub struct CnPrimaryAdapter {
    base_url: String,
    validator: CnEnvelopeValidator,
}

impl CnPrimaryAdapter {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            validator: CnEnvelopeValidator,
        }
    }

    /// `period` mapping from spec.md §4.C: `{1m,5m,15m,30m → same; 1h→60m;
    /// 1d→day; 1w→week; 1M→month}`.
    fn map_period(period: &str) -> String {
        match period {
            "1m" | "5m" | "15m" | "30m" => period.to_string(),
            "1h" => "60m".to_string(),
            "1d" => "day".to_string(),
            "1w" => "week".to_string(),
            "1M" => "month".to_string(),
            other => other.to_string(),
        }
    }

    fn path_for(endpoint: Endpoint) -> &'static str {
        match endpoint {
            Endpoint::Kline => "/v5/stock/chart/kline.json",
            Endpoint::Quote => "/v5/stock/quote.json",
            Endpoint::BatchQuote => "/v5/stock/batch/quote.json",
            Endpoint::Minute => "/v5/stock/chart/minute.json",
            Endpoint::Detail => "/v5/stock/f10/cn/company.json",
        }
    }
}

impl ProviderAdapter for CnPrimaryAdapter {
    fn build_request(&self, req: &RouteRequest) -> Result<RequestSpec, UpstreamError> {
        let endpoint = req.endpoint.ok_or_else(|| UpstreamError::UnsupportedTask {
            market: req.market,
            task_type: req.task_type,
        })?;

        let url = format!("{}{}", self.base_url, Self::path_for(endpoint));
        let mut query = vec![("symbol".to_string(), req.symbol.clone())];

        match endpoint {
            Endpoint::Kline => {
                if let Some(period) = &req.period {
                    query.push(("period".to_string(), Self::map_period(period)));
                }
                if let Some(count) = req.count {
                    query.push(("count".to_string(), count.to_string()));
                }
                if let Some(start) = &req.start_date {
                    query.push(("start_date".to_string(), start.clone()));
                }
                if let Some(end) = &req.end_date {
                    query.push(("end_date".to_string(), end.clone()));
                }
            }
            Endpoint::Minute => {
                if let Some(count) = req.count {
                    query.push(("count".to_string(), count.to_string()));
                }
            }
            Endpoint::Quote | Endpoint::BatchQuote | Endpoint::Detail => {}
        }

        let mut headers = HashMap::new();
        headers.insert(
            "Referer".to_string(),
            format!("{}/S/{}", self.base_url, req.symbol),
        );
        headers.insert("Origin".to_string(), self.base_url.clone());
        for (k, v) in &req.headers_override {
            headers.insert(k.clone(), v.clone());
        }

        Ok(RequestSpec {
            url,
            method: req.method_override.unwrap_or(HttpMethod::Get),
            query,
            headers,
            body: req.body_override.clone(),
        })
    }

    fn validator(&self) -> &dyn ResponseValidator {
        &self.validator
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as Map;

    fn base_req(endpoint: Endpoint) -> RouteRequest {
        RouteRequest {
            market: crate::types::Market::Cn,
            task_type: crate::types::TaskType::OneMRealtime,
            endpoint: Some(endpoint),
            symbol: "SH600000".to_string(),
            start_date: None,
            end_date: None,
            period: Some("1m".to_string()),
            count: Some(100),
            method_override: None,
            headers_override: Map::new(),
            body_override: None,
        }
    }

    #[test]
    fn kline_builds_expected_query() {
        let adapter = CnPrimaryAdapter::new("https://cn-data-provider.example.com");
        let spec = adapter.build_request(&base_req(Endpoint::Kline)).unwrap();
        assert_eq!(spec.url, "https://cn-data-provider.example.com/v5/stock/chart/kline.json");
        assert!(spec.query.contains(&("symbol".to_string(), "SH600000".to_string())));
        assert!(spec.query.contains(&("period".to_string(), "1m".to_string())));
        assert!(spec.query.contains(&("count".to_string(), "100".to_string())));
    }

    #[test]
    fn hourly_period_maps_to_60m() {
        assert_eq!(CnPrimaryAdapter::map_period("1h"), "60m");
        assert_eq!(CnPrimaryAdapter::map_period("1d"), "day");
        assert_eq!(CnPrimaryAdapter::map_period("1w"), "week");
        assert_eq!(CnPrimaryAdapter::map_period("1M"), "month");
        assert_eq!(CnPrimaryAdapter::map_period("5m"), "5m");
    }

    #[test]
    fn caller_headers_override_defaults() {
        let adapter = CnPrimaryAdapter::new("https://cn-data-provider.example.com");
        let mut req = base_req(Endpoint::Quote);
        req.headers_override.insert("Origin".to_string(), "https://custom.example".to_string());
        let spec = adapter.build_request(&req).unwrap();
        assert_eq!(spec.headers.get("Origin").unwrap(), "https://custom.example");
    }
}
