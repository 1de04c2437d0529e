//! Provider Router — component C. A pure dispatch table keyed by
//! `(market, task_type)`, built once at startup (spec.md §4.C, §9).

use crate::error::UpstreamError;
use crate::providers::{CnPrimaryAdapter, HkTertiaryAdapter, ProviderAdapter, UsSecondaryAdapter};
use crate::types::{Endpoint, Market, RequestSpec, RouteRequest, TaskType};
use crate::validators::ResponseValidator;

pub struct ProviderRouterConfig {
    pub cn_base_url: String,
    pub us_base_url: String,
    pub hk_base_url: String,
}

pub struct ProviderRouter {
    cn: CnPrimaryAdapter,
    us: UsSecondaryAdapter,
    hk: HkTertiaryAdapter,
}

impl ProviderRouter {
    pub fn new(config: ProviderRouterConfig) -> Self {
        Self {
            cn: CnPrimaryAdapter::new(config.cn_base_url),
            us: UsSecondaryAdapter::new(config.us_base_url),
            hk: HkTertiaryAdapter::new(config.hk_base_url),
        }
    }

    /// Dispatches `req` to the correct adapter and has it build the request.
    /// Unknown `(market, task_type)` pairs fail with `UnsupportedTask`
    /// (terminal per spec.md §7).
    pub fn route(
        &self,
        mut req: RouteRequest,
    ) -> Result<(RequestSpec, &dyn ResponseValidator), UpstreamError> {
        let adapter: &dyn ProviderAdapter = match req.market {
            Market::Cn => {
                if req.endpoint.is_none() {
                    req.endpoint = Some(match req.task_type {
                        TaskType::OneMRealtime
                        | TaskType::FiveMRealtime
                        | TaskType::FifteenMRealtime
                        | TaskType::FifteenMBackfill
                        | TaskType::OneDBackfill => Endpoint::Kline,
                        other => {
                            return Err(UpstreamError::UnsupportedTask {
                                market: req.market,
                                task_type: other,
                            })
                        }
                    });
                }
                &self.cn
            }
            Market::Us if req.task_type == TaskType::UsOneMRealtime => {
                req.endpoint.get_or_insert(Endpoint::Minute);
                &self.us
            }
            Market::Hk if req.task_type == TaskType::HkOneMRealtime => {
                req.endpoint.get_or_insert(Endpoint::Minute);
                &self.hk
            }
            _ => {
                return Err(UpstreamError::UnsupportedTask {
                    market: req.market,
                    task_type: req.task_type,
                })
            }
        };

        let spec = adapter.build_request(&req)?;
        Ok((spec, adapter.validator()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn router() -> ProviderRouter {
        ProviderRouter::new(ProviderRouterConfig {
            cn_base_url: "https://cn-data-provider.example.com".to_string(),
            us_base_url: "https://us-data-provider.example.com".to_string(),
            hk_base_url: "https://hk-data-provider.example.com".to_string(),
        })
    }

    fn req(market: Market, task_type: TaskType, endpoint: Option<Endpoint>) -> RouteRequest {
        RouteRequest {
            market,
            task_type,
            endpoint,
            symbol: "SH600000".to_string(),
            start_date: None,
            end_date: None,
            period: Some("1m".to_string()),
            count: Some(10),
            method_override: None,
            headers_override: HashMap::new(),
            body_override: None,
        }
    }

    #[test]
    fn cn_realtime_dispatches_to_kline() {
        let (spec, _) = router()
            .route(req(Market::Cn, TaskType::OneMRealtime, None))
            .unwrap();
        assert!(spec.url.ends_with("/v5/stock/chart/kline.json"));
    }

    #[test]
    fn cn_explicit_endpoint_overrides_task_type_default() {
        let (spec, _) = router()
            .route(req(Market::Cn, TaskType::OneMRealtime, Some(Endpoint::Quote)))
            .unwrap();
        assert!(spec.url.ends_with("/v5/stock/quote.json"));
    }

    #[test]
    fn cn_backfill_dispatches_to_kline() {
        let (spec, _) = router()
            .route(req(Market::Cn, TaskType::OneDBackfill, None))
            .unwrap();
        assert!(spec.url.ends_with("/v5/stock/chart/kline.json"));
    }

    #[test]
    fn us_task_dispatches_to_secondary_adapter() {
        let (spec, _) = router()
            .route(req(Market::Us, TaskType::UsOneMRealtime, None))
            .unwrap();
        assert!(spec.url.starts_with("https://us-data-provider.example.com"));
    }

    #[test]
    fn unknown_pair_is_unsupported() {
        let err = router()
            .route(req(Market::Us, TaskType::OneMRealtime, None))
            .unwrap_err();
        assert!(matches!(err, UpstreamError::UnsupportedTask { .. }));
    }
}
