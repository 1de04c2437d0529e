//! Tertiary (HK market) provider adapter — interface-compatible with the CN
//! primary adapter per spec.md §4.C ("`hk_*` → tertiary provider adapter").

use std::collections::HashMap;

use crate::error::UpstreamError;
use crate::providers::ProviderAdapter;
use crate::types::{HttpMethod, RequestSpec, RouteRequest};
use crate::validators::{HkEnvelopeValidator, ResponseValidator};

pub struct HkTertiaryAdapter {
    base_url: String,
    validator: HkEnvelopeValidator,
}

impl HkTertiaryAdapter {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            validator: HkEnvelopeValidator,
        }
    }
}

impl ProviderAdapter for HkTertiaryAdapter {
    fn build_request(&self, req: &RouteRequest) -> Result<RequestSpec, UpstreamError> {
        let url = format!("{}/v1/minute", self.base_url);
        let mut query = vec![("symbol".to_string(), req.symbol.clone())];
        if let Some(count) = req.count {
            query.push(("count".to_string(), count.to_string()));
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
