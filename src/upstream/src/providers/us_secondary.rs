//! Secondary (US market) provider adapter — interface-compatible with the CN
//! primary adapter per spec.md §4.C ("`us_*` → secondary provider adapter
//! (interface-compatible)").

use std::collections::HashMap;

use crate::error::UpstreamError;
use crate::providers::ProviderAdapter;
use crate::types::{HttpMethod, RequestSpec, RouteRequest};
use crate::validators::{ResponseValidator, UsEnvelopeValidator};

pub struct UsSecondaryAdapter {
    base_url: String,
    validator: UsEnvelopeValidator,
}

impl UsSecondaryAdapter {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            validator: UsEnvelopeValidator,
        }
    }
}

impl ProviderAdapter for UsSecondaryAdapter {
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
