//! Response-envelope validators (spec.md §4.B, §4.C, §9 — "the only
//! extensibility point is adding a new provider adapter that implements the
//! `{validate, extract_records_count}` pair").

use serde_json::Value;

use crate::error::UpstreamError;
use crate::types::{records_count, ValidatedEnvelope};

pub trait ResponseValidator: Send + Sync {
    fn validate(&self, body: Value) -> Result<ValidatedEnvelope, UpstreamError>;
}

/// CN primary provider: `{error_code:int, error_description?:string, data?:object}`.
/// `error_code == 0` is success (spec.md §6).
pub struct CnEnvelopeValidator;

impl ResponseValidator for CnEnvelopeValidator {
    fn validate(&self, body: Value) -> Result<ValidatedEnvelope, UpstreamError> {
        let code = body
            .get("error_code")
            .and_then(Value::as_i64)
            .ok_or_else(|| UpstreamError::Decode("missing error_code".to_string()))?;

        if code != 0 {
            let description = body
                .get("error_description")
                .and_then(Value::as_str)
                .unwrap_or("unknown provider error")
                .to_string();
            return Err(UpstreamError::Provider { code, description });
        }

        let data = body.get("data").cloned();
        let records_count = records_count(&data);
        Ok(ValidatedEnvelope {
            data,
            records_count,
        })
    }
}

/// Secondary (US) provider. Envelope shape is unspecified by spec.md (§9 open
/// question only covers the CN contract in detail); `{status, message, data}`
/// with `status == "ok"` as success is assumed, documented in DESIGN.md.
pub struct UsEnvelopeValidator;

impl ResponseValidator for UsEnvelopeValidator {
    fn validate(&self, body: Value) -> Result<ValidatedEnvelope, UpstreamError> {
        let status = body.get("status").and_then(Value::as_str).unwrap_or("");
        if status != "ok" {
            let description = body
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown provider error")
                .to_string();
            return Err(UpstreamError::Provider {
                code: -1,
                description,
            });
        }

        let data = body.get("data").cloned();
        let records_count = records_count(&data);
        Ok(ValidatedEnvelope {
            data,
            records_count,
        })
    }
}

/// Tertiary (HK) provider. Same assumption as the US adapter, with a
/// `ret_code`/`ret_msg` naming convention instead.
pub struct HkEnvelopeValidator;

impl ResponseValidator for HkEnvelopeValidator {
    fn validate(&self, body: Value) -> Result<ValidatedEnvelope, UpstreamError> {
        let ret_code = body.get("ret_code").and_then(Value::as_i64).unwrap_or(-1);
        if ret_code != 0 {
            let description = body
                .get("ret_msg")
                .and_then(Value::as_str)
                .unwrap_or("unknown provider error")
                .to_string();
            return Err(UpstreamError::Provider {
                code: ret_code,
                description,
            });
        }

        let data = body.get("data").cloned();
        let records_count = records_count(&data);
        Ok(ValidatedEnvelope {
            data,
            records_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn cn_success_counts_item_rows() {
        let body = json!({"error_code": 0, "data": {"item": [1,2,3]}});
        let envelope = CnEnvelopeValidator.validate(body).unwrap();
        assert_eq!(envelope.records_count, 3);
    }

    #[test]
    fn cn_nonzero_code_is_provider_error() {
        let body = json!({"error_code": 400016, "error_description": "token expired"});
        let err = CnEnvelopeValidator.validate(body).unwrap_err();
        match err {
            UpstreamError::Provider { code, description } => {
                assert_eq!(code, 400016);
                assert_eq!(description, "token expired");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn cn_falls_back_to_one_for_nonempty_object_without_known_collection() {
        let body = json!({"error_code": 0, "data": {"foo": "bar"}});
        let envelope = CnEnvelopeValidator.validate(body).unwrap();
        assert_eq!(envelope.records_count, 1);
    }

    #[test]
    fn cn_zero_for_absent_data() {
        let body = json!({"error_code": 0});
        let envelope = CnEnvelopeValidator.validate(body).unwrap();
        assert_eq!(envelope.records_count, 0);
    }
}
