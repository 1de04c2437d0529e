//! Provider adapters — the extensibility point referenced in spec.md §9:
//! "the only extensibility point is adding a new provider adapter that
//! implements the `{validate, extract_records_count}` pair."

pub mod cn_primary;
pub mod hk_tertiary;
pub mod us_secondary;

use crate::error::UpstreamError;
use crate::types::{RequestSpec, RouteRequest};
use crate::validators::ResponseValidator;

/// An upstream market's endpoint family. Stateless: built once at startup
/// and held behind `&'static`/`Arc` references (spec.md §9 — "a static
/// dispatch table built at startup").
pub trait ProviderAdapter: Send + Sync {
    fn build_request(&self, req: &RouteRequest) -> Result<RequestSpec, UpstreamError>;
    fn validator(&self) -> &dyn ResponseValidator;
}

pub use cn_primary::CnPrimaryAdapter;
pub use hk_tertiary::HkTertiaryAdapter;
pub use us_secondary::UsSecondaryAdapter;
