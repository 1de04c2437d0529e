//! Wire types for the resource cache keyspace (spec.md §3, §6).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The three markets this service crawls. Shared across the workspace so the
/// upstream provider router and the cache client agree on keyspace shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Market {
    Cn,
    Us,
    Hk,
}

impl Market {
    /// Uppercase tag used in the cache keyspace (`cookie:CN:…`) and handy for metrics/log fields.
    pub fn as_str(&self) -> &'static str {
        match self {
            Market::Cn => "CN",
            Market::Us => "US",
            Market::Hk => "HK",
        }
    }
}

impl std::fmt::Display for Market {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `cookie:<market>:<cookie_id>` → this, JSON-decoded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CookieRecord {
    pub cookie_text: String,
    pub expires_at: DateTime<Utc>,
}

/// `proxy:<market>:active_proxies` → this, JSON-decoded.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProxyList {
    pub proxies: Vec<String>,
    #[serde(default)]
    pub refreshed_at: Option<DateTime<Utc>>,
}
