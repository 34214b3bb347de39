//! Client configuration

use std::time::Duration;

/// Recommended deadline for create/update calls raced with `with_timeout`
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Sync Client configuration
#[derive(Debug, Clone)]
pub struct SdkConfig {
    /// Base URL of the subscription API (trailing slash is ignored)
    pub base_url: String,
    /// Transport-level timeout for a single HTTP request
    pub request_timeout: Duration,
    /// Deadline used by `SyncClient::with_default_timeout`
    pub operation_timeout: Duration,
    /// Optional User-Agent header
    pub user_agent: Option<String>,
}

impl Default for SdkConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            request_timeout: Duration::from_secs(60),
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
            user_agent: None,
        }
    }
}

impl SdkConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    /// Create config from environment
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: std::env::var("SYNCRO_BASE_URL").unwrap_or_else(|_| defaults.base_url.clone()),
            request_timeout: std::env::var("SYNCRO_REQUEST_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
            operation_timeout: std::env::var("SYNCRO_OPERATION_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.operation_timeout),
            user_agent: std::env::var("SYNCRO_USER_AGENT").ok(),
        }
    }

    /// Base URL without a trailing slash
    pub fn normalized_base_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }
}
