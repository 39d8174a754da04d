use std::path::PathBuf;
use std::time::Duration;

use crate::config::MAX_TOKEN_REFRESH_MARGIN_SECS;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub store_url: String,
    pub store_key: String,
    pub env: Environment,
    pub log_level: String,
    pub policy_path: PathBuf,
    pub erp_base_url: String,
    pub request_timeout_secs: u64,
    pub user_agent: String,
    pub page_size: u32,
    pub inter_page_delay_ms: u64,
    pub detail_delay_ms: u64,
    pub rate_limit_backoff_ms: u64,
    pub max_rate_limit_retries: u32,
    pub network_retry_delay_ms: u64,
    pub max_network_retries: u32,
    pub token_refresh_margin_secs: u64,
}

impl AppConfig {
    #[must_use]
    pub fn inter_page_delay(&self) -> Duration {
        Duration::from_millis(self.inter_page_delay_ms)
    }

    #[must_use]
    pub fn detail_delay(&self) -> Duration {
        Duration::from_millis(self.detail_delay_ms)
    }

    #[must_use]
    pub fn rate_limit_backoff(&self) -> Duration {
        Duration::from_millis(self.rate_limit_backoff_ms)
    }

    #[must_use]
    pub fn network_retry_delay(&self) -> Duration {
        Duration::from_millis(self.network_retry_delay_ms)
    }

    /// Refresh margin, capped at [`MAX_TOKEN_REFRESH_MARGIN_SECS`].
    #[must_use]
    pub fn token_refresh_margin(&self) -> chrono::Duration {
        let secs = self
            .token_refresh_margin_secs
            .min(MAX_TOKEN_REFRESH_MARGIN_SECS);
        i64::try_from(secs).map_or_else(|_| chrono::Duration::zero(), chrono::Duration::seconds)
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("log_level", &self.log_level)
            .field("policy_path", &self.policy_path)
            .field("store_url", &self.store_url)
            .field("store_key", &"[redacted]")
            .field("erp_base_url", &self.erp_base_url)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("user_agent", &self.user_agent)
            .field("page_size", &self.page_size)
            .field("inter_page_delay_ms", &self.inter_page_delay_ms)
            .field("detail_delay_ms", &self.detail_delay_ms)
            .field("rate_limit_backoff_ms", &self.rate_limit_backoff_ms)
            .field("max_rate_limit_retries", &self.max_rate_limit_retries)
            .field("network_retry_delay_ms", &self.network_retry_delay_ms)
            .field("max_network_retries", &self.max_network_retries)
            .field("token_refresh_margin_secs", &self.token_refresh_margin_secs)
            .finish()
    }
}
