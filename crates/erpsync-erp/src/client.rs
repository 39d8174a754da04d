//! HTTP client for the ERP's v3 REST API.
//!
//! Every request resolves a fresh token through the [`TokenManager`],
//! retries 429s and dropped connections per the [`RetryPolicy`], and on a
//! 401 forces exactly one token refresh before retrying once more.

use std::time::Duration;

use erpsync_core::{AppConfig, Clock, CredentialGateway, SystemClock};
use reqwest::{Client, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{AuthError, ErpError};
use crate::pages::{PageCursor, PageWalker};
use crate::retry::{retry_fixed, AttemptError, RetryPolicy};
use crate::token::TokenManager;
use crate::types::Envelope;

/// Connection and pacing settings shared by every request of a client.
#[derive(Debug, Clone)]
pub struct ErpSettings {
    pub base_url: String,
    pub timeout: Duration,
    pub user_agent: String,
    pub page_size: u32,
    /// Pause between consecutive list pages.
    pub inter_page_delay: Duration,
    /// Pause before each detail request.
    pub detail_delay: Duration,
    pub retry: RetryPolicy,
    pub token_refresh_margin: chrono::Duration,
}

impl ErpSettings {
    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            base_url: config.erp_base_url.clone(),
            timeout: Duration::from_secs(config.request_timeout_secs),
            user_agent: config.user_agent.clone(),
            page_size: config.page_size,
            inter_page_delay: config.inter_page_delay(),
            detail_delay: config.detail_delay(),
            retry: RetryPolicy::from_config(config),
            token_refresh_margin: config.token_refresh_margin(),
        }
    }

    /// Default pacing pointed at `base_url`, with every sleep removed.
    #[must_use]
    pub fn for_tests(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(5),
            user_agent: "erpsync-test".to_string(),
            page_size: 100,
            inter_page_delay: Duration::ZERO,
            detail_delay: Duration::ZERO,
            retry: RetryPolicy::default().without_delays(),
            token_refresh_margin: chrono::Duration::minutes(10),
        }
    }
}

/// A raw response that is not a 429.
struct RawResponse {
    status: StatusCode,
    body: String,
}

/// Client for one ERP tenant.
pub struct ErpClient<G, C = SystemClock> {
    http: Client,
    settings: ErpSettings,
    tokens: TokenManager<G, C>,
}

impl<G: CredentialGateway> ErpClient<G> {
    /// Builds the HTTP client and a token manager for `tenant`.
    ///
    /// # Errors
    ///
    /// - [`ErpError::InvalidBaseUrl`] if `settings.base_url` does not parse.
    /// - [`ErpError::Http`] if the `reqwest::Client` cannot be constructed.
    pub fn new(
        settings: ErpSettings,
        tenant: impl Into<String>,
        gateway: G,
    ) -> Result<Self, ErpError> {
        Url::parse(&settings.base_url).map_err(|e| ErpError::InvalidBaseUrl {
            url: settings.base_url.clone(),
            reason: e.to_string(),
        })?;

        let http = Client::builder()
            .timeout(settings.timeout)
            .connect_timeout(Duration::from_secs(10))
            .user_agent(settings.user_agent.as_str())
            .build()?;

        let tokens = TokenManager::new(
            tenant,
            gateway,
            http.clone(),
            &settings.base_url,
            settings.token_refresh_margin,
        );

        Ok(Self {
            http,
            settings,
            tokens,
        })
    }
}

impl<G: CredentialGateway, C: Clock> ErpClient<G, C> {
    #[must_use]
    pub fn with_clock<C2: Clock>(self, clock: C2) -> ErpClient<G, C2> {
        ErpClient {
            http: self.http,
            settings: self.settings,
            tokens: self.tokens.with_clock(clock),
        }
    }

    #[must_use]
    pub fn tokens(&self) -> &TokenManager<G, C> {
        &self.tokens
    }

    #[must_use]
    pub fn settings(&self) -> &ErpSettings {
        &self.settings
    }

    #[must_use]
    pub fn tenant(&self) -> &str {
        self.tokens.tenant()
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.settings.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// Lazily walks a list endpoint from `start_page`.
    ///
    /// `pagina` and `limite` are managed by the walker and dropped from
    /// `query` if present.
    pub fn pages(
        &self,
        endpoint: &str,
        query: Vec<(String, String)>,
        start_page: u32,
    ) -> PageWalker<'_, G, C> {
        PageWalker::new(
            self,
            PageCursor::new(endpoint, query, start_page, self.settings.page_size),
        )
    }

    /// Fetches `GET /{resource}/{id}` and returns its `data` object.
    ///
    /// Sleeps the configured detail delay first. Returns `Ok(None)` when the
    /// envelope has no data.
    ///
    /// # Errors
    ///
    /// - Any error from [`ErpClient::get_json`].
    /// - [`ErpError::Deserialize`] if `data` does not match `T`.
    pub async fn get_detail<T: DeserializeOwned>(
        &self,
        resource: &str,
        id: i64,
    ) -> Result<Option<T>, ErpError> {
        if !self.settings.detail_delay.is_zero() {
            tokio::time::sleep(self.settings.detail_delay).await;
        }

        let path = format!("{}/{id}", resource.trim_end_matches('/'));
        let body = self.get_json(&path, &[]).await?;
        let envelope: Envelope<T> =
            serde_json::from_value(body).map_err(|e| ErpError::Deserialize {
                context: path.clone(),
                source: e,
            })?;
        Ok(envelope.data)
    }

    /// Sends an authenticated GET and parses the JSON body.
    ///
    /// # Errors
    ///
    /// - [`ErpError::Auth`] if no token can be obtained, or the request is
    ///   still rejected with 401 after one forced refresh.
    /// - [`ErpError::RateLimitExceeded`] / [`ErpError::Transient`] when a
    ///   retry budget runs out.
    /// - [`ErpError::UpstreamStatus`] on any other non-200 status.
    /// - [`ErpError::Deserialize`] if the body is not JSON.
    pub async fn get_json(&self, path: &str, query: &[(String, String)]) -> Result<Value, ErpError> {
        let url = self.url(path);
        let policy = &self.settings.retry;

        let token = self.tokens.get_valid_token().await?;
        let mut response =
            retry_fixed(policy, &url, || self.send_once(&url, query, &token)).await?;

        if response.status == StatusCode::UNAUTHORIZED {
            tracing::warn!(
                tenant = %self.tenant(),
                url = %url,
                "ERP rejected access token; refreshing once"
            );
            let token = self.tokens.force_refresh().await?;
            response = retry_fixed(policy, &url, || self.send_once(&url, query, &token)).await?;
            if response.status == StatusCode::UNAUTHORIZED {
                return Err(AuthError::Unauthorized { url }.into());
            }
        }

        if response.status != StatusCode::OK {
            return Err(ErpError::UpstreamStatus {
                status: response.status.as_u16(),
                url,
                body: response.body,
            });
        }

        serde_json::from_str(&response.body).map_err(|e| ErpError::Deserialize {
            context: url,
            source: e,
        })
    }

    async fn send_once(
        &self,
        url: &str,
        query: &[(String, String)],
        token: &str,
    ) -> Result<RawResponse, AttemptError> {
        let response = self
            .http
            .get(url)
            .bearer_auth(token)
            .query(query)
            .send()
            .await
            .map_err(|e| {
                // A request that cannot be built will not build on retry.
                if e.is_builder() {
                    AttemptError::Fatal(ErpError::Http(e))
                } else {
                    AttemptError::Network(e)
                }
            })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(AttemptError::RateLimited);
        }

        let body = response.text().await.map_err(AttemptError::Network)?;
        Ok(RawResponse { status, body })
    }
}
