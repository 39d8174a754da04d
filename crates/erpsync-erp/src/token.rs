//! OAuth2 access-token lifecycle for one ERP tenant.

use chrono::Duration;
use erpsync_core::{Clock, CredentialGateway, SystemClock, TokenRecord};
use reqwest::Client;
use serde::Deserialize;

use crate::error::AuthError;

/// Body of a successful `POST /oauth/token`.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    /// Omitted when the ERP does not rotate the refresh token.
    #[serde(default)]
    refresh_token: Option<String>,
    expires_in: i64,
}

/// Hands out access tokens for one tenant, refreshing them through the ERP's
/// token endpoint shortly before they expire.
///
/// The record is read from the gateway on every call and never cached here,
/// so a refresh done by another process is picked up on the next request.
pub struct TokenManager<G, C = SystemClock> {
    tenant: String,
    gateway: G,
    clock: C,
    http: Client,
    token_url: String,
    margin: Duration,
}

impl<G: CredentialGateway> TokenManager<G> {
    #[must_use]
    pub fn new(
        tenant: impl Into<String>,
        gateway: G,
        http: Client,
        erp_base_url: &str,
        margin: Duration,
    ) -> Self {
        Self {
            tenant: tenant.into(),
            gateway,
            clock: SystemClock,
            http,
            token_url: format!("{}/oauth/token", erp_base_url.trim_end_matches('/')),
            margin,
        }
    }
}

impl<G: CredentialGateway, C: Clock> TokenManager<G, C> {
    /// Replaces the clock; tests use a fixed one.
    #[must_use]
    pub fn with_clock<C2: Clock>(self, clock: C2) -> TokenManager<G, C2> {
        TokenManager {
            tenant: self.tenant,
            gateway: self.gateway,
            clock,
            http: self.http,
            token_url: self.token_url,
            margin: self.margin,
        }
    }

    #[must_use]
    pub fn tenant(&self) -> &str {
        &self.tenant
    }

    #[must_use]
    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    /// Returns an access token that is valid for at least the refresh margin.
    ///
    /// Refreshes when `now > expires_at - margin`; otherwise returns the
    /// stored token without any network call.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError`] if no record exists, the gateway fails, or the
    /// refresh is rejected or cannot reach the ERP.
    pub async fn get_valid_token(&self) -> Result<String, AuthError> {
        let record = self.load_record().await?;
        let now = self.clock.now();
        if record.needs_refresh(now, self.margin) {
            tracing::info!(
                tenant = %self.tenant,
                expires_at = %record.expires_at,
                "access token near expiry; refreshing"
            );
            return self.refresh(record).await;
        }
        Ok(record.access_token)
    }

    /// Refreshes unconditionally. Called once after the ERP rejects a token
    /// that looked valid.
    ///
    /// # Errors
    ///
    /// Same as [`TokenManager::get_valid_token`].
    pub async fn force_refresh(&self) -> Result<String, AuthError> {
        let record = self.load_record().await?;
        tracing::warn!(tenant = %self.tenant, "forcing access token refresh");
        self.refresh(record).await
    }

    async fn load_record(&self) -> Result<TokenRecord, AuthError> {
        self.gateway
            .load(&self.tenant)
            .await
            .map_err(|e| AuthError::Gateway {
                tenant: self.tenant.clone(),
                source: Box::new(e),
            })?
            .ok_or_else(|| AuthError::MissingCredentials {
                tenant: self.tenant.clone(),
            })
    }

    async fn refresh(&self, record: TokenRecord) -> Result<String, AuthError> {
        let response = self
            .http
            .post(&self.token_url)
            .basic_auth(&record.client_id, Some(&record.client_secret))
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", record.refresh_token.as_str()),
            ])
            .send()
            .await
            .map_err(|e| AuthError::RefreshTransport {
                tenant: self.tenant.clone(),
                source: e,
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AuthError::RefreshTransport {
                tenant: self.tenant.clone(),
                source: e,
            })?;

        if !status.is_success() {
            return Err(AuthError::RefreshRejected {
                tenant: self.tenant.clone(),
                status: status.as_u16(),
                body,
            });
        }

        let token: TokenResponse =
            serde_json::from_str(&body).map_err(|e| AuthError::RefreshDeserialize {
                tenant: self.tenant.clone(),
                source: e,
            })?;

        let expires_at = Duration::try_seconds(token.expires_in)
            .filter(|_| token.expires_in > 0)
            .and_then(|lifetime| self.clock.now().checked_add_signed(lifetime))
            .ok_or_else(|| AuthError::InvalidExpiry {
                tenant: self.tenant.clone(),
                expires_in: token.expires_in,
            })?;

        let refreshed = TokenRecord {
            access_token: token.access_token,
            refresh_token: token.refresh_token.unwrap_or(record.refresh_token),
            expires_at,
            ..record
        };

        self.gateway
            .save(&refreshed)
            .await
            .map_err(|e| AuthError::Gateway {
                tenant: self.tenant.clone(),
                source: Box::new(e),
            })?;

        tracing::info!(
            tenant = %self.tenant,
            expires_at = %refreshed.expires_at,
            "access token refreshed"
        );
        Ok(refreshed.access_token)
    }
}
