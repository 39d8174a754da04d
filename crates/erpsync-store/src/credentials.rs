//! Token persistence in the `integracoes_bling` table.
//!
//! One row per tenant, keyed by `nome_loja`. Refreshes only ever rewrite the
//! token columns; client id and secret are managed by hand.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDateTime, Utc};
use erpsync_core::{ClientCredentials, CredentialGateway, TokenRecord};
use serde::{Deserialize, Serialize};

use crate::client::{eq, StoreClient};
use crate::error::StoreError;

pub const CREDENTIALS_TABLE: &str = "integracoes_bling";

#[derive(Debug, Deserialize)]
struct CredentialRow {
    nome_loja: String,
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_at: Option<String>,
    #[serde(default)]
    client_id: Option<String>,
    #[serde(default)]
    client_secret: Option<String>,
}

#[derive(Debug, Serialize)]
struct TokenUpdate<'a> {
    access_token: &'a str,
    refresh_token: &'a str,
    expires_at: String,
    updated_at: String,
}

/// [`CredentialGateway`] backed by the store.
///
/// Client credentials come from the row when it has them, otherwise from the
/// fallbacks registered with [`StoreCredentialGateway::with_client_credentials`].
#[derive(Debug, Clone)]
pub struct StoreCredentialGateway {
    store: StoreClient,
    fallback: HashMap<String, ClientCredentials>,
}

impl StoreCredentialGateway {
    #[must_use]
    pub fn new(store: StoreClient) -> Self {
        Self {
            store,
            fallback: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_client_credentials(mut self, tenant: &str, credentials: ClientCredentials) -> Self {
        self.fallback.insert(tenant.to_string(), credentials);
        self
    }

    fn record_from(&self, row: CredentialRow) -> Result<TokenRecord, StoreError> {
        let invalid = |reason: String| StoreError::InvalidRow {
            table: CREDENTIALS_TABLE.to_string(),
            reason,
        };

        let refresh_token = non_blank(row.refresh_token)
            .ok_or_else(|| invalid(format!("{} has no refresh_token", row.nome_loja)))?;

        let (client_id, client_secret) =
            match (non_blank(row.client_id), non_blank(row.client_secret)) {
                (Some(id), Some(secret)) => (id, secret),
                _ => {
                    let fallback = self.fallback.get(&row.nome_loja).ok_or_else(|| {
                        invalid(format!("{} has no client credentials", row.nome_loja))
                    })?;
                    (fallback.client_id.clone(), fallback.client_secret.clone())
                }
            };

        // A missing or unreadable expiry forces a refresh on first use.
        let expires_at = match row.expires_at.as_deref() {
            Some(raw) => parse_timestamp(raw).unwrap_or_else(|| {
                tracing::warn!(
                    tenant = %row.nome_loja,
                    expires_at = raw,
                    "unreadable expires_at; token will be refreshed"
                );
                DateTime::<Utc>::UNIX_EPOCH
            }),
            None => DateTime::<Utc>::UNIX_EPOCH,
        };

        Ok(TokenRecord {
            tenant_id: row.nome_loja,
            access_token: row.access_token.unwrap_or_default(),
            refresh_token,
            expires_at,
            client_id,
            client_secret,
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Reads an RFC 3339 timestamp, or a zone-less one taken as UTC.
#[must_use]
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

impl CredentialGateway for StoreCredentialGateway {
    type Error = StoreError;

    async fn load(&self, tenant: &str) -> Result<Option<TokenRecord>, StoreError> {
        let rows: Vec<CredentialRow> = self
            .store
            .select_all(CREDENTIALS_TABLE, "*", &[("nome_loja", eq(tenant))])
            .await?;
        match rows.into_iter().next() {
            Some(row) => self.record_from(row).map(Some),
            None => Ok(None),
        }
    }

    async fn save(&self, record: &TokenRecord) -> Result<(), StoreError> {
        let update = TokenUpdate {
            access_token: &record.access_token,
            refresh_token: &record.refresh_token,
            expires_at: record.expires_at.to_rfc3339(),
            updated_at: Utc::now().to_rfc3339(),
        };
        self.store
            .patch(
                CREDENTIALS_TABLE,
                &[("nome_loja", eq(&record.tenant_id))],
                &update,
            )
            .await?;
        tracing::debug!(tenant = %record.tenant_id, expires_at = %record.expires_at, "token saved");
        Ok(())
    }
}
