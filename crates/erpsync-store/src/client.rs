//! HTTP client for the store's PostgREST interface.
//!
//! Every table is reached at `<store_url>/rest/v1/<table>`. Filters use
//! PostgREST operator syntax (`column=eq.value`, `column=in.(1,2)`), which
//! the [`eq`] and [`in_list`] helpers build.

use std::time::Duration;

use erpsync_core::AppConfig;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::StoreError;

/// Rows per request when reading a whole table.
pub const SELECT_PAGE_SIZE: usize = 1000;

/// `eq.<value>` filter.
#[must_use]
pub fn eq(value: impl std::fmt::Display) -> String {
    format!("eq.{value}")
}

/// `in.(<a>,<b>,...)` filter.
#[must_use]
pub fn in_list<T: std::fmt::Display>(values: &[T]) -> String {
    let joined = values
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",");
    format!("in.({joined})")
}

/// Client for the store's REST endpoint. Cheap to clone.
#[derive(Clone)]
pub struct StoreClient {
    http: Client,
    rest_url: Url,
    key: String,
}

impl std::fmt::Debug for StoreClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreClient")
            .field("rest_url", &self.rest_url.as_str())
            .field("key", &"[redacted]")
            .finish_non_exhaustive()
    }
}

impl StoreClient {
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidBaseUrl`] if `base_url` does not parse, or
    /// [`StoreError::Http`] if the `reqwest::Client` cannot be built.
    pub fn new(
        base_url: &str,
        key: &str,
        timeout: Duration,
        user_agent: &str,
    ) -> Result<Self, StoreError> {
        let http = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .user_agent(user_agent)
            .build()?;

        let normalised = format!("{}/rest/v1/", base_url.trim_end_matches('/'));
        let rest_url = Url::parse(&normalised).map_err(|e| StoreError::InvalidBaseUrl {
            url: base_url.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            http,
            rest_url,
            key: key.to_string(),
        })
    }

    /// # Errors
    ///
    /// See [`StoreClient::new`].
    pub fn from_config(config: &AppConfig) -> Result<Self, StoreError> {
        Self::new(
            &config.store_url,
            &config.store_key,
            Duration::from_secs(config.request_timeout_secs),
            &config.user_agent,
        )
    }

    fn table_url(&self, table: &str) -> Result<Url, StoreError> {
        self.rest_url
            .join(table)
            .map_err(|e| StoreError::InvalidBaseUrl {
                url: format!("{}{table}", self.rest_url),
                reason: e.to_string(),
            })
    }

    fn request(&self, method: Method, table: &str) -> Result<RequestBuilder, StoreError> {
        Ok(self
            .http
            .request(method, self.table_url(table)?)
            .header("apikey", &self.key)
            .bearer_auth(&self.key))
    }

    /// Inserts `rows`, merging into existing rows that collide on
    /// `on_conflict` (a comma-separated column list).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Status`] on a non-2xx response or
    /// [`StoreError::Http`] on transport failure.
    pub async fn upsert<T: Serialize>(
        &self,
        table: &str,
        on_conflict: &str,
        rows: &[T],
    ) -> Result<(), StoreError> {
        if rows.is_empty() {
            return Ok(());
        }
        let response = self
            .request(Method::POST, table)?
            .query(&[("on_conflict", on_conflict)])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(rows)
            .send()
            .await?;
        check(response, table).await.map(drop)
    }

    /// Reads every row matching `filters`, `SELECT_PAGE_SIZE` rows per
    /// request, using `Range` headers.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Status`], [`StoreError::Http`], or
    /// [`StoreError::Deserialize`] when a page does not parse as `T`.
    pub async fn select_all<T: DeserializeOwned>(
        &self,
        table: &str,
        columns: &str,
        filters: &[(&str, String)],
    ) -> Result<Vec<T>, StoreError> {
        let mut rows = Vec::new();
        let mut offset = 0usize;
        loop {
            let end = offset + SELECT_PAGE_SIZE - 1;
            let response = self
                .request(Method::GET, table)?
                .query(&[("select", columns)])
                .query(filters)
                .header("Range-Unit", "items")
                .header("Range", format!("{offset}-{end}"))
                .send()
                .await?;
            // A range past the last row is answered with 416.
            if response.status() == StatusCode::RANGE_NOT_SATISFIABLE {
                break;
            }
            let body = check(response, table).await?;
            let page: Vec<T> =
                serde_json::from_str(&body).map_err(|e| StoreError::Deserialize {
                    context: format!("{table} rows {offset}-{end}"),
                    source: e,
                })?;
            let fetched = page.len();
            rows.extend(page);
            if fetched < SELECT_PAGE_SIZE {
                break;
            }
            offset += SELECT_PAGE_SIZE;
        }
        Ok(rows)
    }

    /// Updates the rows matching `filters` with the fields of `body`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Status`] or [`StoreError::Http`].
    pub async fn patch<B: Serialize + ?Sized>(
        &self,
        table: &str,
        filters: &[(&str, String)],
        body: &B,
    ) -> Result<(), StoreError> {
        let response = self
            .request(Method::PATCH, table)?
            .query(filters)
            .header("Prefer", "return=minimal")
            .json(body)
            .send()
            .await?;
        check(response, table).await.map(drop)
    }

    /// Deletes the rows whose `column` is one of `ids`, narrowed by `filters`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Status`] or [`StoreError::Http`].
    pub async fn delete_in(
        &self,
        table: &str,
        column: &str,
        ids: &[i64],
        filters: &[(&str, String)],
    ) -> Result<(), StoreError> {
        if ids.is_empty() {
            return Ok(());
        }
        let response = self
            .request(Method::DELETE, table)?
            .query(&[(column, in_list(ids))])
            .query(filters)
            .send()
            .await?;
        check(response, table).await.map(drop)
    }
}

/// Returns the body of a 200/201/204 response (206 for ranged reads), or
/// the status and body as an error.
async fn check(response: Response, table: &str) -> Result<String, StoreError> {
    let status = response.status();
    let body = response.text().await?;
    if matches!(status.as_u16(), 200 | 201 | 204 | 206) {
        Ok(body)
    } else {
        Err(StoreError::Status {
            status: status.as_u16(),
            table: table.to_string(),
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_helpers_use_postgrest_syntax() {
        assert_eq!(eq("PORTFIO"), "eq.PORTFIO");
        assert_eq!(in_list(&[3_i64, 1, 2]), "in.(3,1,2)");
    }

    #[test]
    fn table_urls_live_under_rest_v1() {
        let store = StoreClient::new(
            "https://db.example.com/",
            "key",
            Duration::from_secs(5),
            "test",
        )
        .unwrap();
        assert_eq!(
            store.table_url("pedidos_compra").unwrap().as_str(),
            "https://db.example.com/rest/v1/pedidos_compra"
        );
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        let err = StoreClient::new("not a url", "key", Duration::from_secs(5), "test").unwrap_err();
        assert!(matches!(err, StoreError::InvalidBaseUrl { .. }));
    }

    #[test]
    fn debug_hides_the_key() {
        let store = StoreClient::new(
            "https://db.example.com",
            "super-secret",
            Duration::from_secs(5),
            "test",
        )
        .unwrap();
        assert!(!format!("{store:?}").contains("super-secret"));
    }
}
