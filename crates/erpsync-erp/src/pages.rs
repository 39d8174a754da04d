//! Page-number pagination over ERP list endpoints.
//!
//! The ERP has no cursor or total count: a list is read by asking for
//! `pagina = 1, 2, ...` until a page comes back with no records.

use erpsync_core::{Clock, CredentialGateway};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::client::ErpClient;
use crate::error::ErpError;
use crate::types::Envelope;

/// Hard stop for a single walk, in case the ERP keeps returning the same
/// non-empty page.
pub const MAX_PAGES: u32 = 10_000;

/// Position of a walk: the endpoint, its filters, and the next page to ask
/// for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageCursor {
    pub endpoint: String,
    pub query: Vec<(String, String)>,
    /// 1-based number of the next page to request.
    pub page_number: u32,
    pub page_size: u32,
}

impl PageCursor {
    #[must_use]
    pub fn new(
        endpoint: &str,
        query: Vec<(String, String)>,
        start_page: u32,
        page_size: u32,
    ) -> Self {
        let query = query
            .into_iter()
            .filter(|(k, _)| k != "pagina" && k != "limite")
            .collect();
        Self {
            endpoint: endpoint.to_string(),
            query,
            page_number: start_page.max(1),
            page_size,
        }
    }

    /// Filters plus `pagina` and `limite` for the current page.
    #[must_use]
    pub fn request_query(&self) -> Vec<(String, String)> {
        let mut query = self.query.clone();
        query.push(("pagina".to_string(), self.page_number.to_string()));
        query.push(("limite".to_string(), self.page_size.to_string()));
        query
    }
}

/// One non-empty page of raw records, in the order the ERP returned them.
#[derive(Debug, Clone)]
pub struct Page {
    pub number: u32,
    pub records: Vec<Value>,
}

impl Page {
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Parses every record as `T`. Records that do not parse are logged and
    /// counted instead of failing the page.
    #[must_use]
    pub fn parse<T: DeserializeOwned>(&self) -> (Vec<T>, usize) {
        let mut parsed = Vec::with_capacity(self.records.len());
        let mut skipped = 0;
        for (idx, record) in self.records.iter().enumerate() {
            match T::deserialize(record) {
                Ok(value) => parsed.push(value),
                Err(e) => {
                    skipped += 1;
                    tracing::warn!(
                        page = self.number,
                        index = idx,
                        error = %e,
                        "skipping malformed list record"
                    );
                }
            }
        }
        (parsed, skipped)
    }
}

/// A lazy, finite, non-restartable sequence of pages.
///
/// Each call to [`PageWalker::next_page`] performs at most one logical page
/// request. Once the walk ends (empty page, error, [`MAX_PAGES`] or the last
/// page number) every later call returns `Ok(None)`.
pub struct PageWalker<'a, G, C> {
    client: &'a ErpClient<G, C>,
    cursor: PageCursor,
    pages_fetched: u32,
    done: bool,
    truncated: bool,
}

impl<'a, G: CredentialGateway, C: Clock> PageWalker<'a, G, C> {
    pub(crate) fn new(client: &'a ErpClient<G, C>, cursor: PageCursor) -> Self {
        Self {
            client,
            cursor,
            pages_fetched: 0,
            done: false,
            truncated: false,
        }
    }

    #[must_use]
    pub fn cursor(&self) -> &PageCursor {
        &self.cursor
    }

    /// Number of non-empty pages yielded so far.
    #[must_use]
    pub fn pages_fetched(&self) -> u32 {
        self.pages_fetched
    }

    #[must_use]
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// `true` when the walk stopped before reaching an empty page: the page
    /// limit was hit or no further page number exists.
    #[must_use]
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// Fetches the next page.
    ///
    /// Returns `Ok(None)` at the natural end of the list. Pages already
    /// yielded stay valid when a later page fails.
    ///
    /// # Errors
    ///
    /// Returns the [`ErpError`] that ended the walk, exactly once.
    pub async fn next_page(&mut self) -> Result<Option<Page>, ErpError> {
        if self.done {
            return Ok(None);
        }
        if self.pages_fetched >= MAX_PAGES {
            tracing::warn!(
                endpoint = %self.cursor.endpoint,
                max_pages = MAX_PAGES,
                "page limit reached; stopping walk"
            );
            self.done = true;
            self.truncated = true;
            return Ok(None);
        }

        let delay = self.client.settings().inter_page_delay;
        if self.pages_fetched > 0 && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let page_number = self.cursor.page_number;
        let body = match self
            .client
            .get_json(&self.cursor.endpoint, &self.cursor.request_query())
            .await
        {
            Ok(body) => body,
            Err(e) => {
                self.done = true;
                tracing::error!(
                    tenant = %self.client.tenant(),
                    endpoint = %self.cursor.endpoint,
                    page = page_number,
                    error = %e,
                    "page request failed; ending walk"
                );
                return Err(e);
            }
        };

        let envelope: Envelope<Vec<Value>> = match serde_json::from_value(body) {
            Ok(envelope) => envelope,
            Err(e) => {
                self.done = true;
                tracing::warn!(
                    tenant = %self.client.tenant(),
                    endpoint = %self.cursor.endpoint,
                    page = page_number,
                    error = %e,
                    "page body is not a list envelope; ending walk"
                );
                return Err(ErpError::Deserialize {
                    context: format!("{} page {page_number}", self.cursor.endpoint),
                    source: e,
                });
            }
        };

        let records = envelope.data.unwrap_or_default();
        if records.is_empty() {
            tracing::debug!(
                endpoint = %self.cursor.endpoint,
                page = page_number,
                "empty page; walk complete"
            );
            self.done = true;
            return Ok(None);
        }

        tracing::debug!(
            endpoint = %self.cursor.endpoint,
            page = page_number,
            records = records.len(),
            "fetched page"
        );
        self.pages_fetched += 1;
        match page_number.checked_add(1) {
            Some(next) => self.cursor.page_number = next,
            None => {
                tracing::warn!(
                    endpoint = %self.cursor.endpoint,
                    page = page_number,
                    "no page number left; stopping walk"
                );
                self.done = true;
                self.truncated = true;
            }
        }
        Ok(Some(Page {
            number: page_number,
            records,
        }))
    }
}
