use thiserror::Error;

/// Errors returned by the store client.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("store returned HTTP {status} for {table}: {body}")]
    Status {
        status: u16,
        table: String,
        body: String,
    },

    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid store URL \"{url}\": {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    /// A row exists but cannot be used as-is.
    #[error("unusable row in {table}: {reason}")]
    InvalidRow { table: String, reason: String },
}
