use thiserror::Error;

/// Failures of the OAuth2 token lifecycle. Fatal for the current job.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("no credentials stored for tenant {tenant}")]
    MissingCredentials { tenant: String },

    #[error("credential store error for tenant {tenant}: {source}")]
    Gateway {
        tenant: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("token refresh for tenant {tenant} rejected with HTTP {status}: {body}")]
    RefreshRejected {
        tenant: String,
        status: u16,
        body: String,
    },

    #[error("token refresh for tenant {tenant} failed: {source}")]
    RefreshTransport {
        tenant: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("token refresh response for tenant {tenant} is malformed: {source}")]
    RefreshDeserialize {
        tenant: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("token refresh for tenant {tenant} returned an unusable expires_in of {expires_in}")]
    InvalidExpiry { tenant: String, expires_in: i64 },

    #[error("request to {url} still unauthorized after a forced token refresh")]
    Unauthorized { url: String },
}

/// Errors returned by the ERP client.
#[derive(Debug, Error)]
pub enum ErpError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("rate limited on {url}: gave up after {attempts} attempts")]
    RateLimitExceeded { url: String, attempts: u32 },

    /// Connection-level failure that survived every retry.
    #[error("network error on {url} after {attempts} attempts: {source}")]
    Transient {
        url: String,
        attempts: u32,
        #[source]
        source: reqwest::Error,
    },

    #[error("unexpected HTTP status {status} from {url}: {body}")]
    UpstreamStatus {
        status: u16,
        url: String,
        body: String,
    },

    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid ERP base URL \"{url}\": {reason}")]
    InvalidBaseUrl { url: String, reason: String },
}

impl ErpError {
    /// Returns `true` for errors that must stop the whole job rather than
    /// just the current page or document.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, ErpError::Auth(_) | ErpError::InvalidBaseUrl { .. })
    }
}
