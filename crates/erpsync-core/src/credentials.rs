//! OAuth2 credentials for one ERP tenant and the persistence seam behind them.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// The authoritative token set for one tenant.
///
/// `expires_at` always belongs to the current `access_token`; the only writer
/// is the ERP token manager's refresh.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    pub tenant_id: String,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
    pub client_id: String,
    pub client_secret: String,
}

impl TokenRecord {
    /// Returns `true` once `now` is inside the refresh margin before expiry.
    #[must_use]
    pub fn needs_refresh(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        match self.expires_at.checked_sub_signed(margin) {
            Some(deadline) => now > deadline,
            None => true,
        }
    }
}

impl std::fmt::Debug for TokenRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenRecord")
            .field("tenant_id", &self.tenant_id)
            .field("access_token", &"[redacted]")
            .field("refresh_token", &"[redacted]")
            .field("expires_at", &self.expires_at)
            .field("client_id", &self.client_id)
            .field("client_secret", &"[redacted]")
            .finish()
    }
}

/// OAuth client id and secret of one ERP application.
#[derive(Clone, PartialEq, Eq)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: String,
}

impl std::fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[redacted]")
            .finish()
    }
}

/// Reads and writes [`TokenRecord`]s for named tenants.
///
/// `save` overwrites the tenant's record; concurrent writers from separate
/// processes resolve as last-writer-wins.
pub trait CredentialGateway {
    type Error: std::error::Error + Send + Sync + 'static;

    async fn load(&self, tenant: &str) -> Result<Option<TokenRecord>, Self::Error>;

    async fn save(&self, record: &TokenRecord) -> Result<(), Self::Error>;
}

/// Source of the current time, swappable in tests.
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn record(expires_at: DateTime<Utc>) -> TokenRecord {
        TokenRecord {
            tenant_id: "PORTFIO".to_string(),
            access_token: "access".to_string(),
            refresh_token: "refresh".to_string(),
            expires_at,
            client_id: "client".to_string(),
            client_secret: "secret".to_string(),
        }
    }

    #[test]
    fn token_inside_margin_needs_refresh() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let rec = record(now + Duration::minutes(2));
        assert!(rec.needs_refresh(now, Duration::minutes(5)));
    }

    #[test]
    fn token_outside_margin_is_kept() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let rec = record(now + Duration::hours(2));
        assert!(!rec.needs_refresh(now, Duration::minutes(10)));
    }

    #[test]
    fn margin_reaching_before_the_earliest_date_forces_refresh() {
        let rec = record(DateTime::<Utc>::MIN_UTC);
        assert!(rec.needs_refresh(DateTime::<Utc>::MIN_UTC, Duration::days(1)));
    }

    #[test]
    fn margin_boundary_is_not_yet_expired() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let rec = record(now + Duration::minutes(10));
        assert!(!rec.needs_refresh(now, Duration::minutes(10)));
    }

    #[test]
    fn debug_redacts_secrets() {
        let rec = record(Utc::now());
        let out = format!("{rec:?}");
        assert!(!out.contains("secret\""));
        assert!(!out.contains("\"access\""));
        assert!(out.contains("PORTFIO"));
    }
}
