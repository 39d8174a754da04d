//! Shared fixtures for the ERP client integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, TimeZone, Utc};
use erpsync_core::{Clock, CredentialGateway, TokenRecord};
use erpsync_erp::{ErpClient, ErpSettings};
use wiremock::MockServer;

pub const TENANT: &str = "PORTFIO";

/// 2026-03-01 12:00:00 UTC.
pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
}

#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// In-memory credential store that counts writes.
#[derive(Debug, Clone, Default)]
pub struct MemoryGateway {
    record: Arc<Mutex<Option<TokenRecord>>>,
    saves: Arc<AtomicU32>,
}

impl MemoryGateway {
    pub fn with_record(record: TokenRecord) -> Self {
        Self {
            record: Arc::new(Mutex::new(Some(record))),
            saves: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn saves(&self) -> u32 {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn current(&self) -> Option<TokenRecord> {
        self.record.lock().unwrap().clone()
    }
}

impl CredentialGateway for MemoryGateway {
    type Error = std::io::Error;

    async fn load(&self, tenant: &str) -> Result<Option<TokenRecord>, Self::Error> {
        Ok(self
            .record
            .lock()
            .unwrap()
            .clone()
            .filter(|r| r.tenant_id == tenant))
    }

    async fn save(&self, record: &TokenRecord) -> Result<(), Self::Error> {
        *self.record.lock().unwrap() = Some(record.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// A record for [`TENANT`] whose access token expires `expires_in` from [`now`].
pub fn record(access_token: &str, expires_in: Duration) -> TokenRecord {
    TokenRecord {
        tenant_id: TENANT.to_string(),
        access_token: access_token.to_string(),
        refresh_token: "refresh-1".to_string(),
        expires_at: now() + expires_in,
        client_id: "client".to_string(),
        client_secret: "secret".to_string(),
    }
}

pub fn settings(server: &MockServer) -> ErpSettings {
    ErpSettings::for_tests(&server.uri())
}

pub fn client_with(
    settings: ErpSettings,
    gateway: MemoryGateway,
) -> ErpClient<MemoryGateway, FixedClock> {
    ErpClient::new(settings, TENANT, gateway)
        .expect("client construction should not fail")
        .with_clock(FixedClock(now()))
}

/// Client whose stored token is valid for another six hours.
pub fn client(server: &MockServer) -> (ErpClient<MemoryGateway, FixedClock>, MemoryGateway) {
    let gateway = MemoryGateway::with_record(record("token-1", Duration::hours(6)));
    (client_with(settings(server), gateway.clone()), gateway)
}

/// `n` list records with ids starting at `first_id`.
pub fn records(first_id: i64, n: usize) -> Vec<serde_json::Value> {
    (0..n)
        .map(|i| {
            #[allow(clippy::cast_possible_wrap)]
            let id = first_id + i as i64;
            serde_json::json!({"id": id, "codigo": format!("SKU-{id}")})
        })
        .collect()
}
