#![allow(dead_code)]

use std::time::Duration;

use erpsync_store::StoreClient;
use serde::Serialize;
use wiremock::MockServer;

pub const KEY: &str = "service-key";

pub fn store(server: &MockServer) -> StoreClient {
    StoreClient::new(&server.uri(), KEY, Duration::from_secs(5), "erpsync-test")
        .expect("store client should build")
}

#[derive(Debug, Clone, Serialize)]
pub struct SkuRow {
    pub sku: String,
    pub quantidade: f64,
}

pub fn sku_rows(n: usize) -> Vec<SkuRow> {
    (1..=n)
        .map(|i| SkuRow {
            sku: format!("SKU-{i}"),
            quantidade: 1.0,
        })
        .collect()
}
