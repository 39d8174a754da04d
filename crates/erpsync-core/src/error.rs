use rust_decimal::Decimal;
use thiserror::Error;

use crate::line_item::LineItemKey;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },

    #[error("failed to read policy file {path}: {source}")]
    PolicyFileIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse policy file: {0}")]
    PolicyFileParse(#[source] serde_yaml::Error),

    #[error("policy validation failed: {0}")]
    Validation(String),
}

/// A malformed source record. Always skipped and logged, never fatal.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DataQualityError {
    #[error("line item {key} has non-positive quantity {quantity}")]
    NonPositiveQuantity { key: LineItemKey, quantity: Decimal },

    #[error("line item on document {document_id} has no SKU")]
    MissingSku { document_id: i64 },

    /// A stock balance without a product code. The product id is missing too
    /// when the ERP sent no product at all.
    #[error("stock balance for product {} has no SKU", .product_id.map_or_else(|| "<unknown>".to_string(), |id| id.to_string()))]
    BalanceWithoutSku { product_id: Option<i64> },

    #[error("line {sku} on document {document_id} has unreadable {field} '{value}'")]
    InvalidNumber {
        document_id: i64,
        sku: String,
        field: &'static str,
        value: String,
    },

    #[error("document {document_id} has unparseable {field} '{value}'")]
    InvalidDate {
        document_id: i64,
        field: &'static str,
        value: String,
    },

    #[error("document {document_id} is missing {field}")]
    MissingField {
        document_id: i64,
        field: &'static str,
    },
}
