//! Business-rule policy loaded from `config/policy.yaml`.
//!
//! Status codes, supplier blacklists, nature-of-operation ids and deposit
//! mappings change with the business, so they live in a file rather than in
//! the jobs. A tenant runs a job only when its section is present.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::ConfigError;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyFile {
    /// Supplier names whose documents are never ingested. Matched as a
    /// whitespace- and case-insensitive substring of the supplier name.
    #[serde(default)]
    pub supplier_blacklist: Vec<String>,
    pub tenants: Vec<TenantPolicy>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantPolicy {
    pub name: String,
    #[serde(default)]
    pub products: Option<ProductPolicy>,
    #[serde(default)]
    pub stock: Option<StockPolicy>,
    #[serde(default)]
    pub purchase_orders: Option<PurchaseOrderPolicy>,
    #[serde(default)]
    pub inbound_invoices: Option<InboundInvoicePolicy>,
    #[serde(default)]
    pub sales_invoices: Option<SalesInvoicePolicy>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductPolicy {
    /// Only products whose name starts with one of these prefixes are kept.
    /// Empty means every product is kept.
    #[serde(default)]
    pub name_prefixes: Vec<String>,
    #[serde(default = "default_product_batch")]
    pub batch_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockPolicy {
    pub deposits: Vec<DepositChannel>,
    /// Balances of products whose name starts with one of these are skipped.
    #[serde(default)]
    pub skip_name_prefixes: Vec<String>,
    /// Ask the ERP for positive balances only.
    #[serde(default = "default_true")]
    pub positive_only: bool,
    #[serde(default = "default_stock_batch")]
    pub batch_size: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositChannel {
    pub id: i64,
    pub channel: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseOrderPolicy {
    /// Order statuses to ingest, with the label written to the store.
    pub statuses: Vec<StatusLabel>,
    /// Statuses for which the supplier blacklist is enforced.
    #[serde(default = "default_blacklist_statuses")]
    pub blacklist_statuses: Vec<i64>,
    /// Delete store rows for orders not seen in this run.
    #[serde(default = "default_true")]
    pub prune_obsolete: bool,
    #[serde(default = "default_line_batch")]
    pub batch_size: usize,
}

impl PurchaseOrderPolicy {
    #[must_use]
    pub fn label_for(&self, status: i64) -> Option<&str> {
        self.statuses
            .iter()
            .find(|s| s.value == status)
            .map(|s| s.label.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusLabel {
    pub value: i64,
    pub label: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundInvoicePolicy {
    #[serde(default = "default_inbound_lookback")]
    pub lookback_days: u32,
    #[serde(default)]
    pub ignore_situations: Vec<i64>,
    #[serde(default)]
    pub ignore_natures: Vec<i64>,
    /// ERP store id the invoice must belong to; `None` accepts any store.
    #[serde(default)]
    pub store_id: Option<i64>,
    #[serde(default = "default_line_batch")]
    pub batch_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SalesInvoicePolicy {
    #[serde(default = "default_sales_lookback")]
    pub lookback_days: u32,
    #[serde(default)]
    pub blocked_natures: Vec<i64>,
    #[serde(default)]
    pub ignore_situations: Vec<i64>,
    #[serde(default)]
    pub store_id: Option<i64>,
    /// Sales channel label written to the `origem` column.
    pub origin: String,
    #[serde(default = "default_sales_batch")]
    pub batch_size: usize,
}

fn default_true() -> bool {
    true
}

fn default_product_batch() -> usize {
    50
}

fn default_stock_batch() -> usize {
    200
}

fn default_line_batch() -> usize {
    100
}

fn default_sales_batch() -> usize {
    200
}

fn default_blacklist_statuses() -> Vec<i64> {
    vec![1]
}

fn default_inbound_lookback() -> u32 {
    19
}

fn default_sales_lookback() -> u32 {
    30
}

/// Collapse runs of whitespace and upper-case, so blacklist entries match
/// regardless of how the ERP spaced or cased the supplier name.
#[must_use]
pub fn normalize_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_uppercase()
}

impl PolicyFile {
    #[must_use]
    pub fn tenant(&self, name: &str) -> Option<&TenantPolicy> {
        self.tenants.iter().find(|t| t.name == name)
    }

    /// Returns `true` if any blacklist entry occurs in `supplier`.
    #[must_use]
    pub fn is_blacklisted(&self, supplier: &str) -> bool {
        let supplier = normalize_name(supplier);
        if supplier.is_empty() {
            return false;
        }
        self.supplier_blacklist
            .iter()
            .map(|b| normalize_name(b))
            .filter(|b| !b.is_empty())
            .any(|b| supplier.contains(&b))
    }
}

/// Load and validate the policy file.
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read, parsed, or fails validation.
pub fn load_policy(path: &Path) -> Result<PolicyFile, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::PolicyFileIo {
        path: path.display().to_string(),
        source: e,
    })?;

    let policy: PolicyFile =
        serde_yaml::from_str(&content).map_err(ConfigError::PolicyFileParse)?;

    validate_policy(&policy)?;

    Ok(policy)
}

fn validate_policy(policy: &PolicyFile) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();

    for tenant in &policy.tenants {
        if tenant.name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "tenant name must be non-empty".to_string(),
            ));
        }
        if !seen.insert(tenant.name.as_str()) {
            return Err(ConfigError::Validation(format!(
                "duplicate tenant: '{}'",
                tenant.name
            )));
        }

        let batch_sizes = [
            tenant.products.as_ref().map(|p| p.batch_size),
            tenant.stock.as_ref().map(|s| s.batch_size),
            tenant.purchase_orders.as_ref().map(|p| p.batch_size),
            tenant.inbound_invoices.as_ref().map(|p| p.batch_size),
            tenant.sales_invoices.as_ref().map(|p| p.batch_size),
        ];
        if batch_sizes.iter().flatten().any(|&size| size == 0) {
            return Err(ConfigError::Validation(format!(
                "tenant '{}' has a zero batch_size",
                tenant.name
            )));
        }

        if let Some(stock) = &tenant.stock {
            if stock.deposits.is_empty() {
                return Err(ConfigError::Validation(format!(
                    "tenant '{}' enables stock sync without deposits",
                    tenant.name
                )));
            }
            if let Some(bad) = stock.deposits.iter().find(|d| d.channel.trim().is_empty()) {
                return Err(ConfigError::Validation(format!(
                    "tenant '{}' deposit {} has an empty channel",
                    tenant.name, bad.id
                )));
            }
        }

        if let Some(orders) = &tenant.purchase_orders {
            if orders.statuses.is_empty() {
                return Err(ConfigError::Validation(format!(
                    "tenant '{}' enables purchase-order sync without statuses",
                    tenant.name
                )));
            }
        }

        if let Some(sales) = &tenant.sales_invoices {
            if sales.origin.trim().is_empty() {
                return Err(ConfigError::Validation(format!(
                    "tenant '{}' sales_invoices.origin must be non-empty",
                    tenant.name
                )));
            }
        }
    }

    Ok(())
}
