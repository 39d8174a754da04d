pub mod app_config;
pub mod batch;
pub mod config;
pub mod consolidate;
pub mod credentials;
pub mod error;
pub mod line_item;
pub mod policy;
pub mod rows;

pub use app_config::{AppConfig, Environment};
pub use batch::SyncBatch;
pub use config::{
    client_credentials_from_env, load_app_config, load_app_config_from_env, MAX_PAGE_SIZE,
    MAX_TOKEN_REFRESH_MARGIN_SECS,
};
pub use consolidate::{consolidate, merge_into, Consolidator};
pub use credentials::{ClientCredentials, Clock, CredentialGateway, SystemClock, TokenRecord};
pub use error::{ConfigError, DataQualityError};
pub use line_item::{LineItem, LineItemKey, UnitField};
pub use policy::{
    load_policy, normalize_name, DepositChannel, InboundInvoicePolicy, PolicyFile, ProductPolicy,
    PurchaseOrderPolicy, SalesInvoicePolicy, StatusLabel, StockPolicy, TenantPolicy,
};
pub use rows::{InboundInvoiceLine, ProductRow, PurchaseOrderLine, SalesInvoiceLine, StockRow};
