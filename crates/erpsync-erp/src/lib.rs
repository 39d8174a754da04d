//! Client for the ERP's v3 REST API: token lifecycle, paging, and the
//! conversion of ERP documents into store rows.

pub mod client;
pub mod error;
pub mod normalize;
pub mod pages;
pub mod retry;
pub mod token;
pub mod types;

pub use client::{ErpClient, ErpSettings};
pub use error::{AuthError, ErpError};
pub use normalize::{
    inbound_invoice_lines, normalize_product, normalize_stock, purchase_order_lines,
    sales_invoice_lines, OrderContext,
};
pub use pages::{Page, PageCursor, PageWalker, MAX_PAGES};
pub use retry::RetryPolicy;
pub use token::TokenManager;
