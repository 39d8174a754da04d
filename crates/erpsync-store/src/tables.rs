//! Target tables and the natural keys their upserts merge on.

pub const PRODUCTS: &str = "produtos";
pub const PRODUCTS_KEY: &str = "sku";

pub const STOCK: &str = "estoque";
pub const STOCK_KEY: &str = "sku,canal";

pub const PURCHASE_ORDERS: &str = "compras_pedidos";
pub const PURCHASE_ORDERS_KEY: &str = "id_pedido,sku";

pub const INBOUND_INVOICES: &str = "entradas_compras";
pub const INBOUND_INVOICES_KEY: &str = "id_bling,sku";

pub const SALES_INVOICES: &str = "nfe_saida";
pub const SALES_INVOICES_KEY: &str = "id,sku";
