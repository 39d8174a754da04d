//! Rows written to the store, one type per destination table.
//!
//! Field names are English; serde renames them to the store's column names.
//! Money and quantities are [`Decimal`]s and go over the wire as JSON
//! numbers. Per-unit monetary fields on the line-item rows are what the
//! consolidator averages.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::line_item::{LineItem, LineItemKey, UnitField};

/// A catalog product, upserted into `produtos` on `sku`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRow {
    pub sku: String,
    #[serde(rename = "nome")]
    pub name: String,
    /// Resolved unit cost (see the product normalizer for the fallback chain).
    #[serde(rename = "custo_fixo")]
    pub unit_cost: Decimal,
    #[serde(rename = "preco_venda_padrao")]
    pub list_price: Decimal,
    /// ERP status code, e.g. `"A"` (active) or `"I"` (inactive).
    #[serde(rename = "situacao")]
    pub status: String,
    #[serde(rename = "tipo")]
    pub kind: String,
    #[serde(rename = "formato")]
    pub format: String,
    pub gtin: Option<String>,
    #[serde(rename = "gtin_embalagem")]
    pub package_gtin: Option<String>,
    #[serde(rename = "fornecedor")]
    pub supplier: Option<String>,
    #[serde(rename = "categoria_id")]
    pub category_id: Option<i64>,
}

/// On-hand balance of one SKU in one sales channel, upserted into `estoque`
/// on `sku,canal`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockRow {
    pub sku: String,
    #[serde(rename = "canal")]
    pub channel: String,
    #[serde(rename = "quantidade")]
    pub quantity: Decimal,
    pub updated_at: DateTime<Utc>,
}

/// One SKU on one purchase order, upserted into `compras_pedidos` on
/// `id_pedido,sku`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseOrderLine {
    #[serde(rename = "id_pedido")]
    pub order_id: i64,
    pub sku: String,
    #[serde(rename = "data_pedido")]
    pub ordered_on: Option<NaiveDate>,
    #[serde(rename = "data_prevista")]
    pub expected_on: Option<NaiveDate>,
    #[serde(rename = "quantidade")]
    pub quantity: Decimal,
    #[serde(rename = "preco_unitario")]
    pub unit_price: Decimal,
    #[serde(rename = "desconto")]
    pub unit_discount: Decimal,
    #[serde(rename = "frete")]
    pub unit_freight: Decimal,
    #[serde(rename = "ipi")]
    pub unit_ipi: Decimal,
    #[serde(rename = "fornecedor")]
    pub supplier: String,
    #[serde(rename = "loja")]
    pub tenant: String,
    #[serde(rename = "situacao")]
    pub status: String,
}

impl LineItem for PurchaseOrderLine {
    const UNIT_FIELDS: &'static [UnitField<Self>] = &[
        UnitField {
            name: "preco_unitario",
            get: |l| l.unit_price,
            set: |l, v| l.unit_price = v,
        },
        UnitField {
            name: "desconto",
            get: |l| l.unit_discount,
            set: |l, v| l.unit_discount = v,
        },
        UnitField {
            name: "frete",
            get: |l| l.unit_freight,
            set: |l, v| l.unit_freight = v,
        },
        UnitField {
            name: "ipi",
            get: |l| l.unit_ipi,
            set: |l, v| l.unit_ipi = v,
        },
    ];

    fn key(&self) -> LineItemKey {
        LineItemKey::new(self.order_id, self.sku.clone())
    }

    fn quantity(&self) -> Decimal {
        self.quantity
    }

    fn set_quantity(&mut self, quantity: Decimal) {
        self.quantity = quantity;
    }
}

/// One SKU on one inbound (purchase) invoice, upserted into
/// `entradas_compras` on `id_bling,sku`.
///
/// The store column is an integer, so the quantity is kept whole.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundInvoiceLine {
    #[serde(rename = "id_bling")]
    pub invoice_id: i64,
    pub sku: String,
    #[serde(rename = "data_entrada")]
    pub received_on: NaiveDate,
    #[serde(rename = "quantidade")]
    pub quantity: i64,
    #[serde(rename = "custo_unitario")]
    pub unit_cost: Decimal,
    #[serde(rename = "desconto")]
    pub unit_discount: Decimal,
    #[serde(rename = "frete")]
    pub unit_freight: Decimal,
    #[serde(rename = "ipi")]
    pub unit_ipi: Decimal,
    #[serde(rename = "nfe")]
    pub invoice_number: String,
    #[serde(rename = "fornecedor")]
    pub supplier: String,
    #[serde(rename = "loja")]
    pub tenant: String,
}

impl LineItem for InboundInvoiceLine {
    const UNIT_FIELDS: &'static [UnitField<Self>] = &[
        UnitField {
            name: "custo_unitario",
            get: |l| l.unit_cost,
            set: |l, v| l.unit_cost = v,
        },
        UnitField {
            name: "desconto",
            get: |l| l.unit_discount,
            set: |l, v| l.unit_discount = v,
        },
        UnitField {
            name: "frete",
            get: |l| l.unit_freight,
            set: |l, v| l.unit_freight = v,
        },
        UnitField {
            name: "ipi",
            get: |l| l.unit_ipi,
            set: |l, v| l.unit_ipi = v,
        },
    ];

    fn key(&self) -> LineItemKey {
        LineItemKey::new(self.invoice_id, self.sku.clone())
    }

    fn quantity(&self) -> Decimal {
        Decimal::from(self.quantity)
    }

    // Merged quantities are sums of whole numbers.
    fn set_quantity(&mut self, quantity: Decimal) {
        self.quantity = quantity.round().to_i64().unwrap_or(i64::MAX);
    }
}

/// One SKU on one outbound (sales) invoice, upserted into `nfe_saida` on
/// `id,sku`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalesInvoiceLine {
    #[serde(rename = "id")]
    pub invoice_id: i64,
    pub sku: String,
    #[serde(rename = "data_emissao")]
    pub issued_on: NaiveDate,
    #[serde(rename = "origem")]
    pub origin: String,
    #[serde(rename = "loja")]
    pub tenant: String,
    #[serde(rename = "quantidade")]
    pub quantity: Decimal,
    #[serde(rename = "preco_unitario")]
    pub unit_price: Decimal,
    #[serde(rename = "desconto")]
    pub unit_discount: Decimal,
    #[serde(rename = "frete")]
    pub unit_freight: Decimal,
}

impl LineItem for SalesInvoiceLine {
    const UNIT_FIELDS: &'static [UnitField<Self>] = &[
        UnitField {
            name: "preco_unitario",
            get: |l| l.unit_price,
            set: |l, v| l.unit_price = v,
        },
        UnitField {
            name: "desconto",
            get: |l| l.unit_discount,
            set: |l, v| l.unit_discount = v,
        },
        UnitField {
            name: "frete",
            get: |l| l.unit_freight,
            set: |l, v| l.unit_freight = v,
        },
    ];

    fn key(&self) -> LineItemKey {
        LineItemKey::new(self.invoice_id, self.sku.clone())
    }

    fn quantity(&self) -> Decimal {
        self.quantity
    }

    fn set_quantity(&mut self, quantity: Decimal) {
        self.quantity = quantity;
    }
}
