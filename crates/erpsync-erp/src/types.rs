//! Response shapes of the ERP's v3 REST API.
//!
//! Every response is wrapped in `{"data": ...}`: an array on list endpoints,
//! an object on detail endpoints. `data` may be missing or `null` when there
//! is nothing to return, which list endpoints use to signal the last page.
//!
//! ## Observed quirks
//!
//! - Monetary values and quantities are usually JSON numbers but sometimes
//!   strings (`"12.50"`, `"12,5"`) or `null`. They are read into exact
//!   [`Decimal`]s. Document-level values go through [`lenient_decimal`],
//!   which fails the document on anything else.
//!   Line-item values are kept as [`Amount`] so one unreadable line can be
//!   rejected without losing the rest of the document.
//! - Document numbers (`numero`) are strings on some endpoints and integers
//!   on others.
//! - Nested objects (`fornecedor`, `transporte`, `loja`, ...) can be absent,
//!   `null`, or `{}`; they are modelled as `Option` and read through small
//!   accessor methods.
//! - `situacao` is a letter on products (`"A"`, `"I"`, `"E"`), an object
//!   `{"valor": n}` on purchase orders and a bare integer on invoices.
//! - Dates come as `YYYY-MM-DD`, `YYYY-MM-DD HH:MM:SS`, or with a `T`
//!   separator; unset dates are `"0000-00-00"`.

use rust_decimal::Decimal;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// The `{"data": ...}` envelope. A missing `data` reads as `None`.
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    pub data: Option<T>,
}

/// `{"id": n}` reference to another resource.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IdRef {
    #[serde(default)]
    pub id: Option<i64>,
}

/// Reference to a contact that may carry its name inline.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContactRef {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub nome: Option<String>,
}

// ---------------------------------------------------------------------------
// Products
// ---------------------------------------------------------------------------

/// Entry of `GET /produtos`.
#[derive(Debug, Clone, Deserialize)]
pub struct ProductSummary {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub codigo: Option<String>,
    #[serde(default)]
    pub situacao: Option<String>,
}

/// `GET /produtos/{id}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductDetail {
    pub id: i64,
    #[serde(default)]
    pub nome: String,
    #[serde(default)]
    pub codigo: Option<String>,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub preco: Decimal,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub preco_custo: Decimal,
    #[serde(default)]
    pub situacao: Option<String>,
    #[serde(default)]
    pub tipo: Option<String>,
    #[serde(default)]
    pub formato: Option<String>,
    #[serde(default)]
    pub gtin: Option<String>,
    #[serde(default)]
    pub gtin_embalagem: Option<String>,
    #[serde(default)]
    pub fornecedor: Option<ProductSupplier>,
    #[serde(default)]
    pub categoria: Option<IdRef>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductSupplier {
    #[serde(default)]
    pub contato: Option<ContactRef>,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub preco_custo: Decimal,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub preco_compra: Decimal,
}

// ---------------------------------------------------------------------------
// Stock
// ---------------------------------------------------------------------------

/// Entry of `GET /estoques/saldos`.
#[derive(Debug, Clone, Deserialize)]
pub struct StockBalance {
    #[serde(default)]
    pub produto: Option<StockProduct>,
    #[serde(default)]
    pub depositos: Vec<DepositBalance>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StockProduct {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub codigo: Option<String>,
    #[serde(default)]
    pub nome: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositBalance {
    pub id: i64,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub saldo_fisico: Decimal,
}

impl StockBalance {
    #[must_use]
    pub fn sku(&self) -> Option<&str> {
        self.produto
            .as_ref()
            .and_then(|p| p.codigo.as_deref())
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    #[must_use]
    pub fn product_name(&self) -> &str {
        self.produto
            .as_ref()
            .and_then(|p| p.nome.as_deref())
            .unwrap_or("")
    }

    /// Physical balance held in `deposit_id`; zero when the deposit is not
    /// listed.
    #[must_use]
    pub fn physical_balance(&self, deposit_id: i64) -> Decimal {
        self.depositos
            .iter()
            .find(|d| d.id == deposit_id)
            .map_or(Decimal::ZERO, |d| d.saldo_fisico)
    }
}

// ---------------------------------------------------------------------------
// Contacts
// ---------------------------------------------------------------------------

/// `GET /contatos/{id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct Contact {
    pub id: i64,
    #[serde(default)]
    pub nome: Option<String>,
}

// ---------------------------------------------------------------------------
// Purchase orders
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatusValue {
    #[serde(default)]
    pub valor: Option<i64>,
}

/// Entry of `GET /pedidos/compras`.
#[derive(Debug, Clone, Deserialize)]
pub struct PurchaseOrderSummary {
    pub id: i64,
    #[serde(default)]
    pub situacao: Option<StatusValue>,
}

impl PurchaseOrderSummary {
    #[must_use]
    pub fn status(&self) -> Option<i64> {
        self.situacao.as_ref().and_then(|s| s.valor)
    }
}

/// `GET /pedidos/compras/{id}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseOrderDetail {
    pub id: i64,
    #[serde(default, deserialize_with = "lenient_string")]
    pub numero: Option<String>,
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default)]
    pub data_prevista: Option<String>,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub total_produtos: Decimal,
    #[serde(default)]
    pub fornecedor: Option<ContactRef>,
    #[serde(default)]
    pub desconto: Option<OrderDiscount>,
    #[serde(default)]
    pub transporte: Option<OrderTransport>,
    #[serde(default)]
    pub tributacao: Option<OrderTaxes>,
    #[serde(default)]
    pub itens: Vec<PurchaseOrderItem>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderDiscount {
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub valor: Decimal,
    /// `"REAL"` for an absolute amount, `"PERCENTUAL"` for a percentage of
    /// the products total.
    #[serde(default)]
    pub unidade: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderTransport {
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub frete: Decimal,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderTaxes {
    #[serde(default, deserialize_with = "lenient_decimal", rename = "totalIPI")]
    pub total_ipi: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PurchaseOrderItem {
    #[serde(default)]
    pub valor: Amount,
    #[serde(default)]
    pub quantidade: Amount,
    #[serde(default)]
    pub produto: Option<ItemProduct>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ItemProduct {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub codigo: Option<String>,
}

impl PurchaseOrderDetail {
    #[must_use]
    pub fn supplier_id(&self) -> Option<i64> {
        self.fornecedor.as_ref().and_then(|f| f.id)
    }

    #[must_use]
    pub fn freight(&self) -> Decimal {
        self.transporte.as_ref().map_or(Decimal::ZERO, |t| t.frete)
    }

    #[must_use]
    pub fn total_ipi(&self) -> Decimal {
        self.tributacao.as_ref().map_or(Decimal::ZERO, |t| t.total_ipi)
    }

    /// Order-level discount as an absolute amount.
    #[must_use]
    pub fn discount_amount(&self) -> Decimal {
        match &self.desconto {
            None => Decimal::ZERO,
            Some(d) if d.unidade.as_deref() == Some("PERCENTUAL") => {
                self.total_produtos.saturating_mul(d.valor) / Decimal::ONE_HUNDRED
            }
            Some(d) => d.valor,
        }
    }
}

impl PurchaseOrderItem {
    #[must_use]
    pub fn sku(&self) -> Option<&str> {
        self.produto
            .as_ref()
            .and_then(|p| p.codigo.as_deref())
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

// ---------------------------------------------------------------------------
// Invoices (NF-e)
// ---------------------------------------------------------------------------

/// Entry of `GET /nfe`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceSummary {
    pub id: i64,
    #[serde(default)]
    pub situacao: Option<i64>,
    #[serde(default)]
    pub natureza_operacao: Option<IdRef>,
}

impl InvoiceSummary {
    #[must_use]
    pub fn nature_id(&self) -> Option<i64> {
        self.natureza_operacao.as_ref().and_then(|n| n.id)
    }
}

/// `GET /nfe/{id}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceDetail {
    pub id: i64,
    /// 0 = inbound, 1 = outbound.
    #[serde(default)]
    pub tipo: Option<i64>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub numero: Option<String>,
    #[serde(default)]
    pub data_emissao: Option<String>,
    #[serde(default)]
    pub situacao: Option<i64>,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub valor_nota: Decimal,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub valor_frete: Decimal,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub valor_seguro: Decimal,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub outras_despesas: Decimal,
    #[serde(default)]
    pub natureza_operacao: Option<IdRef>,
    #[serde(default)]
    pub loja: Option<IdRef>,
    #[serde(default)]
    pub contato: Option<ContactRef>,
    #[serde(default)]
    pub itens: Vec<InvoiceItem>,
}

impl InvoiceDetail {
    #[must_use]
    pub fn nature_id(&self) -> Option<i64> {
        self.natureza_operacao.as_ref().and_then(|n| n.id)
    }

    #[must_use]
    pub fn store_id(&self) -> Option<i64> {
        self.loja.as_ref().and_then(|l| l.id)
    }

    #[must_use]
    pub fn contact_name(&self) -> &str {
        self.contato
            .as_ref()
            .and_then(|c| c.nome.as_deref())
            .unwrap_or("")
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceItem {
    #[serde(default)]
    pub codigo: Option<String>,
    #[serde(default)]
    pub quantidade: Amount,
    #[serde(default)]
    pub valor: Amount,
    #[serde(default)]
    pub valor_unitario: Amount,
    #[serde(default)]
    pub desconto: Amount,
    #[serde(default)]
    pub impostos: Option<ItemTaxes>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ItemTaxes {
    #[serde(default)]
    pub ipi: Option<TaxValue>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaxValue {
    #[serde(default)]
    pub valor: Amount,
}

impl InvoiceItem {
    #[must_use]
    pub fn sku(&self) -> Option<&str> {
        self.codigo
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Total IPI charged on the line, if the item carries it.
    #[must_use]
    pub fn ipi(&self) -> Option<&Amount> {
        self.impostos
            .as_ref()
            .and_then(|t| t.ipi.as_ref())
            .map(|i| &i.valor)
    }

    /// Unit price, preferring `valorUnitario` when it is set.
    #[must_use]
    pub fn unit_price(&self) -> &Amount {
        match self.valor_unitario {
            Amount::Absent => &self.valor,
            Amount::Value(v) if v.is_zero() => &self.valor,
            _ => &self.valor_unitario,
        }
    }
}

// ---------------------------------------------------------------------------
// Lenient scalars
// ---------------------------------------------------------------------------

/// A line-item number as the ERP sent it.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Amount {
    /// `null`, `""` or no field at all.
    #[default]
    Absent,
    Value(Decimal),
    /// Anything that is not a decimal number, kept verbatim for the log.
    Malformed(String),
}

impl Amount {
    /// The number, reading an absent field as zero.
    ///
    /// # Errors
    ///
    /// Returns the raw text of a malformed value.
    pub fn get(&self) -> Result<Decimal, &str> {
        match self {
            Amount::Absent => Ok(Decimal::ZERO),
            Amount::Value(v) => Ok(*v),
            Amount::Malformed(raw) => Err(raw.as_str()),
        }
    }

    /// The number, or zero when absent or malformed. For document totals
    /// where the malformed line is rejected on its own.
    #[must_use]
    pub fn or_zero(&self) -> Decimal {
        self.get().unwrap_or(Decimal::ZERO)
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(match read_number(&value) {
            Some(Some(n)) => Amount::Value(n),
            Some(None) => Amount::Absent,
            None => Amount::Malformed(match value {
                Value::String(s) => s,
                other => other.to_string(),
            }),
        })
    }
}

/// `Some(None)` for an absent value, `Some(Some(n))` for a number, `None`
/// for anything else. A single decimal comma (`"12,5"`) is accepted.
fn read_number(value: &Value) -> Option<Option<Decimal>> {
    match value {
        Value::Null => Some(None),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Some(Some(Decimal::from(i))),
            None => parse_decimal(&n.to_string()).map(Some),
        },
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                Some(None)
            } else if s.contains('.') {
                parse_decimal(s).map(Some)
            } else {
                parse_decimal(&s.replacen(',', ".", 1)).map(Some)
            }
        }
        _ => None,
    }
}

/// Plain (`"12.5"`) or scientific (`"1.25e1"`) notation. `NaN`, infinities
/// and values beyond the `Decimal` range do not parse.
fn parse_decimal(s: &str) -> Option<Decimal> {
    s.parse::<Decimal>()
        .or_else(|_| Decimal::from_scientific(s))
        .ok()
}

/// Reads a number that may arrive as a JSON number, a numeric string, or
/// `null` (zero).
///
/// # Errors
///
/// Fails on anything else, including `"NaN"` and `"inf"`, so a document with
/// an unreadable total is rejected instead of stored with a zero.
pub fn lenient_decimal<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    match read_number(&value) {
        Some(n) => Ok(n.unwrap_or(Decimal::ZERO)),
        None => Err(D::Error::custom(format!("expected a number, got {value}"))),
    }
}

/// Reads a string or integer as an optional string; blank becomes `None`.
///
/// # Errors
///
/// Only fails if the underlying deserializer fails to produce a JSON value.
pub fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}
