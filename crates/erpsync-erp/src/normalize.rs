//! Conversion from ERP documents to store rows.
//!
//! Document-level charges (freight, IPI, discounts) are spread over the lines
//! by gross weight, `unit_value * quantity / sum(unit_value * quantity)`, and
//! then divided by the line quantity so every monetary field on a row is a
//! per-unit value the consolidator can average. Sums and products saturate
//! rather than overflow.

use chrono::{DateTime, NaiveDate, Utc};
use erpsync_core::{
    DataQualityError, InboundInvoiceLine, ProductRow, PurchaseOrderLine, SalesInvoiceLine,
    StockRow,
};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::types::{Amount, InvoiceDetail, ProductDetail, PurchaseOrderDetail, StockBalance};

/// Parses an ERP date, keeping only the `YYYY-MM-DD` part.
///
/// Blank values and the `0000-00-00` placeholder mean "no date".
///
/// # Errors
///
/// Returns [`DataQualityError::InvalidDate`] when the value is set but is not
/// a calendar date.
pub fn parse_erp_date(
    document_id: i64,
    field: &'static str,
    raw: Option<&str>,
) -> Result<Option<NaiveDate>, DataQualityError> {
    let raw = raw.map(str::trim).unwrap_or("");
    if raw.is_empty() || raw.starts_with("0000") {
        return Ok(None);
    }
    let day = raw.get(..10).unwrap_or(raw);
    NaiveDate::parse_from_str(day, "%Y-%m-%d")
        .map(Some)
        .map_err(|_| DataQualityError::InvalidDate {
            document_id,
            field,
            value: raw.to_string(),
        })
}

fn required_date(
    document_id: i64,
    field: &'static str,
    raw: Option<&str>,
) -> Result<NaiveDate, DataQualityError> {
    parse_erp_date(document_id, field, raw)?
        .ok_or(DataQualityError::MissingField { document_id, field })
}

/// Per-unit share of a document-level `total` for a line worth `line_value`
/// out of `gross`, spread over `quantity` units.
///
/// A zero `gross` is treated as one, so an all-zero document spreads nothing.
/// A zero `quantity` gets no share.
#[must_use]
pub fn per_unit_share(
    total: Decimal,
    line_value: Decimal,
    gross: Decimal,
    quantity: Decimal,
) -> Decimal {
    let gross = if gross.is_zero() { Decimal::ONE } else { gross };
    line_value
        .checked_div(gross)
        .and_then(|weight| total.saturating_mul(weight).checked_div(quantity))
        .unwrap_or(Decimal::ZERO)
}

/// `sum(value * quantity)` over a document's lines, reading unreadable
/// numbers as zero.
fn gross_value<'a>(lines: impl Iterator<Item = (&'a Amount, &'a Amount)>) -> Decimal {
    lines.fold(Decimal::ZERO, |acc, (value, quantity)| {
        acc.saturating_add(value.or_zero().saturating_mul(quantity.or_zero()))
    })
}

/// Value of a line-item number, rejecting the line when it is unreadable.
fn line_number(
    document_id: i64,
    sku: &str,
    field: &'static str,
    amount: &Amount,
) -> Result<Decimal, DataQualityError> {
    amount
        .get()
        .map_err(|raw| DataQualityError::InvalidNumber {
            document_id,
            sku: sku.to_string(),
            field,
            value: raw.to_string(),
        })
}

fn positive_quantity(
    document_id: i64,
    sku: &str,
    quantity: Decimal,
) -> Result<Decimal, DataQualityError> {
    if quantity > Decimal::ZERO {
        Ok(quantity)
    } else {
        Err(DataQualityError::NonPositiveQuantity {
            key: erpsync_core::LineItemKey::new(document_id, sku),
            quantity,
        })
    }
}

// ---------------------------------------------------------------------------
// Products and stock
// ---------------------------------------------------------------------------

/// Cost of a product: its own cost price, else the supplier's cost price,
/// else the supplier's purchase price.
#[must_use]
pub fn resolve_product_cost(product: &ProductDetail) -> Decimal {
    let supplier = product.fornecedor.as_ref();
    [
        product.preco_custo,
        supplier.map_or(Decimal::ZERO, |s| s.preco_custo),
        supplier.map_or(Decimal::ZERO, |s| s.preco_compra),
    ]
    .into_iter()
    .find(|cost| !cost.is_zero())
    .unwrap_or(Decimal::ZERO)
}

/// Builds the `produtos` row for `product`, listed under `sku`.
#[must_use]
pub fn normalize_product(product: ProductDetail, sku: &str) -> ProductRow {
    let unit_cost = resolve_product_cost(&product);
    let supplier = product
        .fornecedor
        .as_ref()
        .and_then(|f| f.contato.as_ref())
        .and_then(|c| c.nome.clone());
    let category_id = product.categoria.as_ref().and_then(|c| c.id);

    ProductRow {
        sku: sku.to_string(),
        name: product.nome,
        unit_cost,
        list_price: product.preco,
        status: product.situacao.unwrap_or_else(|| "A".to_string()),
        kind: product.tipo.unwrap_or_else(|| "P".to_string()),
        format: product.formato.unwrap_or_else(|| "S".to_string()),
        gtin: product.gtin.filter(|g| !g.trim().is_empty()),
        package_gtin: product.gtin_embalagem.filter(|g| !g.trim().is_empty()),
        supplier,
        category_id,
    }
}

/// Builds the `estoque` row for one balance in one deposit.
///
/// # Errors
///
/// Returns [`DataQualityError::BalanceWithoutSku`] when the balance has no
/// product code.
pub fn normalize_stock(
    balance: &StockBalance,
    deposit_id: i64,
    channel: &str,
    now: DateTime<Utc>,
) -> Result<StockRow, DataQualityError> {
    let sku = balance.sku().ok_or(DataQualityError::BalanceWithoutSku {
        product_id: balance.produto.as_ref().and_then(|p| p.id),
    })?;
    Ok(StockRow {
        sku: sku.to_string(),
        channel: channel.to_string(),
        quantity: balance.physical_balance(deposit_id),
        updated_at: now,
    })
}

// ---------------------------------------------------------------------------
// Purchase orders
// ---------------------------------------------------------------------------

/// Everything a purchase-order line needs that is not on the order itself.
#[derive(Debug, Clone, Copy)]
pub struct OrderContext<'a> {
    pub supplier: &'a str,
    pub tenant: &'a str,
    pub status_label: &'a str,
}

/// Extracts one line per order item, with freight, IPI and the order
/// discount spread per unit.
///
/// Lines are not consolidated here; duplicates of a SKU come out as separate
/// rows.
///
/// # Errors
///
/// The outer error rejects the whole order (unparseable order date). Inner
/// errors reject single lines.
#[allow(clippy::type_complexity)]
pub fn purchase_order_lines(
    order: &PurchaseOrderDetail,
    ctx: OrderContext<'_>,
) -> Result<Vec<Result<PurchaseOrderLine, DataQualityError>>, DataQualityError> {
    let ordered_on = parse_erp_date(order.id, "data", order.data.as_deref())?;
    let expected_on = parse_erp_date(order.id, "dataPrevista", order.data_prevista.as_deref())?;

    let freight = order.freight();
    let ipi = order.total_ipi();
    let discount = order.discount_amount();
    let gross = gross_value(order.itens.iter().map(|i| (&i.valor, &i.quantidade)));

    Ok(order
        .itens
        .iter()
        .map(|item| {
            let sku = item.sku().ok_or(DataQualityError::MissingSku {
                document_id: order.id,
            })?;
            let quantity = line_number(order.id, sku, "quantidade", &item.quantidade)?;
            let quantity = positive_quantity(order.id, sku, quantity)?;
            let price = line_number(order.id, sku, "valor", &item.valor)?;
            let line_value = price.saturating_mul(quantity);
            Ok(PurchaseOrderLine {
                order_id: order.id,
                sku: sku.to_string(),
                ordered_on,
                expected_on,
                quantity,
                unit_price: price,
                unit_discount: per_unit_share(discount, line_value, gross, quantity),
                unit_freight: per_unit_share(freight, line_value, gross, quantity),
                unit_ipi: per_unit_share(ipi, line_value, gross, quantity),
                supplier: ctx.supplier.to_string(),
                tenant: ctx.tenant.to_string(),
                status: ctx.status_label.to_string(),
            })
        })
        .collect())
}

// ---------------------------------------------------------------------------
// Inbound invoices
// ---------------------------------------------------------------------------

/// Extracts one line per inbound invoice item.
///
/// Quantities are truncated to whole units. Freight plus other expenses are
/// spread by weight; IPI comes from the item and is divided by its quantity;
/// the item discount is taken as already per unit.
///
/// # Errors
///
/// The outer error rejects the whole invoice (missing or unparseable issue
/// date). Inner errors reject single lines.
#[allow(clippy::type_complexity)]
pub fn inbound_invoice_lines(
    invoice: &InvoiceDetail,
    tenant: &str,
) -> Result<Vec<Result<InboundInvoiceLine, DataQualityError>>, DataQualityError> {
    let received_on = required_date(invoice.id, "dataEmissao", invoice.data_emissao.as_deref())?;
    let supplier = invoice.contact_name().to_string();
    let invoice_number = invoice.numero.clone().unwrap_or_default();
    let charges = invoice.valor_frete.saturating_add(invoice.outras_despesas);
    let gross = gross_value(invoice.itens.iter().map(|i| (&i.valor, &i.quantidade)));

    Ok(invoice
        .itens
        .iter()
        .map(|item| {
            let sku = item.sku().ok_or(DataQualityError::MissingSku {
                document_id: invoice.id,
            })?;
            let whole = line_number(invoice.id, sku, "quantidade", &item.quantidade)?.trunc();
            let quantity = positive_quantity(invoice.id, sku, whole)?;
            let cost = line_number(invoice.id, sku, "valor", &item.valor)?;
            let discount = line_number(invoice.id, sku, "desconto", &item.desconto)?;
            let ipi = match item.ipi() {
                Some(ipi) => line_number(invoice.id, sku, "ipi", ipi)?,
                None => Decimal::ZERO,
            };
            let whole_units = quantity.to_i64().ok_or_else(|| DataQualityError::InvalidNumber {
                document_id: invoice.id,
                sku: sku.to_string(),
                field: "quantidade",
                value: quantity.to_string(),
            })?;
            let line_value = cost.saturating_mul(quantity);
            Ok(InboundInvoiceLine {
                invoice_id: invoice.id,
                sku: sku.to_string(),
                received_on,
                quantity: whole_units,
                unit_cost: cost,
                unit_discount: discount,
                unit_freight: per_unit_share(charges, line_value, gross, quantity),
                unit_ipi: ipi.checked_div(quantity).unwrap_or(Decimal::ZERO),
                invoice_number: invoice_number.clone(),
                supplier: supplier.clone(),
                tenant: tenant.to_string(),
            })
        })
        .collect())
}

// ---------------------------------------------------------------------------
// Sales invoices
// ---------------------------------------------------------------------------

/// Discount implied by an outbound invoice: what the lines and charges add
/// up to minus what the invoice actually totals, floored at zero.
#[must_use]
pub fn implied_discount(invoice: &InvoiceDetail) -> Decimal {
    let products = gross_value(invoice.itens.iter().map(|i| (i.unit_price(), &i.quantidade)));
    let expected = [
        invoice.valor_frete,
        invoice.valor_seguro,
        invoice.outras_despesas,
    ]
    .into_iter()
    .fold(products, Decimal::saturating_add);
    expected
        .saturating_sub(invoice.valor_nota)
        .max(Decimal::ZERO)
}

/// Extracts one line per outbound invoice item, with the implied discount
/// and the freight spread per unit.
///
/// # Errors
///
/// The outer error rejects the whole invoice (missing or unparseable issue
/// date). Inner errors reject single lines.
#[allow(clippy::type_complexity)]
pub fn sales_invoice_lines(
    invoice: &InvoiceDetail,
    tenant: &str,
    origin: &str,
) -> Result<Vec<Result<SalesInvoiceLine, DataQualityError>>, DataQualityError> {
    let issued_on = required_date(invoice.id, "dataEmissao", invoice.data_emissao.as_deref())?;
    let discount = implied_discount(invoice);
    let gross = gross_value(invoice.itens.iter().map(|i| (i.unit_price(), &i.quantidade)));

    Ok(invoice
        .itens
        .iter()
        .map(|item| {
            let sku = item.sku().ok_or(DataQualityError::MissingSku {
                document_id: invoice.id,
            })?;
            let quantity = line_number(invoice.id, sku, "quantidade", &item.quantidade)?;
            let quantity = positive_quantity(invoice.id, sku, quantity)?;
            let price = line_number(invoice.id, sku, "valor", item.unit_price())?;
            let line_value = price.saturating_mul(quantity);
            Ok(SalesInvoiceLine {
                invoice_id: invoice.id,
                sku: sku.to_string(),
                issued_on,
                origin: origin.to_string(),
                tenant: tenant.to_string(),
                quantity,
                unit_price: price,
                unit_discount: per_unit_share(discount, line_value, gross, quantity),
                unit_freight: per_unit_share(invoice.valor_frete, line_value, gross, quantity),
            })
        })
        .collect())
}

#[cfg(test)]
#[path = "normalize_test.rs"]
mod tests;
