use std::collections::HashSet;

use anyhow::Context;
use chrono::{Duration, Utc};
use erpsync_core::{InboundInvoiceLine, SyncBatch, TenantPolicy};
use erpsync_erp::inbound_invoice_lines;
use erpsync_erp::types::{InvoiceDetail, InvoiceSummary};
use erpsync_store::tables::{INBOUND_INVOICES, INBOUND_INVOICES_KEY};

use super::{
    collect_lines, day_start, fetch_detail, flush_if_full, next_page, parse_page, store_matches,
    JobContext, JobSummary,
};

/// Walks the inbound invoices issued in the look-back window and upserts
/// their consolidated lines.
pub(crate) async fn sync_tenant(
    ctx: &JobContext,
    tenant: &TenantPolicy,
) -> anyhow::Result<JobSummary> {
    let policy = tenant
        .inbound_invoices
        .as_ref()
        .with_context(|| format!("tenant '{}' does not enable inbound invoices", tenant.name))?;
    let client = ctx.erp_client(&tenant.name)?;
    let mut upserter = ctx.upserter(INBOUND_INVOICES, INBOUND_INVOICES_KEY, policy.batch_size);
    let mut batch = SyncBatch::<InboundInvoiceLine>::new(policy.batch_size);
    let mut summary = JobSummary::default();
    // The list can repeat an invoice across pages.
    let mut visited = HashSet::new();

    let since = (Utc::now() - Duration::days(i64::from(policy.lookback_days))).date_naive();
    let query = vec![
        ("tipo".to_string(), "0".to_string()),
        ("dataEmissaoInicial".to_string(), day_start(since)),
    ];
    let mut walker = client.pages("/nfe", query, 1);

    while let Some(page) = next_page(&mut walker, &mut summary).await? {
        for invoice in parse_page::<InvoiceSummary>(&page, &mut summary) {
            let ignored_situation = invoice
                .situacao
                .is_some_and(|s| policy.ignore_situations.contains(&s));
            let ignored_nature = invoice
                .nature_id()
                .is_some_and(|n| policy.ignore_natures.contains(&n));
            if ignored_situation || ignored_nature {
                summary.skipped += 1;
                continue;
            }

            if !visited.insert(invoice.id) {
                tracing::debug!(invoice_id = invoice.id, "invoice listed again; already handled");
                continue;
            }

            let Some(detail) =
                fetch_detail::<InvoiceDetail, _, _>(&client, "/nfe", invoice.id, &mut summary)
                    .await?
            else {
                continue;
            };
            if let Some(wanted) = policy.store_id {
                if !store_matches(detail.store_id(), wanted, detail.id) {
                    summary.skipped += 1;
                    continue;
                }
            }
            if ctx.policy.is_blacklisted(detail.contact_name()) {
                tracing::debug!(
                    invoice_id = detail.id,
                    supplier = detail.contact_name(),
                    "blacklisted supplier"
                );
                summary.skipped += 1;
                continue;
            }

            let lines = inbound_invoice_lines(&detail, &tenant.name);
            if collect_lines(lines, &mut batch, &mut summary) {
                summary.documents += 1;
            }
            flush_if_full(&mut batch, &mut upserter).await;
        }
    }

    upserter.write(&batch.take()).await;
    summary.writes = upserter.finish().await;
    Ok(summary)
}
