use std::collections::HashSet;

use anyhow::Context;
use chrono::{Duration, Utc};
use erpsync_core::{SalesInvoiceLine, SyncBatch, TenantPolicy};
use erpsync_erp::sales_invoice_lines;
use erpsync_erp::types::{InvoiceDetail, InvoiceSummary};
use erpsync_store::tables::{SALES_INVOICES, SALES_INVOICES_KEY};

use super::{
    collect_lines, day_end, day_start, fetch_detail, flush_if_full, next_page, parse_page,
    store_matches, JobContext, JobSummary,
};

/// Walks the outbound invoices issued between `lookback_days` ago and today
/// and upserts their consolidated lines under the tenant's origin label.
pub(crate) async fn sync_tenant(
    ctx: &JobContext,
    tenant: &TenantPolicy,
) -> anyhow::Result<JobSummary> {
    let policy = tenant
        .sales_invoices
        .as_ref()
        .with_context(|| format!("tenant '{}' does not enable sales invoices", tenant.name))?;
    let client = ctx.erp_client(&tenant.name)?;
    let mut upserter = ctx.upserter(SALES_INVOICES, SALES_INVOICES_KEY, policy.batch_size);
    let mut batch = SyncBatch::<SalesInvoiceLine>::new(policy.batch_size);
    let mut summary = JobSummary::default();
    // The list can repeat an invoice across pages.
    let mut visited = HashSet::new();

    let today = Utc::now().date_naive();
    let since = today - Duration::days(i64::from(policy.lookback_days));
    let query = vec![
        ("tipo".to_string(), "1".to_string()),
        ("dataEmissaoInicial".to_string(), day_start(since)),
        ("dataEmissaoFinal".to_string(), day_end(today)),
    ];
    let mut walker = client.pages("/nfe", query, 1);

    let blocked = |nature: Option<i64>| nature.is_some_and(|n| policy.blocked_natures.contains(&n));

    while let Some(page) = next_page(&mut walker, &mut summary).await? {
        for invoice in parse_page::<InvoiceSummary>(&page, &mut summary) {
            let ignored_situation = invoice
                .situacao
                .is_some_and(|s| policy.ignore_situations.contains(&s));
            if ignored_situation || blocked(invoice.nature_id()) {
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
            // The list entry may omit the nature; the detail always has it.
            if blocked(detail.nature_id())
                || policy
                    .store_id
                    .is_some_and(|wanted| !store_matches(detail.store_id(), wanted, detail.id))
            {
                summary.skipped += 1;
                continue;
            }

            let lines = sales_invoice_lines(&detail, &tenant.name, &policy.origin);
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
