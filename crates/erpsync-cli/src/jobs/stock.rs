use anyhow::Context;
use chrono::Utc;
use erpsync_core::TenantPolicy;
use erpsync_erp::normalize_stock;
use erpsync_erp::types::StockBalance;
use erpsync_store::tables::{STOCK, STOCK_KEY};

use super::{next_page, parse_page, JobContext, JobSummary};

/// Walks the balances of every mapped deposit and upserts one row per SKU
/// and channel.
pub(crate) async fn sync_tenant(
    ctx: &JobContext,
    tenant: &TenantPolicy,
) -> anyhow::Result<JobSummary> {
    let policy = tenant
        .stock
        .as_ref()
        .with_context(|| format!("tenant '{}' does not enable stock", tenant.name))?;
    let client = ctx.erp_client(&tenant.name)?;
    let mut upserter = ctx.upserter(STOCK, STOCK_KEY, policy.batch_size);
    let mut summary = JobSummary::default();
    let mut all_complete = true;

    for deposit in &policy.deposits {
        let mut query = vec![("idsDepositos[]".to_string(), deposit.id.to_string())];
        if policy.positive_only {
            query.push(("filtroSaldoEstoque".to_string(), "1".to_string()));
        }
        let now = Utc::now();
        let mut walker = client.pages("/estoques/saldos", query, 1);

        while let Some(page) = next_page(&mut walker, &mut summary).await? {
            for balance in parse_page::<StockBalance>(&page, &mut summary) {
                let name = balance.product_name();
                if policy
                    .skip_name_prefixes
                    .iter()
                    .any(|p| name.starts_with(p.as_str()))
                {
                    summary.skipped += 1;
                    continue;
                }
                match normalize_stock(&balance, deposit.id, &deposit.channel, now) {
                    Ok(row) => {
                        summary.documents += 1;
                        upserter.push(row).await;
                    }
                    Err(e) => {
                        tracing::warn!(deposit = deposit.id, error = %e, "balance rejected");
                        summary.rejected += 1;
                    }
                }
            }
        }
        all_complete &= summary.walk_complete;
        tracing::info!(
            deposit = deposit.id,
            channel = %deposit.channel,
            "deposit done"
        );
    }

    summary.walk_complete = all_complete;
    summary.writes = upserter.finish().await;
    Ok(summary)
}
