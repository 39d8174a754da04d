use anyhow::Context;
use erpsync_core::TenantPolicy;
use erpsync_erp::normalize_product;
use erpsync_erp::types::{ProductDetail, ProductSummary};
use erpsync_store::tables::{PRODUCTS, PRODUCTS_KEY};

use super::{fetch_detail, next_page, parse_page, JobContext, JobSummary};

/// Product status the ERP uses for deleted products.
const DELETED: &str = "E";

fn keeps_name(prefixes: &[String], name: &str) -> bool {
    prefixes.is_empty() || prefixes.iter().any(|p| name.starts_with(p.as_str()))
}

/// Walks the product list from `start_page` and upserts every product whose
/// name passes the tenant's prefix filter.
pub(crate) async fn sync_tenant(
    ctx: &JobContext,
    tenant: &TenantPolicy,
    start_page: u32,
) -> anyhow::Result<JobSummary> {
    let policy = tenant
        .products
        .as_ref()
        .with_context(|| format!("tenant '{}' does not enable products", tenant.name))?;
    let client = ctx.erp_client(&tenant.name)?;
    let mut upserter = ctx.upserter(PRODUCTS, PRODUCTS_KEY, policy.batch_size);
    let mut summary = JobSummary::default();

    let query = vec![("criterio".to_string(), "5".to_string())];
    let mut walker = client.pages("/produtos", query, start_page);

    while let Some(page) = next_page(&mut walker, &mut summary).await? {
        for product in parse_page::<ProductSummary>(&page, &mut summary) {
            let sku = product
                .codigo
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty());
            let (Some(id), Some(sku)) = (product.id, sku) else {
                summary.skipped += 1;
                continue;
            };
            if product.situacao.as_deref() == Some(DELETED) {
                summary.skipped += 1;
                continue;
            }

            let Some(detail) =
                fetch_detail::<ProductDetail, _, _>(&client, "/produtos", id, &mut summary).await?
            else {
                continue;
            };
            if !keeps_name(&policy.name_prefixes, &detail.nome) {
                summary.skipped += 1;
                continue;
            }

            summary.documents += 1;
            upserter.push(normalize_product(detail, sku)).await;
        }
        // The page number is what `--start-page` resumes from.
        tracing::info!(page = page.number, documents = summary.documents, "page done");
    }

    summary.writes = upserter.finish().await;
    Ok(summary)
}
