use std::collections::{BTreeSet, HashMap, HashSet};

use anyhow::Context;
use erpsync_core::{Clock, CredentialGateway, PurchaseOrderLine, SyncBatch, TenantPolicy};
use erpsync_erp::types::{Contact, ContactRef, PurchaseOrderDetail, PurchaseOrderSummary};
use erpsync_erp::{purchase_order_lines, ErpClient, ErpError, OrderContext};
use erpsync_store::eq;
use erpsync_store::tables::{PURCHASE_ORDERS, PURCHASE_ORDERS_KEY};
use serde::Deserialize;

use super::{
    collect_lines, fetch_detail, flush_if_full, next_page, parse_page, JobContext, JobSummary,
};

/// Orders deleted per request when pruning.
const PRUNE_CHUNK: usize = 50;

/// Supplier name for orders that carry no supplier.
pub(crate) const UNKNOWN_SUPPLIER: &str = "FORNECEDOR NAO INFORMADO";

/// Supplier name for contacts the ERP returns without a name.
pub(crate) const UNNAMED_SUPPLIER: &str = "DESCONHECIDO";

fn non_blank(name: Option<&str>) -> Option<&str> {
    name.map(str::trim).filter(|n| !n.is_empty())
}

/// Supplier names by contact id, for one job run.
#[derive(Debug, Default)]
pub(crate) struct SupplierCache {
    names: HashMap<i64, String>,
}

impl SupplierCache {
    /// Upper-cased name of the order's supplier: the name on the order if
    /// present, otherwise the contact's name, fetched once per id. An order
    /// without a supplier resolves to [`UNKNOWN_SUPPLIER`]; a contact lookup
    /// that fails resolves to `ID <id>` and is retried on the next order.
    pub(crate) async fn resolve<G: CredentialGateway, C: Clock>(
        &mut self,
        client: &ErpClient<G, C>,
        supplier: Option<&ContactRef>,
    ) -> Result<String, ErpError> {
        if let Some(name) = supplier.and_then(|s| non_blank(s.nome.as_deref())) {
            return Ok(name.to_uppercase());
        }
        let Some(id) = supplier.and_then(|s| s.id).filter(|id| *id != 0) else {
            return Ok(UNKNOWN_SUPPLIER.to_string());
        };
        if let Some(name) = self.names.get(&id) {
            return Ok(name.clone());
        }

        let name = match client.get_detail::<Contact>("/contatos", id).await {
            Ok(contact) => contact
                .and_then(|c| non_blank(c.nome.as_deref()).map(str::to_uppercase))
                .unwrap_or_else(|| UNNAMED_SUPPLIER.to_string()),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                tracing::warn!(contact_id = id, error = %e, "supplier lookup failed");
                return Ok(format!("ID {id}"));
            }
        };
        self.names.insert(id, name.clone());
        Ok(name)
    }

    #[must_use]
    pub(crate) fn len(&self) -> usize {
        self.names.len()
    }
}

/// Walks purchase orders, keeps the statuses the policy names, and upserts
/// their consolidated lines. Afterwards removes stored orders of the tenant
/// that this run no longer saw.
pub(crate) async fn sync_tenant(
    ctx: &JobContext,
    tenant: &TenantPolicy,
) -> anyhow::Result<JobSummary> {
    let policy = tenant
        .purchase_orders
        .as_ref()
        .with_context(|| format!("tenant '{}' does not enable purchase orders", tenant.name))?;
    let client = ctx.erp_client(&tenant.name)?;
    let mut upserter = ctx.upserter(PURCHASE_ORDERS, PURCHASE_ORDERS_KEY, policy.batch_size);
    let mut batch = SyncBatch::<PurchaseOrderLine>::new(policy.batch_size);
    let mut suppliers = SupplierCache::default();
    let mut summary = JobSummary::default();
    // Orders whose stored rows must survive the prune.
    let mut seen = BTreeSet::new();
    // Orders already handled; the list can repeat an order across pages.
    let mut visited = HashSet::new();

    let mut walker = client.pages("/pedidos/compras", Vec::new(), 1);
    while let Some(page) = next_page(&mut walker, &mut summary).await? {
        for order in parse_page::<PurchaseOrderSummary>(&page, &mut summary) {
            let Some(status) = order.status() else {
                summary.skipped += 1;
                continue;
            };
            let Some(label) = policy.label_for(status) else {
                continue;
            };
            if !visited.insert(order.id) {
                tracing::debug!(order_id = order.id, "order listed again; already handled");
                continue;
            }

            let Some(detail) = fetch_detail::<PurchaseOrderDetail, _, _>(
                &client,
                "/pedidos/compras",
                order.id,
                &mut summary,
            )
            .await?
            else {
                // Not verifiable this run; leave what is stored alone.
                seen.insert(order.id);
                continue;
            };

            let supplier = suppliers
                .resolve(&client, detail.fornecedor.as_ref())
                .await?;
            if policy.blacklist_statuses.contains(&status) && ctx.policy.is_blacklisted(&supplier)
            {
                tracing::debug!(order_id = order.id, %supplier, "blacklisted supplier");
                summary.skipped += 1;
                continue;
            }

            seen.insert(order.id);
            let lines = purchase_order_lines(
                &detail,
                OrderContext {
                    supplier: &supplier,
                    tenant: &tenant.name,
                    status_label: label,
                },
            );
            if collect_lines(lines, &mut batch, &mut summary) {
                summary.documents += 1;
            }
            flush_if_full(&mut batch, &mut upserter).await;
        }
    }

    upserter.write(&batch.take()).await;
    summary.writes = upserter.finish().await;
    tracing::debug!(suppliers = suppliers.len(), "supplier cache size");

    if policy.prune_obsolete {
        if summary.walk_complete && !seen.is_empty() {
            prune(ctx, &tenant.name, &seen).await;
        } else {
            tracing::warn!(
                walk_complete = summary.walk_complete,
                seen = seen.len(),
                "skipping prune of obsolete orders"
            );
        }
    }

    Ok(summary)
}

#[derive(Debug, Deserialize)]
struct StoredOrder {
    id_pedido: i64,
}

/// Stored order ids of `tenant` that are not in `seen`.
fn obsolete_orders(stored: Vec<StoredOrder>, seen: &BTreeSet<i64>) -> Vec<i64> {
    stored
        .into_iter()
        .map(|o| o.id_pedido)
        .filter(|id| !seen.contains(id))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Deletes the tenant's stored orders missing from `seen`, in chunks.
/// Store failures are logged; the rows are picked up again next run.
async fn prune(ctx: &JobContext, tenant: &str, seen: &BTreeSet<i64>) {
    let filters = [("loja", eq(tenant))];
    let stored: Vec<StoredOrder> = match ctx
        .store
        .select_all(PURCHASE_ORDERS, "id_pedido", &filters)
        .await
    {
        Ok(rows) => rows,
        Err(e) => {
            tracing::error!(error = %e, "failed to read stored orders; prune skipped");
            return;
        }
    };

    let obsolete = obsolete_orders(stored, seen);
    if obsolete.is_empty() {
        return;
    }
    if ctx.dry_run {
        tracing::info!(orders = obsolete.len(), "dry run; prune skipped");
        return;
    }

    let mut deleted = 0;
    for chunk in obsolete.chunks(PRUNE_CHUNK) {
        match ctx
            .store
            .delete_in(PURCHASE_ORDERS, "id_pedido", chunk, &filters)
            .await
        {
            Ok(()) => deleted += chunk.len(),
            Err(e) => tracing::error!(orders = chunk.len(), error = %e, "prune chunk failed"),
        }
    }
    tracing::info!(deleted, obsolete = obsolete.len(), "pruned obsolete orders");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn obsolete_orders_are_the_unseen_ones_deduplicated() {
        let stored = [4, 1, 2, 4, 3]
            .into_iter()
            .map(|id_pedido| StoredOrder { id_pedido })
            .collect();
        let seen = BTreeSet::from([2, 3]);
        assert_eq!(obsolete_orders(stored, &seen), vec![1, 4]);
    }
}
