//! Sync jobs, one module per target table.
//!
//! Every job walks one or more ERP list endpoints for a tenant, fetches the
//! details it needs, and upserts normalized rows in batches. Jobs run
//! tenants one after another; a tenant that fails is logged and the next one
//! still runs.

pub(crate) mod inbound_invoices;
pub(crate) mod products;
pub(crate) mod purchase_orders;
pub(crate) mod sales_invoices;
pub(crate) mod stock;

use anyhow::Context;
use chrono::NaiveDate;
use erpsync_core::{
    client_credentials_from_env, Clock, CredentialGateway, DataQualityError, LineItem,
    PolicyFile, SyncBatch, TenantPolicy,
};
use erpsync_erp::{ErpClient, ErpError, ErpSettings, Page, PageWalker};
use erpsync_store::{BatchUpserter, FlushReport, StoreClient, StoreCredentialGateway};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::Instrument;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Job {
    Products { start_page: u32 },
    Stock,
    PurchaseOrders,
    InboundInvoices,
    SalesInvoices,
}

impl Job {
    pub(crate) fn name(self) -> &'static str {
        match self {
            Job::Products { .. } => "products",
            Job::Stock => "stock",
            Job::PurchaseOrders => "purchase-orders",
            Job::InboundInvoices => "inbound-invoices",
            Job::SalesInvoices => "sales-invoices",
        }
    }

    fn enabled_for(self, tenant: &TenantPolicy) -> bool {
        match self {
            Job::Products { .. } => tenant.products.is_some(),
            Job::Stock => tenant.stock.is_some(),
            Job::PurchaseOrders => tenant.purchase_orders.is_some(),
            Job::InboundInvoices => tenant.inbound_invoices.is_some(),
            Job::SalesInvoices => tenant.sales_invoices.is_some(),
        }
    }
}

/// Everything a job needs that outlives a single tenant.
pub(crate) struct JobContext {
    pub policy: PolicyFile,
    pub store: StoreClient,
    pub erp: ErpSettings,
    pub dry_run: bool,
}

impl JobContext {
    pub(crate) fn new(
        config: erpsync_core::AppConfig,
        policy: PolicyFile,
        dry_run: bool,
    ) -> anyhow::Result<Self> {
        let store = StoreClient::from_config(&config).context("failed to build store client")?;
        Ok(Self {
            policy,
            store,
            erp: ErpSettings::from_config(&config),
            dry_run,
        })
    }

    /// Credential gateway for `tenant`, with client credentials from the
    /// environment as a fallback for rows that lack them.
    pub(crate) fn gateway(&self, tenant: &str) -> StoreCredentialGateway {
        let gateway = StoreCredentialGateway::new(self.store.clone());
        match client_credentials_from_env(tenant) {
            Some(credentials) => gateway.with_client_credentials(tenant, credentials),
            None => gateway,
        }
    }

    pub(crate) fn erp_client(
        &self,
        tenant: &str,
    ) -> anyhow::Result<ErpClient<StoreCredentialGateway>> {
        ErpClient::new(self.erp.clone(), tenant, self.gateway(tenant))
            .with_context(|| format!("failed to build ERP client for {tenant}"))
    }

    pub(crate) fn upserter<T: Serialize>(
        &self,
        table: &'static str,
        on_conflict: &'static str,
        threshold: usize,
    ) -> BatchUpserter<'_, T> {
        BatchUpserter::new(&self.store, table, on_conflict, threshold).dry_run(self.dry_run)
    }

    /// Tenants to run `job` for: the requested ones, or every tenant whose
    /// policy enables the job.
    ///
    /// # Errors
    ///
    /// Fails when a requested tenant is unknown or does not enable the job,
    /// or when no tenant enables it at all.
    pub(crate) fn select_tenants(
        &self,
        job: Job,
        requested: &[String],
    ) -> anyhow::Result<Vec<TenantPolicy>> {
        if requested.is_empty() {
            let tenants: Vec<TenantPolicy> = self
                .policy
                .tenants
                .iter()
                .filter(|t| job.enabled_for(t))
                .cloned()
                .collect();
            if tenants.is_empty() {
                anyhow::bail!("no tenant in the policy file enables {}", job.name());
            }
            return Ok(tenants);
        }

        requested
            .iter()
            .map(|name| {
                let tenant = self
                    .policy
                    .tenant(name)
                    .with_context(|| format!("tenant '{name}' is not in the policy file"))?;
                if !job.enabled_for(tenant) {
                    anyhow::bail!("tenant '{name}' does not enable {}", job.name());
                }
                Ok(tenant.clone())
            })
            .collect()
    }
}

/// Counters for one tenant's run of a job.
#[derive(Debug, Default, Clone)]
pub(crate) struct JobSummary {
    pub pages: u32,
    pub documents: usize,
    /// Records or documents left out: filtered, unreadable, or whose detail
    /// request failed.
    pub skipped: usize,
    /// Lines rejected as data-quality errors.
    pub rejected: usize,
    pub writes: FlushReport,
    /// `true` once every walk of the run reached its natural end.
    pub walk_complete: bool,
}

impl JobSummary {
    fn log(&self, job: Job, tenant: &str) {
        tracing::info!(
            job = job.name(),
            tenant,
            pages = self.pages,
            documents = self.documents,
            rows_written = self.writes.rows_written,
            rows_lost = self.writes.rows_lost,
            skipped = self.skipped,
            rejected = self.rejected,
            "sync finished"
        );
    }
}

/// Runs `job` for each tenant in turn.
///
/// # Errors
///
/// Returns an error naming the tenants whose run failed (for example on an
/// authentication failure), after every tenant has been attempted.
pub(crate) async fn run(
    ctx: &JobContext,
    job: Job,
    tenants: &[TenantPolicy],
) -> anyhow::Result<()> {
    let mut failed = Vec::new();

    for tenant in tenants {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("sync", job = job.name(), tenant = %tenant.name, %run_id);
        let result = async {
            tracing::info!(dry_run = ctx.dry_run, "sync started");
            match job {
                Job::Products { start_page } => {
                    products::sync_tenant(ctx, tenant, start_page).await
                }
                Job::Stock => stock::sync_tenant(ctx, tenant).await,
                Job::PurchaseOrders => purchase_orders::sync_tenant(ctx, tenant).await,
                Job::InboundInvoices => inbound_invoices::sync_tenant(ctx, tenant).await,
                Job::SalesInvoices => sales_invoices::sync_tenant(ctx, tenant).await,
            }
        }
        .instrument(span.clone())
        .await;

        let _entered = span.enter();
        match result {
            Ok(summary) => summary.log(job, &tenant.name),
            Err(e) => {
                tracing::error!(error = %format!("{e:#}"), "sync failed");
                failed.push(tenant.name.clone());
            }
        }
    }

    if failed.is_empty() {
        Ok(())
    } else {
        anyhow::bail!("{} failed for: {}", job.name(), failed.join(", "))
    }
}

// ---------------------------------------------------------------------------
// Walk helpers shared by the jobs
// ---------------------------------------------------------------------------

/// Next page of a walk. Fatal errors propagate; any other error has already
/// been logged by the walker and just ends the walk.
pub(crate) async fn next_page<G: CredentialGateway, C: Clock>(
    walker: &mut PageWalker<'_, G, C>,
    summary: &mut JobSummary,
) -> Result<Option<Page>, ErpError> {
    match walker.next_page().await {
        Ok(Some(page)) => {
            summary.pages += 1;
            Ok(Some(page))
        }
        Ok(None) => {
            summary.walk_complete = !walker.is_truncated();
            Ok(None)
        }
        Err(e) if e.is_fatal() => Err(e),
        Err(_) => {
            summary.walk_complete = false;
            Ok(None)
        }
    }
}

/// Parses a page into `T`, counting records that do not parse as skipped.
pub(crate) fn parse_page<T: DeserializeOwned>(page: &Page, summary: &mut JobSummary) -> Vec<T> {
    let (records, malformed) = page.parse::<T>();
    summary.skipped += malformed;
    records
}

/// Fetches one document's detail. `Ok(None)` means the document is skipped.
pub(crate) async fn fetch_detail<T, G, C>(
    client: &ErpClient<G, C>,
    resource: &str,
    id: i64,
    summary: &mut JobSummary,
) -> Result<Option<T>, ErpError>
where
    T: DeserializeOwned,
    G: CredentialGateway,
    C: Clock,
{
    match client.get_detail::<T>(resource, id).await {
        Ok(Some(detail)) => Ok(Some(detail)),
        Ok(None) => {
            tracing::warn!(resource, id, "detail has no data; skipping document");
            summary.skipped += 1;
            Ok(None)
        }
        Err(e) if e.is_fatal() => Err(e),
        Err(e) => {
            tracing::warn!(resource, id, error = %e, "detail request failed; skipping document");
            summary.skipped += 1;
            Ok(None)
        }
    }
}

/// Adds a document's extracted lines to `batch`, logging and counting every
/// rejected line. Returns `false` when the whole document was rejected.
pub(crate) fn collect_lines<T: LineItem>(
    lines: Result<Vec<Result<T, DataQualityError>>, DataQualityError>,
    batch: &mut SyncBatch<T>,
    summary: &mut JobSummary,
) -> bool {
    let lines = match lines {
        Ok(lines) => lines,
        Err(e) => {
            tracing::warn!(error = %e, "document rejected");
            summary.skipped += 1;
            return false;
        }
    };
    for line in lines {
        match line {
            // The batch logs its own rejections.
            Ok(line) => {
                if batch.insert(line).is_err() {
                    summary.rejected += 1;
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "line rejected");
                summary.rejected += 1;
            }
        }
    }
    true
}

/// Upserts the batch when it is full.
pub(crate) async fn flush_if_full<T: LineItem + Serialize>(
    batch: &mut SyncBatch<T>,
    upserter: &mut BatchUpserter<'_, T>,
) {
    if batch.is_full() {
        upserter.write(&batch.take()).await;
    }
}

/// Whether an invoice from store `store_id` belongs to the tenant's store
/// `wanted`. Invoices without a store never match.
pub(crate) fn store_matches(store_id: Option<i64>, wanted: i64, invoice_id: i64) -> bool {
    match store_id {
        Some(id) => id == wanted,
        None => {
            tracing::debug!(invoice_id, "invoice has no store; skipping");
            false
        }
    }
}

/// ERP timestamp filter value for the start of `day`.
pub(crate) fn day_start(day: NaiveDate) -> String {
    format!("{} 00:00:00", day.format("%Y-%m-%d"))
}

/// ERP timestamp filter value for the end of `day`.
pub(crate) fn day_end(day: NaiveDate) -> String {
    format!("{} 23:59:59", day.format("%Y-%m-%d"))
}

#[cfg(test)]
impl JobContext {
    pub(crate) fn for_tests(uri: &str, policy: PolicyFile, dry_run: bool) -> Self {
        let store = StoreClient::new(uri, "service-key", std::time::Duration::from_secs(5), "test")
            .expect("store client should build");
        Self {
            policy,
            store,
            erp: ErpSettings::for_tests(uri),
            dry_run,
        }
    }
}

#[cfg(test)]
#[path = "jobs_test.rs"]
mod tests;
