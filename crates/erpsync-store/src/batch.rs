//! Buffered bulk upserts with loss accounting.

use serde::Serialize;

use crate::client::StoreClient;

/// Totals for one table over a run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FlushReport {
    /// Upsert requests attempted.
    pub batches: usize,
    pub rows_written: usize,
    /// Rows in batches the store rejected.
    pub rows_lost: usize,
}

impl FlushReport {
    pub fn absorb(&mut self, other: FlushReport) {
        self.batches += other.batches;
        self.rows_written += other.rows_written;
        self.rows_lost += other.rows_lost;
    }
}

/// Collects rows for one table and upserts them in batches.
///
/// A failed batch is logged with the store's response and counted as lost;
/// it never stops the caller. In dry-run mode nothing is sent and every row
/// counts as written.
#[derive(Debug)]
pub struct BatchUpserter<'a, T> {
    store: &'a StoreClient,
    table: &'static str,
    on_conflict: &'static str,
    threshold: usize,
    dry_run: bool,
    buffer: Vec<T>,
    report: FlushReport,
}

impl<'a, T: Serialize> BatchUpserter<'a, T> {
    /// A zero `threshold` is treated as one.
    #[must_use]
    pub fn new(
        store: &'a StoreClient,
        table: &'static str,
        on_conflict: &'static str,
        threshold: usize,
    ) -> Self {
        Self {
            store,
            table,
            on_conflict,
            threshold: threshold.max(1),
            dry_run: false,
            buffer: Vec::new(),
            report: FlushReport::default(),
        }
    }

    #[must_use]
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    #[must_use]
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    #[must_use]
    pub fn report(&self) -> FlushReport {
        self.report
    }

    /// Buffers `row`, flushing once the buffer reaches the threshold.
    pub async fn push(&mut self, row: T) {
        self.buffer.push(row);
        if self.buffer.len() >= self.threshold {
            self.flush().await;
        }
    }

    /// Sends the buffered rows, if any.
    pub async fn flush(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        let rows = std::mem::take(&mut self.buffer);
        self.write(&rows).await;
    }

    /// Upserts `rows` as one request, bypassing the buffer. Used for batches
    /// the caller has already consolidated.
    pub async fn write(&mut self, rows: &[T]) {
        if rows.is_empty() {
            return;
        }
        self.report.batches += 1;

        if self.dry_run {
            tracing::info!(table = self.table, rows = rows.len(), "dry run; upsert skipped");
            self.report.rows_written += rows.len();
            return;
        }

        match self.store.upsert(self.table, self.on_conflict, rows).await {
            Ok(()) => {
                tracing::debug!(table = self.table, rows = rows.len(), "batch upserted");
                self.report.rows_written += rows.len();
            }
            Err(e) => {
                tracing::error!(
                    table = self.table,
                    rows = rows.len(),
                    error = %e,
                    "batch upsert failed; rows lost"
                );
                self.report.rows_lost += rows.len();
            }
        }
    }

    /// Flushes what is left and returns the totals.
    pub async fn finish(mut self) -> FlushReport {
        self.flush().await;
        self.report
    }
}
