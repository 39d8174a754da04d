use crate::consolidate::Consolidator;
use crate::error::DataQualityError;
use crate::line_item::LineItem;

/// A bounded, consolidated batch of line items awaiting one bulk upsert.
///
/// The owning job flushes it when [`SyncBatch::is_full`] turns true and once
/// more at the end of the run. Records are only merged within the batch;
/// what is already in the store is overwritten, never re-merged.
#[derive(Debug)]
pub struct SyncBatch<T: LineItem> {
    lines: Consolidator<T>,
    threshold: usize,
}

impl<T: LineItem> SyncBatch<T> {
    /// Creates a batch that reports full at `threshold` distinct keys.
    /// A zero threshold is treated as one.
    #[must_use]
    pub fn new(threshold: usize) -> Self {
        Self {
            lines: Consolidator::new(),
            threshold: threshold.max(1),
        }
    }

    /// # Errors
    ///
    /// Returns the [`DataQualityError`] for a rejected record.
    pub fn insert(&mut self, item: T) -> Result<(), DataQualityError> {
        self.lines.insert(item)
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.lines.len() >= self.threshold
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    #[must_use]
    pub fn rejected(&self) -> usize {
        self.lines.rejected()
    }

    /// Takes the consolidated records, leaving the batch empty.
    pub fn take(&mut self) -> Vec<T> {
        self.lines.drain()
    }
}
