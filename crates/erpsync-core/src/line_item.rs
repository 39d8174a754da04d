//! Line items keyed by `(document_id, sku)` and the per-unit fields that are
//! averaged when two partial lines for the same key are merged.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Natural key of a line item: one row per SKU per source document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LineItemKey {
    pub document_id: i64,
    pub sku: String,
}

impl LineItemKey {
    #[must_use]
    pub fn new(document_id: i64, sku: impl Into<String>) -> Self {
        Self {
            document_id,
            sku: sku.into(),
        }
    }
}

impl std::fmt::Display for LineItemKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.document_id, self.sku)
    }
}

/// Accessor pair for one per-unit monetary field of `T`.
pub struct UnitField<T> {
    pub name: &'static str,
    pub get: fn(&T) -> Decimal,
    pub set: fn(&mut T, Decimal),
}

/// A record the consolidator can merge.
///
/// `quantity` is summed across duplicates; every field listed in
/// [`LineItem::UNIT_FIELDS`] holds a per-unit value and becomes the
/// quantity-weighted average of the merged inputs. Fields not listed keep the
/// value of the first record seen for the key.
pub trait LineItem: Clone + 'static {
    const UNIT_FIELDS: &'static [UnitField<Self>];

    fn key(&self) -> LineItemKey;

    fn quantity(&self) -> Decimal;

    fn set_quantity(&mut self, quantity: Decimal);
}
