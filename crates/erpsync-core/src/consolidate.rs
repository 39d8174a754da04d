//! Quantity-weighted consolidation of duplicate line items.
//!
//! Source documents may split one SKU across several lines (partial
//! deliveries, tax-lot splits). Merging sums the physical quantity and blends
//! every per-unit field by quantity weight:
//!
//! ```text
//! f = (f_a * q_a + f_b * q_b) / (q_a + q_b)
//! ```
//!
//! The weighted mean is associative and commutative, so the consolidated
//! record does not depend on the order lines arrive in (up to the last of
//! the 28 significant digits a [`Decimal`] keeps). Arithmetic saturates
//! instead of overflowing.

use std::collections::BTreeMap;

use rust_decimal::Decimal;

use crate::error::DataQualityError;
use crate::line_item::{LineItem, LineItemKey};

/// Merges `incoming` into `existing`, which must share its key.
///
/// When the combined quantity is zero the per-unit fields are left unchanged.
pub fn merge_into<T: LineItem>(existing: &mut T, incoming: &T) {
    let existing_qty = existing.quantity();
    let incoming_qty = incoming.quantity();
    let combined = existing_qty.saturating_add(incoming_qty);

    for field in T::UNIT_FIELDS {
        let weighted = (field.get)(existing)
            .saturating_mul(existing_qty)
            .saturating_add((field.get)(incoming).saturating_mul(incoming_qty));
        // `None` only for a zero combined quantity.
        if let Some(blended) = weighted.checked_div(combined) {
            (field.set)(existing, blended);
        }
    }
    existing.set_quantity(combined);
}

/// Rejects records that would corrupt a weighted average.
///
/// # Errors
///
/// Returns [`DataQualityError::MissingSku`] for a blank SKU and
/// [`DataQualityError::NonPositiveQuantity`] for a quantity that is zero or
/// negative.
pub fn validate<T: LineItem>(item: &T) -> Result<(), DataQualityError> {
    let key = item.key();
    if key.sku.trim().is_empty() {
        return Err(DataQualityError::MissingSku {
            document_id: key.document_id,
        });
    }
    let quantity = item.quantity();
    if quantity <= Decimal::ZERO {
        return Err(DataQualityError::NonPositiveQuantity { key, quantity });
    }
    Ok(())
}

/// Accumulates line items, keeping exactly one record per [`LineItemKey`].
#[derive(Debug, Clone)]
pub struct Consolidator<T: LineItem> {
    items: BTreeMap<LineItemKey, T>,
    merged: usize,
    rejected: usize,
}

impl<T: LineItem> Default for Consolidator<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: LineItem> Consolidator<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            items: BTreeMap::new(),
            merged: 0,
            rejected: 0,
        }
    }

    /// Adds one partial record, merging it into an existing record with the
    /// same key.
    ///
    /// # Errors
    ///
    /// Returns the [`DataQualityError`] from [`validate`]; the record is
    /// logged and dropped.
    pub fn insert(&mut self, item: T) -> Result<(), DataQualityError> {
        if let Err(e) = validate(&item) {
            self.rejected += 1;
            tracing::warn!(error = %e, "skipping line item");
            return Err(e);
        }

        let key = item.key();
        match self.items.get_mut(&key) {
            Some(existing) => {
                merge_into(existing, &item);
                self.merged += 1;
                tracing::debug!(
                    key = %key,
                    quantity = %existing.quantity(),
                    "consolidated duplicate line item"
                );
            }
            None => {
                self.items.insert(key, item);
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[must_use]
    pub fn get(&self, key: &LineItemKey) -> Option<&T> {
        self.items.get(key)
    }

    /// Number of inserts that were folded into an existing key.
    #[must_use]
    pub fn merged(&self) -> usize {
        self.merged
    }

    /// Number of records rejected as data-quality errors.
    #[must_use]
    pub fn rejected(&self) -> usize {
        self.rejected
    }

    /// Removes and returns every consolidated record in key order.
    pub fn drain(&mut self) -> Vec<T> {
        std::mem::take(&mut self.items).into_values().collect()
    }

    #[must_use]
    pub fn into_map(self) -> BTreeMap<LineItemKey, T> {
        self.items
    }
}

/// Consolidates `records` into one record per key, skipping invalid ones.
pub fn consolidate<T, I>(records: I) -> BTreeMap<LineItemKey, T>
where
    T: LineItem,
    I: IntoIterator<Item = T>,
{
    let mut consolidator = Consolidator::new();
    for record in records {
        // Rejections are logged by `insert`.
        let _ = consolidator.insert(record);
    }
    consolidator.into_map()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::line_item::testing::{d, CostLine};

    fn approx_eq(a: Decimal, b: Decimal) -> bool {
        (a - b).abs() <= Decimal::new(1, 20)
    }

    #[test]
    fn two_partial_lines_blend_unit_cost() {
        let out = consolidate(vec![
            CostLine::new(1, "X", 2.0, 10.0),
            CostLine::new(1, "X", 3.0, 20.0),
        ]);
        assert_eq!(out.len(), 1);
        let line = &out[&LineItemKey::new(1, "X")];
        assert_eq!(line.quantity, d(5.0));
        assert_eq!(line.unit_cost, d(16.0));
    }

    #[test]
    fn zero_quantity_line_is_rejected() {
        let mut c = Consolidator::new();
        let err = c.insert(CostLine::new(1, "X", 0.0, 10.0)).unwrap_err();
        assert!(matches!(err, DataQualityError::NonPositiveQuantity { .. }));
        assert!(c.is_empty());
        assert_eq!(c.rejected(), 1);

        let out = consolidate(vec![CostLine::new(1, "X", 0.0, 10.0)]);
        assert!(out.is_empty());
    }

    #[test]
    fn negative_quantities_are_rejected() {
        let mut c = Consolidator::new();
        assert!(c.insert(CostLine::new(1, "X", -1.0, 10.0)).is_err());
        assert!(c.insert(CostLine::new(1, "X", -0.5, 10.0)).is_err());
        assert_eq!(c.rejected(), 2);
    }

    #[test]
    fn rejected_line_does_not_disturb_existing_record() {
        let mut c = Consolidator::new();
        c.insert(CostLine::new(1, "X", 2.0, 10.0)).unwrap();
        assert!(c.insert(CostLine::new(1, "X", 0.0, 99.0)).is_err());
        let line = c.get(&LineItemKey::new(1, "X")).unwrap();
        assert_eq!(line.quantity, d(2.0));
        assert_eq!(line.unit_cost, d(10.0));
    }

    #[test]
    fn blank_sku_is_rejected() {
        let mut c = Consolidator::new();
        let err = c.insert(CostLine::new(7, "  ", 1.0, 1.0)).unwrap_err();
        assert_eq!(err, DataQualityError::MissingSku { document_id: 7 });
    }

    #[test]
    fn distinct_keys_are_kept_apart() {
        let out = consolidate(vec![
            CostLine::new(1, "X", 1.0, 10.0),
            CostLine::new(1, "Y", 1.0, 20.0),
            CostLine::new(2, "X", 1.0, 30.0),
        ]);
        assert_eq!(out.len(), 3);
        assert_eq!(out[&LineItemKey::new(2, "X")].unit_cost, d(30.0));
    }

    #[test]
    fn merge_with_zero_combined_quantity_keeps_fields() {
        let mut a = CostLine::new(1, "X", 0.0, 10.0);
        let b = CostLine::new(1, "X", 0.0, 50.0);
        merge_into(&mut a, &b);
        assert_eq!(a.unit_cost, d(10.0));
        assert_eq!(a.quantity, Decimal::ZERO);
    }

    #[test]
    fn merge_of_huge_values_saturates_instead_of_overflowing() {
        let mut a = CostLine::new(1, "X", 1.0, 1.0);
        a.unit_cost = Decimal::MAX;
        a.quantity = Decimal::MAX;
        let b = a.clone();
        merge_into(&mut a, &b);
        assert_eq!(a.quantity, Decimal::MAX);
        assert!(a.unit_cost > Decimal::ZERO);
    }

    #[test]
    fn every_unit_field_is_averaged() {
        let out = consolidate(vec![
            CostLine::new(1, "X", 1.0, 10.0).with_freight(d(4.0)),
            CostLine::new(1, "X", 3.0, 10.0).with_freight(Decimal::ZERO),
        ]);
        let line = &out[&LineItemKey::new(1, "X")];
        assert_eq!(line.freight, d(1.0));
    }

    /// Deterministic pseudo-random lines sharing one key, with whole
    /// quantities and prices in cents.
    fn sample_lines(seed: u64, n: usize) -> Vec<CostLine> {
        let mut state = seed;
        let mut next = move || {
            state = state
                .wrapping_mul(6_364_136_223_846_793_005)
                .wrapping_add(1_442_695_040_888_963_407);
            i64::try_from(state >> 33).unwrap()
        };
        (0..n)
            .map(|_| {
                let mut line = CostLine::new(9, "SKU-1", 1.0, 0.0);
                line.quantity = Decimal::from(next() % 50 + 1);
                line.unit_cost = Decimal::new(next() % 100_000, 2);
                line.with_freight(Decimal::new(next() % 1_000, 2))
            })
            .collect()
    }

    #[test]
    fn result_is_independent_of_merge_order() {
        for seed in 1..20 {
            let lines = sample_lines(seed, 12);
            let forward = consolidate(lines.clone());
            let reversed = consolidate(lines.iter().rev().cloned());
            let mut rotated = lines.clone();
            rotated.rotate_left(5);
            let rotated = consolidate(rotated);

            let key = LineItemKey::new(9, "SKU-1");
            let (f, r, o) = (&forward[&key], &reversed[&key], &rotated[&key]);
            assert!(f.quantity == r.quantity && f.quantity == o.quantity);
            assert!(approx_eq(f.unit_cost, r.unit_cost), "{} vs {}", f.unit_cost, r.unit_cost);
            assert!(approx_eq(f.unit_cost, o.unit_cost), "{} vs {}", f.unit_cost, o.unit_cost);
            assert!(approx_eq(f.freight, r.freight) && approx_eq(f.freight, o.freight));
        }
    }

    #[test]
    fn grouping_does_not_change_result() {
        let lines = sample_lines(42, 9);
        let key = LineItemKey::new(9, "SKU-1");
        let flat = consolidate(lines.clone());

        // Consolidate in three groups, then merge the partial results.
        let partials: Vec<CostLine> = lines
            .chunks(3)
            .map(|chunk| consolidate(chunk.to_vec()).remove(&key).unwrap())
            .collect();
        let grouped = consolidate(partials);

        assert!(approx_eq(flat[&key].unit_cost, grouped[&key].unit_cost));
        assert!(approx_eq(flat[&key].freight, grouped[&key].freight));
    }

    #[test]
    fn quantity_is_exact_sum_of_inputs() {
        let lines = sample_lines(7, 25);
        let expected: Decimal = lines.iter().map(|l| l.quantity).sum();
        let out = consolidate(lines);
        assert_eq!(out[&LineItemKey::new(9, "SKU-1")].quantity, expected);
    }

    #[test]
    fn blended_fields_stay_within_input_bounds() {
        for seed in 100..120 {
            let lines = sample_lines(seed, 10);
            let min = lines.iter().map(|l| l.unit_cost).min().unwrap();
            let max = lines.iter().map(|l| l.unit_cost).max().unwrap();
            let out = consolidate(lines);
            let cost = out[&LineItemKey::new(9, "SKU-1")].unit_cost;
            assert!(cost >= min && cost <= max, "{cost} not in [{min}, {max}]");
        }
    }

    #[test]
    fn drain_empties_the_consolidator() {
        let mut c = Consolidator::new();
        c.insert(CostLine::new(2, "B", 1.0, 1.0)).unwrap();
        c.insert(CostLine::new(1, "A", 1.0, 1.0)).unwrap();
        c.insert(CostLine::new(1, "A", 1.0, 3.0)).unwrap();
        assert_eq!(c.merged(), 1);

        let drained = c.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].sku, "A", "drain yields records in key order");
        assert!(c.is_empty());
    }
}
