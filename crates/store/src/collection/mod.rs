//! In-memory collection reducer.
//!
//! [`CollectionStore`] holds the ordered entries of one collection and keeps
//! its derived aggregates in step with them. Every mutation goes through a
//! method here, and every method finishes by recomputing `count` and
//! `totals` from `items`; the derived fields have no setters.
//!
//! The reducer is synchronous and does no I/O. Persisting to the mirror or
//! talking to the backend is the job of the [`sync`](crate::sync) strategies.

mod sort;
mod totals;

pub use sort::{ParseSortError, SortCriterion};
pub use totals::{PricingPolicy, Totals};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::warn;
use yoraa_core::{CollectionKind, ItemId, LineItem, LineItemDraft, VariantKey};

use crate::error::{Result, StoreError};

/// What `add` did to the collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// A new entry was appended.
    Inserted,
    /// An existing cart entry absorbed the added quantity.
    Merged,
    /// A wishlist or save-for-later entry already existed.
    Unchanged,
}

/// All entries of one collection plus derived aggregates.
#[derive(Debug, Clone)]
pub struct CollectionStore {
    kind: CollectionKind,
    policy: PricingPolicy,
    items: Vec<LineItem>,
    count: u64,
    totals: Option<Totals>,
    is_local: bool,
    last_updated: Option<DateTime<Utc>>,
}

impl CollectionStore {
    /// Create an empty store. New stores start in local mode.
    #[must_use]
    pub fn new(kind: CollectionKind, policy: PricingPolicy) -> Self {
        let mut store = Self {
            kind,
            policy,
            items: Vec::new(),
            count: 0,
            totals: None,
            is_local: true,
            last_updated: None,
        };
        store.recompute();
        store
    }

    /// Create a store pre-populated with items (e.g. restored from the mirror).
    #[must_use]
    pub fn with_items(kind: CollectionKind, policy: PricingPolicy, items: Vec<LineItem>) -> Self {
        let mut store = Self::new(kind, policy);
        store.items = items;
        store.normalize();
        store.recompute();
        store
    }

    #[must_use]
    pub const fn kind(&self) -> CollectionKind {
        self.kind
    }

    #[must_use]
    pub const fn policy(&self) -> &PricingPolicy {
        &self.policy
    }

    /// Entries in display order.
    #[must_use]
    pub fn items(&self) -> &[LineItem] {
        &self.items
    }

    /// Sum of quantities for the cart, number of entries otherwise.
    #[must_use]
    pub const fn count(&self) -> u64 {
        self.count
    }

    /// Monetary aggregates; `None` for wishlist and save-for-later.
    #[must_use]
    pub const fn totals(&self) -> Option<Totals> {
        self.totals
    }

    /// Whether the store is backed only by the local mirror.
    #[must_use]
    pub const fn is_local(&self) -> bool {
        self.is_local
    }

    #[must_use]
    pub const fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.last_updated
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub const fn set_local(&mut self, is_local: bool) {
        self.is_local = is_local;
    }

    /// Add a candidate entry.
    ///
    /// Cart entries merge on the `(id, size, color)` triple by summing
    /// quantities. Wishlist and save-for-later entries are membership-only:
    /// adding an `id` that is already present does nothing, and the draft's
    /// quantity is ignored.
    ///
    /// # Errors
    ///
    /// In the cart, returns `InvalidQuantity` if the draft explicitly asks
    /// for zero units, and `AmountOutOfRange` if the price is negative or the
    /// resulting totals would not fit in a `Decimal`.
    pub fn add(&mut self, draft: LineItemDraft, now: DateTime<Utc>) -> Result<AddOutcome> {
        if !self.kind.tracks_quantity() {
            if self.items.iter().any(|item| item.id == draft.id) {
                return Ok(AddOutcome::Unchanged);
            }
            let mut item = draft.into_line_item(now);
            item.quantity = 1;
            self.items.push(item);
            self.touch(now);
            return Ok(AddOutcome::Inserted);
        }

        let (items, outcome) = self.merge_draft(draft, now)?;
        self.items = items;
        self.touch(now);
        Ok(outcome)
    }

    /// Whether `add` would accept this draft. Nothing is changed.
    ///
    /// # Errors
    ///
    /// The same errors `add` would return.
    pub fn check_add(&self, draft: &LineItemDraft) -> Result<()> {
        if self.kind.tracks_quantity() {
            self.merge_draft(draft.clone(), Utc::now())?;
        }
        Ok(())
    }

    /// Remove every entry with this base id, whatever its variant.
    ///
    /// Returns the number of entries removed.
    pub fn remove(&mut self, id: &ItemId) -> usize {
        let before = self.items.len();
        self.items.retain(|item| &item.id != id);
        let removed = before - self.items.len();
        if removed > 0 {
            self.touch(Utc::now());
        }
        removed
    }

    /// Remove only the entry with this exact identity triple.
    pub fn remove_variant(&mut self, key: &VariantKey) -> bool {
        let before = self.items.len();
        self.items.retain(|item| !item.matches(key));
        let removed = before != self.items.len();
        if removed {
            self.touch(Utc::now());
        }
        removed
    }

    /// Set the quantity of every entry with this id.
    ///
    /// A quantity of zero or less removes the entries. Returns whether the
    /// collection changed.
    ///
    /// # Errors
    ///
    /// Returns `Unsupported` outside the cart, and `AmountOutOfRange` if the
    /// new totals would not fit in a `Decimal`.
    pub fn update_quantity(&mut self, id: &ItemId, quantity: i64) -> Result<bool> {
        self.ensure_tracks_quantity("update_quantity")?;

        if quantity <= 0 {
            return Ok(self.remove(id) > 0);
        }

        let Some(items) = self.requantified(id, quantity)? else {
            return Ok(false);
        };
        self.items = items;
        self.touch(Utc::now());
        Ok(true)
    }

    /// Whether `update_quantity` would accept this change. Nothing is
    /// changed.
    ///
    /// # Errors
    ///
    /// The same errors `update_quantity` would return.
    pub fn check_update_quantity(&self, id: &ItemId, quantity: i64) -> Result<()> {
        self.ensure_tracks_quantity("update_quantity")?;
        if quantity > 0 {
            self.requantified(id, quantity)?;
        }
        Ok(())
    }

    /// Remove all entries and zero the aggregates.
    pub fn clear(&mut self) {
        self.items.clear();
        self.touch(Utc::now());
    }

    /// Reorder entries. The sort is stable.
    pub fn sort(&mut self, criterion: SortCriterion) {
        self.items.sort_by(|a, b| criterion.compare(a, b));
        self.touch(Utc::now());
    }

    /// Replace the whole collection with a canonical list.
    pub fn replace_all(&mut self, items: Vec<LineItem>) {
        self.items = items;
        self.normalize();
        self.touch(Utc::now());
    }

    /// Fold one canonical entry: replace the entry with the same identity
    /// triple, or append.
    pub fn upsert(&mut self, mut item: LineItem) {
        if !self.kind.tracks_quantity() {
            item.quantity = 1;
        }
        let key = item.variant_key();
        if let Some(existing) = self.items.iter_mut().find(|e| e.matches(&key)) {
            *existing = item;
        } else {
            self.items.push(item);
        }
        self.normalize();
        self.touch(Utc::now());
    }

    /// Remove and return every entry with this id.
    pub fn take(&mut self, id: &ItemId) -> Vec<LineItem> {
        let (taken, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.items)
            .into_iter()
            .partition(|item| &item.id == id);
        self.items = kept;
        if !taken.is_empty() {
            self.touch(Utc::now());
        }
        taken
    }

    /// Enforce identity and quantity rules on items that came from outside
    /// (mirror or backend): zero quantities become 1, duplicate identities
    /// are collapsed into the first occurrence, and cart entries that cannot
    /// be totalled are dropped.
    fn normalize(&mut self) {
        let tracks_quantity = self.kind.tracks_quantity();
        let mut merged: Vec<LineItem> = Vec::with_capacity(self.items.len());
        for mut item in std::mem::take(&mut self.items) {
            item.quantity = if tracks_quantity {
                item.quantity.max(1)
            } else {
                1
            };
            let duplicate = if tracks_quantity {
                let key = item.variant_key();
                merged.iter_mut().find(|e| e.matches(&key))
            } else {
                merged.iter_mut().find(|e| e.id == item.id)
            };
            match duplicate {
                Some(existing) if tracks_quantity => {
                    existing.quantity = existing.quantity.saturating_add(item.quantity);
                }
                Some(_) => {}
                None => merged.push(item),
            }
        }
        self.items = if tracks_quantity {
            self.within_range(merged)
        } else {
            merged
        };
    }

    /// Drop cart entries that cannot be totalled: negative prices, and
    /// entries whose amount would push the totals past `Decimal` range.
    fn within_range(&self, items: Vec<LineItem>) -> Vec<LineItem> {
        let mut subtotal = Decimal::ZERO;
        let mut kept = Vec::with_capacity(items.len());
        for item in items {
            let next = item
                .line_total()
                .filter(|_| item.price >= Decimal::ZERO)
                .and_then(|line| subtotal.checked_add(line))
                .filter(|next| self.policy.totals_for_subtotal(*next).is_some());
            if let Some(next) = next {
                subtotal = next;
                kept.push(item);
            } else {
                warn!(
                    kind = %self.kind,
                    item_id = %item.id,
                    price = %item.price,
                    quantity = item.quantity,
                    "Dropping cart entry with out-of-range amount"
                );
            }
        }
        kept
    }

    fn merge_draft(
        &self,
        draft: LineItemDraft,
        now: DateTime<Utc>,
    ) -> Result<(Vec<LineItem>, AddOutcome)> {
        if draft.quantity == Some(0) {
            return Err(StoreError::InvalidQuantity);
        }
        if draft.price < Decimal::ZERO {
            return Err(StoreError::AmountOutOfRange(draft.id));
        }

        let key = draft.variant_key();
        let mut items = self.items.clone();
        let outcome = if let Some(existing) = items.iter_mut().find(|item| item.matches(&key)) {
            existing.quantity = existing
                .quantity
                .saturating_add(draft.effective_quantity());
            AddOutcome::Merged
        } else {
            items.push(draft.into_line_item(now));
            AddOutcome::Inserted
        };
        self.ensure_in_range(&items, &key.id)?;
        Ok((items, outcome))
    }

    fn requantified(&self, id: &ItemId, quantity: i64) -> Result<Option<Vec<LineItem>>> {
        let quantity = u32::try_from(quantity).unwrap_or(u32::MAX);
        if !self
            .items
            .iter()
            .any(|item| &item.id == id && item.quantity != quantity)
        {
            return Ok(None);
        }

        let mut items = self.items.clone();
        for item in items.iter_mut().filter(|item| &item.id == id) {
            item.quantity = quantity;
        }
        self.ensure_in_range(&items, id)?;
        Ok(Some(items))
    }

    fn ensure_in_range(&self, items: &[LineItem], id: &ItemId) -> Result<()> {
        if self.policy.totals(items).is_some() {
            Ok(())
        } else {
            Err(StoreError::AmountOutOfRange(id.clone()))
        }
    }

    fn ensure_tracks_quantity(&self, operation: &'static str) -> Result<()> {
        if self.kind.tracks_quantity() {
            Ok(())
        } else {
            Err(StoreError::Unsupported {
                operation,
                kind: self.kind,
            })
        }
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.last_updated = Some(now);
        self.recompute();
    }

    fn recompute(&mut self) {
        self.count = if self.kind.tracks_quantity() {
            self.items.iter().map(|item| u64::from(item.quantity)).sum()
        } else {
            self.items.len() as u64
        };
        self.totals = self.kind.tracks_quantity().then(|| {
            self.policy.totals(&self.items).unwrap_or_else(|| {
                warn!(kind = %self.kind, "Cart totals out of range; reporting zero");
                Totals::zero()
            })
        });
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn cart() -> CollectionStore {
        CollectionStore::new(CollectionKind::Cart, PricingPolicy::default())
    }

    fn shirt() -> LineItemDraft {
        LineItemDraft::new("A", Decimal::from(100))
            .with_name("Shirt")
            .with_size("M")
            .with_color("Blue")
    }

    fn assert_no_drift(store: &CollectionStore) {
        let expected_count: u64 = if store.kind().tracks_quantity() {
            store.items().iter().map(|i| u64::from(i.quantity)).sum()
        } else {
            store.items().len() as u64
        };
        assert_eq!(store.count(), expected_count);
        if store.kind().tracks_quantity() {
            assert_eq!(store.totals(), store.policy().totals(store.items()));
        } else {
            assert_eq!(store.totals(), None);
        }
    }

    #[test]
    fn test_cart_merges_same_variant() {
        let mut store = cart();
        let now = Utc::now();
        assert_eq!(store.add(shirt().with_quantity(1), now).unwrap(), AddOutcome::Inserted);
        assert_eq!(store.add(shirt().with_quantity(1), now).unwrap(), AddOutcome::Merged);
        assert_eq!(store.items().len(), 1);
        assert_eq!(store.items()[0].quantity, 2);
        assert_eq!(store.count(), 2);
    }

    #[test]
    fn test_cart_keeps_distinct_variants_apart() {
        let mut store = cart();
        let now = Utc::now();
        store.add(shirt(), now).unwrap();
        store.add(shirt().with_color("Red"), now).unwrap();
        assert_eq!(store.items().len(), 2);
        assert_eq!(store.count(), 2);
    }

    #[test]
    fn test_wishlist_duplicate_is_noop() {
        let mut store = CollectionStore::new(CollectionKind::Wishlist, PricingPolicy::default());
        let now = Utc::now();
        store.add(shirt(), now).unwrap();
        let outcome = store.add(shirt().with_color("Red").with_quantity(4), now).unwrap();
        assert_eq!(outcome, AddOutcome::Unchanged);
        assert_eq!(store.items().len(), 1);
        assert_eq!(store.count(), 1);
        assert_eq!(store.totals(), None);
    }

    #[test]
    fn test_zero_quantity_draft_rejected() {
        let mut store = cart();
        let result = store.add(shirt().with_quantity(0), Utc::now());
        assert!(matches!(result, Err(StoreError::InvalidQuantity)));
        assert!(store.is_empty());
    }

    #[test]
    fn test_zero_quantity_ignored_outside_cart() {
        let mut store = CollectionStore::new(CollectionKind::Wishlist, PricingPolicy::default());
        let outcome = store.add(shirt().with_quantity(0), Utc::now()).unwrap();
        assert_eq!(outcome, AddOutcome::Inserted);
        assert_eq!(store.items()[0].quantity, 1);
    }

    #[test]
    fn test_overflowing_add_is_rejected() {
        let mut store = cart();
        store.add(shirt(), Utc::now()).unwrap();
        let huge = LineItemDraft::new("B", Decimal::from_i128_with_scale(10_i128.pow(25), 0))
            .with_quantity(100_000);

        assert!(store.check_add(&huge).is_err());
        let err = store.add(huge, Utc::now()).unwrap_err();

        assert!(matches!(err, StoreError::AmountOutOfRange(id) if id.as_str() == "B"));
        assert_eq!(store.items().len(), 1);
        assert_no_drift(&store);
    }

    #[test]
    fn test_negative_price_is_rejected() {
        let mut store = cart();
        let err = store
            .add(LineItemDraft::new("A", Decimal::NEGATIVE_ONE), Utc::now())
            .unwrap_err();
        assert!(matches!(err, StoreError::AmountOutOfRange(_)));
        assert!(store.is_empty());
    }

    #[test]
    fn test_overflowing_quantity_update_is_rejected() {
        let mut store = cart();
        let price = Decimal::from_i128_with_scale(10_i128.pow(25), 0);
        store.add(LineItemDraft::new("A", price), Utc::now()).unwrap();

        assert!(store.check_update_quantity(&ItemId::new("A"), 100_000).is_err());
        let err = store.update_quantity(&ItemId::new("A"), 100_000).unwrap_err();

        assert!(matches!(err, StoreError::AmountOutOfRange(_)));
        assert_eq!(store.items()[0].quantity, 1);
        assert_no_drift(&store);
    }

    #[test]
    fn test_out_of_range_entries_dropped_on_load() {
        let parsed: LineItem = serde_json::from_str(
            r#"{"id":"big","price":"50000000000000000000000000000","quantity":2,"addedAt":"2026-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        let negative = LineItemDraft::new("neg", Decimal::NEGATIVE_ONE).into_line_item(Utc::now());
        let fine = shirt().into_line_item(Utc::now());

        let store = CollectionStore::with_items(
            CollectionKind::Cart,
            PricingPolicy::default(),
            vec![parsed.clone(), negative, fine.clone()],
        );
        assert_eq!(store.items(), [fine]);
        assert_no_drift(&store);

        let mut replaced = cart();
        replaced.replace_all(vec![parsed.clone()]);
        assert!(replaced.is_empty());
        replaced.upsert(parsed);
        assert!(replaced.is_empty());
        assert_eq!(replaced.totals(), Some(Totals::zero()));
    }

    #[test]
    fn test_update_quantity_non_positive_removes() {
        for quantity in [0, -1] {
            let mut store = cart();
            store.add(shirt(), Utc::now()).unwrap();
            assert!(store.update_quantity(&ItemId::new("A"), quantity).unwrap());
            assert!(store.is_empty());
            assert_eq!(store.totals(), Some(Totals::zero()));
        }
    }

    #[test]
    fn test_update_quantity_sets_value() {
        let mut store = cart();
        store.add(shirt(), Utc::now()).unwrap();
        assert!(store.update_quantity(&ItemId::new("A"), 5).unwrap());
        assert_eq!(store.count(), 5);
        assert!(!store.update_quantity(&ItemId::new("A"), 5).unwrap());
        assert!(!store.update_quantity(&ItemId::new("missing"), 2).unwrap());
    }

    #[test]
    fn test_update_quantity_unsupported_outside_cart() {
        let mut store = CollectionStore::new(CollectionKind::SaveForLater, PricingPolicy::default());
        let err = store.update_quantity(&ItemId::new("A"), 2).unwrap_err();
        assert!(matches!(err, StoreError::Unsupported { .. }));
    }

    #[test]
    fn test_remove_drops_all_variants() {
        let mut store = cart();
        let now = Utc::now();
        store.add(shirt(), now).unwrap();
        store.add(shirt().with_size("L"), now).unwrap();
        store.add(LineItemDraft::new("B", Decimal::ONE), now).unwrap();
        assert_eq!(store.remove(&ItemId::new("A")), 2);
        assert_eq!(store.items().len(), 1);
        assert_eq!(store.remove(&ItemId::new("A")), 0);
    }

    #[test]
    fn test_remove_variant_is_exact() {
        let mut store = cart();
        let now = Utc::now();
        store.add(shirt(), now).unwrap();
        store.add(shirt().with_size("L"), now).unwrap();
        assert!(store.remove_variant(&VariantKey::new("A", Some("L"), Some("Blue"))));
        assert_eq!(store.items().len(), 1);
        assert_eq!(store.items()[0].size.as_deref(), Some("M"));
    }

    #[test]
    fn test_clear_is_idempotent() {
        let mut store = cart();
        store.add(shirt(), Utc::now()).unwrap();
        store.clear();
        let once = (store.items().to_vec(), store.count(), store.totals());
        store.clear();
        assert_eq!((store.items().to_vec(), store.count(), store.totals()), once);
        assert_eq!(store.totals(), Some(Totals::zero()));
    }

    #[test]
    fn test_no_drift_across_mixed_operations() {
        let mut store = cart();
        let now = Utc::now();
        let ops: Vec<Box<dyn Fn(&mut CollectionStore)>> = vec![
            Box::new(move |s| {
                let _ = s.add(shirt().with_quantity(3), now);
            }),
            Box::new(move |s| {
                let _ = s.add(LineItemDraft::new("B", Decimal::new(4999, 2)), now);
            }),
            Box::new(|s| {
                let _ = s.update_quantity(&ItemId::new("B"), 7);
            }),
            Box::new(move |s| {
                let _ = s.add(shirt(), now);
            }),
            Box::new(|s| {
                let _ = s.remove(&ItemId::new("A"));
            }),
            Box::new(|s| {
                let _ = s.update_quantity(&ItemId::new("B"), -3);
            }),
            Box::new(move |s| {
                let _ = s.add(LineItemDraft::new("C", Decimal::from(700)), now);
            }),
        ];
        for op in ops {
            op(&mut store);
            assert_no_drift(&store);
        }
        assert_eq!(store.count(), 1);
    }

    #[test]
    fn test_sort_by_price_and_date() {
        let mut store = cart();
        let early = Utc::now() - chrono::Duration::hours(1);
        let late = Utc::now();
        store.add(LineItemDraft::new("cheap", Decimal::from(5)), late).unwrap();
        store.add(LineItemDraft::new("pricey", Decimal::from(50)), early).unwrap();

        store.sort(SortCriterion::PriceDesc);
        assert_eq!(store.items()[0].id.as_str(), "pricey");
        store.sort(SortCriterion::PriceAsc);
        assert_eq!(store.items()[0].id.as_str(), "cheap");
        store.sort(SortCriterion::DateAsc);
        assert_eq!(store.items()[0].id.as_str(), "pricey");
        store.sort(SortCriterion::DateDesc);
        assert_eq!(store.items()[0].id.as_str(), "cheap");
    }

    #[test]
    fn test_sort_by_name_puts_unnamed_last() {
        let mut store = CollectionStore::new(CollectionKind::Wishlist, PricingPolicy::default());
        let now = Utc::now();
        store.add(LineItemDraft::new("x", Decimal::ONE), now).unwrap();
        store.add(LineItemDraft::new("y", Decimal::ONE).with_name("zebra"), now).unwrap();
        store.add(LineItemDraft::new("z", Decimal::ONE).with_name("Apple"), now).unwrap();
        store.sort(SortCriterion::NameAsc);
        let ids: Vec<_> = store.items().iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, ["z", "y", "x"]);
    }

    #[test]
    fn test_with_items_collapses_duplicates() {
        let now = Utc::now();
        let a = shirt().into_line_item(now);
        let store = CollectionStore::with_items(
            CollectionKind::Cart,
            PricingPolicy::default(),
            vec![a.clone(), a],
        );
        assert_eq!(store.items().len(), 1);
        assert_eq!(store.count(), 2);
    }

    #[test]
    fn test_take_returns_removed_entries() {
        let mut store = CollectionStore::new(CollectionKind::SaveForLater, PricingPolicy::default());
        store.add(shirt(), Utc::now()).unwrap();
        let taken = store.take(&ItemId::new("A"));
        assert_eq!(taken.len(), 1);
        assert!(store.is_empty());
        assert_eq!(store.count(), 0);
    }

    #[test]
    fn test_upsert_replaces_matching_variant() {
        let mut store = cart();
        store.add(shirt(), Utc::now()).unwrap();
        let mut canonical = shirt().into_line_item(Utc::now());
        canonical.quantity = 9;
        store.upsert(canonical);
        assert_eq!(store.items().len(), 1);
        assert_eq!(store.count(), 9);
    }
}
