//! Read-only queries over a collection.
//!
//! Everything here takes `&CollectionStore` and allocates at most the
//! returned value. Views call these instead of reaching into the store.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use yoraa_core::{CollectionKind, ItemId, LineItem, VariantKey};

use crate::collection::{CollectionStore, Totals};

#[must_use]
pub const fn count(store: &CollectionStore) -> u64 {
    store.count()
}

/// Cart totals; `None` for wishlist and save-for-later.
#[must_use]
pub const fn totals(store: &CollectionStore) -> Option<Totals> {
    store.totals()
}

#[must_use]
pub fn is_empty(store: &CollectionStore) -> bool {
    store.is_empty()
}

/// Whether any variant of `id` is present.
#[must_use]
pub fn contains(store: &CollectionStore, id: &ItemId) -> bool {
    store.items().iter().any(|item| &item.id == id)
}

#[must_use]
pub fn contains_variant(store: &CollectionStore, key: &VariantKey) -> bool {
    store.items().iter().any(|item| item.matches(key))
}

/// First entry with `id`, in collection order.
#[must_use]
pub fn find<'a>(store: &'a CollectionStore, id: &ItemId) -> Option<&'a LineItem> {
    store.items().iter().find(|item| &item.id == id)
}

/// Units of `id` across all its variants.
#[must_use]
pub fn quantity_of(store: &CollectionStore, id: &ItemId) -> u64 {
    store
        .items()
        .iter()
        .filter(|item| &item.id == id)
        .map(|item| u64::from(item.quantity))
        .sum()
}

#[must_use]
pub fn filter_by_size<'a>(store: &'a CollectionStore, size: &str) -> Vec<&'a LineItem> {
    store
        .items()
        .iter()
        .filter(|item| {
            item.size
                .as_deref()
                .is_some_and(|s| s.eq_ignore_ascii_case(size))
        })
        .collect()
}

#[must_use]
pub fn filter_by_color<'a>(store: &'a CollectionStore, color: &str) -> Vec<&'a LineItem> {
    store
        .items()
        .iter()
        .filter(|item| {
            item.color
                .as_deref()
                .is_some_and(|c| c.eq_ignore_ascii_case(color))
        })
        .collect()
}

/// Entries whose name contains `query`, ignoring case. Unnamed entries
/// never match; an empty query matches every named entry.
#[must_use]
pub fn search<'a>(store: &'a CollectionStore, query: &str) -> Vec<&'a LineItem> {
    let needle = query.to_lowercase();
    store
        .items()
        .iter()
        .filter(|item| {
            item.name
                .as_deref()
                .is_some_and(|name| name.to_lowercase().contains(&needle))
        })
        .collect()
}

/// Entries with a unit price in `min..=max`.
#[must_use]
pub fn price_range(store: &CollectionStore, min: Decimal, max: Decimal) -> Vec<&LineItem> {
    store
        .items()
        .iter()
        .filter(|item| item.price >= min && item.price <= max)
        .collect()
}

/// Serializable snapshot of a collection.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub kind: CollectionKind,
    pub items: Vec<LineItem>,
    pub count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub totals: Option<Totals>,
    pub is_local: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
}

#[must_use]
pub fn summary(store: &CollectionStore) -> Summary {
    Summary {
        kind: store.kind(),
        items: store.items().to_vec(),
        count: store.count(),
        totals: store.totals(),
        is_local: store.is_local(),
        last_updated: store.last_updated(),
    }
}
