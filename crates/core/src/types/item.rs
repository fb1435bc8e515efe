//! Line items held by cart, wishlist and save-for-later collections.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::id::ItemId;

/// Identity of an entry within one collection.
///
/// At most one entry per distinct `(id, size, color)` triple exists in a
/// collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VariantKey {
    pub id: ItemId,
    pub size: Option<String>,
    pub color: Option<String>,
}

impl VariantKey {
    /// Build a key from borrowed parts.
    #[must_use]
    pub fn new(id: impl Into<ItemId>, size: Option<&str>, color: Option<&str>) -> Self {
        Self {
            id: id.into(),
            size: size.map(str::to_owned),
            color: color.map(str::to_owned),
        }
    }
}

/// One entry in a collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    /// Stable catalog identity.
    pub id: ItemId,
    /// Display name, used for name sorting and search.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Unit count. Always at least 1; non-cart collections keep it at 1.
    #[serde(default = "default_quantity")]
    pub quantity: u32,
    /// Size variant discriminator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    /// Color variant discriminator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    /// Unit price.
    pub price: Decimal,
    /// When the entry was added (save-for-later payloads call this `savedAt`).
    #[serde(alias = "savedAt")]
    pub added_at: DateTime<Utc>,
    /// Free-text note (save-for-later).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    /// Image URL for display.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

const fn default_quantity() -> u32 {
    1
}

impl LineItem {
    /// The identity triple of this entry.
    #[must_use]
    pub fn variant_key(&self) -> VariantKey {
        VariantKey {
            id: self.id.clone(),
            size: self.size.clone(),
            color: self.color.clone(),
        }
    }

    /// Whether this entry has the given identity triple.
    #[must_use]
    pub fn matches(&self, key: &VariantKey) -> bool {
        self.id == key.id && self.size == key.size && self.color == key.color
    }

    /// `price × quantity`, unrounded. `None` if the product does not fit in
    /// a `Decimal`.
    #[must_use]
    pub fn line_total(&self) -> Option<Decimal> {
        self.price.checked_mul(Decimal::from(self.quantity))
    }

    /// Convert back into a draft, keeping quantity and variant.
    #[must_use]
    pub fn to_draft(&self) -> LineItemDraft {
        LineItemDraft {
            id: self.id.clone(),
            name: self.name.clone(),
            quantity: Some(self.quantity),
            size: self.size.clone(),
            color: self.color.clone(),
            price: self.price,
            note: self.note.clone(),
            image: self.image.clone(),
        }
    }
}

/// A candidate entry for `add`.
///
/// This is also the request body sent to the backend's `add` endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItemDraft {
    pub id: ItemId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Units to add. Defaults to 1 when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    pub price: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl LineItemDraft {
    /// Start a draft for an item at the given unit price.
    #[must_use]
    pub fn new(id: impl Into<ItemId>, price: Decimal) -> Self {
        Self {
            id: id.into(),
            name: None,
            quantity: None,
            size: None,
            color: None,
            price,
            note: None,
            image: None,
        }
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub const fn with_quantity(mut self, quantity: u32) -> Self {
        self.quantity = Some(quantity);
        self
    }

    #[must_use]
    pub fn with_size(mut self, size: impl Into<String>) -> Self {
        self.size = Some(size.into());
        self
    }

    #[must_use]
    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }

    #[must_use]
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    /// Effective quantity (1 when unspecified).
    #[must_use]
    pub fn effective_quantity(&self) -> u32 {
        self.quantity.unwrap_or(1)
    }

    /// The identity triple this draft would occupy.
    #[must_use]
    pub fn variant_key(&self) -> VariantKey {
        VariantKey {
            id: self.id.clone(),
            size: self.size.clone(),
            color: self.color.clone(),
        }
    }

    /// Materialize the stored entry, stamping `added_at`.
    #[must_use]
    pub fn into_line_item(self, now: DateTime<Utc>) -> LineItem {
        let quantity = self.effective_quantity();
        LineItem {
            id: self.id,
            name: self.name,
            quantity,
            size: self.size,
            color: self.color,
            price: self.price,
            added_at: now,
            note: self.note,
            image: self.image,
        }
    }
}
