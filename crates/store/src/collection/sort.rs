//! Display orderings for collections.

use std::cmp::Ordering;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use yoraa_core::LineItem;

/// How to reorder a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SortCriterion {
    /// Alphabetical by name, unnamed entries last.
    NameAsc,
    PriceAsc,
    PriceDesc,
    /// Oldest first.
    DateAsc,
    /// Newest first.
    DateDesc,
}

impl SortCriterion {
    /// Compare two entries under this criterion.
    #[must_use]
    pub fn compare(self, a: &LineItem, b: &LineItem) -> Ordering {
        match self {
            Self::NameAsc => compare_names(a.name.as_deref(), b.name.as_deref()),
            Self::PriceAsc => a.price.cmp(&b.price),
            Self::PriceDesc => b.price.cmp(&a.price),
            Self::DateAsc => a.added_at.cmp(&b.added_at),
            Self::DateDesc => b.added_at.cmp(&a.added_at),
        }
    }
}

fn compare_names(a: Option<&str>, b: Option<&str>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.to_lowercase().cmp(&b.to_lowercase()),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Error returned when parsing an unknown sort criterion.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown sort '{0}' (expected name, price-asc, price-desc, date-asc, date-desc)")]
pub struct ParseSortError(String);

impl FromStr for SortCriterion {
    type Err = ParseSortError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "name" | "name-asc" => Ok(Self::NameAsc),
            "price" | "price-asc" => Ok(Self::PriceAsc),
            "price-desc" => Ok(Self::PriceDesc),
            "date" | "date-asc" | "oldest" => Ok(Self::DateAsc),
            "date-desc" | "newest" => Ok(Self::DateDesc),
            other => Err(ParseSortError(other.to_owned())),
        }
    }
}
