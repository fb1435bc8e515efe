//! Collection kinds.
//!
//! Cart, wishlist and save-for-later share one store implementation; the
//! kind decides quantity semantics, the persisted key and the API path.

use core::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Which collection a store holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CollectionKind {
    Cart,
    Wishlist,
    SaveForLater,
}

impl CollectionKind {
    /// All kinds, in display order.
    pub const ALL: [Self; 3] = [Self::Cart, Self::Wishlist, Self::SaveForLater];

    /// Key used in the persistent key-value mirror.
    #[must_use]
    pub const fn storage_key(self) -> &'static str {
        match self {
            Self::Cart => "cartData",
            Self::Wishlist => "wishlistData",
            Self::SaveForLater => "saveForLaterData",
        }
    }

    /// Path segment used by the backend (`/api/<segment>`).
    #[must_use]
    pub const fn api_segment(self) -> &'static str {
        match self {
            Self::Cart => "cart",
            Self::Wishlist => "wishlist",
            Self::SaveForLater => "save-for-later",
        }
    }

    /// Whether entries carry a meaningful quantity.
    ///
    /// Only the cart counts units; wishlist and save-for-later entries are
    /// membership-only and always hold a quantity of one.
    #[must_use]
    pub const fn tracks_quantity(self) -> bool {
        matches!(self, Self::Cart)
    }

    /// Whether items may be moved into this kind.
    #[must_use]
    pub const fn accepts_moves(self) -> bool {
        matches!(self, Self::Cart | Self::Wishlist)
    }
}

impl fmt::Display for CollectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.api_segment())
    }
}

/// Error returned when parsing an unknown collection kind.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown collection kind: {0} (expected cart, wishlist or save-for-later)")]
pub struct ParseKindError(String);

impl FromStr for CollectionKind {
    type Err = ParseKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cart" => Ok(Self::Cart),
            "wishlist" => Ok(Self::Wishlist),
            "save-for-later" | "saveforlater" | "save_for_later" => Ok(Self::SaveForLater),
            _ => Err(ParseKindError(s.to_owned())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_keys_are_distinct() {
        assert_eq!(CollectionKind::Cart.storage_key(), "cartData");
        assert_eq!(CollectionKind::Wishlist.storage_key(), "wishlistData");
        assert_eq!(CollectionKind::SaveForLater.storage_key(), "saveForLaterData");
    }

    #[test]
    fn test_parse_round_trips_display() {
        for kind in CollectionKind::ALL {
            assert_eq!(kind.to_string().parse::<CollectionKind>().ok(), Some(kind));
        }
        assert_eq!(
            "SaveForLater".parse::<CollectionKind>().ok(),
            Some(CollectionKind::SaveForLater)
        );
        assert!("basket".parse::<CollectionKind>().is_err());
    }

    #[test]
    fn test_only_cart_tracks_quantity() {
        assert!(CollectionKind::Cart.tracks_quantity());
        assert!(!CollectionKind::Wishlist.tracks_quantity());
        assert!(!CollectionKind::SaveForLater.tracks_quantity());
    }

    #[test]
    fn test_move_destinations() {
        assert!(CollectionKind::Cart.accepts_moves());
        assert!(CollectionKind::Wishlist.accepts_moves());
        assert!(!CollectionKind::SaveForLater.accepts_moves());
    }
}
