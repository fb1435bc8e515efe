//! Core types for Yoraa collections.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod id;
pub mod item;
pub mod kind;
pub mod price;

pub use id::*;
pub use item::{LineItem, LineItemDraft, VariantKey};
pub use kind::{CollectionKind, ParseKindError};
pub use price::{format_money, round_cents};
