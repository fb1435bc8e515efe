//! Yoraa Core - Shared types library.
//!
//! This crate provides common types used across all Yoraa collection components:
//! - `store` - Cart, wishlist and save-for-later collection stores
//! - `cli` - Command-line front end for inspecting and editing collections
//!
//! # Architecture
//!
//! The core crate contains only types and pure helpers - no I/O, no storage
//! access, no HTTP clients. This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype IDs, money rounding, collection kinds and line items

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
