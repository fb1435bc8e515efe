//! Yoraa collection store.
//!
//! Carts, wishlists and save-for-later lists that work both signed out and
//! signed in. Signed out, a collection lives in memory and is mirrored to a
//! persistent key-value store. Signed in, the backend is the source of truth
//! and every response is folded back into memory.
//!
//! # Modules
//!
//! - [`collection`] - In-memory reducer with derived count and cart totals
//! - [`mirror`] - Persistent key-value mirror for signed-out sessions
//! - [`remote`] - REST client for the collections backend
//! - [`sync`] - Per-operation local/remote dispatch and request state
//! - [`selectors`] - Read-only queries for views
//! - [`monitor`] - Bounded error log with categorization and listeners
//! - [`config`] - Environment configuration

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod collection;
pub mod config;
pub mod error;
pub mod mirror;
pub mod monitor;
pub mod remote;
pub mod selectors;
pub mod sync;

pub use collection::{
    AddOutcome, CollectionStore, ParseSortError, PricingPolicy, SortCriterion, Totals,
};
pub use config::{ConfigError, StoreConfig};
pub use error::{Result, StoreError};
pub use mirror::{FileKv, KeyValueStore, MemoryKv, Mirror};
pub use monitor::{ErrorCategory, ErrorMonitor, ErrorRecord};
pub use remote::RemoteClient;
pub use sync::{CollectionService, Collections, Mode, RequestState, ServiceDeps, Session};
