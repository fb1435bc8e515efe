//! Store-level error type.
//!
//! Remote failures are surfaced to callers unchanged; the store state is
//! never modified by an operation that returns one of these.

use reqwest::StatusCode;
use thiserror::Error;
use yoraa_core::{CollectionKind, ItemId};

/// Errors produced by collection operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// HTTP transport failed (connect, timeout, body read).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Backend answered with a non-success status.
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status returned by the backend.
        status: StatusCode,
        /// Message from the response envelope, or a body excerpt.
        message: String,
    },

    /// Backend answered 2xx but the envelope reported `success: false`.
    #[error("Request rejected: {0}")]
    Rejected(String),

    /// Envelope `data` did not match any accepted payload shape.
    #[error("Unexpected payload from {endpoint}: {reason}")]
    UnexpectedPayload {
        /// Endpoint path that produced the payload.
        endpoint: String,
        /// Why the payload was rejected.
        reason: String,
    },

    /// JSON serialization or parsing failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Persistent key-value storage failed.
    #[error("Storage error: {0}")]
    Storage(#[from] std::io::Error),

    /// Base URL could not be joined with an endpoint path.
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// A draft was submitted with a quantity of zero.
    #[error("Quantity must be at least 1")]
    InvalidQuantity,

    /// A cart amount is negative or its totals do not fit in a `Decimal`.
    #[error("Amount for item {0} is out of range")]
    AmountOutOfRange(ItemId),

    /// The operation is not available for this collection kind.
    #[error("{operation} is not supported for {kind}")]
    Unsupported {
        /// Operation name.
        operation: &'static str,
        /// Collection the operation was attempted on.
        kind: CollectionKind,
    },

    /// A move referenced an item not present in the source collection.
    #[error("Item {0} not found")]
    ItemNotFound(ItemId),

    /// Phase two of a move failed and the destination add was undone.
    #[error("Move of {item} to {destination} rolled back: {reason}")]
    MoveRolledBack {
        /// Item being moved.
        item: ItemId,
        /// Destination collection.
        destination: CollectionKind,
        /// Error from the failed removal.
        reason: String,
    },

    /// Phase two of a move failed and compensation failed too; the item now
    /// exists in both collections on the backend.
    #[error("Move of {item} to {destination} left item in both collections: {reason}")]
    MoveInconsistent {
        /// Item being moved.
        item: ItemId,
        /// Destination collection.
        destination: CollectionKind,
        /// Errors from the removal and the compensation.
        reason: String,
    },
}

impl StoreError {
    /// HTTP status associated with this error, if any.
    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::Http(err) => err.status(),
            _ => None,
        }
    }
}

/// Result type alias for `StoreError`.
pub type Result<T> = std::result::Result<T, StoreError>;
