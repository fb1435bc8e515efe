//! Response envelope and payload normalization.
//!
//! The backend wraps every response as `{success, data, message}`. The shape
//! of `data` varies by endpoint: a bare array, an object with an `items`
//! array, or a single item. [`Payload`] names those shapes explicitly and
//! [`normalize`] is the only place that interprets them. Anything else is an
//! error rather than an empty collection.

use serde::Deserialize;
use serde_json::Value;
use yoraa_core::LineItem;

use crate::error::{Result, StoreError};

/// Response envelope returned by every endpoint.
#[derive(Debug, Deserialize)]
pub struct Envelope {
    pub success: bool,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Accepted shapes of envelope `data`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// A collection, from either `[...]` or `{ "items": [...] }`.
    Collection(Vec<LineItem>),
    /// One canonical item.
    Item(LineItem),
    /// No data (e.g. after clear or remove).
    Empty,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawPayload {
    List(Vec<LineItem>),
    Wrapped { items: Vec<LineItem> },
    Item(LineItem),
}

/// Turn an envelope into a typed payload.
///
/// # Errors
///
/// - `Rejected` when `success` is false.
/// - `UnexpectedPayload` when `data` matches none of the accepted shapes.
pub fn normalize(endpoint: &str, envelope: Envelope) -> Result<Payload> {
    if !envelope.success {
        return Err(StoreError::Rejected(
            envelope
                .message
                .unwrap_or_else(|| "Request was not successful".to_string()),
        ));
    }

    let Some(data) = envelope.data else {
        return Ok(Payload::Empty);
    };
    if data.is_null() {
        return Ok(Payload::Empty);
    }

    match serde_json::from_value::<RawPayload>(data) {
        Ok(RawPayload::List(items) | RawPayload::Wrapped { items }) => {
            Ok(Payload::Collection(items))
        }
        Ok(RawPayload::Item(item)) => Ok(Payload::Item(item)),
        Err(e) => Err(StoreError::UnexpectedPayload {
            endpoint: endpoint.to_string(),
            reason: e.to_string(),
        }),
    }
}

impl Payload {
    /// Require a collection payload.
    ///
    /// # Errors
    ///
    /// Returns `UnexpectedPayload` for a single item or empty data.
    pub fn into_collection(self, endpoint: &str) -> Result<Vec<LineItem>> {
        match self {
            Self::Collection(items) => Ok(items),
            other => Err(StoreError::UnexpectedPayload {
                endpoint: endpoint.to_string(),
                reason: format!("expected a collection, got {}", other.describe()),
            }),
        }
    }

    const fn describe(&self) -> &'static str {
        match self {
            Self::Collection(_) => "a collection",
            Self::Item(_) => "a single item",
            Self::Empty => "no data",
        }
    }
}
