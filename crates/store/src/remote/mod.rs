//! REST client for the collections backend.
//!
//! Every collection kind exposes the same endpoint family under
//! `/api/<segment>`:
//!
//! | Method   | Path                               | Data returned          |
//! |----------|------------------------------------|------------------------|
//! | `GET`    | `/api/<f>`                         | collection             |
//! | `POST`   | `/api/<f>/add`                     | item or collection     |
//! | `PATCH`  | `/api/<f>/update/:itemId`          | item or collection     |
//! | `DELETE` | `/api/<f>/remove/:itemId`          | collection or nothing  |
//! | `DELETE` | `/api/<f>/clear`                   | nothing                |
//! | `POST`   | `/api/<f>/move-to-cart`            | destination item       |
//! | `POST`   | `/api/<f>/move-to-wishlist`        | destination item       |
//!
//! The client performs one request per call. It does not retry, batch or
//! deduplicate.

mod envelope;

pub use envelope::{Envelope, Payload, normalize};

use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tracing::{debug, error, instrument};
use url::Url;
use yoraa_core::{CollectionKind, ItemId, LineItemDraft, VariantKey};

use crate::error::{Result, StoreError};

/// HTTP client for one backend.
///
/// Holds no credentials; call [`RemoteClient::authorize`] with the session
/// token to issue requests.
#[derive(Debug, Clone)]
pub struct RemoteClient {
    client: Client,
    base_url: Url,
}

/// A [`RemoteClient`] bound to one session's bearer token.
#[derive(Clone, Copy)]
pub struct AuthorizedClient<'a> {
    remote: &'a RemoteClient,
    token: &'a SecretString,
}

impl std::fmt::Debug for AuthorizedClient<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizedClient")
            .field("base_url", &self.remote.base_url.as_str())
            .field("token", &"[REDACTED]")
            .finish()
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QuantityBody {
    quantity: u32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MoveBody<'a> {
    item_id: &'a ItemId,
}

impl RemoteClient {
    /// Create a client for `base_url` with a per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(base_url: Url, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base_url })
    }

    /// Bind the client to a bearer token.
    #[must_use]
    pub const fn authorize<'a>(&'a self, token: &'a SecretString) -> AuthorizedClient<'a> {
        AuthorizedClient {
            remote: self,
            token,
        }
    }
}

impl AuthorizedClient<'_> {
    /// Fetch the authenticated user's collection.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, non-2xx status, rejected
    /// envelope or unexpected payload.
    #[instrument(skip(self), fields(kind = %kind))]
    pub async fn fetch(&self, kind: CollectionKind) -> Result<Payload> {
        let path = endpoint(kind, "");
        self.send(Method::GET, &path, |req| req).await
    }

    /// Add or upsert an item.
    ///
    /// # Errors
    ///
    /// See [`AuthorizedClient::fetch`].
    #[instrument(skip(self, draft), fields(kind = %kind, item_id = %draft.id))]
    pub async fn add(&self, kind: CollectionKind, draft: &LineItemDraft) -> Result<Payload> {
        let path = endpoint(kind, "/add");
        self.send(Method::POST, &path, |req| req.json(draft)).await
    }

    /// Set an item's quantity.
    ///
    /// # Errors
    ///
    /// See [`AuthorizedClient::fetch`].
    #[instrument(skip(self), fields(kind = %kind, item_id = %id))]
    pub async fn update_quantity(
        &self,
        kind: CollectionKind,
        id: &ItemId,
        quantity: u32,
    ) -> Result<Payload> {
        let path = endpoint(kind, &format!("/update/{}", encode_segment(id.as_str())));
        self.send(Method::PATCH, &path, |req| req.json(&QuantityBody { quantity }))
            .await
    }

    /// Remove every variant of an item.
    ///
    /// # Errors
    ///
    /// See [`AuthorizedClient::fetch`].
    #[instrument(skip(self), fields(kind = %kind, item_id = %id))]
    pub async fn remove(&self, kind: CollectionKind, id: &ItemId) -> Result<Payload> {
        let path = endpoint(kind, &format!("/remove/{}", encode_segment(id.as_str())));
        self.send(Method::DELETE, &path, |req| req).await
    }

    /// Remove one variant of an item.
    ///
    /// # Errors
    ///
    /// See [`AuthorizedClient::fetch`].
    #[instrument(skip(self, key), fields(kind = %kind, item_id = %key.id))]
    pub async fn remove_variant(&self, kind: CollectionKind, key: &VariantKey) -> Result<Payload> {
        let path = endpoint(kind, &format!("/remove/{}", encode_segment(key.id.as_str())));
        let mut query: Vec<(&str, &str)> = Vec::new();
        if let Some(size) = key.size.as_deref() {
            query.push(("size", size));
        }
        if let Some(color) = key.color.as_deref() {
            query.push(("color", color));
        }
        self.send(Method::DELETE, &path, |req| req.query(&query)).await
    }

    /// Clear the collection.
    ///
    /// # Errors
    ///
    /// See [`AuthorizedClient::fetch`].
    #[instrument(skip(self), fields(kind = %kind))]
    pub async fn clear(&self, kind: CollectionKind) -> Result<Payload> {
        let path = endpoint(kind, "/clear");
        self.send(Method::DELETE, &path, |req| req).await
    }

    /// Ask the backend to copy an item from `source` into `destination`.
    ///
    /// This is phase one of a move; the caller removes the source entry.
    ///
    /// # Errors
    ///
    /// See [`AuthorizedClient::fetch`].
    #[instrument(skip(self), fields(source = %source, destination = %destination, item_id = %id))]
    pub async fn move_item(
        &self,
        source: CollectionKind,
        destination: CollectionKind,
        id: &ItemId,
    ) -> Result<Payload> {
        let path = endpoint(source, &format!("/move-to-{}", destination.api_segment()));
        self.send(Method::POST, &path, |req| req.json(&MoveBody { item_id: id }))
            .await
    }

    /// Send one request and normalize its envelope.
    async fn send(
        &self,
        method: Method,
        path: &str,
        build: impl FnOnce(RequestBuilder) -> RequestBuilder,
    ) -> Result<Payload> {
        let url = self.remote.base_url.join(path)?;

        let request = self
            .remote
            .client
            .request(method.clone(), url)
            .bearer_auth(self.token.expose_secret());
        let response = build(request).send().await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<Envelope>(&body)
                .ok()
                .and_then(|env| env.message)
                .unwrap_or_else(|| body.chars().take(200).collect());
            error!(
                %method,
                path,
                status = %status,
                body = %body.chars().take(500).collect::<String>(),
                "Collections API returned non-success status"
            );
            return Err(StoreError::Api { status, message });
        }

        let envelope: Envelope = if body.trim().is_empty() {
            Envelope {
                success: true,
                data: None,
                message: None,
            }
        } else {
            serde_json::from_str(&body).map_err(|e| {
                error!(
                    error = %e,
                    body = %body.chars().take(500).collect::<String>(),
                    "Failed to parse collections API response"
                );
                StoreError::UnexpectedPayload {
                    endpoint: path.to_string(),
                    reason: e.to_string(),
                }
            })?
        };

        debug!(%method, path, "Collections API request succeeded");
        normalize(path, envelope)
    }
}

/// Build an endpoint path relative to the base URL.
///
/// Paths are relative (no leading slash) so a base URL with a path prefix,
/// such as `https://host/v2/`, is preserved by `Url::join`.
fn endpoint(kind: CollectionKind, suffix: &str) -> String {
    format!("api/{}{suffix}", kind.api_segment())
}

/// Percent-encode a path segment.
fn encode_segment(segment: &str) -> String {
    url::form_urlencoded::byte_serialize(segment.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}
