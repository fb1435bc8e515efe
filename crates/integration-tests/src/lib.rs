//! Integration tests for the Yoraa collection store.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p yoraa-integration-tests
//! ```
//!
//! Each test starts a [`FakeBackend`]: an axum server on an ephemeral
//! localhost port that implements the collections REST API in memory, with
//! bearer-token checks, a request log and one-shot failure injection.
//!
//! # Test Categories
//!
//! - `remote_sync` - Signed-in operations against the backend
//! - `local_mode` - Signed-out operations and the mirror
//! - `move_items` - Two-phase moves and compensation

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use axum::extract::{Path, Query, Request, State};
use axum::http::{Method, StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, patch, post};
use axum::{Json, Router};
use chrono::Utc;
use secrecy::SecretString;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::task::JoinHandle;
use url::Url;
use yoraa_core::{CollectionKind, ItemId, LineItem, LineItemDraft, VariantKey};
use yoraa_store::{
    CollectionStore, ErrorMonitor, KeyValueStore, MemoryKv, PricingPolicy, RemoteClient,
    ServiceDeps, Session,
};

/// Bearer token the fake backend accepts.
pub const TEST_TOKEN: &str = "tok_it_9fK2mQ7xLp3Zr8Vw";

/// A response the backend should give instead of handling a request.
#[derive(Debug, Clone)]
pub enum Failure {
    /// Non-2xx status with an error envelope.
    Status(StatusCode),
    /// 200 with `success: false`.
    Rejected(String),
    /// 200 with a body that is not JSON.
    Malformed,
    /// Wait this long, then handle the request normally.
    Stall(Duration),
    /// 200 with this exact JSON body.
    Respond(Value),
}

/// One request as seen by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recorded {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
}

struct Rule {
    method: Method,
    path: String,
    failure: Failure,
}

#[derive(Default)]
struct Shared {
    collections: Mutex<HashMap<CollectionKind, CollectionStore>>,
    requests: Mutex<Vec<Recorded>>,
    rules: Mutex<Vec<Rule>>,
    wrap_lists: Mutex<bool>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Shared {
    fn with_store<R>(&self, kind: CollectionKind, f: impl FnOnce(&mut CollectionStore) -> R) -> R {
        let mut collections = lock(&self.collections);
        let store = collections
            .entry(kind)
            .or_insert_with(|| CollectionStore::new(kind, PricingPolicy::default()));
        f(store)
    }

    fn take_failure(&self, method: &Method, path: &str) -> Option<Failure> {
        let mut rules = lock(&self.rules);
        let index = rules
            .iter()
            .position(|rule| &rule.method == method && rule.path == path)?;
        Some(rules.remove(index).failure)
    }
}

/// In-memory collections backend on a random local port.
pub struct FakeBackend {
    base_url: Url,
    shared: Arc<Shared>,
    server: JoinHandle<()>,
}

impl FakeBackend {
    /// Bind to `127.0.0.1:0` and start serving.
    ///
    /// # Panics
    ///
    /// Panics if the listener cannot be bound.
    pub async fn start() -> Self {
        let shared = Arc::new(Shared::default());

        let app = Router::new()
            .route("/api/{kind}", get(list))
            .route("/api/{kind}/add", post(add))
            .route("/api/{kind}/update/{id}", patch(update))
            .route("/api/{kind}/remove/{id}", delete(remove))
            .route("/api/{kind}/clear", delete(clear))
            .route("/api/{kind}/move-to-cart", post(move_to_cart))
            .route("/api/{kind}/move-to-wishlist", post(move_to_wishlist))
            .layer(middleware::from_fn_with_state(Arc::clone(&shared), gate))
            .with_state(Arc::clone(&shared));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind fake backend");
        let addr: SocketAddr = listener.local_addr().expect("fake backend address");
        let server = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        let base_url = Url::parse(&format!("http://{addr}/")).expect("fake backend url");
        Self {
            base_url,
            shared,
            server,
        }
    }

    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// A client pointed at this backend.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client cannot be built.
    #[must_use]
    pub fn client(&self) -> RemoteClient {
        RemoteClient::new(self.base_url.clone(), Duration::from_secs(5)).expect("remote client")
    }

    /// Service dependencies for a signed-in session against this backend.
    #[must_use]
    pub fn signed_in(&self, storage: Arc<MemoryKv>) -> ServiceDeps {
        self.deps(storage, Session::authenticated(SecretString::from(TEST_TOKEN)))
    }

    /// Service dependencies for a signed-out session that still knows the
    /// backend address.
    #[must_use]
    pub fn signed_out(&self, storage: Arc<MemoryKv>) -> ServiceDeps {
        self.deps(storage, Session::anonymous())
    }

    fn deps(&self, storage: Arc<MemoryKv>, session: Session) -> ServiceDeps {
        let storage: Arc<dyn KeyValueStore> = storage;
        ServiceDeps {
            storage,
            remote: Some(self.client()),
            session,
            policy: PricingPolicy::default(),
            monitor: Arc::new(ErrorMonitor::default()),
        }
    }

    /// Put items into a backend collection directly.
    pub fn seed(&self, kind: CollectionKind, drafts: Vec<LineItemDraft>) {
        self.shared.with_store(kind, |store| {
            for draft in drafts {
                let _ = store.add(draft, Utc::now());
            }
        });
    }

    /// Current contents of a backend collection.
    #[must_use]
    pub fn items(&self, kind: CollectionKind) -> Vec<LineItem> {
        self.shared.with_store(kind, |store| store.items().to_vec())
    }

    /// Every request received so far, in order.
    #[must_use]
    pub fn requests(&self) -> Vec<Recorded> {
        lock(&self.shared.requests).clone()
    }

    #[must_use]
    pub fn request_count(&self) -> usize {
        lock(&self.shared.requests).len()
    }

    /// Fail the next request matching `method` and `path` (no query).
    pub fn fail_once(&self, method: Method, path: &str, failure: Failure) {
        lock(&self.shared.rules).push(Rule {
            method,
            path: path.to_string(),
            failure,
        });
    }

    /// Return lists as `{"items": [...]}` instead of a bare array.
    pub fn wrap_lists(&self, wrap: bool) {
        *lock(&self.shared.wrap_lists) = wrap;
    }
}

impl Drop for FakeBackend {
    fn drop(&mut self) {
        self.server.abort();
    }
}

// =============================================================================
// Handlers
// =============================================================================

type AppState = State<Arc<Shared>>;

async fn gate(State(shared): AppState, request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    lock(&shared.requests).push(Recorded {
        method: method.clone(),
        path: path.clone(),
        query: request.uri().query().map(str::to_string),
    });

    let expected = format!("Bearer {TEST_TOKEN}");
    let authorized = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == expected);
    if !authorized {
        return failure(StatusCode::UNAUTHORIZED, "Unauthorized");
    }

    match shared.take_failure(&method, &path) {
        Some(Failure::Status(status)) => failure(status, "Injected failure"),
        Some(Failure::Rejected(message)) => Json(json!({ "success": false, "message": message }))
            .into_response(),
        Some(Failure::Malformed) => (StatusCode::OK, "<html>oops</html>").into_response(),
        Some(Failure::Respond(body)) => Json(body).into_response(),
        Some(Failure::Stall(delay)) => {
            tokio::time::sleep(delay).await;
            next.run(request).await
        }
        None => next.run(request).await,
    }
}

fn failure(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "success": false, "message": message }))).into_response()
}

fn data(value: Value) -> Response {
    Json(json!({ "success": true, "data": value })).into_response()
}

fn parse_kind(segment: &str) -> Result<CollectionKind, Response> {
    segment
        .parse()
        .map_err(|_| failure(StatusCode::NOT_FOUND, "Unknown collection"))
}

fn collection_data(shared: &Shared, kind: CollectionKind) -> Response {
    let items = shared.with_store(kind, |store| store.items().to_vec());
    let items = json!(items);
    if *lock(&shared.wrap_lists) {
        data(json!({ "items": items }))
    } else {
        data(items)
    }
}

async fn list(State(shared): AppState, Path(segment): Path<String>) -> Response {
    match parse_kind(&segment) {
        Ok(kind) => collection_data(&shared, kind),
        Err(response) => response,
    }
}

async fn add(
    State(shared): AppState,
    Path(segment): Path<String>,
    Json(draft): Json<LineItemDraft>,
) -> Response {
    let kind = match parse_kind(&segment) {
        Ok(kind) => kind,
        Err(response) => return response,
    };

    let key = draft.variant_key();
    let stored = shared.with_store(kind, |store| {
        store.add(draft, Utc::now()).map(|_| {
            store
                .items()
                .iter()
                .find(|item| {
                    if kind.tracks_quantity() {
                        item.matches(&key)
                    } else {
                        item.id == key.id
                    }
                })
                .cloned()
        })
    });

    match stored {
        Ok(Some(item)) => data(json!(item)),
        Ok(None) => failure(StatusCode::INTERNAL_SERVER_ERROR, "Item vanished"),
        Err(e) => failure(StatusCode::BAD_REQUEST, &e.to_string()),
    }
}

#[derive(Deserialize)]
struct QuantityBody {
    quantity: i64,
}

async fn update(
    State(shared): AppState,
    Path((segment, id)): Path<(String, String)>,
    Json(body): Json<QuantityBody>,
) -> Response {
    let kind = match parse_kind(&segment) {
        Ok(kind) => kind,
        Err(response) => return response,
    };

    let result = shared.with_store(kind, |store| {
        store.update_quantity(&ItemId::new(id), body.quantity)
    });
    match result {
        Ok(_) => collection_data(&shared, kind),
        Err(e) => failure(StatusCode::BAD_REQUEST, &e.to_string()),
    }
}

#[derive(Deserialize)]
struct VariantQuery {
    size: Option<String>,
    color: Option<String>,
}

async fn remove(
    State(shared): AppState,
    Path((segment, id)): Path<(String, String)>,
    Query(variant): Query<VariantQuery>,
) -> Response {
    let kind = match parse_kind(&segment) {
        Ok(kind) => kind,
        Err(response) => return response,
    };

    shared.with_store(kind, |store| {
        if variant.size.is_some() || variant.color.is_some() {
            let key = VariantKey::new(id, variant.size.as_deref(), variant.color.as_deref());
            store.remove_variant(&key);
        } else {
            store.remove(&ItemId::new(id));
        }
    });
    collection_data(&shared, kind)
}

async fn clear(State(shared): AppState, Path(segment): Path<String>) -> Response {
    let kind = match parse_kind(&segment) {
        Ok(kind) => kind,
        Err(response) => return response,
    };

    shared.with_store(kind, CollectionStore::clear);
    Json(json!({ "success": true })).into_response()
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MoveBody {
    item_id: ItemId,
}

/// Copy an item into `destination`. The source entry stays until the
/// client removes it.
fn copy_item(shared: &Shared, segment: &str, destination: CollectionKind, id: &ItemId) -> Response {
    let source = match parse_kind(segment) {
        Ok(kind) => kind,
        Err(response) => return response,
    };

    let entries: Vec<LineItem> = shared.with_store(source, |store| {
        store
            .items()
            .iter()
            .filter(|item| &item.id == id)
            .cloned()
            .collect()
    });
    if entries.is_empty() {
        return failure(StatusCode::NOT_FOUND, "Item not found");
    }

    let stored = shared.with_store(destination, |store| {
        for entry in &entries {
            let _ = store.add(entry.to_draft(), Utc::now());
        }
        store.items().iter().find(|item| &item.id == id).cloned()
    });
    stored.map_or_else(
        || failure(StatusCode::INTERNAL_SERVER_ERROR, "Item vanished"),
        |item| data(json!(item)),
    )
}

async fn move_to_cart(
    State(shared): AppState,
    Path(segment): Path<String>,
    Json(body): Json<MoveBody>,
) -> Response {
    copy_item(&shared, &segment, CollectionKind::Cart, &body.item_id)
}

async fn move_to_wishlist(
    State(shared): AppState,
    Path(segment): Path<String>,
    Json(body): Json<MoveBody>,
) -> Response {
    copy_item(&shared, &segment, CollectionKind::Wishlist, &body.item_id)
}
