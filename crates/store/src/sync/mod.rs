//! Dual-mode collection services.
//!
//! A [`CollectionService`] owns one collection's store and decides, for each
//! operation, whether it runs against the local mirror or the backend. The
//! choice is made once per dispatch from the injected [`Session`]: a signed-in
//! session with a configured [`RemoteClient`] goes remote, anything else stays
//! local.
//!
//! Each service tracks the state of its latest request
//! (`Idle → Pending → Fulfilled | Rejected`). There is no retry and no
//! deduplication: two rapid `add` calls issue two requests.

mod session;
mod strategy;

pub use session::Session;
pub use strategy::{LocalStrategy, Mode, RemoteStrategy, Route, SyncStrategy};

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, instrument, warn};
use yoraa_core::{CollectionKind, ItemId, LineItem, VariantKey};

use crate::collection::{AddOutcome, CollectionStore, PricingPolicy, SortCriterion};
use crate::error::{Result, StoreError};
use crate::mirror::{KeyValueStore, Mirror};
use crate::monitor::{ErrorMonitor, context};
use crate::remote::{Payload, RemoteClient};

use strategy::fold;

/// Lifecycle of the most recent request on a service.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RequestState {
    #[default]
    Idle,
    Pending,
    Fulfilled,
    /// Holds the error message surfaced to the caller.
    Rejected(String),
}

/// Dependencies shared by every service in a session.
#[derive(Clone)]
pub struct ServiceDeps {
    pub storage: Arc<dyn KeyValueStore>,
    pub remote: Option<RemoteClient>,
    pub session: Session,
    pub policy: PricingPolicy,
    pub monitor: Arc<ErrorMonitor>,
}

impl std::fmt::Debug for ServiceDeps {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceDeps")
            .field("remote", &self.remote)
            .field("session", &self.session)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

/// One collection plus the machinery to keep it in sync.
#[derive(Debug)]
pub struct CollectionService {
    store: CollectionStore,
    mirror: Mirror,
    remote: Option<RemoteClient>,
    session: Session,
    monitor: Arc<ErrorMonitor>,
    state: RequestState,
}

/// Pick the strategy for one dispatch.
fn route<'a>(mirror: &'a Mirror, remote: Option<&'a RemoteClient>, session: &'a Session) -> Route<'a> {
    match (remote, session.token()) {
        (Some(remote), Some(token)) => Route::Remote(RemoteStrategy::new(remote.authorize(token))),
        (None, Some(_)) => {
            warn!("Authenticated session without a configured backend; staying local");
            Route::Local(LocalStrategy::new(mirror))
        }
        _ => Route::Local(LocalStrategy::new(mirror)),
    }
}

impl CollectionService {
    /// Create an empty service. Call [`hydrate`](Self::hydrate) to load state.
    #[must_use]
    pub fn new(kind: CollectionKind, deps: ServiceDeps) -> Self {
        Self {
            store: CollectionStore::new(kind, deps.policy),
            mirror: Mirror::new(deps.storage, kind),
            remote: deps.remote,
            session: deps.session,
            monitor: deps.monitor,
            state: RequestState::Idle,
        }
    }

    #[must_use]
    pub const fn kind(&self) -> CollectionKind {
        self.store.kind()
    }

    /// Read-only view of the collection.
    #[must_use]
    pub const fn store(&self) -> &CollectionStore {
        &self.store
    }

    #[must_use]
    pub const fn request_state(&self) -> &RequestState {
        &self.state
    }

    #[must_use]
    pub const fn session(&self) -> &Session {
        &self.session
    }

    #[must_use]
    pub const fn mirror(&self) -> &Mirror {
        &self.mirror
    }

    /// Mode the next operation will run in.
    #[must_use]
    pub fn mode(&self) -> Mode {
        route(&self.mirror, self.remote.as_ref(), &self.session).mode()
    }

    /// Swap the session. The collection is not reloaded.
    pub fn set_session(&mut self, session: Session) {
        self.session = session;
    }

    /// Drop all local state and continue anonymously.
    ///
    /// Clears the in-memory collection and deletes the mirror key.
    pub fn logout(&mut self) {
        self.store.clear();
        self.store.set_local(true);
        self.mirror.clear();
        self.session = Session::anonymous();
        self.state = RequestState::Idle;
        info!(kind = %self.kind(), "Collection cleared on logout");
    }

    fn begin(&mut self) {
        self.state = RequestState::Pending;
    }

    /// Record the outcome of an operation and pass it through.
    fn settle<T>(&mut self, operation: &'static str, result: Result<T>) -> Result<T> {
        match &result {
            Ok(_) => self.state = RequestState::Fulfilled,
            Err(err) => {
                self.state = RequestState::Rejected(err.to_string());
                let kind = self.kind().to_string();
                self.monitor
                    .capture(err, context([("operation", operation), ("collection", &kind)]));
            }
        }
        result
    }

    /// Load the collection: from the mirror when anonymous, from the backend
    /// when signed in.
    ///
    /// # Errors
    ///
    /// Returns the backend error in remote mode; the store is unchanged.
    #[instrument(skip(self), fields(kind = %self.kind()))]
    pub async fn hydrate(&mut self) -> Result<()> {
        self.fetch().await
    }

    /// Reload the collection from its source of truth.
    ///
    /// # Errors
    ///
    /// Returns the backend error in remote mode; the store is unchanged.
    #[instrument(skip(self), fields(kind = %self.kind()))]
    pub async fn fetch(&mut self) -> Result<()> {
        self.begin();
        let result = route(&self.mirror, self.remote.as_ref(), &self.session)
            .fetch(&mut self.store)
            .await;
        self.settle("fetch", result)
    }

    /// Add an item.
    ///
    /// # Errors
    ///
    /// Returns `InvalidQuantity` for a zero-quantity cart draft,
    /// `AmountOutOfRange` if the cart totals would overflow, or the backend
    /// error in remote mode.
    #[instrument(skip(self, draft), fields(kind = %self.kind(), item_id = %draft.id))]
    pub async fn add(&mut self, draft: yoraa_core::LineItemDraft) -> Result<AddOutcome> {
        self.begin();
        let result = route(&self.mirror, self.remote.as_ref(), &self.session)
            .add(&mut self.store, draft)
            .await;
        self.settle("add", result)
    }

    /// Remove all variants of an item.
    ///
    /// # Errors
    ///
    /// Returns the backend error in remote mode.
    #[instrument(skip(self), fields(kind = %self.kind()))]
    pub async fn remove(&mut self, id: &ItemId) -> Result<usize> {
        self.begin();
        let result = route(&self.mirror, self.remote.as_ref(), &self.session)
            .remove(&mut self.store, id)
            .await;
        self.settle("remove", result)
    }

    /// Remove one variant of an item.
    ///
    /// # Errors
    ///
    /// Returns the backend error in remote mode.
    #[instrument(skip(self), fields(kind = %self.kind()))]
    pub async fn remove_variant(&mut self, key: &VariantKey) -> Result<bool> {
        self.begin();
        let result = route(&self.mirror, self.remote.as_ref(), &self.session)
            .remove_variant(&mut self.store, key)
            .await;
        self.settle("remove_variant", result)
    }

    /// Set a cart item's quantity; zero or less removes it.
    ///
    /// # Errors
    ///
    /// Returns `Unsupported` outside the cart, `AmountOutOfRange` if the
    /// cart totals would overflow, or the backend error in remote mode.
    #[instrument(skip(self), fields(kind = %self.kind()))]
    pub async fn update_quantity(&mut self, id: &ItemId, quantity: i64) -> Result<bool> {
        self.begin();
        let result = route(&self.mirror, self.remote.as_ref(), &self.session)
            .update_quantity(&mut self.store, id, quantity)
            .await;
        self.settle("update_quantity", result)
    }

    /// Empty the collection. Deletes the mirror key in local mode.
    ///
    /// # Errors
    ///
    /// Returns the backend error in remote mode.
    #[instrument(skip(self), fields(kind = %self.kind()))]
    pub async fn clear(&mut self) -> Result<()> {
        self.begin();
        let result = route(&self.mirror, self.remote.as_ref(), &self.session)
            .clear(&mut self.store)
            .await;
        self.settle("clear", result)
    }

    /// Reorder the collection for display. Persisted only in local mode.
    pub fn sort(&mut self, criterion: SortCriterion) {
        self.store.sort(criterion);
        if self.store.is_local() {
            self.mirror.save(self.store.items());
        }
    }

    /// Move an item (all its variants) into another collection.
    ///
    /// Locally this is a take-and-add on both stores. Against the backend it
    /// runs in two phases: the `move-to-<destination>` call, then removal
    /// from this collection. If removal fails the destination copy is
    /// deleted again; neither store changes unless both phases succeed.
    ///
    /// # Errors
    ///
    /// - `Unsupported` if `destination` is this collection or not a cart or
    ///   wishlist.
    /// - `ItemNotFound` if the item is not in this collection.
    /// - `MoveRolledBack` or `MoveInconsistent` if removal failed.
    /// - The phase-one backend error otherwise.
    #[instrument(skip(self, destination), fields(source = %self.kind(), destination = %destination.kind()))]
    pub async fn move_to(
        &mut self,
        destination: &mut Self,
        id: &ItemId,
    ) -> Result<Vec<LineItem>> {
        self.begin();
        let result = self.run_move(destination, id).await;
        destination.state = match &result {
            Ok(_) => RequestState::Fulfilled,
            Err(err) => RequestState::Rejected(err.to_string()),
        };
        self.settle("move", result)
    }

    async fn run_move(&mut self, destination: &mut Self, id: &ItemId) -> Result<Vec<LineItem>> {
        let dest_kind = destination.kind();
        if dest_kind == self.kind() || !dest_kind.accepts_moves() {
            return Err(StoreError::Unsupported {
                operation: "move",
                kind: dest_kind,
            });
        }
        if !self.store.items().iter().any(|item| &item.id == id) {
            return Err(StoreError::ItemNotFound(id.clone()));
        }

        match route(&self.mirror, self.remote.as_ref(), &self.session) {
            Route::Local(_) => {
                let now = Utc::now();
                let mut staged = destination.store.clone();
                for item in self.store.items().iter().filter(|item| &item.id == id) {
                    staged.add(item.to_draft(), now)?;
                }
                let moved = self.store.take(id);
                destination.store = staged;
                self.store.set_local(true);
                destination.store.set_local(true);
                self.mirror.save(self.store.items());
                destination.mirror.save(destination.store.items());
                info!(item_id = %id, moved = moved.len(), "Moved item locally");
                Ok(moved)
            }
            Route::Remote(remote) => {
                let api = remote.api();
                let source_kind = self.kind();

                let moved_payload = api.move_item(source_kind, dest_kind, id).await?;

                let removal = match api.remove(source_kind, id).await {
                    Ok(payload) => payload,
                    Err(remove_err) => {
                        warn!(item_id = %id, error = %remove_err, "Move phase two failed; compensating");
                        return Err(match api.remove(dest_kind, id).await {
                            Ok(_) => StoreError::MoveRolledBack {
                                item: id.clone(),
                                destination: dest_kind,
                                reason: remove_err.to_string(),
                            },
                            Err(undo_err) => StoreError::MoveInconsistent {
                                item: id.clone(),
                                destination: dest_kind,
                                reason: format!("{remove_err}; compensation failed: {undo_err}"),
                            },
                        });
                    }
                };

                let moved = self.store.take(id);
                let replacement = match removal {
                    Payload::Collection(items) => Some(items),
                    Payload::Item(_) | Payload::Empty => None,
                };
                if let Some(items) = replacement {
                    self.store.replace_all(items);
                }
                self.store.set_local(false);

                let now = Utc::now();
                fold(&mut destination.store, moved_payload, |store| {
                    for item in &moved {
                        // Quantity comes from an existing entry, so it is non-zero.
                        let _ = store.add(item.to_draft(), now);
                    }
                });

                info!(item_id = %id, moved = moved.len(), "Moved item via backend");
                Ok(moved)
            }
        }
    }
}

/// The three collections of one session, sharing storage, backend and
/// session.
#[derive(Debug)]
pub struct Collections {
    pub cart: CollectionService,
    pub wishlist: CollectionService,
    pub save_for_later: CollectionService,
}

impl Collections {
    #[must_use]
    pub fn new(deps: &ServiceDeps) -> Self {
        Self {
            cart: CollectionService::new(CollectionKind::Cart, deps.clone()),
            wishlist: CollectionService::new(CollectionKind::Wishlist, deps.clone()),
            save_for_later: CollectionService::new(CollectionKind::SaveForLater, deps.clone()),
        }
    }

    #[must_use]
    pub const fn get(&self, kind: CollectionKind) -> &CollectionService {
        match kind {
            CollectionKind::Cart => &self.cart,
            CollectionKind::Wishlist => &self.wishlist,
            CollectionKind::SaveForLater => &self.save_for_later,
        }
    }

    pub const fn get_mut(&mut self, kind: CollectionKind) -> &mut CollectionService {
        match kind {
            CollectionKind::Cart => &mut self.cart,
            CollectionKind::Wishlist => &mut self.wishlist,
            CollectionKind::SaveForLater => &mut self.save_for_later,
        }
    }

    /// Hydrate every collection. Stops at the first failure.
    ///
    /// # Errors
    ///
    /// Returns the first backend error in remote mode.
    pub async fn hydrate_all(&mut self) -> Result<()> {
        self.cart.hydrate().await?;
        self.wishlist.hydrate().await?;
        self.save_for_later.hydrate().await
    }

    /// Swap the session on every collection.
    pub fn set_session(&mut self, session: &Session) {
        self.cart.set_session(session.clone());
        self.wishlist.set_session(session.clone());
        self.save_for_later.set_session(session.clone());
    }

    /// Log out of every collection.
    pub fn logout(&mut self) {
        self.cart.logout();
        self.wishlist.logout();
        self.save_for_later.logout();
    }

    /// Move an item between two collections of this session.
    ///
    /// # Errors
    ///
    /// See [`CollectionService::move_to`]; moving a collection onto itself
    /// is `Unsupported`.
    pub async fn move_item(
        &mut self,
        from: CollectionKind,
        to: CollectionKind,
        id: &ItemId,
    ) -> Result<Vec<LineItem>> {
        use CollectionKind::{Cart, SaveForLater, Wishlist};

        let (source, destination) = match (from, to) {
            (Wishlist, Cart) => (&mut self.wishlist, &mut self.cart),
            (SaveForLater, Cart) => (&mut self.save_for_later, &mut self.cart),
            (SaveForLater, Wishlist) => (&mut self.save_for_later, &mut self.wishlist),
            (Cart, Wishlist) => (&mut self.cart, &mut self.wishlist),
            (Cart | Wishlist, SaveForLater) | (Cart, Cart) | (Wishlist, Wishlist) | (SaveForLater, SaveForLater) => {
                return Err(StoreError::Unsupported {
                    operation: "move",
                    kind: to,
                });
            }
        };
        source.move_to(destination, id).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use rust_decimal::Decimal;
    use secrecy::SecretString;
    use url::Url;
    use yoraa_core::LineItemDraft;

    use super::*;
    use crate::mirror::MemoryKv;
    use crate::monitor::ErrorCategory;

    fn deps(session: Session, remote: Option<RemoteClient>) -> (Arc<MemoryKv>, ServiceDeps) {
        let kv = Arc::new(MemoryKv::new());
        let deps = ServiceDeps {
            storage: kv.clone(),
            remote,
            session,
            policy: PricingPolicy::default(),
            monitor: Arc::new(ErrorMonitor::default()),
        };
        (kv, deps)
    }

    /// A backend address nothing listens on.
    fn unreachable_remote() -> RemoteClient {
        RemoteClient::new(
            Url::parse("http://127.0.0.1:9/").unwrap(),
            Duration::from_millis(500),
        )
        .unwrap()
    }

    fn token() -> SecretString {
        SecretString::from("tok_live_7Hq2xZ9pLm4")
    }

    #[tokio::test]
    async fn test_anonymous_add_stays_local_and_mirrors() {
        let (kv, deps) = deps(Session::anonymous(), Some(unreachable_remote()));
        let mut cart = CollectionService::new(CollectionKind::Cart, deps);
        assert_eq!(cart.mode(), Mode::Local);

        cart.add(LineItemDraft::new("A", Decimal::from(600))).await.unwrap();

        assert!(cart.store().is_local());
        assert_eq!(cart.request_state(), &RequestState::Fulfilled);
        let persisted = kv.get("cartData").unwrap().unwrap();
        assert!(persisted.contains("\"A\""));
        assert_eq!(cart.store().totals().unwrap().total.to_string(), "660.00");
    }

    #[tokio::test]
    async fn test_hydrate_restores_mirror() {
        let (kv, deps) = deps(Session::anonymous(), None);
        let mut first = CollectionService::new(CollectionKind::Wishlist, deps.clone());
        first.add(LineItemDraft::new("A", Decimal::ONE)).await.unwrap();
        first.add(LineItemDraft::new("B", Decimal::ONE)).await.unwrap();

        let mut second = CollectionService::new(CollectionKind::Wishlist, deps);
        second.hydrate().await.unwrap();
        assert_eq!(second.store().count(), 2);
        assert!(kv.get("wishlistData").unwrap().is_some());
    }

    #[tokio::test]
    async fn test_local_clear_deletes_mirror_key() {
        let (kv, deps) = deps(Session::anonymous(), None);
        let mut cart = CollectionService::new(CollectionKind::Cart, deps);
        cart.add(LineItemDraft::new("A", Decimal::ONE)).await.unwrap();
        cart.clear().await.unwrap();
        cart.clear().await.unwrap();
        assert_eq!(kv.get("cartData").unwrap(), None);
        assert!(cart.store().is_empty());
    }

    #[tokio::test]
    async fn test_remote_failure_leaves_store_unchanged() {
        let (_, deps) = deps(Session::authenticated(token()), Some(unreachable_remote()));
        let monitor = Arc::clone(&deps.monitor);
        let mut cart = CollectionService::new(CollectionKind::Cart, deps);
        assert_eq!(cart.mode(), Mode::Remote);

        let err = cart.add(LineItemDraft::new("A", Decimal::ONE)).await.unwrap_err();
        assert!(matches!(err, StoreError::Http(_)));
        assert!(cart.store().is_empty());
        assert!(matches!(cart.request_state(), RequestState::Rejected(_)));

        let recorded = monitor.recent_errors(1);
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].context.get("operation").map(String::as_str), Some("add"));
        assert_eq!(recorded[0].category, ErrorCategory::Network);
    }

    #[tokio::test]
    async fn test_authenticated_without_backend_is_local() {
        let (_, deps) = deps(Session::authenticated(token()), None);
        let cart = CollectionService::new(CollectionKind::Cart, deps);
        assert_eq!(cart.mode(), Mode::Local);
    }

    #[tokio::test]
    async fn test_local_move_to_cart() {
        let (kv, deps) = deps(Session::anonymous(), None);
        let mut collections = Collections::new(&deps);
        collections
            .save_for_later
            .add(LineItemDraft::new("A", Decimal::from(40)).with_note("later"))
            .await
            .unwrap();

        let moved = collections
            .move_item(CollectionKind::SaveForLater, CollectionKind::Cart, &ItemId::new("A"))
            .await
            .unwrap();

        assert_eq!(moved.len(), 1);
        assert!(collections.save_for_later.store().is_empty());
        assert_eq!(collections.cart.store().count(), 1);
        assert_eq!(kv.get("saveForLaterData").unwrap().as_deref(), Some("[]"));
        assert!(kv.get("cartData").unwrap().unwrap().contains("\"A\""));
    }

    #[tokio::test]
    async fn test_local_move_out_of_range_keeps_source() {
        let (kv, deps) = deps(Session::anonymous(), None);
        let mut collections = Collections::new(&deps);
        let price = Decimal::from_i128_with_scale(5 * 10_i128.pow(28), 0);
        collections
            .cart
            .add(LineItemDraft::new("A", price))
            .await
            .unwrap();
        collections
            .wishlist
            .add(LineItemDraft::new("B", price))
            .await
            .unwrap();

        let err = collections
            .move_item(CollectionKind::Wishlist, CollectionKind::Cart, &ItemId::new("B"))
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::AmountOutOfRange(_)));
        assert_eq!(collections.wishlist.store().count(), 1);
        assert_eq!(collections.cart.store().count(), 1);
        assert!(kv.get("wishlistData").unwrap().unwrap().contains("\"B\""));
    }

    #[tokio::test]
    async fn test_move_rejects_bad_destination_and_missing_item() {
        let (_, deps) = deps(Session::anonymous(), None);
        let mut collections = Collections::new(&deps);
        collections.cart.add(LineItemDraft::new("A", Decimal::ONE)).await.unwrap();

        let err = collections
            .move_item(CollectionKind::Cart, CollectionKind::SaveForLater, &ItemId::new("A"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Unsupported { .. }));

        let err = collections
            .move_item(CollectionKind::Wishlist, CollectionKind::Cart, &ItemId::new("A"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ItemNotFound(_)));
        assert_eq!(collections.cart.store().count(), 1);
    }

    #[tokio::test]
    async fn test_logout_clears_everything() {
        let (kv, deps) = deps(Session::anonymous(), None);
        let mut collections = Collections::new(&deps);
        collections.cart.add(LineItemDraft::new("A", Decimal::ONE)).await.unwrap();
        collections.wishlist.add(LineItemDraft::new("B", Decimal::ONE)).await.unwrap();

        collections.set_session(&Session::authenticated(token()));
        collections.logout();

        assert!(collections.cart.store().is_empty());
        assert!(collections.wishlist.store().is_empty());
        assert!(!collections.cart.session().is_authenticated());
        assert_eq!(kv.get("cartData").unwrap(), None);
        assert_eq!(kv.get("wishlistData").unwrap(), None);
    }

    #[tokio::test]
    async fn test_sort_persists_locally() {
        let (kv, deps) = deps(Session::anonymous(), None);
        let mut cart = CollectionService::new(CollectionKind::Cart, deps);
        cart.add(LineItemDraft::new("cheap", Decimal::ONE)).await.unwrap();
        cart.add(LineItemDraft::new("pricey", Decimal::from(99))).await.unwrap();
        cart.sort(SortCriterion::PriceDesc);
        let persisted = kv.get("cartData").unwrap().unwrap();
        assert!(persisted.find("pricey").unwrap() < persisted.find("cheap").unwrap());
    }
}
