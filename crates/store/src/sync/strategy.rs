//! Local and remote sync strategies.
//!
//! A strategy applies one operation to a [`CollectionStore`]. The local
//! strategy mutates the store and mirrors it to persistent storage; the
//! remote strategy calls the backend and folds the canonical response in.
//! Remote failures leave the store untouched.

use chrono::Utc;
use yoraa_core::{ItemId, LineItem, LineItemDraft, VariantKey};

use crate::collection::{AddOutcome, CollectionStore};
use crate::error::Result;
use crate::mirror::Mirror;
use crate::remote::{AuthorizedClient, Payload};

/// Where a collection's source of truth lives for one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Local,
    Remote,
}

/// One way of applying collection operations.
#[allow(async_fn_in_trait)]
pub trait SyncStrategy {
    fn mode(&self) -> Mode;

    /// Load the collection from its source of truth.
    async fn fetch(&self, store: &mut CollectionStore) -> Result<()>;

    async fn add(&self, store: &mut CollectionStore, draft: LineItemDraft) -> Result<AddOutcome>;

    /// Remove all variants of an item. Returns entries removed locally.
    async fn remove(&self, store: &mut CollectionStore, id: &ItemId) -> Result<usize>;

    async fn remove_variant(&self, store: &mut CollectionStore, key: &VariantKey) -> Result<bool>;

    async fn update_quantity(
        &self,
        store: &mut CollectionStore,
        id: &ItemId,
        quantity: i64,
    ) -> Result<bool>;

    async fn clear(&self, store: &mut CollectionStore) -> Result<()>;
}

// =============================================================================
// LocalStrategy
// =============================================================================

/// Anonymous sessions: the mirror is the only persistence.
#[derive(Debug, Clone, Copy)]
pub struct LocalStrategy<'a> {
    mirror: &'a Mirror,
}

impl<'a> LocalStrategy<'a> {
    #[must_use]
    pub const fn new(mirror: &'a Mirror) -> Self {
        Self { mirror }
    }

    fn persist(&self, store: &mut CollectionStore) {
        store.set_local(true);
        self.mirror.save(store.items());
    }
}

impl SyncStrategy for LocalStrategy<'_> {
    fn mode(&self) -> Mode {
        Mode::Local
    }

    async fn fetch(&self, store: &mut CollectionStore) -> Result<()> {
        store.replace_all(self.mirror.restore());
        store.set_local(true);
        Ok(())
    }

    async fn add(&self, store: &mut CollectionStore, draft: LineItemDraft) -> Result<AddOutcome> {
        let outcome = store.add(draft, Utc::now())?;
        self.persist(store);
        Ok(outcome)
    }

    async fn remove(&self, store: &mut CollectionStore, id: &ItemId) -> Result<usize> {
        let removed = store.remove(id);
        self.persist(store);
        Ok(removed)
    }

    async fn remove_variant(&self, store: &mut CollectionStore, key: &VariantKey) -> Result<bool> {
        let removed = store.remove_variant(key);
        self.persist(store);
        Ok(removed)
    }

    async fn update_quantity(
        &self,
        store: &mut CollectionStore,
        id: &ItemId,
        quantity: i64,
    ) -> Result<bool> {
        let changed = store.update_quantity(id, quantity)?;
        self.persist(store);
        Ok(changed)
    }

    async fn clear(&self, store: &mut CollectionStore) -> Result<()> {
        store.clear();
        store.set_local(true);
        self.mirror.clear();
        Ok(())
    }
}

// =============================================================================
// RemoteStrategy
// =============================================================================

/// Authenticated sessions: the backend is the source of truth.
#[derive(Debug, Clone, Copy)]
pub struct RemoteStrategy<'a> {
    api: AuthorizedClient<'a>,
}

impl<'a> RemoteStrategy<'a> {
    #[must_use]
    pub const fn new(api: AuthorizedClient<'a>) -> Self {
        Self { api }
    }

    #[must_use]
    pub const fn api(&self) -> AuthorizedClient<'a> {
        self.api
    }
}

/// Fold a backend payload into the store.
///
/// A collection replaces the contents, an item is upserted, and an empty
/// payload falls back to applying the operation locally.
pub(crate) fn fold(
    store: &mut CollectionStore,
    payload: Payload,
    fallback: impl FnOnce(&mut CollectionStore),
) {
    match payload {
        Payload::Collection(items) => store.replace_all(items),
        Payload::Item(item) => store.upsert(item),
        Payload::Empty => fallback(store),
    }
    store.set_local(false);
}

fn already_present(store: &CollectionStore, draft: &LineItemDraft) -> bool {
    if store.kind().tracks_quantity() {
        let key = draft.variant_key();
        store.items().iter().any(|item| item.matches(&key))
    } else {
        store.items().iter().any(|item| item.id == draft.id)
    }
}

fn count_with_id(items: &[LineItem], id: &ItemId) -> usize {
    items.iter().filter(|item| &item.id == id).count()
}

impl SyncStrategy for RemoteStrategy<'_> {
    fn mode(&self) -> Mode {
        Mode::Remote
    }

    async fn fetch(&self, store: &mut CollectionStore) -> Result<()> {
        let endpoint = store.kind().api_segment();
        let items = self
            .api
            .fetch(store.kind())
            .await?
            .into_collection(endpoint)?;
        store.replace_all(items);
        store.set_local(false);
        Ok(())
    }

    async fn add(&self, store: &mut CollectionStore, draft: LineItemDraft) -> Result<AddOutcome> {
        store.check_add(&draft)?;

        let existed = already_present(store, &draft);
        let payload = self.api.add(store.kind(), &draft).await?;

        let mut fallback_outcome = None;
        fold(store, payload, |store| {
            fallback_outcome = store.add(draft, Utc::now()).ok();
        });

        Ok(fallback_outcome.unwrap_or(match (existed, store.kind().tracks_quantity()) {
            (false, _) => AddOutcome::Inserted,
            (true, true) => AddOutcome::Merged,
            (true, false) => AddOutcome::Unchanged,
        }))
    }

    async fn remove(&self, store: &mut CollectionStore, id: &ItemId) -> Result<usize> {
        let before = count_with_id(store.items(), id);
        let payload = self.api.remove(store.kind(), id).await?;
        fold(store, payload, |store| {
            store.remove(id);
        });
        Ok(before - count_with_id(store.items(), id).min(before))
    }

    async fn remove_variant(&self, store: &mut CollectionStore, key: &VariantKey) -> Result<bool> {
        let existed = store.items().iter().any(|item| item.matches(key));
        let payload = self.api.remove_variant(store.kind(), key).await?;
        fold(store, payload, |store| {
            store.remove_variant(key);
        });
        Ok(existed && !store.items().iter().any(|item| item.matches(key)))
    }

    async fn update_quantity(
        &self,
        store: &mut CollectionStore,
        id: &ItemId,
        quantity: i64,
    ) -> Result<bool> {
        store.check_update_quantity(id, quantity)?;

        if quantity <= 0 {
            return Ok(self.remove(store, id).await? > 0);
        }

        let before: Vec<u32> = store
            .items()
            .iter()
            .filter(|item| &item.id == id)
            .map(|item| item.quantity)
            .collect();
        let units = u32::try_from(quantity).unwrap_or(u32::MAX);
        let payload = self.api.update_quantity(store.kind(), id, units).await?;
        fold(store, payload, |store| {
            // Checked above, so this cannot fail.
            let _ = store.update_quantity(id, quantity);
        });
        let after: Vec<u32> = store
            .items()
            .iter()
            .filter(|item| &item.id == id)
            .map(|item| item.quantity)
            .collect();
        Ok(before != after)
    }

    async fn clear(&self, store: &mut CollectionStore) -> Result<()> {
        self.api.clear(store.kind()).await?;
        store.clear();
        store.set_local(false);
        Ok(())
    }
}

// =============================================================================
// Route
// =============================================================================

/// The strategy chosen for one dispatch.
#[derive(Debug, Clone, Copy)]
pub enum Route<'a> {
    Local(LocalStrategy<'a>),
    Remote(RemoteStrategy<'a>),
}

impl SyncStrategy for Route<'_> {
    fn mode(&self) -> Mode {
        match self {
            Self::Local(s) => s.mode(),
            Self::Remote(s) => s.mode(),
        }
    }

    async fn fetch(&self, store: &mut CollectionStore) -> Result<()> {
        match self {
            Self::Local(s) => s.fetch(store).await,
            Self::Remote(s) => s.fetch(store).await,
        }
    }

    async fn add(&self, store: &mut CollectionStore, draft: LineItemDraft) -> Result<AddOutcome> {
        match self {
            Self::Local(s) => s.add(store, draft).await,
            Self::Remote(s) => s.add(store, draft).await,
        }
    }

    async fn remove(&self, store: &mut CollectionStore, id: &ItemId) -> Result<usize> {
        match self {
            Self::Local(s) => s.remove(store, id).await,
            Self::Remote(s) => s.remove(store, id).await,
        }
    }

    async fn remove_variant(&self, store: &mut CollectionStore, key: &VariantKey) -> Result<bool> {
        match self {
            Self::Local(s) => s.remove_variant(store, key).await,
            Self::Remote(s) => s.remove_variant(store, key).await,
        }
    }

    async fn update_quantity(
        &self,
        store: &mut CollectionStore,
        id: &ItemId,
        quantity: i64,
    ) -> Result<bool> {
        match self {
            Self::Local(s) => s.update_quantity(store, id, quantity).await,
            Self::Remote(s) => s.update_quantity(store, id, quantity).await,
        }
    }

    async fn clear(&self, store: &mut CollectionStore) -> Result<()> {
        match self {
            Self::Local(s) => s.clear(store).await,
            Self::Remote(s) => s.clear(store).await,
        }
    }
}
