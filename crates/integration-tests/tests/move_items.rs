//! Moving items between collections, locally and through the backend.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use axum::http::{Method, StatusCode};
use rust_decimal::Decimal;
use yoraa_core::{CollectionKind, ItemId, LineItemDraft};
use yoraa_integration_tests::{FakeBackend, Failure, Recorded};
use yoraa_store::{Collections, KeyValueStore, MemoryKv, RequestState, StoreError};

async fn signed_in_with_saved_item(backend: &FakeBackend) -> Collections {
    backend.seed(
        CollectionKind::SaveForLater,
        vec![
            LineItemDraft::new("A", Decimal::from(40))
                .with_name("Canvas Tote")
                .with_note("birthday"),
            LineItemDraft::new("B", Decimal::from(15)),
        ],
    );
    let mut collections = Collections::new(&backend.signed_in(Arc::new(MemoryKv::new())));
    collections.hydrate_all().await.unwrap();
    collections
}

fn paths(requests: &[Recorded]) -> Vec<String> {
    requests
        .iter()
        .map(|r| format!("{} {}", r.method, r.path))
        .collect()
}

#[tokio::test]
async fn test_remote_move_runs_both_phases() {
    let backend = FakeBackend::start().await;
    let mut collections = signed_in_with_saved_item(&backend).await;
    let before = backend.request_count();

    let moved = collections
        .move_item(CollectionKind::SaveForLater, CollectionKind::Cart, &ItemId::new("A"))
        .await
        .unwrap();

    assert_eq!(moved.len(), 1);
    let requests = backend.requests();
    assert_eq!(
        paths(&requests[before..]),
        vec![
            "POST /api/save-for-later/move-to-cart".to_string(),
            "DELETE /api/save-for-later/remove/A".to_string(),
        ]
    );

    assert_eq!(collections.save_for_later.store().count(), 1);
    assert!(collections.cart.store().items().iter().any(|i| i.id == ItemId::new("A")));
    assert!(!collections.cart.store().is_local());
    assert_eq!(backend.items(CollectionKind::Cart).len(), 1);
    assert_eq!(backend.items(CollectionKind::SaveForLater).len(), 1);
}

#[tokio::test]
async fn test_remote_move_rolls_back_when_removal_fails() {
    let backend = FakeBackend::start().await;
    let mut collections = signed_in_with_saved_item(&backend).await;
    backend.fail_once(
        Method::DELETE,
        "/api/save-for-later/remove/A",
        Failure::Status(StatusCode::SERVICE_UNAVAILABLE),
    );

    let err = collections
        .move_item(CollectionKind::SaveForLater, CollectionKind::Cart, &ItemId::new("A"))
        .await
        .unwrap_err();

    assert!(matches!(err, StoreError::MoveRolledBack { .. }));
    let last = backend.requests().pop().unwrap();
    assert_eq!(last.method, Method::DELETE);
    assert_eq!(last.path, "/api/cart/remove/A");

    // Backend and local state look as if nothing happened.
    assert!(backend.items(CollectionKind::Cart).is_empty());
    assert_eq!(backend.items(CollectionKind::SaveForLater).len(), 2);
    assert!(collections.cart.store().is_empty());
    assert_eq!(collections.save_for_later.store().count(), 2);
    assert!(matches!(
        collections.save_for_later.request_state(),
        RequestState::Rejected(_)
    ));
}

#[tokio::test]
async fn test_remote_move_reports_inconsistency_when_compensation_fails() {
    let backend = FakeBackend::start().await;
    let mut collections = signed_in_with_saved_item(&backend).await;
    backend.fail_once(
        Method::DELETE,
        "/api/save-for-later/remove/A",
        Failure::Status(StatusCode::SERVICE_UNAVAILABLE),
    );
    backend.fail_once(
        Method::DELETE,
        "/api/cart/remove/A",
        Failure::Status(StatusCode::SERVICE_UNAVAILABLE),
    );

    let err = collections
        .move_item(CollectionKind::SaveForLater, CollectionKind::Cart, &ItemId::new("A"))
        .await
        .unwrap_err();

    assert!(matches!(err, StoreError::MoveInconsistent { .. }));
    assert_eq!(backend.items(CollectionKind::Cart).len(), 1);
    assert_eq!(backend.items(CollectionKind::SaveForLater).len(), 2);
    assert!(collections.cart.store().is_empty());
    assert_eq!(collections.save_for_later.store().count(), 2);
}

#[tokio::test]
async fn test_remote_move_phase_one_failure_stops_early() {
    let backend = FakeBackend::start().await;
    let mut collections = signed_in_with_saved_item(&backend).await;
    backend.fail_once(
        Method::POST,
        "/api/save-for-later/move-to-wishlist",
        Failure::Status(StatusCode::NOT_FOUND),
    );
    let before = backend.request_count();

    let err = collections
        .move_item(
            CollectionKind::SaveForLater,
            CollectionKind::Wishlist,
            &ItemId::new("A"),
        )
        .await
        .unwrap_err();

    assert_eq!(err.status(), Some(StatusCode::NOT_FOUND));
    assert_eq!(backend.request_count(), before + 1);
    assert!(collections.wishlist.store().is_empty());
}

#[tokio::test]
async fn test_local_move_updates_both_mirrors() {
    let backend = FakeBackend::start().await;
    let kv = Arc::new(MemoryKv::new());
    let mut collections = Collections::new(&backend.signed_out(kv.clone()));
    collections
        .wishlist
        .add(LineItemDraft::new("A", Decimal::from(80)))
        .await
        .unwrap();
    collections
        .cart
        .add(LineItemDraft::new("A", Decimal::from(80)))
        .await
        .unwrap();

    collections
        .move_item(CollectionKind::Wishlist, CollectionKind::Cart, &ItemId::new("A"))
        .await
        .unwrap();

    assert_eq!(backend.request_count(), 0);
    assert!(collections.wishlist.store().is_empty());
    // Same variant already in the cart, so quantities merge.
    assert_eq!(collections.cart.store().count(), 2);
    assert_eq!(kv.get("wishlistData").unwrap().as_deref(), Some("[]"));
    assert!(kv.get("cartData").unwrap().unwrap().contains("\"quantity\":2"));
}
