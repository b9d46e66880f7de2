//! Offline cache syncing against the real submission endpoint.
//!
//! Runs the axum router on an ephemeral port with a fixed session principal
//! and drives the offline cache's HTTP client at it, covering the whole
//! add-offline → replay → reconcile path.

use async_trait::async_trait;
use axum::Extension;
use std::sync::Arc;
use subtrack::offline::{HttpSubmitClient, InMemoryOfflineStore, OfflineCache, SubscriptionDraft};
use subtrack::{
    AppContext, ConfigBuilder, CycleUnit, DeliveryOutcome, InMemoryStore, NotificationPayload,
    PushClient, PushEndpoint, SessionPrincipal, router,
};

#[derive(Clone)]
struct NoopPushClient;

#[async_trait]
impl PushClient for NoopPushClient {
    async fn send(
        &self,
        _endpoint: &PushEndpoint,
        _payload: &NotificationPayload,
    ) -> subtrack::Result<DeliveryOutcome> {
        Ok(DeliveryOutcome::Delivered)
    }
}

fn draft(name: &str) -> SubscriptionDraft {
    SubscriptionDraft {
        service_name: name.to_string(),
        cycle: CycleUnit::Monthly,
        amount: 990,
        first_payment_date: "2024-01-15".to_string(),
        notify_days_before: 1,
        tags: vec!["video".to_string(), "family".to_string()],
    }
}

/// Serve the API for `user_id` on an ephemeral port, returning the
/// submission endpoint URL and the backing store.
async fn serve_api(user_id: &str) -> (String, InMemoryStore) {
    let store = InMemoryStore::new();
    let config = Arc::new(ConfigBuilder::new().build());
    let app = router(AppContext::new(store.clone(), NoopPushClient, config))
        .layer(Extension(SessionPrincipal::new(user_id)));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{addr}/api/subscriptions"), store)
}

#[tokio::test]
async fn offline_add_syncs_to_server_and_confirms() {
    let (endpoint, server_store) = serve_api("user-1").await;
    let cache = OfflineCache::new(
        InMemoryOfflineStore::new(),
        HttpSubmitClient::new(endpoint),
    );

    // two adds while "offline" are visible immediately as pending
    let records = cache.add_pending(draft("Filmbox")).await.unwrap();
    assert_eq!(records.len(), 1);
    cache.add_pending(draft("Tunecloud")).await.unwrap();

    let outcome = cache.sync().await.unwrap();
    assert_eq!(outcome.synced, 2);
    assert_eq!(outcome.failed, 0);

    // client ids retired in favor of server identities
    assert_eq!(outcome.subscriptions.len(), 2);
    assert!(outcome.subscriptions.iter().all(|r| !r.pending));
    assert!(outcome.subscriptions.iter().all(|r| !r.id.is_pending()));
    assert!(outcome.subscriptions.iter().all(|r| r.client_id.is_none()));

    // server-computed tags and billing fields round-tripped
    let filmbox = outcome
        .subscriptions
        .iter()
        .find(|r| r.service_name == "Filmbox")
        .unwrap();
    assert_eq!(filmbox.tags, vec!["video".to_string(), "family".to_string()]);
    assert!(!filmbox.next_billing_at.is_empty());

    // and the server really has them
    use subtrack::SubscriptionStore;
    let server_side = server_store.subscriptions_for_user("user-1").await.unwrap();
    assert_eq!(server_side.len(), 2);
}

#[tokio::test]
async fn unreachable_server_leaves_queue_intact() {
    // nothing listens on this port
    let cache_store = InMemoryOfflineStore::new();
    let cache = OfflineCache::new(
        cache_store.clone(),
        HttpSubmitClient::new("http://127.0.0.1:9/api/subscriptions"),
    );

    cache.add_pending(draft("Filmbox")).await.unwrap();
    let outcome = cache.sync().await.unwrap();

    assert_eq!(outcome.synced, 0);
    assert_eq!(outcome.failed, 1);
    // record still visible and pending, queue entry untouched
    assert_eq!(outcome.subscriptions.len(), 1);
    assert!(outcome.subscriptions[0].pending);

    use subtrack::offline::OfflineStore;
    assert_eq!(cache_store.list_pending().await.unwrap().len(), 1);
}

#[tokio::test]
async fn rejected_submission_fails_fast() {
    let (endpoint, _server_store) = serve_api("user-1").await;
    let cache = OfflineCache::new(
        InMemoryOfflineStore::new(),
        HttpSubmitClient::new(endpoint),
    );

    // an empty service name fails server-side validation with a 400
    let mut bad = draft("");
    bad.service_name = "   ".to_string();
    cache.add_pending(bad).await.unwrap();
    cache.add_pending(draft("after")).await.unwrap();

    let outcome = cache.sync().await.unwrap();
    assert_eq!(outcome.synced, 0);
    assert_eq!(outcome.failed, 1);
    // the later entry was not applied out of order
    assert_eq!(outcome.subscriptions.iter().filter(|r| r.pending).count(), 2);
}
