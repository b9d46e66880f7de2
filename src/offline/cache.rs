//! Offline-first subscription cache.
//!
//! Additions made while disconnected are inserted optimistically under a
//! locally generated id and queued for replay. [`OfflineCache::sync`] replays
//! the queue in FIFO order against the submission endpoint and folds the
//! server's canonical list back into the local view without dropping entries
//! that are still pending.

use crate::billing::{compute_next_billing, parse_calendar_date};
use crate::error::Result;
use crate::http::SubmitEnvelope;
use crate::offline::store::{
    LocalRecord, MutationKind, NewPendingMutation, OfflineStore, RecordId, SubscriptionDraft,
};
use crate::storage::Subscription;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Result of one sync pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncOutcome {
    /// The refreshed cached list after replay.
    pub subscriptions: Vec<LocalRecord>,
    /// Queue entries confirmed by the server.
    pub synced: usize,
    /// Zero or one: replay stops at the first failure.
    pub failed: usize,
}

/// Port for submitting one queued draft to the server.
///
/// Transport failures and non-2xx responses surface as `Err`; an accepted
/// request that the application rejected comes back as
/// [`SubmitEnvelope::Error`].
#[async_trait]
pub trait SubmitClient: Send + Sync {
    async fn submit(&self, draft: &SubscriptionDraft) -> Result<SubmitEnvelope>;
}

/// Client-side cache of subscriptions with an offline mutation queue.
pub struct OfflineCache<S, C> {
    store: S,
    client: C,
}

impl<S, C> OfflineCache<S, C>
where
    S: OfflineStore,
    C: SubmitClient,
{
    #[must_use]
    pub fn new(store: S, client: C) -> Self {
        Self { store, client }
    }

    /// All locally known records, newest created first, each with its day
    /// count refreshed against today's date.
    ///
    /// The refresh is a cheap local recomputation from the stored next
    /// billing date; records whose count drifted are written back so the
    /// stored view stays current even when the server is unreachable.
    pub async fn get_cached(&self) -> Result<Vec<LocalRecord>> {
        let stored = self.store.list_records().await?;
        let today = Utc::now().date_naive();

        let mut records = Vec::with_capacity(stored.len());
        for mut record in stored {
            if let Some(next) = parse_calendar_date(&record.next_billing_at) {
                let days = (next - today).num_days();
                if days != record.days_until_next_billing {
                    record.days_until_next_billing = days;
                    self.store.put_record(&record).await?;
                }
            }
            records.push(record);
        }

        records.sort_by(|a, b| sort_stamp(b).cmp(&sort_stamp(a)));
        Ok(records)
    }

    /// Optimistically insert a draft and queue it for replay.
    ///
    /// The record is visible (and flagged pending) immediately; billing
    /// fields are computed locally with the same calculator the server uses.
    /// Returns the refreshed cached list so callers can render without
    /// waiting on the network.
    pub async fn add_pending(&self, draft: SubscriptionDraft) -> Result<Vec<LocalRecord>> {
        let client_id = Uuid::new_v4().to_string();
        let computed = compute_next_billing(&draft.first_payment_date, draft.cycle);
        let now = Utc::now();

        let record = LocalRecord {
            id: RecordId::Pending(client_id.clone()),
            user_id: None,
            service_name: draft.service_name.clone(),
            cycle: draft.cycle,
            amount: draft.amount,
            first_payment_date: draft.first_payment_date.clone(),
            next_billing_at: computed.next_billing_at,
            days_until_next_billing: computed.days_until_next_billing,
            notify_days_before: draft.notify_days_before,
            tags: draft.tags.clone(),
            created_at: Some(now),
            updated_at: Some(now),
            last_notified_at: None,
            pending: true,
            client_id: Some(client_id.clone()),
        };

        self.store.put_record(&record).await?;
        self.store
            .enqueue_pending(NewPendingMutation::add(client_id, draft))
            .await?;

        self.get_cached().await
    }

    /// Replace the confirmed view with the server's list, preserving pending
    /// records.
    ///
    /// The server is the sole source of truth for confirmed records while
    /// pending records are invisible to it, so reconciliation is a set union
    /// over disjoint id spaces: clear, repopulate from the server, re-insert
    /// the preserved pending subset.
    pub async fn replace_from_server(
        &self,
        subscriptions: Vec<Subscription>,
    ) -> Result<Vec<LocalRecord>> {
        let existing = self.store.list_records().await?;
        let preserved: Vec<LocalRecord> =
            existing.into_iter().filter(|r| r.pending).collect();

        self.store.clear_records().await?;
        for subscription in subscriptions {
            self.store
                .put_record(&LocalRecord::from_server(subscription))
                .await?;
        }
        for record in preserved {
            self.store.put_record(&record).await?;
        }

        self.get_cached().await
    }

    /// Replay the pending queue in FIFO order.
    ///
    /// Replay stops at the first failing entry so a stuck mutation never lets
    /// a later one land ahead of it; the failed entry stays queued untouched
    /// for the next sync. A confirmed entry is removed from the queue along
    /// with its superseded pending record, and any subscriptions the server
    /// returned are folded back through [`Self::replace_from_server`].
    pub async fn sync(&self) -> Result<SyncOutcome> {
        let pending = self.store.list_pending().await?;
        let mut synced = 0;
        let mut failed = 0;

        for item in pending {
            let MutationKind::Add = item.kind;

            match self.client.submit(&item.draft).await {
                Err(err) => {
                    tracing::error!(
                        client_id = %item.client_id,
                        error = %err,
                        "failed to replay queued subscription"
                    );
                    failed += 1;
                    break;
                }
                Ok(SubmitEnvelope::Error { .. }) => {
                    failed += 1;
                    break;
                }
                Ok(SubmitEnvelope::Success { data }) => {
                    self.store.delete_pending(item.key).await?;
                    self.store
                        .delete_record(&RecordId::Pending(item.client_id.clone()))
                        .await?;
                    if let Some(data) = data {
                        self.replace_from_server(data.subscriptions).await?;
                    }
                    synced += 1;
                }
            }
        }

        let subscriptions = self.get_cached().await?;
        Ok(SyncOutcome {
            subscriptions,
            synced,
            failed,
        })
    }
}

fn sort_stamp(record: &LocalRecord) -> DateTime<Utc> {
    record
        .created_at
        .or(record.updated_at)
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Mock submission client for testing.
#[cfg(any(test, feature = "test-util"))]
pub mod test {
    use super::*;
    use crate::error::SubtrackError;
    use crate::http::SubmitData;
    use std::collections::HashSet;
    use std::sync::{Arc, Mutex};

    /// Plays the server's role in sync tests: accepted drafts are assigned
    /// ids and accumulated, and every success responds with the full
    /// accumulated list the way the submission endpoint does. Drafts whose
    /// service name is scripted to fail return a transport error.
    #[derive(Default, Clone)]
    pub struct MockSubmitClient {
        inner: Arc<Mutex<MockSubmitInner>>,
    }

    #[derive(Default)]
    struct MockSubmitInner {
        fail_names: HashSet<String>,
        reject_names: HashSet<String>,
        confirmed: Vec<Subscription>,
        submitted: Vec<SubscriptionDraft>,
        next_id: i64,
    }

    impl MockSubmitClient {
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Script a transport failure for drafts with this service name.
        pub fn fail_for(&self, service_name: &str) {
            self.inner
                .lock()
                .unwrap()
                .fail_names
                .insert(service_name.to_string());
        }

        /// Script an application-level error envelope for this service name.
        pub fn reject_for(&self, service_name: &str) {
            self.inner
                .lock()
                .unwrap()
                .reject_names
                .insert(service_name.to_string());
        }

        /// Pre-load confirmed subscriptions the "server" already has.
        pub fn seed_confirmed(&self, subscription: Subscription) {
            let mut inner = self.inner.lock().unwrap();
            inner.next_id = inner.next_id.max(subscription.id);
            inner.confirmed.push(subscription);
        }

        /// Every draft submitted so far, in order.
        pub fn submitted(&self) -> Vec<SubscriptionDraft> {
            self.inner.lock().unwrap().submitted.clone()
        }
    }

    #[async_trait]
    impl SubmitClient for MockSubmitClient {
        async fn submit(&self, draft: &SubscriptionDraft) -> Result<SubmitEnvelope> {
            let mut inner = self.inner.lock().unwrap();
            inner.submitted.push(draft.clone());

            if inner.fail_names.contains(&draft.service_name) {
                return Err(SubtrackError::internal("connection refused"));
            }
            if inner.reject_names.contains(&draft.service_name) {
                return Ok(SubmitEnvelope::Error {
                    message: Some("validation failed".to_string()),
                });
            }

            inner.next_id += 1;
            let id = inner.next_id;
            let computed = compute_next_billing(&draft.first_payment_date, draft.cycle);
            let now = Utc::now();
            inner.confirmed.push(Subscription {
                id,
                user_id: Some("user-1".to_string()),
                service_name: draft.service_name.clone(),
                cycle: draft.cycle,
                amount: draft.amount,
                first_payment_date: draft.first_payment_date.clone(),
                next_billing_at: computed.next_billing_at,
                days_until_next_billing: computed.days_until_next_billing,
                notify_days_before: draft.notify_days_before,
                last_notified_at: None,
                tags: draft.tags.clone(),
                created_at: now,
                updated_at: now,
            });

            Ok(SubmitEnvelope::Success {
                data: Some(SubmitData {
                    subscriptions: inner.confirmed.clone(),
                }),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test::MockSubmitClient;
    use super::*;
    use crate::billing::CycleUnit;
    use crate::offline::InMemoryOfflineStore;
    use chrono::Duration;

    fn draft(name: &str) -> SubscriptionDraft {
        SubscriptionDraft {
            service_name: name.to_string(),
            cycle: CycleUnit::Monthly,
            amount: 990,
            first_payment_date: "2024-01-15".to_string(),
            notify_days_before: 1,
            tags: vec!["video".to_string()],
        }
    }

    fn server_subscription(id: i64, name: &str) -> Subscription {
        let now = Utc::now();
        Subscription {
            id,
            user_id: Some("user-1".to_string()),
            service_name: name.to_string(),
            cycle: CycleUnit::Monthly,
            amount: 500,
            first_payment_date: "2024-01-15".to_string(),
            next_billing_at: "2024-04-15T00:00:00.000Z".to_string(),
            days_until_next_billing: 26,
            notify_days_before: 1,
            last_notified_at: None,
            tags: vec![],
            created_at: now,
            updated_at: now,
        }
    }

    fn cache() -> OfflineCache<InMemoryOfflineStore, MockSubmitClient> {
        OfflineCache::new(InMemoryOfflineStore::new(), MockSubmitClient::new())
    }

    #[tokio::test]
    async fn test_add_pending_is_visible_immediately() {
        let cache = cache();
        let records = cache.add_pending(draft("Filmbox")).await.unwrap();

        assert_eq!(records.len(), 1);
        assert!(records[0].pending);
        assert!(records[0].id.is_pending());
        assert!(records[0].client_id.is_some());
        assert_eq!(records[0].service_name, "Filmbox");
        // billing fields were computed locally
        assert!(!records[0].next_billing_at.is_empty());
    }

    #[tokio::test]
    async fn test_get_cached_refreshes_day_counts() {
        let store = InMemoryOfflineStore::new();
        let cache = OfflineCache::new(store.clone(), MockSubmitClient::new());

        let next = Utc::now().date_naive() + Duration::days(5);
        let mut record = LocalRecord::from_server(server_subscription(1, "Filmbox"));
        record.next_billing_at = next.format("%Y-%m-%d").to_string();
        record.days_until_next_billing = 99; // stale
        store.put_record(&record).await.unwrap();

        let records = cache.get_cached().await.unwrap();
        assert_eq!(records[0].days_until_next_billing, 5);

        // drift was persisted, not just returned
        let stored = store.list_records().await.unwrap();
        assert_eq!(stored[0].days_until_next_billing, 5);
    }

    #[tokio::test]
    async fn test_get_cached_sorts_newest_first() {
        let store = InMemoryOfflineStore::new();
        let cache = OfflineCache::new(store.clone(), MockSubmitClient::new());

        let mut older = LocalRecord::from_server(server_subscription(1, "Old"));
        older.created_at = Some(Utc::now() - Duration::days(2));
        let mut newer = LocalRecord::from_server(server_subscription(2, "New"));
        newer.created_at = Some(Utc::now());
        store.put_record(&older).await.unwrap();
        store.put_record(&newer).await.unwrap();

        let records = cache.get_cached().await.unwrap();
        assert_eq!(records[0].service_name, "New");
        assert_eq!(records[1].service_name, "Old");
    }

    #[tokio::test]
    async fn test_replace_from_server_preserves_pending() {
        let cache = cache();
        cache.add_pending(draft("Pending Service")).await.unwrap();

        let server_list = vec![
            server_subscription(1, "Filmbox"),
            server_subscription(2, "Tunecloud"),
        ];
        let records = cache.replace_from_server(server_list).await.unwrap();

        assert_eq!(records.len(), 3);
        let pending: Vec<_> = records.iter().filter(|r| r.pending).collect();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].service_name, "Pending Service");

        let confirmed: Vec<_> = records.iter().filter(|r| !r.pending).collect();
        assert_eq!(confirmed.len(), 2);
        assert!(confirmed.iter().all(|r| r.client_id.is_none()));
    }

    #[tokio::test]
    async fn test_replace_from_server_drops_stale_confirmed() {
        let cache = cache();
        cache
            .replace_from_server(vec![server_subscription(1, "Filmbox")])
            .await
            .unwrap();

        // server no longer returns id 1
        let records = cache
            .replace_from_server(vec![server_subscription(2, "Tunecloud")])
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, RecordId::Confirmed(2));
    }

    #[tokio::test]
    async fn test_sync_confirms_pending_records() {
        let store = InMemoryOfflineStore::new();
        let client = MockSubmitClient::new();
        let cache = OfflineCache::new(store.clone(), client.clone());

        cache.add_pending(draft("Filmbox")).await.unwrap();
        cache.add_pending(draft("Tunecloud")).await.unwrap();

        let outcome = cache.sync().await.unwrap();
        assert_eq!(outcome.synced, 2);
        assert_eq!(outcome.failed, 0);

        // client ids retired, server ids in place
        assert_eq!(outcome.subscriptions.len(), 2);
        assert!(outcome.subscriptions.iter().all(|r| !r.pending));
        assert!(outcome.subscriptions.iter().all(|r| !r.id.is_pending()));

        // queue fully drained
        assert!(store.list_pending().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sync_fails_fast_and_preserves_order() {
        let store = InMemoryOfflineStore::new();
        let client = MockSubmitClient::new();
        let cache = OfflineCache::new(store.clone(), client.clone());

        cache.add_pending(draft("first")).await.unwrap();
        cache.add_pending(draft("second")).await.unwrap();
        cache.add_pending(draft("third")).await.unwrap();
        client.fail_for("second");

        let outcome = cache.sync().await.unwrap();
        assert_eq!(outcome.synced, 1);
        assert_eq!(outcome.failed, 1);

        // the third entry was never attempted
        let attempted: Vec<String> = client
            .submitted()
            .into_iter()
            .map(|d| d.service_name)
            .collect();
        assert_eq!(attempted, vec!["first", "second"]);

        // second and third remain queued, in order
        let remaining = store.list_pending().await.unwrap();
        let names: Vec<&str> = remaining
            .iter()
            .map(|p| p.draft.service_name.as_str())
            .collect();
        assert_eq!(names, vec!["second", "third"]);

        // their local records are still pending and visible
        let pending_left: Vec<_> = outcome
            .subscriptions
            .iter()
            .filter(|r| r.pending)
            .collect();
        assert_eq!(pending_left.len(), 2);
    }

    #[tokio::test]
    async fn test_sync_stops_on_application_level_rejection() {
        let store = InMemoryOfflineStore::new();
        let client = MockSubmitClient::new();
        let cache = OfflineCache::new(store.clone(), client.clone());

        cache.add_pending(draft("rejected")).await.unwrap();
        cache.add_pending(draft("after")).await.unwrap();
        client.reject_for("rejected");

        let outcome = cache.sync().await.unwrap();
        assert_eq!(outcome.synced, 0);
        assert_eq!(outcome.failed, 1);
        assert_eq!(store.list_pending().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_failed_sync_retries_verbatim_next_time() {
        let store = InMemoryOfflineStore::new();
        let client = MockSubmitClient::new();
        let cache = OfflineCache::new(store.clone(), client.clone());

        cache.add_pending(draft("flaky")).await.unwrap();
        client.fail_for("flaky");

        let outcome = cache.sync().await.unwrap();
        assert_eq!(outcome.failed, 1);

        // the queue entry was left untouched; a later sync replays it
        let client2 = MockSubmitClient::new();
        let cache = OfflineCache::new(store.clone(), client2.clone());
        let outcome = cache.sync().await.unwrap();
        assert_eq!(outcome.synced, 1);
        assert_eq!(outcome.failed, 0);
        assert_eq!(client2.submitted()[0].service_name, "flaky");
    }

    #[tokio::test]
    async fn test_sync_folds_server_list_including_other_devices() {
        let store = InMemoryOfflineStore::new();
        let client = MockSubmitClient::new();
        // another device already created id 10 on the server
        client.seed_confirmed(server_subscription(10, "Elsewhere"));
        let cache = OfflineCache::new(store, client);

        cache.add_pending(draft("Here")).await.unwrap();
        let outcome = cache.sync().await.unwrap();

        assert_eq!(outcome.synced, 1);
        let names: Vec<&str> = outcome
            .subscriptions
            .iter()
            .map(|r| r.service_name.as_str())
            .collect();
        assert!(names.contains(&"Elsewhere"));
        assert!(names.contains(&"Here"));
    }
}
