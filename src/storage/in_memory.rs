use crate::billing::BillingComputation;
use crate::error::Result;
use crate::storage::{
    EndpointRegistration, NewSubscription, PushEndpoint, PushEndpointStore, Subscription,
    SubscriptionChanges, SubscriptionStore,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::RwLock;

/// In-memory implementation of the server-side stores.
///
/// Assigns identities from process-local counters. Suitable for tests and
/// development; data is lost on restart. Wraps its state in an Arc so clones
/// share the same records.
#[derive(Default, Clone)]
pub struct InMemoryStore {
    inner: Arc<InMemoryStoreInner>,
}

#[derive(Default)]
struct InMemoryStoreInner {
    subscriptions: RwLock<HashMap<i64, Subscription>>,
    endpoints: RwLock<HashMap<i64, PushEndpoint>>,
    next_subscription_id: AtomicI64,
    next_endpoint_id: AtomicI64,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a subscription directly, bypassing billing computation (for tests).
    pub async fn seed_subscription(&self, subscription: Subscription) {
        let mut subs = self.inner.subscriptions.write().await;
        self.inner
            .next_subscription_id
            .fetch_max(subscription.id, Ordering::Relaxed);
        subs.insert(subscription.id, subscription);
    }

    /// Current endpoint count across all users (for tests).
    pub async fn endpoint_count(&self) -> usize {
        self.inner.endpoints.read().await.len()
    }

    /// Fetch a subscription by id (for tests).
    pub async fn get_subscription(&self, id: i64) -> Option<Subscription> {
        self.inner.subscriptions.read().await.get(&id).cloned()
    }
}

fn newest_first(subscriptions: &mut [Subscription]) {
    subscriptions.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
}

#[async_trait]
impl SubscriptionStore for InMemoryStore {
    async fn list_subscriptions(&self) -> Result<Vec<Subscription>> {
        let subs = self.inner.subscriptions.read().await;
        let mut all: Vec<Subscription> = subs.values().cloned().collect();
        all.sort_by_key(|s| s.id);
        Ok(all)
    }

    async fn subscriptions_for_user(&self, user_id: &str) -> Result<Vec<Subscription>> {
        let subs = self.inner.subscriptions.read().await;
        let mut mine: Vec<Subscription> = subs
            .values()
            .filter(|s| s.user_id.as_deref() == Some(user_id))
            .cloned()
            .collect();
        newest_first(&mut mine);
        Ok(mine)
    }

    async fn create_subscription(&self, new: NewSubscription) -> Result<Subscription> {
        let id = self.inner.next_subscription_id.fetch_add(1, Ordering::Relaxed) + 1;
        let now = Utc::now();
        let subscription = Subscription {
            id,
            user_id: Some(new.user_id),
            service_name: new.service_name,
            cycle: new.cycle,
            amount: new.amount,
            first_payment_date: new.first_payment_date,
            next_billing_at: new.next_billing_at,
            days_until_next_billing: new.days_until_next_billing,
            notify_days_before: new.notify_days_before,
            last_notified_at: None,
            tags: new.tags,
            created_at: now,
            updated_at: now,
        };
        self.inner
            .subscriptions
            .write()
            .await
            .insert(id, subscription.clone());
        Ok(subscription)
    }

    async fn update_subscription(
        &self,
        id: i64,
        user_id: &str,
        changes: SubscriptionChanges,
    ) -> Result<()> {
        let mut subs = self.inner.subscriptions.write().await;
        if let Some(sub) = subs.get_mut(&id) {
            if sub.user_id.as_deref() != Some(user_id) {
                return Ok(());
            }
            sub.service_name = changes.service_name;
            sub.cycle = changes.cycle;
            sub.amount = changes.amount;
            sub.first_payment_date = changes.first_payment_date;
            sub.next_billing_at = changes.next_billing_at;
            sub.days_until_next_billing = changes.days_until_next_billing;
            sub.notify_days_before = changes.notify_days_before;
            sub.tags = changes.tags;
            sub.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn delete_subscription(&self, id: i64, user_id: &str) -> Result<()> {
        let mut subs = self.inner.subscriptions.write().await;
        if subs
            .get(&id)
            .is_some_and(|s| s.user_id.as_deref() == Some(user_id))
        {
            subs.remove(&id);
        }
        Ok(())
    }

    async fn update_billing(&self, id: i64, computed: &BillingComputation) -> Result<()> {
        let mut subs = self.inner.subscriptions.write().await;
        if let Some(sub) = subs.get_mut(&id) {
            sub.next_billing_at = computed.next_billing_at.clone();
            sub.days_until_next_billing = computed.days_until_next_billing;
        }
        Ok(())
    }

    async fn mark_notified(&self, id: i64, at: DateTime<Utc>) -> Result<()> {
        let mut subs = self.inner.subscriptions.write().await;
        if let Some(sub) = subs.get_mut(&id) {
            sub.last_notified_at = Some(at);
        }
        Ok(())
    }
}

#[async_trait]
impl PushEndpointStore for InMemoryStore {
    async fn endpoints_for_users(&self, user_ids: &[String]) -> Result<Vec<PushEndpoint>> {
        let endpoints = self.inner.endpoints.read().await;
        let mut matching: Vec<PushEndpoint> = endpoints
            .values()
            .filter(|e| user_ids.contains(&e.user_id))
            .cloned()
            .collect();
        matching.sort_by_key(|e| e.id);
        Ok(matching)
    }

    async fn upsert_endpoint(&self, registration: EndpointRegistration) -> Result<()> {
        let mut endpoints = self.inner.endpoints.write().await;
        let existing = endpoints
            .values()
            .find(|e| e.user_id == registration.user_id && e.endpoint == registration.endpoint)
            .map(|e| e.id);

        match existing {
            Some(id) => {
                if let Some(endpoint) = endpoints.get_mut(&id) {
                    endpoint.p256dh = registration.p256dh;
                    endpoint.auth = registration.auth;
                    endpoint.expiration_time = registration.expiration_time;
                    endpoint.user_agent = registration.user_agent;
                }
            }
            None => {
                let id = self.inner.next_endpoint_id.fetch_add(1, Ordering::Relaxed) + 1;
                endpoints.insert(
                    id,
                    PushEndpoint {
                        id,
                        user_id: registration.user_id,
                        endpoint: registration.endpoint,
                        p256dh: registration.p256dh,
                        auth: registration.auth,
                        expiration_time: registration.expiration_time,
                        user_agent: registration.user_agent,
                    },
                );
            }
        }
        Ok(())
    }

    async fn delete_endpoint(&self, id: i64) -> Result<()> {
        self.inner.endpoints.write().await.remove(&id);
        Ok(())
    }

    async fn delete_endpoint_for_user(&self, user_id: &str, endpoint: &str) -> Result<()> {
        let mut endpoints = self.inner.endpoints.write().await;
        endpoints.retain(|_, e| !(e.user_id == user_id && e.endpoint == endpoint));
        Ok(())
    }

    async fn has_endpoint(&self, user_id: &str) -> Result<bool> {
        let endpoints = self.inner.endpoints.read().await;
        Ok(endpoints.values().any(|e| e.user_id == user_id))
    }
}
